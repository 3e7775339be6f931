//! Firmware writer for the ESP-IDF OTA partition scheme
//!
//! Images go to whichever `ota_N` slot isn't running. Data is staged one
//! flash sector at a time so every sector is erased and written exactly once.

use alloc::boxed::Box;

use amplipi_panel::ota::FirmwareWriter;
use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::ota::OtaImageState;
use esp_bootloader_esp_idf::ota_updater::OtaUpdater;
use esp_bootloader_esp_idf::partitions::PARTITION_TABLE_MAX_LEN;
use esp_storage::FlashStorage;
use log::{info, warn};

const SECTOR: usize = 4096;

#[derive(Debug)]
pub enum FlashError {
    /// Partition table missing or has no usable OTA slot
    Partition,
    /// Image larger than the slot or than announced
    Overflow,
    Write,
    /// Couldn't switch the boot slot
    Activate,
}

pub struct OtaFlash<'d> {
    flash: FlashStorage<'d>,
    table: Box<[u8; PARTITION_TABLE_MAX_LEN]>,
    sector: Box<[u8; SECTOR]>,
    capacity: usize,
    staged: usize,
    offset: usize,
    expected: usize,
}

impl<'d> OtaFlash<'d> {
    pub fn new(flash: FlashStorage<'d>) -> Self {
        let mut this = Self {
            flash,
            table: Box::new([0; PARTITION_TABLE_MAX_LEN]),
            sector: Box::new([0; SECTOR]),
            capacity: 0,
            staged: 0,
            offset: 0,
            expected: 0,
        };
        this.capacity = match this.next_slot_capacity() {
            Ok(capacity) => capacity,
            Err(e) => {
                warn!("No OTA slot available: {:?}", e);
                0
            }
        };
        info!("OTA slot capacity: {} bytes", this.capacity);
        this
    }

    /// Confirm the running image so the bootloader doesn't roll it back
    pub fn mark_running_valid(&mut self) {
        let Ok(mut ota) = OtaUpdater::new(&mut self.flash, &mut self.table) else {
            return;
        };
        match ota.current_ota_state() {
            Ok(OtaImageState::New | OtaImageState::PendingVerify) => {
                if ota.set_current_ota_state(OtaImageState::Valid).is_ok() {
                    info!("Marked running firmware valid");
                }
            }
            _ => {}
        }
    }

    fn next_slot_capacity(&mut self) -> Result<usize, FlashError> {
        let mut ota = OtaUpdater::new(&mut self.flash, &mut self.table).map_err(|_| FlashError::Partition)?;
        let (region, _) = ota.next_partition().map_err(|_| FlashError::Partition)?;
        Ok(region.capacity())
    }

    /// Write the staged sector to the next slot
    fn flush_sector(&mut self) -> Result<(), FlashError> {
        if self.staged == 0 {
            return Ok(());
        }
        let mut ota = OtaUpdater::new(&mut self.flash, &mut self.table).map_err(|_| FlashError::Partition)?;
        let (mut region, _) = ota.next_partition().map_err(|_| FlashError::Partition)?;
        region
            .write(self.offset as u32, &self.sector[..self.staged])
            .map_err(|_| FlashError::Write)?;
        self.offset += self.staged;
        self.staged = 0;
        Ok(())
    }
}

impl FirmwareWriter for OtaFlash<'_> {
    type Error = FlashError;

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn begin(&mut self, len: usize) -> Result<(), FlashError> {
        if len > self.capacity {
            return Err(FlashError::Overflow);
        }
        self.expected = len;
        self.offset = 0;
        self.staged = 0;
        Ok(())
    }

    fn write(&mut self, mut data: &[u8]) -> Result<(), FlashError> {
        if self.offset + self.staged + data.len() > self.expected {
            return Err(FlashError::Overflow);
        }
        while !data.is_empty() {
            let take = data.len().min(SECTOR - self.staged);
            self.sector[self.staged..self.staged + take].copy_from_slice(&data[..take]);
            self.staged += take;
            data = &data[take..];
            if self.staged == SECTOR {
                self.flush_sector()?;
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), FlashError> {
        self.flush_sector()?;
        let mut ota = OtaUpdater::new(&mut self.flash, &mut self.table).map_err(|_| FlashError::Partition)?;
        ota.activate_next_partition().map_err(|_| FlashError::Activate)?;
        ota.set_current_ota_state(OtaImageState::New)
            .map_err(|_| FlashError::Activate)?;
        info!("Activated new firmware ({} bytes)", self.offset);
        Ok(())
    }
}
