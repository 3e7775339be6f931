//! SD card storage for the panel config and touch calibration
//!
//! Both files live in the root directory of the first FAT volume. Names are
//! 8.3 so they survive cards formatted without long file name support.

use amplipi_panel::config::{ConfigStore, StorageError, StoredFile};
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use embedded_sdmmc::{Mode, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager};
use log::{info, warn};

/// Dummy time source (SD cards need timestamps but we don't care)
pub struct DummyTimesource;

impl TimeSource for DummyTimesource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55, // 2025
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

fn file_name(file: StoredFile) -> &'static str {
    match file {
        StoredFile::Config => "CONFIG.JSN",
        StoredFile::Calibration => "TOUCHCAL.DAT",
    }
}

fn open_error(e: embedded_sdmmc::Error<embedded_sdmmc::SdCardError>) -> StorageError {
    match e {
        embedded_sdmmc::Error::NotFound => StorageError::NotFound,
        _ => StorageError::Read,
    }
}

/// [`ConfigStore`] on an SD card
///
/// A card that fails to mount reports [`StorageError::Unavailable`] on every
/// call; the panel then runs on defaults.
pub struct SdStorage<SPI: SpiDevice, DELAY: DelayNs> {
    volume_mgr: VolumeManager<SdCard<SPI, DELAY>, DummyTimesource>,
}

impl<SPI, DELAY> SdStorage<SPI, DELAY>
where
    SPI: SpiDevice,
    DELAY: DelayNs,
{
    pub fn new(spi: SPI, delay: DELAY) -> Self {
        let sd_card = SdCard::new(spi, delay);

        // Get card size to verify it's working
        match sd_card.num_bytes() {
            Ok(size) => info!("SD card size: {} MB", size / 1024 / 1024),
            Err(e) => warn!("SD card not responding: {:?}", e),
        }

        Self {
            volume_mgr: VolumeManager::new(sd_card, DummyTimesource),
        }
    }
}

impl<SPI, DELAY> ConfigStore for SdStorage<SPI, DELAY>
where
    SPI: SpiDevice,
    DELAY: DelayNs,
{
    fn read(&mut self, file: StoredFile, buf: &mut [u8]) -> Result<usize, StorageError> {
        let mut volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|_| StorageError::Unavailable)?;
        let mut root_dir = volume.open_root_dir().map_err(|_| StorageError::Unavailable)?;

        let mut handle = root_dir
            .open_file_in_dir(file_name(file), Mode::ReadOnly)
            .map_err(open_error)?;

        if handle.length() as usize > buf.len() {
            return Err(StorageError::TooLarge);
        }

        let mut total_read = 0;
        while !handle.is_eof() {
            match handle.read(&mut buf[total_read..]) {
                Ok(0) => break,
                Ok(n) => total_read += n,
                Err(_) => return Err(StorageError::Read),
            }
        }

        info!("Read {} bytes from {}", total_read, file_name(file));
        Ok(total_read)
    }

    fn write(&mut self, file: StoredFile, data: &[u8]) -> Result<(), StorageError> {
        let mut volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|_| StorageError::Unavailable)?;
        let mut root_dir = volume.open_root_dir().map_err(|_| StorageError::Unavailable)?;

        // Create/truncate file
        let mut handle = root_dir
            .open_file_in_dir(file_name(file), Mode::ReadWriteCreateOrTruncate)
            .map_err(|_| StorageError::Write)?;

        handle.write(data).map_err(|_| StorageError::Write)?;
        handle.flush().map_err(|_| StorageError::Write)?;

        info!("Wrote {} bytes to {}", data.len(), file_name(file));
        Ok(())
    }

    fn remove(&mut self, file: StoredFile) -> Result<(), StorageError> {
        let mut volume = self
            .volume_mgr
            .open_volume(VolumeIdx(0))
            .map_err(|_| StorageError::Unavailable)?;
        let mut root_dir = volume.open_root_dir().map_err(|_| StorageError::Unavailable)?;

        match root_dir.delete_file_in_dir(file_name(file)) {
            Ok(()) => {
                info!("Removed {}", file_name(file));
                Ok(())
            }
            Err(embedded_sdmmc::Error::NotFound) => Ok(()),
            Err(_) => Err(StorageError::Write),
        }
    }
}
