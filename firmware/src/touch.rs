//! XPT2046 resistive touch controller
//!
//! Reads 12-bit X/Y/pressure samples over SPI. The PENIRQ line goes low while
//! the panel is pressed, which lets [`TouchSource::poll`] skip the bus when
//! nobody is touching the screen.

use core::fmt::Debug;

use amplipi_panel::config::ConfigStore;
use amplipi_panel::layout::Layout;
use amplipi_panel::touch::{self, Calibration, TouchEvent, TouchSource};
use embassy_time::{Duration, Timer};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::{DrawTarget, Point};
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use log::{info, warn};

use crate::canvas::{CanvasError, LcdCanvas};

/// XPT2046 control byte commands
mod cmd {
    pub const READ_X: u8 = 0xD0;
    pub const READ_Y: u8 = 0x90;
    pub const READ_Z1: u8 = 0xB0;
    pub const READ_Z2: u8 = 0xC0;
}

/// Minimum pressure reading counted as a touch
const PRESSURE_THRESHOLD: u16 = 400;
/// Samples averaged per reading
const SAMPLES: u32 = 4;
/// Distance of the calibration crosshairs from the screen corners
const MARKER_INSET: i32 = 20;

pub struct Xpt2046<SPI, IRQ> {
    spi: SPI,
    irq: IRQ,
    layout: Layout,
    calibration: Option<Calibration>,
}

impl<SPI, IRQ> Xpt2046<SPI, IRQ>
where
    SPI: SpiDevice,
    IRQ: InputPin,
{
    pub fn new(spi: SPI, irq: IRQ, layout: Layout) -> Self {
        Self {
            spi,
            irq,
            layout,
            calibration: None,
        }
    }

    pub fn set_calibration(&mut self, cal: Calibration) {
        self.calibration = Some(cal);
    }

    fn read_channel(&mut self, command: u8) -> Result<u16, SPI::Error> {
        let mut buf = [command, 0, 0];
        self.spi.transfer_in_place(&mut buf)?;
        // One busy bit, 12 data bits, three trailing zeros
        Ok(((u16::from(buf[1]) << 8 | u16::from(buf[2])) >> 3) & 0x0FFF)
    }

    fn pressure(&mut self) -> Result<u16, SPI::Error> {
        let z1 = self.read_channel(cmd::READ_Z1)?;
        let z2 = self.read_channel(cmd::READ_Z2)?;
        Ok((z1 + 4095).saturating_sub(z2))
    }

    /// Averaged raw sample, `None` when the panel isn't pressed
    pub fn read_raw(&mut self) -> Option<(u16, u16)> {
        if self.irq.is_high().unwrap_or(true) {
            return None;
        }

        match self.sample() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Touch read failed: {:?}", e);
                None
            }
        }
    }

    fn sample(&mut self) -> Result<Option<(u16, u16)>, SPI::Error> {
        if self.pressure()? < PRESSURE_THRESHOLD {
            return Ok(None);
        }

        let (mut x, mut y) = (0u32, 0u32);
        for _ in 0..SAMPLES {
            x += u32::from(self.read_channel(cmd::READ_X)?);
            y += u32::from(self.read_channel(cmd::READ_Y)?);
        }

        // Released while sampling
        if self.pressure()? < PRESSURE_THRESHOLD {
            return Ok(None);
        }
        Ok(Some(((x / SAMPLES) as u16, (y / SAMPLES) as u16)))
    }
}

impl<SPI, IRQ> TouchSource for Xpt2046<SPI, IRQ>
where
    SPI: SpiDevice,
    IRQ: InputPin,
{
    fn poll(&mut self) -> Option<TouchEvent> {
        let cal = self.calibration?;
        let (raw_x, raw_y) = self.read_raw()?;
        Some(cal.map(raw_x, raw_y, &self.layout))
    }
}

/// Walk the user through touching two crosshairs and store the result
pub async fn calibrate<SPI, IRQ, D, BL, S>(
    panel: &mut Xpt2046<SPI, IRQ>,
    canvas: &mut LcdCanvas<D, BL>,
    store: &mut S,
) -> Result<Calibration, CanvasError<D::Error>>
where
    SPI: SpiDevice,
    IRQ: InputPin,
    D: DrawTarget<Color = Rgb565>,
    D::Error: Debug,
    BL: OutputPin,
    S: ConfigStore,
{
    let layout = panel.layout;
    let top_left = Point::new(MARKER_INSET, MARKER_INSET);
    let bottom_right = Point::new(layout.width - 1 - MARKER_INSET, layout.height - 1 - MARKER_INSET);

    loop {
        canvas.show_marker(top_left, "Touch the crosshair")?;
        let first = wait_for_press(panel).await;
        canvas.show_marker(bottom_right, "Touch the crosshair")?;
        let second = wait_for_press(panel).await;

        match Calibration::from_markers(first, second, MARKER_INSET, &layout) {
            Some(cal) => {
                info!("Touch calibration {:?}", cal);
                if let Err(e) = touch::save_calibration(store, &cal) {
                    warn!("Failed to save calibration: {}", e);
                }
                panel.set_calibration(cal);
                return Ok(cal);
            }
            None => {
                warn!("Calibration readings unusable, retrying");
                canvas.show_message(&["Calibration failed", "Try again"])?;
                Timer::after(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Reading at the moment of a press, after the finger has lifted again
async fn wait_for_press<SPI, IRQ>(panel: &mut Xpt2046<SPI, IRQ>) -> (u16, u16)
where
    SPI: SpiDevice,
    IRQ: InputPin,
{
    let reading = loop {
        if let Some(raw) = panel.read_raw() {
            break raw;
        }
        Timer::after(Duration::from_millis(20)).await;
    };
    while panel.read_raw().is_some() {
        Timer::after(Duration::from_millis(20)).await;
    }
    // Let the panel settle before the next marker
    Timer::after(Duration::from_millis(300)).await;
    reading
}
