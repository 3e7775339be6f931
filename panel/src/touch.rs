//! Touch input: calibration, debounce and hit-table lookup

use log::warn;

use crate::config::{ConfigStore, StorageError, StoredFile};
use crate::layout::{Layout, Point};
use crate::screen::{self, Action, TableContext};
use crate::state::ControllerState;

/// Default quiet period after an accepted touch
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// A touch in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub x: i32,
    pub y: i32,
}

impl TouchEvent {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Something that can be sampled for touches
pub trait TouchSource {
    fn poll(&mut self) -> Option<TouchEvent>;
}

/// Drops samples that arrive within the window after an accepted one
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window_ms: u64,
    last_accepted: Option<u64>,
}

impl Debouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last_accepted: None,
        }
    }

    pub fn accept(&mut self, now_ms: u64) -> bool {
        match self.last_accepted {
            Some(last) if now_ms.saturating_sub(last) < self.window_ms => false,
            _ => {
                self.last_accepted = Some(now_ms);
                true
            }
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_MS)
    }
}

/// Largest raw reading of the 12-bit touch controller
const RAW_MAX: i32 = 4095;

/// Raw readings at the screen edges. An axis is inverted when its `min`
/// reading is larger than its `max` reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub x_min: u16,
    pub x_max: u16,
    pub y_min: u16,
    pub y_max: u16,
}

impl Calibration {
    pub const LEN: usize = 8;

    /// Map a raw sample to screen coordinates, clamped to the panel
    pub fn map(&self, raw_x: u16, raw_y: u16, layout: &Layout) -> TouchEvent {
        TouchEvent {
            x: scale(raw_x, self.x_min, self.x_max, layout.width),
            y: scale(raw_y, self.y_min, self.y_max, layout.height),
        }
    }

    /// Derive edge readings from two markers drawn `inset` pixels in from the
    /// top-left and bottom-right corners.
    pub fn from_markers(
        top_left: (u16, u16),
        bottom_right: (u16, u16),
        inset: i32,
        layout: &Layout,
    ) -> Option<Self> {
        let (x_min, x_max) = extend(top_left.0, bottom_right.0, inset, layout.width)?;
        let (y_min, y_max) = extend(top_left.1, bottom_right.1, inset, layout.height)?;
        Some(Self { x_min, x_max, y_min, y_max })
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        for (chunk, value) in out.chunks_exact_mut(2).zip([self.x_min, self.x_max, self.y_min, self.y_max]) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let word = |i: usize| u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        let cal = Self {
            x_min: word(0),
            x_max: word(1),
            y_min: word(2),
            y_max: word(3),
        };
        (cal.x_min != cal.x_max && cal.y_min != cal.y_max).then_some(cal)
    }
}

fn scale(raw: u16, min: u16, max: u16, span: i32) -> i32 {
    let (raw, min, max) = (i32::from(raw), i32::from(min), i32::from(max));
    if min == max {
        return 0;
    }
    ((raw - min) * (span - 1) / (max - min)).clamp(0, span - 1)
}

fn extend(near: u16, far: u16, inset: i32, span: i32) -> Option<(u16, u16)> {
    let (near, far) = (i32::from(near), i32::from(far));
    let inner = span - 1 - 2 * inset;
    if inner <= 0 || near == far {
        return None;
    }
    let margin = (far - near) * inset / inner;
    let lo = (near - margin).clamp(0, RAW_MAX);
    let hi = (far + margin).clamp(0, RAW_MAX);
    Some((lo as u16, hi as u16))
}

/// Stored calibration, `None` if missing or unreadable
pub fn load_calibration<S: ConfigStore>(store: &mut S) -> Option<Calibration> {
    let mut buf = [0u8; Calibration::LEN];
    match store.read(StoredFile::Calibration, &mut buf) {
        Ok(len) => Calibration::from_bytes(&buf[..len]),
        Err(StorageError::NotFound) => None,
        Err(err) => {
            warn!("Failed to read calibration: {err}");
            None
        }
    }
}

pub fn save_calibration<S: ConfigStore>(store: &mut S, cal: &Calibration) -> Result<(), StorageError> {
    store.write(StoredFile::Calibration, &cal.to_bytes())
}

/// Action under the touch on the active screen
pub fn resolve(state: &ControllerState, event: TouchEvent) -> Option<Action> {
    let ctx = TableContext::from_state(state);
    let table = screen::hit_table(state.screen, &ctx, &state.layout);
    screen::lookup(&table, event.point())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dirty::ZoneSlot;
    use crate::screen::Screen;
    use crate::testing::MemoryStore;

    #[test]
    fn test_debounce_window() {
        let mut debouncer = Debouncer::new(200);
        assert!(debouncer.accept(1_000));
        assert!(!debouncer.accept(1_050));
        assert!(!debouncer.accept(1_199));
        assert!(debouncer.accept(1_200));
        assert!(!debouncer.accept(1_201));
    }

    #[test]
    fn test_calibration_corners() {
        let layout = Layout::SMALL;
        let cal = Calibration { x_min: 300, x_max: 3800, y_min: 250, y_max: 3900 };
        assert_eq!(cal.map(300, 250, &layout), TouchEvent { x: 0, y: 0 });
        assert_eq!(cal.map(3800, 3900, &layout), TouchEvent { x: 239, y: 319 });
        assert_eq!(cal.map(0, 4095, &layout), TouchEvent { x: 0, y: 319 });
    }

    #[test]
    fn test_calibration_inverted_axis() {
        let layout = Layout::SMALL;
        let cal = Calibration { x_min: 3800, x_max: 300, y_min: 250, y_max: 3900 };
        assert_eq!(cal.map(3800, 250, &layout), TouchEvent { x: 0, y: 0 });
        assert_eq!(cal.map(300, 250, &layout), TouchEvent { x: 239, y: 0 });
        let mid = cal.map(2050, 2075, &layout);
        assert!((118..=120).contains(&mid.x), "{mid:?}");
    }

    #[test]
    fn test_markers_extend_to_edges() {
        let layout = Layout::SMALL;
        // Markers 15px in from each corner, 10 raw units per pixel
        let cal = Calibration::from_markers((150, 150), (2240, 3040), 15, &layout).unwrap();
        assert_eq!(cal, Calibration { x_min: 0, x_max: 2390, y_min: 0, y_max: 3190 });
        assert_eq!(cal.map(150, 150, &layout), TouchEvent { x: 15, y: 15 });
        assert!(Calibration::from_markers((100, 100), (100, 900), 15, &layout).is_none());
    }

    #[test]
    fn test_calibration_bytes() {
        let cal = Calibration { x_min: 0x0102, x_max: 0x0304, y_min: 5, y_max: 4000 };
        let bytes = cal.to_bytes();
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
        assert_eq!(Calibration::from_bytes(&bytes), Some(cal));
        assert_eq!(Calibration::from_bytes(&bytes[..7]), None);
        assert_eq!(Calibration::from_bytes(&[0u8; 8]), None);
    }

    #[test]
    fn test_calibration_store() {
        let mut store = MemoryStore::default();
        assert_eq!(load_calibration(&mut store), None);
        let cal = Calibration { x_min: 200, x_max: 3900, y_min: 3900, y_max: 200 };
        save_calibration(&mut store, &cal).unwrap();
        assert_eq!(load_calibration(&mut store), Some(cal));
        assert_eq!(load_calibration(&mut MemoryStore::unavailable()), None);
    }

    #[test]
    fn test_resolve_uses_active_screen() {
        let mut state = ControllerState::new(Config::default(), Layout::SMALL);
        let bar = TouchEvent { x: 100, y: 300 };
        assert_eq!(resolve(&state, bar), Some(Action::SetVolume(ZoneSlot::First)));
        state.screen = Screen::Metadata;
        assert_eq!(resolve(&state, bar), Some(Action::Back));
    }
}
