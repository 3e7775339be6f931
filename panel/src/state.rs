//! Controller state shared by the reconciler, dispatcher and renderer

use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, warn};

use crate::api::ApiError;
use crate::config::{Config, SettingsDraft};
use crate::dirty::{DirtyFlags, Region, ZoneSlot};
use crate::layout::Layout;
use crate::ota::OtaError;
use crate::screen::Screen;
use crate::stream::{StreamInput, StreamType};

/// Firmware version shown on the about screen
pub const VERSION: &str = "0.9.1 (beta)";

/// Last polled (or optimistically set) state of one zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneState {
    pub muted: bool,
    pub volume_percent: f32,
}

impl Default for ZoneState {
    fn default() -> Self {
        Self {
            muted: false,
            volume_percent: 100.0,
        }
    }
}

/// Text metadata for the current track
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub artist: String,
    pub song: String,
    pub album: String,
    pub status: String,
}

/// Cached state of the tracked source
#[derive(Debug, Clone)]
pub struct SourceState {
    /// `None` until the first successful poll
    pub input: Option<StreamInput>,
    pub stream_name: String,
    pub stream_type: StreamType,
    pub playing: bool,
    pub liked: bool,
    pub disliked: bool,
    pub track: Option<TrackInfo>,
    pub album_art_url: Option<String>,
    /// Encoded image as served by the amplifier
    pub album_art: Vec<u8>,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            input: None,
            stream_name: String::new(),
            stream_type: StreamType::None,
            playing: true,
            liked: false,
            disliked: false,
            track: None,
            album_art_url: None,
            album_art: Vec::new(),
        }
    }
}

impl SourceState {
    pub fn commands_enabled(&self) -> bool {
        self.stream_type.has_commands() && self.input.and_then(|i| i.stream_id()).is_some()
    }
}

/// Banner shown above the volume bars until the next successful call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    Unreachable,
    SaveFailed,
    UpdateFailed(OtaError),
}

impl Warning {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unreachable => "Unable to access AmpliPi",
            Self::SaveFailed => "Unable to save settings",
            Self::UpdateFailed(_) => "Update failed",
        }
    }
}

/// One row of the source picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerEntry {
    pub input: StreamInput,
    pub name: String,
}

/// Source picker list and the current page
#[derive(Debug, Clone, Default)]
pub struct PickerState {
    pub entries: Vec<PickerEntry>,
    pub offset: usize,
}

impl PickerState {
    /// Off and Local are always offered ahead of the streams
    pub fn with_streams(streams: impl IntoIterator<Item = PickerEntry>) -> Self {
        let mut entries = alloc::vec![
            PickerEntry {
                input: StreamInput::Off,
                name: String::from(crate::stream::OFF_NAME),
            },
            PickerEntry {
                input: StreamInput::Local,
                name: String::from(crate::stream::LOCAL_NAME),
            },
        ];
        entries.extend(streams);
        Self { entries, offset: 0 }
    }

    pub fn visible(&self, page_size: usize) -> &[PickerEntry] {
        let start = self.offset.min(self.entries.len());
        let end = (start + page_size).min(self.entries.len());
        &self.entries[start..end]
    }

    pub fn has_prev(&self) -> bool {
        self.offset > 0
    }

    pub fn has_next(&self, page_size: usize) -> bool {
        self.offset + page_size < self.entries.len()
    }

    pub fn next_page(&mut self, page_size: usize) -> bool {
        if !self.has_next(page_size) {
            return false;
        }
        self.offset += page_size;
        true
    }

    pub fn prev_page(&mut self, page_size: usize) -> bool {
        if !self.has_prev() {
            return false;
        }
        self.offset = self.offset.saturating_sub(page_size);
        true
    }
}

/// Progress of a firmware download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OtaStatus {
    #[default]
    Idle,
    Running,
    Failed(OtaError),
}

#[derive(Debug, Clone)]
pub struct ControllerState {
    pub screen: Screen,
    pub polling: bool,
    pub backlight: bool,
    /// Next render clears the screen and draws every region it shows
    pub cold_draw: bool,
    pub dirty: DirtyFlags,
    pub warning: Option<Warning>,
    pub zones: [Option<ZoneState>; 2],
    pub source: SourceState,
    pub config: Config,
    pub draft: SettingsDraft,
    pub picker: PickerState,
    pub ota: OtaStatus,
    pub layout: Layout,
}

impl ControllerState {
    pub fn new(config: Config, layout: Layout) -> Self {
        Self {
            screen: Screen::Select,
            polling: true,
            backlight: true,
            cold_draw: true,
            dirty: DirtyFlags::all(),
            warning: None,
            zones: [None, None],
            source: SourceState::default(),
            draft: SettingsDraft::from_config(&config),
            config,
            picker: PickerState::default(),
            ota: OtaStatus::Idle,
            layout,
        }
    }

    pub fn zone_count(&self) -> usize {
        if self.config.zone2_enabled() { 2 } else { 1 }
    }

    /// Zone slots in use, in display order
    pub fn tracked_zones(&self) -> &'static [ZoneSlot] {
        match self.zone_count() {
            1 => &[ZoneSlot::First],
            _ => &[ZoneSlot::First, ZoneSlot::Second],
        }
    }

    /// AmpliPi zone id for a slot, `None` if the slot is disabled
    pub fn zone_id(&self, slot: ZoneSlot) -> Option<u8> {
        let id = match slot {
            ZoneSlot::First => self.config.zone1,
            ZoneSlot::Second => self.config.zone2,
        };
        u8::try_from(id).ok()
    }

    pub fn source_id(&self) -> u8 {
        u8::try_from(self.config.source).unwrap_or(0)
    }

    pub fn zone(&self, slot: ZoneSlot) -> ZoneState {
        self.zones[slot.index()].unwrap_or_default()
    }

    /// Raise the banner; repeated failures leave it untouched
    pub fn latch_warning(&mut self, warning: Warning) {
        if self.warning != Some(warning) {
            self.warning = Some(warning);
            self.dirty.set(Region::Warning);
        }
    }

    pub fn clear_warning(&mut self) {
        if self.warning.take().is_some() {
            self.dirty.set(Region::Warning);
        }
    }

    /// Update the banner from the outcome of an API call.
    ///
    /// Transport and status failures latch the unreachable banner, success
    /// clears it. Parse errors are only logged.
    pub fn observe<T>(&mut self, what: &str, result: &Result<T, ApiError>) {
        match result {
            Ok(_) => self.clear_warning(),
            Err(ApiError::Parse) => warn!("{what}: unparseable response"),
            Err(err) => {
                debug!("{what}: {err}");
                self.latch_warning(Warning::Unreachable);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TransportError;

    fn state() -> ControllerState {
        let mut state = ControllerState::new(Config::default(), Layout::SMALL);
        state.dirty = DirtyFlags::empty();
        state
    }

    #[test]
    fn test_warning_latches_once() {
        let mut state = state();
        let failed: Result<(), ApiError> = Err(ApiError::Transport(TransportError::Timeout));
        state.observe("zone", &failed);
        assert!(state.dirty.take(Region::Warning));
        state.observe("zone", &failed);
        assert!(!state.dirty.is_set(Region::Warning));
        state.observe("zone", &Err::<(), _>(ApiError::Status(500)));
        assert!(!state.dirty.is_set(Region::Warning));

        state.observe("zone", &Ok(()));
        assert_eq!(state.warning, None);
        assert!(state.dirty.take(Region::Warning));
        state.observe("zone", &Ok(()));
        assert!(state.dirty.is_empty());
    }

    #[test]
    fn test_parse_error_keeps_banner() {
        let mut state = state();
        state.observe("source", &Err::<(), _>(ApiError::Parse));
        assert_eq!(state.warning, None);
        assert!(state.dirty.is_empty());
    }

    #[test]
    fn test_zone_slots() {
        let mut state = state();
        assert_eq!(state.tracked_zones(), &[ZoneSlot::First]);
        assert_eq!(state.zone_id(ZoneSlot::Second), None);
        state.config.zone2 = 3;
        assert_eq!(state.tracked_zones(), &[ZoneSlot::First, ZoneSlot::Second]);
        assert_eq!(state.zone_id(ZoneSlot::Second), Some(3));
    }

    #[test]
    fn test_picker_paging() {
        let streams = (0..9).map(|i| PickerEntry {
            input: StreamInput::Stream(1000 + i),
            name: alloc::format!("Stream {i}"),
        });
        let mut picker = PickerState::with_streams(streams);
        assert_eq!(picker.entries.len(), 11);
        assert_eq!(picker.visible(6)[0].input, StreamInput::Off);
        assert!(!picker.has_prev());
        assert!(picker.has_next(6));
        assert!(picker.next_page(6));
        assert_eq!(picker.visible(6).len(), 5);
        assert!(!picker.next_page(6));
        assert!(picker.prev_page(6));
        assert_eq!(picker.offset, 0);
    }
}
