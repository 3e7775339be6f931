//! The panel's single cooperative loop body
//!
//! Each [`Panel::tick`] handles at most one touch, renders, runs at most one
//! reconciliation pass and renders again. Actions that write to the API
//! update the model first and render before the request goes out.

use alloc::string::String;

use log::{info, warn};

use crate::api::{ApiClient, Transport};
use crate::config::{self, ConfigStore, StoredFile};
use crate::dirty::{Region, ZoneSlot};
use crate::ota::{self, FirmwareWriter};
use crate::reconcile::{Reconciler, DEFAULT_POLL_INTERVAL_MS};
use crate::render::{render, Canvas};
use crate::screen::{self, transition_to, Action, Screen};
use crate::state::{ControllerState, OtaStatus, PickerEntry, PickerState, SourceState, Warning, ZoneState};
use crate::stream::{StreamCommand, StreamInput};
use crate::touch::{self, Debouncer, TouchEvent, TouchSource, DEFAULT_DEBOUNCE_MS};
use crate::volume;

/// Default location of the firmware image on the AmpliPi host
pub const DEFAULT_FIRMWARE_PATH: &str = "/update/panel.bin";

/// Runtime tunables
#[derive(Debug, Clone, Copy)]
pub struct PanelSettings {
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub firmware_path: &'static str,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            firmware_path: DEFAULT_FIRMWARE_PATH,
        }
    }
}

/// Whether the main loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Hard reset requested (reboot, recalibrate, rotate, finished update)
    Restart,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub action: Option<Action>,
    pub polled: bool,
    pub drawn: usize,
    pub flow: Flow,
}

pub struct Panel<T, S, W> {
    state: ControllerState,
    api: ApiClient<T>,
    store: S,
    updater: W,
    reconciler: Reconciler,
    debouncer: Debouncer,
    settings: PanelSettings,
}

impl<T, S, W> Panel<T, S, W>
where
    T: Transport,
    S: ConfigStore,
    W: FirmwareWriter,
{
    pub fn new(state: ControllerState, transport: T, store: S, updater: W, settings: PanelSettings) -> Self {
        Self {
            state,
            api: ApiClient::new(transport),
            store,
            updater,
            reconciler: Reconciler::new(settings.poll_interval_ms),
            debouncer: Debouncer::new(settings.debounce_ms),
            settings,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ControllerState {
        &mut self.state
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.api.transport_mut()
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub async fn tick<C: Canvas, I: TouchSource>(
        &mut self,
        now_ms: u64,
        touch: &mut I,
        canvas: &mut C,
    ) -> Result<TickReport, C::Error> {
        let mut report = TickReport {
            action: None,
            polled: false,
            drawn: 0,
            flow: Flow::Continue,
        };

        // Touches outside every hit region don't start the debounce window
        let touched = touch.poll().and_then(|event| Some((event, touch::resolve(&self.state, event)?)));
        if let Some((event, action)) = touched {
            if self.debouncer.accept(now_ms) {
                report.action = Some(action);
                report.flow = self.dispatch(action, event, canvas).await?;
                if report.flow == Flow::Restart {
                    return Ok(report);
                }
            }
        }

        report.drawn += render(&mut self.state, canvas)?;
        report.polled = self.reconciler.tick(&mut self.state, &mut self.api, now_ms).await;
        if report.polled {
            report.drawn += render(&mut self.state, canvas)?;
        }
        Ok(report)
    }

    /// Run an action resolved from `event`
    pub async fn dispatch<C: Canvas>(
        &mut self,
        action: Action,
        event: TouchEvent,
        canvas: &mut C,
    ) -> Result<Flow, C::Error> {
        info!("Action {:?}", action);
        let page = self.state.layout.picker_page_size();
        match action {
            Action::PowerOff => transition_to(&mut self.state, Screen::PoweredOff),
            Action::WakeUp | Action::Back => transition_to(&mut self.state, Screen::Select),
            Action::OpenMetadata => transition_to(&mut self.state, Screen::Metadata),
            Action::OpenSourcePicker => self.open_picker().await,
            Action::ToggleMute(slot) => self.toggle_mute(slot, canvas).await?,
            Action::SetVolume(slot) => self.set_volume(slot, event.x, canvas).await?,
            Action::Command(command) => self.send_command(command, canvas).await?,
            Action::SelectSource(row) => self.select_source(row).await,
            Action::PrevPage => {
                if self.state.picker.prev_page(page) {
                    self.state.dirty.set(Region::PageBody);
                }
            }
            Action::NextPage => {
                if self.state.picker.next_page(page) {
                    self.state.dirty.set(Region::PageBody);
                }
            }
            Action::OpenSettings => transition_to(&mut self.state, Screen::Settings),
            Action::Adjust(field, delta) => {
                if self.state.draft.adjust(field, delta) {
                    self.state.dirty.set(Region::PageBody);
                }
            }
            Action::SaveSettings => self.save_settings(),
            Action::OpenAbout => transition_to(&mut self.state, Screen::About),
            Action::Reboot => return Ok(Flow::Restart),
            Action::Recalibrate => {
                self.forget_calibration();
                return Ok(Flow::Restart);
            }
            Action::Rotate => {
                self.state.config.screen_rotation = self.state.config.flipped_rotation();
                if let Err(err) = config::save(&mut self.store, &self.state.config) {
                    warn!("Failed to save rotation: {err}");
                }
                self.forget_calibration();
                return Ok(Flow::Restart);
            }
            Action::StartUpdate => return self.update(canvas).await,
        }
        Ok(Flow::Continue)
    }

    async fn open_picker(&mut self) {
        transition_to(&mut self.state, Screen::SourcePicker);
        let result = self.api.streams().await;
        self.state.observe("streams", &result);
        let streams = result.unwrap_or_default();
        info!("Source picker: {} streams", streams.len());
        self.state.picker = PickerState::with_streams(streams.into_iter().map(|s| PickerEntry {
            input: StreamInput::Stream(s.id),
            name: s.name,
        }));
    }

    async fn toggle_mute<C: Canvas>(&mut self, slot: ZoneSlot, canvas: &mut C) -> Result<(), C::Error> {
        let Some(zone) = self.state.zone_id(slot) else {
            return Ok(());
        };
        let cached = self.state.zones[slot.index()].get_or_insert_with(ZoneState::default);
        cached.muted = !cached.muted;
        let muted = cached.muted;
        self.state.dirty.set(Region::mute(slot));
        render(&mut self.state, canvas)?;

        let result = self.api.set_mute(zone, muted).await;
        self.state.observe("mute", &result);
        Ok(())
    }

    async fn set_volume<C: Canvas>(&mut self, slot: ZoneSlot, x: i32, canvas: &mut C) -> Result<(), C::Error> {
        let (Some(zone), Some(row)) = (
            self.state.zone_id(slot),
            screen::bar_row(slot, self.state.zone_count()),
        ) else {
            return Ok(());
        };
        // Cache what the amplifier will report back, so the next poll matches
        let vol = volume::to_db(self.state.layout.volume_bar(row).percent_at(x));
        let percent = volume::to_percent(vol);
        self.state.zones[slot.index()]
            .get_or_insert_with(ZoneState::default)
            .volume_percent = percent;
        self.state.dirty.set(Region::volume(slot));
        render(&mut self.state, canvas)?;

        let result = self.api.set_volume(zone, vol).await;
        self.state.observe("volume", &result);
        Ok(())
    }

    async fn send_command<C: Canvas>(&mut self, command: StreamCommand, canvas: &mut C) -> Result<(), C::Error> {
        let Some(stream) = self.state.source.input.and_then(|input| input.stream_id()) else {
            return Ok(());
        };
        let source = &mut self.state.source;
        match command {
            StreamCommand::PlayPause => source.playing = !source.playing,
            StreamCommand::Love => source.liked = !source.liked,
            StreamCommand::Ban => source.disliked = !source.disliked,
            StreamCommand::Next => {}
        }
        self.state.dirty.set(Region::CommandButtons);
        render(&mut self.state, canvas)?;

        let result = self.api.command(stream, command).await;
        self.state.observe("command", &result);
        Ok(())
    }

    async fn select_source(&mut self, row: usize) {
        let page = self.state.layout.picker_page_size();
        let Some(entry) = self.state.picker.visible(page).get(row).cloned() else {
            return;
        };
        info!("Selecting {} for source {}", entry.name, self.state.source_id());
        let result = self.api.set_input(self.state.source_id(), entry.input).await;
        self.state.observe("select source", &result);
        transition_to(&mut self.state, Screen::Select);
    }

    fn save_settings(&mut self) {
        let previous = self.state.config.clone();
        self.state.config.apply(&self.state.draft);
        if let Err(err) = config::save(&mut self.store, &self.state.config) {
            warn!("Failed to save settings: {err}");
            self.state.latch_warning(Warning::SaveFailed);
        }
        if previous.zone1 != self.state.config.zone1 {
            self.state.zones[ZoneSlot::First.index()] = None;
        }
        if previous.zone2 != self.state.config.zone2 {
            self.state.zones[ZoneSlot::Second.index()] = None;
        }
        if previous.source != self.state.config.source {
            self.state.source = SourceState::default();
        }
        self.reconciler.expedite();
        transition_to(&mut self.state, Screen::Select);
    }

    fn forget_calibration(&mut self) {
        if let Err(err) = self.store.remove(StoredFile::Calibration) {
            warn!("Failed to remove calibration: {err}");
        }
    }

    async fn update<C: Canvas>(&mut self, canvas: &mut C) -> Result<Flow, C::Error> {
        self.state.ota = OtaStatus::Running;
        self.state.dirty.set(Region::PageBody);
        render(&mut self.state, canvas)?;

        let path = self.settings.firmware_path;
        match ota::run_update(self.api.transport_mut(), &mut self.updater, path).await {
            Ok(len) => {
                info!("Update of {len} bytes complete, restarting");
                self.state.ota = OtaStatus::Idle;
                Ok(Flow::Restart)
            }
            Err(err) => {
                warn!("Update failed: {err}");
                self.state.ota = OtaStatus::Failed(err);
                self.state.latch_warning(Warning::UpdateFailed(err));
                self.state.dirty.set(Region::PageBody);
                Ok(Flow::Continue)
            }
        }
    }
}

/// Text for the about screen body
pub fn about_lines(state: &ControllerState) -> [String; 3] {
    let status = match state.ota {
        OtaStatus::Idle => String::from("Tap Update to install new firmware"),
        OtaStatus::Running => String::from("Updating..."),
        OtaStatus::Failed(err) => alloc::format!("Update failed: {err}"),
    };
    [
        alloc::format!("Version {}", crate::state::VERSION),
        alloc::format!("Host {}", state.config.host),
        status,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Method, TransportError};
    use crate::config::{Config, SettingField};
    use crate::layout::Layout;
    use crate::ota::OtaError;
    use crate::testing::{FakeFlash, FakeTransport, MemoryStore, RecordingCanvas, Reply, ScriptedTouch};
    use embassy_futures::block_on;

    type TestPanel = Panel<FakeTransport, MemoryStore, FakeFlash>;

    fn panel() -> TestPanel {
        let mut transport = FakeTransport::default();
        transport.respond(Method::Get, "/api/zones/0", 200, br#"{"mute":false,"vol":-39}"#);
        transport.respond(
            Method::Get,
            "/api/sources/0",
            200,
            br#"{"input":"stream=42","status":"playing","info":{"artist":"A","track":"T","img_url":""}}"#,
        );
        transport.respond(Method::Get, "/api/streams/42", 200, br#"{"name":"Pandora","type":"pandora"}"#);
        transport.respond(
            Method::Get,
            "/api/streams",
            200,
            br#"{"streams":[{"id":42,"name":"Pandora"},{"id":43,"name":"KEXP"}]}"#,
        );
        let state = ControllerState::new(Config::default(), Layout::SMALL);
        Panel::new(state, transport, MemoryStore::default(), FakeFlash::new(1 << 20), PanelSettings::default())
    }

    /// Boot tick: cold draw plus the first poll
    fn booted() -> (TestPanel, RecordingCanvas) {
        let mut panel = panel();
        let mut canvas = RecordingCanvas::default();
        block_on(panel.tick(0, &mut ScriptedTouch::default(), &mut canvas)).unwrap();
        panel.transport_mut().sent.clear();
        canvas.reset();
        (panel, canvas)
    }

    fn tap(panel: &mut TestPanel, canvas: &mut RecordingCanvas, now: u64, x: i32, y: i32) -> TickReport {
        let mut touch = ScriptedTouch::at(x, y);
        block_on(panel.tick(now, &mut touch, canvas)).unwrap()
    }

    #[test]
    fn test_boot_draws_then_polls() {
        let mut panel = panel();
        let mut canvas = RecordingCanvas::default();
        let report = block_on(panel.tick(0, &mut ScriptedTouch::default(), &mut canvas)).unwrap();
        assert!(report.polled);
        assert_eq!(canvas.clears, 1);
        assert_eq!(panel.state().source.stream_name, "Pandora");
        assert!(canvas.drawn.contains(&Region::Source));
    }

    #[test]
    fn test_debounce_dispatches_once() {
        let (mut panel, mut canvas) = booted();
        let first = tap(&mut panel, &mut canvas, 100, 10, 300);
        let second = tap(&mut panel, &mut canvas, 150, 10, 300);
        assert_eq!(first.action, Some(Action::ToggleMute(ZoneSlot::First)));
        assert_eq!(second.action, None);
        assert_eq!(panel.transport_mut().count(Method::Patch, "/api/zones/0"), 1);
    }

    #[test]
    fn test_miss_does_not_debounce() {
        let (mut panel, mut canvas) = booted();
        // Metadata text has no hit region
        let miss = tap(&mut panel, &mut canvas, 100, 120, 200);
        assert_eq!(miss.action, None);
        let hit = tap(&mut panel, &mut canvas, 150, 10, 300);
        assert_eq!(hit.action, Some(Action::ToggleMute(ZoneSlot::First)));
    }

    #[test]
    fn test_mute_is_optimistic() {
        let (mut panel, mut canvas) = booted();
        panel.transport_mut().fail(Method::Patch, "/api/zones/0", TransportError::Timeout);
        tap(&mut panel, &mut canvas, 100, 10, 300);
        assert!(panel.state().zone(ZoneSlot::First).muted);
        assert_eq!(canvas.drawn.first(), Some(&Region::Mute1));
        assert_eq!(panel.state().warning, Some(Warning::Unreachable));
        let sent = &panel.transport_mut().sent[0];
        assert_eq!(sent.body.as_deref(), Some(r#"{"mute":true}"#));
    }

    #[test]
    fn test_volume_tap_writes_db() {
        let (mut panel, mut canvas) = booted();
        tap(&mut panel, &mut canvas, 100, 120, 300);
        assert_eq!(panel.state().zone(ZoneSlot::First).volume_percent, volume::to_percent(-39));
        let sent = &panel.transport_mut().sent[0];
        assert_eq!(sent.path, "/api/zones/0");
        assert_eq!(sent.body.as_deref(), Some(r#"{"vol":-39}"#));
        assert_eq!(canvas.drawn, vec![Region::Vol1]);
    }

    #[test]
    fn test_confirming_poll_redraws_nothing() {
        let mut panel = panel();
        panel.transport_mut().respond(Method::Get, "/api/zones/0", 200, br#"{"mute":false,"vol":-79}"#);
        let mut canvas = RecordingCanvas::default();
        block_on(panel.tick(0, &mut ScriptedTouch::default(), &mut canvas)).unwrap();
        panel.transport_mut().sent.clear();

        tap(&mut panel, &mut canvas, 100, 120, 300);
        assert_eq!(panel.transport_mut().sent[0].body.as_deref(), Some(r#"{"vol":-39}"#));
        panel.transport_mut().respond(Method::Get, "/api/zones/0", 200, br#"{"mute":false,"vol":-39}"#);
        canvas.reset();

        let report = block_on(panel.tick(2_100, &mut ScriptedTouch::default(), &mut canvas)).unwrap();
        assert!(report.polled);
        assert!(canvas.drawn.is_empty(), "{:?}", canvas.drawn);
    }

    #[test]
    fn test_second_zone_patches_its_own_id() {
        let mut panel = panel();
        panel.state_mut().config.zone2 = 2;
        panel.transport_mut().respond(Method::Get, "/api/zones/2", 200, br#"{"mute":false,"vol":-79}"#);
        let mut canvas = RecordingCanvas::default();
        block_on(panel.tick(0, &mut ScriptedTouch::default(), &mut canvas)).unwrap();
        panel.transport_mut().sent.clear();

        tap(&mut panel, &mut canvas, 100, 230, 300);
        assert_eq!(panel.transport_mut().count(Method::Patch, "/api/zones/2"), 1);
        assert_eq!(panel.transport_mut().count(Method::Patch, "/api/zones/0"), 0);
        assert_eq!(panel.state().zone(ZoneSlot::Second).volume_percent, 100.0);
    }

    #[test]
    fn test_play_pause_command() {
        let (mut panel, mut canvas) = booted();
        assert!(panel.state().source.playing);
        let report = tap(&mut panel, &mut canvas, 100, 230, 70);
        assert_eq!(report.action, Some(Action::Command(StreamCommand::PlayPause)));
        assert!(!panel.state().source.playing);
        assert_eq!(panel.transport_mut().count(Method::Post, "/api/streams/42/playpause"), 1);
    }

    #[test]
    fn test_source_picker_flow() {
        let (mut panel, mut canvas) = booted();
        tap(&mut panel, &mut canvas, 100, 230, 10);
        assert_eq!(panel.state().screen, Screen::SourcePicker);
        assert!(!panel.state().polling);
        let names: Vec<_> = panel.state().picker.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Source Off", "Local - RCA", "Pandora", "KEXP"]);

        // Polling is suspended while picking
        let report = block_on(panel.tick(5_000, &mut ScriptedTouch::default(), &mut canvas)).unwrap();
        assert!(!report.polled);

        // Fourth row is KEXP
        tap(&mut panel, &mut canvas, 6_000, 120, 36 + 42 * 3 + 5);
        assert_eq!(panel.state().screen, Screen::Select);
        let patch = panel
            .transport_mut()
            .sent
            .iter()
            .find(|s| s.method == Method::Patch)
            .cloned()
            .unwrap();
        assert_eq!(patch.path, "/api/sources/0");
        assert_eq!(patch.body.as_deref(), Some(r#"{"input":"stream=43"}"#));
    }

    #[test]
    fn test_picker_survives_stream_list_failure() {
        let (mut panel, mut canvas) = booted();
        panel.transport_mut().reply(Method::Get, "/api/streams", Reply::Fail(TransportError::Connect));
        tap(&mut panel, &mut canvas, 100, 230, 10);
        assert_eq!(panel.state().picker.entries.len(), 2);
        assert_eq!(panel.state().warning, Some(Warning::Unreachable));
    }

    #[test]
    fn test_settings_save_persists() {
        let (mut panel, mut canvas) = booted();
        panel.state_mut().source.liked = true;
        transition_to(panel.state_mut(), Screen::Settings);
        // Zone 2 "+" enables the second zone, then Save
        let layout = Layout::SMALL;
        let inc = layout.settings_increment(1);
        tap(&mut panel, &mut canvas, 100, inc.x + 5, inc.y + 5);
        assert_eq!(panel.state().draft.get(SettingField::Zone2), 0);
        assert_eq!(panel.state().config.zone2, -1);
        assert_eq!(canvas.drawn.last(), Some(&Region::PageBody));

        tap(&mut panel, &mut canvas, 400, 10, 300);
        assert_eq!(panel.state().screen, Screen::Select);
        assert_eq!(panel.state().config.zone2, 0);
        assert_eq!(config::load(panel.store_mut()).unwrap().zone2, 0);
    }

    #[test]
    fn test_settings_cancel_discards() {
        let (mut panel, mut canvas) = booted();
        transition_to(panel.state_mut(), Screen::Settings);
        let dec = Layout::SMALL.settings_decrement(2);
        panel.state_mut().draft.source = 3;
        tap(&mut panel, &mut canvas, 100, dec.x + 5, dec.y + 5);
        assert_eq!(panel.state().draft.source, 2);
        tap(&mut panel, &mut canvas, 400, 230, 300);
        assert_eq!(panel.state().screen, Screen::Select);
        assert_eq!(panel.state().config.source, 0);
        assert!(panel.store_mut().files.get(&StoredFile::Config).is_none());
    }

    #[test]
    fn test_rotate_restarts_without_calibration() {
        let (mut panel, mut canvas) = booted();
        panel.store_mut().files.insert(StoredFile::Calibration, vec![1; 8]);
        transition_to(panel.state_mut(), Screen::Settings);
        let rotate = Layout::SMALL.settings_action(2);
        let report = tap(&mut panel, &mut canvas, 100, 120, rotate.y + 5);
        assert_eq!(report.flow, Flow::Restart);
        assert!(!panel.store_mut().files.contains_key(&StoredFile::Calibration));
        assert_eq!(config::load(panel.store_mut()).unwrap().screen_rotation, 2);
    }

    #[test]
    fn test_power_off_and_wake() {
        let (mut panel, mut canvas) = booted();
        tap(&mut panel, &mut canvas, 100, 5, 5);
        assert_eq!(panel.state().screen, Screen::PoweredOff);
        assert_eq!(canvas.backlight, Some(false));
        let report = block_on(panel.tick(10_000, &mut ScriptedTouch::default(), &mut canvas)).unwrap();
        assert!(!report.polled);

        tap(&mut panel, &mut canvas, 10_100, 120, 160);
        assert_eq!(panel.state().screen, Screen::Select);
        assert_eq!(canvas.backlight, Some(true));
    }

    #[test]
    fn test_update_success_restarts() {
        let (mut panel, mut canvas) = booted();
        panel.transport_mut().reply(
            Method::Get,
            DEFAULT_FIRMWARE_PATH,
            Reply::body(200, "application/octet-stream", vec![7; 2048]),
        );
        transition_to(panel.state_mut(), Screen::About);
        let report = tap(&mut panel, &mut canvas, 100, 230, 300);
        assert_eq!(report.action, Some(Action::StartUpdate));
        assert_eq!(report.flow, Flow::Restart);
    }

    #[test]
    fn test_update_failure_stays_on_about() {
        let (mut panel, mut canvas) = booted();
        panel.transport_mut().reply(
            Method::Get,
            DEFAULT_FIRMWARE_PATH,
            Reply::body(200, "text/html", b"<html>".to_vec()),
        );
        transition_to(panel.state_mut(), Screen::About);
        let report = tap(&mut panel, &mut canvas, 100, 230, 300);
        assert_eq!(report.flow, Flow::Continue);
        assert_eq!(panel.state().screen, Screen::About);
        assert_eq!(panel.state().ota, OtaStatus::Failed(OtaError::ContentType));
        assert_eq!(panel.state().warning, Some(Warning::UpdateFailed(OtaError::ContentType)));
        assert!(about_lines(panel.state())[2].starts_with("Update failed"));
    }

    #[test]
    fn test_metadata_round_trip() {
        let (mut panel, mut canvas) = booted();
        tap(&mut panel, &mut canvas, 100, 120, 100);
        assert_eq!(panel.state().screen, Screen::Metadata);
        assert!(panel.state().polling);
        tap(&mut panel, &mut canvas, 400, 10, 10);
        assert_eq!(panel.state().screen, Screen::Select);
    }
}
