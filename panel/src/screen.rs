//! Screen state machine and per-screen hit tables
//!
//! Every screen is described by a table of `{rect -> action}` entries built by
//! [`hit_table`]. Touch handling is a linear lookup in that table; the only
//! branching is in how the table is parameterized (zone count, command
//! buttons, picker paging).

use heapless::Vec;
use log::info;

use crate::config::{SettingField, SettingsDraft};
use crate::dirty::{DirtyFlags, Region, ZoneSlot};
use crate::layout::{BarRow, Layout, Point, Rect};
use crate::state::ControllerState;
use crate::stream::StreamCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    /// Now playing with volume controls
    #[default]
    Select,
    /// Full-screen album art
    Metadata,
    /// Paged list of inputs
    SourcePicker,
    Settings,
    About,
    /// Backlight off, waiting for a touch
    PoweredOff,
}

impl Screen {
    pub const ALL: [Screen; 6] = [
        Screen::Select,
        Screen::Metadata,
        Screen::SourcePicker,
        Screen::Settings,
        Screen::About,
        Screen::PoweredOff,
    ];

    /// Live screens show remote state and keep polling
    pub fn is_live(self) -> bool {
        matches!(self, Screen::Select | Screen::Metadata)
    }

    /// Regions drawn on this screen, in paint order
    pub fn regions(self, zone_count: usize) -> Vec<Region, 10> {
        let mut regions = Vec::new();
        let list: &[Region] = match self {
            Screen::Select => &[
                Region::Source,
                Region::AlbumArt,
                Region::MetadataText,
                Region::CommandButtons,
                Region::Warning,
                Region::Mute1,
                Region::Vol1,
            ],
            Screen::Metadata => &[Region::AlbumArt],
            Screen::SourcePicker | Screen::Settings => &[Region::Source, Region::PageBody],
            Screen::About => &[Region::Source, Region::PageBody, Region::Warning],
            Screen::PoweredOff => &[],
        };
        let _ = regions.extend_from_slice(list);
        if self == Screen::Select && zone_count > 1 {
            let _ = regions.extend_from_slice(&[Region::Mute2, Region::Vol2]);
        }
        regions
    }
}

/// Logical result of touching a hit region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    PowerOff,
    WakeUp,
    OpenSourcePicker,
    OpenMetadata,
    /// Back to the now-playing screen without side effects
    Back,
    ToggleMute(ZoneSlot),
    SetVolume(ZoneSlot),
    Command(StreamCommand),
    /// Row index on the visible picker page
    SelectSource(usize),
    PrevPage,
    NextPage,
    OpenSettings,
    Adjust(SettingField, i8),
    SaveSettings,
    OpenAbout,
    Reboot,
    Recalibrate,
    Rotate,
    StartUpdate,
}

/// Where an action leaves the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Screen(Screen),
    /// Hard reset after the action
    Restart,
    /// OTA flow: restart on success, stay on About on failure
    Update,
}

impl Action {
    pub fn destination(self) -> Destination {
        let screen = match self {
            Action::PowerOff => Screen::PoweredOff,
            Action::WakeUp
            | Action::Back
            | Action::SaveSettings
            | Action::SelectSource(_)
            | Action::ToggleMute(_)
            | Action::SetVolume(_)
            | Action::Command(_) => Screen::Select,
            Action::OpenMetadata => Screen::Metadata,
            Action::OpenSourcePicker | Action::PrevPage | Action::NextPage => Screen::SourcePicker,
            Action::OpenSettings | Action::Adjust(..) => Screen::Settings,
            Action::OpenAbout => Screen::About,
            Action::Reboot | Action::Recalibrate | Action::Rotate => return Destination::Restart,
            Action::StartUpdate => return Destination::Update,
        };
        Destination::Screen(screen)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitRegion {
    pub rect: Rect,
    pub action: Action,
}

pub type HitTable = Vec<HitRegion, 24>;

/// Parameters that change a screen's table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableContext {
    pub zone_count: usize,
    pub commands: bool,
    pub picker_rows: usize,
    pub show_prev: bool,
    pub show_next: bool,
}

impl TableContext {
    pub fn from_state(state: &ControllerState) -> Self {
        let page = state.layout.picker_page_size();
        Self {
            zone_count: state.zone_count(),
            commands: state.source.commands_enabled(),
            picker_rows: state.picker.visible(page).len(),
            show_prev: state.picker.has_prev(),
            show_next: state.picker.has_next(page),
        }
    }
}

/// Mute/volume row used by each zone slot
pub fn bar_rows(zone_count: usize) -> &'static [(ZoneSlot, BarRow)] {
    if zone_count > 1 {
        &[(ZoneSlot::First, BarRow::Upper), (ZoneSlot::Second, BarRow::Lower)]
    } else {
        &[(ZoneSlot::First, BarRow::Lower)]
    }
}

pub fn bar_row(slot: ZoneSlot, zone_count: usize) -> Option<BarRow> {
    bar_rows(zone_count).iter().find(|(s, _)| *s == slot).map(|(_, row)| *row)
}

pub fn hit_table(screen: Screen, ctx: &TableContext, layout: &Layout) -> HitTable {
    let mut table = HitTable::new();
    let mut add = |rect: Rect, action: Action| {
        let _ = table.push(HitRegion { rect, action });
    };

    match screen {
        Screen::Select => {
            add(layout.power_button(), Action::PowerOff);
            add(layout.source_button(), Action::OpenSourcePicker);
            add(layout.album_art(), Action::OpenMetadata);
            if ctx.commands {
                add(layout.play_pause_button(), Action::Command(StreamCommand::PlayPause));
                add(layout.skip_button(), Action::Command(StreamCommand::Next));
                add(layout.like_button(), Action::Command(StreamCommand::Love));
                add(layout.dislike_button(), Action::Command(StreamCommand::Ban));
            }
            for &(slot, row) in bar_rows(ctx.zone_count) {
                add(layout.mute_button(row), Action::ToggleMute(slot));
                add(layout.volume_zone(row), Action::SetVolume(slot));
            }
        }
        Screen::Metadata => add(layout.full_screen(), Action::Back),
        Screen::SourcePicker => {
            add(layout.power_button(), Action::PowerOff);
            add(layout.source_button(), Action::Back);
            for i in 0..ctx.picker_rows {
                add(layout.picker_row_hit(i), Action::SelectSource(i));
            }
            if ctx.show_prev {
                add(layout.left_button(), Action::PrevPage);
            }
            add(layout.center_button(), Action::OpenSettings);
            if ctx.show_next {
                add(layout.right_button(), Action::NextPage);
            }
        }
        Screen::Settings => {
            for (i, field) in SettingField::ALL.into_iter().enumerate() {
                add(layout.settings_decrement(i), Action::Adjust(field, -1));
                add(layout.settings_increment(i), Action::Adjust(field, 1));
            }
            add(layout.settings_action(0), Action::Reboot);
            add(layout.settings_action(1), Action::Recalibrate);
            add(layout.settings_action(2), Action::Rotate);
            add(layout.left_button(), Action::SaveSettings);
            add(layout.center_button(), Action::OpenAbout);
            add(layout.right_button(), Action::Back);
        }
        Screen::About => {
            add(layout.left_button(), Action::Back);
            add(layout.right_button(), Action::StartUpdate);
        }
        Screen::PoweredOff => add(layout.full_screen(), Action::WakeUp),
    }
    table
}

/// First region containing the point
pub fn lookup(table: &HitTable, point: Point) -> Option<Action> {
    table.iter().find(|r| r.rect.contains(point)).map(|r| r.action)
}

/// Switch screens and schedule a full redraw
pub fn transition_to(state: &mut ControllerState, next: Screen) {
    let previous = state.screen;
    if previous == Screen::SourcePicker && next != Screen::SourcePicker {
        state.picker.offset = 0;
    }
    if next == Screen::Settings && previous != Screen::Settings {
        state.draft = SettingsDraft::from_config(&state.config);
    }
    state.screen = next;
    state.polling = next.is_live();
    state.backlight = next != Screen::PoweredOff;
    state.cold_draw = true;
    state.dirty = DirtyFlags::all();
    info!("Screen {:?} -> {:?}", previous, next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn contexts() -> impl Iterator<Item = TableContext> {
        [1usize, 2].into_iter().flat_map(|zone_count| {
            [false, true].into_iter().flat_map(move |flag| {
                (0..=9).map(move |rows| TableContext {
                    zone_count,
                    commands: flag,
                    picker_rows: rows,
                    show_prev: flag,
                    show_next: !flag,
                })
            })
        })
    }

    #[test]
    fn test_regions_never_overlap() {
        for layout in [Layout::SMALL, Layout::LARGE] {
            for ctx in contexts() {
                let ctx = TableContext {
                    picker_rows: ctx.picker_rows.min(layout.picker_page_size()),
                    ..ctx
                };
                for screen in Screen::ALL {
                    let table = hit_table(screen, &ctx, &layout);
                    for (i, a) in table.iter().enumerate() {
                        assert!(a.rect.w > 0 && a.rect.h > 0, "{screen:?} {a:?}");
                        for b in table.iter().skip(i + 1) {
                            assert!(!a.rect.intersects(&b.rect), "{screen:?}: {a:?} overlaps {b:?}");
                        }
                    }
                }
            }
        }
    }

    /// Edges of the state diagram leaving each screen
    fn edges(from: Screen) -> &'static [Destination] {
        use Destination::{Restart, Update};
        match from {
            Screen::Select => &[
                Destination::Screen(Screen::Select),
                Destination::Screen(Screen::SourcePicker),
                Destination::Screen(Screen::Metadata),
                Destination::Screen(Screen::PoweredOff),
            ],
            Screen::Metadata => &[Destination::Screen(Screen::Select)],
            Screen::SourcePicker => &[
                Destination::Screen(Screen::Select),
                Destination::Screen(Screen::SourcePicker),
                Destination::Screen(Screen::Settings),
                Destination::Screen(Screen::PoweredOff),
            ],
            Screen::Settings => &[
                Destination::Screen(Screen::Select),
                Destination::Screen(Screen::Settings),
                Destination::Screen(Screen::About),
                Restart,
            ],
            Screen::About => &[Destination::Screen(Screen::Select), Update],
            Screen::PoweredOff => &[Destination::Screen(Screen::Select)],
        }
    }

    #[test]
    fn test_transitions_are_total() {
        for layout in [Layout::SMALL, Layout::LARGE] {
            for ctx in contexts() {
                for screen in Screen::ALL {
                    let table = hit_table(screen, &ctx, &layout);
                    assert!(!table.is_empty(), "{screen:?} has no way out");
                    for region in table {
                        let dest = region.action.destination();
                        assert!(
                            edges(screen).contains(&dest),
                            "{screen:?} -> {dest:?} via {:?}",
                            region.action
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_select_table_follows_zone_count() {
        let layout = Layout::SMALL;
        let one = TableContext { zone_count: 1, ..Default::default() };
        let table = hit_table(Screen::Select, &one, &layout);
        let lower = Point::new(100, layout.height - 20);
        let upper = Point::new(100, layout.height - 60);
        assert_eq!(lookup(&table, lower), Some(Action::SetVolume(ZoneSlot::First)));
        assert_eq!(lookup(&table, upper), None);

        let two = TableContext { zone_count: 2, ..Default::default() };
        let table = hit_table(Screen::Select, &two, &layout);
        assert_eq!(lookup(&table, upper), Some(Action::SetVolume(ZoneSlot::First)));
        assert_eq!(lookup(&table, lower), Some(Action::SetVolume(ZoneSlot::Second)));
        assert_eq!(
            lookup(&table, Point::new(10, layout.height - 60)),
            Some(Action::ToggleMute(ZoneSlot::First))
        );
    }

    #[test]
    fn test_command_buttons_only_when_enabled() {
        let layout = Layout::SMALL;
        let play = Point::new(layout.width - 10, 70);
        let off = TableContext { zone_count: 1, ..Default::default() };
        assert_eq!(lookup(&hit_table(Screen::Select, &off, &layout), play), None);
        let on = TableContext { commands: true, ..off };
        assert_eq!(
            lookup(&hit_table(Screen::Select, &on, &layout), play),
            Some(Action::Command(StreamCommand::PlayPause))
        );
    }

    #[test]
    fn test_picker_paging_buttons() {
        let layout = Layout::SMALL;
        let ctx = TableContext { zone_count: 1, picker_rows: 6, show_prev: false, show_next: true, commands: false };
        let table = hit_table(Screen::SourcePicker, &ctx, &layout);
        assert_eq!(lookup(&table, Point::new(10, 300)), None);
        assert_eq!(lookup(&table, Point::new(230, 300)), Some(Action::NextPage));
        assert_eq!(lookup(&table, Point::new(120, 300)), Some(Action::OpenSettings));
        assert_eq!(lookup(&table, Point::new(120, 40)), Some(Action::SelectSource(0)));
        assert_eq!(lookup(&table, Point::new(120, 250)), Some(Action::SelectSource(5)));
        assert_eq!(lookup(&table, Point::new(220, 10)), Some(Action::Back));
    }

    #[test]
    fn test_powered_off_wakes_anywhere() {
        let layout = Layout::SMALL;
        let table = hit_table(Screen::PoweredOff, &TableContext::default(), &layout);
        for p in [Point::new(0, 0), Point::new(239, 319), Point::new(120, 160)] {
            assert_eq!(lookup(&table, p), Some(Action::WakeUp));
        }
    }

    #[test]
    fn test_transition_forces_cold_draw() {
        let mut state = ControllerState::new(Config::default(), Layout::SMALL);
        state.dirty = DirtyFlags::empty();
        state.cold_draw = false;
        state.picker.offset = 6;

        transition_to(&mut state, Screen::SourcePicker);
        assert!(!state.polling);
        assert!(state.cold_draw);
        assert_eq!(state.dirty, DirtyFlags::all());
        assert_eq!(state.picker.offset, 6);

        transition_to(&mut state, Screen::PoweredOff);
        assert_eq!(state.picker.offset, 0);
        assert!(!state.backlight);

        transition_to(&mut state, Screen::Select);
        assert!(state.polling);
        assert!(state.backlight);
    }

    #[test]
    fn test_settings_entry_loads_draft() {
        let mut state = ControllerState::new(Config::default(), Layout::SMALL);
        state.config.zone1 = 2;
        transition_to(&mut state, Screen::Settings);
        assert_eq!(state.draft.zone1, 2);
    }
}
