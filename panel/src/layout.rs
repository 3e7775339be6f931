//! Screen geometry
//!
//! All rectangles are half-open: `[x, x + w) x [y, y + h)`. Positions are
//! derived from the panel size so the same tables serve the 240x320 and
//! 320x480 panels.

/// A point in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Shrink the height so the rect ends at `limit`
    fn clip_bottom(self, limit: i32) -> Self {
        let h = self.h.min(limit - self.y).max(0);
        Self { h, ..self }
    }
}

/// Which of the two mute/volume rows a zone occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarRow {
    Upper,
    Lower,
}

/// Horizontal volume bar with its knob travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeBar {
    pub track: Rect,
}

impl VolumeBar {
    /// Touches this close to the right end snap to full volume
    const SNAP: i32 = 10;

    /// Knob centre for a percentage, clamped to the bar
    pub fn knob_x(&self, percent: f32) -> i32 {
        let percent = percent.clamp(0.0, 100.0);
        let offset = (percent * self.track.w as f32 / 100.0 + 0.5) as i32;
        (self.track.x + offset).clamp(self.track.x, self.track.right())
    }

    /// Percentage selected by a touch at `x`
    pub fn percent_at(&self, x: i32) -> f32 {
        if x >= self.track.right() - Self::SNAP {
            return 100.0;
        }
        let offset = (x - self.track.x).clamp(0, self.track.w);
        offset as f32 * 100.0 / self.track.w as f32
    }
}

/// Geometry for one panel size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: i32,
    pub height: i32,
}

const BAR_HEIGHT: i32 = 36;
const BUTTON_HEIGHT: i32 = 38;
const ICON: i32 = 36;
const PICKER_TOP: i32 = 36;
const PICKER_PITCH: i32 = 42;
const PICKER_ROW_HEIGHT: i32 = 38;
const SETTINGS_TOP: i32 = 40;
const SETTINGS_ACTIONS_TOP: i32 = 170;
const SETTINGS_ROW: i32 = 40;

impl Layout {
    pub const SMALL: Layout = Layout::new(240, 320);
    pub const LARGE: Layout = Layout::new(320, 480);

    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    fn is_small(&self) -> bool {
        self.width <= 240
    }

    pub fn full_screen(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Rows per source-picker page
    pub fn picker_page_size(&self) -> usize {
        if self.is_small() { 6 } else { 9 }
    }

    /// Characters of stream name shown in the source bar
    pub fn name_budget(&self) -> usize {
        if self.is_small() { 16 } else { 25 }
    }

    /// Characters of artist or track shown below the album art
    pub fn title_budget(&self) -> usize {
        if self.is_small() { 18 } else { 25 }
    }

    pub fn source_bar(&self) -> Rect {
        Rect::new(0, 0, self.width, BAR_HEIGHT)
    }

    pub fn power_button(&self) -> Rect {
        Rect::new(0, 0, ICON, BAR_HEIGHT)
    }

    pub fn source_button(&self) -> Rect {
        Rect::new(self.width - 40, 0, 40, BAR_HEIGHT)
    }

    pub fn main_area(&self) -> Rect {
        Rect::new(0, BAR_HEIGHT, self.width, self.height - BAR_HEIGHT)
    }

    /// Edge length of the square album art
    pub fn art_size(&self) -> i32 {
        self.width - 120
    }

    pub fn album_art(&self) -> Rect {
        let size = self.art_size();
        Rect::new(60, BAR_HEIGHT, size, size)
    }

    pub fn play_pause_button(&self) -> Rect {
        Rect::new(self.width - ICON, 64, ICON, ICON)
    }

    pub fn skip_button(&self) -> Rect {
        Rect::new(self.width - ICON, 118, ICON, ICON)
    }

    pub fn like_button(&self) -> Rect {
        Rect::new(0, 64, ICON, ICON)
    }

    pub fn dislike_button(&self) -> Rect {
        Rect::new(0, 118, ICON, ICON)
    }

    /// Artist, track and album lines, ending where the warning banner starts
    pub fn metadata_text(&self) -> Rect {
        let y = self.album_art().bottom() + 10;
        Rect::new(0, y, self.width, self.warning().y - y)
    }

    pub fn warning(&self) -> Rect {
        Rect::new(0, self.height - 87, self.width, 14)
    }

    fn bar_row_y(&self, row: BarRow) -> i32 {
        match row {
            BarRow::Upper => self.height - 73,
            BarRow::Lower => self.height - ICON,
        }
    }

    pub fn mute_button(&self, row: BarRow) -> Rect {
        Rect::new(0, self.bar_row_y(row), ICON, ICON)
    }

    /// Touch area of a volume bar, everything right of the mute button
    pub fn volume_zone(&self, row: BarRow) -> Rect {
        Rect::new(ICON, self.bar_row_y(row), self.width - ICON, ICON)
    }

    pub fn volume_bar(&self, row: BarRow) -> VolumeBar {
        VolumeBar {
            track: Rect::new(45, self.bar_row_y(row) + 13, self.width - 90, 6),
        }
    }

    pub fn left_button(&self) -> Rect {
        Rect::new(0, self.height - BUTTON_HEIGHT, 100, BUTTON_HEIGHT)
    }

    pub fn center_button(&self) -> Rect {
        Rect::new(self.width / 2 - 19, self.height - BUTTON_HEIGHT, 38, BUTTON_HEIGHT)
    }

    pub fn right_button(&self) -> Rect {
        Rect::new(self.width - 100, self.height - BUTTON_HEIGHT, 100, BUTTON_HEIGHT)
    }

    /// Bottom of the content area above the button row
    pub fn content_bottom(&self) -> i32 {
        self.height - BUTTON_HEIGHT
    }

    /// Drawn box of a picker row
    pub fn picker_row(&self, index: usize) -> Rect {
        let y = PICKER_TOP + PICKER_PITCH * index as i32;
        Rect::new(0, y, self.width, PICKER_ROW_HEIGHT)
    }

    /// Touch area of a picker row, including the gap below it
    pub fn picker_row_hit(&self, index: usize) -> Rect {
        let y = PICKER_TOP + PICKER_PITCH * index as i32;
        Rect::new(0, y, self.width, PICKER_PITCH).clip_bottom(self.content_bottom())
    }

    /// Label area of a settings value row
    pub fn settings_row(&self, index: usize) -> Rect {
        let y = SETTINGS_TOP + SETTINGS_ROW * index as i32;
        Rect::new(0, y, self.width - 80, SETTINGS_ROW)
    }

    pub fn settings_decrement(&self, index: usize) -> Rect {
        let row = self.settings_row(index);
        Rect::new(self.width - 80, row.y, 40, SETTINGS_ROW)
    }

    pub fn settings_increment(&self, index: usize) -> Rect {
        let row = self.settings_row(index);
        Rect::new(self.width - 40, row.y, 40, SETTINGS_ROW)
    }

    /// Full-width action rows below the values (reboot, recalibrate, rotate)
    pub fn settings_action(&self, index: usize) -> Rect {
        let y = SETTINGS_ACTIONS_TOP + SETTINGS_ROW * index as i32;
        Rect::new(0, y, self.width, SETTINGS_ROW).clip_bottom(self.content_bottom())
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::SMALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_open_contains() {
        let r = Rect::new(10, 20, 5, 5);
        assert!(r.contains(Point::new(10, 20)));
        assert!(r.contains(Point::new(14, 24)));
        assert!(!r.contains(Point::new(15, 24)));
        assert!(!r.contains(Point::new(14, 25)));
        assert!(!r.contains(Point::new(9, 20)));
    }

    #[test]
    fn test_small_panel_constants() {
        let l = Layout::SMALL;
        assert_eq!(l.album_art(), Rect::new(60, 36, 120, 120));
        assert_eq!(l.metadata_text(), Rect::new(0, 166, 240, 67));
        assert_eq!(l.warning(), Rect::new(0, 233, 240, 14));
        assert_eq!(l.mute_button(BarRow::Upper), Rect::new(0, 247, 36, 36));
        assert_eq!(l.mute_button(BarRow::Lower), Rect::new(0, 284, 36, 36));
        assert_eq!(l.center_button(), Rect::new(101, 282, 38, 38));
        assert_eq!(l.picker_page_size(), 6);
    }

    /// Everything the now-playing screen paints, for one or two zones
    fn select_painted(l: &Layout, two_zones: bool) -> Vec<Rect> {
        let mut rects = vec![
            l.source_bar(),
            l.album_art(),
            l.metadata_text(),
            l.play_pause_button(),
            l.skip_button(),
            l.like_button(),
            l.dislike_button(),
            l.warning(),
            l.mute_button(BarRow::Lower),
            l.volume_zone(BarRow::Lower),
        ];
        if two_zones {
            rects.push(l.mute_button(BarRow::Upper));
            rects.push(l.volume_zone(BarRow::Upper));
        }
        rects
    }

    #[test]
    fn test_select_painted_areas_are_disjoint() {
        for layout in [Layout::SMALL, Layout::LARGE] {
            for two_zones in [false, true] {
                let rects = select_painted(&layout, two_zones);
                for (i, a) in rects.iter().enumerate() {
                    assert!(a.w > 0 && a.h > 0, "{layout:?}: empty {a:?}");
                    for b in rects.iter().skip(i + 1) {
                        assert!(!a.intersects(b), "{layout:?}: {a:?} overlaps {b:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_picker_rows_stop_above_buttons() {
        for layout in [Layout::SMALL, Layout::LARGE] {
            for i in 0..layout.picker_page_size() {
                let hit = layout.picker_row_hit(i);
                assert!(hit.h > 0);
                assert!(hit.bottom() <= layout.left_button().y);
            }
        }
    }

    #[test]
    fn test_settings_rotate_row_is_clipped() {
        let l = Layout::SMALL;
        assert_eq!(l.settings_action(2), Rect::new(0, 250, 240, 32));
    }

    #[test]
    fn test_volume_bar_mapping() {
        let bar = Layout::SMALL.volume_bar(BarRow::Lower);
        assert_eq!(bar.knob_x(0.0), 45);
        assert_eq!(bar.knob_x(100.0), 195);
        assert_eq!(bar.knob_x(250.0), 195);
        assert_eq!(bar.knob_x(-5.0), 45);
        assert_eq!(bar.percent_at(45), 0.0);
        assert_eq!(bar.percent_at(0), 0.0);
        assert_eq!(bar.percent_at(120), 50.0);
        assert_eq!(bar.percent_at(190), 100.0);
    }
}
