//! Region painter for the panel's LCD
//!
//! Implements the controller's [`Canvas`] on any `embedded-graphics` RGB565
//! target. Each region clears its own rectangle before drawing, so a partial
//! redraw never leaves stale pixels behind.

use core::fmt::{Debug, Write as FmtWrite};

use amplipi_panel::config::SettingField;
use amplipi_panel::controller::about_lines;
use amplipi_panel::dirty::{Region, ZoneSlot};
use amplipi_panel::layout::{self, Layout};
use amplipi_panel::render::{Canvas, display_text};
use amplipi_panel::screen::{Screen, bar_row};
use amplipi_panel::state::ControllerState;
use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_9X15, FONT_10X20};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PointsIter, PrimitiveStyle, Rectangle, Triangle};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};
use embedded_hal::digital::OutputPin;
use log::warn;
use zune_jpeg::JpegDecoder;

const BACKGROUND: Rgb565 = Rgb565::BLACK;
const FOREGROUND: Rgb565 = Rgb565::WHITE;
const ACCENT: Rgb565 = Rgb565::CYAN;
const MUTED: Rgb565 = Rgb565::RED;
const TRACK: Rgb565 = Rgb565::new(10, 20, 10);
const PANEL: Rgb565 = Rgb565::new(4, 8, 4);

#[derive(Debug)]
pub enum CanvasError<E> {
    Draw(E),
    Backlight,
}

impl<E> From<E> for CanvasError<E> {
    fn from(e: E) -> Self {
        CanvasError::Draw(e)
    }
}

fn to_rect(r: layout::Rect) -> Rectangle {
    Rectangle::new(Point::new(r.x, r.y), Size::new(r.w.max(0) as u32, r.h.max(0) as u32))
}

fn center(r: layout::Rect) -> Point {
    Point::new(r.x + r.w / 2, r.y + r.h / 2)
}

/// LCD plus backlight pin
pub struct LcdCanvas<D, BL> {
    display: D,
    backlight: BL,
    layout: Layout,
    font: &'static MonoFont<'static>,
}

impl<D, BL> LcdCanvas<D, BL>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: Debug,
    BL: OutputPin,
{
    pub fn new(display: D, backlight: BL, layout: Layout) -> Self {
        let font = if layout.width >= 320 { &FONT_10X20 } else { &FONT_9X15 };
        Self {
            display,
            backlight,
            layout,
            font,
        }
    }

    /// Centered lines on a cleared screen, used before the controller runs
    pub fn show_message(&mut self, lines: &[&str]) -> Result<(), CanvasError<D::Error>> {
        self.display.clear(BACKGROUND)?;
        let pitch = self.font.character_size.height as i32 + 6;
        let top = self.layout.height / 2 - pitch * (lines.len() as i32 - 1) / 2;
        for (i, line) in lines.iter().enumerate() {
            let at = Point::new(self.layout.width / 2, top + pitch * i as i32);
            self.text(line, at, Alignment::Center, FOREGROUND)?;
        }
        self.backlight(true)
    }

    /// Crosshair for touch calibration
    pub fn show_marker(&mut self, at: Point, hint: &str) -> Result<(), CanvasError<D::Error>> {
        self.display.clear(BACKGROUND)?;
        let style = PrimitiveStyle::with_stroke(ACCENT, 1);
        Line::new(at - Point::new(8, 0), at + Point::new(8, 0))
            .into_styled(style)
            .draw(&mut self.display)?;
        Line::new(at - Point::new(0, 8), at + Point::new(0, 8))
            .into_styled(style)
            .draw(&mut self.display)?;
        let mid = Point::new(self.layout.width / 2, self.layout.height / 2);
        self.text(hint, mid, Alignment::Center, FOREGROUND)?;
        self.backlight(true)
    }

    fn backlight(&mut self, on: bool) -> Result<(), CanvasError<D::Error>> {
        let res = if on {
            self.backlight.set_high()
        } else {
            self.backlight.set_low()
        };
        res.map_err(|_| CanvasError::Backlight)
    }

    fn fill(&mut self, r: layout::Rect, color: Rgb565) -> Result<(), D::Error> {
        self.display.fill_solid(&to_rect(r), color)
    }

    fn text(&mut self, text: &str, at: Point, align: Alignment, color: Rgb565) -> Result<(), D::Error> {
        let style = MonoTextStyle::new(self.font, color);
        let layout = TextStyleBuilder::new()
            .alignment(align)
            .baseline(Baseline::Middle)
            .build();
        Text::with_text_style(text, at, style, layout).draw(&mut self.display)?;
        Ok(())
    }

    fn button(&mut self, r: layout::Rect, label: &str) -> Result<(), D::Error> {
        to_rect(r)
            .into_styled(PrimitiveStyle::with_stroke(FOREGROUND, 1))
            .draw(&mut self.display)?;
        self.text(label, center(r), Alignment::Center, FOREGROUND)
    }

    fn title(&mut self, title: &str) -> Result<(), D::Error> {
        let bar = self.layout.source_bar();
        self.fill(bar, PANEL)?;
        self.text(title, center(bar), Alignment::Center, FOREGROUND)
    }

    fn draw_source_bar(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        match state.screen {
            Screen::Select | Screen::SourcePicker => {}
            Screen::Settings => return self.title("Settings"),
            Screen::About => return self.title("About"),
            Screen::Metadata | Screen::PoweredOff => return Ok(()),
        }

        let bar = self.layout.source_bar();
        self.fill(bar, PANEL)?;

        // Power: ring with a stroke through the top
        let power = self.layout.power_button();
        let c = center(power);
        let stroke = PrimitiveStyle::with_stroke(FOREGROUND, 2);
        Circle::with_center(c, 20).into_styled(stroke).draw(&mut self.display)?;
        Line::new(c - Point::new(0, 12), c).into_styled(stroke).draw(&mut self.display)?;

        // Source menu: three bars
        let source = self.layout.source_button();
        let c = center(source);
        for dy in [-7, 0, 7] {
            Line::new(c + Point::new(-10, dy), c + Point::new(10, dy))
                .into_styled(stroke)
                .draw(&mut self.display)?;
        }

        let name = if state.screen == Screen::SourcePicker {
            "Select Source"
        } else {
            state.source.stream_name.as_str()
        };
        let name = display_text(name, self.layout.name_budget());
        self.text(&name, center(bar), Alignment::Center, FOREGROUND)
    }

    fn draw_album_art(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        let area = match state.screen {
            Screen::Metadata => self.layout.full_screen(),
            _ => self.layout.album_art(),
        };
        self.fill(area, BACKGROUND)?;

        if state.source.album_art.is_empty() {
            return self.art_placeholder(self.layout.album_art());
        }
        if !self.draw_jpeg(&state.source.album_art, area)? {
            return self.art_placeholder(self.layout.album_art());
        }
        Ok(())
    }

    fn art_placeholder(&mut self, area: layout::Rect) -> Result<(), D::Error> {
        to_rect(area)
            .into_styled(PrimitiveStyle::with_stroke(TRACK, 1))
            .draw(&mut self.display)?;
        Circle::with_center(center(area), (area.w / 2).max(1) as u32)
            .into_styled(PrimitiveStyle::with_stroke(TRACK, 2))
            .draw(&mut self.display)?;
        Circle::with_center(center(area), 8)
            .into_styled(PrimitiveStyle::with_fill(TRACK))
            .draw(&mut self.display)
    }

    /// Decode and draw centered in `area`, cropping overhang. `false` if the
    /// image couldn't be decoded.
    fn draw_jpeg(&mut self, data: &[u8], area: layout::Rect) -> Result<bool, D::Error> {
        let mut decoder = JpegDecoder::new(data);
        let pixels = match decoder.decode() {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!("Album art decode failed: {:?}", e);
                return Ok(false);
            }
        };
        let Some((width, height)) = decoder.dimensions() else {
            return Ok(false);
        };
        if width == 0 || height == 0 {
            return Ok(false);
        }
        let bpp = pixels.len() / (width * height);
        if !matches!(bpp, 1 | 3 | 4) {
            warn!("Album art has {} bytes per pixel", bpp);
            return Ok(false);
        }

        let origin = Point::new(
            area.x + (area.w - width as i32) / 2,
            area.y + (area.h - height as i32) / 2,
        );
        let image = Rectangle::new(origin, Size::new(width as u32, height as u32));
        let visible = image.intersection(&to_rect(area));
        let colors = visible.points().map(|p| {
            let x = (p.x - origin.x) as usize;
            let y = (p.y - origin.y) as usize;
            let i = (y * width + x) * bpp;
            match bpp {
                1 => Rgb565::new(pixels[i] >> 3, pixels[i] >> 2, pixels[i] >> 3),
                _ => Rgb565::new(pixels[i] >> 3, pixels[i + 1] >> 2, pixels[i + 2] >> 3),
            }
        });
        self.display.fill_contiguous(&visible, colors)?;
        Ok(true)
    }

    fn draw_metadata(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        let area = self.layout.metadata_text();
        self.fill(area, BACKGROUND)?;
        let Some(track) = &state.source.track else {
            return Ok(());
        };

        let budget = self.layout.title_budget();
        let pitch = area.h / 3;
        let x = self.layout.width / 2;
        let lines = [
            (track.artist.as_str(), ACCENT),
            (track.song.as_str(), FOREGROUND),
            (track.album.as_str(), FOREGROUND),
        ];
        for (i, (line, color)) in lines.into_iter().enumerate() {
            let at = Point::new(x, area.y + pitch * i as i32 + pitch / 2);
            self.text(&display_text(line, budget), at, Alignment::Center, color)?;
        }
        Ok(())
    }

    fn draw_commands(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        let buttons = [
            self.layout.play_pause_button(),
            self.layout.skip_button(),
            self.layout.like_button(),
            self.layout.dislike_button(),
        ];
        for r in buttons {
            self.fill(r, BACKGROUND)?;
        }
        if !state.source.commands_enabled() {
            return Ok(());
        }

        let fill = PrimitiveStyle::with_fill(FOREGROUND);
        let [play, skip, like, dislike] = buttons.map(center);

        if state.source.playing {
            for dx in [-6, 3] {
                Rectangle::new(play + Point::new(dx, -9), Size::new(4, 18))
                    .into_styled(fill)
                    .draw(&mut self.display)?;
            }
        } else {
            Triangle::new(play + Point::new(-6, -9), play + Point::new(-6, 9), play + Point::new(8, 0))
                .into_styled(fill)
                .draw(&mut self.display)?;
        }

        Triangle::new(skip + Point::new(-8, -9), skip + Point::new(-8, 9), skip + Point::new(4, 0))
            .into_styled(fill)
            .draw(&mut self.display)?;
        Rectangle::new(skip + Point::new(5, -9), Size::new(3, 18))
            .into_styled(fill)
            .draw(&mut self.display)?;

        let thumb = |on: bool| {
            if on {
                PrimitiveStyle::with_fill(ACCENT)
            } else {
                PrimitiveStyle::with_stroke(FOREGROUND, 2)
            }
        };
        Triangle::new(like + Point::new(-9, 7), like + Point::new(9, 7), like + Point::new(0, -8))
            .into_styled(thumb(state.source.liked))
            .draw(&mut self.display)?;
        Triangle::new(dislike + Point::new(-9, -7), dislike + Point::new(9, -7), dislike + Point::new(0, 8))
            .into_styled(thumb(state.source.disliked))
            .draw(&mut self.display)
    }

    fn draw_mute(&mut self, state: &ControllerState, slot: ZoneSlot) -> Result<(), D::Error> {
        let Some(row) = bar_row(slot, state.zone_count()) else {
            return Ok(());
        };
        let r = self.layout.mute_button(row);
        self.fill(r, BACKGROUND)?;

        let c = center(r) - Point::new(4, 0);
        let fill = PrimitiveStyle::with_fill(FOREGROUND);
        Rectangle::new(c + Point::new(-8, -4), Size::new(6, 8))
            .into_styled(fill)
            .draw(&mut self.display)?;
        Triangle::new(c + Point::new(-3, -4), c + Point::new(5, -10), c + Point::new(5, 10))
            .into_styled(fill)
            .draw(&mut self.display)?;

        if state.zone(slot).muted {
            let stroke = PrimitiveStyle::with_stroke(MUTED, 2);
            let x = c + Point::new(12, 0);
            Line::new(x + Point::new(-4, -4), x + Point::new(4, 4))
                .into_styled(stroke)
                .draw(&mut self.display)?;
            Line::new(x + Point::new(-4, 4), x + Point::new(4, -4))
                .into_styled(stroke)
                .draw(&mut self.display)?;
        }
        Ok(())
    }

    fn draw_volume(&mut self, state: &ControllerState, slot: ZoneSlot) -> Result<(), D::Error> {
        let Some(row) = bar_row(slot, state.zone_count()) else {
            return Ok(());
        };
        self.fill(self.layout.volume_zone(row), BACKGROUND)?;

        let bar = self.layout.volume_bar(row);
        let knob = bar.knob_x(state.zone(slot).volume_percent);
        let track = bar.track;
        self.fill(track, TRACK)?;
        self.fill(layout::Rect::new(track.x, track.y, knob - track.x, track.h), ACCENT)?;
        Circle::with_center(Point::new(knob, track.y + track.h / 2), 14)
            .into_styled(PrimitiveStyle::with_fill(FOREGROUND))
            .draw(&mut self.display)
    }

    fn draw_warning(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        let r = self.layout.warning();
        match &state.warning {
            Some(warning) => {
                self.fill(r, MUTED)?;
                let style = MonoTextStyle::new(&FONT_6X10, FOREGROUND);
                let align = TextStyleBuilder::new()
                    .alignment(Alignment::Center)
                    .baseline(Baseline::Middle)
                    .build();
                Text::with_text_style(warning.message(), center(r), style, align).draw(&mut self.display)?;
                Ok(())
            }
            None => self.fill(r, BACKGROUND),
        }
    }

    fn draw_page(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        let body = self.layout.main_area();
        self.fill(body, BACKGROUND)?;
        match state.screen {
            Screen::SourcePicker => self.draw_picker(state),
            Screen::Settings => self.draw_settings(state),
            Screen::About => {
                self.draw_about(state)?;
                // The banner sits inside the page body
                self.draw_warning(state)
            }
            _ => Ok(()),
        }
    }

    fn draw_picker(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        let page = self.layout.picker_page_size();
        let budget = self.layout.name_budget();
        for (i, entry) in state.picker.visible(page).iter().enumerate() {
            let row = self.layout.picker_row(i);
            let current = state.source.input == Some(entry.input);
            if current {
                self.fill(row, PANEL)?;
            }
            to_rect(row)
                .into_styled(PrimitiveStyle::with_stroke(TRACK, 1))
                .draw(&mut self.display)?;
            let color = if current { ACCENT } else { FOREGROUND };
            let name = display_text(&entry.name, budget);
            self.text(&name, Point::new(row.x + 8, row.y + row.h / 2), Alignment::Left, color)?;
        }

        if state.picker.has_prev() {
            self.button(self.layout.left_button(), "<")?;
        }
        self.button(self.layout.center_button(), "*")?;
        if state.picker.has_next(page) {
            self.button(self.layout.right_button(), ">")?;
        }
        Ok(())
    }

    fn draw_settings(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        let mut line: heapless::String<24> = heapless::String::new();
        for (i, field) in SettingField::ALL.into_iter().enumerate() {
            let row = self.layout.settings_row(i);
            let value = state.draft.get(field);
            line.clear();
            if field == SettingField::Zone2 && value < 0 {
                let _ = write!(line, "{}: off", field.label());
            } else {
                let _ = write!(line, "{}: {}", field.label(), value);
            }
            self.text(&line, Point::new(row.x + 8, row.y + row.h / 2), Alignment::Left, FOREGROUND)?;
            self.button(self.layout.settings_decrement(i), "-")?;
            self.button(self.layout.settings_increment(i), "+")?;
        }

        for (i, label) in ["Reboot", "Recalibrate touch", "Rotate screen"].into_iter().enumerate() {
            self.button(self.layout.settings_action(i), label)?;
        }

        self.button(self.layout.left_button(), "Save")?;
        self.button(self.layout.center_button(), "i")?;
        self.button(self.layout.right_button(), "Back")
    }

    fn draw_about(&mut self, state: &ControllerState) -> Result<(), D::Error> {
        let body = self.layout.main_area();
        let pitch = self.font.character_size.height as i32 + 8;
        let budget = self.layout.title_budget();
        for (i, line) in about_lines(state).iter().enumerate() {
            let at = Point::new(body.x + 8, body.y + pitch * (i as i32 + 1));
            self.text(&display_text(line, budget), at, Alignment::Left, FOREGROUND)?;
        }

        self.button(self.layout.left_button(), "Back")?;
        self.button(self.layout.right_button(), "Update")
    }
}

impl<D, BL> Canvas for LcdCanvas<D, BL>
where
    D: DrawTarget<Color = Rgb565>,
    D::Error: Debug,
    BL: OutputPin,
{
    type Error = CanvasError<D::Error>;

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.display.clear(BACKGROUND)?;
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), Self::Error> {
        self.backlight(on)
    }

    fn draw(&mut self, region: Region, state: &ControllerState) -> Result<(), Self::Error> {
        match region {
            Region::Source => self.draw_source_bar(state)?,
            Region::AlbumArt => self.draw_album_art(state)?,
            Region::MetadataText => self.draw_metadata(state)?,
            Region::CommandButtons => self.draw_commands(state)?,
            Region::Mute1 => self.draw_mute(state, ZoneSlot::First)?,
            Region::Mute2 => self.draw_mute(state, ZoneSlot::Second)?,
            Region::Vol1 => self.draw_volume(state, ZoneSlot::First)?,
            Region::Vol2 => self.draw_volume(state, ZoneSlot::Second)?,
            Region::Warning => self.draw_warning(state)?,
            Region::PageBody => self.draw_page(state)?,
        }
        Ok(())
    }
}
