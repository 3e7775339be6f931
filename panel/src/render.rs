//! Render pass over the dirty regions of the active screen

use alloc::borrow::Cow;
use alloc::format;
use core::fmt::Debug;

use log::debug;

use crate::dirty::Region;
use crate::state::ControllerState;

/// Drawing surface for the panel.
///
/// The canvas decides how each region looks; the controller only decides
/// when a region is drawn.
pub trait Canvas {
    type Error: Debug;

    fn clear(&mut self) -> Result<(), Self::Error>;

    fn set_backlight(&mut self, on: bool) -> Result<(), Self::Error>;

    /// Paint one region from the current state
    fn draw(&mut self, region: Region, state: &ControllerState) -> Result<(), Self::Error>;
}

/// Redraw what changed, returning the number of regions drawn.
///
/// After a transition the screen is cleared and every region it shows is
/// drawn. Otherwise only flagged regions of the active screen are drawn;
/// flags for regions the screen does not show stay pending.
pub fn render<C: Canvas>(state: &mut ControllerState, canvas: &mut C) -> Result<usize, C::Error> {
    let regions = state.screen.regions(state.zone_count());
    let mut drawn = 0;

    if state.cold_draw {
        canvas.clear()?;
        for &region in &regions {
            canvas.draw(region, state)?;
            state.dirty.clear(region);
            drawn += 1;
        }
        canvas.set_backlight(state.backlight)?;
        state.cold_draw = false;
        debug!("Cold draw of {:?}: {} regions", state.screen, drawn);
        return Ok(drawn);
    }

    for region in regions {
        if state.dirty.take(region) {
            canvas.draw(region, state)?;
            drawn += 1;
        }
    }
    Ok(drawn)
}

/// Truncate to `budget` characters, marking the cut with `...`
pub fn display_text(text: &str, budget: usize) -> Cow<'_, str> {
    match text.char_indices().nth(budget) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!("{}...", &text[..cut])),
    }
}
