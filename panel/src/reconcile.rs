//! Remote state reconciler
//!
//! Polls the tracked zones and source, diffs each field against the cache
//! and marks only the regions whose value changed. Failed calls leave the
//! cache untouched so the next poll retries them.

use alloc::string::String;

use log::{info, warn};

use crate::api::{ApiClient, ApiError, SourceStatus, Transport, ZoneStatus};
use crate::dirty::{Region, ZoneSlot};
use crate::state::{ControllerState, TrackInfo, ZoneState};
use crate::stream::{StreamInput, StreamType};
use crate::volume;

/// Default time between polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    interval_ms: u64,
    last_poll_ms: Option<u64>,
}

impl Reconciler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_poll_ms: None,
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_poll_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
            None => true,
        }
    }

    /// Make the next tick poll regardless of the interval
    pub fn expedite(&mut self) {
        self.last_poll_ms = None;
    }

    /// Poll if the active screen is live and the interval has elapsed.
    /// Returns whether a poll ran.
    pub async fn tick<T: Transport>(
        &mut self,
        state: &mut ControllerState,
        api: &mut ApiClient<T>,
        now_ms: u64,
    ) -> bool {
        if !state.polling || !self.is_due(now_ms) {
            return false;
        }
        self.last_poll_ms = Some(now_ms);
        poll(state, api).await;
        true
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL_MS)
    }
}

/// One full fetch-and-diff pass
pub async fn poll<T: Transport>(state: &mut ControllerState, api: &mut ApiClient<T>) {
    for &slot in state.tracked_zones() {
        let Some(zone) = state.zone_id(slot) else {
            continue;
        };
        let result = api.zone(zone).await;
        state.observe("zone", &result);
        if let Ok(status) = result {
            apply_zone(state, slot, &status);
        }
    }
    if state.zone_count() < 2 {
        state.zones[ZoneSlot::Second.index()] = None;
    }

    let result = api.source(state.source_id()).await;
    state.observe("source", &result);
    let Ok(status) = result else {
        return;
    };
    let Some(input) = StreamInput::parse(&status.input) else {
        warn!("source: unknown input {:?}", status.input);
        return;
    };

    if state.source.input != Some(input) {
        update_identity(state, api, input).await;
    }
    apply_track(state, &status);

    let art_url = status.info.img_url.unwrap_or_default();
    if state.source.album_art_url.as_deref() != Some(art_url.as_str()) {
        update_album_art(state, api, art_url).await;
    }
}

/// Diff a zone poll into the cache
pub fn apply_zone(state: &mut ControllerState, slot: ZoneSlot, status: &ZoneStatus) {
    let percent = volume::to_percent(status.vol);
    let cached = state.zones[slot.index()];
    if cached.map(|z| z.muted) != Some(status.mute) {
        state.dirty.set(Region::mute(slot));
    }
    if cached.map(|z| z.volume_percent) != Some(percent) {
        state.dirty.set(Region::volume(slot));
    }
    state.zones[slot.index()] = Some(ZoneState {
        muted: status.mute,
        volume_percent: percent,
    });
}

async fn update_identity<T: Transport>(
    state: &mut ControllerState,
    api: &mut ApiClient<T>,
    input: StreamInput,
) {
    let (name, kind) = match input {
        StreamInput::Stream(id) => {
            let result = api.stream(id).await;
            state.observe("stream", &result);
            match result {
                Ok(details) => (details.name, StreamType::parse(&details.kind)),
                // Identity stays stale so the next poll fetches again
                Err(_) => return,
            }
        }
        fixed => (
            String::from(fixed.fixed_name().unwrap_or_default()),
            StreamType::for_input(fixed),
        ),
    };
    info!("Source input now {:?} ({name})", input);
    state.source.input = Some(input);
    state.source.stream_name = name;
    state.source.stream_type = kind;
    state.dirty.set(Region::Source);
    state.dirty.set(Region::CommandButtons);
}

/// Diff the track text; a new track resets like/dislike
pub fn apply_track(state: &mut ControllerState, status: &SourceStatus) {
    let track = TrackInfo {
        artist: status.info.artist.clone().unwrap_or_default(),
        song: status.info.track.clone().unwrap_or_default(),
        album: status.info.album.clone().unwrap_or_default(),
        status: status.status.clone().unwrap_or_default(),
    };
    let changed = match &state.source.track {
        Some(old) => old.artist != track.artist || old.song != track.song || old.status != track.status,
        None => true,
    };
    if changed {
        state.source.liked = false;
        state.source.disliked = false;
        state.source.playing = !matches!(track.status.as_str(), "paused" | "stopped");
        state.dirty.set(Region::MetadataText);
        state.dirty.set(Region::CommandButtons);
    } else if state.source.track.as_ref().is_some_and(|old| old.album != track.album) {
        state.dirty.set(Region::MetadataText);
    }
    state.source.track = Some(track);
}

async fn update_album_art<T: Transport>(
    state: &mut ControllerState,
    api: &mut ApiClient<T>,
    url: String,
) {
    if url.is_empty() {
        state.source.album_art.clear();
    } else {
        let result = api.album_art(state.source_id(), state.layout.art_size()).await;
        state.observe("album art", &result);
        match result {
            Ok(image) => {
                info!("Album art {url}: {} bytes", image.len());
                state.source.album_art = image;
            }
            Err(ApiError::Parse) => {
                warn!("Album art {url} unusable, showing none");
                state.source.album_art.clear();
            }
            // Keep the old URL so the next poll retries
            Err(_) => return,
        }
    }
    state.source.album_art_url = Some(url);
    state.dirty.set(Region::AlbumArt);
}
