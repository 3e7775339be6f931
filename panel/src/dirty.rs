//! Per-region dirty tracking

/// Which of the two tracked zones a region or action refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneSlot {
    First,
    Second,
}

impl ZoneSlot {
    pub const ALL: [ZoneSlot; 2] = [ZoneSlot::First, ZoneSlot::Second];

    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

/// Independently redrawable screen region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Region {
    Source,
    AlbumArt,
    MetadataText,
    Mute1,
    Mute2,
    Vol1,
    Vol2,
    CommandButtons,
    Warning,
    PageBody,
}

impl Region {
    pub const ALL: [Region; 10] = [
        Region::Source,
        Region::AlbumArt,
        Region::MetadataText,
        Region::Mute1,
        Region::Mute2,
        Region::Vol1,
        Region::Vol2,
        Region::CommandButtons,
        Region::Warning,
        Region::PageBody,
    ];

    pub fn mute(slot: ZoneSlot) -> Self {
        match slot {
            ZoneSlot::First => Self::Mute1,
            ZoneSlot::Second => Self::Mute2,
        }
    }

    pub fn volume(slot: ZoneSlot) -> Self {
        match slot {
            ZoneSlot::First => Self::Vol1,
            ZoneSlot::Second => Self::Vol2,
        }
    }

    fn bit(self) -> u16 {
        1 << self as u8
    }
}

/// Set of regions waiting for a redraw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyFlags(u16);

impl DirtyFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        let mut flags = Self::empty();
        for region in Region::ALL {
            flags.set(region);
        }
        flags
    }

    pub fn set(&mut self, region: Region) {
        self.0 |= region.bit();
    }

    pub fn clear(&mut self, region: Region) {
        self.0 &= !region.bit();
    }

    pub fn is_set(&self, region: Region) -> bool {
        self.0 & region.bit() != 0
    }

    /// Clear the flag, returning whether it was set
    pub fn take(&mut self, region: Region) -> bool {
        let was_set = self.is_set(region);
        self.clear(region);
        was_set
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Region> + '_ {
        Region::ALL.into_iter().filter(|r| self.is_set(*r))
    }
}
