//! Persisted panel configuration
//!
//! The config file keeps the key names and value formats of the AmpliPi
//! controller's `config.json` so existing cards keep working: zone and source
//! ids are stored as text, the rotation as a number.

use alloc::string::String;
use alloc::vec;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest config file we read or write
pub const MAX_CONFIG_LEN: usize = 512;

/// Files owned by the panel on persistent storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoredFile {
    Config,
    Calibration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("file not found")]
    NotFound,
    #[error("storage device unavailable")]
    Unavailable,
    #[error("read failed")]
    Read,
    #[error("write failed")]
    Write,
    #[error("file larger than buffer")]
    TooLarge,
}

/// Persistent storage for the config and calibration files
pub trait ConfigStore {
    /// Read a whole file into `buf`, returning its length
    fn read(&mut self, file: StoredFile, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Replace the file contents
    fn write(&mut self, file: StoredFile, data: &[u8]) -> Result<(), StorageError>;

    /// Delete the file; deleting a missing file is not an error
    fn remove(&mut self, file: StoredFile) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("config file missing")]
    Missing,
    #[error("config file corrupt")]
    Corrupt,
    #[error("storage: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ConfigError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::Missing,
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "amplipiHost")]
    pub host: String,
    #[serde(rename = "amplipiZone1", with = "id_text")]
    pub zone1: i8,
    /// -1 disables the second zone
    #[serde(rename = "amplipiZone2", with = "id_text")]
    pub zone2: i8,
    #[serde(rename = "amplipiSource", with = "id_text")]
    pub source: i8,
    /// 0 or 2, in quarter turns
    #[serde(rename = "screenRotation")]
    pub screen_rotation: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("amplipi.local"),
            zone1: 0,
            zone2: -1,
            source: 0,
            screen_rotation: 0,
        }
    }
}

impl Config {
    pub fn zone2_enabled(&self) -> bool {
        self.zone2 >= 0
    }

    /// Rotation after the settings screen's rotate button
    pub fn flipped_rotation(&self) -> u8 {
        if self.screen_rotation == 0 { 2 } else { 0 }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        serde_json_core::from_slice::<Config>(bytes)
            .map(|(config, _)| config)
            .map_err(|_| ConfigError::Corrupt)
    }

    pub fn to_json(&self, buf: &mut [u8]) -> Result<usize, ConfigError> {
        serde_json_core::to_slice(self, buf).map_err(|_| ConfigError::Corrupt)
    }

    /// Copy the draft's ids into the config
    pub fn apply(&mut self, draft: &SettingsDraft) {
        self.zone1 = draft.zone1;
        self.zone2 = draft.zone2;
        self.source = draft.source;
    }
}

/// Ids are written as JSON strings ("0", "-1")
mod id_text {
    use core::fmt::Write;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &i8, serializer: S) -> Result<S::Ok, S::Error> {
        let mut text: heapless::String<4> = heapless::String::new();
        let _ = write!(text, "{id}");
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i8, D::Error> {
        let text: &str = Deserialize::deserialize(deserializer)?;
        text.trim().parse().map_err(|_| D::Error::custom("invalid id"))
    }
}

/// Read and parse the config file
pub fn load<S: ConfigStore>(store: &mut S) -> Result<Config, ConfigError> {
    let mut buf = vec![0u8; MAX_CONFIG_LEN];
    let len = store.read(StoredFile::Config, &mut buf)?;
    Config::from_json(&buf[..len])
}

/// Load the config, falling back to defaults.
///
/// A missing or corrupt file is replaced with the defaults. When the device
/// itself is unavailable the defaults are used for this boot only.
pub fn load_or_default<S: ConfigStore>(store: &mut S) -> Config {
    match load(store) {
        Ok(config) => {
            info!("Loaded config: host={} zone1={} zone2={} source={}",
                config.host, config.zone1, config.zone2, config.source);
            config
        }
        Err(ConfigError::Storage(err)) => {
            warn!("Config storage unavailable ({err}), using defaults");
            Config::default()
        }
        Err(err) => {
            warn!("Config {err}, writing defaults");
            let config = Config::default();
            if let Err(err) = save(store, &config) {
                warn!("Failed to persist default config: {err}");
            }
            config
        }
    }
}

pub fn save<S: ConfigStore>(store: &mut S, config: &Config) -> Result<(), ConfigError> {
    let mut buf = vec![0u8; MAX_CONFIG_LEN];
    let len = config.to_json(&mut buf)?;
    store.write(StoredFile::Config, &buf[..len])?;
    info!("Saved config");
    Ok(())
}

/// Field edited by the settings screen's +/- buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    Zone1,
    Zone2,
    Source,
}

impl SettingField {
    pub const ALL: [SettingField; 3] = [SettingField::Zone1, SettingField::Zone2, SettingField::Source];

    /// Allowed range, inclusive
    pub fn range(self) -> (i8, i8) {
        match self {
            Self::Zone1 => (0, 3),
            Self::Zone2 => (-1, 3),
            Self::Source => (0, 3),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Zone1 => "Zone 1",
            Self::Zone2 => "Zone 2",
            Self::Source => "Source",
        }
    }
}

/// Editable copy of the ids shown on the settings screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsDraft {
    pub zone1: i8,
    pub zone2: i8,
    pub source: i8,
}

impl SettingsDraft {
    pub fn from_config(config: &Config) -> Self {
        Self {
            zone1: config.zone1,
            zone2: config.zone2,
            source: config.source,
        }
    }

    pub fn get(&self, field: SettingField) -> i8 {
        match field {
            SettingField::Zone1 => self.zone1,
            SettingField::Zone2 => self.zone2,
            SettingField::Source => self.source,
        }
    }

    /// Step a field, staying inside its range. Returns whether it changed.
    pub fn adjust(&mut self, field: SettingField, delta: i8) -> bool {
        let (min, max) = field.range();
        let slot = match field {
            SettingField::Zone1 => &mut self.zone1,
            SettingField::Zone2 => &mut self.zone2,
            SettingField::Source => &mut self.source,
        };
        let next = slot.saturating_add(delta).clamp(min, max);
        let changed = next != *slot;
        *slot = next;
        changed
    }
}
