//! Source input identities and stream types

use core::fmt::Write;

use heapless::String;

/// Display name of the local RCA pseudo-stream
pub const LOCAL_NAME: &str = "Local - RCA";
/// Display name of the off pseudo-stream
pub const OFF_NAME: &str = "Source Off";

/// What a source is playing, derived from its `input` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamInput {
    /// `"None"`
    #[default]
    Off,
    /// `"local"`, the RCA input on the back of the unit
    Local,
    /// `"stream=<id>"`
    Stream(u32),
}

impl StreamInput {
    /// Parse the `input` field of a source status response
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "local" => Some(Self::Local),
            "None" => Some(Self::Off),
            other => {
                let id = other.strip_prefix("stream=")?;
                id.parse().ok().map(Self::Stream)
            }
        }
    }

    /// Numeric identity: -1 for off, 0 for local, the stream id otherwise
    pub fn identity(&self) -> i64 {
        match self {
            Self::Off => -1,
            Self::Local => 0,
            Self::Stream(id) => i64::from(*id),
        }
    }

    /// Value for the `input` field of a source PATCH
    pub fn as_input(&self) -> String<24> {
        let mut out = String::new();
        let _ = match self {
            Self::Off => out.write_str("None"),
            Self::Local => out.write_str("local"),
            Self::Stream(id) => write!(out, "stream={id}"),
        };
        out
    }

    /// The stream id for real streams
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            Self::Stream(id) => Some(*id),
            _ => None,
        }
    }

    /// Fixed display name for the pseudo-streams
    pub fn fixed_name(&self) -> Option<&'static str> {
        match self {
            Self::Off => Some(OFF_NAME),
            Self::Local => Some(LOCAL_NAME),
            Self::Stream(_) => None,
        }
    }
}

/// Stream type as reported by `GET /api/streams/{id}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamType {
    Local,
    #[default]
    None,
    Pandora,
    Other,
}

impl StreamType {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "pandora" => Self::Pandora,
            "local" | "rca" => Self::Local,
            "none" | "" => Self::None,
            _ => Self::Other,
        }
    }

    /// Type of the pseudo-streams, which never hit the stream endpoint
    pub fn for_input(input: StreamInput) -> Self {
        match input {
            StreamInput::Off => Self::None,
            StreamInput::Local => Self::Local,
            StreamInput::Stream(_) => Self::Other,
        }
    }

    /// Play/pause, skip, like and dislike only exist for Pandora
    pub fn has_commands(&self) -> bool {
        matches!(self, Self::Pandora)
    }
}

/// Transport commands accepted by `POST /api/streams/{id}/{command}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCommand {
    PlayPause,
    Next,
    Love,
    Ban,
}

impl StreamCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayPause => "playpause",
            Self::Next => "next",
            Self::Love => "love",
            Self::Ban => "ban",
        }
    }
}
