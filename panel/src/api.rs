//! AmpliPi REST API client
//!
//! Requests go through the [`Transport`] trait so the firmware can supply an
//! HTTP client over its network stack and tests can supply canned responses.
//! Bodies are JSON, parsed with `serde-json-core`.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Write;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::{StreamCommand, StreamInput};

/// Timeout for status polls and control writes
pub const STATUS_TIMEOUT_MS: u64 = 5_000;
/// Timeout for album art and firmware downloads
pub const TRANSFER_TIMEOUT_MS: u64 = 20_000;

const MAX_STATUS_BODY: usize = 8 * 1024;
const MAX_STREAMS_BODY: usize = 16 * 1024;
/// Largest album art image we keep in memory
pub const MAX_ALBUM_ART: usize = 96 * 1024;

pub type Path = heapless::String<64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Patch,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Patch => "PATCH",
            Method::Post => "POST",
        }
    }
}

/// One HTTP request against the AmpliPi host
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    /// JSON body, sent with `Content-Type: application/json`
    pub body: Option<&'a str>,
    pub timeout_ms: u64,
}

/// Status line and headers, handed to the sink before the body
#[derive(Debug, Clone, Copy)]
pub struct ResponseHead<'a> {
    pub status: u16,
    pub content_length: Option<usize>,
    pub content_type: &'a str,
}

impl ResponseHead<'_> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("response rejected")]
    Rejected,
    #[error("write failed")]
    Write,
}

/// Consumer of a streamed response body
pub trait BodySink {
    /// Called once with the response head before any body bytes
    fn begin(&mut self, head: &ResponseHead<'_>) -> Result<(), SinkError> {
        let _ = head;
        Ok(())
    }

    fn chunk(&mut self, data: &[u8]) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("host lookup failed")]
    Resolve,
    #[error("connect failed")]
    Connect,
    #[error("timed out")]
    Timeout,
    #[error("socket error")]
    Io,
    #[error("malformed response")]
    Protocol,
    #[error("body: {0}")]
    Sink(SinkError),
}

/// Moves one request/response pair over the network
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Send `request`, stream the response into `sink` and return the status
    async fn request(
        &mut self,
        request: &Request<'_>,
        sink: &mut dyn BodySink,
    ) -> Result<u16, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("transport: {0}")]
    Transport(TransportError),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("unparseable response")]
    Parse,
}

/// Buffers a whole body in memory, up to a limit
pub struct CollectSink {
    pub body: Vec<u8>,
    limit: usize,
}

impl CollectSink {
    pub fn new(limit: usize) -> Self {
        Self {
            body: Vec::new(),
            limit,
        }
    }
}

impl BodySink for CollectSink {
    fn begin(&mut self, head: &ResponseHead<'_>) -> Result<(), SinkError> {
        match head.content_length {
            Some(len) if head.is_success() && len > self.limit => Err(SinkError::TooLarge(self.limit)),
            Some(len) if head.is_success() => {
                self.body.reserve(len);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn chunk(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if self.body.len() + data.len() > self.limit {
            return Err(SinkError::TooLarge(self.limit));
        }
        self.body.extend_from_slice(data);
        Ok(())
    }
}

// Response bodies. Unknown fields are ignored, missing optional fields default.

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ZoneStatus {
    pub mute: bool,
    pub vol: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceInfo {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<String>,
    pub img_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceStatus {
    pub input: String,
    pub status: Option<String>,
    pub info: SourceInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamSummary {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamList {
    pub streams: Vec<StreamSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamDetails {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize)]
struct MutePatch {
    mute: bool,
}

#[derive(Serialize)]
struct VolumePatch {
    vol: i32,
}

#[derive(Serialize)]
struct InputPatch<'a> {
    input: &'a str,
}

/// Parse a JSON body, unescaping strings into a scratch buffer
pub fn parse_json<R: DeserializeOwned>(body: &[u8]) -> Result<R, ApiError> {
    let mut scratch = vec![0u8; body.len().max(16)];
    serde_json_core::from_slice_escaped::<R>(body, &mut scratch)
        .map(|(value, _)| value)
        .map_err(|_| ApiError::Parse)
}

fn to_body<T: Serialize>(value: &T) -> Result<heapless::String<64>, ApiError> {
    serde_json_core::to_string(value).map_err(|_| ApiError::Parse)
}

pub fn zone_path(zone: u8) -> Path {
    let mut path = Path::new();
    let _ = write!(path, "/api/zones/{zone}");
    path
}

pub fn source_path(source: u8) -> Path {
    let mut path = Path::new();
    let _ = write!(path, "/api/sources/{source}");
    path
}

pub fn stream_path(stream: u32) -> Path {
    let mut path = Path::new();
    let _ = write!(path, "/api/streams/{stream}");
    path
}

pub fn command_path(stream: u32, command: StreamCommand) -> Path {
    let mut path = Path::new();
    let _ = write!(path, "/api/streams/{stream}/{}", command.as_str());
    path
}

pub fn album_art_path(source: u8, width: i32) -> Path {
    let mut path = Path::new();
    let _ = write!(path, "/api/sources/{source}/image/{width}");
    path
}

/// Typed calls over a [`Transport`]
pub struct ApiClient<T> {
    transport: T,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send a request and buffer a 2xx body
    pub async fn call(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&str>,
        timeout_ms: u64,
        limit: usize,
    ) -> Result<Vec<u8>, ApiError> {
        let request = Request {
            method,
            path,
            body,
            timeout_ms,
        };
        let mut sink = CollectSink::new(limit);
        let status = self
            .transport
            .request(&request, &mut sink)
            .await
            .map_err(|err| match err {
                // An oversize body came from a live host, it just isn't usable
                TransportError::Sink(_) => ApiError::Parse,
                other => ApiError::Transport(other),
            })?;
        if !(200..300).contains(&status) {
            return Err(ApiError::Status(status));
        }
        Ok(sink.body)
    }

    async fn get_json<R: DeserializeOwned>(&mut self, path: &str, limit: usize) -> Result<R, ApiError> {
        let body = self.call(Method::Get, path, None, STATUS_TIMEOUT_MS, limit).await?;
        parse_json(&body)
    }

    pub async fn zone(&mut self, zone: u8) -> Result<ZoneStatus, ApiError> {
        self.get_json(&zone_path(zone), MAX_STATUS_BODY).await
    }

    pub async fn source(&mut self, source: u8) -> Result<SourceStatus, ApiError> {
        self.get_json(&source_path(source), MAX_STATUS_BODY).await
    }

    pub async fn streams(&mut self) -> Result<Vec<StreamSummary>, ApiError> {
        let list: StreamList = self.get_json("/api/streams", MAX_STREAMS_BODY).await?;
        Ok(list.streams)
    }

    pub async fn stream(&mut self, stream: u32) -> Result<StreamDetails, ApiError> {
        self.get_json(&stream_path(stream), MAX_STATUS_BODY).await
    }

    pub async fn album_art(&mut self, source: u8, width: i32) -> Result<Vec<u8>, ApiError> {
        let path = album_art_path(source, width);
        self.call(Method::Get, &path, None, TRANSFER_TIMEOUT_MS, MAX_ALBUM_ART).await
    }

    pub async fn set_mute(&mut self, zone: u8, mute: bool) -> Result<(), ApiError> {
        let body = to_body(&MutePatch { mute })?;
        self.write(Method::Patch, &zone_path(zone), &body).await
    }

    pub async fn set_volume(&mut self, zone: u8, vol: i32) -> Result<(), ApiError> {
        let body = to_body(&VolumePatch { vol })?;
        self.write(Method::Patch, &zone_path(zone), &body).await
    }

    pub async fn set_input(&mut self, source: u8, input: StreamInput) -> Result<(), ApiError> {
        let input = input.as_input();
        let body = to_body(&InputPatch { input: input.as_str() })?;
        self.write(Method::Patch, &source_path(source), &body).await
    }

    pub async fn command(&mut self, stream: u32, command: StreamCommand) -> Result<(), ApiError> {
        self.write(Method::Post, &command_path(stream, command), "{}").await
    }

    async fn write(&mut self, method: Method, path: &str, body: &str) -> Result<(), ApiError> {
        self.call(method, path, Some(body), STATUS_TIMEOUT_MS, MAX_STATUS_BODY)
            .await
            .map(|_| ())
    }
}
