//! Test doubles for the hardware and network seams

use std::collections::HashMap;
use std::convert::Infallible;

use crate::api::{BodySink, Method, Request, ResponseHead, Transport, TransportError};
use crate::config::{ConfigStore, StorageError, StoredFile};
use crate::dirty::Region;
use crate::ota::FirmwareWriter;
use crate::render::Canvas;
use crate::state::ControllerState;
use crate::touch::{TouchEvent, TouchSource};

/// A request as the fake transport saw it
#[derive(Debug, Clone)]
pub struct Sent {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Body {
        status: u16,
        content_type: &'static str,
        content_length: Option<usize>,
        body: Vec<u8>,
    },
    Fail(TransportError),
}

impl Reply {
    pub fn body(status: u16, content_type: &'static str, body: Vec<u8>) -> Self {
        Reply::Body {
            status,
            content_type,
            content_length: Some(body.len()),
            body,
        }
    }

    pub fn without_length(self) -> Self {
        self.with_length_opt(None)
    }

    pub fn with_length(self, len: usize) -> Self {
        self.with_length_opt(Some(len))
    }

    fn with_length_opt(self, len: Option<usize>) -> Self {
        match self {
            Reply::Body { status, content_type, body, .. } => Reply::Body {
                status,
                content_type,
                content_length: len,
                body,
            },
            fail => fail,
        }
    }
}

/// Canned responses keyed by method and path. Unknown routes answer `200 {}`.
#[derive(Default)]
pub struct FakeTransport {
    routes: HashMap<(Method, String), Reply>,
    pub sent: Vec<Sent>,
}

impl FakeTransport {
    pub fn reply(&mut self, method: Method, path: &str, reply: Reply) {
        self.routes.insert((method, path.to_string()), reply);
    }

    pub fn respond(&mut self, method: Method, path: &str, status: u16, body: &[u8]) {
        self.reply(method, path, Reply::body(status, "application/json", body.to_vec()));
    }

    pub fn fail(&mut self, method: Method, path: &str, err: TransportError) {
        self.reply(method, path, Reply::Fail(err));
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.sent.iter().filter(|s| s.method == method && s.path == path).count()
    }
}

impl Transport for FakeTransport {
    async fn request(
        &mut self,
        request: &Request<'_>,
        sink: &mut dyn BodySink,
    ) -> Result<u16, TransportError> {
        self.sent.push(Sent {
            method: request.method,
            path: request.path.to_string(),
            body: request.body.map(str::to_string),
        });
        let reply = self
            .routes
            .get(&(request.method, request.path.to_string()))
            .cloned()
            .unwrap_or_else(|| Reply::body(200, "application/json", b"{}".to_vec()));
        match reply {
            Reply::Fail(err) => Err(err),
            Reply::Body {
                status,
                content_type,
                content_length,
                body,
            } => {
                let head = ResponseHead {
                    status,
                    content_length,
                    content_type,
                };
                sink.begin(&head).map_err(TransportError::Sink)?;
                for chunk in body.chunks(512) {
                    sink.chunk(chunk).map_err(TransportError::Sink)?;
                }
                Ok(status)
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub files: HashMap<StoredFile, Vec<u8>>,
    offline: bool,
}

impl MemoryStore {
    /// A store whose device failed to mount
    pub fn unavailable() -> Self {
        Self {
            files: HashMap::new(),
            offline: true,
        }
    }
}

impl ConfigStore for MemoryStore {
    fn read(&mut self, file: StoredFile, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.offline {
            return Err(StorageError::Unavailable);
        }
        let data = self.files.get(&file).ok_or(StorageError::NotFound)?;
        let dest = buf.get_mut(..data.len()).ok_or(StorageError::TooLarge)?;
        dest.copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, file: StoredFile, data: &[u8]) -> Result<(), StorageError> {
        if self.offline {
            return Err(StorageError::Unavailable);
        }
        self.files.insert(file, data.to_vec());
        Ok(())
    }

    fn remove(&mut self, file: StoredFile) -> Result<(), StorageError> {
        if self.offline {
            return Err(StorageError::Unavailable);
        }
        self.files.remove(&file);
        Ok(())
    }
}

/// Records what the renderer asked for
#[derive(Default)]
pub struct RecordingCanvas {
    pub clears: usize,
    pub drawn: Vec<Region>,
    pub backlight: Option<bool>,
}

impl RecordingCanvas {
    /// Forget draws so far, keeping the backlight state
    pub fn reset(&mut self) {
        self.clears = 0;
        self.drawn.clear();
    }
}

impl Canvas for RecordingCanvas {
    type Error = Infallible;

    fn clear(&mut self) -> Result<(), Infallible> {
        self.clears += 1;
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), Infallible> {
        self.backlight = Some(on);
        Ok(())
    }

    fn draw(&mut self, region: Region, _state: &ControllerState) -> Result<(), Infallible> {
        self.drawn.push(region);
        Ok(())
    }
}

/// Yields at most one touch
#[derive(Default)]
pub struct ScriptedTouch(Option<TouchEvent>);

impl ScriptedTouch {
    pub fn at(x: i32, y: i32) -> Self {
        Self(Some(TouchEvent { x, y }))
    }
}

impl TouchSource for ScriptedTouch {
    fn poll(&mut self) -> Option<TouchEvent> {
        self.0.take()
    }
}

pub struct FakeFlash {
    pub capacity: usize,
    pub data: Vec<u8>,
    pub begun: bool,
    pub finalized: bool,
    pub fail_writes: bool,
}

impl FakeFlash {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: Vec::new(),
            begun: false,
            finalized: false,
            fail_writes: false,
        }
    }
}

impl FirmwareWriter for FakeFlash {
    type Error = &'static str;

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn begin(&mut self, _len: usize) -> Result<(), Self::Error> {
        self.begun = true;
        self.data.clear();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err("write failed");
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Self::Error> {
        self.finalized = true;
        Ok(())
    }
}
