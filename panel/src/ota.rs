//! Firmware update over HTTP
//!
//! The image is streamed straight from the response body into the inactive
//! flash slot. Any mismatch between the advertised and received image aborts
//! the attempt and the running firmware stays active.

use core::fmt::Debug;

use log::{info, warn};
use thiserror::Error;

use crate::api::{BodySink, Method, Request, ResponseHead, SinkError, Transport, TransportError, TRANSFER_TIMEOUT_MS};

const FIRMWARE_CONTENT_TYPE: &str = "application/octet-stream";
const PROGRESS_STEP: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtaError {
    #[error("transport: {0}")]
    Transport(TransportError),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("not a firmware image")]
    ContentType,
    #[error("no content length")]
    MissingLength,
    #[error("image of {needed} bytes exceeds {available} byte slot")]
    NoSpace { needed: usize, available: usize },
    #[error("received {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
    #[error("flash write failed")]
    Flash,
}

/// Destination for a downloaded firmware image
pub trait FirmwareWriter {
    type Error: Debug;

    /// Bytes available in the target slot
    fn capacity(&self) -> usize;

    /// Prepare the slot for an image of `len` bytes
    fn begin(&mut self, len: usize) -> Result<(), Self::Error>;

    /// Append the next chunk of the image
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Mark the written image as the one to boot
    fn finalize(&mut self) -> Result<(), Self::Error>;
}

struct OtaSink<'a, W> {
    writer: &'a mut W,
    expected: usize,
    written: usize,
    next_report: usize,
    error: Option<OtaError>,
}

impl<W: FirmwareWriter> OtaSink<'_, W> {
    fn fail(&mut self, err: OtaError) -> SinkError {
        self.error = Some(err);
        SinkError::Rejected
    }
}

impl<W: FirmwareWriter> BodySink for OtaSink<'_, W> {
    fn begin(&mut self, head: &ResponseHead<'_>) -> Result<(), SinkError> {
        if !head.is_success() {
            return Err(self.fail(OtaError::Status(head.status)));
        }
        if !head.content_type.starts_with(FIRMWARE_CONTENT_TYPE) {
            return Err(self.fail(OtaError::ContentType));
        }
        let Some(len) = head.content_length.filter(|len| *len > 0) else {
            return Err(self.fail(OtaError::MissingLength));
        };
        let available = self.writer.capacity();
        if len > available {
            return Err(self.fail(OtaError::NoSpace { needed: len, available }));
        }
        if let Err(err) = self.writer.begin(len) {
            warn!("OTA begin failed: {:?}", err);
            return Err(self.fail(OtaError::Flash));
        }
        info!("OTA: receiving {} byte image", len);
        self.expected = len;
        Ok(())
    }

    fn chunk(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if self.error.is_some() || self.expected == 0 {
            return Err(SinkError::Rejected);
        }
        let take = data.len().min(self.expected - self.written);
        if let Err(err) = self.writer.write(&data[..take]) {
            warn!("OTA write failed at {}: {:?}", self.written, err);
            return Err(self.fail(OtaError::Flash));
        }
        self.written += take;
        if self.written >= self.next_report {
            info!("OTA: {}/{} bytes", self.written, self.expected);
            self.next_report += PROGRESS_STEP;
        }
        Ok(())
    }
}

/// Download the image at `path` into `writer` and activate it.
///
/// Returns the image size; the caller restarts the device on success.
pub async fn run_update<T: Transport, W: FirmwareWriter>(
    transport: &mut T,
    writer: &mut W,
    path: &str,
) -> Result<usize, OtaError> {
    info!("OTA: fetching {}", path);
    let request = Request {
        method: Method::Get,
        path,
        body: None,
        timeout_ms: TRANSFER_TIMEOUT_MS,
    };
    let mut sink = OtaSink {
        writer,
        expected: 0,
        written: 0,
        next_report: PROGRESS_STEP,
        error: None,
    };
    let result = transport.request(&request, &mut sink).await;
    if let Some(err) = sink.error {
        return Err(err);
    }
    let status = result.map_err(OtaError::Transport)?;
    if !(200..300).contains(&status) {
        return Err(OtaError::Status(status));
    }
    if sink.expected == 0 {
        return Err(OtaError::MissingLength);
    }
    if sink.written != sink.expected {
        return Err(OtaError::ShortWrite {
            expected: sink.expected,
            written: sink.written,
        });
    }
    if let Err(err) = sink.writer.finalize() {
        warn!("OTA finalize failed: {:?}", err);
        return Err(OtaError::Flash);
    }
    info!("OTA: {} bytes written, image activated", sink.written);
    Ok(sink.written)
}
