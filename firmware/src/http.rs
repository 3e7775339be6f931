//! Simple HTTP/1.1 client for no_std environments
//!
//! One request per connection (`Connection: close`). Supports GET, PATCH and
//! POST with an optional JSON body; the response body is streamed into a
//! [`BodySink`] as it arrives.

use alloc::boxed::Box;
use core::fmt::Write as FmtWrite;
use core::net::Ipv4Addr;
use core::str;

use amplipi_panel::api::{BodySink, Request, ResponseHead, SinkError, Transport, TransportError};
use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, with_timeout};
use embedded_io_async::Write;
use heapless::String;
use log::{debug, warn};

const SOCKET_RX_LEN: usize = 4096;
const SOCKET_TX_LEN: usize = 1024;
const HEADER_BUF_LEN: usize = 2048;

/// HTTP client error types
#[derive(Debug)]
pub enum HttpError {
    /// Failed to connect to server
    Connect,
    /// No connection within the request timeout
    Timeout,
    /// Failed to write request
    Write,
    /// Failed to read response
    Read,
    /// Response parsing error
    Parse,
    /// Request head or response headers too large
    TooLarge,
    /// Body encoding we don't decode
    Unsupported,
    /// The body sink refused the response
    Sink(SinkError),
}

impl From<HttpError> for TransportError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Connect => TransportError::Connect,
            HttpError::Timeout => TransportError::Timeout,
            HttpError::Write | HttpError::Read => TransportError::Io,
            HttpError::Parse | HttpError::TooLarge | HttpError::Unsupported => TransportError::Protocol,
            HttpError::Sink(e) => TransportError::Sink(e),
        }
    }
}

/// Send a request and stream the response body into `sink`
///
/// Returns the response status. Non-2xx responses are still handed to the
/// sink, which decides whether it wants them.
pub async fn exchange(
    socket: &mut TcpSocket<'_>,
    host: &str,
    request: &Request<'_>,
    rx_buf: &mut [u8],
    sink: &mut dyn BodySink,
) -> Result<u16, HttpError> {
    write_request(socket, host, request).await?;

    // Read until we find \r\n\r\n
    let mut total_read = 0;
    let headers_end = loop {
        if total_read >= rx_buf.len() {
            return Err(HttpError::TooLarge);
        }

        let n = socket
            .read(&mut rx_buf[total_read..])
            .await
            .map_err(|_| HttpError::Read)?;

        if n == 0 {
            return Err(HttpError::Read);
        }

        total_read += n;

        if let Some(pos) = find_header_end(&rx_buf[..total_read]) {
            break pos;
        }
    };
    let header_str = str::from_utf8(&rx_buf[..headers_end]).map_err(|_| HttpError::Parse)?;

    let status = parse_status(header_str)?;
    if parse_header(header_str, "transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
        return Err(HttpError::Unsupported);
    }
    let content_length = parse_header(header_str, "content-length").and_then(|v| v.parse().ok());
    let head = ResponseHead {
        status,
        content_length,
        content_type: parse_header(header_str, "content-type").unwrap_or(""),
    };
    debug!("{} {} -> {}", request.method.as_str(), request.path, status);
    sink.begin(&head).map_err(HttpError::Sink)?;

    // Body bytes that arrived with the headers
    let body_start = headers_end + 4;
    let mut body_read = 0;
    if total_read > body_start {
        let initial = &rx_buf[body_start..total_read];
        sink.chunk(initial).map_err(HttpError::Sink)?;
        body_read += initial.len();
    }

    loop {
        if content_length.is_some_and(|len| body_read >= len) {
            break;
        }

        let n = socket.read(rx_buf).await.map_err(|_| HttpError::Read)?;
        if n == 0 {
            break;
        }

        sink.chunk(&rx_buf[..n]).map_err(HttpError::Sink)?;
        body_read += n;
    }

    Ok(status)
}

async fn write_request(socket: &mut TcpSocket<'_>, host: &str, request: &Request<'_>) -> Result<(), HttpError> {
    let mut head: String<256> = String::new();
    write!(
        &mut head,
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
        request.method.as_str(),
        request.path,
        host
    )
    .map_err(|_| HttpError::TooLarge)?;
    if let Some(body) = request.body {
        write!(
            &mut head,
            "Content-Type: application/json\r\nContent-Length: {}\r\n",
            body.len()
        )
        .map_err(|_| HttpError::TooLarge)?;
    }
    head.push_str("\r\n").map_err(|_| HttpError::TooLarge)?;

    socket
        .write_all(head.as_bytes())
        .await
        .map_err(|_| HttpError::Write)?;
    if let Some(body) = request.body {
        socket
            .write_all(body.as_bytes())
            .await
            .map_err(|_| HttpError::Write)?;
    }
    socket.flush().await.map_err(|_| HttpError::Write)
}

/// Find the position of \r\n\r\n in the buffer
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse HTTP status code from status line
pub fn parse_status(headers: &str) -> Result<u16, HttpError> {
    // HTTP/1.1 200 OK
    let line = headers.lines().next().ok_or(HttpError::Parse)?;
    let mut parts = line.splitn(3, ' ');
    parts.next().filter(|v| v.starts_with("HTTP/")).ok_or(HttpError::Parse)?;
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or(HttpError::Parse)
}

/// Parse a header value (case-insensitive)
pub fn parse_header<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// [`Transport`] to a single AmpliPi host over an embassy-net TCP socket
pub struct HttpTransport<'a> {
    stack: Stack<'a>,
    endpoint: (Ipv4Addr, u16),
    host: String<64>,
    socket_rx: Box<[u8; SOCKET_RX_LEN]>,
    socket_tx: Box<[u8; SOCKET_TX_LEN]>,
    header_buf: Box<[u8; HEADER_BUF_LEN]>,
}

impl<'a> HttpTransport<'a> {
    /// `host` is sent as the `Host` header; `endpoint` is where it resolved to
    pub fn new(stack: Stack<'a>, host: &str, endpoint: (Ipv4Addr, u16)) -> Self {
        let mut host_header = String::new();
        if host_header.push_str(host).is_err() {
            // Too long for the header buffer, fall back to the address
            let _ = write!(host_header, "{}", endpoint.0);
        }
        Self {
            stack,
            endpoint,
            host: host_header,
            socket_rx: Box::new([0; SOCKET_RX_LEN]),
            socket_tx: Box::new([0; SOCKET_TX_LEN]),
            header_buf: Box::new([0; HEADER_BUF_LEN]),
        }
    }

    async fn connect_and_exchange(
        &mut self,
        request: &Request<'_>,
        sink: &mut dyn BodySink,
    ) -> Result<u16, HttpError> {
        let timeout = Duration::from_millis(request.timeout_ms);
        let mut socket = TcpSocket::new(self.stack, &mut self.socket_rx[..], &mut self.socket_tx[..]);
        // Aborts the socket after this long without traffic
        socket.set_timeout(Some(timeout));

        with_timeout(timeout, socket.connect(self.endpoint))
            .await
            .map_err(|_| HttpError::Timeout)?
            .map_err(|_| HttpError::Connect)?;

        let result = exchange(&mut socket, &self.host, request, &mut self.header_buf[..], sink).await;
        socket.close();
        result
    }
}

impl Transport for HttpTransport<'_> {
    async fn request(&mut self, request: &Request<'_>, sink: &mut dyn BodySink) -> Result<u16, TransportError> {
        self.connect_and_exchange(request, sink).await.map_err(|e| {
            warn!("{} {} failed: {:?}", request.method.as_str(), request.path, e);
            TransportError::from(e)
        })
    }
}
