use std::net::SocketAddr;

use http::{Method, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::HttpError;

const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// An inbound request as read off the proxy socket.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Origin-form request target: path plus optional query.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub peer: Option<SocketAddr>,
}

impl ProxyRequest {
    #[must_use]
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: Vec::new(),
            body: Vec::new(),
            peer: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// First header with the given name, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    /// Plain-text response carrying `message`.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: vec![(
                "Content-Type".to_owned(),
                "text/plain; charset=utf-8".to_owned(),
            )],
            body: message.as_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A request that could not be read; answered with `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WireError {
    pub(crate) status: u16,
    pub(crate) message: String,
}

impl WireError {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

pub(crate) async fn read_request(
    socket: &mut TcpStream,
    peer: SocketAddr,
) -> Result<ProxyRequest, WireError> {
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let header_end;

    loop {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| WireError::new(400, format!("Failed to read request: {}", err)))?;
        if bytes == 0 {
            return Err(WireError::new(400, "Empty request"));
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| WireError::new(400, "Invalid read length"))?;
        buffer.extend_from_slice(read_slice);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(WireError::new(413, "Request too large"));
        }
        if let Some(pos) = find_header_end(&buffer) {
            header_end = pos;
            break;
        }
    }

    let header_bytes = buffer
        .get(..header_end)
        .ok_or_else(|| WireError::new(400, "Malformed request headers"))?;
    let header_text = std::str::from_utf8(header_bytes)
        .map_err(|err| WireError::new(400, format!("Invalid request encoding: {}", err)))?;
    let (method, target, headers) = parse_head(header_text)?;

    if headers
        .iter()
        .any(|(key, _)| key.eq_ignore_ascii_case("transfer-encoding"))
    {
        return Err(WireError::new(411, "Chunked request bodies are not supported"));
    }
    let content_length = match headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
    {
        Some((_, value)) => value
            .parse::<usize>()
            .map_err(|err| WireError::new(400, format!("Invalid Content-Length: {}", err)))?,
        None => 0,
    };
    if content_length > MAX_REQUEST_BYTES {
        return Err(WireError::new(413, "Request body too large"));
    }

    let body_start = header_end
        .checked_add(4)
        .ok_or_else(|| WireError::new(400, "Malformed request headers"))?;
    let mut body = buffer.get(body_start..).unwrap_or_default().to_vec();
    while body.len() < content_length {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| WireError::new(400, format!("Failed to read body: {}", err)))?;
        if bytes == 0 {
            return Err(WireError::new(400, "Request body shorter than Content-Length"));
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| WireError::new(400, "Invalid read length"))?;
        body.extend_from_slice(read_slice);
    }
    body.truncate(content_length);

    Ok(ProxyRequest {
        method,
        target,
        headers,
        body,
        peer: Some(peer),
    })
}

type Head = (Method, String, Vec<(String, String)>);

fn parse_head(header_text: &str) -> Result<Head, WireError> {
    let mut lines = header_text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| WireError::new(400, "Missing request line"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| WireError::new(400, "Missing HTTP method"))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|err| WireError::new(400, format!("Invalid HTTP method: {}", err)))?;
    let target = parts
        .next()
        .ok_or_else(|| WireError::new(400, "Missing request path"))?;
    if !target.starts_with('/') {
        return Err(WireError::new(400, "Request target must be a path"));
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(WireError::new(400, "Malformed header"));
        };
        headers.push((key.trim().to_owned(), value.trim().to_owned()));
    }
    Ok((method, target.to_owned(), headers))
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn status_text(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}

/// Headers the server writes itself.
fn is_framing_header(name: &str) -> bool {
    ["content-length", "connection", "transfer-encoding"]
        .iter()
        .any(|framing| name.eq_ignore_ascii_case(framing))
}

pub(crate) async fn write_response(
    socket: &mut TcpStream,
    peer: SocketAddr,
    response: &ProxyResponse,
) -> Result<(), HttpError> {
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, status_text(response.status));
    for (key, value) in &response.headers {
        if is_framing_header(key) {
            continue;
        }
        head.push_str(key);
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    head.push_str("Content-Length: ");
    head.push_str(&response.body.len().to_string());
    head.push_str("\r\nConnection: close\r\n\r\n");

    socket
        .write_all(head.as_bytes())
        .await
        .map_err(|err| HttpError::Io {
            context: "write response head",
            peer,
            source: err,
        })?;
    socket
        .write_all(&response.body)
        .await
        .map_err(|err| HttpError::Io {
            context: "write response body",
            peer,
            source: err,
        })?;
    socket.flush().await.map_err(|err| HttpError::Io {
        context: "flush response",
        peer,
        source: err,
    })
}
