//! Minimal HTTP/1.1 head codec
//!
//! Only the request line, status line and header block are handled here.
//! Reading stops right after the blank line that terminates the head, so
//! anything the peer sent eagerly afterwards stays in the buffered reader
//! and is delivered as tunnel payload.

use std::fmt::Write as _;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Upper bound for a request or response head
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Ordered header list with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`, if present
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Append a header, keeping existing values with the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Builder-style [`Headers::append`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    fn encode_into(&self, out: &mut String) {
        for (name, value) in self.iter() {
            let _ = write!(out, "{}: {}\r\n", name, value);
        }
        out.push_str("\r\n");
    }
}

/// Parsed request line and headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Headers,
}

impl RequestHead {
    pub fn new(method: impl Into<String>, target: impl Into<String>, headers: Headers) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            version: "HTTP/1.1".to_string(),
            headers,
        }
    }

    /// Read a request head. Returns `None` if the peer closed before sending anything.
    pub async fn read<R>(reader: &mut R) -> io::Result<Option<Self>>
    where
        R: AsyncBufRead + Unpin,
    {
        let Some(lines) = read_head_lines(reader).await? else {
            return Ok(None);
        };

        let mut parts = lines[0].split_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid(format!("malformed request line: {:?}", lines[0])));
        };
        if !version.starts_with("HTTP/") {
            return Err(invalid(format!("unsupported HTTP version: {:?}", version)));
        }

        Ok(Some(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers: parse_headers(&lines[1..])?,
        }))
    }

    /// Request path without query, for both origin-form and absolute-form targets
    pub fn path(&self) -> &str {
        let target = self.target.as_str();
        let path = match target.find("://") {
            Some(scheme_end) => {
                let rest = &target[scheme_end + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
            }
            None => target,
        };
        path.split(['?', '#']).next().unwrap_or(path)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", self.method, self.target, self.version);
        self.headers.encode_into(&mut out);
        out.into_bytes()
    }
}

/// Parsed status line and headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    pub fn new(status: u16, headers: Headers) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status,
            reason: reason_phrase(status).to_string(),
            headers,
        }
    }

    /// Read a response head. A peer that closes before the blank line is an error.
    pub async fn read<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let lines = read_head_lines(reader).await?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before response")
        })?;

        let mut parts = lines[0].splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(invalid(format!("malformed status line: {:?}", lines[0])));
        }
        let status = parts
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(|| invalid(format!("malformed status line: {:?}", lines[0])))?;
        let reason = parts.next().unwrap_or_default().trim();

        Ok(Self {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
            headers: parse_headers(&lines[1..])?,
        })
    }

    /// `"<code> <reason>"`, used in error messages
    pub fn status_text(&self) -> String {
        if self.reason.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.reason)
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", self.version, self.status, self.reason);
        self.headers.encode_into(&mut out);
        out.into_bytes()
    }
}

/// Reason phrase for the status codes this crate emits
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        407 => "Proxy Authentication Required",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// Read CRLF/LF terminated lines up to and excluding the blank line
async fn read_head_lines<R>(reader: &mut R) -> io::Result<Option<Vec<String>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut total = 0usize;

    loop {
        let mut line = String::new();
        let limit = (MAX_HEAD_SIZE - total) as u64;
        let n = (&mut *reader).take(limit).read_line(&mut line).await?;

        if n == 0 {
            if lines.is_empty() && total == 0 {
                return Ok(None);
            }
            if total >= MAX_HEAD_SIZE {
                return Err(invalid("HTTP head too large"));
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside HTTP head",
            ));
        }
        total += n;

        if !line.ends_with('\n') {
            if total >= MAX_HEAD_SIZE {
                return Err(invalid("HTTP head too large"));
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside HTTP head",
            ));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            // Tolerate stray blank lines before the start line
            if lines.is_empty() {
                continue;
            }
            return Ok(Some(lines));
        }
        lines.push(line.to_string());
    }
}

fn parse_headers(lines: &[String]) -> io::Result<Headers> {
    let mut headers = Headers::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid(format!("malformed header line: {:?}", line)))?;
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(invalid(format!("malformed header name: {:?}", name)));
        }
        headers.append(name, value.trim());
    }
    Ok(headers)
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}
