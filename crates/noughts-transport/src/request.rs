//! The pre-upgrade view of an incoming WebSocket request.
//!
//! Browsers cannot attach custom headers to a WebSocket handshake, so the
//! bearer token travels in the query string. Everything the admission step
//! needs is therefore on the HTTP request line.

use crate::TransportError;

/// Path and query of a WebSocket upgrade request, read before upgrading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    path: String,
    query: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Parses an HTTP/1.1 request line such as
    /// `GET /api/ws/game/12?token=abc HTTP/1.1`.
    pub fn parse_request_line(line: &str) -> Result<Self, TransportError> {
        let mut parts = line.split_ascii_whitespace();
        let method = parts.next().unwrap_or_default();
        let target = parts.next().ok_or_else(|| {
            TransportError::MalformedRequest("missing request target".into())
        })?;
        if method != "GET" {
            return Err(TransportError::MalformedRequest(format!(
                "unsupported method {method}"
            )));
        }
        Ok(Self::from_target(target))
    }

    /// Builds a request from a raw target (`/path?query`).
    pub fn from_target(target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (percent_decode(k), percent_decode(v)),
                None => (percent_decode(pair), String::new()),
            })
            .collect();
        Self {
            path: path.to_string(),
            query,
        }
    }

    /// The request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The first value of a query parameter, if present and non-empty.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// Decodes `%XX` escapes and `+`. Invalid escapes are kept verbatim.
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// An HTTP status returned instead of upgrading a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status code.
    pub status: u16,
    /// Plain-text body.
    pub reason: String,
}

impl Rejection {
    /// Creates a rejection with an arbitrary status.
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(400, reason)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(401, reason)
    }

    /// 403 Forbidden.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::new(403, reason)
    }

    /// 404 Not Found.
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(404, reason)
    }

    /// 409 Conflict.
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::new(409, reason)
    }
}
