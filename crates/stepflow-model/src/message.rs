//! Message container carried by an exchange.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde_json::Value;
use tokio::io::AsyncRead;

use crate::stream_cache::StreamCache;

/// Longest body snapshot rendered into trace events.
pub const BODY_PREVIEW_LIMIT: usize = 128;

/// A single-consumption stream body.
///
/// Once read it cannot be rewound; the stream-caching advice converts it
/// into a replayable [`StreamCache`] before the target runs.
pub type BodyStream = Box<dyn AsyncRead + Send + Unpin>;

/// Message payload.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    Json(Value),
    /// Single-consumption stream, readable exactly once.
    Stream(BodyStream),
    /// Replayable cached form produced by the stream-caching advice.
    Cached(StreamCache),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Body::Cached(_))
    }

    /// Bytes of an in-memory body, if it has one.
    pub fn as_bytes(&self) -> Option<Bytes> {
        match self {
            Body::Bytes(b) => Some(b.clone()),
            Body::Text(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
            _ => None,
        }
    }

    /// Short lossy rendering for trace events; streams are never consumed
    /// here.
    pub fn preview(&self, limit: usize) -> Option<String> {
        let text = match self {
            Body::Empty | Body::Stream(_) => return None,
            Body::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Body::Text(s) => s.clone(),
            Body::Json(v) => v.to_string(),
            Body::Cached(c) => format!("<cached {} bytes>", c.len()),
        };
        Some(match text.char_indices().nth(limit) {
            Some((at, _)) => format!("{}...", &text[..at]),
            None => text,
        })
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Body::Text(s) => write!(f, "Text({} chars)", s.len()),
            Body::Json(_) => write!(f, "Json"),
            Body::Stream(_) => write!(f, "Stream"),
            Body::Cached(c) => write!(f, "Cached({} bytes)", c.len()),
        }
    }
}

/// The message carried by an exchange: a body plus a header map with
/// unique string keys.
#[derive(Debug, Default)]
pub struct Message {
    body: Body,
    headers: HashMap<String, Value>,
}

impl Message {
    pub fn new(body: Body) -> Self {
        Self {
            body,
            headers: HashMap::new(),
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// Take the body out, leaving [`Body::Empty`] behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    /// Insert a header, replacing any existing value for the same key.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.headers.remove(name)
    }

    pub fn headers(&self) -> &HashMap<String, Value> {
        &self.headers
    }
}
