//! W3C trace context generation and `traceparent` encoding.
//!
//! Header format (version `00`):
//! `00-{trace id, 32 lowercase hex}-{span id, 16 lowercase hex}-{flags, 2 hex}`.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};

/// Outbound header carrying the encoded context.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const VERSION: u8 = 0x00;
const FLAG_SAMPLED: u8 = 0x01;

/// Correlation identifiers for one request.
///
/// Generated fresh per request and owned by that request's lifecycle. The
/// trace id is also the lookup key into the span store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct TraceContext {
    trace_id: u128,
    span_id: u64,
    flags: u8,
}

impl TraceContext {
    /// Generate a sampled context from the thread-local CSPRNG.
    ///
    /// All-zero ids are invalid in W3C trace context and are redrawn.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let trace_id = loop {
            let id: u128 = rng.gen();
            if id != 0 {
                break id;
            }
        };
        let span_id = loop {
            let id: u64 = rng.gen();
            if id != 0 {
                break id;
            }
        };
        Self {
            trace_id,
            span_id,
            flags: FLAG_SAMPLED,
        }
    }

    /// Build a context from known ids. Returns `None` if either id is zero.
    pub fn from_parts(trace_id: u128, span_id: u64, flags: u8) -> Option<Self> {
        if trace_id == 0 || span_id == 0 {
            return None;
        }
        Some(Self {
            trace_id,
            span_id,
            flags,
        })
    }

    pub fn trace_id(&self) -> u128 {
        self.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    /// Trace id as 32 lowercase hex characters, the span store key.
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    /// Span id as 16 lowercase hex characters.
    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }

    /// Encode as a `traceparent` header value.
    pub fn encode(&self) -> String {
        format!(
            "{:02x}-{:032x}-{:016x}-{:02x}",
            VERSION, self.trace_id, self.span_id, self.flags
        )
    }

    /// Parse a version `00` `traceparent` header value.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let (version, trace_id, span_id, flags) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || version != "00" {
            return None;
        }
        if trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
            return None;
        }
        let is_lower_hex = |s: &str| s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !is_lower_hex(trace_id) || !is_lower_hex(span_id) || !is_lower_hex(flags) {
            return None;
        }

        Self::from_parts(
            u128::from_str_radix(trace_id, 16).ok()?,
            u64::from_str_radix(span_id, 16).ok()?,
            u8::from_str_radix(flags, 16).ok()?,
        )
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Serialized as the `traceparent` string so reports stay readable.
impl Serialize for TraceContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl TryFrom<String> for TraceContext {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid traceparent '{}'", value))
    }
}
