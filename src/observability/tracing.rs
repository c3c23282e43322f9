//! Distributed trace context.
//!
//! # Responsibilities
//! - Extract trace context from incoming requests (`traceparent`, `baggage`)
//! - Derive child spans for outbound calls
//! - Inject trace context into outbound request headers
//!
//! # Design Decisions
//! - W3C Trace Context and W3C Baggage header formats
//! - `TraceContext` is immutable; `child()` returns a new value
//! - Malformed `traceparent` starts a fresh trace instead of failing the request

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use rand::Rng;

pub const TRACEPARENT: &str = "traceparent";
pub const BAGGAGE: &str = "baggage";

const VERSION: u8 = 0x00;
const FLAG_SAMPLED: u8 = 0x01;

/// 128-bit trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let id: u128 = rng.gen();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// 64-bit span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let id: u64 = rng.gen();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Trace identity of one unit of work plus propagated baggage.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    flags: u8,
    baggage: Arc<BTreeMap<String, String>>,
}

impl TraceContext {
    /// Start a new trace with no parent.
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            parent_span_id: None,
            flags: FLAG_SAMPLED,
            baggage: Arc::new(BTreeMap::new()),
        }
    }

    /// Build the server-side context for an inbound request.
    ///
    /// When the caller sent a valid `traceparent`, the new span is a child of
    /// the caller's span; otherwise a fresh trace is started.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let baggage = headers
            .get_all(BAGGAGE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_baggage)
            .collect::<BTreeMap<_, _>>();

        let parent = headers
            .get(TRACEPARENT)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_traceparent);

        match parent {
            Some((trace_id, parent_span, flags)) => Self {
                trace_id,
                span_id: SpanId::random(),
                parent_span_id: Some(parent_span),
                flags,
                baggage: Arc::new(baggage),
            },
            None => Self {
                baggage: Arc::new(baggage),
                ..Self::new_root()
            },
        }
    }

    /// Derive a child span sharing this trace and baggage.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            parent_span_id: Some(self.span_id),
            flags: self.flags,
            baggage: Arc::clone(&self.baggage),
        }
    }

    /// Return a copy with one more baggage entry.
    pub fn with_baggage(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut baggage = (*self.baggage).clone();
        baggage.insert(key.into(), value.into());
        Self {
            baggage: Arc::new(baggage),
            ..self.clone()
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    pub fn baggage(&self) -> &BTreeMap<String, String> {
        &self.baggage
    }

    /// Render the `traceparent` header value for this span.
    pub fn traceparent(&self) -> String {
        format!(
            "{:02x}-{}-{}-{:02x}",
            VERSION, self.trace_id, self.span_id, self.flags
        )
    }

    /// Render the `baggage` header value, if there is any baggage.
    pub fn baggage_header(&self) -> Option<String> {
        if self.baggage.is_empty() {
            return None;
        }
        Some(
            self.baggage
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Write `traceparent` and `baggage` into outbound headers.
    pub fn inject(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.traceparent()) {
            headers.insert(TRACEPARENT, value);
        }
        if let Some(baggage) = self.baggage_header() {
            match HeaderValue::from_str(&baggage) {
                Ok(value) => {
                    headers.insert(BAGGAGE, value);
                }
                Err(_) => tracing::debug!(trace_id = %self.trace_id, "Dropping baggage with invalid header characters"),
            }
        }
    }
}

/// Parse `version-traceid-spanid-flags`.
fn parse_traceparent(value: &str) -> Option<(TraceId, SpanId, u8)> {
    let mut parts = value.trim().split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;

    if version.len() != 2 || trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
        return None;
    }
    let version = u8::from_str_radix(version, 16).ok()?;
    if version == 0xff || (version == VERSION && parts.next().is_some()) {
        return None;
    }
    if !is_lower_hex(trace_id) || !is_lower_hex(span_id) {
        return None;
    }

    let trace_id = u128::from_str_radix(trace_id, 16).ok()?;
    let span_id = u64::from_str_radix(span_id, 16).ok()?;
    let flags = u8::from_str_radix(flags, 16).ok()?;
    if trace_id == 0 || span_id == 0 {
        return None;
    }
    Some((TraceId(trace_id), SpanId(span_id), flags))
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Parse `key=value;props,key2=value2`. Properties are discarded.
fn parse_baggage(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|member| {
            let entry = member.split(';').next()?;
            let (key, value) = entry.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
