use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Room requests and summaries.
pub mod room;
/// Server-Sent Events payloads.
pub mod sse;
/// Custom validators.
pub mod validation;
/// WebSocket frames.
pub mod ws;

fn format_timestamp_ms(ms: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}
