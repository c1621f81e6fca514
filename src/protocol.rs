//! Wire types for the control protocol.
//!
//! One UTF-8 JSON object per line in each direction. Requests carry a `call`
//! field plus call-specific parameters; replies are `{"data": ...}` for
//! queries, `{"success": 1}` for mutations, and
//! `{"error": {"code": N, "message": "..."}}` for failures.

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::event::Event;

// ═══════════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════════

/// A parsed control request. Every parameter is optional at the wire level;
/// handlers decide which ones their call requires.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub call: String,
    #[serde(default)]
    pub path: Option<String>,
    /// Event mask; 0 means "use the default mask".
    #[serde(default)]
    pub mask: u32,
    /// Queue bound; 0 means "use the configured default".
    #[serde(default)]
    pub max_events: usize,
    /// Whether this root joins the persisted restart set.
    #[serde(default)]
    pub rewatch: bool,
    /// Event count for `get_events`; absent means one, 0 means all.
    #[serde(default)]
    pub count: Option<i64>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Replies
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u32,
    message: String,
}

/// The client-visible projection of a queued event. The watch descriptor and
/// name length stay internal; the cookie is only present when the kernel set
/// one (moves).
#[derive(Debug, Serialize)]
pub struct EventPayload {
    pub name: String,
    pub path: String,
    pub mask: u32,
    #[serde(skip_serializing_if = "cookie_is_zero")]
    pub cookie: u32,
}

fn cookie_is_zero(cookie: &u32) -> bool {
    *cookie == 0
}

impl From<&Event> for EventPayload {
    fn from(event: &Event) -> Self {
        Self {
            name: event.name.clone(),
            path: event.path.clone(),
            mask: event.mask,
            cookie: event.cookie,
        }
    }
}

pub fn reply_success() -> String {
    r#"{"success":1}"#.to_string()
}

pub fn reply_data(data: serde_json::Value) -> String {
    serde_json::json!({ "data": data }).to_string()
}

pub fn reply_error(err: ClientError) -> String {
    serde_json::json!({
        "error": ErrorBody {
            code: err.code(),
            message: err.to_string(),
        }
    })
    .to_string()
}

pub fn reply_events(events: &[Event]) -> String {
    let payloads: Vec<EventPayload> = events.iter().map(EventPayload::from).collect();
    serde_json::json!({ "data": payloads }).to_string()
}

pub fn reply_status(watches: usize, uptime: &str) -> String {
    serde_json::json!({ "watches": watches, "uptime": uptime }).to_string()
}
