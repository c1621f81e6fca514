//! Request dispatch.
//!
//! Takes one raw frame off the control socket, triages it into a typed
//! request, routes it to the matching handler, and renders the reply. The
//! handlers validate parameters and call into the service facade; none of
//! them touch the watch index or the queues directly.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::protocol::{
    reply_data, reply_error, reply_events, reply_status, reply_success, Request,
};
use crate::service::Service;

/// Handle one request frame, producing exactly one reply frame.
pub fn dispatch(service: &Service, frame: &str) -> String {
    let request = match triage(frame) {
        Ok(request) => request,
        Err(e) => return reply_error(e),
    };

    debug!(call = %request.call, "dispatching call");

    match request.call.as_str() {
        "ping" => reply_data(Value::from("pong")),
        "status" => {
            let (watches, uptime) = service.status();
            reply_status(watches, &uptime)
        }
        "watch" => handle_watch(service, &request),
        "unwatch" => with_path(&request, |path| service.unwatch(path).map(|()| reply_success())),
        "pause" => with_path(&request, |path| service.pause(path).map(|()| reply_success())),
        "unpause" => with_path(&request, |path| service.unpause(path).map(|()| reply_success())),
        "get_queue_size" => with_path(&request, |path| {
            service.queue_size(path).map(|n| reply_data(Value::from(n)))
        }),
        "get_events" => handle_get_events(service, &request),
        "get_roots" => reply_data(Value::from(service.roots())),
        other => {
            warn!(call = other, "unknown call");
            reply_error(ClientError::BadCall)
        }
    }
}

/// Sort junk from JSON before committing to a full parse: empty frames,
/// frames that are not even brace-delimited, unparseable JSON, and objects
/// missing the mandatory `call` field each get their own error code.
fn triage(frame: &str) -> Result<Request, ClientError> {
    let frame = frame.trim();
    if frame.is_empty() {
        return Err(ClientError::ZeroByteMessage);
    }
    if !frame.starts_with('{') || !frame.ends_with('}') {
        return Err(ClientError::InvalidJson);
    }
    let value: Value = serde_json::from_str(frame).map_err(|_| ClientError::JsonParse)?;
    if !value.get("call").map(Value::is_string).unwrap_or(false) {
        return Err(ClientError::JsonKeyMissing);
    }
    serde_json::from_value(value).map_err(|_| ClientError::JsonParse)
}

fn with_path<F>(request: &Request, f: F) -> String
where
    F: FnOnce(&str) -> Result<String, ClientError>,
{
    match request.path.as_deref() {
        Some(path) => f(path).unwrap_or_else(reply_error),
        None => {
            warn!(call = %request.call, "request is missing the 'path' field");
            reply_error(ClientError::JsonKeyMissing)
        }
    }
}

fn handle_watch(service: &Service, request: &Request) -> String {
    with_path(request, |path| {
        service
            .watch(path, request.mask, request.max_events, request.rewatch)
            .map(|()| reply_success())
    })
}

fn handle_get_events(service: &Service, request: &Request) -> String {
    // An absent count fetches a single event; zero fetches the whole queue;
    // anything negative is a client bug worth naming.
    let count = match request.count {
        None => 1,
        Some(n) if n < 0 => return reply_error(ClientError::InvalidEventCount),
        Some(n) => n as usize,
    };
    with_path(request, |path| {
        service.events(path, count).map(|events| reply_events(&events))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triage_distinguishes_the_error_codes() {
        assert_eq!(triage("").unwrap_err(), ClientError::ZeroByteMessage);
        assert_eq!(triage("   ").unwrap_err(), ClientError::ZeroByteMessage);
        assert_eq!(triage("hello").unwrap_err(), ClientError::InvalidJson);
        assert_eq!(triage("{\"call\":").unwrap_err(), ClientError::JsonParse);
        assert_eq!(
            triage("{\"path\":\"/tmp\"}").unwrap_err(),
            ClientError::JsonKeyMissing
        );
        assert_eq!(
            triage("{\"call\":42}").unwrap_err(),
            ClientError::JsonKeyMissing
        );
        assert!(triage("{\"call\":\"ping\"}").is_ok());
    }
}
