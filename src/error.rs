//! Client-visible error codes.
//!
//! Every failure reported over the control socket carries a stable integer
//! code and a fixed message. Codes extend a bitmask series so existing
//! clients can match on them numerically; new codes continue the series and
//! old ones never change value.

use thiserror::Error;

/// Errors surfaced to control-socket clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Message is not valid JSON")]
    InvalidJson,

    #[error("Failed to parse JSON message")]
    JsonParse,

    #[error("Required JSON field is missing")]
    JsonKeyMissing,

    #[error("Failed to watch tree")]
    WatchFailed,

    #[error("Failed to unwatch tree")]
    UnwatchFailed,

    #[error("Invalid event count")]
    InvalidEventCount,

    #[error("Received zero byte message")]
    ZeroByteMessage,

    #[error("Path is not a watched root")]
    NotWatched,

    #[error("Socket error, please reconnect")]
    SocketReconnect,

    #[error("Path is already a watched root")]
    AlreadyWatched,

    #[error("Path is the parent of a watched root")]
    ParentOfRoot,

    #[error("Path is inside a watched root")]
    ChildOfRoot,

    #[error("Directory does not exist")]
    DoesNotExist,

    #[error("Event queue is full")]
    QueueFull,

    #[error("Path must be absolute")]
    NotAbsolutePath,

    #[error("Failed to create background worker")]
    ThreadCreateFailed,

    #[error("Memory allocation failed")]
    MemoryAllocation,

    #[error("Root is being destroyed")]
    BeingDestroyed,

    #[error("Unknown call")]
    BadCall,
}

impl ClientError {
    /// Stable wire code for this error.
    pub fn code(&self) -> u32 {
        match self {
            ClientError::InvalidJson => 0x0001,
            ClientError::JsonParse => 0x0002,
            ClientError::JsonKeyMissing => 0x0004,
            ClientError::WatchFailed => 0x0008,
            ClientError::UnwatchFailed => 0x0010,
            ClientError::InvalidEventCount => 0x0020,
            ClientError::ZeroByteMessage => 0x0040,
            ClientError::NotWatched => 0x0080,
            ClientError::SocketReconnect => 0x0100,
            ClientError::AlreadyWatched => 0x0200,
            ClientError::ParentOfRoot => 0x0400,
            ClientError::ChildOfRoot => 0x0800,
            ClientError::DoesNotExist => 0x1000,
            ClientError::QueueFull => 0x2000,
            ClientError::NotAbsolutePath => 0x4000,
            ClientError::ThreadCreateFailed => 0x8000,
            ClientError::MemoryAllocation => 0x0001_0000,
            ClientError::BeingDestroyed => 0x0002_0000,
            ClientError::BadCall => 0x0004_0000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        // Deployed clients match on these values; they are frozen.
        assert_eq!(ClientError::InvalidJson.code(), 0x0001);
        assert_eq!(ClientError::NotWatched.code(), 0x0080);
        assert_eq!(ClientError::SocketReconnect.code(), 0x0100);
        assert_eq!(ClientError::BeingDestroyed.code(), 0x0002_0000);
    }

    #[test]
    fn codes_are_distinct() {
        let all = [
            ClientError::InvalidJson,
            ClientError::JsonParse,
            ClientError::JsonKeyMissing,
            ClientError::WatchFailed,
            ClientError::UnwatchFailed,
            ClientError::InvalidEventCount,
            ClientError::ZeroByteMessage,
            ClientError::NotWatched,
            ClientError::SocketReconnect,
            ClientError::AlreadyWatched,
            ClientError::ParentOfRoot,
            ClientError::ChildOfRoot,
            ClientError::DoesNotExist,
            ClientError::QueueFull,
            ClientError::NotAbsolutePath,
            ClientError::ThreadCreateFailed,
            ClientError::MemoryAllocation,
            ClientError::BeingDestroyed,
            ClientError::BadCall,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code(), "{a:?} vs {b:?}");
            }
        }
    }
}
