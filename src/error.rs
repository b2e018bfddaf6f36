//! Error types for the peerchat session layer
//!
//! Engine-level sentinel results are translated into these typed
//! errors at the session boundary and never leak to callers as raw
//! codes.

use crate::types::{FriendId, GroupId};

// ----------------------------------------------------------------------------
// Friend Add Rejections
// ----------------------------------------------------------------------------

/// Typed rejection codes for friend-add commands, mirroring the
/// engine's negative result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FriendAddError {
    #[error("message is too long")]
    MessageTooLong,
    #[error("a request message is required")]
    NoMessage,
    #[error("cannot add own address as a friend")]
    OwnKey,
    #[error("a request was already sent to this address")]
    AlreadySent,
    #[error("address checksum is invalid")]
    BadChecksum,
    #[error("address has a new nospam value")]
    NewNospam,
    #[error("engine is out of memory")]
    OutOfMemory,
    #[error("engine rejected the request (code {0})")]
    Unknown(i32),
}

impl FriendAddError {
    /// Translate a raw engine failure code.
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => FriendAddError::MessageTooLong,
            -2 => FriendAddError::NoMessage,
            -3 => FriendAddError::OwnKey,
            -4 => FriendAddError::AlreadySent,
            -6 => FriendAddError::BadChecksum,
            -7 => FriendAddError::NewNospam,
            -8 => FriendAddError::OutOfMemory,
            other => FriendAddError::Unknown(other),
        }
    }
}

// ----------------------------------------------------------------------------
// Crate Error
// ----------------------------------------------------------------------------

/// Errors surfaced by the session layer.
#[derive(Debug, thiserror::Error)]
pub enum PeerchatError {
    /// The engine could not be allocated; the session is unusable.
    #[error("engine initialization failed: {reason}")]
    Init { reason: String },

    /// The session has been closed; no further operations are possible.
    #[error("session is closed")]
    Closed,

    /// A command or query referenced a friend the registry does not know.
    #[error("no such friend: {0}")]
    FriendNotFound(FriendId),

    /// A command or query referenced a group the registry does not know.
    #[error("no such group: {0}")]
    GroupNotFound(GroupId),

    /// A caller-supplied value was malformed, oversized, or empty where
    /// content is required.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A friend-add command was rejected by the engine.
    #[error("friend request rejected: {0}")]
    FriendAdd(#[from] FriendAddError),

    /// The engine returned a failure code this layer has no specific
    /// meaning for; the code is carried through verbatim.
    #[error("engine rejected the operation (code {code})")]
    EngineRejected { code: i32 },

    /// Reading or writing a session blob failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] std::io::Error),
}

impl PeerchatError {
    pub fn invalid_argument<T: Into<String>>(reason: T) -> Self {
        PeerchatError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn init<T: Into<String>>(reason: T) -> Self {
        PeerchatError::Init {
            reason: reason.into(),
        }
    }

    pub fn engine_rejected(code: i32) -> Self {
        PeerchatError::EngineRejected { code }
    }
}

pub type PeerchatResult<T> = Result<T, PeerchatError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
