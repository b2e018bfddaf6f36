//! # peerchat
//!
//! A session-state and event-dispatch layer over an opaque
//! peer-to-peer messaging engine.
//!
//! The engine (behind the [`Engine`] trait) handles routing,
//! handshakes, and wire encoding, but it is non-reentrant, not
//! thread-safe, raises notifications only while being ticked, and
//! supports a single callback per notification type. This crate wraps
//! one engine instance in a [`Session`] that provides:
//!
//! - a thread-safe command/query surface serialized through one mutex,
//! - a [`PeerRegistry`] mirror of friend and group state, mutated from
//!   notifications before observers run,
//! - multi-subscriber typed [`SessionEvent`] dispatch with a pluggable
//!   [`Invoker`] for marshalling callbacks onto another context,
//! - a built-in advance loop with cooperative stop, or a manual
//!   [`Session::advance_once`] for callers that schedule ticks
//!   themselves,
//! - whole-state persistence via opaque save/restore blobs.
//!
//! ## Example
//!
//! ```ignore
//! use peerchat::{EventKind, PeerchatResult, Session, SessionOptions};
//!
//! // `open_engine` binds the concrete engine: any
//! // `FnOnce(bool) -> PeerchatResult<impl Engine>` works as a factory.
//! let session = Session::open(SessionOptions::default(), open_engine)?;
//!
//! session.subscribe(EventKind::FriendMessageReceived, |event| {
//!     println!("{event:?}");
//! });
//!
//! session.start()?;
//! // ... application runs ...
//! session.close().await;
//! ```

mod advance;
mod dispatch;
mod engine;
mod error;
mod notification;
mod registry;
mod session;
mod types;

pub use advance::{AdvanceLoop, LoopState};
pub use dispatch::{
    ChannelInvoker, DirectInvoker, EventDispatcher, Invocation, Invoker, ObserverId,
};
pub use engine::{
    Engine, EngineFactory, RawNotification, GROUP_CHANGE_PEER_ADD, GROUP_CHANGE_PEER_DEL,
    GROUP_CHANGE_PEER_NAME,
};
pub use error::{FriendAddError, PeerchatError, PeerchatResult};
pub use notification::{decode, DecodeError, EventKind, MembershipChange, SessionEvent};
pub use registry::{Friend, Group, GroupMember, PeerRegistry};
pub use session::{Session, SessionOptions};
pub use types::{
    Address, FileControl, FriendId, GroupId, PeerNumber, PublicKey, TransferDirection, UserStatus,
    MAX_FILE_NAME_LENGTH, MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, MAX_STATUS_MESSAGE_LENGTH,
};
