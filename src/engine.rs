//! Engine collaborator contract
//!
//! The messaging engine (DHT routing, handshakes, NAT traversal, wire
//! encoding) sits behind this trait as an opaque, non-reentrant,
//! single-threaded collaborator. The session controller owns the only
//! instance and serializes every call through one mutex.
//!
//! The surface deliberately mirrors the engine's native contract:
//! command operations report failure through small negative sentinel
//! codes (or `false`), and queries return `None` for unknown ids.
//! Translation into typed [`PeerchatError`](crate::PeerchatError)
//! values happens at the session boundary, nowhere else.

use crate::error::PeerchatResult;
use crate::types::{Address, PublicKey, TransferDirection};

// ----------------------------------------------------------------------------
// Raw Notifications
// ----------------------------------------------------------------------------

/// Group namelist change discriminants as the engine raises them.
pub const GROUP_CHANGE_PEER_ADD: u8 = 0;
pub const GROUP_CHANGE_PEER_DEL: u8 = 1;
pub const GROUP_CHANGE_PEER_NAME: u8 = 2;

/// One raw asynchronous fact raised by the engine during an advance
/// tick, before any decoding or validation.
///
/// Names, messages, and file names arrive as raw bytes; the engine
/// promises bounded length and valid UTF-8, but the codec re-checks
/// the latter rather than trusting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawNotification {
    FriendRequest { public_key: [u8; 32], message: Vec<u8> },
    ConnectionStatus { friend: u32, status: u8 },
    FriendMessage { friend: u32, message: Vec<u8> },
    FriendAction { friend: u32, action: Vec<u8> },
    NameChange { friend: u32, name: Vec<u8> },
    StatusMessage { friend: u32, message: Vec<u8> },
    UserStatus { friend: u32, status: u8 },
    TypingChange { friend: u32, typing: bool },
    GroupInvite { friend: u32, group_public_key: [u8; 32] },
    GroupMessage { group: u32, peer: u32, message: Vec<u8> },
    GroupAction { group: u32, peer: u32, action: Vec<u8> },
    GroupNamelistChange { group: u32, peer: u32, change: u8 },
    FileControl { friend: u32, direction: u8, file_number: u32, control: u8, data: Vec<u8> },
    FileData { friend: u32, file_number: u32, data: Vec<u8> },
    FileSendRequest { friend: u32, file_number: u32, file_size: u64, file_name: Vec<u8> },
    ReadReceipt { friend: u32, receipt: u32 },
}

// ----------------------------------------------------------------------------
// Engine Trait
// ----------------------------------------------------------------------------

/// The opaque peer-to-peer messaging engine.
///
/// Not reentrant and not thread-safe; callers must serialize access.
/// `advance` must be driven at least ~20 times per second to make
/// network progress and delivers notifications synchronously through
/// the supplied sink, in the order they occurred.
pub trait Engine: Send {
    /// Drive one engine tick. Returns the recommended interval until
    /// the next tick, in milliseconds.
    fn advance(&mut self, sink: &mut dyn FnMut(RawNotification)) -> u64;

    // --- friend commands ---

    /// Send a friend request. Returns the new friend number, or a
    /// negative rejection code.
    fn add_friend(&mut self, address: &Address, message: &[u8]) -> i32;

    /// Add a friend without sending a request (accepting an incoming
    /// one). Returns the new friend number, or a negative code.
    fn add_friend_no_request(&mut self, public_key: &PublicKey) -> i32;

    fn delete_friend(&mut self, friend: u32) -> bool;

    /// Returns a receipt id on success, or a negative code.
    fn send_message(&mut self, friend: u32, message: &[u8]) -> i32;

    /// Send a message with a caller-chosen receipt id.
    fn send_message_with_id(&mut self, friend: u32, id: u32, message: &[u8]) -> i32;

    /// Returns a receipt id on success, or a negative code.
    fn send_action(&mut self, friend: u32, action: &[u8]) -> i32;

    /// Send an action with a caller-chosen receipt id.
    fn send_action_with_id(&mut self, friend: u32, id: u32, action: &[u8]) -> i32;

    fn set_typing(&mut self, friend: u32, typing: bool) -> bool;

    /// Control whether read receipts are sent to this friend for
    /// messages they deliver to us.
    fn set_sends_receipts(&mut self, friend: u32, send: bool) -> bool;

    // --- friend queries ---

    fn friend_list(&self) -> Vec<u32>;
    fn friend_public_key(&self, friend: u32) -> Option<PublicKey>;
    fn friend_by_public_key(&self, public_key: &PublicKey) -> Option<u32>;
    fn friend_name(&self, friend: u32) -> Option<Vec<u8>>;
    fn friend_status_message(&self, friend: u32) -> Option<Vec<u8>>;
    fn friend_user_status(&self, friend: u32) -> Option<u8>;
    fn friend_connection_status(&self, friend: u32) -> Option<bool>;
    fn friend_typing(&self, friend: u32) -> Option<bool>;

    /// Unix timestamp of the last time the friend was seen online;
    /// zero if never.
    fn last_online(&self, friend: u32) -> Option<u64>;

    // --- self state ---

    fn self_address(&self) -> Address;
    fn self_name(&self) -> Vec<u8>;
    fn set_self_name(&mut self, name: &[u8]) -> bool;
    fn self_status_message(&self) -> Vec<u8>;
    fn set_self_status_message(&mut self, message: &[u8]) -> bool;
    fn self_user_status(&self) -> u8;
    fn set_self_user_status(&mut self, status: u8) -> bool;
    fn nospam(&self) -> u32;
    fn set_nospam(&mut self, nospam: u32);

    /// Whether this instance is connected to the wider network.
    fn is_connected(&self) -> bool;

    // --- group commands/queries ---

    /// Returns the new group number, or a negative code.
    fn new_group(&mut self) -> i32;

    fn delete_group(&mut self, group: u32) -> bool;

    /// Join a group a friend invited us to. Returns the group number,
    /// or a negative code.
    fn join_group(&mut self, friend: u32, group_public_key: &PublicKey) -> i32;

    fn invite_friend(&mut self, friend: u32, group: u32) -> bool;
    fn send_group_message(&mut self, group: u32, message: &[u8]) -> bool;
    fn send_group_action(&mut self, group: u32, action: &[u8]) -> bool;
    fn group_peer_name(&self, group: u32, peer: u32) -> Option<Vec<u8>>;

    // --- file transfer ---

    /// Announce an outgoing file. Returns the file number, or a
    /// negative code.
    fn new_file_sender(&mut self, friend: u32, file_size: u64, file_name: &[u8]) -> i32;

    fn file_send_control(
        &mut self,
        friend: u32,
        direction: TransferDirection,
        file_number: u32,
        control: u8,
        data: &[u8],
    ) -> bool;

    fn file_send_data(&mut self, friend: u32, file_number: u32, data: &[u8]) -> bool;

    /// Recommended chunk size for `file_send_data`, or a negative code.
    fn file_data_size(&self, friend: u32) -> i32;

    fn file_data_remaining(
        &self,
        friend: u32,
        file_number: u32,
        direction: TransferDirection,
    ) -> Option<u64>;

    // --- persistence ---

    /// Snapshot the engine state as an opaque blob.
    fn serialize(&self) -> Vec<u8>;

    /// Restore engine state from a blob produced by `serialize`.
    fn deserialize(&mut self, data: &[u8]) -> bool;
}

// ----------------------------------------------------------------------------
// Engine Factory
// ----------------------------------------------------------------------------

/// Produces the engine instance a session will own.
///
/// Stands in for the engine's `create` lifecycle call; allocation
/// failure (e.g. a port-bind failure for IPv6) surfaces as
/// [`PeerchatError::Init`](crate::PeerchatError::Init).
pub trait EngineFactory {
    type Engine: Engine + 'static;

    fn create(self, ipv6_enabled: bool) -> PeerchatResult<Self::Engine>;
}

impl<E, F> EngineFactory for F
where
    E: Engine + 'static,
    F: FnOnce(bool) -> PeerchatResult<E>,
{
    type Engine = E;

    fn create(self, ipv6_enabled: bool) -> PeerchatResult<E> {
        self(ipv6_enabled)
    }
}
