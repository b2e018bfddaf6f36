//! Notification codec
//!
//! Decodes one raw engine notification into one typed session event.
//! Pure: no registry access, no shared state. A notification that
//! fails to decode is dropped by the caller with a diagnostic; the
//! failure is never surfaced to observers.

use crate::engine::{
    RawNotification, GROUP_CHANGE_PEER_ADD, GROUP_CHANGE_PEER_DEL, GROUP_CHANGE_PEER_NAME,
};
use crate::types::{
    FileControl, FriendId, GroupId, PeerNumber, PublicKey, TransferDirection, UserStatus,
};

// ----------------------------------------------------------------------------
// Session Events
// ----------------------------------------------------------------------------

/// How a group's member list changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Added,
    Removed,
    Renamed,
}

/// The closed set of typed events this layer raises to observers.
///
/// Events carry entity ids, not entity snapshots; by the time an
/// observer runs, the registry already reflects the mutation the
/// event describes, so observers resolve ids against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    FriendRequestReceived { public_key: PublicKey, message: String },
    ConnectionStatusChanged { friend: FriendId, online: bool },
    FriendMessageReceived { friend: FriendId, message: String },
    FriendActionReceived { friend: FriendId, action: String },
    FriendNameChanged { friend: FriendId, name: String },
    FriendStatusMessageChanged { friend: FriendId, message: String },
    FriendStatusChanged { friend: FriendId, status: UserStatus },
    FriendTypingChanged { friend: FriendId, is_typing: bool },
    GroupInviteReceived { friend: FriendId, group_public_key: PublicKey },
    GroupMessageReceived { group: GroupId, peer: PeerNumber, message: String },
    GroupActionReceived { group: GroupId, peer: PeerNumber, action: String },
    GroupMembershipChanged { group: GroupId, peer: PeerNumber, change: MembershipChange },
    FileControlReceived {
        friend: FriendId,
        direction: TransferDirection,
        file_number: u32,
        control: FileControl,
        data: Vec<u8>,
    },
    FileDataReceived { friend: FriendId, file_number: u32, data: Vec<u8> },
    FileSendRequested { friend: FriendId, file_number: u32, file_size: u64, file_name: String },
    ReadReceiptReceived { friend: FriendId, receipt: u32 },
}

/// Discriminant for observer subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FriendRequestReceived,
    ConnectionStatusChanged,
    FriendMessageReceived,
    FriendActionReceived,
    FriendNameChanged,
    FriendStatusMessageChanged,
    FriendStatusChanged,
    FriendTypingChanged,
    GroupInviteReceived,
    GroupMessageReceived,
    GroupActionReceived,
    GroupMembershipChanged,
    FileControlReceived,
    FileDataReceived,
    FileSendRequested,
    ReadReceiptReceived,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::FriendRequestReceived { .. } => EventKind::FriendRequestReceived,
            SessionEvent::ConnectionStatusChanged { .. } => EventKind::ConnectionStatusChanged,
            SessionEvent::FriendMessageReceived { .. } => EventKind::FriendMessageReceived,
            SessionEvent::FriendActionReceived { .. } => EventKind::FriendActionReceived,
            SessionEvent::FriendNameChanged { .. } => EventKind::FriendNameChanged,
            SessionEvent::FriendStatusMessageChanged { .. } => {
                EventKind::FriendStatusMessageChanged
            }
            SessionEvent::FriendStatusChanged { .. } => EventKind::FriendStatusChanged,
            SessionEvent::FriendTypingChanged { .. } => EventKind::FriendTypingChanged,
            SessionEvent::GroupInviteReceived { .. } => EventKind::GroupInviteReceived,
            SessionEvent::GroupMessageReceived { .. } => EventKind::GroupMessageReceived,
            SessionEvent::GroupActionReceived { .. } => EventKind::GroupActionReceived,
            SessionEvent::GroupMembershipChanged { .. } => EventKind::GroupMembershipChanged,
            SessionEvent::FileControlReceived { .. } => EventKind::FileControlReceived,
            SessionEvent::FileDataReceived { .. } => EventKind::FileDataReceived,
            SessionEvent::FileSendRequested { .. } => EventKind::FileSendRequested,
            SessionEvent::ReadReceiptReceived { .. } => EventKind::ReadReceiptReceived,
        }
    }
}

// ----------------------------------------------------------------------------
// Decode Errors
// ----------------------------------------------------------------------------

/// Why a raw notification could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
    #[error("unknown user status {0}")]
    UnknownUserStatus(u8),
    #[error("unknown namelist change {0}")]
    UnknownNamelistChange(u8),
    #[error("unknown file control {0}")]
    UnknownFileControl(u8),
    #[error("unknown transfer direction {0}")]
    UnknownTransferDirection(u8),
}

fn utf8(bytes: Vec<u8>, field: &'static str) -> Result<String, DecodeError> {
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })
}

// ----------------------------------------------------------------------------
// Decoder
// ----------------------------------------------------------------------------

/// Map one raw notification to its typed event.
pub fn decode(raw: RawNotification) -> Result<SessionEvent, DecodeError> {
    let event = match raw {
        RawNotification::FriendRequest { public_key, message } => {
            SessionEvent::FriendRequestReceived {
                public_key: PublicKey::new(public_key),
                message: utf8(message, "friend request message")?,
            }
        }
        RawNotification::ConnectionStatus { friend, status } => {
            SessionEvent::ConnectionStatusChanged {
                friend: FriendId::new(friend),
                online: status != 0,
            }
        }
        RawNotification::FriendMessage { friend, message } => SessionEvent::FriendMessageReceived {
            friend: FriendId::new(friend),
            message: utf8(message, "friend message")?,
        },
        RawNotification::FriendAction { friend, action } => SessionEvent::FriendActionReceived {
            friend: FriendId::new(friend),
            action: utf8(action, "friend action")?,
        },
        RawNotification::NameChange { friend, name } => SessionEvent::FriendNameChanged {
            friend: FriendId::new(friend),
            name: utf8(name, "friend name")?,
        },
        RawNotification::StatusMessage { friend, message } => {
            SessionEvent::FriendStatusMessageChanged {
                friend: FriendId::new(friend),
                message: utf8(message, "status message")?,
            }
        }
        RawNotification::UserStatus { friend, status } => SessionEvent::FriendStatusChanged {
            friend: FriendId::new(friend),
            status: UserStatus::from_raw(status).ok_or(DecodeError::UnknownUserStatus(status))?,
        },
        RawNotification::TypingChange { friend, typing } => SessionEvent::FriendTypingChanged {
            friend: FriendId::new(friend),
            is_typing: typing,
        },
        RawNotification::GroupInvite { friend, group_public_key } => {
            SessionEvent::GroupInviteReceived {
                friend: FriendId::new(friend),
                group_public_key: PublicKey::new(group_public_key),
            }
        }
        RawNotification::GroupMessage { group, peer, message } => {
            SessionEvent::GroupMessageReceived {
                group: GroupId::new(group),
                peer: PeerNumber::new(peer),
                message: utf8(message, "group message")?,
            }
        }
        RawNotification::GroupAction { group, peer, action } => SessionEvent::GroupActionReceived {
            group: GroupId::new(group),
            peer: PeerNumber::new(peer),
            action: utf8(action, "group action")?,
        },
        RawNotification::GroupNamelistChange { group, peer, change } => {
            let change = match change {
                GROUP_CHANGE_PEER_ADD => MembershipChange::Added,
                GROUP_CHANGE_PEER_DEL => MembershipChange::Removed,
                GROUP_CHANGE_PEER_NAME => MembershipChange::Renamed,
                other => return Err(DecodeError::UnknownNamelistChange(other)),
            };
            SessionEvent::GroupMembershipChanged {
                group: GroupId::new(group),
                peer: PeerNumber::new(peer),
                change,
            }
        }
        RawNotification::FileControl { friend, direction, file_number, control, data } => {
            SessionEvent::FileControlReceived {
                friend: FriendId::new(friend),
                direction: TransferDirection::from_raw(direction)
                    .ok_or(DecodeError::UnknownTransferDirection(direction))?,
                file_number,
                control: FileControl::from_raw(control)
                    .ok_or(DecodeError::UnknownFileControl(control))?,
                data,
            }
        }
        RawNotification::FileData { friend, file_number, data } => {
            SessionEvent::FileDataReceived {
                friend: FriendId::new(friend),
                file_number,
                data,
            }
        }
        RawNotification::FileSendRequest { friend, file_number, file_size, file_name } => {
            SessionEvent::FileSendRequested {
                friend: FriendId::new(friend),
                file_number,
                file_size,
                file_name: utf8(file_name, "file name")?,
            }
        }
        RawNotification::ReadReceipt { friend, receipt } => SessionEvent::ReadReceiptReceived {
            friend: FriendId::new(friend),
            receipt,
        },
    };
    Ok(event)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
