//! Core types for the peerchat session layer
//!
//! Id newtypes for engine-assigned entities, the address/public-key
//! formats shared with peers, and the enumerations the engine reports
//! status in.

use core::fmt;
use core::str::FromStr;

use crate::error::PeerchatError;

/// Maximum length of a peer name, in bytes.
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum length of a status message, in bytes.
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 1007;

/// Maximum length of a single message or action, in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 1368;

/// Maximum length of a file name in a transfer request, in bytes.
pub const MAX_FILE_NAME_LENGTH: usize = 255;

// ----------------------------------------------------------------------------
// Entity Identifiers
// ----------------------------------------------------------------------------

/// Engine-assigned number identifying a friend relationship.
///
/// Stable for the lifetime of the relationship, reused by the engine
/// after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FriendId(u32);

/// Engine-assigned number identifying a group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(u32);

/// Number identifying a member within one group. Unique per group,
/// not globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerNumber(u32);

macro_rules! impl_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: u32) -> Self {
                Self(value)
            }

            pub fn value(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }
    };
}

impl_id!(FriendId);
impl_id!(GroupId);
impl_id!(PeerNumber);

// ----------------------------------------------------------------------------
// Public Key
// ----------------------------------------------------------------------------

/// A peer's long-term public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PublicKey {
    type Err = PeerchatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(clean)
            .map_err(|_| PeerchatError::invalid_argument("invalid hex in public key"))?;
        if bytes.len() != 32 {
            return Err(PeerchatError::invalid_argument(
                "public key must be exactly 32 bytes",
            ));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }
}

// ----------------------------------------------------------------------------
// Address
// ----------------------------------------------------------------------------

/// Shareable contact address: public key, 4-byte nospam, 2-byte checksum.
///
/// The checksum is the byte-wise XOR of the first 36 bytes folded into
/// two bytes; parsing rejects addresses where it does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; Address::SIZE]);

impl Address {
    pub const SIZE: usize = 38;

    /// Build an address from a public key and nospam value, computing
    /// the checksum.
    pub fn from_parts(public_key: PublicKey, nospam: u32) -> Self {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..32].copy_from_slice(public_key.as_bytes());
        bytes[32..36].copy_from_slice(&nospam.to_be_bytes());
        let checksum = Self::checksum(&bytes[..36]);
        bytes[36..].copy_from_slice(&checksum);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Result<Self, PeerchatError> {
        if Self::checksum(&bytes[..36]) != bytes[36..] {
            return Err(PeerchatError::invalid_argument("address checksum mismatch"));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    pub fn public_key(&self) -> PublicKey {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.0[..32]);
        PublicKey::new(key)
    }

    pub fn nospam(&self) -> u32 {
        u32::from_be_bytes([self.0[32], self.0[33], self.0[34], self.0[35]])
    }

    fn checksum(bytes: &[u8]) -> [u8; 2] {
        let mut checksum = [0u8; 2];
        for (i, byte) in bytes.iter().enumerate() {
            checksum[i % 2] ^= byte;
        }
        checksum
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = PeerchatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean = s.strip_prefix("0x").unwrap_or(s);
        let decoded = hex::decode(clean)
            .map_err(|_| PeerchatError::invalid_argument("invalid hex in address"))?;
        if decoded.len() != Self::SIZE {
            return Err(PeerchatError::invalid_argument(
                "address must be exactly 38 bytes",
            ));
        }
        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(&decoded);
        Self::from_bytes(bytes)
    }
}

// ----------------------------------------------------------------------------
// User Status
// ----------------------------------------------------------------------------

/// Presence status a peer advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UserStatus {
    #[default]
    None,
    Away,
    Busy,
}

impl UserStatus {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(UserStatus::None),
            1 => Some(UserStatus::Away),
            2 => Some(UserStatus::Busy),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            UserStatus::None => 0,
            UserStatus::Away => 1,
            UserStatus::Busy => 2,
        }
    }
}

// ----------------------------------------------------------------------------
// File Transfer
// ----------------------------------------------------------------------------

/// Which side of a file transfer a control message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    Sending,
    Receiving,
}

impl TransferDirection {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(TransferDirection::Sending),
            1 => Some(TransferDirection::Receiving),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            TransferDirection::Sending => 0,
            TransferDirection::Receiving => 1,
        }
    }
}

/// Control message for an in-flight file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileControl {
    Accept,
    Pause,
    Kill,
    Finished,
    ResumeBroken,
}

impl FileControl {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(FileControl::Accept),
            1 => Some(FileControl::Pause),
            2 => Some(FileControl::Kill),
            3 => Some(FileControl::Finished),
            4 => Some(FileControl::ResumeBroken),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            FileControl::Accept => 0,
            FileControl::Pause => 1,
            FileControl::Kill => 2,
            FileControl::Finished => 3,
            FileControl::ResumeBroken => 4,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
