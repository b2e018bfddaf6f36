//! Peer registry
//!
//! The authoritative in-process mirror of remote-entity state:
//! friends, groups, and group members. Mutated only by the session
//! controller (from notification callbacks or locally authoritative
//! commands, always under the session mutex); exposed to applications
//! as cloned snapshots and id-indexed lookups.
//!
//! Iteration order for friends, groups, and members is insertion
//! order.

use crate::types::{FriendId, GroupId, PeerNumber, UserStatus};

// ----------------------------------------------------------------------------
// Entities
// ----------------------------------------------------------------------------

/// Mirrored state of one friend relationship.
///
/// Attributes default to empty/offline until the first corresponding
/// notification arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Friend {
    pub id: FriendId,
    pub name: String,
    pub status_message: String,
    pub status: UserStatus,
    pub is_online: bool,
    pub is_typing: bool,
}

impl Friend {
    fn new(id: FriendId) -> Self {
        Self {
            id,
            name: String::new(),
            status_message: String::new(),
            status: UserStatus::None,
            is_online: false,
            is_typing: false,
        }
    }
}

/// Mirrored state of one group member. Identity is the
/// `(GroupId, PeerNumber)` pair, never the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub number: PeerNumber,
    pub name: String,
}

/// Mirrored state of one group chat. Membership is driven entirely by
/// namelist-change notifications, never inferred from message traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    members: Vec<GroupMember>,
}

impl Group {
    fn new(id: GroupId) -> Self {
        Self {
            id,
            members: Vec::new(),
        }
    }

    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    pub fn member(&self, number: PeerNumber) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.number == number)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// In-process mirror of friend and group state.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    friends: Vec<Friend>,
    groups: Vec<Group>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- read views ---

    pub fn friend(&self, id: FriendId) -> Option<&Friend> {
        self.friends.iter().find(|f| f.id == id)
    }

    pub fn friends(&self) -> &[Friend] {
        &self.friends
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn online_friend_count(&self) -> usize {
        self.friends.iter().filter(|f| f.is_online).count()
    }

    // --- friend mutators ---

    /// Insert a friend entry with default attributes if none exists.
    pub(crate) fn upsert_friend(&mut self, id: FriendId) -> &mut Friend {
        if let Some(index) = self.friends.iter().position(|f| f.id == id) {
            return &mut self.friends[index];
        }
        self.friends.push(Friend::new(id));
        let last = self.friends.len() - 1;
        &mut self.friends[last]
    }

    pub(crate) fn remove_friend(&mut self, id: FriendId) -> bool {
        let before = self.friends.len();
        self.friends.retain(|f| f.id != id);
        self.friends.len() != before
    }

    pub(crate) fn set_friend_online(&mut self, id: FriendId, online: bool) -> bool {
        self.friend_mut(id).map(|f| f.is_online = online).is_some()
    }

    pub(crate) fn set_friend_name(&mut self, id: FriendId, name: &str) -> bool {
        self.friend_mut(id).map(|f| f.name = name.to_string()).is_some()
    }

    pub(crate) fn set_friend_status_message(&mut self, id: FriendId, message: &str) -> bool {
        self.friend_mut(id)
            .map(|f| f.status_message = message.to_string())
            .is_some()
    }

    pub(crate) fn set_friend_status(&mut self, id: FriendId, status: UserStatus) -> bool {
        self.friend_mut(id).map(|f| f.status = status).is_some()
    }

    pub(crate) fn set_friend_typing(&mut self, id: FriendId, typing: bool) -> bool {
        self.friend_mut(id).map(|f| f.is_typing = typing).is_some()
    }

    pub(crate) fn clear_friends(&mut self) {
        self.friends.clear();
    }

    // --- group mutators ---

    /// Returns false if the group already exists (no-op).
    pub(crate) fn add_group(&mut self, id: GroupId) -> bool {
        if self.group(id).is_some() {
            return false;
        }
        self.groups.push(Group::new(id));
        true
    }

    pub(crate) fn remove_group(&mut self, id: GroupId) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != id);
        self.groups.len() != before
    }

    /// Add a member to a group. Duplicate `(group, peer)` pairs are a
    /// no-op, since the engine may redeliver membership state during
    /// reconnection; returns false in that case.
    pub(crate) fn add_member(&mut self, group: GroupId, peer: PeerNumber, name: String) -> bool {
        let Some(group) = self.group_mut(group) else {
            return false;
        };
        if group.member(peer).is_some() {
            return false;
        }
        group.members.push(GroupMember { number: peer, name });
        true
    }

    pub(crate) fn remove_member(&mut self, group: GroupId, peer: PeerNumber) -> bool {
        let Some(group) = self.group_mut(group) else {
            return false;
        };
        let before = group.members.len();
        group.members.retain(|m| m.number != peer);
        group.members.len() != before
    }

    pub(crate) fn rename_member(&mut self, group: GroupId, peer: PeerNumber, name: &str) -> bool {
        let Some(member) = self
            .group_mut(group)
            .and_then(|g| g.members.iter_mut().find(|m| m.number == peer))
        else {
            return false;
        };
        member.name = name.to_string();
        true
    }

    fn friend_mut(&mut self, id: FriendId) -> Option<&mut Friend> {
        self.friends.iter_mut().find(|f| f.id == id)
    }

    fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == id)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
