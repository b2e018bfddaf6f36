//! Session controller
//!
//! Owns the engine instance, the peer registry, the dispatcher wiring,
//! and the advance loop. Every engine call and every registry access
//! goes through one mutex, because the engine is neither reentrant nor
//! thread-safe; command results are returned before the mutex is
//! released, so a successful command is visible to any thread that
//! subsequently acquires it.
//!
//! Notifications raised during a tick are decoded, applied to the
//! registry under the mutex, and published to observers afterwards in
//! the exact order the engine raised them. Observers therefore always
//! see post-mutation state, and may re-enter the session from a
//! callback without deadlocking.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::advance::{AdvanceLoop, LoopState};
use crate::dispatch::{EventDispatcher, Invoker, ObserverId};
use crate::engine::{Engine, EngineFactory, RawNotification};
use crate::error::{FriendAddError, PeerchatError, PeerchatResult};
use crate::notification::{self, EventKind, MembershipChange, SessionEvent};
use crate::registry::{Friend, Group, PeerRegistry};
use crate::types::{
    Address, FileControl, FriendId, GroupId, PublicKey, TransferDirection, UserStatus,
    MAX_FILE_NAME_LENGTH, MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, MAX_STATUS_MESSAGE_LENGTH,
};

// ----------------------------------------------------------------------------
// Options
// ----------------------------------------------------------------------------

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Whether the engine should bind IPv6; disabling sticks strictly
    /// to IPv4.
    pub ipv6_enabled: bool,
    /// Floor applied to the engine's recommended tick interval, so a
    /// zero or bogus recommendation cannot busy-spin the loop.
    pub min_tick_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ipv6_enabled: true,
            min_tick_interval: Duration::from_millis(5),
        }
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

struct SessionInner {
    /// `None` once the session is closed; the engine instance is
    /// released at that point and every operation reports `Closed`.
    engine: Option<Box<dyn Engine>>,
    registry: PeerRegistry,
}

/// The session controller.
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    dispatcher: Arc<EventDispatcher>,
    advance: AdvanceLoop,
    options: SessionOptions,
}

impl Session {
    /// Allocate the engine and wrap it in a session.
    pub fn open<F: EngineFactory>(options: SessionOptions, factory: F) -> PeerchatResult<Self> {
        let engine = factory.create(options.ipv6_enabled)?;
        info!(ipv6_enabled = options.ipv6_enabled, "session opened");
        Ok(Self {
            inner: Arc::new(Mutex::new(SessionInner {
                engine: Some(Box::new(engine)),
                registry: PeerRegistry::new(),
            })),
            dispatcher: Arc::new(EventDispatcher::new()),
            advance: AdvanceLoop::new(),
            options,
        })
    }

    pub fn ipv6_enabled(&self) -> bool {
        self.options.ipv6_enabled
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start the built-in advance loop. A no-op if it is already
    /// running; returns whether it was started.
    pub fn start(&self) -> PeerchatResult<bool> {
        {
            let inner = self.inner.lock();
            if inner.engine.is_none() {
                return Err(PeerchatError::Closed);
            }
        }
        let inner = Arc::clone(&self.inner);
        let dispatcher = Arc::clone(&self.dispatcher);
        let floor = self.options.min_tick_interval;
        Ok(self
            .advance
            .start(move || advance_session(&inner, &dispatcher, floor).ok()))
    }

    /// Stop the built-in advance loop, waiting for it to finish its
    /// current tick. A no-op if it is not running.
    pub async fn stop(&self) -> bool {
        self.advance.stop().await
    }

    pub fn loop_state(&self) -> LoopState {
        self.advance.state()
    }

    /// Stop the advance loop and release the engine instance.
    /// Idempotent; after this, every other operation fails with
    /// [`PeerchatError::Closed`].
    pub async fn close(&self) {
        self.advance.stop().await;
        let released = self.inner.lock().engine.take().is_some();
        if released {
            info!("session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().engine.is_none()
    }

    /// Drive one engine tick synchronously, dispatching any
    /// notifications it raises. Returns the recommended interval until
    /// the next tick.
    ///
    /// This is what the built-in loop repeats; callers that prefer
    /// cooperative scheduling can skip [`Session::start`] and drive
    /// this themselves (one driver at a time, or event order across
    /// drivers is unspecified).
    pub fn advance_once(&self) -> PeerchatResult<Duration> {
        advance_session(&self.inner, &self.dispatcher, self.options.min_tick_interval)
    }

    // ------------------------------------------------------------------------
    // Event Subscription
    // ------------------------------------------------------------------------

    /// Register an observer for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, observer: F) -> ObserverId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(kind, observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Replace the observer invocation strategy (default: direct
    /// synchronous calls on the advance context).
    pub fn set_invoker(&self, invoker: Arc<dyn Invoker>) {
        self.dispatcher.set_invoker(invoker);
    }

    // ------------------------------------------------------------------------
    // Friend Commands
    // ------------------------------------------------------------------------

    /// Send a friend request. On success the new friend is immediately
    /// present in [`Session::friends`]; the engine raises no
    /// notification for our own outgoing action.
    pub fn add_friend(&self, address: &Address, message: &str) -> PeerchatResult<FriendId> {
        if message.is_empty() {
            return Err(FriendAddError::NoMessage.into());
        }
        if message.len() > MAX_MESSAGE_LENGTH {
            return Err(FriendAddError::MessageTooLong.into());
        }

        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        match engine.add_friend(address, message.as_bytes()) {
            code if code < 0 => Err(FriendAddError::from_code(code).into()),
            number => {
                let id = FriendId::new(number as u32);
                inner.registry.upsert_friend(id);
                debug!(%id, "friend added");
                Ok(id)
            }
        }
    }

    /// Add a friend without sending a request, accepting an incoming
    /// one by public key.
    pub fn add_friend_no_request(&self, public_key: &PublicKey) -> PeerchatResult<FriendId> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        match engine.add_friend_no_request(public_key) {
            code if code < 0 => Err(FriendAddError::from_code(code).into()),
            number => {
                let id = FriendId::new(number as u32);
                inner.registry.upsert_friend(id);
                debug!(%id, "friend added without request");
                Ok(id)
            }
        }
    }

    /// Delete a friend. Deletion is authoritative and immediate, not
    /// negotiated with the peer.
    pub fn delete_friend(&self, friend: FriendId) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        if inner.registry.friend(friend).is_none() {
            return Err(PeerchatError::FriendNotFound(friend));
        }
        if !engine.delete_friend(friend.value()) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        inner.registry.remove_friend(friend);
        debug!(%friend, "friend deleted");
        Ok(())
    }

    /// Send a message to a friend. Returns the receipt id the engine
    /// assigned.
    pub fn send_message(&self, friend: FriendId, message: &str) -> PeerchatResult<u32> {
        validate_message(message)?;
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        to_receipt(engine.send_message(friend.value(), message.as_bytes()))
    }

    /// Send a message using a caller-chosen receipt id.
    pub fn send_message_with_id(
        &self,
        friend: FriendId,
        id: u32,
        message: &str,
    ) -> PeerchatResult<u32> {
        validate_message(message)?;
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        to_receipt(engine.send_message_with_id(friend.value(), id, message.as_bytes()))
    }

    /// Send an action (an "/me"-style message) to a friend.
    pub fn send_action(&self, friend: FriendId, action: &str) -> PeerchatResult<u32> {
        validate_message(action)?;
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        to_receipt(engine.send_action(friend.value(), action.as_bytes()))
    }

    /// Send an action using a caller-chosen receipt id.
    pub fn send_action_with_id(
        &self,
        friend: FriendId,
        id: u32,
        action: &str,
    ) -> PeerchatResult<u32> {
        validate_message(action)?;
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        to_receipt(engine.send_action_with_id(friend.value(), id, action.as_bytes()))
    }

    /// Tell a friend whether we are typing to them.
    pub fn set_typing(&self, friend: FriendId, typing: bool) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        if !engine.set_typing(friend.value(), typing) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    /// Control whether this friend gets read receipts for the messages
    /// they send us.
    pub fn set_sends_receipts(&self, friend: FriendId, send: bool) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        if !engine.set_sends_receipts(friend.value(), send) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Self State
    // ------------------------------------------------------------------------

    pub fn set_name(&self, name: &str) -> PeerchatResult<()> {
        if name.len() > MAX_NAME_LENGTH {
            return Err(PeerchatError::invalid_argument("name is too long"));
        }
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        if !engine.set_self_name(name.as_bytes()) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    pub fn set_status_message(&self, message: &str) -> PeerchatResult<()> {
        if message.len() > MAX_STATUS_MESSAGE_LENGTH {
            return Err(PeerchatError::invalid_argument("status message is too long"));
        }
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        if !engine.set_self_status_message(message.as_bytes()) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    pub fn set_status(&self, status: UserStatus) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        if !engine.set_self_user_status(status.as_raw()) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    /// The shareable contact address of this session.
    pub fn address(&self) -> PeerchatResult<Address> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        Ok(engine.self_address())
    }

    pub fn name(&self) -> PeerchatResult<String> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        Ok(String::from_utf8_lossy(&engine.self_name()).into_owned())
    }

    pub fn status_message(&self) -> PeerchatResult<String> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        Ok(String::from_utf8_lossy(&engine.self_status_message()).into_owned())
    }

    pub fn status(&self) -> PeerchatResult<UserStatus> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        Ok(UserStatus::from_raw(engine.self_user_status()).unwrap_or_default())
    }

    pub fn nospam(&self) -> PeerchatResult<u32> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        Ok(engine.nospam())
    }

    pub fn set_nospam(&self, nospam: u32) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        engine.set_nospam(nospam);
        Ok(())
    }

    /// Whether this session is connected to the wider network.
    pub fn is_connected(&self) -> PeerchatResult<bool> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        Ok(engine.is_connected())
    }

    // ------------------------------------------------------------------------
    // Friend Queries
    // ------------------------------------------------------------------------

    /// Snapshot of all friends, in insertion order.
    pub fn friends(&self) -> PeerchatResult<Vec<Friend>> {
        let inner = self.inner.lock();
        if inner.engine.is_none() {
            return Err(PeerchatError::Closed);
        }
        Ok(inner.registry.friends().to_vec())
    }

    /// Snapshot of one friend by id.
    pub fn friend(&self, friend: FriendId) -> PeerchatResult<Friend> {
        let inner = self.inner.lock();
        if inner.engine.is_none() {
            return Err(PeerchatError::Closed);
        }
        inner
            .registry
            .friend(friend)
            .cloned()
            .ok_or(PeerchatError::FriendNotFound(friend))
    }

    pub fn friend_name(&self, friend: FriendId) -> PeerchatResult<String> {
        Ok(self.friend(friend)?.name)
    }

    pub fn friend_status(&self, friend: FriendId) -> PeerchatResult<UserStatus> {
        Ok(self.friend(friend)?.status)
    }

    pub fn friend_status_message(&self, friend: FriendId) -> PeerchatResult<String> {
        Ok(self.friend(friend)?.status_message)
    }

    pub fn is_friend_online(&self, friend: FriendId) -> PeerchatResult<bool> {
        Ok(self.friend(friend)?.is_online)
    }

    pub fn is_friend_typing(&self, friend: FriendId) -> PeerchatResult<bool> {
        Ok(self.friend(friend)?.is_typing)
    }

    pub fn online_friend_count(&self) -> PeerchatResult<usize> {
        let inner = self.inner.lock();
        if inner.engine.is_none() {
            return Err(PeerchatError::Closed);
        }
        Ok(inner.registry.online_friend_count())
    }

    /// When the friend was last seen online; `None` if never.
    pub fn last_online(&self, friend: FriendId) -> PeerchatResult<Option<SystemTime>> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        let timestamp = engine
            .last_online(friend.value())
            .ok_or(PeerchatError::FriendNotFound(friend))?;
        Ok((timestamp != 0).then(|| UNIX_EPOCH + Duration::from_secs(timestamp)))
    }

    pub fn friend_public_key(&self, friend: FriendId) -> PeerchatResult<PublicKey> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        engine
            .friend_public_key(friend.value())
            .ok_or(PeerchatError::FriendNotFound(friend))
    }

    pub fn friend_by_public_key(&self, public_key: &PublicKey) -> PeerchatResult<FriendId> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        let number = engine
            .friend_by_public_key(public_key)
            .ok_or_else(|| PeerchatError::invalid_argument("public key is not a friend"))?;
        Ok(FriendId::new(number))
    }

    // ------------------------------------------------------------------------
    // Group Commands and Queries
    // ------------------------------------------------------------------------

    /// Create a new group chat.
    pub fn create_group(&self) -> PeerchatResult<GroupId> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        match engine.new_group() {
            code if code < 0 => Err(PeerchatError::engine_rejected(code)),
            number => {
                let id = GroupId::new(number as u32);
                inner.registry.add_group(id);
                debug!(%id, "group created");
                Ok(id)
            }
        }
    }

    /// Join a group a friend invited us to.
    pub fn join_group(
        &self,
        friend: FriendId,
        group_public_key: &PublicKey,
    ) -> PeerchatResult<GroupId> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        match engine.join_group(friend.value(), group_public_key) {
            code if code < 0 => Err(PeerchatError::engine_rejected(code)),
            number => {
                let id = GroupId::new(number as u32);
                inner.registry.add_group(id);
                debug!(%id, %friend, "group joined");
                Ok(id)
            }
        }
    }

    pub fn delete_group(&self, group: GroupId) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        if inner.registry.group(group).is_none() {
            return Err(PeerchatError::GroupNotFound(group));
        }
        if !engine.delete_group(group.value()) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        inner.registry.remove_group(group);
        debug!(%group, "group deleted");
        Ok(())
    }

    pub fn invite_to_group(&self, friend: FriendId, group: GroupId) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        if inner.registry.group(group).is_none() {
            return Err(PeerchatError::GroupNotFound(group));
        }
        if !engine.invite_friend(friend.value(), group.value()) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    pub fn send_group_message(&self, group: GroupId, message: &str) -> PeerchatResult<()> {
        validate_message(message)?;
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        if inner.registry.group(group).is_none() {
            return Err(PeerchatError::GroupNotFound(group));
        }
        if !engine.send_group_message(group.value(), message.as_bytes()) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    pub fn send_group_action(&self, group: GroupId, action: &str) -> PeerchatResult<()> {
        validate_message(action)?;
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        if inner.registry.group(group).is_none() {
            return Err(PeerchatError::GroupNotFound(group));
        }
        if !engine.send_group_action(group.value(), action.as_bytes()) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    /// Snapshot of all groups, in insertion order.
    pub fn groups(&self) -> PeerchatResult<Vec<Group>> {
        let inner = self.inner.lock();
        if inner.engine.is_none() {
            return Err(PeerchatError::Closed);
        }
        Ok(inner.registry.groups().to_vec())
    }

    /// Snapshot of one group by id.
    pub fn group(&self, group: GroupId) -> PeerchatResult<Group> {
        let inner = self.inner.lock();
        if inner.engine.is_none() {
            return Err(PeerchatError::Closed);
        }
        inner
            .registry
            .group(group)
            .cloned()
            .ok_or(PeerchatError::GroupNotFound(group))
    }

    // ------------------------------------------------------------------------
    // File Transfer
    // ------------------------------------------------------------------------

    /// Announce an outgoing file to a friend. Returns the file number
    /// for subsequent control and data calls.
    pub fn send_file_request(
        &self,
        friend: FriendId,
        file_size: u64,
        file_name: &str,
    ) -> PeerchatResult<u32> {
        if file_name.is_empty() || file_name.len() > MAX_FILE_NAME_LENGTH {
            return Err(PeerchatError::invalid_argument(
                "file name must be 1-255 bytes",
            ));
        }
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        match engine.new_file_sender(friend.value(), file_size, file_name.as_bytes()) {
            code if code < 0 => Err(PeerchatError::engine_rejected(code)),
            number => Ok(number as u32),
        }
    }

    /// Send a control message for an in-flight transfer.
    pub fn send_file_control(
        &self,
        friend: FriendId,
        direction: TransferDirection,
        file_number: u32,
        control: FileControl,
        data: &[u8],
    ) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        if !engine.file_send_control(
            friend.value(),
            direction,
            file_number,
            control.as_raw(),
            data,
        ) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    /// Send one chunk of file data.
    pub fn send_file_data(
        &self,
        friend: FriendId,
        file_number: u32,
        data: &[u8],
    ) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        if !engine.file_send_data(friend.value(), file_number, data) {
            return Err(PeerchatError::engine_rejected(-1));
        }
        Ok(())
    }

    /// Recommended chunk size for [`Session::send_file_data`].
    pub fn file_data_size(&self, friend: FriendId) -> PeerchatResult<usize> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        match engine.file_data_size(friend.value()) {
            code if code < 0 => Err(PeerchatError::engine_rejected(code)),
            size => Ok(size as usize),
        }
    }

    /// Bytes left to send or receive for a transfer.
    pub fn file_data_remaining(
        &self,
        friend: FriendId,
        file_number: u32,
        direction: TransferDirection,
    ) -> PeerchatResult<u64> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        require_friend(&inner.registry, friend)?;
        engine
            .file_data_remaining(friend.value(), file_number, direction)
            .ok_or(PeerchatError::FriendNotFound(friend))
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Snapshot the engine state as an opaque blob.
    pub fn save(&self) -> PeerchatResult<Vec<u8>> {
        let inner = self.inner.lock();
        let engine = inner.engine.as_deref().ok_or(PeerchatError::Closed)?;
        Ok(engine.serialize())
    }

    /// Restore engine state from a blob produced by [`Session::save`],
    /// then rebuild the friend mirror from engine truth so the
    /// registry matches without requiring network contact.
    pub fn restore(&self, data: &[u8]) -> PeerchatResult<()> {
        let inner = &mut *self.inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;
        if !engine.deserialize(data) {
            return Err(PeerchatError::invalid_argument(
                "session data rejected by engine",
            ));
        }
        rebuild_friend_mirror(engine, &mut inner.registry);
        info!(
            friends = inner.registry.friends().len(),
            "session state restored"
        );
        Ok(())
    }

    /// Write the session blob to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> PeerchatResult<()> {
        let data = self.save()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Restore the session blob from a file.
    pub fn restore_from<P: AsRef<Path>>(&self, path: P) -> PeerchatResult<()> {
        let data = std::fs::read(path)?;
        self.restore(&data)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Dropped without close(): the loop task holds its own Arc to
        // the inner state and would tick forever. Cancellation lands
        // on the sleep between ticks, not inside an engine call.
        self.advance.abort();
    }
}

// ----------------------------------------------------------------------------
// Tick Processing
// ----------------------------------------------------------------------------

/// Drive one engine tick: collect raw notifications, decode and apply
/// them under the mutex, then publish in order after releasing it.
fn advance_session(
    inner: &Arc<Mutex<SessionInner>>,
    dispatcher: &Arc<EventDispatcher>,
    floor: Duration,
) -> PeerchatResult<Duration> {
    let mut events = Vec::new();
    let interval = {
        let inner = &mut *inner.lock();
        let engine = inner.engine.as_deref_mut().ok_or(PeerchatError::Closed)?;

        let mut raw = Vec::new();
        let interval = engine.advance(&mut |notification| raw.push(notification));

        for notification in raw {
            match notification::decode(notification) {
                Ok(event) => match apply_event(engine, &mut inner.registry, &event) {
                    Ok(()) => events.push(event),
                    Err(reason) => {
                        warn!(kind = ?event.kind(), reason, "notification dropped");
                    }
                },
                Err(error) => {
                    warn!(%error, "undecodable notification dropped");
                }
            }
        }
        interval
    };

    for event in &events {
        dispatcher.publish(event);
    }

    Ok(floor.max(Duration::from_millis(interval)))
}

/// Apply the registry mutation an event implies, before publication.
/// `Err` means the event must be dropped (unknown id, redelivered
/// membership) rather than raised against missing state.
fn apply_event(
    engine: &mut dyn Engine,
    registry: &mut PeerRegistry,
    event: &SessionEvent,
) -> Result<(), &'static str> {
    match event {
        // No registry mutation; the friend does not exist yet.
        SessionEvent::FriendRequestReceived { .. } => Ok(()),

        SessionEvent::ConnectionStatusChanged { friend, online } => registry
            .set_friend_online(*friend, *online)
            .then_some(())
            .ok_or("unknown friend"),

        SessionEvent::FriendNameChanged { friend, name } => registry
            .set_friend_name(*friend, name)
            .then_some(())
            .ok_or("unknown friend"),

        SessionEvent::FriendStatusMessageChanged { friend, message } => registry
            .set_friend_status_message(*friend, message)
            .then_some(())
            .ok_or("unknown friend"),

        SessionEvent::FriendStatusChanged { friend, status } => registry
            .set_friend_status(*friend, *status)
            .then_some(())
            .ok_or("unknown friend"),

        SessionEvent::FriendTypingChanged { friend, is_typing } => registry
            .set_friend_typing(*friend, *is_typing)
            .then_some(())
            .ok_or("unknown friend"),

        // Payload-only events: no mutation, but never raise them for a
        // friend the registry does not know.
        SessionEvent::FriendMessageReceived { friend, .. }
        | SessionEvent::FriendActionReceived { friend, .. }
        | SessionEvent::GroupInviteReceived { friend, .. }
        | SessionEvent::FileControlReceived { friend, .. }
        | SessionEvent::FileDataReceived { friend, .. }
        | SessionEvent::FileSendRequested { friend, .. }
        | SessionEvent::ReadReceiptReceived { friend, .. } => registry
            .friend(*friend)
            .map(|_| ())
            .ok_or("unknown friend"),

        SessionEvent::GroupMessageReceived { group, .. }
        | SessionEvent::GroupActionReceived { group, .. } => {
            registry.group(*group).map(|_| ()).ok_or("unknown group")
        }

        SessionEvent::GroupMembershipChanged { group, peer, change } => {
            if registry.group(*group).is_none() {
                return Err("unknown group");
            }
            match change {
                MembershipChange::Added => {
                    let name = member_name(engine, group.value(), peer.value());
                    registry
                        .add_member(*group, *peer, name)
                        .then_some(())
                        .ok_or("redelivered group member")
                }
                MembershipChange::Removed => registry
                    .remove_member(*group, *peer)
                    .then_some(())
                    .ok_or("unknown group member"),
                MembershipChange::Renamed => {
                    let name = member_name(engine, group.value(), peer.value());
                    registry
                        .rename_member(*group, *peer, &name)
                        .then_some(())
                        .ok_or("unknown group member")
                }
            }
        }
    }
}

fn member_name(engine: &dyn Engine, group: u32, peer: u32) -> String {
    engine
        .group_peer_name(group, peer)
        .map(|name| String::from_utf8_lossy(&name).into_owned())
        .unwrap_or_default()
}

fn rebuild_friend_mirror(engine: &dyn Engine, registry: &mut PeerRegistry) {
    registry.clear_friends();
    for number in engine.friend_list() {
        let id = FriendId::new(number);
        registry.upsert_friend(id);
        if let Some(name) = engine.friend_name(number) {
            registry.set_friend_name(id, &String::from_utf8_lossy(&name));
        }
        if let Some(message) = engine.friend_status_message(number) {
            registry.set_friend_status_message(id, &String::from_utf8_lossy(&message));
        }
        if let Some(status) = engine.friend_user_status(number) {
            registry.set_friend_status(id, UserStatus::from_raw(status).unwrap_or_default());
        }
        if let Some(online) = engine.friend_connection_status(number) {
            registry.set_friend_online(id, online);
        }
        if let Some(typing) = engine.friend_typing(number) {
            registry.set_friend_typing(id, typing);
        }
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn require_friend(registry: &PeerRegistry, friend: FriendId) -> PeerchatResult<()> {
    registry
        .friend(friend)
        .map(|_| ())
        .ok_or(PeerchatError::FriendNotFound(friend))
}

fn validate_message(message: &str) -> PeerchatResult<()> {
    if message.is_empty() {
        return Err(PeerchatError::invalid_argument("message must not be empty"));
    }
    if message.len() > MAX_MESSAGE_LENGTH {
        return Err(PeerchatError::invalid_argument("message is too long"));
    }
    Ok(())
}

fn to_receipt(code: i32) -> PeerchatResult<u32> {
    if code < 0 {
        return Err(PeerchatError::engine_rejected(code));
    }
    Ok(code as u32)
}
