//! Shared test engines.
//!
//! `ScriptedEngine` replays pre-queued notification batches, one batch
//! per advance tick, for deterministic single-session tests.
//! `LoopbackExchange` wires several engines together in memory so
//! two sessions can exchange friend requests, messages, and presence
//! without any real transport.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use peerchat::{Address, Engine, PublicKey, RawNotification, TransferDirection};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ----------------------------------------------------------------------------
// Scripted Engine
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScriptedFriend {
    number: u32,
    public_key: [u8; 32],
    name: Vec<u8>,
    status_message: Vec<u8>,
    user_status: u8,
    online: bool,
    typing: bool,
    sends_receipts: bool,
    last_online: u64,
}

impl ScriptedFriend {
    fn new(number: u32, public_key: [u8; 32]) -> Self {
        Self {
            number,
            public_key,
            name: Vec::new(),
            status_message: Vec::new(),
            user_status: 0,
            online: false,
            typing: false,
            sends_receipts: true,
            last_online: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptedGroup {
    number: u32,
    peers: Vec<(u32, Vec<u8>)>,
}

/// The engine-side state persisted by serialize/deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScriptedBlob {
    friends: Vec<ScriptedFriend>,
    next_friend: u32,
    self_name: Vec<u8>,
    self_status_message: Vec<u8>,
    self_status: u8,
    nospam: u32,
}

struct ScriptedState {
    ticks: VecDeque<Vec<RawNotification>>,
    friends: Vec<ScriptedFriend>,
    groups: Vec<ScriptedGroup>,
    next_friend: u32,
    next_group: u32,
    next_receipt: u32,
    next_file: u32,
    reject_next_add: Option<i32>,
    self_name: Vec<u8>,
    self_status_message: Vec<u8>,
    self_status: u8,
    nospam: u32,
    connected: bool,
    interval_ms: u64,
    sent_messages: Vec<(u32, String)>,
}

/// An engine that emits exactly the notifications a test queued,
/// one batch per tick.
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptedState>>,
}

/// Test-side control over a [`ScriptedEngine`], alive independently of
/// the session that owns the engine.
#[derive(Clone)]
pub struct ScriptedHandle {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedEngine {
    pub fn new() -> (Self, ScriptedHandle) {
        let state = Arc::new(Mutex::new(ScriptedState {
            ticks: VecDeque::new(),
            friends: Vec::new(),
            groups: Vec::new(),
            next_friend: 0,
            next_group: 0,
            next_receipt: 1,
            next_file: 0,
            reject_next_add: None,
            self_name: Vec::new(),
            self_status_message: Vec::new(),
            self_status: 0,
            nospam: 0x0101_0101,
            connected: true,
            interval_ms: 20,
            sent_messages: Vec::new(),
        }));
        let handle = ScriptedHandle {
            state: state.clone(),
        };
        (Self { state }, handle)
    }
}

impl ScriptedHandle {
    /// Queue one batch of notifications for the next advance tick.
    pub fn queue_tick(&self, batch: Vec<RawNotification>) {
        self.state.lock().ticks.push_back(batch);
    }

    /// Queue a single notification as its own tick.
    pub fn queue(&self, notification: RawNotification) {
        self.queue_tick(vec![notification]);
    }

    /// Make the next add-friend command fail with the given code.
    pub fn reject_next_add(&self, code: i32) {
        self.state.lock().reject_next_add = Some(code);
    }

    pub fn set_interval(&self, interval_ms: u64) {
        self.state.lock().interval_ms = interval_ms;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Record a member on the engine side so membership notifications
    /// can resolve the peer's name.
    pub fn set_group_peer(&self, group: u32, peer: u32, name: &str) {
        let mut state = self.state.lock();
        let Some(group) = state.groups.iter_mut().find(|g| g.number == group) else {
            return;
        };
        match group.peers.iter_mut().find(|(number, _)| *number == peer) {
            Some((_, existing)) => *existing = name.as_bytes().to_vec(),
            None => group.peers.push((peer, name.as_bytes().to_vec())),
        }
    }

    /// Set engine-side friend attributes, as a restored blob would.
    pub fn set_friend_attrs(&self, friend: u32, name: &str, status_message: &str, online: bool) {
        let mut state = self.state.lock();
        if let Some(entry) = state.friends.iter_mut().find(|f| f.number == friend) {
            entry.name = name.as_bytes().to_vec();
            entry.status_message = status_message.as_bytes().to_vec();
            entry.online = online;
        }
    }

    pub fn sent_messages(&self) -> Vec<(u32, String)> {
        self.state.lock().sent_messages.clone()
    }

    pub fn sends_receipts(&self, friend: u32) -> Option<bool> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| f.sends_receipts)
    }

    pub fn pending_ticks(&self) -> usize {
        self.state.lock().ticks.len()
    }
}

impl Engine for ScriptedEngine {
    fn advance(&mut self, sink: &mut dyn FnMut(RawNotification)) -> u64 {
        let (batch, interval) = {
            let mut state = self.state.lock();
            (state.ticks.pop_front(), state.interval_ms)
        };
        for notification in batch.into_iter().flatten() {
            sink(notification);
        }
        interval
    }

    fn add_friend(&mut self, address: &Address, _message: &[u8]) -> i32 {
        let mut state = self.state.lock();
        if let Some(code) = state.reject_next_add.take() {
            return code;
        }
        let number = state.next_friend;
        state.next_friend += 1;
        let friend = ScriptedFriend::new(number, *address.public_key().as_bytes());
        state.friends.push(friend);
        number as i32
    }

    fn add_friend_no_request(&mut self, public_key: &PublicKey) -> i32 {
        let mut state = self.state.lock();
        if let Some(code) = state.reject_next_add.take() {
            return code;
        }
        let number = state.next_friend;
        state.next_friend += 1;
        let friend = ScriptedFriend::new(number, *public_key.as_bytes());
        state.friends.push(friend);
        number as i32
    }

    fn delete_friend(&mut self, friend: u32) -> bool {
        let mut state = self.state.lock();
        let before = state.friends.len();
        state.friends.retain(|f| f.number != friend);
        state.friends.len() != before
    }

    fn send_message(&mut self, friend: u32, message: &[u8]) -> i32 {
        let mut state = self.state.lock();
        if !state.friends.iter().any(|f| f.number == friend) {
            return -1;
        }
        state
            .sent_messages
            .push((friend, String::from_utf8_lossy(message).into_owned()));
        let receipt = state.next_receipt;
        state.next_receipt += 1;
        receipt as i32
    }

    fn send_message_with_id(&mut self, friend: u32, id: u32, message: &[u8]) -> i32 {
        let mut state = self.state.lock();
        if !state.friends.iter().any(|f| f.number == friend) {
            return -1;
        }
        state
            .sent_messages
            .push((friend, String::from_utf8_lossy(message).into_owned()));
        id as i32
    }

    fn send_action(&mut self, friend: u32, action: &[u8]) -> i32 {
        self.send_message(friend, action)
    }

    fn send_action_with_id(&mut self, friend: u32, id: u32, action: &[u8]) -> i32 {
        self.send_message_with_id(friend, id, action)
    }

    fn set_typing(&mut self, friend: u32, _typing: bool) -> bool {
        self.state.lock().friends.iter().any(|f| f.number == friend)
    }

    fn set_sends_receipts(&mut self, friend: u32, send: bool) -> bool {
        match self
            .state
            .lock()
            .friends
            .iter_mut()
            .find(|f| f.number == friend)
        {
            Some(entry) => {
                entry.sends_receipts = send;
                true
            }
            None => false,
        }
    }

    fn friend_list(&self) -> Vec<u32> {
        self.state.lock().friends.iter().map(|f| f.number).collect()
    }

    fn friend_public_key(&self, friend: u32) -> Option<PublicKey> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| PublicKey::new(f.public_key))
    }

    fn friend_by_public_key(&self, public_key: &PublicKey) -> Option<u32> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| &f.public_key == public_key.as_bytes())
            .map(|f| f.number)
    }

    fn friend_name(&self, friend: u32) -> Option<Vec<u8>> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| f.name.clone())
    }

    fn friend_status_message(&self, friend: u32) -> Option<Vec<u8>> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| f.status_message.clone())
    }

    fn friend_user_status(&self, friend: u32) -> Option<u8> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| f.user_status)
    }

    fn friend_connection_status(&self, friend: u32) -> Option<bool> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| f.online)
    }

    fn friend_typing(&self, friend: u32) -> Option<bool> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| f.typing)
    }

    fn last_online(&self, friend: u32) -> Option<u64> {
        self.state
            .lock()
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| f.last_online)
    }

    fn self_address(&self) -> Address {
        let state = self.state.lock();
        Address::from_parts(PublicKey::new([0xEE; 32]), state.nospam)
    }

    fn self_name(&self) -> Vec<u8> {
        self.state.lock().self_name.clone()
    }

    fn set_self_name(&mut self, name: &[u8]) -> bool {
        self.state.lock().self_name = name.to_vec();
        true
    }

    fn self_status_message(&self) -> Vec<u8> {
        self.state.lock().self_status_message.clone()
    }

    fn set_self_status_message(&mut self, message: &[u8]) -> bool {
        self.state.lock().self_status_message = message.to_vec();
        true
    }

    fn self_user_status(&self) -> u8 {
        self.state.lock().self_status
    }

    fn set_self_user_status(&mut self, status: u8) -> bool {
        self.state.lock().self_status = status;
        true
    }

    fn nospam(&self) -> u32 {
        self.state.lock().nospam
    }

    fn set_nospam(&mut self, nospam: u32) {
        self.state.lock().nospam = nospam;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn new_group(&mut self) -> i32 {
        let mut state = self.state.lock();
        let number = state.next_group;
        state.next_group += 1;
        state.groups.push(ScriptedGroup {
            number,
            peers: Vec::new(),
        });
        number as i32
    }

    fn delete_group(&mut self, group: u32) -> bool {
        let mut state = self.state.lock();
        let before = state.groups.len();
        state.groups.retain(|g| g.number != group);
        state.groups.len() != before
    }

    fn join_group(&mut self, friend: u32, _group_public_key: &PublicKey) -> i32 {
        let mut state = self.state.lock();
        if !state.friends.iter().any(|f| f.number == friend) {
            return -1;
        }
        let number = state.next_group;
        state.next_group += 1;
        state.groups.push(ScriptedGroup {
            number,
            peers: Vec::new(),
        });
        number as i32
    }

    fn invite_friend(&mut self, friend: u32, group: u32) -> bool {
        let state = self.state.lock();
        state.friends.iter().any(|f| f.number == friend)
            && state.groups.iter().any(|g| g.number == group)
    }

    fn send_group_message(&mut self, group: u32, _message: &[u8]) -> bool {
        self.state.lock().groups.iter().any(|g| g.number == group)
    }

    fn send_group_action(&mut self, group: u32, _action: &[u8]) -> bool {
        self.state.lock().groups.iter().any(|g| g.number == group)
    }

    fn group_peer_name(&self, group: u32, peer: u32) -> Option<Vec<u8>> {
        self.state
            .lock()
            .groups
            .iter()
            .find(|g| g.number == group)?
            .peers
            .iter()
            .find(|(number, _)| *number == peer)
            .map(|(_, name)| name.clone())
    }

    fn new_file_sender(&mut self, friend: u32, _file_size: u64, _file_name: &[u8]) -> i32 {
        let mut state = self.state.lock();
        if !state.friends.iter().any(|f| f.number == friend) {
            return -1;
        }
        let number = state.next_file;
        state.next_file += 1;
        number as i32
    }

    fn file_send_control(
        &mut self,
        friend: u32,
        _direction: TransferDirection,
        _file_number: u32,
        _control: u8,
        _data: &[u8],
    ) -> bool {
        self.state.lock().friends.iter().any(|f| f.number == friend)
    }

    fn file_send_data(&mut self, friend: u32, _file_number: u32, _data: &[u8]) -> bool {
        self.state.lock().friends.iter().any(|f| f.number == friend)
    }

    fn file_data_size(&self, friend: u32) -> i32 {
        if self.state.lock().friends.iter().any(|f| f.number == friend) {
            1371
        } else {
            -1
        }
    }

    fn file_data_remaining(
        &self,
        friend: u32,
        _file_number: u32,
        _direction: TransferDirection,
    ) -> Option<u64> {
        self.state
            .lock()
            .friends
            .iter()
            .any(|f| f.number == friend)
            .then_some(0)
    }

    fn serialize(&self) -> Vec<u8> {
        let state = self.state.lock();
        let blob = ScriptedBlob {
            friends: state.friends.clone(),
            next_friend: state.next_friend,
            self_name: state.self_name.clone(),
            self_status_message: state.self_status_message.clone(),
            self_status: state.self_status,
            nospam: state.nospam,
        };
        bincode::serialize(&blob).expect("serialize scripted state")
    }

    fn deserialize(&mut self, data: &[u8]) -> bool {
        let Ok(blob) = bincode::deserialize::<ScriptedBlob>(data) else {
            return false;
        };
        let mut state = self.state.lock();
        state.friends = blob.friends;
        state.next_friend = blob.next_friend;
        state.self_name = blob.self_name;
        state.self_status_message = blob.self_status_message;
        state.self_status = blob.self_status;
        state.nospam = blob.nospam;
        true
    }
}

// ----------------------------------------------------------------------------
// Loopback Exchange
// ----------------------------------------------------------------------------

struct LoopFriend {
    number: u32,
    public_key: [u8; 32],
}

#[derive(Default)]
struct Endpoint {
    queue: VecDeque<RawNotification>,
    friends: Vec<LoopFriend>,
    next_friend: u32,
    next_receipt: u32,
    name: Vec<u8>,
    status_message: Vec<u8>,
    status: u8,
    nospam: u32,
}

impl Endpoint {
    fn friend_number_of(&self, public_key: &[u8; 32]) -> Option<u32> {
        self.friends
            .iter()
            .find(|f| &f.public_key == public_key)
            .map(|f| f.number)
    }
}

#[derive(Default)]
struct ExchangeState {
    endpoints: HashMap<[u8; 32], Endpoint>,
}

/// An in-memory fabric connecting [`LoopbackEngine`]s: what one engine
/// sends appears as notifications in the recipient's queue on its next
/// advance tick.
#[derive(Clone, Default)]
pub struct LoopbackExchange {
    state: Arc<Mutex<ExchangeState>>,
}

impl LoopbackExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint whose 32-byte public key is `seed`
    /// repeated.
    pub fn endpoint(&self, seed: u8) -> LoopbackEngine {
        let key = [seed; 32];
        let mut state = self.state.lock();
        state.endpoints.entry(key).or_insert_with(|| Endpoint {
            nospam: seed as u32,
            ..Endpoint::default()
        });
        LoopbackEngine {
            state: self.state.clone(),
            key,
        }
    }
}

/// One side of a loopback pair. Friend requests, connection
/// transitions, messages, typing, and self-state changes propagate to
/// the other side; groups and file transfer are not modeled.
pub struct LoopbackEngine {
    state: Arc<Mutex<ExchangeState>>,
    key: [u8; 32],
}

impl LoopbackEngine {
    fn has_friend(&self, friend: u32) -> bool {
        self.state.lock().endpoints[&self.key]
            .friends
            .iter()
            .any(|f| f.number == friend)
    }

    pub fn address(&self) -> Address {
        let state = self.state.lock();
        let nospam = state.endpoints[&self.key].nospam;
        Address::from_parts(PublicKey::new(self.key), nospam)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.key)
    }

    /// If both sides now list each other as friends, queue online
    /// transitions for both.
    fn connect_if_mutual(state: &mut ExchangeState, a: &[u8; 32], b: &[u8; 32]) {
        let Some(a_number_at_b) = state
            .endpoints
            .get(b)
            .and_then(|endpoint| endpoint.friend_number_of(a))
        else {
            return;
        };
        let Some(b_number_at_a) = state
            .endpoints
            .get(a)
            .and_then(|endpoint| endpoint.friend_number_of(b))
        else {
            return;
        };
        if let Some(endpoint) = state.endpoints.get_mut(a) {
            endpoint.queue.push_back(RawNotification::ConnectionStatus {
                friend: b_number_at_a,
                status: 1,
            });
        }
        if let Some(endpoint) = state.endpoints.get_mut(b) {
            endpoint.queue.push_back(RawNotification::ConnectionStatus {
                friend: a_number_at_b,
                status: 1,
            });
        }
    }

    fn register_friend(state: &mut ExchangeState, owner: &[u8; 32], peer: [u8; 32]) -> i32 {
        let Some(endpoint) = state.endpoints.get_mut(owner) else {
            return -1;
        };
        if endpoint.friend_number_of(&peer).is_some() {
            return -4; // already sent
        }
        let number = endpoint.next_friend;
        endpoint.next_friend += 1;
        endpoint.friends.push(LoopFriend {
            number,
            public_key: peer,
        });
        number as i32
    }

    /// Deliver one notification to the peer a local friend number
    /// refers to. Silently dropped if the friendship is one-sided.
    fn notify_peer<F>(&self, friend: u32, build: F) -> bool
    where
        F: FnOnce(u32) -> RawNotification,
    {
        let mut state = self.state.lock();
        let Some(peer_key) = state.endpoints[&self.key]
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| f.public_key)
        else {
            return false;
        };
        if let Some(peer) = state.endpoints.get_mut(&peer_key) {
            if let Some(my_number) = peer.friend_number_of(&self.key) {
                peer.queue.push_back(build(my_number));
            }
        }
        true
    }

    fn broadcast<F>(&self, build: F)
    where
        F: Fn(u32) -> RawNotification,
    {
        let mut state = self.state.lock();
        let peers: Vec<[u8; 32]> = state.endpoints[&self.key]
            .friends
            .iter()
            .map(|f| f.public_key)
            .collect();
        for peer_key in peers {
            if let Some(peer) = state.endpoints.get_mut(&peer_key) {
                if let Some(my_number) = peer.friend_number_of(&self.key) {
                    peer.queue.push_back(build(my_number));
                }
            }
        }
    }
}

impl Engine for LoopbackEngine {
    fn advance(&mut self, sink: &mut dyn FnMut(RawNotification)) -> u64 {
        loop {
            let next = {
                let mut state = self.state.lock();
                state
                    .endpoints
                    .get_mut(&self.key)
                    .and_then(|endpoint| endpoint.queue.pop_front())
            };
            match next {
                Some(notification) => sink(notification),
                None => break,
            }
        }
        20
    }

    fn add_friend(&mut self, address: &Address, message: &[u8]) -> i32 {
        let peer_key = *address.public_key().as_bytes();
        if peer_key == self.key {
            return -3; // own key
        }
        let mut state = self.state.lock();
        let number = Self::register_friend(&mut state, &self.key, peer_key);
        if number < 0 {
            return number;
        }
        let peer_knows_us = state
            .endpoints
            .get(&peer_key)
            .map(|endpoint| endpoint.friend_number_of(&self.key).is_some())
            .unwrap_or(false);
        if peer_knows_us {
            Self::connect_if_mutual(&mut state, &self.key, &peer_key);
        } else if let Some(peer) = state.endpoints.get_mut(&peer_key) {
            peer.queue.push_back(RawNotification::FriendRequest {
                public_key: self.key,
                message: message.to_vec(),
            });
        }
        number
    }

    fn add_friend_no_request(&mut self, public_key: &PublicKey) -> i32 {
        let peer_key = *public_key.as_bytes();
        if peer_key == self.key {
            return -3;
        }
        let mut state = self.state.lock();
        let number = Self::register_friend(&mut state, &self.key, peer_key);
        if number >= 0 {
            Self::connect_if_mutual(&mut state, &self.key, &peer_key);
        }
        number
    }

    fn delete_friend(&mut self, friend: u32) -> bool {
        let mut state = self.state.lock();
        let Some(endpoint) = state.endpoints.get_mut(&self.key) else {
            return false;
        };
        let before = endpoint.friends.len();
        endpoint.friends.retain(|f| f.number != friend);
        endpoint.friends.len() != before
    }

    fn send_message(&mut self, friend: u32, message: &[u8]) -> i32 {
        let delivered = self.notify_peer(friend, |my_number| RawNotification::FriendMessage {
            friend: my_number,
            message: message.to_vec(),
        });
        if !delivered {
            return -1;
        }
        let mut state = self.state.lock();
        let endpoint = state
            .endpoints
            .get_mut(&self.key)
            .expect("endpoint registered");
        endpoint.next_receipt += 1;
        endpoint.next_receipt as i32
    }

    fn send_message_with_id(&mut self, friend: u32, id: u32, message: &[u8]) -> i32 {
        let delivered = self.notify_peer(friend, |my_number| RawNotification::FriendMessage {
            friend: my_number,
            message: message.to_vec(),
        });
        if delivered {
            id as i32
        } else {
            -1
        }
    }

    fn send_action(&mut self, friend: u32, action: &[u8]) -> i32 {
        let delivered = self.notify_peer(friend, |my_number| RawNotification::FriendAction {
            friend: my_number,
            action: action.to_vec(),
        });
        if !delivered {
            return -1;
        }
        let mut state = self.state.lock();
        let endpoint = state
            .endpoints
            .get_mut(&self.key)
            .expect("endpoint registered");
        endpoint.next_receipt += 1;
        endpoint.next_receipt as i32
    }

    fn send_action_with_id(&mut self, friend: u32, id: u32, action: &[u8]) -> i32 {
        let delivered = self.notify_peer(friend, |my_number| RawNotification::FriendAction {
            friend: my_number,
            action: action.to_vec(),
        });
        if delivered {
            id as i32
        } else {
            -1
        }
    }

    fn set_typing(&mut self, friend: u32, typing: bool) -> bool {
        self.notify_peer(friend, |my_number| RawNotification::TypingChange {
            friend: my_number,
            typing,
        })
    }

    fn set_sends_receipts(&mut self, friend: u32, _send: bool) -> bool {
        self.has_friend(friend)
    }

    fn friend_list(&self) -> Vec<u32> {
        self.state.lock().endpoints[&self.key]
            .friends
            .iter()
            .map(|f| f.number)
            .collect()
    }

    fn friend_public_key(&self, friend: u32) -> Option<PublicKey> {
        self.state.lock().endpoints[&self.key]
            .friends
            .iter()
            .find(|f| f.number == friend)
            .map(|f| PublicKey::new(f.public_key))
    }

    fn friend_by_public_key(&self, public_key: &PublicKey) -> Option<u32> {
        self.state.lock().endpoints[&self.key].friend_number_of(public_key.as_bytes())
    }

    fn friend_name(&self, friend: u32) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let peer_key = state.endpoints[&self.key]
            .friends
            .iter()
            .find(|f| f.number == friend)?
            .public_key;
        state
            .endpoints
            .get(&peer_key)
            .map(|endpoint| endpoint.name.clone())
    }

    fn friend_status_message(&self, friend: u32) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let peer_key = state.endpoints[&self.key]
            .friends
            .iter()
            .find(|f| f.number == friend)?
            .public_key;
        state
            .endpoints
            .get(&peer_key)
            .map(|endpoint| endpoint.status_message.clone())
    }

    fn friend_user_status(&self, friend: u32) -> Option<u8> {
        let state = self.state.lock();
        let peer_key = state.endpoints[&self.key]
            .friends
            .iter()
            .find(|f| f.number == friend)?
            .public_key;
        state
            .endpoints
            .get(&peer_key)
            .map(|endpoint| endpoint.status)
    }

    fn friend_connection_status(&self, friend: u32) -> Option<bool> {
        let state = self.state.lock();
        let peer_key = state.endpoints[&self.key]
            .friends
            .iter()
            .find(|f| f.number == friend)?
            .public_key;
        Some(
            state
                .endpoints
                .get(&peer_key)
                .and_then(|endpoint| endpoint.friend_number_of(&self.key))
                .is_some(),
        )
    }

    fn friend_typing(&self, friend: u32) -> Option<bool> {
        self.has_friend(friend).then_some(false)
    }

    fn last_online(&self, friend: u32) -> Option<u64> {
        self.has_friend(friend).then_some(0)
    }

    fn self_address(&self) -> Address {
        self.address()
    }

    fn self_name(&self) -> Vec<u8> {
        self.state.lock().endpoints[&self.key].name.clone()
    }

    fn set_self_name(&mut self, name: &[u8]) -> bool {
        {
            let mut state = self.state.lock();
            if let Some(endpoint) = state.endpoints.get_mut(&self.key) {
                endpoint.name = name.to_vec();
            }
        }
        let name = name.to_vec();
        self.broadcast(|my_number| RawNotification::NameChange {
            friend: my_number,
            name: name.clone(),
        });
        true
    }

    fn self_status_message(&self) -> Vec<u8> {
        self.state.lock().endpoints[&self.key].status_message.clone()
    }

    fn set_self_status_message(&mut self, message: &[u8]) -> bool {
        {
            let mut state = self.state.lock();
            if let Some(endpoint) = state.endpoints.get_mut(&self.key) {
                endpoint.status_message = message.to_vec();
            }
        }
        let message = message.to_vec();
        self.broadcast(|my_number| RawNotification::StatusMessage {
            friend: my_number,
            message: message.clone(),
        });
        true
    }

    fn self_user_status(&self) -> u8 {
        self.state.lock().endpoints[&self.key].status
    }

    fn set_self_user_status(&mut self, status: u8) -> bool {
        {
            let mut state = self.state.lock();
            if let Some(endpoint) = state.endpoints.get_mut(&self.key) {
                endpoint.status = status;
            }
        }
        self.broadcast(|my_number| RawNotification::UserStatus {
            friend: my_number,
            status,
        });
        true
    }

    fn nospam(&self) -> u32 {
        self.state.lock().endpoints[&self.key].nospam
    }

    fn set_nospam(&mut self, nospam: u32) {
        if let Some(endpoint) = self.state.lock().endpoints.get_mut(&self.key) {
            endpoint.nospam = nospam;
        }
    }

    fn is_connected(&self) -> bool {
        true
    }

    // Groups and file transfer are outside the loopback model.

    fn new_group(&mut self) -> i32 {
        -1
    }

    fn delete_group(&mut self, _group: u32) -> bool {
        false
    }

    fn join_group(&mut self, _friend: u32, _group_public_key: &PublicKey) -> i32 {
        -1
    }

    fn invite_friend(&mut self, _friend: u32, _group: u32) -> bool {
        false
    }

    fn send_group_message(&mut self, _group: u32, _message: &[u8]) -> bool {
        false
    }

    fn send_group_action(&mut self, _group: u32, _action: &[u8]) -> bool {
        false
    }

    fn group_peer_name(&self, _group: u32, _peer: u32) -> Option<Vec<u8>> {
        None
    }

    fn new_file_sender(&mut self, _friend: u32, _file_size: u64, _file_name: &[u8]) -> i32 {
        -1
    }

    fn file_send_control(
        &mut self,
        _friend: u32,
        _direction: TransferDirection,
        _file_number: u32,
        _control: u8,
        _data: &[u8],
    ) -> bool {
        false
    }

    fn file_send_data(&mut self, _friend: u32, _file_number: u32, _data: &[u8]) -> bool {
        false
    }

    fn file_data_size(&self, _friend: u32) -> i32 {
        -1
    }

    fn file_data_remaining(
        &self,
        _friend: u32,
        _file_number: u32,
        _direction: TransferDirection,
    ) -> Option<u64> {
        None
    }

    fn serialize(&self) -> Vec<u8> {
        Vec::new()
    }

    fn deserialize(&mut self, _data: &[u8]) -> bool {
        false
    }
}
