// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session fan-out (§4.5): one producer (an [`crate::instance::Instance`]'s
//! reader task), many subscribers (WebSocket connections, a subsystem
//! poller), all observing the same global publish order.
//!
//! Modeled on a `tokio::sync::broadcast` channel per session rather than a
//! hand-rolled subscriber list: broadcast's built-in lagged-receiver
//! semantics map directly onto the spec's "drop the slow subscriber with an
//! `Overrun` marker" back-pressure policy, so a [`std::sync::mpsc::RecvError::Lagged`]-equivalent
//! is surfaced to the caller instead of re-implemented.
//!
//! The cycle between the pool and the router is broken the way §9 of the
//! spec prescribes: an [`Instance`](crate::instance::Instance) never holds a
//! reference back to the [`Router`]; it is handed a [`Publisher`] capability
//! at construction time and knows nothing else about fan-out.

use clud_core::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One unit of router traffic: either a chunk of subprocess output, or the
/// end-of-stream marker published when the subprocess exits (§4.4).
#[derive(Debug, Clone)]
pub enum Frame {
    Chunk(Vec<u8>),
    EndOfStream,
}

struct Mailbox {
    ring: Vec<u8>,
    ring_cap: usize,
    tx: broadcast::Sender<Frame>,
}

impl Mailbox {
    fn new(ring_cap: usize, channel_capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(channel_capacity.max(1));
        Self { ring: Vec::new(), ring_cap, tx }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.ring.extend_from_slice(chunk);
        if self.ring.len() > self.ring_cap {
            let overflow = self.ring.len() - self.ring_cap;
            self.ring.drain(0..overflow);
        }
    }
}

struct RouterInner {
    ring_bytes: usize,
    channel_capacity: usize,
    mailboxes: Mutex<HashMap<SessionId, Mailbox>>,
}

/// Shared per-daemon fan-out hub. Cheap to clone (an `Arc` inside);
/// every clone refers to the same mailboxes.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub fn new(ring_bytes: usize, channel_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                ring_bytes,
                channel_capacity,
                mailboxes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Append `chunk` to the session's ring (evicting the oldest bytes if
    /// full) and push it to every live subscriber. A session with no
    /// subscribers yet still accumulates its ring so a later subscriber
    /// gets a non-empty snapshot.
    pub fn publish(&self, session_id: &SessionId, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        let mut mailboxes = self.inner.mailboxes.lock();
        let mailbox = mailboxes
            .entry(session_id.clone())
            .or_insert_with(|| Mailbox::new(self.inner.ring_bytes, self.inner.channel_capacity));
        mailbox.push(&chunk);
        // No subscribers is not an error; broadcast::Sender::send only fails
        // when the receiver count is zero, which is expected before the
        // first subscriber connects.
        let _ = mailbox.tx.send(Frame::Chunk(chunk));
    }

    /// Mark a session's stream as ended (subprocess exit/crash, §4.4).
    pub fn publish_end_of_stream(&self, session_id: &SessionId) {
        let mailboxes = self.inner.mailboxes.lock();
        if let Some(mailbox) = mailboxes.get(session_id) {
            let _ = mailbox.tx.send(Frame::EndOfStream);
        }
    }

    /// Subscribe to a session: returns the current ring snapshot plus a
    /// receiver for everything published from this point on. A subscriber
    /// that arrives before any publish gets an empty snapshot and a live
    /// receiver on a freshly created mailbox.
    pub fn subscribe(&self, session_id: &SessionId) -> (Vec<u8>, broadcast::Receiver<Frame>) {
        let mut mailboxes = self.inner.mailboxes.lock();
        let mailbox = mailboxes
            .entry(session_id.clone())
            .or_insert_with(|| Mailbox::new(self.inner.ring_bytes, self.inner.channel_capacity));
        (mailbox.ring.clone(), mailbox.tx.subscribe())
    }

    /// Build the publish capability handed to an [`crate::instance::Instance`]
    /// at construction: it can publish under its own session id and nothing
    /// else, so it never needs a reference back to this router's map.
    pub fn publisher(&self, session_id: SessionId) -> Publisher {
        Publisher { router: self.clone(), session_id }
    }
}

/// A capability to publish chunks/end-of-stream for exactly one session.
/// This is the only thing an [`crate::instance::Instance`] holds of the
/// router: it cannot subscribe, list sessions, or publish elsewhere.
#[derive(Clone)]
pub struct Publisher {
    router: Router,
    session_id: SessionId,
}

impl Publisher {
    pub fn publish(&self, chunk: Vec<u8>) {
        self.router.publish(&self.session_id, chunk);
    }

    pub fn end_of_stream(&self) {
        self.router.publish_end_of_stream(&self.session_id);
    }
}
