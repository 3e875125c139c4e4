//! Connection pools for the two transports
//!
//! Two independent pools share one generic implementation: the text pool
//! holds TurboWarp WebSocket clients (outbound `String` messages) and the
//! mesh pool holds Scratch 1.4 TCP clients (outbound framed `Bytes`).
//!
//! The registry lives on the dispatcher task and is never shared, so it is a
//! plain struct without locking. Each member is reached through a bounded
//! mpsc sender drained by that connection's writer task; delivery is
//! fire-and-forget via `try_send`. A member whose queue is full has the
//! message dropped and counted, and is evicted once its lifetime drop count
//! crosses [`MAX_TOTAL_DROPS`] (its writer task then exits and the socket
//! closes).

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;
use uuid::Uuid;

/// Outbound queue depth per connection.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Maximum total lifetime message drops before a slow client is evicted.
pub const MAX_TOTAL_DROPS: u64 = 100;

/// Opaque identifier for one connected client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// New id with a transport prefix and a short random suffix,
    /// e.g. `ws_3f9a02c1` or `mesh_0b44d718`.
    pub fn new(prefix: &str) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", prefix, &uuid[..8]))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to one connected client's outbound queue.
#[derive(Debug)]
struct Member<T> {
    tx: mpsc::Sender<T>,
    drops: u64,
}

/// One pool of connections with fanout operations.
#[derive(Debug)]
pub struct Pool<T> {
    members: HashMap<ClientId, Member<T>>,
}

impl<T: Clone> Pool<T> {
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
        }
    }

    pub fn add(&mut self, id: ClientId, tx: mpsc::Sender<T>) {
        self.members.insert(id, Member { tx, drops: 0 });
    }

    /// Remove a member. Removing an absent member is a no-op.
    pub fn remove(&mut self, id: &ClientId) {
        self.members.remove(id);
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.members.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Deliver `msg` to every member, each visited once.
    pub fn broadcast(&mut self, msg: &T) {
        self.fan_out(None, msg);
    }

    /// Deliver `msg` to every member except `excluded`.
    pub fn broadcast_except(&mut self, excluded: &ClientId, msg: &T) {
        self.fan_out(Some(excluded), msg);
    }

    /// Deliver `msg` to `id` only.
    pub fn send_to(&mut self, id: &ClientId, msg: T) {
        let mut closed = false;
        if let Some(member) = self.members.get_mut(id) {
            match member.tx.try_send(msg) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    member.drops += 1;
                    warn!(client = %id, "outbound queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => closed = true,
            }
        }
        if closed {
            self.members.remove(id);
        }
        self.evict_slow();
    }

    fn fan_out(&mut self, excluded: Option<&ClientId>, msg: &T) {
        let mut closed = Vec::new();
        for (id, member) in self.members.iter_mut() {
            if excluded == Some(id) {
                continue;
            }
            if let Err(e) = member.tx.try_send(msg.clone()) {
                match e {
                    TrySendError::Full(_) => {
                        member.drops += 1;
                        warn!(
                            client = %id,
                            total_drops = member.drops,
                            "outbound queue full, dropping message"
                        );
                    }
                    TrySendError::Closed(_) => closed.push(id.clone()),
                }
            }
        }
        for id in closed {
            self.members.remove(&id);
        }
        self.evict_slow();
    }

    fn evict_slow(&mut self) {
        let slow: Vec<ClientId> = self
            .members
            .iter()
            .filter(|(_, m)| m.drops >= MAX_TOTAL_DROPS)
            .map(|(id, _)| id.clone())
            .collect();
        for id in slow {
            warn!(client = %id, "disconnecting slow client");
            self.members.remove(&id);
        }
    }
}

impl<T: Clone> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The two pools, one per transport.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// TurboWarp WebSocket clients; outbound messages are protocol text.
    pub ws: Pool<String>,
    /// Scratch 1.4 Mesh clients; outbound messages are complete frames.
    pub mesh: Pool<Bytes>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            ws: Pool::new(),
            mesh: Pool::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(pool: &mut Pool<String>, capacity: usize) -> (ClientId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = ClientId::new("ws");
        pool.add(id.clone(), tx);
        (id, rx)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_member() {
        let mut pool = Pool::new();
        let (_a, mut rx_a) = member(&mut pool, 8);
        let (_b, mut rx_b) = member(&mut pool, 8);

        pool.broadcast(&"hello".to_string());
        assert_eq!(rx_a.try_recv().unwrap(), "hello");
        assert_eq!(rx_b.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_sender() {
        let mut pool = Pool::new();
        let (a, mut rx_a) = member(&mut pool, 8);
        let (_b, mut rx_b) = member(&mut pool, 8);

        pool.broadcast_except(&a, &"hello".to_string());
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_send_to_single_member() {
        let mut pool = Pool::new();
        let (a, mut rx_a) = member(&mut pool, 8);
        let (_b, mut rx_b) = member(&mut pool, 8);

        pool.send_to(&a, "only you".to_string());
        assert_eq!(rx_a.try_recv().unwrap(), "only you");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let mut pool = Pool::new();
        let (a, _rx_a) = member(&mut pool, 8);
        let (_b, mut rx_b) = member(&mut pool, 8);

        pool.remove(&a);
        pool.remove(&a);
        let never_added = ClientId::new("ws");
        pool.remove(&never_added);

        assert_eq!(pool.len(), 1);
        pool.broadcast(&"still here".to_string());
        assert_eq!(rx_b.try_recv().unwrap(), "still here");
    }

    #[tokio::test]
    async fn test_closed_receiver_is_evicted_on_fanout() {
        let mut pool = Pool::new();
        let (_a, rx_a) = member(&mut pool, 8);
        drop(rx_a);

        pool.broadcast(&"anyone?".to_string());
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_slow_member_evicted_after_drop_threshold() {
        let mut pool = Pool::new();
        // Capacity 1: the first message fills the queue, the rest drop.
        let (slow, _rx_slow) = member(&mut pool, 1);
        let (fast, mut rx_fast) = member(&mut pool, 1024);

        for _ in 0..=MAX_TOTAL_DROPS {
            pool.broadcast(&"tick".to_string());
        }

        assert!(!pool.contains(&slow));
        assert!(pool.contains(&fast));
        assert_eq!(rx_fast.try_recv().unwrap(), "tick");
    }
}
