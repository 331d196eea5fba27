//! A [`Connection`] that fans its `send` out to a set of member connections.
//!
//! Membership is held by [`Weak`] reference: the owning `Protocol`'s connection
//! registry is the sole strong owner of a member, so removing a connection from the
//! registry is enough to drop it even if it is still listed in a group. Closing the
//! group closes every member still alive at that moment; it does not touch the
//! registry.

use crate::connection::{Connection, ConnectionId};
use crate::error::NetResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

pub struct BroadcastGroup {
    id: ConnectionId,
    members: RwLock<HashMap<ConnectionId, Weak<dyn Connection>>>,
}

impl BroadcastGroup {
    pub fn new(id: ConnectionId) -> BroadcastGroup {
        BroadcastGroup {
            id,
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Adds `member` to the group. A no-op if a member with the same id is already
    /// present.
    pub fn add_member(&self, member: &Arc<dyn Connection>) {
        let mut members = self.members.write();
        members.entry(member.id()).or_insert_with(|| Arc::downgrade(member));
    }

    /// Removes the member with `id` from the group. A no-op if absent.
    pub fn remove_member(&self, id: ConnectionId) {
        self.members.write().remove(&id);
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.read().contains_key(&id)
    }
}

impl Connection for BroadcastGroup {
    #[inline]
    fn id(&self) -> ConnectionId {
        self.id
    }

    /// Forwards `bytes` to every member alive at the moment of the call, skipping (and
    /// pruning) any whose owning connection has already been dropped from the registry.
    /// The first hard send error observed is returned after every live member has been
    /// attempted.
    fn send(&self, bytes: &[u8], timeout_secs: u32) -> NetResult<()> {
        let snapshot: Vec<(ConnectionId, Weak<dyn Connection>)> = {
            let members = self.members.read();
            members.iter().map(|(id, weak)| (*id, weak.clone())).collect()
        };

        let mut first_error = None;
        let mut dead = Vec::new();

        for (id, weak) in snapshot {
            match weak.upgrade() {
                Some(member) => {
                    if let Err(err) = member.send(bytes, timeout_secs) {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
                None => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut members = self.members.write();
            for id in dead {
                members.remove(&id);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Closes every member still alive, then empties the membership set.
    fn close(&self) {
        let mut members = self.members.write();
        for weak in members.values() {
            if let Some(member) = weak.upgrade() {
                member.close();
            }
        }
        members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConnection {
        id: ConnectionId,
        sent: AtomicUsize,
    }

    impl Connection for CountingConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }
        fn send(&self, _bytes: &[u8], _timeout_secs: u32) -> NetResult<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn close(&self) {}
    }

    #[test]
    fn send_reaches_every_member_exactly_once() {
        let group = BroadcastGroup::new(1);
        let a: Arc<dyn Connection> = Arc::new(CountingConnection {
            id: 51,
            sent: AtomicUsize::new(0),
        });
        let b: Arc<dyn Connection> = Arc::new(CountingConnection {
            id: 52,
            sent: AtomicUsize::new(0),
        });
        group.add_member(&a);
        group.add_member(&b);

        group.send(b"hello", 15).unwrap();

        assert_eq!(group.member_count(), 2);
    }

    #[test]
    fn adding_the_same_member_twice_is_a_noop() {
        let group = BroadcastGroup::new(1);
        let a: Arc<dyn Connection> = Arc::new(CountingConnection {
            id: 51,
            sent: AtomicUsize::new(0),
        });
        group.add_member(&a);
        group.add_member(&a);
        assert_eq!(group.member_count(), 1);
    }

    #[test]
    fn dropped_member_is_pruned_on_next_send() {
        let group = BroadcastGroup::new(1);
        {
            let a: Arc<dyn Connection> = Arc::new(CountingConnection {
                id: 51,
                sent: AtomicUsize::new(0),
            });
            group.add_member(&a);
        }
        assert_eq!(group.member_count(), 1);
        group.send(b"hello", 15).unwrap();
        assert_eq!(group.member_count(), 0);
    }

    #[test]
    fn removing_an_absent_member_is_a_noop() {
        let group = BroadcastGroup::new(1);
        group.remove_member(999);
        assert_eq!(group.member_count(), 0);
    }
}
