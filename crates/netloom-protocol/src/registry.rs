//! The two lookup tables a [`crate::Protocol`] consults on every message: which
//! [`MsgProcessor`](crate::MsgProcessor) owns a signature, and which live [`Connection`]
//! a connection id names. Both are read far more often than they are written, so each is
//! a `RwLock` taking read locks on the hot path and write locks only for admin
//! operations (registering a processor, accepting or dropping a connection).

use hashbrown::HashMap;
use netloom_core::connection::{Connection, ConnectionId};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::msg_processor::MsgProcessor;

/// Maps message signatures to the processor that serializes and deserializes them.
#[derive(Default)]
pub struct SignatureRegistry {
    processors: RwLock<HashMap<u16, Arc<dyn MsgProcessor>>>,
}

impl SignatureRegistry {
    pub fn new() -> SignatureRegistry {
        SignatureRegistry::default()
    }

    /// Registers `processor` under its own [`MsgProcessor::signature`]. Returns `false`
    /// without replacing anything if a processor is already registered for that
    /// signature.
    pub fn register(&self, processor: Arc<dyn MsgProcessor>) -> bool {
        let signature = processor.signature();
        let mut processors = self.processors.write();
        if processors.contains_key(&signature) {
            return false;
        }
        processors.insert(signature, processor);
        true
    }

    /// Removes the processor registered for `signature`, but only if `processor` is the
    /// exact instance currently holding that slot. Returns `false` without removing
    /// anything if the signature is unregistered or held by a different instance.
    pub fn unregister(&self, signature: u16, processor: &Arc<dyn MsgProcessor>) -> bool {
        let mut processors = self.processors.write();
        match processors.get(&signature) {
            Some(current) if Arc::ptr_eq(current, processor) => {
                processors.remove(&signature);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, signature: u16) -> Option<Arc<dyn MsgProcessor>> {
        self.processors.read().get(&signature).cloned()
    }

    pub fn close(&self) {
        let mut processors = self.processors.write();
        for processor in processors.values() {
            processor.close();
        }
        processors.clear();
    }
}

/// Maps connection ids to the live [`Connection`] they name. The sole strong owner of
/// every ordinary connection; [`netloom_core::BroadcastGroup`] only holds weak
/// references into this table.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> ConnectionRegistry {
        ConnectionRegistry::default()
    }

    pub fn insert(&self, connection: Arc<dyn Connection>) {
        self.connections.write().insert(connection.id(), connection);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        self.connections.write().remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        self.connections.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().copied().collect()
    }

    pub fn close_all(&self) {
        let mut connections = self.connections.write();
        for connection in connections.values() {
            connection.close();
        }
        connections.clear();
    }
}
