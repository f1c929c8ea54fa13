//! Change notification sink

use tokio::sync::broadcast;
use tracing::debug;

/// `/object/instance/resource` of a resource that was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceChange {
    pub object_id: u16,
    pub instance_id: u16,
    pub resource_id: u16,
}

impl std::fmt::Display for ResourceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "/{}/{}/{}",
            self.object_id, self.instance_id, self.resource_id
        )
    }
}

/// Receives one call per successful write
pub trait ChangeNotifier: Send + Sync {
    fn resource_changed(&self, change: ResourceChange);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn resource_changed(&self, _change: ResourceChange) {}
}

/// Fans changes out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ResourceChange>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResourceChange> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn resource_changed(&self, change: ResourceChange) {
        debug!("Resource changed: {}", change);
        // No subscribers is fine
        let _ = self.tx.send(change);
    }
}
