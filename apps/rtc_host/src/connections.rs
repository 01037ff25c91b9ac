use parking_lot::Mutex;
use rtc_protocol::{ChannelMessage, EventMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Outbound queue of one connected caller
pub type Outbound = UnboundedSender<ChannelMessage>;

/// Tracks connected callers so engine events can reach all of them
///
/// Both replies and events are pushed from the delivery thread into the same
/// per-connection queue, which keeps their relative order on the wire.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<Mutex<HashMap<SocketAddr, Outbound>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new caller connection
    pub fn register(&self, addr: SocketAddr, outbound: Outbound) {
        let mut connections = self.connections.lock();
        connections.insert(addr, outbound);
        info!("Registered caller {} - Total active: {}", addr, connections.len());
    }

    /// Unregister a caller connection
    pub fn unregister(&self, addr: &SocketAddr) {
        let mut connections = self.connections.lock();
        if connections.remove(addr).is_some() {
            info!("Unregistered caller {} - Total active: {}", addr, connections.len());
        }
    }

    pub fn count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Queue `event` for every connected caller, forgetting closed ones
    pub fn broadcast(&self, event: EventMessage) {
        let mut connections = self.connections.lock();
        connections.retain(|addr, outbound| {
            let alive = outbound.send(ChannelMessage::Event(event.clone())).is_ok();
            if !alive {
                tracing::debug!("Dropping closed caller {}", addr);
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtc_protocol::Payload;
    use tokio::sync::mpsc;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_broadcast_reaches_every_caller() {
        let manager = ConnectionManager::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        manager.register(addr(5000), tx_a);
        manager.register(addr(5001), tx_b);

        manager.broadcast(EventMessage::new("onConnectionLost", Payload::new()));

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv().unwrap() {
                ChannelMessage::Event(event) => assert_eq!(event.name, "onConnectionLost"),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }

    #[test]
    fn test_closed_callers_are_pruned() {
        let manager = ConnectionManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.register(addr(5000), tx);
        drop(rx);

        manager.broadcast(EventMessage::new("onRequestToken", Payload::new()));
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_unregister() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        manager.register(addr(5000), tx);
        manager.unregister(&addr(5000));
        manager.unregister(&addr(5000));
        assert_eq!(manager.count(), 0);
    }
}
