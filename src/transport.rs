//! Trait seams for the external pub/sub bus and RPC registrar. The bus
//! itself (topic-tree matching, at-least-once delivery, wire framing) and
//! the RPC transport layering over it live outside this crate; a real
//! integration implements these traits and drives `Engine::on_message` /
//! `Engine::handle_get_values` from its own I/O loop.

/// Subscribes the engine's configured topic patterns on the bus.
pub trait MessageBus {
    fn subscribe(&mut self, pattern: &str) -> anyhow::Result<()>;
}

/// Registers the `history/get_values` RPC method under a service name.
pub trait RpcRegistrar {
    fn register(&mut self, service: &str, namespace: &str, method: &str);
}

/// No-op bus used by tests and as documentation of the seam's shape.
#[derive(Default)]
pub struct NullBus {
    pub subscribed: Vec<String>,
}

impl MessageBus for NullBus {
    fn subscribe(&mut self, pattern: &str) -> anyhow::Result<()> {
        self.subscribed.push(pattern.to_string());
        Ok(())
    }
}

/// No-op RPC registrar used by tests and as documentation of the seam's
/// shape.
#[derive(Default)]
pub struct NullRpc {
    pub registered: Vec<(String, String, String)>,
}

impl RpcRegistrar for NullRpc {
    fn register(&mut self, service: &str, namespace: &str, method: &str) {
        self.registered
            .push((service.to_string(), namespace.to_string(), method.to_string()));
    }
}
