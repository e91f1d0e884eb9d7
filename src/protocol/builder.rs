//! Fluent assemblers for inbound and outbound bodies.
//!
//! The engine schema is heterogeneous per protocol type, so bodies stay as
//! untyped JSON maps. Builders only assemble; callers validate first.
use serde_json::{Map, Value};

/// Untyped wire representation of a single inbound or outbound entry.
pub type ConfigMap = Map<String, Value>;

/// Accumulates a listener definition, pre-seeded with type, tag and bind address.
#[derive(Debug, Clone)]
pub struct InboundBuilder {
    map: ConfigMap,
}

impl InboundBuilder {
    pub fn new(kind: &str, tag: &str, listen: &str, listen_port: u16) -> Self {
        let mut map = ConfigMap::new();
        map.insert("type".to_string(), Value::from(kind));
        map.insert("tag".to_string(), Value::from(tag));
        map.insert("listen".to_string(), Value::from(listen));
        map.insert("listen_port".to_string(), Value::from(listen_port));
        Self { map }
    }

    /// Set the `users` array
    pub fn users(self, users: Vec<Value>) -> Self {
        self.set("users", Value::Array(users))
    }

    /// Set the `tls` block
    pub fn tls(self, tls: Value) -> Self {
        self.set("tls", tls)
    }

    /// Set the `transport` block (e.g. gRPC service name)
    pub fn transport(self, transport: Value) -> Self {
        self.set("transport", transport)
    }

    /// Set any protocol-specific field
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.map.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> ConfigMap {
        self.map
    }
}

/// Accumulates a client-side definition, pre-seeded with type, tag and server address.
#[derive(Debug, Clone)]
pub struct OutboundBuilder {
    map: ConfigMap,
}

impl OutboundBuilder {
    pub fn new(kind: &str, tag: &str, server: &str, server_port: u16) -> Self {
        let mut map = ConfigMap::new();
        map.insert("type".to_string(), Value::from(kind));
        map.insert("tag".to_string(), Value::from(tag));
        map.insert("server".to_string(), Value::from(server));
        map.insert("server_port".to_string(), Value::from(server_port));
        Self { map }
    }

    /// Set the `tls` block
    pub fn tls(self, tls: Value) -> Self {
        self.set("tls", tls)
    }

    /// Set the `transport` block
    pub fn transport(self, transport: Value) -> Self {
        self.set("transport", transport)
    }

    /// Set any protocol-specific field
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.map.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> ConfigMap {
        self.map
    }
}
