//! Store key layout.
//!
//! Every key lives under a namespace so several deployments can share one
//! store. Identifiers are validated upstream to exclude `:`, which keeps the
//! segments below unambiguous.

/// Builds the keys for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    namespace: String,
}

impl Keyspace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Lock record for a resource.
    pub fn lock(&self, resource_id: &str) -> String {
        format!("{}:lock:{resource_id}", self.namespace)
    }

    /// Presence record for one (resource, actor) pair.
    pub fn presence(&self, resource_id: &str, actor_id: &str) -> String {
        format!("{}:presence:{resource_id}:{actor_id}", self.namespace)
    }

    /// Set of actor ids attached to a resource.
    pub fn presence_index(&self, resource_id: &str) -> String {
        format!("{}:presence-index:{resource_id}", self.namespace)
    }

    /// Set of resource ids that currently have a presence index.
    pub fn presence_resources(&self) -> String {
        format!("{}:presence-resources", self.namespace)
    }

    /// Durable record of one reconciliation event.
    pub fn event(&self, event_id: &str) -> String {
        format!("{}:event:{event_id}", self.namespace)
    }

    /// Append-only list of event ids for a resource.
    pub fn event_index(&self, resource_id: &str) -> String {
        format!("{}:event-index:{resource_id}", self.namespace)
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new("concord")
    }
}
