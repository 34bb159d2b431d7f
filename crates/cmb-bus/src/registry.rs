//! Instance Registry (spec §4.2): the single source of truth mapping
//! `instanceId` to a live connection.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::connection::Connection;

/// An instance's registry record.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub connection: Connection,
    pub registered_at: Instant,
    pub last_activity: Instant,
}

/// Concurrent directory of extension instances.
///
/// Invariants (spec §4.2): at most one record per `instanceId`; at most
/// one `instanceId` per live connection; on rebind, the previous
/// connection (if different and still open) is closed before the new one
/// is associated.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: DashMap<String, InstanceRecord>,
    conn_to_instance: DashMap<u64, String>,
}

impl InstanceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` under `provided_id`, minting a UUID if none was
    /// supplied. Rebinds an existing record in place; closes a prior
    /// different connection for the same id, and drops any previous
    /// binding this same connection held under a different id.
    pub fn register(&self, conn: Connection, provided_id: Option<String>) -> String {
        // If this physical connection was previously bound to a different
        // instance id, that binding is stale — drop it first.
        if let Some(prior) = self.conn_to_instance.get(&conn.id()).map(|e| e.clone()) {
            if provided_id.as_deref() != Some(prior.as_str()) {
                self.unregister(&prior);
            }
        }

        let instance_id = provided_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Instant::now();

        match self.instances.get_mut(&instance_id) {
            Some(mut existing) => {
                if existing.connection.id() != conn.id() {
                    existing.connection.close();
                }
                existing.connection = conn.clone();
                existing.last_activity = now;
            }
            None => {
                self.instances.insert(
                    instance_id.clone(),
                    InstanceRecord {
                        instance_id: instance_id.clone(),
                        connection: conn.clone(),
                        registered_at: now,
                        last_activity: now,
                    },
                );
            }
        }

        self.conn_to_instance.insert(conn.id(), instance_id.clone());
        instance_id
    }

    /// Remove the record for `instance_id`. The caller is responsible for
    /// closing the socket, if desired.
    pub fn unregister(&self, instance_id: &str) -> bool {
        if let Some((_, record)) = self.instances.remove(instance_id) {
            let conn_id = record.connection.id();
            // Only clear the reverse mapping if it still points here — a
            // concurrent rebind may already have repointed it elsewhere.
            self.conn_to_instance
                .remove_if(&conn_id, |_, mapped| mapped == instance_id);
            true
        } else {
            false
        }
    }

    /// Remove whatever record `conn` is currently bound to, if any.
    pub fn unregister_by_connection(&self, conn: &Connection) -> bool {
        let Some(instance_id) = self.conn_to_instance.get(&conn.id()).map(|e| e.clone()) else {
            return false;
        };
        let removed = self.unregister(&instance_id);
        self.conn_to_instance.remove(&conn.id());
        removed
    }

    #[must_use]
    pub fn get_connection(&self, instance_id: &str) -> Option<Connection> {
        self.instances
            .get(instance_id)
            .map(|r| r.connection.clone())
    }

    #[must_use]
    pub fn get_instance_id(&self, conn: &Connection) -> Option<String> {
        self.conn_to_instance.get(&conn.id()).map(|e| e.clone())
    }

    #[must_use]
    pub fn has(&self, instance_id: &str) -> bool {
        self.instances.contains_key(instance_id)
    }

    /// Update `lastActivity` for the instance bound to `conn`, if any.
    pub fn touch_by_connection(&self, conn: &Connection) {
        if let Some(instance_id) = self.get_instance_id(conn) {
            self.touch(&instance_id);
        }
    }

    /// Update `lastActivity` for `instance_id` directly.
    pub fn touch(&self, instance_id: &str) {
        if let Some(mut record) = self.instances.get_mut(instance_id) {
            record.last_activity = Instant::now();
        }
    }

    /// Send a normal-close frame to every live connection, without
    /// removing their records (spec §6.5: shutdown closes sockets; the
    /// process is exiting regardless of registry state afterwards).
    pub fn close_all(&self) {
        for entry in &self.instances {
            entry.value().connection.close();
        }
    }

    /// Remove every record whose `lastActivity` precedes `now - idle_cutoff`,
    /// closing each evicted connection, and return the evicted instance ids
    /// so the caller can fail any pending requests bound to them.
    pub fn evict_idle(&self, idle_cutoff: Duration) -> Vec<String> {
        let cutoff = Instant::now() - idle_cutoff;
        let mut evicted = Vec::new();

        self.instances.retain(|_, record| {
            if record.last_activity < cutoff {
                record.connection.close();
                evicted.push(record.instance_id.clone());
                false
            } else {
                true
            }
        });

        for instance_id in &evicted {
            self.conn_to_instance
                .retain(|_, mapped| mapped != instance_id);
        }

        evicted
    }
}
