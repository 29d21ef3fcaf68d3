//! Channel -> connection membership for this process

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics::{BroadcastMetrics, CHANNELS_ACTIVE};
use crate::websocket::OutboundMessage;

use super::connection::{Connection, EnqueueError};

type ChannelMembers = HashMap<Uuid, Arc<Connection>>;

/// Outcome of a same-process broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDelivery {
    /// Connections the frame was enqueued on
    pub delivered: usize,
    /// Connections dropped because their queue was full
    pub dropped: usize,
}

/// Snapshot of the registry for the stats endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub unique_users: usize,
    pub channels: HashMap<String, usize>,
}

/// Live connections of this process, grouped by channel.
///
/// A single reader/writer lock guards the whole map: broadcasts and presence
/// queries share the read side, register/unregister take the write side. No
/// socket I/O ever happens under the lock; broadcasts only do non-blocking
/// queue sends.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<String, ChannelMembers>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under its channel. Returns `false` if it was already present.
    pub async fn register(&self, connection: &Arc<Connection>) -> bool {
        let mut channels = self.channels.write().await;
        let inserted = channels
            .entry(connection.channel_id.clone())
            .or_default()
            .insert(connection.id, connection.clone())
            .is_none();
        CHANNELS_ACTIVE.set(channels.len() as i64);

        if inserted {
            tracing::debug!(
                connection_id = %connection.id,
                channel_id = %connection.channel_id,
                user_id = %connection.user_id,
                "Connection registered"
            );
        }

        inserted
    }

    /// Remove a connection. Safe to call repeatedly; only the first call returns `true`.
    pub async fn unregister(&self, connection: &Connection) -> bool {
        let mut channels = self.channels.write().await;
        let removed = remove_member(&mut channels, connection);
        CHANNELS_ACTIVE.set(channels.len() as i64);

        if removed {
            tracing::debug!(
                connection_id = %connection.id,
                channel_id = %connection.channel_id,
                "Connection unregistered"
            );
        }

        removed
    }

    /// Enqueue `frame` on every connection of the channel without blocking.
    ///
    /// A connection whose queue is full is closed and removed; the rest of the
    /// channel still receives the frame.
    pub async fn broadcast(&self, channel_id: &str, frame: Arc<str>) -> LocalDelivery {
        let mut delivery = LocalDelivery::default();
        let mut evicted: Vec<Arc<Connection>> = Vec::new();

        {
            let channels = self.channels.read().await;
            let Some(members) = channels.get(channel_id) else {
                return delivery;
            };

            for connection in members.values() {
                match connection.try_enqueue(OutboundMessage::Serialized(frame.clone())) {
                    Ok(()) => delivery.delivered += 1,
                    Err(EnqueueError::Full) => {
                        tracing::warn!(
                            connection_id = %connection.id,
                            channel_id = %channel_id,
                            user_id = %connection.user_id,
                            "Outbound queue full, dropping slow consumer"
                        );
                        BroadcastMetrics::record_slow_consumer_drop();
                        connection.close();
                        delivery.dropped += 1;
                        evicted.push(connection.clone());
                    }
                    // Already tearing down; its own task will finish the job
                    Err(_) => evicted.push(connection.clone()),
                }
            }
        }

        if !evicted.is_empty() {
            let mut channels = self.channels.write().await;
            for connection in &evicted {
                remove_member(&mut channels, connection);
            }
            CHANNELS_ACTIVE.set(channels.len() as i64);
        }

        BroadcastMetrics::record_local_delivered(delivery.delivered as u64);
        delivery
    }

    /// Distinct user ids connected to the channel on this process, sorted
    pub async fn online_users(&self, channel_id: &str) -> Vec<String> {
        let channels = self.channels.read().await;
        channels
            .get(channel_id)
            .map(|members| {
                members
                    .values()
                    .filter(|c| !c.user_id.is_empty())
                    .map(|c| c.user_id.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of connections registered to a channel
    pub async fn channel_size(&self, channel_id: &str) -> usize {
        let channels = self.channels.read().await;
        channels.get(channel_id).map_or(0, |members| members.len())
    }

    /// Whether the connection is currently a member of its channel
    pub async fn contains(&self, connection: &Connection) -> bool {
        let channels = self.channels.read().await;
        channels
            .get(&connection.channel_id)
            .is_some_and(|members| members.contains_key(&connection.id))
    }

    pub async fn connection_count(&self) -> usize {
        let channels = self.channels.read().await;
        channels.values().map(|members| members.len()).sum()
    }

    pub async fn stats(&self) -> RegistryStats {
        let channels = self.channels.read().await;
        let mut users = HashSet::new();
        let mut counts = HashMap::with_capacity(channels.len());

        for (channel_id, members) in channels.iter() {
            counts.insert(channel_id.clone(), members.len());
            users.extend(members.values().map(|c| c.user_id.as_str()));
        }

        RegistryStats {
            total_connections: counts.values().sum(),
            unique_users: users.len(),
            channels: counts,
        }
    }
}

/// Remove under an already-held write lock, dropping the channel once empty
fn remove_member(channels: &mut HashMap<String, ChannelMembers>, connection: &Connection) -> bool {
    let Some(members) = channels.get_mut(&connection.channel_id) else {
        return false;
    };

    let removed = members.remove(&connection.id).is_some();
    if members.is_empty() {
        channels.remove(&connection.channel_id);
    }
    removed
}
