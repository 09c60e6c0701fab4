//! Per-connection bookkeeping.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ServerEvent;

/// Lifecycle of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Accepted, nothing received yet.
    Connected,
    /// At least one frame received.
    Active,
    /// Closed by the peer or the listener.
    Disconnected,
}

/// State of one accepted connection as last reported by its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub id: String,
    pub address: IpAddr,
    pub port: u16,
    pub status: ConnectionStatus,
    pub last_active: DateTime<Utc>,
    /// Interval most recently advertised to this peer.
    pub interval_ms: u32,
}

impl ConnectionRecord {
    pub fn new(id: String, address: IpAddr, port: u16, interval_ms: u32) -> Self {
        Self {
            id,
            address,
            port,
            status: ConnectionStatus::Connected,
            last_active: Utc::now(),
            interval_ms,
        }
    }

    /// Record inbound traffic.
    pub fn touch(&mut self) {
        self.status = ConnectionStatus::Active;
        self.last_active = Utc::now();
    }

    pub fn mark_disconnected(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.last_active = Utc::now();
    }

    pub fn is_open(&self) -> bool {
        self.status != ConnectionStatus::Disconnected
    }
}

/// Connection records keyed by id, in first-seen order.
///
/// Records are upserted and never removed; a closed connection stays with
/// status `Disconnected`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    rows: Vec<ConnectionRecord>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record with the same id.
    pub fn upsert(&mut self, record: ConnectionRecord) {
        match self.rows.iter_mut().find(|row| row.id == record.id) {
            Some(row) => *row = record,
            None => self.rows.push(record),
        }
    }

    /// Fold a server event into the table.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::ConnectionUpdated(record) => self.upsert(record.clone()),
            ServerEvent::ConnectionClosed { id } => {
                if let Some(row) = self.rows.iter_mut().find(|row| &row.id == id) {
                    if row.is_open() {
                        row.mark_disconnected();
                    }
                }
            }
            _ => {}
        }
    }

    pub fn get(&self, id: &str) -> Option<&ConnectionRecord> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Records not yet disconnected.
    pub fn open_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_open()).count()
    }
}
