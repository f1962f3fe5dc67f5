//! Client sessions as the gate sees them: an id, a bounded send queue, and
//! the entity logged in on it.
//!
//! The TCP side (listener, handshake, framing on the socket) lives outside
//! this crate. It feeds inbound frames to `GateInbound` and drains each
//! session's queue onto the socket; one queue per session keeps delivery to
//! a client in order.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::address::NodeDetails;

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The send queue is full; the frame was not queued.
    QueueFull,
    /// The session is gone.
    Closed,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueFull => write!(f, "Session send queue full"),
            Self::Closed => write!(f, "Session closed"),
        }
    }
}

impl std::error::Error for SessionError {}

/// A connected client.
pub trait Session: Send + Sync + 'static {
    fn id(&self) -> SessionId;

    /// Queues one frame without waiting.
    fn try_send(&self, frame: Bytes) -> Result<(), SessionError>;
}

/// Maps between sessions, entities and groups.
pub trait SessionRouter: Send + Sync + 'static {
    fn lookup_session(&self, entity_id: &str) -> Option<Arc<dyn Session>>;

    /// The entity logged in on a session, and its client address.
    fn lookup_entity(&self, session_id: SessionId) -> Option<(String, String)>;

    fn group_members(&self, group: &str) -> Vec<Arc<dyn Session>>;

    fn all_sessions(&self) -> Vec<Arc<dyn Session>>;
}

struct QueuedSession {
    id: SessionId,
    tx: mpsc::Sender<Bytes>,
}

impl Session for QueuedSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn try_send(&self, frame: Bytes) -> Result<(), SessionError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SessionError::Closed,
        })
    }
}

struct Login {
    session: Arc<QueuedSession>,
    entity_id: String,
}

/// In-process session table with bounded queues.
pub struct MemorySessions {
    client: NodeDetails,
    sessions: DashMap<SessionId, Login>,
    by_entity: DashMap<String, SessionId>,
    groups: DashMap<String, Vec<SessionId>>,
}

impl MemorySessions {
    /// `client` is the client domain, used to derive session addresses.
    pub fn new(client: NodeDetails) -> Self {
        Self {
            client,
            sessions: DashMap::new(),
            by_entity: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    /// Logs `entity_id` in on a new session whose queue holds `capacity`
    /// frames, returning the receiving end of that queue.
    pub fn connect(&self, session_id: SessionId, entity_id: &str, capacity: usize) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.disconnect(session_id);
        if let Some(old) = self.by_entity.insert(entity_id.to_string(), session_id) {
            self.disconnect(old);
        }
        self.sessions.insert(session_id, Login {
            session: Arc::new(QueuedSession { id: session_id, tx }),
            entity_id: entity_id.to_string(),
        });
        rx
    }

    pub fn join_group(&self, group: &str, session_id: SessionId) {
        let mut members = self.groups.entry(group.to_string()).or_default();
        if !members.contains(&session_id) {
            members.push(session_id);
        }
    }

    pub fn leave_group(&self, group: &str, session_id: SessionId) {
        if let Some(mut members) = self.groups.get_mut(group) {
            members.retain(|id| *id != session_id);
        }
    }

    pub fn disconnect(&self, session_id: SessionId) {
        if let Some((_, login)) = self.sessions.remove(&session_id) {
            self.by_entity.remove_if(&login.entity_id, |_, id| *id == session_id);
        }
        for mut members in self.groups.iter_mut() {
            members.retain(|id| *id != session_id);
        }
    }

    fn session(&self, session_id: SessionId) -> Option<Arc<dyn Session>> {
        self.sessions.get(&session_id).map(|l| l.session.clone() as Arc<dyn Session>)
    }
}

impl SessionRouter for MemorySessions {
    fn lookup_session(&self, entity_id: &str) -> Option<Arc<dyn Session>> {
        let session_id = *self.by_entity.get(entity_id)?;
        self.session(session_id)
    }

    fn lookup_entity(&self, session_id: SessionId) -> Option<(String, String)> {
        self.sessions
            .get(&session_id)
            .map(|l| (l.entity_id.clone(), self.client.entity_addr(&l.entity_id)))
    }

    fn group_members(&self, group: &str) -> Vec<Arc<dyn Session>> {
        let ids = self.groups.get(group).map(|m| m.clone()).unwrap_or_default();
        ids.into_iter().filter_map(|id| self.session(id)).collect()
    }

    fn all_sessions(&self) -> Vec<Arc<dyn Session>> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|l| l.session.clone()).collect();
        sessions.sort_unstable_by_key(|s| s.id);
        sessions.into_iter().map(|s| s as Arc<dyn Session>).collect()
    }
}
