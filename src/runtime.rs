//! Runtime for user sessions
//!
//! Each user gets a session actor fed through a channel; the manager routes
//! inbound chat events to it, spawning the actor on first contact. Shared
//! services (transport, cache, audit log, job orchestrator) are built once
//! and handed to every session.

mod executor;
pub mod orchestrator;
pub mod retry;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use orchestrator::Orchestrator;
pub use retry::{Notifier, RetryPolicy, Retryable};
pub use traits::*;

use crate::audit::AuditLog;
use crate::cache::CacheStore;
use crate::config::BotConfig;
use crate::state_machine::{Command, Event, Flow, SessionContext, UserIdentity};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// An event as delivered by the transport
#[derive(Debug, Clone)]
pub struct Inbound {
    pub user: UserIdentity,
    pub chat_id: i64,
    pub payload: InboundPayload,
}

#[derive(Debug, Clone)]
pub enum InboundPayload {
    Text(String),
    Document {
        file_id: String,
        file_name: String,
        forwarded_from: Option<UserIdentity>,
    },
}

impl InboundPayload {
    /// Command words become commands; any other text is a prompt answer.
    fn into_event(self) -> Event {
        match self {
            InboundPayload::Text(text) => {
                Command::parse(&text).map_or_else(|| Event::Text(text), Event::Command)
            }
            InboundPayload::Document {
                file_id,
                file_name,
                forwarded_from,
            } => Event::Document {
                file_id,
                file_name,
                forwarded_from,
            },
        }
    }
}

/// Users currently inside a flow, for the operator status report
#[derive(Debug, Default)]
pub struct ActivityRegistry {
    active: RwLock<BTreeMap<i64, (String, Flow)>>,
}

impl ActivityRegistry {
    pub async fn update(&self, user: &UserIdentity, flow: Option<Flow>) {
        let mut active = self.active.write().await;
        match flow {
            Some(flow) => {
                active.insert(user.id, (user.handle(), flow));
            }
            None => {
                active.remove(&user.id);
            }
        }
    }

    pub async fn status_message(&self) -> String {
        let active = self.active.read().await;
        if active.is_empty() {
            return "No active users.".to_string();
        }
        let mut message = format!("{} active users:", active.len());
        for (i, (handle, flow)) in active.values().enumerate() {
            let _ = write!(message, "\n{}. {handle} ({flow})", i + 1);
        }
        message
    }
}

/// Process-wide components shared by every session
pub struct SessionServices<T: Transport + 'static> {
    pub config: BotConfig,
    pub transport: Arc<T>,
    pub notifier: Arc<Notifier<T>>,
    pub orchestrator: Orchestrator<T>,
    pub cache: CacheStore,
    pub audit: AuditLog,
    pub activity: ActivityRegistry,
}

impl<T: Transport + 'static> SessionServices<T> {
    pub fn new(transport: Arc<T>, config: BotConfig) -> Self {
        let cache = CacheStore::new(&config.cache_dir);
        let notifier = Arc::new(Notifier::new(transport.clone(), config.retry));
        let orchestrator = Orchestrator::new(
            transport.clone(),
            notifier.clone(),
            cache.clone(),
            config.max_concurrent_jobs,
            config.retry,
            config.batch_cap,
        );
        Self {
            audit: AuditLog::new(&config.audit_dir),
            config,
            transport,
            notifier,
            orchestrator,
            cache,
            activity: ActivityRegistry::default(),
        }
    }
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub event_tx: mpsc::UnboundedSender<Event>,
}

/// Live sessions keyed by user id. A session actor removes its own entry
/// when it retires.
pub(crate) type SessionMap = Arc<RwLock<HashMap<i64, SessionHandle>>>;

/// Manager for all session runtimes, keyed by user
pub struct SessionManager<T: Transport + 'static> {
    services: Arc<SessionServices<T>>,
    sessions: SessionMap,
}

impl<T: Transport + 'static> SessionManager<T> {
    pub fn new(services: Arc<SessionServices<T>>) -> Self {
        Self {
            services,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn spawn_session(&self, user: &UserIdentity, chat_id: i64) -> SessionHandle {
        let context = SessionContext::new(
            user.clone(),
            chat_id,
            self.services.config.operator.as_deref(),
            self.services.config.batch_cap,
        );
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let runtime = SessionRuntime::new(context, self.services.clone(), event_rx);
        tokio::spawn(runtime.run(self.sessions.clone()));

        tracing::info!(user = %user.handle(), "Created session");
        SessionHandle { event_tx }
    }

    /// Route an inbound chat event to its session, starting one if needed.
    ///
    /// Never waits on the session itself: a slow session only delays its
    /// own events. Sends happen under the map lock so a retiring session
    /// cannot drop an event it was just handed.
    pub async fn dispatch(&self, inbound: Inbound) {
        let Inbound {
            user,
            chat_id,
            payload,
        } = inbound;
        let mut event = payload.into_event();

        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(&user.id) {
                match handle.event_tx.send(event) {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(returned)) => event = returned,
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        // Another dispatch may have won the race for the write lock
        if let Some(handle) = sessions.get(&user.id) {
            match handle.event_tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => event = returned,
            }
        }

        let handle = self.spawn_session(&user, chat_id);
        if let Err(e) = handle.event_tx.send(event) {
            tracing::error!(user = %user.handle(), error = %e, "Session is gone, event dropped");
            return;
        }
        sessions.insert(user.id, handle);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
