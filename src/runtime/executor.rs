//! Session runtime executor

use super::traits::Transport;
use super::{SessionMap, SessionServices};
use crate::state_machine::{
    transition, Effect, Event, SessionContext, SessionState, UploadedFile, UserIdentity,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const CACHE_CLEARED: &str = "All files in the cache folder have been deleted.";
pub const CACHE_MISSING: &str = "Cache folder not found.";

/// One user's session actor. Events are handled strictly one at a time, in
/// arrival order, including every event their effects produce.
pub struct SessionRuntime<T: Transport + 'static> {
    context: SessionContext,
    state: SessionState,
    services: Arc<SessionServices<T>>,
    event_rx: mpsc::UnboundedReceiver<Event>,
}

impl<T: Transport + 'static> SessionRuntime<T> {
    pub fn new(
        context: SessionContext,
        services: Arc<SessionServices<T>>,
        event_rx: mpsc::UnboundedReceiver<Event>,
    ) -> Self {
        Self {
            context,
            state: SessionState::Idle,
            services,
            event_rx,
        }
    }

    /// Process events until the channel closes or the session retires after
    /// sitting idle with no active flow.
    pub async fn run(mut self, sessions: SessionMap) {
        tracing::info!(user = %self.context.user.handle(), "Starting session runtime");
        let idle = self.services.config.session_idle;

        loop {
            match tokio::time::timeout(idle, self.event_rx.recv()).await {
                Ok(Some(event)) => self.process_event(event).await,
                Ok(None) => break,
                Err(_) => {
                    if self.state == SessionState::Idle && self.retire(&sessions).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(user = %self.context.user.handle(), "Session runtime stopped");
    }

    /// Leave the session map unless an event slipped in. Dispatch sends under
    /// the map lock, so holding the write lock here means nothing can arrive.
    async fn retire(&mut self, sessions: &SessionMap) -> bool {
        let mut sessions = sessions.write().await;
        if !self.event_rx.is_empty() {
            return false;
        }
        sessions.remove(&self.context.user.id);
        self.event_rx.close();
        true
    }

    pub(crate) async fn process_event(&mut self, event: Event) {
        let mut events = VecDeque::from([event]);

        while let Some(current) = events.pop_front() {
            let result = match transition(&self.state, &self.context, current) {
                Ok(r) => r,
                Err(e) => {
                    tracing::info!(user = %self.context.user.handle(), reason = %e, "Event ignored");
                    continue;
                }
            };

            self.state = result.new_state;
            self.services
                .activity
                .update(&self.context.user, self.state.active_flow())
                .await;

            for effect in result.effects {
                if let Some(generated) = self.execute_effect(effect).await {
                    events.push_back(generated);
                }
            }
        }
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&self, effect: Effect) -> Option<Event> {
        let chat_id = self.context.chat_id;
        match effect {
            Effect::Reply(text) => {
                self.services.notifier.reply(chat_id, &text).await;
                None
            }

            Effect::DiscardUploads(paths) => {
                self.services.cache.discard(&paths).await;
                None
            }

            Effect::StoreUpload {
                file_id,
                file_name,
                forwarded_from,
            } => Some(
                self.store_upload(&file_id, file_name, forwarded_from.as_ref())
                    .await,
            ),

            Effect::Execute(job) => {
                tracing::info!(
                    user = %self.context.user.handle(),
                    job = job.label(),
                    files = job.files().len(),
                    "Dispatching job"
                );
                let outcome = self.services.orchestrator.run(chat_id, job).await;
                Some(Event::JobFinished(outcome))
            }

            Effect::ReportStatus => {
                let status = self.services.activity.status_message().await;
                self.services.notifier.reply(chat_id, &status).await;
                None
            }

            Effect::ClearCache => {
                let reply = match self.services.cache.clear_all().await {
                    Ok(true) => CACHE_CLEARED,
                    Ok(false) => CACHE_MISSING,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to clear cache");
                        super::orchestrator::SERVER_ERROR
                    }
                };
                self.services.notifier.reply(chat_id, reply).await;
                None
            }
        }
    }

    async fn store_upload(
        &self,
        file_id: &str,
        file_name: String,
        forwarded_from: Option<&UserIdentity>,
    ) -> Event {
        let path = match self.services.cache.reserve(&file_name).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(file = %file_name, error = %e, "Failed to reserve cache path");
                return Event::UploadFailed {
                    file_name,
                    message: e.to_string(),
                };
            }
        };

        if let Err(e) = self.services.transport.download(file_id, &path).await {
            tracing::warn!(file = %file_name, error = %e, "Download failed");
            self.services.cache.discard(std::slice::from_ref(&path)).await;
            return Event::UploadFailed {
                file_name,
                message: e.to_string(),
            };
        }

        if let Err(e) = self
            .services
            .audit
            .record(&self.context.user, forwarded_from, &file_name)
            .await
        {
            tracing::warn!(file = %file_name, error = %e, "Failed to write audit record");
        }

        tracing::info!(user = %self.context.user.handle(), file = %file_name, path = %path.display(), "Upload stored");
        Event::UploadStored(UploadedFile {
            path,
            original_name: file_name,
        })
    }
}
