//! Contact Desk - Telegram bot for contact file conversion
//!
//! Users pick a flow by command, upload `.txt`, `.xlsx` or `.vcf` files,
//! answer a few prompts and get converted files back.

mod audit;
mod cache;
mod codec;
mod config;
mod normalize;
mod runtime;
mod state_machine;
mod transport;

use config::BotConfig;
use runtime::{SessionManager, SessionServices};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::TelegramTransport;

const POLL_WAIT: Duration = Duration::from_secs(30);
const POLL_BACKOFF: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contact_desk=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    let services = SessionServices::new(
        Arc::new(TelegramTransport::new(
            config.token.clone(),
            config.request_timeout,
        )?),
        config,
    );
    services.cache.ensure().await?;
    tracing::info!(
        cache = %services.cache.root().display(),
        max_jobs = services.config.max_concurrent_jobs,
        batch_cap = services.config.batch_cap,
        operator = ?services.config.operator,
        "Contact desk starting"
    );

    let services = Arc::new(services);
    let manager = SessionManager::new(services.clone());

    tokio::select! {
        () = poll_updates(&services.transport, &manager) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!(sessions = manager.session_count().await, "Shutting down");
        }
    }

    Ok(())
}

/// Long-poll Telegram forever, routing each message to its user's session.
async fn poll_updates(transport: &TelegramTransport, manager: &SessionManager<TelegramTransport>) {
    let mut offset = 0;
    loop {
        let updates = match transport.get_updates(offset, POLL_WAIT).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!(error = %e, "Polling failed");
                tokio::time::sleep(POLL_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Some(inbound) = update.into_inbound() {
                manager.dispatch(inbound).await;
            }
        }
    }
}
