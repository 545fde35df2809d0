//! Infrastructure wiring for the HTTP process.
//!
//! Production wiring is driven by environment variables; anything not
//! configured falls back to an in-memory/dev stand-in with a warning, so the
//! server always comes up for local work.

use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use mailroom_dispatch::doubles::{InMemoryDocumentStore, ScriptedMailer, StaticSettings};
use mailroom_dispatch::{DispatchSettings, DocumentStore, Mailer};
use mailroom_infra::audit::TracingAuditLog;
use mailroom_infra::docstore::FsDocumentStore;
use mailroom_infra::smtp::SmtpMailer;
use mailroom_infra::store::PostgresDispatchStore;
use mailroom_infra::{DispatchEngine, DispatchStore, InMemoryDispatchStore};

pub struct AppServices {
    pub engine: DispatchEngine,
}

impl AppServices {
    pub fn new(engine: DispatchEngine) -> Self {
        Self { engine }
    }
}

/// Wire the engine from the environment.
///
/// - `DATABASE_URL`: Postgres store (schema applied on startup); in-memory otherwise
/// - `SMTP_URL`: lettre SMTP transport; a recording stand-in otherwise
/// - `DOCUMENT_ROOT`: filesystem document store; in-memory otherwise
/// - `DISPATCH_*`: dispatch settings (see [`settings_from_env`])
pub async fn build_services() -> anyhow::Result<AppServices> {
    let store: Arc<dyn DispatchStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::PgPool::connect(&url)
                .await
                .context("connect to DATABASE_URL")?;
            let store = PostgresDispatchStore::new(pool);
            store.migrate().await.context("apply dispatch schema")?;
            Arc::new(store)
        }
        Err(_) => {
            warn!("DATABASE_URL not set; using in-memory store (state is lost on restart)");
            Arc::new(InMemoryDispatchStore::new())
        }
    };

    let mailer: Arc<dyn Mailer> = match std::env::var("SMTP_URL") {
        Ok(url) => Arc::new(SmtpMailer::from_url(&url).context("configure SMTP transport")?),
        Err(_) => {
            warn!("SMTP_URL not set; outgoing mail is recorded, not delivered");
            Arc::new(ScriptedMailer::new())
        }
    };

    let documents: Arc<dyn DocumentStore> = match std::env::var("DOCUMENT_ROOT") {
        Ok(root) => Arc::new(FsDocumentStore::new(root)),
        Err(_) => {
            warn!("DOCUMENT_ROOT not set; using in-memory document store");
            Arc::new(InMemoryDocumentStore::new())
        }
    };

    let settings = Arc::new(StaticSettings(settings_from_env()));

    let engine = DispatchEngine::new(
        store,
        documents,
        mailer,
        Arc::new(TracingAuditLog::new()),
        settings,
    );

    Ok(AppServices::new(engine))
}

/// Dispatch settings from `DISPATCH_*` environment variables, with the
/// domain defaults for anything unset.
pub fn settings_from_env() -> DispatchSettings {
    let defaults = DispatchSettings::default();
    DispatchSettings {
        enabled: env_bool("DISPATCH_ENABLED", defaults.enabled),
        account: std::env::var("DISPATCH_ACCOUNT").ok().or(defaults.account),
        target_address: std::env::var("DISPATCH_TARGET_ADDRESS")
            .ok()
            .or(defaults.target_address),
        subject_template: std::env::var("DISPATCH_SUBJECT_TEMPLATE")
            .unwrap_or(defaults.subject_template),
        body_template: std::env::var("DISPATCH_BODY_TEMPLATE").unwrap_or(defaults.body_template),
        max_attachments: env_parse("DISPATCH_MAX_ATTACHMENTS", defaults.max_attachments),
        max_total_bytes: env_parse("DISPATCH_MAX_TOTAL_BYTES", defaults.max_total_bytes),
        archive_after_send: env_bool("DISPATCH_ARCHIVE_AFTER_SEND", defaults.archive_after_send),
        recolor_after_send: env_bool("DISPATCH_RECOLOR_AFTER_SEND", defaults.recolor_after_send),
        recolor_color: std::env::var("DISPATCH_RECOLOR_COLOR").unwrap_or(defaults.recolor_color),
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
