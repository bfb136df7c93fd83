//! Audit trail and log setup.
//!
//! Audit events are ordinary `tracing` events under the `audit` target, so they show up in
//! the console log like everything else. When an audit file is configured they are also
//! appended there, regardless of `RUST_LOG`. Passwords and token contents are never part of
//! an audit event.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing::{info, warn, Subscriber};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const AUDIT_TARGET: &str = "audit";

pub fn login_succeeded(username: &str, role: &str) {
    info!(target: "audit", event = "login", outcome = "success", username, role);
}

/// `reason` is for operators only; clients get one generic message.
pub fn login_rejected(username: &str, reason: &'static str) {
    warn!(target: "audit", event = "login", outcome = "failure", username, reason);
}

pub fn forbidden(actor: &str, action: &str) {
    warn!(target: "audit", event = "forbidden", actor, action);
}

pub fn admin_action(actor: &str, action: &str, subject: &str) {
    info!(target: "audit", event = "admin", actor, action, subject);
}

pub fn password_changed(username: &str) {
    info!(target: "audit", event = "password_change", outcome = "success", username);
}

pub fn password_change_rejected(username: &str) {
    warn!(target: "audit", event = "password_change", outcome = "failure", username);
}

/// Layer that appends `audit` events, and nothing else, to `file`.
pub fn audit_file_layer<S>(file: File) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET))
}

/// Install the global subscriber: console output filtered by `RUST_LOG` (default `info`),
/// plus an optional append-only audit file that receives every `audit` event.
pub fn init_tracing(audit_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    let console = fmt::layer().with_filter(filter);

    let audit = match audit_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening audit log {}", path.display()))?;
            Some(audit_file_layer(file))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(audit)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}
