//!
//! portal server binary
//! --------------------
//! Command-line entry point for the portal HTTP server. Configuration comes from `PORTAL_*`
//! environment variables; a few CLI flags override them.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use portal::config::PortalConfig;

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).map(String::as_str);
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("portal server\n\nUSAGE:\n  portal_server [--http-port N] [--data-folder PATH]\n\nOPTIONS:\n  --http-port N        HTTP API port (env: PORTAL_HTTP_PORT, default 8000)\n  --data-folder PATH   Folder holding users.json (env: PORTAL_DATA_FOLDER, default data)\n\nOther settings: PORTAL_SECRET_KEY, PORTAL_ALGORITHM, PORTAL_TOKEN_TTL_MINUTES, PORTAL_ENV,\nPORTAL_LOGIN_FLOOR_MS, PORTAL_AUDIT_LOG, PORTAL_ADMIN_USERNAME, PORTAL_ADMIN_PASSWORD,\nPORTAL_ADMIN_FULL_NAME, PORTAL_ADMIN_EMAIL, PORTAL_ARGON2_MEMORY_KIB/_ITERATIONS/_LANES.\n");
        return Ok(());
    }

    let mut config = PortalConfig::from_env().context("invalid configuration")?;

    // CLI arguments override environment
    if has_flag(&args, "--http-port") {
        match arg_value(&args, "--http-port").and_then(|v| v.parse::<u16>().ok()) {
            Some(port) => config.http_port = port,
            None => bail!("--http-port expects a port number"),
        }
    }
    if has_flag(&args, "--data-folder") {
        match arg_value(&args, "--data-folder") {
            Some(dir) => config.data_folder = PathBuf::from(dir),
            None => bail!("--data-folder expects a path"),
        }
    }

    portal::audit::init_tracing(config.audit_log.as_deref())?;
    tracing::info!("Using port: http={}, data_folder={}", config.http_port, config.data_folder.display());
    portal::server::run(config).await
}
