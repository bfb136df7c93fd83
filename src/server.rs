//!
//! portal HTTP server
//! ------------------
//! This module defines the Axum-based HTTP API of the portal.
//!
//! Responsibilities:
//! - Password login issuing signed bearer tokens (`POST /token`).
//! - Authenticated and admin gates as request extractors (`CurrentUser`, `AdminUser`).
//! - Self-service profile and password endpoints, and admin user management.
//! - Startup: user table, bootstrap admin, listener and graceful shutdown.
//!
//! Handlers never hold a store connection across an `.await`; anything that hashes runs on
//! the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{FromRequest, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, warn};

use crate::config::PortalConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{
    self, AdminGrant, ChangePasswordRequest, CreateUserRequest, LocalAuthProvider, LoginRequest, LoginResponse,
    Principal, TokenIssuer, UpdateUserRequest, UserView,
};
use crate::security::{self, CredentialHasher};
use crate::storage::SharedStore;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PortalConfig>,
    pub store: SharedStore,
    pub hasher: CredentialHasher,
    pub tokens: Arc<TokenIssuer>,
    pub auth: Arc<LocalAuthProvider>,
}

impl AppState {
    pub fn new(config: PortalConfig, store: SharedStore) -> anyhow::Result<Self> {
        let hasher = CredentialHasher::new(&config.hashing)?;
        let tokens = Arc::new(TokenIssuer::from_config(&config));
        let auth = Arc::new(LocalAuthProvider::new(store.clone(), hasher.clone(), tokens.clone(), config.login_floor));
        Ok(Self { config: Arc::new(config), store, hasher, tokens, auth })
    }
}

/// The caller, admitted by the authenticated gate.
pub struct CurrentUser(pub Principal);

/// The caller, admitted by the admin gate.
pub struct AdminUser(pub AdminGrant);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = identity::bearer_token(&parts.headers);
        identity::admit_authenticated(&state.tokens, &state.store, bearer).map(CurrentUser)
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = identity::bearer_token(&parts.headers);
        let action = format!("{} {}", parts.method, parts.uri.path());
        identity::admit_admin(&state.tokens, &state.store, bearer, &action).map(AdminUser)
    }
}

/// JSON body whose rejection is reported as `AppError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Form body whose rejection is reported as `AppError`.
#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(AppError))]
pub struct ApiForm<T>(pub T);

/// Run CPU-bound work (password hashing) off the async workers.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("blocking task failed: {e}"))?
}

/// (method, path, gate) for every mounted route, served by `/docs`.
const ROUTES: &[(&str, &str, &str)] = &[
    ("GET", "/", "none"),
    ("POST", "/token", "none"),
    ("GET", "/users/me", "authenticated"),
    ("POST", "/users/me/password", "authenticated"),
    ("GET", "/users", "admin"),
    ("POST", "/users/create", "admin"),
    ("PUT", "/users/{id}", "admin"),
    ("DELETE", "/users/{id}", "admin"),
    ("GET", "/docs", "none"),
];

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { "portal ok" }))
        .route("/token", post(login))
        .route("/users/me", get(me))
        .route("/users/me/password", post(change_password))
        .route("/users", get(list_users))
        .route("/users/create", post(create_user))
        .route("/users/{id}", put(update_user).delete(delete_user));
    if state.config.docs_enabled() {
        app = app.route("/docs", get(docs));
    }
    app.with_state(state)
}

async fn docs() -> impl IntoResponse {
    let routes: Vec<_> = ROUTES
        .iter()
        .map(|(method, path, gate)| json!({"method": method, "path": path, "gate": gate}))
        .collect();
    Json(json!({"routes": routes}))
}

async fn login(State(state): State<AppState>, ApiForm(req): ApiForm<LoginRequest>) -> AppResult<Json<LoginResponse>> {
    state.auth.login(req).await.map(Json)
}

async fn me(CurrentUser(who): CurrentUser) -> Json<UserView> {
    Json(who.view())
}

async fn change_password(
    State(state): State<AppState>,
    CurrentUser(who): CurrentUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    blocking(move || identity::change_own_password(&state.store, &state.hasher, &who, req)).await?;
    Ok(Json(json!({"status": "ok"})))
}

async fn list_users(State(state): State<AppState>, AdminUser(grant): AdminUser) -> Json<Vec<UserView>> {
    Json(identity::list_users(&state.store, &grant))
}

async fn create_user(
    State(state): State<AppState>,
    AdminUser(grant): AdminUser,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> AppResult<impl IntoResponse> {
    let view = blocking(move || identity::create_user(&state.store, &state.hasher, &grant, req)).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_user(
    State(state): State<AppState>,
    AdminUser(grant): AdminUser,
    Path(id): Path<u64>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<UserView>> {
    blocking(move || identity::update_user(&state.store, &state.hasher, &grant, id, req)).await.map(Json)
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(grant): AdminUser,
    Path(id): Path<u64>,
) -> AppResult<impl IntoResponse> {
    identity::delete_user(&state.store, &grant, id)?;
    Ok(Json(json!({"status": "ok", "deleted": id})))
}

fn log_startup(config: &PortalConfig) {
    let cwd = std::env::current_dir().ok();
    info!(
        target: "startup",
        "portal starting: environment={:?}, data_folder={:?}, cwd={:?}, token_ttl={:?}, login_floor={:?}, audit_log={:?}",
        config.environment, config.data_folder, cwd, config.token_ttl, config.login_floor, config.audit_log
    );
    if config.ephemeral_secret {
        warn!("PORTAL_SECRET_KEY not set; using a random per-process secret (tokens will not survive restarts)");
    }
}

/// Open the user table under the configured data folder and seed the bootstrap admin.
pub fn prepare_state(config: PortalConfig) -> anyhow::Result<AppState> {
    let store = SharedStore::open(&config.data_folder)
        .with_context(|| format!("While opening user table under {}", config.data_folder.display()))?;
    let state = AppState::new(config, store)?;
    match &state.config.bootstrap_admin {
        Some(admin) => {
            security::ensure_default_admin(&state.store, &state.hasher, admin).context("While seeding bootstrap admin")?;
        }
        None if state.store.connect().is_empty() => {
            warn!("user table is empty and no PORTAL_ADMIN_USERNAME/PORTAL_ADMIN_PASSWORD configured; nobody can log in");
        }
        None => {}
    }
    info!(target: "startup", users = state.store.connect().len(), "user table ready");
    Ok(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: tokio::net::TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

/// Start the portal HTTP server on the configured port and run until Ctrl-C.
pub async fn run(config: PortalConfig) -> anyhow::Result<()> {
    log_startup(&config);
    let port = config.http_port;
    let state = prepare_state(config)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("could not listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    })
    .await?;
    info!("server stopped");
    Ok(())
}
