//!
//! service-hours HTTP server
//! -------------------------
//! Axum router, shared state and process lifecycle.
//!
//! Responsibilities:
//! - Session cookie handling and sign-in through the identity verifier.
//! - Page rendering (`pages`) and form actions (`actions`).
//! - Startup: store snapshot load, roster/admin import, template parsing.
//! - Background store snapshots and a final snapshot on shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDate;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

pub mod actions;
pub mod pages;
pub mod web;

use crate::config::Config;
use crate::directory::{parse_admin_list, parse_roster_csv, User, UserDirectory};
use crate::entries::EntryStore;
use crate::error::{AppError, AppResult};
use crate::identity::{GoogleTokenVerifier, IdentityVerifier, RequestContext, SessionRegistry};
use crate::storage::{DocumentStore, MemoryStore, PersistenceSettings};
use crate::template::Templates;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub directory: UserDirectory,
    pub entries: EntryStore,
    pub sessions: SessionRegistry,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub templates: Arc<Templates>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, verifier: Arc<dyn IdentityVerifier>, templates: Templates, config: Config) -> Self {
        let docs: Arc<dyn DocumentStore> = store.clone();
        Self {
            directory: UserDirectory::new(docs.clone()),
            entries: EntryStore::new(docs),
            sessions: SessionRegistry::new(),
            store,
            verifier,
            templates: Arc::new(templates),
            config: Arc::new(config),
        }
    }
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// The signed-in user behind the request's session cookie.
pub(crate) fn session_user(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let Some(token) = web::session_token(headers) else {
        return Err(AppError::authentication("no_session".to_string(), "not signed in".to_string()));
    };
    state
        .sessions
        .lookup(&token)
        .ok_or_else(|| AppError::authentication("unknown_session".to_string(), "session expired, sign in again".to_string()))
}

async fn request_span(mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::new();
    let span = info_span!("request", id = %ctx.request_id, method = %req.method(), path = %req.uri().path());
    req.extensions_mut().insert(ctx.clone());
    let mut resp = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| {
        debug!(target: "service_hours::http", status = resp.status().as_u16(), ms = ctx.elapsed_ms() as u64, "request done");
    });
    if let Ok(v) = HeaderValue::from_str(&ctx.request_id) {
        resp.headers_mut().insert("x-request-id", v);
    }
    resp
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::signin_page))
        .route("/signin", get(pages::signin))
        .route("/signout", get(pages::signout))
        .route("/admin", get(pages::admin))
        .route("/flagged", get(pages::flagged))
        .route("/do/add", post(actions::add))
        .route("/do/update", post(actions::update))
        .route("/do/delete", post(actions::delete))
        .route("/do/unflag", post(actions::unflag))
        .route("/do/roster", post(actions::roster))
        .route("/{email}", get(pages::list))
        .route("/{email}/new", get(pages::new_entry))
        .route("/{email}/{key}", get(pages::edit))
        .route("/{email}/{key}/duplicate", get(pages::duplicate))
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

fn open_store(config: &Config) -> anyhow::Result<MemoryStore> {
    if !config.persistence_enabled() {
        info!(target: "service_hours::store", "persistence disabled, store is memory-only");
        return Ok(MemoryStore::new());
    }
    let settings = PersistenceSettings::at(&config.data_dir, config.snapshot_ms);
    MemoryStore::open(settings).with_context(|| format!("While opening store under {}", config.data_dir.display()))
}

/// Apply the roster and admin list named in the configuration, if any.
pub fn import_startup_files(config: &Config, directory: &UserDirectory) -> anyhow::Result<()> {
    if let Some(path) = &config.roster_path {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read roster {}", path.display()))?;
        let users = parse_roster_csv(&text).with_context(|| format!("Invalid roster {}", path.display()))?;
        let summary = directory.replace_roster(&users)?;
        info!(
            target: "service_hours::startup",
            path = %path.display(), added = summary.added, updated = summary.updated, removed = summary.removed,
            "roster imported"
        );
    }
    if let Some(path) = &config.admins_path {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read admin list {}", path.display()))?;
        let granted = directory.grant_admins(&parse_admin_list(&text))?;
        info!(target: "service_hours::startup", path = %path.display(), granted, "admin list applied");
    }
    Ok(())
}

fn spawn_snapshot_loop(store: Arc<MemoryStore>) -> Option<JoinHandle<()>> {
    let settings = store.persistence()?.clone();
    if !settings.enabled || settings.interval_ms == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.interval());
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let s = store.clone();
            match tokio::task::spawn_blocking(move || s.save_snapshot()).await {
                Ok(Ok(written)) => {
                    if written { debug!(target: "service_hours::store", "periodic snapshot"); }
                }
                Ok(Err(e)) => error!(target: "service_hours::store", error = %e, "snapshot failed"),
                Err(e) => error!(target: "service_hours::store", error = %e, "snapshot task panicked"),
            }
        }
    }))
}

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(target: "service_hours::startup", error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!(target: "service_hours::startup", "shutdown requested");
}

/// Start the server with the given configuration and run until Ctrl-C.
pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(open_store(&config)?);
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(
        GoogleTokenVerifier::new(&config.tokeninfo_url, &config.domain, config.client_id.clone())
            .context("While building the identity verifier")?,
    );
    let templates = Templates::bundled().context("Bundled templates failed to parse")?;
    let state = AppState::new(store.clone(), verifier, templates, config.clone());
    import_startup_files(&config, &state.directory)?;

    let snapshots = spawn_snapshot_loop(store.clone());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {}", addr))?;
    info!(target: "service_hours::startup", %addr, docs = store.len(), "listening");
    serve(listener, state, ctrl_c()).await?;

    if let Some(h) = snapshots {
        h.abort();
    }
    if store.save_snapshot().context("Final snapshot failed")? {
        info!(target: "service_hours::startup", "final snapshot written");
    }
    Ok(())
}
