//! Diff-serving HTTP service.

pub mod accounts;

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, task};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::{DbError, Hash, LOCAL_DATASET};
use crate::spec::{Location, SpecCell, SpecError};

pub use accounts::{Account, Accounts};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 7001;

/// Errors that can occur while running the service.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The request carried no known account.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// An account database location could not be resolved.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Reading an account database failed.
    #[error(transparent)]
    Db(#[from] DbError),
    /// A blocking storage task panicked or was cancelled.
    #[error("internal task failure: {0}")]
    Join(#[from] task::JoinError),
    /// Binding or running the listener failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = match self {
            ServeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorPayload {
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Per-account view of a database prefix.
pub struct Service {
    prefix: Location,
    accounts: Accounts,
    specs: Mutex<HashMap<u32, Arc<SpecCell>>>,
}

type AppState = Arc<Service>;

impl Service {
    /// Service over the databases under `prefix`, one per account.
    ///
    /// # Errors
    ///
    /// Returns an error if `prefix` is not a valid database location.
    pub fn new(prefix: &str, accounts: Accounts) -> Result<Self, ServeError> {
        Ok(Self {
            prefix: Location::parse(prefix)?,
            accounts,
            specs: Mutex::new(HashMap::new()),
        })
    }

    /// Request handler for the service.
    pub fn into_router(self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/pull", post(pull_handler))
            .with_state(Arc::new(self))
            .layer(TraceLayer::new_for_http())
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<Account, ServeError> {
        let raw = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .ok_or_else(|| ServeError::Unauthorized("missing Authorization header".into()))?;
        let id: u32 = raw
            .parse()
            .map_err(|_| ServeError::Unauthorized(format!("invalid account id {raw:?}")))?;
        self.accounts
            .lookup(id)
            .cloned()
            .ok_or_else(|| ServeError::Unauthorized(format!("unknown account {id}")))
    }

    fn spec_cell(&self, account: &Account) -> Arc<SpecCell> {
        let mut specs = self.specs.lock();
        let cell = specs.entry(account.id).or_insert_with(|| {
            Arc::new(SpecCell::new(self.prefix.child(&account.name).to_string()))
        });
        Arc::clone(cell)
    }

    fn local_head(&self, account: &Account) -> Result<Option<Hash>, ServeError> {
        let spec = self.spec_cell(account).get_or_resolve()?;
        let dataset = spec.database().get_dataset(LOCAL_DATASET)?;
        Ok(dataset.head())
    }
}

/// Binds `0.0.0.0:port` and serves the databases under `location` until the
/// process ends.
///
/// # Errors
///
/// Returns an error if the location is invalid, the port cannot be bound, or
/// the server fails.
pub async fn serve(location: &str, port: u16, accounts: Accounts) -> Result<(), ServeError> {
    let service = Service::new(location, accounts)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on :{port}...");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, service.into_router().into_make_service()).await?;
    Ok(())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[tracing::instrument(name = "pull", skip_all)]
async fn pull_handler(
    State(service): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PullRequest>,
) -> Result<Json<PullResponse>, ServeError> {
    let account = service.authorize(&headers)?;
    let head = task::spawn_blocking(move || service.local_head(&account)).await??;
    let state_id = head.map(|hash| hash.to_hex()).unwrap_or_default();
    Ok(Json(PullResponse {
        unchanged: state_id == request.base_state_id,
        state_id,
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct PullRequest {
    #[serde(rename = "baseStateID", default)]
    base_state_id: String,
}

#[derive(Debug, Serialize)]
struct PullResponse {
    #[serde(rename = "stateID")]
    state_id: String,
    unchanged: bool,
}
