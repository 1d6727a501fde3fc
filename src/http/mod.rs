//! HTTP control plane (spec §6.1): routes requests to the Account
//! Store, SMTP Sender, transient IMAP operations, and the Watcher
//! registry; terminates the push stream.

pub mod accounts;
pub mod messages;
pub mod stream;

use crate::config::MasterKey;
use crate::error::Error;
use crate::registry::Registry;
use crate::store::AccountStore;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler (spec §9's registry plus the
/// store and master key handlers need for account operations).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AccountStore>,
    pub registry: Registry,
    pub master: MasterKey,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, master: MasterKey) -> Self {
        let registry = Registry::new(Arc::clone(&store), master.clone());
        Self {
            store,
            registry,
            master,
        }
    }
}

/// Build the full route table (spec §6.1).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/mailbox/accounts",
            post(accounts::create).get(accounts::list),
        )
        .route(
            "/mailbox/accounts/{id}",
            get(accounts::get).put(accounts::update).delete(accounts::delete),
        )
        .route("/mailbox/accounts/{id}/test", post(accounts::test))
        .route("/mailbox/accounts/{id}/send", post(accounts::send))
        .route("/mailbox/accounts/{id}/messages", get(messages::list_recent))
        .route(
            "/mailbox/accounts/{id}/messages/{uid}",
            get(messages::fetch_one),
        )
        .route("/mailbox/accounts/{id}/watch/start", post(accounts::watch_start))
        .route("/mailbox/accounts/{id}/watch/stop", post(accounts::watch_stop))
        .route("/mailbox/accounts/{id}/stream", get(stream::stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Map every `Error` to the `{error, code}` body and status code from
/// spec §7, exactly once.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({ "error": self.to_string(), "code": self.code() });
        (status, Json(body)).into_response()
    }
}

pub(crate) fn ok() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}
