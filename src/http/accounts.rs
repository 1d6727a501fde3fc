//! Account CRUD, the `test` connectivity check, `send`, and the
//! `watch/start`/`watch/stop` endpoints (spec §6.1).

use crate::error::Result;
use crate::http::{ok, AppState};
use crate::imap::connection;
use crate::model::{AccountDetail, AccountSummary, Secret, ServerSettings};
use crate::smtp::{self, OutboundMessage, SendResult};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    tenant_id: String,
    label: Option<String>,
    primary_email: String,
    imap: ServerSettings,
    smtp: ServerSettings,
    #[serde(default)]
    test_connection: bool,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Response> {
    let secret = Secret {
        label: req.label,
        primary_email: req.primary_email,
        imap: req.imap,
        smtp: req.smtp,
    };
    secret.validate()?;

    if req.test_connection {
        verify_connectivity(&secret).await?;
    }

    let account_id = state.store.create(&req.tenant_id, &secret, &state.master).await?;
    Ok(Json(json!({ "accountId": account_id })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "tenantId")]
    tenant_id: String,
}

#[derive(Serialize)]
pub struct ListResponse {
    accounts: Vec<AccountSummary>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>> {
    let accounts = state.store.list(&query.tenant_id, &state.master).await?;
    Ok(Json(ListResponse { accounts }))
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    #[serde(rename = "includePasswords", default)]
    include_passwords: bool,
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GetQuery>,
) -> Result<Json<AccountDetail>> {
    let detail = state
        .store
        .get(&id, query.include_passwords, &state.master)
        .await?;
    Ok(Json(detail))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(secret): Json<Secret>,
) -> Result<impl IntoResponse> {
    state.store.update(&id, &secret, &state.master).await?;
    Ok(ok())
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    state.registry.stop_and_forget(&id);
    state.store.delete(&id).await?;
    Ok(ok())
}

pub async fn test(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let (secret, _tenant_id) = state.store.load_secret(&id, &state.master).await?;
    verify_connectivity(&secret).await?;
    Ok(ok())
}

async fn verify_connectivity(secret: &Secret) -> Result<()> {
    let mut session = connection::connect(&secret.imap).await?;
    connection::select(&mut session, "INBOX").await?;
    let _ = session.logout().await;
    smtp::verify(&secret.smtp).await
}

pub async fn send(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(msg): Json<OutboundMessage>,
) -> Result<Json<SendResult>> {
    let (secret, _tenant_id) = state.store.load_secret(&id, &state.master).await?;
    let result = smtp::send(&secret.smtp, &msg).await?;
    Ok(Json(result))
}

pub async fn watch_start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.registry.ensure_started(&id).await?;
    Ok(ok())
}

pub async fn watch_stop(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    state.registry.stop(&id);
    ok()
}
