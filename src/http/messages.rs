//! `listRecent`/`fetchOne` endpoints (spec §4.6, §6.1). `NotFound` here
//! is the one place spec §7 calls out as literal HTTP 404.

use crate::error::Error;
use crate::http::AppState;
use crate::imap::transient;
use crate::model::MsgMeta;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use base64::Engine as _;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
    since: Option<NaiveDate>,
}

#[derive(Serialize)]
struct ListResponse {
    messages: Vec<MsgMeta>,
}

pub async fn list_recent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50).min(100);
    match fetch_settings(&state, &id).await {
        Ok(settings) => match transient::list_recent(&settings, limit, query.since).await {
            Ok(messages) => Json(ListResponse { messages }).into_response(),
            Err(e) => as_response(e),
        },
        Err(e) => as_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct FetchQuery {
    #[serde(rename = "includeRaw", default)]
    include_raw: bool,
}

pub async fn fetch_one(
    State(state): State<AppState>,
    Path((id, uid)): Path<(String, u32)>,
    Query(query): Query<FetchQuery>,
) -> Response {
    let settings = match fetch_settings(&state, &id).await {
        Ok(s) => s,
        Err(e) => return as_response(e),
    };

    match transient::fetch_one(&settings, uid, query.include_raw).await {
        Ok((meta, parsed, raw)) => {
            let mut body = json!({
                "uid": meta.uid,
                "subject": meta.subject,
                "from": meta.from,
                "to": meta.to,
                "date": meta.date,
                "flags": meta.flags,
                "parsed": parsed,
            });
            if let Some(raw) = raw {
                body["rfc822"] = json!(base64::engine::general_purpose::STANDARD.encode(raw));
            }
            Json(body).into_response()
        }
        Err(e) => as_response(e),
    }
}

async fn fetch_settings(
    state: &AppState,
    account_id: &str,
) -> crate::error::Result<crate::model::ServerSettings> {
    let (secret, _tenant_id) = state.store.load_secret(account_id, &state.master).await?;
    Ok(secret.imap)
}

/// `NotFound` is literally 404 on these two endpoints (spec §6.1, §7);
/// every other error keeps its default mapping.
fn as_response(err: Error) -> Response {
    if matches!(err, Error::NotFound) {
        (StatusCode::NOT_FOUND, Json(json!({ "error": err.to_string(), "code": err.code() })))
            .into_response()
    } else {
        err.into_response()
    }
}
