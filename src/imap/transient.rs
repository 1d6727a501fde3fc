//! Short-lived IMAP operations independent of the long-lived Watcher:
//! `listRecent` and `fetchOne` (spec §4.6). Each opens its own
//! connection, does its work, and always logs out — on the success
//! path and on every error path, so the mailbox lock is never left
//! held by a failed request.

use crate::error::{Error, Result};
use crate::imap::connection::{self, ImapSession};
use crate::imap::meta::from_fetch;
use crate::model::{AttachmentMeta, MsgMeta, ParsedMessage, ServerSettings};
use chrono::NaiveDate;
use futures::StreamExt;
use mail_parser::MimeHeaders;
use rustls::pki_types::CertificateDer;
use std::time::Duration;
use tokio::time::timeout;

const LIST_TIMEOUT: Duration = Duration::from_secs(45);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// List up to `limit` of the most recent messages in INBOX, optionally
/// restricted to those received on or after `since`.
pub async fn list_recent(
    settings: &ServerSettings,
    limit: usize,
    since: Option<NaiveDate>,
) -> Result<Vec<MsgMeta>> {
    list_recent_with_extra_root(settings, limit, since, None).await
}

/// Like [`list_recent`], but trusts an additional certificate for this
/// connection only. Exists so tests can exercise this against a test
/// double with a self-signed certificate.
pub async fn list_recent_with_extra_root(
    settings: &ServerSettings,
    limit: usize,
    since: Option<NaiveDate>,
    extra_root: Option<&CertificateDer<'static>>,
) -> Result<Vec<MsgMeta>> {
    let mut session = connection::connect_with_extra_root(settings, extra_root).await?;
    let outcome = timeout(LIST_TIMEOUT, list_recent_inner(&mut session, limit, since)).await;
    close(session).await;

    match outcome {
        Ok(result) => result,
        Err(_) => Err(Error::Upstream("listRecent timed out".to_string())),
    }
}

async fn list_recent_inner(
    session: &mut ImapSession,
    limit: usize,
    since: Option<NaiveDate>,
) -> Result<Vec<MsgMeta>> {
    let mailbox = connection::select(session, "INBOX").await?;
    let uid_next = mailbox.uid_next.unwrap_or(1);

    let mut uids: Vec<u32> = if let Some(date) = since {
        let query = format!("SINCE {}", date.format("%-d-%b-%Y"));
        session
            .uid_search(&query)
            .await
            .map_err(|e| Error::Upstream(format!("SEARCH failed: {e}")))?
            .into_iter()
            .collect()
    } else {
        let hi = uid_next.saturating_sub(1);
        let lo = hi.saturating_sub((limit as u32).saturating_mul(5)).max(1);
        session
            .uid_search(format!("UID {lo}:{hi}"))
            .await
            .map_err(|e| Error::Upstream(format!("SEARCH failed: {e}")))?
            .into_iter()
            .collect()
    };

    uids.sort_unstable();
    let start = uids.len().saturating_sub(limit);
    let recent = &uids[start..];
    if recent.is_empty() {
        return Ok(Vec::new());
    }

    let uid_set = recent
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let mut messages = session
        .uid_fetch(&uid_set, "(UID FLAGS INTERNALDATE ENVELOPE)")
        .await
        .map_err(|e| Error::Upstream(format!("FETCH failed: {e}")))?;

    let mut out = Vec::with_capacity(recent.len());
    while let Some(msg) = messages.next().await {
        let msg = msg.map_err(|e| Error::Upstream(format!("FETCH error: {e}")))?;
        out.push(from_fetch(&msg));
    }
    drop(messages);

    out.sort_by_key(|m| m.uid);
    Ok(out)
}

/// Fetch one message by UID: envelope metadata, flags, a best-effort
/// MIME-parsed view, and (if `include_raw`) the raw RFC822 source.
pub async fn fetch_one(
    settings: &ServerSettings,
    uid: u32,
    include_raw: bool,
) -> Result<(MsgMeta, ParsedMessage, Option<Vec<u8>>)> {
    fetch_one_with_extra_root(settings, uid, include_raw, None).await
}

/// Like [`fetch_one`], but trusts an additional certificate for this
/// connection only (see [`list_recent_with_extra_root`]).
pub async fn fetch_one_with_extra_root(
    settings: &ServerSettings,
    uid: u32,
    include_raw: bool,
    extra_root: Option<&CertificateDer<'static>>,
) -> Result<(MsgMeta, ParsedMessage, Option<Vec<u8>>)> {
    let mut session = connection::connect_with_extra_root(settings, extra_root).await?;
    let outcome = timeout(FETCH_TIMEOUT, fetch_one_inner(&mut session, uid)).await;
    close(session).await;

    match outcome {
        Ok(result) => {
            let (meta, raw) = result?;
            let parsed = parse_message(&raw);
            Ok((meta, parsed, include_raw.then_some(raw)))
        }
        Err(_) => Err(Error::Upstream("fetchOne timed out".to_string())),
    }
}

async fn fetch_one_inner(session: &mut ImapSession, uid: u32) -> Result<(MsgMeta, Vec<u8>)> {
    connection::select(session, "INBOX").await?;

    let uid_set = uid.to_string();
    let mut messages = session
        .uid_fetch(&uid_set, "(UID FLAGS INTERNALDATE ENVELOPE BODY.PEEK[])")
        .await
        .map_err(|e| Error::Upstream(format!("FETCH failed: {e}")))?;

    let Some(msg) = messages.next().await else {
        return Err(Error::NotFound);
    };
    let msg = msg.map_err(|e| Error::Upstream(format!("FETCH error: {e}")))?;
    let meta = from_fetch(&msg);
    let raw = msg.body().ok_or(Error::NotFound)?.to_vec();
    drop(messages);
    Ok((meta, raw))
}

async fn close(mut session: ImapSession) {
    let _ = session.close().await;
    let _ = session.logout().await;
}

fn parse_message(raw: &[u8]) -> ParsedMessage {
    let Some(parsed) = mail_parser::MessageParser::default().parse(raw) else {
        return ParsedMessage {
            text: None,
            html: None,
            attachments: Vec::new(),
        };
    };

    let text = parsed.body_text(0).map(|s| s.into_owned());
    let html = parsed.body_html(0).map(|s| s.into_owned());
    let attachments = parsed
        .attachments()
        .map(|a| AttachmentMeta {
            filename: a.attachment_name().map(ToString::to_string),
            content_type: a.content_type().map(|ct| ct.c_type.to_string()),
            size: a.contents().len(),
        })
        .collect();

    ParsedMessage {
        text,
        html,
        attachments,
    }
}
