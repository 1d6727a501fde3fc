//! The IMAP Watcher (spec §4.4): one long-lived task per account that
//! keeps INBOX selected, waits on IMAP IDLE for the server's "new
//! message" signal, and fans new messages out to subscribers as
//! `EmailReceived` events.
//!
//! The Watcher owns its state; callers never touch `lastUid` or the
//! subscriber set directly, only send it commands (spec §9 design
//! note, generalizing the teacher's direct-session-method style to a
//! message-passing actor because this state now has concurrent
//! writers).

use crate::imap::connection::{self, ImapSession};
use crate::imap::meta::from_fetch;
use crate::model::ServerSettings;
use async_imap::extensions::idle::IdleResponse;
use futures::StreamExt;
use rustls::pki_types::CertificateDer;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const IDLE_GRACE: Duration = Duration::from_secs(60);

/// One push event delivered to a subscriber's SSE stream (spec §4.5).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    #[serde(rename = "SSEReady")]
    SseReady { #[serde(rename = "accountId")] account_id: String },
    #[serde(rename = "WatcherReady")]
    WatcherReady { #[serde(rename = "accountId")] account_id: String },
    #[serde(rename = "EmailReceived")]
    EmailReceived {
        #[serde(rename = "accountId")]
        account_id: String,
        uid: u32,
        subject: String,
        from: Vec<crate::model::Address>,
        to: Vec<crate::model::Address>,
        date: chrono::DateTime<chrono::Utc>,
        flags: Vec<String>,
    },
    #[serde(rename = "Error")]
    Error { message: String },
}

/// One attached client's sending half (spec's `PushHandle`).
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: u64,
    pub tx: mpsc::UnboundedSender<PushEvent>,
}

/// Commands a `WatcherHandle` sends to its task.
pub enum WatcherCommand {
    Attach(Subscriber),
    Detach(u64),
    Stop,
}

/// A cheap, cloneable handle to a running Watcher task (spec §5: "the
/// Watcher owns its state, interactions are messages").
#[derive(Clone)]
pub struct WatcherHandle {
    tx: mpsc::UnboundedSender<WatcherCommand>,
}

impl WatcherHandle {
    pub fn attach(&self, sub: Subscriber) {
        let _ = self.tx.send(WatcherCommand::Attach(sub));
    }

    pub fn detach(&self, subscriber_id: u64) {
        let _ = self.tx.send(WatcherCommand::Detach(subscriber_id));
    }

    pub fn stop(&self) {
        let _ = self.tx.send(WatcherCommand::Stop);
    }
}

/// Spawn a Watcher task for `account_id`, connecting with `settings`.
/// `on_stopped` is invoked from the task once it tears down, so the
/// registry can remove its entry without the task reaching back into
/// a registry type directly.
pub fn spawn(
    account_id: String,
    settings: ServerSettings,
    on_stopped: impl FnOnce(&str) + Send + 'static,
) -> WatcherHandle {
    spawn_with_extra_root(account_id, settings, None, on_stopped)
}

/// Like [`spawn`], but trusts an additional certificate for this
/// Watcher's connection only. Exists so tests can run a Watcher
/// against a test double with a self-signed certificate.
pub fn spawn_with_extra_root(
    account_id: String,
    settings: ServerSettings,
    extra_root: Option<CertificateDer<'static>>,
    on_stopped: impl FnOnce(&str) + Send + 'static,
) -> WatcherHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(account_id, settings, extra_root, rx, on_stopped));
    WatcherHandle { tx }
}

struct State {
    account_id: String,
    last_uid: u32,
    subscribers: HashMap<u64, mpsc::UnboundedSender<PushEvent>>,
    became_empty_at: Option<Instant>,
}

impl State {
    fn broadcast(&mut self, event: &PushEvent) {
        self.subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

async fn run(
    account_id: String,
    settings: ServerSettings,
    extra_root: Option<CertificateDer<'static>>,
    mut cmd_rx: mpsc::UnboundedReceiver<WatcherCommand>,
    on_stopped: impl FnOnce(&str) + Send + 'static,
) {
    let mut state = State {
        account_id: account_id.clone(),
        last_uid: 0,
        subscribers: HashMap::new(),
        became_empty_at: None,
    };

    // Drain any commands queued before the task was scheduled, so an
    // attach racing with spawn isn't lost.
    drain_pending(&mut cmd_rx, &mut state);

    let mut session = match connect_and_select(&settings, extra_root.as_ref(), &mut state).await {
        Ok(session) => session,
        Err(message) => {
            warn!(account = %account_id, %message, "watcher failed to connect");
            state.broadcast(&PushEvent::Error { message });
            on_stopped(&account_id);
            return;
        }
    };

    // Pick up any Attach that arrived while `connect_and_select` was
    // awaiting the network, so the subscriber that triggered this
    // Watcher's startup always sees WatcherReady (spec §4.4 scenario
    // 4), not just subscribers lucky enough to attach after this point.
    drain_pending(&mut cmd_rx, &mut state);

    state.broadcast(&PushEvent::WatcherReady {
        account_id: account_id.clone(),
    });
    info!(account = %account_id, uid_next = state.last_uid + 1, "watcher entered Watching");

    loop {
        if state.subscribers.is_empty() && state.became_empty_at.is_none() {
            state.became_empty_at = Some(Instant::now());
        }

        let grace_deadline = state.became_empty_at.map(|t| t + IDLE_GRACE);

        let outcome = match wait_for_event(session, &mut cmd_rx, grace_deadline).await {
            Ok((s, outcome)) => {
                session = s;
                outcome
            }
            Err(message) => {
                state.broadcast(&PushEvent::Error { message });
                return on_stopped(&account_id);
            }
        };

        match outcome {
            Outcome::NewData => match fetch_new(&mut session, &mut state).await {
                Ok(()) => {}
                Err(message) => {
                    state.broadcast(&PushEvent::Error { message });
                    break;
                }
            },
            Outcome::Keepalive => {
                if let Err(e) = session.noop().await {
                    state.broadcast(&PushEvent::Error {
                        message: format!("keepalive failed: {e}"),
                    });
                    break;
                }
            }
            Outcome::Command(WatcherCommand::Attach(sub)) => {
                state.became_empty_at = None;
                state.subscribers.insert(sub.id, sub.tx);
            }
            Outcome::Command(WatcherCommand::Detach(id)) => {
                state.subscribers.remove(&id);
            }
            Outcome::Command(WatcherCommand::Stop) => break,
            Outcome::IdleGraceExpired => {
                debug!(account = %account_id, "watcher idle-grace expired, tearing down");
                break;
            }
            Outcome::ConnectionError(message) => {
                state.broadcast(&PushEvent::Error { message });
                break;
            }
        }
    }

    let _ = session.logout().await;
    on_stopped(&account_id);
}

fn drain_pending(cmd_rx: &mut mpsc::UnboundedReceiver<WatcherCommand>, state: &mut State) {
    while let Ok(cmd) = cmd_rx.try_recv() {
        match cmd {
            WatcherCommand::Attach(sub) => {
                state.subscribers.insert(sub.id, sub.tx);
            }
            WatcherCommand::Detach(id) => {
                state.subscribers.remove(&id);
            }
            WatcherCommand::Stop => {}
        }
    }
}

async fn connect_and_select(
    settings: &ServerSettings,
    extra_root: Option<&CertificateDer<'static>>,
    state: &mut State,
) -> Result<ImapSession, String> {
    let mut session = connection::connect_with_extra_root(settings, extra_root)
        .await
        .map_err(|e| e.to_string())?;
    let mailbox = connection::select(&mut session, "INBOX")
        .await
        .map_err(|e| e.to_string())?;
    state.last_uid = mailbox.uid_next.unwrap_or(1).saturating_sub(1);
    Ok(session)
}

enum Outcome {
    NewData,
    Keepalive,
    Command(WatcherCommand),
    IdleGraceExpired,
    ConnectionError(String),
}

/// Arm IDLE, wait for the server, a command, or idle-grace expiry,
/// then always disarm IDLE (`DONE`) before returning the session —
/// `IDLE` holds the mailbox lock against every other command.
async fn wait_for_event(
    session: ImapSession,
    cmd_rx: &mut mpsc::UnboundedReceiver<WatcherCommand>,
    grace_deadline: Option<Instant>,
) -> Result<(ImapSession, Outcome), String> {
    let mut handle = session.idle();
    if let Err(e) = handle.init().await {
        let session = handle
            .done()
            .await
            .map_err(|e2| format!("failed to arm IDLE: {e}; also failed to recover: {e2}"))?;
        return Ok((session, Outcome::ConnectionError(format!("failed to arm IDLE: {e}"))));
    }

    let outcome = {
        let (wait_fut, _stop_src) = handle.wait_with_timeout(KEEPALIVE_INTERVAL);
        tokio::pin!(wait_fut);

        tokio::select! {
            res = &mut wait_fut => match res {
                Ok(IdleResponse::NewData(_)) => Outcome::NewData,
                Ok(IdleResponse::Timeout | IdleResponse::ManualInterrupt) => Outcome::Keepalive,
                Err(e) => Outcome::ConnectionError(e.to_string()),
            },
            Some(cmd) = cmd_rx.recv() => Outcome::Command(cmd),
            () = sleep_until_opt(grace_deadline) => Outcome::IdleGraceExpired,
        }
    };

    let session = handle.done().await.map_err(|e| e.to_string())?;
    Ok((session, outcome))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

async fn fetch_new(session: &mut ImapSession, state: &mut State) -> Result<(), String> {
    let lo = state.last_uid + 1;
    let uid_set = format!("{lo}:*");

    let mut messages = session
        .uid_fetch(&uid_set, "(UID FLAGS INTERNALDATE ENVELOPE)")
        .await
        .map_err(|e| e.to_string())?;

    let mut fetched = Vec::new();
    while let Some(msg) = messages.next().await {
        let msg = msg.map_err(|e| e.to_string())?;
        fetched.push(from_fetch(&msg));
    }
    drop(messages);

    fetched.retain(|m| m.uid >= lo);
    fetched.sort_by_key(|m| m.uid);

    for meta in fetched {
        state.last_uid = state.last_uid.max(meta.uid);
        state.broadcast(&PushEvent::EmailReceived {
            account_id: state.account_id.clone(),
            uid: meta.uid,
            subject: meta.subject,
            from: meta.from,
            to: meta.to,
            date: meta.date,
            flags: meta.flags,
        });
    }

    Ok(())
}
