//! Server-push stream (spec §4.5, §6.1): `SSEReady`, `WatcherReady`,
//! `EmailReceived`, and `Error` events, plus a 25 s keep-alive ping.
//! The stream never returns an HTTP error once headers are flushed;
//! transport failures become `Error` events followed by close (spec
//! §7).

use crate::error::Error;
use crate::http::AppState;
use crate::registry::Registry;
use crate::watcher::{PushEvent, Subscriber};
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Interval;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

const PING_INTERVAL: Duration = Duration::from_secs(25);

pub async fn stream(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Sse<PushStream>, Error> {
    let subscriber_id = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::unbounded_channel();

    state
        .registry
        .attach(&account_id, Subscriber { id: subscriber_id, tx })
        .await?;

    let guard = DetachGuard {
        registry: state.registry,
        account_id,
        subscriber_id,
    };

    Ok(Sse::new(PushStream {
        rx,
        ping: tokio::time::interval(PING_INTERVAL),
        _guard: guard,
    }))
}

/// Detaches the subscriber when the response stream is dropped — the
/// only signal axum gives us that the client went away (spec §5:
/// "client disconnection ... triggers detach").
struct DetachGuard {
    registry: Registry,
    account_id: String,
    subscriber_id: u64,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        self.registry.detach(&self.account_id, self.subscriber_id);
    }
}

pub struct PushStream {
    rx: mpsc::UnboundedReceiver<PushEvent>,
    ping: Interval,
    _guard: DetachGuard,
}

impl Stream for PushStream {
    type Item = std::result::Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                return Poll::Ready(Some(Ok(Event::default().data(data))));
            }
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        if this.ping.poll_tick(cx).is_ready() {
            return Poll::Ready(Some(Ok(Event::default().event("ping").data("{}"))));
        }

        Poll::Pending
    }
}
