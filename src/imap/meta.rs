//! Shared conversion from an `async-imap` `Fetch` response into the
//! gateway's own `MsgMeta`/`Address` shapes. Used by both transient
//! fetches and the Watcher's incremental fetch pass, so the two paths
//! can't drift in what a message's metadata looks like.

use crate::model::{Address, MsgMeta};
use async_imap::types::Fetch;
use chrono::Utc;

pub(crate) fn from_fetch(msg: &Fetch) -> MsgMeta {
    let envelope = msg.envelope();
    let subject = envelope
        .and_then(|e| e.subject.as_ref())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_default();
    let from = envelope
        .and_then(|e| e.from.as_ref())
        .map(|addrs| addrs.iter().map(address_from_imap).collect())
        .unwrap_or_default();
    let to = envelope
        .and_then(|e| e.to.as_ref())
        .map(|addrs| addrs.iter().map(address_from_imap).collect())
        .unwrap_or_default();
    let date = msg
        .internal_date()
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let flags = msg
        .flags()
        .map(|f| crate::imap::Flag::from(&f).to_string())
        .collect();

    MsgMeta {
        uid: msg.uid.unwrap_or(0),
        subject,
        from,
        to,
        date,
        flags,
    }
}

fn address_from_imap(addr: &async_imap::imap_proto::types::Address<'_>) -> Address {
    let name = addr
        .name
        .as_ref()
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .filter(|n| !n.is_empty());
    let mailbox = addr
        .mailbox
        .as_ref()
        .map(|m| String::from_utf8_lossy(m).into_owned())
        .unwrap_or_default();
    let host = addr
        .host
        .as_ref()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .unwrap_or_default();
    Address {
        name,
        email: format!("{mailbox}@{host}"),
    }
}
