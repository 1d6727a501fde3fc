//! IDLE command handler (RFC 2177).
//!
//! On `IDLE`, the server sends a continuation (`+ idling`) and then
//! waits: either for the client to send `DONE` on its own (a
//! keepalive round-trip), or for a new message to land in the
//! selected folder, in which case the server sends an untagged
//! `EXISTS` and waits for the client's `DONE` before completing.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::Notify;

/// Handle the IDLE command. Returns `false` if the connection should
/// be closed (a read or write failed).
pub async fn handle_idle<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    mailbox: &Mutex<Mailbox>,
    selected_folder: Option<&str>,
    notify: &Notify,
    stream: &mut BufReader<S>,
) -> bool {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        return write_line(stream, &resp).await.is_ok();
    };

    if write_line(stream, "+ idling\r\n").await.is_err() {
        return false;
    }

    loop {
        let mut line = String::new();
        tokio::select! {
            result = stream.read_line(&mut line) => {
                match result {
                    Ok(0) | Err(_) => return false,
                    Ok(_) if line.trim().eq_ignore_ascii_case("DONE") => break,
                    Ok(_) => {}
                }
            }
            () = notify.notified() => {
                let count = mailbox
                    .lock()
                    .unwrap()
                    .get_folder(folder_name)
                    .map_or(0, |f| f.emails.len());
                let exists_line = format!("* {count} EXISTS\r\n");
                if write_line(stream, &exists_line).await.is_err() {
                    return false;
                }
            }
        }
    }

    let resp = format!("{tag} OK IDLE terminated\r\n");
    write_line(stream, &resp).await.is_ok()
}
