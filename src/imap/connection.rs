//! TLS-wrapped IMAP connection and SELECT helpers.
//!
//! Supports both connection modes a `ServerSettings` can name: implicit
//! TLS (connect straight into the handshake, typically port 993) and
//! STARTTLS (connect in cleartext, issue `STARTTLS`, then upgrade the
//! same socket, typically port 143). Certificates are verified against
//! the Mozilla root set; unlike a single-provider client there is no
//! fixed self-signed certificate to special-case, so verification is
//! never disabled.

use crate::error::{Error, Result};
use crate::model::{ConnectionSecurity, ServerSettings};
use async_imap::Session;
use async_imap::types::Mailbox;
use rustls::pki_types::{CertificateDer, ServerName};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::debug;

/// A TLS-wrapped IMAP session, regardless of whether TLS was implicit
/// or negotiated via `STARTTLS`.
pub type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

fn tls_connector(extra_root: Option<&CertificateDer<'static>>) -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    if let Some(cert) = extra_root {
        let _ = roots.add(cert.clone());
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Connect to `settings.host:settings.port` and log in, honoring
/// `settings.connection` for the TLS negotiation style.
pub async fn connect(settings: &ServerSettings) -> Result<ImapSession> {
    connect_with_extra_root(settings, None).await
}

/// Like [`connect`], but trusts an additional certificate as a root
/// for this connection only. Exists so a mail server behind a private
/// CA (or a test double with a self-signed certificate) can be
/// reached without weakening verification for every other account.
pub async fn connect_with_extra_root(
    settings: &ServerSettings,
    extra_root: Option<&CertificateDer<'static>>,
) -> Result<ImapSession> {
    let addr = format!("{}:{}", settings.host, settings.port);
    debug!("connecting to IMAP server at {addr}");

    let tcp_stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Upstream(format!("connect to {addr} timed out")))??;

    let connector = tls_connector(extra_root);
    let server_name = ServerName::try_from(settings.host.clone())
        .map_err(|e| Error::Upstream(format!("invalid server name {}: {e}", settings.host)))?;

    let tls_client = match settings.connection {
        ConnectionSecurity::Tls => {
            let tls_stream = connector
                .connect(server_name, tcp_stream)
                .await
                .map_err(|e| Error::Upstream(format!("TLS handshake failed: {e}")))?;
            async_imap::Client::new(tls_stream.compat())
        }
        ConnectionSecurity::StartTls => {
            let mut plain_client = async_imap::Client::new(tcp_stream.compat());
            plain_client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| Error::Upstream(format!("STARTTLS failed: {e}")))?;
            let inner = plain_client.into_inner().into_inner();
            let tls_stream = connector
                .connect(server_name, inner)
                .await
                .map_err(|e| Error::Upstream(format!("TLS handshake failed: {e}")))?;
            async_imap::Client::new(tls_stream.compat())
        }
    };

    let session = timeout(
        LOGIN_TIMEOUT,
        tls_client.login(&settings.username, &settings.password),
    )
    .await
    .map_err(|_| Error::Upstream("login timed out".to_string()))?
    .map_err(|(e, _)| Error::Upstream(format!("login failed: {e}")))?;

    debug!("IMAP login succeeded");
    Ok(session)
}

/// `SELECT` a mailbox, returning its `UIDNEXT`/`UIDVALIDITY` state.
pub async fn select(session: &mut ImapSession, folder: &str) -> Result<Mailbox> {
    session
        .select(folder)
        .await
        .map_err(|e| Error::Upstream(format!("SELECT {folder} failed: {e}")))
}
