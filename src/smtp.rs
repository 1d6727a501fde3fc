//! Transient SMTP sending (spec §4.3)
//!
//! A client is assembled fresh from a decrypted `Secret` for each
//! `verify`/`send` call; nothing about the connection is kept beyond
//! the call. Transport security follows `smtp.connection`: `TLS` dials
//! straight into a TLS handshake, `STARTTLS` requires the upgrade and
//! fails closed if the server doesn't offer it (`starttls_relay`, not
//! the opportunistic variant).

use crate::error::{Error, Result};
use crate::model::{ConnectionSecurity, ServerSettings};
use base64::Engine as _;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

/// An outbound message envelope, as accepted by the `send` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboundMessage {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<OutboundAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboundAttachment {
    pub filename: String,
    #[serde(rename = "contentBase64")]
    pub content_base64: String,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
}

/// Result of a `send`, per spec §4.3.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

fn build_transport(settings: &ServerSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let builder = match settings.connection {
        ConnectionSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host),
        ConnectionSecurity::StartTls => {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        }
    }
    .map_err(|e| Error::Upstream(format!("failed to build SMTP transport: {e}")))?;

    Ok(builder
        .port(settings.port)
        .credentials(Credentials::new(
            settings.username.clone(),
            settings.password.clone(),
        ))
        .build())
}

/// Authenticate against the SMTP server and disconnect, without
/// sending anything. Used by account creation's optional connectivity
/// test and the `test` endpoint.
pub async fn verify(settings: &ServerSettings) -> Result<()> {
    let transport = build_transport(settings)?;
    let ok = transport
        .test_connection()
        .await
        .map_err(|e| Error::Upstream(format!("SMTP connection test failed: {e}")))?;
    if ok {
        Ok(())
    } else {
        Err(Error::AuthFailure)
    }
}

/// Send `msg`. The `From` address is `settings.username` — the source
/// reads `primaryEmail` and `smtp.username` as distinct fields but
/// always sends as `smtp.username`; that behavior is preserved here
/// rather than switched to `primaryEmail`.
pub async fn send(settings: &ServerSettings, msg: &OutboundMessage) -> Result<SendResult> {
    if msg.to.is_empty() {
        return Err(Error::Validation("to must be a non-empty list".into()));
    }

    let from: Mailbox = settings
        .username
        .parse()
        .map_err(|e| Error::Validation(format!("smtp.username is not a valid mailbox: {e}")))?;

    let mut builder = Message::builder().from(from).subject(msg.subject.clone());
    for addr in &msg.to {
        builder = builder.to(parse_mailbox(addr)?);
    }
    for addr in &msg.cc {
        builder = builder.cc(parse_mailbox(addr)?);
    }
    for addr in &msg.bcc {
        builder = builder.bcc(parse_mailbox(addr)?);
    }

    let email = assemble_body(builder, msg)?;

    let transport = build_transport(settings)?;
    let response = transport
        .send(email)
        .await
        .map_err(|e| Error::Upstream(format!("send failed: {e}")))?;

    if !response.is_positive() {
        return Err(Error::Upstream(format!(
            "SMTP server rejected message: {}",
            response.code()
        )));
    }

    let mut recipients = msg.to.clone();
    recipients.extend(msg.cc.iter().cloned());
    recipients.extend(msg.bcc.iter().cloned());

    Ok(SendResult {
        message_id: ulid::Ulid::new().to_string(),
        accepted: recipients,
        rejected: Vec::new(),
    })
}

fn parse_mailbox(addr: &str) -> Result<Mailbox> {
    addr.parse()
        .map_err(|e| Error::Validation(format!("{addr} is not a well-formed address: {e}")))
}

fn assemble_body(builder: lettre::message::MessageBuilder, msg: &OutboundMessage) -> Result<Message> {
    let attachments = msg
        .attachments
        .iter()
        .map(to_attachment_part)
        .collect::<Result<Vec<_>>>()?;

    let content = match (&msg.text, &msg.html) {
        (Some(text), Some(html)) => MultiPart::alternative_plain_html(text.clone(), html.clone()),
        (Some(text), None) => MultiPart::mixed().singlepart(SinglePart::plain(text.clone())),
        (None, Some(html)) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
        (None, None) => {
            return Err(Error::Validation("at least one of text/html is required".into()));
        }
    };

    let with_attachments = attachments
        .into_iter()
        .fold(MultiPart::mixed().multipart(content), MultiPart::singlepart);

    builder
        .multipart(with_attachments)
        .map_err(|e| Error::Validation(format!("failed to assemble message: {e}")))
}

fn to_attachment_part(att: &OutboundAttachment) -> Result<SinglePart> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&att.content_base64)
        .map_err(|e| Error::Validation(format!("attachment {} is not valid base64: {e}", att.filename)))?;

    let content_type = att
        .content_type
        .as_deref()
        .unwrap_or("application/octet-stream");
    let content_type = ContentType::parse(content_type)
        .map_err(|e| Error::Validation(format!("invalid content type for {}: {e}", att.filename)))?;

    Ok(Attachment::new(att.filename.clone()).body(bytes, content_type))
}
