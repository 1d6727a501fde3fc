//! Data model for accounts, credentials, and messages (spec §3)

use crate::crypto::Envelope;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Transport security mode for an IMAP or SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionSecurity {
    #[serde(rename = "TLS")]
    Tls,
    #[serde(rename = "STARTTLS")]
    StartTls,
}

/// Connection parameters for one mail server (IMAP or SMTP side).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connection: ConnectionSecurity,
}

impl ServerSettings {
    /// Schema validation: non-empty host/username/password, positive
    /// port (spec §3).
    pub fn validate(&self, role: &str) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Validation(format!("{role}.host must not be empty")));
        }
        if self.port == 0 {
            return Err(Error::Validation(format!("{role}.port must be positive")));
        }
        if self.username.trim().is_empty() {
            return Err(Error::Validation(format!("{role}.username must not be empty")));
        }
        if self.password.is_empty() {
            return Err(Error::Validation(format!("{role}.password must not be empty")));
        }
        Ok(())
    }
}

/// Decrypted credential payload. Never persisted in cleartext, never
/// logged, never transmitted in `list` responses (spec §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub label: Option<String>,
    #[serde(rename = "primaryEmail")]
    pub primary_email: String,
    pub imap: ServerSettings,
    pub smtp: ServerSettings,
}

impl Secret {
    /// Full schema validation (spec §4.2: hostname/port/connection
    /// enum/email shape).
    pub fn validate(&self) -> Result<()> {
        if !is_well_formed_email(&self.primary_email) {
            return Err(Error::Validation("primaryEmail is not a well-formed address".into()));
        }
        self.imap.validate("imap")?;
        self.smtp.validate("smtp")?;
        Ok(())
    }
}

/// Minimal well-formedness check: one `@`, non-empty local and domain
/// parts, domain contains a `.`.
#[must_use]
pub fn is_well_formed_email(addr: &str) -> bool {
    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && domain.contains('.') && !addr.contains(' ')
}

/// Mask an email's local part for list responses (spec §4.2, P3):
/// `first_char + '*'*(n-2) + last_char + '@' + domain`, collapsing to
/// a single visible character when the local part is 1-2 chars long
/// (spec §8 scenario 1's documented boundary).
#[must_use]
pub fn mask_email(addr: &str) -> String {
    let Some((local, domain)) = addr.split_once('@') else {
        return addr.to_string();
    };

    let chars: Vec<char> = local.chars().collect();
    let masked_local = match chars.len() {
        0 => String::new(),
        1 => chars[0].to_string(),
        2 => format!("{}*", chars[0]),
        n => {
            let first = chars[0];
            let last = chars[n - 1];
            let stars: String = std::iter::repeat_n('*', n - 2).collect();
            format!("{first}{stars}{last}")
        }
    };

    format!("{masked_local}@{domain}")
}

/// The unit persisted in the backing store under key `acc:{accountId}`
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub enc: Envelope,
}

impl AccountRecord {
    /// The associated-data tag binding this record's envelope to its
    /// identity (spec I4): `"{accountId}:{tenantId}"`.
    #[must_use]
    pub fn aad(&self) -> String {
        format!("{}:{}", self.id, self.tenant_id)
    }
}

/// Summary returned from `List` — never carries credentials (spec §4.2).
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub label: Option<String>,
    #[serde(rename = "primaryEmailMasked")]
    pub primary_email_masked: String,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Full detail returned from `Get`, with passwords present only when
/// explicitly requested (spec §4.2).
#[derive(Debug, Clone, Serialize)]
pub struct AccountDetail {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub secret: SecretView,
}

/// A `Secret` with passwords either present or redacted, per the
/// `includePasswords` flag (spec §4.2).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SecretView {
    Full(Secret),
    Redacted {
        label: Option<String>,
        #[serde(rename = "primaryEmail")]
        primary_email: String,
        imap: RedactedServerSettings,
        smtp: RedactedServerSettings,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RedactedServerSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(rename = "hasPassword")]
    pub has_password: bool,
    pub connection: ConnectionSecurity,
}

impl From<&ServerSettings> for RedactedServerSettings {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            username: s.username.clone(),
            has_password: !s.password.is_empty(),
            connection: s.connection,
        }
    }
}

/// An email address with optional display name, used in message
/// metadata (spec §3's `MsgMeta` addition).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub name: Option<String>,
    pub email: String,
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => write!(f, "{name} <{}>", self.email),
            _ => write!(f, "{}", self.email),
        }
    }
}

/// Metadata shared by `listRecent`, `fetchOne`, and `EmailReceived`
/// events (spec §4.6 and the SPEC_FULL `MsgMeta` addition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgMeta {
    pub uid: u32,
    pub subject: String,
    pub from: Vec<Address>,
    pub to: Vec<Address>,
    pub date: chrono::DateTime<chrono::Utc>,
    pub flags: Vec<String>,
}

/// Parsed MIME view produced by `fetchOne` (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<AttachmentMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: Option<String>,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
    pub size: usize,
}
