//! Account store (spec §4.2): Create/List/Get/Update/Delete against a
//! remote key-value backend, plus the per-tenant index.
//!
//! The HTTP layer and tests depend on the `AccountStore` trait, not on
//! Redis directly, mirroring the teacher's habit of keeping IMAP
//! session construction behind a narrow function boundary
//! (`connection::connect`) rather than threading a concrete type
//! through every caller.

use crate::config::MasterKey;
use crate::crypto;
use crate::error::{Error, Result};
use crate::model::{
    AccountDetail, AccountRecord, AccountSummary, RedactedServerSettings, Secret, SecretView,
};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use ulid::Ulid;

fn account_key(id: &str) -> String {
    format!("acc:{id}")
}

fn tenant_key(tenant_id: &str) -> String {
    format!("tenant:{tenant_id}:accounts")
}

/// Create/List/Get/Update/Delete over encrypted `AccountRecord`s.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, tenant_id: &str, secret: &Secret, master: &MasterKey) -> Result<String>;
    async fn list(&self, tenant_id: &str, master: &MasterKey) -> Result<Vec<AccountSummary>>;
    async fn get(&self, account_id: &str, include_passwords: bool, master: &MasterKey)
    -> Result<AccountDetail>;
    async fn update(&self, account_id: &str, new_secret: &Secret, master: &MasterKey) -> Result<()>;
    async fn delete(&self, account_id: &str) -> Result<()>;

    /// Fetch and decrypt the server settings for IMAP/SMTP operations,
    /// without the list/detail masking logic.
    async fn load_secret(&self, account_id: &str, master: &MasterKey) -> Result<(Secret, String)>;
}

/// Redis-backed `AccountStore` (spec §4.2, §6.2).
pub struct RedisAccountStore {
    conn: ConnectionManager,
}

impl RedisAccountStore {
    /// Connect to `store_url`, authenticating with `store_token`.
    pub async fn connect(store_url: &str, store_token: &str) -> Result<Self> {
        let mut info: redis::ConnectionInfo = store_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid STORE_URL: {e}")))?;
        if !store_token.is_empty() {
            info.redis.password = Some(store_token.to_string());
        }
        let client = redis::Client::open(info)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    async fn read_record(&self, account_id: &str) -> Result<AccountRecord> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(account_key(account_id)).await?;
        let raw = raw.ok_or(Error::NotFound)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Upstream(format!("corrupt account record {account_id}: {e}")))
    }

    async fn write_record(&self, record: &AccountRecord) -> Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(record)
            .map_err(|e| Error::Validation(format!("record serialization failed: {e}")))?;
        let () = conn.set(account_key(&record.id), raw).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for RedisAccountStore {
    async fn create(&self, tenant_id: &str, secret: &Secret, master: &MasterKey) -> Result<String> {
        secret.validate()?;
        let id = Ulid::new().to_string();
        let now = chrono::Utc::now();
        let aad = format!("{id}:{tenant_id}");
        let enc = crypto::seal(secret, &aad, master)?;

        let record = AccountRecord {
            id: id.clone(),
            tenant_id: tenant_id.to_string(),
            created_at: now,
            updated_at: now,
            enc,
        };
        self.write_record(&record).await?;

        let mut conn = self.conn.clone();
        let () = conn.sadd(tenant_key(tenant_id), &id).await?;
        Ok(id)
    }

    async fn list(&self, tenant_id: &str, master: &MasterKey) -> Result<Vec<AccountSummary>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(tenant_key(tenant_id)).await?;

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(record) = self.read_record(&id).await else {
                continue;
            };
            let secret = crypto::open(&record.enc, &record.aad(), master)?;
            summaries.push(AccountSummary {
                id: record.id,
                tenant_id: record.tenant_id,
                label: secret.label,
                primary_email_masked: crate::model::mask_email(&secret.primary_email),
                created_at: record.created_at,
                updated_at: record.updated_at,
            });
        }
        Ok(summaries)
    }

    async fn get(
        &self,
        account_id: &str,
        include_passwords: bool,
        master: &MasterKey,
    ) -> Result<AccountDetail> {
        let record = self.read_record(account_id).await?;
        let secret = crypto::open(&record.enc, &record.aad(), master)?;

        let view = if include_passwords {
            SecretView::Full(secret)
        } else {
            SecretView::Redacted {
                label: secret.label,
                primary_email: secret.primary_email,
                imap: RedactedServerSettings::from(&secret.imap),
                smtp: RedactedServerSettings::from(&secret.smtp),
            }
        };

        Ok(AccountDetail {
            id: record.id,
            tenant_id: record.tenant_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            secret: view,
        })
    }

    async fn update(&self, account_id: &str, new_secret: &Secret, master: &MasterKey) -> Result<()> {
        new_secret.validate()?;
        let mut record = self.read_record(account_id).await?;
        let aad = record.aad();
        record.enc = crypto::seal(new_secret, &aad, master)?;
        record.updated_at = chrono::Utc::now();
        self.write_record(&record).await
    }

    async fn delete(&self, account_id: &str) -> Result<()> {
        let Ok(record) = self.read_record(account_id).await else {
            return Ok(());
        };
        let mut conn = self.conn.clone();
        let () = conn.del(account_key(account_id)).await?;
        let () = conn.srem(tenant_key(&record.tenant_id), account_id).await?;
        Ok(())
    }

    async fn load_secret(&self, account_id: &str, master: &MasterKey) -> Result<(Secret, String)> {
        let record = self.read_record(account_id).await?;
        let secret = crypto::open(&record.enc, &record.aad(), master)?;
        Ok((secret, record.tenant_id))
    }
}
