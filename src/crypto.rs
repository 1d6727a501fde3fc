//! Authenticated envelope encryption for `Secret` payloads (spec §4.1)
//!
//! Scheme: HKDF-SHA256 derives a fresh 32-byte subkey per record from
//! the master key and a random salt, then AES-256-GCM seals the
//! canonical JSON of a `Secret` under that subkey with a 12-byte IV, a
//! 16-byte tag, and associated data bound to `"{accountId}:{tenantId}"`.
//! HKDF per record means a compromised salt/iv pair does not reduce
//! the security margin of any other record; binding the AAD to the
//! account/tenant pair makes a record silently reassigned between
//! accounts fail authentication instead of decrypting.

use crate::config::MasterKey;
use crate::error::{Error, Result};
use crate::model::Secret;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

const HKDF_INFO: &[u8] = b"mailbox:v1";
const ENVELOPE_VERSION: u32 = 1;
const ALGORITHM: &str = "AES-256-GCM";

/// Ciphertext container for a `Secret` (spec §3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub algorithm: String,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
    #[serde(with = "b64")]
    pub ct: Vec<u8>,
}

mod b64 {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

fn derive_subkey(master: &MasterKey, salt: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(salt), &master.0);
    let mut subkey = [0u8; 32];
    hk.expand(HKDF_INFO, &mut subkey)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    subkey
}

/// Encrypt `secret`, binding it to `aad` (`"{accountId}:{tenantId}"`).
///
/// # Errors
///
/// Never fails in practice (AES-256-GCM encryption with a correctly
/// sized key cannot fail); returns `Result` for symmetry with `open`.
pub fn seal(secret: &Secret, aad: &str, master: &MasterKey) -> Result<Envelope> {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut iv);

    let subkey = derive_subkey(master, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&subkey));
    let nonce = Nonce::from_slice(&iv);

    let plaintext =
        serde_json::to_vec(secret).map_err(|e| Error::Validation(format!("secret serialization failed: {e}")))?;

    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: &plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| Error::AuthFailure)?;

    // aes-gcm appends the 16-byte tag to the ciphertext; split it back
    // out so the envelope carries ciphertext and tag as distinct
    // fields, per spec §3.
    let tag_start = sealed.len() - 16;
    let (ct, tag) = sealed.split_at(tag_start);

    Ok(Envelope {
        version: ENVELOPE_VERSION,
        algorithm: ALGORITHM.to_string(),
        salt: salt.to_vec(),
        iv: iv.to_vec(),
        tag: tag.to_vec(),
        ct: ct.to_vec(),
    })
}

/// Decrypt `envelope`, verifying it was sealed under `aad`.
///
/// # Errors
///
/// Returns `Error::Upstream` (surfaced by callers as `UnsupportedEnvelope`)
/// if `version` or `algorithm` don't match, or `Error::AuthFailure` if
/// the authentication tag doesn't verify — including when `aad` names
/// a different account or tenant than the one the envelope was sealed
/// under (spec I4). No partial plaintext is ever returned.
pub fn open(envelope: &Envelope, aad: &str, master: &MasterKey) -> Result<Secret> {
    if envelope.version != ENVELOPE_VERSION || envelope.algorithm != ALGORITHM {
        return Err(Error::Upstream(format!(
            "unsupported envelope: version={}, algorithm={}",
            envelope.version, envelope.algorithm
        )));
    }

    let subkey = derive_subkey(master, &envelope.salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&subkey));
    let nonce = Nonce::from_slice(&envelope.iv);

    let mut combined = Vec::with_capacity(envelope.ct.len() + envelope.tag.len());
    combined.extend_from_slice(&envelope.ct);
    combined.extend_from_slice(&envelope.tag);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &combined,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| Error::AuthFailure)?;

    serde_json::from_slice(&plaintext).map_err(|_| Error::AuthFailure)
}
