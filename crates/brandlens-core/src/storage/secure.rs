//! Encrypted-at-rest credential storage.
//!
//! Values are sealed with ChaCha20-Poly1305 into an `enc:v1:` envelope and
//! filed under a keyed hash of the logical key, so the underlying medium
//! exposes neither plaintext keys nor plaintext values. Reads transparently
//! migrate legacy plaintext entries: try sealed, on miss try the legacy key,
//! on a hit write the sealed form and delete the plaintext copy. Decryption
//! failures (tampered or foreign data) are treated as "value absent", never
//! as an error, so callers cannot crash on malformed storage content.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::medium::SharedMedium;
use crate::constants::legacy;
use crate::models::{Application, Product};

const ENVELOPE_PREFIX: &str = "enc:v1:";

/// Cipher material shared by both scopes, derived from the configured secret.
#[derive(Clone)]
pub(crate) struct CipherKey {
    key: [u8; 32],
    secret: String,
}

impl CipherKey {
    pub(crate) fn derive(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self {
            key,
            secret: secret.to_string(),
        }
    }

    /// The physical storage key for a logical field name.
    fn physical_key(&self, logical: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(logical.as_bytes());
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn seal(&self, plaintext: &str) -> Option<String> {
        let nonce_source = Uuid::new_v4().into_bytes();
        let nonce = Nonce::from_slice(&nonce_source[..12]);
        let aead = ChaCha20Poly1305::new_from_slice(&self.key).ok()?;
        let ciphertext = aead.encrypt(nonce, plaintext.as_bytes()).ok()?;
        Some(format!(
            "{ENVELOPE_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(&nonce_source[..12]),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    /// Opens an `enc:v1:` envelope. Any malformed or undecryptable input is
    /// `None`.
    fn open(&self, stored: &str) -> Option<String> {
        let rest = stored.strip_prefix(ENVELOPE_PREFIX)?;
        let (nonce_b64, ciphertext_b64) = rest.split_once(':')?;
        let nonce_raw = URL_SAFE_NO_PAD.decode(nonce_b64.as_bytes()).ok()?;
        if nonce_raw.len() != 12 {
            return None;
        }
        let ciphertext = URL_SAFE_NO_PAD.decode(ciphertext_b64.as_bytes()).ok()?;
        let aead = ChaCha20Poly1305::new_from_slice(&self.key).ok()?;
        let plaintext = aead.decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref()).ok()?;
        String::from_utf8(plaintext).ok()
    }
}

/// One encrypted storage scope over an arbitrary medium.
///
/// Instantiated twice by [`CredentialStore`]: once over the session-lifetime
/// medium, once over the persistent one. The legacy medium is where the old
/// unencrypted representation of the same fields lives.
pub struct EncryptedScope {
    medium: SharedMedium,
    legacy: SharedMedium,
    cipher: CipherKey,
}

impl EncryptedScope {
    pub(crate) fn new(medium: SharedMedium, legacy: SharedMedium, cipher: CipherKey) -> Self {
        Self {
            medium,
            legacy,
            cipher,
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Some(sealed) = self.cipher.seal(value) {
            self.medium.set(&self.cipher.physical_key(key), &sealed);
        }
    }

    /// Sealed read with upgrade-then-return legacy fallback. Absence is an
    /// empty string.
    pub fn get(&self, key: &str) -> String {
        if let Some(stored) = self.medium.get(&self.cipher.physical_key(key)) {
            if let Some(value) = self.cipher.open(&stored) {
                return value;
            }
            tracing::warn!(key, "discarding undecryptable credential entry");
        }
        if let Some(plain) = self.legacy.get(key) {
            self.set(key, &plain);
            self.legacy.remove(key);
            return plain;
        }
        String::new()
    }

    /// Removes the sealed entry and any lingering legacy plaintext copy.
    pub fn remove(&self, key: &str) {
        self.medium.remove(&self.cipher.physical_key(key));
        self.legacy.remove(key);
    }
}

/// Named credential fields over the two scopes.
///
/// The bearer access token is session-scope (gone when the process exits);
/// identity fields and the bulk application/product lists are persistent.
pub struct CredentialStore {
    session: EncryptedScope,
    persistent: EncryptedScope,
}

const SESSION_FIELDS: &[&str] = &[legacy::ACCESS_TOKEN];
const PERSISTENT_FIELDS: &[&str] = &[
    legacy::SESSION_ID,
    legacy::USER_ID,
    legacy::APPLICATION_ID,
    legacy::FIRST_NAME,
    legacy::APPLICATIONS,
    legacy::PRODUCTS,
];

impl CredentialStore {
    /// `persistent` doubles as the legacy location for every field: the old
    /// representation kept everything, token included, as plaintext there.
    pub fn new(persistent: SharedMedium, session: SharedMedium, secret: &str) -> Self {
        let cipher = CipherKey::derive(secret);
        Self {
            session: EncryptedScope::new(session, persistent.clone(), cipher.clone()),
            persistent: EncryptedScope::new(persistent.clone(), persistent, cipher),
        }
    }

    pub fn set_access_token(&self, value: &str) {
        self.session.set(legacy::ACCESS_TOKEN, value);
    }

    pub fn access_token(&self) -> String {
        self.session.get(legacy::ACCESS_TOKEN)
    }

    pub fn set_session_id(&self, value: &str) {
        self.persistent.set(legacy::SESSION_ID, value);
    }

    pub fn session_id(&self) -> String {
        self.persistent.get(legacy::SESSION_ID)
    }

    pub fn set_user_id(&self, value: &str) {
        self.persistent.set(legacy::USER_ID, value);
    }

    pub fn user_id(&self) -> String {
        self.persistent.get(legacy::USER_ID)
    }

    pub fn set_application_id(&self, value: &str) {
        self.persistent.set(legacy::APPLICATION_ID, value);
    }

    pub fn application_id(&self) -> String {
        self.persistent.get(legacy::APPLICATION_ID)
    }

    pub fn set_first_name(&self, value: &str) {
        self.persistent.set(legacy::FIRST_NAME, value);
    }

    pub fn first_name(&self) -> String {
        self.persistent.get(legacy::FIRST_NAME)
    }

    pub fn set_applications(&self, applications: &[Application]) {
        if let Ok(json) = serde_json::to_string(applications) {
            self.persistent.set(legacy::APPLICATIONS, &json);
        }
    }

    pub fn applications(&self) -> Vec<Application> {
        let raw = self.persistent.get(legacy::APPLICATIONS);
        serde_json::from_str(&raw).unwrap_or_default()
    }

    pub fn set_products(&self, products: &[Product]) {
        if let Ok(json) = serde_json::to_string(products) {
            self.persistent.set(legacy::PRODUCTS, &json);
        }
    }

    pub fn products(&self) -> Vec<Product> {
        let raw = self.persistent.get(legacy::PRODUCTS);
        serde_json::from_str(&raw).unwrap_or_default()
    }

    /// Removes every credential field from both scopes, legacy plaintext
    /// locations included. Tolerant of keys that were never set.
    pub fn clear_all(&self) {
        for key in SESSION_FIELDS {
            self.session.remove(key);
        }
        for key in PERSISTENT_FIELDS {
            self.persistent.remove(key);
        }
    }
}
