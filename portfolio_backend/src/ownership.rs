use crate::config::PortfolioPaths;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const KEY_DERIVATION_CONTEXT: &str = "portfolio_backend 2024-06 comment ownership tokens";

/// Server-held key that signs comment identifiers. The token handed to the
/// author at creation time is the only thing that authorizes later edits
/// and deletes of that comment.
#[derive(Clone)]
pub struct OwnershipKey {
    key: [u8; 32],
}

impl fmt::Debug for OwnershipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OwnershipKey(<redacted>)")
    }
}

impl OwnershipKey {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    pub fn derive_from_secret(secret: &str) -> Self {
        Self {
            key: blake3::derive_key(KEY_DERIVATION_CONTEXT, secret.as_bytes()),
        }
    }

    pub fn issue(&self, comment_id: &str) -> String {
        blake3::keyed_hash(&self.key, comment_id.as_bytes())
            .to_hex()
            .to_string()
    }

    /// `blake3::Hash` equality is constant-time.
    pub fn verify(&self, comment_id: &str, token: &str) -> bool {
        let Ok(presented) = blake3::Hash::from_hex(token.trim()) else {
            return false;
        };
        blake3::keyed_hash(&self.key, comment_id.as_bytes()) == presented
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredOwnershipKey {
    version: u8,
    secret_key_b64: String,
}

/// Loads the ownership key, creating it on first start. A configured secret
/// takes precedence over the key file. Returns whether a new key was written.
pub fn ensure_ownership_key(paths: &PortfolioPaths, secret: Option<&str>) -> Result<(OwnershipKey, bool)> {
    if let Some(secret) = secret {
        return Ok((OwnershipKey::derive_from_secret(secret), false));
    }

    if paths.ownership_key_path.exists() {
        match load_key(&paths.ownership_key_path) {
            Ok(key) => return Ok((key, false)),
            Err(err) => {
                tracing::warn!(
                    path = %paths.ownership_key_path.display(),
                    error = ?err,
                    "ownership key unreadable; generating a new one (existing tokens stop working)"
                );
            }
        }
    }

    let key = OwnershipKey::generate();
    let stored = StoredOwnershipKey {
        version: 1,
        secret_key_b64: BASE64.encode(key.key),
    };
    if let Some(parent) = paths.ownership_key_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
        tighten_permissions(parent);
    }
    let json = serde_json::to_string_pretty(&stored)?;
    fs::write(&paths.ownership_key_path, json).with_context(|| {
        format!(
            "failed to write ownership key {}",
            paths.ownership_key_path.display()
        )
    })?;
    tighten_permissions(&paths.ownership_key_path);
    Ok((key, true))
}

fn load_key(path: &Path) -> Result<OwnershipKey> {
    let contents = fs::read_to_string(path)?;
    let stored: StoredOwnershipKey = serde_json::from_str(&contents)?;
    let bytes = BASE64.decode(stored.secret_key_b64.as_bytes())?;
    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("ownership key must be 32 bytes, found {}", bytes.len()))?;
    Ok(OwnershipKey::from_bytes(key))
}

fn tighten_permissions(path: &Path) {
    #[cfg(unix)]
    {
        let perms = if path.is_dir() {
            fs::Permissions::from_mode(0o700)
        } else {
            fs::Permissions::from_mode(0o600)
        };
        if let Err(err) = fs::set_permissions(path, perms) {
            tracing::warn!(path = %path.display(), error = ?err, "failed to tighten permissions");
        }
    }
}
