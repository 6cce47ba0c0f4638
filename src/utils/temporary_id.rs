//! Deterministic Temporary Id Generation
//!
//! Companies that no tier can resolve still need a stable identifier so the
//! batch completes without nulls. The id is an HMAC-SHA1 of the normalized name
//! keyed by a configured salt, truncated to 10 bytes and base32 encoded:
//! `IN_` followed by exactly 16 characters.
//!
//! Only the normalized name is ever hashed, so every spelling that normalizes to
//! the same key shares one temporary id, across runs and restarts.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::warn;

use crate::config::defaults::DEFAULT_DEV_SALT;
use crate::errors::{ResolutionError, ResolutionResult};
use crate::models::TEMP_ID_PREFIX;
use crate::normalization::NameNormalizer;

type HmacSha1 = Hmac<Sha1>;

/// Number of digest bytes kept; 10 bytes encode to 16 base32 characters
const DIGEST_BYTES: usize = 10;

/// Length of the encoded part following the `IN_` prefix
pub const TEMP_ID_BODY_LEN: usize = 16;

/// Generator for deterministic placeholder company ids
#[derive(Clone)]
pub struct TemporaryIdGenerator {
    salt: String,
    normalizer: NameNormalizer,
}

impl std::fmt::Debug for TemporaryIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryIdGenerator")
            .field("salt", &"<redacted>")
            .field("normalizer", &self.normalizer)
            .finish()
    }
}

impl TemporaryIdGenerator {
    /// Create a generator; an empty salt is fatal, the development salt only warns
    pub fn new(salt: impl Into<String>, normalizer: NameNormalizer) -> ResolutionResult<Self> {
        let salt = salt.into();
        if salt.trim().is_empty() {
            return Err(ResolutionError::MissingSalt);
        }
        if salt == DEFAULT_DEV_SALT {
            warn!(
                "Temporary id salt is the development default; set resolution.salt before production use"
            );
        }
        Ok(Self { salt, normalizer })
    }

    /// Temporary id for a raw name (normalized first)
    pub fn generate(&self, raw_name: &str) -> ResolutionResult<String> {
        self.generate_from_normalized(&self.normalizer.normalize(raw_name))
    }

    /// Temporary id for a name that is already normalized
    pub fn generate_from_normalized(&self, normalized_name: &str) -> ResolutionResult<String> {
        let mut mac = HmacSha1::new_from_slice(self.salt.as_bytes())
            .map_err(|e| ResolutionError::internal(format!("HMAC key rejected: {e}")))?;
        mac.update(normalized_name.as_bytes());
        let digest = mac.finalize().into_bytes();
        let encoded = BASE32_NOPAD.encode(&digest[..DIGEST_BYTES]);
        Ok(format!("{TEMP_ID_PREFIX}{encoded}"))
    }

    pub fn normalizer(&self) -> &NameNormalizer {
        &self.normalizer
    }
}

/// One-shot helper using the default normalizer
pub fn generate_temp_id(raw_name: &str, salt: &str) -> ResolutionResult<String> {
    TemporaryIdGenerator::new(salt, NameNormalizer::default())?.generate(raw_name)
}
