//! Cache key computation
//!
//! Pure functions only: no I/O, no error conditions. Same inputs always
//! produce the same key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the SHA-256 digest (64 bits)
pub const KEY_HEX_LEN: usize = 16;

/// Domain prefix so key digests never collide with plain content hashes
const KEY_DOMAIN: &[u8] = b"strata-layer-key-v1";

/// Deterministic identifier for a layer's build inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key as a string (16 lowercase hex chars)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Image tag for this key under the given namespace (`<namespace>:<key>`)
    pub fn image_tag(&self, namespace: &str) -> String {
        format!("{}:{}", namespace, self.0)
    }

    /// Parse a key previously rendered with `as_str`.
    ///
    /// Returns `None` unless the input is exactly `KEY_HEX_LEN` lowercase hex chars.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == KEY_HEX_LEN
            && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| Self(s.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a layer is built on top of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyParent<'a> {
    /// Another cached layer
    Layer(&'a CacheKey),
    /// An external base image (tag or digest)
    BaseImage(&'a str),
}

impl KeyParent<'_> {
    fn identity(&self) -> String {
        match self {
            Self::Layer(key) => format!("layer:{}", key),
            Self::BaseImage(image) => format!("base:{}", image),
        }
    }
}

/// Full SHA-256 of some content, hex encoded
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Compute the cache key for a layer.
///
/// Each field is length-prefixed so that moving bytes between the script
/// and the template can never produce the same digest input.
pub fn compute_key(parent: KeyParent<'_>, script: &str, template: &str) -> CacheKey {
    let parent_id = parent.identity();
    let script_hash = content_hash(script.as_bytes());
    let template_hash = content_hash(template.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(KEY_DOMAIN);
    for field in [parent_id.as_str(), &script_hash, &template_hash] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }

    let digest = hasher.finalize();
    CacheKey(hex::encode(&digest[..KEY_HEX_LEN / 2]))
}

/// Whether a cached script has no effective commands.
///
/// Blank lines, comments, and a shebang do not count. An empty cached
/// phase means caching is not configured for that layer.
pub fn is_noop_script(script: &str) -> bool {
    script
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}
