//! Content-addressed cache keys for image layers
//!
//! A layer's key is derived from its parent identity, its cached-phase
//! script, and the build-instruction template that wraps the script.
//! Keys are composable: a child key hashes its parent's key, so a change
//! anywhere below a layer invalidates it.
//!
//! # Key inputs
//!
//! | Input | Hashed as |
//! |-------|-----------|
//! | Parent | `layer:<key>` or `base:<image ref>` |
//! | Script | SHA-256 of the script bytes |
//! | Template | SHA-256 of the template bytes |

pub mod key;

pub use key::{compute_key, content_hash, is_noop_script, CacheKey, KeyParent, KEY_HEX_LEN};
