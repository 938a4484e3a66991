//! Build instructions for one cached layer
//!
//! The template text is hashed into every layer key, so any edit here
//! invalidates all cached layers.

use crate::cache::CacheKey;

/// Name of the cached-phase script inside the build context
pub const SCRIPT_NAME: &str = "strata-cached.sh";

/// Label carrying the cache key on built images
pub const KEY_LABEL: &str = "io.strata.cache-key";

/// User the engine runs images as when none is configured
const DEFAULT_USER: &str = "root";

/// Containerfile template. `{parent}`, `{script}`, `{key}`, `{layer}` and
/// `{user}` are substituted by [`render`].
///
/// Setup runs as root, then the base image's user is restored so the task
/// runs as the same user whether or not the layer was baked.
pub const LAYER_TEMPLATE: &str = "\
FROM {parent}
USER root
COPY {script} /tmp/{script}
RUN /bin/sh -e /tmp/{script} && rm -f /tmp/{script}
USER {user}
LABEL io.strata.cache-key={key} io.strata.layer={layer}
";

/// Render the Containerfile for a layer built on `parent`.
///
/// `user` is the base image's configured user; empty means the engine
/// default.
pub fn render(parent: &str, key: &CacheKey, layer: &str, user: &str) -> String {
    let user = match user.trim() {
        "" => DEFAULT_USER,
        user => user,
    };
    LAYER_TEMPLATE
        .replace("{parent}", parent)
        .replace("{script}", SCRIPT_NAME)
        .replace("{key}", &dockerfile_quote(key.as_str()))
        .replace("{layer}", &dockerfile_quote(layer))
        .replace("{user}", user)
}

/// Quote a value for a Containerfile LABEL.
/// Embedded double quotes and backslashes are escaped.
fn dockerfile_quote(value: &str) -> String {
    if value.contains(|c: char| c == '$' || c == '"' || c == '\\' || c.is_whitespace()) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        value.to_string()
    }
}
