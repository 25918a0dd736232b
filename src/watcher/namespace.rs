// ============================================================================
// chatmod-core - Watcher Namespaces
// ============================================================================

use crate::core::constants::SIGNAL_INFIX;
use crate::core::error::WatcherError;

/// Check that `namespace` can prefix a CSS animation name.
///
/// Accepted: one or more of `[A-Za-z0-9_-]`, not starting with a digit, not
/// starting with `-` followed by a digit, and not `-` alone.
///
/// # Example
///
/// ```
/// use chatmod_core::watcher::validate_namespace;
///
/// assert!(validate_namespace("chatmod").is_ok());
/// assert!(validate_namespace("_x-1").is_ok());
/// assert!(validate_namespace("9lives").is_err());
/// assert!(validate_namespace("-1").is_err());
/// assert!(validate_namespace("has space").is_err());
/// ```
pub fn validate_namespace(namespace: &str) -> Result<(), WatcherError> {
    let invalid = || WatcherError::InvalidNamespace(namespace.to_string());

    let bytes = namespace.as_bytes();
    if bytes.is_empty() || namespace == "-" {
        return Err(invalid());
    }
    if !bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_')
    {
        return Err(invalid());
    }
    match bytes {
        [first, ..] if first.is_ascii_digit() => Err(invalid()),
        [b'-', second, ..] if second.is_ascii_digit() => Err(invalid()),
        _ => Ok(()),
    }
}

/// Animation name for the `n`th selector registered under `namespace`.
pub(crate) fn signal_name(namespace: &str, n: u64) -> String {
    format!("{namespace}{SIGNAL_INFIX}{n}")
}
