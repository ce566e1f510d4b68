//! Base-path prefixes for modules.
//!
//! Module base paths are matched on whole segments: `/api` owns `/api` and
//! `/api/users` but not `/apix`.

use crate::error::ConfigurationError;

/// Validate and normalize a module base path (no trailing slash except root).
pub fn normalize_base_path(base: &str) -> Result<String, ConfigurationError> {
    if !base.starts_with('/') {
        return Err(ConfigurationError::InvalidBasePath(base.to_string()));
    }
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

/// Path relative to `base`, or `None` if `path` is outside it.
///
/// `base` must be normalized. The result always starts with `/`.
pub fn relative_path<'a>(base: &str, path: &'a str) -> Option<&'a str> {
    if base == "/" {
        return Some(path);
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
