//! Extension allow-list normalisation.

use crate::error::ConfigError;

/// Normalise a user-supplied extension to `.ext` in lower case.
///
/// Accepts `py`, `.py` and `.PY`. Rejects empty strings, bare dots, path
/// separators, glob wildcards and whitespace.
pub fn normalize_extension(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let invalid = |reason| ConfigError::InvalidExtension {
        extension: raw.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("extension is empty"));
    }

    let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if body.is_empty() {
        return Err(invalid("extension has no characters after the dot"));
    }
    if body.contains('.') {
        return Err(invalid("only the final extension is matched; use e.g. '.gz'"));
    }
    if body.contains('/') || body.contains('\\') {
        return Err(invalid("extension must not contain a path separator"));
    }
    if body.contains(['*', '?', '[', ']', '{', '}']) {
        return Err(invalid("extension must not contain wildcards"));
    }
    if body.chars().any(char::is_whitespace) {
        return Err(invalid("extension must not contain whitespace"));
    }

    Ok(format!(".{}", body.to_lowercase()))
}

/// Normalise a list of extensions, dropping duplicates while keeping order.
pub fn normalize_extensions<I, S>(raw: I) -> Result<Vec<String>, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for ext in raw {
        let normalized = normalize_extension(ext.as_ref())?;
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    Ok(out)
}
