//! Token injection into clone URLs and removal from the mirror afterwards.
//!
//! `git clone --mirror` records the URL it was given as `remote.origin.url`,
//! so the token ends up in the mirror's `config`. It has to be scrubbed
//! before the mirror is sized or archived.

use crate::utils::errors::{MirrorError, Result};
use std::path::{Path, PathBuf};

/// Build the authenticated clone URL for `source_url`.
///
/// `https://host/org/repo.git` becomes `https://<token>@host/org/repo.git`
/// (any existing user-info is replaced). The `git@host:org/repo.git`
/// shorthand is rewritten into the equivalent `https://` form.
pub fn authenticated_url(source_url: &str, token: &str) -> Result<String> {
    let source_url = source_url.trim();

    if let Some((scheme, rest)) = source_url.split_once("://") {
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, Some(path)),
            None => (rest, None),
        };
        let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        if host.is_empty() {
            return Err(MirrorError::Config(format!("URL has no host: {}", source_url)));
        }

        let mut url = format!("{}://{}@{}", scheme, token, host);
        if let Some(path) = path {
            url.push('/');
            url.push_str(path);
        }
        return Ok(url);
    }

    if let Some((authority, path)) = source_url.split_once(':') {
        let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        if !host.is_empty() && !host.contains('/') && !path.is_empty() {
            return Ok(format!(
                "https://{}@{}/{}",
                token,
                host,
                path.trim_start_matches('/')
            ));
        }
    }

    Err(MirrorError::Config(format!(
        "unsupported repository URL: {}",
        source_url
    )))
}

/// Locate the client configuration inside a mirror (bare or working copy).
pub fn mirror_config_path(mirror_dir: &Path) -> Option<PathBuf> {
    [mirror_dir.join("config"), mirror_dir.join(".git").join("config")]
        .into_iter()
        .find(|p| p.is_file())
}

/// Remove `<token>@` from the mirror's client configuration.
///
/// Returns the number of occurrences removed. A missing configuration file
/// is an error; callers treat it as a warning, not a failed backup.
pub fn scrub_credentials(mirror_dir: &Path, token: &str) -> Result<usize> {
    let config_path = mirror_config_path(mirror_dir).ok_or_else(|| {
        MirrorError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no client config under {}", mirror_dir.display()),
        ))
    })?;

    let content = std::fs::read_to_string(&config_path)?;
    let needle = format!("{}@", token);
    let count = content.matches(&needle).count();

    if count > 0 {
        std::fs::write(&config_path, content.replace(&needle, ""))?;
    }

    Ok(count)
}

/// Mask every occurrence of `token` in free-form text (client output, errors).
pub fn redact(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, "***")
}
