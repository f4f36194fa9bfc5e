//! Repository list parsing.
//!
//! The list is plain text, one clone URL per line. Blank lines and lines
//! starting with `#` are ignored. Every other line must yield a repository
//! name, otherwise the whole load fails: a typo must never silently shrink
//! backup coverage.

pub mod credentials;

use crate::report::render::SUMMARY_DIR;
use crate::utils::errors::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A repository to mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    /// Filesystem-safe name derived from the URL's last path segment
    pub name: String,

    /// Clone URL exactly as listed (no credentials)
    pub source_url: String,
}

impl RepositoryDescriptor {
    pub fn from_url(source_url: &str) -> Result<Self> {
        let source_url = source_url.trim();
        let name = extract_repo_name(source_url).ok_or_else(|| {
            MirrorError::Config(format!(
                "cannot derive repository name from '{}'",
                source_url
            ))
        })?;

        // `backups/summary/` holds run reports
        if name == SUMMARY_DIR {
            return Err(MirrorError::Config(format!(
                "repository name '{}' is reserved: {}",
                name, source_url
            )));
        }

        Ok(Self {
            name,
            source_url: source_url.to_string(),
        })
    }
}

/// Read and parse the repository list file.
pub fn load_repository_list(path: &Path) -> Result<Vec<RepositoryDescriptor>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MirrorError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_repository_list(&content)
}

/// Parse list content into descriptors, in file order.
pub fn parse_repository_list(content: &str) -> Result<Vec<RepositoryDescriptor>> {
    let mut repos = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let repo = RepositoryDescriptor::from_url(line).map_err(|e| match e {
            MirrorError::Config(msg) => MirrorError::Config(format!("line {}: {}", idx + 1, msg)),
            other => other,
        })?;
        repos.push(repo);
    }

    if repos.is_empty() {
        return Err(MirrorError::Config(
            "no repositories found in repository list".to_string(),
        ));
    }

    Ok(repos)
}

/// Derive the repository name from either `scheme://host/owner/repo(.git)`
/// or the `user@host:owner/repo(.git)` shorthand.
///
/// Both forms need at least an owner and a repository segment.
pub fn extract_repo_name(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let path = match url.split_once("://") {
        Some((scheme, rest)) => {
            if scheme.is_empty() {
                return None;
            }
            // Drop the host; whatever follows is the repository path.
            let (_host, path) = rest.split_once('/')?;
            path
        }
        None => {
            let (host, path) = url.split_once(':')?;
            if host.is_empty() || host.contains('/') {
                return None;
            }
            path
        }
    };

    let segments: Vec<&str> = path
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() < 2 {
        return None;
    }

    let last = segments[segments.len() - 1];
    let last = last.strip_suffix(".git").unwrap_or(last);
    let name = sanitize_path_component(last);

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name)
}

/// Keep only `[A-Za-z0-9._-]`.
pub fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_repo_name() {
        let cases = [
            ("https://github.com/acme/TrinityAI.git", Some("TrinityAI")),
            ("https://github.com/acme/PageAI", Some("PageAI")),
            ("https://github.com/acme/PageAI/", Some("PageAI")),
            ("https://gitlab.example.com/group/sub/deep.git", Some("deep")),
            ("git@github.com:acme/TestRepo.git", Some("TestRepo")),
            ("git@github.com:acme/AnotherRepo", Some("AnotherRepo")),
            ("invalid-url", None),
            ("https://github.com/", None),
            ("https://github.com/onlyowner", None),
            ("git@github.com:repo.git", None),
            ("", None),
        ];

        for (url, expected) in cases {
            assert_eq!(extract_repo_name(url).as_deref(), expected, "url: {url}");
        }
    }

    #[test]
    fn test_reserved_summary_name_rejected() {
        let err = RepositoryDescriptor::from_url("https://example.com/org/summary.git").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("reserved"));

        let err = parse_repository_list("https://example.com/org/repoA.git\ngit@example.com:org/summary\n")
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));

        // Only the exact name is reserved
        assert!(RepositoryDescriptor::from_url("https://example.com/org/summary-tools.git").is_ok());
    }

    #[test]
    fn test_name_is_sanitized() {
        assert_eq!(
            extract_repo_name("https://example.com/org/we%20ird$name.git").as_deref(),
            Some("we20irdname")
        );
        assert_eq!(extract_repo_name("https://example.com/org/..").as_deref(), None);
        assert_eq!(extract_repo_name("https://example.com/org/$$$").as_deref(), None);
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let content = "https://example.com/org/repoA.git\n# comment\n\nhttps://example.com/org/repoB.git";
        let repos = parse_repository_list(content).unwrap();

        let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["repoA", "repoB"]);
        assert_eq!(repos[0].source_url, "https://example.com/org/repoA.git");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let repos = parse_repository_list("   https://example.com/org/spaced.git  \r\n\t# indented comment\n").unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].source_url, "https://example.com/org/spaced.git");
    }

    #[test]
    fn test_parse_empty_is_config_error() {
        assert!(matches!(parse_repository_list(""), Err(MirrorError::Config(_))));
        assert!(matches!(
            parse_repository_list("# only a comment\n\n# another\n"),
            Err(MirrorError::Config(_))
        ));
    }

    #[test]
    fn test_parse_malformed_line_aborts_load() {
        let content = "https://example.com/org/good.git\nnot-a-url\nhttps://example.com/org/other.git";
        let err = parse_repository_list(content).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repositories.txt");
        std::fs::write(
            &path,
            "https://github.com/acme/TrinityAI.git\n# c\nhttps://github.com/acme/PageAI.git\n\ngit@github.com:acme/TestRepo.git\n",
        )
        .unwrap();

        let repos = load_repository_list(&path).unwrap();
        let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["TrinityAI", "PageAI", "TestRepo"]);

        assert!(load_repository_list(&temp_dir.path().join("missing.txt")).is_err());
    }
}
