//! Git remote URL parsing.
//!
//! Parses git remote URLs into structured components (host, owner, repo).
//! Supports HTTPS, SSH, and git@ URL formats. Used by the Lifecycle Manager
//! to derive a stable repository id and by the push strategy's SSH→HTTPS
//! rewrite for containerized runtimes.

/// Parsed git remote URL with host, owner, and repository components.
///
/// # Supported URL formats
///
/// - `https://<host>/<owner>/<repo>.git`
/// - `http://<host>/<owner>/<repo>.git`
/// - `git@<host>:<owner>/<repo>.git`
/// - `ssh://git@<host>/<owner>/<repo>.git`
/// - `ssh://<host>/<owner>/<repo>.git`
///
/// # Example
///
/// ```
/// use catnip_core::git::GitRemoteUrl;
///
/// let url = GitRemoteUrl::parse("git@github.com:owner/repo.git").unwrap();
/// assert_eq!(url.host(), "github.com");
/// assert_eq!(url.owner(), "owner");
/// assert_eq!(url.repo(), "repo");
/// assert_eq!(url.project_identifier(), "github.com/owner/repo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRemoteUrl {
    host: String,
    owner: String,
    repo: String,
}

impl GitRemoteUrl {
    /// Parse a git remote URL into structured components.
    ///
    /// Every supported scheme reduces to the same shape once its prefix is
    /// peeled off: a `host`, then an `owner/repo[.git]` path, joined by `/`
    /// for the URL-ish forms or by `:` for the scp-like `git@host:path`
    /// form. Everything after that point is one shared extraction.
    ///
    /// Returns `None` for malformed URLs or unsupported formats.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        let (host_and_path, host_sep) = Self::strip_scheme(url)?;

        let (host, path) = host_and_path.split_once(host_sep)?;
        // URLs with ports (ssh://host:2222/...) don't fit the host/owner/repo
        // model and are rejected rather than silently mis-parsed.
        if host.is_empty() || host.contains(':') {
            return None;
        }

        let mut segments = path.trim_matches('/').splitn(2, '/');
        let owner = segments.next().filter(|s| !s.is_empty())?;
        let repo_with_suffix = segments.next().filter(|s| !s.is_empty())?;
        let repo = repo_with_suffix.strip_suffix(".git").unwrap_or(repo_with_suffix);
        if repo.is_empty() {
            return None;
        }

        Some(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Peel off a recognized scheme, returning the remaining `host<sep>path`
    /// text plus the separator that joins `host` to `owner/repo` for that
    /// scheme: `/` for the URL-ish forms, `:` for the scp-like `git@` form.
    fn strip_scheme(url: &str) -> Option<(&str, char)> {
        if let Some(rest) = url.strip_prefix("git@") {
            return Some((rest, ':'));
        }
        if let Some(rest) = url.strip_prefix("ssh://") {
            // `ssh://git@host/owner/repo` carries a userinfo prefix the
            // URL-ish schemes never do; drop it before the shared split.
            return Some((rest.rsplit_once('@').map_or(rest, |(_, host_and_path)| host_and_path), '/'));
        }
        for scheme in ["https://", "http://"] {
            if let Some(rest) = url.strip_prefix(scheme) {
                return Some((rest, '/'));
            }
        }
        None
    }

    /// The hostname (e.g., "github.com", "gitlab.example.com").
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The repository owner or organization (e.g., "owner", "company-org").
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The repository name without .git suffix (e.g., "repo").
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Project identifier in "host/owner/repo" format.
    pub fn project_identifier(&self) -> String {
        format!("{}/{}/{}", self.host, self.owner, self.repo)
    }

    /// Repository catalog id in "<owner>/<repo>" format, as used for
    /// `Repository::id` on remote GitHub repos.
    pub fn repo_id(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Re-render as a canonical `https://` URL.
    pub fn to_https(&self) -> String {
        format!("https://{}/{}/{}.git", self.host, self.owner, self.repo)
    }

    /// Re-render as a canonical `git@host:owner/repo.git` SSH URL.
    pub fn to_ssh(&self) -> String {
        format!("git@{}:{}/{}.git", self.host, self.owner, self.repo)
    }
}

/// Rewrite a `ssh://git@github.com:`-style remote into its `https://github.com/`
/// equivalent, for the containerized push strategy (§4.1). Non-GitHub-SSH
/// inputs pass through unchanged.
pub fn convert_ssh_to_https(url: &str) -> String {
    match GitRemoteUrl::parse(url) {
        Some(parsed) if url.starts_with("ssh://") || url.starts_with("git@") => {
            parsed.to_https()
        }
        _ => url.to_string(),
    }
}

/// Extract owner from a git remote URL.
pub fn parse_remote_owner(url: &str) -> Option<String> {
    GitRemoteUrl::parse(url).map(|u| u.owner().to_string())
}

/// Extract owner and repository name from a git remote URL.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    GitRemoteUrl::parse(url).map(|u| (u.owner().to_string(), u.repo().to_string()))
}

/// Extract hostname from a git remote URL.
pub fn parse_remote_host(url: &str) -> Option<String> {
    GitRemoteUrl::parse(url).map(|u| u.host().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_urls() {
        let url = GitRemoteUrl::parse("https://github.com/owner/repo.git").unwrap();
        assert_eq!(url.host(), "github.com");
        assert_eq!(url.owner(), "owner");
        assert_eq!(url.repo(), "repo");
        assert_eq!(url.project_identifier(), "github.com/owner/repo");
        assert_eq!(url.repo_id(), "owner/repo");

        let url = GitRemoteUrl::parse("https://github.com/owner/repo").unwrap();
        assert_eq!(url.repo(), "repo");

        let url = GitRemoteUrl::parse("  https://github.com/owner/repo.git\n").unwrap();
        assert_eq!(url.owner(), "owner");
    }

    #[test]
    fn test_http_urls() {
        let url = GitRemoteUrl::parse("http://gitlab.internal.company.com/owner/repo.git").unwrap();
        assert_eq!(url.host(), "gitlab.internal.company.com");
        assert_eq!(url.owner(), "owner");
        assert_eq!(url.repo(), "repo");
    }

    #[test]
    fn test_git_at_urls() {
        let url = GitRemoteUrl::parse("git@github.com:owner/repo.git").unwrap();
        assert_eq!(url.host(), "github.com");
        assert_eq!(url.owner(), "owner");
        assert_eq!(url.repo(), "repo");

        let url = GitRemoteUrl::parse("git@github.com:owner/repo").unwrap();
        assert_eq!(url.repo(), "repo");

        let url = GitRemoteUrl::parse("git@gitlab.example.com:owner/repo.git").unwrap();
        assert_eq!(url.host(), "gitlab.example.com");

        let url = GitRemoteUrl::parse("git@bitbucket.org:owner/repo.git").unwrap();
        assert_eq!(url.host(), "bitbucket.org");
    }

    #[test]
    fn test_ssh_urls() {
        let url = GitRemoteUrl::parse("ssh://git@github.com/owner/repo.git").unwrap();
        assert_eq!(url.host(), "github.com");
        assert_eq!(url.owner(), "owner");
        assert_eq!(url.repo(), "repo");

        let url = GitRemoteUrl::parse("ssh://github.com/owner/repo.git").unwrap();
        assert_eq!(url.host(), "github.com");
        assert_eq!(url.owner(), "owner");
    }

    #[test]
    fn test_malformed_urls() {
        assert!(GitRemoteUrl::parse("").is_none());
        assert!(GitRemoteUrl::parse("https://github.com/").is_none());
        assert!(GitRemoteUrl::parse("https://github.com/owner/").is_none());
        assert!(GitRemoteUrl::parse("git@github.com:").is_none());
        assert!(GitRemoteUrl::parse("git@github.com:owner/").is_none());
        assert!(GitRemoteUrl::parse("ftp://github.com/owner/repo.git").is_none());
    }

    #[test]
    fn test_org_repos() {
        let url = GitRemoteUrl::parse("https://github.com/company-org/project.git").unwrap();
        assert_eq!(url.owner(), "company-org");
        assert_eq!(url.repo(), "project");
    }

    #[test]
    fn test_parse_remote_owner() {
        assert_eq!(
            parse_remote_owner("https://github.com/acme/widgets.git"),
            Some("acme".to_string())
        );
        assert_eq!(parse_remote_owner("https://github.com/"), None);
        assert_eq!(parse_remote_owner(""), None);
    }

    #[test]
    fn test_parse_remote_host() {
        assert_eq!(
            parse_remote_host("git@gitlab.example.com:owner/repo.git"),
            Some("gitlab.example.com".to_string())
        );
        assert_eq!(parse_remote_host(""), None);
    }

    #[test]
    fn test_parse_owner_repo() {
        assert_eq!(
            parse_owner_repo("https://github.com/owner/repo.git"),
            Some(("owner".to_string(), "repo".to_string()))
        );
        assert_eq!(parse_owner_repo("https://github.com/owner/"), None);
    }

    #[test]
    fn test_project_identifier() {
        let cases = [
            (
                "https://github.com/acme/widgets.git",
                "github.com/acme/widgets",
            ),
            ("git@github.com:owner/repo.git", "github.com/owner/repo"),
            (
                "ssh://git@gitlab.example.com/org/project.git",
                "gitlab.example.com/org/project",
            ),
        ];

        for (input, expected) in cases {
            let url = GitRemoteUrl::parse(input).unwrap();
            assert_eq!(url.project_identifier(), expected, "input: {input}");
        }
    }

    // P8: ParseGitHubURL ∘ format-as-https is idempotent on well-formed URLs.
    #[test]
    fn https_round_trip_is_idempotent() {
        let original = "https://github.com/acme/widgets.git";
        let parsed = GitRemoteUrl::parse(original).unwrap();
        let rendered = parsed.to_https();
        let reparsed = GitRemoteUrl::parse(&rendered).unwrap();
        assert_eq!(parsed, reparsed);
        assert_eq!(rendered, original);
    }

    #[test]
    fn ssh_to_https_round_trip() {
        let ssh = "git@github.com:acme/widgets.git";
        let https = convert_ssh_to_https(ssh);
        assert_eq!(https, "https://github.com/acme/widgets.git");

        let reparsed_from_ssh = GitRemoteUrl::parse(ssh).unwrap();
        let reparsed_from_https = GitRemoteUrl::parse(&https).unwrap();
        assert_eq!(reparsed_from_ssh, reparsed_from_https);
    }

    #[test]
    fn convert_ssh_to_https_passes_through_non_ssh() {
        let https = "https://github.com/acme/widgets.git";
        assert_eq!(convert_ssh_to_https(https), https);
    }
}
