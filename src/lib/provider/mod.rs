//! Forge providers and the contract each one implements.
//!
//! A provider knows how to turn an [`Input`] into REST calls against its forge: which endpoint
//! resolves a branch/tag to a commit, where the archive of a commit lives, how an access token
//! is presented, and what an SSH clone URL looks like. Everything else about fetching is shared
//! and lives in [`Fetcher`](crate::Fetcher).

mod github;
mod gitlab;

pub use github::GitHubScheme;
pub use gitlab::GitLabScheme;

use tracing::debug;
use url::Url;

use crate::attrs::{self, Attrs};
use crate::config::AccessTokens;
use crate::error::Error;
use crate::input::Input;
use crate::locator;
use crate::reference::Rev;
use crate::transport::Transport;

/// Supported forge providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeProvider {
    GitHub,
    GitLab,
}

impl ForgeProvider {
    /// Every provider, in registration order.
    pub fn all() -> &'static [ForgeProvider] {
        &[ForgeProvider::GitHub, ForgeProvider::GitLab]
    }

    /// The scheme name used in locators and in the `type` attribute.
    pub fn name(&self) -> &'static str {
        match self {
            ForgeProvider::GitHub => "github",
            ForgeProvider::GitLab => "gitlab",
        }
    }

    /// Exact match against a scheme name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.name() == name)
    }

    /// The public instance used when an input names no `host`.
    pub fn default_host(&self) -> &'static str {
        match self {
            ForgeProvider::GitHub => "github.com",
            ForgeProvider::GitLab => "gitlab.com",
        }
    }

    /// The `type` recorded in immutable cache keys for this provider's archives.
    pub fn tarball_kind(&self) -> &'static str {
        match self {
            ForgeProvider::GitHub => "github-tarball",
            ForgeProvider::GitLab => "gitlab-tarball",
        }
    }
}

impl std::fmt::Display for ForgeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A URL to `GET`, plus at most one header carrying credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub access_header: Option<(String, String)>,
}

impl DownloadRequest {
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            access_header: None,
        }
    }

    pub fn with_access_header(mut self, header: Option<(String, String)>) -> Self {
        self.access_header = header;
        self
    }
}

/// The operations every forge provider supplies.
///
/// Implementors provide the URL shapes and response parsing; locator/attribute handling and
/// the revision lookup round trip are shared default methods.
pub trait GitArchiveScheme: Send + Sync {
    fn provider(&self) -> ForgeProvider;

    /// The tokens available to this provider.
    fn tokens(&self) -> &AccessTokens;

    /// The header a token is presented in.
    fn access_header(&self, token: &str) -> (String, String);

    /// The endpoint that maps `git_ref` of `input` to a commit.
    fn rev_lookup_url(&self, input: &Input, git_ref: &str) -> String;

    /// Extract the commit from a successful lookup response body.
    fn rev_from_response(&self, body: &[u8]) -> Result<Rev, String>;

    /// The archive endpoint for `rev`.
    fn archive_url(&self, input: &Input, rev: Rev) -> String;

    /// The scheme name this provider answers to.
    fn name(&self) -> &'static str {
        self.provider().name()
    }

    /// The access header for requests about `input`, if a token is configured for it.
    fn access_header_for(&self, input: &Input) -> Option<(String, String)> {
        self.tokens()
            .token_for(self.provider(), input.effective_host())
            .map(|token| self.access_header(token))
    }

    /// `Ok(None)` when the URL belongs to another scheme.
    fn input_from_locator(&self, url: &Url) -> Result<Option<Input>, Error> {
        if url.scheme() != self.name() {
            return Ok(None);
        }
        locator::input_from_url(self.provider(), url).map(Some)
    }

    /// `Ok(None)` when the record's `type` belongs to another scheme.
    fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>, Error> {
        if attrs::maybe_get_str(attrs, "type")? != Some(self.name()) {
            return Ok(None);
        }
        Input::from_attrs(self.provider(), attrs).map(Some)
    }

    /// Ask the forge which commit the input's branch/tag (or `HEAD`) currently points at.
    fn resolve_revision(&self, input: &Input, transport: &dyn Transport) -> Result<Rev, Error> {
        let git_ref = input.git_ref().unwrap_or("HEAD");
        let request = DownloadRequest::new(self.rev_lookup_url(input, git_ref))
            .with_access_header(self.access_header_for(input));
        let failed = |reason: String| Error::Resolution {
            url: request.url.clone(),
            git_ref: git_ref.to_string(),
            reason,
        };
        let response = transport.get(&request).map_err(|err| failed(err.to_string()))?;
        if !response.is_success() {
            return Err(failed(format!("server returned HTTP status {}", response.status)));
        }
        let rev = self.rev_from_response(&response.body).map_err(failed)?;
        debug!(url = %request.url, %rev, "resolved '{git_ref}'");
        Ok(rev)
    }

    /// The archive download for a pinned input.
    fn download_url(&self, input: &Input) -> Result<DownloadRequest, Error> {
        let rev = input.rev().ok_or_else(|| Error::MissingAttribute {
            name: "rev".to_string(),
        })?;
        Ok(DownloadRequest::new(self.archive_url(input, rev))
            .with_access_header(self.access_header_for(input)))
    }

    /// The SSH URL handed to an external clone.
    fn clone_url(&self, input: &Input) -> String {
        format!(
            "git+ssh://git@{}/{}/{}.git",
            input.effective_host(),
            input.owner(),
            input.repo()
        )
    }
}
