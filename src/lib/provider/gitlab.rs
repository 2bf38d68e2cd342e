//! GitLab and self-hosted GitLab instances.

use url::form_urlencoded;

use crate::config::AccessTokens;
use crate::input::Input;
use crate::reference::Rev;

use super::{ForgeProvider, GitArchiveScheme};

#[derive(serde::Deserialize)]
struct Commit {
    id: String,
}

/// Resolves through the v4 REST API and presents tokens as `Bearer <token>`.
#[derive(Debug, Clone, Default)]
pub struct GitLabScheme {
    tokens: AccessTokens,
}

impl GitLabScheme {
    pub fn new(tokens: AccessTokens) -> Self {
        Self { tokens }
    }
}

impl GitArchiveScheme for GitLabScheme {
    fn provider(&self) -> ForgeProvider {
        ForgeProvider::GitLab
    }

    fn tokens(&self) -> &AccessTokens {
        &self.tokens
    }

    fn access_header(&self, token: &str) -> (String, String) {
        ("Authorization".to_string(), format!("Bearer {token}"))
    }

    fn rev_lookup_url(&self, input: &Input, git_ref: &str) -> String {
        format!(
            "https://{}/api/v4/projects/{}%2F{}/repository/commits?ref_name={}",
            input.effective_host(),
            input.owner(),
            input.repo(),
            form_urlencoded::byte_serialize(git_ref.as_bytes()).collect::<String>()
        )
    }

    // The endpoint lists commits newest first.
    fn rev_from_response(&self, body: &[u8]) -> Result<Rev, String> {
        let commits: Vec<Commit> = serde_json::from_slice(body)
            .map_err(|err| format!("unexpected commit list response: {err}"))?;
        let first = commits
            .first()
            .ok_or_else(|| "the commit list is empty".to_string())?;
        first.id.parse::<Rev>().map_err(|err| err.to_string())
    }

    // Rate limits on this endpoint are instance-specific (gitlab.com allows roughly 10
    // requests/second/IP).
    fn archive_url(&self, input: &Input, rev: Rev) -> String {
        format!(
            "https://{}/api/v4/projects/{}%2F{}/repository/archive.tar.gz?sha={}",
            input.effective_host(),
            input.owner(),
            input.repo(),
            rev
        )
    }
}
