//! GitHub and GitHub-style instances.

use crate::config::AccessTokens;
use crate::input::Input;
use crate::reference::Rev;

use super::{ForgeProvider, GitArchiveScheme};

#[derive(serde::Deserialize)]
struct Commit {
    sha: String,
}

/// Resolves through `https://api.<host>/repos/...` and presents tokens as `token <token>`.
#[derive(Debug, Clone, Default)]
pub struct GitHubScheme {
    tokens: AccessTokens,
}

impl GitHubScheme {
    pub fn new(tokens: AccessTokens) -> Self {
        Self { tokens }
    }
}

impl GitArchiveScheme for GitHubScheme {
    fn provider(&self) -> ForgeProvider {
        ForgeProvider::GitHub
    }

    fn tokens(&self) -> &AccessTokens {
        &self.tokens
    }

    fn access_header(&self, token: &str) -> (String, String) {
        ("Authorization".to_string(), format!("token {token}"))
    }

    fn rev_lookup_url(&self, input: &Input, git_ref: &str) -> String {
        format!(
            "https://api.{}/repos/{}/{}/commits/{}",
            input.effective_host(),
            input.owner(),
            input.repo(),
            git_ref
        )
    }

    fn rev_from_response(&self, body: &[u8]) -> Result<Rev, String> {
        let commit: Commit = serde_json::from_slice(body)
            .map_err(|err| format!("unexpected commit response: {err}"))?;
        commit.sha.parse::<Rev>().map_err(|err| err.to_string())
    }

    // The API tarball endpoint, rather than /archive/, so tokens work for private repositories.
    fn archive_url(&self, input: &Input, rev: Rev) -> String {
        format!(
            "https://api.{}/repos/{}/{}/tarball/{}",
            input.effective_host(),
            input.owner(),
            input.repo(),
            rev
        )
    }
}
