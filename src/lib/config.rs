//! User configuration: access tokens and on-disk locations.
//!
//! The configuration file is TOML:
//!
//! ```toml
//! github-access-token = "ghp_..."
//! gitlab-access-token = "glpat-..."
//! cache-dir = "/var/cache/forge-fetch"
//!
//! [access-tokens]
//! "git.example.org" = "glpat-..."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::provider::ForgeProvider;

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_ENV: &str = "FORGE_FETCH_CONFIG";

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab_access_token: Option<String>,
    /// Tokens for specific hosts. These win over the per-provider tokens.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub access_tokens: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

fn project_dirs() -> Result<directories::ProjectDirs, Error> {
    directories::ProjectDirs::from("", "", "forge-fetch")
        .ok_or_else(|| Error::Config("could not determine the home directory".to_string()))
}

impl Config {
    /// Parse a configuration document.
    pub fn parse<S: AsRef<str>>(toml_str: S) -> Result<Self, Error> {
        Ok(toml::from_str(toml_str.as_ref())?)
    }

    /// Load the configuration from `path`, else from `$FORGE_FETCH_CONFIG`, else from the
    /// platform configuration directory. Only the last may be absent, giving the defaults.
    /// `GITHUB_TOKEN` and `GITLAB_TOKEN` fill provider tokens the file leaves unset.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let config = match explicit {
            Some(path) => Self::read(&path)?,
            None => {
                let path = project_dirs()?.config_dir().join(CONFIG_FILE_NAME);
                if path.is_file() {
                    Self::read(&path)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(config.with_env_overrides(|name| std::env::var(name).ok()))
    }

    fn read(path: &Path) -> Result<Self, Error> {
        let document = std::fs::read_to_string(path).map_err(|err| {
            Error::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::parse(document)
    }

    /// Fill unset provider tokens from the environment, as seen through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.github_access_token.is_none() {
            self.github_access_token = lookup("GITHUB_TOKEN");
        }
        if self.gitlab_access_token.is_none() {
            self.gitlab_access_token = lookup("GITLAB_TOKEN");
        }
        self
    }

    /// The tokens handed to each provider.
    pub fn access_tokens(&self) -> AccessTokens {
        let mut tokens = AccessTokens::default();
        if let Some(token) = &self.github_access_token {
            tokens = tokens.with_provider_token(ForgeProvider::GitHub, token);
        }
        if let Some(token) = &self.gitlab_access_token {
            tokens = tokens.with_provider_token(ForgeProvider::GitLab, token);
        }
        self.access_tokens
            .iter()
            .fold(tokens, |tokens, (host, token)| tokens.with_host_token(host, token))
    }

    /// Where the fetch cache lives.
    pub fn cache_dir(&self) -> Result<PathBuf, Error> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.cache_dir().to_path_buf()),
        }
    }

    /// Where fetched trees are materialised.
    pub fn store_dir(&self) -> Result<PathBuf, Error> {
        match &self.store_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.cache_dir()?.join("store")),
        }
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
            .as_deref()
            .unwrap_or(concat!("forge-fetch/", env!("CARGO_PKG_VERSION")))
    }
}

/// Access tokens by provider and by host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessTokens {
    providers: BTreeMap<ForgeProvider, String>,
    hosts: BTreeMap<String, String>,
}

impl AccessTokens {
    pub fn with_provider_token<T: Into<String>>(mut self, provider: ForgeProvider, token: T) -> Self {
        self.providers.insert(provider, token.into());
        self
    }

    pub fn with_host_token<H: Into<String>, T: Into<String>>(mut self, host: H, token: T) -> Self {
        self.hosts.insert(host.into(), token.into());
        self
    }

    /// The token to use for `provider` at `host`. Empty tokens count as absent.
    pub fn token_for(&self, provider: ForgeProvider, host: &str) -> Option<&str> {
        self.hosts
            .get(host)
            .or_else(|| self.providers.get(&provider))
            .map(String::as_str)
            .filter(|token| !token.is_empty())
    }
}
