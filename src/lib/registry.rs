//! The table of input schemes, looked up by scheme name.

use std::sync::{Arc, OnceLock};

use url::Url;

use crate::attrs::Attrs;
use crate::config::AccessTokens;
use crate::error::Error;
use crate::input::Input;
use crate::locator;
use crate::provider::{GitArchiveScheme, GitHubScheme, GitLabScheme};

static GLOBAL: OnceLock<Arc<SchemeRegistry>> = OnceLock::new();

/// Input schemes in registration order.
///
/// Populate a registry before sharing it; it has no interior mutability, so a shared registry
/// is read-only.
#[derive(Default)]
pub struct SchemeRegistry {
    schemes: Vec<Box<dyn GitArchiveScheme>>,
}

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeRegistry")
            .field("schemes", &self.names())
            .finish()
    }
}

impl SchemeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// GitHub then GitLab, both using `tokens`.
    pub fn with_defaults(tokens: AccessTokens) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GitHubScheme::new(tokens.clone())));
        registry.register(Box::new(GitLabScheme::new(tokens)));
        registry
    }

    /// Add a scheme, replacing any scheme with the same name.
    pub fn register(&mut self, scheme: Box<dyn GitArchiveScheme>) {
        match self.schemes.iter_mut().find(|s| s.name() == scheme.name()) {
            Some(existing) => *existing = scheme,
            None => self.schemes.push(scheme),
        }
    }

    /// Make this the process-wide registry. Only the first call installs; every call returns
    /// the installed registry.
    pub fn install(self) -> Arc<SchemeRegistry> {
        GLOBAL.get_or_init(|| Arc::new(self)).clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.schemes.iter().map(|s| s.name()).collect()
    }

    /// The scheme registered under exactly `name`.
    pub fn get(&self, name: &str) -> Option<&dyn GitArchiveScheme> {
        self.schemes
            .iter()
            .find(|s| s.name() == name)
            .map(|s| &**s)
    }

    /// The scheme that handles `input`.
    pub fn scheme_for(&self, input: &Input) -> Result<&dyn GitArchiveScheme, Error> {
        self.get(input.provider().name())
            .ok_or_else(|| Error::UnsupportedScheme {
                scheme: input.provider().name().to_string(),
            })
    }

    /// Parse a locator with the first scheme that accepts it. `Ok(None)` if no registered
    /// scheme matches its scheme name.
    pub fn input_from_locator(&self, text: &str) -> Result<Option<Input>, Error> {
        self.input_from_url(&locator::parse_url(text)?)
    }

    fn input_from_url(&self, url: &Url) -> Result<Option<Input>, Error> {
        for scheme in &self.schemes {
            if let Some(input) = scheme.input_from_locator(url)? {
                return Ok(Some(input));
            }
        }
        Ok(None)
    }

    /// Parse a locator, failing with [`Error::UnsupportedScheme`] if no registered scheme
    /// accepts it.
    pub fn parse_locator(&self, text: &str) -> Result<Input, Error> {
        let url = locator::parse_url(text)?;
        self.input_from_url(&url)?.ok_or_else(|| Error::UnsupportedScheme {
            scheme: url.scheme().to_string(),
        })
    }

    /// Build an input from an attribute record, failing with [`Error::UnsupportedScheme`] if
    /// no registered scheme handles its `type`.
    pub fn parse_attrs(&self, attrs: &Attrs) -> Result<Input, Error> {
        self.input_from_attrs(attrs)?.ok_or_else(|| Error::UnsupportedScheme {
            scheme: crate::attrs::maybe_get_str(attrs, "type")
                .ok()
                .flatten()
                .unwrap_or("<none>")
                .to_string(),
        })
    }

    /// Build an input with the first scheme whose name equals the record's `type`.
    /// `Ok(None)` if none does.
    pub fn input_from_attrs(&self, attrs: &Attrs) -> Result<Option<Input>, Error> {
        for scheme in &self.schemes {
            if let Some(input) = scheme.input_from_attrs(attrs)? {
                return Ok(Some(input));
            }
        }
        Ok(None)
    }
}

/// The process-wide registry, if one was installed.
pub fn registry() -> Option<Arc<SchemeRegistry>> {
    GLOBAL.get().cloned()
}
