/// The main error enum for this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A locator string could not be turned into an input.
    #[error("locator '{locator}' is invalid: {reason}")]
    MalformedLocator { locator: String, reason: String },

    /// An attribute record carries a field no input scheme understands.
    #[error("unsupported input attribute '{name}'")]
    UnsupportedAttribute { name: String },

    /// A required attribute is absent from an attribute record.
    #[error("input attribute '{name}' is missing")]
    MissingAttribute { name: String },

    /// An attribute is present but has the wrong type or an unusable value.
    #[error("input attribute '{name}' is invalid: {reason}")]
    InvalidAttribute { name: String, reason: String },

    /// No registered input scheme handles the given scheme or `type`.
    #[error("no input scheme is registered for '{scheme}'")]
    UnsupportedScheme { scheme: String },

    #[error(
        "cannot apply both a commit hash ({rev}) and a branch/tag name ('{git_ref}') to input '{input}'"
    )]
    ConflictingOverride {
        rev: String,
        git_ref: String,
        input: String,
    },

    /// A branch or tag could not be resolved to a commit.
    #[error("failed to resolve '{git_ref}' using {url}: {reason}")]
    Resolution {
        url: String,
        git_ref: String,
        reason: String,
    },

    /// A download failed in the transport layer or returned a non-success status.
    #[error("failed to download {url}: {reason}")]
    Transfer { url: String, reason: String },

    /// A downloaded archive could not be materialised as a source tree.
    #[error("archive '{name}' is unusable: {reason}")]
    InvalidArchive { name: String, reason: String },

    #[error("NAR hash mismatch in input '{input}': expected '{expected}', got '{actual}'")]
    NarHashMismatch {
        input: String,
        expected: String,
        actual: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Clone(#[from] git2::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn malformed<L: ToString, R: ToString>(locator: L, reason: R) -> Self {
        Self::MalformedLocator {
            locator: locator.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_attribute<N: ToString, R: ToString>(name: N, reason: R) -> Self {
        Self::InvalidAttribute {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transfer<U: ToString, R: ToString>(url: U, reason: R) -> Self {
        Self::Transfer {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
