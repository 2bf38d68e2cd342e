//! The typed input record passed through resolution and fetching.

use crate::attrs::{self, Attr, Attrs};
use crate::error::Error;
use crate::provider::ForgeProvider;
use crate::reference::{GitReference, Rev, is_valid_host, is_valid_path_segment, is_valid_ref_name};

/// Every attribute name an input record may carry.
pub const RECOGNISED_ATTRIBUTES: &[&str] = &[
    "type",
    "owner",
    "repo",
    "ref",
    "rev",
    "narHash",
    "lastModified",
    "host",
];

/// A repository on a git forge, optionally pinned to a branch/tag or commit.
///
/// Inputs are values: every change produces a new `Input`. The branch/tag and commit are a
/// single [`GitReference`], so an input can never carry both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Input {
    provider: ForgeProvider,
    owner: String,
    repo: String,
    reference: GitReference,
    host: Option<String>,
    nar_hash: Option<String>,
    last_modified: Option<u64>,
}

impl Input {
    /// An input for `owner/repo` on the provider's default host, following `HEAD`.
    ///
    /// `owner` and `repo` are taken as given; [`Input::from_attrs`] and the locator parser check
    /// them with [`is_valid_path_segment`](crate::is_valid_path_segment).
    pub fn new<O: Into<String>, R: Into<String>>(provider: ForgeProvider, owner: O, repo: R) -> Self {
        Self {
            provider,
            owner: owner.into(),
            repo: repo.into(),
            reference: GitReference::Unspecified,
            host: None,
            nar_hash: None,
            last_modified: None,
        }
    }

    pub(crate) fn with_reference(mut self, reference: GitReference) -> Self {
        self.reference = reference;
        self
    }

    /// Use a self-hosted instance instead of the provider's default host.
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Result<Self, Error> {
        let host = host.into();
        if !is_valid_host(&host) {
            return Err(Error::invalid_attribute("host", format!("'{host}' is not a valid host name")));
        }
        self.host = Some(host);
        Ok(self)
    }

    /// Expect the fetched tree to have this hash.
    pub fn with_nar_hash<H: Into<String>>(mut self, nar_hash: H) -> Self {
        self.nar_hash = Some(nar_hash.into());
        self
    }

    pub(crate) fn with_last_modified(mut self, last_modified: u64) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn provider(&self) -> ForgeProvider {
        self.provider
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn reference(&self) -> &GitReference {
        &self.reference
    }

    /// The branch or tag name, if the input follows one.
    pub fn git_ref(&self) -> Option<&str> {
        self.reference.ref_name()
    }

    /// The commit, if the input is pinned to one.
    pub fn rev(&self) -> Option<Rev> {
        self.reference.rev()
    }

    /// The explicitly configured host, if any.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The host requests go to: the configured host or the provider's default.
    pub fn effective_host(&self) -> &str {
        self.host().unwrap_or(self.provider.default_host())
    }

    pub fn nar_hash(&self) -> Option<&str> {
        self.nar_hash.as_deref()
    }

    pub fn last_modified(&self) -> Option<u64> {
        self.last_modified
    }

    /// Fully pinned: a commit and its timestamp are both known, so reproducing this input
    /// needs no further network resolution.
    pub fn is_locked(&self) -> bool {
        self.rev().is_some() && self.last_modified.is_some()
    }

    /// Return a copy pointing at a new branch/tag or commit. Setting one clears the other.
    /// This is the only way to change the reference of an existing input.
    pub fn apply_overrides(&self, git_ref: Option<&str>, rev: Option<Rev>) -> Result<Self, Error> {
        match (git_ref, rev) {
            (Some(git_ref), Some(rev)) => Err(Error::ConflictingOverride {
                rev: rev.to_hex(),
                git_ref: git_ref.to_string(),
                input: self.to_string(),
            }),
            (Some(git_ref), None) => {
                if !is_valid_ref_name(git_ref) {
                    return Err(Error::invalid_attribute(
                        "ref",
                        format!("'{git_ref}' is not a valid branch/tag name"),
                    ));
                }
                Ok(self.clone().with_reference(GitReference::Ref(git_ref.to_string())))
            }
            (None, Some(rev)) => Ok(self.clone().with_reference(GitReference::Rev(rev))),
            (None, None) => Ok(self.clone()),
        }
    }

    /// Build an input from an attribute record whose `type` is `provider`.
    ///
    /// Unknown attributes are rejected, `owner` and `repo` are required, and a record naming
    /// both a `ref` and a `rev` is refused.
    pub fn from_attrs(provider: ForgeProvider, attrs: &Attrs) -> Result<Self, Error> {
        if let Some(name) = attrs
            .keys()
            .find(|name| !RECOGNISED_ATTRIBUTES.contains(&name.as_str()))
        {
            return Err(Error::UnsupportedAttribute { name: name.clone() });
        }
        let kind = attrs::get_str(attrs, "type")?;
        if kind != provider.name() {
            return Err(Error::invalid_attribute(
                "type",
                format!("expected '{}', found '{kind}'", provider.name()),
            ));
        }
        let mut input = Input::new(
            provider,
            path_segment(attrs, "owner")?,
            path_segment(attrs, "repo")?,
        );
        let git_ref = attrs::maybe_get_str(attrs, "ref")?;
        let rev = attrs::maybe_get_str(attrs, "rev")?
            .map(|rev| rev.parse::<Rev>())
            .transpose()
            .map_err(|err| Error::invalid_attribute("rev", err))?;
        input.reference = match (git_ref, rev) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_attribute(
                    "ref",
                    "cannot be combined with 'rev'",
                ));
            }
            (Some(git_ref), None) => {
                if !is_valid_ref_name(git_ref) {
                    return Err(Error::invalid_attribute(
                        "ref",
                        format!("'{git_ref}' is not a valid branch/tag name"),
                    ));
                }
                GitReference::Ref(git_ref.to_string())
            }
            (None, Some(rev)) => GitReference::Rev(rev),
            (None, None) => GitReference::Unspecified,
        };
        if let Some(host) = attrs::maybe_get_str(attrs, "host")? {
            input = input.with_host(host)?;
        }
        input.nar_hash = attrs::maybe_get_str(attrs, "narHash")?.map(String::from);
        input.last_modified = attrs::maybe_get_int(attrs, "lastModified")?;
        Ok(input)
    }

    /// The attribute record form of this input.
    pub fn to_attrs(&self) -> Attrs {
        let mut attrs = Attrs::new();
        attrs.insert("type".into(), Attr::from(self.provider.name()));
        attrs.insert("owner".into(), Attr::from(self.owner.as_str()));
        attrs.insert("repo".into(), Attr::from(self.repo.as_str()));
        match &self.reference {
            GitReference::Unspecified => {}
            GitReference::Ref(git_ref) => {
                attrs.insert("ref".into(), Attr::from(git_ref.as_str()));
            }
            GitReference::Rev(rev) => {
                attrs.insert("rev".into(), Attr::from(rev.to_hex()));
            }
        }
        if let Some(host) = &self.host {
            attrs.insert("host".into(), Attr::from(host.as_str()));
        }
        if let Some(nar_hash) = &self.nar_hash {
            attrs.insert("narHash".into(), Attr::from(nar_hash.as_str()));
        }
        if let Some(last_modified) = self.last_modified {
            attrs.insert("lastModified".into(), Attr::from(last_modified));
        }
        attrs
    }
}

/// A required owner or repository attribute.
fn path_segment<'a>(attrs: &'a Attrs, name: &str) -> Result<&'a str, Error> {
    let value = attrs::get_str(attrs, name)?;
    if !is_valid_path_segment(value) {
        return Err(Error::invalid_attribute(
            name,
            format!("'{value}' must be a non-empty name without '/', '?', '#', '%' or whitespace"),
        ));
    }
    Ok(value)
}

impl std::fmt::Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_locator())
    }
}
