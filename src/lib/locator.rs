//! The compact locator syntax: `<scheme>:<owner>/<repo>[/<ref-or-rev>][?rev=..&ref=..&host=..]`.

use url::Url;

use crate::error::Error;
use crate::input::Input;
use crate::provider::ForgeProvider;
use crate::reference::{GitReference, Rev, is_commit_hash, is_valid_host, is_valid_path_segment, is_valid_ref_name};

/// Parse a locator for any known provider.
///
/// ```
/// use forge_fetch::{ForgeProvider, parse_locator};
///
/// let input = parse_locator("gitlab:acme/widget/v1.0?host=git.example.org")?;
/// assert_eq!(input.provider(), ForgeProvider::GitLab);
/// assert_eq!(input.git_ref(), Some("v1.0"));
/// assert_eq!(input.effective_host(), "git.example.org");
/// # Ok::<(), forge_fetch::Error>(())
/// ```
pub fn parse_locator(text: &str) -> Result<Input, Error> {
    let url = parse_url(text)?;
    let provider = ForgeProvider::parse(url.scheme()).ok_or_else(|| Error::UnsupportedScheme {
        scheme: url.scheme().to_string(),
    })?;
    input_from_url(provider, &url)
}

pub(crate) fn parse_url(text: &str) -> Result<Url, Error> {
    Url::parse(text).map_err(|err| Error::malformed(text, err))
}

/// Interpret an already-parsed URL as an input of `provider`. The URL's scheme is not checked.
pub(crate) fn input_from_url(provider: ForgeProvider, url: &Url) -> Result<Input, Error> {
    let locator = url.as_str();
    if url.fragment().is_some() {
        return Err(Error::malformed(locator, "fragments are not supported"));
    }
    let path = url.path().split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();

    let mut rev = None;
    let mut git_ref = None;
    let mut host = None;

    let (owner, repo) = match path.as_slice() {
        [owner, repo] => (*owner, *repo),
        [owner, repo, reference] => {
            if is_commit_hash(reference) {
                rev = Some(parse_rev(locator, reference)?);
            } else if is_valid_ref_name(reference) {
                git_ref = Some(reference.to_string());
            } else {
                return Err(Error::malformed(
                    locator,
                    format!("'{reference}' is not a commit hash or branch/tag name"),
                ));
            }
            (*owner, *repo)
        }
        _ => {
            return Err(Error::malformed(
                locator,
                format!(
                    "expected '<owner>/<repo>[/<ref-or-rev>]' but found {} path segment(s)",
                    path.len()
                ),
            ));
        }
    };

    for segment in [owner, repo] {
        if !is_valid_path_segment(segment) {
            return Err(Error::malformed(
                locator,
                format!("'{segment}' is not a valid owner or repository name"),
            ));
        }
    }

    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "rev" => {
                if rev.is_some() {
                    return Err(Error::malformed(locator, "contains multiple commit hashes"));
                }
                rev = Some(parse_rev(locator, &value)?);
            }
            "ref" => {
                if !is_valid_ref_name(&value) {
                    return Err(Error::malformed(
                        locator,
                        format!("'{value}' is not a valid branch/tag name"),
                    ));
                }
                if git_ref.is_some() {
                    return Err(Error::malformed(locator, "contains multiple branch/tag names"));
                }
                git_ref = Some(value.into_owned());
            }
            "host" => {
                if !is_valid_host(&value) {
                    return Err(Error::malformed(
                        locator,
                        format!("'{value}' is not a valid instance host"),
                    ));
                }
                host = Some(value.into_owned());
            }
            other => {
                return Err(Error::malformed(
                    locator,
                    format!("unsupported query parameter '{other}'"),
                ));
            }
        }
    }

    let reference = match (git_ref, rev) {
        (Some(git_ref), Some(rev)) => {
            return Err(Error::malformed(
                locator,
                format!("contains both a commit hash ({rev}) and a branch/tag name ('{git_ref}')"),
            ));
        }
        (Some(git_ref), None) => GitReference::Ref(git_ref),
        (None, Some(rev)) => GitReference::Rev(rev),
        (None, None) => GitReference::Unspecified,
    };

    let input = Input::new(provider, owner, repo).with_reference(reference);
    match host {
        Some(host) => input.with_host(host),
        None => Ok(input),
    }
}

fn parse_rev(locator: &str, value: &str) -> Result<Rev, Error> {
    value.parse::<Rev>().map_err(|err| Error::malformed(locator, err))
}

impl Input {
    /// Render this input as a locator. Fetch-derived fields (`narHash`, `lastModified`) have no
    /// locator form and are left out.
    ///
    /// Branch/tag names that would not survive as a single path segment are written as a `ref`
    /// query parameter instead.
    pub fn to_locator(&self) -> String {
        let mut locator = format!("{}:{}/{}", self.provider().name(), self.owner(), self.repo());
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        match self.reference() {
            GitReference::Unspecified => {}
            GitReference::Rev(rev) => {
                locator.push('/');
                locator.push_str(&rev.to_hex());
            }
            GitReference::Ref(git_ref) => {
                if git_ref.contains('/') || is_commit_hash(git_ref) {
                    query.append_pair("ref", git_ref);
                } else {
                    locator.push('/');
                    locator.push_str(git_ref);
                }
            }
        }
        if let Some(host) = self.host() {
            query.append_pair("host", host);
        }
        let query = query.finish();
        if !query.is_empty() {
            locator.push('?');
            locator.push_str(&query);
        }
        locator
    }
}
