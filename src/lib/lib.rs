#![allow(rustdoc::redundant_explicit_links)]
//! Fetch source trees from GitHub and GitLab by commit, branch or tag.
//!
//! Inputs are written as compact locators such as `github:owner/repo/branch` or as attribute
//! records (`type`, `owner`, `repo`, `ref`/`rev`, ...). A [`Fetcher`] resolves a branch or tag to
//! a commit through the forge's API, downloads that commit's archive once, unpacks it into a
//! content-addressed [`Store`] and remembers it in an immutable [`Cache`] keyed by the commit.
//!
//! # Core Features
//!
//! - Round-trip inputs between locators and attribute records.
//! - Override the branch/tag or commit of an existing input; the two are mutually exclusive.
//! - Resolve branches and tags (default `HEAD`) to commits, with optional access tokens per
//!   provider or per host.
//! - Skip all network traffic when a pinned commit is already cached.
//! - Hand an input over to `git` for a full clone.
//!
//! # Usage
//!
//! Parse a locator and inspect it:
//!
//! ```rust
//! use forge_fetch::{ForgeProvider, parse_locator};
//!
//! let input = parse_locator("gitlab:acme/widget/v1.2?host=git.example.org")?;
//! assert_eq!(input.provider(), ForgeProvider::GitLab);
//! assert_eq!(input.git_ref(), Some("v1.2"));
//! assert_eq!(input.effective_host(), "git.example.org");
//! assert_eq!(input.to_locator(), "gitlab:acme/widget/v1.2?host=git.example.org");
//! # Ok::<(), forge_fetch::Error>(())
//! ```
//!
//! Convert to and from attribute records:
//!
//! ```rust
//! use forge_fetch::{Attr, ForgeProvider, Input};
//!
//! let record = forge_fetch::attrs! {
//!     "type" => "github",
//!     "owner" => "acme",
//!     "repo" => "widget",
//!     "rev" => "abc1230000000000000000000000000000000def",
//! };
//! let input = Input::from_attrs(ForgeProvider::GitHub, &record)?;
//! assert_eq!(input.to_locator(), "github:acme/widget/abc1230000000000000000000000000000000def");
//! assert_eq!(input.to_attrs().get("owner"), Some(&Attr::from("acme")));
//! # Ok::<(), forge_fetch::Error>(())
//! ```
//!
//! Fetch through the default schemes:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forge_fetch::{Cache, Config, Fetcher, HttpTransport, LocalStore, SchemeRegistry};
//!
//! # fn main() -> Result<(), forge_fetch::Error> {
//! let config = Config::load(None)?;
//! let fetcher = Fetcher::new(
//!     SchemeRegistry::with_defaults(config.access_tokens()).install(),
//!     Arc::new(HttpTransport::new(config.user_agent())?),
//!     Arc::new(LocalStore::open(config.store_dir()?)?),
//!     Arc::new(Cache::load(config.cache_dir()?)?),
//! );
//! let (tree, locked) = fetcher.fetch_locator("github:rust-lang/cargo")?;
//! println!("{locked} -> {}", tree.path.display());
//! fetcher.cache().save()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Attributes
//!
//! | name           | meaning                                                  |
//! |----------------|----------------------------------------------------------|
//! | `type`         | the scheme name, `github` or `gitlab`                    |
//! | `owner`        | the repository owner or group                            |
//! | `repo`         | the repository name                                      |
//! | `ref`          | a branch or tag; never together with `rev`               |
//! | `rev`          | a 40 hex-digit commit hash                               |
//! | `host`         | the forge host, when not the provider's public instance  |
//! | `narHash`      | the expected hash of the fetched tree                    |
//! | `lastModified` | seconds since the epoch of the newest file in the tree   |
//!

mod attrs;
mod cache;
mod config;
mod error;
mod fetch;
mod git;
mod input;
mod locator;
pub mod provider;
mod reference;
mod registry;
pub mod store;
pub mod transport;

#[doc(inline)]
pub use crate::attrs::{Attr, Attrs, get_str, maybe_get_int, maybe_get_str};
#[doc(inline)]
pub use crate::cache::{Cache, CacheEntry, CacheInfo, ImmutableCacheKey};
#[doc(inline)]
pub use crate::config::{AccessTokens, Config};
#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::fetch::Fetcher;
pub use crate::git::clone_into;
#[doc(inline)]
pub use crate::input::{Input, RECOGNISED_ATTRIBUTES};
#[doc(inline)]
pub use crate::locator::parse_locator;
#[doc(inline)]
pub use crate::provider::{DownloadRequest, ForgeProvider, GitArchiveScheme, GitHubScheme, GitLabScheme};
#[doc(inline)]
pub use crate::reference::{
    GitReference, InvalidRev, Rev, is_commit_hash, is_valid_host, is_valid_path_segment, is_valid_ref_name,
};
#[doc(inline)]
pub use crate::registry::{SchemeRegistry, registry};
#[doc(inline)]
pub use crate::store::{LocalStore, Store, Tree};
#[doc(inline)]
pub use crate::transport::{HttpResponse, HttpTransport, Transport};
