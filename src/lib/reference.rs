//! Commit hashes, branch/tag names and the choice between them.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static REV_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("invalid regex"));
static REF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9@][a-zA-Z0-9_./@+-]*$").expect("invalid regex"));
// Names `git check-ref-format` refuses even though every character is allowed.
static BAD_REF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"//|^[./]|/\.|\.\.|/$|\.lock$|\.lock/|@\{").expect("invalid regex")
});
static HOST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*$")
        .expect("invalid regex")
});
static PATH_SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/?#%\s]+$").expect("invalid regex"));

/// Whether `s` looks like a full 40-character hex commit hash.
pub fn is_commit_hash(s: &str) -> bool {
    REV_REGEX.is_match(s)
}

/// Whether `s` is usable as a branch or tag name.
pub fn is_valid_ref_name(s: &str) -> bool {
    REF_REGEX.is_match(s) && !BAD_REF_REGEX.is_match(s)
}

/// Whether `s` is shaped like a hostname.
pub fn is_valid_host(s: &str) -> bool {
    HOST_REGEX.is_match(s)
}

/// Whether `s` can stand alone as an owner or repository name in a locator and an API path.
pub fn is_valid_path_segment(s: &str) -> bool {
    PATH_SEGMENT_REGEX.is_match(s)
}

/// The value was not a 40-character hex commit hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a 40-character hex commit hash")]
pub struct InvalidRev(pub String);

/// An immutable commit identifier (a SHA-1 git object id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rev([u8; 20]);

impl Rev {
    /// The lowercase hex form used in URLs and attribute records.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Rev {
    type Err = InvalidRev;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_commit_hash(s) {
            return Err(InvalidRev(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidRev(s.to_string()))?;
        Ok(Rev(bytes))
    }
}

impl TryFrom<String> for Rev {
    type Error = InvalidRev;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rev> for String {
    fn from(rev: Rev) -> Self {
        rev.to_hex()
    }
}

impl std::fmt::Display for Rev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// What an input points at. A branch/tag name and a commit hash exclude each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum GitReference {
    /// Neither given; fetching resolves `HEAD`.
    #[default]
    Unspecified,
    /// A mutable branch or tag name.
    Ref(String),
    /// An exact commit.
    Rev(Rev),
}

impl GitReference {
    /// The selected branch or tag name, if any.
    pub fn ref_name(&self) -> Option<&str> {
        match self {
            GitReference::Ref(name) => Some(name),
            _ => None,
        }
    }

    /// The selected commit, if any.
    pub fn rev(&self) -> Option<Rev> {
        match self {
            GitReference::Rev(rev) => Some(*rev),
            _ => None,
        }
    }
}

impl std::fmt::Display for GitReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitReference::Unspecified => write!(f, "HEAD"),
            GitReference::Ref(name) => write!(f, "ref: {name}"),
            GitReference::Rev(rev) => write!(f, "rev: {rev}"),
        }
    }
}

#[cfg(test)]
mod test_reference {
    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn rev_parses_full_hashes_only() {
        let rev: Rev = HASH.parse().unwrap();
        assert_eq!(rev.to_string(), HASH);
        assert!("0123456".parse::<Rev>().is_err());
        assert!(format!("{HASH}0").parse::<Rev>().is_err());
        assert!("g123456789abcdef0123456789abcdef01234567".parse::<Rev>().is_err());
    }

    #[test]
    fn rev_is_normalised_to_lowercase() {
        let rev: Rev = HASH.to_uppercase().parse().unwrap();
        assert_eq!(rev.to_hex(), HASH);
    }

    #[test]
    fn rev_serialises_as_hex_string() {
        let rev: Rev = HASH.parse().unwrap();
        let json = serde_json::to_string(&rev).unwrap();
        assert_eq!(json, format!("\"{HASH}\""));
        assert_eq!(serde_json::from_str::<Rev>(&json).unwrap(), rev);
        assert!(serde_json::from_str::<Rev>("\"main\"").is_err());
    }

    #[test]
    fn ref_names() {
        for good in ["main", "HEAD", "v1.2.3", "feature/login", "release-2024", "@foo", "a+b"] {
            assert!(is_valid_ref_name(good), "{good} should be valid");
        }
        for bad in [
            "",
            "not-a-hash-or-ref!",
            ".hidden",
            "a..b",
            "trailing/",
            "double//slash",
            "x.lock",
            "a@{1}",
            "with space",
            "-leading-dash",
        ] {
            assert!(!is_valid_ref_name(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn host_names() {
        for good in ["github.com", "git.example.org", "localhost", "my-forge.internal"] {
            assert!(is_valid_host(good), "{good} should be valid");
        }
        for bad in ["", "-bad.com", "bad-.com", "a..b", "host/path", "user@host"] {
            assert!(!is_valid_host(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn path_segments() {
        for good in ["acme", "widget.rs", "my-org", "group_1"] {
            assert!(is_valid_path_segment(good), "{good} should be valid");
        }
        for bad in ["", "acme/evil", "a?b", "a#b", "a%2Fb", "a b", "tab\t"] {
            assert!(!is_valid_path_segment(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn reference_accessors() {
        let rev: Rev = HASH.parse().unwrap();
        assert_eq!(GitReference::Rev(rev).rev(), Some(rev));
        assert_eq!(GitReference::Rev(rev).ref_name(), None);
        assert_eq!(GitReference::Ref("main".into()).ref_name(), Some("main"));
        assert_eq!(GitReference::Unspecified.rev(), None);
        assert_eq!(GitReference::default(), GitReference::Unspecified);
    }
}
