//! Integration tests for the forge-fetch library.
//!
//! These drive the public API end to end against a canned transport, so they need no network.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use forge_fetch::{
    AccessTokens, Attr, Cache, DownloadRequest, Error, Fetcher, ForgeProvider, HttpResponse, Input, LocalStore,
    SchemeRegistry, Transport, parse_locator,
};

const HASH: &str = "abc1230000000000000000000000000000000def";

/// Serves canned responses by URL and records what was asked for.
#[derive(Default)]
struct CannedTransport {
    responses: BTreeMap<String, (u16, Vec<u8>)>,
    requests: Mutex<Vec<DownloadRequest>>,
}

impl CannedTransport {
    fn with(mut self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.to_string(), (status, body.into()));
        self
    }

    fn urls(&self) -> Vec<String> {
        self.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect()
    }

    fn headers(&self) -> Vec<Option<(String, String)>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.access_header.clone())
            .collect()
    }
}

impl Transport for CannedTransport {
    fn get(&self, request: &DownloadRequest) -> Result<HttpResponse, Error> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.get(&request.url) {
            Some((status, body)) => Ok(HttpResponse {
                status: *status,
                body: body.clone(),
            }),
            None => Err(Error::Transfer {
                url: request.url.clone(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

fn archive(top: &str, files: &[(&str, &str)], mtime: u64) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{top}/{path}"), contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn fetcher(
    dir: &std::path::Path,
    transport: Arc<CannedTransport>,
    tokens: AccessTokens,
) -> Fetcher {
    Fetcher::new(
        Arc::new(SchemeRegistry::with_defaults(tokens)),
        transport,
        Arc::new(LocalStore::open(dir.join("store")).unwrap()),
        Arc::new(Cache::load(dir).unwrap()),
    )
}

#[test]
fn test_fetch_github_head_then_reuse_cache() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = "https://api.github.com/repos/acme/widget/commits/HEAD";
    let download = format!("https://api.github.com/repos/acme/widget/tarball/{HASH}");
    let transport = Arc::new(
        CannedTransport::default()
            .with(lookup, 200, format!(r#"{{"sha": "{HASH}", "commit": {{}}}}"#))
            .with(
                &download,
                200,
                archive("acme-widget-abc1230", &[("Cargo.toml", "[package]"), ("src/lib.rs", "")], 1_700_000_000),
            ),
    );
    let fetcher = fetcher(dir.path(), transport.clone(), AccessTokens::default());

    let (tree, locked) = fetcher.fetch_locator("github:acme/widget").unwrap();
    assert!(tree.path.join("Cargo.toml").is_file());
    assert!(tree.path.join("src/lib.rs").is_file());
    assert_eq!(locked.to_locator(), format!("github:acme/widget/{HASH}"));
    assert_eq!(locked.last_modified(), Some(1_700_000_000));
    assert!(locked.is_locked());
    assert_eq!(transport.urls(), vec![lookup.to_string(), download.clone()]);
    fetcher.cache().save().unwrap();

    // A second fetcher over the same directory finds the pinned commit without any request.
    let again = Arc::new(CannedTransport::default());
    let second = self::fetcher(dir.path(), again.clone(), AccessTokens::default());
    let (cached, relocked) = second.fetch(&locked).unwrap();
    assert_eq!(cached, tree);
    assert_eq!(relocked, locked);
    assert!(again.urls().is_empty());
}

#[test]
fn test_fetch_gitlab_self_hosted_with_host_token() {
    let dir = tempfile::tempdir().unwrap();
    let lookup = "https://git.example.org/api/v4/projects/team%2Ftool/repository/commits?ref_name=v2.0";
    let download = format!("https://git.example.org/api/v4/projects/team%2Ftool/repository/archive.tar.gz?sha={HASH}");
    let transport = Arc::new(
        CannedTransport::default()
            .with(lookup, 200, format!(r#"[{{"id": "{HASH}"}}]"#))
            .with(&download, 200, archive("tool-v2.0", &[("README", "tool")], 5)),
    );
    let tokens = AccessTokens::default()
        .with_provider_token(ForgeProvider::GitLab, "public-token")
        .with_host_token("git.example.org", "private-token");
    let fetcher = fetcher(dir.path(), transport.clone(), tokens);

    let (tree, locked) = fetcher
        .fetch_locator("gitlab:team/tool/v2.0?host=git.example.org")
        .unwrap();
    assert_eq!(std::fs::read_to_string(tree.path.join("README")).unwrap(), "tool");
    assert_eq!(locked.host(), Some("git.example.org"));
    assert_eq!(locked.git_ref(), None);
    let bearer = Some(("Authorization".to_string(), "Bearer private-token".to_string()));
    assert_eq!(transport.headers(), vec![bearer.clone(), bearer]);
}

#[test]
fn test_branch_and_commit_share_one_download() {
    let dir = tempfile::tempdir().unwrap();
    let download = format!("https://api.github.com/repos/acme/widget/tarball/{HASH}");
    let transport = Arc::new(
        CannedTransport::default()
            .with(
                "https://api.github.com/repos/acme/widget/commits/main",
                200,
                format!(r#"{{"sha": "{HASH}"}}"#),
            )
            .with(&download, 200, archive("w", &[("f", "x")], 1)),
    );
    let fetcher = fetcher(dir.path(), transport.clone(), AccessTokens::default());
    let (by_branch, _) = fetcher.fetch_locator("github:acme/widget/main").unwrap();
    let (by_commit, _) = fetcher.fetch_locator(&format!("github:acme/widget/{HASH}")).unwrap();
    assert_eq!(by_branch, by_commit);
    assert_eq!(transport.urls().iter().filter(|u| **u == download).count(), 1);
    assert_eq!(fetcher.cache().len(), 1);
}

#[test]
fn test_conflicting_locator_and_override() {
    assert!(matches!(
        parse_locator(&format!("github:acme/widget?ref=main&rev={HASH}")),
        Err(Error::MalformedLocator { .. })
    ));

    let input = parse_locator("github:acme/widget").unwrap();
    let err = input
        .apply_overrides(Some("main"), Some(HASH.parse().unwrap()))
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingOverride { .. }));
    assert!(err.to_string().contains(HASH));
    assert!(err.to_string().contains("main"));
}

#[test]
fn test_locator_and_attrs_round_trip() {
    let pinned = format!("gitlab:group/project/{HASH}");
    for locator in [
        "github:acme/widget",
        "github:acme/widget/main",
        "github:acme/widget?ref=release%2F1.x",
        "gitlab:group/project/v1.0?host=git.example.org",
        pinned.as_str(),
    ] {
        let input = parse_locator(locator).unwrap();
        assert_eq!(input.to_locator(), locator);
        let attrs = input.to_attrs();
        assert_eq!(attrs.get("type"), Some(&Attr::from(input.provider().name())));
        assert_eq!(Input::from_attrs(input.provider(), &attrs).unwrap(), input);
    }
}

#[test]
fn test_download_failure_leaves_cache_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let download = format!("https://api.github.com/repos/acme/widget/tarball/{HASH}");
    let transport = Arc::new(CannedTransport::default().with(&download, 404, "Not Found"));
    let fetcher = fetcher(dir.path(), transport, AccessTokens::default());
    let err = fetcher
        .fetch_locator(&format!("github:acme/widget/{HASH}"))
        .unwrap_err();
    assert!(matches!(err, Error::Transfer { .. }));
    assert!(fetcher.cache().is_empty());
}

#[test]
fn test_cache_key_ignores_owner_repo_and_host() {
    let dir = tempfile::tempdir().unwrap();
    let download = format!("https://api.github.com/repos/acme/widget/tarball/{HASH}");
    let transport = Arc::new(CannedTransport::default().with(&download, 200, archive("w", &[("f", "x")], 7)));
    let fetcher = fetcher(dir.path(), transport.clone(), AccessTokens::default());

    let (tree, _) = fetcher.fetch_locator(&format!("github:acme/widget/{HASH}")).unwrap();
    let (mirrored, locked) = fetcher
        .fetch_locator(&format!("github:other/thing/{HASH}?host=ghe.example.com"))
        .unwrap();
    assert_eq!(mirrored, tree);
    assert_eq!(transport.urls(), vec![download]);
    assert_eq!(fetcher.cache().len(), 1);
    assert_eq!(locked.owner(), "other");
    assert_eq!(locked.host(), Some("ghe.example.com"));
    assert_eq!(locked.last_modified(), Some(7));
}

#[test]
fn test_same_tree_from_two_providers_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let body = archive("top", &[("Cargo.toml", "[package]"), ("src/main.rs", "fn main() {}")], 11);
    let transport = Arc::new(
        CannedTransport::default()
            .with(&format!("https://api.github.com/repos/acme/widget/tarball/{HASH}"), 200, body.clone())
            .with(
                &format!("https://gitlab.com/api/v4/projects/acme%2Fwidget/repository/archive.tar.gz?sha={HASH}"),
                200,
                body,
            ),
    );
    let fetcher = fetcher(dir.path(), transport, AccessTokens::default());
    let barrier = std::sync::Barrier::new(2);
    let trees = std::thread::scope(|s| {
        let handles = ["github", "gitlab"]
            .map(|scheme| {
                let (fetcher, barrier) = (&fetcher, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    fetcher.fetch_locator(&format!("{scheme}:acme/widget/{HASH}")).unwrap().0
                })
            });
        handles.map(|handle| handle.join().unwrap())
    });
    assert_eq!(trees[0], trees[1]);
    assert_eq!(fetcher.cache().len(), 2);
}
