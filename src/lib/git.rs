//! Handing an input over to git for a full clone.

use std::io::{Write, stdin, stdout};
use std::path::{Path, PathBuf};

use git2::Repository;
use tracing::{debug, info};

use crate::reference::{GitReference, Rev};

/// Clone `url` into `into`, then check out the branch/tag or detach at the commit named by
/// `reference`. A `git+` prefix on the URL is accepted and stripped.
pub fn clone_into(url: &str, reference: &GitReference, into: &Path) -> Result<Repository, git2::Error> {
    let url = url.strip_prefix("git+").unwrap_or(url);
    info!(url, dest = %into.display(), %reference, "cloning");

    let mut callbacks = git2::RemoteCallbacks::new();
    callbacks.credentials(prepare_git_credentials);
    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);
    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_options);
    if let GitReference::Ref(name) = reference
        && name != "HEAD"
    {
        builder.branch(name);
    }
    let repo = builder.clone(url, into)?;

    if let GitReference::Rev(rev) = reference {
        checkout_commit(&repo, *rev)?;
    }
    Ok(repo)
}

fn checkout_commit(repo: &Repository, rev: Rev) -> Result<(), git2::Error> {
    let oid = git2::Oid::from_str(&rev.to_hex())?;
    let commit = repo.find_object(oid, Some(git2::ObjectType::Commit))?;
    debug!(%rev, "detaching HEAD");
    repo.set_head_detached(commit.id())?;
    repo.checkout_tree(&commit, Some(git2::build::CheckoutBuilder::new().force()))
}

fn prepare_git_credentials(
    url: &str,
    username_from_url: Option<&str>,
    credential_type: git2::CredentialType,
) -> Result<git2::Cred, git2::Error> {
    if credential_type.contains(git2::CredentialType::SSH_KEY) {
        let user = username_from_url.unwrap_or("git");
        match std::env::var_os("GIT_IDENTITY_FILE").map(PathBuf::from) {
            Some(identity_file) => git2::Cred::ssh_key(user, None, &identity_file, None),
            None => git2::Cred::ssh_key_from_agent(user),
        }
    } else if credential_type.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
        let username = match username_from_url {
            Some(username) => username.to_string(),
            None => prompt_line(&format!("Enter username for {url}: "))?,
        };
        let password = rpassword::prompt_password(format!("Enter password/PAT for {username}: "))
            .map_err(|err| git2::Error::from_str(&err.to_string()))?;
        git2::Cred::userpass_plaintext(&username, &password)
    } else {
        Err(git2::Error::from_str(
            "Unsupported credential type, expected ssh or plaintext",
        ))
    }
}

fn prompt_line(prompt: &str) -> Result<String, git2::Error> {
    let io_error = |err: std::io::Error| git2::Error::from_str(&err.to_string());
    print!("{prompt}");
    stdout().flush().map_err(io_error)?;
    let mut input = String::new();
    stdin().read_line(&mut input).map_err(io_error)?;
    Ok(input.trim().to_string())
}
