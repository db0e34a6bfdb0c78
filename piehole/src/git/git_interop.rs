use super::{git_definitions::CONFIG_PREFIX, git_lowlevel::capture_git_output, git_types::GitError};

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Run an arbitrary git subcommand in the current process's working
/// directory, returning stdout and stderr concatenated into a single
/// string. A non-zero exit is always an error.
pub fn run_git(args: &[&str]) -> Result<String, GitError> {
    run_git_at(None, args)
}

/// As [`run_git`], but run against an explicit repository path instead of
/// the process's current working directory. The daemon uses this
/// exclusively: `chdir` is process-wide and cannot safely be used from a
/// multi-threaded request handler.
pub fn run_git_at(working_dir: Option<&Path>, args: &[&str]) -> Result<String, GitError> {
    capture_git_output(args, &working_dir).map(|out| format!("{}{}", out.stdout, out.stderr))
}

/// Absolute path to the root of the current repository (its `$GIT_DIR`).
pub fn reporoot() -> Result<PathBuf, GitError> {
    reporoot_at(None)
}

pub fn reporoot_at(working_dir: Option<&Path>) -> Result<PathBuf, GitError> {
    let git_dir = capture_git_output(&["rev-parse", "--git-dir"], &working_dir)?
        .stdout
        .trim()
        .to_owned();
    let candidate = working_dir.map(|wd| wd.join(&git_dir)).unwrap_or_else(|| PathBuf::from(&git_dir));
    Ok(std::fs::canonicalize(&candidate).unwrap_or(candidate))
}

/// The hex object id `ref` currently resolves to, or [`BLANK`](super::git_definitions::BLANK)
/// if it does not exist. Never fails: a lookup miss is a normal outcome, not
/// an error.
pub fn reporef(reference: &str) -> String {
    reporef_at(None, reference)
}

pub fn reporef_at(working_dir: Option<&Path>, reference: &str) -> String {
    capture_git_output(&["show-ref", "--hash", reference], &working_dir)
        .map(|out| out.stdout.trim().to_owned())
        .unwrap_or_else(|_| super::git_definitions::BLANK.to_owned())
}

/// Point `reference` directly at `value`, bypassing any push machinery. Used
/// on the "catch up to a known commit" path of the update hook.
pub fn set_ref(reference: &str, value: &str) -> Result<(), GitError> {
    capture_git_output(&["update-ref", reference, value], &None).map(|_| ())
}

/// `git push <peer> <refname>`, where `refname` is the short form (e.g.
/// `master`, not `refs/heads/master`) git expects on a push refspec.
pub fn push_ref_at(working_dir: Option<&Path>, peer_url: &str, refname: &str) -> Result<(), GitError> {
    capture_git_output(&["push", peer_url, refname], &working_dir).map(|_| ())
}

/// `git fetch <peer> <refname>:<refname>`.
pub fn fetch_ref_at(working_dir: Option<&Path>, peer_url: &str, refname: &str) -> Result<(), GitError> {
    let refspec = format!("{refname}:{refname}");
    capture_git_output(&["fetch", peer_url, &refspec], &working_dir).map(|_| ())
}

/// A small cache over `git config --local` reads/writes, scoped to a single
/// hook invocation, CLI command, or daemon request. Never make this a
/// process-wide static: the daemon handles requests for many different
/// repositories over its lifetime and must not leak one repo's config into
/// another's.
pub struct ConfigCache {
    working_dir: Option<PathBuf>,
    cache: RefCell<HashMap<String, Option<String>>>,
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::at(None)
    }

    /// A cache scoped to an explicit repository path, for use by the
    /// daemon's request handlers where relying on the process's current
    /// working directory would race across threads.
    pub fn at(working_dir: Option<PathBuf>) -> Self {
        Self {
            working_dir,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn qualify(key: &str) -> String {
        if key.contains('.') {
            key.to_owned()
        } else {
            format!("{CONFIG_PREFIX}.{key}")
        }
    }

    /// Read a config value, consulting the cache first.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(cached) = self.cache.borrow().get(key) {
            return cached.clone();
        }
        let git_key = Self::qualify(key);
        let value = capture_git_output(&["config", "--local", &git_key], &self.working_dir.as_deref())
            .ok()
            .map(|out| out.stdout.trim().to_owned())
            .filter(|s| !s.is_empty());
        self.cache.borrow_mut().insert(key.to_owned(), value.clone());
        value
    }

    /// Write a config value and update the cache to match.
    pub fn set(&self, key: &str, value: &str) -> Result<(), GitError> {
        let git_key = Self::qualify(key);
        capture_git_output(&["config", "--local", &git_key, value], &self.working_dir.as_deref())?;
        self.cache
            .borrow_mut()
            .insert(key.to_owned(), Some(value.to_owned()));
        Ok(())
    }
}
