//! Centralized test helpers for piehole: hermetic git environment setup and
//! repository initialization shared by the unit test modules scattered
//! across the crate.

use std::env;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::{tempdir, TempDir};

/// Sets up a hermetic git environment by configuring environment variables
/// to isolate git operations from the user's global git configuration.
///
/// This function sets:
/// - `GIT_CONFIG_NOSYSTEM`: Disables system-wide git config
/// - `GIT_CONFIG_GLOBAL`: Points to /dev/null to ignore global config
/// - `GIT_AUTHOR_NAME`, `GIT_AUTHOR_EMAIL`: Test user identity
/// - `GIT_COMMITTER_NAME`, `GIT_COMMITTER_EMAIL`: Test committer identity
pub fn hermetic_git_env() {
    for (key, value) in hermetic_git_env_vars() {
        env::set_var(key, value);
    }
}

/// Returns hermetic git environment variables as an array of tuples.
///
/// Useful for passing to `Command::envs()` when spawning a git process that
/// needs an isolated environment without mutating the test process's own.
pub fn hermetic_git_env_vars() -> [(&'static str, &'static str); 6] {
    [
        ("GIT_CONFIG_NOSYSTEM", "true"),
        ("GIT_CONFIG_GLOBAL", "/dev/null"),
        ("GIT_AUTHOR_NAME", "testuser"),
        ("GIT_AUTHOR_EMAIL", "testuser@example.com"),
        ("GIT_COMMITTER_NAME", "testuser"),
        ("GIT_COMMITTER_EMAIL", "testuser@example.com"),
    ]
}

/// Runs a git command in a hermetic environment with the specified directory.
///
/// # Panics
/// Panics if the git command fails or returns a non-zero exit status.
pub fn run_git_command(args: &[&str], dir: &Path) {
    assert!(Command::new("git")
        .args(args)
        .envs(hermetic_git_env_vars())
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("Failed to spawn git command")
        .success());
}

/// Initializes a non-bare git repository in `dir` with an initial empty
/// commit, used by the large majority of tests that want a working tree to
/// poke at. Tests that need a bare repo (mirroring the server-side `member`
/// repos piehole actually replicates between) call `init_bare_repo`
/// directly, since bare-ness is usually the thing under test.
pub fn init_repo(dir: &Path) {
    run_git_command(&["init", "--initial-branch", "master"], dir);
    run_git_command(&["commit", "--allow-empty", "-m", "Initial commit"], dir);
}

/// Creates a temporary directory with an initialized non-bare git
/// repository, cleaned up automatically when the returned `TempDir` drops.
pub fn dir_with_repo() -> TempDir {
    let tempdir = tempdir().unwrap();
    init_repo(tempdir.path());
    tempdir
}

/// Initializes a bare git repository in `dir`, the shape piehole's
/// replication actually operates on (a bare repo fronted by the `update`
/// and `post-update` hooks).
pub fn init_bare_repo(dir: &Path) {
    run_git_command(&["init", "--bare", "--initial-branch", "master"], dir);
}

/// Creates a temporary directory containing a bare git repository.
pub fn dir_with_bare_repo() -> TempDir {
    let tempdir = tempdir().unwrap();
    init_bare_repo(tempdir.path());
    tempdir
}

/// RAII guard that restores the current directory when dropped.
///
/// This ensures tests that change the current directory don't affect other
/// tests running (serially) in the same binary.
pub struct DirGuard {
    original_dir: std::path::PathBuf,
}

impl DirGuard {
    /// Creates a new DirGuard and changes to the specified directory.
    pub fn new(new_dir: &Path) -> Self {
        let original_dir = env::current_dir().expect("Failed to get current directory");
        env::set_current_dir(new_dir).expect("Failed to change directory");
        DirGuard { original_dir }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.original_dir);
    }
}

/// Sets up a hermetic git environment, creates a temp dir with a non-bare
/// repository, and changes into it for the duration of the closure.
pub fn with_isolated_cwd_git<F, R>(f: F) -> R
where
    F: FnOnce(&Path) -> R,
{
    hermetic_git_env();
    let temp_dir = dir_with_repo();
    let _guard = DirGuard::new(temp_dir.path());
    f(temp_dir.path())
}
