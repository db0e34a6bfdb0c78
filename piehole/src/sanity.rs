//! Preconditions every hook and CLI command checks before doing anything
//! that could make replication state worse: the repo must be bare, its
//! hooks must be this binary and only this binary, and the local transfer
//! daemon must be reachable.

use std::fs;
use std::os::unix::fs::PermissionsExt;

use anyhow::{anyhow, Result};

use crate::daemon::client::ping_daemon;
use crate::git::{git_definitions::HOOK_NAMES, reporoot, ConfigCache};

#[derive(Debug, thiserror::Error)]
pub enum SanityError {
    #[error("{0} is not a bare Git repository.")]
    NotBare(String),

    #[error("core.logAllRefUpdates is off")]
    ReflogConfigOff,

    #[error("piehole.{0} not set")]
    ConfigMissing(&'static str),

    #[error("Hook already exists at {0}")]
    HookAlreadyExists(String),

    #[error("{0} is not executable")]
    HookNotExecutable(String),

    #[error("Cannot connect to piehole daemon")]
    DaemonUnreachable,
}

/// The `piehole.*` config keys an installed repository must have set.
const REQUIRED_CONFIG_ITEMS: &[&str] = &["etcdprefix", "etcdroot", "repourl", "repogroup"];

/// Verify every precondition replication relies on. `installed` distinguishes
/// a pre-install check (run before the `piehole.*` keys exist) from the
/// steady-state check every hook and `piehole check` performs.
pub fn sanity_check(cache: &ConfigCache, installed: bool) -> Result<(), SanityError> {
    if cache.get("core.bare").as_deref() != Some("true") {
        return Err(SanityError::NotBare(
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ));
    }

    if !ping_daemon() {
        return Err(SanityError::DaemonUnreachable);
    }

    if installed {
        if cache.get("core.logAllRefUpdates").as_deref() != Some("true") {
            return Err(SanityError::ReflogConfigOff);
        }
        for item in REQUIRED_CONFIG_ITEMS {
            if cache.get(item).is_none() {
                return Err(SanityError::ConfigMissing(item));
            }
        }
    }

    let root = reporoot().map_err(|_| SanityError::NotBare(".".to_owned()))?;
    let this_exe = std::env::current_exe().ok();
    for hook in HOOK_NAMES {
        let path = root.join("hooks").join(hook);
        if path.is_file() {
            if let Some(ref this_exe) = this_exe {
                let identical = fs::read(&path)
                    .and_then(|installed| fs::read(this_exe).map(|mine| mine == installed))
                    .unwrap_or(false);
                if !identical {
                    return Err(SanityError::HookAlreadyExists(path.display().to_string()));
                }
            }
            let executable = fs::metadata(&path)
                .map(|meta| meta.permissions().mode() & 0o111 != 0)
                .unwrap_or(false);
            if !executable {
                return Err(SanityError::HookNotExecutable(path.display().to_string()));
            }
        }
    }

    Ok(())
}

/// Install this repository into a repogroup: copy hooks, set config, join
/// membership.
pub fn install(
    cache: &ConfigCache,
    repogroup: &str,
    repourl: &str,
    etcdroot: &str,
    etcdprefix: &str,
) -> Result<()> {
    sanity_check(cache, false)?;

    let root = reporoot()?;
    let this_exe = std::env::current_exe()
        .map_err(|e| anyhow!("could not determine the path of this executable: {e}"))?;
    for hook in HOOK_NAMES {
        let path = root.join("hooks").join(hook);
        fs::copy(&this_exe, &path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    }

    cache.set("etcdroot", etcdroot)?;
    cache.set("etcdprefix", etcdprefix)?;
    cache.set("repogroup", repogroup)?;
    cache.set("repourl", repourl)?;
    cache.set("core.logAllRefUpdates", "true")?;

    if repourl.starts_with("file") {
        log::warn!("Using {repourl} for repo URL.");
        log::warn!("You probably want an ssh URL instead.");
    }

    let kv = crate::kv::KvClient::new(etcdroot, etcdprefix);
    crate::membership::add_to_repogroup(&kv, repogroup, repourl)?;

    Ok(())
}

/// Best-effort defaults for `install`'s optional flags, mirroring the
/// original tool's auto-detection of a repogroup name and URL from the
/// current repository.
pub fn guess_reponame() -> Result<String> {
    let root = reporoot()?;
    let name = root
        .file_name()
        .ok_or_else(|| anyhow!("repository root has no path component"))?
        .to_string_lossy()
        .into_owned();
    Ok(name.strip_suffix(".git").map(str::to_owned).unwrap_or(name))
}

pub fn guess_repourl() -> Result<String> {
    let root = reporoot()?;
    Ok(format!("file://{}", root.display()))
}
