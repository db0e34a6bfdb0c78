//! The update-hook decision table and the post-update fan-out trigger: the
//! core of what makes a push to one member show up on every other member.

use anyhow::{anyhow, Result};
use log::{info, warn};

use crate::daemon::client::request_transfer;
use crate::git::git_definitions::BLANK;
use crate::git::{reporef, set_ref, ConfigCache};
use crate::kv::KvClient;
use crate::membership::add_to_repogroup;
use crate::sanity::sanity_check;

/// Run the `sanity_check` + membership-join preamble every hook performs
/// before its own logic, then run `body`. The Rust stand-in for the
/// original's `@register` decorator.
pub fn registered<T>(cache: &ConfigCache, kv: &KvClient, body: impl FnOnce() -> Result<T>) -> Result<T> {
    sanity_check(cache, true)?;
    let repogroup = cache
        .get("repogroup")
        .ok_or_else(|| anyhow!("piehole.repogroup not set"))?;
    let repourl = cache
        .get("repourl")
        .ok_or_else(|| anyhow!("piehole.repourl not set"))?;
    add_to_repogroup(kv, &repogroup, &repourl)?;
    body()
}

/// Decide whether to accept a ref update. Returns `Ok(true)` to accept
/// (hook should exit 0), `Ok(false)` to reject (hook should exit 1, having
/// already printed a retry hint to stderr via `log::warn!`).
pub fn run_update_hook(
    cache: &ConfigCache,
    kv: &KvClient,
    reference: &str,
    old: &str,
    new: &str,
) -> Result<bool> {
    let repogroup = cache
        .get("repogroup")
        .ok_or_else(|| anyhow!("piehole.repogroup not set"))?;
    let key = format!("{repogroup} {reference}");

    let current = kv.read(&key)?;
    if current.as_deref() == Some(new) {
        // Safe even if the key changed underneath us since this read: some
        // writer already agreed on exactly the value we're pushing.
        info!("Accepting replication of {reference} from {old} to {new}");
        return Ok(true);
    }

    let old_for_cas = if old == BLANK { "" } else { old };
    if kv.write(&key, new, Some(old_for_cas))? {
        info!("Updating {reference} from {old} to {new}.");
        return Ok(true);
    }

    match current {
        Some(known) if set_ref(reference, &known).is_ok() => {
            info!("Setting {reference} to known commit {known}");
        }
        _ => {
            request_transfer(reference, "fetch");
            info!("Started fetch of {reference}");
        }
    }

    warn!("Failed to update {reference}. Replication in progress.");
    warn!("Please try your push again.");
    Ok(false)
}

/// Fan out every updated ref to the rest of the repogroup via the local
/// transfer daemon, and return immediately: this is what keeps the hook
/// fast.
pub fn run_post_update_hook(refs: &[String]) {
    for reference in refs {
        request_transfer(reference, "push");
    }
}

/// Forcibly overwrite the repogroup's agreed value for `reference` with
/// this repo's own current value, bypassing CAS entirely. Unsticks a
/// repogroup whose key has been driven to a value no member can produce.
pub fn clobber(cache: &ConfigCache, kv: &KvClient, reference: &str) -> Result<()> {
    let repogroup = cache
        .get("repogroup")
        .ok_or_else(|| anyhow!("piehole.repogroup not set"))?;
    let local_value = reporef(reference);
    let key = format!("{repogroup} {reference}");
    kv.write(&key, &local_value, None)?;
    Ok(())
}
