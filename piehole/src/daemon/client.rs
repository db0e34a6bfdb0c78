//! The hook-side half of the daemon protocol: a thin, best-effort HTTP
//! client. Hooks never block waiting for a transfer to finish, so every
//! function here only waits for the daemon to *accept* the request.

use std::time::Duration;

use log::warn;

use crate::git::{git_definitions::DAEMON_PORT, reporoot};

fn daemon_url() -> String {
    format!("http://127.0.0.1:{DAEMON_PORT}")
}

/// True if the daemon answers a liveness probe. Used by `sanity_check`.
pub fn ping_daemon() -> bool {
    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };
    match client.get(daemon_url()).send() {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Ask the daemon to push or fetch `reference` to/from the rest of this
/// repo's group. Fire-and-forget: a failure to even reach the daemon is
/// logged and swallowed, because the caller is a hook that must return
/// quickly regardless. (Hook-level reachability problems are instead
/// caught up front by `sanity_check`'s own daemon probe.)
pub fn request_transfer(reference: &str, action: &str) {
    let repo = match reporoot() {
        Ok(root) => root,
        Err(err) => {
            warn!("could not determine repo root for transfer request: {err}");
            return;
        }
    };

    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            warn!("could not build HTTP client for transfer request: {err}");
            return;
        }
    };

    let form = [
        ("action", action),
        ("repo", &repo.display().to_string()),
        ("ref", reference),
    ];

    if let Err(err) = client.post(daemon_url()).form(&form).send() {
        warn!("failed to reach piehole daemon for {action} of {reference}: {err}");
    }
}
