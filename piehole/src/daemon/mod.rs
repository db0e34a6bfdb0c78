//! The local transfer daemon: a loopback-only HTTP server that takes
//! push/fetch requests off a hook's critical path. One worker thread per
//! accepted connection, matching the spec's "pre-accept fork" requirement
//! without needing a real `fork(2)`.

pub mod client;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tiny_http::{Method, Request, Response, Server};

use crate::git::{git_definitions::DAEMON_PORT, fetch_ref_at, push_ref_at, ConfigCache};
use crate::kv::KvClient;
use crate::membership::repogroup_members;
use crate::sanity::sanity_check;

/// Run the daemon in the foreground until the process is killed.
pub fn run(logfile: Option<PathBuf>) -> Result<()> {
    init_logging(logfile)?;

    let server = Server::http(("127.0.0.1", DAEMON_PORT))
        .map_err(|e| anyhow::anyhow!("failed to bind daemon port {DAEMON_PORT}: {e}"))?;
    let server = Arc::new(server);
    info!("piehole daemon listening on 127.0.0.1:{DAEMON_PORT}");

    for request in server.incoming_requests() {
        std::thread::spawn(move || handle_request(request));
    }

    Ok(())
}

fn init_logging(logfile: Option<PathBuf>) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    );
    if let Some(path) = logfile {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening daemon logfile at {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

#[derive(Debug, Default)]
struct TransferRequest {
    action: String,
    repo: Option<PathBuf>,
    reference: Option<String>,
}

fn parse_form(body: &str) -> TransferRequest {
    let mut parsed = TransferRequest::default();
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "action" => parsed.action = value.into_owned(),
            "repo" => parsed.repo = Some(PathBuf::from(value.into_owned())),
            "ref" => parsed.reference = Some(value.into_owned()),
            _ => {}
        }
    }
    parsed
}

fn handle_request(mut request: Request) {
    let response = match *request.method() {
        Method::Get => Response::from_string("").with_status_code(204),
        Method::Post => {
            let mut body = String::new();
            if let Err(err) = request.as_reader().read_to_string(&mut body) {
                warn!("failed to read request body: {err}");
                Response::from_string(format!("Error reading request body: {err}"))
                    .with_status_code(400)
            } else {
                handle_post(&body)
            }
        }
        _ => Response::from_string("Error: unsupported method").with_status_code(400),
    };

    if let Err(err) = request.respond(response) {
        warn!("failed to write daemon response: {err}");
    }
}

fn handle_post(body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    let parsed = parse_form(body);
    match parsed.action.as_str() {
        "ping" => Response::from_string("").with_status_code(200),
        "push" | "fetch" => {
            let (repo, reference) = match (parsed.repo.clone(), parsed.reference.clone()) {
                (Some(repo), Some(reference)) => (repo, reference),
                _ => {
                    return Response::from_string("Error: missing repo or ref parameter")
                        .with_status_code(400)
                }
            };
            let action = parsed.action.clone();

            // Gate the response on the sanity check: a repo that isn't
            // correctly configured for replication gets a 400 with the
            // failure, not a 200 that promises a transfer which never
            // happens.
            let cache = ConfigCache::at(Some(repo.clone()));
            if let Err(err) = sanity_check(&cache, true) {
                return Response::from_string(format!("{err}")).with_status_code(400);
            }

            std::thread::spawn(move || transfer(cache, &repo, &reference, &action));
            Response::from_string("").with_status_code(200)
        }
        other => Response::from_string(format!("Error: unknown action '{other}'"))
            .with_status_code(400),
    }
}

/// Push or fetch `reference` to/from every other member of `repo`'s
/// repogroup, stopping at the first success for a fetch (any one
/// up-to-date peer is enough) and attempting every peer for a push (a
/// best-effort broadcast). `cache` has already passed `sanity_check` in
/// `handle_post`, so its required `piehole.*` keys are known to be set.
fn transfer(cache: ConfigCache, repo: &std::path::Path, reference: &str, action: &str) {
    info!("Transferring {reference}");

    let (etcdroot, etcdprefix, repogroup, repourl) = match (
        cache.get("etcdroot"),
        cache.get("etcdprefix"),
        cache.get("repogroup"),
        cache.get("repourl"),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => {
            warn!("incomplete piehole config for {}", repo.display());
            return;
        }
    };

    let kv = KvClient::new(etcdroot, etcdprefix);
    let members = match repogroup_members(&kv, &repogroup) {
        Ok(members) => members,
        Err(err) => {
            warn!("failed to read repogroup membership: {err}");
            return;
        }
    };

    let refname = short_refname(reference);
    let refname = match refname {
        Some(r) => r,
        None => {
            warn!("don't know how to transfer unknown ref kind {reference}");
            return;
        }
    };

    for peer in members.iter().filter(|m| m.as_str() != repourl) {
        let result = if action == "fetch" {
            fetch_ref_at(Some(repo), peer, refname)
        } else {
            push_ref_at(Some(repo), peer, refname)
        };
        match result {
            Ok(()) => {
                if action == "fetch" {
                    info!("Fetched {reference} from {peer}");
                    return;
                }
                info!("Pushed {reference} to {peer}");
            }
            Err(err) => warn!("{action} of {reference} to/from {peer} failed: {err}"),
        }
    }
}

fn short_refname(reference: &str) -> Option<&str> {
    reference
        .strip_prefix("refs/heads/")
        .or_else(|| reference.strip_prefix("refs/tags/"))
}
