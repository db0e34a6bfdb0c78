//! Shared scaffolding for the end-to-end replication tests: a minimal
//! in-process stand-in for the etcd-like key-value store (built on
//! `tiny_http`, the same crate the real daemon uses), plus small wrappers
//! around spawning the compiled `piehole` binary and bare git repositories.
//!
//! The hook files an `install` run copies are byte-for-byte copies of
//! whichever executable ran `install` (see `sanity::sanity_check`'s
//! identity check), so these tests always drive `install`/`daemon` through
//! the actual compiled `piehole` binary (`CARGO_BIN_EXE_piehole`) rather
//! than calling library functions in-process -- in-process, "the currently
//! running executable" would be the test harness binary, not `piehole`.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tiny_http::{Method, Response, Server};

static NEXT_FAKE_ETCD_PORT: AtomicU16 = AtomicU16::new(19712);

pub fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_piehole"))
}

fn hermetic_env_vars() -> [(&'static str, &'static str); 6] {
    [
        ("GIT_CONFIG_NOSYSTEM", "true"),
        ("GIT_CONFIG_GLOBAL", "/dev/null"),
        ("GIT_AUTHOR_NAME", "testuser"),
        ("GIT_AUTHOR_EMAIL", "testuser@example.com"),
        ("GIT_COMMITTER_NAME", "testuser"),
        ("GIT_COMMITTER_EMAIL", "testuser@example.com"),
    ]
}

pub fn run_git(args: &[&str], dir: &Path) {
    let status = Command::new("git")
        .args(args)
        .envs(hermetic_env_vars())
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("failed to spawn git");
    assert!(status.success(), "git {args:?} failed in {dir:?}");
}

pub fn init_bare_repo(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    run_git(&["init", "--bare", "--initial-branch", "master"], dir);
}

pub fn init_work_repo(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    run_git(&["init", "--initial-branch", "master"], dir);
    run_git(&["commit", "--allow-empty", "-m", "initial"], dir);
}

pub fn commit(dir: &Path, message: &str) {
    std::fs::write(dir.join("README"), message).unwrap();
    run_git(&["add", "README"], dir);
    run_git(&["commit", "-m", message], dir);
}

pub fn repo_url(dir: &Path) -> String {
    format!("file://{}", dir.display())
}

/// Run `git push <remote> <refspec>`, returning the combined output on
/// failure so callers can assert on piehole's retry-hint text.
pub fn try_push(dir: &Path, remote: &str, refspec: &str) -> Result<(), String> {
    let output = Command::new("git")
        .args(["push", remote, refspec])
        .envs(hermetic_env_vars())
        .current_dir(dir)
        .output()
        .expect("failed to spawn git push");
    if output.status.success() {
        Ok(())
    } else {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(combined)
    }
}

pub fn push(dir: &Path, remote: &str, refspec: &str) {
    try_push(dir, remote, refspec).expect("push should have succeeded");
}

/// Push, retrying while piehole asks for a retry (its update hook rejects
/// with a stderr message containing "try your push again" or "Failed to
/// update" while replication is still converging). Mirrors the original
/// test suite's `repeat_push`.
pub fn repeat_push(dir: &Path, remote: &str, refspec: &str, attempts: u32) -> Result<(), String> {
    let mut last_err = String::new();
    for _ in 0..attempts {
        match try_push(dir, remote, refspec) {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = err;
                std::thread::sleep(Duration::from_millis(250));
            }
        }
    }
    Err(last_err)
}

pub fn install(
    repo_dir: &Path,
    repogroup: &str,
    repourl: &str,
    etcdroot: &str,
    etcdprefix: &str,
) {
    let output = Command::new(bin_path())
        .args([
            "install",
            "--repogroup",
            repogroup,
            "--repourl",
            repourl,
            "--etcdroot",
            etcdroot,
            "--etcdprefix",
            etcdprefix,
        ])
        .envs(hermetic_env_vars())
        .current_dir(repo_dir)
        .output()
        .expect("failed to spawn piehole install");
    assert!(
        output.status.success(),
        "piehole install failed: {}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn clobber(repo_dir: &Path, ref_name: &str) -> Result<(), String> {
    let output = Command::new(bin_path())
        .args(["clobber", ref_name])
        .envs(hermetic_env_vars())
        .current_dir(repo_dir)
        .output()
        .expect("failed to spawn piehole clobber");
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

/// A running copy of the real `piehole daemon`, killed when dropped so a
/// panicking assertion never leaves port 3690 bound for the next test.
pub struct TestDaemon {
    child: Child,
}

impl TestDaemon {
    pub fn start() -> Self {
        let child = Command::new(bin_path())
            .arg("daemon")
            .envs(hermetic_env_vars())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn piehole daemon");
        let daemon = TestDaemon { child };
        daemon.wait_until_ready();
        daemon
    }

    fn wait_until_ready(&self) {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if client.get("http://127.0.0.1:3690").send().is_ok() {
                return;
            }
            if Instant::now() > deadline {
                panic!("piehole daemon never became ready on port 3690");
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// An in-process stand-in for the etcd v1 HTTP API piehole's `kv` module
/// speaks: `GET`/`POST` on `/v1/keys/<prefix>/<key>` with compare-and-swap
/// semantics keyed by the `prevValue` form field.
pub struct FakeEtcd {
    pub url: String,
}

type Store = Arc<Mutex<HashMap<String, String>>>;

impl FakeEtcd {
    pub fn start() -> Self {
        let port = NEXT_FAKE_ETCD_PORT.fetch_add(1, Ordering::SeqCst);
        let server = Server::http(("127.0.0.1", port))
            .unwrap_or_else(|e| panic!("failed to bind fake etcd on {port}: {e}"));
        let store: Store = Arc::new(Mutex::new(HashMap::new()));
        std::thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let path = request.url().to_owned();
                let method = request.method().clone();
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let response = handle(&store, &method, &path, &body);
                let _ = request.respond(response);
            }
        });
        FakeEtcd {
            url: format!("http://127.0.0.1:{port}"),
        }
    }
}

fn handle(
    store: &Store,
    method: &Method,
    path: &str,
    body: &str,
) -> Response<Cursor<Vec<u8>>> {
    if !path.starts_with("/v1/keys/") {
        return Response::from_string("not found").with_status_code(404);
    }
    match method {
        Method::Get => {
            let store = store.lock().unwrap();
            match store.get(path) {
                Some(value) => {
                    json_response(200, &format!(r#"{{"value":"{}"}}"#, json_escape(value)))
                }
                None => Response::from_string("not found").with_status_code(404),
            }
        }
        Method::Post => {
            let mut value = None;
            let mut prev = None;
            let mut has_prev = false;
            for (key, val) in parse_form(body) {
                match key.as_str() {
                    "value" => value = Some(val),
                    "prevValue" => {
                        prev = Some(val);
                        has_prev = true;
                    }
                    _ => {}
                }
            }
            let value = match value {
                Some(v) => v,
                None => return Response::from_string("missing value").with_status_code(400),
            };

            let mut store = store.lock().unwrap();
            let current = store.get(path).cloned();
            let matches_prev = if has_prev {
                current.as_deref().unwrap_or("") == prev.as_deref().unwrap_or("")
            } else {
                true
            };

            if matches_prev {
                store.insert(path.to_owned(), value);
                json_response(200, r#"{"action":"SET"}"#)
            } else {
                json_response(409, r#"{"action":null}"#)
            }
        }
        _ => Response::from_string("method not allowed").with_status_code(400),
    }
}

fn json_response(status: u16, body: &str) -> Response<Cursor<Vec<u8>>> {
    Response::from_string(body.to_owned()).with_status_code(status)
}

fn json_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Decode a single `application/x-www-form-urlencoded` token: `+` is a
/// space, `%XX` is a percent-escaped byte. Hand-rolled rather than pulled
/// from a crate because this is purely test scaffolding decoding exactly
/// the encoding `kv::KvClient` and `reqwest::RequestBuilder::form` produce.
fn urlform_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    Ok(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    Err(_) => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_form(body: &str) -> Vec<(String, String)> {
    if body.is_empty() {
        return Vec::new();
    }
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (urlform_decode(k), urlform_decode(v)),
            None => (urlform_decode(pair), String::new()),
        })
        .collect()
}
