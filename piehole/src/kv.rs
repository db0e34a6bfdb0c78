//! Client for the external key-value store that piehole treats as the
//! single source of truth for repogroup membership and per-ref agreement.
//!
//! The wire protocol is etcd v1 shaped: a `GET` on a key returns its current
//! value, and a `POST` performs a compare-and-swap write keyed by an
//! optional `prevValue` form field.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use backoff::{backoff::Backoff, ExponentialBackoffBuilder};
use log::{debug, warn};
use serde::Deserialize;

use crate::defaults::DEFAULT_BACKOFF_MAX_ELAPSED_SECONDS;

#[derive(Debug, Deserialize)]
struct ReadResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    action: Option<String>,
}

pub struct KvClient {
    root: String,
    prefix: String,
    http: reqwest::blocking::Client,
}

impl KvClient {
    pub fn new(root: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn key_url(&self, key: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        format!("{}/v1/keys/{}/{}", self.root, self.prefix, encoded)
    }

    /// Read the current value of `key`. `Ok(None)` means the key does not
    /// exist (a 4xx response); any transport failure or 5xx is retried with
    /// backoff and then propagated.
    pub fn read(&self, key: &str) -> Result<Option<String>> {
        with_retry(|| self.read_once(key))
    }

    fn read_once(&self, key: &str) -> Result<RetryOutcome<Option<String>>> {
        let url = self.key_url(key);
        let resp = match self.http.get(&url).send() {
            Ok(resp) => resp,
            Err(err) => return Ok(RetryOutcome::Transient(err.into())),
        };
        let status = resp.status();
        if status.is_client_error() {
            return Ok(RetryOutcome::Done(None));
        }
        if status.is_server_error() {
            return Ok(RetryOutcome::Transient(anyhow::anyhow!(
                "key-value store returned {status}"
            )));
        }
        let parsed: ReadResponse = resp
            .json()
            .context("parsing key-value store read response")?;
        Ok(RetryOutcome::Done(Some(parsed.value)))
    }

    /// Conditionally write `value` to `key`. `prev == None` means an
    /// unconditional write; `prev == Some("")` means "the key must not
    /// already exist" (the encoding `update_hook`/`clobber` use for the
    /// BLANK sentinel). Returns `Ok(true)` iff the store reports the write
    /// as applied (`action == "SET"`); `Ok(false)` on a CAS mismatch
    /// (expected, not retried); transport/5xx failures are retried then
    /// propagated.
    pub fn write(&self, key: &str, value: &str, prev: Option<&str>) -> Result<bool> {
        with_retry(|| self.write_once(key, value, prev))
    }

    fn write_once(&self, key: &str, value: &str, prev: Option<&str>) -> Result<RetryOutcome<bool>> {
        let url = self.key_url(key);
        let mut form = vec![("value", value)];
        if let Some(prev) = prev {
            form.push(("prevValue", prev));
        }
        let resp = match self.http.post(&url).form(&form).send() {
            Ok(resp) => resp,
            Err(err) => return Ok(RetryOutcome::Transient(err.into())),
        };
        let status = resp.status();
        if status.is_server_error() {
            return Ok(RetryOutcome::Transient(anyhow::anyhow!(
                "key-value store returned {status}"
            )));
        }
        let parsed: WriteResponse = resp
            .json()
            .context("parsing key-value store write response")?;
        let applied = parsed.action.as_deref() == Some("SET");
        if !applied {
            debug!("CAS write to {key} rejected by key-value store");
        }
        Ok(RetryOutcome::Done(applied))
    }
}

enum RetryOutcome<T> {
    Done(T),
    Transient(anyhow::Error),
}

fn with_retry<T>(mut op: impl FnMut() -> Result<RetryOutcome<T>>) -> Result<T> {
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::from_secs(
            DEFAULT_BACKOFF_MAX_ELAPSED_SECONDS,
        )))
        .build();

    loop {
        match op()? {
            RetryOutcome::Done(value) => return Ok(value),
            RetryOutcome::Transient(err) => {
                match backoff.next_backoff() {
                    Some(delay) => {
                        warn!("transient key-value store failure: {err}, retrying");
                        std::thread::sleep(delay);
                    }
                    None => bail!(err),
                }
            }
        }
    }
}
