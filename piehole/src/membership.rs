//! The CAS loop that keeps a repogroup's membership list converged:
//! every install (or re-install after an external edit dropped a member)
//! adds this repo's URL to the sorted, deduplicated list stored under the
//! repogroup's key.

use anyhow::Result;

use crate::kv::KvClient;

/// The sorted membership list for `repogroup`. Empty if the key does not
/// exist yet.
pub fn repogroup_members(kv: &KvClient, repogroup: &str) -> Result<Vec<String>> {
    let mut present: Vec<String> = kv
        .read(repogroup)?
        .map(|value| {
            value
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    present.sort();
    Ok(present)
}

/// Add `repourl` to `repogroup`'s membership list if it is not already
/// present, retrying the compare-and-swap until it either observes itself
/// already a member or succeeds in adding itself. Every CAS failure yields
/// a fresh read, so the loop always makes progress against a competing
/// writer.
pub fn add_to_repogroup(kv: &KvClient, repogroup: &str, repourl: &str) -> Result<()> {
    loop {
        let present = repogroup_members(kv, repogroup)?;
        if present.iter().any(|m| m == repourl) {
            return Ok(());
        }
        let old_members = present.join(" ");
        let mut new_members = present;
        new_members.push(repourl.to_owned());
        new_members.sort();
        let new_members = new_members.join(" ");

        let prev = if old_members.is_empty() {
            Some("")
        } else {
            Some(old_members.as_str())
        };
        if kv.write(repogroup, &new_members, prev)? {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    fn client(server: &Server) -> KvClient {
        KvClient::new(server.url_str("").trim_end_matches('/').to_owned(), "piehole")
    }

    #[test]
    fn test_repogroup_members_empty_when_unset() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET")).respond_with(status_code(404)),
        );
        let kv = client(&server);
        assert_eq!(repogroup_members(&kv, "widgets").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_repogroup_members_sorted() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET"))
                .respond_with(json_encoded(serde_json::json!({"value": "z y a"}))),
        );
        let kv = client(&server);
        assert_eq!(
            repogroup_members(&kv, "widgets").unwrap(),
            vec!["a".to_owned(), "y".to_owned(), "z".to_owned()]
        );
    }

    #[test]
    fn test_add_to_repogroup_noop_when_already_present() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET"))
                .respond_with(json_encoded(serde_json::json!({"value": "file:///a file:///b"}))),
        );
        let kv = client(&server);
        add_to_repogroup(&kv, "widgets", "file:///a").unwrap();
    }

    #[test]
    fn test_add_to_repogroup_writes_on_absence() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET"))
                .times(1)
                .respond_with(status_code(404)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method("POST"),
                request::body(contains("prevValue="))
            ])
            .respond_with(json_encoded(serde_json::json!({"action": "SET"}))),
        );
        let kv = client(&server);
        add_to_repogroup(&kv, "widgets", "file:///a").unwrap();
    }
}
