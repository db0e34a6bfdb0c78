/// Minimum supported git version. `update-ref --stdin` transactions and
/// `--no-deref` are assumed to be available.
pub const EXPECTED_VERSION: (i32, i32, i32) = (2, 30, 0);

/// Git config keys live under this prefix unless they already contain a dot
/// (in which case they are passed straight through to `git config`).
pub const CONFIG_PREFIX: &str = "piehole";

/// Default root of the key-value store used as the replication authority.
pub const DEFAULT_ETCD_ROOT: &str = "http://127.0.0.1:4001";

/// Default prefix under which repogroup keys are namespaced in the
/// key-value store.
pub const DEFAULT_ETCD_PREFIX: &str = "piehole";

/// Port the local transfer daemon listens on, loopback-only.
pub const DAEMON_PORT: u16 = 3690;

/// Sentinel object id meaning "no such ref". Forty zero hex digits, same
/// width as a real object id. Never change this: it is also understood by
/// any other member of a repogroup still running an older build.
pub const BLANK: &str = "0000000000000000000000000000000000000000";

/// Hook file names placed into `hooks/` at install time.
pub const HOOK_NAMES: &[&str] = &["update", "post-update"];
