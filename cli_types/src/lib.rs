use anyhow::{anyhow, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, name = "piehole")]
pub struct Cli {
    /// Increase verbosity level (can be specified multiple times.) The first level sets level
    /// "info", second sets level "debug", and third sets level "trace" for the logger.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Create a versionless command for manpage generation
    pub fn command_without_version() -> clap::Command {
        let mut cmd = Self::command();
        cmd = cmd.version(None::<&str>);
        cmd
    }
}

#[derive(Args)]
pub struct InstallArgs {
    /// Repogroup to join. Defaults to this repository's directory name
    /// (with a trailing `.git` stripped).
    #[arg(long)]
    pub repogroup: Option<String>,

    /// URL other members should use to reach this repo. Defaults to a
    /// `file://` URL pointing at this repository, which is almost never
    /// what you want outside of local testing.
    #[arg(long, value_parser = parse_nonempty_string)]
    pub repourl: Option<String>,

    /// Root of the key-value store used as the replication authority
    #[arg(long, default_value = "http://127.0.0.1:4001")]
    pub etcdroot: String,

    /// Prefix under which this repogroup's keys are namespaced in the
    /// key-value store
    #[arg(long, default_value = "piehole")]
    pub etcdprefix: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enroll this bare repository into a repogroup.
    ///
    /// Installs the `update` and `post-update` hooks (copies of this
    /// executable), sets the `piehole.*` local config, and adds this
    /// repository's URL to the repogroup's membership list.
    ///
    /// Refuses to run if hooks already exist at `hooks/update` or
    /// `hooks/post-update` and are not byte-identical to this executable.
    Install {
        #[command(flatten)]
        args: InstallArgs,
    },

    /// Verify that this repository is correctly configured for
    /// replication: it is bare, `core.logAllRefUpdates` is on, the
    /// `piehole.*` config keys are all set, the installed hooks are
    /// executable and match this binary, and the local transfer daemon is
    /// reachable.
    Check {},

    /// Run the local transfer daemon in the foreground.
    ///
    /// Listens on `127.0.0.1:3690` for fan-out requests from the `update`
    /// and `post-update` hooks of every repository on this host, and
    /// performs the actual `git push`/`git fetch` to peers off the
    /// critical path of the originating push.
    Daemon {
        /// Append daemon log output to this file instead of stderr
        #[arg(long)]
        logfile: Option<PathBuf>,
    },

    /// Forcibly overwrite the repogroup's agreed value for a ref with this
    /// repository's own current value.
    ///
    /// Use this to unstick a repogroup whose key-value entry has been
    /// driven to a value no member can ever legitimately produce (for
    /// example after a key was hand-edited to something bogus). Bypasses
    /// compare-and-swap entirely: the write is unconditional.
    Clobber {
        /// Ref to clobber. Defaults to `refs/heads/master`
        #[arg(default_value = "refs/heads/master")]
        ref_name: String,
    },

    /// Print the sorted list of member URLs currently enrolled in this
    /// repository's repogroup.
    Members {},

    /// Print usage information.
    Help {},
}

fn parse_nonempty_string(s: &str) -> Result<String> {
    if s.is_empty() {
        Err(anyhow!("must not be empty"))
    } else {
        Ok(String::from(s))
    }
}
