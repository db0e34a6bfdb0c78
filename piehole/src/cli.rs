use anyhow::{bail, Result};
use clap::Parser;
use env_logger::Env;
use log::Level;
use piehole_cli_types::{Cli, Commands};

use crate::daemon;
use crate::git::{check_git_version, ConfigCache};
use crate::kv::KvClient;
use crate::membership::repogroup_members;
use crate::replication::{clobber, registered};
use crate::sanity::{guess_reponame, guess_repourl, install, sanity_check};

pub fn handle_calls() -> Result<()> {
    let cli = Cli::parse();
    let logger_level = match cli.verbose {
        0 => Level::Warn,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };

    // The daemon is the one subcommand that is meant to run forever and
    // does not talk to a repository, so it skips the git-version check
    // (and the `check_git_version` call itself already requires a git
    // binary to be present, which a pure transfer daemon doesn't need).
    // It also owns its own `env_logger::init()` (to support `--logfile`),
    // so the logger must not be initialized here first -- `env_logger`
    // panics on a second `init()` call.
    if let Commands::Daemon { logfile } = cli.command {
        return daemon::run(logfile);
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(logger_level.as_str())).init();

    check_git_version()?;

    match cli.command {
        Commands::Daemon { .. } => unreachable!("handled above"),
        Commands::Install { args } => {
            let cache = ConfigCache::new();
            let repogroup = match args.repogroup {
                Some(r) => r,
                None => guess_reponame()?,
            };
            let repourl = match args.repourl {
                Some(r) => r,
                None => guess_repourl()?,
            };
            install(&cache, &repogroup, &repourl, &args.etcdroot, &args.etcdprefix)
        }
        Commands::Check {} => {
            let cache = ConfigCache::new();
            sanity_check(&cache, true)?;
            println!("OK");
            Ok(())
        }
        Commands::Clobber { ref_name } => {
            let cache = ConfigCache::new();
            let kv = kv_client(&cache)?;
            clobber(&cache, &kv, &ref_name)
        }
        Commands::Members {} => {
            let cache = ConfigCache::new();
            let kv = kv_client(&cache)?;
            let repogroup = cache
                .get("repogroup")
                .ok_or_else(|| anyhow::anyhow!("piehole.repogroup not set"))?;
            for member in repogroup_members(&kv, &repogroup)? {
                println!("{member}");
            }
            Ok(())
        }
        Commands::Help {} => {
            Cli::command_without_version()
                .print_help()
                .map_err(anyhow::Error::from)
        }
    }
}

fn kv_client(cache: &ConfigCache) -> Result<KvClient> {
    let root = cache
        .get("etcdroot")
        .ok_or_else(|| anyhow::anyhow!("piehole.etcdroot not set"))?;
    let prefix = cache
        .get("etcdprefix")
        .ok_or_else(|| anyhow::anyhow!("piehole.etcdprefix not set"))?;
    Ok(KvClient::new(root, prefix))
}

/// Run the `update` hook, dispatched from `main` before normal CLI parsing
/// (the hook is invoked by git as `hooks/update <ref> <old> <new>`, not
/// through any clap-recognized argument shape).
pub fn run_update_hook_entrypoint(args: &[String]) -> Result<bool> {
    let [reference, old, new] = args else {
        bail!("update hook expects exactly 3 arguments: <ref> <old> <new>");
    };
    let cache = ConfigCache::new();
    let kv = kv_client(&cache)?;
    registered(&cache, &kv, || {
        crate::replication::run_update_hook(&cache, &kv, reference, old, new)
    })
}

/// Run the `post-update` hook, dispatched the same way.
pub fn run_post_update_hook_entrypoint(refs: &[String]) -> Result<()> {
    let cache = ConfigCache::new();
    let kv = kv_client(&cache)?;
    registered(&cache, &kv, || {
        crate::replication::run_post_update_hook(refs);
        Ok(())
    })
}
