use clap::CommandFactory;
use std::env;
use std::fs;
use std::path::PathBuf;

const EXPECTED_PAGES: &[&str] = &[
    "piehole.1",
    "piehole-install.1",
    "piehole-check.1",
    "piehole-daemon.1",
    "piehole-clobber.1",
    "piehole-members.1",
    "piehole-help.1",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    let version = env::var("CARGO_PKG_VERSION").unwrap();
    let version: &'static str = Box::leak(version.into_boxed_str());

    let workspace_root = out_dir.join("../../../../../");
    let man_dir = workspace_root.join("man").join("man1");
    let docs_dir = workspace_root.join("docs");

    fs::create_dir_all(&man_dir).unwrap();
    fs::create_dir_all(&docs_dir).unwrap();

    // Generate manpages for the main command and all subcommands
    let mut cmd = piehole_cli_types::Cli::command();
    cmd = cmd.version(version);
    let man = clap_mangen::Man::new(cmd);
    let mut buffer: Vec<u8> = Default::default();
    man.render(&mut buffer).unwrap();
    let main_man_path = man_dir.join("piehole.1");
    fs::write(&main_man_path, &buffer).unwrap();

    // Generate manpages for subcommands
    let mut cmd = piehole_cli_types::Cli::command();
    cmd = cmd.version(version);
    for subcmd in cmd.get_subcommands() {
        let man = clap_mangen::Man::new(subcmd.clone());
        let mut buffer: Vec<u8> = Default::default();
        man.render(&mut buffer).unwrap();
        let subcmd_name = subcmd.get_name();
        let subcmd_man_path = man_dir.join(format!("piehole-{subcmd_name}.1"));
        fs::write(&subcmd_man_path, &buffer).unwrap();
    }

    debug_assert!(!EXPECTED_PAGES.is_empty());

    // Generate markdown documentation
    let main_markdown = clap_markdown::help_markdown::<piehole_cli_types::Cli>();
    let markdown_path = docs_dir.join("manpage.md");
    fs::write(&markdown_path, &main_markdown).unwrap();

    // Tell cargo to re-run this if the CLI definition changes
    println!("cargo:rerun-if-changed=../cli_types/src/lib.rs");

    Ok(())
}
