use std::process::ExitCode;

use piehole::cli;

fn init_hook_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Git invokes hooks by the basename it was installed under, not through
/// any flag of ours, so the hook entrypoints are dispatched on `argv[0]`
/// before handing off to the normal clap-parsed CLI.
fn main() -> ExitCode {
    let argv0 = std::env::args().next().unwrap_or_default();
    let hook_name = std::path::Path::new(&argv0)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match hook_name {
        "update" => {
            init_hook_logging();
            match cli::run_update_hook_entrypoint(&args) {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::FAILURE,
                Err(err) => {
                    log::error!("{err}");
                    ExitCode::FAILURE
                }
            }
        }
        "post-update" => {
            init_hook_logging();
            match cli::run_post_update_hook_entrypoint(&args) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    log::error!("{err}");
                    ExitCode::FAILURE
                }
            }
        }
        _ => match cli::handle_calls() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("{err}");
                ExitCode::FAILURE
            }
        },
    }
}
