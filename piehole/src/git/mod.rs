pub mod git_definitions;
pub(crate) mod git_lowlevel;
pub(crate) mod git_types;

mod git_interop;
pub use git_interop::{
    fetch_ref_at, push_ref_at, reporef, reporef_at, reporoot, reporoot_at, run_git, run_git_at,
    set_ref, ConfigCache,
};

pub use git_lowlevel::check_git_version;
