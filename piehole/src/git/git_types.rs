use std::io;

#[derive(Debug)]
pub(crate) struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum GitError {
    #[error("Git failed to execute `{command}`.\n\nstdout:\n{}\nstderr:\n{}", output.stdout, output.stderr)]
    ExecError { command: String, output: GitOutput },

    #[error("Failed to execute git command")]
    IoError(#[from] io::Error),
}
