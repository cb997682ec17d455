use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Compilation failed: {0}")]
    Compilation(String),

    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    #[error("Invocation failed: {0}")]
    Invocation(String),

    #[error("Engine configuration rejected: {0}")]
    Engine(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Misuse of the [`crate::host::ExecutionHost`] state machine, or a run that
/// could not be started.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no program is running")]
    NotRunning,

    #[error("artifact is empty; the compiler did not produce bytecode")]
    CompileFailure,

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
