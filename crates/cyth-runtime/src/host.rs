use std::sync::Arc;
use std::time::{Duration, Instant};

use cyth_sourcemap::{DebugDescriptor, INTERNAL_ERROR, RawFault, symbolicate};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::SandboxConfig;
use crate::console::ConsoleLog;
use crate::error::{HostError, RuntimeError};
use crate::runner::{Command, InputEvent, RunnerEvent, RunnerHandle, RunnerState, SandboxRunner};
use crate::runtime_context::RuntimeContext;
use crate::surface::{DisplayList, Surface};

/// Logged when the compiler handed over an empty artifact.
pub const COMPILER_ERROR_MESSAGE: &str = "Cannot run program due to internal compiler error.";

/// Logged after a user-requested stop.
pub const TERMINATED_NOTICE: &str = "Program was terminated.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Output(String),
    Stopped { elapsed: Duration },
    /// `message` is symbolicated when the run had a usable descriptor.
    Crashed { message: String, elapsed: Duration },
}

/// Everything the host knows about the run in progress.
struct RunSession {
    run_id: u64,
    artifact_digest: String,
    started: Instant,
    /// Kept as bytes; only parsed if the run crashes.
    debug: Option<Vec<u8>>,
    runner: RunnerHandle,
    events: UnboundedReceiver<RunnerEvent>,
}

/// Supervises at most one sandbox run at a time.
///
/// The host is driven by its owner: call [`ExecutionHost::next_event`] to
/// relay runner events into the console log, and
/// [`ExecutionHost::animation_frame`] from a frame clock for animated
/// programs. Dropping the session (stop, crash, or a new upload) terminates
/// its runner and discards anything it sends afterwards.
pub struct ExecutionHost {
    runtime: Arc<RuntimeContext>,
    config: SandboxConfig,
    next_run_id: u64,
    session: Option<RunSession>,
    log: ConsoleLog,
    /// Frozen duration of the last finished run.
    elapsed: Option<Duration>,
    last_error: Option<String>,
}

impl ExecutionHost {
    pub fn new(config: SandboxConfig) -> Result<Self, RuntimeError> {
        let runtime = Arc::new(RuntimeContext::new(&config.engine)?);
        Ok(Self::with_runtime(runtime, config))
    }

    pub fn with_runtime(runtime: Arc<RuntimeContext>, config: SandboxConfig) -> Self {
        let log = ConsoleLog::new(config.host.log_capacity);
        Self {
            runtime,
            config,
            next_run_id: 0,
            session: None,
            log,
            elapsed: None,
            last_error: None,
        }
    }

    /// Start running `artifact`, replacing any run already in progress.
    pub fn upload(&mut self, artifact: Vec<u8>, debug: Option<Vec<u8>>) -> Result<(), HostError> {
        self.upload_with_surface(artifact, debug, Box::new(DisplayList::new()))
    }

    /// Like [`ExecutionHost::upload`], drawing into a caller-supplied surface.
    pub fn upload_with_surface(
        &mut self,
        artifact: Vec<u8>,
        debug: Option<Vec<u8>>,
        surface: Box<dyn Surface>,
    ) -> Result<(), HostError> {
        if artifact.is_empty() {
            tracing::warn!("Compiler produced an empty artifact, not starting a run");
            self.log.clear();
            self.log.error(COMPILER_ERROR_MESSAGE);
            return Err(HostError::CompileFailure);
        }

        if let Some(mut previous) = self.session.take() {
            tracing::info!(run_id = previous.run_id, "Replacing active run");
            previous.runner.terminate();
        }

        self.next_run_id += 1;
        let run_id = self.next_run_id;
        let artifact_digest = hex::encode(Sha256::digest(&artifact));

        self.log.clear();
        self.last_error = None;

        let (runner, events) = match SandboxRunner::spawn(
            Arc::clone(&self.runtime),
            self.config.runner.clone(),
            run_id,
            artifact,
            surface,
        ) {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::warn!(run_id, "Failed to start runner: {e}");
                let message = e.to_string();
                self.log.error(message.clone());
                self.last_error = Some(message);
                return Err(e.into());
            }
        };

        let has_debug = debug.is_some();
        tracing::info!(run_id, artifact = %artifact_digest, has_debug, "Run started");

        self.session = Some(RunSession {
            run_id,
            artifact_digest,
            started: Instant::now(),
            debug,
            runner,
            events,
        });
        Ok(())
    }

    /// User-initiated stop. Only valid while a program is running.
    pub fn request_stop(&mut self) -> Result<Duration, HostError> {
        let mut session = self.session.take().ok_or(HostError::NotRunning)?;
        session.runner.terminate();

        let elapsed = session.started.elapsed();
        self.elapsed = Some(elapsed);
        self.log.notice(TERMINATED_NOTICE);

        tracing::info!(
            run_id = session.run_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "Run stopped by request"
        );
        Ok(elapsed)
    }

    /// Wait for the next event from the active runner and apply it.
    ///
    /// Returns `None` when no run is active.
    pub async fn next_event(&mut self) -> Option<HostEvent> {
        let event = self.session.as_mut()?.events.recv().await;

        Some(match event {
            Some(RunnerEvent::Print(text)) => {
                self.log.output(text.clone());
                HostEvent::Output(text)
            }
            Some(RunnerEvent::Stop) => self.finish_stopped(),
            Some(RunnerEvent::Error(fault)) => self.finish_crashed(fault),
            None => {
                tracing::warn!("Runner exited without reporting an outcome");
                self.finish_crashed(RawFault::new(INTERNAL_ERROR))
            }
        })
    }

    /// Relay events until the run stops or crashes, returning that event.
    pub async fn wait(&mut self) -> Option<HostEvent> {
        loop {
            match self.next_event().await? {
                HostEvent::Output(_) => continue,
                terminal => return Some(terminal),
            }
        }
    }

    pub fn send_input(&self, event: InputEvent) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.runner.dispatch(Command::Input(event)))
    }

    /// Deliver one animation tick. Dropped if the previous frame is still
    /// being drawn.
    pub fn animation_frame(&self, time: f64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.runner.dispatch(Command::Frame { time }))
    }

    fn finish_stopped(&mut self) -> HostEvent {
        let elapsed = self.close_session();
        HostEvent::Stopped { elapsed }
    }

    fn finish_crashed(&mut self, fault: RawFault) -> HostEvent {
        let descriptor = self
            .session
            .as_ref()
            .and_then(|session| session.debug.as_deref())
            .and_then(parse_descriptor);
        let elapsed = self.close_session();

        let message = symbolicate(&fault, descriptor.as_ref());
        self.log.error(message.clone());
        self.last_error = Some(message.clone());

        HostEvent::Crashed { message, elapsed }
    }

    fn close_session(&mut self) -> Duration {
        let Some(session) = self.session.take() else {
            return self.elapsed.unwrap_or_default();
        };
        let elapsed = session.started.elapsed();
        self.elapsed = Some(elapsed);

        tracing::info!(
            run_id = session.run_id,
            outcome = ?session.runner.state(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Run finished"
        );
        elapsed
    }

    pub fn status(&self) -> HostStatus {
        if self.session.is_some() {
            HostStatus::Running
        } else {
            HostStatus::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Live while running, frozen once the run ends.
    pub fn elapsed(&self) -> Duration {
        match &self.session {
            Some(session) => session.started.elapsed(),
            None => self.elapsed.unwrap_or_default(),
        }
    }

    pub fn status_line(&self) -> String {
        match (&self.session, self.elapsed) {
            (Some(session), _) => format!(
                "Program is running. ({:.1} seconds)",
                session.started.elapsed().as_secs_f64()
            ),
            (None, Some(elapsed)) => format!(
                "Press \"Run\" to start a program. (Program ran for {:.3} seconds.)",
                elapsed.as_secs_f64()
            ),
            (None, None) => "Press \"Run\" to start a program.".into(),
        }
    }

    pub fn log(&self) -> &ConsoleLog {
        &self.log
    }

    /// The message of the last crash, kept until the next upload.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn run_id(&self) -> Option<u64> {
        self.session.as_ref().map(|session| session.run_id)
    }

    pub fn artifact_digest(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|session| session.artifact_digest.as_str())
    }

    pub fn runner_state(&self) -> Option<RunnerState> {
        self.session.as_ref().map(|session| session.runner.state())
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

fn parse_descriptor(bytes: &[u8]) -> Option<DebugDescriptor> {
    match DebugDescriptor::parse(bytes) {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            tracing::warn!("Debug descriptor unusable, reporting raw frames: {e}");
            None
        }
    }
}
