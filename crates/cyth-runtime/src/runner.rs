use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use anyhow::anyhow;
use cyth_sourcemap::{FaultFrame, RawFault};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use wasmtime::{Engine, Instance, Linker, Module, Store, Trap, UpdateDeadline, Val, WasmBacktrace};

use crate::config::RunnerConfig;
use crate::error::RuntimeError;
use crate::intrinsics;
use crate::run_state::RunState;
use crate::runtime_context::RuntimeContext;
use crate::surface::Surface;

/// Export driven by the animation clock once `size` has been called.
pub const DRAW_EXPORT: &str = "draw";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown { key: u32 },
    KeyUp { key: u32 },
    MouseDown { x: f64, y: f64 },
    MouseUp { x: f64, y: f64 },
    /// `buttons` is non-zero while any mouse button is held.
    MouseMove { x: f64, y: f64, buttons: u32 },
}

impl InputEvent {
    /// The export handling this event and its arguments.
    pub fn callback(&self) -> (&'static str, [f64; 2]) {
        match *self {
            InputEvent::KeyDown { key } => ("keyPressed", [f64::from(key), 0.0]),
            InputEvent::KeyUp { key } => ("keyReleased", [f64::from(key), 0.0]),
            InputEvent::MouseDown { x, y } => ("mousePressed", [x, y]),
            InputEvent::MouseUp { x, y } => ("mouseReleased", [x, y]),
            InputEvent::MouseMove { x, y, buttons } if buttons != 0 => ("mouseDragged", [x, y]),
            InputEvent::MouseMove { x, y, .. } => ("mouseMoved", [x, y]),
        }
    }
}

/// Host → runner.
pub enum Command {
    Start {
        artifact: Vec<u8>,
        surface: Box<dyn Surface>,
    },
    Input(InputEvent),
    /// One tick of the animation clock, in milliseconds.
    Frame { time: f64 },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start { artifact, .. } => f
                .debug_struct("Start")
                .field("artifact_len", &artifact.len())
                .finish_non_exhaustive(),
            Command::Input(event) => f.debug_tuple("Input").field(event).finish(),
            Command::Frame { time } => f.debug_struct("Frame").field("time", time).finish(),
        }
    }
}

/// Runner → host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// One line of artifact output.
    Print(String),
    /// The entry point returned and there is no animation to drive.
    Stop,
    /// Instantiation failed or the artifact trapped. Unsymbolicated.
    Error(RawFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunnerState {
    Idle = 0,
    Instantiating = 1,
    Running = 2,
    Stopped = 3,
    Crashed = 4,
}

impl RunnerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunnerState::Stopped | RunnerState::Crashed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => RunnerState::Idle,
            1 => RunnerState::Instantiating,
            2 => RunnerState::Running,
            3 => RunnerState::Stopped,
            _ => RunnerState::Crashed,
        }
    }
}

/// State visible from both sides of the thread boundary.
struct Shared {
    state: AtomicU8,
    /// An artifact-level call is in flight or already accepted. Set by
    /// `dispatch`, cleared by the runner once the command is handled.
    busy: AtomicBool,
    terminated: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(RunnerState::Idle as u8),
            busy: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        }
    }

    fn state(&self) -> RunnerState {
        RunnerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move to `next` unless a terminal state was already reached.
    fn advance(&self, next: RunnerState) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (!RunnerState::from_u8(current).is_terminal()).then_some(next as u8)
            })
            .is_ok()
    }
}

/// Host-side handle to a runner thread.
///
/// Dropping the handle terminates the run.
pub struct RunnerHandle {
    run_id: u64,
    engine: Engine,
    commands: Option<UnboundedSender<Command>>,
    shared: Arc<Shared>,
}

impl RunnerHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn state(&self) -> RunnerState {
        self.shared.state()
    }

    /// Deliver an input or frame command.
    ///
    /// Returns `false` when the command was dropped: the runner is not
    /// running, has been terminated, or is still inside a previous call.
    pub fn dispatch(&self, command: Command) -> bool {
        if self.shared.terminated.load(Ordering::SeqCst) || self.state() != RunnerState::Running {
            return false;
        }
        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(run_id = self.run_id, ?command, "Artifact call in flight, dropping command");
            return false;
        }
        if self.send(command) {
            true
        } else {
            self.shared.busy.store(false, Ordering::SeqCst);
            false
        }
    }

    fn send(&self, command: Command) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|commands| commands.send(command).is_ok())
    }

    /// Hard stop. Interrupts wasm that is currently executing and closes the
    /// command channel. Calling it again is a no-op.
    pub fn terminate(&mut self) {
        if self.shared.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.commands = None;

        // The state must be terminal before the epoch moves; see
        // `SandboxRunner::run`.
        if self.shared.advance(RunnerState::Stopped) {
            self.engine.increment_epoch();
            tracing::info!(run_id = self.run_id, "Runner terminated");
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Owns one execution context on its own thread.
pub struct SandboxRunner {
    runtime: Arc<RuntimeContext>,
    config: RunnerConfig,
    run_id: u64,
    shared: Arc<Shared>,
    events: UnboundedSender<RunnerEvent>,
}

struct Sandbox {
    store: Store<RunState>,
    instance: Instance,
    has_draw: bool,
}

impl SandboxRunner {
    /// Start a runner thread and hand it the artifact.
    pub fn spawn(
        runtime: Arc<RuntimeContext>,
        config: RunnerConfig,
        run_id: u64,
        artifact: Vec<u8>,
        surface: Box<dyn Surface>,
    ) -> Result<(RunnerHandle, UnboundedReceiver<RunnerEvent>), RuntimeError> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new());
        let engine = runtime.engine.clone();

        let runner = SandboxRunner {
            runtime,
            config,
            run_id,
            shared: Arc::clone(&shared),
            events: event_tx,
        };

        let handle = RunnerHandle {
            run_id,
            engine,
            commands: Some(command_tx),
            shared,
        };
        handle.send(Command::Start { artifact, surface });

        std::thread::Builder::new()
            .name(format!("cyth-run-{run_id}"))
            .spawn(move || runner.run(command_rx))?;

        Ok((handle, event_rx))
    }

    fn run(self, mut commands: UnboundedReceiver<Command>) {
        let Some(Command::Start { artifact, surface }) = commands.blocking_recv() else {
            tracing::warn!(run_id = self.run_id, "Runner closed before it was started");
            return;
        };

        self.shared.advance(RunnerState::Instantiating);
        let mut sandbox = match self.instantiate(artifact, surface) {
            Ok(sandbox) => sandbox,
            Err(e) => {
                tracing::info!(run_id = self.run_id, "Artifact rejected: {e}");
                self.crash(RawFault::new(e.to_string()));
                return;
            }
        };

        // Nothing is dispatched until the entry point has returned.
        self.shared.busy.store(true, Ordering::SeqCst);

        // The store already exists, so a terminate from here on is seen by
        // its epoch deadline.
        if !self.shared.advance(RunnerState::Running) {
            return;
        }

        let entry_point = self.config.entry_point.clone();
        tracing::debug!(run_id = self.run_id, export = %entry_point, "Invoking entry point");
        let outcome = self.invoke(&mut sandbox, &entry_point, &[]);
        self.shared.busy.store(false, Ordering::SeqCst);
        if let Err(fault) = outcome {
            self.crash(fault);
            return;
        }

        if !sandbox.has_draw {
            self.stop();
            return;
        }

        while let Some(command) = commands.blocking_recv() {
            let outcome = match command {
                Command::Start { .. } => {
                    tracing::warn!(run_id = self.run_id, "Ignoring start for a runner already started");
                    Ok(())
                }
                Command::Input(event) => {
                    let (export, args) = event.callback();
                    self.invoke(&mut sandbox, export, &args)
                }
                Command::Frame { time } if sandbox.store.data().animation_requested => {
                    self.invoke(&mut sandbox, DRAW_EXPORT, &[time])
                }
                Command::Frame { .. } => Ok(()),
            };
            self.shared.busy.store(false, Ordering::SeqCst);

            if let Err(fault) = outcome {
                self.crash(fault);
                return;
            }
        }

        tracing::debug!(run_id = self.run_id, "Command channel closed, runner exiting");
    }

    fn instantiate(
        &self,
        artifact: Vec<u8>,
        surface: Box<dyn Surface>,
    ) -> Result<Sandbox, RuntimeError> {
        let engine = &self.runtime.engine;

        let module = Module::new(engine, &artifact)
            .map_err(|e| RuntimeError::Compilation(format!("{e:#}")))?;
        drop(artifact);

        let mut linker = Linker::new(engine);
        intrinsics::link(&mut linker, &module)?;

        let state = RunState::new(
            self.events.clone(),
            surface,
            &self.config.string_length_export,
            &self.config.string_at_export,
        );
        let mut store = Store::new(engine, state);
        store.set_epoch_deadline(1);
        let shared = Arc::clone(&self.shared);
        store.epoch_deadline_callback(move |_| {
            if shared.terminated.load(Ordering::SeqCst) {
                Err(anyhow!("sandbox terminated"))
            } else {
                Ok(UpdateDeadline::Continue(1))
            }
        });

        // Terminated before the deadline was armed: the epoch bump was missed.
        if self.shared.terminated.load(Ordering::SeqCst) {
            return Err(RuntimeError::Invocation("sandbox terminated".into()));
        }

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| RuntimeError::Instantiation(format!("{e:#}")))?;

        if instance
            .get_func(&mut store, &self.config.entry_point)
            .is_none()
        {
            return Err(RuntimeError::Instantiation(format!(
                "artifact does not export `{}`",
                self.config.entry_point
            )));
        }
        let has_draw = instance.get_func(&mut store, DRAW_EXPORT).is_some();

        tracing::debug!(run_id = self.run_id, has_draw, "Artifact instantiated");
        Ok(Sandbox {
            store,
            instance,
            has_draw,
        })
    }

    /// Call an export behind the fault barrier. Missing exports are ignored.
    fn invoke(&self, sandbox: &mut Sandbox, export: &str, args: &[f64]) -> Result<(), RawFault> {
        let Some(func) = sandbox.instance.get_func(&mut sandbox.store, export) else {
            return Ok(());
        };
        let ty = func.ty(&sandbox.store);
        let Some(params) = intrinsics::numeric_args(&ty, args) else {
            tracing::warn!(run_id = self.run_id, export, "Export takes non-numeric parameters, not invoking");
            return Ok(());
        };
        let mut results = vec![Val::I32(0); ty.results().len()];

        func.call(&mut sandbox.store, &params, &mut results)
            .map_err(|e| fault_from_error(&e))
    }

    fn stop(&self) {
        if self.shared.advance(RunnerState::Stopped) {
            tracing::info!(run_id = self.run_id, "Entry point returned, run complete");
            self.emit(RunnerEvent::Stop);
        }
    }

    fn crash(&self, fault: RawFault) {
        if self.shared.advance(RunnerState::Crashed) {
            tracing::info!(run_id = self.run_id, frames = fault.frames.len(), "Run crashed: {}", fault.message);
            self.emit(RunnerEvent::Error(fault));
        }
    }

    fn emit(&self, event: RunnerEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(run_id = self.run_id, "Host no longer listening, event discarded");
        }
    }
}

/// Pull the trap message and wasm frames out of a call error.
fn fault_from_error(error: &anyhow::Error) -> RawFault {
    let frames = error
        .downcast_ref::<WasmBacktrace>()
        .map(|backtrace| {
            backtrace
                .frames()
                .iter()
                .map(|frame| {
                    FaultFrame::new(
                        frame.func_index(),
                        frame.module_offset().and_then(|offset| u32::try_from(offset).ok()),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let message = match error.downcast_ref::<Trap>() {
        Some(trap) => trap.to_string(),
        None => error.root_cause().to_string(),
    };

    RawFault::with_frames(message, frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_events_map_to_callbacks() {
        assert_eq!(InputEvent::KeyDown { key: 65 }.callback(), ("keyPressed", [65.0, 0.0]));
        assert_eq!(InputEvent::KeyUp { key: 65 }.callback().0, "keyReleased");
        assert_eq!(
            InputEvent::MouseDown { x: 1.0, y: 2.0 }.callback(),
            ("mousePressed", [1.0, 2.0])
        );
        assert_eq!(InputEvent::MouseUp { x: 1.0, y: 2.0 }.callback().0, "mouseReleased");
        assert_eq!(
            InputEvent::MouseMove { x: 3.0, y: 4.0, buttons: 1 }.callback(),
            ("mouseDragged", [3.0, 4.0])
        );
        assert_eq!(
            InputEvent::MouseMove { x: 3.0, y: 4.0, buttons: 0 }.callback(),
            ("mouseMoved", [3.0, 4.0])
        );
    }

    #[test]
    fn terminal_states_are_final() {
        let shared = Shared::new();
        assert!(shared.advance(RunnerState::Instantiating));
        assert!(shared.advance(RunnerState::Running));
        assert!(shared.advance(RunnerState::Crashed));
        assert!(!shared.advance(RunnerState::Stopped));
        assert!(!shared.advance(RunnerState::Running));
        assert_eq!(shared.state(), RunnerState::Crashed);
    }

    #[test]
    fn dispatch_accepts_one_command_until_it_is_handled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new());
        shared.advance(RunnerState::Running);
        let handle = RunnerHandle {
            run_id: 1,
            engine: Engine::default(),
            commands: Some(tx),
            shared: Arc::clone(&shared),
        };

        assert!(handle.dispatch(Command::Frame { time: 0.0 }));
        assert!(!handle.dispatch(Command::Frame { time: 16.0 }));
        assert!(!handle.dispatch(Command::Input(InputEvent::KeyDown { key: 1 })));
        assert!(matches!(rx.try_recv(), Ok(Command::Frame { time }) if time == 0.0));
        assert!(rx.try_recv().is_err());

        shared.busy.store(false, Ordering::SeqCst);
        assert!(handle.dispatch(Command::Frame { time: 32.0 }));
    }

    #[test]
    fn host_errors_keep_their_message() {
        let fault = fault_from_error(&anyhow!("string handle reported invalid length -1"));
        assert_eq!(fault.message, "string handle reported invalid length -1");
        assert!(fault.frames.is_empty());
    }
}
