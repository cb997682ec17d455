//! Sandboxed execution of compiled Cyth artifacts.
//!
//! [`ExecutionHost`] is the entry point: upload a wasm artifact (and,
//! optionally, its debug descriptor) and the host starts a
//! [`SandboxRunner`] on its own thread, relays the runner's output into a
//! [`ConsoleLog`], and symbolicates crashes when they happen. The artifact
//! reaches the outside world only through the intrinsics in
//! [`intrinsics::INTRINSICS`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use cyth_runtime::{ExecutionHost, HostEvent, SandboxConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut host = ExecutionHost::new(SandboxConfig::default())?;
//!
//! let artifact = std::fs::read("hello.wasm")?;
//! let debug = std::fs::read("hello.map.json").ok();
//! host.upload(artifact, debug)?;
//!
//! while let Some(event) = host.next_event().await {
//!     match event {
//!         HostEvent::Output(line) => println!("{line}"),
//!         HostEvent::Crashed { message, .. } => eprint!("{message}"),
//!         HostEvent::Stopped { .. } => {}
//!     }
//! }
//! println!("{}", host.status_line());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod host;
pub mod intrinsics;
pub mod run_state;
pub mod runner;
pub mod runtime_context;
pub mod surface;

pub use config::SandboxConfig;
pub use console::{ConsoleLog, LogEntry, LogKind};
pub use error::{HostError, RuntimeError};
pub use host::{ExecutionHost, HostEvent, HostStatus};
pub use runner::{InputEvent, RunnerState, SandboxRunner};
pub use runtime_context::RuntimeContext;
pub use surface::{DisplayList, DrawOp, Rgb, Surface};
