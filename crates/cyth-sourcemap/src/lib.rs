//! Debug descriptors and crash symbolication for compiled Cyth artifacts.
//!
//! The compiler emits a wasm module plus a JSON descriptor holding a
//! `mappings` string (differential base64 VLQ, one segment per generated
//! position) and a table of function names. When a run traps, the runtime
//! reports opaque `(function index, byte offset)` frames; this crate turns
//! them back into `name:line:column` locations.
//!
//! ```
//! use cyth_sourcemap::{DebugDescriptor, FaultFrame, RawFault, symbolicate};
//!
//! let descriptor = DebugDescriptor::parse(
//!     br#"{"mappings": "AAAA,CAEAA", "functions": ["<start>"]}"#,
//! )?;
//! let fault = RawFault::with_frames("unreachable", vec![FaultFrame::new(0, Some(1))]);
//!
//! assert_eq!(
//!     symbolicate(&fault, Some(&descriptor)),
//!     "unreachable\n    at <start>:3:0\n",
//! );
//! # Ok::<(), cyth_sourcemap::SourceMapError>(())
//! ```

pub mod descriptor;
pub mod error;
pub mod fault;
pub mod mapping;
pub mod symbolicate;
mod vlq;

pub use descriptor::DebugDescriptor;
pub use error::SourceMapError;
pub use fault::{FaultFrame, RawFault};
pub use mapping::{Mapping, SourcePosition, decode};
pub use symbolicate::{INTERNAL_ERROR, Symbolicator, render_unsymbolicated, symbolicate};
