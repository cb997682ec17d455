use std::collections::HashMap;
use std::fmt::Write as _;

use crate::descriptor::DebugDescriptor;
use crate::error::SourceMapError;
use crate::fault::{FaultFrame, RawFault};
use crate::mapping::{self, SourcePosition};

/// Reported in place of an empty fault message.
pub const INTERNAL_ERROR: &str = "Internal error.";

/// Resolves raw fault frames against one debug descriptor.
///
/// The descriptor's mappings are decoded once at construction. A byte offset
/// plays the role of the generated column, so lookups are keyed by it.
pub struct Symbolicator<'a> {
    descriptor: &'a DebugDescriptor,
    positions: HashMap<i64, SourcePosition>,
}

impl<'a> Symbolicator<'a> {
    /// Build a symbolicator, failing if the mappings do not decode.
    pub fn try_new(descriptor: &'a DebugDescriptor) -> Result<Self, SourceMapError> {
        let mut positions = HashMap::new();
        for mapping in mapping::decode(&descriptor.mappings)? {
            if let Some(source) = mapping.source {
                // First mapping for a column owns it.
                positions.entry(mapping.generated_column).or_insert(source);
            }
        }
        Ok(Self {
            descriptor,
            positions,
        })
    }

    /// Build a symbolicator that still resolves function names when the
    /// mappings are malformed.
    pub fn new(descriptor: &'a DebugDescriptor) -> Self {
        Self::try_new(descriptor).unwrap_or_else(|e| {
            tracing::warn!("Source mappings unusable, positions omitted: {e}");
            Self {
                descriptor,
                positions: HashMap::new(),
            }
        })
    }

    pub fn position(&self, byte_offset: u32) -> Option<SourcePosition> {
        self.positions.get(&i64::from(byte_offset)).copied()
    }

    /// `name:line:column`, `name`, or the raw frame when the index is unknown.
    pub fn frame_label(&self, frame: &FaultFrame) -> String {
        let name = match self.descriptor.function_name(frame.function_index) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Leaving frame unresolved: {e}");
                return frame.to_string();
            }
        };

        match frame.byte_offset.and_then(|offset| self.position(offset)) {
            Some(position) => format!("{name}:{}:{}", position.line, position.column),
            None => name.to_string(),
        }
    }

    pub fn render(&self, fault: &RawFault) -> String {
        render_trace(
            &fault.message,
            fault.frames.iter().map(|frame| self.frame_label(frame)),
        )
    }
}

/// Render a fault as a display message, symbolicated when a descriptor is
/// available and with raw frame identifiers otherwise.
pub fn symbolicate(fault: &RawFault, descriptor: Option<&DebugDescriptor>) -> String {
    match descriptor {
        Some(descriptor) => Symbolicator::new(descriptor).render(fault),
        None => render_unsymbolicated(fault),
    }
}

pub fn render_unsymbolicated(fault: &RawFault) -> String {
    render_trace(&fault.message, fault.frames.iter().map(ToString::to_string))
}

fn render_trace(message: &str, labels: impl ExactSizeIterator<Item = String>) -> String {
    let message = if message.is_empty() {
        INTERNAL_ERROR
    } else {
        message
    };

    if labels.len() == 0 {
        return message.to_string();
    }

    let mut rendered = format!("{message}\n");
    for label in labels {
        let _ = writeln!(rendered, "    at {label}");
    }
    rendered
}
