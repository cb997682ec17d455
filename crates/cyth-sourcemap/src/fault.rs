use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static FRAME_WITH_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"wasm-function\[([0-9]+)\]:0[xX]([0-9a-fA-F]+)").expect("valid frame pattern")
});

static FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"wasm-function\[([0-9]+)\]").expect("valid frame pattern"));

/// A raw stack frame as reported by the execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultFrame {
    pub function_index: u32,
    /// Module-relative byte offset of the faulting instruction, when known.
    pub byte_offset: Option<u32>,
}

impl FaultFrame {
    pub fn new(function_index: u32, byte_offset: Option<u32>) -> Self {
        Self {
            function_index,
            byte_offset,
        }
    }
}

impl fmt::Display for FaultFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.byte_offset {
            Some(offset) => write!(f, "wasm-function[{}]:{offset:#x}", self.function_index),
            None => write!(f, "wasm-function[{}]", self.function_index),
        }
    }
}

/// An unsymbolicated runtime fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFault {
    pub message: String,
    /// In the order the execution context produced them.
    pub frames: Vec<FaultFrame>,
}

impl RawFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn with_frames(message: impl Into<String>, frames: Vec<FaultFrame>) -> Self {
        Self {
            message: message.into(),
            frames,
        }
    }

    /// Extract frames from a stack trace that only exists as text, such as
    /// one captured by another engine or relayed from a log.
    ///
    /// Frames written as `wasm-function[N]:0xOFF` are preferred; only when
    /// none are present are bare `wasm-function[N]` frames collected.
    pub fn from_stack_text(message: impl Into<String>, stack: &str) -> Self {
        let mut frames: Vec<FaultFrame> = FRAME_WITH_OFFSET
            .captures_iter(stack)
            .filter_map(|caps| {
                let index = caps[1].parse().ok()?;
                let offset = u32::from_str_radix(&caps[2], 16).ok()?;
                Some(FaultFrame::new(index, Some(offset)))
            })
            .collect();

        if frames.is_empty() {
            frames = FRAME
                .captures_iter(stack)
                .filter_map(|caps| Some(FaultFrame::new(caps[1].parse().ok()?, None)))
                .collect();
        }

        Self::with_frames(message, frames)
    }
}
