use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::UnboundedSender;

use crate::runner::RunnerEvent;
use crate::surface::Surface;

/// Per-run store data.
///
/// A fresh `RunState` backs each run's `Store`, so nothing an artifact does
/// survives into the next run. The artifact can only reach the host through
/// the intrinsics that read and write these fields.
pub struct RunState {
    events: UnboundedSender<RunnerEvent>,
    pub(crate) surface: Box<dyn Surface>,
    pub(crate) started: Instant,
    pub(crate) rng: StdRng,
    /// Set by `size`; the animation loop starts once the entry point returns.
    pub(crate) animation_requested: bool,
    pub(crate) string_length_export: String,
    pub(crate) string_at_export: String,
}

impl RunState {
    pub fn new(
        events: UnboundedSender<RunnerEvent>,
        surface: Box<dyn Surface>,
        string_length_export: impl Into<String>,
        string_at_export: impl Into<String>,
    ) -> Self {
        Self {
            events,
            surface,
            started: Instant::now(),
            rng: StdRng::from_entropy(),
            animation_requested: false,
            string_length_export: string_length_export.into(),
            string_at_export: string_at_export.into(),
        }
    }

    /// Forward an event to the host. A closed channel means the run was
    /// terminated and the event is discarded.
    pub(crate) fn emit(&self, event: RunnerEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Host no longer listening, event discarded");
        }
    }

    pub(crate) fn millis(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}
