use wasmtime::{Config, Engine};

use crate::config::EngineConfig;
use crate::error::RuntimeError;

/// Shared Wasmtime engine.
///
/// Constructed once per host and shared by every run. Epoch interruption is
/// always on: it is how a terminated run is pulled out of wasm code. The
/// linker is not shared because intrinsics are bound against each artifact's
/// declared import signatures.
pub struct RuntimeContext {
    pub engine: Engine,
}

impl RuntimeContext {
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut wasm_config = Config::new();
        wasm_config.epoch_interruption(true);
        wasm_config.wasm_backtrace(config.backtraces);
        if config.gc {
            wasm_config.wasm_function_references(true);
            wasm_config.wasm_gc(true);
        }

        let engine = Engine::new(&wasm_config).map_err(|e| RuntimeError::Engine(e.to_string()))?;

        tracing::debug!(
            gc = config.gc,
            backtraces = config.backtraces,
            "RuntimeContext initialized (core modules + epoch interruption)"
        );

        Ok(Self { engine })
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
            .expect("RuntimeContext::new should not fail with default config")
    }
}
