//! Device host: one runtime, one board, one active `PIXELS` binding.
//!
//! The host owns the callback registry for its runtime and enforces the
//! activation cycle:
//!
//! ```text
//! new ──► initialize ──► (scripts run) ──► cleanup ──► initialize ...
//!                                  └──► switch_board(runtime, board)
//! ```
//!
//! `switch_board` always releases the old module's entries before the old
//! runtime is dropped, so no entry outlives the module that created it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::BoardConfig;
use crate::device::{DeviceStateSink, LedStrip};
use crate::error::BridgeResult;
use crate::pixels::{define_pixels, PixelsBinding};
use crate::registry::{CallbackRegistry, ReleaseReport};
use crate::runtime::RuntimeModule;

/// Owns a runtime and drives the `PIXELS` binding through its lifecycle.
pub struct DeviceHost<R: RuntimeModule> {
    runtime: R,
    registry: CallbackRegistry,
    board: BoardConfig,
    strip: Arc<LedStrip>,
    binding: Option<PixelsBinding>,
}

impl<R: RuntimeModule> DeviceHost<R> {
    /// Create an uninitialized host with a black strip sized for `board`.
    pub fn new(runtime: R, board: BoardConfig) -> Self {
        let strip = Arc::new(LedStrip::new(board.max_leds));
        Self {
            runtime,
            registry: CallbackRegistry::new(),
            board,
            strip,
            binding: None,
        }
    }

    /// Define the `PIXELS` API on the current runtime.
    ///
    /// Calling this while already initialized returns the existing binding.
    /// On failure nothing stays installed and the host remains uninitialized.
    pub fn initialize(&mut self) -> BridgeResult<&PixelsBinding> {
        let binding = match self.binding.take() {
            Some(binding) => binding,
            None => {
                let sink: Arc<dyn DeviceStateSink> = self.strip.clone();
                define_pixels(&mut self.registry, &mut self.runtime, &self.board, sink)
                    .inspect_err(|err| {
                        warn!(board = %self.board.name, error = %err, "Initialization failed")
                    })?
            }
        };
        Ok(self.binding.insert(binding))
    }

    /// Release every entry this host installed.
    ///
    /// Entries of the current module are removed from its table. Entries left
    /// over from a module that was reset underneath the host are reported as
    /// stale. A second call releases nothing.
    pub fn cleanup(&mut self) -> ReleaseReport {
        self.binding = None;
        let mut report = self.registry.cleanup(&mut self.runtime);
        // The host only ever drives one runtime, so any other module is a
        // torn-down instance of it.
        for module in self.registry.active_modules() {
            report.extend(self.registry.retire_module(module));
        }
        if !report.is_empty() {
            info!(board = %self.board.name, %report, "Cleaned up native functions");
        }
        report
    }

    /// Tear down the current board and activate `board` on `runtime`.
    ///
    /// The new board is validated before anything is released. The returned
    /// report covers the old module's entries. If the new board fails to
    /// initialize, that report is logged with the error and the host is left
    /// uninitialized on the new runtime.
    pub fn switch_board(&mut self, runtime: R, board: BoardConfig) -> BridgeResult<ReleaseReport> {
        board.validate()?;

        let report = self.cleanup();
        info!(from = %self.board.name, to = %board.name, "Switching board");

        self.runtime = runtime;
        self.strip = Arc::new(LedStrip::new(board.max_leds));
        self.board = board;
        if let Err(err) = self.initialize() {
            warn!(board = %self.board.name, %report, error = %err, "Board switch failed after teardown");
            return Err(err);
        }
        Ok(report)
    }

    /// The runtime currently hosting scripts.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Mutable access, e.g. to reset a mock module.
    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    /// The strip the current binding writes to.
    pub fn strip(&self) -> &Arc<LedStrip> {
        &self.strip
    }

    /// The active board definition.
    pub fn board(&self) -> &BoardConfig {
        &self.board
    }

    /// The active binding, if initialized.
    pub fn binding(&self) -> Option<&PixelsBinding> {
        self.binding.as_ref()
    }

    /// Registry tracking this host's entries.
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Whether the `PIXELS` API is currently defined.
    pub fn is_initialized(&self) -> bool {
        self.binding.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Rgb;
    use crate::error::BridgeError;
    use crate::registry::ReleaseOutcome;
    use crate::runtime::{MockRuntime, Value};
    use tracing_test::traced_test;

    fn host(leds: usize) -> DeviceHost<MockRuntime> {
        DeviceHost::new(MockRuntime::new(), BoardConfig::with_leds("test", leds))
    }

    fn set(values: [i64; 4]) -> Vec<Value> {
        values.into_iter().map(Value::Integer).collect()
    }

    #[test]
    fn test_initialize_binds_pixels() {
        let mut host = host(60);
        host.initialize().unwrap();
        assert!(host.is_initialized());
        assert_eq!(host.runtime().installed_functions(), 2);
        assert_eq!(host.runtime().methods_of("PIXELS"), vec!["set", "update"]);

        let result = host.runtime().call("PIXELS", "set", set([5, 255, 0, 0])).unwrap();
        assert_eq!(result, Value::Bool(true));
        assert_eq!(host.strip().get(5), Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn test_initialize_twice_keeps_one_set() {
        let mut host = host(60);
        host.initialize().unwrap();
        host.initialize().unwrap();
        assert_eq!(host.registry().live_count(), 2);
    }

    #[test]
    fn test_cleanup_releases_everything_once() {
        let mut host = host(60);
        host.initialize().unwrap();

        let report = host.cleanup();
        assert_eq!(report.released(), 2);
        assert_eq!(host.runtime().installed_functions(), 0);
        assert!(!host.is_initialized());

        let again = host.cleanup();
        assert!(again.is_empty());
    }

    #[test]
    fn test_cleanup_after_reset_reports_stale() {
        let mut host = host(60);
        host.initialize().unwrap();
        host.runtime_mut().reset();

        let report = host.cleanup();
        assert_eq!(report.stale(), 2);
        assert_eq!(report.failed(), 0);
        assert!(report
            .outcomes()
            .iter()
            .all(|(_, o)| matches!(o, Ok(ReleaseOutcome::Stale))));
        assert_eq!(host.registry().live_count(), 0);
    }

    #[test]
    fn test_failed_initialize_leaves_nothing() {
        let mut host = DeviceHost::new(
            MockRuntime::with_capacity(1),
            BoardConfig::with_leds("tiny", 4),
        );
        let err = host.initialize().unwrap_err();
        assert!(matches!(err, BridgeError::TableExhausted { capacity: 1 }));
        assert!(!host.is_initialized());
        assert_eq!(host.runtime().installed_functions(), 0);
        assert_eq!(host.registry().live_count(), 0);
    }

    #[test]
    fn test_switch_board() {
        let mut host = host(60);
        host.initialize().unwrap();

        let report = host
            .switch_board(MockRuntime::new(), BoardConfig::with_leds("short", 8))
            .unwrap();
        assert_eq!(report.released(), 2);
        assert_eq!(host.board().name, "short");
        assert_eq!(host.strip().len(), 8);
        assert_eq!(host.registry().live_count(), 2);

        let rejected = host.runtime().call("PIXELS", "set", set([8, 1, 1, 1])).unwrap();
        assert_eq!(rejected, Value::Bool(false));
    }

    #[test]
    fn test_switch_to_invalid_board_keeps_current() {
        let mut host = host(60);
        host.initialize().unwrap();

        let result = host.switch_board(MockRuntime::new(), BoardConfig::with_leds("bad", 0));
        assert!(matches!(result, Err(BridgeError::Config(_))));
        assert!(host.is_initialized());
        assert_eq!(host.board().max_leds, 60);
    }

    #[test]
    #[traced_test]
    fn test_failed_switch_logs_old_report() {
        let mut host = host(60);
        host.initialize().unwrap();

        let err = host
            .switch_board(MockRuntime::with_capacity(1), BoardConfig::with_leds("tiny", 4))
            .unwrap_err();
        assert!(matches!(err, BridgeError::TableExhausted { .. }));
        assert!(!host.is_initialized());
        assert_eq!(host.registry().live_count(), 0);
        assert!(logs_contain("Board switch failed after teardown"));
        assert!(logs_contain("2 released, 0 stale, 0 failed"));
    }
}
