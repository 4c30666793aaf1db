use crate::bridge::asusctl::AsusctlBridge;
use crate::bridge::nvidia_smi::NvidiaSmiBridge;
use crate::bridge::ryzenadj::RyzenadjBridge;
use crate::bridge::supergfxctl::SupergfxctlBridge;
use crate::bridge::{ApplyOutcome, Bridge, ToolState};
use crate::runner::ToolRunner;
use crate::settings::SettingsRequest;
use std::sync::Arc;

/// Applies a settings bundle across every available bridge.
///
/// Bridges run in a fixed precedence order: the general daemon first,
/// specialized tools after it, so when two bridges recognize the same
/// physical quantity (asusctl's armoury power limit vs ryzenadj) the
/// specialized tool's write lands last and wins. Given the same request
/// and the same availability, the external invocation sequence is
/// always identical.
pub struct Reconciler {
    bridges: Vec<Box<dyn Bridge>>,
}

/// Per-bridge outcome of one profile application. An unavailable bridge
/// is recorded as skipped, never as a failure.
#[derive(Debug)]
pub struct BridgeReport {
    pub bridge: &'static str,
    pub available: bool,
    pub outcomes: Vec<ApplyOutcome>,
}

#[derive(Debug, Default)]
pub struct ProfileReport {
    pub bridges: Vec<BridgeReport>,
}

impl ProfileReport {
    pub fn failure_count(&self) -> usize {
        self.bridges
            .iter()
            .flat_map(|b| &b.outcomes)
            .filter(|o| o.result.is_err())
            .count()
    }

    pub fn all_ok(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Snapshot of one bridge for status display.
pub struct BridgeState {
    pub bridge: &'static str,
    pub available: bool,
    pub state: ToolState,
}

impl Reconciler {
    /// The four bridges in precedence order.
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            bridges: vec![
                Box::new(AsusctlBridge::new(runner.clone())),
                Box::new(SupergfxctlBridge::new(runner.clone())),
                Box::new(RyzenadjBridge::new(runner.clone())),
                Box::new(NvidiaSmiBridge::new(runner)),
            ],
        }
    }

    /// Custom bridge set, used by tests to inject scripted bridges.
    pub fn with_bridges(bridges: Vec<Box<dyn Bridge>>) -> Self {
        Self { bridges }
    }

    /// Apply `request` to every available bridge, in order, never
    /// aborting because one bridge failed. The report carries one entry
    /// per bridge, failures and all.
    pub fn apply_profile(&self, request: &SettingsRequest) -> ProfileReport {
        let mut report = ProfileReport::default();

        for bridge in &self.bridges {
            let available = bridge.is_available();
            let outcomes = if available {
                bridge.apply_settings(request)
            } else {
                log::debug!(target: "reconciler", "{}: unavailable, skipping", bridge.name());
                Vec::new()
            };

            for outcome in &outcomes {
                if let Err(e) = &outcome.result {
                    log::warn!(
                        target: "reconciler",
                        "{}: failed to apply {}: {}",
                        bridge.name(),
                        outcome.key,
                        e
                    );
                }
            }

            report.bridges.push(BridgeReport {
                bridge: bridge.name(),
                available,
                outcomes,
            });
        }

        report
    }

    /// Best-effort state of every bridge, available or not.
    pub fn collect_states(&self) -> Vec<BridgeState> {
        self.bridges
            .iter()
            .map(|bridge| BridgeState {
                bridge: bridge.name(),
                available: bridge.is_available(),
                state: bridge.current_state(),
            })
            .collect()
    }
}
