use crate::settings::{Setting, SettingKey, SettingsRequest};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Quiet period before a pending change is flushed to the tools.
pub const QUIET_PERIOD: Duration = Duration::from_millis(300);

struct Pending {
    setting: Setting,
    deadline: Instant,
}

/// Coalesces rapid setting changes (slider drags, repeated keypresses)
/// so each burst produces exactly one external invocation per key,
/// carrying the last value. Time is passed in explicitly; the event
/// loop owns the clock.
pub struct Debouncer {
    quiet: Duration,
    pending: BTreeMap<SettingKey, Pending>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::with_quiet_period(QUIET_PERIOD)
    }

    pub fn with_quiet_period(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: BTreeMap::new(),
        }
    }

    /// Record a change. Only the most recent value per key is kept and
    /// its quiet period restarts from `now`.
    pub fn submit(&mut self, setting: Setting, now: Instant) {
        self.pending.insert(
            setting.key(),
            Pending {
                setting,
                deadline: now + self.quiet,
            },
        );
    }

    /// Drain every change whose quiet period has elapsed, bundled as a
    /// single request so one burst ends in one application.
    pub fn take_ready(&mut self, now: Instant) -> Option<SettingsRequest> {
        let ready: Vec<SettingKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(k, _)| *k)
            .collect();

        if ready.is_empty() {
            return None;
        }

        let mut request = SettingsRequest::new();
        for key in ready {
            if let Some(p) = self.pending.remove(&key) {
                request.insert(p.setting);
            }
        }
        Some(request)
    }

    /// The earliest pending deadline, for event-loop wakeup scheduling.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Flush everything regardless of deadlines (shutdown path).
    pub fn drain(&mut self) -> Option<SettingsRequest> {
        if self.pending.is_empty() {
            return None;
        }
        let request = std::mem::take(&mut self.pending)
            .into_values()
            .map(|p| p.setting)
            .collect();
        Some(request)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}
