//! Hotspot-parameter rate-limit boundary.
//!
//! Admission decisions are made per resource class, keyed on a single hot
//! parameter: the source IP. The engine behind [`RateEngine`] is a
//! collaborator; this module defines the boundary (resource names, rules,
//! decisions) and ships a sliding-window default good enough for in-process
//! use.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::FlowResult;

/// Logical resource classes, each an independent rate-limit dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Plain request admission.
    Visit,
    /// Detected-attack frequency.
    Attack,
    /// Error-response frequency.
    Error,
}

impl Resource {
    /// Stable resource name used when loading rules into the engine.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Visit => "waf:visit",
            Self::Attack => "waf:attack",
            Self::Error => "waf:error",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The event is within limits.
    Pass,
    /// The hot parameter crossed its threshold.
    Reject,
}

/// One rule entry: limits for a resource, parameterized on the IP argument.
#[derive(Debug, Clone)]
pub struct HotspotRule {
    /// Which resource the rule covers.
    pub resource: Resource,
    /// Events allowed per window.
    pub threshold: u64,
    /// Extra events tolerated on top of the threshold.
    pub burst_count: u64,
    /// Accounting window.
    pub stat_duration: Duration,
    /// Maximum number of IPs tracked under this rule.
    pub params_capacity: usize,
}

/// The external flow-control engine, seen from the admission layer.
///
/// Decision errors are infrastructure faults, not rejections; callers treat
/// them as fail-open.
pub trait RateEngine: Send + Sync {
    /// Account one event for `ip` against `resource` and decide admission.
    ///
    /// A resource with no loaded rule always passes.
    ///
    /// # Errors
    ///
    /// Returns an error only when the engine itself fails.
    fn check_entry(&self, resource: Resource, ip: IpAddr) -> FlowResult<RateDecision>;

    /// Replace the active rule set.
    fn load_rules(&self, rules: &[HotspotRule]);

    /// Drop all rules; every resource passes afterwards.
    fn clear_rules(&self);
}

#[derive(Debug)]
struct RuleState {
    rule: HotspotRule,
    windows: HashMap<IpAddr, VecDeque<Instant>>,
}

impl RuleState {
    fn new(rule: HotspotRule) -> Self {
        Self {
            rule,
            windows: HashMap::new(),
        }
    }

    /// Drop one tracked IP if the table is full and `ip` is new.
    ///
    /// IPs whose windows have fully drained go first; failing that, an
    /// arbitrary entry is sacrificed so the hot parameter table stays
    /// bounded.
    fn ensure_param_capacity(&mut self, ip: &IpAddr, now: Instant) {
        if self.windows.len() < self.rule.params_capacity || self.windows.contains_key(ip) {
            return;
        }

        let cutoff = now.checked_sub(self.rule.stat_duration);
        if let Some(cutoff) = cutoff {
            self.windows
                .retain(|_, window| window.back().is_some_and(|last| *last >= cutoff));
        }

        if self.windows.len() >= self.rule.params_capacity {
            if let Some(stale) = self.windows.keys().next().copied() {
                self.windows.remove(&stale);
                debug!(ip = %stale, resource = %self.rule.resource, "hot-param table full, dropping tracked IP");
            }
        }
    }

    fn try_pass(&mut self, ip: IpAddr) -> RateDecision {
        let now = Instant::now();
        self.ensure_param_capacity(&ip, now);

        let max_events = self.rule.threshold + self.rule.burst_count;
        let window = self.windows.entry(ip).or_default();

        if let Some(cutoff) = now.checked_sub(self.rule.stat_duration) {
            while window.front().is_some_and(|t| *t < cutoff) {
                window.pop_front();
            }
        }

        if (window.len() as u64) < max_events {
            window.push_back(now);
            RateDecision::Pass
        } else {
            RateDecision::Reject
        }
    }
}

/// In-process sliding-window implementation of [`RateEngine`].
///
/// Each loaded rule keeps per-IP event timestamps inside its window; an IP
/// passes while its event count stays at or under threshold plus burst.
#[derive(Debug, Default)]
pub struct SlidingWindowEngine {
    rules: RwLock<HashMap<Resource, Mutex<RuleState>>>,
}

impl SlidingWindowEngine {
    /// Create an engine with no rules loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of IPs tracked for `resource`, for tests and introspection.
    #[must_use]
    pub fn tracked_count(&self, resource: Resource) -> usize {
        self.rules
            .read()
            .get(&resource)
            .map_or(0, |state| state.lock().windows.len())
    }
}

impl RateEngine for SlidingWindowEngine {
    fn check_entry(&self, resource: Resource, ip: IpAddr) -> FlowResult<RateDecision> {
        let rules = self.rules.read();
        let Some(state) = rules.get(&resource) else {
            return Ok(RateDecision::Pass);
        };
        Ok(state.lock().try_pass(ip))
    }

    fn load_rules(&self, rules: &[HotspotRule]) {
        let mut table = self.rules.write();
        table.clear();
        for rule in rules {
            info!(
                resource = %rule.resource,
                threshold = rule.threshold,
                burst = rule.burst_count,
                window_secs = rule.stat_duration.as_secs(),
                "rate rule loaded"
            );
            table.insert(rule.resource, Mutex::new(RuleState::new(rule.clone())));
        }
    }

    fn clear_rules(&self) {
        self.rules.write().clear();
    }
}
