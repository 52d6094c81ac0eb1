//! The admission façade called by the request pipeline.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{info, warn};

use rampart_blocklist::{BlockReason, BlockRecord, BlockedIpRecorder, MetricsSnapshot};

use crate::config::FlowControlConfig;
use crate::engine::{HotspotRule, RateDecision, RateEngine, Resource, SlidingWindowEngine};
use crate::error::FlowResult;

fn rules_from(config: &FlowControlConfig) -> Vec<HotspotRule> {
    let classes = [
        (Resource::Visit, &config.visit_limit),
        (Resource::Attack, &config.attack_limit),
        (Resource::Error, &config.error_limit),
    ];

    classes
        .into_iter()
        .filter(|(_, limit)| limit.enabled)
        .map(|(resource, limit)| HotspotRule {
            resource,
            threshold: limit.threshold,
            burst_count: limit.burst_count,
            stat_duration: limit.stat_duration,
            params_capacity: limit.params_capacity,
        })
        .collect()
}

/// Admission control for the request pipeline.
///
/// Three independent resource classes — visit, attack, error — each consume
/// tokens against the rate engine keyed by source IP. A rejection becomes a
/// blocklist entry with that class's block duration.
///
/// Hot-path calls never block on durability and never fail closed: an
/// unavailable rate engine must not itself become a denial-of-service
/// vector, so engine errors log and admit.
pub struct FlowController {
    config: Mutex<FlowControlConfig>,
    engine: Arc<dyn RateEngine>,
    recorder: Arc<BlockedIpRecorder>,
    initialized: AtomicBool,
}

impl FlowController {
    /// Create a controller over an explicit engine.
    #[must_use]
    pub fn new(
        config: FlowControlConfig,
        engine: Arc<dyn RateEngine>,
        recorder: Arc<BlockedIpRecorder>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            engine,
            recorder,
            initialized: AtomicBool::new(false),
        }
    }

    /// Create a controller backed by the in-process sliding-window engine.
    #[must_use]
    pub fn with_default_engine(config: FlowControlConfig, recorder: Arc<BlockedIpRecorder>) -> Self {
        Self::new(config, Arc::new(SlidingWindowEngine::new()), recorder)
    }

    /// Validate the configuration and load the rule set. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Config` for an invalid configuration; nothing is
    /// loaded in that case.
    pub fn initialize(&self) -> FlowResult<()> {
        let config = self.config.lock();
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        config.validate()?;
        let rules = rules_from(&config);
        self.engine.load_rules(&rules);
        self.initialized.store(true, Ordering::SeqCst);

        info!(rules = rules.len(), "flow control initialized");
        Ok(())
    }

    fn ensure_initialized(&self) -> FlowResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.initialize()
    }

    /// Fast pre-check: is this source IP already blocked?
    #[must_use]
    pub fn is_ip_blocked(&self, ip: &IpAddr) -> Option<BlockRecord> {
        self.recorder.is_blocked(ip)
    }

    /// Admit one request from `ip`.
    ///
    /// Returns `Ok(false)` when the visit-frequency line was crossed; the IP
    /// is blocked for the configured duration as a side effect. Engine
    /// failures admit.
    ///
    /// # Errors
    ///
    /// Returns an error only if lazy initialization fails.
    pub fn check_visit(&self, ip: IpAddr, request_uri: &str) -> FlowResult<bool> {
        self.ensure_initialized()?;

        match self.engine.check_entry(Resource::Visit, ip) {
            Ok(RateDecision::Pass) => Ok(true),
            Ok(RateDecision::Reject) => {
                self.block(ip, Resource::Visit, request_uri);
                Ok(false)
            }
            Err(err) => {
                warn!(ip = %ip, error = %err, "rate engine error, failing open");
                Ok(true)
            }
        }
    }

    /// Account one detected attack from `ip`.
    ///
    /// The caller has already judged the request malicious; this answers
    /// whether the IP just crossed the attack-frequency line. Returns
    /// `Ok(true)` exactly when this call caused a new block.
    ///
    /// # Errors
    ///
    /// Returns an error only if lazy initialization fails.
    pub fn record_attack(&self, ip: IpAddr, request_uri: &str) -> FlowResult<bool> {
        self.ensure_initialized()?;
        self.record_event(Resource::Attack, ip, request_uri)
    }

    /// Account one error response (status >= 400) from `ip`.
    ///
    /// Returns `Ok(true)` exactly when this call caused a new block.
    ///
    /// # Errors
    ///
    /// Returns an error only if lazy initialization fails.
    pub fn record_error(&self, ip: IpAddr, request_uri: &str) -> FlowResult<bool> {
        self.ensure_initialized()?;
        self.record_event(Resource::Error, ip, request_uri)
    }

    fn record_event(&self, resource: Resource, ip: IpAddr, request_uri: &str) -> FlowResult<bool> {
        match self.engine.check_entry(resource, ip) {
            Ok(RateDecision::Pass) => Ok(false),
            Ok(RateDecision::Reject) => {
                self.block(ip, resource, request_uri);
                Ok(true)
            }
            Err(err) => {
                warn!(ip = %ip, resource = %resource, error = %err, "rate engine error, not blocking");
                Ok(false)
            }
        }
    }

    fn block(&self, ip: IpAddr, resource: Resource, request_uri: &str) {
        let (reason, duration) = {
            let config = self.config.lock();
            match resource {
                Resource::Visit => (BlockReason::HighFrequencyVisit, config.visit_limit.block_duration),
                Resource::Attack => (BlockReason::HighFrequencyAttack, config.attack_limit.block_duration),
                Resource::Error => (BlockReason::HighFrequencyError, config.error_limit.block_duration),
            }
        };

        self.recorder.record(ip, reason, request_uri, duration);
        warn!(
            ip = %ip,
            reason = %reason,
            block_secs = duration.as_secs(),
            "admission rejected, IP blocked"
        );
    }

    /// Swap in a new configuration and reload the rule set.
    ///
    /// Safe to call concurrently with in-flight admission checks; the engine
    /// makes decisions without holding this lock.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Config` for an invalid configuration; the old
    /// configuration and rules stay active.
    pub fn update_config(&self, new_config: FlowControlConfig) -> FlowResult<()> {
        let mut config = self.config.lock();

        if let Err(err) = new_config.validate() {
            warn!(error = %err, "rejecting flow control config update");
            return Err(err);
        }

        *config = new_config;

        if self.initialized.load(Ordering::SeqCst) {
            self.engine.clear_rules();
            self.engine.load_rules(&rules_from(&config));
            info!("flow control rules reloaded");
        }
        Ok(())
    }

    /// Current metrics of the underlying recorder.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.recorder.metrics()
    }

    /// Export every currently-active block.
    #[must_use]
    pub fn blocked_ips(&self) -> Vec<BlockRecord> {
        self.recorder.snapshot()
    }

    /// The shared recorder, for wiring into observability exporters.
    #[must_use]
    pub fn recorder(&self) -> &Arc<BlockedIpRecorder> {
        &self.recorder
    }

    /// Tear down: clear the rule set and close the recorder. Idempotent.
    pub async fn close(&self) {
        let was_initialized = {
            let _config = self.config.lock();
            let was = self.initialized.swap(false, Ordering::SeqCst);
            if was {
                self.engine.clear_rules();
            }
            was
        };

        self.recorder.close().await;
        if was_initialized {
            info!("flow control closed");
        }
    }
}

impl std::fmt::Debug for FlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowController")
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
