//! # rampart-flow
//!
//! Request-admission façade for Rampart. For every inbound request the
//! pipeline asks two questions — "is this IP already blocked?" and "may this
//! request pass?" — and reports attacks and error responses back; crossing
//! any frequency line turns into a blocklist entry in
//! [`rampart_blocklist`].
//!
//! ## Resource classes
//!
//! Three independent rate-limit dimensions, each keyed on the source IP:
//!
//! - **visit** — plain request admission ([`FlowController::check_visit`])
//! - **attack** — detected attacks ([`FlowController::record_attack`])
//! - **error** — responses with status >= 400 ([`FlowController::record_error`])
//!
//! The accounting engine sits behind the [`RateEngine`] trait;
//! [`SlidingWindowEngine`] is the in-process default.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use rampart_blocklist::{BlockedIpRecorder, MemoryBlockSink, RecorderConfig};
//! use rampart_flow::{FlowControlConfig, FlowController};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), rampart_flow::FlowError> {
//! let sink = Arc::new(MemoryBlockSink::new());
//! let recorder = Arc::new(BlockedIpRecorder::new(RecorderConfig::default(), sink));
//! let controller = FlowController::with_default_engine(FlowControlConfig::default(), recorder);
//!
//! let ip: std::net::IpAddr = "192.0.2.1".parse().unwrap();
//! if controller.is_ip_blocked(&ip).is_none() && controller.check_visit(ip, "/")? {
//!     // hand the request to the rule engine
//! }
//!
//! controller.close().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;

// Re-export main types
pub use config::{FlowControlConfig, FlowControlSettings, ResourceLimitConfig, ResourceLimitSettings};
pub use controller::FlowController;
pub use engine::{HotspotRule, RateDecision, RateEngine, Resource, SlidingWindowEngine};
pub use error::{FlowError, FlowResult};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{FlowControlConfig, FlowControlSettings, ResourceLimitConfig};
    pub use crate::controller::FlowController;
    pub use crate::engine::{RateDecision, RateEngine, Resource, SlidingWindowEngine};
    pub use crate::error::{FlowError, FlowResult};
    pub use rampart_blocklist::prelude::*;
}
