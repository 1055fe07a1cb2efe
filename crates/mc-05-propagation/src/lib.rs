//! # Propagation - Signed Event Fan-Out
//!
//! Outbound: every bus event worth relaying is wrapped in a signed
//! envelope and POSTed to all eligible peers with bounded concurrency.
//! Delivery is fire-and-forget: failures mark peer health but never
//! stall the producer.
//!
//! Inbound: the receiving pipeline validates the HMAC signature, checks
//! the dedup store, rate-limits the source, decodes the body, and
//! dispatches into the in-process bus.

pub mod config;
pub mod errors;
pub mod inbound;
pub mod outbound;
pub mod priority;
pub mod ratelimit;

pub use config::PropagationConfig;
pub use errors::IngressError;
pub use inbound::{IngressOutcome, IngressPipeline, IngressRequest, IngressStatus};
pub use outbound::{BroadcastReport, Propagator};
pub use priority::Priority;
pub use ratelimit::SourceRateLimiter;
