//! # Failover Executor
//!
//! Pick → breaker check → execute → record. On failure the peer is
//! excluded, the backoff doubles, and the next-best peer is tried, up
//! to the retry budget.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::balancer::LoadBalancer;
use crate::breaker::CircuitBreaker;
use crate::config::PeerNetConfig;
use crate::errors::PeerNetError;
use crate::health::{PeerSnapshot, ProbeOutcome};

/// Routes operations through the balancer and breaker with retry.
pub struct FailoverExecutor {
    balancer: Arc<LoadBalancer>,
    breaker: Arc<CircuitBreaker>,
    config: PeerNetConfig,
}

impl FailoverExecutor {
    pub fn new(
        balancer: Arc<LoadBalancer>,
        breaker: Arc<CircuitBreaker>,
        config: PeerNetConfig,
    ) -> Self {
        Self {
            balancer,
            breaker,
            config,
        }
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Run `op` against the best available peer, failing over on error.
    ///
    /// Each attempt picks a fresh peer (excluding ones that already
    /// failed this call), consults the breaker, and records the outcome
    /// in both the breaker and the health table.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> Result<T, PeerNetError>
    where
        F: FnMut(PeerSnapshot) -> Fut,
        Fut: Future<Output = Result<T, PeerNetError>>,
    {
        let monitor = self.balancer.monitor().clone();
        let mut excluded: Vec<String> = Vec::new();
        let mut backoff = self.config.retry_backoff;

        for attempt in 0..self.config.max_retries {
            let Some(peer) = self.balancer.select(&excluded) else {
                // Nothing eligible (left); stop early.
                return Err(if excluded.is_empty() {
                    PeerNetError::NoPeerAvailable
                } else {
                    PeerNetError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                    }
                });
            };

            if !self.breaker.should_allow(&peer.node_id, operation) {
                debug!(peer = %peer.node_id, operation, "short-circuited");
                excluded.push(peer.node_id);
                continue;
            }

            let node_id = peer.node_id.clone();
            monitor.connection_started(&node_id);
            let started = std::time::Instant::now();
            let result = op(peer).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            monitor.connection_finished(&node_id);

            match result {
                Ok(value) => {
                    self.breaker.record_success(&node_id, operation);
                    monitor.record(
                        &node_id,
                        ProbeOutcome {
                            success: true,
                            response_ms: elapsed_ms,
                        },
                        shared_types::clock::now_unix(),
                    );
                    return Ok(value);
                }
                Err(e) => {
                    warn!(peer = %node_id, operation, attempt, error = %e, "attempt failed");
                    self.breaker.record_failure(&node_id, operation);
                    monitor.record(
                        &node_id,
                        ProbeOutcome {
                            success: false,
                            response_ms: elapsed_ms,
                        },
                        shared_types::clock::now_unix(),
                    );
                    excluded.push(node_id);
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }

        Err(PeerNetError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.config.max_retries,
        })
    }
}
