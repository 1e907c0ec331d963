//! Probe primitives and per-unit result tracking.
//!
//! `HealthTracker` turns a stream of probe results into a health status
//! with consecutive-result thresholds and exponential backoff between
//! probes. `http_probe` and `tcp_probe` perform single checks.

use std::time::Duration;

use tracing::{debug, warn};

/// Health of a unit as determined by its probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The unit reported healthy.
    Healthy,
    /// The unit answered but is not healthy.
    Unhealthy,
    /// The probe could not be executed (connection error, client error).
    Failed,
}

impl From<bool> for ProbeResult {
    fn from(healthy: bool) -> Self {
        if healthy {
            ProbeResult::Healthy
        } else {
            ProbeResult::Unhealthy
        }
    }
}

/// Tracks consecutive probe results for a single unit.
#[derive(Debug)]
pub struct HealthTracker {
    status: HealthStatus,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Failures before marking unhealthy.
    unhealthy_threshold: u32,
    /// Successes needed to become healthy.
    healthy_threshold: u32,
    current_backoff: Duration,
    base_interval: Duration,
    max_backoff: Duration,
}

impl HealthTracker {
    pub fn new(unhealthy_threshold: u32, healthy_threshold: u32, interval: Duration) -> Self {
        Self {
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
            healthy_threshold: healthy_threshold.max(1),
            current_backoff: interval,
            base_interval: interval,
            max_backoff: Duration::from_secs(60),
        }
    }

    /// Cap the backoff below the default 60s.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(self.base_interval);
        self
    }

    /// Record a probe result and return the new health status.
    pub fn record(&mut self, result: ProbeResult) -> HealthStatus {
        match result {
            ProbeResult::Healthy => {
                self.consecutive_failures = 0;
                self.consecutive_successes += 1;
                self.current_backoff = self.base_interval;

                if self.consecutive_successes >= self.healthy_threshold {
                    if self.status != HealthStatus::Healthy {
                        debug!(successes = self.consecutive_successes, "unit became healthy");
                    }
                    self.status = HealthStatus::Healthy;
                }
            }
            ProbeResult::Unhealthy | ProbeResult::Failed => {
                self.consecutive_successes = 0;
                self.consecutive_failures += 1;
                self.current_backoff = (self.current_backoff * 2).min(self.max_backoff);

                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != HealthStatus::Unhealthy {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "unit marked unhealthy"
                        );
                    }
                    self.status = HealthStatus::Unhealthy;
                }
            }
        }

        self.status
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Delay before the next probe.
    pub fn next_interval(&self) -> Duration {
        self.current_backoff
    }
}

/// Perform an HTTP GET against `address` + `path`.
///
/// Returns `Healthy` for 2xx, `Unhealthy` for any other status, and
/// `Failed` if the connection fails or the timeout elapses.
pub async fn http_probe(address: &str, path: &str, timeout: Duration) -> ProbeResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "helmsman-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "health probe request invalid");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => ProbeResult::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "health probe non-2xx");
                ProbeResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    result.unwrap_or_else(|_| {
        debug!(%uri, "health probe timed out");
        ProbeResult::Failed
    })
}

/// Check that `address` accepts TCP connections.
pub async fn tcp_probe(address: &str, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(address)).await {
        Ok(Ok(_)) => ProbeResult::Healthy,
        Ok(Err(e)) => {
            debug!(error = %e, address, "tcp probe refused");
            ProbeResult::Failed
        }
        Err(_) => {
            debug!(address, "tcp probe timed out");
            ProbeResult::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_starts_unknown() {
        let tracker = HealthTracker::new(3, 1, Duration::from_secs(5));
        assert_eq!(tracker.status(), HealthStatus::Unknown);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn tracker_becomes_healthy_on_first_success() {
        let mut tracker = HealthTracker::new(3, 1, Duration::from_secs(5));
        assert_eq!(tracker.record(ProbeResult::Healthy), HealthStatus::Healthy);
    }

    #[test]
    fn tracker_becomes_unhealthy_at_threshold() {
        let mut tracker = HealthTracker::new(3, 1, Duration::from_secs(5));
        tracker.record(ProbeResult::Healthy);

        tracker.record(ProbeResult::Unhealthy);
        tracker.record(ProbeResult::Failed);
        assert_eq!(tracker.status(), HealthStatus::Healthy);
        assert_eq!(tracker.record(ProbeResult::Unhealthy), HealthStatus::Unhealthy);
    }

    #[test]
    fn tracker_needs_consecutive_successes() {
        let mut tracker = HealthTracker::new(1, 2, Duration::from_secs(1));
        tracker.record(ProbeResult::Healthy);
        assert_eq!(tracker.status(), HealthStatus::Unknown);

        // A failure resets the streak.
        tracker.record(ProbeResult::Failed);
        tracker.record(ProbeResult::Healthy);
        assert_eq!(tracker.status(), HealthStatus::Unhealthy);
        tracker.record(ProbeResult::Healthy);
        assert_eq!(tracker.status(), HealthStatus::Healthy);
    }

    #[test]
    fn tracker_backoff_doubles_and_caps() {
        let mut tracker = HealthTracker::new(100, 1, Duration::from_secs(1))
            .with_max_backoff(Duration::from_secs(8));

        tracker.record(ProbeResult::Unhealthy);
        assert_eq!(tracker.next_interval(), Duration::from_secs(2));
        tracker.record(ProbeResult::Unhealthy);
        assert_eq!(tracker.next_interval(), Duration::from_secs(4));
        for _ in 0..5 {
            tracker.record(ProbeResult::Failed);
        }
        assert_eq!(tracker.next_interval(), Duration::from_secs(8));

        tracker.record(ProbeResult::Healthy);
        assert_eq!(tracker.next_interval(), Duration::from_secs(1));
    }

    #[test]
    fn probe_result_from_bool() {
        assert_eq!(ProbeResult::from(true), ProbeResult::Healthy);
        assert_eq!(ProbeResult::from(false), ProbeResult::Unhealthy);
    }

    #[tokio::test]
    async fn http_probe_to_closed_port_returns_failed() {
        let result = http_probe("127.0.0.1:1", "/healthz", Duration::from_millis(100)).await;
        assert_eq!(result, ProbeResult::Failed);
    }

    #[tokio::test]
    async fn tcp_probe_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert_eq!(tcp_probe(&addr, Duration::from_secs(1)).await, ProbeResult::Healthy);

        drop(listener);
        assert_eq!(
            tcp_probe("127.0.0.1:1", Duration::from_millis(100)).await,
            ProbeResult::Failed
        );
    }
}
