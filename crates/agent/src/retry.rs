//! Exponential backoff around a single model turn.

use std::time::Duration;

use microclaw_config::RetryConfig;
use microclaw_core::error::TransportError;
use microclaw_core::transport::{ModelRequest, ModelResponse, Transport};
use tracing::warn;

/// Backoff settings for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total send attempts, including the first. Never below 1.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay after the failed attempt numbered `attempt` (0-based):
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Like [`delay_for_attempt`](Self::delay_for_attempt), but a rate-limit
    /// hint from the endpoint wins when present (still capped).
    pub fn delay_for(&self, error: &TransportError, attempt: u32) -> Duration {
        match error {
            TransportError::RateLimited {
                retry_after: Some(hint),
            } => (*hint).min(self.max_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

/// Send `request`, retrying network and rate-limit failures.
///
/// Protocol errors return immediately. After `max_retries` failed sends the
/// last error is returned; there is no sleep after the final attempt.
pub async fn send_with_retry(
    policy: &RetryPolicy,
    transport: &dyn Transport,
    request: &ModelRequest<'_>,
    timeout: Duration,
) -> Result<ModelResponse, TransportError> {
    let mut attempt = 0;
    loop {
        let err = match transport.send(request, timeout).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        attempt += 1;
        if !err.kind().is_transient() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.delay_for(&err, attempt - 1);
        warn!(
            transport = transport.name(),
            attempt,
            max = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            err = %err,
            "Transient transport failure, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedTransport;
    use microclaw_core::message::Message;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1))
    }

    fn request<'a>(messages: Vec<&'a Message>) -> ModelRequest<'a> {
        ModelRequest {
            model: "test-model",
            max_tokens: 64,
            messages,
            tools: &[],
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(p.delay_for_attempt(10), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn rate_limit_hint_is_clamped() {
        let p = policy();
        let short = TransportError::RateLimited {
            retry_after: Some(Duration::from_millis(50)),
        };
        let long = TransportError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        let none = TransportError::RateLimited { retry_after: None };
        assert_eq!(p.delay_for(&short, 2), Duration::from_millis(50));
        assert_eq!(p.delay_for(&long, 0), Duration::from_secs(1));
        assert_eq!(p.delay_for(&none, 1), Duration::from_millis(200));
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        let p = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(p.max_retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_retries_with_growing_delays() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Network("reset".into())),
            Err(TransportError::Network("reset".into())),
            Err(TransportError::Network("reset".into())),
            Ok(ModelResponse::text("never reached")),
        ]);
        let user = Message::user("hi");
        let err = send_with_retry(&policy(), &transport, &request(vec![&user]), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Network(_)));
        assert_eq!(transport.call_count(), 3);

        let gaps = transport.call_gaps();
        assert_eq!(gaps, [Duration::from_millis(100), Duration::from_millis(200)]);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::RateLimited { retry_after: None }),
            Ok(ModelResponse::text("fine")),
        ]);
        let user = Message::user("hi");
        let response = send_with_retry(&policy(), &transport, &request(vec![&user]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.content[0], microclaw_core::ContentBlock::text("fine"));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Protocol {
                status: 400,
                message: "bad request".into(),
            }),
            Ok(ModelResponse::text("never reached")),
        ]);
        let user = Message::user("hi");
        let start = tokio::time::Instant::now();
        let err = send_with_retry(&policy(), &transport, &request(vec![&user]), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol { status: 400, .. }));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn honours_retry_after_hint() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::RateLimited {
                retry_after: Some(Duration::from_millis(700)),
            }),
            Ok(ModelResponse::text("ok")),
        ]);
        let user = Message::user("hi");
        send_with_retry(&policy(), &transport, &request(vec![&user]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(transport.call_gaps(), [Duration::from_millis(700)]);
    }
}
