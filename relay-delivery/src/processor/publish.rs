//! Publish with a bounded number of transport-level attempts

use relay_common::tracing::warn;
use relay_transport::{Transport, TransportError};

use crate::policy::PublishRetryPolicy;

/// Publish `payload`, retrying per `policy`.
///
/// Returns the number of attempts it took, or the last transport error.
pub(super) async fn publish_with_retry(
    transport: &dyn Transport,
    topic: &str,
    payload: &str,
    policy: &PublishRetryPolicy,
) -> Result<u32, TransportError> {
    let mut attempt = 1;

    loop {
        match transport.publish(topic, payload).await {
            Ok(()) => return Ok(attempt),
            Err(e) if policy.should_retry(attempt) => {
                warn!(
                    "Publish attempt {attempt}/{} to {topic} failed: {e}",
                    policy.attempts()
                );
                tokio::time::sleep(policy.backoff()).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_transport::MockTransport;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_recovers_within_budget() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();
        transport.fail_next(2);

        let started = tokio::time::Instant::now();
        let attempts = publish_with_retry(
            &transport,
            "sms/send",
            "+15550001|hi",
            &PublishRetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(transport.publish_count(), 1);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();
        transport.fail_all(true);

        let result = publish_with_retry(
            &transport,
            "sms/send",
            "+15550001|hi",
            &PublishRetryPolicy::default(),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(transport.publish_attempts(), 3);
        assert_eq!(transport.publish_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempt_policy_publishes_once() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();
        transport.fail_all(true);

        let policy = PublishRetryPolicy {
            max_attempts: 0,
            backoff_secs: 1,
        };
        let result = publish_with_retry(&transport, "sms/send", "+15550001|hi", &policy).await;

        assert!(result.is_err());
        assert_eq!(transport.publish_attempts(), 1);
    }
}
