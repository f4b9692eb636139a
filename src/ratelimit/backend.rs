//! Admission contract shared by the in-memory and distributed engines.

use std::time::Duration;

use async_trait::async_trait;

use super::limit::{LimitConfig, Outcome};
use crate::error::{Result, ShieldError};

/// Trait for limiter implementations.
///
/// This trait abstracts over both the in-process `MemoryLimiter` and the
/// Redis-backed `RedisLimiter` so callers can gate work with either.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Decide whether `identifier` may perform one more action right now.
    ///
    /// An admitted call has already been recorded when this returns. Being
    /// blocked is a normal `Ok` outcome; errors only signal operational failures.
    async fn allow(&self, identifier: &str) -> Result<Outcome>;

    /// Like [`Limiter::allow`], bounded by `deadline`.
    ///
    /// On expiry the in-flight admission is dropped, which abandons any
    /// outstanding remote call.
    async fn allow_within(&self, identifier: &str, deadline: Duration) -> Result<Outcome> {
        match tokio::time::timeout(deadline, self.allow(identifier)).await {
            Ok(result) => result,
            Err(_) => Err(ShieldError::DeadlineExceeded(deadline)),
        }
    }

    /// Release background tasks and connections held by the limiter.
    ///
    /// Calling this more than once is harmless.
    async fn close(&self, deadline: Duration) -> Result<()>;

    /// The configuration this limiter enforces.
    fn config(&self) -> &LimitConfig;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A limiter whose admissions never complete, like a hung remote call.
    struct StalledLimiter {
        config: LimitConfig,
    }

    #[async_trait]
    impl Limiter for StalledLimiter {
        async fn allow(&self, _identifier: &str) -> Result<Outcome> {
            std::future::pending().await
        }

        async fn close(&self, _deadline: Duration) -> Result<()> {
            Ok(())
        }

        fn config(&self) -> &LimitConfig {
            &self.config
        }
    }

    #[tokio::test]
    async fn test_allow_within_surfaces_deadline() {
        let limiter = StalledLimiter {
            config: LimitConfig::default(),
        };

        let err = limiter
            .allow_within("user_1", Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ShieldError::DeadlineExceeded(d) if d == Duration::from_millis(20)
        ));
    }
}
