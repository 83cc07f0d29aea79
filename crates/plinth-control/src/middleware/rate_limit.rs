//! Rate limiting for deployment creation using tower-governor.
//!
//! Excess requests are rejected immediately with 429, never queued.

use std::sync::Arc;

use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;

use crate::config::RateLimitConfig;
use crate::error::{ControlError, ControlResult};

/// Wrap a router in a per-caller rate limit.
///
/// Uses `SmartIpKeyExtractor`, which checks common reverse proxy headers
/// (x-forwarded-for, x-real-ip, forwarded) before falling back to the
/// peer IP.
pub fn apply_rate_limit<S>(router: Router<S>, config: &RateLimitConfig) -> ControlResult<Router<S>>
where
    S: Clone + Send + Sync + 'static,
{
    let governor_config = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(u64::from(config.requests_per_second))
        .burst_size(config.burst_size)
        .finish()
        .ok_or_else(|| ControlError::Config("invalid rate limit configuration".to_owned()))?;

    Ok(router.layer(GovernorLayer {
        config: Arc::new(governor_config),
    }))
}
