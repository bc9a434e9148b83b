use std::sync::Arc;
use std::time::Duration;

use haven_booking::ReservationCoordinator;
use haven_store::RateLimiter;
use prometheus::Registry;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct RateLimit {
    pub limiter: Arc<dyn RateLimiter>,
    pub max_requests: i64,
    pub window_seconds: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ReservationCoordinator>,
    /// `None` disables rate limiting.
    pub rate_limit: Option<RateLimit>,
    pub registry: Registry,
    pub auth: AuthConfig,
    pub stripe_publishable_key: String,
    pub stale_pending_default: Duration,
}
