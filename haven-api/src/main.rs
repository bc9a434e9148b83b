use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use haven_api::{
    app,
    state::{AppState, AuthConfig, RateLimit},
};
use haven_booking::payment::paypal::PaypalCredentials;
use haven_booking::payment::{PaypalProvider, StripeProvider};
use haven_booking::webhook::{CachedCertificateSource, HttpCertificateSource, PaypalWebhookScheme, StripeWebhookScheme};
use haven_booking::{
    BookingMetrics, CancellationTimer, InitiatorSettings, PaymentInitiator, ReservationCoordinator, ReservationLedger,
    TokioScheduler, WebhookResolver,
};
use haven_core::{Clock, SystemClock};
use haven_store::{app_config::Config, DbClient, PgReservationStore, RedisClient};
use prometheus::Registry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haven_api=debug,haven_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!("Starting Haven API on port {}", config.server.port);

    let db = DbClient::connect(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    db.migrate().await.context("failed to run migrations")?;
    let store = Arc::new(PgReservationStore::new(db.pool.clone()));

    let redis = RedisClient::new(&config.redis.url).context("failed to create Redis client")?;

    let registry = Registry::new();
    let metrics = BookingMetrics::new(&registry).context("failed to register metrics")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let payments = &config.payments;
    let http_client = reqwest::Client::builder()
        .timeout(payments.request_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let timer = CancellationTimer::new(
        Arc::new(TokioScheduler),
        config.reservation.grace_period(),
        metrics.clone(),
    );
    let ledger = ReservationLedger::new(store.clone(), clock.clone(), metrics.clone()).with_cancellation(timer);

    let settings = InitiatorSettings {
        currency: payments.currency.clone(),
        timeout: payments.request_timeout(),
        breaker_threshold: payments.breaker_threshold,
        breaker_reset: Duration::from_secs(payments.breaker_reset_seconds),
    };
    let mut initiator = PaymentInitiator::new(store.clone(), settings, metrics.clone());
    if payments.stripe.payments_enabled() {
        initiator = initiator.with_provider(Arc::new(StripeProvider::new(
            http_client.clone(),
            &payments.stripe.api_base,
            &payments.stripe.secret_key,
        )));
    } else {
        tracing::warn!("stripe secret key not set, stripe payments disabled");
    }
    if payments.paypal.payments_enabled() {
        initiator = initiator.with_provider(Arc::new(PaypalProvider::new(
            http_client.clone(),
            &payments.paypal.api_base,
            PaypalCredentials {
                client_id: payments.paypal.client_id.clone(),
                client_secret: payments.paypal.client_secret.clone(),
                return_url: payments.paypal.return_url.clone(),
                cancel_url: payments.paypal.cancel_url.clone(),
            },
        )));
    } else {
        tracing::warn!("paypal client credentials not set, paypal payments disabled");
    }

    let mut resolver = WebhookResolver::new(ledger.clone(), metrics.clone());
    if payments.stripe.webhooks_enabled() {
        resolver = resolver.with_scheme(Arc::new(StripeWebhookScheme::new(
            payments.stripe.webhook_secret.clone(),
            i64::try_from(payments.stripe.signature_tolerance_seconds).unwrap_or(i64::MAX),
            clock.clone(),
        )));
    } else {
        tracing::warn!("stripe webhook secret not set, stripe webhooks will be ignored");
    }
    if payments.paypal.webhooks_enabled() {
        let certificates = Arc::new(CachedCertificateSource::new(
            Arc::new(HttpCertificateSource::new(http_client.clone())),
            Duration::from_secs(payments.paypal.cert_cache_seconds),
        ));
        resolver = resolver.with_scheme(Arc::new(PaypalWebhookScheme::new(
            payments.paypal.webhook_id.clone(),
            payments.paypal.trusted_cert_prefix.clone(),
            certificates,
        )));
    } else {
        tracing::warn!("paypal webhook id not set, paypal webhooks will be ignored");
    }

    let rearmed = ledger
        .rearm_pending_timers()
        .await
        .context("failed to re-arm cancellation timers")?;
    tracing::info!(rearmed, "pending reservation timers re-armed");

    let coordinator = Arc::new(ReservationCoordinator::new(ledger, initiator, resolver));

    let app_state = AppState {
        coordinator,
        rate_limit: Some(RateLimit {
            limiter: Arc::new(redis),
            max_requests: config.redis.rate_limit_requests,
            window_seconds: config.redis.rate_limit_window_seconds,
        }),
        registry,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        stripe_publishable_key: payments.stripe.publishable_key.clone(),
        stale_pending_default: config.reservation.stale_pending(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app(app_state).into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;
    Ok(())
}
