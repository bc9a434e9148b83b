use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

/// Counters for the reservation lifecycle, registered into a caller-owned registry.
#[derive(Clone)]
pub struct BookingMetrics {
    reservations: IntCounterVec,
    payment_calls: IntCounterVec,
    webhooks: IntCounterVec,
    timer_firings: IntCounterVec,
    stale_pending: IntGauge,
}

impl BookingMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let reservations = IntCounterVec::new(
            Opts::new("haven_reservations_total", "Reservation attempts grouped by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(reservations.clone()))?;

        let payment_calls = IntCounterVec::new(
            Opts::new("haven_payment_provider_calls_total", "Outbound payment provider calls"),
            &["provider", "outcome"],
        )?;
        registry.register(Box::new(payment_calls.clone()))?;

        let webhooks = IntCounterVec::new(
            Opts::new("haven_payment_webhooks_total", "Inbound payment webhooks by disposition"),
            &["provider", "disposition"],
        )?;
        registry.register(Box::new(webhooks.clone()))?;

        let timer_firings = IntCounterVec::new(
            Opts::new("haven_cancellation_timer_firings_total", "Cancellation timer firings by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(timer_firings.clone()))?;

        let stale_pending = IntGauge::new(
            "haven_stale_pending_reservations",
            "PENDING reservations older than the configured threshold at last check",
        )?;
        registry.register(Box::new(stale_pending.clone()))?;

        Ok(Self {
            reservations,
            payment_calls,
            webhooks,
            timer_firings,
            stale_pending,
        })
    }

    pub fn reservation(&self, outcome: &str) {
        self.reservations.with_label_values(&[outcome]).inc();
    }

    pub fn payment_call(&self, provider: &str, outcome: &str) {
        self.payment_calls.with_label_values(&[provider, outcome]).inc();
    }

    pub fn webhook(&self, provider: &str, disposition: &str) {
        self.webhooks.with_label_values(&[provider, disposition]).inc();
    }

    pub fn timer_fired(&self, outcome: &str) {
        self.timer_firings.with_label_values(&[outcome]).inc();
    }

    pub fn set_stale_pending(&self, count: usize) {
        self.stale_pending.set(count as i64);
    }

    pub fn reservation_count(&self, outcome: &str) -> u64 {
        self.reservations.with_label_values(&[outcome]).get()
    }

    pub fn webhook_count(&self, provider: &str, disposition: &str) -> u64 {
        self.webhooks.with_label_values(&[provider, disposition]).get()
    }

    pub fn timer_count(&self, outcome: &str) -> u64 {
        self.timer_firings.with_label_values(&[outcome]).get()
    }

    pub fn stale_pending(&self) -> i64 {
        self.stale_pending.get()
    }
}
