#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use haven_booking::payment::ReservationTag;
use haven_booking::webhook::paypal::signed_message;
use haven_booking::webhook::stripe::compute_signature;
use haven_booking::webhook::{CertificateSource, PaypalWebhookScheme, StripeWebhookScheme, WebhookError};
use haven_booking::{
    BookingMetrics, CancellationTimer, InitiatorSettings, ManualScheduler, PaymentInitiator, ReservationCoordinator,
    ReservationLedger, WebhookEvent, WebhookResolver,
};
use haven_core::{
    FixedClock, PaymentHandle, PaymentIntentRequest, PaymentProvider, PaymentProviderKind, ProviderError,
    ReservationRequest, Room,
};
use haven_store::InMemoryStore;
use prometheus::Registry;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use uuid::Uuid;

pub const STRIPE_SECRET: &str = "whsec_lifecycle";
pub const PAYPAL_WEBHOOK_ID: &str = "WH-LIFECYCLE";
pub const PAYPAL_CERT_URL: &str = "https://api.paypal.com/v1/notifications/certs/CERT-TEST";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Succeed,
    Fail,
    Hang,
}

/// Payment provider double with scripted behaviour and a call counter.
pub struct ScriptedProvider {
    kind: PaymentProviderKind,
    behaviour: Behaviour,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(kind: PaymentProviderKind, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn kind(&self) -> PaymentProviderKind {
        self.kind
    }

    async fn create_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentHandle, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Succeed => Ok(match self.kind {
                PaymentProviderKind::Stripe => PaymentHandle::ClientSecret(format!("pi_{}_secret", request.reservation_id)),
                PaymentProviderKind::Paypal => {
                    PaymentHandle::ApprovalUrl(format!("https://paypal.test/approve/{}", request.reservation_id))
                }
            }),
            Behaviour::Fail => Err(ProviderError::Rejected {
                status: 503,
                body: "unavailable".into(),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Transport("hung".into()))
            }
        }
    }
}

struct StaticKey(RsaPublicKey);

#[async_trait]
impl CertificateSource for StaticKey {
    async fn public_key(&self, _cert_url: &str) -> Result<RsaPublicKey, WebhookError> {
        Ok(self.0.clone())
    }
}

pub fn paypal_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 1024).unwrap())
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()
}

pub struct HarnessOptions {
    pub grace: Duration,
    pub stripe: Behaviour,
    pub paypal: Behaviour,
    pub settings: InitiatorSettings,
    pub stripe_webhook_secret: &'static str,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(900),
            stripe: Behaviour::Succeed,
            paypal: Behaviour::Succeed,
            settings: InitiatorSettings::default(),
            stripe_webhook_secret: STRIPE_SECRET,
        }
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub clock: Arc<FixedClock>,
    pub scheduler: Arc<ManualScheduler>,
    pub metrics: BookingMetrics,
    pub stripe: Arc<ScriptedProvider>,
    pub paypal: Arc<ScriptedProvider>,
    pub coordinator: Arc<ReservationCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(HarnessOptions::default())
    }

    pub fn with(options: HarnessOptions) -> Self {
        let store = InMemoryStore::new();
        let clock = Arc::new(FixedClock::new(epoch()));
        let scheduler = Arc::new(ManualScheduler::new());
        let metrics = BookingMetrics::new(&Registry::new()).unwrap();

        let timer = CancellationTimer::new(scheduler.clone(), options.grace, metrics.clone());
        let ledger = ReservationLedger::new(Arc::new(store.clone()), clock.clone(), metrics.clone())
            .with_cancellation(timer);

        let stripe = ScriptedProvider::new(PaymentProviderKind::Stripe, options.stripe);
        let paypal = ScriptedProvider::new(PaymentProviderKind::Paypal, options.paypal);
        let initiator = PaymentInitiator::new(Arc::new(store.clone()), options.settings, metrics.clone())
            .with_provider(stripe.clone())
            .with_provider(paypal.clone());

        let resolver = WebhookResolver::new(ledger.clone(), metrics.clone())
            .with_scheme(Arc::new(StripeWebhookScheme::new(
                options.stripe_webhook_secret,
                300,
                clock.clone(),
            )))
            .with_scheme(Arc::new(PaypalWebhookScheme::new(
                PAYPAL_WEBHOOK_ID,
                "https://api.paypal.com/",
                Arc::new(StaticKey(RsaPublicKey::from(paypal_key()))),
            )));

        Self {
            store,
            clock,
            scheduler,
            metrics,
            stripe,
            paypal,
            coordinator: Arc::new(ReservationCoordinator::new(ledger, initiator, resolver)),
        }
    }

    pub async fn room(&self) -> Room {
        self.store.add_room(10_000).await
    }

    pub fn stripe_event(&self, reservation_id: Uuid, event_type: &str) -> WebhookEvent {
        self.stripe_event_with_secret(reservation_id, event_type, STRIPE_SECRET)
    }

    pub fn stripe_event_with_secret(&self, reservation_id: Uuid, event_type: &str, secret: &str) -> WebhookEvent {
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": event_type,
            "data": {"object": {"id": "pi_1", "metadata": {"reservation_id": reservation_id.to_string()}}}
        })
        .to_string();
        let timestamp = self.clock_now().timestamp();
        let signature = compute_signature(secret, timestamp, payload.as_bytes()).unwrap();
        WebhookEvent::new(payload.into_bytes())
            .with_header("Stripe-Signature", format!("t={},v1={}", timestamp, signature))
    }

    pub fn paypal_event(&self, reservation_id: Uuid, event_type: &str) -> WebhookEvent {
        let tag = ReservationTag {
            reservation_id,
            room_id: Uuid::new_v4(),
        };
        let payload = serde_json::json!({
            "id": "WH-EVT-1",
            "event_type": event_type,
            "resource": {"id": "CAP-1", "custom_id": serde_json::to_string(&tag).unwrap()}
        })
        .to_string();
        let message = signed_message("TX-1", "2025-01-01T00:00:00Z", PAYPAL_WEBHOOK_ID, payload.as_bytes());
        let signature = SigningKey::<Sha256>::new(paypal_key().clone()).sign(&message);
        WebhookEvent::new(payload.into_bytes())
            .with_header("PayPal-Transmission-Id", "TX-1")
            .with_header("PayPal-Transmission-Time", "2025-01-01T00:00:00Z")
            .with_header("PayPal-Transmission-Sig", STANDARD.encode(signature.to_bytes()))
            .with_header("PayPal-Cert-Url", PAYPAL_CERT_URL)
            .with_header("PayPal-Auth-Algo", "SHA256withRSA")
    }

    fn clock_now(&self) -> DateTime<Utc> {
        use haven_core::Clock;
        self.clock.now()
    }
}

pub fn request(room_id: Uuid, from: u32, to: u32, provider: &str) -> ReservationRequest {
    ReservationRequest {
        room_id,
        guest_name: "Selam Tesfaye".into(),
        guest_phone: "+251911223344".to_string().into(),
        guest_email: "selam@example.com".to_string().into(),
        from_time: day(from),
        to_time: day(to),
        provider: provider.into(),
        booked_by: Some("customer-42".into()),
    }
}
