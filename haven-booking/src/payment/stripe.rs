use async_trait::async_trait;
use haven_core::{PaymentHandle, PaymentIntentRequest, PaymentProvider, PaymentProviderKind, ProviderError};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    client_secret: Option<String>,
}

/// Direct-charge provider: creates a PaymentIntent and hands back its client secret.
pub struct StripeProvider {
    http_client: Client,
    api_base: String,
    secret_key: String,
}

impl StripeProvider {
    pub fn new(http_client: Client, api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Stripe
    }

    async fn create_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentHandle, ProviderError> {
        let amount = request.amount_minor.to_string();
        let currency = request.currency.to_lowercase();
        let reservation_id = request.reservation_id.to_string();
        let room_id = request.room_id.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", currency.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[reservation_id]", reservation_id.as_str()),
            ("metadata[room_id]", room_id.as_str()),
        ];

        let response = self
            .http_client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", reservation_id.as_str())
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let intent: PaymentIntentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;
        debug!(intent_id = %intent.id, reservation_id = %request.reservation_id, "stripe payment intent created");

        intent
            .client_secret
            .map(PaymentHandle::ClientSecret)
            .ok_or_else(|| ProviderError::UnexpectedResponse("payment intent has no client_secret".to_string()))
    }
}
