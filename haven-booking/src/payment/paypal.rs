use async_trait::async_trait;
use haven_core::{PaymentHandle, PaymentIntentRequest, PaymentProvider, PaymentProviderKind, ProviderError};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{decimal_amount, ReservationTag};

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<OrderLink>,
}

#[derive(Debug, Deserialize)]
struct CaptureOrderResponse {
    id: String,
    status: String,
}

#[derive(Debug, Clone)]
pub struct PaypalCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// Redirect provider: creates a CAPTURE order and returns its approval link.
pub struct PaypalProvider {
    http_client: Client,
    api_base: String,
    credentials: PaypalCredentials,
}

impl PaypalProvider {
    pub fn new(http_client: Client, api_base: impl Into<String>, credentials: PaypalCredentials) -> Self {
        Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let response = self
            .http_client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let token: AccessTokenResponse = parse(response).await?;
        Ok(token.access_token)
    }
}

async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json()
        .await
        .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))
}

#[async_trait]
impl PaymentProvider for PaypalProvider {
    fn kind(&self) -> PaymentProviderKind {
        PaymentProviderKind::Paypal
    }

    async fn create_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentHandle, ProviderError> {
        let token = self.access_token().await?;

        let custom_id = serde_json::to_string(&ReservationTag {
            reservation_id: request.reservation_id,
            room_id: request.room_id,
        })
        .map_err(|e| ProviderError::UnexpectedResponse(e.to_string()))?;

        let order = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": request.currency.to_uppercase(),
                    "value": decimal_amount(request.amount_minor),
                },
                "description": "Payment for room reservation",
                "custom_id": custom_id,
            }],
            "application_context": {
                "return_url": self.credentials.return_url,
                "cancel_url": self.credentials.cancel_url,
            },
        });

        let response = self
            .http_client
            .post(format!("{}/v2/checkout/orders", self.api_base))
            .bearer_auth(&token)
            .json(&order)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let created: CreateOrderResponse = parse(response).await?;
        debug!(order_id = %created.id, reservation_id = %request.reservation_id, "paypal order created");

        created
            .links
            .into_iter()
            .find(|link| link.rel == "approve")
            .map(|link| PaymentHandle::ApprovalUrl(link.href))
            .ok_or_else(|| ProviderError::UnexpectedResponse(format!("order {} has no approve link", created.id)))
    }

    async fn capture(&self, reference: &str) -> Result<(), ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .post(format!("{}/v2/checkout/orders/{}/capture", self.api_base, reference))
            .bearer_auth(&token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let captured: CaptureOrderResponse = parse(response).await?;
        if captured.status != "COMPLETED" {
            warn!(order_id = %captured.id, status = %captured.status, "paypal capture not completed yet");
        }
        Ok(())
    }
}
