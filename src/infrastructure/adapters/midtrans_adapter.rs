use crate::domain::errors::GatewayError;
use crate::domain::PaymentStatus;
use crate::infrastructure::config::midtrans_config::MidtransConfig;
use crate::ports::payment_gateway_port::*;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha512};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Longest item name the processor accepts
const MAX_ITEM_NAME_LEN: usize = 50;

/// Midtrans Core API adapter for QRIS charges
#[derive(Clone)]
pub struct MidtransAdapter {
    config: Arc<MidtransConfig>,
    client: Client,
}

impl MidtransAdapter {
    pub fn new(config: Arc<MidtransConfig>) -> GatewayResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}:", self.config.server_key);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn send<R: DeserializeOwned>(&self, request: RequestBuilder) -> GatewayResult<R> {
        let response = request
            .header("Authorization", self.authorization())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(http_status = %status, body = %body, "Midtrans response");

        serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                GatewayError::InvalidResponse(format!("Undecodable body: {}", e))
            } else {
                GatewayError::Rejected {
                    status_code: status.as_u16().to_string(),
                    message: body,
                }
            }
        })
    }

    /// Checks the `signature_key` of a notification
    pub fn verify_signature(&self, notification: &MidtransNotification) -> bool {
        let expected = notification_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &self.config.server_key,
        );
        expected.eq_ignore_ascii_case(&notification.signature_key)
    }

    fn charge_body(&self, request: &ChargeRequest) -> serde_json::Value {
        let items: Vec<_> = request
            .items
            .iter()
            .map(|item| {
                json!({
                    "id": item.id,
                    "name": truncate_name(&item.name),
                    "price": item.price.minor(),
                    "quantity": item.quantity,
                })
            })
            .collect();

        let mut body = json!({
            "payment_type": "qris",
            "transaction_details": {
                "order_id": request.order_reference,
                "gross_amount": request.gross_amount.minor(),
            },
            "item_details": items,
            "custom_expiry": {
                "expiry_duration": request.expiry_minutes,
                "unit": "minute",
            },
        });

        if let Some(customer) = &request.customer {
            body["customer_details"] = json!({
                "first_name": customer.name,
                "email": customer.email,
            });
        }

        if let Some(acquirer) = &self.config.acquirer {
            body["qris"] = json!({ "acquirer": acquirer });
        }

        body
    }
}

#[async_trait]
impl PaymentGatewayPort for MidtransAdapter {
    async fn request_charge(&self, request: ChargeRequest) -> GatewayResult<ChargeResponse> {
        let body = self.charge_body(&request);
        debug!(order_reference = %request.order_reference, "Requesting Midtrans QRIS charge");

        let response: MidtransChargeResponse = self
            .send(self.client.post(self.url("/v2/charge")).json(&body))
            .await?;

        response.into_charge().inspect_err(|e| {
            error!(order_reference = %request.order_reference, error = %e, "Midtrans charge failed");
        })
    }

    async fn check_status(&self, order_reference: &str) -> GatewayResult<ChargeStatus> {
        let response: MidtransStatusResponse = self
            .send(
                self.client
                    .get(self.url(&format!("/v2/{}/status", order_reference))),
            )
            .await?;

        response.into_status()
    }

    async fn cancel_charge(&self, order_reference: &str) -> GatewayResult<()> {
        let response: MidtransStatusResponse = self
            .send(
                self.client
                    .post(self.url(&format!("/v2/{}/cancel", order_reference))),
            )
            .await?;

        if response.status_code != "200" {
            warn!(
                %order_reference,
                status_code = %response.status_code,
                "Midtrans refused cancellation"
            );
            return Err(response.rejected());
        }

        debug!(%order_reference, "Midtrans charge cancelled");
        Ok(())
    }

    fn parse_notification(&self, body: &str) -> GatewayResult<GatewayNotification> {
        let notification: MidtransNotification = serde_json::from_str(body)
            .map_err(|e| GatewayError::InvalidResponse(format!("Malformed notification: {}", e)))?;

        if !self.verify_signature(&notification) {
            warn!(order_id = %notification.order_id, "Rejected notification with bad signature");
            return Err(GatewayError::InvalidSignature);
        }

        Ok(GatewayNotification {
            status: map_transaction_status(&notification.transaction_status),
            order_reference: notification.order_id,
            raw_status: notification.transaction_status,
            external_reference: notification.transaction_id.filter(|t| !t.is_empty()),
            payload: body.to_string(),
        })
    }
}

/// Translates a Midtrans `transaction_status`. Unknown values stay pending.
pub fn map_transaction_status(status: &str) -> PaymentStatus {
    match status {
        "settlement" | "capture" => PaymentStatus::Success,
        "pending" => PaymentStatus::Pending,
        "deny" | "cancel" | "expire" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// hex(SHA-512(order_id + status_code + gross_amount + server_key))
pub fn notification_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &str,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_ITEM_NAME_LEN).collect()
}

#[derive(Debug, Deserialize)]
struct MidtransAction {
    #[serde(default)]
    name: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct MidtransChargeResponse {
    status_code: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    qr_string: Option<String>,
    #[serde(default)]
    actions: Vec<MidtransAction>,
}

impl MidtransChargeResponse {
    fn into_charge(self) -> GatewayResult<ChargeResponse> {
        // business errors come back as HTTP 200 with the code in the body
        if self.status_code != "201" {
            return Err(GatewayError::Rejected {
                status_code: self.status_code,
                message: self.status_message.unwrap_or_default(),
            });
        }

        let qr_payload = self
            .qr_string
            .filter(|q| !q.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("Missing qr_string".to_string()))?;

        let verification_url = self
            .actions
            .iter()
            .find(|a| a.name.as_deref() == Some("generate-qr-code"))
            .or_else(|| self.actions.first())
            .map(|a| a.url.clone());

        Ok(ChargeResponse {
            charge_reference: self.transaction_id,
            qr_payload,
            verification_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MidtransStatusResponse {
    status_code: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    transaction_id: Option<String>,
    #[serde(default)]
    transaction_status: Option<String>,
}

impl MidtransStatusResponse {
    fn into_status(self) -> GatewayResult<ChargeStatus> {
        let Some(raw_status) = self.transaction_status.clone() else {
            return Err(self.rejected());
        };

        Ok(ChargeStatus {
            status: map_transaction_status(&raw_status),
            raw_status,
            external_reference: self.transaction_id,
            message: self.status_message,
        })
    }

    fn rejected(self) -> GatewayError {
        GatewayError::Rejected {
            status_code: self.status_code,
            message: self.status_message.unwrap_or_default(),
        }
    }
}

/// HTTP notification body as posted by Midtrans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidtransNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
}
