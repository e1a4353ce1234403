use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};
use crate::models::{PaymentPurpose, PaymentRefs};

type HmacSha256 = Hmac<Sha256>;

/// Bound on every outbound gateway call. A slow gateway surfaces as
/// `GatewayUnavailable`, never as a hung request worker.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
}

/// Metadata attached to an intent at creation time. This is the only channel
/// connecting a gateway transaction back to domain objects, so it carries
/// everything the completion hooks need to find their targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub purpose: Option<PaymentPurpose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_client: Option<String>,
}

impl IntentMetadata {
    pub fn into_refs(self) -> PaymentRefs {
        PaymentRefs {
            user_id: self.user_id,
            membership_id: self.membership_id,
            reference_id: self.reference_id,
            reference_type: self.reference_type,
            anonymous_client: self.anonymous_client,
        }
    }
}

/// Gateway's view of a payment intent, returned by retrieve and carried in
/// webhook payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: IntentMetadata,
}

#[derive(Debug, Deserialize)]
struct CreateIntentResponse {
    id: String,
    client_secret: String,
}

/// Client-facing result of intent creation. No local payment row exists yet:
/// speculative, unpaid intents never reach the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedIntent {
    pub transaction_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Create a payment intent with the gateway. Returns the opaque
    /// transaction id plus the client secret the browser needs to complete
    /// the charge.
    pub async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<CreatedIntent> {
        let body = serde_json::json!({
            "amount": amount_cents,
            "currency": currency,
            "metadata": metadata,
        });

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("create intent: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(AppError::GatewayUnavailable(format!(
                    "gateway returned {}: {}",
                    status, error_text
                )));
            }
            return Err(AppError::Internal(format!(
                "gateway rejected intent: {}: {}",
                status, error_text
            )));
        }

        let intent: CreateIntentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("failed to parse gateway response: {}", e)))?;

        Ok(CreatedIntent {
            transaction_id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    /// Retrieve an intent's authoritative status and metadata. Used by the
    /// synchronous confirm path so the caller's claims are never trusted.
    pub async fn retrieve_intent(&self, transaction_id: &str) -> Result<GatewayIntent> {
        let response = self
            .client
            .get(format!(
                "{}/v1/payment_intents/{}",
                self.api_base, transaction_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("retrieve intent: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!(
                "Gateway transaction {} not found",
                transaction_id
            )));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::GatewayUnavailable(format!(
                "gateway returned {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("failed to parse gateway intent: {}", e)))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Verify the shared-secret signature on a webhook delivery.
    ///
    /// Header format: `t=<unix-timestamp>,v1=<hex hmac-sha256>`, signed over
    /// `"{timestamp}.{payload}"`. Stale and future timestamps are rejected to
    /// blunt replay, and the comparison is constant-time.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in signature.split(',') {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or_else(|| AppError::Validation(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::Validation(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::Validation(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "gateway webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }
        // Clock skew tolerance for future timestamps: 60 seconds
        if age < -60 {
            tracing::warn!("gateway webhook rejected: timestamp in the future (age={}s)", age);
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Length is not secret (always 64 hex chars for SHA-256)
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}
