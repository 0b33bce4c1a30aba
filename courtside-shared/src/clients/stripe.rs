use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Maximum age of a signed webhook, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeProduct {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub recurring: Option<Recurring>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recurring {
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub line_items: Option<List<LineItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct List<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub price: Option<StripePrice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    pub status: String,
    #[serde(default)]
    pub start_date: Option<i64>,
    pub items: List<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: StripePrice,
}

/// Webhook envelope. `data.object` is decoded per event type.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    pub fn object<T: DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| format!("unexpected {} payload: {e}", self.event_type))
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub price_id: &'a str,
    pub user_id: &'a str,
    pub plan_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    pub fn new(client: Client, secret_key: &str) -> Self {
        Self {
            client,
            secret_key: secret_key.to_string(),
        }
    }

    async fn post_form<T: DeserializeOwned>(&self, path: &str, form: &[(String, String)]) -> Result<T, String> {
        let response = self.client
            .post(format!("{STRIPE_API}{path}"))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| format!("stripe request failed: {e}"))?;
        decode_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, String> {
        let response = self.client
            .get(format!("{STRIPE_API}{path}"))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(query)
            .send()
            .await
            .map_err(|e| format!("stripe request failed: {e}"))?;
        decode_response(response).await
    }

    pub async fn create_product(&self, name: &str, description: Option<&str>) -> Result<StripeProduct, String> {
        let mut form = vec![
            ("name".to_string(), name.to_string()),
            ("metadata[internal_plan_name]".to_string(), name.to_string()),
        ];
        if let Some(d) = description.filter(|d| !d.is_empty()) {
            form.push(("description".to_string(), d.to_string()));
        }
        self.post_form("/products", &form).await
    }

    pub async fn create_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        currency: &str,
        interval: &str,
    ) -> Result<StripePrice, String> {
        let form = vec![
            ("product".to_string(), product_id.to_string()),
            ("unit_amount".to_string(), unit_amount.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("recurring[interval]".to_string(), interval.to_string()),
        ];
        self.post_form("/prices", &form).await
    }

    pub async fn deactivate_price(&self, price_id: &str) -> Result<StripePrice, String> {
        let form = vec![("active".to_string(), "false".to_string())];
        self.post_form(&format!("/prices/{price_id}"), &form).await
    }

    pub async fn create_checkout_session(&self, req: &CheckoutRequest<'_>) -> Result<CheckoutSession, String> {
        self.post_form("/checkout/sessions", &checkout_form(req)).await
    }

    pub async fn retrieve_session_with_line_items(&self, session_id: &str) -> Result<CheckoutSession, String> {
        self.get(&format!("/checkout/sessions/{session_id}"), &[("expand[]", "line_items")])
            .await
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("stripe response unreadable: {e}"))?;

    if !status.is_success() {
        let message = serde_json::from_str::<StripeErrorBody>(&body)
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or(body);
        return Err(format!("stripe returned {status}: {message}"));
    }

    serde_json::from_str(&body).map_err(|e| format!("stripe response invalid: {e}"))
}

fn checkout_form(req: &CheckoutRequest<'_>) -> Vec<(String, String)> {
    [
        ("mode", "subscription"),
        ("payment_method_types[0]", "card"),
        ("line_items[0][price]", req.price_id),
        ("line_items[0][quantity]", "1"),
        ("client_reference_id", req.user_id),
        ("subscription_data[metadata][userId]", req.user_id),
        ("metadata[userId]", req.user_id),
        ("metadata[planId]", req.plan_id),
        ("allow_promotion_codes", "true"),
        ("success_url", req.success_url),
        ("cancel_url", req.cancel_url),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    NotConfigured,
    #[error("missing Stripe-Signature header")]
    MissingHeader,
    #[error("malformed Stripe-Signature header")]
    Malformed,
    #[error("webhook timestamp outside tolerance")]
    Expired,
    #[error("no matching v1 signature")]
    Mismatch,
}

pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`) against the raw body.
pub fn verify_signature(
    header: Option<&str>,
    payload: &[u8],
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    use subtle::ConstantTimeEq;

    // an empty HMAC key is computable by anyone
    if secret.is_empty() {
        return Err(SignatureError::NotConfigured);
    }

    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let expected = sign_payload(secret, timestamp, payload);
    let matched = signatures
        .iter()
        .any(|sig| bool::from(expected.as_bytes().ct_eq(sig.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"invoice.payment_failed"}"#;

    #[test]
    fn accepts_valid_signature() {
        let sig = sign_payload(SECRET, 1_700_000_000, BODY);
        let header = format!("t=1700000000,v1={sig},v0=deadbeef");
        assert_eq!(verify_signature(Some(&header), BODY, SECRET, 1_700_000_010), Ok(()));
    }

    #[test]
    fn any_of_several_v1_may_match() {
        let sig = sign_payload(SECRET, 1_700_000_000, BODY);
        let header = format!("t=1700000000,v1=00ff,v1={sig}");
        assert!(verify_signature(Some(&header), BODY, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = sign_payload(SECRET, 1_700_000_000, BODY);
        let header = format!("t=1700000000,v1={sig}");
        assert_eq!(
            verify_signature(Some(&header), b"{}", SECRET, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let sig = sign_payload(SECRET, 1_700_000_000, BODY);
        let header = format!("t=1700000000,v1={sig}");
        assert_eq!(
            verify_signature(Some(&header), BODY, SECRET, 1_700_000_000 + WEBHOOK_TOLERANCE_SECS + 1),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert_eq!(verify_signature(None, BODY, SECRET, 0), Err(SignatureError::MissingHeader));
        assert_eq!(verify_signature(Some("v1=abc"), BODY, SECRET, 0), Err(SignatureError::Malformed));
        assert_eq!(verify_signature(Some("t=5"), BODY, SECRET, 5), Err(SignatureError::Malformed));
    }

    #[test]
    fn rejects_events_when_secret_is_unset() {
        let sig = sign_payload("", 1_700_000_000, BODY);
        let header = format!("t=1700000000,v1={sig}");
        let result = verify_signature(Some(&header), BODY, "", 1_700_000_000);
        assert!(result.is_err());
        assert_eq!(result, Err(SignatureError::NotConfigured));
    }

    #[test]
    fn checkout_form_carries_user_reference() {
        let form = checkout_form(&CheckoutRequest {
            price_id: "price_1",
            user_id: "u1",
            plan_id: "p1",
            success_url: "https://app/subscription-success",
            cancel_url: "https://app/subscription-cancel",
        });
        let get = |k: &str| form.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("client_reference_id"), Some("u1"));
        assert_eq!(get("subscription_data[metadata][userId]"), Some("u1"));
        assert_eq!(get("line_items[0][price]"), Some("price_1"));
        assert_eq!(get("mode"), Some("subscription"));
    }

    #[test]
    fn decodes_subscription_event() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_2",
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_1",
                "customer": "cus_1",
                "status": "past_due",
                "start_date": 1_700_000_000,
                "items": { "data": [ { "price": { "id": "price_9" } } ] }
            }}
        }))
        .unwrap();
        let sub: Subscription = event.object().unwrap();
        assert_eq!(sub.items.data[0].price.id, "price_9");
        assert_eq!(sub.status, "past_due");
    }
}
