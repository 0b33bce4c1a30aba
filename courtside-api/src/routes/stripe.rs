use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::clients::stripe::{verify_signature, WebhookEvent};
use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::middleware::AdminUser;
use courtside_shared::types::api::ApiResponse;
use courtside_shared::types::auth::AuthUser;
use courtside_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::Plan;
use crate::services::billing_service::{
    self, BillingStats, CheckoutLink, CreatePlanRequest, SubscriptionView, TransactionRow, UpdatePlanRequest,
};
use crate::AppState;

const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub price_id: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

impl TransactionsQuery {
    fn params(&self) -> PaginationParams {
        PaginationParams::new(self.page, self.limit)
    }
}

/// POST /stripe/product-and-price
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreatePlanRequest>,
) -> AppResult<Json<ApiResponse<Plan>>> {
    let plan = billing_service::create_plan(&state, req).await?;
    tracing::info!(plan_id = %plan.id, admin_id = %admin.id, "plan created");
    Ok(Json(ApiResponse::ok_with_message(plan, "Product and price created successfully")))
}

/// POST /stripe/create-checkout-session
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutLink>>> {
    let link = billing_service::create_checkout(&state, auth_user.id, req.price_id.trim()).await?;
    Ok(Json(ApiResponse::ok(link)))
}

/// GET /stripe/plans
pub async fn list_plans(State(state): State<Arc<AppState>>) -> AppResult<Json<ApiResponse<Vec<Plan>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(billing_service::list_plans(&mut conn)?)))
}

/// PATCH /stripe/plans/:id
pub async fn update_plan(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(plan_id): Path<Uuid>,
    Json(req): Json<UpdatePlanRequest>,
) -> AppResult<Json<ApiResponse<Plan>>> {
    let plan = billing_service::update_plan(&state, plan_id, req).await?;
    tracing::info!(plan_id = %plan_id, admin_id = %admin.id, "plan updated");
    Ok(Json(ApiResponse::ok_with_message(plan, "Plan updated successfully")))
}

/// POST /stripe/webhook
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    verify_signature(signature, &body, &state.config.stripe_webhook_secret, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!(error = %e, "stripe webhook rejected");
        AppError::new(ErrorCode::WebhookSignatureInvalid, format!("Webhook Error: {e}"))
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Webhook Error: {e}")))?;

    if let Err(e) = billing_service::dispatch(&state, &event).await {
        tracing::error!(event_id = %event.id, event_type = %event.event_type, error = %e, "stripe webhook handler failed");
        return Err(AppError::bad_request(format!("Webhook Error: {e}")));
    }

    Ok(Json(WebhookAck { received: true }))
}

/// GET /stripe/get-all-subscription
pub async fn all_subscriptions(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<SubscriptionView>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(billing_service::all_subscriptions(&mut conn)?)))
}

/// GET /stripe/subscriptionDetails/:subscription_id
pub async fn subscription_details(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
    Path(subscription_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SubscriptionView>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(billing_service::subscription_details(&mut conn, subscription_id)?)))
}

/// GET /stripe/me/transactions
pub async fn my_transactions(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(query): Query<TransactionsQuery>,
) -> AppResult<Json<ApiResponse<Paginated<TransactionRow>>>> {
    let params = query.params();
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let (items, total) = billing_service::transactions_page(&mut conn, Some(auth_user.id), &params)?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &params))))
}

/// GET /stripe/me/current-plan
pub async fn current_plan(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Option<SubscriptionView>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(billing_service::current_plan(&mut conn, auth_user.id)?)))
}

/// GET /stripe/admin/transactions
pub async fn all_transactions(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(query): Query<TransactionsQuery>,
) -> AppResult<Json<ApiResponse<Paginated<TransactionRow>>>> {
    let params = query.params();
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let (items, total) = billing_service::transactions_page(&mut conn, None, &params)?;
    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &params))))
}

/// GET /stripe/dashboard-stats
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<BillingStats>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(billing_service::billing_stats(&mut conn)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_query_defaults_to_ten_per_page() {
        let q: TransactionsQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        let params = q.params();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn webhook_ack_shape() {
        let v = serde_json::to_value(WebhookAck { received: true }).unwrap();
        assert_eq!(v, serde_json::json!({ "received": true }));
    }
}
