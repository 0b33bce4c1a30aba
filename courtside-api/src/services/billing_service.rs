use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::clients::stripe::{
    self as stripe, CheckoutRequest, CheckoutSession, Invoice, WebhookEvent,
};
use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::types::auth::SubscriptionTier;
use courtside_shared::types::pagination::PaginationParams;

use crate::models::{
    NewPaymentTransaction, NewPlan, NewSubscription, PaymentTransaction, Plan, PlanChanges,
    Subscription, UserSummary,
};
use crate::schema::{plans, subscriptions, transactions, users};
use crate::services::post_service::author_summaries;
use crate::AppState;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_PAST_DUE: &str = "past_due";
pub const STATUS_CANCELED: &str = "canceled";

const INVALID_PLAN: &str = "The selected subscription plan is invalid or no longer available.";

/// Collapses Stripe's subscription states onto the three we store.
pub fn map_subscription_status(stripe_status: &str) -> &'static str {
    match stripe_status {
        "active" | "trialing" => STATUS_ACTIVE,
        "past_due" => STATUS_PAST_DUE,
        _ => STATUS_CANCELED,
    }
}

pub fn render_status(status: &str) -> String {
    if status == "succeeded" {
        "Successful".to_string()
    } else {
        status.to_string()
    }
}

pub fn unit_amount(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub fn resolve_interval(transaction_plan: Option<&str>, subscription_plan: Option<&str>) -> String {
    transaction_plan
        .or(subscription_plan)
        .unwrap_or("N/A")
        .to_string()
}

fn stripe_error(e: String) -> AppError {
    tracing::error!(error = %e, "stripe request failed");
    AppError::new(ErrorCode::StripeError, "Payment provider request failed")
}

fn db(state: &AppState) -> AppResult<courtside_shared::clients::db::DbConn> {
    state.db.get().map_err(|e| AppError::internal(e.to_string()))
}

// --- Plans ---

fn default_currency() -> String {
    "usd".to_string()
}

fn default_interval() -> String {
    "month".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub is_popular: bool,
}

impl CreatePlanRequest {
    fn check(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::bad_request("Plan name is required"));
        }
        if self.amount.is_nan() || self.amount <= 0.0 {
            return Err(AppError::bad_request("Amount must be greater than zero"));
        }
        if !matches!(self.interval.as_str(), "month" | "year") {
            return Err(AppError::new(ErrorCode::InvalidPlan, "Interval must be month or year"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub features: Option<Vec<String>>,
    pub is_popular: Option<bool>,
}

impl UpdatePlanRequest {
    /// True when the request moves the plan to a different Stripe price.
    pub fn reprices(&self, plan: &Plan) -> bool {
        let amount_changed = self.amount.is_some_and(|a| unit_amount(a) != unit_amount(plan.price));
        let currency_changed = self
            .currency
            .as_deref()
            .is_some_and(|c| !c.eq_ignore_ascii_case(&plan.currency));
        amount_changed || currency_changed
    }
}

pub async fn create_plan(state: &AppState, req: CreatePlanRequest) -> AppResult<Plan> {
    req.check()?;

    let description = req.description.clone().unwrap_or_default();
    let product = state
        .stripe
        .create_product(req.name.trim(), Some(&description))
        .await
        .map_err(stripe_error)?;
    let price = state
        .stripe
        .create_price(&product.id, unit_amount(req.amount), &req.currency, &req.interval)
        .await
        .map_err(stripe_error)?;

    let mut conn = db(state)?;
    let plan = diesel::insert_into(plans::table)
        .values(&NewPlan {
            name: req.name.trim().to_string(),
            description,
            price: req.amount,
            currency: req.currency.to_lowercase(),
            interval: req.interval,
            features: serde_json::json!(req.features),
            is_popular: req.is_popular,
            stripe_product_id: Some(product.id),
            stripe_price_id: price.id,
        })
        .returning(Plan::as_returning())
        .get_result(&mut conn)?;

    tracing::info!(plan_id = %plan.id, price_id = %plan.stripe_price_id, "plan created");
    Ok(plan)
}

pub async fn update_plan(state: &AppState, plan_id: Uuid, req: UpdatePlanRequest) -> AppResult<Plan> {
    let mut conn = db(state)?;
    let plan = plans::table
        .find(plan_id)
        .select(Plan::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PlanNotFound, "Plan not found"))?;

    let mut changes = PlanChanges {
        name: req.name.clone(),
        description: req.description.clone(),
        price: req.amount,
        currency: req.currency.as_ref().map(|c| c.to_lowercase()),
        features: req.features.as_ref().map(|f| serde_json::json!(f)),
        is_popular: req.is_popular,
        stripe_price_id: None,
        updated_at: Some(Utc::now()),
    };

    if req.reprices(&plan) {
        let product_id = plan
            .stripe_product_id
            .as_deref()
            .ok_or_else(|| AppError::bad_request("Plan has no Stripe product to reprice"))?;
        let amount = req.amount.unwrap_or(plan.price);
        let currency = changes.currency.clone().unwrap_or_else(|| plan.currency.clone());

        let price = state
            .stripe
            .create_price(product_id, unit_amount(amount), &currency, &plan.interval)
            .await
            .map_err(stripe_error)?;
        if let Err(e) = state.stripe.deactivate_price(&plan.stripe_price_id).await {
            tracing::warn!(price_id = %plan.stripe_price_id, error = %e, "failed to deactivate old price");
        }
        changes.stripe_price_id = Some(price.id);
    }

    let updated = diesel::update(plans::table.find(plan_id))
        .set(&changes)
        .returning(Plan::as_returning())
        .get_result(&mut conn)?;
    tracing::info!(plan_id = %plan_id, "plan updated");
    Ok(updated)
}

pub fn list_plans(conn: &mut PgConnection) -> AppResult<Vec<Plan>> {
    Ok(plans::table
        .order(plans::created_at.asc())
        .select(Plan::as_select())
        .load(conn)?)
}

fn plan_for_price(conn: &mut PgConnection, price_id: &str) -> AppResult<Option<Plan>> {
    Ok(plans::table
        .filter(plans::stripe_price_id.eq(price_id))
        .select(Plan::as_select())
        .first(conn)
        .optional()?)
}

#[derive(Debug, Serialize)]
pub struct CheckoutLink {
    pub url: Option<String>,
    pub session_id: String,
}

pub async fn create_checkout(state: &AppState, user_id: Uuid, price_id: &str) -> AppResult<CheckoutLink> {
    let plan = {
        let mut conn = db(state)?;
        plan_for_price(&mut conn, price_id)?
    }
    .ok_or_else(|| AppError::new(ErrorCode::InvalidPlan, INVALID_PLAN))?;

    let frontend = state.config.frontend_url.trim_end_matches('/');
    let success_url = format!("{frontend}/subscription-success");
    let cancel_url = format!("{frontend}/subscription-cancel");
    let user = user_id.to_string();
    let plan_ref = plan.id.to_string();

    let session = state
        .stripe
        .create_checkout_session(&CheckoutRequest {
            price_id,
            user_id: &user,
            plan_id: &plan_ref,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await
        .map_err(stripe_error)?;

    tracing::info!(user_id = %user_id, session_id = %session.id, "checkout session created");
    Ok(CheckoutLink { url: session.url, session_id: session.id })
}

// --- Webhooks ---

/// Routes a verified Stripe event to its handler. Unknown types are acknowledged and ignored.
pub async fn dispatch(state: &AppState, event: &WebhookEvent) -> AppResult<()> {
    let decode_err = |e: String| AppError::new(ErrorCode::ValidationError, e);

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "stripe event received");
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            on_checkout_completed(state, event.object().map_err(decode_err)?).await
        }
        "invoice.payment_succeeded" => {
            let mut conn = db(state)?;
            on_invoice_paid(&mut conn, event.object().map_err(decode_err)?)
        }
        "invoice.payment_failed" => {
            let mut conn = db(state)?;
            on_invoice_failed(&mut conn, event.object().map_err(decode_err)?)
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let mut conn = db(state)?;
            on_subscription_changed(&mut conn, event.object().map_err(decode_err)?)
        }
        other => {
            tracing::debug!(event_type = %other, "ignoring stripe event");
            Ok(())
        }
    }
}

/// Who an invoice is billed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payer {
    /// Found through `users.stripe_customer_id`.
    Customer(Uuid),
    /// Found through the stored subscription; `link` means the customer id should be saved on the user.
    Subscriber { user_id: Uuid, link: bool },
    Unknown,
}

fn resolve_payer(by_customer: Option<Uuid>, subscription_owner: Option<Uuid>, has_customer_id: bool) -> Payer {
    match (by_customer, subscription_owner) {
        (Some(user_id), _) => Payer::Customer(user_id),
        (None, Some(user_id)) => Payer::Subscriber { user_id, link: has_customer_id },
        (None, None) => Payer::Unknown,
    }
}

/// Tier after an invoice settles. A paid invoice without a known plan grants PRO.
fn invoice_tier(paid: bool, plan_interval: Option<&str>) -> SubscriptionTier {
    if !paid {
        return SubscriptionTier::Free;
    }
    plan_interval
        .map(SubscriptionTier::for_interval)
        .unwrap_or(SubscriptionTier::Pro)
}

/// What a subscription event writes: the stored status, its end time and the owner's new tier.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubscriptionChange {
    status: &'static str,
    ended_at: Option<DateTime<Utc>>,
    tier: Option<SubscriptionTier>,
}

fn subscription_change(stripe_status: &str, plan_interval: &str, now: DateTime<Utc>) -> SubscriptionChange {
    let status = map_subscription_status(stripe_status);
    let (ended_at, tier) = match status {
        STATUS_CANCELED => (Some(now), Some(SubscriptionTier::Free)),
        STATUS_ACTIVE => (None, Some(SubscriptionTier::for_interval(plan_interval))),
        _ => (None, None),
    };
    SubscriptionChange { status, ended_at, tier }
}

fn set_tier(conn: &mut PgConnection, user_id: Uuid, tier: SubscriptionTier) -> AppResult<()> {
    diesel::update(users::table.find(user_id))
        .set((
            users::subscribe_status.eq(tier.as_str()),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    tracing::info!(user_id = %user_id, tier = tier.as_str(), "subscription tier updated");
    Ok(())
}

fn link_customer(conn: &mut PgConnection, user_id: Uuid, customer_id: &str) -> AppResult<()> {
    diesel::update(users::table.find(user_id))
        .set(users::stripe_customer_id.eq(customer_id))
        .execute(conn)?;
    Ok(())
}

fn user_by_customer(conn: &mut PgConnection, customer_id: Option<&str>) -> AppResult<Option<Uuid>> {
    let Some(customer_id) = customer_id else {
        return Ok(None);
    };
    Ok(users::table
        .filter(users::stripe_customer_id.eq(customer_id))
        .select(users::id)
        .first(conn)
        .optional()?)
}

fn subscription_by_stripe_id(conn: &mut PgConnection, stripe_id: Option<&str>) -> AppResult<Option<Subscription>> {
    let Some(stripe_id) = stripe_id else {
        return Ok(None);
    };
    Ok(subscriptions::table
        .filter(subscriptions::stripe_subscription_id.eq(stripe_id))
        .select(Subscription::as_select())
        .first(conn)
        .optional()?)
}

fn plan_by_id(conn: &mut PgConnection, plan_id: Uuid) -> AppResult<Option<Plan>> {
    Ok(plans::table
        .find(plan_id)
        .select(Plan::as_select())
        .first(conn)
        .optional()?)
}

async fn on_checkout_completed(state: &AppState, session: CheckoutSession) -> AppResult<()> {
    let Some(user_id) = session
        .client_reference_id
        .as_deref()
        .and_then(|r| Uuid::parse_str(r).ok())
    else {
        tracing::warn!(session_id = %session.id, "checkout session without a user reference");
        return Ok(());
    };

    let mut conn = db(state)?;
    if let Some(customer) = session.customer.as_deref() {
        if let Err(e) = link_customer(&mut conn, user_id, customer) {
            tracing::warn!(user_id = %user_id, error = %e, "failed to link stripe customer");
        }
    }

    let full = state
        .stripe
        .retrieve_session_with_line_items(&session.id)
        .await
        .map_err(stripe_error)?;
    let Some(price) = full
        .line_items
        .and_then(|items| items.data.into_iter().next())
        .and_then(|item| item.price)
    else {
        tracing::warn!(session_id = %session.id, "checkout session has no price");
        return Ok(());
    };
    let Some(plan) = plan_for_price(&mut conn, &price.id)? else {
        tracing::warn!(price_id = %price.id, "checkout for an unknown plan");
        return Ok(());
    };

    let interval = price
        .recurring
        .map(|r| r.interval)
        .unwrap_or_else(|| plan.interval.clone());
    set_tier(&mut conn, user_id, SubscriptionTier::for_interval(&interval))?;

    let transaction_id = session.payment_intent.clone().unwrap_or_else(|| session.id.clone());
    diesel::insert_into(subscriptions::table)
        .values(&NewSubscription {
            user_id,
            plan_id: plan.id,
            transaction_id: transaction_id.clone(),
            status: STATUS_ACTIVE.to_string(),
            stripe_subscription_id: session.subscription.clone(),
            started_at: Utc::now(),
            ended_at: None,
        })
        .on_conflict(subscriptions::stripe_subscription_id)
        .do_update()
        .set((
            subscriptions::transaction_id.eq(&transaction_id),
            subscriptions::status.eq(STATUS_ACTIVE),
            subscriptions::plan_id.eq(plan.id),
            subscriptions::ended_at.eq(None::<DateTime<Utc>>),
            subscriptions::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    tracing::info!(user_id = %user_id, plan_id = %plan.id, "checkout completed");
    Ok(())
}

fn upsert_transaction(conn: &mut PgConnection, row: NewPaymentTransaction) -> AppResult<()> {
    diesel::insert_into(transactions::table)
        .values(&row)
        .on_conflict(transactions::transaction_id)
        .do_update()
        .set((
            transactions::status.eq(&row.status),
            transactions::receipt_url.eq(&row.receipt_url),
            transactions::amount.eq(row.amount),
            transactions::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

fn on_invoice_paid(conn: &mut PgConnection, invoice: Invoice) -> AppResult<()> {
    let transaction_id = invoice.payment_intent.clone().unwrap_or_else(|| invoice.id.clone());
    let subscription = subscription_by_stripe_id(conn, invoice.subscription.as_deref())?;

    let by_customer = user_by_customer(conn, invoice.customer.as_deref())?;
    let user_id = match resolve_payer(by_customer, subscription.as_ref().map(|s| s.user_id), invoice.customer.is_some()) {
        Payer::Customer(user_id) => user_id,
        Payer::Subscriber { user_id, link } => {
            match invoice.customer.as_deref() {
                Some(customer) if link => link_customer(conn, user_id, customer)?,
                _ => {}
            }
            user_id
        }
        Payer::Unknown => {
            tracing::warn!(invoice_id = %invoice.id, "paid invoice for an unknown customer");
            return Ok(());
        }
    };

    let plan = match &subscription {
        Some(sub) => plan_by_id(conn, sub.plan_id)?,
        None => None,
    };
    set_tier(conn, user_id, invoice_tier(true, plan.as_ref().map(|p| p.interval.as_str())))?;

    upsert_transaction(
        conn,
        NewPaymentTransaction {
            user_id,
            subscription_id: subscription.as_ref().map(|s| s.id),
            plan_id: plan.as_ref().map(|p| p.id),
            transaction_id: transaction_id.clone(),
            amount: cents_to_amount(invoice.amount_paid),
            currency: invoice.currency.clone().unwrap_or_else(default_currency),
            status: "succeeded".to_string(),
            receipt_url: invoice.hosted_invoice_url.or(invoice.receipt_url),
        },
    )?;

    tracing::info!(user_id = %user_id, transaction_id = %transaction_id, "invoice paid");
    Ok(())
}

fn on_invoice_failed(conn: &mut PgConnection, invoice: Invoice) -> AppResult<()> {
    let Some(user_id) = user_by_customer(conn, invoice.customer.as_deref())? else {
        tracing::warn!(invoice_id = %invoice.id, "failed invoice for an unknown customer");
        return Ok(());
    };
    let subscription = subscription_by_stripe_id(conn, invoice.subscription.as_deref())?;
    let transaction_id = invoice.payment_intent.clone().unwrap_or_else(|| invoice.id.clone());

    upsert_transaction(
        conn,
        NewPaymentTransaction {
            user_id,
            subscription_id: subscription.as_ref().map(|s| s.id),
            plan_id: subscription.as_ref().map(|s| s.plan_id),
            transaction_id: transaction_id.clone(),
            amount: cents_to_amount(invoice.amount_due),
            currency: invoice.currency.clone().unwrap_or_else(default_currency),
            status: "failed".to_string(),
            receipt_url: invoice.hosted_invoice_url.or(invoice.receipt_url),
        },
    )?;
    set_tier(conn, user_id, invoice_tier(false, None))?;

    tracing::warn!(user_id = %user_id, transaction_id = %transaction_id, "invoice payment failed");
    Ok(())
}

fn on_subscription_changed(conn: &mut PgConnection, event: stripe::Subscription) -> AppResult<()> {
    let Some(price_id) = event.items.data.first().map(|item| item.price.id.clone()) else {
        tracing::warn!(subscription = %event.id, "subscription event without items");
        return Ok(());
    };
    let Some(plan) = plan_for_price(conn, &price_id)? else {
        tracing::warn!(price_id = %price_id, "subscription event for an unknown plan");
        return Ok(());
    };
    let change = subscription_change(&event.status, &plan.interval, Utc::now());

    if let Some(existing) = subscription_by_stripe_id(conn, Some(&event.id))? {
        diesel::update(subscriptions::table.find(existing.id))
            .set((
                subscriptions::status.eq(change.status),
                subscriptions::plan_id.eq(plan.id),
                subscriptions::ended_at.eq(change.ended_at),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

        if let Some(tier) = change.tier {
            set_tier(conn, existing.user_id, tier)?;
        }
        tracing::info!(subscription = %event.id, status = change.status, "subscription updated");
        return Ok(());
    }

    let Some(user_id) = user_by_customer(conn, event.customer.as_deref())? else {
        tracing::warn!(subscription = %event.id, "subscription event for an unknown customer");
        return Ok(());
    };
    let started_at = event
        .start_date
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    // checkout.session.completed may have inserted the row since the lookup above
    diesel::insert_into(subscriptions::table)
        .values(&NewSubscription {
            user_id,
            plan_id: plan.id,
            transaction_id: String::new(),
            status: change.status.to_string(),
            stripe_subscription_id: Some(event.id.clone()),
            started_at,
            ended_at: change.ended_at,
        })
        .on_conflict(subscriptions::stripe_subscription_id)
        .do_update()
        .set((
            subscriptions::status.eq(change.status),
            subscriptions::ended_at.eq(change.ended_at),
            subscriptions::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    tracing::info!(subscription = %event.id, user_id = %user_id, status = change.status, "subscription recorded");
    Ok(())
}

// --- Reads ---

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub user: Option<UserSummary>,
    pub plan: Option<Plan>,
}

fn plans_by_id(conn: &mut PgConnection, ids: Vec<Uuid>) -> AppResult<HashMap<Uuid, Plan>> {
    Ok(plans::table
        .filter(plans::id.eq_any(ids))
        .select(Plan::as_select())
        .load(conn)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect())
}

fn subscription_views(conn: &mut PgConnection, items: Vec<Subscription>) -> AppResult<Vec<SubscriptionView>> {
    let user_ids: Vec<Uuid> = items.iter().map(|s| s.user_id).collect();
    let users = author_summaries(conn, &user_ids)?;
    let plans = plans_by_id(conn, items.iter().map(|s| s.plan_id).collect())?;

    Ok(items
        .into_iter()
        .map(|subscription| SubscriptionView {
            user: users.get(&subscription.user_id).cloned(),
            plan: plans.get(&subscription.plan_id).cloned(),
            subscription,
        })
        .collect())
}

pub fn all_subscriptions(conn: &mut PgConnection) -> AppResult<Vec<SubscriptionView>> {
    let items = subscriptions::table
        .order(subscriptions::created_at.desc())
        .select(Subscription::as_select())
        .load(conn)?;
    subscription_views(conn, items)
}

pub fn subscription_details(conn: &mut PgConnection, subscription_id: Uuid) -> AppResult<SubscriptionView> {
    let subscription = subscriptions::table
        .find(subscription_id)
        .select(Subscription::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::SubscriptionNotFound, "Subscription not found"))?;
    subscription_views(conn, vec![subscription])?
        .pop()
        .ok_or_else(|| AppError::internal("subscription view missing"))
}

pub fn current_plan(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Option<SubscriptionView>> {
    let latest = subscriptions::table
        .filter(subscriptions::user_id.eq(user_id))
        .filter(subscriptions::status.eq(STATUS_ACTIVE))
        .order(subscriptions::started_at.desc())
        .select(Subscription::as_select())
        .first(conn)
        .optional()?;
    match latest {
        Some(sub) => Ok(subscription_views(conn, vec![sub])?.pop()),
        None => Ok(None),
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionRow {
    pub username: Option<String>,
    pub transaction_id: String,
    pub interval: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub billing_date: DateTime<Utc>,
    pub receipt_url: Option<String>,
}

fn transaction_rows(conn: &mut PgConnection, items: Vec<PaymentTransaction>) -> AppResult<Vec<TransactionRow>> {
    let sub_ids: Vec<Uuid> = items.iter().filter_map(|t| t.subscription_id).collect();
    let sub_plan: HashMap<Uuid, Uuid> = subscriptions::table
        .filter(subscriptions::id.eq_any(sub_ids))
        .select((subscriptions::id, subscriptions::plan_id))
        .load::<(Uuid, Uuid)>(conn)?
        .into_iter()
        .collect();

    let mut plan_ids: Vec<Uuid> = items.iter().filter_map(|t| t.plan_id).collect();
    plan_ids.extend(sub_plan.values().copied());
    let plans = plans_by_id(conn, plan_ids)?;

    let user_ids: Vec<Uuid> = items.iter().map(|t| t.user_id).collect();
    let users = author_summaries(conn, &user_ids)?;

    let interval_of = |plan_id: Option<Uuid>| plan_id.and_then(|id| plans.get(&id)).map(|p| p.interval.as_str());

    Ok(items
        .into_iter()
        .map(|t| {
            let via_subscription = t.subscription_id.and_then(|id| sub_plan.get(&id).copied());
            TransactionRow {
                username: users.get(&t.user_id).map(|u| u.athlete_full_name.clone()),
                interval: resolve_interval(interval_of(t.plan_id), interval_of(via_subscription)),
                transaction_id: t.transaction_id,
                amount: t.amount,
                currency: t.currency,
                status: render_status(&t.status),
                billing_date: t.billing_date,
                receipt_url: t.receipt_url,
            }
        })
        .collect())
}

/// One page of transactions, billing date desc. `user_id` narrows to a single payer.
pub fn transactions_page(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
    params: &PaginationParams,
) -> AppResult<(Vec<TransactionRow>, u64)> {
    let scoped = || {
        let mut q = transactions::table.into_boxed();
        if let Some(id) = user_id {
            q = q.filter(transactions::user_id.eq(id));
        }
        q
    };

    let total: i64 = scoped().count().get_result(conn)?;
    let items = scoped()
        .order(transactions::billing_date.desc())
        .offset(params.offset() as i64)
        .limit(params.limit() as i64)
        .select(PaymentTransaction::as_select())
        .load(conn)?;

    Ok((transaction_rows(conn, items)?, total.max(0) as u64))
}

#[derive(Debug, Serialize)]
pub struct BillingStats {
    pub subscribers: HashMap<&'static str, i64>,
    pub recent_transactions: Vec<TransactionRow>,
}

pub fn billing_stats(conn: &mut PgConnection) -> AppResult<BillingStats> {
    let subscribers = crate::services::admin_service::tier_counts(conn)?
        .into_iter()
        .map(|(tier, n)| (tier.as_str(), n))
        .collect();
    let (recent_transactions, _) = transactions_page(conn, None, &PaginationParams::new(1, 10))?;
    Ok(BillingStats { subscribers, recent_transactions })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(price: f64, currency: &str) -> Plan {
        Plan {
            id: Uuid::nil(),
            name: "Pro".into(),
            description: String::new(),
            price,
            currency: currency.into(),
            interval: "month".into(),
            features: serde_json::json!([]),
            is_popular: false,
            stripe_product_id: Some("prod_1".into()),
            stripe_price_id: "price_1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stripe_statuses_collapse() {
        assert_eq!(map_subscription_status("active"), STATUS_ACTIVE);
        assert_eq!(map_subscription_status("trialing"), STATUS_ACTIVE);
        assert_eq!(map_subscription_status("past_due"), STATUS_PAST_DUE);
        assert_eq!(map_subscription_status("unpaid"), STATUS_CANCELED);
        assert_eq!(map_subscription_status("incomplete_expired"), STATUS_CANCELED);
    }

    #[test]
    fn amounts_convert_both_ways() {
        assert_eq!(unit_amount(9.99), 999);
        assert_eq!(unit_amount(19.5), 1950);
        assert_eq!(cents_to_amount(2499), 24.99);
    }

    #[test]
    fn succeeded_renders_as_successful() {
        assert_eq!(render_status("succeeded"), "Successful");
        assert_eq!(render_status("failed"), "failed");
    }

    #[test]
    fn invoice_payer_falls_back_to_subscription_owner() {
        let (linked, owner) = (Uuid::now_v7(), Uuid::now_v7());

        assert_eq!(resolve_payer(Some(linked), Some(owner), true), Payer::Customer(linked));
        assert_eq!(
            resolve_payer(None, Some(owner), true),
            Payer::Subscriber { user_id: owner, link: true }
        );
        assert_eq!(
            resolve_payer(None, Some(owner), false),
            Payer::Subscriber { user_id: owner, link: false }
        );
        assert_eq!(resolve_payer(None, None, true), Payer::Unknown);
    }

    #[test]
    fn paid_invoice_without_plan_grants_pro() {
        assert_eq!(invoice_tier(true, None), SubscriptionTier::Pro);
        assert_eq!(invoice_tier(true, Some("month")), SubscriptionTier::Pro);
        assert_eq!(invoice_tier(true, Some("year")), SubscriptionTier::Elite);
    }

    #[test]
    fn failed_invoice_drops_to_free() {
        assert_eq!(invoice_tier(false, None), SubscriptionTier::Free);
        assert_eq!(invoice_tier(false, Some("year")), SubscriptionTier::Free);
    }

    #[test]
    fn canceled_subscription_ends_and_downgrades() {
        let now = Utc::now();
        for stripe_status in ["canceled", "unpaid", "incomplete_expired"] {
            let change = subscription_change(stripe_status, "year", now);
            assert_eq!(change.status, STATUS_CANCELED);
            assert_eq!(change.ended_at, Some(now));
            assert_eq!(change.tier, Some(SubscriptionTier::Free));
        }
    }

    #[test]
    fn active_subscription_clears_end_and_sets_tier_from_interval() {
        let now = Utc::now();
        let yearly = subscription_change("trialing", "year", now);
        assert_eq!(yearly.status, STATUS_ACTIVE);
        assert_eq!(yearly.ended_at, None);
        assert_eq!(yearly.tier, Some(SubscriptionTier::Elite));

        assert_eq!(subscription_change("active", "month", now).tier, Some(SubscriptionTier::Pro));
    }

    #[test]
    fn past_due_subscription_keeps_tier() {
        let change = subscription_change("past_due", "month", Utc::now());
        assert_eq!(
            change,
            SubscriptionChange { status: STATUS_PAST_DUE, ended_at: None, tier: None }
        );
    }

    #[test]
    fn interval_falls_back_through_subscription() {
        assert_eq!(resolve_interval(Some("year"), Some("month")), "year");
        assert_eq!(resolve_interval(None, Some("month")), "month");
        assert_eq!(resolve_interval(None, None), "N/A");
    }

    #[test]
    fn repricing_only_on_price_or_currency_change() {
        let current = plan(9.99, "usd");
        let rename = UpdatePlanRequest { name: Some("Gold".into()), ..Default::default() };
        assert!(!rename.reprices(&current));

        let same_price = UpdatePlanRequest { amount: Some(9.99), currency: Some("USD".into()), ..Default::default() };
        assert!(!same_price.reprices(&current));

        let new_price = UpdatePlanRequest { amount: Some(12.0), ..Default::default() };
        assert!(new_price.reprices(&current));

        let new_currency = UpdatePlanRequest { currency: Some("eur".into()), ..Default::default() };
        assert!(new_currency.reprices(&current));
    }

    #[test]
    fn create_request_defaults_and_checks() {
        let req: CreatePlanRequest = serde_json::from_value(serde_json::json!({
            "name": "Pro", "amount": 9.99
        }))
        .unwrap();
        assert_eq!(req.currency, "usd");
        assert_eq!(req.interval, "month");
        assert!(req.check().is_ok());

        let zero: CreatePlanRequest = serde_json::from_value(serde_json::json!({
            "name": "Pro", "amount": 0
        }))
        .unwrap();
        assert!(zero.check().is_err());

        let weekly: CreatePlanRequest = serde_json::from_value(serde_json::json!({
            "name": "Pro", "amount": 5, "interval": "week"
        }))
        .unwrap();
        assert_eq!(weekly.check().unwrap_err().error_code(), ErrorCode::InvalidPlan);
    }
}
