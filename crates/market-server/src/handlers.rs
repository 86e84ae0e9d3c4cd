//! HTTP Handlers

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use market_catalog::{
    ContractRef, CustomerView, LeadView, NavContext, NavItem, NewProspect, NewTier,
    TierUpdate, TierWithFeatures,
};
use market_core::{
    CheckoutId, Contract, ContractId, Feature, FeatureId, MarketError, Page, PageId, Prospect,
    ProspectId, RequestContext, Tier, TierId, User, UserId,
};
use market_payments::{
    CheckoutFlow, CheckoutOutcome, CheckoutView, EventOutcome, InitiateCheckout, PendingCheckout,
};

use crate::state::AppState;

/// Header set by the upstream auth proxy
pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn payments_disabled() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "payments_disabled",
            "Payments not configured",
        )
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        let status = match &err {
            MarketError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MarketError::NotFound { .. } => StatusCode::NOT_FOUND,
            MarketError::Authorization(_) => StatusCode::FORBIDDEN,
            MarketError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
        };
        if status == StatusCode::BAD_GATEWAY {
            tracing::error!(error = %err, "Upstream failure");
        } else {
            tracing::debug!(error = %err, kind = err.kind(), "Request rejected");
        }
        Self::new(status, err.kind(), err.user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code.into(),
            }),
        )
            .into_response()
    }
}

// Extractor rejections (bad JSON, missing fields, malformed ids) use the
// same error body as domain validation failures
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        MarketError::validation(rejection.body_text()).into()
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        MarketError::validation(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        MarketError::validation(rejection.body_text()).into()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Extractors
// ============================================================================

/// Request context built from the auth proxy headers. A missing user header
/// means an anonymous visitor; a malformed one is rejected.
pub struct Actor(pub RequestContext);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let mut ctx = match header(USER_ID_HEADER) {
            Some(raw) => RequestContext::for_user(UserId::parse(raw)?),
            None => RequestContext::anonymous(),
        };
        if let Some(id) = header(REQUEST_ID_HEADER).and_then(|v| Uuid::parse_str(v).ok()) {
            ctx.request_id = id;
        }
        Ok(Self(ctx))
    }
}

/// `Json` body extractor answering with [`ApiError`]
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Path` extractor answering with [`ApiError`]
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// `Query` extractor answering with [`ApiError`]
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

fn checkout_flow(state: &AppState) -> ApiResult<&CheckoutFlow> {
    state.checkout.as_ref().ok_or_else(ApiError::payments_disabled)
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub payment_account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeatureRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ContractRequest {
    pub name: String,
    pub attachment_url: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkContractRequest {
    /// `null` clears the link and falls back to the default contract
    #[serde(default)]
    pub contract_id: Option<ContractId>,
}

#[derive(Debug, Deserialize)]
pub struct ShortlistRequest {
    pub shortlisted: bool,
}

#[derive(Debug, Deserialize)]
pub struct PageRequest {
    pub title: String,
    pub slug: String,
    #[serde(default = "default_draft")]
    pub draft: bool,
}

const fn default_draft() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub draft: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct NavigationQuery {
    #[serde(default)]
    pub context: NavContext,
}

// ============================================================================
// Health & Profile
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.payments_enabled(),
    })
}

/// Sync the acting user's profile from the auth provider
pub async fn upsert_profile(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(payload): ApiJson<ProfileRequest>,
) -> ApiResult<Json<User>> {
    let id = ctx.require_actor()?;
    if payload.name.trim().is_empty() || !payload.email.contains('@') {
        return Err(MarketError::validation("a name and a valid email are required").into());
    }

    let mut user = User::new(payload.name.trim(), payload.email.trim());
    user.id = id;
    user.company = payload.company;
    user.payment_account_id = payload.payment_account_id;
    state.store.insert_user(&user).await?;

    tracing::info!(request_id = %ctx.request_id, user = %id, "Profile synced");
    Ok(Json(user))
}

// ============================================================================
// Tiers & Features
// ============================================================================

pub async fn create_tier(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(payload): ApiJson<NewTier>,
) -> ApiResult<(StatusCode, Json<Tier>)> {
    let tier = state.tiers.create_tier(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

pub async fn update_tier(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(tier_id): ApiPath<TierId>,
    ApiJson(payload): ApiJson<TierUpdate>,
) -> ApiResult<Json<Tier>> {
    Ok(Json(state.tiers.update_tier(&ctx, tier_id, payload).await?))
}

/// Every tier of a maintainer, drafts included; owner only
pub async fn list_user_tiers(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiResult<Json<Vec<TierWithFeatures>>> {
    ctx.require_owner(user_id, "tier list")?;
    Ok(Json(state.tiers.list_tiers_for_user(user_id).await?))
}

/// Published tiers for the public site and embeds
pub async fn list_site_tiers(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> ApiResult<Json<Vec<TierWithFeatures>>> {
    Ok(Json(state.tiers.list_published_tiers_for_user(user_id).await?))
}

pub async fn create_feature(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(payload): ApiJson<FeatureRequest>,
) -> ApiResult<(StatusCode, Json<Feature>)> {
    let feature = state.tiers.create_feature(&ctx, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(feature)))
}

pub async fn attach_feature(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath((tier_id, feature_id)): ApiPath<(TierId, FeatureId)>,
) -> ApiResult<StatusCode> {
    state.tiers.attach_feature(&ctx, tier_id, feature_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn detach_feature(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath((tier_id, feature_id)): ApiPath<(TierId, FeatureId)>,
) -> ApiResult<StatusCode> {
    state.tiers.detach_feature(&ctx, tier_id, feature_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Contracts
// ============================================================================

pub async fn create_contract(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(payload): ApiJson<ContractRequest>,
) -> ApiResult<(StatusCode, Json<Contract>)> {
    let contract = state
        .contracts
        .create_contract(&ctx, &payload.name, &payload.attachment_url)
        .await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn link_contract(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(tier_id): ApiPath<TierId>,
    ApiJson(payload): ApiJson<LinkContractRequest>,
) -> ApiResult<Json<Tier>> {
    let tier = state
        .contracts
        .link_contract(&ctx, tier_id, payload.contract_id)
        .await?;
    Ok(Json(tier))
}

/// Contract a visitor must accept to buy the tier
pub async fn tier_contract(
    State(state): State<AppState>,
    ApiPath(tier_id): ApiPath<TierId>,
) -> ApiResult<Json<ContractRef>> {
    Ok(Json(state.contracts.resolve_for_tier_id(tier_id).await?))
}

// ============================================================================
// Checkout
// ============================================================================

/// Checkout page data: tier, contract and the visitor's starting state
pub async fn checkout_view(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(tier_id): ApiPath<TierId>,
) -> ApiResult<Json<CheckoutView>> {
    let flow = checkout_flow(&state)?;
    Ok(Json(flow.prepare(&ctx, tier_id).await?))
}

/// Submit payment; the result arrives later through the webhook
pub async fn initiate_checkout(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(payload): ApiJson<InitiateCheckout>,
) -> ApiResult<(StatusCode, Json<PendingCheckout>)> {
    let flow = checkout_flow(&state)?;
    let pending = flow.initiate(&ctx, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(pending)))
}

pub async fn checkout_status(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(checkout_id): ApiPath<CheckoutId>,
) -> ApiResult<Json<CheckoutOutcome>> {
    let flow = checkout_flow(&state)?;
    Ok(Json(flow.checkout_outcome(&ctx, checkout_id).await?))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<EventOutcome>> {
    let handler = state.webhooks.as_ref().ok_or_else(ApiError::payments_disabled)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "missing_signature",
                "Missing Stripe signature",
            )
        })?;

    let outcome = handler.handle(&body, signature).await.map_err(|e| {
        tracing::warn!(error = %e, "Webhook rejected");
        ApiError::from(e)
    })?;
    Ok(Json(outcome))
}

// ============================================================================
// Dashboard
// ============================================================================

pub async fn dashboard_customers(
    State(state): State<AppState>,
    Actor(ctx): Actor,
) -> ApiResult<Json<Vec<CustomerView>>> {
    let maintainer = ctx.require_actor()?;
    let customers = state
        .customers
        .get_customers_with_charges_and_subscriptions(maintainer)
        .await?;
    Ok(Json(customers))
}

pub async fn dashboard_leads(
    State(state): State<AppState>,
    Actor(ctx): Actor,
) -> ApiResult<Json<Vec<LeadView>>> {
    let maintainer = ctx.require_actor()?;
    Ok(Json(state.customers.get_shortlisted_leads(maintainer).await?))
}

pub async fn add_prospect(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(payload): ApiJson<NewProspect>,
) -> ApiResult<(StatusCode, Json<Prospect>)> {
    let prospect = state.customers.add_prospect(&ctx, payload).await?;
    Ok((StatusCode::CREATED, Json(prospect)))
}

pub async fn shortlist_prospect(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(prospect_id): ApiPath<ProspectId>,
    ApiJson(payload): ApiJson<ShortlistRequest>,
) -> ApiResult<Json<Prospect>> {
    let prospect = state
        .customers
        .set_shortlisted(&ctx, prospect_id, payload.shortlisted)
        .await?;
    Ok(Json(prospect))
}

// ============================================================================
// Pages & Navigation
// ============================================================================

pub async fn create_page(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiJson(payload): ApiJson<PageRequest>,
) -> ApiResult<(StatusCode, Json<Page>)> {
    let page = state
        .navigation
        .create_page(&ctx, &payload.title, &payload.slug, payload.draft)
        .await?;
    Ok((StatusCode::CREATED, Json(page)))
}

pub async fn set_page_draft(
    State(state): State<AppState>,
    Actor(ctx): Actor,
    ApiPath(page_id): ApiPath<PageId>,
    ApiJson(payload): ApiJson<DraftRequest>,
) -> ApiResult<Json<Page>> {
    Ok(Json(
        state
            .navigation
            .set_page_draft(&ctx, page_id, payload.draft)
            .await?,
    ))
}

pub async fn site_navigation(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
    ApiQuery(query): ApiQuery<NavigationQuery>,
) -> ApiResult<Json<Vec<NavItem>>> {
    Ok(Json(
        state
            .navigation
            .site_navigation(user_id, query.context)
            .await?,
    ))
}
