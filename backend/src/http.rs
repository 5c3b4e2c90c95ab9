//! axum router and request handlers. Handlers stay thin: decode, call the
//! engine with the authenticated caller, encode.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{self, AuthUser};
use crate::config::AppConfig;
use crate::error::MarketError;
use crate::models::{
    AcceptOutcome, BrowseFilter, Condition, Conversation, Listing, ListingPatch, Message,
    NewListing, Offer,
};
use crate::notify::Notifier;
use crate::store::MarketStore;
use crate::{conversations, listings, messages, offers};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn MarketStore>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Deserialize)]
struct LoginRequest {
    user_id: Uuid,
}

#[derive(Deserialize)]
struct CreateListingRequest {
    title: String,
    description: String,
    price_cents: Option<i64>,
    condition: Condition,
    category: String,
    pickup_location: String,
    payment_method: String,
    gone_by: Option<NaiveDateTime>,
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    is_draft: bool,
    #[serde(default = "default_true")]
    is_negotiable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct MarkSoldRequest {
    buyer_id: Uuid,
}

#[derive(Deserialize)]
struct CreateOfferRequest {
    amount_cents: i64,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    body: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let token = auth::create_token(req.user_id, &state.config.jwt_secret)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to create token: {}", e)))?;
    Ok(Json(json!({ "token": token })))
}

async fn create_listing(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateListingRequest>,
) -> Result<Json<Listing>, MarketError> {
    let listing = listings::create(
        state.store.as_ref(),
        NewListing {
            owner_id: user.0,
            title: req.title,
            description: req.description,
            price_cents: req.price_cents,
            condition: req.condition,
            category: req.category,
            pickup_location: req.pickup_location,
            payment_method: req.payment_method,
            gone_by: req.gone_by,
            image_urls: req.image_urls,
            is_draft: req.is_draft,
            is_free: false, // derived by the engine
            is_negotiable: req.is_negotiable,
        },
    )?;
    Ok(Json(listing))
}

async fn browse_listings(
    State(state): State<AppState>,
    Query(filter): Query<BrowseFilter>,
) -> Result<Json<Vec<Listing>>, MarketError> {
    Ok(Json(listings::browse(state.store.as_ref(), &filter)?))
}

async fn get_listing(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Listing>, MarketError> {
    Ok(Json(listings::get(state.store.as_ref(), user.0, id)?))
}

async fn update_listing(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<ListingPatch>,
) -> Result<Json<Listing>, MarketError> {
    Ok(Json(listings::update_flags(
        state.store.as_ref(),
        user.0,
        id,
        &patch,
    )?))
}

async fn mark_sold(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkSoldRequest>,
) -> Result<Json<Listing>, MarketError> {
    Ok(Json(listings::mark_sold(
        state.store.as_ref(),
        user.0,
        id,
        req.buyer_id,
    )?))
}

async fn list_offers(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Offer>>, MarketError> {
    Ok(Json(offers::list_offers(state.store.as_ref(), user.0, id)?))
}

async fn open_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, MarketError> {
    Ok(Json(conversations::open(state.store.as_ref(), user.0, id)?))
}

async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Conversation>>, MarketError> {
    Ok(Json(conversations::list_for_user(
        state.store.as_ref(),
        user.0,
    )?))
}

async fn get_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, MarketError> {
    Ok(Json(conversations::get(state.store.as_ref(), user.0, id)?))
}

async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, MarketError> {
    Ok(Json(messages::list(state.store.as_ref(), user.0, id)?))
}

async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, MarketError> {
    Ok(Json(messages::send(
        state.store.as_ref(),
        state.notifier.as_ref(),
        user.0,
        id,
        &req.body,
    )?))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, MarketError> {
    let flipped = messages::mark_read(state.store.as_ref(), user.0, id)?;
    Ok(Json(json!({ "status": "read", "updated": flipped })))
}

async fn make_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateOfferRequest>,
) -> Result<Json<Offer>, MarketError> {
    Ok(Json(offers::make_offer(
        state.store.as_ref(),
        state.notifier.as_ref(),
        user.0,
        id,
        req.amount_cents,
    )?))
}

async fn accept_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AcceptOutcome>, MarketError> {
    Ok(Json(offers::accept_offer(
        state.store.as_ref(),
        state.notifier.as_ref(),
        user.0,
        id,
    )?))
}

async fn reject_offer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Offer>, MarketError> {
    Ok(Json(offers::reject_offer(state.store.as_ref(), user.0, id)?))
}

async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<serde_json::Value>, MarketError> {
    let unread = messages::unread_count(state.store.as_ref(), user.0)?;
    Ok(Json(json!({ "unread": unread })))
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/listings", post(create_listing).get(browse_listings))
        .route("/listings/:id", get(get_listing).patch(update_listing))
        .route("/listings/:id/sold", post(mark_sold))
        .route("/listings/:id/offers", get(list_offers))
        .route("/listings/:id/conversations", post(open_conversation))
        .route("/conversations", get(list_conversations))
        .route("/conversations/:id", get(get_conversation))
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/:id/read", post(mark_read))
        .route("/conversations/:id/offers", post(make_offer))
        .route("/offers/:id/accept", post(accept_offer))
        .route("/offers/:id/reject", post(reject_offer))
        .route("/me/unread", get(unread_count))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    Router::new()
        .route("/", get(|| async { "Campus Marketplace API" }))
        .route("/login", post(login))
        .merge(protected)
        .with_state(state)
}
