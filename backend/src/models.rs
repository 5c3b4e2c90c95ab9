use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{conversations, messages};

/// Upper bound on ordered image URLs attached to a listing.
pub const MAX_LISTING_IMAGES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::LikeNew => "like_new",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Condition::New),
            "like_new" => Some(Condition::LikeNew),
            "good" => Some(Condition::Good),
            "fair" => Some(Condition::Fair),
            "poor" => Some(Condition::Poor),
            _ => None,
        }
    }
}

/// Which party proposed an offer amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferOrigin {
    Buyer,
    Seller,
}

impl OfferOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferOrigin::Buyer => "buyer",
            OfferOrigin::Seller => "seller",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(OfferOrigin::Buyer),
            "seller" => Some(OfferOrigin::Seller),
            _ => None,
        }
    }
}

/// Offer lifecycle. An offer is immutable once it leaves `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OfferStatus::Pending),
            "accepted" => Some(OfferStatus::Accepted),
            "rejected" => Some(OfferStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    /// Asking price in cents; `None` for giveaways.
    pub price_cents: Option<i64>,
    pub condition: Condition,
    pub category: String,
    pub pickup_location: String,
    pub payment_method: String,
    pub gone_by: Option<NaiveDateTime>,
    pub image_urls: Vec<String>,
    pub is_sold: bool,
    pub is_archived: bool,
    pub is_draft: bool,
    pub is_free: bool,
    pub is_negotiable: bool,
    /// Set exactly once, when the listing is sold.
    pub buyer_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: Option<i64>,
    pub condition: Condition,
    pub category: String,
    pub pickup_location: String,
    pub payment_method: String,
    pub gone_by: Option<NaiveDateTime>,
    pub image_urls: Vec<String>,
    pub is_draft: bool,
    pub is_free: bool,
    pub is_negotiable: bool,
}

/// Owner-mutable listing flags.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingPatch {
    pub is_archived: Option<bool>,
    pub is_draft: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

/// Browse filter; drafts and archived listings are never returned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowseFilter {
    pub category: Option<String>,
    pub condition: Option<Condition>,
    pub max_price_cents: Option<i64>,
    #[serde(default)]
    pub free_only: bool,
    #[serde(default)]
    pub include_sold: bool,
    #[serde(default)]
    pub sort: Sort,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    /// Listing owner captured when the conversation was opened.
    pub seller_id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Conversation {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.buyer_id || user_id == self.seller_id
    }

    /// The participant on the other side of `user_id`.
    pub fn other_participant(&self, user_id: Uuid) -> Uuid {
        if user_id == self.buyer_id {
            self.seller_id
        } else {
            self.buyer_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount_cents: i64,
    pub origin: OfferOrigin,
    pub status: OfferStatus,
    pub created_at: NaiveDateTime,
}

impl Offer {
    /// The party who proposed this amount.
    pub fn proposer(&self) -> Uuid {
        match self.origin {
            OfferOrigin::Buyer => self.buyer_id,
            OfferOrigin::Seller => self.seller_id,
        }
    }

    /// The party entitled to accept or reject this offer.
    pub fn counterparty(&self) -> Uuid {
        match self.origin {
            OfferOrigin::Buyer => self.seller_id,
            OfferOrigin::Seller => self.buyer_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewOffer {
    pub conversation_id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount_cents: i64,
    pub origin: OfferOrigin,
}

/// Result of the atomic accept transaction.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub offer: Offer,
    pub listing: Listing,
    /// Competing pending offers rejected as part of the acceptance.
    pub rejected_offer_ids: Vec<Uuid>,
}
