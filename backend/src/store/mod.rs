//! Storage contract for the negotiation core.
//!
//! Two backends implement [`MarketStore`]: [`pg::PgStore`] (diesel/Postgres,
//! production) and [`memory::MemoryStore`] (tests and embedded use). The
//! engines in `listings`/`conversations`/`offers`/`messages` contain all
//! business rules; the store owns the operations whose correctness requires
//! storage-level atomicity.

pub mod memory;
pub mod pg;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::error::MarketError;
use crate::models::{
    AcceptOutcome, BrowseFilter, Conversation, Listing, ListingPatch, Message, NewListing,
    NewMessage, NewOffer, Offer,
};

pub trait MarketStore: Send + Sync {
    fn create_listing(&self, new: NewListing) -> Result<Listing, MarketError>;
    fn listing(&self, id: Uuid) -> Result<Option<Listing>, MarketError>;
    fn browse(&self, filter: &BrowseFilter) -> Result<Vec<Listing>, MarketError>;
    fn update_listing_flags(&self, id: Uuid, patch: &ListingPatch) -> Result<Listing, MarketError>;

    /// Marks the listing sold to `buyer_id` and rejects every pending offer
    /// on it, as one transaction. The sold transition is conditional on the
    /// listing not being sold yet; a lost race fails with
    /// [`MarketError::ListingAlreadySold`] and changes nothing.
    fn mark_sold(&self, listing_id: Uuid, buyer_id: Uuid) -> Result<Listing, MarketError>;

    /// Archives unarchived listings created before `cutoff`; returns how many
    /// rows changed. Idempotent.
    fn archive_stale(&self, cutoff: NaiveDateTime) -> Result<usize, MarketError>;

    /// Returns the conversation for `(listing_id, buyer_id)`, creating it if
    /// absent. Uniqueness is enforced by the store itself, never by a
    /// check-then-insert in the caller: two concurrent calls yield one row.
    fn get_or_create_conversation(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Conversation, MarketError>;
    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, MarketError>;
    /// Conversations where the user is buyer or seller, most recently active
    /// first.
    fn conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>, MarketError>;
    fn touch_conversation(&self, id: Uuid) -> Result<(), MarketError>;

    fn insert_offer(&self, new: NewOffer) -> Result<Offer, MarketError>;
    fn offer(&self, id: Uuid) -> Result<Option<Offer>, MarketError>;
    /// All offers across all conversations of a listing, most recent first.
    fn offers_for_listing(&self, listing_id: Uuid) -> Result<Vec<Offer>, MarketError>;
    /// Pending -> Rejected, conditional on the offer still being pending.
    fn reject_offer(&self, id: Uuid) -> Result<Offer, MarketError>;

    /// The accept transaction: re-checks the offer is pending and the listing
    /// unsold, marks the listing sold to the offer's buyer, sets the offer
    /// accepted, and rejects every other pending offer on the listing — all
    /// or nothing. Concurrent accepts on one listing serialize here; the
    /// loser sees [`MarketError::ListingAlreadySold`].
    ///
    /// Error precedence: re-accepting an already accepted offer is
    /// [`MarketError::AlreadyDecided`]; any other offer on a sold listing is
    /// [`MarketError::ListingAlreadySold`] even if it was rejected along the
    /// way; a rejected offer on an unsold listing is
    /// [`MarketError::AlreadyDecided`].
    fn accept_offer(&self, id: Uuid) -> Result<AcceptOutcome, MarketError>;

    fn insert_message(&self, new: NewMessage) -> Result<Message, MarketError>;
    /// Messages of a conversation in ascending creation order.
    fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, MarketError>;
    /// Flags every message not sent by `reader_id` as read; returns how many
    /// flipped. Idempotent.
    fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<usize, MarketError>;
    /// Unread messages addressed to the user across all their conversations.
    fn unread_count(&self, user_id: Uuid) -> Result<i64, MarketError>;
}
