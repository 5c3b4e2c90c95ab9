//! Conversation Registry: one conversation per (listing, buyer), with
//! participant-checked access.

use tracing::info;
use uuid::Uuid;

use crate::error::MarketError;
use crate::models::Conversation;
use crate::store::MarketStore;

/// Returns the caller's conversation on a listing, creating it on first
/// contact. The seller of record is the listing owner at creation time.
pub fn open(
    store: &dyn MarketStore,
    caller: Uuid,
    listing_id: Uuid,
) -> Result<Conversation, MarketError> {
    let listing = store
        .listing(listing_id)?
        .ok_or(MarketError::NotFound("listing"))?;
    if listing.owner_id == caller {
        return Err(MarketError::SelfConversation);
    }
    // drafts and archived listings are not browsable, so they take no new
    // conversations either
    if listing.is_draft || listing.is_archived {
        return Err(MarketError::NotFound("listing"));
    }
    let conversation = store.get_or_create_conversation(listing_id, caller, listing.owner_id)?;
    info!(
        "conversation {} open between buyer {} and seller {}",
        conversation.id, conversation.buyer_id, conversation.seller_id
    );
    Ok(conversation)
}

pub fn get(
    store: &dyn MarketStore,
    caller: Uuid,
    conversation_id: Uuid,
) -> Result<Conversation, MarketError> {
    let conversation = store
        .conversation(conversation_id)?
        .ok_or(MarketError::NotFound("conversation"))?;
    if !conversation.is_participant(caller) {
        return Err(MarketError::NotAuthorized("conversation"));
    }
    Ok(conversation)
}

/// The caller's inbox, most recently active first.
pub fn list_for_user(store: &dyn MarketStore, caller: Uuid) -> Result<Vec<Conversation>, MarketError> {
    store.conversations_for_user(caller)
}
