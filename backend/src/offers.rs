//! Offer Negotiation Engine.
//!
//! Offers move `Pending -> {Accepted, Rejected}` and never leave a terminal
//! state. Either side of a conversation may propose; only the counterparty of
//! an offer's origin may decide it. Acceptance delegates to the store's
//! atomic transaction, which marks the listing sold, rejects every competing
//! pending offer on it, and resolves accept races to exactly one winner.

use tracing::info;
use uuid::Uuid;

use crate::error::MarketError;
use crate::models::{AcceptOutcome, NewOffer, Offer, OfferOrigin};
use crate::notify::{NotificationEvent, Notifier};
use crate::store::MarketStore;

/// Proposes an amount in an existing conversation. Earlier pending offers
/// from the same proposer are left untouched; repeated proposals coexist.
pub fn make_offer(
    store: &dyn MarketStore,
    notifier: &dyn Notifier,
    caller: Uuid,
    conversation_id: Uuid,
    amount_cents: i64,
) -> Result<Offer, MarketError> {
    if amount_cents <= 0 {
        return Err(MarketError::InvalidAmount);
    }
    let conversation = store
        .conversation(conversation_id)?
        .ok_or(MarketError::NotFound("conversation"))?;
    let origin = if caller == conversation.buyer_id {
        OfferOrigin::Buyer
    } else if caller == conversation.seller_id {
        OfferOrigin::Seller
    } else {
        return Err(MarketError::NotAuthorized("conversation"));
    };
    let listing = store
        .listing(conversation.listing_id)?
        .ok_or(MarketError::NotFound("listing"))?;
    if listing.is_sold {
        return Err(MarketError::ListingAlreadySold);
    }
    let offer = store.insert_offer(NewOffer {
        conversation_id,
        listing_id: listing.id,
        buyer_id: conversation.buyer_id,
        seller_id: conversation.seller_id,
        amount_cents,
        origin,
    })?;
    store.touch_conversation(conversation_id)?;
    info!(
        "new {} offer {} of {} cents on listing {}",
        origin.as_str(),
        offer.id,
        amount_cents,
        listing.id
    );
    notifier.notify(NotificationEvent::NewOffer {
        recipient: offer.counterparty(),
        listing_title: listing.title,
        amount_cents,
    });
    Ok(offer)
}

/// Accepts a pending offer. Only the counterparty of the offer's origin may
/// accept: a buyer proposal is the seller's to take, and vice versa.
pub fn accept_offer(
    store: &dyn MarketStore,
    notifier: &dyn Notifier,
    caller: Uuid,
    offer_id: Uuid,
) -> Result<AcceptOutcome, MarketError> {
    let offer = store.offer(offer_id)?.ok_or(MarketError::NotFound("offer"))?;
    if caller != offer.counterparty() {
        return Err(MarketError::NotAuthorized("offer"));
    }
    // pending/sold state is checked inside the store transaction, not here:
    // a pre-check would race with competing accepts and misreport the loser
    let outcome = store.accept_offer(offer_id)?;
    store.touch_conversation(offer.conversation_id)?;
    info!(
        "offer {} accepted, listing {} sold to {}, {} competing offers rejected",
        outcome.offer.id,
        outcome.listing.id,
        outcome.offer.buyer_id,
        outcome.rejected_offer_ids.len()
    );
    notifier.notify(NotificationEvent::OfferAccepted {
        recipient: outcome.offer.proposer(),
        listing_title: outcome.listing.title.clone(),
        amount_cents: outcome.offer.amount_cents,
    });
    Ok(outcome)
}

/// Rejects a pending offer; authorization mirrors [`accept_offer`]. No side
/// effects beyond the one row.
pub fn reject_offer(
    store: &dyn MarketStore,
    caller: Uuid,
    offer_id: Uuid,
) -> Result<Offer, MarketError> {
    let offer = store.offer(offer_id)?.ok_or(MarketError::NotFound("offer"))?;
    if caller != offer.counterparty() {
        return Err(MarketError::NotAuthorized("offer"));
    }
    let rejected = store.reject_offer(offer_id)?;
    info!("offer {} rejected", rejected.id);
    Ok(rejected)
}

/// All offers on a listing across every conversation, most recent first.
/// Restricted to the listing owner.
pub fn list_offers(
    store: &dyn MarketStore,
    caller: Uuid,
    listing_id: Uuid,
) -> Result<Vec<Offer>, MarketError> {
    let listing = store
        .listing(listing_id)?
        .ok_or(MarketError::NotFound("listing"))?;
    if listing.owner_id != caller {
        return Err(MarketError::NotAuthorized("listing"));
    }
    store.offers_for_listing(listing_id)
}
