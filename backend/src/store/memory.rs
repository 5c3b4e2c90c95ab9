//! In-memory [`MarketStore`] backend.
//!
//! One mutex guards the whole state, so every trait method is atomic — the
//! same guarantee the Postgres backend gets from transactions and conditional
//! updates. Entity vectors keep insertion order, which doubles as creation
//! order.

use std::cmp::Reverse;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::MarketError;
use crate::models::{
    AcceptOutcome, BrowseFilter, Conversation, Listing, ListingPatch, Message, NewListing,
    NewMessage, NewOffer, Offer, OfferStatus, Sort,
};
use crate::store::MarketStore;

#[derive(Default)]
struct State {
    listings: Vec<Listing>,
    conversations: Vec<Conversation>,
    offers: Vec<Offer>,
    messages: Vec<Message>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, State> {
        // a poisoned lock still holds consistent data: every mutation below
        // completes before the guard drops
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl MarketStore for MemoryStore {
    fn create_listing(&self, new: NewListing) -> Result<Listing, MarketError> {
        let ts = now();
        let listing = Listing {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            title: new.title,
            description: new.description,
            price_cents: new.price_cents,
            condition: new.condition,
            category: new.category,
            pickup_location: new.pickup_location,
            payment_method: new.payment_method,
            gone_by: new.gone_by,
            image_urls: new.image_urls,
            is_sold: false,
            is_archived: false,
            is_draft: new.is_draft,
            is_free: new.is_free,
            is_negotiable: new.is_negotiable,
            buyer_id: None,
            created_at: ts,
            updated_at: ts,
        };
        self.locked().listings.push(listing.clone());
        Ok(listing)
    }

    fn listing(&self, id: Uuid) -> Result<Option<Listing>, MarketError> {
        Ok(self.locked().listings.iter().find(|l| l.id == id).cloned())
    }

    fn browse(&self, filter: &BrowseFilter) -> Result<Vec<Listing>, MarketError> {
        let state = self.locked();
        let mut found: Vec<Listing> = state
            .listings
            .iter()
            .filter(|l| !l.is_draft && !l.is_archived)
            .filter(|l| filter.include_sold || !l.is_sold)
            .filter(|l| filter.category.as_deref().map_or(true, |c| l.category == c))
            .filter(|l| filter.condition.map_or(true, |c| l.condition == c))
            .filter(|l| {
                filter
                    .max_price_cents
                    .map_or(true, |max| l.price_cents.is_some_and(|p| p <= max))
            })
            .filter(|l| !filter.free_only || l.is_free)
            .cloned()
            .collect();
        match filter.sort {
            // append order is creation order, so newest first is a reverse
            Sort::Newest => found.reverse(),
            // missing prices sort as largest, matching Postgres NULL ordering
            Sort::PriceAsc => found.sort_by_key(|l| l.price_cents.unwrap_or(i64::MAX)),
            Sort::PriceDesc => {
                found.sort_by_key(|l| Reverse(l.price_cents.unwrap_or(i64::MAX)))
            }
        }
        Ok(found)
    }

    fn update_listing_flags(&self, id: Uuid, patch: &ListingPatch) -> Result<Listing, MarketError> {
        let mut state = self.locked();
        let listing = state
            .listings
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(MarketError::NotFound("listing"))?;
        if let Some(archived) = patch.is_archived {
            listing.is_archived = archived;
        }
        if let Some(draft) = patch.is_draft {
            listing.is_draft = draft;
        }
        listing.updated_at = now();
        Ok(listing.clone())
    }

    fn mark_sold(&self, listing_id: Uuid, buyer_id: Uuid) -> Result<Listing, MarketError> {
        let mut state = self.locked();
        let listing = state
            .listings
            .iter_mut()
            .find(|l| l.id == listing_id)
            .ok_or(MarketError::NotFound("listing"))?;
        if listing.is_sold {
            return Err(MarketError::ListingAlreadySold);
        }
        listing.is_sold = true;
        listing.buyer_id = Some(buyer_id);
        listing.updated_at = now();
        let sold = listing.clone();
        for offer in state.offers.iter_mut() {
            if offer.listing_id == listing_id && offer.status == OfferStatus::Pending {
                offer.status = OfferStatus::Rejected;
            }
        }
        Ok(sold)
    }

    fn archive_stale(&self, cutoff: NaiveDateTime) -> Result<usize, MarketError> {
        let mut state = self.locked();
        let ts = now();
        let mut archived = 0;
        for listing in state.listings.iter_mut() {
            if !listing.is_archived && listing.created_at < cutoff {
                listing.is_archived = true;
                listing.updated_at = ts;
                archived += 1;
            }
        }
        Ok(archived)
    }

    fn get_or_create_conversation(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Conversation, MarketError> {
        let mut state = self.locked();
        if let Some(existing) = state
            .conversations
            .iter()
            .find(|c| c.listing_id == listing_id && c.buyer_id == buyer_id)
        {
            return Ok(existing.clone());
        }
        let ts = now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            listing_id,
            buyer_id,
            seller_id,
            created_at: ts,
            updated_at: ts,
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, MarketError> {
        Ok(self
            .locked()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>, MarketError> {
        let state = self.locked();
        let mut found: Vec<Conversation> = state
            .conversations
            .iter()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        found.sort_by_key(|c| Reverse(c.updated_at));
        Ok(found)
    }

    fn touch_conversation(&self, id: Uuid) -> Result<(), MarketError> {
        let mut state = self.locked();
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(MarketError::NotFound("conversation"))?;
        conversation.updated_at = now();
        Ok(())
    }

    fn insert_offer(&self, new: NewOffer) -> Result<Offer, MarketError> {
        let offer = Offer {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            listing_id: new.listing_id,
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            amount_cents: new.amount_cents,
            origin: new.origin,
            status: OfferStatus::Pending,
            created_at: now(),
        };
        self.locked().offers.push(offer.clone());
        Ok(offer)
    }

    fn offer(&self, id: Uuid) -> Result<Option<Offer>, MarketError> {
        Ok(self.locked().offers.iter().find(|o| o.id == id).cloned())
    }

    fn offers_for_listing(&self, listing_id: Uuid) -> Result<Vec<Offer>, MarketError> {
        let state = self.locked();
        let mut found: Vec<Offer> = state
            .offers
            .iter()
            .filter(|o| o.listing_id == listing_id)
            .cloned()
            .collect();
        found.reverse();
        Ok(found)
    }

    fn reject_offer(&self, id: Uuid) -> Result<Offer, MarketError> {
        let mut state = self.locked();
        let offer = state
            .offers
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(MarketError::NotFound("offer"))?;
        if offer.status != OfferStatus::Pending {
            return Err(MarketError::AlreadyDecided);
        }
        offer.status = OfferStatus::Rejected;
        Ok(offer.clone())
    }

    fn accept_offer(&self, id: Uuid) -> Result<AcceptOutcome, MarketError> {
        let mut state = self.locked();
        let offer = state
            .offers
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or(MarketError::NotFound("offer"))?;
        if offer.status == OfferStatus::Accepted {
            return Err(MarketError::AlreadyDecided);
        }
        let listing = state
            .listings
            .iter_mut()
            .find(|l| l.id == offer.listing_id)
            .ok_or(MarketError::NotFound("listing"))?;
        // checked under the lock: an offer that lost to a different
        // acceptance reports the sold listing, not its own rejection
        if listing.is_sold {
            return Err(MarketError::ListingAlreadySold);
        }
        if offer.status != OfferStatus::Pending {
            return Err(MarketError::AlreadyDecided);
        }
        listing.is_sold = true;
        listing.buyer_id = Some(offer.buyer_id);
        listing.updated_at = now();
        let listing = listing.clone();

        let mut accepted = offer;
        let mut rejected_offer_ids = Vec::new();
        for other in state.offers.iter_mut() {
            if other.id == id {
                other.status = OfferStatus::Accepted;
                accepted = other.clone();
            } else if other.listing_id == listing.id && other.status == OfferStatus::Pending {
                other.status = OfferStatus::Rejected;
                rejected_offer_ids.push(other.id);
            }
        }
        Ok(AcceptOutcome {
            offer: accepted,
            listing,
            rejected_offer_ids,
        })
    }

    fn insert_message(&self, new: NewMessage) -> Result<Message, MarketError> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            body: new.body,
            is_read: false,
            created_at: now(),
        };
        self.locked().messages.push(message.clone());
        Ok(message)
    }

    fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, MarketError> {
        Ok(self
            .locked()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<usize, MarketError> {
        let mut state = self.locked();
        let mut flipped = 0;
        for message in state.messages.iter_mut() {
            if message.conversation_id == conversation_id
                && message.sender_id != reader_id
                && !message.is_read
            {
                message.is_read = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn unread_count(&self, user_id: Uuid) -> Result<i64, MarketError> {
        let state = self.locked();
        let mut count = 0;
        for message in state.messages.iter() {
            if message.is_read || message.sender_id == user_id {
                continue;
            }
            let participant = state
                .conversations
                .iter()
                .find(|c| c.id == message.conversation_id)
                .is_some_and(|c| c.is_participant(user_id));
            if participant {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_input(owner: Uuid) -> NewListing {
        NewListing {
            owner_id: owner,
            title: "desk lamp".to_string(),
            description: "barely used".to_string(),
            price_cents: Some(1500),
            condition: crate::models::Condition::Good,
            category: "furniture".to_string(),
            pickup_location: "north hall".to_string(),
            payment_method: "cash or venmo".to_string(),
            gone_by: None,
            image_urls: vec![],
            is_draft: false,
            is_free: false,
            is_negotiable: true,
        }
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let listing = store.create_listing(listing_input(seller)).unwrap();

        let first = store
            .get_or_create_conversation(listing.id, buyer, seller)
            .unwrap();
        let second = store
            .get_or_create_conversation(listing.id, buyer, seller)
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn mark_sold_is_conditional() {
        let store = MemoryStore::new();
        let seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let listing = store.create_listing(listing_input(seller)).unwrap();

        let sold = store.mark_sold(listing.id, buyer).unwrap();
        assert!(sold.is_sold);
        assert_eq!(sold.buyer_id, Some(buyer));

        let err = store.mark_sold(listing.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, MarketError::ListingAlreadySold));
        // the winning buyer is untouched
        let after = store.listing(listing.id).unwrap().unwrap();
        assert_eq!(after.buyer_id, Some(buyer));
    }

    #[test]
    fn archive_stale_is_idempotent() {
        let store = MemoryStore::new();
        let listing = store.create_listing(listing_input(Uuid::new_v4())).unwrap();
        let cutoff = listing.created_at + chrono::Duration::days(1);

        assert_eq!(store.archive_stale(cutoff).unwrap(), 1);
        assert_eq!(store.archive_stale(cutoff).unwrap(), 0);
        assert!(store.listing(listing.id).unwrap().unwrap().is_archived);
    }
}
