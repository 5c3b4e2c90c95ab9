//! Listing Store operations: creation, lookup, browse, owner flag changes,
//! the sold transition, and the stale-listing sweep.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::MarketError;
use crate::models::{
    BrowseFilter, Listing, ListingPatch, NewListing, MAX_LISTING_IMAGES,
};
use crate::store::MarketStore;

pub fn create(store: &dyn MarketStore, mut new: NewListing) -> Result<Listing, MarketError> {
    if new.price_cents.is_some_and(|p| p < 0) {
        return Err(MarketError::InvalidAmount);
    }
    if new.image_urls.len() > MAX_LISTING_IMAGES {
        return Err(MarketError::TooManyImages);
    }
    new.is_free = new.price_cents.map_or(true, |p| p == 0);
    let listing = store.create_listing(new)?;
    info!("created listing {} ({:?})", listing.id, listing.title);
    Ok(listing)
}

/// Fetches a listing. Drafts and archived listings are visible to their owner
/// only, matching the browse rules.
pub fn get(store: &dyn MarketStore, caller: Uuid, id: Uuid) -> Result<Listing, MarketError> {
    let listing = store.listing(id)?.ok_or(MarketError::NotFound("listing"))?;
    if (listing.is_draft || listing.is_archived) && listing.owner_id != caller {
        return Err(MarketError::NotFound("listing"));
    }
    Ok(listing)
}

pub fn browse(store: &dyn MarketStore, filter: &BrowseFilter) -> Result<Vec<Listing>, MarketError> {
    store.browse(filter)
}

pub fn is_owner(store: &dyn MarketStore, listing_id: Uuid, user_id: Uuid) -> Result<bool, MarketError> {
    let listing = store
        .listing(listing_id)?
        .ok_or(MarketError::NotFound("listing"))?;
    Ok(listing.owner_id == user_id)
}

/// Owner-only flag changes (archive/unarchive, draft/publish).
pub fn update_flags(
    store: &dyn MarketStore,
    caller: Uuid,
    listing_id: Uuid,
    patch: &ListingPatch,
) -> Result<Listing, MarketError> {
    if !is_owner(store, listing_id, caller)? {
        return Err(MarketError::NotAuthorized("listing"));
    }
    store.update_listing_flags(listing_id, patch)
}

/// Owner closes a sale arranged in chat, naming the buyer. Runs the same
/// conditional sold transition as offer acceptance, so a listing can never be
/// sold twice and pending offers on it are rejected.
pub fn mark_sold(
    store: &dyn MarketStore,
    caller: Uuid,
    listing_id: Uuid,
    buyer_id: Uuid,
) -> Result<Listing, MarketError> {
    if !is_owner(store, listing_id, caller)? {
        return Err(MarketError::NotAuthorized("listing"));
    }
    let listing = store.mark_sold(listing_id, buyer_id)?;
    info!("listing {} sold to {}", listing.id, buyer_id);
    Ok(listing)
}

/// Archives listings older than `max_age_days`. Invoked by the background
/// sweep; safe to run on any schedule.
pub fn archive_stale(store: &dyn MarketStore, max_age_days: i64) -> Result<usize, MarketError> {
    let cutoff = Utc::now().naive_utc() - Duration::days(max_age_days);
    store.archive_stale(cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, Sort};
    use crate::store::memory::MemoryStore;

    fn input(owner: Uuid, title: &str, price_cents: Option<i64>) -> NewListing {
        NewListing {
            owner_id: owner,
            title: title.to_string(),
            description: "test".to_string(),
            price_cents,
            condition: Condition::Good,
            category: "books".to_string(),
            pickup_location: "library".to_string(),
            payment_method: "cash".to_string(),
            gone_by: None,
            image_urls: vec![],
            is_draft: false,
            is_free: false,
            is_negotiable: true,
        }
    }

    #[test]
    fn create_derives_is_free() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        let giveaway = create(&store, input(owner, "free couch", None)).unwrap();
        assert!(giveaway.is_free);
        let zero = create(&store, input(owner, "zero couch", Some(0))).unwrap();
        assert!(zero.is_free);
        let priced = create(&store, input(owner, "lamp", Some(1200))).unwrap();
        assert!(!priced.is_free);
    }

    #[test]
    fn create_rejects_negative_price_and_image_overflow() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        let err = create(&store, input(owner, "bad", Some(-5))).unwrap_err();
        assert!(matches!(err, MarketError::InvalidAmount));

        let mut crowded = input(owner, "crowded", Some(100));
        crowded.image_urls = (0..6).map(|i| format!("https://img/{i}.jpg")).collect();
        let err = create(&store, crowded).unwrap_err();
        assert!(matches!(err, MarketError::TooManyImages));
    }

    #[test]
    fn browse_hides_drafts_and_archived() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        let mut draft = input(owner, "draft", Some(100));
        draft.is_draft = true;
        create(&store, draft).unwrap();
        let visible = create(&store, input(owner, "visible", Some(200))).unwrap();
        let archived = create(&store, input(owner, "archived", Some(300))).unwrap();
        update_flags(
            &store,
            owner,
            archived.id,
            &ListingPatch {
                is_archived: Some(true),
                is_draft: None,
            },
        )
        .unwrap();

        let found = browse(&store, &BrowseFilter::default()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, visible.id);
    }

    #[test]
    fn browse_sorts_by_price() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        create(&store, input(owner, "mid", Some(2000))).unwrap();
        create(&store, input(owner, "cheap", Some(500))).unwrap();
        create(&store, input(owner, "dear", Some(9000))).unwrap();

        let filter = BrowseFilter {
            sort: Sort::PriceAsc,
            ..Default::default()
        };
        let found = browse(&store, &filter).unwrap();
        let prices: Vec<_> = found.iter().map(|l| l.price_cents).collect();
        assert_eq!(prices, vec![Some(500), Some(2000), Some(9000)]);
    }

    #[test]
    fn browse_filters_by_price_ceiling() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        create(&store, input(owner, "cheap", Some(500))).unwrap();
        create(&store, input(owner, "dear", Some(9000))).unwrap();

        let filter = BrowseFilter {
            max_price_cents: Some(1000),
            ..Default::default()
        };
        let found = browse(&store, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "cheap");
    }

    #[test]
    fn drafts_visible_to_owner_only() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut draft = input(owner, "draft", Some(100));
        draft.is_draft = true;
        let listing = create(&store, draft).unwrap();

        assert!(get(&store, owner, listing.id).is_ok());
        let err = get(&store, Uuid::new_v4(), listing.id).unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
    }

    #[test]
    fn update_flags_is_owner_only() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let listing = create(&store, input(owner, "lamp", Some(100))).unwrap();

        let err = update_flags(
            &store,
            Uuid::new_v4(),
            listing.id,
            &ListingPatch::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::NotAuthorized(_)));
    }

    #[test]
    fn mark_sold_is_owner_only_and_single_shot() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let listing = create(&store, input(owner, "lamp", Some(100))).unwrap();

        let err = mark_sold(&store, buyer, listing.id, buyer).unwrap_err();
        assert!(matches!(err, MarketError::NotAuthorized(_)));

        let sold = mark_sold(&store, owner, listing.id, buyer).unwrap();
        assert!(sold.is_sold);
        assert_eq!(sold.buyer_id, Some(buyer));

        let err = mark_sold(&store, owner, listing.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, MarketError::ListingAlreadySold));
    }
}
