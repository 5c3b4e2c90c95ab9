//! Cross-module negotiation scenarios, including the races the store
//! contract has to resolve. The in-memory backend gives each store method
//! the same atomicity the Postgres backend gets from transactions, which is
//! what these thread-based tests rely on.

use std::sync::{Arc, Barrier};
use std::thread;

use uuid::Uuid;

use campus_marketplace_backend::conversations;
use campus_marketplace_backend::error::MarketError;
use campus_marketplace_backend::listings;
use campus_marketplace_backend::models::{Condition, NewListing, OfferStatus};
use campus_marketplace_backend::notify::NoopNotifier;
use campus_marketplace_backend::offers;
use campus_marketplace_backend::store::memory::MemoryStore;
use campus_marketplace_backend::store::MarketStore;

fn post_listing(store: &MemoryStore, owner: Uuid, price_cents: i64) -> Uuid {
    listings::create(
        store,
        NewListing {
            owner_id: owner,
            title: "dorm futon".to_string(),
            description: "folds flat".to_string(),
            price_cents: Some(price_cents),
            condition: Condition::Good,
            category: "furniture".to_string(),
            pickup_location: "main quad".to_string(),
            payment_method: "cash".to_string(),
            gone_by: None,
            image_urls: vec![],
            is_draft: false,
            is_free: false,
            is_negotiable: true,
        },
    )
    .unwrap()
    .id
}

// Concurrent first contact from one buyer must converge on a single
// conversation.
#[test]
fn concurrent_get_or_create_yields_one_conversation() {
    let store = Arc::new(MemoryStore::new());
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let listing = post_listing(&store, seller, 3000);

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                conversations::open(store.as_ref(), buyer, listing).unwrap().id
            })
        })
        .collect();

    let ids: Vec<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(
        conversations::list_for_user(store.as_ref(), buyer)
            .unwrap()
            .len(),
        1
    );
}

// Two pending offers, two racing accepts: exactly one sale.
#[test]
fn racing_accepts_sell_to_exactly_one_buyer() {
    let store = Arc::new(MemoryStore::new());
    let seller = Uuid::new_v4();
    let listing = post_listing(&store, seller, 3000);

    let mut contenders = Vec::new();
    for _ in 0..2 {
        let buyer = Uuid::new_v4();
        let convo = conversations::open(store.as_ref(), buyer, listing).unwrap();
        let offer =
            offers::make_offer(store.as_ref(), &NoopNotifier, buyer, convo.id, 2500).unwrap();
        contenders.push((buyer, offer.id));
    }

    let barrier = Arc::new(Barrier::new(contenders.len()));
    let handles: Vec<_> = contenders
        .iter()
        .map(|&(_, offer_id)| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                offers::accept_offer(store.as_ref(), &NoopNotifier, seller, offer_id)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(wins.len(), 1);
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, MarketError::ListingAlreadySold));
        }
    }

    let sold = store.listing(listing).unwrap().unwrap();
    assert!(sold.is_sold);
    let winner = contenders
        .iter()
        .find(|(buyer, _)| sold.buyer_id == Some(*buyer));
    assert!(winner.is_some());

    // exactly one accepted offer on the listing, everything else rejected
    let all = offers::list_offers(store.as_ref(), seller, listing).unwrap();
    let accepted: Vec<_> = all
        .iter()
        .filter(|o| o.status == OfferStatus::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(Some(accepted[0].buyer_id), sold.buyer_id);
    assert!(all
        .iter()
        .filter(|o| o.status != OfferStatus::Accepted)
        .all(|o| o.status == OfferStatus::Rejected));
}

// A full negotiation: bid, counter, acceptance of the counter, competing
// bid rejected, listing closed to further offers.
#[test]
fn end_to_end_negotiation_closes_the_listing() {
    let store = MemoryStore::new();
    let seller = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let listing = post_listing(&store, seller, 3000);

    let convo = conversations::open(&store, buyer, listing).unwrap();
    let bid = offers::make_offer(&store, &NoopNotifier, buyer, convo.id, 2000).unwrap();
    let counter = offers::make_offer(&store, &NoopNotifier, seller, convo.id, 2500).unwrap();

    let outcome = offers::accept_offer(&store, &NoopNotifier, buyer, counter.id).unwrap();
    assert!(outcome.listing.is_sold);
    assert_eq!(outcome.listing.buyer_id, Some(buyer));
    assert_eq!(outcome.offer.amount_cents, 2500);
    assert_eq!(outcome.rejected_offer_ids, vec![bid.id]);

    // a latecomer can ask questions but cannot bid
    let late_buyer = Uuid::new_v4();
    let late_convo = conversations::open(&store, late_buyer, listing).unwrap();
    let err =
        offers::make_offer(&store, &NoopNotifier, late_buyer, late_convo.id, 9000).unwrap_err();
    assert!(matches!(err, MarketError::ListingAlreadySold));

    // sold listings drop out of default browse but stay fetchable
    let visible = listings::browse(&store, &Default::default()).unwrap();
    assert!(visible.is_empty());
    assert!(listings::get(&store, late_buyer, listing).is_ok());
}

// A burst of offers from many buyers followed by one acceptance leaves no
// pending rows behind.
#[test]
fn acceptance_sweeps_every_competing_conversation() {
    let store = Arc::new(MemoryStore::new());
    let seller = Uuid::new_v4();
    let listing = post_listing(&store, seller, 10_000);

    let mut offer_ids = Vec::new();
    for i in 0..5 {
        let buyer = Uuid::new_v4();
        let convo = conversations::open(store.as_ref(), buyer, listing).unwrap();
        let offer = offers::make_offer(
            store.as_ref(),
            &NoopNotifier,
            buyer,
            convo.id,
            5000 + i * 100,
        )
        .unwrap();
        offer_ids.push(offer.id);
    }

    let chosen = offer_ids[2];
    offers::accept_offer(store.as_ref(), &NoopNotifier, seller, chosen).unwrap();

    let all = offers::list_offers(store.as_ref(), seller, listing).unwrap();
    assert_eq!(all.len(), 5);
    for offer in &all {
        let expected = if offer.id == chosen {
            OfferStatus::Accepted
        } else {
            OfferStatus::Rejected
        };
        assert_eq!(offer.status, expected);
    }
}
