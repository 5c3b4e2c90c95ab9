//! Message Log: append-only per-conversation messages with read tracking.

use tracing::info;
use uuid::Uuid;

use crate::conversations;
use crate::error::MarketError;
use crate::models::{Message, NewMessage};
use crate::notify::{NotificationEvent, Notifier};
use crate::store::MarketStore;

pub fn send(
    store: &dyn MarketStore,
    notifier: &dyn Notifier,
    caller: Uuid,
    conversation_id: Uuid,
    body: &str,
) -> Result<Message, MarketError> {
    let conversation = conversations::get(store, caller, conversation_id)?;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(MarketError::EmptyMessage);
    }
    let message = store.insert_message(NewMessage {
        conversation_id,
        sender_id: caller,
        body: trimmed.to_string(),
    })?;
    store.touch_conversation(conversation_id)?;
    info!("message {} sent in conversation {}", message.id, conversation_id);

    let listing = store
        .listing(conversation.listing_id)?
        .ok_or(MarketError::NotFound("listing"))?;
    notifier.notify(NotificationEvent::NewMessage {
        recipient: conversation.other_participant(caller),
        listing_title: listing.title,
        body: message.body.clone(),
    });
    Ok(message)
}

/// Messages in ascending creation order. Not a live stream; callers refetch.
pub fn list(
    store: &dyn MarketStore,
    caller: Uuid,
    conversation_id: Uuid,
) -> Result<Vec<Message>, MarketError> {
    conversations::get(store, caller, conversation_id)?;
    store.messages(conversation_id)
}

/// Marks everything the other side sent as read; returns how many messages
/// flipped. Safe to repeat.
pub fn mark_read(
    store: &dyn MarketStore,
    caller: Uuid,
    conversation_id: Uuid,
) -> Result<usize, MarketError> {
    conversations::get(store, caller, conversation_id)?;
    store.mark_read(conversation_id, caller)
}

/// Unread messages addressed to the caller across all conversations.
pub fn unread_count(store: &dyn MarketStore, caller: Uuid) -> Result<i64, MarketError> {
    store.unread_count(caller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, NewListing};
    use crate::notify::NoopNotifier;
    use crate::store::memory::MemoryStore;

    struct Thread {
        store: MemoryStore,
        seller: Uuid,
        buyer: Uuid,
        conversation: Uuid,
    }

    fn thread() -> Thread {
        let store = MemoryStore::new();
        let seller = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let listing = crate::listings::create(
            &store,
            NewListing {
                owner_id: seller,
                title: "textbook".to_string(),
                description: "intro stats".to_string(),
                price_cents: Some(2000),
                condition: Condition::LikeNew,
                category: "books".to_string(),
                pickup_location: "student union".to_string(),
                payment_method: "venmo".to_string(),
                gone_by: None,
                image_urls: vec![],
                is_draft: false,
                is_free: false,
                is_negotiable: true,
            },
        )
        .unwrap();
        let conversation = conversations::open(&store, buyer, listing.id).unwrap();
        Thread {
            store,
            seller,
            buyer,
            conversation: conversation.id,
        }
    }

    #[test]
    fn send_trims_and_rejects_blank_bodies() {
        let t = thread();
        let message = send(&t.store, &NoopNotifier, t.buyer, t.conversation, "  hi there  ").unwrap();
        assert_eq!(message.body, "hi there");
        assert!(!message.is_read);

        for blank in ["", "   ", "\n\t"] {
            let err = send(&t.store, &NoopNotifier, t.buyer, t.conversation, blank).unwrap_err();
            assert!(matches!(err, MarketError::EmptyMessage));
        }
    }

    #[test]
    fn outsiders_cannot_send_or_read() {
        let t = thread();
        let outsider = Uuid::new_v4();

        let err = send(&t.store, &NoopNotifier, outsider, t.conversation, "hello").unwrap_err();
        assert!(matches!(err, MarketError::NotAuthorized(_)));
        let err = list(&t.store, outsider, t.conversation).unwrap_err();
        assert!(matches!(err, MarketError::NotAuthorized(_)));
    }

    #[test]
    fn interleaved_messages_come_back_in_creation_order() {
        let t = thread();
        send(&t.store, &NoopNotifier, t.buyer, t.conversation, "is this available?").unwrap();
        send(&t.store, &NoopNotifier, t.seller, t.conversation, "it is").unwrap();
        send(&t.store, &NoopNotifier, t.buyer, t.conversation, "can you do 15?").unwrap();
        send(&t.store, &NoopNotifier, t.seller, t.conversation, "18 and it's yours").unwrap();

        let thread = list(&t.store, t.buyer, t.conversation).unwrap();
        let bodies: Vec<_> = thread.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(
            bodies,
            vec!["is this available?", "it is", "can you do 15?", "18 and it's yours"]
        );
        for pair in thread.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn mark_read_flips_only_the_other_sides_messages() {
        let t = thread();
        send(&t.store, &NoopNotifier, t.buyer, t.conversation, "one").unwrap();
        send(&t.store, &NoopNotifier, t.buyer, t.conversation, "two").unwrap();
        send(&t.store, &NoopNotifier, t.seller, t.conversation, "three").unwrap();

        assert_eq!(mark_read(&t.store, t.seller, t.conversation).unwrap(), 2);
        let thread_after = list(&t.store, t.seller, t.conversation).unwrap();
        for message in &thread_after {
            if message.sender_id == t.buyer {
                assert!(message.is_read);
            } else {
                // the seller's own message stays unread for the buyer
                assert!(!message.is_read);
            }
        }
    }

    #[test]
    fn mark_read_is_idempotent() {
        let t = thread();
        send(&t.store, &NoopNotifier, t.buyer, t.conversation, "ping").unwrap();

        assert_eq!(mark_read(&t.store, t.seller, t.conversation).unwrap(), 1);
        assert_eq!(unread_count(&t.store, t.seller).unwrap(), 0);
        // repeating is a no-op, not an error
        assert_eq!(mark_read(&t.store, t.seller, t.conversation).unwrap(), 0);
        assert_eq!(unread_count(&t.store, t.seller).unwrap(), 0);
    }

    #[test]
    fn unread_count_spans_conversations_and_ignores_own_messages() {
        let t = thread();
        // second conversation on a second listing, same seller
        let second_listing = crate::listings::create(
            &t.store,
            NewListing {
                owner_id: t.seller,
                title: "desk".to_string(),
                description: "sturdy".to_string(),
                price_cents: Some(5000),
                condition: Condition::Good,
                category: "furniture".to_string(),
                pickup_location: "west lot".to_string(),
                payment_method: "cash".to_string(),
                gone_by: None,
                image_urls: vec![],
                is_draft: false,
                is_free: false,
                is_negotiable: true,
            },
        )
        .unwrap();
        let other_buyer = Uuid::new_v4();
        let second = conversations::open(&t.store, other_buyer, second_listing.id).unwrap();

        send(&t.store, &NoopNotifier, t.buyer, t.conversation, "hey").unwrap();
        send(&t.store, &NoopNotifier, other_buyer, second.id, "still around?").unwrap();
        send(&t.store, &NoopNotifier, t.seller, t.conversation, "hi").unwrap();

        // two incoming across two conversations; the seller's own reply does
        // not count against them
        assert_eq!(unread_count(&t.store, t.seller).unwrap(), 2);
        assert_eq!(unread_count(&t.store, t.buyer).unwrap(), 1);
        assert_eq!(unread_count(&t.store, other_buyer).unwrap(), 0);
    }
}
