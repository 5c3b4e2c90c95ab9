//! Notification boundary.
//!
//! Delivery (email, push) is an external collaborator; the engines only emit
//! events after the underlying state change has been applied. A notifier must
//! swallow its own failures — a lost email never fails or rolls back the
//! business transaction that produced it.

use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    NewOffer {
        recipient: Uuid,
        listing_title: String,
        amount_cents: i64,
    },
    OfferAccepted {
        recipient: Uuid,
        listing_title: String,
        amount_cents: i64,
    },
    NewMessage {
        recipient: Uuid,
        listing_title: String,
        body: String,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Hands events to the operator log in place of the external email sender.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: NotificationEvent) {
        match &event {
            NotificationEvent::NewOffer {
                recipient,
                listing_title,
                amount_cents,
            } => info!(
                "notify {}: new offer of {} cents on \"{}\"",
                recipient, amount_cents, listing_title
            ),
            NotificationEvent::OfferAccepted {
                recipient,
                listing_title,
                amount_cents,
            } => info!(
                "notify {}: offer of {} cents on \"{}\" was accepted",
                recipient, amount_cents, listing_title
            ),
            NotificationEvent::NewMessage {
                recipient,
                listing_title,
                ..
            } => info!("notify {}: new message about \"{}\"", recipient, listing_title),
        }
    }
}

/// Discards every event; used in tests.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: NotificationEvent) {}
}
