//! Diesel/Postgres [`MarketStore`] backend.
//!
//! Compound operations run inside `Connection::transaction` with the sold
//! transition expressed as a conditional `UPDATE ... WHERE NOT is_sold`, so
//! concurrent accepts on one listing serialize on the row and the loser
//! observes zero updated rows. Conversation uniqueness rides on the
//! `(listing_id, buyer_id)` unique index via `ON CONFLICT DO NOTHING`.

use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db;
use crate::error::MarketError;
use crate::models::{
    AcceptOutcome, BrowseFilter, Condition, Conversation, Listing, ListingPatch, Message,
    NewListing, NewMessage, NewOffer, Offer, OfferOrigin, OfferStatus, Sort,
};
use crate::schema::{conversations, listings, messages, offers};
use crate::store::MarketStore;

pub struct PgStore {
    database_url: String,
}

impl PgStore {
    pub fn new(database_url: String) -> Self {
        Self { database_url }
    }

    fn conn(&self) -> Result<PgConnection, MarketError> {
        Ok(db::establish_connection(&self.database_url)?)
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = listings)]
struct ListingRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: String,
    price_cents: Option<i64>,
    condition: String,
    category: String,
    pickup_location: String,
    payment_method: String,
    gone_by: Option<NaiveDateTime>,
    image_urls: Vec<String>,
    is_sold: bool,
    is_archived: bool,
    is_draft: bool,
    is_free: bool,
    is_negotiable: bool,
    buyer_id: Option<Uuid>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl From<Listing> for ListingRow {
    fn from(listing: Listing) -> Self {
        Self {
            id: listing.id,
            owner_id: listing.owner_id,
            title: listing.title,
            description: listing.description,
            price_cents: listing.price_cents,
            condition: listing.condition.as_str().to_string(),
            category: listing.category,
            pickup_location: listing.pickup_location,
            payment_method: listing.payment_method,
            gone_by: listing.gone_by,
            image_urls: listing.image_urls,
            is_sold: listing.is_sold,
            is_archived: listing.is_archived,
            is_draft: listing.is_draft,
            is_free: listing.is_free,
            is_negotiable: listing.is_negotiable,
            buyer_id: listing.buyer_id,
            created_at: listing.created_at,
            updated_at: listing.updated_at,
        }
    }
}

impl TryFrom<ListingRow> for Listing {
    type Error = MarketError;

    fn try_from(row: ListingRow) -> Result<Self, MarketError> {
        let condition = Condition::parse(&row.condition).ok_or_else(|| {
            MarketError::InvalidRecord(format!("listing condition {:?}", row.condition))
        })?;
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            price_cents: row.price_cents,
            condition,
            category: row.category,
            pickup_location: row.pickup_location,
            payment_method: row.payment_method,
            gone_by: row.gone_by,
            image_urls: row.image_urls,
            is_sold: row.is_sold,
            is_archived: row.is_archived,
            is_draft: row.is_draft,
            is_free: row.is_free,
            is_negotiable: row.is_negotiable,
            buyer_id: row.buyer_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = offers)]
struct OfferRow {
    id: Uuid,
    conversation_id: Uuid,
    listing_id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    amount_cents: i64,
    origin: String,
    status: String,
    created_at: NaiveDateTime,
}

impl From<Offer> for OfferRow {
    fn from(offer: Offer) -> Self {
        Self {
            id: offer.id,
            conversation_id: offer.conversation_id,
            listing_id: offer.listing_id,
            buyer_id: offer.buyer_id,
            seller_id: offer.seller_id,
            amount_cents: offer.amount_cents,
            origin: offer.origin.as_str().to_string(),
            status: offer.status.as_str().to_string(),
            created_at: offer.created_at,
        }
    }
}

impl TryFrom<OfferRow> for Offer {
    type Error = MarketError;

    fn try_from(row: OfferRow) -> Result<Self, MarketError> {
        let origin = OfferOrigin::parse(&row.origin).ok_or_else(|| {
            MarketError::InvalidRecord(format!("offer origin {:?}", row.origin))
        })?;
        let status = OfferStatus::parse(&row.status).ok_or_else(|| {
            MarketError::InvalidRecord(format!("offer status {:?}", row.status))
        })?;
        Ok(Self {
            id: row.id,
            conversation_id: row.conversation_id,
            listing_id: row.listing_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            amount_cents: row.amount_cents,
            origin,
            status,
            created_at: row.created_at,
        })
    }
}

impl MarketStore for PgStore {
    fn create_listing(&self, new: NewListing) -> Result<Listing, MarketError> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
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
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(listings::table)
            .values(ListingRow::from(listing.clone()))
            .execute(&mut conn)?;
        Ok(listing)
    }

    fn listing(&self, id: Uuid) -> Result<Option<Listing>, MarketError> {
        let mut conn = self.conn()?;
        listings::table
            .find(id)
            .first::<ListingRow>(&mut conn)
            .optional()?
            .map(Listing::try_from)
            .transpose()
    }

    fn browse(&self, filter: &BrowseFilter) -> Result<Vec<Listing>, MarketError> {
        let mut conn = self.conn()?;
        let mut query = listings::table
            .into_boxed()
            .filter(listings::is_draft.eq(false))
            .filter(listings::is_archived.eq(false));
        if !filter.include_sold {
            query = query.filter(listings::is_sold.eq(false));
        }
        if let Some(category) = &filter.category {
            query = query.filter(listings::category.eq(category.clone()));
        }
        if let Some(condition) = filter.condition {
            query = query.filter(listings::condition.eq(condition.as_str()));
        }
        if let Some(max) = filter.max_price_cents {
            query = query.filter(listings::price_cents.le(max));
        }
        if filter.free_only {
            query = query.filter(listings::is_free.eq(true));
        }
        query = match filter.sort {
            Sort::Newest => query.order(listings::created_at.desc()),
            Sort::PriceAsc => query.order(listings::price_cents.asc()),
            Sort::PriceDesc => query.order(listings::price_cents.desc()),
        };
        let rows = query.load::<ListingRow>(&mut conn)?;
        rows.into_iter().map(Listing::try_from).collect()
    }

    fn update_listing_flags(&self, id: Uuid, patch: &ListingPatch) -> Result<Listing, MarketError> {
        let mut conn = self.conn()?;
        conn.transaction::<Listing, MarketError, _>(|conn| {
            let row = listings::table
                .find(id)
                .first::<ListingRow>(conn)
                .optional()?
                .ok_or(MarketError::NotFound("listing"))?;
            let is_archived = patch.is_archived.unwrap_or(row.is_archived);
            let is_draft = patch.is_draft.unwrap_or(row.is_draft);
            let updated = diesel::update(listings::table.find(id))
                .set((
                    listings::is_archived.eq(is_archived),
                    listings::is_draft.eq(is_draft),
                    listings::updated_at.eq(Utc::now().naive_utc()),
                ))
                .get_result::<ListingRow>(conn)?;
            Listing::try_from(updated)
        })
    }

    fn mark_sold(&self, listing_id: Uuid, buyer_id: Uuid) -> Result<Listing, MarketError> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        conn.transaction::<Listing, MarketError, _>(|conn| {
            let sold = diesel::update(
                listings::table
                    .find(listing_id)
                    .filter(listings::is_sold.eq(false)),
            )
            .set((
                listings::is_sold.eq(true),
                listings::buyer_id.eq(Some(buyer_id)),
                listings::updated_at.eq(now),
            ))
            .get_results::<ListingRow>(conn)?;
            let Some(row) = sold.into_iter().next() else {
                let exists = listings::table
                    .find(listing_id)
                    .select(listings::id)
                    .first::<Uuid>(conn)
                    .optional()?;
                return Err(match exists {
                    Some(_) => MarketError::ListingAlreadySold,
                    None => MarketError::NotFound("listing"),
                });
            };
            diesel::update(
                offers::table
                    .filter(offers::listing_id.eq(listing_id))
                    .filter(offers::status.eq(OfferStatus::Pending.as_str())),
            )
            .set(offers::status.eq(OfferStatus::Rejected.as_str()))
            .execute(conn)?;
            Listing::try_from(row)
        })
    }

    fn archive_stale(&self, cutoff: NaiveDateTime) -> Result<usize, MarketError> {
        let mut conn = self.conn()?;
        let archived = diesel::update(
            listings::table
                .filter(listings::is_archived.eq(false))
                .filter(listings::created_at.lt(cutoff)),
        )
        .set((
            listings::is_archived.eq(true),
            listings::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
        Ok(archived)
    }

    fn get_or_create_conversation(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Conversation, MarketError> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        let fresh = Conversation {
            id: Uuid::new_v4(),
            listing_id,
            buyer_id,
            seller_id,
            created_at: now,
            updated_at: now,
        };
        // the unique index on (listing_id, buyer_id) arbitrates races; losing
        // an insert race is not an error, the existing row is the answer
        diesel::insert_into(conversations::table)
            .values(&fresh)
            .on_conflict((conversations::listing_id, conversations::buyer_id))
            .do_nothing()
            .execute(&mut conn)?;
        let row = conversations::table
            .filter(conversations::listing_id.eq(listing_id))
            .filter(conversations::buyer_id.eq(buyer_id))
            .first::<Conversation>(&mut conn)?;
        Ok(row)
    }

    fn conversation(&self, id: Uuid) -> Result<Option<Conversation>, MarketError> {
        let mut conn = self.conn()?;
        Ok(conversations::table
            .find(id)
            .first::<Conversation>(&mut conn)
            .optional()?)
    }

    fn conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>, MarketError> {
        let mut conn = self.conn()?;
        Ok(conversations::table
            .filter(
                conversations::buyer_id
                    .eq(user_id)
                    .or(conversations::seller_id.eq(user_id)),
            )
            .order(conversations::updated_at.desc())
            .load::<Conversation>(&mut conn)?)
    }

    fn touch_conversation(&self, id: Uuid) -> Result<(), MarketError> {
        let mut conn = self.conn()?;
        let touched = diesel::update(conversations::table.find(id))
            .set(conversations::updated_at.eq(Utc::now().naive_utc()))
            .execute(&mut conn)?;
        if touched == 0 {
            return Err(MarketError::NotFound("conversation"));
        }
        Ok(())
    }

    fn insert_offer(&self, new: NewOffer) -> Result<Offer, MarketError> {
        let mut conn = self.conn()?;
        let offer = Offer {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            listing_id: new.listing_id,
            buyer_id: new.buyer_id,
            seller_id: new.seller_id,
            amount_cents: new.amount_cents,
            origin: new.origin,
            status: OfferStatus::Pending,
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(offers::table)
            .values(OfferRow::from(offer.clone()))
            .execute(&mut conn)?;
        Ok(offer)
    }

    fn offer(&self, id: Uuid) -> Result<Option<Offer>, MarketError> {
        let mut conn = self.conn()?;
        offers::table
            .find(id)
            .first::<OfferRow>(&mut conn)
            .optional()?
            .map(Offer::try_from)
            .transpose()
    }

    fn offers_for_listing(&self, listing_id: Uuid) -> Result<Vec<Offer>, MarketError> {
        let mut conn = self.conn()?;
        let rows = offers::table
            .filter(offers::listing_id.eq(listing_id))
            .order(offers::created_at.desc())
            .load::<OfferRow>(&mut conn)?;
        rows.into_iter().map(Offer::try_from).collect()
    }

    fn reject_offer(&self, id: Uuid) -> Result<Offer, MarketError> {
        let mut conn = self.conn()?;
        conn.transaction::<Offer, MarketError, _>(|conn| {
            let rejected = diesel::update(
                offers::table
                    .find(id)
                    .filter(offers::status.eq(OfferStatus::Pending.as_str())),
            )
            .set(offers::status.eq(OfferStatus::Rejected.as_str()))
            .get_results::<OfferRow>(conn)?;
            match rejected.into_iter().next() {
                Some(row) => Offer::try_from(row),
                None => {
                    let exists = offers::table
                        .find(id)
                        .select(offers::id)
                        .first::<Uuid>(conn)
                        .optional()?;
                    Err(match exists {
                        Some(_) => MarketError::AlreadyDecided,
                        None => MarketError::NotFound("offer"),
                    })
                }
            }
        })
    }

    fn accept_offer(&self, id: Uuid) -> Result<AcceptOutcome, MarketError> {
        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();
        conn.transaction::<AcceptOutcome, MarketError, _>(|conn| {
            let offer = Offer::try_from(
                offers::table
                    .find(id)
                    .first::<OfferRow>(conn)
                    .optional()?
                    .ok_or(MarketError::NotFound("offer"))?,
            )?;
            if offer.status == OfferStatus::Accepted {
                return Err(MarketError::AlreadyDecided);
            }
            let already_sold = listings::table
                .find(offer.listing_id)
                .select(listings::is_sold)
                .first::<bool>(conn)
                .optional()?
                .ok_or(MarketError::NotFound("listing"))?;
            // an offer that lost to a different acceptance reports the sold
            // listing, not its own rejection
            if already_sold {
                return Err(MarketError::ListingAlreadySold);
            }
            if offer.status != OfferStatus::Pending {
                return Err(MarketError::AlreadyDecided);
            }
            // the guard: zero rows updated means a competing accept won the
            // row first, and this whole transaction rolls back
            let sold = diesel::update(
                listings::table
                    .find(offer.listing_id)
                    .filter(listings::is_sold.eq(false)),
            )
            .set((
                listings::is_sold.eq(true),
                listings::buyer_id.eq(Some(offer.buyer_id)),
                listings::updated_at.eq(now),
            ))
            .get_results::<ListingRow>(conn)?;
            let listing_row = sold
                .into_iter()
                .next()
                .ok_or(MarketError::ListingAlreadySold)?;
            let accepted = diesel::update(offers::table.find(id))
                .set(offers::status.eq(OfferStatus::Accepted.as_str()))
                .get_result::<OfferRow>(conn)?;
            let rejected_offer_ids = diesel::update(
                offers::table
                    .filter(offers::listing_id.eq(offer.listing_id))
                    .filter(offers::status.eq(OfferStatus::Pending.as_str()))
                    .filter(offers::id.ne(id)),
            )
            .set(offers::status.eq(OfferStatus::Rejected.as_str()))
            .returning(offers::id)
            .get_results::<Uuid>(conn)?;
            Ok(AcceptOutcome {
                offer: Offer::try_from(accepted)?,
                listing: Listing::try_from(listing_row)?,
                rejected_offer_ids,
            })
        })
    }

    fn insert_message(&self, new: NewMessage) -> Result<Message, MarketError> {
        let mut conn = self.conn()?;
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            body: new.body,
            is_read: false,
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(messages::table)
            .values(&message)
            .execute(&mut conn)?;
        Ok(message)
    }

    fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, MarketError> {
        let mut conn = self.conn()?;
        Ok(messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .order(messages::created_at.asc())
            .then_order_by(messages::id.asc())
            .load::<Message>(&mut conn)?)
    }

    fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<usize, MarketError> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            messages::table
                .filter(messages::conversation_id.eq(conversation_id))
                .filter(messages::sender_id.ne(reader_id))
                .filter(messages::is_read.eq(false)),
        )
        .set(messages::is_read.eq(true))
        .execute(&mut conn)?)
    }

    fn unread_count(&self, user_id: Uuid) -> Result<i64, MarketError> {
        let mut conn = self.conn()?;
        Ok(messages::table
            .inner_join(conversations::table)
            .filter(messages::is_read.eq(false))
            .filter(messages::sender_id.ne(user_id))
            .filter(
                conversations::buyer_id
                    .eq(user_id)
                    .or(conversations::seller_id.eq(user_id)),
            )
            .count()
            .get_result::<i64>(&mut conn)?)
    }
}
