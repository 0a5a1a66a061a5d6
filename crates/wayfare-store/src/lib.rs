//! wayfare-store: SQLite persistence for trips, face groups, and expenses.

mod schema;
mod store;

pub use store::{GroupSummary, NewExpense, Store};

use thiserror::Error;
use wayfare_core::{MemberId, Money, TripId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown trip: {0}")]
    UnknownTrip(TripId),
    #[error("member {payer} does not belong to trip {trip}")]
    PayerNotInTrip { payer: MemberId, trip: TripId },
    #[error("amount too large to store: {0}")]
    AmountOutOfRange(Money),
}
