use crate::config::Config;
use crate::engine::{photo_paths, EngineError, EngineHandle};
use chrono::NaiveDate;
use serde::Serialize;
use wayfare_core::{GroupId, MemberId, Money, ResolveAction, SuggestionId, TripId};
use wayfare_store::{NewExpense, StoreError};
use zbus::fdo;
use zbus::interface;

/// D-Bus interface for the Wayfare daemon.
///
/// Bus name: org.wayfare.Wayfare1
/// Object path: /org/wayfare/Wayfare1
///
/// Structured results are returned as JSON strings.
pub struct WayfareService {
    engine: EngineHandle,
    config: Config,
}

impl WayfareService {
    pub fn new(engine: EngineHandle, config: Config) -> Self {
        Self { engine, config }
    }
}

#[interface(name = "org.wayfare.Wayfare1")]
impl WayfareService {
    async fn create_trip(&self, name: &str, owner: &str) -> fdo::Result<String> {
        tracing::info!(name, owner, "create_trip requested");
        let trip = self
            .engine
            .create_trip(name.to_string(), owner.to_string())
            .await
            .map_err(to_fdo)?;
        to_json(&trip)
    }

    async fn delete_trip(&self, trip_id: TripId) -> fdo::Result<bool> {
        tracing::info!(trip_id, "delete_trip requested");
        self.engine.delete_trip(trip_id).await.map_err(to_fdo)
    }

    /// Record photos for a trip and cluster their faces. Returns a per-photo report.
    async fn upload_photos(&self, trip_id: TripId, paths: Vec<String>) -> fdo::Result<String> {
        let paths = photo_paths(paths.iter().map(String::as_str));
        if paths.is_empty() {
            return Err(fdo::Error::InvalidArgs("no photo paths given".into()));
        }
        tracing::info!(trip_id, photos = paths.len(), "upload_photos requested");
        let report = self.engine.upload(trip_id, paths).await.map_err(to_fdo)?;
        to_json(&report)
    }

    async fn face_groups(&self, trip_id: TripId) -> fdo::Result<String> {
        let groups = self.engine.groups(trip_id).await.map_err(to_fdo)?;
        to_json(&groups)
    }

    async fn rename_group(&self, group_id: GroupId, name: &str) -> fdo::Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(fdo::Error::InvalidArgs("group name must not be empty".into()));
        }
        tracing::info!(group_id, name, "rename_group requested");
        self.engine
            .rename_group(group_id, name.to_string())
            .await
            .map_err(to_fdo)
    }

    async fn group_photos(&self, group_id: GroupId) -> fdo::Result<String> {
        let photos = self.engine.photos_for_group(group_id).await.map_err(to_fdo)?;
        to_json(&photos)
    }

    /// Active merge suggestions for a trip.
    async fn suggestions(&self, trip_id: TripId) -> fdo::Result<String> {
        let suggestions = self.engine.suggestions(trip_id).await.map_err(to_fdo)?;
        to_json(&suggestions)
    }

    async fn merge_suggestion(
        &self,
        suggestion_id: SuggestionId,
        actor: &str,
    ) -> fdo::Result<String> {
        self.resolve(suggestion_id, actor, ResolveAction::Merge).await
    }

    async fn dismiss_suggestion(
        &self,
        suggestion_id: SuggestionId,
        actor: &str,
    ) -> fdo::Result<String> {
        self.resolve(suggestion_id, actor, ResolveAction::Dismiss).await
    }

    /// Add a trip member. An empty `contact` stores none.
    async fn add_member(&self, trip_id: TripId, name: &str, contact: &str) -> fdo::Result<String> {
        let contact = non_empty(contact);
        tracing::info!(trip_id, name, "add_member requested");
        let member = self
            .engine
            .add_member(trip_id, name.to_string(), contact)
            .await
            .map_err(to_fdo)?;
        to_json(&member)
    }

    async fn remove_member(&self, member_id: MemberId) -> fdo::Result<bool> {
        tracing::info!(member_id, "remove_member requested");
        self.engine.remove_member(member_id).await.map_err(to_fdo)
    }

    async fn members(&self, trip_id: TripId) -> fdo::Result<String> {
        let members = self.engine.members(trip_id).await.map_err(to_fdo)?;
        to_json(&members)
    }

    /// Record an expense. `amount` is a decimal string, `date` is `YYYY-MM-DD`,
    /// and a `payer_id` of 0 leaves the expense without a payer.
    async fn add_expense(
        &self,
        trip_id: TripId,
        amount: &str,
        category: &str,
        date: &str,
        description: &str,
        payer_id: MemberId,
    ) -> fdo::Result<String> {
        let expense = parse_expense(trip_id, amount, category, date, description, payer_id)
            .map_err(fdo::Error::InvalidArgs)?;
        tracing::info!(
            trip_id,
            amount = %expense.amount,
            payer = expense.payer,
            "add_expense requested"
        );
        let expense = self.engine.add_expense(expense).await.map_err(to_fdo)?;
        to_json(&expense)
    }

    async fn expenses(&self, trip_id: TripId) -> fdo::Result<String> {
        let expenses = self.engine.expenses(trip_id).await.map_err(to_fdo)?;
        to_json(&expenses)
    }

    /// Balances and the transfers that settle them.
    async fn settle(&self, trip_id: TripId) -> fdo::Result<String> {
        let settlement = self.engine.settle(trip_id).await.map_err(to_fdo)?;
        to_json(&settlement)
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        to_json(&status_report(&self.config))
    }
}

impl WayfareService {
    async fn resolve(
        &self,
        suggestion_id: SuggestionId,
        actor: &str,
        action: ResolveAction,
    ) -> fdo::Result<String> {
        tracing::info!(suggestion_id, actor, ?action, "resolve requested");
        let outcome = self
            .engine
            .resolve(suggestion_id, actor.to_string(), action)
            .await
            .map_err(to_fdo)?;
        to_json(&outcome)
    }
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| fdo::Error::Failed(format!("serialization failed: {e}")))
}

/// Caller mistakes become `InvalidArgs`; everything else is `Failed`.
fn to_fdo(err: EngineError) -> fdo::Error {
    match err {
        EngineError::UnknownTrip(_)
        | EngineError::Store(StoreError::UnknownTrip(_))
        | EngineError::Store(StoreError::PayerNotInTrip { .. })
        | EngineError::Store(StoreError::AmountOutOfRange(_)) => {
            fdo::Error::InvalidArgs(err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "request failed");
            fdo::Error::Failed(err.to_string())
        }
    }
}

fn status_report(config: &Config) -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "config": config,
    })
}

fn non_empty(raw: &str) -> Option<String> {
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

fn parse_expense(
    trip_id: TripId,
    amount: &str,
    category: &str,
    date: &str,
    description: &str,
    payer_id: MemberId,
) -> Result<NewExpense, String> {
    let amount: Money = amount
        .trim()
        .parse()
        .map_err(|e| format!("invalid amount {amount:?}: {e}"))?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date {date:?}: {e}"))?;
    let category = category.trim();
    if category.is_empty() {
        return Err("expense category must not be empty".into());
    }

    Ok(NewExpense {
        trip_id,
        amount,
        category: category.to_string(),
        date,
        description: non_empty(description),
        payer: (payer_id != 0).then_some(payer_id),
    })
}
