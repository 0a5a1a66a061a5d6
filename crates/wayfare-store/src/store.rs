use crate::schema::SCHEMA;
use crate::StoreError;
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use wayfare_core::resolver::{self, ResolveAction, ResolveStep};
use wayfare_core::{
    canonical_pair, settle, Embedding, Expense, ExpenseId, FaceGroup, GroupId, GroupMember,
    MemberId, MergeSuggestion, Money, PhotoFaceRelation, PhotoId, Resolution, Settlement,
    SuggestionId, SuggestionState, Trip, TripId, TripPhoto, UNNAMED_GROUP,
};

/// A face group together with the number of distinct photos it appears in.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: FaceGroup,
    pub photo_count: usize,
}

/// Fields of an expense before it has an id.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub trip_id: TripId,
    pub amount: Money,
    pub category: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub payer: Option<MemberId>,
}

/// SQLite-backed record store for one wayfare database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self::init(Connection::open(path)?)?;
        tracing::info!(path = %path.display(), "database opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // --- trips and photos ---

    pub fn create_trip(&self, name: &str, owner: &str) -> Result<Trip, StoreError> {
        self.conn.execute(
            "INSERT INTO trips (name, owner, created_at) VALUES (?1, ?2, ?3)",
            params![name, owner, Utc::now()],
        )?;
        Ok(Trip {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            owner: owner.to_string(),
        })
    }

    pub fn trip(&self, id: TripId) -> Result<Option<Trip>, StoreError> {
        let trip = self
            .conn
            .query_row(
                "SELECT id, name, owner FROM trips WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Trip {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        owner: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(trip)
    }

    fn require_trip(&self, id: TripId) -> Result<Trip, StoreError> {
        self.trip(id)?.ok_or(StoreError::UnknownTrip(id))
    }

    /// Delete a trip and everything that belongs to it.
    pub fn delete_trip(&self, id: TripId) -> Result<bool, StoreError> {
        let deleted = self.conn.execute("DELETE FROM trips WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn add_photo(&self, trip_id: TripId, path: &Path) -> Result<TripPhoto, StoreError> {
        self.require_trip(trip_id)?;
        let uploaded_at = Utc::now();
        self.conn.execute(
            "INSERT INTO photos (trip_id, path, uploaded_at) VALUES (?1, ?2, ?3)",
            params![trip_id, path.to_string_lossy().into_owned(), uploaded_at],
        )?;
        Ok(TripPhoto {
            id: self.conn.last_insert_rowid(),
            trip_id,
            path: path.to_path_buf(),
            uploaded_at,
        })
    }

    pub fn photo(&self, id: PhotoId) -> Result<Option<TripPhoto>, StoreError> {
        let photo = self
            .conn
            .query_row(
                "SELECT id, trip_id, path, uploaded_at FROM photos WHERE id = ?1",
                params![id],
                |row| {
                    Ok(TripPhoto {
                        id: row.get(0)?,
                        trip_id: row.get(1)?,
                        path: PathBuf::from(row.get::<_, String>(2)?),
                        uploaded_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(photo)
    }

    // --- face groups ---

    /// Groups of a trip in creation order.
    pub fn face_groups(&self, trip_id: TripId) -> Result<Vec<FaceGroup>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, name, thumbnail, representative, created_at
             FROM face_groups WHERE trip_id = ?1 ORDER BY id",
        )?;
        let groups = stmt
            .query_map(params![trip_id], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    pub fn face_group(&self, id: GroupId) -> Result<Option<FaceGroup>, StoreError> {
        let group = self
            .conn
            .query_row(
                "SELECT id, trip_id, name, thumbnail, representative, created_at
                 FROM face_groups WHERE id = ?1",
                params![id],
                group_from_row,
            )
            .optional()?;
        Ok(group)
    }

    /// Create a group founded on `representative`. The encoding is never updated afterwards.
    pub fn create_face_group(
        &self,
        trip_id: TripId,
        representative: &Embedding,
        thumbnail: Option<&Path>,
    ) -> Result<FaceGroup, StoreError> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO face_groups (trip_id, name, thumbnail, representative, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                trip_id,
                UNNAMED_GROUP,
                thumbnail.map(|p| p.to_string_lossy().into_owned()),
                embedding_to_bytes(representative),
                created_at,
            ],
        )?;
        Ok(FaceGroup {
            id: self.conn.last_insert_rowid(),
            trip_id,
            name: UNNAMED_GROUP.to_string(),
            thumbnail: thumbnail.map(Path::to_path_buf),
            representative: representative.clone(),
            created_at,
        })
    }

    pub fn rename_group(&self, id: GroupId, name: &str) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            "UPDATE face_groups SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        Ok(updated > 0)
    }

    pub fn group_summaries(&self, trip_id: TripId) -> Result<Vec<GroupSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT g.id, g.trip_id, g.name, g.thumbnail, g.representative, g.created_at,
                    (SELECT COUNT(DISTINCT r.photo_id)
                     FROM photo_face_relations r WHERE r.group_id = g.id)
             FROM face_groups g WHERE g.trip_id = ?1 ORDER BY g.id",
        )?;
        let summaries = stmt
            .query_map(params![trip_id], |row| {
                Ok(GroupSummary {
                    group: group_from_row(row)?,
                    photo_count: row.get::<_, i64>(6)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    // --- photo/face relations ---

    pub fn add_relation(
        &self,
        photo_id: PhotoId,
        group_id: GroupId,
    ) -> Result<PhotoFaceRelation, StoreError> {
        self.conn.execute(
            "INSERT INTO photo_face_relations (photo_id, group_id) VALUES (?1, ?2)",
            params![photo_id, group_id],
        )?;
        Ok(PhotoFaceRelation {
            id: self.conn.last_insert_rowid(),
            photo_id,
            group_id,
        })
    }

    pub fn relations_for_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<PhotoFaceRelation>, StoreError> {
        self.relations(
            "SELECT id, photo_id, group_id FROM photo_face_relations
             WHERE group_id = ?1 ORDER BY id",
            group_id,
        )
    }

    pub fn relations_for_photo(
        &self,
        photo_id: PhotoId,
    ) -> Result<Vec<PhotoFaceRelation>, StoreError> {
        self.relations(
            "SELECT id, photo_id, group_id FROM photo_face_relations
             WHERE photo_id = ?1 ORDER BY id",
            photo_id,
        )
    }

    fn relations(&self, sql: &str, id: i64) -> Result<Vec<PhotoFaceRelation>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let relations = stmt
            .query_map(params![id], |row| {
                Ok(PhotoFaceRelation {
                    id: row.get(0)?,
                    photo_id: row.get(1)?,
                    group_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(relations)
    }

    /// Photos containing a face of `group_id`, oldest upload first.
    pub fn photos_for_group(&self, group_id: GroupId) -> Result<Vec<TripPhoto>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT p.id, p.trip_id, p.path, p.uploaded_at
             FROM photos p JOIN photo_face_relations r ON r.photo_id = p.id
             WHERE r.group_id = ?1 ORDER BY p.id",
        )?;
        let photos = stmt
            .query_map(params![group_id], |row| {
                Ok(TripPhoto {
                    id: row.get(0)?,
                    trip_id: row.get(1)?,
                    path: PathBuf::from(row.get::<_, String>(2)?),
                    uploaded_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    // --- merge suggestions ---

    /// Record a merge suggestion for the unordered pair `(a, b)`.
    ///
    /// Returns `false` when a suggestion for the pair already exists, whether
    /// active or dismissed.
    pub fn suggest_merge(
        &self,
        trip_id: TripId,
        a: GroupId,
        b: GroupId,
    ) -> Result<bool, StoreError> {
        if a == b {
            return Ok(false);
        }
        let (group_a, group_b) = canonical_pair(a, b);
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO face_merge_suggestions
                 (trip_id, group_a, group_b, active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![trip_id, group_a, group_b, Utc::now()],
        )?;
        Ok(inserted > 0)
    }

    pub fn suggestion(&self, id: SuggestionId) -> Result<Option<MergeSuggestion>, StoreError> {
        let suggestion = self
            .conn
            .query_row(
                "SELECT id, trip_id, group_a, group_b, active
                 FROM face_merge_suggestions WHERE id = ?1",
                params![id],
                suggestion_from_row,
            )
            .optional()?;
        Ok(suggestion)
    }

    pub fn suggestion_for_pair(
        &self,
        a: GroupId,
        b: GroupId,
    ) -> Result<Option<MergeSuggestion>, StoreError> {
        let (group_a, group_b) = canonical_pair(a, b);
        let suggestion = self
            .conn
            .query_row(
                "SELECT id, trip_id, group_a, group_b, active FROM face_merge_suggestions
                 WHERE group_a = ?1 AND group_b = ?2",
                params![group_a, group_b],
                suggestion_from_row,
            )
            .optional()?;
        Ok(suggestion)
    }

    /// Suggestions of a trip still waiting for review.
    pub fn active_suggestions(&self, trip_id: TripId) -> Result<Vec<MergeSuggestion>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, group_a, group_b, active FROM face_merge_suggestions
             WHERE trip_id = ?1 AND active = 1 ORDER BY id",
        )?;
        let suggestions = stmt
            .query_map(params![trip_id], suggestion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(suggestions)
    }

    pub fn dismiss_suggestion(&self, id: SuggestionId) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE face_merge_suggestions SET active = 0 WHERE id = ?1",
            params![id],
        )?;
        tracing::info!(suggestion_id = id, "merge suggestion dismissed");
        Ok(())
    }

    /// Fold group `from` into group `into` and delete `from`.
    ///
    /// Relations of `from` move to `into`, then `into` is left with at most
    /// one relation per photo. Suggestions that mention `from` go with it.
    /// `into` keeps its name and thumbnail.
    pub fn merge_groups(&mut self, into: GroupId, from: GroupId) -> Result<(), StoreError> {
        if into == from {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        let moved = tx.execute(
            "UPDATE photo_face_relations SET group_id = ?1 WHERE group_id = ?2",
            params![into, from],
        )?;
        // Two faces of one photo may both have matched `into` already, so
        // collapse over every relation of `into`, not just the moved ones.
        let collapsed = tx.execute(
            "DELETE FROM photo_face_relations
             WHERE group_id = ?1
               AND id NOT IN (
                   SELECT MIN(id) FROM photo_face_relations WHERE group_id = ?1 GROUP BY photo_id
               )",
            params![into],
        )?;
        tx.execute("DELETE FROM face_groups WHERE id = ?1", params![from])?;
        tx.commit()?;

        tracing::info!(into, from, moved, collapsed, "face groups merged");
        Ok(())
    }

    /// Whether `actor` owns the trip or is one of its listed members.
    pub fn is_participant(&self, trip_id: TripId, actor: &str) -> Result<bool, StoreError> {
        let Some(trip) = self.trip(trip_id)? else {
            return Ok(false);
        };
        let members = self.members(trip_id)?;
        Ok(resolver::is_participant(
            actor,
            &trip.owner,
            members.iter().filter_map(|m| m.contact.as_deref()),
        ))
    }

    /// Merge or dismiss a suggestion on behalf of `actor`.
    ///
    /// Unknown ids, unauthorized actors, and already-resolved suggestions
    /// leave the database untouched and report why.
    pub fn resolve(
        &mut self,
        suggestion_id: SuggestionId,
        actor: &str,
        action: ResolveAction,
    ) -> Result<Resolution, StoreError> {
        let suggestion = self.suggestion(suggestion_id)?;
        let authorized = match &suggestion {
            Some(s) => self.is_participant(s.trip_id, actor)?,
            None => false,
        };

        let step = resolver::plan(suggestion.as_ref(), action, authorized);
        match step {
            ResolveStep::Merge { into, from, .. } => self.merge_groups(into, from)?,
            ResolveStep::Dismiss { suggestion } => self.dismiss_suggestion(suggestion)?,
            ResolveStep::Skip(reason) => {
                tracing::info!(suggestion_id, actor, ?action, ?reason, "resolve request ignored");
            }
        }
        Ok(step.into())
    }

    // --- members and expenses ---

    pub fn add_member(
        &self,
        trip_id: TripId,
        name: &str,
        contact: Option<&str>,
    ) -> Result<GroupMember, StoreError> {
        self.require_trip(trip_id)?;
        self.conn.execute(
            "INSERT INTO group_members (trip_id, name, contact) VALUES (?1, ?2, ?3)",
            params![trip_id, name, contact],
        )?;
        Ok(GroupMember {
            id: self.conn.last_insert_rowid(),
            trip_id,
            name: name.to_string(),
            contact: contact.map(str::to_string),
        })
    }

    /// Remove a member. Expenses they paid stay, with no payer.
    pub fn remove_member(&self, id: MemberId) -> Result<bool, StoreError> {
        let deleted = self.conn.execute("DELETE FROM group_members WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Members of a trip in the order they were added.
    pub fn members(&self, trip_id: TripId) -> Result<Vec<GroupMember>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, name, contact FROM group_members WHERE trip_id = ?1 ORDER BY id",
        )?;
        let members = stmt
            .query_map(params![trip_id], |row| {
                Ok(GroupMember {
                    id: row.get(0)?,
                    trip_id: row.get(1)?,
                    name: row.get(2)?,
                    contact: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    pub fn add_expense(&self, new: NewExpense) -> Result<Expense, StoreError> {
        self.require_trip(new.trip_id)?;
        if let Some(payer) = new.payer {
            let payer_trip: Option<TripId> = self
                .conn
                .query_row(
                    "SELECT trip_id FROM group_members WHERE id = ?1",
                    params![payer],
                    |row| row.get(0),
                )
                .optional()?;
            if payer_trip != Some(new.trip_id) {
                return Err(StoreError::PayerNotInTrip { payer, trip: new.trip_id });
            }
        }

        let cents = i64::try_from(new.amount.cents())
            .map_err(|_| StoreError::AmountOutOfRange(new.amount))?;
        self.conn.execute(
            "INSERT INTO expenses (trip_id, amount_cents, category, date, description, payer_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![new.trip_id, cents, new.category, new.date, new.description, new.payer],
        )?;
        Ok(Expense {
            id: self.conn.last_insert_rowid(),
            trip_id: new.trip_id,
            amount: new.amount,
            category: new.category,
            date: new.date,
            description: new.description,
            payer: new.payer,
        })
    }

    pub fn expenses(&self, trip_id: TripId) -> Result<Vec<Expense>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, amount_cents, category, date, description, payer_id
             FROM expenses WHERE trip_id = ?1 ORDER BY date, id",
        )?;
        let expenses = stmt
            .query_map(params![trip_id], |row| {
                let cents: i64 = row.get(2)?;
                let cents = u64::try_from(cents)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Integer, Box::new(e))
                    })?;
                Ok(Expense {
                    id: row.get::<_, ExpenseId>(0)?,
                    trip_id: row.get(1)?,
                    amount: Money::from_cents(cents),
                    category: row.get(3)?,
                    date: row.get(4)?,
                    description: row.get(5)?,
                    payer: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(expenses)
    }

    /// Balances and settling transfers from the trip's current members and expenses.
    pub fn settle(&self, trip_id: TripId) -> Result<Settlement, StoreError> {
        self.require_trip(trip_id)?;
        let members = self.members(trip_id)?;
        let expenses = self.expenses(trip_id)?;
        Ok(settle(&members, &expenses))
    }
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<FaceGroup> {
    let blob: Vec<u8> = row.get(4)?;
    Ok(FaceGroup {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        name: row.get(2)?,
        thumbnail: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
        representative: bytes_to_embedding(&blob).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                Type::Blob,
                format!(
                    "embedding blob of {} bytes is not a whole number of f32s",
                    blob.len()
                )
                .into(),
            )
        })?,
        created_at: row.get(5)?,
    })
}

fn suggestion_from_row(row: &Row<'_>) -> rusqlite::Result<MergeSuggestion> {
    let active: bool = row.get(4)?;
    Ok(MergeSuggestion {
        id: row.get(0)?,
        trip_id: row.get(1)?,
        group_a: row.get(2)?,
        group_b: row.get(3)?,
        state: if active {
            SuggestionState::Active
        } else {
            SuggestionState::Dismissed
        },
    })
}

pub(crate) fn embedding_to_bytes(embedding: &Embedding) -> Vec<u8> {
    embedding.values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn bytes_to_embedding(bytes: &[u8]) -> Option<Embedding> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    let values = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Some(Embedding::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfare_core::Unchanged;

    fn store_with_trip() -> (Store, Trip) {
        let store = Store::open_in_memory().unwrap();
        let trip = store.create_trip("Lisbon", "owner@example.com").unwrap();
        (store, trip)
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_embedding_blob_roundtrip_preserves_bits() {
        let e = emb(&[0.125, -3.5, f32::MIN_POSITIVE]);
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&e)), Some(e));
        assert_eq!(bytes_to_embedding(&[0, 1, 2]), None);
    }

    #[test]
    fn test_groups_listed_in_creation_order_with_fixed_representative() {
        let (store, trip) = store_with_trip();
        let first = store.create_face_group(trip.id, &emb(&[0.1, 0.2]), None).unwrap();
        let second = store
            .create_face_group(trip.id, &emb(&[0.9, 0.8]), Some(Path::new("/t/face.jpg")))
            .unwrap();
        store.rename_group(first.id, "Ana").unwrap();

        let groups = store.face_groups(trip.id).unwrap();
        assert_eq!(groups.iter().map(|g| g.id).collect::<Vec<_>>(), vec![first.id, second.id]);
        assert_eq!(groups[0].name, "Ana");
        assert_eq!(groups[0].representative, emb(&[0.1, 0.2]));
        assert_eq!(groups[1].name, UNNAMED_GROUP);
        assert_eq!(groups[1].thumbnail.as_deref(), Some(Path::new("/t/face.jpg")));
    }

    #[test]
    fn test_one_suggestion_per_unordered_pair() {
        let (store, trip) = store_with_trip();
        let a = store.create_face_group(trip.id, &emb(&[0.0]), None).unwrap();
        let b = store.create_face_group(trip.id, &emb(&[0.5]), None).unwrap();

        assert!(store.suggest_merge(trip.id, a.id, b.id).unwrap());
        assert!(!store.suggest_merge(trip.id, b.id, a.id).unwrap());
        assert!(!store.suggest_merge(trip.id, a.id, a.id).unwrap());

        let active = store.active_suggestions(trip.id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!((active[0].group_a, active[0].group_b), (a.id, b.id));
    }

    #[test]
    fn test_dismissed_pair_never_resurfaces() {
        let (mut store, trip) = store_with_trip();
        let a = store.create_face_group(trip.id, &emb(&[0.0]), None).unwrap();
        let b = store.create_face_group(trip.id, &emb(&[0.5]), None).unwrap();
        store.suggest_merge(trip.id, a.id, b.id).unwrap();
        let id = store.suggestion_for_pair(a.id, b.id).unwrap().unwrap().id;

        let first = store.resolve(id, "owner@example.com", ResolveAction::Dismiss).unwrap();
        assert_eq!(first, Resolution::Dismissed { suggestion: id });
        let second = store.resolve(id, "owner@example.com", ResolveAction::Dismiss).unwrap();
        assert_eq!(second, Resolution::Unchanged { reason: Unchanged::AlreadyResolved });

        assert!(!store.suggest_merge(trip.id, b.id, a.id).unwrap());
        assert!(store.active_suggestions(trip.id).unwrap().is_empty());
        assert_eq!(store.face_groups(trip.id).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_unions_relations_without_duplicates() {
        let (mut store, trip) = store_with_trip();
        let a = store
            .create_face_group(trip.id, &emb(&[0.0]), Some(Path::new("/t/a.jpg")))
            .unwrap();
        let b = store
            .create_face_group(trip.id, &emb(&[0.5]), Some(Path::new("/t/b.jpg")))
            .unwrap();
        store.rename_group(a.id, "Ana").unwrap();

        let p1 = store.add_photo(trip.id, Path::new("/p/1.jpg")).unwrap();
        let p2 = store.add_photo(trip.id, Path::new("/p/2.jpg")).unwrap();
        let p3 = store.add_photo(trip.id, Path::new("/p/3.jpg")).unwrap();
        store.add_relation(p1.id, a.id).unwrap();
        store.add_relation(p2.id, a.id).unwrap();
        store.add_relation(p2.id, b.id).unwrap();
        store.add_relation(p3.id, b.id).unwrap();
        store.add_relation(p3.id, b.id).unwrap();

        store.suggest_merge(trip.id, a.id, b.id).unwrap();
        let id = store.suggestion_for_pair(a.id, b.id).unwrap().unwrap().id;
        let outcome = store.resolve(id, "owner@example.com", ResolveAction::Merge).unwrap();
        assert_eq!(outcome, Resolution::Merged { into: a.id, removed: b.id });

        assert!(store.relations_for_group(b.id).unwrap().is_empty());
        assert!(store.face_group(b.id).unwrap().is_none());
        let mut photos: Vec<PhotoId> = store
            .relations_for_group(a.id)
            .unwrap()
            .iter()
            .map(|r| r.photo_id)
            .collect();
        photos.sort();
        assert_eq!(photos, vec![p1.id, p2.id, p3.id]);

        let survivor = store.face_group(a.id).unwrap().unwrap();
        assert_eq!(survivor.name, "Ana");
        assert_eq!(survivor.thumbnail.as_deref(), Some(Path::new("/t/a.jpg")));

        // The suggestion went with the merged-away group; repeating is a no-op.
        assert!(store.suggestion(id).unwrap().is_none());
        let again = store.resolve(id, "owner@example.com", ResolveAction::Merge).unwrap();
        assert_eq!(again, Resolution::Unchanged { reason: Unchanged::UnknownSuggestion });
    }

    #[test]
    fn test_merge_collapses_duplicate_relations_of_destination() {
        let (mut store, trip) = store_with_trip();
        let a = store.create_face_group(trip.id, &emb(&[0.0]), None).unwrap();
        let b = store.create_face_group(trip.id, &emb(&[0.5]), None).unwrap();
        let photo = store.add_photo(trip.id, Path::new("/p/group-shot.jpg")).unwrap();
        // Two faces in one photo both matched `a`; a third founded `b`.
        let first = store.add_relation(photo.id, a.id).unwrap();
        store.add_relation(photo.id, a.id).unwrap();
        store.add_relation(photo.id, b.id).unwrap();

        store.merge_groups(a.id, b.id).unwrap();

        let relations = store.relations_for_group(a.id).unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!((relations[0].id, relations[0].photo_id), (first.id, photo.id));
        assert_eq!(store.relations_for_photo(photo.id).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_removes_other_suggestions_of_source() {
        let (mut store, trip) = store_with_trip();
        let a = store.create_face_group(trip.id, &emb(&[0.0]), None).unwrap();
        let b = store.create_face_group(trip.id, &emb(&[0.5]), None).unwrap();
        let c = store.create_face_group(trip.id, &emb(&[1.0]), None).unwrap();
        store.suggest_merge(trip.id, a.id, b.id).unwrap();
        store.suggest_merge(trip.id, b.id, c.id).unwrap();
        store.suggest_merge(trip.id, a.id, c.id).unwrap();

        store.merge_groups(a.id, b.id).unwrap();

        let remaining = store.active_suggestions(trip.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!((remaining[0].group_a, remaining[0].group_b), (a.id, c.id));
    }

    #[test]
    fn test_only_participants_may_resolve() {
        let (mut store, trip) = store_with_trip();
        store.add_member(trip.id, "Ben", Some("ben@example.com")).unwrap();
        let a = store.create_face_group(trip.id, &emb(&[0.0]), None).unwrap();
        let b = store.create_face_group(trip.id, &emb(&[0.5]), None).unwrap();
        store.suggest_merge(trip.id, a.id, b.id).unwrap();
        let id = store.suggestion_for_pair(a.id, b.id).unwrap().unwrap().id;

        let outcome = store.resolve(id, "mallory@example.com", ResolveAction::Merge).unwrap();
        assert_eq!(outcome, Resolution::Unchanged { reason: Unchanged::NotAuthorized });
        assert!(store.face_group(b.id).unwrap().is_some());

        let outcome = store.resolve(id, "BEN@example.com", ResolveAction::Dismiss).unwrap();
        assert_eq!(outcome, Resolution::Dismissed { suggestion: id });
    }

    #[test]
    fn test_removed_payer_leaves_expense_unpaid() {
        let (store, trip) = store_with_trip();
        let ana = store.add_member(trip.id, "Ana", None).unwrap();
        let ben = store.add_member(trip.id, "Ben", None).unwrap();
        store
            .add_expense(NewExpense {
                trip_id: trip.id,
                amount: Money::from_cents(12000),
                category: "lodging".into(),
                date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                description: Some("hostel".into()),
                payer: Some(ana.id),
            })
            .unwrap();

        assert!(store.remove_member(ana.id).unwrap());
        let expenses = store.expenses(trip.id).unwrap();
        assert_eq!(expenses[0].payer, None);
        assert_eq!(expenses[0].amount, Money::from_cents(12000));

        let settlement = store.settle(trip.id).unwrap();
        assert_eq!(settlement.balances.len(), 1);
        assert_eq!(settlement.balances[0].member_id, ben.id);
        assert!((settlement.share - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_payer_must_belong_to_trip() {
        let (store, trip) = store_with_trip();
        let other = store.create_trip("Porto", "someone@example.com").unwrap();
        let stranger = store.add_member(other.id, "Cy", None).unwrap();
        let err = store
            .add_expense(NewExpense {
                trip_id: trip.id,
                amount: Money::from_cents(500),
                category: "food".into(),
                date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                description: None,
                payer: Some(stranger.id),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::PayerNotInTrip { .. }));
    }

    #[test]
    fn test_settle_from_snapshot() {
        let (store, trip) = store_with_trip();
        let a = store.add_member(trip.id, "A", None).unwrap();
        let b = store.add_member(trip.id, "B", None).unwrap();
        let c = store.add_member(trip.id, "C", None).unwrap();
        store
            .add_expense(NewExpense {
                trip_id: trip.id,
                amount: "300".parse().unwrap(),
                category: "transport".into(),
                date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                description: None,
                payer: Some(a.id),
            })
            .unwrap();

        let s = store.settle(trip.id).unwrap();
        let pairs: Vec<(MemberId, MemberId)> =
            s.transactions.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(pairs, vec![(b.id, a.id), (c.id, a.id)]);
    }

    #[test]
    fn test_delete_trip_cascades() {
        let (store, trip) = store_with_trip();
        let a = store.create_face_group(trip.id, &emb(&[0.0]), None).unwrap();
        let b = store.create_face_group(trip.id, &emb(&[0.5]), None).unwrap();
        let photo = store.add_photo(trip.id, Path::new("/p/1.jpg")).unwrap();
        store.add_relation(photo.id, a.id).unwrap();
        store.suggest_merge(trip.id, a.id, b.id).unwrap();
        store.add_member(trip.id, "Ana", None).unwrap();

        assert!(store.delete_trip(trip.id).unwrap());
        assert!(store.face_groups(trip.id).unwrap().is_empty());
        assert!(store.relations_for_photo(photo.id).unwrap().is_empty());
        assert!(store.suggestion_for_pair(a.id, b.id).unwrap().is_none());
        assert!(store.members(trip.id).unwrap().is_empty());
    }

    #[test]
    fn test_group_summaries_count_distinct_photos() {
        let (store, trip) = store_with_trip();
        let a = store.create_face_group(trip.id, &emb(&[0.0]), None).unwrap();
        let p1 = store.add_photo(trip.id, Path::new("/p/1.jpg")).unwrap();
        let p2 = store.add_photo(trip.id, Path::new("/p/2.jpg")).unwrap();
        store.add_relation(p1.id, a.id).unwrap();
        store.add_relation(p1.id, a.id).unwrap();
        store.add_relation(p2.id, a.id).unwrap();

        let summaries = store.group_summaries(trip.id).unwrap();
        assert_eq!(summaries[0].photo_count, 2);
        assert_eq!(store.photos_for_group(a.id).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_trip() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.add_photo(42, Path::new("/p.jpg")),
            Err(StoreError::UnknownTrip(42))
        ));
        assert!(matches!(store.settle(42), Err(StoreError::UnknownTrip(42))));
    }
}
