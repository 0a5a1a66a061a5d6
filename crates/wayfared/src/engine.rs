use crate::config::Config;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use wayfare_core::resolver::ResolveAction;
use wayfare_core::thumbnail::{self, ThumbnailSpec};
use wayfare_core::{
    load_photo, Classification, DetectedFace, EncodingError, EncodingSource, Expense, FirstMatch,
    GroupId, GroupMember, LoadedPhoto, Matcher, MemberId, MergeSuggestion, PhotoId, Resolution,
    Settlement, SuggestionId, Trip, TripId, TripPhoto,
};
use wayfare_store::{GroupSummary, NewExpense, Store, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("unknown trip: {0}")]
    UnknownTrip(TripId),
    #[error("cannot start engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Per-photo outcome of an upload batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhotoReport {
    pub photo_id: Option<PhotoId>,
    pub path: PathBuf,
    pub faces_detected: usize,
    pub faces_skipped: usize,
    pub faces_assigned: usize,
    pub groups_created: usize,
    pub suggestions_created: usize,
    /// Set when processing stopped early; counts reflect what was stored.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub trip_id: TripId,
    pub photos: Vec<PhotoReport>,
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    CreateTrip { name: String, owner: String, reply: Reply<Trip> },
    DeleteTrip { trip_id: TripId, reply: Reply<bool> },
    Upload { trip_id: TripId, paths: Vec<PathBuf>, reply: Reply<UploadReport> },
    Groups { trip_id: TripId, reply: Reply<Vec<GroupSummary>> },
    RenameGroup { group_id: GroupId, name: String, reply: Reply<bool> },
    GroupPhotos { group_id: GroupId, reply: Reply<Vec<TripPhoto>> },
    Suggestions { trip_id: TripId, reply: Reply<Vec<MergeSuggestion>> },
    Resolve {
        suggestion_id: SuggestionId,
        actor: String,
        action: ResolveAction,
        reply: Reply<Resolution>,
    },
    AddMember {
        trip_id: TripId,
        name: String,
        contact: Option<String>,
        reply: Reply<GroupMember>,
    },
    RemoveMember { member_id: MemberId, reply: Reply<bool> },
    Members { trip_id: TripId, reply: Reply<Vec<GroupMember>> },
    AddExpense { expense: NewExpense, reply: Reply<Expense> },
    Expenses { trip_id: TripId, reply: Reply<Vec<Expense>> },
    Settle { trip_id: TripId, reply: Reply<Settlement> },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        request: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(request(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn create_trip(&self, name: String, owner: String) -> Result<Trip, EngineError> {
        self.call(|reply| EngineRequest::CreateTrip { name, owner, reply }).await
    }

    /// Delete a trip with its photos, groups, members, and expenses.
    pub async fn delete_trip(&self, trip_id: TripId) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::DeleteTrip { trip_id, reply }).await
    }

    /// Record and cluster a batch of photos, one after another.
    pub async fn upload(
        &self,
        trip_id: TripId,
        paths: Vec<PathBuf>,
    ) -> Result<UploadReport, EngineError> {
        self.call(|reply| EngineRequest::Upload { trip_id, paths, reply }).await
    }

    pub async fn groups(&self, trip_id: TripId) -> Result<Vec<GroupSummary>, EngineError> {
        self.call(|reply| EngineRequest::Groups { trip_id, reply }).await
    }

    pub async fn rename_group(&self, group_id: GroupId, name: String) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::RenameGroup { group_id, name, reply }).await
    }

    pub async fn photos_for_group(&self, group_id: GroupId) -> Result<Vec<TripPhoto>, EngineError> {
        self.call(|reply| EngineRequest::GroupPhotos { group_id, reply }).await
    }

    pub async fn suggestions(&self, trip_id: TripId) -> Result<Vec<MergeSuggestion>, EngineError> {
        self.call(|reply| EngineRequest::Suggestions { trip_id, reply }).await
    }

    pub async fn resolve(
        &self,
        suggestion_id: SuggestionId,
        actor: String,
        action: ResolveAction,
    ) -> Result<Resolution, EngineError> {
        self.call(|reply| EngineRequest::Resolve { suggestion_id, actor, action, reply })
            .await
    }

    pub async fn add_member(
        &self,
        trip_id: TripId,
        name: String,
        contact: Option<String>,
    ) -> Result<GroupMember, EngineError> {
        self.call(|reply| EngineRequest::AddMember { trip_id, name, contact, reply })
            .await
    }

    pub async fn remove_member(&self, member_id: MemberId) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::RemoveMember { member_id, reply }).await
    }

    pub async fn members(&self, trip_id: TripId) -> Result<Vec<GroupMember>, EngineError> {
        self.call(|reply| EngineRequest::Members { trip_id, reply }).await
    }

    pub async fn expenses(&self, trip_id: TripId) -> Result<Vec<Expense>, EngineError> {
        self.call(|reply| EngineRequest::Expenses { trip_id, reply }).await
    }

    pub async fn add_expense(&self, expense: NewExpense) -> Result<Expense, EngineError> {
        self.call(|reply| EngineRequest::AddExpense { expense, reply }).await
    }

    pub async fn settle(&self, trip_id: TripId) -> Result<Settlement, EngineError> {
        self.call(|reply| EngineRequest::Settle { trip_id, reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the database connection and the encoding source, so
/// every read-classify-create sequence for a trip runs without interleaving.
/// Fails fast at startup if the database cannot be opened.
pub fn spawn_engine(
    config: &Config,
    source: Box<dyn EncodingSource + Send>,
) -> Result<EngineHandle, EngineError> {
    let store = Store::open(&config.db_path)?;
    let mut engine = Engine::new(store, source, config);

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("wayfare-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// State owned by the engine thread.
pub struct Engine {
    store: Store,
    source: Box<dyn EncodingSource + Send>,
    matcher: FirstMatch,
    thumbnail: ThumbnailSpec,
    thumbnail_dir: PathBuf,
}

impl Engine {
    pub fn new(store: Store, source: Box<dyn EncodingSource + Send>, config: &Config) -> Self {
        Self {
            store,
            source,
            matcher: FirstMatch::new(config.thresholds),
            thumbnail: config.thumbnail,
            thumbnail_dir: config.thumbnail_dir.clone(),
        }
    }

    fn handle(&mut self, req: EngineRequest) {
        // A dropped receiver means the caller gave up; nothing to do.
        match req {
            EngineRequest::CreateTrip { name, owner, reply } => {
                let _ = reply.send(self.store.create_trip(&name, &owner).map_err(Into::into));
            }
            EngineRequest::DeleteTrip { trip_id, reply } => {
                let _ = reply.send(self.delete_trip(trip_id));
            }
            EngineRequest::Upload { trip_id, paths, reply } => {
                let _ = reply.send(self.upload(trip_id, &paths));
            }
            EngineRequest::Groups { trip_id, reply } => {
                let _ = reply.send(self.store.group_summaries(trip_id).map_err(Into::into));
            }
            EngineRequest::RenameGroup { group_id, name, reply } => {
                let _ = reply.send(self.store.rename_group(group_id, &name).map_err(Into::into));
            }
            EngineRequest::GroupPhotos { group_id, reply } => {
                let _ = reply.send(self.store.photos_for_group(group_id).map_err(Into::into));
            }
            EngineRequest::Suggestions { trip_id, reply } => {
                let _ = reply.send(self.store.active_suggestions(trip_id).map_err(Into::into));
            }
            EngineRequest::Resolve { suggestion_id, actor, action, reply } => {
                let _ = reply.send(self.resolve(suggestion_id, &actor, action));
            }
            EngineRequest::AddMember { trip_id, name, contact, reply } => {
                let result = self.store.add_member(trip_id, &name, contact.as_deref());
                let _ = reply.send(result.map_err(Into::into));
            }
            EngineRequest::RemoveMember { member_id, reply } => {
                let _ = reply.send(self.store.remove_member(member_id).map_err(Into::into));
            }
            EngineRequest::Members { trip_id, reply } => {
                let _ = reply.send(self.store.members(trip_id).map_err(Into::into));
            }
            EngineRequest::Expenses { trip_id, reply } => {
                let _ = reply.send(self.store.expenses(trip_id).map_err(Into::into));
            }
            EngineRequest::AddExpense { expense, reply } => {
                let _ = reply.send(self.store.add_expense(expense).map_err(Into::into));
            }
            EngineRequest::Settle { trip_id, reply } => {
                let _ = reply.send(self.store.settle(trip_id).map_err(Into::into));
            }
        }
    }

    /// Record each photo and cluster its faces.
    ///
    /// A photo that fails keeps whatever relations were stored before the
    /// failure; the batch moves on to the next photo.
    pub fn upload(
        &mut self,
        trip_id: TripId,
        paths: &[PathBuf],
    ) -> Result<UploadReport, EngineError> {
        if self.store.trip(trip_id)?.is_none() {
            return Err(EngineError::UnknownTrip(trip_id));
        }

        let mut photos = Vec::with_capacity(paths.len());
        for path in paths {
            let mut report = PhotoReport {
                path: path.clone(),
                ..Default::default()
            };

            let result = self
                .store
                .add_photo(trip_id, path)
                .map_err(EngineError::from)
                .and_then(|photo| {
                    report.photo_id = Some(photo.id);
                    self.process_photo(&photo, &mut report)
                });

            match result {
                Ok(()) => tracing::info!(
                    trip_id,
                    photo_id = report.photo_id,
                    faces = report.faces_assigned,
                    new_groups = report.groups_created,
                    suggestions = report.suggestions_created,
                    "photo clustered"
                ),
                Err(err) => {
                    tracing::warn!(
                        trip_id,
                        photo_id = report.photo_id,
                        path = %path.display(),
                        error = %err,
                        "face processing failed; continuing with next photo"
                    );
                    report.error = Some(err.to_string());
                }
            }
            photos.push(report);
        }

        Ok(UploadReport { trip_id, photos })
    }

    /// Assign every sufficiently large face in `photo` to a group of its trip.
    pub fn process_photo(
        &mut self,
        photo: &TripPhoto,
        report: &mut PhotoReport,
    ) -> Result<(), EngineError> {
        let loaded = load_photo(&photo.path)?;
        let faces = self.source.encode(&loaded)?;
        report.faces_detected = faces.len();

        // Read once per photo; groups created below are appended so later
        // faces in the same photo can match them.
        let mut groups = self.store.face_groups(photo.trip_id)?;
        let min_height = self.matcher.thresholds.min_face_height;

        for (index, face) in faces.iter().enumerate() {
            if face.bounds.height() < min_height {
                tracing::debug!(
                    photo_id = photo.id,
                    index,
                    height = face.bounds.height(),
                    "face below minimum height; skipped"
                );
                report.faces_skipped += 1;
                continue;
            }

            let group_id = match self.matcher.classify(&face.encoding, &groups) {
                Classification::Matched { index: g, distance } => {
                    tracing::debug!(
                        photo_id = photo.id,
                        index,
                        group_id = groups[g].id,
                        distance,
                        "face matched"
                    );
                    groups[g].id
                }
                Classification::New { maybe } => {
                    let thumbnail = self.write_thumbnail(&loaded, face, photo.id, index);
                    let group = match self.store.create_face_group(
                        photo.trip_id,
                        &face.encoding,
                        thumbnail.as_deref(),
                    ) {
                        Ok(group) => group,
                        Err(err) => {
                            remove_thumbnails(thumbnail);
                            return Err(err.into());
                        }
                    };
                    report.groups_created += 1;

                    for &candidate in &maybe {
                        let other = groups[candidate].id;
                        if self.store.suggest_merge(photo.trip_id, other, group.id)? {
                            report.suggestions_created += 1;
                        }
                    }
                    tracing::debug!(
                        photo_id = photo.id,
                        index,
                        group_id = group.id,
                        maybe = maybe.len(),
                        "new face group"
                    );

                    let id = group.id;
                    groups.push(group);
                    id
                }
            };

            self.store.add_relation(photo.id, group_id)?;
            report.faces_assigned += 1;
        }

        Ok(())
    }

    /// Delete a trip and the thumbnails of its face groups.
    pub fn delete_trip(&mut self, trip_id: TripId) -> Result<bool, EngineError> {
        let thumbnails: Vec<PathBuf> = self
            .store
            .face_groups(trip_id)?
            .into_iter()
            .filter_map(|g| g.thumbnail)
            .collect();
        let deleted = self.store.delete_trip(trip_id)?;
        if deleted {
            remove_thumbnails(thumbnails);
            tracing::info!(trip_id, "trip deleted");
        }
        Ok(deleted)
    }

    /// Apply a merge or dismiss request. A merged-away group takes its
    /// thumbnail file with it.
    pub fn resolve(
        &mut self,
        suggestion_id: SuggestionId,
        actor: &str,
        action: ResolveAction,
    ) -> Result<Resolution, EngineError> {
        let source = match self.store.suggestion(suggestion_id)? {
            Some(s) => self.store.face_group(s.source())?,
            None => None,
        };
        let outcome = self.store.resolve(suggestion_id, actor, action)?;
        if let (Resolution::Merged { removed, .. }, Some(group)) = (outcome, source) {
            if group.id == removed {
                remove_thumbnails(group.thumbnail);
            }
        }
        Ok(outcome)
    }

    /// Write the thumbnail for a new group. Failures are logged and the
    /// group is created without one.
    fn write_thumbnail(
        &self,
        photo: &LoadedPhoto,
        face: &DetectedFace,
        photo_id: PhotoId,
        index: usize,
    ) -> Option<PathBuf> {
        let stem = format!("face_{photo_id}_{index}");
        let written = thumbnail::save_face_thumbnail(
            &photo.pixels,
            &face.bounds,
            &self.thumbnail,
            &self.thumbnail_dir,
            &stem,
        );
        match written {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!(photo_id, index, error = %err, "face thumbnail not written");
                None
            }
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// Remove thumbnail files whose group no longer exists. Files already gone are ignored.
fn remove_thumbnails(paths: impl IntoIterator<Item = PathBuf>) {
    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "thumbnail removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "thumbnail not removed")
            }
        }
    }
}

/// Parse a list of photo arguments, dropping empty entries.
pub fn photo_paths<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<PathBuf> {
    raw.into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Path::new(p).to_path_buf())
        .collect()
}
