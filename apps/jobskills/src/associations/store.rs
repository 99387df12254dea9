//! Job-Skill Association Store: the single in-memory source of truth for
//! job↔skill associations in a session.
//!
//! Every operation runs `pending → fulfilled | rejected`. The state lock is
//! only taken for the transitions themselves, never across a network call, so
//! completions are applied one at a time in the order the network returns
//! them. The collection is eventually consistent with the backend, not a log.
//!
//! Per-job views are derived with `for_job`; nothing else keeps its own copy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::api_client::{endpoints, unwrap_envelope, unwrap_list, ApiTransport};
use crate::errors::{ApiError, FieldErrors};
use crate::models::{
    AssociationId, AssociationPatch, AssociationRecord, JobId, JobSkillAssociation, NewAssociation,
};
use crate::skills::SkillResolver;

pub const MSG_CREATED: &str = "Skill added successfully";
pub const MSG_UPDATED: &str = "Skill updated successfully";
pub const MSG_DELETED: &str = "Skill removed successfully";

/// Error recorded by the last rejected operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationError {
    /// Transport or generic API failure.
    Message(String),
    /// Per-field validation errors from the backend, kept apart from any
    /// generic message so each field can be shown on its own.
    Fields(FieldErrors),
}

impl OperationError {
    pub fn message(&self) -> String {
        match self {
            OperationError::Message(msg) => msg.clone(),
            OperationError::Fields(fields) => fields
                .iter()
                .map(|(field, msgs)| format!("{field}: {}", msgs.join(" ")))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

impl From<&ApiError> for OperationError {
    fn from(err: &ApiError) -> Self {
        match err.field_errors() {
            Some(fields) => OperationError::Fields(fields.clone()),
            None => OperationError::Message(err.user_message()),
        }
    }
}

/// Observable store state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub associations: Vec<JobSkillAssociation>,
    pub loading: bool,
    pub error: Option<OperationError>,
    pub success_message: Option<String>,
}

impl StoreSnapshot {
    /// Associations of one job, in insertion order.
    pub fn for_job(&self, job_id: &JobId) -> Vec<&JobSkillAssociation> {
        self.associations
            .iter()
            .filter(|a| &a.job_id == job_id)
            .collect()
    }

    pub fn get(&self, id: &AssociationId) -> Option<&JobSkillAssociation> {
        self.associations.iter().find(|a| &a.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    FetchAll,
    Refresh,
    Create,
    Update,
    Delete,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::FetchAll => "fetch_all",
            Operation::Refresh => "refresh",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    fn clears_success(self) -> bool {
        matches!(self, Operation::Create | Operation::Update)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    associations: Vec<JobSkillAssociation>,
    error: Option<OperationError>,
    success_message: Option<String>,
}

/// One pending operation. The in-flight count drops with the guard, so an
/// operation whose future is dropped mid-request does not leave `loading` set.
struct Pending {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct AssociationStore {
    api: Arc<dyn ApiTransport>,
    resolver: SkillResolver,
    state: Arc<RwLock<StoreState>>,
    in_flight: Arc<AtomicUsize>,
}

impl AssociationStore {
    pub fn new(api: Arc<dyn ApiTransport>, resolver: SkillResolver) -> Self {
        Self {
            api,
            resolver,
            state: Arc::new(RwLock::new(StoreState::default())),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        StoreSnapshot {
            associations: state.associations.clone(),
            loading: self.in_flight.load(Ordering::SeqCst) > 0,
            error: state.error.clone(),
            success_message: state.success_message.clone(),
        }
    }

    pub async fn for_job(&self, job_id: &JobId) -> Vec<JobSkillAssociation> {
        let state = self.state.read().await;
        state
            .associations
            .iter()
            .filter(|a| &a.job_id == job_id)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &AssociationId) -> Option<JobSkillAssociation> {
        let state = self.state.read().await;
        state.associations.iter().find(|a| &a.id == id).cloned()
    }

    pub async fn clear_messages(&self) {
        let mut state = self.state.write().await;
        state.error = None;
        state.success_message = None;
    }

    /// Replaces the whole collection with the server listing.
    /// On failure the previously loaded list stays visible.
    pub async fn fetch_all(&self) -> Result<(), ApiError> {
        let pending = self.begin(Operation::FetchAll).await;
        match self.request_all().await {
            Ok(associations) => {
                info!("Loaded {} job skill associations", associations.len());
                self.fulfil(pending, |state| state.associations = associations)
                    .await;
                Ok(())
            }
            Err(err) => Err(self.reject(pending, Operation::FetchAll, err).await),
        }
    }

    /// Resolves `data.skill` against the registry and creates the association.
    ///
    /// The stored record always carries the requested `job_id` and the caller's
    /// display name, whatever the backend echoes for those two fields.
    pub async fn create(
        &self,
        job_id: &JobId,
        data: &NewAssociation,
    ) -> Result<JobSkillAssociation, ApiError> {
        let pending = self.begin(Operation::Create).await;
        match self.request_create(job_id, data).await {
            Ok(created) => {
                info!(
                    "Added skill '{}' to job {} ({})",
                    created.skill, created.job_id, created.id
                );
                let stored = created.clone();
                self.fulfil(pending, |state| {
                    upsert(&mut state.associations, stored);
                    state.success_message = Some(MSG_CREATED.to_string());
                })
                .await;
                Ok(created)
            }
            Err(err) => Err(self.reject(pending, Operation::Create, err).await),
        }
    }

    /// Partial update. Fields in `patch` win over whatever the response carries;
    /// fields absent from both keep their previous values.
    pub async fn update(
        &self,
        id: &AssociationId,
        patch: &AssociationPatch,
    ) -> Result<JobSkillAssociation, ApiError> {
        let pending = self.begin(Operation::Update).await;
        let record = match self.request_update(id, patch).await {
            Ok(record) => record,
            Err(err) => return Err(self.reject(pending, Operation::Update, err).await),
        };

        let target_id = record.id.clone().unwrap_or_else(|| id.clone());
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let merged = match state.associations.iter().position(|a| a.id == target_id) {
            Some(idx) => {
                let existing = &mut state.associations[idx];
                record.overlay_onto(existing);
                patch.apply_to(existing);
                Some(existing.clone())
            }
            None => record.into_association().map(|mut fresh| {
                patch.apply_to(&mut fresh);
                state.associations.push(fresh.clone());
                fresh
            }),
        };

        match merged {
            Some(updated) => {
                state.success_message = Some(MSG_UPDATED.to_string());
                debug!("Updated association {}", updated.id);
                Ok(updated)
            }
            None => {
                let err = ApiError::UnexpectedResponse(format!(
                    "association {target_id} is not loaded and the response is incomplete"
                ));
                warn!("update failed: {err}");
                state.error = Some(OperationError::from(&err));
                Err(err)
            }
        }
    }

    /// Removes an association. A 404 means it is already gone and counts as
    /// success, so deleting twice is safe.
    pub async fn delete(&self, id: &AssociationId) -> Result<(), ApiError> {
        let pending = self.begin(Operation::Delete).await;
        match self.api.delete(&endpoints::delete_association(id)).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                debug!("Association {id} already deleted on the server");
            }
            Err(err) => return Err(self.reject(pending, Operation::Delete, err).await),
        }

        info!("Removed association {id}");
        let id = id.clone();
        self.fulfil(pending, |state| {
            state.associations.retain(|a| a.id != id);
            state.success_message = Some(MSG_DELETED.to_string());
        })
        .await;
        Ok(())
    }

    /// Re-reads one association. Returns `None` (and drops the local copy) when
    /// the server answers 404. A record that is not loaded locally is added only
    /// if the response is complete; otherwise the call fails with
    /// `UnexpectedResponse`.
    pub async fn refresh(
        &self,
        id: &AssociationId,
    ) -> Result<Option<JobSkillAssociation>, ApiError> {
        let pending = self.begin(Operation::Refresh).await;
        let body = match self.api.get(&endpoints::association(id)).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => {
                let id = id.clone();
                self.fulfil(pending, |state| state.associations.retain(|a| a.id != id))
                    .await;
                return Ok(None);
            }
            Err(err) => return Err(self.reject(pending, Operation::Refresh, err).await),
        };

        let record = match AssociationRecord::from_value(unwrap_envelope(body)) {
            Ok(record) => record,
            Err(err) => return Err(self.reject(pending, Operation::Refresh, err.into()).await),
        };

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let refreshed = match state.associations.iter().position(|a| &a.id == id) {
            Some(idx) => {
                let existing = &mut state.associations[idx];
                record.overlay_onto(existing);
                Some(existing.clone())
            }
            None => record.into_association().map(|fresh| {
                state.associations.push(fresh.clone());
                fresh
            }),
        };

        match refreshed {
            Some(refreshed) => Ok(Some(refreshed)),
            None => {
                let err = ApiError::UnexpectedResponse(format!(
                    "association {id} is not loaded and the response is incomplete"
                ));
                warn!("refresh failed: {err}");
                state.error = Some(OperationError::from(&err));
                Err(err)
            }
        }
    }

    async fn request_all(&self) -> Result<Vec<JobSkillAssociation>, ApiError> {
        let body = self.api.get(endpoints::ASSOCIATIONS).await?;
        let associations = unwrap_list(body)?
            .into_iter()
            .filter_map(parse_listed)
            .collect();
        Ok(associations)
    }

    async fn request_create(
        &self,
        job_id: &JobId,
        data: &NewAssociation,
    ) -> Result<JobSkillAssociation, ApiError> {
        let skill = self.resolver.resolve(&data.skill).await?;
        let body = serde_json::json!({
            "skill_id": skill.id,
            "is_required": data.is_required,
            "experience_level": data.experience_level,
        });
        let response = self
            .api
            .post(&endpoints::create_association(job_id), body)
            .await?;

        // Only the id is needed from the echo; the rest falls back to `data`.
        let response = unwrap_envelope(response);
        let record = AssociationRecord::from_value(response.clone()).unwrap_or_else(|e| {
            warn!("Create response for job {job_id} is partly unreadable ({e}), keeping submitted values");
            AssociationRecord::id_only(&response)
        });
        let id = record.id.clone().ok_or_else(|| {
            ApiError::UnexpectedResponse("created association has no id".to_string())
        })?;
        Ok(JobSkillAssociation {
            id,
            job_id: job_id.clone(),
            skill: data.skill.clone(),
            experience_level: record.experience_level.unwrap_or(data.experience_level),
            is_required: record.is_required.unwrap_or(data.is_required),
        })
    }

    async fn request_update(
        &self,
        id: &AssociationId,
        patch: &AssociationPatch,
    ) -> Result<AssociationRecord, ApiError> {
        let mut body = serde_json::to_value(patch)?;
        if let Some(name) = &patch.skill {
            let skill = self.resolver.resolve(name).await?;
            if let Value::Object(obj) = &mut body {
                obj.insert("skill_id".to_string(), serde_json::to_value(&skill.id)?);
            }
        }
        let response = self
            .api
            .put(&endpoints::update_association(id), body)
            .await?;
        Ok(AssociationRecord::from_value(unwrap_envelope(response))?)
    }

    async fn begin(&self, op: Operation) -> Pending {
        let mut state = self.state.write().await;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        state.error = None;
        if op.clears_success() {
            state.success_message = None;
        }
        debug!("{} pending", op.label());
        Pending {
            in_flight: self.in_flight.clone(),
        }
    }

    async fn fulfil(&self, pending: Pending, apply: impl FnOnce(&mut StoreState)) {
        let mut state = self.state.write().await;
        apply(&mut state);
        drop(pending);
    }

    async fn reject(&self, pending: Pending, op: Operation, err: ApiError) -> ApiError {
        warn!("{} failed: {}", op.label(), err);
        let mut state = self.state.write().await;
        state.error = Some(OperationError::from(&err));
        drop(pending);
        err
    }
}

/// Replaces the element with the same id in place, or appends.
fn upsert(associations: &mut Vec<JobSkillAssociation>, record: JobSkillAssociation) {
    match associations.iter_mut().find(|a| a.id == record.id) {
        Some(existing) => *existing = record,
        None => associations.push(record),
    }
}

fn parse_listed(item: Value) -> Option<JobSkillAssociation> {
    let record = match AssociationRecord::from_value(item) {
        Ok(record) => record,
        Err(e) => {
            warn!("Skipping malformed association: {e}");
            return None;
        }
    };
    if record.job_id().is_none() {
        error!(
            "Dropping association {:?} with no job reference",
            record.id.as_ref().map(AssociationId::as_str)
        );
        return None;
    }
    let id = record.id.clone();
    let parsed = record.into_association();
    if parsed.is_none() {
        warn!("Skipping incomplete association {:?}", id.as_ref().map(AssociationId::as_str));
    }
    parsed
}
