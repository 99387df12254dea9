//! Association Workflow Controller: the only entry point the presentation
//! layer uses to change associations.
//!
//! The controller owns no data. It validates, rejects a skill that is already
//! on the job, dispatches to the injected store, and resets the caller's form
//! only when the operation succeeded.

use thiserror::Error;
use tracing::{info, warn};

use crate::associations::store::AssociationStore;
use crate::associations::validation::{validate, ValidationError};
use crate::errors::ApiError;
use crate::models::{
    normalize_name, AssociationId, AssociationPatch, ExperienceLevel, JobId, JobSkillAssociation,
    NewAssociation,
};

/// Editable form state. Owned by the caller; the controller only reads it and
/// resets it after a successful submit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SkillForm {
    pub skill: String,
    pub is_required: bool,
    pub experience_level: ExperienceLevel,
}

impl SkillForm {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl From<&JobSkillAssociation> for SkillForm {
    fn from(assoc: &JobSkillAssociation) -> Self {
        Self {
            skill: assoc.skill.clone(),
            is_required: assoc.is_required,
            experience_level: assoc.experience_level,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{}", summarize(.0))]
    Invalid(Vec<ValidationError>),

    #[error("Skill '{0}' is already added to this job")]
    Duplicate(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Asked before an association is deleted. `target` is `None` when the id is
/// not in the loaded collection.
pub trait ConfirmGate {
    fn confirm(&self, id: &AssociationId, target: Option<&JobSkillAssociation>) -> bool;
}

impl<F> ConfirmGate for F
where
    F: Fn(&AssociationId, Option<&JobSkillAssociation>) -> bool,
{
    fn confirm(&self, id: &AssociationId, target: Option<&JobSkillAssociation>) -> bool {
        self(id, target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Cancelled,
}

#[derive(Clone)]
pub struct AssociationController {
    store: AssociationStore,
}

impl AssociationController {
    pub fn new(store: AssociationStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &AssociationStore {
        &self.store
    }

    /// Creates (no `editing`) or updates (`editing = Some(id)`) an association
    /// from the form, then refreshes the whole collection.
    ///
    /// Messages left by the previous action are cleared first. Local validation
    /// failures never touch the network. On any failure the form is left as it
    /// was so the user can correct and resubmit.
    pub async fn submit(
        &self,
        job_id: &JobId,
        form: &mut SkillForm,
        editing: Option<&AssociationId>,
    ) -> Result<JobSkillAssociation, SubmitError> {
        self.store.clear_messages().await;
        let errors = validate(form);
        if !errors.is_empty() {
            return Err(SubmitError::Invalid(errors));
        }

        let skill = form.skill.trim().to_string();
        let snapshot = self.store.snapshot().await;
        let key = normalize_name(&skill);
        let duplicate = snapshot
            .for_job(job_id)
            .into_iter()
            .any(|a| Some(&a.id) != editing && normalize_name(&a.skill) == key);
        if duplicate {
            return Err(SubmitError::Duplicate(skill));
        }

        let saved = match editing {
            None => {
                let data = NewAssociation {
                    skill,
                    is_required: form.is_required,
                    experience_level: form.experience_level,
                };
                self.store.create(job_id, &data).await?
            }
            Some(id) => {
                // Only re-resolve the skill when its name actually changed.
                let unchanged = snapshot.get(id).map_or(false, |current| current.skill == skill);
                let patch = AssociationPatch {
                    skill: (!unchanged).then_some(skill),
                    is_required: Some(form.is_required),
                    experience_level: Some(form.experience_level),
                };
                self.store.update(id, &patch).await?
            }
        };

        form.reset();
        if let Err(err) = self.store.fetch_all().await {
            warn!("Refresh after saving association {} failed: {err}", saved.id);
        }
        Ok(saved)
    }

    /// Form snapshot for editing `id`; `None` if the id is not loaded.
    pub async fn edit(&self, id: &AssociationId) -> Option<SkillForm> {
        self.store.get(id).await.as_ref().map(SkillForm::from)
    }

    /// Deletes `id` once `gate` agrees.
    pub async fn remove(
        &self,
        id: &AssociationId,
        gate: &impl ConfirmGate,
    ) -> Result<RemoveOutcome, ApiError> {
        self.store.clear_messages().await;
        let target = self.store.get(id).await;
        if !gate.confirm(id, target.as_ref()) {
            info!("Removal of association {id} cancelled");
            return Ok(RemoveOutcome::Cancelled);
        }
        self.store.delete(id).await?;
        Ok(RemoveOutcome::Removed)
    }
}
