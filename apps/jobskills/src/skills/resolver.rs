//! Skill Registry Resolver: maps a free-text skill name onto exactly one
//! canonical `MasterSkill`, creating it on first use.
//!
//! Lookup order:
//! 1. `GET /skills/?search=<name>`; on any failure fall back to `GET /skills/`
//!    and filter locally (a 404/405 means the search route does not exist).
//! 2. Case-insensitive exact name match → return the existing entry.
//! 3. Otherwise `POST /skills/` with a `"<name> skill"` description fallback.
//!
//! Concurrent resolution of the same name: calls are serialized per normalized
//! name inside this process, so two callers in one session never both create.
//! Across processes the registry's uniqueness constraint decides; a create that
//! is rejected as a duplicate is answered by re-querying and returning the
//! entry that won.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api_client::{endpoints, unwrap_envelope, unwrap_list, ApiTransport};
use crate::errors::ApiError;
use crate::models::{normalize_name, MasterSkill, NewSkill, SkillId};

/// Per-name lock plus the number of callers currently holding a lease on it.
struct NameSlot {
    lock: Arc<Mutex<()>>,
    users: usize,
}

type NameLocks = Arc<std::sync::Mutex<HashMap<String, NameSlot>>>;

#[derive(Clone)]
pub struct SkillResolver {
    api: Arc<dyn ApiTransport>,
    locks: NameLocks,
}

/// A caller's claim on one name's lock. The map entry goes away when the last
/// lease drops, including when the resolving future is cancelled mid-request.
struct NameLease {
    key: String,
    lock: Arc<Mutex<()>>,
    locks: NameLocks,
}

impl Drop for NameLease {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = locks.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}

/// Create responses are read leniently: only the id is mandatory.
#[derive(Debug, Deserialize)]
struct CreatedSkill {
    id: SkillId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

impl SkillResolver {
    pub fn new(api: Arc<dyn ApiTransport>) -> Self {
        Self {
            api,
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Find-or-create by name.
    pub async fn resolve(&self, name: &str) -> Result<MasterSkill, ApiError> {
        self.resolve_with(NewSkill::named(name)).await
    }

    /// Find-or-create with explicit metadata. Description and category are only
    /// used when the skill has to be created.
    pub async fn resolve_with(&self, skill: NewSkill) -> Result<MasterSkill, ApiError> {
        if skill.name.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "skill name must not be blank".to_string(),
            ));
        }

        let lease = self.lease(normalize_name(&skill.name));
        let _held = lease.lock.lock().await;
        self.find_or_create(skill).await
    }

    /// Case-insensitive exact lookup without creating anything.
    pub async fn find(&self, name: &str) -> Result<Option<MasterSkill>, ApiError> {
        let candidates = self.search(name).await?;
        Ok(candidates.into_iter().find(|s| s.matches_name(name)))
    }

    /// Full registry listing.
    pub async fn list(&self) -> Result<Vec<MasterSkill>, ApiError> {
        let body = self.api.get(endpoints::SKILLS).await?;
        parse_skills(body)
    }

    async fn find_or_create(&self, skill: NewSkill) -> Result<MasterSkill, ApiError> {
        if let Some(existing) = self.find(&skill.name).await? {
            debug!("Skill '{}' resolved to existing id {}", skill.name, existing.id);
            return Ok(existing);
        }

        let skill = skill.with_default_description();
        match self.create(&skill).await {
            Ok(created) => {
                info!("Created master skill '{}' ({})", created.name, created.id);
                Ok(created)
            }
            Err(err) if is_duplicate_rejection(&err) => {
                warn!(
                    "Registry rejected '{}' as a duplicate, re-querying: {}",
                    skill.name, err
                );
                match self.find(&skill.name).await {
                    Ok(Some(existing)) => Ok(existing),
                    _ => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn search(&self, name: &str) -> Result<Vec<MasterSkill>, ApiError> {
        let query = name.trim();
        match self
            .api
            .get_with_query(endpoints::SKILLS, endpoints::SEARCH_PARAM, query)
            .await
            .and_then(parse_skills)
        {
            Ok(found) => Ok(found),
            Err(err) if err.is_endpoint_absent() => {
                debug!("Skill search unavailable ({err}), listing full registry");
                self.list().await
            }
            Err(err) => {
                warn!("Skill search failed ({err}), listing full registry");
                self.list().await
            }
        }
    }

    async fn create(&self, skill: &NewSkill) -> Result<MasterSkill, ApiError> {
        let body = serde_json::to_value(skill)?;
        let response = self.api.post(endpoints::SKILLS, body).await?;
        let created: CreatedSkill = serde_json::from_value(unwrap_envelope(response))?;
        Ok(MasterSkill {
            id: created.id,
            name: created.name.unwrap_or_else(|| skill.name.clone()),
            description: created.description.or_else(|| skill.description.clone()),
            category: created.category.or_else(|| skill.category.clone()),
        })
    }

    fn lease(&self, key: String) -> NameLease {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = locks.entry(key.clone()).or_insert_with(|| NameSlot {
            lock: Arc::new(Mutex::new(())),
            users: 0,
        });
        slot.users += 1;
        NameLease {
            key,
            lock: slot.lock.clone(),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 409, or a 400/422 whose field errors point at `name`.
fn is_duplicate_rejection(err: &ApiError) -> bool {
    match err.status() {
        Some(409) => true,
        Some(400) | Some(422) => err
            .field_errors()
            .map_or(false, |fields| fields.contains_key("name")),
        _ => false,
    }
}

fn parse_skills(body: Value) -> Result<Vec<MasterSkill>, ApiError> {
    let skills = unwrap_list(body)?
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<MasterSkill>(item) {
            Ok(skill) => Some(skill),
            Err(e) => {
                warn!("Skipping malformed registry entry: {e}");
                None
            }
        })
        .collect();
    Ok(skills)
}
