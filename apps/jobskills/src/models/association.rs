use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::ids::id_text;
use crate::models::{AssociationId, JobId};

/// Required proficiency for a skill on a job, ordered from lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 4] = [
        ExperienceLevel::Beginner,
        ExperienceLevel::Intermediate,
        ExperienceLevel::Advanced,
        ExperienceLevel::Expert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Advanced => "advanced",
            ExperienceLevel::Expert => "expert",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperienceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| {
                format!("unknown experience level '{s}' (expected beginner, intermediate, advanced or expert)")
            })
    }
}

/// A job-specific link to a master skill.
///
/// `skill` is the display name captured when the association was created; it is
/// not refreshed if the master skill is renamed later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSkillAssociation {
    pub id: AssociationId,
    pub job_id: JobId,
    pub skill: String,
    #[serde(default)]
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub is_required: bool,
}

/// Data for a new association, before the skill name is resolved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewAssociation {
    pub skill: String,
    pub is_required: bool,
    pub experience_level: ExperienceLevel,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AssociationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<ExperienceLevel>,
}

impl AssociationPatch {
    pub fn is_empty(&self) -> bool {
        self.skill.is_none() && self.is_required.is_none() && self.experience_level.is_none()
    }

    pub fn apply_to(&self, target: &mut JobSkillAssociation) {
        if let Some(skill) = &self.skill {
            target.skill = skill.clone();
        }
        if let Some(required) = self.is_required {
            target.is_required = required;
        }
        if let Some(level) = self.experience_level {
            target.experience_level = level;
        }
    }
}

/// Loosely-typed association record as the backend returns it.
///
/// The job may arrive as `job_id` or `job` (bare id or nested object) and the
/// skill as a name, a nested `{name}` object, or an id next to `skill_name`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssociationRecord {
    #[serde(default)]
    pub id: Option<AssociationId>,
    #[serde(default)]
    job_id: Option<Value>,
    #[serde(default)]
    job: Option<Value>,
    #[serde(default)]
    skill: Option<Value>,
    #[serde(default)]
    skill_name: Option<String>,
    #[serde(default)]
    pub experience_level: Option<ExperienceLevel>,
    #[serde(default)]
    pub is_required: Option<bool>,
}

impl AssociationRecord {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            // Some backends answer a mutation with nothing, or with the bare id.
            Value::Null => Ok(Self::default()),
            Value::String(_) | Value::Number(_) => Ok(Self {
                id: id_text(&value).map(AssociationId::from),
                ..Self::default()
            }),
            other => serde_json::from_value(other),
        }
    }

    /// Keeps only the id of a record whose other fields did not parse.
    pub fn id_only(value: &Value) -> Self {
        Self {
            id: value.get("id").and_then(id_text).map(AssociationId::from),
            ..Self::default()
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
            .as_ref()
            .and_then(id_text)
            .or_else(|| self.job.as_ref().and_then(id_text))
            .map(JobId::from)
    }

    pub fn skill_name(&self) -> Option<String> {
        match &self.skill {
            Some(Value::String(name)) if !name.trim().is_empty() => Some(name.clone()),
            Some(Value::Object(obj)) => obj
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| self.skill_name.clone()),
            _ => self.skill_name.clone(),
        }
    }

    /// Builds a full association. `None` when the id, job or skill name is missing.
    pub fn into_association(self) -> Option<JobSkillAssociation> {
        let job_id = self.job_id()?;
        let skill = self.skill_name()?;
        Some(JobSkillAssociation {
            id: self.id?,
            job_id,
            skill,
            experience_level: self.experience_level.unwrap_or_default(),
            is_required: self.is_required.unwrap_or(false),
        })
    }

    /// Overlays the fields this record actually carries onto `target`.
    /// The id and the display name are never taken from the response.
    pub fn overlay_onto(&self, target: &mut JobSkillAssociation) {
        if let Some(job_id) = self.job_id() {
            target.job_id = job_id;
        }
        if let Some(level) = self.experience_level {
            target.experience_level = level;
        }
        if let Some(required) = self.is_required {
            target.is_required = required;
        }
    }
}
