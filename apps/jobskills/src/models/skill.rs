use serde::{Deserialize, Serialize};

use crate::models::SkillId;

/// Canonical, deduplicated skill shared by every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSkill {
    pub id: SkillId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl MasterSkill {
    /// Case-insensitive name equality, ignoring surrounding whitespace.
    pub fn matches_name(&self, name: &str) -> bool {
        normalize_name(&self.name) == normalize_name(name)
    }
}

/// Body of `POST /skills/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSkill {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl NewSkill {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            description: None,
            category: None,
        }
    }

    /// Fills the `"<name> skill"` description when none was supplied.
    pub fn with_default_description(mut self) -> Self {
        if self
            .description
            .as_deref()
            .map_or(true, |d| d.trim().is_empty())
        {
            self.description = Some(format!("{} skill", self.name));
        }
        self
    }
}

/// Key used for case-insensitive comparison and per-name locking.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
