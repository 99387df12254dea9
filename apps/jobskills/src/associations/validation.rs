use serde::{Deserialize, Serialize};

use crate::associations::controller::SkillForm;

pub const MAX_SKILL_NAME_LEN: usize = 100;

pub const SKILL_REQUIRED: &str = "Skill name is required";
pub const SKILL_TOO_LONG: &str = "Skill name must be 100 characters or less";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn skill(message: &str) -> Self {
        Self {
            field: "skill".to_string(),
            message: message.to_string(),
        }
    }
}

/// Checks a skill form before anything is sent. Pure and synchronous.
///
/// The experience level is a closed enum, so only the name needs checking here;
/// level values the backend rejects come back as field errors.
pub fn validate(form: &SkillForm) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let skill = form.skill.trim();

    if skill.is_empty() {
        errors.push(ValidationError::skill(SKILL_REQUIRED));
    } else if skill.chars().count() > MAX_SKILL_NAME_LEN {
        errors.push(ValidationError::skill(SKILL_TOO_LONG));
    }

    errors
}
