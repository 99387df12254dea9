// Backend routes used by the skill workflow. Every path keeps its trailing slash.

use crate::models::{AssociationId, JobId};

pub const SKILLS: &str = "/skills/";
pub const ASSOCIATIONS: &str = "/jobs/skills/";

/// Query parameter understood by the registry's search endpoint.
pub const SEARCH_PARAM: &str = "search";

pub fn association(id: &AssociationId) -> String {
    format!("/jobs/skills/{id}/")
}

pub fn create_association(job_id: &JobId) -> String {
    format!("/jobs/skills/create/{job_id}/")
}

pub fn update_association(id: &AssociationId) -> String {
    format!("/jobs/skills/update/{id}/")
}

pub fn delete_association(id: &AssociationId) -> String {
    format!("/jobs/skills/delete/{id}/")
}
