pub mod association;
pub mod ids;
pub mod skill;

pub use association::{
    AssociationPatch, AssociationRecord, ExperienceLevel, JobSkillAssociation, NewAssociation,
};
pub use ids::{AssociationId, JobId, SkillId};
pub use skill::{normalize_name, MasterSkill, NewSkill};
