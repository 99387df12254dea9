//! Skill resolution and job-skill association client for the job marketplace API.
//!
//! `Session` wires the pieces together: an `ApiTransport`, the `SkillResolver`
//! that deduplicates free-text skill names against the master registry, the
//! `AssociationStore` holding every job↔skill link loaded in the session, and
//! the `AssociationController` that validates and dispatches changes.

pub mod api_client;
pub mod associations;
pub mod config;
pub mod errors;
pub mod models;
pub mod skills;
pub mod state;

#[cfg(test)]
mod testing;

pub use state::Session;
