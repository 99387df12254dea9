// Job-skill associations: the store that owns them, the controller that
// changes them, and the local form validation that runs first.

pub mod controller;
pub mod store;
pub mod validation;

pub use controller::{AssociationController, ConfirmGate, RemoveOutcome, SkillForm, SubmitError};
pub use store::{AssociationStore, OperationError, StoreSnapshot};
pub use validation::{validate, ValidationError};
