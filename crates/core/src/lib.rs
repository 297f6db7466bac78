pub mod config;
pub mod delta;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod validate;

pub use delta::{changed_entries, list_additions};
pub use domain::lead::{LeadId, LeadRecord, LeadStatus, SessionId};
pub use domain::snapshot::{CrmFieldMap, FieldSnapshot};
pub use domain::transcript::{Role, Transcript, Turn};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use extract::{parse_field_pairs, snapshot_from_model_text};
