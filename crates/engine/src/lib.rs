//! Reconciliation between stored chat sessions and the CRM.
//!
//! - `crm` defines the CRM client boundary and the retrying writer that
//!   resolves unique-field conflicts by merging into the existing lead
//! - `reconcile` decides, per session, whether to create or update a lead
//! - `sweep` drives the two batch passes over candidate sessions

pub mod crm;
pub mod reconcile;
pub mod sweep;

pub use crm::{CrmClient, CrmError, CrmWriter, WriteResult};
pub use reconcile::{CreationOutcome, OnDemandOutcome, ReconcileEngine, UpdateOutcome};
pub use sweep::SweepReport;
