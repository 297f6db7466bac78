pub mod lead;
pub mod snapshot;
pub mod transcript;
