// Review processing: column resolution, coercion, categorical mapping,
// deduplication, integrity reporting and validation

pub mod categorical;
pub mod coerce;
pub mod dedup;
pub mod enrich;
pub mod integrity;
pub mod loader;
pub mod resolve;
pub mod validation;

pub use loader::{LoadAccumulator, ReviewBatch, ReviewLoader};
pub use validation::{CombinedValidationReport, ValidationEngine, ValidationStatus};
