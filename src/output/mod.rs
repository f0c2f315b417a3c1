//! Output file lifecycle
//!
//! Path generation, relocation of backend output into its final location,
//! completion verification, and retention sweeps over tracked files.

pub mod lifecycle;
pub mod retention;

pub use lifecycle::{FinalizeOutcome, OutputFileRecord, OutputManager, OutputStatus};
pub use retention::{RetentionPolicy, SweepReport};
