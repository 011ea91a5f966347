// Replenishment pipeline
pub mod consumption;
pub mod draft;
pub mod replenishment;
pub mod variance;

// Shared plumbing
pub mod clock;

pub use clock::{Clock, FixedClock, SystemClock};
pub use consumption::ConsumptionEngine;
pub use draft::{AvgSource, DraftGenerator};
pub use replenishment::ReplenishmentService;
pub use variance::VarianceTracker;
