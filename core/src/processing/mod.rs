pub mod aggregator;
pub mod cohort;
pub mod correlation;
pub mod solver;

pub use aggregator::Aggregator;
pub use cohort::{Cohort, CohortBuffer, COHORT_CAPACITY};
pub use correlation::{correlate, correlate_ns, CorrelationReject, NO_CORRELATION};
pub use solver::{Geometry, Solver};
