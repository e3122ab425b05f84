pub mod allocator;
pub mod candidate;
pub mod colocation;

pub use allocator::{Placement, allocate};
pub use candidate::{CandidateTable, candidate_table, ranked_nodes};
