pub mod allocator;
pub mod clock;
pub mod cluster;
pub mod engine;
pub mod fencing;
pub mod graph;
pub mod membership;
pub mod utils;
