pub mod id;
pub mod score;
