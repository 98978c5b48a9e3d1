pub mod answers;
pub mod questions;
pub mod reports;
pub mod stats;
