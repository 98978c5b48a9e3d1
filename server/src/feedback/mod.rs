pub mod stats;
pub mod submit;
