pub mod evaluation;
pub mod listings;
pub mod pipeline;
