pub mod detection;
pub mod record;

pub use detection::Detection;
pub use record::{RateSummary, Ranking, Record};
