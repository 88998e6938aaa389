pub mod condition;
pub mod demographics;
pub mod likert;
pub mod result;

pub use condition::Condition;
pub use demographics::{CaffeineTime, DemographicData, MediaFrequency};
pub use likert::{LikertSchema, Ratings, SchemaColumn, SchemaVersion};
pub(crate) use likert::round2;
pub use result::{ConditionResult, ResultPayload, ResultSummary};
