pub mod achievements;
pub mod action;
pub mod calendar;
pub mod condition;
pub mod daily_tasks;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod levels;
pub mod notify;
pub mod special_tags;

pub use action::{ActionKind, Reward};
pub use calendar::Calendar;
pub use condition::{Condition, Metric};
pub use engine::{EmitOutcome, RewardEngine};
pub use error::{RewardError, RewardResult};
