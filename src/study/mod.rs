mod controller;
mod finalize;
pub(crate) mod liveness;
mod reaper;

pub use controller::{StudyController, TopicRef};
pub use finalize::{duration_minutes, Finalizer};
pub use liveness::LivenessTracker;
pub use reaper::{reaper_loop, Reaper, SweepReport};
