pub mod aggregate;
pub mod directory;
pub mod session;

pub use aggregate::{DailyTotal, TopicTotal};
pub use directory::{BasicProfile, FriendStatus};
pub use session::{
    FinalizeOutcome, InsertOutcome, SessionFilter, SessionKind, SessionPage, StudySession,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
