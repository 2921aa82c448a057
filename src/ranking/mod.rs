mod board;
mod scope;
mod store;

pub use board::{Leaderboard, RankingItem};
pub use scope::{RankingScope, ScopeKind};
pub use store::{RankingEntry, RankingStore};
