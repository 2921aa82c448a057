mod aggregates;
mod directory;
pub(crate) mod sessions;
