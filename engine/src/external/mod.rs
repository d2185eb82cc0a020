//! Collaborator boundaries consumed by the engine

pub mod history;

pub use history::{HistoricalStore, MemoryHistory};
