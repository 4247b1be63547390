pub mod change_tracker;
pub mod content_source;
pub mod history_store;

pub use change_tracker::{ChangeTracker, TrackerState};
pub use content_source::ContentSource;
pub use history_store::HistoryStore;
