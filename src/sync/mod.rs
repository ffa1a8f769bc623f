mod coordinator;

pub use coordinator::{DirectorySyncCoordinator, SyncOutcome};
