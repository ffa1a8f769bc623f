mod engine;
mod planner;
mod session;

pub use engine::{MultipartUploadEngine, ProgressCallback, ProgressSnapshot, UploadOptions, UploadOutcome};
pub use planner::{adaptive_part_size, total_parts};
pub use session::SessionState;
