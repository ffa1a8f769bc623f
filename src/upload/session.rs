use std::collections::HashMap;

use crate::objectstore::PartInfo;

use super::planner::part_range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Planned,
    Open,
    Uploading,
    Retrying,
    Completing,
    Verified,
    Aborted,
}

/// An in-flight or discovered multipart session: upload-id plus whichever
/// parts are already known to be present on the server.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub existing_parts: HashMap<i32, String>,
    pub state: SessionState,
}

impl UploadSession {
    pub fn fresh(upload_id: String) -> Self {
        Self {
            upload_id,
            existing_parts: HashMap::new(),
            state: SessionState::Open,
        }
    }

    pub fn resumed(upload_id: String, existing_parts: HashMap<i32, String>) -> Self {
        Self {
            upload_id,
            existing_parts,
            state: SessionState::Uploading,
        }
    }
}

/// Two keys normalize to the same S3 object: with and without a leading
/// slash. The server may report either depending on how the session was
/// created.
pub fn keys_match(candidate: &str, key: &str) -> bool {
    candidate.trim_start_matches('/') == key.trim_start_matches('/')
}

/// Verifies that a discovered session's already-uploaded parts are
/// consistent with uploading `file_size` bytes using `part_size`-byte parts.
/// Content hashes aren't available; part-size is the only cheap fingerprint
/// the protocol exposes.
pub fn is_compatible(parts: &[PartInfo], part_size: u64, file_size: u64) -> bool {
    let total = super::planner::total_parts(file_size, part_size);

    for part in parts {
        if part.part_number < 1 || part.part_number as u32 > total {
            return false;
        }
        let (_, expected_length) = part_range(part.part_number as u32, part_size, file_size);
        if part.size != expected_length {
            return false;
        }
    }
    true
}
