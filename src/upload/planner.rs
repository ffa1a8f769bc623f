const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Picks a part size from the file's total size when the caller doesn't
/// supply one. Fixed for the lifetime of the session once chosen.
pub fn adaptive_part_size(file_size: u64) -> u64 {
    if file_size < GIB {
        10 * MIB
    } else if file_size < 10 * GIB {
        50 * MIB
    } else if file_size < 50 * GIB {
        100 * MIB
    } else {
        200 * MIB
    }
}

/// Total number of parts for a file of `file_size` bytes split into
/// `part_size`-byte chunks, `ceil(file_size / part_size)`. The part-number
/// space is `1..=total_parts`.
pub fn total_parts(file_size: u64, part_size: u64) -> u32 {
    if file_size == 0 {
        return 1;
    }
    (file_size.div_ceil(part_size)) as u32
}

/// Byte offset and length of part `part_number` (1-based) for a file of
/// `file_size` split into `part_size`-byte chunks.
pub fn part_range(part_number: u32, part_size: u64, file_size: u64) -> (u64, u64) {
    let offset = (part_number as u64 - 1) * part_size;
    let length = (file_size - offset).min(part_size);
    (offset, length)
}
