//! Exit code constants for the wopilock CLI.
//!
//! Each WOPI outcome class gets its own code so scripts can tell a lock
//! conflict from a missing file without parsing output:
//! - 0: Success
//! - 1: User error (bad args, invalid config, storage failure)
//! - 2: Bad request (missing or empty protocol header)
//! - 3: Not found (unknown file id, document or blob)
//! - 4: Lock conflict
//! - 5: Unsupported request shape
//! - 6: Precondition failed (payload too large)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or storage failure.
pub const USER_ERROR: i32 = 1;

/// A required protocol header was missing or empty.
pub const BAD_REQUEST: i32 = 2;

/// The file id, its document, or its blob does not exist.
pub const NOT_FOUND: i32 = 3;

/// Lock mismatch, permission denied, or natively locked document.
pub const LOCK_CONFLICT: i32 = 4;

/// The request shape is not supported.
pub const UNSUPPORTED: i32 = 5;

/// The payload exceeds a size limit.
pub const PRECONDITION_FAILED: i32 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            BAD_REQUEST,
            NOT_FOUND,
            LOCK_CONFLICT,
            UNSUPPORTED,
            PRECONDITION_FAILED,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn exit_codes_fit_in_a_byte() {
        for code in [SUCCESS, LOCK_CONFLICT, PRECONDITION_FAILED] {
            assert!((0..=255).contains(&code));
        }
    }
}
