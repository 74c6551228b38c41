//! Process exit codes for the `critique` binary.

use critique_core::CritiqueError;

pub const SUCCESS: i32 = 0;
/// The evaluation ran but failed (transport, malformed combined output).
pub const EVALUATION_FAILED: i32 = 1;
/// Configuration, credential or rubric problem; nothing was sent.
pub const CONFIG_ERROR: i32 = 2;
/// The essay itself was rejected (empty or whitespace only).
pub const INVALID_INPUT: i32 = 3;

pub fn for_error(err: &CritiqueError) -> i32 {
    match err {
        CritiqueError::Config { .. } => CONFIG_ERROR,
        CritiqueError::InvalidInput { .. } => INVALID_INPUT,
        _ => EVALUATION_FAILED,
    }
}
