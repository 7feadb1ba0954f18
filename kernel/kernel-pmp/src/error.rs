//! Error taxonomy for `kernel-pmp`, per §7.

/// Failure of [`crate::compiler::compile`]. Running out of descriptor slots
/// is recoverable: the caller simply keeps running the process's previous
/// `PmpCtx`.
#[derive(Debug, thiserror::Error)]
pub enum PmpError {
    #[error("region list requires more than the available PMP descriptor slots")]
    OutOfSlots,
}
