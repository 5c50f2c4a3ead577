//! Error type shared by every foreground operation.

use core::fmt;

/// Errors returned by clock, DMA and driver operations.
///
/// Nothing in this enum is ever raised from interrupt context; completion
/// handlers resolve their failures through the drop and idle policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No free clock generator or DMA channel, or an explicit generator is
    /// already bound to a frequency.
    ResourceExhausted,
    /// Channel or generator index out of range, or an unsupported request.
    InvalidArgument,
    /// The peripheral is not attached to any generator.
    NotFound,
    /// A hardware handshake did not complete within the poll limit.
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::ResourceExhausted => "resource exhausted",
            Error::InvalidArgument => "invalid argument",
            Error::NotFound => "not found",
            Error::Timeout => "hardware handshake timed out",
        };
        f.write_str(msg)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
