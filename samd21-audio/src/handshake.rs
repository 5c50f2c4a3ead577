//! Hardware handshake polling.
//!
//! The SAMD21 acknowledges generator and peripheral-channel writes through
//! status bits (`GCLK.STATUS.SYNCBUSY`, `CLKCTRL.CLKEN`) that must be polled
//! before the next write. By default the poll is unbounded, matching the
//! field-tested timing of the hardware. With the `bounded-handshake` feature
//! the poll gives up after `HANDSHAKE_POLL_LIMIT` attempts and reports
//! [`Error::Timeout`](crate::Error::Timeout).

use crate::error::Result;

/// Spin until `busy` reports `false`.
#[cfg(not(feature = "bounded-handshake"))]
pub(crate) fn wait_while(mut busy: impl FnMut() -> bool) -> Result<()> {
    while busy() {
        core::hint::spin_loop();
    }
    Ok(())
}

/// Spin until `busy` reports `false`, or fail after the poll limit.
#[cfg(feature = "bounded-handshake")]
pub(crate) fn wait_while(mut busy: impl FnMut() -> bool) -> Result<()> {
    use crate::constants::HANDSHAKE_POLL_LIMIT;
    use crate::error::Error;

    for _ in 0..HANDSHAKE_POLL_LIMIT {
        if !busy() {
            return Ok(());
        }
        core::hint::spin_loop();
    }
    warn!("hardware handshake timed out");
    Err(Error::Timeout)
}
