//! Pull-based stream contract between audio stages.
//!
//! A [`DataSource`] hands out [`AudioBuffer`]s on demand. When it has data
//! ready it tells its connected [`DataSink`] via
//! [`pull_request`](DataSink::pull_request), and the sink calls back into
//! [`pull`](DataSource::pull) when it can take the buffer.
//!
//! ```text
//!  source                          sink
//!    │ ── pull_request() ─────────►  │
//!    │ ◄──────────────── pull() ──── │
//!    │ ── AudioBuffer ────────────►  │
//! ```
//!
//! Both sides may be driven from interrupt context, so both traits require
//! `Sync` and take `&self`.

use crate::buffer::AudioBuffer;
use crate::error::Result;

/// Produces audio buffers.
pub trait DataSource<'a>: Sync {
    /// The next buffer, or a zero-length buffer when nothing is available.
    fn pull(&self) -> AudioBuffer;

    /// Bind the sink to notify when data becomes available.
    fn connect(&self, sink: &'a dyn DataSink);
}

/// Consumes audio buffers.
pub trait DataSink: Sync {
    /// New data is available upstream.
    fn pull_request(&self) -> Result<()>;
}
