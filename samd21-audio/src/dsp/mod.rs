//! Fixed-point signal processing for the capture path.
//!
//! The PDM microphone delivers a 1-bit stream at 16x the PCM rate, packed
//! 16 bits per 32-bit DMA word. [`decimate_sample`] folds 64 consecutive
//! bits through a windowed-sinc low-pass kernel into one signed 16-bit
//! sample centred on zero:
//!
//! | Input | Output |
//! |-------|--------|
//! | all bits clear | `-CENTER_OFFSET` (-32 751) |
//! | all bits set | `+CENTER_OFFSET` (+32 751) |
//! | bitwise complement of `w` | `-decimate(w)` |
//!
//! Everything here is integer-only and allocation-free, so it can run in a
//! deferred task without touching the FPU.

mod sinc;

pub use sinc::{decimate_block, decimate_sample, CENTER_OFFSET, SINC_FILTER};
