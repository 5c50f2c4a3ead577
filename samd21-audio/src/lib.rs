//! # samd21-audio
//!
//! A `no_std`, allocation-free audio I/O layer for the Microchip SAMD21
//! (Cortex-M0+): generic clock allocation, DMA channel management, DAC
//! playback and PDM microphone capture with fixed-point decimation.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Resources | [`clock`] | Generic clock generators shared by exact frequency match |
//! | Resources | [`dma`] | DMA channel pool, descriptors, completion dispatch |
//! | Capability | [`timer`] | Timer/counter operations used to pace playback |
//! | Stream | [`buffer`] / [`stream`] | Owned PCM buffers and the pull protocol |
//! | DSP | [`dsp`] | 64-tap sinc decimation of PDM bitstreams |
//! | I/O | [`io`] | `AudioOutputDriver` (DAC) and `AudioInputDriver` (PDM) |
//!
//! Register access sits behind small traits ([`clock::ClockHardware`],
//! [`dma::DmaHardware`], [`timer::TimerCounter`], [`io::PdmSerializer`]) so
//! the resource managers and drivers run unchanged on the host in tests.
//!
//! ## Execution contexts
//!
//! Configuration runs in the foreground before channels are armed. Once
//! streaming, the DMAC interrupt calls [`dma::DmaController::on_interrupt`],
//! which notifies each driver. Drivers keep their interrupt-shared state in
//! `critical_section::Mutex` cells, and PDM decimation is deferred to a
//! lower-priority context through [`io::DecimationScheduler`].
//!
//! ## Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `log` | no | Diagnostics through the `log` facade |
//! | `defmt` | no | Diagnostics through `defmt` |
//! | `bounded-handshake` | no | Hardware handshakes give up with [`Error::Timeout`] |
//!
//! ## Audio parameters
//!
//! - **Sample format:** `i16` mono
//! - **PCM buffer:** 256 samples ([`constants::PCM_BUFFER_SAMPLES`])
//! - **PDM decimation:** 64 bits per sample ([`constants::PDM_DECIMATION`])
//! - **DMA channels:** 4 ([`constants::DMA_CHANNEL_COUNT`])

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod constants;
pub mod error;
pub mod clock;
pub mod dma;
pub mod timer;
pub mod buffer;
pub mod stream;
pub mod dsp;
pub mod io;

mod handshake;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};
