//! Clock tree resource management.
//!
//! The SAMD21 routes its oscillators through nine generic clock generators
//! (GCLK0..=GCLK8). Each generator divides one oscillator and feeds any number
//! of peripheral channels through the peripheral clock multiplexer.
//! [`ClockManager`] tracks which generator runs at which frequency and which
//! peripherals hang off it, so drivers can ask for "a clock at N Hz" and share
//! generators whenever the frequencies agree.
//!
//! ```text
//!  OSC8M ──┐          ┌─────────┐   CLKCTRL mux   ┌─────────────┐
//!          ├─ SRC ──► │ GCLKn   │ ── ÷2^k ──────► │ peripheral  │
//!  DFLL48M─┘          └─────────┘                 │ channel id  │
//!                                                 └─────────────┘
//! ```
//!
//! Register access goes through the [`ClockHardware`] trait.

mod manager;

pub use manager::{ClockGenerator, ClockManager};

use crate::constants::{DFLL48M_FREQUENCY, OSC8M_FREQUENCY};

/// An oscillator a generator can divide down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// Internal 8 MHz RC oscillator.
    Osc8m,
    /// 48 MHz digital frequency-locked loop.
    Dfll48m,
}

impl ClockSource {
    /// Standard sources, slowest first.
    pub const STANDARD: [ClockSource; 2] = [ClockSource::Osc8m, ClockSource::Dfll48m];

    /// Undivided output frequency in Hz.
    pub const fn frequency(self) -> u32 {
        match self {
            ClockSource::Osc8m => OSC8M_FREQUENCY,
            ClockSource::Dfll48m => DFLL48M_FREQUENCY,
        }
    }

    /// The slowest standard source that can still reach `frequency`, or the
    /// fastest source when none can.
    pub fn for_frequency(frequency: u32) -> ClockSource {
        Self::STANDARD
            .iter()
            .copied()
            .find(|source| source.frequency() >= frequency)
            .unwrap_or(ClockSource::Dfll48m)
    }
}

/// Peripheral channel ids of the SAMD21 clock multiplexer (`CLKCTRL.ID`).
pub mod peripheral {
    /// DFLL48M reference input.
    pub const DFLL48M_REF: u8 = 0x00;
    /// TCC0 and TCC1.
    pub const TCC0_TCC1: u8 = 0x1A;
    /// TCC2 and TC3.
    pub const TCC2_TC3: u8 = 0x1B;
    /// TC4 and TC5.
    pub const TC4_TC5: u8 = 0x1C;
    /// Digital-to-analog converter.
    pub const DAC: u8 = 0x21;
    /// I2S clock unit 0.
    pub const I2S_0: u8 = 0x23;
    /// I2S clock unit 1.
    pub const I2S_1: u8 = 0x24;
}

/// Register-level access to the generic clock controller.
///
/// Implemented over the PAC on target and by mocks in tests. Every method is
/// a plain register write or read; sequencing and bookkeeping stay in
/// [`ClockManager`].
pub trait ClockHardware {
    /// Bring up OSC8M and the DFLL48M, and route GCLK0 (48 MHz) and
    /// GCLK1/GCLK2 (8 MHz).
    fn start_oscillators(&mut self);

    /// Program generator `id` to divide `source` by `2^division_shift`.
    fn program_generator(&mut self, id: u8, source: ClockSource, division_shift: u8);

    /// Clear `GENEN` for generator `id`.
    fn disable_generator(&mut self, id: u8);

    /// Whether the generator controller is still synchronising a write.
    fn generator_syncing(&self) -> bool;

    /// Clear `CLKEN` for the peripheral channel.
    fn disable_peripheral_channel(&mut self, peripheral: u8);

    /// Read back `CLKEN` for the peripheral channel.
    fn peripheral_channel_enabled(&self, peripheral: u8) -> bool;

    /// Select `generator` for the peripheral channel and set `CLKEN`.
    fn enable_peripheral_channel(&mut self, peripheral: u8, generator: u8);
}
