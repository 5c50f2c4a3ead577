//! Timer/counter capability.
//!
//! The SAMD21 has two timer families: the plain 16-bit TC counters and the
//! compare/capture TCC units. Drivers only need a small capability from
//! either (start, stop, period, prescaler, wave mode), described by
//! [`TimerCounter`]. Register-level implementations live with the board
//! support code.
//!
//! Which family paces a driver is known when the board is wired up, so the
//! choice is a tagged [`Timer`] value rather than a trait object.

use crate::error::Result;

/// Counter clock prescaler (`CTRLA.PRESCALER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    Div1 = 0,
    Div2 = 1,
    Div4 = 2,
    Div8 = 3,
    Div16 = 4,
    Div64 = 5,
    Div256 = 6,
    Div1024 = 7,
}

impl Prescaler {
    /// Division factor applied to the timer's input clock.
    pub const fn divisor(self) -> u32 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div2 => 2,
            Prescaler::Div4 => 4,
            Prescaler::Div8 => 8,
            Prescaler::Div16 => 16,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }
}

/// Waveform generation mode (`CTRLA.WAVEGEN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaveMode {
    /// Counter wraps at the top value.
    NormalFrequency = 0,
    /// Counter wraps at compare channel 0, giving a programmable period.
    MatchFrequency = 1,
    NormalPwm = 2,
    MatchPwm = 3,
}

/// The operations a driver needs from a hardware timer.
pub trait TimerCounter {
    fn enable(&mut self) -> Result<()>;

    fn disable(&mut self) -> Result<()>;

    fn set_prescaler(&mut self, prescaler: Prescaler) -> Result<()>;

    fn set_wave_mode(&mut self, mode: WaveMode) -> Result<()>;

    /// Load compare/capture register `channel` with `count`.
    fn set_count(&mut self, channel: u8, count: u16) -> Result<()>;

    /// Current counter value.
    fn read(&self) -> u16;
}

/// A timer from either family.
pub enum Timer<Tc, Tcc> {
    /// Plain 16-bit counter (TC3..TC5).
    Counter(Tc),
    /// Compare/capture unit (TCC0..TCC2).
    CompareCapture(Tcc),
}

impl<Tc: TimerCounter, Tcc: TimerCounter> TimerCounter for Timer<Tc, Tcc> {
    fn enable(&mut self) -> Result<()> {
        match self {
            Timer::Counter(tc) => tc.enable(),
            Timer::CompareCapture(tcc) => tcc.enable(),
        }
    }

    fn disable(&mut self) -> Result<()> {
        match self {
            Timer::Counter(tc) => tc.disable(),
            Timer::CompareCapture(tcc) => tcc.disable(),
        }
    }

    fn set_prescaler(&mut self, prescaler: Prescaler) -> Result<()> {
        match self {
            Timer::Counter(tc) => tc.set_prescaler(prescaler),
            Timer::CompareCapture(tcc) => tcc.set_prescaler(prescaler),
        }
    }

    fn set_wave_mode(&mut self, mode: WaveMode) -> Result<()> {
        match self {
            Timer::Counter(tc) => tc.set_wave_mode(mode),
            Timer::CompareCapture(tcc) => tcc.set_wave_mode(mode),
        }
    }

    fn set_count(&mut self, channel: u8, count: u16) -> Result<()> {
        match self {
            Timer::Counter(tc) => tc.set_count(channel, count),
            Timer::CompareCapture(tcc) => tcc.set_count(channel, count),
        }
    }

    fn read(&self) -> u16 {
        match self {
            Timer::Counter(tc) => tc.read(),
            Timer::CompareCapture(tcc) => tcc.read(),
        }
    }
}
