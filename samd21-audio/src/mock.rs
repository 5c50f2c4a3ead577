//! Software stand-ins for the register backends, used by unit and
//! integration tests.

use core::cell::Cell;

use crate::clock::{ClockHardware, ClockSource};
use crate::constants::DMA_CHANNEL_COUNT;
use crate::dma::{ChannelConfig, DmaDescriptor, DmaHardware};
use crate::error::Result;
use crate::io::PdmSerializer;
use crate::timer::{Prescaler, TimerCounter, WaveMode};

// ── Clock controller ─────────────────────────────────────────────────

/// Generic clock controller with a peripheral routing table.
pub(crate) struct MockClockHardware {
    pub oscillator_starts: u32,
    /// `(generator, source, division_shift)` in write order.
    pub programmed: Vec<(u8, ClockSource, u8)>,
    /// Generators stopped, in order.
    pub disabled: Vec<u8>,
    /// Polls a disabled peripheral channel keeps reading back enabled.
    pub handshake_latency: u32,
    pub handshake_polls: Cell<u32>,
    remaining: Cell<u32>,
    routes: Vec<(u8, u8)>,
}

impl MockClockHardware {
    pub fn new() -> Self {
        MockClockHardware {
            oscillator_starts: 0,
            programmed: Vec::new(),
            disabled: Vec::new(),
            handshake_latency: 0,
            handshake_polls: Cell::new(0),
            remaining: Cell::new(0),
            routes: Vec::new(),
        }
    }

    /// Generator currently feeding `peripheral`.
    pub fn routed(&self, peripheral: u8) -> Option<u8> {
        self.routes
            .iter()
            .find(|(p, _)| *p == peripheral)
            .map(|(_, generator)| *generator)
    }
}

impl ClockHardware for MockClockHardware {
    fn start_oscillators(&mut self) {
        self.oscillator_starts += 1;
    }

    fn program_generator(&mut self, id: u8, source: ClockSource, division_shift: u8) {
        self.programmed.push((id, source, division_shift));
    }

    fn disable_generator(&mut self, id: u8) {
        self.disabled.push(id);
    }

    fn generator_syncing(&self) -> bool {
        false
    }

    fn disable_peripheral_channel(&mut self, peripheral: u8) {
        self.routes.retain(|(p, _)| *p != peripheral);
        self.remaining.set(self.handshake_latency);
    }

    fn peripheral_channel_enabled(&self, _peripheral: u8) -> bool {
        self.handshake_polls.set(self.handshake_polls.get() + 1);
        let remaining = self.remaining.get();
        if remaining > 0 {
            self.remaining.set(remaining - 1);
            true
        } else {
            false
        }
    }

    fn enable_peripheral_channel(&mut self, peripheral: u8, generator: u8) {
        self.routes.push((peripheral, generator));
    }
}

// ── DMA controller ───────────────────────────────────────────────────

/// DMAC that records every arm and lets tests raise completions.
pub(crate) struct MockDmaHardware {
    pub enabled: bool,
    pub descriptor_memory: Option<(u32, u32)>,
    pub configs: [Option<ChannelConfig>; DMA_CHANNEL_COUNT],
    pub active: [bool; DMA_CHANNEL_COUNT],
    /// `(hardware channel, descriptor)` in arm order.
    pub armed: Vec<(u8, DmaDescriptor)>,
    /// Arms issued while the global enable was clear.
    pub armed_while_disabled: u32,
    completed: u32,
}

impl MockDmaHardware {
    pub fn new() -> Self {
        MockDmaHardware {
            enabled: false,
            descriptor_memory: None,
            configs: [None; DMA_CHANNEL_COUNT],
            active: [false; DMA_CHANNEL_COUNT],
            armed: Vec::new(),
            armed_while_disabled: 0,
            completed: 0,
        }
    }

    /// Finish the transfer on allocated channel `channel` (1-based).
    pub fn complete(&mut self, channel: u8) {
        let idx = usize::from(channel - 1);
        self.active[idx] = false;
        self.completed |= 1 << idx;
    }

    /// Descriptor of the most recent arm on allocated channel `channel`.
    pub fn last_armed(&self, channel: u8) -> Option<DmaDescriptor> {
        self.armed
            .iter()
            .rev()
            .find(|(hw, _)| *hw == channel - 1)
            .map(|(_, d)| *d)
    }

    /// Number of arms on allocated channel `channel`.
    pub fn arm_count(&self, channel: u8) -> usize {
        self.armed.iter().filter(|(hw, _)| *hw == channel - 1).count()
    }
}

impl DmaHardware for MockDmaHardware {
    fn set_descriptor_memory(&mut self, base: u32, write_back: u32) {
        self.descriptor_memory = Some((base, write_back));
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn configure_channel(&mut self, channel: u8, config: &ChannelConfig) {
        self.configs[usize::from(channel)] = Some(*config);
    }

    fn enable_channel(&mut self, channel: u8, descriptor: &DmaDescriptor) {
        if !self.enabled {
            self.armed_while_disabled += 1;
        }
        self.active[usize::from(channel)] = true;
        self.armed.push((channel, *descriptor));
    }

    fn disable_channel(&mut self, channel: u8) {
        self.active[usize::from(channel)] = false;
    }

    fn take_completed(&mut self) -> u32 {
        core::mem::take(&mut self.completed)
    }
}

// ── Timer ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    Enable,
    Disable,
    Count(u8, u16),
}

/// Timer that keeps its register state and an event log.
pub(crate) struct MockTimer {
    pub enabled: bool,
    pub prescaler: Option<Prescaler>,
    pub wave_mode: Option<WaveMode>,
    pub counts: [u16; 4],
    pub events: Vec<TimerEvent>,
}

impl MockTimer {
    pub fn new() -> Self {
        MockTimer {
            enabled: false,
            prescaler: None,
            wave_mode: None,
            counts: [0; 4],
            events: Vec::new(),
        }
    }
}

impl TimerCounter for MockTimer {
    fn enable(&mut self) -> Result<()> {
        self.enabled = true;
        self.events.push(TimerEvent::Enable);
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        self.enabled = false;
        self.events.push(TimerEvent::Disable);
        Ok(())
    }

    fn set_prescaler(&mut self, prescaler: Prescaler) -> Result<()> {
        self.prescaler = Some(prescaler);
        Ok(())
    }

    fn set_wave_mode(&mut self, mode: WaveMode) -> Result<()> {
        self.wave_mode = Some(mode);
        Ok(())
    }

    fn set_count(&mut self, channel: u8, count: u16) -> Result<()> {
        self.counts[usize::from(channel)] = count;
        self.events.push(TimerEvent::Count(channel, count));
        Ok(())
    }

    fn read(&self) -> u16 {
        0
    }
}

// ── I2S serializer ───────────────────────────────────────────────────

pub(crate) struct MockSerializer {
    pub divisor: Option<u8>,
    pub primes: u32,
}

impl MockSerializer {
    pub fn new() -> Self {
        MockSerializer {
            divisor: None,
            primes: 0,
        }
    }
}

impl PdmSerializer for MockSerializer {
    fn configure(&mut self, divisor: u8) {
        self.divisor = Some(divisor);
    }

    fn prime(&mut self) {
        self.primes += 1;
    }
}
