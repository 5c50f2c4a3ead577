//! DMA-paced DAC playback.
//!
//! [`AudioOutputDriver`] pulls [`AudioBuffer`]s from an upstream
//! [`DataSource`] and streams them into the DAC `DATA` register, one
//! halfword per TC3 overflow.
//!
//! ## Architecture
//!
//! ```text
//!  upstream            AudioBuffer            DMAC ch n          DAC
//! ┌──────────┐ pull() ┌────────────┐  beat   ┌──────────┐      ┌──────┐
//! │DataSource│──────► │ current    │───────► │ src += 2 │────► │ DATA │
//! └──────────┘        └────────────┘         └──────────┘      └──────┘
//!                                               ▲ trigger 0x18
//!                                            TC3 overflow @ sample rate
//! ```
//!
//! ## State machine
//!
//! | State | Event | Action | Next |
//! |-------|-------|--------|------|
//! | Idle | `pull_request()` | demand += 1, `pull()` | Active / Idle |
//! | Active | `pull_request()` | demand += 1 | Active |
//! | Active | transfer complete, demand > 0 | `pull()` | Active / Idle |
//! | Active | transfer complete, demand = 0 | none | Idle |
//! | any | `pull()` returns empty buffer | demand = 0 | Idle |
//!
//! Samples are copied into `DATA` unchanged, so upstream must produce
//! register-ready values.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::buffer::AudioBuffer;
use crate::clock::{peripheral, ClockHardware, ClockManager};
use crate::constants::{DAC_CLOCK_FREQUENCY, DAC_DEFAULT_SAMPLE_RATE, DAC_TIMER_FREQUENCY};
use crate::dma::{
    BeatSize, BlockAction, ChannelConfig, DmaComponent, DmaController, DmaHardware, EventOutput,
};
use crate::error::{Error, Result};
use crate::stream::{DataSink, DataSource};
use crate::timer::{Prescaler, TimerCounter, WaveMode};

/// Address of the DAC `DATA` register.
pub const DAC_DATA_REGISTER: u32 = 0x4200_4808;

/// DMAC trigger source raised by a TC3 overflow.
pub const TC3_OVERFLOW_TRIGGER: u8 = 0x18;

/// Runtime configuration for [`AudioOutputDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacConfig {
    /// Initial playback rate in Hz.
    pub sample_rate: u32,
    /// DMA destination.
    pub data_register: u32,
    /// DMAC trigger source pacing each sample.
    pub trigger: u8,
}

impl Default for DacConfig {
    fn default() -> Self {
        DacConfig {
            sample_rate: DAC_DEFAULT_SAMPLE_RATE,
            data_register: DAC_DATA_REGISTER,
            trigger: TC3_OVERFLOW_TRIGGER,
        }
    }
}

/// Playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlaybackState {
    /// No transfer in flight.
    Idle,
    /// A buffer is streaming to the DAC.
    Active,
}

struct State {
    playback: PlaybackState,
    /// `pull_request()` calls not yet answered by a `pull()`.
    demand: u32,
    /// Buffer the DMA channel is reading from.
    current: AudioBuffer,
    sample_rate: u32,
    /// Set by `register()`; nothing is armed before.
    registered: bool,
}

/// DAC output stage of a pull-based audio stream.
///
/// The DMA channel reads straight out of the driver, so the driver must not
/// move once playback starts. [`register()`](Self::register) borrows it for
/// `'a`, and every call that arms the channel fails with
/// [`Error::InvalidArgument`] until it has been made.
pub struct AudioOutputDriver<'a, D, T> {
    dmac: &'a DmaController<'a, D>,
    upstream: &'a dyn DataSource<'a>,
    timer: Mutex<RefCell<T>>,
    channel: Option<u8>,
    reference_clock: u32,
    state: Mutex<RefCell<State>>,
}

impl<'a, D, T> AudioOutputDriver<'a, D, T>
where
    D: DmaHardware + Send,
    T: TimerCounter + Send,
{
    /// Clock the DAC and its pacing timer, claim a DMA channel and program
    /// the initial sample rate.
    ///
    /// Running out of DMA channels is not fatal: the driver is still built,
    /// and streaming calls report [`Error::ResourceExhausted`].
    pub fn new<C: ClockHardware>(
        clocks: &mut ClockManager<C>,
        dmac: &'a DmaController<'a, D>,
        upstream: &'a dyn DataSource<'a>,
        mut timer: T,
        config: DacConfig,
    ) -> Result<Self> {
        clocks.enable_peripheral(peripheral::DAC, DAC_CLOCK_FREQUENCY)?;
        let reference_clock = clocks.enable_peripheral(peripheral::TCC2_TC3, DAC_TIMER_FREQUENCY)?;

        timer.set_prescaler(Prescaler::Div1)?;
        timer.set_wave_mode(WaveMode::MatchFrequency)?;

        dmac.disable();
        let channel = Self::claim_channel(dmac, &config)
            .map_err(|e| warn!("dac: no DMA channel ({}), playback unavailable", e))
            .ok();
        dmac.enable();

        let driver = AudioOutputDriver {
            dmac,
            upstream,
            timer: Mutex::new(RefCell::new(timer)),
            channel,
            reference_clock,
            state: Mutex::new(RefCell::new(State {
                playback: PlaybackState::Idle,
                demand: 0,
                current: AudioBuffer::new(),
                sample_rate: 0,
                registered: false,
            })),
        };
        driver.set_sample_rate(config.sample_rate)?;
        Ok(driver)
    }

    fn claim_channel(dmac: &DmaController<'a, D>, config: &DacConfig) -> Result<u8> {
        let channel = dmac.allocate_channel()?;
        dmac.with_descriptor(channel, |d| {
            d.set_beat_size(BeatSize::HalfWord);
            d.set_source_increment(true);
            d.set_destination_increment(false);
            d.set_block_action(BlockAction::NoAction);
            d.set_event_output(EventOutput::Beat);
            d.set_destination_address(config.data_register);
            d.set_next_descriptor(0);
            d.set_valid(true);
        })?;
        dmac.configure_channel(channel, ChannelConfig::beat(config.trigger))?;
        Ok(channel)
    }

    /// Hook the driver into the DMA interrupt and the upstream source.
    pub fn register(&'a self) -> Result<()> {
        let channel = self.channel.ok_or(Error::ResourceExhausted)?;
        self.dmac.on_transfer_complete(channel, self)?;
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).registered = true);
        self.upstream.connect(self);
        Ok(())
    }

    /// The channel to arm, once the driver is pinned by `register()`.
    fn armable(&self) -> Result<u8> {
        let channel = self.channel.ok_or(Error::ResourceExhausted)?;
        if !critical_section::with(|cs| self.state.borrow_ref(cs).registered) {
            return Err(Error::InvalidArgument);
        }
        Ok(channel)
    }

    /// Fetch the next upstream buffer and start streaming it.
    ///
    /// An empty buffer ends the stream: demand is cleared and the driver
    /// goes idle.
    pub fn pull(&self) -> Result<()> {
        let channel = self.armable()?;
        let buffer = self.upstream.pull();

        let start = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.demand = state.demand.saturating_sub(1);
            if buffer.is_empty() {
                state.demand = 0;
                state.playback = PlaybackState::Idle;
                return None;
            }
            state.current = buffer;
            Some((state.current.as_ptr() as usize, state.current.len() as u16))
        });

        let Some((address, beats)) = start else {
            debug!("dac: end of stream");
            return Ok(());
        };
        self.stream(channel, address, beats)
    }

    /// One-shot transfer of `samples`, bypassing the pull protocol.
    pub fn play(&self, samples: &'a [u16]) -> Result<()> {
        let channel = self.armable()?;
        let beats = u16::try_from(samples.len()).map_err(|_| Error::InvalidArgument)?;
        self.stream(channel, samples.as_ptr() as usize, beats)
    }

    fn stream(&self, channel: u8, address: usize, beats: u16) -> Result<()> {
        self.dmac
            .with_descriptor(channel, |d| d.set_source_block(address, beats))?;
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).playback = PlaybackState::Active;
        });
        self.dmac.start_transfer(channel)
    }

    /// Pace playback at (close to) `frequency` Hz.
    ///
    /// The timer period is `reference / frequency` ticks, clamped to the
    /// 16-bit counter and to at least one tick. Returns the achieved rate.
    pub fn set_sample_rate(&self, frequency: u32) -> Result<u32> {
        if frequency == 0 {
            return Err(Error::InvalidArgument);
        }
        let period = (self.reference_clock / frequency).clamp(1, u32::from(u16::MAX));
        let achieved = self.reference_clock / period;

        critical_section::with(|cs| -> Result<()> {
            let mut timer = self.timer.borrow_ref_mut(cs);
            timer.disable()?;
            timer.set_count(0, period as u16)?;
            timer.enable()
        })?;

        critical_section::with(|cs| self.state.borrow_ref_mut(cs).sample_rate = achieved);
        debug!("dac: sample rate {} Hz (period {} ticks)", achieved, period);
        Ok(achieved)
    }

    /// Achieved playback rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow_ref(cs).sample_rate)
    }

    pub fn state(&self) -> PlaybackState {
        critical_section::with(|cs| self.state.borrow_ref(cs).playback)
    }

    /// Outstanding `pull_request()` notifications.
    pub fn pending_demand(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow_ref(cs).demand)
    }

    /// DMA channel, if one was available at construction.
    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    /// Frequency of the clock feeding the pacing timer.
    pub fn reference_clock(&self) -> u32 {
        self.reference_clock
    }

    /// Run `f` against the pacing timer.
    pub fn with_timer<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.timer.borrow_ref_mut(cs)))
    }
}

impl<'a, D, T> DataSink for AudioOutputDriver<'a, D, T>
where
    D: DmaHardware + Send,
    T: TimerCounter + Send,
{
    fn pull_request(&self) -> Result<()> {
        self.armable()?;
        let idle = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.demand += 1;
            state.playback == PlaybackState::Idle
        });
        if idle {
            self.pull()
        } else {
            Ok(())
        }
    }
}

impl<'a, D, T> DmaComponent for AudioOutputDriver<'a, D, T>
where
    D: DmaHardware + Send,
    T: TimerCounter + Send,
{
    fn dma_transfer_complete(&self) {
        let more = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.demand == 0 {
                state.playback = PlaybackState::Idle;
                false
            } else {
                true
            }
        });
        if more {
            if let Err(e) = self.pull() {
                warn!("dac: refill failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::mock::{MockClockHardware, MockDmaHardware, MockTimer, TimerEvent};

    /// Upstream that hands out a scripted list of buffers.
    struct Script {
        buffers: Mutex<RefCell<VecDeque<AudioBuffer>>>,
        pulls: Mutex<RefCell<u32>>,
    }

    impl Script {
        fn new(lengths: &[usize]) -> Self {
            let buffers = lengths
                .iter()
                .enumerate()
                .map(|(n, &len)| {
                    let samples: Vec<i16> = (0..len).map(|i| (n * 1000 + i) as i16).collect();
                    AudioBuffer::from_slice(&samples).unwrap()
                })
                .collect();
            Script {
                buffers: Mutex::new(RefCell::new(buffers)),
                pulls: Mutex::new(RefCell::new(0)),
            }
        }

        fn pulls(&self) -> u32 {
            critical_section::with(|cs| *self.pulls.borrow_ref(cs))
        }
    }

    impl<'a> DataSource<'a> for Script {
        fn pull(&self) -> AudioBuffer {
            critical_section::with(|cs| {
                *self.pulls.borrow_ref_mut(cs) += 1;
                self.buffers.borrow_ref_mut(cs).pop_front().unwrap_or_default()
            })
        }

        fn connect(&self, _sink: &'a dyn DataSink) {}
    }

    fn clocks() -> ClockManager<MockClockHardware> {
        ClockManager::new(MockClockHardware::new())
    }

    #[test]
    fn construction_clocks_dac_and_timer() {
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();

        assert_eq!(dac.reference_clock(), 8_000_000);
        assert!(clocks.hardware().routed(peripheral::DAC).is_some());
        assert_eq!(clocks.hardware().routed(peripheral::TCC2_TC3), Some(1));
        assert_eq!(dac.channel(), Some(1));
        assert!(dmac.is_enabled());

        let d = dmac.descriptor(1).unwrap();
        assert_eq!(d.beat_size(), BeatSize::HalfWord);
        assert!(d.source_increment());
        assert!(!d.destination_increment());
        assert_eq!(d.destination_address(), DAC_DATA_REGISTER);
        assert_eq!(dmac.channel_config(1), Some(ChannelConfig::beat(0x18)));

        dac.with_timer(|t| {
            assert_eq!(t.prescaler, Some(Prescaler::Div1));
            assert_eq!(t.wave_mode, Some(WaveMode::MatchFrequency));
            assert!(t.enabled);
        });
        assert_eq!(dac.state(), PlaybackState::Idle);
    }

    #[test]
    fn sample_rate_rounds_through_timer_period() {
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();

        // 8 MHz / 44 100 Hz = 181 ticks -> 44 198 Hz.
        assert_eq!(dac.sample_rate(), 44_198);
        assert_eq!(dac.with_timer(|t| t.counts[0]), 181);

        assert_eq!(dac.set_sample_rate(8_000).unwrap(), 8_000);
        assert_eq!(dac.with_timer(|t| t.counts[0]), 1_000);
    }

    #[test]
    fn sample_rate_reprograms_stopped_timer() {
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();

        dac.set_sample_rate(22_050).unwrap();
        let events = dac.with_timer(|t| t.events.clone());
        assert_eq!(
            events[events.len() - 3..],
            [TimerEvent::Disable, TimerEvent::Count(0, 362), TimerEvent::Enable]
        );
    }

    #[test]
    fn sample_rate_clamps_period() {
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();

        assert_eq!(dac.set_sample_rate(20_000_000).unwrap(), 8_000_000);
        assert_eq!(dac.with_timer(|t| t.counts[0]), 1);

        assert_eq!(dac.set_sample_rate(1).unwrap(), 8_000_000 / 65_535);
        assert_eq!(dac.with_timer(|t| t.counts[0]), u16::MAX);

        assert_eq!(dac.set_sample_rate(0), Err(Error::InvalidArgument));
    }

    #[test]
    fn pull_request_streams_until_upstream_runs_dry() {
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[64, 32]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();
        dac.register().unwrap();

        dac.pull_request().unwrap();
        assert_eq!(dac.state(), PlaybackState::Active);
        assert_eq!(dac.pending_demand(), 0);
        let armed = dmac.with_hardware(|hw| hw.last_armed(1)).unwrap();
        assert_eq!(armed.beat_count(), 64);

        // Upstream announces the second buffer while the first plays.
        dac.pull_request().unwrap();
        assert_eq!(dac.pending_demand(), 1);
        assert_eq!(upstream.pulls(), 1);

        dmac.with_hardware(|hw| hw.complete(1));
        dmac.on_interrupt();
        assert_eq!(dac.state(), PlaybackState::Active);
        assert_eq!(dmac.with_hardware(|hw| hw.last_armed(1)).unwrap().beat_count(), 32);

        // No demand left: the channel goes quiet.
        dmac.with_hardware(|hw| hw.complete(1));
        dmac.on_interrupt();
        assert_eq!(dac.state(), PlaybackState::Idle);
        assert_eq!(dmac.with_hardware(|hw| hw.arm_count(1)), 2);
    }

    #[test]
    fn empty_pull_clears_demand_and_resumes_cleanly() {
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[16, 0, 8]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();
        dac.register().unwrap();

        dac.pull_request().unwrap();
        dac.pull_request().unwrap();
        dac.pull_request().unwrap();
        assert_eq!(dac.pending_demand(), 2);

        // The refill gets the zero-length end-of-stream marker.
        dmac.with_hardware(|hw| hw.complete(1));
        dmac.on_interrupt();
        assert_eq!(dac.state(), PlaybackState::Idle);
        assert_eq!(dac.pending_demand(), 0);
        assert_eq!(dmac.with_hardware(|hw| hw.arm_count(1)), 1);

        dac.pull_request().unwrap();
        assert_eq!(dac.state(), PlaybackState::Active);
        let armed = dmac.with_hardware(|hw| hw.last_armed(1)).unwrap();
        assert_eq!(armed.beat_count(), 8);
        assert_eq!(dmac.with_hardware(|hw| hw.armed_while_disabled), 0);
    }

    #[test]
    fn source_address_points_past_streamed_buffer() {
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[10]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();
        dac.register().unwrap();
        dac.pull_request().unwrap();

        let start = critical_section::with(|cs| dac.state.borrow_ref(cs).current.as_ptr() as usize);
        let armed = dmac.with_hardware(|hw| hw.last_armed(1)).unwrap();
        assert_eq!(armed.source_address(), (start as u32).wrapping_add(20));
    }

    #[test]
    fn play_bypasses_upstream() {
        static TONE: [u16; 4] = [0, 512, 1023, 512];
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();
        dac.register().unwrap();

        dac.play(&TONE).unwrap();
        assert_eq!(dac.state(), PlaybackState::Active);
        assert_eq!(upstream.pulls(), 0);
        let armed = dmac.with_hardware(|hw| hw.last_armed(1)).unwrap();
        assert_eq!(armed.beat_count(), 4);
    }

    #[test]
    fn missing_channel_is_reported_by_streaming_calls() {
        static TONE: [u16; 2] = [0, 1];
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        while dmac.allocate_channel().is_ok() {}
        let upstream = Script::new(&[4]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();

        assert_eq!(dac.channel(), None);
        assert_eq!(dac.play(&TONE), Err(Error::ResourceExhausted));
        assert_eq!(dac.register(), Err(Error::ResourceExhausted));
        assert_eq!(dac.pull_request(), Err(Error::ResourceExhausted));
    }

    #[test]
    fn arming_requires_registration() {
        static TONE: [u16; 2] = [0, 1];
        let mut clocks = clocks();
        let dmac = DmaController::new(MockDmaHardware::new());
        let upstream = Script::new(&[16]);
        let dac = AudioOutputDriver::new(
            &mut clocks,
            &dmac,
            &upstream,
            MockTimer::new(),
            DacConfig::default(),
        )
        .unwrap();

        assert_eq!(dac.pull_request(), Err(Error::InvalidArgument));
        assert_eq!(dac.pull(), Err(Error::InvalidArgument));
        assert_eq!(dac.play(&TONE), Err(Error::InvalidArgument));
        assert_eq!(dac.pending_demand(), 0);
        assert_eq!(upstream.pulls(), 0);
        assert_eq!(dmac.with_hardware(|hw| hw.arm_count(1)), 0);
        assert_eq!(dac.state(), PlaybackState::Idle);

        dac.register().unwrap();
        dac.pull_request().unwrap();
        assert_eq!(dmac.with_hardware(|hw| hw.arm_count(1)), 1);
    }
}
