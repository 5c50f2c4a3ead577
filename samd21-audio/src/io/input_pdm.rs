//! DMA-driven PDM microphone capture.
//!
//! [`AudioInputDriver`] clocks a PDM microphone through the I2S peripheral,
//! lands the raw bitstream in two ping-pong buffers by DMA, and decimates
//! each filled buffer into 16-bit PCM outside interrupt context.
//!
//! ## Architecture
//!
//! ```text
//!  I2S DATA[1]        raw A / raw B            deferred task          sink
//! ┌──────────┐ DMA  ┌─────────┬─────────┐   ┌──────────────┐   ┌──────────┐
//! │ 32-bit   │────► │128 × u32│128 × u32│──►│ decimate()   │──►│pull_     │
//! │ PDM words│      └─────────┴─────────┘   │ 64 taps/samp │   │request() │
//! └──────────┘        ▲ receiving  pending  └──────────────┘   └──────────┘
//! ```
//!
//! ## Interrupt discipline
//!
//! The transfer-complete interrupt only swaps buffer indices, schedules
//! decimation through a [`DecimationScheduler`] and re-arms DMA. At most one
//! raw buffer is pending at a time: if decimation has not finished with the
//! previous one, the newly filled buffer is dropped and the DMA overwrites
//! it. The drop is counted in [`overruns()`](AudioInputDriver::overruns).
//!
//! Completed PCM buffers wait in a two-deep queue for the sink. When the
//! sink falls behind, the oldest one is discarded and counted in
//! [`evicted()`](AudioInputDriver::evicted).
//!
//! After [`enable()`](AudioInputDriver::enable) the first `startup_mute`
//! PCM buffers are discarded while the microphone settles.

use core::cell::{Cell, RefCell, UnsafeCell};

use critical_section::Mutex;
use heapless::Deque;

use crate::buffer::AudioBuffer;
use crate::clock::{peripheral, ClockHardware, ClockManager};
use crate::constants::{
    DFLL48M_FREQUENCY, PDM_BITS_PER_WORD, PDM_DEFAULT_SAMPLE_RATE, PDM_RAW_BUFFER_WORDS,
    PDM_READY_BUFFERS, PDM_SAMPLES_PER_RAW_BUFFER, PDM_STARTUP_MUTE_BUFFERS,
};
use crate::dma::{
    BeatSize, BlockAction, ChannelConfig, DmaComponent, DmaController, DmaHardware, EventOutput,
};
use crate::dsp::decimate_block;
use crate::error::{Error, Result};
use crate::stream::{DataSink, DataSource};

/// Address of the I2S `DATA[1]` register.
pub const I2S_DATA1_REGISTER: u32 = 0x4200_5034;

/// DMAC trigger source raised when I2S serializer 1 has received a word.
pub const I2S_RX1_TRIGGER: u8 = 0x2A;

/// Largest I2S clock unit divisor (`CLKCTRL.MCKDIV` + 1).
const MAX_CLOCK_DIVISOR: u32 = 31;

/// Register-level access to the I2S serializer used in PDM mode.
pub trait PdmSerializer {
    /// Program clock unit 0 to divide `GCLK_I2S_0` by `divisor`, set
    /// serializer 1 to 32-bit PDM2 receive, and enable both.
    fn configure(&mut self, divisor: u8);

    /// Read `DATA[1]` once so the next received word raises a DMA trigger.
    fn prime(&mut self);
}

/// Runs [`AudioInputDriver::decimate`] later, outside interrupt context.
///
/// Typically pends a low-priority software interrupt or wakes a task.
pub trait DecimationScheduler: Sync {
    fn schedule(&self);
}

impl<F: Fn() + Sync> DecimationScheduler for F {
    fn schedule(&self) {
        self()
    }
}

/// Runtime configuration for [`AudioInputDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdmConfig {
    /// PCM output rate in Hz.
    pub sample_rate: u32,
    /// PCM buffers discarded after each `enable()`.
    pub startup_mute: u32,
    /// DMA source.
    pub data_register: u32,
    /// DMAC trigger source pacing each word.
    pub trigger: u8,
}

impl Default for PdmConfig {
    fn default() -> Self {
        PdmConfig {
            sample_rate: PDM_DEFAULT_SAMPLE_RATE,
            startup_mute: PDM_STARTUP_MUTE_BUFFERS,
            data_register: I2S_DATA1_REGISTER,
            trigger: I2S_RX1_TRIGGER,
        }
    }
}

/// Largest divisor of the 48 MHz I2S source that still runs at least at
/// `requested` Hz, and the resulting bit clock.
fn clock_divisor(requested: u32) -> (u8, u32) {
    let divisor = (1..=MAX_CLOCK_DIVISOR)
        .rev()
        .find(|d| DFLL48M_FREQUENCY / d >= requested)
        .unwrap_or(1);
    (divisor as u8, DFLL48M_FREQUENCY / divisor)
}

type RawBuffer = [u32; PDM_RAW_BUFFER_WORDS];

struct RawBuffers(UnsafeCell<[RawBuffer; 2]>);

// SAFETY: each raw buffer has a single writer at a time. The DMA channel
// writes only the `receiving` buffer; `decimate()` reads only the `pending`
// buffer, and the interrupt handler never lets the two indices coincide.
unsafe impl Sync for RawBuffers {}

struct Capture {
    /// Set by `register()`; nothing is armed before.
    registered: bool,
    enabled: bool,
    /// Buffer the DMA channel fills.
    receiving: usize,
    /// Filled buffer waiting for decimation.
    pending: Option<usize>,
    /// PCM buffers still to discard.
    startup_mute: u32,
    /// Raw buffers overwritten before decimation reached them.
    overruns: u32,
    /// PCM buffers discarded from a full ready queue.
    evicted: u32,
}

/// PDM microphone input stage of a pull-based audio stream.
///
/// DMA writes into buffers owned by the driver, so the driver must not move
/// once capture is enabled. [`register()`](Self::register) borrows it for
/// `'a`, and [`enable()`](Self::enable) fails with
/// [`Error::InvalidArgument`] until it has been made.
pub struct AudioInputDriver<'a, D, S> {
    dmac: &'a DmaController<'a, D>,
    serializer: Mutex<RefCell<S>>,
    scheduler: &'a dyn DecimationScheduler,
    channel: Option<u8>,
    sample_rate: u32,
    clock_rate: u32,
    startup_mute: u32,
    raw: RawBuffers,
    capture: Mutex<RefCell<Capture>>,
    /// PCM buffer being filled by `decimate()`.
    output: Mutex<RefCell<AudioBuffer>>,
    ready: Mutex<RefCell<Deque<AudioBuffer, PDM_READY_BUFFERS>>>,
    sink: Mutex<Cell<Option<&'a dyn DataSink>>>,
}

impl<'a, D, S> AudioInputDriver<'a, D, S>
where
    D: DmaHardware + Send,
    S: PdmSerializer + Send,
{
    /// Clock the I2S unit from the 48 MHz generator, claim a DMA channel and
    /// configure the serializer for `config.sample_rate`.
    ///
    /// Running out of DMA channels is not fatal: the driver is still built,
    /// and [`enable()`](Self::enable) reports [`Error::ResourceExhausted`].
    pub fn new<C: ClockHardware>(
        clocks: &mut ClockManager<C>,
        dmac: &'a DmaController<'a, D>,
        mut serializer: S,
        scheduler: &'a dyn DecimationScheduler,
        config: PdmConfig,
    ) -> Result<Self> {
        if config.sample_rate == 0 {
            return Err(Error::InvalidArgument);
        }

        // The bit clock is divided inside the I2S unit, so no generator is
        // spent on it.
        clocks.enable_peripheral(peripheral::I2S_0, DFLL48M_FREQUENCY)?;

        dmac.disable();
        let channel = Self::claim_channel(dmac, &config)
            .map_err(|e| warn!("pdm: no DMA channel ({}), capture unavailable", e))
            .ok();
        dmac.enable();

        let requested = config.sample_rate.saturating_mul(PDM_BITS_PER_WORD as u32);
        let (divisor, clock_rate) = clock_divisor(requested);
        serializer.configure(divisor);
        info!(
            "pdm: bit clock {} Hz (48 MHz / {}) for {} Hz",
            clock_rate, divisor, config.sample_rate
        );

        Ok(AudioInputDriver {
            dmac,
            serializer: Mutex::new(RefCell::new(serializer)),
            scheduler,
            channel,
            sample_rate: config.sample_rate,
            clock_rate,
            startup_mute: config.startup_mute,
            raw: RawBuffers(UnsafeCell::new([[0; PDM_RAW_BUFFER_WORDS]; 2])),
            capture: Mutex::new(RefCell::new(Capture {
                registered: false,
                enabled: false,
                receiving: 0,
                pending: None,
                startup_mute: 0,
                overruns: 0,
                evicted: 0,
            })),
            output: Mutex::new(RefCell::new(AudioBuffer::new())),
            ready: Mutex::new(RefCell::new(Deque::new())),
            sink: Mutex::new(Cell::new(None)),
        })
    }

    fn claim_channel(dmac: &DmaController<'a, D>, config: &PdmConfig) -> Result<u8> {
        let channel = dmac.allocate_channel()?;
        dmac.with_descriptor(channel, |d| {
            d.set_beat_size(BeatSize::Word);
            d.set_source_increment(false);
            d.set_destination_increment(true);
            d.set_block_action(BlockAction::NoAction);
            d.set_event_output(EventOutput::Beat);
            d.set_source_address(config.data_register);
            d.set_next_descriptor(0);
            d.set_valid(true);
        })?;
        dmac.configure_channel(channel, ChannelConfig::beat(config.trigger))?;
        Ok(channel)
    }

    /// Hook the driver into the DMA interrupt.
    pub fn register(&'a self) -> Result<()> {
        let channel = self.channel.ok_or(Error::ResourceExhausted)?;
        self.dmac.on_transfer_complete(channel, self)?;
        critical_section::with(|cs| self.capture.borrow_ref_mut(cs).registered = true);
        Ok(())
    }

    /// Start capturing. Calling it while already enabled does nothing.
    pub fn enable(&self) -> Result<()> {
        if self.channel.is_none() {
            return Err(Error::ResourceExhausted);
        }
        let started = critical_section::with(|cs| {
            let mut capture = self.capture.borrow_ref_mut(cs);
            if !capture.registered {
                return Err(Error::InvalidArgument);
            }
            if capture.enabled {
                return Ok(false);
            }
            capture.enabled = true;
            capture.startup_mute = self.startup_mute;
            Ok(true)
        })?;
        if !started {
            return Ok(());
        }
        info!("pdm: capture enabled");
        self.start_dma()
    }

    /// Stop capturing once the transfer in flight completes.
    pub fn disable(&self) {
        critical_section::with(|cs| self.capture.borrow_ref_mut(cs).enabled = false);
        info!("pdm: capture disabled");
    }

    pub fn is_enabled(&self) -> bool {
        critical_section::with(|cs| self.capture.borrow_ref(cs).enabled)
    }

    fn start_dma(&self) -> Result<()> {
        let channel = self.channel.ok_or(Error::ResourceExhausted)?;
        let receiving = critical_section::with(|cs| self.capture.borrow_ref(cs).receiving);
        let start = self.raw_buffer_address(receiving);
        self.dmac.with_descriptor(channel, |d| {
            d.set_destination_block(start, PDM_RAW_BUFFER_WORDS as u16)
        })?;
        self.dmac.start_transfer(channel)?;
        critical_section::with(|cs| self.serializer.borrow_ref_mut(cs).prime());
        Ok(())
    }

    pub(crate) fn raw_buffer_address(&self, index: usize) -> usize {
        self.raw.0.get().cast::<RawBuffer>().wrapping_add(index) as usize
    }

    /// Convert the pending raw buffer to PCM.
    ///
    /// Call from the context the [`DecimationScheduler`] wakes, never from
    /// the DMA interrupt. Does nothing when no buffer is pending.
    pub fn decimate(&self) {
        let Some(index) = critical_section::with(|cs| self.capture.borrow_ref(cs).pending) else {
            return;
        };

        let mut samples = [0i16; PDM_SAMPLES_PER_RAW_BUFFER];
        let count = {
            // SAFETY: `pending` is never the buffer DMA is filling, and it
            // stays put until this function clears it below.
            let raw = unsafe { &(*self.raw.0.get())[index] };
            decimate_block(raw, &mut samples)
        };

        let mut output =
            critical_section::with(|cs| core::mem::take(&mut *self.output.borrow_ref_mut(cs)));
        for &sample in &samples[..count] {
            // A full buffer is handed off straight away, so there is room.
            let _ = output.push(sample);
            if output.is_full() {
                self.deliver(core::mem::take(&mut output));
            }
        }

        critical_section::with(|cs| {
            *self.output.borrow_ref_mut(cs) = output;
            self.capture.borrow_ref_mut(cs).pending = None;
        });
    }

    fn deliver(&self, buffer: AudioBuffer) {
        let sink = critical_section::with(|cs| {
            let mut capture = self.capture.borrow_ref_mut(cs);
            if capture.startup_mute > 0 {
                capture.startup_mute -= 1;
                debug!("pdm: startup buffer discarded, {} left", capture.startup_mute);
                return None;
            }

            let mut ready = self.ready.borrow_ref_mut(cs);
            if ready.is_full() {
                ready.pop_front();
                capture.evicted += 1;
                trace!("pdm: sink behind, oldest buffer evicted");
            }
            let _ = ready.push_back(buffer);
            Some(self.sink.borrow(cs).get())
        });

        if let Some(Some(sink)) = sink {
            if let Err(e) = sink.pull_request() {
                warn!("pdm: sink rejected buffer: {}", e);
            }
        }
    }

    /// Raw buffers lost because decimation fell behind the DMA.
    pub fn overruns(&self) -> u32 {
        critical_section::with(|cs| self.capture.borrow_ref(cs).overruns)
    }

    /// PCM buffers lost because the sink did not pull them in time.
    pub fn evicted(&self) -> u32 {
        critical_section::with(|cs| self.capture.borrow_ref(cs).evicted)
    }

    /// Whether a raw buffer is waiting for [`decimate()`](Self::decimate).
    pub fn decimation_pending(&self) -> bool {
        critical_section::with(|cs| self.capture.borrow_ref(cs).pending.is_some())
    }

    /// PCM output rate requested at construction, in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Achieved PDM bit clock in Hz.
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// DMA channel, if one was available at construction.
    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    /// Run `f` against the serializer.
    pub fn with_serializer<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        critical_section::with(|cs| f(&mut self.serializer.borrow_ref_mut(cs)))
    }

    /// Write into the buffer DMA is filling, standing in for the hardware.
    #[cfg(test)]
    pub(crate) fn fill_receiving(&self, f: impl FnOnce(&mut RawBuffer)) {
        let receiving = critical_section::with(|cs| self.capture.borrow_ref(cs).receiving);
        // SAFETY: tests play the part of the DMA channel, the only writer of
        // the receiving buffer.
        f(unsafe { &mut (*self.raw.0.get())[receiving] });
    }
}

impl<'a, D, S> DataSource<'a> for AudioInputDriver<'a, D, S>
where
    D: DmaHardware + Send,
    S: PdmSerializer + Send,
{
    /// The oldest completed PCM buffer, or an empty one.
    fn pull(&self) -> AudioBuffer {
        critical_section::with(|cs| self.ready.borrow_ref_mut(cs).pop_front())
            .unwrap_or_default()
    }

    fn connect(&self, sink: &'a dyn DataSink) {
        critical_section::with(|cs| self.sink.borrow(cs).set(Some(sink)));
    }
}

impl<'a, D, S> DmaComponent for AudioInputDriver<'a, D, S>
where
    D: DmaHardware + Send,
    S: PdmSerializer + Send,
{
    fn dma_transfer_complete(&self) {
        let (scheduled, rearm) = critical_section::with(|cs| {
            let mut capture = self.capture.borrow_ref_mut(cs);
            let scheduled = if capture.pending.is_none() {
                capture.pending = Some(capture.receiving);
                capture.receiving ^= 1;
                true
            } else {
                capture.overruns += 1;
                false
            };
            (scheduled, capture.enabled)
        });

        if scheduled {
            self.scheduler.schedule();
        } else {
            trace!("pdm: decimation behind, raw buffer dropped");
        }

        if rearm {
            if let Err(e) = self.start_dma() {
                warn!("pdm: re-arm failed: {}", e);
            }
        }
    }
}
