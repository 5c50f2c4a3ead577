use crate::constants::{
    CLOCK_GENERATOR_COUNT, DFLL48M_FREQUENCY, OSC8M_FREQUENCY, PERIPHERALS_PER_GENERATOR,
};
use crate::error::{Error, Result};
use crate::handshake::wait_while;

use super::{ClockHardware, ClockSource};

/// Bookkeeping for one generic clock generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockGenerator {
    id: u8,
    /// Achieved output frequency; 0 while unallocated.
    frequency: u32,
    /// Frequency the generator was allocated for.
    requested: u32,
    /// Set for system generators programmed at boot.
    fixed: bool,
    peripherals: [Option<u8>; PERIPHERALS_PER_GENERATOR],
}

impl ClockGenerator {
    const fn unallocated(id: u8) -> Self {
        ClockGenerator {
            id,
            frequency: 0,
            requested: 0,
            fixed: false,
            peripherals: [None; PERIPHERALS_PER_GENERATOR],
        }
    }

    /// Generator index (GCLKn).
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Achieved output frequency in Hz, or 0 when unallocated.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Whether the generator may be reprogrammed.
    pub fn is_configurable(&self) -> bool {
        !self.fixed
    }

    /// Whether the generator currently runs at a frequency.
    pub fn is_allocated(&self) -> bool {
        self.frequency != 0
    }

    /// Peripheral channel ids attached to this generator.
    pub fn peripherals(&self) -> impl Iterator<Item = u8> + '_ {
        self.peripherals.iter().flatten().copied()
    }

    /// Whether `peripheral` is attached to this generator.
    pub fn has_peripheral(&self, peripheral: u8) -> bool {
        self.peripherals.contains(&Some(peripheral))
    }

    /// A request for `frequency` can share this generator.
    fn serves(&self, frequency: u32) -> bool {
        self.is_allocated() && (self.frequency == frequency || self.requested == frequency)
    }

    fn attach(&mut self, peripheral: u8) -> bool {
        if self.has_peripheral(peripheral) {
            return true;
        }
        match self.peripherals.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(peripheral);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, peripheral: u8) {
        if let Some(slot) = self
            .peripherals
            .iter_mut()
            .find(|slot| **slot == Some(peripheral))
        {
            *slot = None;
        }
    }
}

/// Allocates, programs and routes the generic clock generators.
///
/// The manager is an explicitly owned context: construct one per clock
/// controller and pass it by `&mut` to the drivers that need clocks. Bring-up
/// happens lazily on first use (or explicitly via [`init()`](Self::init)) and
/// runs exactly once.
///
/// Generators 0..=2 are system clocks fixed at boot (48 MHz, 8 MHz, 8 MHz).
/// They are shared on an exact frequency match but never reprogrammed.
pub struct ClockManager<H> {
    hw: H,
    generators: [ClockGenerator; CLOCK_GENERATOR_COUNT],
    initialised: bool,
}

impl<H: ClockHardware> ClockManager<H> {
    /// Create a manager over the clock controller. No register is touched
    /// until the first operation.
    pub fn new(hw: H) -> Self {
        ClockManager {
            hw,
            generators: core::array::from_fn(|id| ClockGenerator::unallocated(id as u8)),
            initialised: false,
        }
    }

    /// Bring up the oscillators and mark the system generators as fixed.
    ///
    /// Calls after the first successful one are no-ops.
    pub fn init(&mut self) -> Result<()> {
        if self.initialised {
            return Ok(());
        }

        self.hw.start_oscillators();
        wait_while(|| self.hw.generator_syncing())?;

        for (id, frequency) in [(0, DFLL48M_FREQUENCY), (1, OSC8M_FREQUENCY), (2, OSC8M_FREQUENCY)] {
            let generator = &mut self.generators[id];
            generator.frequency = frequency;
            generator.requested = frequency;
            generator.fixed = true;
        }

        self.initialised = true;
        info!("clock: oscillators running, GCLK0 at {} Hz", DFLL48M_FREQUENCY);
        Ok(())
    }

    /// Find or program a generator running at `frequency`.
    ///
    /// An existing generator is reused when it runs at, or was allocated for,
    /// exactly `frequency` (system generators included). Otherwise the first
    /// free configurable generator is programmed. Returns the generator id.
    pub fn allocate_clock(&mut self, frequency: u32) -> Result<u8> {
        if frequency == 0 {
            return Err(Error::InvalidArgument);
        }
        self.init()?;

        if let Some(generator) = self.generators.iter().find(|g| g.serves(frequency)) {
            return Ok(generator.id);
        }

        let Some(id) = self
            .generators
            .iter()
            .find(|g| g.is_configurable() && !g.is_allocated())
            .map(|g| g.id)
        else {
            warn!("clock: no free generator for {} Hz", frequency);
            return Err(Error::ResourceExhausted);
        };

        self.configure_clock(id, frequency)?;
        Ok(id)
    }

    /// Program generator `id` as close to `frequency` as possible without
    /// exceeding it.
    ///
    /// The slowest standard source that reaches `frequency` is halved until
    /// the output drops to or below the request. Returns the achieved
    /// frequency, or 0 without touching the generator if it is fixed.
    pub fn configure_clock(&mut self, id: u8, frequency: u32) -> Result<u32> {
        self.init()?;
        let generator = self
            .generators
            .get(id as usize)
            .ok_or(Error::InvalidArgument)?;
        if !generator.is_configurable() {
            return Ok(0);
        }
        if frequency == 0 {
            return Err(Error::InvalidArgument);
        }

        let source = ClockSource::for_frequency(frequency);
        let mut achieved = source.frequency();
        let mut division_shift = 0u8;
        while achieved > frequency {
            achieved >>= 1;
            division_shift += 1;
        }

        self.hw.program_generator(id, source, division_shift);
        wait_while(|| self.hw.generator_syncing())?;

        let generator = &mut self.generators[id as usize];
        generator.frequency = achieved;
        generator.requested = frequency;
        Ok(achieved)
    }

    /// Route (or unroute) a peripheral channel to generator `generator`.
    ///
    /// The channel is always disabled first and the disable acknowledged by
    /// hardware before it is re-pointed.
    pub fn configure_peripheral_clock(
        &mut self,
        enable: bool,
        peripheral: u8,
        generator: u8,
    ) -> Result<()> {
        self.init()?;
        let target = self
            .generators
            .get(generator as usize)
            .ok_or(Error::InvalidArgument)?;
        if enable && !target.has_peripheral(peripheral) && !target.peripherals.contains(&None) {
            warn!("clock: generator {} has no room for peripheral {}", generator, peripheral);
            return Err(Error::ResourceExhausted);
        }

        self.hw.disable_peripheral_channel(peripheral);
        wait_while(|| self.hw.peripheral_channel_enabled(peripheral))?;

        if enable {
            self.hw.enable_peripheral_channel(peripheral, generator);
            for other in self.generators.iter_mut().filter(|g| g.id != generator) {
                other.detach(peripheral);
            }
            self.generators[generator as usize].attach(peripheral);
        } else {
            self.generators[generator as usize].detach(peripheral);
        }
        Ok(())
    }

    /// Clock `peripheral` from a generator running at (or just below)
    /// `frequency`, allocating one if needed. Returns the achieved frequency.
    pub fn enable_peripheral(&mut self, peripheral: u8, frequency: u32) -> Result<u32> {
        let id = self.allocate_clock(frequency)?;
        self.configure_peripheral_clock(true, peripheral, id)?;

        let achieved = self.generators[id as usize].frequency;
        info!(
            "clock: generator {} drives peripheral {} at {} Hz",
            id, peripheral, achieved
        );
        Ok(achieved)
    }

    /// Clock `peripheral` from the explicitly chosen, currently unallocated
    /// `generator`. Returns the achieved frequency.
    pub fn enable_peripheral_on(
        &mut self,
        peripheral: u8,
        frequency: u32,
        generator: u8,
    ) -> Result<u32> {
        self.init()?;
        let target = self
            .generators
            .get(generator as usize)
            .ok_or(Error::InvalidArgument)?;
        if target.is_allocated() {
            return Err(Error::ResourceExhausted);
        }

        let achieved = self.configure_clock(generator, frequency)?;
        self.configure_peripheral_clock(true, peripheral, generator)?;
        info!(
            "clock: generator {} drives peripheral {} at {} Hz",
            generator, peripheral, achieved
        );
        Ok(achieved)
    }

    /// Detach `peripheral` from whichever generator feeds it.
    pub fn disable_peripheral(&mut self, peripheral: u8) -> Result<()> {
        self.init()?;
        let generator = self
            .generators
            .iter()
            .find(|g| g.has_peripheral(peripheral))
            .map(|g| g.id)
            .ok_or(Error::NotFound)?;

        self.configure_peripheral_clock(false, peripheral, generator)?;
        info!("clock: peripheral {} detached from generator {}", peripheral, generator);
        Ok(())
    }

    /// Stop an idle configurable generator and return it to the
    /// unallocated pool.
    pub fn release_clock(&mut self, id: u8) -> Result<()> {
        let generator = self
            .generators
            .get(id as usize)
            .ok_or(Error::InvalidArgument)?;
        if !generator.is_configurable() || generator.peripherals().next().is_some() {
            return Err(Error::InvalidArgument);
        }

        self.hw.disable_generator(id);
        wait_while(|| self.hw.generator_syncing())?;
        self.generators[id as usize] = ClockGenerator::unallocated(id);
        debug!("clock: generator {} released", id);
        Ok(())
    }

    /// State of generator `id`.
    pub fn generator(&self, id: u8) -> Option<&ClockGenerator> {
        self.generators.get(id as usize)
    }

    /// Achieved frequency of generator `id`, 0 when unallocated.
    pub fn frequency(&self, id: u8) -> u32 {
        self.generator(id).map_or(0, ClockGenerator::frequency)
    }

    /// The underlying clock controller.
    pub fn hardware(&self) -> &H {
        &self.hw
    }
}
