//! Audio drivers built on the clock and DMA managers.
//!
//! | Driver | Stream role | Hardware |
//! |--------|-------------|----------|
//! | [`AudioOutputDriver`] | [`DataSink`](crate::stream::DataSink) | DAC, paced by TC3 |
//! | [`AudioInputDriver`] | [`DataSource`](crate::stream::DataSource) | PDM microphone on I2S serializer 1 |
//!
//! Both drivers claim one DMA channel at construction and are notified of
//! transfer completion through [`DmaComponent`](crate::dma::DmaComponent)
//! once [`register()`](AudioOutputDriver::register)ed. Registration pins
//! the driver, so neither arms DMA before it.
//!
//! ## Wiring
//!
//! ```ignore
//! static DMAC: DmaController<'static, Dmac> = DmaController::new(Dmac::new());
//!
//! let mic = MIC.init(AudioInputDriver::new(&mut clocks, &DMAC, I2s::new(), &pend_evsys, PdmConfig::default())?);
//! let dac = DAC.init(AudioOutputDriver::new(&mut clocks, &DMAC, mic, Tc3::new(), DacConfig::default())?);
//! mic.register()?;
//! dac.register()?; // also connects the DAC as the microphone's sink
//! mic.enable()?;
//!
//! // DMAC interrupt:      DMAC.on_interrupt();
//! // EVSYS (software):    mic.decimate();
//! ```

pub mod input_pdm;
pub mod output_dac;

pub use input_pdm::{AudioInputDriver, DecimationScheduler, PdmConfig, PdmSerializer};
pub use output_dac::{AudioOutputDriver, DacConfig, PlaybackState};
