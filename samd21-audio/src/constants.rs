/// Number of generic clock generators (GCLK0..=GCLK8).
pub const CLOCK_GENERATOR_COUNT: usize = 9;

/// Number of peripherals a single generator can track as attached.
pub const PERIPHERALS_PER_GENERATOR: usize = 7;

/// Number of DMA channels managed by the controller.
pub const DMA_CHANNEL_COUNT: usize = 4;

/// Required alignment of the descriptor and write-back sections, in bytes.
pub const DMA_DESCRIPTOR_ALIGNMENT: usize = 16;

/// Output frequency of the DFLL48M oscillator in Hz.
pub const DFLL48M_FREQUENCY: u32 = 48_000_000;

/// Output frequency of the OSC8M oscillator in Hz.
pub const OSC8M_FREQUENCY: u32 = 8_000_000;

/// Reference clock of the sample-pacing timer in Hz.
pub const DAC_TIMER_FREQUENCY: u32 = OSC8M_FREQUENCY;

/// Conversion clock requested for the DAC in Hz.
pub const DAC_CLOCK_FREQUENCY: u32 = 350_000;

/// Default DAC playback rate in Hz.
pub const DAC_DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Number of PDM bits (filter taps) that produce one PCM sample.
pub const PDM_DECIMATION: usize = 64;

/// Number of PDM bits carried in the low half of each 32-bit DMA word.
pub const PDM_BITS_PER_WORD: usize = 16;

/// Number of 32-bit DMA words consumed per PCM sample.
pub const PDM_WORDS_PER_SAMPLE: usize = PDM_DECIMATION / PDM_BITS_PER_WORD;

/// Size of one raw PDM receive buffer in 32-bit words.
pub const PDM_RAW_BUFFER_WORDS: usize = 128;

/// Number of PCM samples produced from one raw receive buffer.
pub const PDM_SAMPLES_PER_RAW_BUFFER: usize = PDM_RAW_BUFFER_WORDS / PDM_WORDS_PER_SAMPLE;

/// Number of samples in each PCM buffer handed downstream.
pub const PCM_BUFFER_SAMPLES: usize = 256;

/// PCM buffers discarded after `enable()` while the microphone settles.
pub const PDM_STARTUP_MUTE_BUFFERS: u32 = 4;

/// Default PDM capture rate in Hz.
pub const PDM_DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Completed PCM buffers held for the downstream sink.
pub const PDM_READY_BUFFERS: usize = 2;

/// Largest number of samples an [`AudioBuffer`](crate::buffer::AudioBuffer) can hold.
pub const AUDIO_BUFFER_CAPACITY: usize = PCM_BUFFER_SAMPLES;

/// Polls attempted before a hardware handshake gives up.
#[cfg(feature = "bounded-handshake")]
pub const HANDSHAKE_POLL_LIMIT: u32 = 100_000;
