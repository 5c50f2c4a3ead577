//! Windowed-sinc PDM decimation.

use crate::constants::{PDM_BITS_PER_WORD, PDM_DECIMATION, PDM_WORDS_PER_SAMPLE};

/// 64-tap windowed-sinc low-pass kernel, integer weights.
pub const SINC_FILTER: [u16; PDM_DECIMATION] = [
    0, 2, 9, 21, 39, 63, 94, 132, 179, 236, 302, 379, 467, 565, 674, 792, 920, 1055, 1196,
    1341, 1487, 1633, 1776, 1913, 2042, 2159, 2263, 2352, 2422, 2474, 2506, 2516, 2506, 2474,
    2422, 2352, 2263, 2159, 2042, 1913, 1776, 1633, 1487, 1341, 1196, 1055, 920, 792, 674, 565,
    467, 379, 302, 236, 179, 132, 94, 63, 39, 21, 9, 2, 0, 0,
];

const fn kernel_sum() -> i32 {
    let mut sum = 0;
    let mut i = 0;
    while i < PDM_DECIMATION {
        sum += SINC_FILTER[i] as i32;
        i += 1;
    }
    sum
}

/// Half the kernel's full-scale sum. Subtracting it centres the output on 0.
pub const CENTER_OFFSET: i32 = kernel_sum() / 2;

const _: () = assert!(kernel_sum() % 2 == 0);
const _: () = assert!(CENTER_OFFSET <= i16::MAX as i32);

/// Decimate one output sample from `PDM_WORDS_PER_SAMPLE` raw words.
///
/// Only the low 16 bits of each word carry PDM data. Bits are consumed most
/// significant first and every bit advances the tap index, set or not.
#[inline]
pub fn decimate_sample(words: &[u32; PDM_WORDS_PER_SAMPLE]) -> i16 {
    let mut sum: i32 = 0;
    let mut taps = SINC_FILTER.iter();
    for &word in words {
        let mut bits = word as u16;
        for _ in 0..PDM_BITS_PER_WORD {
            let tap = taps.next().copied().unwrap_or(0);
            if bits & 0x8000 != 0 {
                sum += i32::from(tap);
            }
            bits <<= 1;
        }
    }
    (sum - CENTER_OFFSET) as i16
}

/// Decimate `raw` into `out`, one sample per `PDM_WORDS_PER_SAMPLE` words.
///
/// Stops at whichever runs out first and returns the number of samples
/// written. Trailing words that do not fill a whole group are ignored.
pub fn decimate_block(raw: &[u32], out: &mut [i16]) -> usize {
    let mut written = 0;
    for (chunk, sample) in raw.chunks_exact(PDM_WORDS_PER_SAMPLE).zip(out.iter_mut()) {
        let mut words = [0u32; PDM_WORDS_PER_SAMPLE];
        words.copy_from_slice(chunk);
        *sample = decimate_sample(&words);
        written += 1;
    }
    written
}
