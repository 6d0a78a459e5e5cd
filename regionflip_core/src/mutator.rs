use crate::scanner::Region;
use rand::Rng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised before any bit of the buffer is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DamageError {
    /// The requested bit count is zero or larger than the span can hold.
    #[error("cannot flip {requested} bits: region holds {available} bits (need 1..={available})")]
    BitCountExceeded { requested: usize, available: usize },
    /// The span does not lie inside the buffer.
    #[error("span {offset}+{length} lies outside a buffer of {buffer_len} bytes")]
    SpanOutOfBounds {
        offset: usize,
        length: usize,
        buffer_len: usize,
    },
}

/// How the bits to flip are chosen inside a region.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionMode {
    /// Distinct bit positions drawn uniformly without replacement.
    #[default]
    #[serde(alias = "random")]
    Scatter,
    /// One unbroken run of bits starting at a random in-bounds position.
    #[serde(alias = "seq")]
    Contiguous,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Scatter => "scatter",
            SelectionMode::Contiguous => "contiguous",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scatter" | "random" => Ok(SelectionMode::Scatter),
            "contiguous" | "seq" => Ok(SelectionMode::Contiguous),
            other => Err(format!(
                "unknown selection mode '{other}' (expected 'scatter' or 'contiguous')"
            )),
        }
    }
}

/// Chooses `bit_count` region-relative bit indices out of `length * 8`.
///
/// This is the only place the bit-count bound is checked; every caller goes
/// through it before touching a buffer.
pub fn select_bits<R: Rng + ?Sized>(
    length: usize,
    bit_count: usize,
    mode: SelectionMode,
    rng: &mut R,
) -> Result<Vec<usize>, DamageError> {
    let total_bits = length.saturating_mul(8);
    if bit_count == 0 || bit_count > total_bits {
        return Err(DamageError::BitCountExceeded {
            requested: bit_count,
            available: total_bits,
        });
    }

    let indices = match mode {
        SelectionMode::Scatter => index::sample(rng, total_bits, bit_count).into_vec(),
        SelectionMode::Contiguous => {
            let start = rng.random_range(0..=total_bits - bit_count);
            (start..start + bit_count).collect()
        }
    };
    Ok(indices)
}

/// Toggles each absolute bit index in `buffer`.
///
/// Bit `b` lives in byte `b / 8`, at position `b % 8` counted from the
/// least-significant bit. Applying the same indices twice restores the buffer.
///
/// # Panics
/// Panics if an index falls outside the buffer; callers pass indices produced
/// by [`damage`], which validates the span first.
pub fn flip_bits(buffer: &mut [u8], absolute_bits: &[usize]) {
    for &bit in absolute_bits {
        buffer[bit / 8] ^= 1u8 << (bit % 8);
    }
}

/// Flips exactly `bit_count` bits inside `buffer[offset..offset + length]`.
///
/// The buffer is expected to be a working copy, never the pristine source.
/// All validation happens before the first write, so on error the buffer is
/// unchanged.
///
/// # Returns
/// The absolute bit indices that were flipped, in ascending order.
pub fn damage<R: Rng + ?Sized>(
    buffer: &mut [u8],
    offset: usize,
    length: usize,
    bit_count: usize,
    mode: SelectionMode,
    rng: &mut R,
) -> Result<Vec<usize>, DamageError> {
    let in_bounds = offset
        .checked_add(length)
        .is_some_and(|end| end <= buffer.len());
    if !in_bounds {
        return Err(DamageError::SpanOutOfBounds {
            offset,
            length,
            buffer_len: buffer.len(),
        });
    }

    let mut absolute: Vec<usize> = select_bits(length, bit_count, mode, rng)?
        .into_iter()
        .map(|relative| offset * 8 + relative)
        .collect();
    absolute.sort_unstable();
    flip_bits(buffer, &absolute);
    Ok(absolute)
}

/// Bit-flipping engine that owns an injected random generator.
///
/// Two engines seeded identically produce identical corruption for identical
/// requests, which is what makes a reported corruption reproducible.
#[derive(Debug, Clone)]
pub struct CorruptionEngine<R: Rng> {
    rng: R,
}

impl CorruptionEngine<ChaCha8Rng> {
    /// An engine backed by ChaCha8 seeded from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> CorruptionEngine<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Flips `bit_count` bits of `buffer` inside `region`; see [`damage`].
    pub fn damage(
        &mut self,
        buffer: &mut [u8],
        region: &Region,
        bit_count: usize,
        mode: SelectionMode,
    ) -> Result<Vec<usize>, DamageError> {
        damage(
            buffer,
            region.offset,
            region.length,
            bit_count,
            mode,
            &mut self.rng,
        )
    }
}
