//! Row kernels and the dispatch table that binds them to the best
//! instruction set available at runtime.
//!
//! Every tier computes exact integer sums, so swapping tiers never changes
//! results. Tiers only specialize the kernels that profit from it and borrow
//! the lower tier's implementation for the rest.

mod portable;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod avx;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod avx512;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod sse;

use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::OnceLock;

/// Instruction set tiers, ordered from least to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IsaTier {
    Portable,
    /// SSE4.1
    Sse,
    /// AVX2
    Avx,
    /// AVX-512 F and BW
    Avx512,
}

static DETECTED: OnceLock<IsaTier> = OnceLock::new();

fn detect_tier() -> IsaTier {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if is_x86_feature_detected!("avx512f")
            && is_x86_feature_detected!("avx512bw")
            && is_x86_feature_detected!("avx2")
        {
            return IsaTier::Avx512;
        }
        if is_x86_feature_detected!("avx2") {
            return IsaTier::Avx;
        }
        if is_x86_feature_detected!("sse4.1") {
            return IsaTier::Sse;
        }
    }
    IsaTier::Portable
}

impl IsaTier {
    pub const ALL: [IsaTier; 4] = [Self::Portable, Self::Sse, Self::Avx, Self::Avx512];

    /// The richest tier this CPU supports. Probed once per process.
    #[must_use]
    pub fn detected() -> Self {
        *DETECTED.get_or_init(detect_tier)
    }

    #[must_use]
    pub fn is_supported(self) -> bool {
        self <= Self::detected()
    }

    /// All tiers usable on this CPU, lowest first.
    #[must_use]
    pub fn available() -> Vec<Self> {
        Self::ALL.into_iter().filter(|t| t.is_supported()).collect()
    }
}

/// Sum of squared and absolute differences over `count` sample pairs.
///
/// Merging is plain addition, so partial results from any number of regions
/// can be combined in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffAccumulator {
    pub ssd: u64,
    pub sad: u64,
    pub count: u64,
}

impl DiffAccumulator {
    #[must_use]
    pub fn mse(&self) -> Option<f64> {
        (self.count > 0).then(|| self.ssd as f64 / self.count as f64)
    }
}

impl Add for DiffAccumulator {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        DiffAccumulator {
            ssd: self.ssd + rhs.ssd,
            sad: self.sad + rhs.sad,
            count: self.count + rhs.count,
        }
    }
}

impl AddAssign for DiffAccumulator {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for DiffAccumulator {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// First and second order sums of two sample sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Moments {
    pub sum_a: u64,
    pub sum_b: u64,
    pub sum_aa: u64,
    pub sum_bb: u64,
    pub sum_ab: u64,
    pub count: u64,
}

impl Add for Moments {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Moments {
            sum_a: self.sum_a + rhs.sum_a,
            sum_b: self.sum_b + rhs.sum_b,
            sum_aa: self.sum_aa + rhs.sum_aa,
            sum_bb: self.sum_bb + rhs.sum_bb,
            sum_ab: self.sum_ab + rhs.sum_ab,
            count: self.count + rhs.count,
        }
    }
}

impl AddAssign for Moments {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Moments {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

pub type RowDiffFn = fn(&[u16], &[u16]) -> DiffAccumulator;
pub type RowDiffMaskedFn = fn(&[u16], &[u16], &[bool]) -> DiffAccumulator;
pub type RowMomentsFn = fn(&[u16], &[u16]) -> Moments;

/// Function pointers for one instruction set tier.
///
/// Rows passed to the kernels must have equal length (the mask too).
#[derive(Clone, Copy)]
pub struct KernelTable {
    tier: IsaTier,
    pub row_diff: RowDiffFn,
    pub row_diff_masked: RowDiffMaskedFn,
    pub row_moments: RowMomentsFn,
}

impl std::fmt::Debug for KernelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTable").field("tier", &self.tier).finish()
    }
}

static PORTABLE: KernelTable = KernelTable {
    tier: IsaTier::Portable,
    row_diff: portable::row_diff,
    row_diff_masked: portable::row_diff_masked,
    row_moments: portable::row_moments,
};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
static SSE: KernelTable = KernelTable {
    tier: IsaTier::Sse,
    row_diff: sse::row_diff,
    row_diff_masked: portable::row_diff_masked,
    row_moments: sse::row_moments,
};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
static AVX: KernelTable = KernelTable {
    tier: IsaTier::Avx,
    row_diff: avx::row_diff,
    row_diff_masked: portable::row_diff_masked,
    row_moments: avx::row_moments,
};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
static AVX512: KernelTable = KernelTable {
    tier: IsaTier::Avx512,
    row_diff: avx512::row_diff,
    row_diff_masked: portable::row_diff_masked,
    row_moments: avx::row_moments,
};

impl KernelTable {
    /// Table for the richest supported tier.
    #[must_use]
    pub fn detected() -> &'static Self {
        Self::select(None)
    }

    /// Table for `tier`, or `None` if the CPU does not support it.
    #[must_use]
    pub fn for_tier(tier: IsaTier) -> Option<&'static Self> {
        if !tier.is_supported() {
            return None;
        }
        match tier {
            IsaTier::Portable => Some(&PORTABLE),
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            IsaTier::Sse => Some(&SSE),
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            IsaTier::Avx => Some(&AVX),
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            IsaTier::Avx512 => Some(&AVX512),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Table for the richest supported tier not above `max`.
    #[must_use]
    pub fn select(max: Option<IsaTier>) -> &'static Self {
        let cap = max.map_or(IsaTier::detected(), |m| m.min(IsaTier::detected()));
        IsaTier::ALL
            .into_iter()
            .rev()
            .filter(|&t| t <= cap)
            .find_map(Self::for_tier)
            .unwrap_or(&PORTABLE)
    }

    #[must_use]
    pub fn tier(&self) -> IsaTier {
        self.tier
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn random_row(rng: &mut StdRng, len: usize, max: u16) -> Vec<u16> {
        (0..len).map(|_| rng.gen_range(0..=max)).collect()
    }

    #[test]
    fn portable_matches_hand_computed_sums() {
        let acc = (PORTABLE.row_diff)(&[10, 20, 30], &[12, 20, 25]);
        assert_eq!(
            acc,
            DiffAccumulator {
                ssd: 4 + 25,
                sad: 2 + 5,
                count: 3
            }
        );
        let m = (PORTABLE.row_moments)(&[1, 2], &[3, 4]);
        assert_eq!(m.sum_a, 3);
        assert_eq!(m.sum_b, 7);
        assert_eq!(m.sum_aa, 5);
        assert_eq!(m.sum_bb, 25);
        assert_eq!(m.sum_ab, 11);
        assert_eq!(m.count, 2);
    }

    #[test]
    fn masked_rows_skip_invalid_samples() {
        let acc = (PORTABLE.row_diff_masked)(&[0, 0, 0], &[1, 2, 3], &[true, false, true]);
        assert_eq!(
            acc,
            DiffAccumulator {
                ssd: 10,
                sad: 4,
                count: 2
            }
        );
    }

    #[test]
    fn every_available_tier_agrees_with_portable() {
        let mut rng = StdRng::seed_from_u64(7);
        // lengths straddle every vector width and remainder
        for len in [0, 1, 7, 8, 15, 16, 31, 33, 64, 100, 257] {
            for max in [255u16, 1023, u16::MAX] {
                let a = random_row(&mut rng, len, max);
                let b = random_row(&mut rng, len, max);
                let expected_diff = (PORTABLE.row_diff)(&a, &b);
                let expected_moments = (PORTABLE.row_moments)(&a, &b);
                for tier in IsaTier::available() {
                    let table = KernelTable::for_tier(tier).unwrap();
                    assert_eq!((table.row_diff)(&a, &b), expected_diff, "{tier:?} len {len}");
                    assert_eq!(
                        (table.row_moments)(&a, &b),
                        expected_moments,
                        "{tier:?} len {len}"
                    );
                }
            }
        }
    }

    #[test]
    fn extreme_samples_do_not_overflow() {
        let a = vec![u16::MAX; 4096];
        let b = vec![0u16; 4096];
        let expected = 4096 * u64::from(u16::MAX) * u64::from(u16::MAX);
        for tier in IsaTier::available() {
            let table = KernelTable::for_tier(tier).unwrap();
            assert_eq!((table.row_diff)(&a, &b).ssd, expected);
            assert_eq!((table.row_moments)(&a, &b).sum_aa, expected);
        }
    }

    #[test]
    fn select_respects_the_cap() {
        assert_eq!(KernelTable::select(Some(IsaTier::Portable)).tier(), IsaTier::Portable);
        assert_eq!(KernelTable::detected().tier(), IsaTier::detected());
        assert!(KernelTable::select(Some(IsaTier::Avx512)).tier() <= IsaTier::detected());
    }

    #[test]
    fn accumulators_merge_by_addition() {
        let parts = [
            DiffAccumulator { ssd: 1, sad: 1, count: 1 },
            DiffAccumulator { ssd: 4, sad: 2, count: 1 },
        ];
        let total: DiffAccumulator = parts.into_iter().sum();
        assert_eq!(total, DiffAccumulator { ssd: 5, sad: 3, count: 2 });
        assert_eq!(total.mse(), Some(2.5));
        assert_eq!(DiffAccumulator::default().mse(), None);
    }
}
