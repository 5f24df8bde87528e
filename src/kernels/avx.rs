#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use aligned::{Aligned, A32};

use super::{portable, DiffAccumulator, Moments};

const LANES: usize = 16;

pub fn row_diff(a: &[u16], b: &[u16]) -> DiffAccumulator {
    // SAFETY: only reachable through the AVX kernel tables, which are handed
    // out after AVX2 was detected.
    unsafe { row_diff_avx2(a, b) }
}

pub fn row_moments(a: &[u16], b: &[u16]) -> Moments {
    // SAFETY: see `row_diff`.
    unsafe { row_moments_avx2(a, b) }
}

#[target_feature(enable = "avx2")]
unsafe fn row_diff_avx2(a: &[u16], b: &[u16]) -> DiffAccumulator {
    let len = a.len().min(b.len());
    let body = len - len % LANES;
    let zero = _mm256_setzero_si256();
    let mut ssd = zero;
    let mut sad = zero;

    let mut i = 0;
    while i < body {
        let va = _mm256_loadu_si256(a.as_ptr().add(i).cast());
        let vb = _mm256_loadu_si256(b.as_ptr().add(i).cast());
        let d = _mm256_sub_epi16(_mm256_max_epu16(va, vb), _mm256_min_epu16(va, vb));
        // in-lane unpacks reorder samples, which sums do not care about
        let lo = _mm256_unpacklo_epi16(d, zero);
        let hi = _mm256_unpackhi_epi16(d, zero);
        ssd = _mm256_add_epi64(ssd, mul_u32_lanes(lo, lo));
        ssd = _mm256_add_epi64(ssd, mul_u32_lanes(hi, hi));
        sad = _mm256_add_epi64(sad, widen_u32_lanes(_mm256_add_epi32(lo, hi)));
        i += LANES;
    }

    let mut acc = DiffAccumulator {
        ssd: hsum_u64(ssd),
        sad: hsum_u64(sad),
        count: body as u64,
    };
    acc += portable::row_diff(&a[body..len], &b[body..len]);
    acc
}

#[target_feature(enable = "avx2")]
unsafe fn row_moments_avx2(a: &[u16], b: &[u16]) -> Moments {
    let len = a.len().min(b.len());
    let body = len - len % LANES;
    let zero = _mm256_setzero_si256();
    let mut sum_a = zero;
    let mut sum_b = zero;
    let mut sum_aa = zero;
    let mut sum_bb = zero;
    let mut sum_ab = zero;

    let mut i = 0;
    while i < body {
        let va = _mm256_loadu_si256(a.as_ptr().add(i).cast());
        let vb = _mm256_loadu_si256(b.as_ptr().add(i).cast());
        let a_lo = _mm256_unpacklo_epi16(va, zero);
        let a_hi = _mm256_unpackhi_epi16(va, zero);
        let b_lo = _mm256_unpacklo_epi16(vb, zero);
        let b_hi = _mm256_unpackhi_epi16(vb, zero);

        sum_a = _mm256_add_epi64(sum_a, widen_u32_lanes(_mm256_add_epi32(a_lo, a_hi)));
        sum_b = _mm256_add_epi64(sum_b, widen_u32_lanes(_mm256_add_epi32(b_lo, b_hi)));
        sum_aa = _mm256_add_epi64(sum_aa, mul_u32_lanes(a_lo, a_lo));
        sum_aa = _mm256_add_epi64(sum_aa, mul_u32_lanes(a_hi, a_hi));
        sum_bb = _mm256_add_epi64(sum_bb, mul_u32_lanes(b_lo, b_lo));
        sum_bb = _mm256_add_epi64(sum_bb, mul_u32_lanes(b_hi, b_hi));
        sum_ab = _mm256_add_epi64(sum_ab, mul_u32_lanes(a_lo, b_lo));
        sum_ab = _mm256_add_epi64(sum_ab, mul_u32_lanes(a_hi, b_hi));
        i += LANES;
    }

    let mut m = Moments {
        sum_a: hsum_u64(sum_a),
        sum_b: hsum_u64(sum_b),
        sum_aa: hsum_u64(sum_aa),
        sum_bb: hsum_u64(sum_bb),
        sum_ab: hsum_u64(sum_ab),
        count: body as u64,
    };
    m += portable::row_moments(&a[body..len], &b[body..len]);
    m
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn mul_u32_lanes(x: __m256i, y: __m256i) -> __m256i {
    let even = _mm256_mul_epu32(x, y);
    let odd = _mm256_mul_epu32(_mm256_srli_epi64::<32>(x), _mm256_srli_epi64::<32>(y));
    _mm256_add_epi64(even, odd)
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn widen_u32_lanes(v: __m256i) -> __m256i {
    let zero = _mm256_setzero_si256();
    _mm256_add_epi64(
        _mm256_unpacklo_epi32(v, zero),
        _mm256_unpackhi_epi32(v, zero),
    )
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn hsum_u64(v: __m256i) -> u64 {
    let mut lanes: Aligned<A32, [u64; 4]> = Aligned([0; 4]);
    _mm256_store_si256(lanes.as_mut_ptr().cast(), v);
    lanes.iter().sum()
}
