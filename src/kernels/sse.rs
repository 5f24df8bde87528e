#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use aligned::{Aligned, A16};

use super::{portable, DiffAccumulator, Moments};

const LANES: usize = 8;

pub fn row_diff(a: &[u16], b: &[u16]) -> DiffAccumulator {
    // SAFETY: only reachable through the SSE kernel table, which is handed
    // out after SSE4.1 was detected.
    unsafe { row_diff_sse41(a, b) }
}

pub fn row_moments(a: &[u16], b: &[u16]) -> Moments {
    // SAFETY: see `row_diff`.
    unsafe { row_moments_sse41(a, b) }
}

#[target_feature(enable = "sse4.1")]
unsafe fn row_diff_sse41(a: &[u16], b: &[u16]) -> DiffAccumulator {
    let len = a.len().min(b.len());
    let body = len - len % LANES;
    let zero = _mm_setzero_si128();
    let mut ssd = zero;
    let mut sad = zero;

    let mut i = 0;
    while i < body {
        let va = _mm_loadu_si128(a.as_ptr().add(i).cast());
        let vb = _mm_loadu_si128(b.as_ptr().add(i).cast());
        // |a - b| of unsigned words
        let d = _mm_sub_epi16(_mm_max_epu16(va, vb), _mm_min_epu16(va, vb));
        let lo = _mm_unpacklo_epi16(d, zero);
        let hi = _mm_unpackhi_epi16(d, zero);
        ssd = _mm_add_epi64(ssd, mul_u32_lanes(lo, lo));
        ssd = _mm_add_epi64(ssd, mul_u32_lanes(hi, hi));
        sad = _mm_add_epi64(sad, widen_u32_lanes(_mm_add_epi32(lo, hi)));
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

#[target_feature(enable = "sse4.1")]
unsafe fn row_moments_sse41(a: &[u16], b: &[u16]) -> Moments {
    let len = a.len().min(b.len());
    let body = len - len % LANES;
    let zero = _mm_setzero_si128();
    let mut sum_a = zero;
    let mut sum_b = zero;
    let mut sum_aa = zero;
    let mut sum_bb = zero;
    let mut sum_ab = zero;

    let mut i = 0;
    while i < body {
        let va = _mm_loadu_si128(a.as_ptr().add(i).cast());
        let vb = _mm_loadu_si128(b.as_ptr().add(i).cast());
        let a_lo = _mm_unpacklo_epi16(va, zero);
        let a_hi = _mm_unpackhi_epi16(va, zero);
        let b_lo = _mm_unpacklo_epi16(vb, zero);
        let b_hi = _mm_unpackhi_epi16(vb, zero);

        sum_a = _mm_add_epi64(sum_a, widen_u32_lanes(_mm_add_epi32(a_lo, a_hi)));
        sum_b = _mm_add_epi64(sum_b, widen_u32_lanes(_mm_add_epi32(b_lo, b_hi)));
        sum_aa = _mm_add_epi64(sum_aa, mul_u32_lanes(a_lo, a_lo));
        sum_aa = _mm_add_epi64(sum_aa, mul_u32_lanes(a_hi, a_hi));
        sum_bb = _mm_add_epi64(sum_bb, mul_u32_lanes(b_lo, b_lo));
        sum_bb = _mm_add_epi64(sum_bb, mul_u32_lanes(b_hi, b_hi));
        sum_ab = _mm_add_epi64(sum_ab, mul_u32_lanes(a_lo, b_lo));
        sum_ab = _mm_add_epi64(sum_ab, mul_u32_lanes(a_hi, b_hi));
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

/// Products of four u32 lanes, summed pairwise into two u64 lanes.
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn mul_u32_lanes(x: __m128i, y: __m128i) -> __m128i {
    let even = _mm_mul_epu32(x, y);
    let odd = _mm_mul_epu32(_mm_srli_epi64::<32>(x), _mm_srli_epi64::<32>(y));
    _mm_add_epi64(even, odd)
}

/// Four u32 lanes summed pairwise into two u64 lanes.
#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn widen_u32_lanes(v: __m128i) -> __m128i {
    let zero = _mm_setzero_si128();
    _mm_add_epi64(_mm_unpacklo_epi32(v, zero), _mm_unpackhi_epi32(v, zero))
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn hsum_u64(v: __m128i) -> u64 {
    let mut lanes: Aligned<A16, [u64; 2]> = Aligned([0; 2]);
    _mm_store_si128(lanes.as_mut_ptr().cast(), v);
    lanes[0] + lanes[1]
}
