#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{portable, DiffAccumulator};

const LANES: usize = 32;

pub fn row_diff(a: &[u16], b: &[u16]) -> DiffAccumulator {
    // SAFETY: only reachable through the AVX-512 kernel table, which is
    // handed out after AVX-512 F and BW were detected.
    unsafe { row_diff_avx512(a, b) }
}

#[target_feature(enable = "avx512f,avx512bw")]
unsafe fn row_diff_avx512(a: &[u16], b: &[u16]) -> DiffAccumulator {
    let len = a.len().min(b.len());
    let body = len - len % LANES;
    let zero = _mm512_setzero_si512();
    let mut ssd = zero;
    let mut sad = zero;

    let mut i = 0;
    while i < body {
        let va = _mm512_loadu_si512(a.as_ptr().add(i).cast());
        let vb = _mm512_loadu_si512(b.as_ptr().add(i).cast());
        let d = _mm512_sub_epi16(_mm512_max_epu16(va, vb), _mm512_min_epu16(va, vb));
        let lo = _mm512_unpacklo_epi16(d, zero);
        let hi = _mm512_unpackhi_epi16(d, zero);

        ssd = _mm512_add_epi64(ssd, _mm512_mul_epu32(lo, lo));
        let lo_odd = _mm512_srli_epi64::<32>(lo);
        ssd = _mm512_add_epi64(ssd, _mm512_mul_epu32(lo_odd, lo_odd));
        ssd = _mm512_add_epi64(ssd, _mm512_mul_epu32(hi, hi));
        let hi_odd = _mm512_srli_epi64::<32>(hi);
        ssd = _mm512_add_epi64(ssd, _mm512_mul_epu32(hi_odd, hi_odd));

        let s = _mm512_add_epi32(lo, hi);
        sad = _mm512_add_epi64(sad, _mm512_unpacklo_epi32(s, zero));
        sad = _mm512_add_epi64(sad, _mm512_unpackhi_epi32(s, zero));
        i += LANES;
    }

    let mut acc = DiffAccumulator {
        ssd: _mm512_reduce_add_epi64(ssd) as u64,
        sad: _mm512_reduce_add_epi64(sad) as u64,
        count: body as u64,
    };
    acc += portable::row_diff(&a[body..len], &b[body..len]);
    acc
}
