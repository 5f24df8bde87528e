use super::{DiffAccumulator, Moments};

pub fn row_diff(a: &[u16], b: &[u16]) -> DiffAccumulator {
    debug_assert_eq!(a.len(), b.len());
    let (ssd, sad) = a.iter().zip(b).fold((0u64, 0u64), |(ssd, sad), (&x, &y)| {
        let d = u64::from(x.abs_diff(y));
        (ssd + d * d, sad + d)
    });
    DiffAccumulator {
        ssd,
        sad,
        count: a.len().min(b.len()) as u64,
    }
}

pub fn row_diff_masked(a: &[u16], b: &[u16], mask: &[bool]) -> DiffAccumulator {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), mask.len());
    let mut acc = DiffAccumulator::default();
    for ((&x, &y), &valid) in a.iter().zip(b).zip(mask) {
        if valid {
            let d = u64::from(x.abs_diff(y));
            acc.ssd += d * d;
            acc.sad += d;
            acc.count += 1;
        }
    }
    acc
}

pub fn row_moments(a: &[u16], b: &[u16]) -> Moments {
    debug_assert_eq!(a.len(), b.len());
    let mut m = Moments::default();
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (u64::from(x), u64::from(y));
        m.sum_a += x;
        m.sum_b += y;
        m.sum_aa += x * x;
        m.sum_bb += y * y;
        m.sum_ab += x * y;
    }
    m.count = a.len().min(b.len()) as u64;
    m
}
