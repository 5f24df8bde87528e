use crate::error::{Error, Result};
use crate::kernels::{DiffAccumulator, KernelTable};
use crate::picture::{joint_plane_mask, Mask, Picture, Plane, PlaneView};
use crate::pool::WorkerPool;

/// SSD and SAD between two equally sized views.
///
/// `mask` is in plane coordinates; samples it marks invalid are skipped and
/// not counted.
///
/// # Errors
/// - If the views differ in size
/// - If the mask does not cover the views
pub fn plane_distortion(
    kernels: &KernelTable,
    a: &PlaneView<'_>,
    b: &PlaneView<'_>,
    mask: Option<&Mask>,
) -> Result<DiffAccumulator> {
    if a.width() != b.width() || a.height() != b.height() {
        return Err(Error::DimensionMismatch {
            plane: 0,
            ref_width: a.width(),
            ref_height: a.height(),
            dist_width: b.width(),
            dist_height: b.height(),
        });
    }
    let region = a.region();
    if let Some(mask) = mask {
        if !region.fits(mask.width(), mask.height()) {
            return Err(Error::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                plane_width: mask.width(),
                plane_height: mask.height(),
            });
        }
    }

    let mut acc = DiffAccumulator::default();
    for y in 0..a.height() {
        acc += match mask {
            Some(mask) => {
                let flags = &mask.row(region.y + y)[region.x..region.x + region.width];
                (kernels.row_diff_masked)(a.row(y), b.row(y), flags)
            }
            None => (kernels.row_diff)(a.row(y), b.row(y)),
        };
    }
    Ok(acc)
}

/// [`plane_distortion`] over whole planes, split into row bands that run on
/// the pool.
///
/// # Errors
/// See [`plane_distortion`].
pub fn plane_distortion_parallel(
    pool: &WorkerPool,
    kernels: &KernelTable,
    a: &Plane,
    b: &Plane,
    mask: Option<&Mask>,
    tile_rows: usize,
) -> Result<DiffAccumulator> {
    let parts = pool.for_each_region(a.width(), a.height(), a.width(), tile_rows, |region| {
        plane_distortion(kernels, &a.view(region)?, &b.view(region)?, mask)
    })?;
    Ok(parts.into_iter().sum())
}

/// Per-plane SSD/SAD of two compatible pictures, honoring their masks.
///
/// # Errors
/// - If the pictures are not compatible
pub fn picture_distortion(
    pool: &WorkerPool,
    kernels: &KernelTable,
    reference: &Picture,
    distorted: &Picture,
    tile_rows: usize,
) -> Result<Vec<DiffAccumulator>> {
    reference.check_compatible(distorted)?;
    (0..reference.num_planes())
        .map(|i| {
            let mask = joint_plane_mask(reference, distorted, i);
            plane_distortion_parallel(
                pool,
                kernels,
                reference.plane(i),
                distorted.plane(i),
                mask.as_ref(),
                tile_rows,
            )
        })
        .collect()
}

/// Sum of absolute differences between a block of `b` at `(bx, by)` and the
/// block of `a` at `(ax, ay)`. Both blocks must lie inside their planes.
/// `mask` is sized like `b` and drops the samples of `b` it marks invalid.
pub(crate) fn block_sad(
    kernels: &KernelTable,
    a: &Plane,
    (ax, ay): (usize, usize),
    b: &Plane,
    (bx, by): (usize, usize),
    (width, height): (usize, usize),
    mask: Option<&Mask>,
) -> u64 {
    let mut sad = 0;
    for row in 0..height {
        let ra = &a.row(ay + row)[ax..ax + width];
        let rb = &b.row(by + row)[bx..bx + width];
        sad += match mask {
            Some(mask) => (kernels.row_diff_masked)(ra, rb, &mask.row(by + row)[bx..bx + width]),
            None => (kernels.row_diff)(ra, rb),
        }
        .sad;
    }
    sad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::IsaTier;
    use crate::picture::Region;

    fn gray(width: usize, height: usize, f: impl Fn(usize, usize) -> u16) -> Picture {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Picture::gray(width, height, 8, data).unwrap()
    }

    #[test]
    fn identical_pictures_have_no_distortion() {
        let pool = WorkerPool::new(4).unwrap();
        let pic = gray(37, 19, |x, y| ((x * 7 + y * 3) % 256) as u16);
        for tier in IsaTier::available() {
            let kernels = KernelTable::for_tier(tier).unwrap();
            let acc = picture_distortion(&pool, kernels, &pic, &pic, 4).unwrap();
            assert_eq!(acc[0].ssd, 0);
            assert_eq!(acc[0].sad, 0);
            assert_eq!(acc[0].count, 37 * 19);
        }
    }

    #[test]
    fn constant_offset_sums() {
        let pool = WorkerPool::new(2).unwrap();
        let a = gray(64, 64, |x, y| ((x + y) % 200) as u16);
        let b = gray(64, 64, |x, y| ((x + y) % 200) as u16 + 5);
        let acc = picture_distortion(&pool, KernelTable::detected(), &a, &b, 7).unwrap();
        assert_eq!(acc[0].ssd, 64 * 64 * 25);
        assert_eq!(acc[0].sad, 64 * 64 * 5);
        assert_eq!(acc[0].count, 64 * 64);
    }

    #[test]
    fn masks_reduce_the_sample_count() {
        let pool = WorkerPool::new(2).unwrap();
        let a = gray(8, 8, |_, _| 10);
        let flags = (0..64).map(|i| i % 8 < 4).collect();
        let b = gray(8, 8, |_, _| 12)
            .with_mask(Mask::new(8, 8, flags).unwrap())
            .unwrap();
        let acc = picture_distortion(&pool, KernelTable::detected(), &a, &b, 3).unwrap();
        assert_eq!(acc[0].count, 32);
        assert_eq!(acc[0].ssd, 32 * 4);
    }

    #[test]
    fn mismatched_views_are_rejected() {
        let a = Plane::new(4, 4);
        let b = Plane::new(4, 4);
        let va = a.view(Region::new(0, 0, 4, 4)).unwrap();
        let vb = b.view(Region::new(0, 0, 2, 4)).unwrap();
        assert!(plane_distortion(KernelTable::detected(), &va, &vb, None).is_err());
    }

    #[test]
    fn block_sad_uses_both_origins() {
        let a = Plane::from_vec(4, 4, (0..16).collect()).unwrap();
        let b = Plane::new(4, 4);
        let sad = block_sad(KernelTable::detected(), &a, (2, 2), &b, (0, 0), (2, 2), None);
        assert_eq!(sad, 10 + 11 + 14 + 15);

        let mut flags = vec![true; 16];
        flags[1] = false;
        let mask = Mask::new(4, 4, flags).unwrap();
        let sad = block_sad(KernelTable::detected(), &a, (2, 2), &b, (0, 0), (2, 2), Some(&mask));
        assert_eq!(sad, 10 + 14 + 15);
    }
}
