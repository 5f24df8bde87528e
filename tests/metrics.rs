use ivpsnr::{
    compute_frame_ivpsnr, compute_frame_psnr, compute_frame_ssim, compute_frame_wspsnr, Config,
    Evaluator, IsaTier, IterProvider, Mask, MetricKind, Picture, Plane, Score,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn gray(width: usize, height: usize, f: impl Fn(usize, usize) -> u16) -> Picture {
    let data = (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| f(x, y))
        .collect();
    Picture::gray(width, height, 8, data).unwrap()
}

fn yuv420(seed: u64, width: usize, height: usize) -> Picture {
    let mut rng = StdRng::seed_from_u64(seed);
    let planes = [(width, height), (width / 2, height / 2), (width / 2, height / 2)]
        .iter()
        .map(|&(w, h)| {
            let data = (0..w * h).map(|_| rng.gen_range(16..=235)).collect();
            Plane::from_vec(w, h, data).unwrap()
        })
        .collect();
    Picture::new(planes, 8).unwrap()
}

#[test]
fn constant_offset_psnr() {
    let a = gray(64, 64, |x, y| ((x * 3 + y) % 200) as u16);
    let b = gray(64, 64, |x, y| ((x * 3 + y) % 200) as u16 + 5);
    let result = compute_frame_psnr(&a, &b).unwrap();
    assert_eq!(result.samples, 4096);
    assert!((result.combined.value().unwrap() - 34.15).abs() < 0.01);

    // the same offset everywhere is uniform, so the latitude weights cancel out
    let ws = compute_frame_wspsnr(&a, &b).unwrap();
    assert!((ws.combined.value().unwrap() - result.combined.value().unwrap()).abs() < 1e-9);
}

#[test]
fn luma_error_is_not_hidden_by_clean_chroma() {
    let reference = yuv420(20, 32, 32);
    let planes = reference
        .planes()
        .iter()
        .enumerate()
        .map(|(i, plane)| {
            let offset = if i == 0 { 5 } else { 0 };
            let data = plane.rows().flatten().map(|&v| v + offset).collect();
            Plane::from_vec(plane.width(), plane.height(), data).unwrap()
        })
        .collect();
    let distorted = Picture::new(planes, 8).unwrap();

    let result = compute_frame_psnr(&reference, &distorted).unwrap();
    assert_eq!(result.planes[1], Score::Infinite);
    let expected = 10.0 * (255.0f64 * 255.0 * 6.0 / 100.0).log10();
    assert!((result.combined.value().unwrap() - expected).abs() < 1e-9);

    let frames = |picture: &Picture| IterProvider::new(vec![picture.clone(); 2]);
    let evaluator = Evaluator::new(Config::default().with_metrics(&[MetricKind::Psnr])).unwrap();
    let report = evaluator.evaluate_sequence(&mut frames(&reference), &mut frames(&distorted));
    let summary = report.summary(MetricKind::Psnr).unwrap();
    assert_eq!(summary.finite_frames, 2);
    assert!((summary.mean.unwrap() - expected).abs() < 1e-9);
}

#[test]
fn identical_pictures_score_perfectly() {
    let pic = yuv420(1, 64, 48);
    assert_eq!(compute_frame_psnr(&pic, &pic).unwrap().combined, Score::Infinite);
    assert_eq!(compute_frame_wspsnr(&pic, &pic).unwrap().combined, Score::Infinite);
    assert_eq!(compute_frame_ivpsnr(&pic, &pic).unwrap().combined, Score::Infinite);
    let ssim = compute_frame_ssim(&pic, &pic).unwrap();
    assert!((ssim.combined.value().unwrap() - 1.0).abs() < 1e-12);
}

#[test]
fn ivpsnr_forgives_what_psnr_punishes() {
    let (w, h) = (64, 48);
    let base: Vec<u16> = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x as f64, y as f64)))
        .map(|(x, y)| {
            let v =
                128.0 + 50.0 * (x * 0.45 + y * 0.3).sin() + 30.0 * (y * 0.37 - x * 0.21).cos();
            v as u16 / 2 * 2
        })
        .collect();
    let reference = Picture::gray(w, h, 8, base.clone()).unwrap();
    // one sample to the left, a bit brighter
    let shifted = (0..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .map(|(x, y)| base[y * w + x.saturating_sub(1)] + 6)
        .collect();
    let distorted = Picture::gray(w, h, 8, shifted).unwrap();

    let psnr = compute_frame_psnr(&reference, &distorted).unwrap().combined;
    let iv = compute_frame_ivpsnr(&reference, &distorted).unwrap().combined;
    let (psnr, iv) = (psnr.value().unwrap(), iv.value().unwrap());
    assert!(iv > psnr + 8.0, "IV-PSNR {iv} vs PSNR {psnr}");
}

#[test]
fn every_tier_reports_the_same_scores() {
    let reference = yuv420(2, 80, 48);
    let distorted = yuv420(3, 80, 48);
    let metrics = [MetricKind::Psnr, MetricKind::WsPsnr, MetricKind::Ssim, MetricKind::IvPsnr];
    let run = |tier: IsaTier| {
        let config = Config::default().with_metrics(&metrics).with_max_isa(tier);
        Evaluator::new(config)
            .unwrap()
            .evaluate_frame(0, &reference, &distorted)
            .unwrap()
    };
    let base = run(IsaTier::Portable);
    for tier in IsaTier::available() {
        let report = run(tier);
        for (a, b) in base.results.iter().zip(&report.results) {
            let (a, b) = (a.combined.value().unwrap(), b.combined.value().unwrap());
            assert!((a - b).abs() <= 1e-9 * a.abs().max(1.0), "{tier:?}: {a} vs {b}");
        }
    }
}

#[test]
fn results_do_not_depend_on_the_thread_count() {
    let reference = yuv420(4, 96, 64);
    let distorted = yuv420(5, 96, 64);
    let run = |threads| {
        Evaluator::new(
            Config::default()
                .with_threads(threads)
                .with_metrics(&[MetricKind::IvPsnr, MetricKind::Ssim]),
        )
        .unwrap()
        .evaluate_frame(0, &reference, &distorted)
        .unwrap()
    };
    let one = run(1);
    for threads in [2, 8, 64] {
        assert_eq!(run(threads), one);
    }
}

#[test]
fn masked_regions_are_ignored() {
    let a = gray(32, 32, |x, _| x as u16);
    let b = gray(32, 32, |x, y| if y < 16 { x as u16 } else { 200 });
    let flags = (0..32 * 32).map(|i| i / 32 < 16).collect();
    let b = b.with_mask(Mask::new(32, 32, flags).unwrap()).unwrap();
    let result = compute_frame_psnr(&a, &b).unwrap();
    assert_eq!(result.samples, 32 * 16);
    assert_eq!(result.combined, Score::Infinite);
}

#[test]
fn sequences_are_summarized() {
    let evaluator =
        Evaluator::new(Config::default().with_metrics(&[MetricKind::Psnr, MetricKind::IvPsnr]))
            .unwrap();
    let frames: Vec<Picture> = (0..3).map(|i| yuv420(10 + i, 32, 32)).collect();
    let mut reference = IterProvider::new(frames.clone());
    let mut distorted = IterProvider::new(frames);
    let report = evaluator.evaluate_sequence(&mut reference, &mut distorted);
    assert!(report.is_complete());
    assert_eq!(report.frames.len(), 3);
    for summary in &report.summaries {
        assert_eq!(summary.infinite_frames, 3);
        assert_eq!(summary.mean, None);
    }
}
