// tests/pipeline_tests.rs
use anyhow::Result;
use markheat::Reporter;
use markheat_core::{AnalysisConfig, ShapeClass};
use markheat_cv::pipeline::{MarkerAnalyzer, NoopObserver, RunOutcome};
use markheat_cv::{MemorySource, PostProcessor};

/// Solid disk in pure blue, which falls inside the default circle range
fn blue_disk_frame(width: u32, height: u32, disks: &[(i32, i32, i32)]) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        let inside = disks.iter().any(|&(cx, cy, r)| {
            let (dx, dy) = (x as i32 - cx, y as i32 - cy);
            dx * dx + dy * dy <= r * r
        });
        if inside {
            image::Rgb([0, 0, 255])
        } else {
            image::Rgb([0, 0, 0])
        }
    })
}

fn widened_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.circle.max_radius_ratio = 0.2;
    config
}

fn csv_rows(reporter: &Reporter) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(reporter.path(markheat::report::DETECTIONS_FILE))?;
    Ok(text.lines().skip(1).map(String::from).collect())
}

#[test]
fn test_single_circle_end_to_end() -> Result<()> {
    let frame = blue_disk_frame(100, 100, &[(50, 50, 10)]);
    let mut source = MemorySource::from_rgb_images(&[frame], 30.0)?;
    let config = widened_config();
    let analyzer = MarkerAnalyzer::new(config.clone())?;

    let RunOutcome::Completed(report) = analyzer.run(&mut source, &mut NoopObserver)? else {
        panic!("the blue disk should be detected");
    };

    assert_eq!(report.detections.len(), 1);
    let detection = report.detections[0];
    assert_eq!(detection.class, ShapeClass::Circle);
    assert!((detection.x - 50.0).abs() <= 1.0, "x = {}", detection.x);
    assert!((detection.y - 50.0).abs() <= 1.0, "y = {}", detection.y);
    assert!((detection.size - 10.0).abs() <= 1.0, "r = {}", detection.size);
    assert_eq!(report.accumulator.combined().mass()?, 1.0);

    let dir = tempfile::tempdir()?;
    let reporter = Reporter::create(dir.path())?;
    let artifacts = report.post_process(&PostProcessor::new(&config))?;
    reporter.write_report(&report, &artifacts, &config)?;

    let rows = csv_rows(&reporter)?;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("0,0.000,"));
    assert!(rows[0].contains(",circle,r="));

    for name in [
        "heatmap_overlay.png",
        "heatmap_color.png",
        "heatmap_circle_color.png",
        "heatmap_square_color.png",
        "heatmap_raw.tiff",
        "mask.png",
        "marker_regions.png",
        "summary.json",
    ] {
        assert!(reporter.path(name).exists(), "{} missing", name);
    }

    let overlay = image::open(reporter.path("heatmap_overlay.png"))?;
    assert_eq!((overlay.width(), overlay.height()), (100, 100));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(reporter.path("summary.json"))?)?;
    assert_eq!(summary["detections"], 1);
    assert_eq!(summary["stats"]["circles"], 1);
    Ok(())
}

#[test]
fn test_background_only_reports_no_detections() -> Result<()> {
    let frame = image::RgbImage::from_pixel(100, 100, image::Rgb([40, 40, 40]));
    let mut source = MemorySource::from_rgb_images(&[frame.clone(), frame], 30.0)?;
    let dir = tempfile::tempdir()?;
    let reporter = Reporter::create(dir.path())?;

    match MarkerAnalyzer::new(widened_config())?.run(&mut source, &mut NoopObserver)? {
        RunOutcome::NoDetections { stats, .. } => {
            assert_eq!(stats.frames_processed, 2);
            assert_eq!(stats.detections(), 0);
        }
        RunOutcome::Completed(_) => panic!("background must not produce detections"),
    }

    assert_eq!(std::fs::read_dir(reporter.out_dir())?.count(), 0);
    Ok(())
}

#[test]
fn test_heatmap_mass_matches_detection_count() -> Result<()> {
    let frames: Vec<image::RgbImage> = (0..5)
        .map(|i| {
            let shift = i * 7;
            blue_disk_frame(
                160,
                120,
                &[(30 + shift, 40, 8), (110, 30 + shift, 9), (80, 95, 7)],
            )
        })
        .collect();
    let mut source = MemorySource::from_rgb_images(&frames, 25.0)?;

    let RunOutcome::Completed(report) =
        MarkerAnalyzer::new(widened_config())?.run(&mut source, &mut NoopObserver)?
    else {
        panic!("disks should be detected");
    };

    let total = report.detections.len() as f64;
    assert_eq!(total, 15.0);
    assert_eq!(report.accumulator.combined().mass()?, total);
    let per_class: f64 = [ShapeClass::Circle, ShapeClass::Square]
        .iter()
        .map(|&class| report.accumulator.class(class).mass())
        .sum::<Result<f64>>()?;
    assert_eq!(per_class, total);

    let frame_order: Vec<u64> = report.detections.iter().map(|d| d.frame_index).collect();
    let mut sorted = frame_order.clone();
    sorted.sort();
    assert_eq!(frame_order, sorted);
    Ok(())
}
