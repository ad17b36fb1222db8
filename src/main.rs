use anyhow::{Context, Result};
use clap::Parser;
use markheat::{Args, ProgressReporter, Reporter};
use markheat_cv::pipeline::{MarkerAnalyzer, RunOutcome};
use markheat_cv::{PostProcessor, VideoFileSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn run(
    analyzer: &MarkerAnalyzer,
    args: &Args,
    progress: &mut ProgressReporter<'_>,
) -> Result<RunOutcome> {
    #[cfg(feature = "parallel")]
    {
        if args.workers > 1 {
            let video = &args.video;
            return analyzer.run_parallel(|| VideoFileSource::open(video), args.workers, &*progress);
        }
    }

    let mut source = VideoFileSource::open(&args.video)?;
    analyzer.run(&mut source, progress)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.analysis_config()?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    let analyzer = MarkerAnalyzer::new(config)?.with_cancel_flag(cancel);
    let reporter = Reporter::create(&args.out)?;
    let mut progress = ProgressReporter::new(&reporter, !args.no_progress);

    let report = match run(&analyzer, &args, &mut progress)? {
        RunOutcome::NoDetections { stats, .. } => {
            log::warn!(
                "No markers detected in {} frames. Try widening --hsv-circle / --hsv-square, \
                 loosening the size and shape thresholds, or choosing a better --roi.",
                stats.frames_processed
            );
            return Ok(());
        }
        RunOutcome::Completed(report) => report,
    };

    let artifacts = report.post_process(&PostProcessor::new(analyzer.config()))?;
    reporter.write_report(&report, &artifacts, analyzer.config())?;
    log::info!("All outputs written to {:?}", reporter.out_dir());
    Ok(())
}
