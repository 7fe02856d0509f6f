use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::io::IsTerminal;
use std::sync::Mutex;

/// Stages reported during a covariance fit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FitProgressStage {
    MarginalVariances,
    PairwiseCovariances,
}

impl FitProgressStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::MarginalVariances => "marginal variances",
            Self::PairwiseCovariances => "pairwise covariances",
        }
    }
}

impl fmt::Display for FitProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting incremental progress while fitting.
///
/// Pair evaluation may run on several threads, so callbacks take `&self` and
/// `processed` counts may arrive slightly out of order.
pub trait FitProgressObserver: Sync {
    fn on_stage_start(&self, stage: FitProgressStage, total: usize) {
        let _ = (stage, total);
    }
    fn on_stage_advance(&self, stage: FitProgressStage, processed: usize) {
        let _ = (stage, processed);
    }
    fn on_stage_finish(&self, stage: FitProgressStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopFitProgress;

impl FitProgressObserver for NoopFitProgress {}

/// Terminal progress bar on stderr; hidden when stderr is not a terminal.
#[derive(Default)]
pub struct ConsoleFitProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleFitProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

impl FitProgressObserver for ConsoleFitProgress {
    fn on_stage_start(&self, stage: FitProgressStage, total: usize) {
        let pb = create_progress_bar(total as u64, stage.describe());
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_stage_advance(&self, stage: FitProgressStage, processed: usize) {
        let _ = stage;
        if let Ok(slot) = self.bar.lock() {
            if let Some(pb) = slot.as_ref() {
                if (processed as u64) > pb.position() {
                    pb.set_position(processed as u64);
                }
            }
        }
    }

    fn on_stage_finish(&self, stage: FitProgressStage) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_with_message(format!("{stage} done"));
            }
        }
    }
}
