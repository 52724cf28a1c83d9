//! ProgressBar and other functionality to report the progress of a run.

use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use drift::progress::{ProgressFactory, StyledProgress};

#[derive(Debug, Clone)]
pub struct Progress {
    mp: Arc<MultiProgress>,
}

#[derive(Debug, Clone)]
pub struct StyledSpinner {
    spinner: ProgressBar,
}

#[derive(Debug, Clone)]
pub struct StyledBar {
    pb: ProgressBar,
}

// ===============================================================================================

impl Progress {
    pub fn new() -> Self {
        Self {
            mp: Arc::new(MultiProgress::with_draw_target(ProgressDrawTarget::stdout())),
        }
    }

    pub fn hidden() -> Self {
        Self {
            mp: Arc::new(MultiProgress::with_draw_target(ProgressDrawTarget::hidden())),
        }
    }

    pub fn new_main_spinner(&self) -> StyledSpinner {
        let spinner = self.mp.add(ProgressBar::new_spinner());
        spinner.set_style(Styles::MainSpinner.style());

        StyledSpinner { spinner }
    }

    pub fn new_bar(&self, len: u64) -> StyledBar {
        let pb = self.mp.add(ProgressBar::new(len));
        pb.set_style(Styles::Pb.style());

        StyledBar { pb }
    }

    /// Blocks until every bar is finished; run it on its own thread.
    pub fn join(&self) {
        self.mp.join().unwrap();
    }
}

impl Default for Progress {
    fn default() -> Self {
        Progress::new()
    }
}

impl ProgressFactory for Progress {
    type Bar = StyledBar;

    fn new_progress_bar(&self, len: u64) -> StyledBar {
        self.new_bar(len)
    }
}

// ===============================================================================================

impl StyledSpinner {
    pub fn enable_steady_tick(&self, ms: u64) {
        self.spinner.enable_steady_tick(ms);
    }

    pub fn println(&self, msg: &str) {
        self.spinner.println(msg);
    }
}

impl StyledProgress for StyledSpinner {
    fn inc(&self, delta: u64) {
        self.spinner.inc(delta);
    }

    fn set_message(&self, msg: &str) {
        self.spinner.set_message(msg);
    }

    fn finish_with_message(&self, msg: &str) {
        self.spinner.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl StyledProgress for StyledBar {
    fn inc(&self, delta: u64) {
        self.pb.inc(delta);
    }

    fn set_message(&self, msg: &str) {
        self.pb.set_message(msg);
    }

    fn finish_with_message(&self, msg: &str) {
        self.pb.finish_with_message(msg);
    }

    fn finish_and_clear(&self) {
        self.pb.finish_and_clear();
    }
}

// ===============================================================================================

enum Styles {
    Pb,
    MainSpinner,
}

impl Styles {
    fn style(&self) -> ProgressStyle {
        use Styles::{MainSpinner, Pb};

        match self {
            Pb => ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:60.cyan/yellow} {pos:>5}/{len:5} {msg}")
                .progress_chars("#>-"),
            MainSpinner => ProgressStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .template("[{elapsed_precise}] {msg} {spinner.green}"),
        }
    }
}
