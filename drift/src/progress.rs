//! Progress reporting seams.
//!
//! The engines only talk to these traits; the CLI supplies an indicatif
//! implementation and tests run with [`Quiet`].

pub trait StyledProgress {
    fn inc(&self, delta: u64);
    fn set_message(&self, msg: &str);
    fn finish_with_message(&self, msg: &str);
    fn finish_and_clear(&self);
}

pub trait ProgressFactory {
    type Bar: StyledProgress;

    fn new_progress_bar(&self, len: u64) -> Self::Bar;
}

/// A factory that reports nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Quiet;

impl ProgressFactory for Quiet {
    type Bar = Quiet;

    fn new_progress_bar(&self, _len: u64) -> Quiet {
        Quiet
    }
}

impl StyledProgress for Quiet {
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: &str) {}
    fn finish_with_message(&self, _msg: &str) {}
    fn finish_and_clear(&self) {}
}
