use atomic_counter::{AtomicCounter, RelaxedCounter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often a drawn bar catches up with its counter, in milliseconds.
pub const REFRESH_RATE: u64 = 100;

/// Progress of a single analysis stage.
///
/// Workers tick a RelaxedCounter and a background thread copies the count
/// onto the indicatif bar, so scoped threads never contend for the bar.
/// Bars of stages that are not verbose count but are never drawn.
pub struct Bar {
    counter: Arc<RelaxedCounter>,
    pbar: Arc<ProgressBar>,
}

impl Bar {
    /// A bar of `len` steps labelled by `prefix`.
    pub fn stage(len: usize, prefix: &str, verbose: bool) -> Self {
        let pbar = Arc::new(ProgressBar::hidden());
        pbar.set_length(len as u64);
        pbar.set_prefix(format!("{:<24}", prefix));
        pbar.set_style(ProgressStyle::default_bar()
            .template("{prefix}[{bar:40}] [{elapsed_precise}] {percent:>3}%")
            .progress_chars("=>-"));
        let counter = Arc::new(RelaxedCounter::new(0));
        if verbose {
            pbar.set_draw_target(ProgressDrawTarget::stderr());
            let (bar, count) = (pbar.clone(), counter.clone());
            thread::spawn(move || {
                while Arc::strong_count(&count) > 1 && !bar.is_finished() {
                    bar.set_position(count.get() as u64);
                    thread::sleep(Duration::from_millis(REFRESH_RATE));
                }
            });
        }
        Self { counter, pbar }
    }

    /// A bar that is never drawn.
    pub fn hidden(len: usize) -> Self {
        Self::stage(len, "", false)
    }

    pub fn tick(&self) {
        self.counter.inc();
    }

    /// Steps completed so far.
    pub fn position(&self) -> usize {
        self.counter.get()
    }
}

impl Drop for Bar {
    fn drop(&mut self) {
        if !self.pbar.is_finished() {
            self.pbar.set_position(self.counter.get() as u64);
            self.pbar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_hidden() {
        let bar = Bar::hidden(10);
        assert_eq!(bar.position(), 0);
    }

    #[test]
    fn progress_tick() {
        let bar = Bar::stage(10, "Testing", false);
        bar.tick();
        bar.tick();
        assert_eq!(bar.position(), 2)
    }
}
