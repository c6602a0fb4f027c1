//! Progress reporting for long batch passes.

use tracing::info;

/// Receives one `tick` per processed item and a final `complete`.
pub trait Progress: Send {
  fn tick(&mut self);
  fn complete(&mut self);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
  fn tick(&mut self) {}
  fn complete(&mut self) {}
}

/// Logs an `info!` line every `every` items and once at the end.
#[derive(Debug, Clone)]
pub struct LogProgress {
  total: usize,
  every: usize,
  done:  usize,
}

impl LogProgress {
  /// `every == 0` logs only on completion.
  pub fn new(total: usize, every: usize) -> Self {
    Self { total, every, done: 0 }
  }

  pub fn done(&self) -> usize { self.done }
}

impl Progress for LogProgress {
  fn tick(&mut self) {
    self.done += 1;
    if self.every > 0 && self.done % self.every == 0 {
      info!(done = self.done, total = self.total, "processing progress");
    }
  }

  fn complete(&mut self) {
    info!(done = self.done, total = self.total, "processing complete");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counts_ticks() {
    let mut p = LogProgress::new(5, 2);
    for _ in 0..5 {
      p.tick();
    }
    p.complete();
    assert_eq!(p.done(), 5);
  }

  #[test]
  fn zero_interval_does_not_divide() {
    let mut p = LogProgress::new(1, 0);
    p.tick();
    assert_eq!(p.done(), 1);
  }
}
