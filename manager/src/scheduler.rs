//! Worker selection for task placement
//!
//! The manager places each dispatched event through a [`Scheduler`], the seam
//! a smarter policy (scoring on worker stats, bin-packing) would plug into.
//! The only policy today is round-robin.

/// Placement policy: picks which worker the next task event lands on.
pub trait Scheduler: Send {
    /// Index into `workers` for the next placement, or `None` when there are
    /// no workers to choose from.
    fn pick(&mut self, workers: &[String]) -> Option<usize>;
}

/// Round-robin placement over the configured worker list.
///
/// The cursor is advanced and then used, so with a fresh cursor the first
/// pick is the second worker. Consecutive picks always land on distinct
/// workers when more than one is configured.
#[derive(Debug, Default)]
pub struct RoundRobin {
    last_worker: usize,
}

impl Scheduler for RoundRobin {
    fn pick(&mut self, workers: &[String]) -> Option<usize> {
        if workers.is_empty() {
            return None;
        }
        let next = (self.last_worker + 1) % workers.len();
        self.last_worker = next;
        Some(next)
    }
}
