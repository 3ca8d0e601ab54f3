//! Bounded worker pool for per-item fan-out inside a single pipeline step.
//!
//! Dependency installs, file signing, and multi-destination publishing all
//! process independent items; this pool bounds their parallelism and stops
//! pulling new items once the run is cancelled. Results keep the original
//! item order, so aggregates never depend on completion order.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;

use crate::context::CancelToken;

/// Run `work` over `items` with at most `concurrency` worker threads.
///
/// Returns one slot per input item, in input order. A `None` slot means the
/// item was never started because the run was cancelled first; in-flight
/// items always run to completion.
pub fn run_bounded<T, R, F>(
    items: Vec<T>,
    concurrency: usize,
    cancel: &CancelToken,
    work: F,
) -> Vec<Option<R>>
where
    T: Send,
    R: Send,
    F: Fn(usize, T) -> R + Sync,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let workers = concurrency.clamp(1, total);
    let queue: Mutex<VecDeque<(usize, T)>> = Mutex::new(items.into_iter().enumerate().collect());
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..total).map(|_| None).collect());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if cancel.is_cancelled() {
                    break;
                }
                let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                let Some((index, item)) = next else {
                    break;
                };
                let result = work(index, item);
                if let Ok(mut slots) = results.lock() {
                    slots[index] = Some(result);
                }
            });
        }
    });

    results.into_inner().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn processes_all_items_in_order() {
        let cancel = CancelToken::new();
        let results = run_bounded(vec![1, 2, 3, 4, 5], 3, &cancel, |_, n| n * 10);
        let values: Vec<i32> = results.into_iter().flatten().collect();
        assert_eq!(values, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn bounds_concurrency() {
        let cancel = CancelToken::new();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        run_bounded(vec![(); 20], 2, &cancel, |_, _| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            active.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn cancelled_runs_leave_unstarted_items_empty() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let results = run_bounded(vec![1, 2, 3], 2, &cancel, |_, n| n);
        assert!(results.iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let cancel = CancelToken::new();
        let results: Vec<Option<i32>> = run_bounded(Vec::<i32>::new(), 4, &cancel, |_, n| n);
        assert!(results.is_empty());
    }
}
