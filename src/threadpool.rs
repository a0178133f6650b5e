//! A bounded worker pool built on scoped OS threads.
//!
//! Generalizes the `DeploymentThreadsPool` pattern used to fan out chart
//! deployments in the original engine: tasks are handed out one at a time,
//! at most `max_parallelism` run concurrently, and a finished slot is
//! reclaimed via `park`/`unpark` rather than polling a channel. Unlike the
//! original, which only needed a pass/fail per task, `run` collects and
//! returns every task's result so callers (migration engine, GitOps engine)
//! can build a full accounting afterward.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::thread::{self, ScopedJoinHandle};

use crate::cmd::command::CancellationToken;

pub struct BoundedThreadPool;

impl BoundedThreadPool {
    /// Runs every task in `tasks`, with at most `max_parallelism` executing
    /// at any instant. Tasks are `FnOnce() -> R + Send`; results are
    /// returned in the same order the tasks were submitted in, not
    /// completion order. A panic inside a task is converted into an
    /// `Err(panic_message)` entry rather than propagating, so one
    /// misbehaving task cannot take down the whole batch.
    pub fn run<R, Task>(
        tasks: Vec<Task>,
        max_parallelism: NonZeroUsize,
        cancellation: &CancellationToken,
    ) -> Vec<Result<R, String>>
    where
        R: Send,
        Task: FnOnce() -> R + Send,
    {
        if tasks.is_empty() {
            return Vec::new();
        }

        let max_parallelism = max_parallelism.get().min(tasks.len());
        let current_thread = thread::current();

        thread::scope(|scope| {
            let mut results: Vec<Option<Result<R, String>>> = (0..tasks.len()).map(|_| None).collect();
            let mut active: VecDeque<(usize, ScopedJoinHandle<Result<R, String>>)> =
                VecDeque::with_capacity(max_parallelism);

            let drain_one = |active: &mut VecDeque<(usize, ScopedJoinHandle<Result<R, String>>)>,
                              results: &mut Vec<Option<Result<R, String>>>| {
                let position = loop {
                    match active.iter().position(|(_, th)| th.is_finished()) {
                        Some(position) => break position,
                        None => thread::park_timeout(std::time::Duration::from_millis(200)),
                    }
                };
                let (index, handle) = active.remove(position).expect("position came from active");
                let outcome = handle.join().unwrap_or_else(|panic| {
                    let message = match panic.downcast_ref::<&'static str>() {
                        Some(s) => s.to_string(),
                        None => match panic.downcast_ref::<String>() {
                            Some(s) => s.clone(),
                            None => "worker thread panicked".to_string(),
                        },
                    };
                    Err(message)
                });
                results[index] = Some(outcome);
            };

            for (index, task) in tasks.into_iter().enumerate() {
                if active.len() >= max_parallelism {
                    drain_one(&mut active, &mut results);
                }

                if cancellation.is_cancelled() {
                    results[index] = Some(Err("cancelled before scheduling".to_string()));
                    continue;
                }

                let current_span = tracing::Span::current();
                let current_thread = &current_thread;
                let handle = thread::Builder::new()
                    .name(format!("privateer-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        let _span = current_span.enter();
                        let _unpark_on_drop = scopeguard::guard((), |_| current_thread.unpark());
                        task()
                    })
                    .expect("failed to spawn worker thread");
                active.push_back((index, handle));
            }

            while !active.is_empty() {
                drain_one(&mut active, &mut results);
            }

            results.into_iter().map(|r| r.expect("every slot filled")).collect()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_all_tasks_and_preserves_order() {
        let results = BoundedThreadPool::run(
            (0..20).map(|i| move || i * 2).collect(),
            NonZeroUsize::new(4).unwrap(),
            &CancellationToken::new(),
        );

        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn bounds_concurrency() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let concurrent = concurrent.clone();
                let max_seen = max_seen.clone();
                move || {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(20));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        BoundedThreadPool::run(tasks, NonZeroUsize::new(3).unwrap(), &CancellationToken::new());
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn survives_a_panicking_task() {
        let tasks: Vec<Box<dyn FnOnce() -> i32 + Send>> = vec![
            Box::new(|| 1),
            Box::new(|| panic!("boom")),
            Box::new(|| 3),
        ];
        let results = BoundedThreadPool::run(tasks, NonZeroUsize::new(2).unwrap(), &CancellationToken::new());
        assert_eq!(results[0].as_ref().unwrap(), &1);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap(), &3);
    }
}
