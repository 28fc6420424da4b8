//! Worker pool and dispatcher-bucket completion join, grounded on
//! `Common/TaskGroup.h`/`DispatcherBucket`'s "submit N jobs, run a single
//! completion callback once the bucket's pending counter hits zero"
//! shape. The concrete `crossbeam-channel` + `parking_lot` + `num_cpus`
//! worker-thread implementation has no counterpart in the parsing/
//! rewriting crate this pool's data structures are otherwise grounded
//! on (a compiler/codec crate has no worker pool of its own), so
//! it is enriched from the `K0bin-SourceRenderer` engine's dependency
//! pairing of those three crates for CPU-bound job fan-out.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let workers = (0..num_threads)
            .map(|_| {
                let receiver = receiver.clone();
                std::thread::spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
            })
            .collect();

        WorkerPool { sender, workers }
    }

    pub fn with_default_threads() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn submit(&self, job: Job) {
        self.sender.send(job).expect("worker pool threads dropped their receiver unexpectedly");
    }

    /// Run every job in `jobs` on the pool, invoking `on_done` exactly
    /// once, from whichever worker thread drives the bucket's pending
    /// counter to zero (`DispatcherBucket`'s single-completion-callback
    /// contract). An empty `jobs` list completes synchronously.
    pub fn run_bucket<F>(&self, jobs: Vec<Job>, on_done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if jobs.is_empty() {
            on_done();
            return;
        }

        let remaining = Arc::new(AtomicUsize::new(jobs.len()));
        let on_done = Arc::new(Mutex::new(Some(on_done)));

        for job in jobs {
            let remaining = remaining.clone();
            let on_done = on_done.clone();
            self.submit(Box::new(move || {
                job();
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if let Some(f) = on_done.lock().take() {
                        f();
                    }
                }
            }));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;

    #[test]
    fn run_bucket_invokes_completion_once_after_every_job_finished() {
        let pool = WorkerPool::new(4);
        let completed = Arc::new(AtomicU32::new(0));
        let (tx, rx) = mpsc::channel();

        let jobs: Vec<Job> = (0..20)
            .map(|_| {
                let completed = completed.clone();
                Box::new(move || {
                    completed.fetch_add(1, Ordering::AcqRel);
                }) as Job
            })
            .collect();

        pool.run_bucket(jobs, move || {
            tx.send(()).unwrap();
        });

        rx.recv_timeout(std::time::Duration::from_secs(5)).expect("completion callback never ran");
        assert_eq!(completed.load(Ordering::Acquire), 20);
    }

    #[test]
    fn run_bucket_with_no_jobs_completes_synchronously() {
        let pool = WorkerPool::new(2);
        let ran = Arc::new(AtomicU32::new(0));
        let ran_inner = ran.clone();
        pool.run_bucket(Vec::new(), move || {
            ran_inner.store(1, Ordering::Release);
        });
        assert_eq!(ran.load(Ordering::Acquire), 1, "on_done must run before run_bucket returns for an empty job list");
    }
}
