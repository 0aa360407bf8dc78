use std::{
    collections::VecDeque,
    fmt,
    sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use scheduled_thread_pool::{JobHandle, ScheduledThreadPool};

/// A job queue that uses a single thread to process jobs.
pub struct JobQueue {
    runner: ScheduledThreadPool,
    job_status: Arc<Mutex<JobStatus>>,
}

impl JobQueue {
    pub fn new() -> JobQueue {
        JobQueue {
            runner: ScheduledThreadPool::new(1),
            job_status: Arc::new(Mutex::new(JobStatus::default())),
        }
    }

    /// Queues `job` and returns a handle for collecting its result.
    ///
    /// Returns `None` while the queue is in the middle of canceling.
    pub fn add_job<T, F>(&self, name: &str, job: F) -> Option<Job<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Mutex<JobStatus>) -> T + Send + std::panic::UnwindSafe + 'static,
    {
        let job_name = name.to_string();
        let mut job_status = lock(&self.job_status);
        if job_status.do_cancel {
            // Don't allow adding jobs when in the middle of canceling.
            return None;
        }

        let (sender, receiver) = mpsc::channel();

        // Add the job.
        let local_job_status = Arc::clone(&self.job_status);
        let local_name = job_name.clone();
        job_status.jobs.push_back(self.runner.execute(move || {
            let job_status = local_job_status;

            // Actually run the job.
            let result = match std::panic::catch_unwind(|| job(&job_status)) {
                Ok(value) => Ok(value),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("Job \"{}\" panicked: {}", local_name, message);
                    Err(JobError::Panicked(message))
                }
            };

            // Cleanup.
            {
                let mut job_status = lock(&job_status);
                job_status.jobs.pop_front(); // This job.
                if job_status.do_cancel {
                    for job in job_status.jobs.drain(..) {
                        job.cancel();
                    }
                    job_status.do_cancel = false;
                }
                job_status.clear_progress();
            }

            // The receiver may have given up already.
            let _ = sender.send(result);
        }));

        Some(Job {
            name: job_name,
            receiver: receiver,
            job_status: Arc::clone(&self.job_status),
        })
    }

    pub fn progress(&self) -> Option<(String, f32)> {
        lock(&self.job_status).job_progress.clone()
    }

    pub fn job_count(&self) -> usize {
        lock(&self.job_status).jobs.len()
    }

    pub fn cancel_all_jobs(&self) {
        lock(&self.job_status).request_cancel();
    }
}

impl Default for JobQueue {
    fn default() -> JobQueue {
        JobQueue::new()
    }
}

/// Handle to a queued job's eventual result.
pub struct Job<T> {
    name: String,
    receiver: mpsc::Receiver<Result<T, JobError>>,
    job_status: Arc<Mutex<JobStatus>>,
}

impl<T> Job<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until the job finishes.
    pub fn wait(self) -> Result<T, JobError> {
        match self.receiver.recv() {
            Ok(result) => result,
            // Dropped from the queue before it ever ran.
            Err(mpsc::RecvError) => Err(JobError::Canceled),
        }
    }

    /// Blocks until the job finishes or `budget` runs out.
    ///
    /// On timeout the job is asked to cancel and `TimedOut` is returned
    /// without waiting for it to wind down.
    pub fn wait_timeout(self, budget: Duration) -> Result<T, JobError> {
        match self.receiver.recv_timeout(budget) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!("Job \"{}\" exceeded its {:?} budget", self.name, budget);
                self.cancel();
                Err(JobError::TimedOut(budget))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(JobError::Canceled),
        }
    }

    /// Asks the running job, and any queued behind it, to stop.
    pub fn cancel(&self) {
        lock(&self.job_status).request_cancel();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobError {
    Panicked(String),
    Canceled,
    TimedOut(Duration),
}

impl std::error::Error for JobError {}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobError::Panicked(msg) => write!(f, "job panicked: {}", msg),
            JobError::Canceled => write!(f, "job was canceled"),
            JobError::TimedOut(budget) => write!(f, "job exceeded its {:?} budget", budget),
        }
    }
}

#[derive(Default)]
pub struct JobStatus {
    jobs: VecDeque<JobHandle>,
    job_progress: Option<(String, f32)>,
    do_cancel: bool,
}

impl JobStatus {
    pub fn is_canceled(&self) -> bool {
        self.do_cancel
    }

    pub fn progress(&self) -> Option<&(String, f32)> {
        self.job_progress.as_ref()
    }

    pub fn set_progress(&mut self, text: String, ratio: f32) {
        self.job_progress = Some((text, ratio));
    }

    pub fn clear_progress(&mut self) {
        self.job_progress = None;
    }

    fn request_cancel(&mut self) {
        if !self.jobs.is_empty() {
            self.do_cancel = true;
        }
    }
}

/// Locks job status, recovering from poisoning.  Jobs run under
/// `catch_unwind`, so a poisoned lock only means a job panicked mid-update.
pub fn lock(status: &Mutex<JobStatus>) -> MutexGuard<JobStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
        time::Instant,
    };

    #[test]
    fn returns_job_result() {
        let queue = JobQueue::new();
        let job = queue.add_job("add", |_| 2 + 3).unwrap();
        assert_eq!(job.name(), "add");
        assert_eq!(job.wait(), Ok(5));
    }

    #[test]
    fn jobs_run_in_order() {
        let queue = JobQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let jobs: Vec<_> = (0..4)
            .map(|i| {
                let log = Arc::clone(&log);
                queue
                    .add_job("push", move |_| log.lock().unwrap().push(i))
                    .unwrap()
            })
            .collect();
        for job in jobs {
            job.wait().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn progress_is_visible_and_cleared() {
        let queue = JobQueue::new();
        let job = queue
            .add_job("progress", |status| {
                lock(status).set_progress("halfway".into(), 0.5);
                lock(status).progress().cloned()
            })
            .unwrap();
        assert_eq!(job.wait(), Ok(Some(("halfway".to_string(), 0.5))));
        assert_eq!(queue.progress(), None);
    }

    #[test]
    fn panics_are_reported() {
        let queue = JobQueue::new();
        let job = queue
            .add_job("boom", |_| -> u32 { panic!("kaboom") })
            .unwrap();
        assert_eq!(job.wait(), Err(JobError::Panicked("kaboom".into())));
        assert_eq!(queue.job_count(), 0);
        assert_eq!(queue.progress(), None);

        // The queue keeps working afterwards.
        let job = queue.add_job("after", |_| 1).unwrap();
        assert_eq!(job.wait(), Ok(1));
    }

    #[test]
    fn timeout_cancels_the_job() {
        let queue = JobQueue::new();
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&saw_cancel);
        let job = queue
            .add_job("spin", move |status| {
                let start = Instant::now();
                while start.elapsed() < Duration::from_secs(10) {
                    if lock(status).is_canceled() {
                        flag.store(true, Ordering::SeqCst);
                        return;
                    }
                    thread::sleep(Duration::from_millis(2));
                }
            })
            .unwrap();

        let budget = Duration::from_millis(50);
        assert_eq!(job.wait_timeout(budget), Err(JobError::TimedOut(budget)));

        let start = Instant::now();
        while !saw_cancel.load(Ordering::SeqCst) && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[test]
    fn finishes_within_budget() {
        let queue = JobQueue::new();
        let job = queue.add_job("quick", |_| "done").unwrap();
        assert_eq!(job.wait_timeout(Duration::from_secs(10)), Ok("done"));
    }

    #[test]
    fn cancel_drops_queued_jobs() {
        let queue = JobQueue::new();
        let first = queue
            .add_job("first", |status| {
                let start = Instant::now();
                while !lock(status).is_canceled() && start.elapsed() < Duration::from_secs(10) {
                    thread::sleep(Duration::from_millis(2));
                }
                7
            })
            .unwrap();
        let second = queue.add_job("second", |_| 8).unwrap();

        queue.cancel_all_jobs();
        assert_eq!(first.wait(), Ok(7));
        assert_eq!(second.wait(), Err(JobError::Canceled));
        assert_eq!(queue.job_count(), 0);
    }
}
