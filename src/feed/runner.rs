use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::controller::FeedController;
use super::status::CycleOutcome;

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Drives a controller with two independently scheduled workers: the poll
/// cycle and the eviction sweep.
pub struct FeedRunner;

impl FeedRunner {
    pub fn spawn(controller: Arc<FeedController>) -> Result<FeedHandle> {
        let stop = Arc::new(AtomicBool::new(false));

        let poll = {
            let controller = controller.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("sade-poll".to_string())
                .spawn(move || run_poll(&controller, &stop))?
        };
        let sweep = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("sade-sweep".to_string())
                .spawn(move || run_sweep(&controller, &stop))?
        };

        Ok(FeedHandle {
            stop,
            poll: Some(poll),
            sweep: Some(sweep),
        })
    }
}

/// Running feed workers.
#[derive(Debug)]
pub struct FeedHandle {
    stop: Arc<AtomicBool>,
    poll: Option<JoinHandle<()>>,
    sweep: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Workers have stopped on their own (e.g. the frame source ended) or by request.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Stop both workers and wait for them.
    pub fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.poll.take() {
            join.join().map_err(|_| anyhow!("poll worker panicked"))?;
        }
        if let Some(join) = self.sweep.take() {
            join.join().map_err(|_| anyhow!("sweep worker panicked"))?;
        }
        Ok(())
    }
}

fn run_poll(controller: &FeedController, stop: &AtomicBool) {
    let interval = controller.settings().poll_interval;
    while !stop.load(Ordering::SeqCst) {
        let started = Instant::now();
        match controller.poll_cycle() {
            Ok(CycleOutcome::SourceStopped) => {
                log::info!("frame source stopped; stopping feed workers");
                stop.store(true, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(err) => log::error!("poll cycle error: {:#}", err),
        }
        sleep_unless_stopped(interval.saturating_sub(started.elapsed()), stop);
    }
}

fn run_sweep(controller: &FeedController, stop: &AtomicBool) {
    let interval = controller.settings().sweep_interval;
    loop {
        sleep_unless_stopped(interval, stop);
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if let Err(err) = controller.sweep() {
            log::error!("sweep error: {:#}", err);
        }
    }
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}
