//! One-second tick source for the focus timer.
//!
//! A `Ticker` owns at most one running loop. Arming it for a new run
//! stops the previous loop first, so loops never stack.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const TICK: Duration = Duration::from_secs(1);

/// Returned by the tick callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

struct Armed {
    run: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct Ticker {
    armed: Option<Armed>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run id of the live loop, if one is still going.
    pub fn active_run(&self) -> Option<u64> {
        self.armed
            .as_ref()
            .filter(|a| !a.handle.is_finished() && !a.cancel.is_cancelled())
            .map(|a| a.run)
    }

    pub fn is_active(&self) -> bool {
        self.active_run().is_some()
    }

    /// Starts ticking for `run`. The first tick lands one period from now.
    /// Must be called inside a tokio runtime.
    pub fn arm<F, Fut>(&mut self, run: u64, mut on_tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickControl> + Send + 'static,
    {
        self.disarm();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        // created here rather than in the task so the period starts now
        let mut interval = time::interval_at(Instant::now() + TICK, TICK);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if on_tick().await == TickControl::Stop {
                            break;
                        }
                    }
                    () = stop.cancelled() => break,
                }
            }
            debug!(run, "tick loop finished");
        });

        self.armed = Some(Armed {
            run,
            cancel,
            handle,
        });
    }

    pub fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.cancel.cancel();
            armed.handle.abort();
        }
    }

    /// Makes the live loop match `want`: arm for a new run, keep a loop that
    /// already serves it, or stop when nothing should tick.
    pub fn sync<F, Fut>(&mut self, want: Option<u64>, on_tick: impl FnOnce(u64) -> F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickControl> + Send + 'static,
    {
        match want {
            Some(run) if self.active_run() == Some(run) => {}
            Some(run) => self.arm(run, on_tick(run)),
            None => self.disarm(),
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.disarm();
    }
}
