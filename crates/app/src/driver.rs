use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use noisewatch_foundation::clock::SharedClock;
use noisewatch_foundation::{AppError, ShutdownGuard};
use noisewatch_meter::SampleLoop;

/// What a failed audio read does to the sampling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFailurePolicy {
    /// Log and keep ticking; transient faults heal on the next read.
    #[default]
    Continue,
    /// Halt the loop and request an app-wide stop.
    Stop,
}

/// Runs a [`SampleLoop`] on its own thread at a fixed cadence. Tick timing
/// is best effort; a slow read stretches the gap to the next tick rather
/// than triggering catch-up ticks.
pub struct TickDriver {
    sample_loop: SampleLoop,
    clock: SharedClock,
    period: Duration,
    policy: ReadFailurePolicy,
    shutdown: Option<ShutdownGuard>,
}

impl TickDriver {
    pub fn new(sample_loop: SampleLoop, clock: SharedClock, period: Duration) -> Self {
        Self {
            sample_loop,
            clock,
            period,
            policy: ReadFailurePolicy::default(),
            shutdown: None,
        }
    }

    pub fn with_policy(mut self, policy: ReadFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Wire in the app-wide shutdown guard so a self-halted loop takes the
    /// rest of the process down with it.
    pub fn with_shutdown(mut self, shutdown: ShutdownGuard) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn spawn(self) -> Result<TickDriverHandle, AppError> {
        let TickDriver {
            mut sample_loop,
            clock,
            period,
            policy,
            shutdown,
        } = self;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("sample-tick".to_string())
            .spawn(move || {
                sample_loop.start();
                while thread_running.load(Ordering::SeqCst) {
                    if let Err(e) = sample_loop.tick() {
                        match policy {
                            ReadFailurePolicy::Continue => {
                                tracing::debug!("Continuing after read failure: {}", e);
                            }
                            ReadFailurePolicy::Stop => {
                                tracing::error!("Halting sampling after read failure: {}", e);
                                break;
                            }
                        }
                    }
                    clock.sleep(period);
                }
                sample_loop.shutdown();
                if thread_running.load(Ordering::SeqCst) {
                    // The loop halted itself rather than being stopped.
                    if let Some(guard) = &shutdown {
                        guard.request_shutdown();
                    }
                }
            })
            .map_err(|e| AppError::Fatal(format!("Failed to spawn sampling thread: {}", e)))?;

        Ok(TickDriverHandle { handle, running })
    }
}

pub struct TickDriverHandle {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl TickDriverHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}
