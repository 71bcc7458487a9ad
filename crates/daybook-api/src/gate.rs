use daybook_core::{DaybookError, DaybookResult};
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Ready,
}

#[derive(Debug)]
struct GateState {
    phase: Phase,
    started: u64,
    last_error: Option<DaybookError>,
}

/// One-shot connection gate. The first caller runs the probe; callers that
/// arrive while it is running block on the same attempt and observe its
/// outcome. A failed attempt leaves the gate idle so a later call retries.
#[derive(Debug)]
pub(crate) struct InitGate {
    state: Mutex<GateState>,
    settled: Condvar,
}

impl InitGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                phase: Phase::Idle,
                started: 0,
                last_error: None,
            }),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.lock()
            .map(|state| state.phase == Phase::Ready)
            .unwrap_or(false)
    }

    pub(crate) fn run<F>(&self, probe: F) -> DaybookResult<()>
    where
        F: FnOnce() -> DaybookResult<()>,
    {
        let mut state = self.lock()?;
        match state.phase {
            Phase::Ready => return Ok(()),
            Phase::Connecting => {
                let joined = state.started;
                while state.phase == Phase::Connecting && state.started == joined {
                    state = self.settled.wait(state).map_err(|_| poisoned())?;
                }
                if state.phase == Phase::Ready {
                    return Ok(());
                }
                return Err(state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| DaybookError::connection("remote connection failed")));
            }
            Phase::Idle => {}
        }

        state.phase = Phase::Connecting;
        state.started += 1;
        drop(state);

        let mut unwind = ResetOnUnwind {
            gate: self,
            armed: true,
        };
        let outcome = probe();
        unwind.armed = false;

        let mut state = self.lock()?;
        match &outcome {
            Ok(()) => {
                state.phase = Phase::Ready;
                state.last_error = None;
            }
            Err(err) => {
                state.phase = Phase::Idle;
                state.last_error = Some(err.clone());
            }
        }
        self.settled.notify_all();
        outcome
    }

    fn lock(&self) -> DaybookResult<MutexGuard<'_, GateState>> {
        self.state.lock().map_err(|_| poisoned())
    }
}

/// Puts the gate back to idle and wakes waiters if the probe unwinds, so
/// joined callers get an error instead of waiting forever.
struct ResetOnUnwind<'g> {
    gate: &'g InitGate,
    armed: bool,
}

impl Drop for ResetOnUnwind<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = match self.gate.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.phase = Phase::Idle;
        state.last_error = Some(DaybookError::connection(
            "remote init attempt panicked before it finished",
        ));
        self.gate.settled.notify_all();
    }
}

fn poisoned() -> DaybookError {
    DaybookError::connection("remote init lock was poisoned by a panicking caller")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn concurrent_callers_share_one_attempt() {
        let gate = Arc::new(InitGate::new());
        let probes = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let probes = Arc::clone(&probes);
                thread::spawn(move || {
                    gate.run(|| {
                        probes.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(150));
                        Ok(())
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("join").expect("init");
        }
        assert_eq!(probes.load(Ordering::SeqCst), 1);
        assert!(gate.is_ready());
    }

    #[test]
    fn failure_is_shared_then_retryable() {
        let gate = InitGate::new();
        let err = gate
            .run(|| Err(DaybookError::timeout("probe timed out")))
            .expect_err("first attempt fails");
        assert_eq!(err.kind, daybook_core::ErrorKind::Timeout);
        assert!(!gate.is_ready());

        gate.run(|| Ok(())).expect("retry succeeds");
        gate.run(|| panic!("ready gate must not probe again"))
            .expect("idempotent");
    }

    #[test]
    fn panicking_probe_releases_waiters() {
        let gate = Arc::new(InitGate::new());

        let first = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.run(|| {
                    thread::sleep(Duration::from_millis(200));
                    panic!("probe blew up");
                })
            })
        };
        thread::sleep(Duration::from_millis(50));
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.run(|| Ok(())))
        };

        assert!(first.join().is_err());
        let err = waiter
            .join()
            .expect("join waiter")
            .expect_err("joined attempt failed");
        assert!(err.message.contains("panicked"));
        assert!(!gate.is_ready());

        gate.run(|| Ok(())).expect("later attempt succeeds");
        assert!(gate.is_ready());
    }
}
