use async_trait::async_trait;
use parking_lot::Mutex;
use sluice::ItemWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Tracks how many items are executing right now and the highest value seen.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    state: Arc<Mutex<ProbeState>>,
}

#[derive(Default)]
struct ProbeState {
    current: usize,
    peak: usize,
    completed: u64,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) {
        let mut state = self.state.lock();
        state.current += 1;
        state.peak = state.peak.max(state.current);
    }

    pub fn exit(&self) {
        let mut state = self.state.lock();
        state.current -= 1;
        state.completed += 1;
    }

    pub fn current(&self) -> usize {
        self.state.lock().current
    }

    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    pub fn completed(&self) -> u64 {
        self.state.lock().completed
    }
}

/// Sleeps for a fixed delay per item while recording concurrency.
#[derive(Clone)]
pub struct SlowWorker {
    delay: Duration,
    probe: ConcurrencyProbe,
}

impl SlowWorker {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            probe: ConcurrencyProbe::new(),
        }
    }

    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

#[async_trait]
impl ItemWorker<u64> for SlowWorker {
    async fn execute(&self, index: u64) -> anyhow::Result<u64> {
        self.probe.enter();
        tokio::time::sleep(self.delay).await;
        self.probe.exit();
        Ok(index)
    }
}

/// Holds every item until the test opens the gate.
///
/// Lets a test park items inside their execution slots, observe how many
/// started, cancel the run, then release them.
#[derive(Clone)]
pub struct GateWorker {
    open: Arc<watch::Sender<bool>>,
    started: Arc<watch::Sender<u64>>,
    probe: ConcurrencyProbe,
}

impl GateWorker {
    pub fn new() -> Self {
        Self {
            open: Arc::new(watch::Sender::new(false)),
            started: Arc::new(watch::Sender::new(0)),
            probe: ConcurrencyProbe::new(),
        }
    }

    /// Let every waiting and future item through.
    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn started(&self) -> u64 {
        *self.started.borrow()
    }

    /// Wait until at least `n` items entered the worker.
    pub async fn wait_for_started(&self, n: u64) {
        let mut rx = self.started.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|started| *started >= n).await;
    }

    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }
}

impl Default for GateWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemWorker<u64> for GateWorker {
    async fn execute(&self, index: u64) -> anyhow::Result<u64> {
        self.probe.enter();
        self.started.send_modify(|started| *started += 1);
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
        self.probe.exit();
        Ok(index)
    }
}
