//! Background scan loop and the inventory it publishes.
//!
//! The orchestrator is either idle or scanning. While scanning, one tokio
//! task runs discovery cycles back to back with a fixed pause in between and
//! swaps each finished snapshot in whole. Stopping is cooperative: the cycle
//! in flight always completes and no new one starts afterwards.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use lanscope_core::{Category, DeviceId, DeviceRecord, ScanSnapshot};
use tokio::sync::{watch, Notify};

use crate::pipeline::ScanCycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyScanning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanOutcome {
    /// The next cycle starts as soon as the current one finishes.
    Scheduled,
    NotScanning,
}

/// Point-in-time view of the scanner for status endpoints.
#[derive(Debug, Clone)]
pub struct ScanStatus {
    pub is_scanning: bool,
    pub last_scan: Option<DateTime<Utc>>,
    pub device_count: usize,
    pub network_range: Option<Ipv4Net>,
    pub cycles_completed: u64,
}

/// Owns the scan loop and the latest published snapshot.
///
/// Clone is cheap (inner Arc). `start` must be called from within a tokio
/// runtime.
#[derive(Clone)]
pub struct ScanOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    cycle: Arc<dyn ScanCycle>,
    interval: Duration,
    snapshot: RwLock<Arc<ScanSnapshot>>,
    /// Present while scanning.
    control: Mutex<Option<RunControl>>,
    /// Bumped on every start so a superseded loop cannot publish.
    generation: AtomicU64,
    cycles_completed: AtomicU64,
}

/// Signals owned by one running loop. Dropped with it on stop, so a pending
/// rescan never carries over into the next start.
struct RunControl {
    /// Sending `true` stops the loop.
    stop_tx: watch::Sender<bool>,
    rescan: Arc<Notify>,
}

impl ScanOrchestrator {
    pub fn new(cycle: Arc<dyn ScanCycle>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cycle,
                interval,
                snapshot: RwLock::new(Arc::new(ScanSnapshot::empty())),
                control: Mutex::new(None),
                generation: AtomicU64::new(0),
                cycles_completed: AtomicU64::new(0),
            }),
        }
    }

    /// Spawn the scan loop. A no-op when already scanning.
    pub fn start(&self) -> StartOutcome {
        let mut control = lock(&self.inner.control);
        if control.is_some() {
            tracing::info!("Scan loop already running");
            return StartOutcome::AlreadyScanning;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let rescan = Arc::new(Notify::new());
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *control = Some(RunControl {
            stop_tx,
            rescan: rescan.clone(),
        });

        tokio::spawn(run_loop(self.inner.clone(), generation, stop_rx, rescan));
        StartOutcome::Started
    }

    /// Ask the loop to stop at the next iteration boundary.
    pub fn stop(&self) -> ScanState {
        if let Some(control) = lock(&self.inner.control).take() {
            // The loop may already be gone; nothing to do then.
            let _ = control.stop_tx.send(true);
            tracing::info!("Scan loop stop requested");
        }
        ScanState::Idle
    }

    /// Cut the current pause short so the next cycle begins right after
    /// the one in flight, if any.
    pub fn request_rescan(&self) -> RescanOutcome {
        match lock(&self.inner.control).as_ref() {
            Some(control) => {
                control.rescan.notify_one();
                tracing::info!("Rescan requested");
                RescanOutcome::Scheduled
            }
            None => RescanOutcome::NotScanning,
        }
    }

    pub fn state(&self) -> ScanState {
        if lock(&self.inner.control).is_some() {
            ScanState::Scanning
        } else {
            ScanState::Idle
        }
    }

    /// The latest complete snapshot. Never a partially built one.
    pub fn snapshot(&self) -> Arc<ScanSnapshot> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.snapshot().devices.clone()
    }

    pub fn categories(&self) -> BTreeMap<Category, Vec<DeviceRecord>> {
        self.snapshot().device_categories.clone()
    }

    pub fn device(&self, id: &DeviceId) -> Option<DeviceRecord> {
        self.snapshot().device(id).cloned()
    }

    pub fn status(&self) -> ScanStatus {
        let snapshot = self.snapshot();
        ScanStatus {
            is_scanning: self.state() == ScanState::Scanning,
            last_scan: snapshot.scan_timestamp,
            device_count: snapshot.total_devices,
            network_range: snapshot.network_range,
            cycles_completed: self.inner.cycles_completed.load(Ordering::SeqCst),
        }
    }
}

impl Inner {
    async fn run_cycle(&self, generation: u64) {
        let cycle = self.cycle.clone();
        // Own task so a panic in any stage is contained to this cycle.
        match tokio::spawn(async move { cycle.run().await }).await {
            Ok(Ok(snapshot)) => self.publish(generation, snapshot),
            Ok(Err(e)) => tracing::error!(error = %e, "Discovery cycle failed"),
            Err(e) => tracing::error!(error = %e, "Discovery cycle panicked"),
        }
    }

    fn publish(&self, generation: u64, snapshot: ScanSnapshot) {
        let snapshot = Arc::new(snapshot);
        {
            let mut current = self
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!(generation, "Discarding snapshot from superseded scan loop");
                return;
            }
            *current = snapshot.clone();
        }
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            devices = snapshot.total_devices,
            identified = snapshot.identified_devices,
            "Published scan snapshot"
        );
    }
}

async fn run_loop(
    inner: Arc<Inner>,
    generation: u64,
    mut stop_rx: watch::Receiver<bool>,
    rescan: Arc<Notify>,
) {
    tracing::info!(
        generation,
        interval_secs = inner.interval.as_secs(),
        "Scan loop started"
    );

    loop {
        let stopped = *stop_rx.borrow();
        if stopped {
            break;
        }

        inner.run_cycle(generation).await;

        tokio::select! {
            _ = tokio::time::sleep(inner.interval) => {}
            _ = rescan.notified() => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(generation, "Scan loop stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::classifier::Classification;
    use crate::error::{DiscoverError, Result};

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Succeed,
        Fail,
        Panic,
    }

    /// Sleeps for `delay`, then follows the script (default: succeed).
    /// The n-th successful cycle reports n devices.
    struct FakeCycle {
        delay: Duration,
        script: Mutex<VecDeque<Step>>,
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl FakeCycle {
        fn new(delay: Duration, script: &[Step]) -> Arc<Self> {
            Arc::new(Self {
                delay,
                script: Mutex::new(script.iter().copied().collect()),
                started: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            })
        }

        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        fn finished(&self) -> usize {
            self.finished.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScanCycle for FakeCycle {
        async fn run(&self) -> Result<ScanSnapshot> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Succeed);
            tokio::time::sleep(self.delay).await;

            match step {
                Step::Panic => panic!("simulated probe crash"),
                Step::Fail => Err(DiscoverError::Lookup("simulated".into())),
                Step::Succeed => {
                    let n = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
                    let devices = (1..=n as u8)
                        .map(|i| {
                            Classification::unknown()
                                .into_record(Ipv4Addr::new(10, 0, 0, i), vec![5004])
                        })
                        .collect();
                    Ok(ScanSnapshot::assemble(
                        Uuid::new_v4(),
                        "10.0.0.0/24".parse().unwrap(),
                        vec![],
                        devices,
                        Utc::now(),
                    ))
                }
            }
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..1_000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_snapshot_is_empty() {
        let cycle = FakeCycle::new(Duration::ZERO, &[]);
        let orch = ScanOrchestrator::new(cycle, Duration::from_secs(30));
        let status = orch.status();
        assert!(!status.is_scanning);
        assert!(status.last_scan.is_none());
        assert_eq!(orch.devices().len(), 0);
        assert_eq!(orch.categories().len(), Category::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_publishes_and_second_start_is_noop() {
        let cycle = FakeCycle::new(Duration::from_millis(100), &[]);
        let orch = ScanOrchestrator::new(cycle.clone(), Duration::from_secs(30));

        assert_eq!(orch.start(), StartOutcome::Started);
        assert_eq!(orch.start(), StartOutcome::AlreadyScanning);
        assert_eq!(orch.state(), ScanState::Scanning);

        wait_until(|| orch.status().cycles_completed == 1).await;
        let snapshot = orch.snapshot();
        assert_eq!(snapshot.total_devices, 1);
        assert!(snapshot.scan_timestamp.is_some());

        let id = snapshot.devices[0].id;
        assert_eq!(orch.device(&id).unwrap().ip, Ipv4Addr::new(10, 0, 0, 1));
        assert!(orch.device(&DeviceId::for_ip(Ipv4Addr::new(10, 9, 9, 9))).is_none());

        // Only one loop is running: one cycle per interval.
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(cycle.started(), 2);
        orch.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_cycle_lets_cycle_finish() {
        let cycle = FakeCycle::new(Duration::from_secs(5), &[]);
        let orch = ScanOrchestrator::new(cycle.clone(), Duration::from_secs(30));

        orch.start();
        wait_until(|| cycle.started() == 1).await;
        assert_eq!(orch.stop(), ScanState::Idle);
        assert_eq!(orch.state(), ScanState::Idle);

        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(cycle.started(), 1);
        assert_eq!(cycle.finished(), 1);
        // The last snapshot stays visible after stopping.
        assert_eq!(orch.snapshot().total_devices, 1);
        assert!(!orch.status().is_scanning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_pause_ends_loop_promptly() {
        let cycle = FakeCycle::new(Duration::from_millis(10), &[]);
        let orch = ScanOrchestrator::new(cycle.clone(), Duration::from_secs(3_600));

        orch.start();
        wait_until(|| orch.status().cycles_completed == 1).await;
        orch.stop();

        tokio::time::sleep(Duration::from_secs(7_200)).await;
        assert_eq!(cycle.started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_and_panicking_cycles_do_not_kill_loop() {
        let cycle = FakeCycle::new(
            Duration::from_millis(10),
            &[Step::Fail, Step::Panic, Step::Succeed],
        );
        let orch = ScanOrchestrator::new(cycle.clone(), Duration::from_secs(1));

        orch.start();
        wait_until(|| orch.status().cycles_completed == 1).await;

        assert_eq!(cycle.started(), 3);
        assert_eq!(orch.state(), ScanState::Scanning);
        assert_eq!(orch.snapshot().total_devices, 1);
        orch.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescan_cuts_pause_short() {
        let cycle = FakeCycle::new(Duration::from_millis(10), &[]);
        let orch = ScanOrchestrator::new(cycle.clone(), Duration::from_secs(3_600));

        assert_eq!(orch.request_rescan(), RescanOutcome::NotScanning);

        orch.start();
        wait_until(|| orch.status().cycles_completed == 1).await;
        assert_eq!(orch.request_rescan(), RescanOutcome::Scheduled);
        wait_until(|| orch.status().cycles_completed == 2).await;

        assert_eq!(orch.snapshot().total_devices, 2);
        orch.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_rescan_does_not_survive_restart() {
        let cycle = FakeCycle::new(Duration::from_secs(5), &[]);
        let orch = ScanOrchestrator::new(cycle.clone(), Duration::from_secs(3_600));

        for round in 1..=20 {
            // Rescan while no one is waiting on the pause, then stop.
            orch.start();
            wait_until(|| cycle.started() == 2 * round - 1).await;
            assert_eq!(orch.request_rescan(), RescanOutcome::Scheduled);
            orch.stop();
            wait_until(|| cycle.finished() == 2 * round - 1).await;

            // The new loop runs its first cycle, then honours the interval.
            orch.start();
            tokio::time::sleep(Duration::from_secs(60)).await;
            assert_eq!(cycle.started(), 2 * round);
            orch.stop();
            wait_until(|| cycle.finished() == 2 * round).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_readers_never_see_partial_snapshot() {
        let cycle = FakeCycle::new(Duration::from_millis(3), &[]);
        let orch = ScanOrchestrator::new(cycle, Duration::from_millis(1));
        orch.start();

        let reader = {
            let orch = orch.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let snapshot = orch.snapshot();
                    assert_eq!(snapshot.total_devices, snapshot.devices.len());
                    let bucketed: usize = snapshot.device_categories.values().map(Vec::len).sum();
                    assert_eq!(bucketed, snapshot.devices.len());
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        reader.await.unwrap();
        assert!(orch.status().cycles_completed > 10);
        orch.stop();
    }
}
