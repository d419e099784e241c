//! Polling daemon: a single background loop that pulls observer deltas, feeds
//! them to the change engine, and sleeps a fixed period between ticks.
//!
//! Lifecycle: `Created -> Initializing -> Polling -> Stopping -> Stopped`, with
//! `Initializing -> Stopped` when the baseline snapshot cannot be taken.
//! Cancellation arrives over a crossbeam channel; the inter-tick sleep is a
//! `recv_timeout` on it, so a cancel wakes the loop at the next tick boundary.
//!
//! The engine sits behind one `RwLock`. Each event is handled under a single
//! write guard, so readers see the event counter, the change log and the tree
//! root move together.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use parking_lot::{MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};

use crate::core::config::DaemonConfig;
use crate::core::errors::{PvbError, Result};
use crate::logger::change_log::{ChangeLog, ChangeLogEntry};
use crate::logger::jsonl::{LogRecord, RecordType, Severity};
use crate::monitor::engine::ChangeEngine;
use crate::monitor::observer::DirectoryObserver;
use crate::tree::{IntegrityTree, MerkleHash};

// ──────────────────── state ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Created,
    Initializing,
    Polling,
    Stopping,
    Stopped,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Polling => "polling",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

// ──────────────────── cancellation ────────────────────

/// Sending half of a cancellation channel.
#[derive(Debug, Clone)]
pub struct Canceller {
    tx: Sender<()>,
}

impl Canceller {
    /// Request cancellation. Repeated requests collapse into one.
    pub fn cancel(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Receiving half of a cancellation channel, handed to [`MerkleDaemon::run`].
///
/// Dropping every [`Canceller`] also counts as cancellation.
#[derive(Debug)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    /// Sleep up to `timeout`. Returns `true` if cancellation arrived.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Non-blocking check. Consumes a pending request.
    pub fn is_cancelled(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }
}

/// Create a linked canceller/token pair.
pub fn cancel_channel() -> (Canceller, CancelToken) {
    let (tx, rx) = bounded(1);
    (Canceller { tx }, CancelToken { rx })
}

// ──────────────────── daemon ────────────────────

/// Counts from one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Raw events pulled from the observer.
    pub events: usize,
    /// Successful rebuilds.
    pub rebuilds: usize,
    /// Events whose classification or rebuild failed.
    pub failures: usize,
}

type SharedEngine<T> = Arc<RwLock<ChangeEngine<T>>>;

/// Polling daemon over one integrity tree.
pub struct MerkleDaemon<T> {
    engine: SharedEngine<T>,
    observer: DirectoryObserver,
    period: Duration,
    state: Arc<Mutex<DaemonState>>,
    started_at: Option<Instant>,
}

impl<T> fmt::Debug for MerkleDaemon<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleDaemon")
            .field("root", &self.observer.root())
            .field("period", &self.period)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl<T: IntegrityTree> MerkleDaemon<T> {
    /// Wire the observer to the tree's root directory. The poll period must be
    /// strictly positive.
    pub fn new(tree: T, config: &DaemonConfig) -> Result<Self> {
        Self::with_change_log(tree, config, ChangeLog::new())
    }

    /// Like [`new`](Self::new), with a preconfigured change log.
    pub fn with_change_log(tree: T, config: &DaemonConfig, log: ChangeLog) -> Result<Self> {
        if config.poll_interval_ms == 0 {
            return Err(PvbError::InvalidConfig {
                details: "daemon poll period must be > 0 ms".to_string(),
            });
        }
        let observer = DirectoryObserver::new(tree.root_directory());
        Ok(Self {
            engine: Arc::new(RwLock::new(ChangeEngine::with_log(tree, log))),
            observer,
            period: Duration::from_millis(config.poll_interval_ms),
            state: Arc::new(Mutex::new(DaemonState::Created)),
            started_at: None,
        })
    }

    pub fn state(&self) -> DaemonState {
        *self.state.lock()
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    pub fn num_events(&self) -> u64 {
        self.engine.read().num_events()
    }

    pub fn root_digest(&self) -> MerkleHash {
        self.engine.read().tree().root_digest()
    }

    /// Read guard over the tree. Hold it briefly: the loop waits on it.
    pub fn tree(&self) -> MappedRwLockReadGuard<'_, T> {
        RwLockReadGuard::map(self.engine.read(), ChangeEngine::tree)
    }

    pub fn change_log_snapshot(&self) -> Vec<ChangeLogEntry> {
        self.engine.read().log().to_vec()
    }

    /// Take the baseline snapshot and enter `Polling`.
    ///
    /// On failure the daemon lands in `Stopped` and never polls.
    pub fn initialize(&mut self) -> Result<()> {
        let current = self.state();
        if current != DaemonState::Created {
            return Err(PvbError::Runtime {
                details: format!("cannot initialize a daemon in state {current}"),
            });
        }
        self.set_state(DaemonState::Initializing);

        if let Err(err) = self.observer.initialize() {
            eprintln!("[PVB-DAEMON] observer initialization failed: {err}");
            self.set_state(DaemonState::Stopped);
            return Err(err);
        }

        self.started_at = Some(Instant::now());
        self.set_state(DaemonState::Polling);
        Ok(())
    }

    /// Pull one delta from the observer and feed every event to the engine in
    /// observer order.
    ///
    /// Per-event failures are counted and polling goes on. Errors that make
    /// further polling pointless (see [`PvbError::is_fatal_to_daemon`]) are
    /// returned immediately.
    pub fn tick(&mut self) -> Result<TickReport> {
        let current = self.state();
        if current != DaemonState::Polling {
            return Err(PvbError::Runtime {
                details: format!("cannot tick a daemon in state {current}"),
            });
        }

        let raw_events = self.observer.check()?;
        let mut report = TickReport {
            events: raw_events.len(),
            ..TickReport::default()
        };

        for raw in &raw_events {
            let outcome = self.engine.write().process_raw(raw);
            match outcome {
                Ok(outcome) if outcome.rebuilt => report.rebuilds += 1,
                Ok(_) => {}
                Err(err) if err.is_fatal_to_daemon() => return Err(err),
                Err(err) => {
                    report.failures += 1;
                    eprintln!("[PVB-DAEMON] event for {} not applied: {err}", raw.path.display());
                }
            }
        }

        Ok(report)
    }

    /// Initialize, then tick and sleep until cancelled or a fatal error.
    ///
    /// Always ends in `Stopped`. The observer is torn down on every exit path
    /// after a successful initialization.
    pub fn run(&mut self, token: &CancelToken) -> Result<()> {
        self.initialize()?;
        self.mirror_lifecycle(RecordType::DaemonStart, None);
        eprintln!(
            "[PVB-DAEMON] polling {} every {}ms",
            self.observer.root().display(),
            self.period.as_millis()
        );

        let result = loop {
            match self.tick() {
                Ok(_) => {}
                Err(err) if err.is_fatal_to_daemon() => {
                    eprintln!("[PVB-DAEMON] monitoring stopped: {err}");
                    break Err(err);
                }
                Err(err) => eprintln!("[PVB-DAEMON] tick failed: {err}"),
            }

            if token.wait(self.period) {
                eprintln!("[PVB-DAEMON] monitor interrupted, exiting...");
                break Ok(());
            }
        };

        self.shutdown(result.as_ref().err());
        result
    }

    fn shutdown(&mut self, cause: Option<&PvbError>) {
        self.set_state(DaemonState::Stopping);

        if let Err(err) = self.observer.destroy() {
            eprintln!("[PVB-DAEMON] observer teardown failed, messy exit: {err}");
        }

        self.mirror_lifecycle(RecordType::DaemonStop, cause);
        self.engine.write().flush_log();
        self.set_state(DaemonState::Stopped);

        let uptime_secs = self.started_at.map_or(0, |t| t.elapsed().as_secs());
        eprintln!("[PVB-DAEMON] shutdown complete (uptime={uptime_secs}s)");
    }

    fn mirror_lifecycle(&self, event: RecordType, cause: Option<&PvbError>) {
        let mut engine = self.engine.write();
        let mut record = match cause {
            Some(err) => LogRecord::new(event, Severity::Critical).with_error(err),
            None => LogRecord::new(event, Severity::Info),
        };
        record.path = Some(self.observer.root().display().to_string());
        record.num_events = Some(engine.num_events());
        record.details = Some(format!("period_ms={}", self.period.as_millis()));
        engine.change_log_mut().mirror(&record);
    }

    fn set_state(&self, next: DaemonState) {
        *self.state.lock() = next;
    }
}

impl<T: IntegrityTree + 'static> MerkleDaemon<T> {
    /// Run the daemon on its own named thread.
    pub fn spawn(self) -> Result<DaemonHandle<T>> {
        let (canceller, token) = cancel_channel();
        let engine = Arc::clone(&self.engine);
        let state = Arc::clone(&self.state);

        let mut daemon = self;
        let thread = thread::Builder::new()
            .name("pvb-daemon".to_string())
            .spawn(move || daemon.run(&token))
            .map_err(|source| PvbError::Runtime {
                details: format!("failed to spawn daemon thread: {source}"),
            })?;

        Ok(DaemonHandle {
            engine,
            state,
            canceller,
            thread,
        })
    }
}

// ──────────────────── handle ────────────────────

/// Owner-side view of a spawned daemon. All reads are safe while polling and
/// reflect the last completed event.
///
/// Dropping the handle cancels the daemon.
pub struct DaemonHandle<T> {
    engine: SharedEngine<T>,
    state: Arc<Mutex<DaemonState>>,
    canceller: Canceller,
    thread: thread::JoinHandle<Result<()>>,
}

impl<T: IntegrityTree> DaemonHandle<T> {
    pub fn state(&self) -> DaemonState {
        *self.state.lock()
    }

    pub fn tree(&self) -> MappedRwLockReadGuard<'_, T> {
        RwLockReadGuard::map(self.engine.read(), ChangeEngine::tree)
    }

    pub fn num_events(&self) -> u64 {
        self.engine.read().num_events()
    }

    pub fn root_digest(&self) -> MerkleHash {
        self.engine.read().tree().root_digest()
    }

    pub fn change_log_snapshot(&self) -> Vec<ChangeLogEntry> {
        self.engine.read().log().to_vec()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Wait for the loop to end and return how it ended.
    pub fn join(self) -> Result<()> {
        self.thread.join().map_err(|_| PvbError::Runtime {
            details: "daemon thread panicked".to_string(),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::change_log::EntryKind;
    use crate::tree::{FileMerkleTree, ZERO_HASH};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(period_ms: u64) -> DaemonConfig {
        DaemonConfig {
            watch_dir: PathBuf::from("/unused"),
            poll_interval_ms: period_ms,
            persist_change_log: false,
        }
    }

    fn built(tmp: &TempDir) -> FileMerkleTree {
        FileMerkleTree::build(tmp.path()).unwrap()
    }

    #[test]
    fn zero_period_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = MerkleDaemon::new(built(&tmp), &config(0)).unwrap_err();
        assert_eq!(err.code(), "PVB-1001");
    }

    #[test]
    fn initialize_moves_to_polling() {
        let tmp = TempDir::new().unwrap();
        let mut daemon = MerkleDaemon::new(built(&tmp), &config(10)).unwrap();
        assert_eq!(daemon.state(), DaemonState::Created);
        daemon.initialize().unwrap();
        assert_eq!(daemon.state(), DaemonState::Polling);
        assert!(daemon.initialize().is_err());
    }

    #[test]
    fn initialize_failure_lands_in_stopped() {
        let tmp = TempDir::new().unwrap();
        let watched = tmp.path().join("watched");
        fs::create_dir(&watched).unwrap();
        let tree = FileMerkleTree::build(&watched).unwrap();
        fs::remove_dir(&watched).unwrap();

        let mut daemon = MerkleDaemon::new(tree, &config(10)).unwrap();
        let err = daemon.initialize().unwrap_err();
        assert_eq!(err.code(), "PVB-2101");
        assert_eq!(daemon.state(), DaemonState::Stopped);
        assert!(daemon.tick().is_err());
    }

    #[test]
    fn tick_before_initialize_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut daemon = MerkleDaemon::new(built(&tmp), &config(10)).unwrap();
        assert!(matches!(daemon.tick(), Err(PvbError::Runtime { .. })));
    }

    #[test]
    fn tick_applies_new_file() {
        let tmp = TempDir::new().unwrap();
        let mut daemon = MerkleDaemon::new(built(&tmp), &config(10)).unwrap();
        daemon.initialize().unwrap();
        let before = daemon.root_digest();
        let root = daemon.tree().root_directory().to_path_buf();

        fs::write(root.join("a.txt"), "hello").unwrap();
        let report = daemon.tick().unwrap();

        assert_eq!(report.events, 1);
        assert_eq!(report.rebuilds, 1);
        assert_eq!(daemon.num_events(), 1);
        assert_ne!(daemon.root_digest(), before);
        let log = daemon.change_log_snapshot();
        assert_eq!(log[0].text, format!("FCREATE : {}", root.join("a.txt").display()));
        assert_eq!(log[1].kind, EntryKind::RootTransition);
    }

    #[test]
    fn removing_tracked_subdirectory_resyncs_root() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/a.txt"), "a").unwrap();
        fs::write(tmp.path().join("top.txt"), "top").unwrap();
        let mut daemon = MerkleDaemon::new(built(&tmp), &config(10)).unwrap();
        daemon.initialize().unwrap();
        let before = daemon.root_digest();
        let root = daemon.tree().root_directory().to_path_buf();

        fs::remove_dir_all(root.join("sub")).unwrap();
        let report = daemon.tick().unwrap();

        assert_eq!(report.events, 2);
        assert_eq!(report.rebuilds, 1);
        assert_ne!(daemon.root_digest(), before);
        assert_eq!(daemon.root_digest(), built(&tmp).root_digest());
        assert!(!daemon.tree().is_tracked(&root.join("sub")));

        let lines: Vec<String> = daemon
            .change_log_snapshot()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(lines[0], format!("FDELETE : {}", root.join("sub/a.txt").display()));
        assert!(lines[1].starts_with("Hash update: "));
        assert_eq!(lines[2], format!("DDELETE : {}", root.join("sub").display()));
    }

    #[test]
    fn tick_with_no_changes_is_quiet() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let mut daemon = MerkleDaemon::new(built(&tmp), &config(10)).unwrap();
        daemon.initialize().unwrap();
        assert_eq!(daemon.tick().unwrap(), TickReport::default());
        assert_eq!(daemon.num_events(), 0);
    }

    #[test]
    fn removed_root_ends_polling() {
        let tmp = TempDir::new().unwrap();
        let watched = tmp.path().join("watched");
        fs::create_dir(&watched).unwrap();
        let mut daemon =
            MerkleDaemon::new(FileMerkleTree::build(&watched).unwrap(), &config(5)).unwrap();
        daemon.initialize().unwrap();
        fs::remove_dir(&watched).unwrap();

        let err = daemon.tick().unwrap_err();
        assert!(matches!(err, PvbError::RootUnavailable { .. }));
        assert!(err.is_fatal_to_daemon());
    }

    #[test]
    fn run_on_vanished_root_stops_with_error() {
        let tmp = TempDir::new().unwrap();
        let watched = tmp.path().join("watched");
        fs::create_dir(&watched).unwrap();
        let mut daemon =
            MerkleDaemon::new(FileMerkleTree::build(&watched).unwrap(), &config(5)).unwrap();

        let (canceller, token) = cancel_channel();
        fs::remove_dir(&watched).unwrap();
        // Baseline fails first, so the loop is never entered.
        let err = daemon.run(&token).unwrap_err();
        assert_eq!(err.code(), "PVB-2101");
        assert_eq!(daemon.state(), DaemonState::Stopped);
        drop(canceller);
    }

    #[test]
    fn pending_cancel_stops_after_first_tick() {
        let tmp = TempDir::new().unwrap();
        let mut daemon = MerkleDaemon::new(built(&tmp), &config(60_000)).unwrap();
        let (canceller, token) = cancel_channel();
        canceller.cancel();
        canceller.cancel();

        let started = Instant::now();
        daemon.run(&token).unwrap();
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(daemon.state(), DaemonState::Stopped);
    }

    #[test]
    fn token_reports_dropped_canceller_as_cancel() {
        let (canceller, token) = cancel_channel();
        assert!(!token.is_cancelled());
        assert!(!token.wait(Duration::from_millis(1)));
        drop(canceller);
        assert!(token.wait(Duration::from_secs(5)));
    }

    #[test]
    fn spawned_daemon_sees_changes_and_cancels() {
        let tmp = TempDir::new().unwrap();
        let tree = built(&tmp);
        let root = tree.root_directory().to_path_buf();
        let handle = MerkleDaemon::new(tree, &config(10)).unwrap().spawn().unwrap();

        // Wait for the baseline before touching the tree.
        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.state() != DaemonState::Polling && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.state(), DaemonState::Polling);
        assert_ne!(handle.root_digest(), ZERO_HASH);

        fs::write(root.join("a.txt"), "payload").unwrap();
        while handle.num_events() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.num_events() >= 1);
        assert!(handle.tree().is_tracked(&root.join("a.txt")));

        handle.cancel();
        let state = Arc::clone(&handle.state);
        handle.join().unwrap();
        assert_eq!(*state.lock(), DaemonState::Stopped);
    }

    #[test]
    fn state_labels() {
        assert_eq!(DaemonState::Polling.to_string(), "polling");
        assert_eq!(DaemonState::Stopped.to_string(), "stopped");
    }
}
