use std::{
    fmt,
    num::NonZeroUsize,
    sync::{
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::diagnosis::{self, Confidence};
use super::events::{FailureNotification, HeartbeatRecord, LivelinessEvent};
use super::history::{DEFAULT_HISTORY_CAPACITY, HeartbeatHistory};
use super::notifier::{FailureNotifier, SinkError, SinkFactory};
use super::stamp::Stamp;

pub const DEFAULT_TOPIC_NAME: &str = "heartbeat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WatchdogState {
    Unconfigured = 0,
    Inactive = 1,
    Active = 2,
    Finalized = 3,
}

impl WatchdogState {
    #[inline]
    fn from_u32(val: u32) -> WatchdogState {
        match val {
            0 => WatchdogState::Unconfigured,
            1 => WatchdogState::Inactive,
            2 => WatchdogState::Active,
            _ => WatchdogState::Finalized,
        }
    }
    #[inline]
    fn into_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WatchdogState::Unconfigured => "unconfigured",
            WatchdogState::Inactive => "inactive",
            WatchdogState::Active => "active",
            WatchdogState::Finalized => "finalized",
        })
    }
}

struct AtomicWatchdogState(AtomicU32);

impl AtomicWatchdogState {
    fn new(val: WatchdogState) -> Self {
        AtomicWatchdogState(AtomicU32::new(val.into_u32()))
    }
    fn load(&self, ordering: Ordering) -> WatchdogState {
        WatchdogState::from_u32(self.0.load(ordering))
    }
    fn store(&self, value: WatchdogState, ordering: Ordering) {
        self.0.store(value.into_u32(), ordering)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Configure,
    Activate,
    Deactivate,
    Cleanup,
    Shutdown,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Configure => "configure",
            Transition::Activate => "activate",
            Transition::Deactivate => "deactivate",
            Transition::Cleanup => "cleanup",
            Transition::Shutdown => "shutdown",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Cannot {transition} while {from}")]
    InvalidTransition {
        from: WatchdogState,
        transition: Transition,
    },
    #[error("Unable to allocate the failure sink: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Lease granted to the watched entities. Must exceed their heartbeat
    /// period to absorb transmission jitter.
    pub lease_duration: Duration,
    /// Run configure and activate on construction.
    pub autostart: bool,
    pub publish_failures: bool,
    pub topic_name: String,
    pub history_capacity: NonZeroUsize,
}

impl WatchdogConfig {
    pub fn new(lease_duration: Duration) -> Self {
        Self {
            lease_duration,
            autostart: false,
            publish_failures: false,
            topic_name: DEFAULT_TOPIC_NAME.to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Default)]
struct Resources {
    history: Option<Arc<HeartbeatHistory>>,
    notifier: Option<FailureNotifier>,
}

/// Liveliness based failure detector.
///
/// Heartbeats are kept in a bounded history while the watchdog is active.
/// When the liveliness monitor reports that an entity stopped being alive,
/// the history is diagnosed to find out which one, and a failure
/// notification naming it is published.
///
/// Transitions hold the resources exclusively while heartbeat ingestion and
/// liveliness handling share them. Once a transition out of `Active` returns,
/// no further heartbeat is recorded and no further notification is published,
/// while a slow sink never holds up ingestion.
pub struct Watchdog {
    config: WatchdogConfig,
    sink_factory: Box<dyn SinkFactory>,
    state: AtomicWatchdogState,
    resources: RwLock<Resources>,
}

impl Watchdog {
    pub fn new(
        config: WatchdogConfig,
        sink_factory: impl SinkFactory + 'static,
    ) -> Result<Self, LifecycleError> {
        let autostart = config.autostart;
        let watchdog = Self {
            config,
            sink_factory: Box::new(sink_factory),
            state: AtomicWatchdogState::new(WatchdogState::Unconfigured),
            resources: RwLock::new(Resources::default()),
        };

        if autostart {
            watchdog.configure()?;
            watchdog.activate()?;
        }

        Ok(watchdog)
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn state(&self) -> WatchdogState {
        self.state.load(Ordering::SeqCst)
    }

    fn resources(&self) -> RwLockReadGuard<'_, Resources> {
        self.resources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn resources_mut(&self) -> RwLockWriteGuard<'_, Resources> {
        self.resources.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn expect_state(
        &self,
        allowed: &[WatchdogState],
        transition: Transition,
    ) -> Result<WatchdogState, LifecycleError> {
        let from = self.state();
        if allowed.contains(&from) {
            Ok(from)
        } else {
            warn!("Rejected {transition} transition while {from}");
            Err(LifecycleError::InvalidTransition { from, transition })
        }
    }

    pub fn trigger(&self, transition: Transition) -> Result<WatchdogState, LifecycleError> {
        match transition {
            Transition::Configure => self.configure()?,
            Transition::Activate => self.activate()?,
            Transition::Deactivate => self.deactivate()?,
            Transition::Cleanup => self.cleanup()?,
            Transition::Shutdown => self.shutdown()?,
        }
        Ok(self.state())
    }

    pub fn configure(&self) -> Result<(), LifecycleError> {
        let mut resources = self.resources_mut();
        self.expect_state(&[WatchdogState::Unconfigured], Transition::Configure)?;

        let notifier = if self.config.publish_failures {
            match self.sink_factory.open() {
                Ok(sink) => Some(FailureNotifier::new(sink)),
                Err(e) => {
                    error!("Unable to create the failure publisher: {e}");
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        resources.history = Some(Arc::new(HeartbeatHistory::new(
            self.config.history_capacity,
        )));
        resources.notifier = notifier;
        self.state.store(WatchdogState::Inactive, Ordering::SeqCst);

        info!(
            "on_configure() is called. Lease {:?} on topic {:?}, history of {} heartbeats",
            self.config.lease_duration, self.config.topic_name, self.config.history_capacity
        );
        Ok(())
    }

    pub fn activate(&self) -> Result<(), LifecycleError> {
        let resources = self.resources_mut();
        self.expect_state(&[WatchdogState::Inactive], Transition::Activate)?;

        // Starting from this point failures are published
        if let Some(notifier) = &resources.notifier {
            notifier.on_activate();
        }
        self.state.store(WatchdogState::Active, Ordering::SeqCst);

        info!("on_activate() is called.");
        Ok(())
    }

    pub fn deactivate(&self) -> Result<(), LifecycleError> {
        let resources = self.resources_mut();
        self.expect_state(&[WatchdogState::Active], Transition::Deactivate)?;

        if let Some(notifier) = &resources.notifier {
            notifier.on_deactivate();
        }
        self.state.store(WatchdogState::Inactive, Ordering::SeqCst);

        info!("on_deactivate() is called.");
        Ok(())
    }

    pub fn cleanup(&self) -> Result<(), LifecycleError> {
        let mut resources = self.resources_mut();
        self.expect_state(&[WatchdogState::Inactive], Transition::Cleanup)?;

        *resources = Resources::default();
        self.state.store(WatchdogState::Unconfigured, Ordering::SeqCst);

        info!("on cleanup is called.");
        Ok(())
    }

    pub fn shutdown(&self) -> Result<(), LifecycleError> {
        let mut resources = self.resources_mut();
        let from = self.expect_state(
            &[
                WatchdogState::Unconfigured,
                WatchdogState::Inactive,
                WatchdogState::Active,
            ],
            Transition::Shutdown,
        )?;

        if let Some(notifier) = &resources.notifier {
            notifier.on_deactivate();
        }
        *resources = Resources::default();
        self.state.store(WatchdogState::Finalized, Ordering::SeqCst);

        info!("on shutdown is called from state {from}.");
        Ok(())
    }

    /// Heartbeat ingestion. Returns whether the heartbeat was kept.
    pub fn record_heartbeat(&self, heartbeat: HeartbeatRecord) -> bool {
        if self.state() != WatchdogState::Active {
            debug!(
                "Dropping heartbeat from {} while {}",
                heartbeat.entity_id,
                self.state()
            );
            return false;
        }

        // The state may have moved on while waiting for the guard
        let resources = self.resources();
        let state = self.state();
        if state != WatchdogState::Active {
            debug!("Dropping heartbeat from {} while {state}", heartbeat.entity_id);
            return false;
        }
        let Some(history) = &resources.history else {
            return false;
        };
        history.record(heartbeat);
        debug!(
            "Put message with ID {} in cache, heartbeat sent at {}",
            heartbeat.entity_id, heartbeat.timestamp
        );
        true
    }

    /// Handles a liveliness change reported at `now`.
    ///
    /// Never fails: missing evidence and sink errors are logged and the
    /// event is dropped. Returns the published notification, if any.
    pub fn on_liveliness_changed(
        &self,
        event: LivelinessEvent,
        now: Stamp,
    ) -> Option<FailureNotification> {
        debug!(
            "Reader liveliness changed: alive_count {}, not_alive_count {}, alive_count_change {}, not_alive_count_change {}",
            event.alive_count,
            event.not_alive_count,
            event.alive_count_change,
            event.not_alive_count_change
        );

        let resources = self.resources();
        let state = self.state();
        if state != WatchdogState::Active {
            debug!("Dropping liveliness event while {state}");
            return None;
        }
        if !event.is_loss() {
            return None;
        }
        let history = resources.history.as_ref()?;

        let snapshot = match history.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Liveliness lost but no heartbeat to diagnose: {e}");
                return None;
            }
        };

        let loss = match diagnosis::diagnose(&snapshot, now) {
            Ok(loss) => loss,
            Err(e) => {
                warn!("Liveliness lost but diagnosis failed: {e}");
                return None;
            }
        };

        info!(
            "Diagnosed entity {} as lost: last seen {}, {}ms overdue against a {}ms cadence",
            loss.entity_id,
            loss.last_seen,
            loss.overdue_nanos / 1_000_000,
            loss.mean_interval_nanos / 1_000_000
        );
        if loss.confidence == Confidence::Sparse {
            warn!(
                "Diagnosis of entity {} rests on sparse evidence",
                loss.entity_id
            );
        }
        for suspect in diagnosis::rank_suspects(&snapshot, now).iter().skip(1) {
            debug!(
                "Runner up: entity {} last seen {} ({} samples)",
                suspect.entity_id, suspect.last_seen, suspect.samples
            );
        }

        let Some(notifier) = &resources.notifier else {
            debug!("Failure publishing is disabled");
            return None;
        };
        match notifier.notify(&loss, now) {
            Ok(notification) => Some(notification),
            Err(e) => {
                error!("Failed to publish failure of entity {}: {e}", loss.entity_id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::notifier::{ChannelSink, FailureSink};
    use tokio::sync::mpsc::{self, Receiver};

    fn channel_factory(capacity: usize) -> (impl SinkFactory, Receiver<FailureNotification>) {
        let (tx, rx) = mpsc::channel(capacity);
        let factory = move || -> Result<Box<dyn FailureSink>, SinkError> {
            Ok(Box::new(ChannelSink::new(tx.clone())))
        };
        (factory, rx)
    }

    fn publishing_config() -> WatchdogConfig {
        WatchdogConfig {
            publish_failures: true,
            ..WatchdogConfig::new(Duration::from_millis(500))
        }
    }

    fn loss_event() -> LivelinessEvent {
        LivelinessEvent {
            alive_count: 0,
            not_alive_count: 1,
            alive_count_change: -1,
            not_alive_count_change: 1,
        }
    }

    fn beat(entity_id: i32, millis: i64) -> HeartbeatRecord {
        HeartbeatRecord::new(entity_id, Stamp::from_millis(millis))
    }

    #[test]
    fn test_end_to_end_failure_notification() {
        let (factory, mut rx) = channel_factory(8);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();

        watchdog.configure().unwrap();
        watchdog.activate().unwrap();
        for millis in [0, 200, 400] {
            assert!(watchdog.record_heartbeat(beat(7, millis)));
        }

        let now = Stamp::from_millis(1000);
        let notification = watchdog.on_liveliness_changed(loss_event(), now).unwrap();
        assert_eq!(notification.entity_id, 7);
        assert_eq!(notification.reported_at, now);

        let received = rx.try_recv().unwrap();
        assert_eq!(received, notification);
        assert!(rx.try_recv().is_err(), "Expected a single notification");
    }

    #[test]
    fn test_initial_state_is_unconfigured() {
        let (factory, _rx) = channel_factory(1);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();
        assert_eq!(watchdog.state(), WatchdogState::Unconfigured);
        assert_eq!(watchdog.config().history_capacity.get(), 25);
        assert_eq!(watchdog.config().topic_name, "heartbeat");
    }

    #[test]
    fn test_autostart_activates_on_construction() {
        let (factory, _rx) = channel_factory(1);
        let config = WatchdogConfig {
            autostart: true,
            ..publishing_config()
        };
        let watchdog = Watchdog::new(config, factory).unwrap();
        assert_eq!(watchdog.state(), WatchdogState::Active);
    }

    #[test]
    fn test_activate_before_configure_fails() {
        let (factory, _rx) = channel_factory(1);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();

        let res = watchdog.activate();
        assert!(
            matches!(
                res,
                Err(LifecycleError::InvalidTransition {
                    from: WatchdogState::Unconfigured,
                    transition: Transition::Activate
                })
            ),
            "{:?}",
            res
        );
        assert_eq!(watchdog.state(), WatchdogState::Unconfigured);
    }

    #[test]
    fn test_full_transition_cycle() {
        let (factory, _rx) = channel_factory(1);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();

        let steps = [
            (Transition::Configure, WatchdogState::Inactive),
            (Transition::Activate, WatchdogState::Active),
            (Transition::Deactivate, WatchdogState::Inactive),
            (Transition::Cleanup, WatchdogState::Unconfigured),
            (Transition::Configure, WatchdogState::Inactive),
            (Transition::Shutdown, WatchdogState::Finalized),
        ];
        for (transition, expected) in steps {
            assert_eq!(watchdog.trigger(transition).unwrap(), expected, "{transition}");
        }
    }

    #[test]
    fn test_invalid_transitions_keep_state() {
        let (factory, _rx) = channel_factory(1);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();

        assert!(watchdog.deactivate().is_err());
        assert!(watchdog.cleanup().is_err());
        watchdog.configure().unwrap();
        assert!(watchdog.configure().is_err());
        assert!(watchdog.deactivate().is_err());
        watchdog.activate().unwrap();
        assert!(watchdog.cleanup().is_err());
        assert!(watchdog.activate().is_err());
        assert_eq!(watchdog.state(), WatchdogState::Active);
    }

    #[test]
    fn test_shutdown_from_every_live_state() {
        let prepare: [&[Transition]; 3] = [
            &[],
            &[Transition::Configure],
            &[Transition::Configure, Transition::Activate],
        ];
        for steps in prepare {
            let (factory, _rx) = channel_factory(1);
            let watchdog = Watchdog::new(publishing_config(), factory).unwrap();
            for step in steps {
                watchdog.trigger(*step).unwrap();
            }
            watchdog.shutdown().unwrap();
            assert_eq!(watchdog.state(), WatchdogState::Finalized);
        }
    }

    #[test]
    fn test_no_transition_out_of_finalized() {
        let (factory, _rx) = channel_factory(1);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();
        watchdog.shutdown().unwrap();

        for transition in [
            Transition::Configure,
            Transition::Activate,
            Transition::Deactivate,
            Transition::Cleanup,
            Transition::Shutdown,
        ] {
            let res = watchdog.trigger(transition);
            assert!(
                matches!(
                    res,
                    Err(LifecycleError::InvalidTransition {
                        from: WatchdogState::Finalized,
                        ..
                    })
                ),
                "{transition}: {res:?}"
            );
        }
        assert_eq!(watchdog.state(), WatchdogState::Finalized);
    }

    #[test]
    fn test_sink_failure_keeps_watchdog_unconfigured() {
        let factory = || -> Result<Box<dyn FailureSink>, SinkError> { Err(SinkError::ChannelClosed) };
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();

        let res = watchdog.configure();
        assert!(matches!(res, Err(LifecycleError::Sink(_))), "{:?}", res);
        assert_eq!(watchdog.state(), WatchdogState::Unconfigured);
        assert!(watchdog.activate().is_err());
    }

    #[test]
    fn test_autostart_surfaces_sink_failure() {
        let factory = || -> Result<Box<dyn FailureSink>, SinkError> { Err(SinkError::ChannelClosed) };
        let config = WatchdogConfig {
            autostart: true,
            ..publishing_config()
        };
        assert!(matches!(
            Watchdog::new(config, factory),
            Err(LifecycleError::Sink(_))
        ));
    }

    #[test]
    fn test_sink_not_opened_without_publishing() {
        let factory = || -> Result<Box<dyn FailureSink>, SinkError> { Err(SinkError::ChannelClosed) };
        let config = WatchdogConfig::new(Duration::from_millis(500));
        let watchdog = Watchdog::new(config, factory).unwrap();

        watchdog.configure().unwrap();
        watchdog.activate().unwrap();
        for millis in [0, 200, 400] {
            watchdog.record_heartbeat(beat(7, millis));
        }
        // Diagnosis still runs, but nothing is published
        assert!(
            watchdog
                .on_liveliness_changed(loss_event(), Stamp::from_millis(1000))
                .is_none()
        );
    }

    #[test]
    fn test_heartbeats_dropped_unless_active() {
        let (factory, mut rx) = channel_factory(4);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();

        assert!(!watchdog.record_heartbeat(beat(1, 0)));
        watchdog.configure().unwrap();
        assert!(!watchdog.record_heartbeat(beat(1, 100)));
        watchdog.activate().unwrap();
        assert!(watchdog.record_heartbeat(beat(1, 200)));
        assert!(watchdog.record_heartbeat(beat(1, 300)));
        watchdog.deactivate().unwrap();
        assert!(!watchdog.record_heartbeat(beat(1, 400)));

        // Only the two heartbeats recorded while active are evidence
        watchdog.activate().unwrap();
        let notification = watchdog
            .on_liveliness_changed(loss_event(), Stamp::from_millis(1000))
            .unwrap();
        assert_eq!(notification.last_seen, Stamp::from_millis(300));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_liveliness_event_dropped_unless_active() {
        let (factory, mut rx) = channel_factory(4);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();
        let now = Stamp::from_millis(1000);

        assert!(watchdog.on_liveliness_changed(loss_event(), now).is_none());
        watchdog.configure().unwrap();
        watchdog.activate().unwrap();
        for millis in [0, 200, 400] {
            watchdog.record_heartbeat(beat(7, millis));
        }
        watchdog.deactivate().unwrap();
        assert!(watchdog.on_liveliness_changed(loss_event(), now).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_gain_event_does_not_diagnose() {
        let (factory, mut rx) = channel_factory(4);
        let config = WatchdogConfig {
            autostart: true,
            ..publishing_config()
        };
        let watchdog = Watchdog::new(config, factory).unwrap();
        for millis in [0, 200, 400] {
            watchdog.record_heartbeat(beat(7, millis));
        }

        let gain = LivelinessEvent {
            alive_count: 1,
            not_alive_count: 0,
            alive_count_change: 1,
            not_alive_count_change: 0,
        };
        assert!(
            watchdog
                .on_liveliness_changed(gain, Stamp::from_millis(1000))
                .is_none()
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_no_evidence_is_absorbed() {
        let (factory, mut rx) = channel_factory(4);
        let config = WatchdogConfig {
            autostart: true,
            ..publishing_config()
        };
        let watchdog = Watchdog::new(config, factory).unwrap();
        let now = Stamp::from_millis(1000);

        // Empty history
        assert!(watchdog.on_liveliness_changed(loss_event(), now).is_none());
        // Single samples only
        watchdog.record_heartbeat(beat(1, 100));
        watchdog.record_heartbeat(beat(2, 200));
        assert!(watchdog.on_liveliness_changed(loss_event(), now).is_none());

        assert!(rx.try_recv().is_err());
        assert_eq!(watchdog.state(), WatchdogState::Active);
    }

    #[test]
    fn test_cleanup_discards_history() {
        let (factory, _rx) = channel_factory(4);
        let watchdog = Watchdog::new(publishing_config(), factory).unwrap();
        watchdog.configure().unwrap();
        watchdog.activate().unwrap();
        for millis in [0, 200, 400] {
            watchdog.record_heartbeat(beat(7, millis));
        }
        watchdog.deactivate().unwrap();
        watchdog.cleanup().unwrap();
        watchdog.configure().unwrap();
        watchdog.activate().unwrap();

        assert!(
            watchdog
                .on_liveliness_changed(loss_event(), Stamp::from_millis(1000))
                .is_none()
        );
    }

    #[test]
    fn test_configured_capacity_bounds_evidence() {
        let (factory, _rx) = channel_factory(4);
        let config = WatchdogConfig {
            autostart: true,
            history_capacity: NonZeroUsize::new(3).unwrap(),
            ..publishing_config()
        };
        let watchdog = Watchdog::new(config, factory).unwrap();

        // Entity 1 is pushed out of the history by entity 2
        watchdog.record_heartbeat(beat(1, 0));
        watchdog.record_heartbeat(beat(1, 100));
        for millis in [500, 600, 700] {
            watchdog.record_heartbeat(beat(2, millis));
        }

        let notification = watchdog
            .on_liveliness_changed(loss_event(), Stamp::from_millis(1000))
            .unwrap();
        assert_eq!(notification.entity_id, 2);
    }

    #[test]
    fn test_no_notification_after_deactivate_returns() {
        let (factory, mut rx) = channel_factory(10_000);
        let config = WatchdogConfig {
            autostart: true,
            ..publishing_config()
        };
        let watchdog = Arc::new(Watchdog::new(config, factory).unwrap());
        for millis in [0, 200, 400] {
            watchdog.record_heartbeat(beat(7, millis));
        }

        let router = {
            let watchdog = Arc::clone(&watchdog);
            std::thread::spawn(move || {
                for _ in 0..2_000 {
                    watchdog.on_liveliness_changed(loss_event(), Stamp::from_millis(1000));
                }
            })
        };

        std::thread::sleep(Duration::from_millis(1));
        watchdog.deactivate().unwrap();
        while rx.try_recv().is_ok() {}

        router.join().unwrap();
        assert!(
            rx.try_recv().is_err(),
            "Notification published after deactivate returned"
        );
    }

    struct SlowSink {
        entered: std::sync::mpsc::Sender<()>,
    }

    impl FailureSink for SlowSink {
        fn publish(&self, _notification: &FailureNotification) -> Result<(), SinkError> {
            let _ = self.entered.send(());
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        }
    }

    #[test]
    fn test_slow_sink_does_not_block_heartbeats() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let factory = move || -> Result<Box<dyn FailureSink>, SinkError> {
            Ok(Box::new(SlowSink {
                entered: entered_tx.clone(),
            }))
        };
        let config = WatchdogConfig {
            autostart: true,
            ..publishing_config()
        };
        let watchdog = Arc::new(Watchdog::new(config, factory).unwrap());
        for millis in [0, 200, 400] {
            watchdog.record_heartbeat(beat(7, millis));
        }

        let router = {
            let watchdog = Arc::clone(&watchdog);
            std::thread::spawn(move || {
                watchdog.on_liveliness_changed(loss_event(), Stamp::from_millis(1000))
            })
        };

        // Wait until the sink is busy publishing
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let started = std::time::Instant::now();
        assert!(watchdog.record_heartbeat(beat(8, 500)));
        let elapsed = started.elapsed();
        assert!(
            elapsed < Duration::from_millis(100),
            "record_heartbeat waited {elapsed:?} on the sink"
        );

        assert_eq!(router.join().unwrap().map(|n| n.entity_id), Some(7));
    }

    #[test]
    fn test_no_heartbeat_recorded_after_deactivate_returns() {
        let (factory, _rx) = channel_factory(1);
        let config = WatchdogConfig {
            autostart: true,
            ..publishing_config()
        };
        let watchdog = Arc::new(Watchdog::new(config, factory).unwrap());
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let recorder = {
            let watchdog = Arc::clone(&watchdog);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut millis = 0;
                while !stop.load(Ordering::SeqCst) {
                    watchdog.record_heartbeat(beat(1, millis));
                    millis += 1;
                }
            })
        };

        std::thread::sleep(Duration::from_millis(1));
        watchdog.deactivate().unwrap();
        let history = watchdog.resources().history.clone().unwrap();
        let latest = history.latest_time();

        std::thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::SeqCst);
        recorder.join().unwrap();

        assert_eq!(
            history.latest_time(),
            latest,
            "Heartbeat recorded after deactivate returned"
        );
    }
}
