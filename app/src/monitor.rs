//! Door state monitoring and the "left open" alert policy.
//!
//! A single background thread owns a [`DoorStateMonitor`] and is the only
//! writer of its [`MonitorState`]. Status pages use a [`StatusProbe`], which
//! reads the sensor independently and never touches the monitor's state, so
//! no lock is shared between the two.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::alert::{self, AlertSink};
use crate::sensor::SensorReader;
use crate::shutdown::Shutdown;
use crate::DoorState;

/// Thresholds of the alert policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AlertPolicy {
    /// How long the door may stay open before an alert is raised.
    pub open_alert_threshold: Duration,
    /// Minimum gap between two alerts for the same open period.
    pub notification_cooldown: Duration,
}

/// An alert the monitor decided to dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub open_for: Duration,
    pub threshold: Duration,
}

impl Alert {
    pub fn message(&self) -> String {
        alert::open_too_long_message(self.threshold)
    }
}

/// What the monitor believes about the door.
///
/// `door_open_since` is set iff the last known reading was `Open`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorState {
    door_open_since: Option<Instant>,
    last_notification_at: Option<Instant>,
}

impl MonitorState {
    pub fn door_open_since(&self) -> Option<Instant> {
        self.door_open_since
    }

    pub fn last_notification_at(&self) -> Option<Instant> {
        self.last_notification_at
    }

    /// Fold one reading taken at `now` into the state.
    ///
    /// Returns the alert to dispatch, if any. The notification time is
    /// recorded as soon as an alert is returned: delivery is fire and forget
    /// and a failed delivery waits out the cooldown like a successful one.
    pub fn observe(&mut self, reading: DoorState, now: Instant, policy: &AlertPolicy) -> Option<Alert> {
        match (reading, self.door_open_since) {
            // Closed to open transition
            (DoorState::Open, None) => {
                info!("door opened");
                self.door_open_since = Some(now);
                None
            }
            (DoorState::Open, Some(open_since)) => {
                let open_for = now.saturating_duration_since(open_since);
                if open_for <= policy.open_alert_threshold || !self.cooled_down(now, policy) {
                    return None;
                }
                self.last_notification_at = Some(now);
                Some(Alert {
                    open_for,
                    threshold: policy.open_alert_threshold,
                })
            }
            // Open to closed transition
            (DoorState::Closed, Some(open_since)) => {
                info!(
                    "door closed after {}s",
                    now.saturating_duration_since(open_since).as_secs()
                );
                self.door_open_since = None;
                None
            }
            (DoorState::Closed, None) | (DoorState::Unknown, _) => None,
        }
    }

    fn cooled_down(&self, now: Instant, policy: &AlertPolicy) -> bool {
        self.last_notification_at.map_or(true, |notified| {
            now.saturating_duration_since(notified) > policy.notification_cooldown
        })
    }
}

/// Read-only view of the door for status queries.
pub struct StatusProbe<S> {
    sensor: Arc<S>,
}

impl<S> Clone for StatusProbe<S> {
    fn clone(&self) -> Self {
        StatusProbe {
            sensor: Arc::clone(&self.sensor),
        }
    }
}

impl<S: SensorReader> StatusProbe<S> {
    pub fn new(sensor: Arc<S>) -> Self {
        StatusProbe { sensor }
    }

    /// Fresh sensor read. May briefly disagree with the monitor's belief.
    pub fn current_state(&self) -> DoorState {
        read_door(&*self.sensor)
    }
}

fn read_door<S: SensorReader + ?Sized>(sensor: &S) -> DoorState {
    match sensor.read() {
        Ok(state) => state,
        Err(err) => {
            warn!("{}", err);
            DoorState::Unknown
        }
    }
}

pub struct DoorStateMonitor<S, A> {
    sensor: Arc<S>,
    sink: A,
    policy: AlertPolicy,
    poll_interval: Duration,
    state: MonitorState,
}

impl<S: SensorReader, A: AlertSink> DoorStateMonitor<S, A> {
    pub fn new(sensor: Arc<S>, sink: A, policy: AlertPolicy, poll_interval: Duration) -> Self {
        DoorStateMonitor {
            sensor,
            sink,
            policy,
            poll_interval,
            state: MonitorState::default(),
        }
    }

    pub fn probe(&self) -> StatusProbe<S> {
        StatusProbe::new(Arc::clone(&self.sensor))
    }

    pub fn current_state(&self) -> DoorState {
        read_door(&*self.sensor)
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// One iteration of the loop: read, update, maybe alert.
    pub fn poll_once(&mut self, now: Instant) -> DoorState {
        let reading = read_door(&*self.sensor);
        if let Some(alert) = self.state.observe(reading, now, &self.policy) {
            let message = alert.message();
            match self.sink.send(&message) {
                Ok(()) => info!("sent alert after {}s open: {}", alert.open_for.as_secs(), message),
                Err(err) => error!("{}", err),
            }
        }
        reading
    }

    /// Poll until `shutdown` is triggered. Shutdown is only observed between
    /// polls, while sleeping.
    pub fn run(&mut self, shutdown: &Shutdown) {
        info!(
            "monitoring door every {}s, alerting after {}s open",
            self.poll_interval.as_secs(),
            self.policy.open_alert_threshold.as_secs()
        );
        while !shutdown.is_triggered() {
            self.poll_once(Instant::now());
            if shutdown.wait_timeout(self.poll_interval) {
                break;
            }
        }
        info!("monitor thread exiting");
    }
}
