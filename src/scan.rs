//! Drives one scan attempt at a time against a [`ScanGateway`].
//!
//! File and directory scans finish inside the start request. A system scan
//! keeps running on the server, so the controller polls its status on a
//! fixed interval and fetches the results once the server reports it idle.
//!
//! Every session carries a generation number. Anything that completes after
//! its session was stopped or replaced sees a different generation (or a
//! status it does not expect) and is dropped instead of applied.

pub mod session;

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use log::{debug, error, info, trace, warn};
use tokio::{
    sync::{mpsc::UnboundedSender, RwLock},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{
    error::{Result, ScanClientError},
    gateway::{ScanGateway, ScanTarget},
    models::{is_elevation_sentinel, ScanFinding, ScanSummary},
};

pub use session::{ScanSession, SessionStatus, ELEVATION_MESSAGE, STOPPED_BY_USER};

pub type SharedSession = Arc<RwLock<ScanSession>>;

/// Notifications for whoever renders the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    StatusChanged {
        generation: u64,
        status: SessionStatus,
    },
    Completed {
        generation: u64,
        summary: ScanSummary,
    },
    Failed {
        generation: u64,
        message: String,
    },
    ElevationRequired {
        generation: u64,
    },
    /// A status check failed. The session keeps running.
    PollFailed {
        generation: u64,
        message: String,
    },
    /// The server did not confirm a stop. The session is stopped anyway.
    StopRequestFailed {
        generation: u64,
        message: String,
    },
}

#[derive(Debug, Clone, Default)]
struct EventSink(Option<UnboundedSender<ScanEvent>>);

impl EventSink {
    fn send(&self, event: ScanEvent) {
        if let Some(tx) = &self.0 {
            if let Err(e) = tx.send(event) {
                error!("got error sending {:?} to frontend", e.0);
            }
        }
    }

    fn status(&self, generation: u64, status: SessionStatus) {
        self.send(ScanEvent::StatusChanged { generation, status });
    }
}

pub struct ScanController<G: ScanGateway> {
    gateway: Arc<G>,
    session: SharedSession,
    poller: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
    events: EventSink,
}

impl<G: ScanGateway> ScanController<G> {
    pub fn new(gateway: Arc<G>, poll_interval: Duration) -> Self {
        Self::build(gateway, poll_interval, EventSink::default())
    }

    pub fn with_events(
        gateway: Arc<G>,
        poll_interval: Duration,
        event_tx: UnboundedSender<ScanEvent>,
    ) -> Self {
        Self::build(gateway, poll_interval, EventSink(Some(event_tx)))
    }

    fn build(gateway: Arc<G>, poll_interval: Duration, events: EventSink) -> Self {
        Self {
            gateway,
            session: Arc::new(RwLock::new(ScanSession::default())),
            poller: Mutex::new(None),
            poll_interval,
            events,
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub async fn snapshot(&self) -> ScanSession {
        self.session.read().await.clone()
    }

    pub async fn summary(&self) -> Option<ScanSummary> {
        self.session.read().await.summary()
    }

    /// Starts a new session, replacing whatever finished session is on screen.
    ///
    /// Gateway failures end up in the returned session as `Failed`; the only
    /// error returned here is [`ScanClientError::ScanInProgress`].
    pub async fn start(&self, target: ScanTarget) -> Result<ScanSession> {
        let kind = target.kind();
        let generation = {
            let mut session = self.session.write().await;
            if session.status.is_active() {
                return Err(ScanClientError::ScanInProgress);
            }
            session.begin(kind)
        };
        self.cancel_polling();
        self.events.status(generation, SessionStatus::Requesting);
        info!("starting {kind:?} scan (session {generation})");

        let outcome = self.gateway.start_scan(&target).await;

        let mut session = self.session.write().await;
        if session.generation != generation || session.status != SessionStatus::Requesting {
            debug!("dropping start response for superseded session {generation}");
            return Ok(session.clone());
        }

        match outcome {
            Ok(result) if is_elevation_sentinel(result.findings()) => {
                warn!("backend needs administrator privileges for a {kind:?} scan");
                session.require_elevation();
                self.events.send(ScanEvent::ElevationRequired { generation });
                self.events.status(generation, SessionStatus::Failed);
            }
            Ok(result) if kind.is_synchronous() => {
                let findings = result.into_findings();
                let summary = ScanSummary::from_findings(&findings);
                info!("{kind:?} scan completed: {summary:?}");
                session.complete(findings);
                self.events.send(ScanEvent::Completed {
                    generation,
                    summary,
                });
            }
            Ok(_) => {
                session.status = SessionStatus::Running;
                self.events.status(generation, SessionStatus::Running);
                self.spawn_poller(generation);
            }
            Err(e) => {
                warn!("{kind:?} scan failed to start: {e}");
                let message = e.message();
                session.fail(message.clone());
                self.events.send(ScanEvent::Failed {
                    generation,
                    message,
                });
            }
        }

        Ok(session.clone())
    }

    /// Requests cancellation of a running scan. Does nothing unless the session is `Running`.
    pub async fn stop(&self) -> ScanSession {
        let generation = {
            let mut session = self.session.write().await;
            if session.status != SessionStatus::Running {
                debug!("ignoring stop while {:?}", session.status);
                return session.clone();
            }
            session.status = SessionStatus::Stopping;
            session.generation
        };
        // the local timer goes away now, whatever the server says
        self.cancel_polling();
        self.events.status(generation, SessionStatus::Stopping);
        info!("stopping session {generation}");

        let outcome = self.gateway.stop_scan().await;

        let mut session = self.session.write().await;
        if session.generation != generation || session.status != SessionStatus::Stopping {
            return session.clone();
        }

        session.fail(STOPPED_BY_USER);
        if let Err(e) = outcome {
            warn!("server did not acknowledge stop: {e}");
            let message = e.message();
            session.stop_error = Some(message.clone());
            self.events.send(ScanEvent::StopRequestFailed {
                generation,
                message,
            });
        }
        self.events.send(ScanEvent::Failed {
            generation,
            message: STOPPED_BY_USER.to_string(),
        });

        session.clone()
    }

    fn spawn_poller(&self, generation: u64) {
        let handle = tokio::spawn(poll_until_finished(
            self.gateway.clone(),
            self.session.clone(),
            generation,
            self.poll_interval,
            self.events.clone(),
        ));

        let previous = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn cancel_polling(&self) {
        let handle = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl<G: ScanGateway> Drop for ScanController<G> {
    fn drop(&mut self) {
        self.cancel_polling();
    }
}

// free function so it can be moved into tokio::spawn
async fn poll_until_finished<G: ScanGateway>(
    gateway: Arc<G>,
    session: SharedSession,
    generation: u64,
    period: Duration,
    events: EventSink,
) {
    let mut ticker = tokio::time::interval(period);
    // a slow status call pushes the next tick back instead of bunching them up
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !is_current(&session, generation).await {
            debug!("session {generation} left Running, poller exiting");
            return;
        }

        trace!("checking system scan status (session {generation})");
        match gateway.poll_status().await {
            Ok(status) if status.is_running => continue,
            Ok(_) => break,
            Err(e) => {
                warn!("error checking scan status: {e}");
                events.send(ScanEvent::PollFailed {
                    generation,
                    message: e.message(),
                });
            }
        }
    }

    info!("server reports session {generation} finished, fetching results");
    let outcome = gateway.fetch_results().await;
    apply_results(&session, generation, outcome, &events).await;
}

async fn is_current(session: &SharedSession, generation: u64) -> bool {
    let session = session.read().await;
    session.generation == generation && session.status == SessionStatus::Running
}

async fn apply_results(
    session: &SharedSession,
    generation: u64,
    outcome: Result<Vec<ScanFinding>>,
    events: &EventSink,
) {
    let mut session = session.write().await;
    if session.generation != generation || session.status != SessionStatus::Running {
        debug!("discarding results for superseded session {generation}");
        return;
    }

    match outcome {
        Ok(findings) => {
            let summary = ScanSummary::from_findings(&findings);
            info!("system scan completed: {summary:?}");
            session.complete(findings);
            events.send(ScanEvent::Completed {
                generation,
                summary,
            });
        }
        Err(e) => {
            warn!("error fetching scan results: {e}");
            let message = e.message();
            session.fail(message.clone());
            events.send(ScanEvent::Failed {
                generation,
                message,
            });
        }
    }
}
