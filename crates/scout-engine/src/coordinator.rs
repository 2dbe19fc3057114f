//! Turn coordinator: owns the session registry and runs each submitted turn
//! as a producer task coupled to a dispatcher by the turn queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, Instrument};

use scout_core::notifications::Notification;
use scout_core::{SessionId, TurnId};
use scout_telemetry::MetricsRecorder;

use crate::dispatcher::{dispatch_turn, DispatchOutcome, DispatchReport};
use crate::error::EngineError;
use crate::producer::TurnProducer;
use crate::queue::turn_queue;
use crate::registry::{SessionHandle, SessionRegistry, TurnSlot};

/// Summary of one finished turn.
#[derive(Clone, Debug)]
pub struct TurnReport {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub dispatch: DispatchReport,
    /// Text returned by the producer; empty for artifact turns.
    pub produced_text: String,
    pub duration: Duration,
}

/// Handle to a submitted turn.
#[derive(Debug)]
pub struct TurnHandle {
    pub turn_id: TurnId,
    join: JoinHandle<TurnReport>,
}

impl TurnHandle {
    pub async fn wait(self) -> Result<TurnReport, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::Internal(format!("turn task failed: {e}")))
    }
}

pub struct TurnCoordinator {
    registry: Arc<SessionRegistry>,
    producer: Arc<TurnProducer>,
    metrics: Arc<MetricsRecorder>,
    max_send_queue: usize,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl TurnCoordinator {
    pub fn new(producer: Arc<TurnProducer>, metrics: Arc<MetricsRecorder>, max_send_queue: usize) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            producer,
            metrics,
            max_send_queue,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn producer(&self) -> &TurnProducer {
        &self.producer
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Register a new session.
    pub fn connect(&self) -> (SessionId, mpsc::Receiver<Notification>) {
        let (id, rx) = self.registry.register(self.max_send_queue);
        self.metrics.counter_inc("sessions.connected", &[], 1);
        self.metrics.gauge_set("sessions.active", &[], self.registry.len() as f64);
        info!(session_id = %id, "session connected");
        (id, rx)
    }

    /// Remove a session, cancelling its running and queued turns.
    pub fn disconnect(&self, id: &SessionId) -> bool {
        let removed = self.registry.unregister(id).is_some();
        if removed {
            self.metrics.gauge_set("sessions.active", &[], self.registry.len() as f64);
            info!(session_id = %id, "session disconnected");
        }
        removed
    }

    /// Queue a turn for `session_id`. Turns of one session run one at a time
    /// in submission order; turns of different sessions run in parallel.
    pub fn submit(&self, session_id: &SessionId, message: impl Into<String>) -> Result<TurnHandle, EngineError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        let handle = self
            .registry
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let turn_id = TurnId::new();
        let cancel = handle.cancel.child_token();
        let slot = handle.gate.reserve();
        let span = info_span!("turn", session_id = %handle.id, turn_id = %turn_id);
        let join = self.tasks.spawn(
            run_turn(
                Arc::clone(&self.producer),
                Arc::clone(&self.metrics),
                handle,
                slot,
                turn_id.clone(),
                message,
                cancel,
            )
            .instrument(span),
        );
        debug!(session_id = %session_id, turn_id = %turn_id, "turn submitted");
        Ok(TurnHandle { turn_id, join })
    }

    /// Cancel every session and wait for in-flight turns to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let cancelled = self.registry.cancel_all();
        self.tasks.close();
        info!(sessions = cancelled, turns = self.tasks.len(), "waiting for turns to finish");
        self.tasks.wait().await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Turns currently queued or running.
    pub fn active_turns(&self) -> usize {
        self.tasks.len()
    }
}

async fn run_turn(
    producer: Arc<TurnProducer>,
    metrics: Arc<MetricsRecorder>,
    session: SessionHandle,
    mut slot: TurnSlot,
    turn_id: TurnId,
    message: String,
    cancel: CancellationToken,
) -> TurnReport {
    let submitted = Instant::now();

    let started = tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = slot.ready() => true,
    };
    if !started {
        debug!("turn cancelled before it started");
        let dispatch = DispatchReport::skipped(DispatchOutcome::Cancelled);
        return finish(&metrics, session.id, turn_id, dispatch, String::new(), submitted);
    }
    metrics.histogram_observe("turn.queue_wait_ms", &[], submitted.elapsed().as_secs_f64() * 1000.0);

    let (sink, stream) = turn_queue();
    let producer_task = {
        let cancel = cancel.clone();
        tokio::spawn(
            async move { producer.run(&message, sink, &cancel).await }.in_current_span(),
        )
    };

    let dispatch = dispatch_turn(&session.outbound, stream, &cancel).await;
    if dispatch.outcome == DispatchOutcome::Abandoned {
        cancel.cancel();
    }

    let produced_text = match producer_task.await {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "producer task failed");
            String::new()
        }
    };

    finish(&metrics, session.id, turn_id, dispatch, produced_text, submitted)
}

fn finish(
    metrics: &MetricsRecorder,
    session_id: SessionId,
    turn_id: TurnId,
    dispatch: DispatchReport,
    produced_text: String,
    submitted: Instant,
) -> TurnReport {
    let duration = submitted.elapsed();
    let outcome = dispatch.outcome.as_str();
    metrics.counter_inc("turns.completed", &[("outcome", outcome)], 1);
    metrics.histogram_observe("turn.duration_ms", &[], duration.as_secs_f64() * 1000.0);
    if dispatch.violations > 0 {
        metrics.counter_inc("turns.protocol_violations", &[], dispatch.violations as u64);
    }
    info!(
        outcome,
        notifications = dispatch.notifications,
        artifacts = dispatch.artifacts,
        duration_ms = duration.as_millis() as u64,
        "turn finished"
    );
    TurnReport {
        session_id,
        turn_id,
        dispatch,
        produced_text,
        duration,
    }
}
