//! Encode session controller.
//!
//! Drives one render attempt at a time through
//! `Idle -> Preparing -> Running -> {Completed | Cancelled | Failed}`.
//!
//! Every state change goes through the `watch` channel holding the current
//! [`SessionSnapshot`]; its write lock is the single serialization point.
//! Terminal transitions decide between cancel and success/failure while
//! holding that lock, so a late engine notification can never overturn a
//! cancellation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use stillmotion_common::clock::RenderStamp;
use stillmotion_common::config::AppConfig;
use stillmotion_common::error::{StillmotionError, StillmotionResult};
use stillmotion_model::{
    progress_percent, RenderSettings, RenderStatus, SessionSnapshot, SourceImage,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::{assemble, EncoderSelection};
use crate::diagnostics::classify;
use crate::engine::{EncodeEngine, EngineEvent, EngineExit};
use crate::filter_graph::FilterGraphBuilder;
use crate::prepare::{ImageConverter, ImagePreparer, Preparation};
use crate::workspace::{finalize_output, Workspace, WorkspaceManager};

pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;
pub type CompleteCallback = Box<dyn Fn(&Path) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Caller notifications for one attempt.
///
/// Cancellation has no callback; it is visible through the status channel
/// only.
#[derive(Default)]
pub struct RenderCallbacks {
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
}

impl RenderCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage updates; 100 arrives only with completion.
    pub fn on_progress(mut self, f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Persisted output path.
    pub fn on_complete(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Short diagnostic for any failure.
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    fn progress(&self, percent: f64) {
        if let Some(f) = &self.on_progress {
            f(percent);
        }
    }

    fn complete(&self, path: &Path) {
        if let Some(f) = &self.on_complete {
            f(path);
        }
    }

    fn error(&self, message: &str) {
        if let Some(f) = &self.on_error {
            f(message);
        }
    }
}

/// Filesystem locations and encoder choice for a controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Parent of per-attempt workspaces.
    pub workspace_root: PathBuf,
    /// Where finished videos are persisted.
    pub output_dir: PathBuf,
    pub encoder: EncoderSelection,
}

impl ControllerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            workspace_root: config.workspace_root.clone(),
            output_dir: config.output_dir.clone(),
            encoder: EncoderSelection::from(&config.engine),
        }
    }
}

/// Handle to a started attempt.
pub struct RenderHandle {
    attempt: u64,
    task: JoinHandle<SessionSnapshot>,
    status: watch::Receiver<SessionSnapshot>,
}

impl RenderHandle {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Wait for the attempt to reach a terminal state.
    pub async fn wait(self) -> SessionSnapshot {
        match self.task.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(attempt = self.attempt, error = %e, "Render supervisor failed");
                self.status.borrow().clone()
            }
        }
    }
}

/// Owns the session record and runs render attempts.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct EncodeSessionController {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn EncodeEngine>,
    preparer: ImagePreparer,
    workspaces: WorkspaceManager,
    output_dir: PathBuf,
    encoder: EncoderSelection,
    state: watch::Sender<SessionSnapshot>,
    in_flight: AtomicBool,
    /// Token of the current attempt. Only locked while holding the `state`
    /// write lock.
    cancel: Mutex<CancellationToken>,
}

/// How the pipeline stopped, before the terminal decision.
enum Outcome {
    /// The engine wrote the video at this workspace path.
    Encoded(PathBuf),
    /// Work stopped because cancellation was observed.
    Interrupted,
}

/// Callback owed to the caller after a terminal transition.
enum Notice {
    None,
    Completed(PathBuf),
    Failed(String),
}

impl EncodeSessionController {
    pub fn new(
        engine: Arc<dyn EncodeEngine>,
        converter: Arc<dyn ImageConverter>,
        config: ControllerConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                engine,
                preparer: ImagePreparer::new(converter),
                workspaces: WorkspaceManager::new(config.workspace_root),
                output_dir: config.output_dir,
                encoder: config.encoder,
                state,
                in_flight: AtomicBool::new(false),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Begin a render attempt.
    ///
    /// Returns `None` without side effects while another attempt is in
    /// flight. Must be called from within a Tokio runtime; control returns
    /// as soon as the attempt is scheduled.
    pub fn start(
        &self,
        images: Vec<SourceImage>,
        settings: RenderSettings,
        callbacks: RenderCallbacks,
    ) -> Option<RenderHandle> {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Render already in flight, start ignored");
            return None;
        }

        let token = CancellationToken::new();
        let mut attempt = 0;
        self.inner.state.send_modify(|snapshot| {
            attempt = snapshot.attempt + 1;
            *self.inner.cancel.lock() = token.clone();
            *snapshot = SessionSnapshot::preparing(attempt);
        });

        tracing::info!(
            attempt,
            images = images.len(),
            resolution = %settings.resolution,
            duration = %settings.image_duration,
            transition = %settings.transition,
            "Render started"
        );

        let callbacks = Arc::new(callbacks);
        let run = tokio::spawn(drive(
            self.inner.clone(),
            attempt,
            images,
            settings,
            token,
            callbacks.clone(),
        ));

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            match run.await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    let reason = if e.is_panic() {
                        "render task panicked"
                    } else {
                        "render task was aborted"
                    };
                    tracing::error!(attempt, error = %e, "{reason}");
                    inner.abandon(attempt, reason, &callbacks)
                }
            }
        });

        Some(RenderHandle {
            attempt,
            task,
            status: self.inner.state.subscribe(),
        })
    }

    /// Request cancellation of the active attempt.
    ///
    /// Accepted only while Preparing or Running, once per attempt. The
    /// attempt ends Cancelled after the engine stops, however long that
    /// takes.
    pub fn cancel(&self) -> bool {
        let mut accepted = None;
        self.inner.state.send_if_modified(|snapshot| {
            if !snapshot.status.is_active() || snapshot.cancel_requested {
                return false;
            }
            snapshot.cancel_requested = true;
            accepted = Some((snapshot.attempt, self.inner.cancel.lock().clone()));
            true
        });

        match accepted {
            Some((attempt, token)) => {
                tracing::info!(attempt, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Receiver for every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Remove leftover workspaces. Refused while an attempt is in flight.
    pub fn sweep_stale_workspaces(&self) -> StillmotionResult<usize> {
        if self.is_in_flight() {
            return Err(StillmotionError::unsupported(
                "cannot sweep workspaces while a render is in flight",
            ));
        }
        self.inner.workspaces.sweep_stale()
    }
}

async fn drive(
    inner: Arc<Inner>,
    attempt: u64,
    images: Vec<SourceImage>,
    settings: RenderSettings,
    cancel: CancellationToken,
    callbacks: Arc<RenderCallbacks>,
) -> SessionSnapshot {
    let stamp = RenderStamp::now();
    let mut workspace = None;
    let result = run_pipeline(
        &inner,
        attempt,
        images,
        settings,
        &stamp,
        &cancel,
        &callbacks,
        &mut workspace,
    )
    .await;

    let (snapshot, notice) = inner
        .conclude(attempt, result, workspace, &stamp, &cancel)
        .await;
    match notice {
        Notice::Completed(path) => {
            callbacks.progress(100.0);
            callbacks.complete(&path);
        }
        Notice::Failed(message) => callbacks.error(&message),
        Notice::None => {}
    }
    snapshot
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    inner: &Inner,
    attempt: u64,
    images: Vec<SourceImage>,
    settings: RenderSettings,
    stamp: &RenderStamp,
    cancel: &CancellationToken,
    callbacks: &RenderCallbacks,
    workspace: &mut Option<Workspace>,
) -> StillmotionResult<Outcome> {
    let ws = inner.workspaces.create(stamp)?;
    let encoded = ws.output_path();

    let preparer = inner.preparer.clone();
    let interrupt = cancel.clone();
    let (ws, prepared) = tokio::task::spawn_blocking(move || {
        let prepared = preparer.prepare(&images, &ws, &interrupt);
        (ws, prepared)
    })
    .await
    .map_err(|e| StillmotionError::unexpected(format!("image preparation task failed: {e}")))?;
    *workspace = Some(ws);
    let prepared = prepared.map_err(as_preparation_failure)?;

    let staged = match prepared {
        Preparation::Staged(staged) => staged,
        Preparation::Interrupted => return Ok(Outcome::Interrupted),
    };
    if cancel.is_cancelled() {
        return Ok(Outcome::Interrupted);
    }

    let graph = FilterGraphBuilder::from_settings(&settings).build(staged.len())?;
    let inputs: Vec<PathBuf> = staged.iter().map(|image| image.path.clone()).collect();
    let command = assemble(&inputs, &graph, &settings, &inner.encoder, &encoded)?;
    tracing::debug!(attempt, command = %command, "Encode command assembled");

    let mut session = inner.engine.launch(&command)?;
    inner.mark_running(attempt);

    let expected_secs = settings.expected_duration_secs(staged.len());
    let mut abort_sent = false;
    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled(), if !abort_sent => {
                session.request_abort();
                abort_sent = true;
                tracing::debug!(attempt, engine = inner.engine.name(), "Engine abort requested");
            }
            event = session.next_event() => match event {
                Some(EngineEvent::Statistics(stats)) => {
                    let percent = progress_percent(stats.elapsed_secs, expected_secs);
                    if let Some(percent) = inner.record_progress(attempt, percent) {
                        callbacks.progress(percent);
                    }
                }
                Some(EngineEvent::Exited(exit)) => break Some(exit),
                None => break None,
            }
        }
    };

    match exit {
        Some(EngineExit::Success) => Ok(Outcome::Encoded(encoded)),
        Some(EngineExit::Cancelled) if cancel.is_cancelled() => Ok(Outcome::Interrupted),
        Some(EngineExit::Cancelled) => Err(StillmotionError::invocation(
            "encoder stopped without a cancellation request",
        )),
        Some(EngineExit::Failed { code }) => {
            let logs = session.logs();
            tracing::warn!(attempt, ?code, log_bytes = logs.len(), "Encoder reported failure");
            let excerpt = classify(&logs);
            let message = if excerpt.trim().is_empty() {
                match code {
                    Some(code) => format!("encoder exited with code {code}"),
                    None => "encoder terminated abnormally".to_string(),
                }
            } else {
                excerpt
            };
            Err(StillmotionError::invocation(message))
        }
        None => Err(StillmotionError::unexpected(
            "encoder event stream closed without an exit status",
        )),
    }
}

/// Staging errors of any origin surface as preparation failures.
fn as_preparation_failure(err: StillmotionError) -> StillmotionError {
    match err {
        StillmotionError::Preparation { .. } | StillmotionError::FileNotFound { .. } => err,
        other => StillmotionError::preparation(other.to_string()),
    }
}

/// Text delivered to the caller for a failure.
fn failure_message(err: &StillmotionError) -> String {
    match err {
        StillmotionError::Invocation { message } | StillmotionError::Unexpected { message } => {
            message.clone()
        }
        other => other.to_string(),
    }
}

/// Filesystem side of a terminal transition: persist the video unless a
/// cancel is already visible, then remove the workspace.
///
/// `Ok(Some(path))` is the persisted video, `Ok(None)` an interrupted run.
fn settle(
    result: StillmotionResult<Outcome>,
    workspace: Option<Workspace>,
    output_dir: &Path,
    stamp: &RenderStamp,
    cancel: &CancellationToken,
) -> StillmotionResult<Option<PathBuf>> {
    let settled = match result {
        Ok(Outcome::Encoded(_)) if cancel.is_cancelled() => Ok(None),
        Ok(Outcome::Encoded(encoded)) => finalize_output(&encoded, output_dir, stamp).map(Some),
        Ok(Outcome::Interrupted) => Ok(None),
        Err(e) => Err(e),
    };
    if let Some(mut ws) = workspace {
        ws.cleanup();
    }
    settled
}

impl Inner {
    fn mark_running(&self, attempt: u64) {
        self.state.send_if_modified(|snapshot| {
            if snapshot.attempt != attempt
                || snapshot.status != RenderStatus::Preparing
                || snapshot.cancel_requested
            {
                return false;
            }
            snapshot.status = RenderStatus::Running;
            true
        });
        tracing::debug!(attempt, "Encoder running");
    }

    /// Apply a progress sample; returns the new percentage if it changed.
    fn record_progress(&self, attempt: u64, percent: f64) -> Option<f64> {
        let mut reported = None;
        self.state.send_if_modified(|snapshot| {
            if snapshot.attempt != attempt
                || snapshot.status != RenderStatus::Running
                || snapshot.cancel_requested
            {
                return false;
            }
            let next = percent.max(snapshot.progress);
            if next == snapshot.progress {
                return false;
            }
            snapshot.progress = next;
            reported = Some(next);
            true
        });
        reported
    }

    /// Commit the terminal transition for `attempt`.
    ///
    /// The video is moved out and the workspace removed on the blocking
    /// pool first; the state lock is only held for the decision. The
    /// cancellation flag is consulted under that lock, so nothing that
    /// arrives after a cancel request can turn the attempt into Completed
    /// or Failed. A video persisted in the meantime is deleted again.
    async fn conclude(
        &self,
        attempt: u64,
        result: StillmotionResult<Outcome>,
        workspace: Option<Workspace>,
        stamp: &RenderStamp,
        cancel: &CancellationToken,
    ) -> (SessionSnapshot, Notice) {
        let output_dir = self.output_dir.clone();
        let stamp = *stamp;
        let cancelled = cancel.clone();
        let settled = tokio::task::spawn_blocking(move || {
            settle(result, workspace, &output_dir, &stamp, &cancelled)
        })
        .await
        .unwrap_or_else(|e| {
            Err(StillmotionError::unexpected(format!(
                "output finalization task failed: {e}"
            )))
        });

        let mut notice = Notice::None;
        let mut discarded = None;
        let mut committed = SessionSnapshot::default();

        self.state.send_if_modified(|snapshot| {
            if snapshot.attempt != attempt || snapshot.status.is_terminal() {
                committed = snapshot.clone();
                return false;
            }

            if snapshot.cancel_requested {
                match &settled {
                    Ok(Some(dest)) => discarded = Some(dest.clone()),
                    Err(e) => {
                        tracing::debug!(attempt, error = %e, "Discarding failure after cancellation")
                    }
                    Ok(None) => {}
                }
                snapshot.status = RenderStatus::Cancelled;
            } else {
                match &settled {
                    Ok(Some(dest)) => {
                        snapshot.status = RenderStatus::Completed;
                        snapshot.progress = 100.0;
                        snapshot.output_path = Some(dest.clone());
                        notice = Notice::Completed(dest.clone());
                    }
                    Ok(None) => snapshot.status = RenderStatus::Cancelled,
                    Err(e) => {
                        let message = failure_message(e);
                        snapshot.status = RenderStatus::Failed;
                        snapshot.failure_kind = Some(e.kind());
                        snapshot.error = Some(message.clone());
                        notice = Notice::Failed(message);
                    }
                }
            }

            self.in_flight.store(false, Ordering::SeqCst);
            committed = snapshot.clone();
            true
        });

        if let Some(dest) = discarded {
            match tokio::fs::remove_file(&dest).await {
                Ok(()) => tracing::debug!(attempt, path = %dest.display(), "Cancelled output removed"),
                Err(e) => tracing::warn!(
                    attempt,
                    path = %dest.display(),
                    error = %e,
                    "Failed to remove cancelled output"
                ),
            }
        }

        match committed.status {
            RenderStatus::Completed => tracing::info!(
                attempt,
                output = ?committed.output_path,
                "Render completed"
            ),
            RenderStatus::Cancelled => tracing::info!(attempt, "Render cancelled"),
            RenderStatus::Failed => tracing::warn!(
                attempt,
                kind = ?committed.failure_kind,
                error = committed.error.as_deref().unwrap_or_default(),
                "Render failed"
            ),
            _ => {}
        }

        (committed, notice)
    }

    /// Terminal transition for an attempt whose task died without
    /// concluding. Its workspace was already removed when the task unwound.
    fn abandon(&self, attempt: u64, reason: &str, callbacks: &RenderCallbacks) -> SessionSnapshot {
        let mut failed = false;
        let mut committed = SessionSnapshot::default();
        self.state.send_if_modified(|snapshot| {
            if snapshot.attempt != attempt || snapshot.status.is_terminal() {
                committed = snapshot.clone();
                return false;
            }
            if snapshot.cancel_requested {
                snapshot.status = RenderStatus::Cancelled;
            } else {
                snapshot.status = RenderStatus::Failed;
                snapshot.failure_kind = Some(stillmotion_common::FailureKind::Unexpected);
                snapshot.error = Some(reason.to_string());
                failed = true;
            }
            self.in_flight.store(false, Ordering::SeqCst);
            committed = snapshot.clone();
            true
        });
        if failed {
            callbacks.error(reason);
        }
        committed
    }
}
