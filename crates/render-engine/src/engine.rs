//! External encoding engine abstraction.
//!
//! An engine is launched with a fully assembled [`EncodeCommand`] and hands
//! back an [`EngineSession`]: a stream of [`EngineEvent`]s ending with one
//! `Exited` event, an abort request, and the accumulated diagnostic log.
//! Implementations drive the producer half, [`EngineSink`].

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use stillmotion_common::config::EngineConfig;
use stillmotion_common::error::{StillmotionError, StillmotionResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::EncodeCommand;

/// One statistics sample from a running encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeStatistics {
    /// Seconds of output encoded so far.
    pub elapsed_secs: f64,
    pub frame: u64,
    /// Encode speed relative to real time, when reported.
    pub speed: Option<f64>,
}

/// How the engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    Success,
    /// Stopped after an abort request.
    Cancelled,
    Failed { code: Option<i32> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Statistics(EncodeStatistics),
    Exited(EngineExit),
}

/// Consumer half of a launched encode.
#[derive(Debug)]
pub struct EngineSession {
    events: mpsc::UnboundedReceiver<EngineEvent>,
    abort: CancellationToken,
    log: Arc<Mutex<String>>,
}

impl EngineSession {
    /// A connected session/sink pair.
    pub fn channel() -> (EngineSession, EngineSink) {
        let (tx, rx) = mpsc::unbounded_channel();
        let abort = CancellationToken::new();
        let log = Arc::new(Mutex::new(String::new()));
        (
            EngineSession {
                events: rx,
                abort: abort.clone(),
                log: log.clone(),
            },
            EngineSink {
                events: tx,
                abort,
                log,
            },
        )
    }

    /// Next event, or `None` once every sink has been dropped.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Ask the engine to stop. Returns immediately; the engine reports its
    /// exit through the event stream whenever it actually stops.
    pub fn request_abort(&self) {
        self.abort.cancel();
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Full diagnostic log captured so far.
    pub fn logs(&self) -> String {
        self.log.lock().clone()
    }
}

/// Producer half of a launched encode.
#[derive(Debug, Clone)]
pub struct EngineSink {
    events: mpsc::UnboundedSender<EngineEvent>,
    abort: CancellationToken,
    log: Arc<Mutex<String>>,
}

impl EngineSink {
    /// Publish a statistics sample. Returns false if the session is gone.
    pub fn statistics(&self, stats: EncodeStatistics) -> bool {
        self.events.send(EngineEvent::Statistics(stats)).is_ok()
    }

    pub fn exit(&self, exit: EngineExit) -> bool {
        self.events.send(EngineEvent::Exited(exit)).is_ok()
    }

    pub fn append_log(&self, text: &str) {
        self.log.lock().push_str(text);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Resolves once an abort has been requested.
    pub async fn aborted(&self) {
        self.abort.cancelled().await
    }
}

/// Something that can run an [`EncodeCommand`].
pub trait EncodeEngine: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Start the encode and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    fn launch(&self, command: &EncodeCommand) -> StillmotionResult<EngineSession>;
}

const FFMPEG_BINARY: &str = "ffmpeg";

/// Runs the `ffmpeg` binary as a child process.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEngine {
    binary: Option<PathBuf>,
}

impl FfmpegEngine {
    /// Use `binary` when given, otherwise look `ffmpeg` up on `PATH`.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.ffmpeg_path.clone())
    }

    /// Resolved binary path, if one exists.
    pub fn locate(&self) -> Option<PathBuf> {
        match &self.binary {
            Some(path) if path.is_file() => Some(path.clone()),
            Some(path) => which::which(path).ok(),
            None => which::which(FFMPEG_BINARY).ok(),
        }
    }

    /// Binary path to use for auxiliary invocations, even if unresolved.
    pub fn program(&self) -> PathBuf {
        self.locate()
            .or_else(|| self.binary.clone())
            .unwrap_or_else(|| PathBuf::from(FFMPEG_BINARY))
    }

    /// First line of `ffmpeg -version`.
    pub fn version(&self) -> StillmotionResult<String> {
        let binary = self.locate().ok_or_else(not_found)?;
        let output = std::process::Command::new(&binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(StillmotionError::invocation(format!(
                "{} -version exited with {}",
                binary.display(),
                output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

fn not_found() -> StillmotionError {
    StillmotionError::unsupported("ffmpeg not found (install it or set engine.ffmpeg_path)")
}

impl EncodeEngine for FfmpegEngine {
    fn name(&self) -> &str {
        FFMPEG_BINARY
    }

    fn is_available(&self) -> bool {
        self.locate().is_some()
    }

    fn launch(&self, command: &EncodeCommand) -> StillmotionResult<EngineSession> {
        let binary = self.locate().ok_or_else(not_found)?;
        let args = command.to_args();

        let mut cmd = tokio::process::Command::new(&binary);
        cmd.args(["-nostats", "-progress", "pipe:1"])
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            StillmotionError::invocation(format!("failed to start {}: {e}", binary.display()))
        })?;

        tracing::info!(
            pid = child.id(),
            inputs = command.inputs.len(),
            codec = %command.codec,
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StillmotionError::unexpected("failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StillmotionError::unexpected("failed to capture ffmpeg stderr"))?;

        let (session, sink) = EngineSession::channel();
        let progress_task = tokio::spawn(pump_progress(stdout, sink.clone()));
        let log_task = tokio::spawn(pump_log(stderr, sink.clone()));
        tokio::spawn(supervise(child, sink, [progress_task, log_task]));

        Ok(session)
    }
}

async fn supervise(
    mut child: tokio::process::Child,
    sink: EngineSink,
    pumps: [tokio::task::JoinHandle<()>; 2],
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = sink.aborted() => {
            tracing::info!(pid = child.id(), "Abort requested, stopping ffmpeg");
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "Failed to signal ffmpeg");
            }
            child.wait().await
        }
    };

    // Drain both pipes so the log is complete before the exit is reported.
    for pump in pumps {
        let _ = pump.await;
    }

    let exit = match status {
        Ok(_) if sink.abort_requested() => EngineExit::Cancelled,
        Ok(status) if status.success() => EngineExit::Success,
        Ok(status) => EngineExit::Failed {
            code: status.code(),
        },
        Err(e) => {
            sink.append_log(&format!("Error waiting for ffmpeg: {e}\n"));
            EngineExit::Failed { code: None }
        }
    };

    tracing::debug!(?exit, "ffmpeg exited");
    sink.exit(exit);
}

async fn pump_progress(stdout: impl AsyncRead + Unpin, sink: EngineSink) {
    let mut lines = BufReader::new(stdout).lines();
    let mut state = ProgressState::default();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(stats) = state.feed(&line) {
                    sink.statistics(stats);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed reading ffmpeg progress");
                break;
            }
        }
    }
}

async fn pump_log(stderr: impl AsyncRead + Unpin, sink: EngineSink) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => sink.append_log(&String::from_utf8_lossy(&buf)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed reading ffmpeg log");
                break;
            }
        }
    }
}

/// Accumulates one `-progress` block at a time.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    frame: u64,
    speed: Option<f64>,
}

impl ProgressState {
    /// Apply one `key=value` line; returns a sample when a block ends.
    fn feed(&mut self, line: &str) -> Option<EncodeStatistics> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            // Despite the name, out_time_ms is in microseconds too.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = self.out_time_secs.max(us / 1_000_000.0);
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse::<u64>() {
                    self.frame = frame;
                }
            }
            "speed" => {
                self.speed = value.trim_end_matches('x').parse::<f64>().ok();
            }
            "progress" => {
                return Some(EncodeStatistics {
                    elapsed_secs: self.out_time_secs,
                    frame: self.frame,
                    speed: self.speed,
                });
            }
            _ => {}
        }
        None
    }
}
