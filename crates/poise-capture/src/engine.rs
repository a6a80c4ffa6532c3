//! Capture engine: the frame-driven detection loop on its own thread.
//!
//! One detector pass at a time, paced to a fixed rate. The camera is held by
//! a [`CaptureGuard`] only while streaming is on. Results from a pass that was
//! in flight when streaming stopped are dropped.

use crate::camera::{CameraError, CaptureGuard, CaptureRequest, VideoSource};
use crate::frame::Frame;
use crate::models::ModelStatus;
use crate::state::{CaptureState, FramePacer, Pace, StreamFlag};
use chrono::{DateTime, Utc};
use poise_core::{
    Detector, ExtractorConfig, FaceMetrics, FrameExtractor, FrameOutcome, SessionAggregator,
    SessionFaceSummary,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};

// Upper bound on one sleep while waiting for the next tick, so requests are
// picked up promptly.
const MAX_IDLE_SLEEP: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("face detection models are still loading ({0}%)")]
    ModelsNotReady(u8),
    #[error("face detection unavailable: {0}")]
    DetectionUnavailable(String),
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("capture thread exited")]
    ChannelClosed,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Minimum time between two detector passes.
    pub frame_interval: Duration,
    pub request: CaptureRequest,
    pub extractor: ExtractorConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_interval: FramePacer::default().interval(),
            request: CaptureRequest::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

/// Streaming status as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Streaming,
    /// The source ran out of frames.
    Ended,
    /// The camera could not be opened.
    Failed(String),
}

/// Everything the report view needs at session end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Frames run through the extractor (discarded in-flight passes excluded).
    pub frames_processed: usize,
    pub frames_accepted: usize,
    /// Absent when no frame cleared the confidence gate.
    pub face_metrics: Option<SessionFaceSummary>,
}

enum EngineRequest {
    Start {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Report {
        reply: oneshot::Sender<SessionReport>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the capture thread.
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<EngineRequest>,
    flag: Arc<StreamFlag>,
    status: watch::Receiver<StreamStatus>,
}

impl CaptureHandle {
    /// Open the camera and begin processing frames.
    pub async fn start(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Start { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Switch streaming off without waiting for the capture thread.
    ///
    /// Takes effect immediately: a detector pass still running will have its
    /// result discarded.
    pub fn request_stop(&self) {
        self.flag.stop();
    }

    /// Switch streaming off and wait until the camera has been released.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.request_stop();
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Stop { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Summary of everything accepted since the session began.
    pub async fn report(&self) -> Result<SessionReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Report { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Discard accumulated metrics and begin a new session.
    pub async fn reset(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Reset { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Whether streaming is switched on right now.
    pub fn is_streaming(&self) -> bool {
        self.flag.is_streaming()
    }

    /// Receiver that sees every stream status change.
    pub fn status(&self) -> watch::Receiver<StreamStatus> {
        self.status.clone()
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the capture engine on a dedicated OS thread.
///
/// `on_metrics` is called on that thread once per accepted frame. The camera
/// is only opened on [`CaptureHandle::start`], and only once `models` reports
/// ready.
pub fn spawn_capture<S, D, C>(
    source: S,
    detector: D,
    models: watch::Receiver<ModelStatus>,
    config: CaptureConfig,
    on_metrics: C,
) -> Result<CaptureHandle, EngineError>
where
    S: VideoSource + Send + 'static,
    D: Detector<Frame> + Send + 'static,
    C: FnMut(&FaceMetrics) + Send + 'static,
{
    let flag = Arc::new(StreamFlag::new());
    let (status_tx, status_rx) = watch::channel(StreamStatus::Idle);
    let (tx, rx) = mpsc::channel::<EngineRequest>(8);

    tracing::info!(
        interval_ms = config.frame_interval.as_millis() as u64,
        min_confidence = config.extractor.min_confidence,
        face_selection = ?config.extractor.face_selection,
        "starting capture engine"
    );

    let engine = Engine {
        source,
        detector,
        on_metrics,
        extractor: FrameExtractor::new(config.extractor),
        request: config.request,
        pacer: FramePacer::new(config.frame_interval),
        models,
        flag: flag.clone(),
        status: status_tx,
        guard: None,
        state: CaptureState::default(),
        session: SessionAggregator::new(),
        started_at: Utc::now(),
        frames_processed: 0,
    };

    std::thread::Builder::new()
        .name("poise-capture".into())
        .spawn(move || engine.run(rx))
        .map_err(EngineError::Spawn)?;

    Ok(CaptureHandle {
        tx,
        flag,
        status: status_rx,
    })
}

struct Engine<S, D, C> {
    source: S,
    detector: D,
    on_metrics: C,
    extractor: FrameExtractor,
    request: CaptureRequest,
    pacer: FramePacer,
    models: watch::Receiver<ModelStatus>,
    flag: Arc<StreamFlag>,
    status: watch::Sender<StreamStatus>,
    guard: Option<CaptureGuard>,
    state: CaptureState,
    session: SessionAggregator,
    started_at: DateTime<Utc>,
    frames_processed: usize,
}

impl<S, D, C> Engine<S, D, C>
where
    S: VideoSource,
    D: Detector<Frame>,
    C: FnMut(&FaceMetrics),
{
    fn run(mut self, mut rx: mpsc::Receiver<EngineRequest>) {
        tracing::info!("capture thread started");
        loop {
            // The handle may have switched streaming off while we were busy.
            if self.guard.is_some() && !self.flag.is_streaming() {
                self.release(StreamStatus::Idle);
            }

            let request = if self.guard.is_some() {
                match rx.try_recv() {
                    Ok(req) => Some(req),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match rx.blocking_recv() {
                    Some(req) => Some(req),
                    None => break,
                }
            };

            match request {
                Some(req) => self.handle(req),
                None => self.tick(),
            }
        }

        self.flag.stop();
        if self.guard.is_some() {
            self.release(StreamStatus::Idle);
        }
        tracing::info!("capture thread exiting");
    }

    fn handle(&mut self, request: EngineRequest) {
        match request {
            EngineRequest::Start { reply } => {
                let _ = reply.send(self.start());
            }
            EngineRequest::Stop { reply } => {
                self.flag.stop();
                if self.guard.is_some() {
                    self.release(StreamStatus::Idle);
                }
                let _ = reply.send(());
            }
            EngineRequest::Report { reply } => {
                let _ = reply.send(self.report());
            }
            EngineRequest::Reset { reply } => {
                self.session = SessionAggregator::new();
                self.frames_processed = 0;
                self.started_at = Utc::now();
                tracing::info!("session reset");
                let _ = reply.send(());
            }
        }
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.guard.is_some() && self.flag.is_streaming() {
            return Ok(());
        }

        match &*self.models.borrow() {
            ModelStatus::Ready => {}
            ModelStatus::Loading { progress } => return Err(EngineError::ModelsNotReady(*progress)),
            ModelStatus::Failed(msg) => return Err(EngineError::DetectionUnavailable(msg.clone())),
        }

        let stream = match self.source.open(&self.request) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to access camera");
                self.status.send_replace(StreamStatus::Failed(e.to_string()));
                return Err(e.into());
            }
        };

        self.guard = Some(CaptureGuard::new(stream));
        self.state = CaptureState {
            last_processed_at: None,
            is_streaming: true,
        };
        self.flag.start();
        self.status.send_replace(StreamStatus::Streaming);
        Ok(())
    }

    fn release(&mut self, status: StreamStatus) {
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
        self.state.is_streaming = false;
        self.status.send_replace(status);
    }

    /// One pass of the loop while streaming: wait for the pacer, then run a frame.
    fn tick(&mut self) {
        let now = Instant::now();
        if let Pace::Wait(remaining) = self.pacer.check(&self.state, now) {
            std::thread::sleep(remaining.min(MAX_IDLE_SLEEP));
            return;
        }
        self.state.last_processed_at = Some(now);

        let token = self.flag.token();
        let Some(guard) = self.guard.as_mut() else {
            return;
        };
        let frame = match guard.next_frame() {
            Ok(f) => f,
            Err(CameraError::EndOfStream) => {
                tracing::info!("video source ended");
                self.flag.stop();
                self.release(StreamStatus::Ended);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed; skipping tick");
                return;
            }
        };

        let outcome = self
            .extractor
            .extract_detailed(&mut self.detector, &frame, frame.size());

        if !self.flag.is_current(token) {
            tracing::debug!(seq = frame.sequence, "streaming stopped during detection; discarding result");
            return;
        }

        self.frames_processed += 1;
        if let FrameOutcome::Accepted(metrics) = outcome {
            tracing::trace!(
                seq = frame.sequence,
                confidence = metrics.confidence,
                eye_contact = metrics.eye_contact,
                expression = %metrics.dominant_expression(),
                "frame accepted"
            );
            self.session.push(&metrics);
            (self.on_metrics)(&metrics);
        }
    }

    fn report(&self) -> SessionReport {
        SessionReport {
            started_at: self.started_at,
            ended_at: Utc::now(),
            frames_processed: self.frames_processed,
            frames_accepted: self.session.len(),
            face_metrics: self.session.summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::VideoStream;
    use crate::models::readiness_channel;
    use crate::replay::{RecordedFrame, SessionRecording};
    use poise_core::{DetectorError, DetectorOptions, ExpressionScores, FaceLandmarks, FrameSize, LandmarkPoint, RawDetection};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc as std_mpsc, Mutex};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn ready() -> watch::Receiver<ModelStatus> {
        let (tx, rx) = readiness_channel();
        tx.send_replace(ModelStatus::Ready);
        rx
    }

    fn fast_config() -> CaptureConfig {
        CaptureConfig {
            frame_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    /// A 68-point face in a 640x480 frame with aggregate confidence `confidence`.
    fn face(confidence: f32, looking: bool) -> RawDetection {
        let mut positions = vec![LandmarkPoint::new(320.0, 240.0); 68];
        for p in &mut positions[36..42] {
            *p = LandmarkPoint::new(280.0, 200.0);
        }
        let right = if looking {
            LandmarkPoint::new(360.0, 200.0)
        } else {
            LandmarkPoint::new(280.0, 300.0)
        };
        for p in &mut positions[42..48] {
            *p = right;
        }
        RawDetection {
            score: confidence,
            landmarks: FaceLandmarks::from_68_points(positions),
            expressions: ExpressionScores { neutral: confidence, ..Default::default() },
        }
    }

    fn recording(frames: Vec<Vec<RawDetection>>) -> SessionRecording {
        SessionRecording {
            frame_size: FrameSize::default(),
            frames: frames
                .into_iter()
                .map(|detections| RecordedFrame { detections, error: None })
                .collect(),
        }
    }

    fn collector() -> (Arc<Mutex<Vec<FaceMetrics>>>, impl FnMut(&FaceMetrics) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |m: &FaceMetrics| sink.lock().unwrap().push(m.clone()))
    }

    async fn wait_for_status(handle: &CaptureHandle, want: StreamStatus) {
        let mut rx = handle.status();
        tokio::time::timeout(TIMEOUT, rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for stream status")
            .expect("capture thread gone");
    }

    async fn wait_for_count(counter: &AtomicUsize, want: usize) {
        let deadline = Instant::now() + TIMEOUT;
        while counter.load(Ordering::SeqCst) < want {
            assert!(Instant::now() < deadline, "timed out waiting for counter");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_session_end_to_end() {
        let (source, detector) = recording(vec![
            vec![face(0.9, true)],
            vec![face(0.3, true)],
            vec![face(0.8, false)],
        ])
        .into_replay();
        let releases = source.release_counter();
        let (seen, on_metrics) = collector();

        let handle = spawn_capture(source, detector, ready(), fast_config(), on_metrics).unwrap();
        handle.start().await.unwrap();
        wait_for_status(&handle, StreamStatus::Ended).await;

        let report = handle.report().await.unwrap();
        assert_eq!(report.frames_processed, 3);
        assert_eq!(report.frames_accepted, 2);
        let summary = report.face_metrics.expect("two accepted frames");
        assert!((summary.average_confidence - 0.85).abs() < 1e-6);
        assert!((summary.eye_contact_percentage - 0.5).abs() < 1e-6);

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!handle.is_streaming());
    }

    #[tokio::test]
    async fn test_no_faces_reports_no_data() {
        let (source, detector) = recording(vec![vec![], vec![]]).into_replay();
        let (seen, on_metrics) = collector();
        let handle = spawn_capture(source, detector, ready(), fast_config(), on_metrics).unwrap();
        handle.start().await.unwrap();
        wait_for_status(&handle, StreamStatus::Ended).await;

        let report = handle.report().await.unwrap();
        assert_eq!(report.frames_processed, 2);
        assert!(report.face_metrics.is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detector_failure_does_not_abort_session() {
        let mut rec = recording(vec![vec![], vec![face(0.9, true)]]);
        rec.frames[0].error = Some("inference failed".into());
        let (source, detector) = rec.into_replay();
        let (seen, on_metrics) = collector();

        let handle = spawn_capture(source, detector, ready(), fast_config(), on_metrics).unwrap();
        handle.start().await.unwrap();
        wait_for_status(&handle, StreamStatus::Ended).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(handle.report().await.unwrap().frames_accepted, 1);
    }

    #[tokio::test]
    async fn test_start_requires_models() {
        let (source, detector) = recording(vec![]).into_replay();
        let (models_tx, models_rx) = readiness_channel();
        models_tx.send_replace(ModelStatus::Loading { progress: 33 });
        let handle = spawn_capture(source, detector, models_rx, fast_config(), |_: &FaceMetrics| {}).unwrap();

        assert!(matches!(handle.start().await, Err(EngineError::ModelsNotReady(33))));

        models_tx.send_replace(ModelStatus::Failed("weights missing".into()));
        assert!(matches!(
            handle.start().await,
            Err(EngineError::DetectionUnavailable(msg)) if msg == "weights missing"
        ));
        assert_eq!(*handle.status().borrow(), StreamStatus::Idle);
    }

    struct DeniedCamera;

    impl VideoSource for DeniedCamera {
        fn open(&mut self, _request: &CaptureRequest) -> Result<Box<dyn VideoStream>, CameraError> {
            Err(CameraError::PermissionDenied("user dismissed prompt".into()))
        }
    }

    #[tokio::test]
    async fn test_camera_failure_degrades_gracefully() {
        let (_, detector) = recording(vec![]).into_replay();
        let handle = spawn_capture(DeniedCamera, detector, ready(), fast_config(), |_: &FaceMetrics| {}).unwrap();

        assert!(matches!(handle.start().await, Err(EngineError::Camera(CameraError::PermissionDenied(_)))));
        assert!(matches!(&*handle.status().borrow(), StreamStatus::Failed(msg) if msg.contains("denied")));

        // The engine stays usable for the rest of the session.
        let report = handle.report().await.unwrap();
        assert_eq!(report.frames_processed, 0);
    }

    /// Blocks inside `detect` until the test lets it go.
    struct GatedDetector {
        entered: std_mpsc::Sender<()>,
        release: std_mpsc::Receiver<()>,
        calls: Arc<AtomicUsize>,
    }

    impl Detector<Frame> for GatedDetector {
        fn detect(&mut self, _frame: &Frame, _options: &DetectorOptions) -> Result<Vec<RawDetection>, DetectorError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let _ = self.entered.send(());
                let _ = self.release.recv_timeout(TIMEOUT);
            }
            Ok(vec![face(0.95, true)])
        }
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_result() {
        let (source, _) = recording(vec![vec![]; 50]).into_replay();
        let releases = source.release_counter();
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = GatedDetector {
            entered: entered_tx,
            release: release_rx,
            calls: calls.clone(),
        };
        let (seen, on_metrics) = collector();

        let handle = spawn_capture(source, detector, ready(), fast_config(), on_metrics).unwrap();
        handle.start().await.unwrap();

        entered_rx.recv_timeout(TIMEOUT).expect("detector never called");
        handle.request_stop();
        assert!(!handle.is_streaming());
        release_tx.send(()).unwrap();
        handle.stop().await.unwrap();

        assert!(seen.lock().unwrap().is_empty());
        let report = handle.report().await.unwrap();
        assert_eq!(report.frames_processed, 0);
        assert!(report.face_metrics.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(*handle.status().borrow(), StreamStatus::Idle);
    }

    #[tokio::test]
    async fn test_drop_handle_releases_camera() {
        let (source, detector) = recording(vec![vec![face(0.9, true)]; 1000]).into_replay();
        let releases = source.release_counter();
        let config = CaptureConfig {
            frame_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let handle = spawn_capture(source, detector, ready(), config, |_: &FaceMetrics| {}).unwrap();
        handle.start().await.unwrap();
        drop(handle);

        wait_for_count(&releases, 1).await;
    }

    #[tokio::test]
    async fn test_restart_and_reset() {
        let (source, detector) = recording(vec![vec![face(0.9, true)]; 2]).into_replay();
        let releases = source.release_counter();
        let handle = spawn_capture(source, detector, ready(), fast_config(), |_: &FaceMetrics| {}).unwrap();

        handle.start().await.unwrap();
        wait_for_status(&handle, StreamStatus::Ended).await;
        handle.start().await.unwrap();
        wait_for_status(&handle, StreamStatus::Ended).await;
        assert_eq!(releases.load(Ordering::SeqCst), 2);

        // Accepted frames accumulate across camera toggles within a session.
        assert_eq!(handle.report().await.unwrap().frames_accepted, 4);

        handle.reset().await.unwrap();
        let report = handle.report().await.unwrap();
        assert_eq!(report.frames_accepted, 0);
        assert!(report.face_metrics.is_none());
    }

    #[tokio::test]
    async fn test_pacing_limits_rate() {
        let (source, detector) = recording(vec![vec![face(0.9, true)]; 3]).into_replay();
        let interval = Duration::from_millis(40);
        let config = CaptureConfig {
            frame_interval: interval,
            ..Default::default()
        };
        let handle = spawn_capture(source, detector, ready(), config, |_: &FaceMetrics| {}).unwrap();

        let begin = Instant::now();
        handle.start().await.unwrap();
        wait_for_status(&handle, StreamStatus::Ended).await;
        // Three frames plus the end-of-stream tick are spaced by the interval.
        assert!(begin.elapsed() >= interval * 3);
    }
}
