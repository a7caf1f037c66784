//! End-to-end sessions against a scripted device, camera and classifier

use camera_capture::{CameraProbe, FrameSource, MockCamera, VideoFrame};
use gate_protocol::{DetachedLink, LinkChannel, MemoryLink, SerialLink};
use gatekeeper::{
    console, operator, GateConfig, LoopStep, MainLoop, OperatorHandle, Phase, SessionController,
    SessionOutcome, SessionReport,
};
use presence::{Classifier, ClassifierError, Detection, MockClassifier};
use std::io::{self, BufReader, Read};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::time::Instant;

fn test_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.camera.width = 4;
    config.camera.height = 4;
    config.presence.required_frames = 3;
    config.session.auth_timeout_secs = 2;
    config.session.cooldown_secs = 1;
    config.session.frame_interval_ms = 100;
    config.session.idle_poll_ms = 50;
    config
}

fn build(
    camera: MockCamera,
    classifier: impl Classifier + 'static,
    device: &MemoryLink,
) -> (MainLoop, OperatorHandle, CameraProbe) {
    let config = test_config();
    let probe = camera.probe();
    let controller = SessionController::new(Box::new(camera), Box::new(classifier), &config);
    let (handle, inbox) = operator::channel();
    let main_loop = MainLoop::new(controller, Box::new(device.clone()), inbox, &config.session);
    (main_loop, handle, probe)
}

async fn next_session(main_loop: &mut MainLoop) -> SessionReport {
    for _ in 0..1000 {
        match main_loop.step().await {
            LoopStep::Session(report) => return report,
            LoopStep::Shutdown => panic!("loop shut down while waiting for a session"),
            LoopStep::Idle | LoopStep::Ignored(_) => {}
        }
    }
    panic!("no session started");
}

#[tokio::test(start_paused = true)]
async fn scenario_a_single_approval_after_interrupted_run() {
    let device = MemoryLink::new().with_auto_reply("APPROVED", "UNLOCKED");
    let (mut main_loop, _handle, probe) =
        build(MockCamera::new(), MockClassifier::from_pattern("HH.HHH"), &device);

    device.push_inbound("TRIGGER");
    let report = next_session(&mut main_loop).await;

    assert_eq!(device.sent_count("APPROVED"), 1);
    assert_eq!(device.sent(), vec!["APPROVED"]);
    // Third human frame of the final run is the sixth frame overall.
    assert_eq!(report.approved_at_frame, Some(5));
    assert_eq!(report.outcome, SessionOutcome::Unlocked);
    assert!(!report.outcome.denied());
    // UNLOCKED was already queued when the sixth frame was classified.
    assert_eq!(probe.frames(), 6);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_camera_failure_denies_without_cooldown() {
    let device = MemoryLink::new();
    let camera = MockCamera::new().with_open_failures(1);
    let (mut main_loop, _handle, probe) = build(camera, MockClassifier::new(), &device);

    device.push_inbound("TRIGGER");
    let start = Instant::now();
    let report = next_session(&mut main_loop).await;

    assert_eq!(report.outcome, SessionOutcome::DeviceUnavailable);
    assert!(report.outcome.denied());
    assert_eq!(probe.frames(), 0);
    assert_eq!(device.sent(), vec!["DENIED"]);
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(probe.opens(), 0);
    assert_eq!(main_loop.controller().state().phase(), Phase::Idle);

    // Straight back to idle: the next trigger is served immediately.
    device.push_inbound("TRIGGER");
    let report = next_session(&mut main_loop).await;
    assert_eq!(report.outcome, SessionOutcome::TimedOut);
    assert_eq!(probe.opens(), 1);
    assert_eq!(device.sent(), vec!["DENIED", "DENIED"]);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_unlock_enters_cooldown_then_accepts_new_trigger() {
    let device = MemoryLink::new().with_auto_reply("APPROVED", "UNLOCKED");
    let (mut main_loop, _handle, probe) = build(
        MockCamera::new(),
        MockClassifier::from_pattern("HHH HHH"),
        &device,
    );

    // Lands mid-cooldown and must be dropped.
    let during_cooldown = device.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        during_cooldown.push_inbound("TRIGGER");
    });

    device.push_inbound("TRIGGER");
    let start = Instant::now();
    let report = next_session(&mut main_loop).await;

    assert_eq!(report.outcome, SessionOutcome::Unlocked);
    assert_eq!(report.approved_at_frame, Some(2));
    assert!(!probe.is_open());
    assert_eq!(probe.closes(), 1);
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(device.pending(), 0);

    assert!(matches!(main_loop.step().await, LoopStep::Idle));

    device.push_inbound("TRIGGER");
    let second = next_session(&mut main_loop).await;
    assert_eq!(second.outcome, SessionOutcome::Unlocked);
    assert_ne!(second.id, report.id);
    assert_eq!(probe.opens(), 2);
    assert_eq!(device.sent_count("APPROVED"), 2);
    assert_eq!(main_loop.sessions(), 2);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_timeout_denies_once_and_cools_down() {
    let device = MemoryLink::new();
    let (mut main_loop, _handle, probe) =
        build(MockCamera::new(), MockClassifier::from_pattern("HH.o.f"), &device);

    device.push_inbound("TRIGGER");
    let start = Instant::now();
    let report = next_session(&mut main_loop).await;

    assert_eq!(report.outcome, SessionOutcome::TimedOut);
    assert!(report.outcome.denied());
    assert_eq!(device.sent(), vec!["DENIED"]);
    assert!(report.approved_at_frame.is_none());
    assert_eq!(probe.frames() as u32, report.frames);
    assert!(report.elapsed >= Duration::from_secs(2));
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert!(!probe.is_open());
    assert_eq!(main_loop.controller().state().phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn scenario_e_detached_link_still_completes_sessions() {
    let config = test_config();
    let camera = MockCamera::new();
    let probe = camera.probe();
    let mut controller = SessionController::new(
        Box::new(camera),
        Box::new(MockClassifier::from_pattern("HHH").then_repeat(presence::FrameVerdict::Human)),
        &config,
    );
    let mut link = DetachedLink::new();
    let (_handle, mut inbox) = operator::channel();

    let report = controller.handle_trigger(&mut link, &mut inbox).await;

    assert_eq!(report.approved_at_frame, Some(2));
    assert_eq!(report.outcome, SessionOutcome::TimedOut);
    assert_eq!(link.dropped(), 2);
    assert!(!link.is_attached());
    assert!(!probe.is_open());

    // A second simulated trigger is served the same way.
    let again = controller.handle_trigger(&mut link, &mut inbox).await;
    assert_eq!(again.outcome, SessionOutcome::TimedOut);
    assert_eq!(probe.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_session_releases_camera_and_link() {
    let device = MemoryLink::new();
    let (mut main_loop, handle, probe) = build(MockCamera::new(), MockClassifier::new(), &device);

    device.push_inbound("TRIGGER");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.shutdown();
    });

    let start = Instant::now();
    main_loop.run().await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(device.sent().is_empty());
    assert!(!probe.is_open());
    assert_eq!(probe.closes(), 1);
    assert!(device.is_closed());
}

#[tokio::test(start_paused = true)]
async fn stray_lines_while_idle_are_ignored() {
    let device = MemoryLink::new();
    let (mut main_loop, _handle, probe) = build(MockCamera::new(), MockClassifier::new(), &device);

    device.push_inbound("UNLOCKED");
    device.push_inbound("trigger");

    assert!(matches!(main_loop.step().await, LoopStep::Ignored(line) if line == "UNLOCKED"));
    assert!(matches!(main_loop.step().await, LoopStep::Ignored(line) if line == "trigger"));
    assert!(matches!(main_loop.step().await, LoopStep::Idle));
    assert_eq!(probe.opens(), 0);
    assert_eq!(main_loop.sessions(), 0);
}

struct PanickingClassifier;

impl Classifier for PanickingClassifier {
    fn detect(
        &mut self,
        _frame: &VideoFrame,
        _confidence_threshold: f32,
    ) -> Result<Vec<Detection>, ClassifierError> {
        panic!("model runtime crashed");
    }
}

#[tokio::test(start_paused = true)]
async fn collaborator_panic_is_absorbed_with_backoff() {
    let device = MemoryLink::new();
    let (mut main_loop, _handle, probe) = build(MockCamera::new(), PanickingClassifier, &device);

    device.push_inbound("TRIGGER");
    let start = Instant::now();
    let report = next_session(&mut main_loop).await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Faulted {
            reason: "model runtime crashed".to_string(),
            unexpected: true,
        }
    );
    assert!(device.sent().is_empty());
    assert!(!probe.is_open());
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_secs(1));

    // The loop keeps serving.
    assert!(matches!(main_loop.step().await, LoopStep::Idle));
}

#[test]
fn mock_camera_close_is_idempotent_through_the_trait() {
    let mut camera: Box<dyn FrameSource> = Box::new(MockCamera::new());
    camera.close();
    camera.close();
    assert!(!camera.is_open());
}

/// Console input that stays silent until its sender is dropped
struct SilentConsole(std_mpsc::Receiver<Vec<u8>>);

impl Read for SilentConsole {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.recv() {
            Ok(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Err(_) => Ok(0),
        }
    }
}

#[test]
fn shutdown_exits_while_console_link_is_blocked_on_input() {
    let (_console_open, silent) = std_mpsc::channel::<Vec<u8>>();
    let (done_tx, done_rx) = std_mpsc::channel();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let closed = runtime.block_on(async {
            let lines =
                console::spawn_line_reader("console", BufReader::new(SilentConsole(silent)))
                    .unwrap();
            let link = SerialLink::from_lines("console", lines, tokio::io::sink());

            let config = test_config();
            let camera = MockCamera::new();
            let probe = camera.probe();
            let controller =
                SessionController::new(Box::new(camera), Box::new(MockClassifier::new()), &config);
            let (handle, inbox) = operator::channel();
            let mut main_loop = MainLoop::new(controller, Box::new(link), inbox, &config.session);

            handle.shutdown();
            main_loop.run().await;
            !probe.is_open()
        });
        drop(runtime);
        let _ = done_tx.send(closed);
    });

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
}
