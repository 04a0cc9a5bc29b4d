mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeImage, FakeGpu, RecordingFactory, file_config, temp_output};
use lockstep_engine::capture::{CaptureSession, CaptureState, CommitOutcome, DropReason};
use lockstep_engine::config::Resolution;
use lockstep_engine::error::CaptureInitError;
use lockstep_engine::gpu::ImageRole;

const RES: Resolution = Resolution::new(64, 36);

fn session(factory: &RecordingFactory, name: &str) -> (CaptureSession<FakeImage>, FakeGpu) {
    let config = Arc::new(file_config(RES, "bunny", temp_output(name)));
    let mut gpu = FakeGpu::default();
    let mut session = CaptureSession::new(Arc::clone(&config), Box::new(factory.clone()));
    session.start(&config.output, &mut gpu).unwrap();
    (session, gpu)
}

// ── start ─────────────────────────────────────────────────────────────────

#[test]
fn start_allocates_one_capture_image_per_slot() {
    let factory = RecordingFactory::new();
    let (session, gpu) = session(&factory, "start");

    assert_eq!(session.state(), CaptureState::Recording);
    assert_eq!(gpu.images.len(), 3);
    assert!(gpu.images.iter().all(|i| i.role == ImageRole::Capture));
    assert_eq!(factory.log().opened[0].1.fps, 60);
}

#[test]
fn start_twice_is_rejected() {
    let factory = RecordingFactory::new();
    let (mut session, mut gpu) = session(&factory, "twice");
    let err = session.start(&temp_output("twice-b"), &mut gpu).unwrap_err();
    assert!(matches!(err, CaptureInitError::NotIdle));
    assert_eq!(session.state(), CaptureState::Recording);
}

#[test]
fn failed_start_stays_idle() {
    let factory = RecordingFactory::failing();
    let config = Arc::new(file_config(RES, "bunny", temp_output("fail")));
    let mut gpu = FakeGpu::default();
    let mut session = CaptureSession::new(Arc::clone(&config), Box::new(factory));

    assert!(session.start(&config.output, &mut gpu).is_err());
    assert_eq!(session.state(), CaptureState::Idle);
    assert!(session.acquire_frame_target().is_none());
}

// ── acquire / commit ──────────────────────────────────────────────────────

#[test]
fn pool_exhaustion_returns_none_until_a_buffer_is_committed() {
    let factory = RecordingFactory::new();
    let (mut session, _gpu) = session(&factory, "exhaust");

    let targets: Vec<_> = (0..3).map(|_| session.acquire_frame_target().unwrap()).collect();
    assert!(session.acquire_frame_target().is_none());
    assert_eq!(session.outstanding(), 3);

    let mut targets = targets.into_iter();
    let first = targets.next().unwrap();
    let outcome = session.commit_frame(first.backing.unwrap());
    assert!(matches!(outcome, CommitOutcome::Appended(_)));
    assert!(session.acquire_frame_target().is_some());
}

#[test]
fn late_ticket_is_parked_until_its_predecessor_commits() {
    let factory = RecordingFactory::new();
    let (mut session, _gpu) = session(&factory, "park");

    let a = session.acquire_frame_target().unwrap().backing.unwrap();
    let b = session.acquire_frame_target().unwrap().backing.unwrap();

    assert_eq!(session.commit_frame(b), CommitOutcome::Parked);
    assert_eq!(session.frame_counter(), 0);
    assert!(matches!(session.commit_frame(a), CommitOutcome::Appended(_)));
    assert_eq!(session.frame_counter(), 2);
    assert_eq!(session.outstanding(), 0);
}

#[test]
fn not_ready_encoder_drops_the_frame_and_releases_the_buffer() {
    let factory = RecordingFactory::new();
    let (mut session, _gpu) = session(&factory, "not-ready");

    factory.set_ready(false);
    let buffer = session.acquire_frame_target().unwrap().backing.unwrap();
    assert_eq!(
        session.commit_frame(buffer),
        CommitOutcome::Dropped(DropReason::EncoderNotReady)
    );
    assert_eq!(session.frames_dropped(), 1);
    assert_eq!(session.frame_counter(), 0);
    assert_eq!(session.outstanding(), 0);
    assert!(factory.log().pts.is_empty());
}

#[test]
fn abandoned_frame_keeps_later_frames_flowing() {
    let factory = RecordingFactory::new();
    let (mut session, _gpu) = session(&factory, "abandon");

    let a = session.acquire_frame_target().unwrap().backing.unwrap();
    let b = session.acquire_frame_target().unwrap().backing.unwrap();

    assert_eq!(session.commit_frame(b), CommitOutcome::Parked);
    assert_eq!(
        session.abandon_frame(a),
        CommitOutcome::Dropped(DropReason::GpuFailed)
    );
    assert_eq!(session.frame_counter(), 1);
    assert_eq!(factory.log().pts.len(), 1);
}

#[test]
fn encoder_failure_stops_the_session_and_fails_the_report() {
    let factory = RecordingFactory::dying_after(1);
    let (mut session, _gpu) = session(&factory, "encoder-dies");

    let a = session.acquire_frame_target().unwrap().backing.unwrap();
    let b = session.acquire_frame_target().unwrap().backing.unwrap();
    let c = session.acquire_frame_target().unwrap().backing.unwrap();

    assert_eq!(session.commit_frame(c), CommitOutcome::Parked);
    assert!(matches!(session.commit_frame(a), CommitOutcome::Appended(_)));
    assert_eq!(
        session.commit_frame(b),
        CommitOutcome::Dropped(DropReason::EncoderError)
    );

    // The parked frame is released, not offered to the dead encoder.
    assert_ne!(session.state(), CaptureState::Recording);
    assert_eq!(session.outstanding(), 0);
    assert!(session.acquire_frame_target().is_none());

    assert!(session.poll_finalize());
    let report = session.report().unwrap();
    assert_eq!(report.frames_committed, 1);
    assert_eq!(report.frames_dropped, 1);
    assert!(report.result.is_err());
    assert_eq!(factory.log().finish_calls, 1);
}

// ── stop / finalize ───────────────────────────────────────────────────────

#[test]
fn stop_is_idempotent_and_finalizes_once() {
    let factory = RecordingFactory::new();
    let (mut session, _gpu) = session(&factory, "stop-twice");

    session.stop();
    session.stop();
    assert!(session.poll_finalize());
    session.stop();

    assert_eq!(session.state(), CaptureState::Closed);
    let log = factory.log();
    assert_eq!(log.finish_calls, 1);
    assert!(log.marked_finished);
}

#[test]
fn acquire_after_stop_returns_none() {
    let factory = RecordingFactory::threaded();
    let (mut session, _gpu) = session(&factory, "acquire-after-stop");

    session.stop();
    assert_eq!(session.state(), CaptureState::Finalizing);
    assert!(session.acquire_frame_target().is_none());

    assert!(session.wait_closed(Duration::from_secs(5)));
    assert!(session.acquire_frame_target().is_none());
}

#[test]
fn commit_after_stop_is_ignored() {
    let factory = RecordingFactory::threaded();
    let (mut session, _gpu) = session(&factory, "commit-after-stop");

    let buffer = session.acquire_frame_target().unwrap().backing.unwrap();
    session.stop();
    assert_eq!(session.commit_frame(buffer), CommitOutcome::Ignored);
    assert!(factory.log().pts.is_empty());
    assert!(session.wait_closed(Duration::from_secs(5)));
}

#[test]
fn report_carries_counts_and_output() {
    let factory = RecordingFactory::new();
    let (mut session, _gpu) = session(&factory, "report");

    for _ in 0..2 {
        let buffer = session.acquire_frame_target().unwrap().backing.unwrap();
        session.commit_frame(buffer);
    }
    factory.set_ready(false);
    let buffer = session.acquire_frame_target().unwrap().backing.unwrap();
    session.commit_frame(buffer);

    session.stop();
    assert!(session.poll_finalize());

    let report = session.report().unwrap();
    assert_eq!(report.frames_committed, 2);
    assert_eq!(report.frames_dropped, 1);
    assert_eq!(report.output, temp_output("report"));
    assert!(report.result.is_ok());
}
