//! End-to-end wiring of the calibration store, correction pipeline, and
//! acquisition controller against the mock detector.

use std::sync::Arc;
use std::time::Duration;

use xray_acquire::beam::mock::MockBeamSupply;
use xray_acquire::beam::BeamSupply;
use xray_acquire::calibration::key::CalibrationKey;
use xray_acquire::calibration::store::{CalibrationStore, ReferenceKind};
use xray_acquire::detector::mock::MockDetector;
use xray_acquire::detector::DetectorDriver;
use xray_acquire::pipeline::{default_stages, StageKind};
use xray_acquire::{AcquisitionController, FailReason, Frame, FrameStore, Pipeline};

fn controller_with(beam: Option<Arc<dyn BeamSupply>>) -> AcquisitionController {
    let frame_store = Arc::new(FrameStore::new());
    let pipeline = Arc::new(Pipeline::new(default_stages()).expect("valid default stages"));
    let detector: Arc<dyn DetectorDriver> = Arc::new(MockDetector::new(8, 8));
    detector.open().unwrap();
    AcquisitionController::new(frame_store, pipeline, detector, beam)
}

#[test]
fn integration_capture_applies_nearest_dark_reference() {
    let dir = tempfile::tempdir().unwrap();
    let store = CalibrationStore::new(dir.path());
    let key = CalibrationKey::new("det-a", 0.05, 100, 8, 8);
    store
        .save_reference(ReferenceKind::Dark, &key, &Frame::filled(8, 8, 500.0))
        .unwrap();

    let query = CalibrationKey::new("det-a", 0.05, 100, 8, 8);
    let dark = match store.lookup_dark(&query) {
        xray_acquire::calibration::store::LookupOutcome::Applied { reference, .. } => reference.frame,
        _ => panic!("expected a nearest-match hit for an exact key"),
    };

    let controller = controller_with(None);
    controller.set_dark(Some(dark));

    let (frame, reason) =
        controller.request_integration(3, 0.0, Duration::from_secs(5), false);
    assert!(reason.is_none(), "unexpected failure: {:?}", reason);
    let frame = frame.expect("integration should produce a frame");
    assert_eq!(frame.shape(), (8, 8));
    // The flat-field level (20000) dwarfs the subtracted dark (500); result
    // should land well below the raw level and well above zero.
    let (min, max) = frame.finite_min_max().unwrap();
    assert!(min > 0.0 && max < 20000.0);
}

#[test]
fn lookup_beyond_threshold_reports_too_far_without_failing_capture() {
    let dir = tempfile::tempdir().unwrap();
    let store = CalibrationStore::new(dir.path());
    let key = CalibrationKey::new("det-a", 0.01, 100, 8, 8);
    store
        .save_reference(ReferenceKind::Dark, &key, &Frame::zeros(8, 8))
        .unwrap();

    let query = CalibrationKey::new("det-a", 5.0, 100, 8, 8);
    match store.lookup_dark(&query) {
        xray_acquire::calibration::store::LookupOutcome::TooFar { distance, .. } => {
            assert!(distance > xray_acquire::calibration::store::DEFAULT_MATCH_THRESHOLD);
        }
        _ => panic!("expected a too-far rejection for a 5 second exposure gap"),
    }
}

#[test]
fn prefix_capture_runs_only_dark_subtraction_slot() {
    let controller = controller_with(None);
    controller.set_dark(Some(Frame::filled(8, 8, 200.0)));

    let dark_slot = xray_acquire::pipeline::stage::SLOT_DARK;
    let (frame, reason) = controller.request_n_frames_processed_up_to_slot(
        2,
        dark_slot + 1,
        0.0,
        true,
    );
    assert!(reason.is_none(), "unexpected failure: {:?}", reason);
    let frame = frame.expect("dark capture should produce a frame");
    let (min, max) = frame.finite_min_max().unwrap();
    // Only dark subtraction ran: no crop/background/enhance to alter range,
    // so the raw ~20000 flat field minus the 200 dark should still be visible.
    assert!(max > 15000.0 && min > 0.0);
}

#[test]
fn beam_handshake_is_reused_across_repeated_integration_requests() {
    let beam = Arc::new(MockBeamSupply::new(true));
    let beam_trait: Arc<dyn BeamSupply> = beam.clone();
    let controller = controller_with(Some(beam_trait));

    for _ in 0..3 {
        let (frame, reason) =
            controller.request_integration(1, 0.0, Duration::from_secs(5), true);
        assert!(reason.is_none(), "unexpected failure: {:?}", reason);
        assert!(frame.is_some());
    }

    assert_eq!(beam.turn_on_count(), 1, "beam handshake should run exactly once");
    assert_eq!(beam.turn_off_count(), 0, "beam should stay on across the workflow");
}

#[test]
fn not_idle_is_rejected_during_a_live_capture() {
    let controller = Arc::new(controller_with(None));
    let blocking = Arc::clone(&controller);
    let handle = std::thread::spawn(move || {
        blocking.request_integration(4, 0.2, Duration::from_secs(5), false)
    });

    std::thread::sleep(Duration::from_millis(30));
    let (frame, reason) = controller.request_integration(1, 0.0, Duration::from_secs(1), false);
    assert!(frame.is_none());
    assert!(matches!(reason, Some(FailReason::NotIdle)));

    handle.join().unwrap();
}

#[test]
fn stage_registry_orders_pipeline_by_canonical_slot() {
    let pipeline = Pipeline::new(default_stages()).unwrap();
    let names = pipeline.stage_names();
    assert_eq!(names.first().copied(), Some("dark_subtract"));
    assert_eq!(names.last().copied(), Some("background_separate"));
}

#[test]
fn duplicate_slot_registration_is_rejected() {
    let mut stages = default_stages();
    stages.push(xray_acquire::pipeline::StageEntry::new(
        "dark_subtract_again",
        true,
        StageKind::DarkSubtract,
    ));
    assert!(Pipeline::new(stages).is_err());
}
