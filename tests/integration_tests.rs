//! Integration tests for the tracking core.
//!
//! These drive complete multi-frame scenarios through the public API and
//! check the lifecycle invariants after every frame.

use std::collections::{BTreeMap, HashSet};

use nalgebra::DVector;

use motrack::{
    DistanceType, MultipleObjectTracker, TrackId, TrackManagerConfig, TrackedObject,
};

const FRAME: f64 = 0.0333; // ~30 FPS
const SCORE_THRESHOLD: f64 = 0.5;

fn person_at(x: f64, y: f64) -> TrackedObject {
    TrackedObject {
        x,
        y,
        length: 0.5,
        width: 0.5,
        height: 1.7,
        classification: DVector::from_vec(vec![0.9, 0.05, 0.05]),
        ..Default::default()
    }
}

fn low_score_person_at(x: f64, y: f64) -> TrackedObject {
    let mut person = person_at(x, y);
    person.classification = DVector::from_vec(vec![0.35, 0.05, 0.05]);
    person
}

/// Lifecycle invariants that must hold after every `track` call.
fn assert_invariants(tracker: &MultipleObjectTracker) {
    let tracks = tracker.get_tracks();

    // Unique ids among live tracks.
    let ids: Vec<TrackId> = tracks.iter().map(|t| t.id).collect();
    let unique: HashSet<TrackId> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len(), "duplicate live ids: {:?}", ids);

    // Reliable tracks are a subset of all tracks.
    let all: HashSet<TrackId> = unique;
    for track in tracker.get_reliable_tracks() {
        assert!(all.contains(&track.id), "reliable id {} not live", track.id);
    }

    // Exposed covariances are symmetric and positive semi-definite.
    for track in &tracks {
        let p = &track.error_covariance;
        let asymmetry = (p - p.transpose()).abs().max();
        assert!(asymmetry < 1e-9, "asymmetric covariance: {}", asymmetry);

        let eigenvalues = p.clone().symmetric_eigen().eigenvalues;
        for lambda in eigenvalues.iter() {
            assert!(*lambda > -1e-9, "negative eigenvalue {}", lambda);
        }
    }
}

// =============================================================================
// Scenario 1: single static object, suspension and reactivation
// =============================================================================

#[test]
fn test_static_object_full_lifecycle() {
    let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();

    // Feed the same detection for one second.
    let mut t = 0.0;
    for frame in 0..31 {
        t = frame as f64 * FRAME;
        tracker.track(vec![person_at(1.0, 1.0)], t, SCORE_THRESHOLD).unwrap();
        assert_invariants(&tracker);
    }

    let reliable = tracker.get_reliable_tracks();
    assert_eq!(reliable.len(), 1);
    let original_id = reliable[0].id;
    assert!((reliable[0].x - 1.0).abs() < 0.05);
    assert!((reliable[0].y - 1.0).abs() < 0.05);
    assert!(reliable[0].z.abs() < 0.05);

    // One second of silence: the static track is suspended, not deleted.
    for frame in 1..31 {
        tracker.track(Vec::new(), t + frame as f64 * FRAME, SCORE_THRESHOLD).unwrap();
        assert_invariants(&tracker);
    }
    assert!(tracker.manager().is_suspended(original_id));
    assert!(tracker.get_reliable_tracks().is_empty());
    assert_eq!(tracker.get_tracks().len(), 1);

    // The same detection at t = 2.0 revives the original identity.
    tracker.track(vec![person_at(1.0, 1.0)], 2.0, SCORE_THRESHOLD).unwrap();
    assert_invariants(&tracker);
    assert!(tracker.manager().has_id(original_id));
    assert!(!tracker.manager().is_suspended(original_id));
    assert_eq!(tracker.get_tracks().len(), 1);

    // One more corrected frame closes the reactivation head start.
    tracker.track(vec![person_at(1.0, 1.0)], 2.0 + FRAME, SCORE_THRESHOLD).unwrap();
    let reliable = tracker.get_reliable_tracks();
    assert_eq!(reliable.len(), 1);
    assert_eq!(reliable[0].id, original_id);
}

// =============================================================================
// Scenario 2: two crossing pedestrians keep their identities
// =============================================================================

#[test]
fn test_crossing_pedestrians_no_id_swap() {
    let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();

    let observe = |t: f64| {
        let mut a = person_at(-0.5 + t, 0.5);
        a.vx = 1.0;
        let mut b = person_at(0.5 - t, -0.5);
        b.vx = -1.0;
        vec![a, b]
    };

    let mut id_by_lane: BTreeMap<TrackId, f64> = BTreeMap::new();
    for frame in 0..30 {
        let t = frame as f64 * FRAME;
        tracker
            .track_with(
                observe(t),
                t,
                DistanceType::MultiClassEuclidean,
                1.5,
                SCORE_THRESHOLD,
            )
            .unwrap();
        assert_invariants(&tracker);

        for track in tracker.get_reliable_tracks() {
            let lane = if track.y > 0.0 { 0.5 } else { -0.5 };
            let entry = id_by_lane.entry(track.id).or_insert(lane);
            assert_eq!(
                *entry, lane,
                "track {} switched lanes at frame {}",
                track.id, frame
            );
        }
    }

    // Both pedestrians tracked end to end, no replacement identities.
    assert_eq!(tracker.get_reliable_tracks().len(), 2);
    assert_eq!(id_by_lane.len(), 2);
}

// =============================================================================
// Scenario 3: missed frames inside the budget are tolerated
// =============================================================================

#[test]
fn test_track_survives_short_occlusion() {
    let mut config = TrackManagerConfig::default();
    config.non_measurement_frames_dynamic = 5;
    let mut tracker = MultipleObjectTracker::new(config).unwrap();

    let observe = |frame: usize| {
        let mut person = person_at(frame as f64 * FRAME, 0.0); // 1 m/s
        person.vx = 1.0;
        vec![person]
    };

    for frame in 0..10 {
        tracker.track(observe(frame), frame as f64 * FRAME, SCORE_THRESHOLD).unwrap();
    }
    let id = tracker.get_reliable_tracks()[0].id;

    // Three frames of occlusion, within the budget of five.
    for frame in 10..13 {
        tracker.track(Vec::new(), frame as f64 * FRAME, SCORE_THRESHOLD).unwrap();
        assert!(tracker.manager().has_id(id), "died during occlusion");
    }

    // The object reappears where the prediction says it should be.
    for frame in 13..16 {
        tracker.track(observe(frame), frame as f64 * FRAME, SCORE_THRESHOLD).unwrap();
    }

    let reliable = tracker.get_reliable_tracks();
    assert_eq!(reliable.len(), 1);
    assert_eq!(reliable[0].id, id, "identity lost across occlusion");
    assert_eq!(tracker.get_tracks().len(), 1);
}

// =============================================================================
// Scenario 4: low-score detections keep a starving track alive
// =============================================================================

#[test]
fn test_low_score_detection_rescues_track() {
    let mut config = TrackManagerConfig::default();
    config.max_unreliable_frames = 1;
    let mut tracker = MultipleObjectTracker::new(config).unwrap();

    // Two confident frames: birth, then first correction.
    tracker.track(vec![person_at(3.0, 3.0)], 0.0, SCORE_THRESHOLD).unwrap();
    tracker.track(vec![person_at(3.0, 3.0)], FRAME, SCORE_THRESHOLD).unwrap();
    let reliable = tracker.get_reliable_tracks();
    assert_eq!(reliable.len(), 1);
    let id = reliable[0].id;

    // From here the detector only produces low-confidence hits. They never
    // spawn tracks, but they do keep feeding this one: the missed-frame
    // counter stays at zero well past the deletion budget.
    for frame in 2..14 {
        tracker
            .track(
                vec![low_score_person_at(3.0, 3.0)],
                frame as f64 * FRAME,
                SCORE_THRESHOLD,
            )
            .unwrap();
        assert_invariants(&tracker);
    }

    let reliable = tracker.get_reliable_tracks();
    assert_eq!(reliable.len(), 1);
    assert_eq!(reliable[0].id, id);
    assert_eq!(tracker.get_tracks().len(), 1);
}

// =============================================================================
// Scenario 5: birth gating
// =============================================================================

#[test]
fn test_birth_gated_by_distance() {
    let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();

    for frame in 0..4 {
        tracker.track(vec![person_at(0.0, 0.0)], frame as f64 * FRAME, SCORE_THRESHOLD).unwrap();
    }
    assert_eq!(tracker.get_tracks().len(), 1);

    // Half a metre away: claimed by the existing track, no birth.
    tracker.track(vec![person_at(0.5, 0.0)], 4.0 * FRAME, SCORE_THRESHOLD).unwrap();
    assert_eq!(tracker.get_tracks().len(), 1);

    // Twenty metres away: outside the 5 m gate, a new track is born.
    tracker.track(vec![person_at(20.0, 0.0)], 5.0 * FRAME, SCORE_THRESHOLD).unwrap();
    assert_eq!(tracker.get_tracks().len(), 2);
}

// =============================================================================
// Scenario 6: a degenerate frame is absorbed by the lifecycle
// =============================================================================

#[test]
fn test_degenerate_correction_follows_missed_frame_pathway() {
    use motrack::TrackManager;

    let config = TrackManagerConfig::default();
    let budget = config.non_measurement_frames_dynamic;
    let mut manager = TrackManager::new(config).unwrap();

    let observe = |frame: u32| {
        let mut person = person_at(frame as f64 * FRAME, 0.0); // 1 m/s
        person.vx = 1.0;
        person
    };

    let id = manager.create_track(observe(0), 0.0).unwrap();
    for frame in 1..4 {
        manager.predict(FRAME);
        manager.set_measurement(id, observe(frame)).unwrap();
        manager.correct();
    }
    assert!(manager.is_reliable(id));

    // A measurement that collapses the update (non-finite residual) makes
    // every filter skip its correction. The frame still completes and the
    // track survives, aged as if the frame were missed.
    let poisoned = |frame: u32| {
        let mut person = observe(frame);
        person.x = f64::NAN;
        person
    };

    manager.predict(FRAME);
    manager.set_measurement(id, poisoned(4)).unwrap();
    manager.correct();
    assert!(manager.has_id(id));
    assert!(manager.get_track(id).unwrap().x.is_finite());

    // The degenerate frames only kill the track once the dynamic
    // missed-frame budget is spent.
    for frame in 5..(4 + budget) {
        manager.predict(FRAME);
        manager.set_measurement(id, poisoned(frame)).unwrap();
        manager.correct();
        assert!(manager.has_id(id), "died before the budget at frame {}", frame);
    }
    manager.predict(FRAME);
    manager.set_measurement(id, poisoned(4 + budget)).unwrap();
    manager.correct();
    assert!(!manager.has_id(id), "survived past the missed-frame budget");
}

// =============================================================================
// Laws
// =============================================================================

#[test]
fn test_law_identity_persistence_under_perfect_observation() {
    let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();

    let detections = || vec![person_at(0.0, 0.0), person_at(5.0, 5.0)];

    let mut ids_at_promotion: Option<HashSet<TrackId>> = None;
    for frame in 0..30 {
        tracker.track(detections(), frame as f64 * FRAME, SCORE_THRESHOLD).unwrap();
        let ids: HashSet<TrackId> =
            tracker.get_reliable_tracks().iter().map(|t| t.id).collect();
        if ids.len() == 2 && ids_at_promotion.is_none() {
            ids_at_promotion = Some(ids.clone());
        }
        if let Some(expected) = &ids_at_promotion {
            assert_eq!(&ids, expected, "id set drifted at frame {}", frame);
        }
    }
    assert!(ids_at_promotion.is_some(), "tracks never became reliable");
}

#[test]
fn test_law_empty_frame_idempotence() {
    let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();
    for frame in 0..4 {
        tracker.track(vec![person_at(1.0, 1.0)], frame as f64 * FRAME, SCORE_THRESHOLD).unwrap();
    }

    tracker.track(Vec::new(), 4.0 * FRAME, SCORE_THRESHOLD).unwrap();
    let ids_first: Vec<TrackId> = tracker.get_tracks().iter().map(|t| t.id).collect();

    tracker.track(Vec::new(), 5.0 * FRAME, SCORE_THRESHOLD).unwrap();
    let ids_second: Vec<TrackId> = tracker.get_tracks().iter().map(|t| t.id).collect();

    // Two successive empty frames differ only in aging bookkeeping.
    assert_eq!(ids_first, ids_second);
}

#[test]
fn test_law_births_bounded_by_detections() {
    let mut tracker = MultipleObjectTracker::new(TrackManagerConfig::default()).unwrap();
    tracker
        .track(
            vec![
                person_at(0.0, 0.0),
                person_at(10.0, 0.0),
                person_at(20.0, 0.0),
            ],
            0.0,
            SCORE_THRESHOLD,
        )
        .unwrap();
    assert!(tracker.get_tracks().len() <= 3);

    // A second frame of the same detections must not create more tracks.
    tracker
        .track(
            vec![
                person_at(0.0, 0.0),
                person_at(10.0, 0.0),
                person_at(20.0, 0.0),
            ],
            FRAME,
            SCORE_THRESHOLD,
        )
        .unwrap();
    assert_eq!(tracker.get_tracks().len(), 3);
}
