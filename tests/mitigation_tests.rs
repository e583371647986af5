//! Mitigation policy tests
//! Blur decisions, region bounds and pixel-level effects on synthetic frames

mod common;

use common::checkerboard;
use framesafe::{BlurParams, BlurRules, BoundingBox, Detection, Label, MitigationPolicy};

fn detection(label: Label, x: i32, y: i32, w: i32, h: i32) -> Detection {
    Detection::new(label, 0.9, BoundingBox::new(x, y, w, h))
}

#[test]
fn test_no_exposed_detections_leave_frame_identical() {
    let policy = MitigationPolicy::default();
    let mut frame = checkerboard(128, 96, 8);
    let before = frame.to_bytes().unwrap();

    let detections = [
        detection(Label::FaceFemale, 10, 10, 40, 40),
        detection(Label::BellyCovered, 50, 20, 30, 30),
        detection(Label::FeetCovered, 0, 0, 10, 10),
    ];
    assert!(!policy.should_mitigate(&detections));

    let report = policy.mitigate(&mut frame, &detections).unwrap();
    assert_eq!(report.blurred, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(frame.to_bytes().unwrap(), before);
}

#[test]
fn test_exposed_region_fully_changed() {
    let policy = MitigationPolicy::default();
    let original = checkerboard(320, 240, 8);
    let mut frame = original.try_clone().unwrap();

    let detections = [detection(Label::FemaleBreastExposed, 40, 30, 64, 48)];
    assert!(policy.should_mitigate(&detections));

    let report = policy.mitigate(&mut frame, &detections).unwrap();
    assert_eq!(report.blurred, 1);

    for y in 30..78 {
        for x in 40..104 {
            assert_ne!(frame.pixel(x, y).unwrap(), original.pixel(x, y).unwrap());
        }
    }
    for (x, y) in [(39, 30), (104, 30), (40, 29), (40, 78), (200, 200)] {
        assert_eq!(frame.pixel(x, y).unwrap(), original.pixel(x, y).unwrap());
    }
}

#[test]
fn test_only_rule_enabled_regions_blurred() {
    let rules = BlurRules::with_disabled(&[Label::FeetExposed]);
    let policy = MitigationPolicy::new(rules, BlurParams::default());
    let original = checkerboard(200, 100, 8);
    let mut frame = original.try_clone().unwrap();

    let detections = [
        detection(Label::FeetExposed, 10, 10, 30, 30),
        detection(Label::AnusExposed, 100, 10, 30, 30),
    ];
    let report = policy.mitigate(&mut frame, &detections).unwrap();
    assert_eq!(report.blurred, 1);

    assert_eq!(frame.pixel(20, 20).unwrap(), original.pixel(20, 20).unwrap());
    assert_ne!(frame.pixel(110, 20).unwrap(), original.pixel(110, 20).unwrap());
}

#[test]
fn test_boxes_touching_far_edges_are_skipped() {
    let policy = MitigationPolicy::default();
    let mut frame = checkerboard(100, 100, 8);
    let before = frame.to_bytes().unwrap();

    let detections = [
        // right edge at x + w == width
        detection(Label::BellyExposed, 50, 10, 50, 20),
        // bottom edge at y + h == height
        detection(Label::BellyExposed, 10, 60, 20, 40),
        detection(Label::BellyExposed, 10, -5, 20, 20),
        detection(Label::BellyExposed, 10, 10, 0, 20),
    ];
    let report = policy.mitigate(&mut frame, &detections).unwrap();

    assert_eq!(report.blurred, 0);
    assert_eq!(report.skipped, 4);
    assert_eq!(frame.to_bytes().unwrap(), before);
}

#[test]
fn test_mixed_valid_and_invalid_boxes() {
    let policy = MitigationPolicy::default();
    let mut frame = checkerboard(100, 100, 8);

    let detections = [
        detection(Label::BellyExposed, 10, 10, 30, 30),
        detection(Label::BellyExposed, 80, 80, 30, 30),
    ];
    let report = policy.mitigate(&mut frame, &detections).unwrap();
    assert_eq!(report.blurred, 1);
    assert_eq!(report.skipped, 1);
}
