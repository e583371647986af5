//! Detection decoder tests
//! Scale-back accuracy, suppression behaviour and determinism on synthetic model output

mod common;

use common::{anchors_last, Row};
use framesafe::inference::{DecoderThresholds, DetectionDecoder, RowLayout};
use framesafe::preprocessing::Letterbox;
use framesafe::{BoundingBox, Label, LabelCatalog, TargetSize, TransformContext};

/// Project a frame-space box into letterboxed model space
fn to_model_space(bbox: BoundingBox, geometry: &Letterbox, frame_w: u32) -> [f32; 4] {
    let scale = geometry.new_width as f64 / frame_w as f64;
    let cx = (bbox.x as f64 + bbox.width as f64 / 2.0) * scale + geometry.pad_left as f64;
    let cy = (bbox.y as f64 + bbox.height as f64 / 2.0) * scale + geometry.pad_top as f64;
    [
        cx as f32,
        cy as f32,
        (bbox.width as f64 * scale) as f32,
        (bbox.height as f64 * scale) as f32,
    ]
}

#[test]
fn test_coordinate_round_trip_within_one_pixel() {
    let decoder = DetectionDecoder::standard();
    let cases = [
        (1280, 720, BoundingBox::new(100, 200, 300, 150)),
        (1920, 1080, BoundingBox::new(960, 40, 80, 400)),
        (640, 480, BoundingBox::new(0, 0, 64, 64)),
        (720, 1280, BoundingBox::new(30, 900, 600, 200)),
    ];

    for (width, height, bbox) in cases {
        let geometry = Letterbox::compute(width, height, TargetSize::square(320));
        let row: Row = (to_model_space(bbox, &geometry, width), 13, 0.8);

        let detections = decoder
            .decode(&anchors_last(&[row]), &geometry.context())
            .unwrap();
        assert_eq!(detections.len(), 1);

        let decoded = detections[0].bbox;
        for (got, want) in [
            (decoded.x, bbox.x),
            (decoded.y, bbox.y),
            (decoded.width, bbox.width),
            (decoded.height, bbox.height),
        ] {
            assert!(
                (got - want).abs() <= 1,
                "{}x{}: decoded {:?}, expected {:?}",
                width,
                height,
                decoded,
                bbox
            );
        }
    }
}

#[test]
fn test_overlapping_boxes_keep_highest_score() {
    let decoder = DetectionDecoder::standard();
    let rows = [
        ([100.0, 100.0, 50.0, 50.0], 3, 0.6),
        ([104.0, 102.0, 50.0, 50.0], 3, 0.9),
    ];

    let detections = decoder
        .decode(&anchors_last(&rows), &TransformContext::identity())
        .unwrap();

    assert_eq!(detections.len(), 1);
    assert!((detections[0].score - 0.9).abs() < 1e-6);
    assert_eq!(detections[0].label, Label::FemaleBreastExposed);
}

#[test]
fn test_suppression_is_class_agnostic() {
    let decoder = DetectionDecoder::standard();
    let rows = [
        ([100.0, 100.0, 50.0, 50.0], 2, 0.7),
        ([100.0, 100.0, 50.0, 50.0], 17, 0.8),
    ];

    let detections = decoder
        .decode(&anchors_last(&rows), &TransformContext::identity())
        .unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label, Label::ButtocksCovered);
}

#[test]
fn test_disjoint_boxes_ordered_by_score() {
    let decoder = DetectionDecoder::standard();
    let rows = [
        ([50.0, 50.0, 20.0, 20.0], 7, 0.5),
        ([200.0, 50.0, 20.0, 20.0], 11, 0.95),
        ([50.0, 200.0, 20.0, 20.0], 0, 0.7),
    ];

    let detections = decoder
        .decode(&anchors_last(&rows), &TransformContext::identity())
        .unwrap();

    let labels: Vec<Label> = detections.iter().map(|d| d.label).collect();
    assert_eq!(
        labels,
        vec![Label::ArmpitsExposed, Label::FemaleGenitaliaCovered, Label::FeetExposed]
    );
}

#[test]
fn test_scores_between_confidence_and_score_thresholds_are_dropped() {
    let decoder = DetectionDecoder::standard();
    // Passes the 0.2 pre-filter but not the 0.25 suppression floor
    let rows = [([50.0, 50.0, 20.0, 20.0], 13, 0.22)];

    let detections = decoder
        .decode(&anchors_last(&rows), &TransformContext::identity())
        .unwrap();
    assert!(detections.is_empty());
}

#[test]
fn test_decode_is_idempotent() {
    let decoder = DetectionDecoder::standard();
    let geometry = Letterbox::compute(1280, 720, TargetSize::square(320));
    let rows = [
        ([160.0, 160.0, 40.0, 20.0], 7, 0.8),
        ([162.0, 161.0, 40.0, 20.0], 7, 0.75),
        ([20.0, 90.0, 10.0, 30.0], 14, 0.4),
    ];
    let output = anchors_last(&rows);

    let first = decoder.decode(&output, &geometry.context()).unwrap();
    let second = decoder.decode(&output, &geometry.context()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn test_custom_catalog_width_is_enforced() {
    let catalog = LabelCatalog::from_names(&["FACE_MALE", "BELLY_EXPOSED"]).unwrap();
    let decoder = DetectionDecoder::new(catalog, DecoderThresholds::default(), RowLayout::AnchorsLast);

    // Standard 18-label output against a 2-label catalog
    let result = decoder.decode(&anchors_last(&[]), &TransformContext::identity());
    assert!(result.is_err());

    let mut data = ndarray::Array3::<f32>::zeros((1, 6, 1));
    data[[0, 0, 0]] = 30.0;
    data[[0, 1, 0]] = 30.0;
    data[[0, 2, 0]] = 10.0;
    data[[0, 3, 0]] = 10.0;
    data[[0, 5, 0]] = 0.9;
    let output = framesafe::RawOutput::new(data.into_dyn());

    let detections = decoder.decode(&output, &TransformContext::identity()).unwrap();
    assert_eq!(detections[0].label, Label::BellyExposed);
}
