use anyhow::Result;
use std::io::Cursor;
use std::time::Instant;

use depot_monitor::detect::{LabelFilter, ReplayBackend};
use depot_monitor::frame::{open_source, CameraConfig};
use depot_monitor::{
    evaluate, zones, BoundingBox, Detection, FrameSize, Monitor, MonitorSettings, ZoneMap,
    ZoneState,
};

const FRAME: FrameSize = FrameSize::new(960, 540);

#[test]
fn yard_scenario_with_default_zones() {
    let zone_map = ZoneMap::defaults(FRAME);
    let detections = vec![
        Detection::new("truck", 0.92, BoundingBox::new(60, 280, 280, 500)),
        Detection::new("car", 0.71, BoundingBox::new(700, 300, 800, 400)),
        Detection::new("truck", 0.55, BoundingBox::new(380, 20, 560, 200)),
    ];
    let eval = evaluate(&detections, &zone_map);

    assert_eq!(eval.state_of("truck_space_1"), Some(ZoneState::Occupied));
    assert_eq!(eval.state_of("truck_space_2"), Some(ZoneState::Free));
    assert_eq!(eval.state_of("truck_space_3"), Some(ZoneState::Warning));
    assert!(!eval.is_occupied("truck_space_3"));
    assert_eq!(eval.warnings, vec!["car detected"]);
    assert_eq!(eval.state_of("warn_car"), None);
}

#[test]
fn edited_zone_file_drives_classification() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("zones.json");
    std::fs::write(
        &path,
        r#"{
            "truck_space_1": [0, 0, 100.9, 100],
            "truck_space_2": "not a box",
            "loading_dock": [1, 2, 3, 4],
            "warn_car": [2000, 2000, 3000, 3000]
        }"#,
    )?;
    let zone_map = zones::load(&path, FRAME)?;
    assert_eq!(zone_map.len(), 4);
    assert!(zone_map.get("loading_dock").is_none());
    assert_eq!(
        zone_map.get("truck_space_1").map(|z| z.bounds.to_array()),
        Some([0, 0, 100, 100])
    );
    assert_eq!(
        zone_map.get("truck_space_2").map(|z| z.bounds.to_array()),
        Some([330, 260, 620, 520])
    );
    assert_eq!(
        zone_map.get("warn_car").map(|z| z.bounds.to_array()),
        Some([959, 539, 959, 539])
    );

    let eval = evaluate(
        &[
            Detection::new("truck", 0.9, BoundingBox::new(40, 40, 60, 60)),
            Detection::new("car", 0.9, BoundingBox::new(0, 0, 10, 10)),
        ],
        &zone_map,
    );
    assert_eq!(eval.state_of("truck_space_1"), Some(ZoneState::Warning));
    assert!(eval.warnings.is_empty());
    Ok(())
}

#[test]
fn monitor_runs_a_replayed_detection_script() -> Result<()> {
    let script = r#"
# frame 0: truck parked in space 2, a person walking through space 3
[{"label": "Truck", "confidence": 0.9, "bbox": [350, 280, 600, 500]}, {"label": "person", "confidence": 0.8, "bbox": [700, 300, 720, 400]}]
# frame 1: low-confidence car only
[{"label": "car", "confidence": 0.05, "bbox": [100, 300, 200, 400]}]
"#;
    let backend = ReplayBackend::from_reader(Cursor::new(script), LabelFilter::default())?;
    assert_eq!(backend.frames(), 2);

    let settings = MonitorSettings {
        detections_per_second: 0,
        ttl_frames: 0,
    };
    let mut monitor = Monitor::new(ZoneMap::defaults(FRAME), Box::new(backend), settings);
    let mut source = open_source(&CameraConfig::default())?;

    monitor.step(source.as_mut(), Instant::now())?;
    assert_eq!(
        monitor.occupancy_summary(),
        "truck_space_1: free | truck_space_2: occupied | truck_space_3: free"
    );
    assert_eq!(monitor.warning_summary(), "No warnings");

    monitor.step(source.as_mut(), Instant::now())?;
    assert!(monitor.detections().is_empty());
    assert_eq!(
        monitor.occupancy_summary(),
        "truck_space_1: free | truck_space_2: free | truck_space_3: free"
    );
    Ok(())
}
