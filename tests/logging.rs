//! Checks what the layout pipeline reports through the `log` facade.
//!
//! Lives in its own test binary: the logger is process-global.

use std::sync::{Mutex, Once};

use log::{Level, LevelFilter, Log, Metadata, Record};
use pretty_assertions::assert_eq;
use scene_layout::{layout, LayoutConfig, Point, Relationship, Scene, SceneObject, Size};

struct Capture;

static RECORDS: Mutex<Vec<(Level, String, String)>> = Mutex::new(Vec::new());
static LOGGER: Capture = Capture;
static INSTALL: Once = Once::new();

impl Log for Capture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut records) = RECORDS.lock() {
            records.push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }
    }

    fn flush(&self) {}
}

fn install() {
    INSTALL.call_once(|| {
        log::set_logger(&LOGGER).expect("no other logger in this binary");
        log::set_max_level(LevelFilter::Trace);
    });
}

#[test]
fn test_dangling_relationship_warned_once() {
    install();
    let mut scene = Scene::new(400.0, 300.0);
    for (id, x) in [("lamp", 50.0), ("switch", 250.0)] {
        scene
            .add_object(SceneObject::new(id, Point::new(x, 100.0), Size::new(40.0, 40.0)))
            .unwrap();
    }
    scene.add_relationship(Relationship::new("lamp", "swtich"));

    layout(&mut scene, LayoutConfig::default()).expect("valid config");

    let records = RECORDS.lock().unwrap().clone();
    let warnings: Vec<&(Level, String, String)> = records
        .iter()
        .filter(|(level, _, message)| {
            *level == Level::Warn && message.to_lowercase().contains("unknown")
        })
        .collect();
    assert_eq!(warnings.len(), 1, "{:?}", warnings);
    assert_eq!(warnings[0].2, "Reference to unknown object");

    // The force stage still notes the skipped edge, below warning level
    assert!(records.iter().any(|(level, target, message)| {
        *level == Level::Debug
            && target.ends_with("force")
            && message == "Skipping relationship with unknown endpoint"
    }));
}
