//! Container wiring: configuration-driven init, lifecycle ordering, chained
//! loads with cycle detection, and scheduler-from-config composition.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Map, Value};

use cadre::{
    Component, ComponentFactory, ComponentState, Container, LoggerFactory, MemConfigSource,
    Runtime, ScheduleSpec, Scheduler, SchedulerFactory, StateCell,
};

type EventLog = Arc<Mutex<Vec<String>>>;

/// Component that records its lifecycle transitions into a shared log.
struct Recorder {
    tag: String,
    log: EventLog,
    state: StateCell,
}

impl Component for Recorder {
    fn start(&self) {
        self.log.lock().unwrap().push(format!("start:{}", self.tag));
        self.state.set(ComponentState::Running);
    }

    fn stop(&self) {
        self.log.lock().unwrap().push(format!("stop:{}", self.tag));
        self.state.set(ComponentState::Stopped);
    }

    fn state(&self) -> ComponentState {
        self.state.get()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RecorderFactory {
    log: EventLog,
}

impl ComponentFactory for RecorderFactory {
    fn component_type(&self) -> &'static str {
        "recorder"
    }

    fn configure(
        &self,
        _container: &Container,
        config: &Map<String, Value>,
    ) -> Option<Arc<dyn Component>> {
        let tag = config.get("Tag").and_then(Value::as_str)?;
        Some(Arc::new(Recorder {
            tag: tag.to_string(),
            log: Arc::clone(&self.log),
            state: StateCell::new(),
        }))
    }
}

/// Component type that resolves a named dependency at configure time.
struct LinkedFactory;

impl ComponentFactory for LinkedFactory {
    fn component_type(&self) -> &'static str {
        "linked"
    }

    fn configure(
        &self,
        container: &Container,
        config: &Map<String, Value>,
    ) -> Option<Arc<dyn Component>> {
        if let Some(needs) = config.get("Needs").and_then(Value::as_str) {
            container.find_component(needs)?;
        }
        Some(Arc::new(Recorder {
            tag: "linked".to_string(),
            log: Arc::new(Mutex::new(Vec::new())),
            state: StateCell::new(),
        }))
    }
}

fn recorder_runtime(log: &EventLog, source: MemConfigSource) -> Arc<Runtime> {
    let rt = Runtime::new(Arc::new(source));
    rt.register_factory(Arc::new(RecorderFactory {
        log: Arc::clone(log),
    }));
    rt
}

/// Components start in declaration order and stop in exactly the reverse.
#[test]
fn stop_order_is_reverse_of_start_order() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let source = MemConfigSource::new()
        .with("edge", r#"{"A": "recorder", "B": "recorder", "C": "recorder"}"#)
        .with("A", r#"{"Tag": "A"}"#)
        .with("B", r#"{"Tag": "B"}"#)
        .with("C", r#"{"Tag": "C"}"#);
    let rt = recorder_runtime(&log, source);

    let cont = rt.create_container("edge").unwrap();
    cont.init().unwrap();
    cont.start();
    cont.stop();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["start:A", "start:B", "start:C", "stop:C", "stop:B", "stop:A"]
    );
}

/// Init skips unknown types and malformed component configs but keeps going.
#[test]
fn init_skips_failures_and_continues() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let source = MemConfigSource::new()
        .with(
            "edge",
            r#"{"A": "recorder", "ghost": "no-such-type", "broken": "recorder", "B": "recorder"}"#,
        )
        .with("A", r#"{"Tag": "A"}"#)
        .with("broken", r#"not json at all"#)
        .with("B", r#"{"Tag": "B"}"#);
    let rt = recorder_runtime(&log, source);

    let cont = rt.create_container("edge").unwrap();
    cont.init().unwrap();

    let names: Vec<String> = cont.list_components().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
}

/// A missing container document is an init error.
#[test]
fn init_without_container_config_errors() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let rt = recorder_runtime(&log, MemConfigSource::new());
    let cont = rt.create_container("edge").unwrap();
    assert!(cont.init().is_err());
}

/// find_component loads a declared-but-uninitialised component on demand,
/// pulling its dependency chain in first.
#[test]
fn find_component_chains_dependency_loads() {
    let rt = Runtime::new(Arc::new(
        MemConfigSource::new()
            .with("edge", r#"{"X": "linked", "Y": "linked"}"#)
            .with("X", r#"{"Needs": "Y"}"#)
            .with("Y", r#"{}"#),
    ));
    rt.register_factory(Arc::new(LinkedFactory));

    let cont = rt.create_container("edge").unwrap();
    // No init: everything loads through find_component.
    assert!(cont.find_component("X").is_some());

    let names: Vec<String> = cont.list_components().into_iter().map(|c| c.name).collect();
    // The dependency was created first, so it also starts first.
    assert_eq!(names, vec!["Y".to_string(), "X".to_string()]);
}

/// A cyclic dependency chain aborts the load and creates nothing.
#[test]
fn cyclic_component_reference_fails_cleanly() {
    let rt = Runtime::new(Arc::new(
        MemConfigSource::new()
            .with("edge", r#"{"X": "linked", "Y": "linked"}"#)
            .with("X", r#"{"Needs": "Y"}"#)
            .with("Y", r#"{"Needs": "X"}"#),
    ));
    rt.register_factory(Arc::new(LinkedFactory));

    let cont = rt.create_container("edge").unwrap();
    assert!(cont.find_component("X").is_none());
    assert!(cont.list_components().is_empty());
}

/// delete_component stops a running component before releasing it.
#[test]
fn delete_component_stops_first() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let source = MemConfigSource::new()
        .with("edge", r#"{"A": "recorder"}"#)
        .with("A", r#"{"Tag": "A"}"#);
    let rt = recorder_runtime(&log, source);

    let cont = rt.create_container("edge").unwrap();
    cont.init().unwrap();
    cont.start();

    assert!(cont.delete_component("A"));
    assert!(!cont.delete_component("A"));
    assert_eq!(*log.lock().unwrap(), vec!["start:A", "stop:A"]);
    assert!(cont.find_component("A").is_some(), "reloadable after delete");
}

/// add_component creates from caller-supplied configuration text.
#[test]
fn add_component_from_inline_config() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let rt = recorder_runtime(&log, MemConfigSource::new().with("edge", r#"{}"#));

    let cont = rt.create_container("edge").unwrap();
    cont.init().unwrap();
    assert!(cont.add_component("recorder", "late", r#"{"Tag": "late"}"#));
    assert!(!cont.add_component("no-such-type", "x", r#"{}"#));

    cont.start();
    assert_eq!(*log.lock().unwrap(), vec!["start:late"]);
}

/// Environment variables substitute into configuration before parsing.
#[test]
fn env_substitution_reaches_component_config() {
    std::env::set_var("CADRE_WIRING_TAG", "from-env");
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let source = MemConfigSource::new()
        .with("edge", r#"{"A": "recorder"}"#)
        .with("A", r#"{"Tag": "${CADRE_WIRING_TAG}"}"#);
    let rt = recorder_runtime(&log, source);

    let cont = rt.create_container("edge").unwrap();
    cont.init().unwrap();
    cont.start();
    assert_eq!(*log.lock().unwrap(), vec!["start:from-env"]);
}

/// The directory-backed source resolves `<dir>/<name>.json` documents.
#[test]
fn directory_config_source_wires_a_container() {
    use cadre::DirConfigSource;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("edge.json"),
        r#"{"A": "recorder", "B": "recorder"}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("A.json"), r#"{"Tag": "A"}"#).unwrap();
    std::fs::write(dir.path().join("B.json"), r#"{"Tag": "B"}"#).unwrap();

    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let rt = Runtime::new(Arc::new(DirConfigSource::new(dir.path())));
    rt.register_factory(Arc::new(RecorderFactory {
        log: Arc::clone(&log),
    }));

    let cont = rt.create_container("edge").unwrap();
    cont.init().unwrap();
    cont.start();
    assert_eq!(*log.lock().unwrap(), vec!["start:A", "start:B"]);
}

/// Full composition: logger + scheduler wired from configuration, resolved
/// by name, and dispatching work.
#[test]
fn scheduler_component_from_configuration() {
    let rt = Runtime::new(Arc::new(
        MemConfigSource::new()
            .with("edge", r#"{"log": "logger", "sched": "scheduler"}"#)
            .with("log", r#"{"Level": "warn"}"#)
            .with("sched", r#"{"Logger": "log"}"#),
    ));
    rt.register_factory(Arc::new(LoggerFactory));
    rt.register_factory(Arc::new(SchedulerFactory));

    let cont = rt.create_container("edge").unwrap();
    cont.init().unwrap();

    let names: Vec<String> = cont.list_components().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["log".to_string(), "sched".to_string()]);

    cont.start();

    let component = cont.find_component("sched").expect("scheduler exists");
    let scheduler = component
        .as_any()
        .downcast_ref::<Scheduler>()
        .expect("component is a Scheduler");
    assert_eq!(scheduler.state(), ComponentState::Running);

    let fired = Arc::new(Mutex::new(0u32));
    let fired2 = Arc::clone(&fired);
    let s = scheduler.create(ScheduleSpec::new(move || {
        *fired2.lock().unwrap() += 1;
    }));
    scheduler.add(&s);

    thread::sleep(Duration::from_millis(150));
    assert_eq!(*fired.lock().unwrap(), 1);

    cont.stop();
    assert_eq!(scheduler.state(), ComponentState::Stopped);
    assert!(rt.remove_container("edge"));
}
