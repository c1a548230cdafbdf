use liverunner::host::trace;
use liverunner::{
    CallSite, ErrorKind, ExecutionSession, ExtensionApplication, HostRegistry, LiveRunner, MethodRef,
    NodeKind, RunnerConfig, RunnerError, RunnerEvent, UpdateListener, UpdateSummary, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn runner() -> LiveRunner {
    LiveRunner::new(RunnerConfig::default()).unwrap()
}

#[derive(Default)]
struct Recorder {
    completed: Mutex<Vec<UpdateSummary>>,
    failed: Mutex<Vec<RunnerError>>,
}

impl UpdateListener for Recorder {
    fn post_graph_update(&self, summary: &UpdateSummary) {
        self.completed.lock().push(summary.clone());
    }

    fn update_failed(&self, error: &RunnerError) {
        self.failed.lock().push(error.clone());
    }
}

#[test]
fn test_sqrt_inspects_to_two() {
    let runner = runner();
    runner.import_libraries(&["Math"]).unwrap();
    runner.update("x = Math.Sqrt(4);").unwrap();
    assert_eq!(runner.inspect("x").unwrap(), Value::Double(2.0));
}

#[test]
fn test_reinitialize_forgets_names() {
    let runner = runner();
    runner.update("a = 1; b = a + 1;").unwrap();
    assert_eq!(runner.inspect("b").unwrap(), Value::Int(2));

    runner.reinitialize();
    for name in ["a", "b"] {
        let err = runner.inspect(name).unwrap_err();
        assert!(err.is_unknown_identifier(), "{} should be unknown: {}", name, err);
    }
    assert_eq!(runner.dump_state(), "// empty\n");
}

#[test]
fn test_reset_and_import_gives_same_symbols() {
    let runner = runner();
    let first = runner.import_libraries(&["Math"]).unwrap();
    runner.update("y = Math.Abs(-3);").unwrap();

    let second = runner.reset_and_import(&["Math"]).unwrap();
    assert_eq!(first, second);
    assert!(runner.inspect("y").unwrap_err().is_unknown_identifier());
    assert_eq!(runner.symbols(), second);
}

#[test]
fn test_import_unknown_library_changes_nothing() {
    let runner = runner();
    let err = runner.import_libraries(&["Math", "Nope"]).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::LibraryNotFound {
            name: "Nope".into()
        }
    );
    assert!(runner.symbols().is_empty());
    assert!(runner.snapshot().libraries.is_empty());
}

#[test]
fn test_function_args() {
    let runner = runner();
    runner.import_libraries(&["Geometry"]).unwrap();

    let origin = runner.function_args(&MethodRef::member("Point", "Origin")).unwrap();
    assert!(origin.is_empty());

    let by_coordinates = runner
        .function_args(&MethodRef::member("Point", "ByCoordinates"))
        .unwrap();
    let names: Vec<_> = by_coordinates.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y", "z"]);

    assert!(runner.function_args(&MethodRef::member("Point", "Nope")).is_err());
}

#[test]
fn test_faults_keep_other_values() {
    let runner = runner();
    let err = runner.update("good = 10; bad = good % 0; later = good * 2;").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::EngineFault { .. }));

    assert_eq!(runner.inspect("good").unwrap(), Value::Int(10));
    assert_eq!(runner.inspect("later").unwrap(), Value::Int(20));
    assert!(matches!(
        runner.inspect("bad").unwrap_err().kind,
        ErrorKind::EngineFault { .. }
    ));
}

#[test]
fn test_syntax_error_leaves_state_alone() {
    let runner = runner();
    runner.update("a = 1;").unwrap();
    let before = runner.dump_state();

    let err = runner.update("a = 2; b = (;").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Syntax { .. }));
    assert_eq!(runner.dump_state(), before);
    assert_eq!(runner.inspect("a").unwrap(), Value::Int(1));
}

#[test]
fn test_deeply_nested_update_is_rejected() {
    let runner = runner();
    runner.update("a = 1;").unwrap();

    let parens = format!("x = {}1{};", "(".repeat(50_000), ")".repeat(50_000));
    let err = runner.update(&parens).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Syntax { .. }), "{}", err);

    let chain = format!("y = {};", vec!["a"; 50_000].join(" + "));
    assert!(matches!(runner.update(&chain).unwrap_err().kind, ErrorKind::Syntax { .. }));

    assert!(runner.inspect("x").unwrap_err().is_unknown_identifier());
    assert_eq!(runner.inspect("a").unwrap(), Value::Int(1));
}

#[test]
fn test_built_nodes_through_bridge() {
    let registry = Arc::new(HostRegistry::new());
    let point_class = registry.register("Point");

    let runner = LiveRunner::builder(RunnerConfig::default())
        .bridge(registry.clone())
        .build()
        .unwrap();
    runner.import_libraries(&["Geometry"]).unwrap();

    let site = CallSite::new(NodeKind::Static, "ByCoordinates")
        .instance(point_class)
        .inputs(["3", "4", "0"]);
    let point = runner.build_ast(&site).unwrap();
    assert_eq!(point.name(), "var1");
    assert_eq!(point.code(), "Point.ByCoordinates(3, 4, 0)");
    runner.update_graph(&point).unwrap();

    let handle = registry.register(point.name());
    let x = runner
        .build_ast(&CallSite::new(NodeKind::Property, "X").instance(handle))
        .unwrap();
    assert_eq!(x.code(), "var1.X");
    runner.update_graph(&x).unwrap();
    assert_eq!(runner.inspect("var2").unwrap(), Value::Double(3.0));

    // moving the point re-evaluates the property node
    runner.update("var1 = Point.ByCoordinates(5, 0, 0);").unwrap();
    assert_eq!(runner.inspect("var2").unwrap(), Value::Double(5.0));
}

#[test]
fn test_array_node() {
    let runner = runner();
    let node = runner.build_array_node(&["1", "2", "3"]).unwrap();
    assert_eq!(node.code(), "[1,2,3]");

    let reparsed = liverunner::parse_expression(node.code()).unwrap();
    assert_eq!(&reparsed, node.expr());

    runner.update_graph(&node).unwrap();
    assert_eq!(
        runner.inspect(node.name()).unwrap(),
        Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn test_stale_node_after_reinitialize() {
    let runner = runner();
    let node = runner.build_array_node(&["1"]).unwrap();
    runner.reinitialize();

    let err = runner.update_graph(&node).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidArgument { .. }));
    assert!(runner.inspect(node.name()).is_err());
}

#[test]
fn test_async_update_from_plain_thread() {
    let runner = runner();
    let first = runner.update_async("a = 1;");
    let second = runner.update_async("b = a + 41;");
    assert!(second.id() > first.id());

    let summary = second.wait_blocking().unwrap();
    assert_eq!(summary.defined, vec!["b"]);
    assert!(first.wait_blocking().is_ok());
    assert_eq!(runner.inspect("b").unwrap(), Value::Int(42));
}

#[tokio::test]
async fn test_async_updates_apply_in_order() {
    let runner = runner();
    let tickets: Vec<_> = (1..=5)
        .map(|i| runner.update_async(format!("v = {};", i)))
        .collect();

    for ticket in tickets {
        ticket.await.unwrap();
    }
    assert_eq!(runner.inspect("v").unwrap(), Value::Int(5));
}

#[tokio::test]
async fn test_listener_and_events() {
    let runner = runner();
    let recorder = Arc::new(Recorder::default());
    let listener: Arc<dyn UpdateListener> = recorder.clone();
    runner.set_listener(&listener);
    let events = runner.subscribe();

    let ok = runner.update_async("n = 3;");
    let ok_id = ok.id();
    ok.await.unwrap();

    let bad = runner.update_async("m = unknown_name + 1;");
    let bad_id = bad.id();
    assert!(bad.await.unwrap_err().is_unknown_identifier());

    assert_eq!(recorder.completed.lock().len(), 1);
    assert_eq!(recorder.completed.lock()[0].defined, vec!["n"]);
    assert_eq!(recorder.failed.lock().len(), 1);

    match events.try_recv().unwrap() {
        RunnerEvent::UpdateCompleted { ticket, summary } => {
            assert_eq!(ticket, ok_id);
            assert_eq!(summary.evaluated, vec!["n"]);
        }
        other => panic!("unexpected event {:?}", other),
    }
    match events.try_recv().unwrap() {
        RunnerEvent::UpdateFailed { ticket, .. } => assert_eq!(ticket, bad_id),
        other => panic!("unexpected event {:?}", other),
    }

    // the runner only holds the listener weakly
    drop(listener);
    drop(recorder);
    runner.update_async("n = 4;").await.unwrap();
}

#[tokio::test]
async fn test_full_mailbox_fails_fast() {
    let mut config = RunnerConfig::default();
    config.runner.mailbox_size = 1;
    let runner = LiveRunner::new(config).unwrap();

    // the worker shares this current-thread runtime and has not run yet
    let queued = runner.update_async("a = 1;");
    let rejected = runner.update_async("b = 2;");

    let err = rejected.await.unwrap_err();
    assert!(err.to_string().contains("mailbox full"));
    queued.await.unwrap();
    assert!(runner.inspect("b").is_err());
}

struct TraceRecorder {
    seen: Mutex<Vec<Option<u32>>>,
}

impl ExtensionApplication for TraceRecorder {
    fn on_begin_execution(&self, _session: &ExecutionSession) {
        let value = trace::trace_data("element").and_then(|v| v.downcast_ref::<u32>().copied());
        self.seen.lock().push(value);
    }
}

#[test]
fn test_trace_data_follows_async_update() {
    let recorder = Arc::new(TraceRecorder {
        seen: Mutex::new(Vec::new()),
    });
    let runner = LiveRunner::builder(RunnerConfig::default())
        .extension(recorder.clone())
        .build()
        .unwrap();

    trace::set_trace_data("element", Arc::new(7u32));
    let ticket = runner.update_async("t = 1;");
    trace::clear_trace_data("element");
    ticket.wait_blocking().unwrap();

    runner.update_async("t = 2;").wait_blocking().unwrap();
    assert_eq!(*recorder.seen.lock(), vec![Some(7), None]);
}

#[test]
fn test_metrics_summary() {
    let runner = runner();
    runner.update("a = 1;").unwrap();
    runner.update("a = 1;").unwrap();
    let summary = runner.metrics().summary();
    assert_eq!(summary.timings["update"].count, 2);
    assert_eq!(summary.counters["skipped_definitions"], 1);
}
