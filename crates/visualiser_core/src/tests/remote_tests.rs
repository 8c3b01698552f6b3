use super::*;
use crate::{
    key_mapping::KeyMapping,
    modal::BindingSet,
    plugin::{Plugin, Toggleable, Triggerable},
};
use remote_control::RemoteCallError;
use shared::{
    domain::{PluginState, PluginSummary},
    protocol::{RemoteRequest, RemoteResponse},
    surface::execute,
};
use std::time::Duration;

struct Axes {
    bindings: BindingSet,
}

impl Default for Axes {
    fn default() -> Self {
        Self {
            bindings: BindingSet::new().with(KeyMapping::new("a", "toggle axes", || {})),
        }
    }
}

impl Plugin for Axes {
    fn name(&self) -> &str {
        "axes"
    }

    fn as_toggleable(&mut self) -> Option<&mut dyn Toggleable> {
        Some(self)
    }

    fn as_triggerable(&self) -> Option<&dyn Triggerable> {
        Some(self)
    }
}

impl Toggleable for Axes {}

impl Triggerable for Axes {
    fn bindings(&self) -> &BindingSet {
        &self.bindings
    }
}

fn headless_config() -> VisualiserConfig {
    VisualiserConfig {
        title: "Remote".to_string(),
        auto_add_default_plugins: false,
        ..VisualiserConfig::default()
    }
}

fn local_visualiser() -> Visualiser {
    let (backend, _feed) = HeadlessBackend::new();
    let visualiser = Visualiser::new(headless_config(), backend);
    visualiser
        .register_plugin(Axes::default(), &[])
        .expect("register axes");
    visualiser.initialise().expect("initialise");
    visualiser
}

fn value(response: RemoteResponse) -> Value {
    match response {
        RemoteResponse::Value(value) => value,
        other => panic!("expected a value, got {other:?}"),
    }
}

fn error_code(response: RemoteResponse) -> ErrorCode {
    match response {
        RemoteResponse::CarriedError(err) => err.code,
        other => panic!("expected a carried error, got {other:?}"),
    }
}

fn call(name: &str, args: Vec<Value>) -> RemoteRequest {
    RemoteRequest::method_call(name, args)
}

#[test]
fn attributes_report_runtime_state() {
    let mut visualiser = local_visualiser();
    let mut read = |name: &str| value(execute(&mut visualiser, RemoteRequest::attribute_access(name)));

    assert_eq!(read("title"), json!("Remote"));
    assert_eq!(read("alive"), json!(true));
    assert_eq!(read("modal_depth"), json!(0));
    assert!(read("current_help")
        .as_str()
        .expect("help text")
        .contains("Press [a] to toggle axes"));

    let plugins: Vec<PluginSummary> =
        serde_json::from_value(read("plugins")).expect("plugin summaries");
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].name.as_str(), "axes");
    assert_eq!(plugins[0].state, PluginState::On);
    assert!(plugins[0].toggleable && plugins[0].triggerable);
}

#[test]
fn methods_drive_plugins_and_keys() {
    let mut visualiser = local_visualiser();

    let toggled = execute(&mut visualiser, call("toggle_plugin", vec![json!("axes")]));
    assert_eq!(value(toggled), json!(PluginState::Off));
    let pressed = execute(&mut visualiser, call("press_key", vec![json!("a")]));
    assert_eq!(value(pressed), json!(false));

    let mut kwargs = serde_json::Map::new();
    kwargs.insert("name".to_string(), json!("axes"));
    let toggled = execute(
        &mut visualiser,
        RemoteRequest::method_call_with_kwargs("toggle_plugin", Vec::new(), kwargs),
    );
    assert_eq!(value(toggled), json!(PluginState::On));
    let pressed = execute(&mut visualiser, call("press_key", vec![json!("A")]));
    assert_eq!(value(pressed), json!(true));

    let state = execute(&mut visualiser, call("plugin_state", vec![json!("axes")]));
    assert_eq!(value(state), json!("on"));
}

#[test]
fn bad_requests_are_carried_back() {
    let mut visualiser = local_visualiser();

    let cases = [
        (call("explode", vec![]), ErrorCode::UnknownMethod),
        (call("title", vec![]), ErrorCode::InvalidArguments),
        (call("plugin_state", vec![]), ErrorCode::InvalidArguments),
        (call("plugin_state", vec![json!("camera")]), ErrorCode::NotFound),
        (RemoteRequest::attribute_access("close"), ErrorCode::UnknownAttribute),
        (RemoteRequest::attribute_access("explode"), ErrorCode::UnknownAttribute),
    ];
    for (request, expected) in cases {
        let name = request.name().to_string();
        assert_eq!(
            error_code(execute(&mut visualiser, request)),
            expected,
            "request {name}"
        );
    }
    assert!(visualiser.is_alive());
}

#[test]
fn close_waits_for_the_next_tick() {
    let mut visualiser = local_visualiser();
    assert_eq!(value(execute(&mut visualiser, call("close", vec![]))), Value::Null);
    assert!(visualiser.is_alive());

    visualiser.tick();
    assert!(!visualiser.is_alive());
}

#[test]
fn spawned_visualiser_serves_until_closed() {
    let mut client = spawn_visualiser_thread(headless_config(), |visualiser| {
        visualiser.register_plugin(Axes::default(), &[]).map(|_| ())
    })
    .expect("spawn visualiser");

    assert_eq!(client.title().expect("title"), "Remote");
    assert!(client.alive().expect("alive"));
    assert_eq!(client.toggle_plugin("axes").expect("toggle"), PluginState::Off);
    assert!(!client.press_key("a").expect("press"));
    assert!(matches!(
        client.plugin_state("camera"),
        Err(RemoteCallError::Carried(err)) if err.code == ErrorCode::NotFound
    ));

    client.close().expect("close");
    for _ in 0..1_000 {
        match client.alive() {
            Ok(_) => std::thread::sleep(Duration::from_millis(1)),
            Err(RemoteCallError::Exited) => break,
            Err(other) => panic!("unexpected failure while closing: {other}"),
        }
    }
    assert!(client.is_exited());
    assert!(matches!(client.title(), Err(RemoteCallError::Exited)));
    assert!(!client.is_alive());
    client.close().expect("closing twice is fine");
}

#[test]
fn failing_setup_is_reported_to_the_caller() {
    let result = spawn_visualiser_thread(headless_config(), |visualiser| {
        visualiser.register_plugin(Axes::default(), &["scene"]).map(|_| ())
    });
    assert!(matches!(
        result,
        Err(VisualiserError::Configuration(
            ConfigurationError::MissingDependency { .. }
        ))
    ));
}
