use std::{cell::Cell, rc::Rc, thread, time::Duration};

use crossbeam_channel::bounded;
use remote_control::{connect, EndpointAddress, RemoteCallError};
use visualiser_core::{
    plugin::{Toggleable, Triggerable},
    Binding, BindingSet, HeadlessBackend, KeyMapping, ModalControl, Plugin, PluginState,
    RemoteControlSource, Visualiser, VisualiserConfig,
};

struct Layer {
    name: &'static str,
    bindings: BindingSet,
}

impl Layer {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            bindings: BindingSet::new(),
        }
    }
}

impl Plugin for Layer {
    fn name(&self) -> &str {
        self.name
    }

    fn as_toggleable(&mut self) -> Option<&mut dyn Toggleable> {
        Some(self)
    }

    fn as_triggerable(&self) -> Option<&dyn Triggerable> {
        Some(self)
    }
}

impl Toggleable for Layer {}

impl Triggerable for Layer {
    fn bindings(&self) -> &BindingSet {
        &self.bindings
    }
}

#[test]
fn dependent_plugins_toggle_without_reconstruction_acceptance() {
    let (backend, _feed) = HeadlessBackend::new();
    let visualiser = Visualiser::new(VisualiserConfig::default(), backend);
    let p2 = visualiser
        .register_plugin(Layer::new("P2"), &["P1"])
        .expect("register P2");
    visualiser
        .register_plugin(Layer::new("P1"), &[])
        .expect("register P1");
    visualiser.initialise().expect("initialise");

    let order: Vec<String> = visualiser
        .build_order()
        .iter()
        .map(ToString::to_string)
        .collect();
    let p1_at = order.iter().position(|name| name == "P1").expect("P1 built");
    let p2_at = order.iter().position(|name| name == "P2").expect("P2 built");
    assert!(p1_at < p2_at);

    visualiser.toggle_plugin("P2").expect("toggle off");
    visualiser.toggle_plugin("P2").expect("toggle on");
    assert_eq!(p2.state(), PluginState::On);
    assert_eq!(p2.construct_calls(), 1);
    assert!(visualiser.plugin_failures().is_empty());
}

#[test]
fn socket_client_drives_a_running_visualiser_acceptance() {
    let (address_tx, address_rx) = bounded(1);
    let runner = thread::spawn(move || {
        let (backend, _feed) = HeadlessBackend::new();
        let config = VisualiserConfig {
            title: "Acceptance".to_string(),
            ..VisualiserConfig::default()
        };
        let visualiser = Visualiser::new(config, backend);

        let resets = Rc::new(Cell::new(0));
        let reset_count = Rc::clone(&resets);
        let camera = ModalControl::named(
            "c",
            "camera",
            [Binding::from(KeyMapping::new("r", "reset view", move || {
                reset_count.set(reset_count.get() + 1)
            }))],
        )
        .expect("camera modal");
        let mut view = Layer::new("view");
        view.bindings.add(camera);
        visualiser.register_plugin(view, &[]).expect("register view");

        let address = "tcp://127.0.0.1:0"
            .parse::<EndpointAddress>()
            .expect("address");
        visualiser.register_datasource(
            RemoteControlSource::listening(address).report_address_to(address_tx),
        );
        visualiser.run().expect("run");
        resets.get()
    });

    let address = address_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("endpoint bound");
    let mut client = connect(&address).expect("connect");

    assert_eq!(client.title().expect("title"), "Acceptance");
    let names: Vec<String> = client
        .plugins()
        .expect("plugins")
        .into_iter()
        .map(|summary| summary.name.to_string())
        .collect();
    assert_eq!(names, ["view", "status_bar"]);

    assert!(client.press_key("c").expect("enter camera"));
    assert_eq!(client.modal_depth().expect("depth"), 1);
    assert!(client
        .current_help()
        .expect("help")
        .starts_with(">>>>>  camera"));
    assert!(client.press_key("r").expect("reset"));
    assert!(client.press_key("q").expect("leave camera"));
    assert_eq!(client.modal_depth().expect("depth"), 0);

    client.close().expect("close");
    for _ in 0..1_000 {
        match client.alive() {
            Ok(_) => thread::sleep(Duration::from_millis(1)),
            Err(RemoteCallError::Exited) => break,
            Err(other) => panic!("unexpected failure while closing: {other}"),
        }
    }
    assert!(client.is_exited());
    assert_eq!(runner.join().expect("visualiser thread"), 1);
}
