use super::*;
use std::cell::RefCell;

type Log = Rc<RefCell<Vec<&'static str>>>;

fn mapping(key: &str, label: &'static str, log: &Log) -> KeyMapping {
    let log = Rc::clone(log);
    KeyMapping::new(key, label, move || log.borrow_mut().push(label))
}

fn press(dispatcher: &mut ModalDispatcher, key: &str, root: &RootContext) -> Resolution {
    let resolution = dispatcher
        .resolve(key, || root.clone())
        .expect("resolve");
    if let Some(action) = resolution.action() {
        action();
    }
    resolution
}

#[test]
fn first_matching_root_mapping_wins() {
    let log = Log::default();
    let root = RootContext::from_bindings([
        Binding::from(mapping("a", "first", &log)),
        Binding::from(mapping("A", "second", &log)),
    ]);
    let mut dispatcher = ModalDispatcher::new();

    assert!(press(&mut dispatcher, "a", &root).matched());
    assert!(!press(&mut dispatcher, "x", &root).matched());
    assert_eq!(*log.borrow(), ["first"]);
}

#[test]
fn direct_keys_take_priority_over_modals() {
    let log = Log::default();
    let root = RootContext::from_bindings([Binding::from(mapping("r", "root", &log))]);
    let mut dispatcher = ModalDispatcher::new();
    let direct_log = Rc::clone(&log);
    dispatcher.register_keypress("r", move || direct_log.borrow_mut().push("direct"));

    assert!(matches!(
        press(&mut dispatcher, "R", &root),
        Resolution::Direct(_)
    ));
    assert_eq!(*log.borrow(), ["direct"]);
}

#[test]
fn entering_and_leaving_nested_modals() {
    let log = Log::default();
    let zoom = ModalControl::named("z", "zoom", [Binding::from(mapping("i", "zoom in", &log))])
        .expect("zoom");
    let camera = ModalControl::named(
        "c",
        "camera",
        [
            Binding::from(mapping("r", "reset", &log)),
            Binding::from(Rc::clone(&zoom)),
        ],
    )
    .expect("camera");
    let root = RootContext::from_bindings([Binding::from(Rc::clone(&camera))]);
    let mut dispatcher = ModalDispatcher::new();

    assert!(matches!(
        press(&mut dispatcher, "c", &root),
        Resolution::Entered(_)
    ));
    press(&mut dispatcher, "z", &root);
    assert_eq!(dispatcher.depth(), 2);
    assert!(!press(&mut dispatcher, "r", &root).matched());
    press(&mut dispatcher, "i", &root);

    assert!(matches!(
        press(&mut dispatcher, "q", &root),
        Resolution::Exited(_)
    ));
    let current = dispatcher.current().expect("camera entered");
    assert!(Rc::ptr_eq(current, &camera));
    press(&mut dispatcher, "r", &root);
    press(&mut dispatcher, "Q", &root);
    assert!(dispatcher.at_root());
    assert_eq!(*log.borrow(), ["zoom in", "reset"]);
}

#[test]
fn quit_at_root_is_an_ordinary_key() {
    let log = Log::default();
    let root = RootContext::from_bindings([Binding::from(mapping("q", "quit app", &log))]);
    let mut dispatcher = ModalDispatcher::new();

    assert!(matches!(
        press(&mut dispatcher, "q", &root),
        Resolution::Invoke(_)
    ));
    assert_eq!(*log.borrow(), ["quit app"]);
}

#[test]
fn pushing_an_entered_modal_again_fails() {
    let modal = ModalControl::new("m", Vec::<Binding>::new()).expect("modal");
    let mut dispatcher = ModalDispatcher::new();
    dispatcher.push(Rc::clone(&modal)).expect("first push");

    assert_eq!(
        dispatcher.push(Rc::clone(&modal)).expect_err("second push"),
        ConfigurationError::ModalAlreadyActive {
            modal: "[m]".to_string()
        }
    );
    assert_eq!(dispatcher.depth(), 1);

    let twin = ModalControl::new("m", Vec::<Binding>::new()).expect("twin");
    dispatcher.push(twin).expect("distinct instance");
    assert_eq!(dispatcher.depth(), 2);
}

#[test]
fn root_help_lists_mappings_then_modals() {
    let log = Log::default();
    let camera = ModalControl::named("c", "camera", Vec::<Binding>::new()).expect("camera");
    let root = RootContext::from_bindings([
        Binding::from(Rc::clone(&camera)),
        Binding::from(mapping("a", "toggle axes", &log)),
        Binding::from(KeyMapping::display_only("frame 12")),
    ]);

    assert_eq!(
        root.help_text(),
        "~~~~~~~~~~ Root Directory ~~~~~~~~~\n\n\
         Press [a] to toggle axes\n\
         frame 12\n\
         \n\
         Press [c] to control Modal camera"
    );
}

#[test]
fn modal_help_shows_the_breadcrumb() {
    let log = Log::default();
    let zoom = ModalControl::named("z", "zoom", [Binding::from(mapping("i", "zoom in", &log))])
        .expect("zoom");
    let camera =
        ModalControl::named("c", "camera", [Binding::from(Rc::clone(&zoom))]).expect("camera");
    let mut dispatcher = ModalDispatcher::new();
    dispatcher.push(camera).expect("camera");
    dispatcher.push(zoom).expect("zoom");

    assert_eq!(
        dispatcher.help_text(RootContext::default),
        ">>>>>  camera > zoom\n\nPress [i] to zoom in\n\n\n\nPress [q] to exit current modal"
    );
}

#[test]
fn root_context_is_only_built_at_root() {
    let modal = ModalControl::new("m", Vec::<Binding>::new()).expect("modal");
    let mut dispatcher = ModalDispatcher::new();
    dispatcher.push(modal).expect("push");

    let resolution = dispatcher
        .resolve("x", || panic!("root context requested inside a modal"))
        .expect("resolve");
    assert!(!resolution.matched());
}
