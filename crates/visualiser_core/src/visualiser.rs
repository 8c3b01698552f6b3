use std::{
    cell::{Cell, RefCell},
    future::Future,
    rc::{Rc, Weak},
};

use shared::domain::{PluginName, PluginState};
use tracing::{debug, info, warn};

use crate::{
    backend::{Backend, BackendEvent, ViewRange, WidgetHandle, WidgetSpec},
    config::VisualiserConfig,
    datasource::DataSource,
    dispatcher::{ModalDispatcher, RootContext},
    error::{ConfigurationError, PluginInitialisationError, VisualiserError},
    hooks::HookBus,
    key_mapping::Key,
    modal::ModalControl,
    plugin::{Plugin, PluginHandle, PluginSlot},
    plugins::status_bar::{StatusBar, STATUS_BAR},
    registry::{build_plugin, PluginRegistry},
    scheduler::{Scheduler, ShutdownSignal},
};

struct Inner {
    config: VisualiserConfig,
    hooks: Rc<HookBus>,
    registry: RefCell<PluginRegistry>,
    datasources: RefCell<Vec<Box<dyn DataSource>>>,
    dispatcher: RefCell<ModalDispatcher>,
    scheduler: Scheduler,
    backend: RefCell<Box<dyn Backend>>,
    close_requested: Cell<bool>,
    closing_fired: Cell<bool>,
}

/// The application container. Owns the plugins, the dispatcher, the hooks and
/// the loop; clones are cheap handles to the same runtime and must stay on the
/// thread that created it.
#[derive(Clone)]
pub struct Visualiser {
    inner: Rc<Inner>,
}

/// Non-owning handle for callbacks and tasks stored inside the runtime itself.
#[derive(Clone)]
pub struct WeakVisualiser {
    inner: Weak<Inner>,
}

impl WeakVisualiser {
    pub fn upgrade(&self) -> Option<Visualiser> {
        self.inner.upgrade().map(|inner| Visualiser { inner })
    }
}

impl Visualiser {
    pub fn new(config: VisualiserConfig, backend: impl Backend + 'static) -> Self {
        let scheduler = Scheduler::new(config.tick_interval(), ShutdownSignal::new());
        Self {
            inner: Rc::new(Inner {
                config,
                hooks: Rc::new(HookBus::default()),
                registry: RefCell::new(PluginRegistry::new()),
                datasources: RefCell::new(Vec::new()),
                dispatcher: RefCell::new(ModalDispatcher::new()),
                scheduler,
                backend: RefCell::new(Box::new(backend)),
                close_requested: Cell::new(false),
                closing_fired: Cell::new(false),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakVisualiser {
        WeakVisualiser {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &VisualiserConfig {
        &self.inner.config
    }

    pub fn title(&self) -> &str {
        &self.inner.config.title
    }

    pub fn hooks(&self) -> &HookBus {
        &self.inner.hooks
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn shutdown(&self) -> ShutdownSignal {
        self.inner.scheduler.shutdown().clone()
    }

    pub fn add_task<F>(&self, task: F)
    where
        F: Future<Output = ()> + 'static,
    {
        self.inner.scheduler.add_task(task);
    }

    pub fn register_plugin(
        &self,
        plugin: impl Plugin,
        depends_on: &[&str],
    ) -> Result<PluginHandle, ConfigurationError> {
        let name = PluginName::from(plugin.name());
        self.register_plugin_as(name, plugin, depends_on)
    }

    /// Registers under an explicit name instead of the plugin's own. After
    /// initialisation the plugin is built immediately.
    pub fn register_plugin_as(
        &self,
        name: impl Into<PluginName>,
        plugin: impl Plugin,
        depends_on: &[&str],
    ) -> Result<PluginHandle, ConfigurationError> {
        let slot = PluginSlot::new(name.into(), Box::new(plugin));
        let handle = PluginHandle::new(slot, Rc::clone(&self.inner.hooks));
        let depends_on = depends_on.iter().map(|name| name.to_string()).collect();
        let initialised = {
            let mut registry = self.inner.registry.borrow_mut();
            registry.register(handle.clone(), depends_on)?;
            registry.is_initialised()
        };
        if initialised {
            self.build(&handle);
            self.inner.hooks.init_finished.fire();
        }
        Ok(handle)
    }

    pub fn register_datasource(&self, source: impl DataSource) {
        let mut source: Box<dyn DataSource> = Box::new(source);
        if self.is_initialised() {
            self.start_datasource(source.as_mut());
        }
        self.inner.datasources.borrow_mut().push(source);
    }

    /// Binds a key ahead of the modal system.
    pub fn register_keypress(&self, key: impl Into<Key>, action: impl Fn() + 'static) {
        self.inner
            .dispatcher
            .borrow_mut()
            .register_keypress(key, action);
    }

    pub fn is_initialised(&self) -> bool {
        self.inner.registry.borrow().is_initialised()
    }

    /// Orders and builds every registered plugin. Ordering problems abort
    /// before anything is built; a single plugin failing to build does not.
    pub fn initialise(&self) -> Result<(), ConfigurationError> {
        if self.is_initialised() {
            return Ok(());
        }
        if self.inner.config.auto_add_default_plugins
            && !self.inner.registry.borrow().contains(STATUS_BAR)
        {
            self.register_plugin(StatusBar::default(), &[])?;
        }

        let order = self.inner.registry.borrow_mut().resolve()?;
        self.start_datasources();
        for handle in &order {
            self.build(handle);
        }

        let failed = self.inner.registry.borrow().failures().len();
        info!(plugins = order.len(), failed, "visualiser initialised");
        self.inner.hooks.init_finished.fire();
        Ok(())
    }

    fn build(&self, handle: &PluginHandle) {
        match build_plugin(handle, self) {
            Ok(()) => self.inner.registry.borrow_mut().record_built(handle.name()),
            Err(failure) => self.inner.registry.borrow_mut().record_failure(failure),
        }
    }

    fn start_datasources(&self) {
        let mut sources = std::mem::take(&mut *self.inner.datasources.borrow_mut());
        for source in &mut sources {
            self.start_datasource(source.as_mut());
        }
        let mut current = self.inner.datasources.borrow_mut();
        let registered_meanwhile = std::mem::replace(&mut *current, sources);
        current.extend(registered_meanwhile);
    }

    fn start_datasource(&self, source: &mut dyn DataSource) {
        debug!(source = source.name(), "starting data source");
        let started = source
            .on_init(self)
            .and_then(|()| source.construct(self));
        if let Err(failure) = started {
            self.inner.registry.borrow_mut().record_failure(failure);
        }
    }

    pub fn plugin(&self, name: &str) -> Result<PluginHandle, ConfigurationError> {
        self.inner.registry.borrow().lookup(name)
    }

    /// Every plugin in registration order.
    pub fn plugins(&self) -> Vec<PluginHandle> {
        self.inner.registry.borrow().handles()
    }

    pub fn build_order(&self) -> Vec<PluginName> {
        self.inner.registry.borrow().built().to_vec()
    }

    pub fn plugin_failures(&self) -> Vec<PluginInitialisationError> {
        self.inner.registry.borrow().failures().to_vec()
    }

    pub fn toggle_plugin(&self, name: &str) -> Result<PluginState, VisualiserError> {
        self.plugin(name)?.toggle()
    }

    pub fn root_context(&self) -> RootContext {
        RootContext::from_bindings(
            self.plugins()
                .iter()
                .flat_map(|handle| handle.root_bindings()),
        )
    }

    /// Dispatches one key press and fires `post_keypress` whatever the
    /// outcome. Returns whether anything matched.
    pub fn press_key(&self, key: &str) -> bool {
        let resolution = self
            .inner
            .dispatcher
            .borrow_mut()
            .resolve(key, || self.root_context());
        let matched = match resolution {
            Ok(resolution) => {
                if let Some(action) = resolution.action() {
                    action();
                }
                resolution.matched()
            }
            Err(err) => {
                warn!(key = %key, error = %err, "key dispatch failed");
                false
            }
        };
        self.inner.hooks.post_keypress.fire();
        matched
    }

    pub fn push_modal(&self, modal: Rc<ModalControl>) -> Result<(), ConfigurationError> {
        self.inner.dispatcher.borrow_mut().push(modal)
    }

    pub fn modal_depth(&self) -> usize {
        self.inner.dispatcher.borrow().depth()
    }

    pub fn current_help(&self) -> String {
        self.inner
            .dispatcher
            .borrow()
            .help_text(|| self.root_context())
    }

    /// Runs the guarded update of every ON plugin.
    pub fn interval_update(&self) {
        for handle in self.plugins() {
            handle.update(false);
        }
    }

    pub fn mount_widget(&self, widget: &WidgetSpec) -> anyhow::Result<()> {
        self.inner.backend.borrow_mut().mount_widget(widget)
    }

    pub fn set_widget_text(&self, handle: &WidgetHandle, text: &str) {
        self.inner
            .backend
            .borrow_mut()
            .set_widget_text(handle, text);
    }

    pub fn set_range(&self, range: ViewRange) {
        self.inner.backend.borrow_mut().set_range(range);
    }

    pub fn is_alive(&self) -> bool {
        !self.inner.scheduler.shutdown().is_closing()
    }

    /// Closes on the next tick, so whatever is running now (a remote
    /// request, say) can finish answering first.
    pub fn request_close(&self) {
        info!("close requested");
        self.inner.close_requested.set(true);
    }

    /// Fires the closing hooks once and stops the loop.
    pub fn close(&self) {
        if self.inner.closing_fired.replace(true) {
            return;
        }
        info!(title = %self.title(), "closing visualiser");
        self.inner.hooks.application_closing.fire();
        self.inner.scheduler.shutdown().trigger();
    }

    /// One loop iteration without the suspension: pump backend events,
    /// update plugins, fire the periodic tick.
    pub fn tick(&self) {
        if self.inner.close_requested.get() {
            self.close();
        }
        let events = self.inner.backend.borrow_mut().process_events();
        for event in events {
            match event {
                BackendEvent::KeyPress(key) => {
                    self.press_key(&key);
                }
                BackendEvent::Close => self.close(),
            }
        }
        if !self.is_alive() {
            return;
        }
        self.interval_update();
        self.inner.hooks.periodic_tick.fire();
    }

    /// Initialises if needed and runs the cooperative loop until closed.
    pub fn run(&self) -> Result<(), VisualiserError> {
        self.initialise()?;
        let this = self.clone();
        self.inner.scheduler.block_on(async move {
            while this.is_alive() {
                this.tick();
                if !this.is_alive() {
                    break;
                }
                this.inner.scheduler.yield_now().await;
            }
        })?;
        if !self.inner.closing_fired.get() {
            warn!("loop stopped by a bare shutdown signal; closing hooks did not fire");
        }
        Ok(())
    }
}
