use crate::{
    backend::{Placement, WidgetHandle, WidgetSpec},
    error::PluginInitialisationError,
    hooks::{HookId, HookResult},
    plugin::{Plugin, WidgetProducing},
    visualiser::Visualiser,
};

pub const STATUS_BAR: &str = "status_bar";

/// Shows the help text of the current dispatch context, refreshed after
/// initialisation, after every key press and whenever a plugin changes state.
pub struct StatusBar {
    widget: WidgetHandle,
    placement: Placement,
}

impl Default for StatusBar {
    fn default() -> Self {
        Self::at(Placement::cell(1, 0))
    }
}

impl StatusBar {
    pub fn at(placement: Placement) -> Self {
        Self {
            widget: WidgetHandle::new(STATUS_BAR),
            placement,
        }
    }

    pub fn widget(&self) -> &WidgetHandle {
        &self.widget
    }
}

impl Plugin for StatusBar {
    fn name(&self) -> &str {
        STATUS_BAR
    }

    fn on_init(&mut self, visualiser: &Visualiser) -> Result<(), PluginInitialisationError> {
        let weak = visualiser.downgrade();
        let widget = self.widget.clone();
        let refresh = move || -> HookResult {
            if let Some(visualiser) = weak.upgrade() {
                let help = visualiser.current_help();
                visualiser.set_widget_text(&widget, &help);
            }
            Ok(())
        };
        let hooks = visualiser.hooks();
        let id = HookId::named(STATUS_BAR);
        hooks.init_finished.add_hook_with_id(id.clone(), refresh.clone());
        hooks.post_keypress.add_hook_with_id(id.clone(), refresh.clone());
        hooks.plugin_state_changed.add_hook_with_id(id, refresh);
        Ok(())
    }

    fn as_widget_producing(&mut self) -> Option<&mut dyn WidgetProducing> {
        Some(self)
    }
}

impl WidgetProducing for StatusBar {
    fn widgets(&mut self) -> Vec<WidgetSpec> {
        vec![WidgetSpec {
            handle: self.widget.clone(),
            placement: self.placement,
        }]
    }
}
