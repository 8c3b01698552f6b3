//! Plugins the runtime can add on its own.

pub mod status_bar;
