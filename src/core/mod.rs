//! Core engine: settings, client resolution, templating and plan resolution.

pub mod client;
pub mod defaults;
pub mod filters;
pub mod parser;
pub mod pipeline;
pub mod playbook;
pub mod render;
pub mod resolver;
pub mod scaffold;
pub mod settings;
pub mod types;
