//! Plansmith: layered settings and parameter-cascade plan rendering.
//!
//! Resolves which client a command targets, cascades plan parameters from
//! default files, base plans and overrides, and renders plan templates.

pub mod cli;
pub mod core;
pub mod error;
pub mod transport;
