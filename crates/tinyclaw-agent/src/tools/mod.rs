//! Built-in tools and the registry dispatching them.

pub mod base;
pub mod cron;
pub mod filesystem;
pub mod message;
pub mod registry;
pub mod shell;
pub mod skills_tool;
pub mod spawn;
pub mod web;

pub use base::Tool;
pub use registry::ToolRegistry;
