#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Configuration loading for the Jimi runtime.
//!
//! Agents, commands, and hooks are declared in YAML under layered scopes:
//! built-in defaults, the user scope (`~/.jimi`), and the project scope
//! (`<work_dir>/.jimi`). Later scopes override earlier ones by name.
//! Malformed definitions are fatal at load time.

mod agent;
mod command;
mod error;
mod loader;
mod runner;

pub use agent::{AgentSpec, DEFAULT_MAX_STEPS};
pub use command::CommandSpec;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use runner::CommandSpecRunner;
