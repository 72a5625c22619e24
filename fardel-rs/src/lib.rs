// Allow uninlined format args for cleaner bail!/anyhow! macros
#![allow(clippy::uninlined_format_args)]
#![doc = include_str!("../README.md")]

pub mod compiler;
pub mod config;
pub mod devserver;
pub mod emit;
pub mod graph;
pub mod pipeline;
pub mod resolver;
pub mod text;
pub mod watch;

#[macro_use]
extern crate lazy_static;

pub use anyhow;
pub use compiler::{BuildReport, Compiler};
pub use config::{Config, Mode, RawConfig};
pub use serde_json;
