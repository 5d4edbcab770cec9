//! JARIS: a desktop assistant that turns typed requests into structured
//! intents and either performs them on the host or hands them to a local
//! chat model.

pub mod commands;
pub mod database;
pub mod models;
pub mod services;
pub mod utils;

pub use models::{Intent, IntentCategory, Mode};
pub use services::interpreter::CommandInterpreter;
