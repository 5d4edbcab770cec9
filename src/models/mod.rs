pub mod action;
pub mod chat;
pub mod history;
pub mod intent;
pub mod pattern;
pub mod settings;

pub use action::*;
pub use chat::*;
pub use history::*;
pub use intent::*;
pub use pattern::*;
pub use settings::*;
