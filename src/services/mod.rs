pub mod assistant;
pub mod catalog;
pub mod executor;
pub mod interpreter;
pub mod ollama;
