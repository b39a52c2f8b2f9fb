pub mod scripted_backend;
pub mod scripted_runner;

pub use scripted_backend::ScriptedBackend;
pub use scripted_runner::ScriptedRunner;
