pub mod actuator;
pub mod command;
pub mod console;
pub mod error;
pub mod health;
pub mod log_buffer;
pub mod logging;
pub mod settings;
pub mod supervisor;
pub mod transcript;
