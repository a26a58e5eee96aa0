pub mod loader;

pub use retrace_core::config as schema;
