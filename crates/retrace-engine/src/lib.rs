pub mod artifacts;
pub mod backend;
pub mod config;
pub mod export;
pub mod recorder;
pub mod replay;
pub mod status;
pub mod wait;

pub use backend::{Backend, NavigationResult};
pub use recorder::{spawn_recorder, CapturedEvent, RecorderHandle};
pub use replay::{FailurePolicy, ReplayOptions, ReplayReport, Replayer};
pub use retrace_common::protocol;
pub use status::{log_events, StatusChannel};
