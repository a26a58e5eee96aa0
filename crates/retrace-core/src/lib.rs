//! Synchronous core of the recorder and replayer.
//!
//! Everything here works on a [`dom::Document`] built from a page snapshot,
//! so it runs without a browser.

pub mod assembler;
pub mod capture;
pub mod config;
pub mod dom;
pub mod fingerprint;
pub mod resolver;
pub mod selector;
pub mod validator;

pub use capture::{CaptureEngine, Clock, ManualClock, PageEvent, RecorderState, SystemClock};
pub use dom::{Document, ElementKey, NodeId};
pub use fingerprint::{Fingerprint, SelectorBuilder};
pub use resolver::{Resolution, Strategy, Target};
