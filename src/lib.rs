//! Camcookie: a local voice-command dispatcher
//!
//! A key press starts one capture; the recognized phrase is matched against
//! the trigger rules in `commands.json` and the selected action runs, with
//! spoken feedback at each step.

pub mod audio;
pub mod automation;
pub mod capture;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod executor;
pub mod handlers;
pub mod matcher;
pub mod recognizer;
pub mod registry;
pub mod render;
pub mod speech;
#[cfg(feature = "parakeet")]
pub mod transcriber;
pub mod ui;
pub mod vad;
