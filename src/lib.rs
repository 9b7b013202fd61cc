// Library surface for the engine, the practice screen and integration tests.
// The binary in main.rs is only argument parsing and terminal plumbing over this.
pub mod accessory;
pub mod achievements;
pub mod app_dirs;
pub mod celebration;
pub mod clock;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod export;
pub mod history;
pub mod journal;
pub mod metrics;
pub mod milestones;
pub mod personal_best;
pub mod pet;
pub mod practice;
pub mod progress;
pub mod runtime;
pub mod session;
pub mod store;
pub mod time_series;
pub mod ui;
pub mod util;

pub use engine::{FeedingResult, Typingotchi};
pub use error::{EngineError, Result};
