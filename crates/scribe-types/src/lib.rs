//! Shared types and error hierarchy for Scribe.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;
mod util;

pub use error::{ApiError, ConfigError, ScribeError, ToolError};
pub use event::{Author, Content, Event, Part};
pub use message::*;
pub use tool::*;
pub use util::{truncate_str, truncate_string};
