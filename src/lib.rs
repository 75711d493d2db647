//! lmbridge: talk to a locally hosted LLM server through its
//! OpenAI-compatible API.
//!
//! The main entry point is [`interface::LmStudioInterface`], which resolves
//! its model names and server URL from a [`config::ConfigStore`], builds a
//! chat client and a structured-output completer, and exposes them through
//! the shared [`interface::LlmInterface`] trait.
//!
//! # Quick Start
//!
//! ```no_run
//! use lmbridge::prelude::*;
//!
//! # async fn example() -> lmbridge::error::Result<()> {
//! let settings = Settings::from_env()?;
//! let history = History::new();
//! let llm = LmStudioInterface::new(history, None, None, &settings)?;
//! let reply = llm.generate("Hello!").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod interface;
pub mod prelude;
pub mod structured;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
