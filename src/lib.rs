//! quark_pan - A CLI tool for saving, downloading and sharing Quark Drive files.
//!
//! This library provides functionality to:
//! - Save the contents of share links into your own drive
//! - Download shares you own to the local filesystem
//! - Create folders and choose where saved shares land
//! - Create share links for many drive folders at once
//!
//! # Example
//!
//! ```no_run
//! use quark_pan::{LoginCookies, PollConfig, QuarkClient, RunContext, StateStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = StateStore::default();
//!     let cookies = LoginCookies::from_file(store.cookie_path())?;
//!     let client = QuarkClient::new(&cookies)?;
//!     let destination = store.load_save_dir()?;
//!
//!     let ctx = RunContext::new(client, store, destination, PollConfig::default());
//!     let outcome = ctx.transfer("https://pan.quark.cn/s/abc123").await?;
//!     println!("{:?}", outcome);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod pagination;
pub mod poller;
pub mod url_parser;
pub mod walker;
pub mod workflow;

// Re-exports for convenience
pub use auth::LoginCookies;
pub use client::{Endpoints, QuarkClient};
pub use config::StateStore;
pub use error::{QuarkError, Result};
pub use models::{SaveDirectoryConfig, ShareEntry, ShareOptions, TaskResult};
pub use poller::PollConfig;
pub use url_parser::{extract_folder_id, parse_share_url};
pub use workflow::{RunContext, TransferOutcome};
