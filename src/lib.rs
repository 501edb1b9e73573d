#![allow(unused_assignments)]

//! # Bringup
//!
//! Modular initialization of infrastructure resources with dependency ordering.
//!
//! ## Features
//!
//! - **Initialization Units**: every resource is brought up in three ordered steps
//!   (validate configuration, test connection, perform initialization)
//! - **Dependency Ordering**: units declare what they depend on; cycles are rejected the
//!   moment the closing edge is added
//! - **Dependency Gating**: a unit only starts once all of its dependencies are initialized
//! - **Built-in Resources**: SQLite database, RESP cache and queue, filesystem, TCP/UDP
//!   endpoint and HTTP API
//! - **Retries**: connection tests retry with exponential backoff, every step is time-bounded
//! - **Cancellation Support**: stop an in-progress run via `CancellationToken`
//!
//! ## Quick Start
//!
//! ```no_run
//! use bringup::{Parser, StateManager};
//!
//! # async fn example() -> Result<(), bringup::Error> {
//! let parser = Parser::new();
//! let config = parser.load_config("bringup.yaml")?;
//!
//! let manager = StateManager::builder().config(config).build().await?;
//! manager.initialize_all().await?;
//! assert!(manager.is_all_complete().await);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - Every [`StateManager`] method takes `&self`
//! - Independent units of one dependency layer are initialized concurrently
//! - Units already running finish their attempt (including cleanup) when a run is cancelled

pub mod config;
pub mod dependency;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod resource;
pub mod status;
pub mod unit;

// Re-export commonly used types
pub use config::{Config, Parser, ResourceKind, UnitConfig};
pub use error::{Error, Result};
pub use manager::{RunMode, StateManager, StateManagerBuilder, UnitState};
pub use monitor::PerformanceMonitor;
pub use status::{ErrorSink, InitializationStatus, StatusSnapshot};
pub use unit::{InitializationUnit, ResourceUnit};
