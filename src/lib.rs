// Library exports for the binary, tests and embedding UIs
pub mod aggregator;
pub mod config;
pub mod core;
pub mod decoder;
pub mod error;
pub mod events;
pub mod notifications;
pub mod observability;
pub mod repository;
pub mod types;
pub mod view;

pub use crate::core::{ControllerConfig, WalletController};
pub use crate::error::{ErrorCategory, Result, WalletError};
