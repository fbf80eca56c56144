//! bacex - BACnet/IP discovery and extraction gateway.
//!
//! bacex inventories BACnet/IP devices and their object lists over UDP,
//! polls configured points on a schedule, stores everything in SQLite, and
//! serves the results over a local HTTP API. A launch layer handles the
//! bootstrap workflow: prepare the data environment, select the network
//! interface, optionally open the browser, then serve in the foreground.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Entry Points                              │
//! │      web (browser auto-open)    │    ui (hosted window)         │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Web Gateway                               │
//! │    status + control routes │ data exports │ worker controllers  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      BACnet Engines                             │
//! │      discovery (Who-Is/inventory)  │  poller (extraction maps)  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Wire Codec │ UDP Client │ SQLite Store             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Runtime orchestration
//! - [`core::error`] - Error types and web mapping
//!
//! ## BACnet
//! - [`bacnet::codec`] - BVLC/NPDU/APDU wire codec
//! - [`bacnet::client`] - UDP transport with port fallback
//! - [`bacnet::discovery`] - Device and object inventory
//! - [`bacnet::poller`] - Extraction polling
//! - [`bacnet::map`] - Extraction map parsing
//!
//! ## Storage
//! - [`storage::db`] - SQLite topology store
//! - [`storage::export`] - CSV exports
//!
//! ## Web
//! - [`web::routes`] - HTTP routes
//! - [`web::state`] - Run and poll state machines
//! - [`web::workers`] - Worker controllers
//!
//! ## Launch
//! - [`launch`] - Bootstrap and entry-point sequences
//!
//! ## Operations
//! - [`ops::telemetry`] - Tracing setup and process memory
//! - [`ops::version`] - Version information
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations

// Core infrastructure
pub mod core;

// BACnet protocol engines
pub mod bacnet;

// Storage layer
pub mod storage;

// Web gateway
pub mod web;

// Entry-point launch sequences
pub mod launch;

// Operations and observability
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use bacnet::{client, codec, discovery, map, poller};
pub use ops::{telemetry, version};
pub use storage::{db, export};
