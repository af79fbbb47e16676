// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `hass_sync_lib` - Keeps a device's switches in sync with a home-automation server.
//!
//! This library polls a REST-style home-automation server for the state of a
//! fixed set of switch entities over an unreliable link, and sends switch and
//! scene commands back to it.
//!
//! # Supported Features
//!
//! - **Retrying transport**: bearer-token GET/POST with bounded linear backoff,
//!   link checks before every attempt, liveness feeding while blocked
//! - **Bulk sync with fallback**: one `/api/states` request per cycle, falling
//!   back to per-entity requests when it fails
//! - **Background parsing**: large responses are parsed on a dedicated thread
//!   with a bounded queue and a deadline
//! - **Status reporting**: one status value with change notification and a
//!   watch channel
//! - **Commands**: `switch.turn_on`/`turn_off`, `scene.turn_on`, and any other
//!   service call
//!
//! # Quick Start
//!
//! ```no_run
//! use hass_sync_lib::{SyncConfig, SyncEngine};
//! use hass_sync_lib::link::LinkFlag;
//! use hass_sync_lib::subscription::Subscribable;
//! use hass_sync_lib::transport::ReqwestBackend;
//!
//! #[tokio::main]
//! async fn main() -> hass_sync_lib::Result<()> {
//!     let link = LinkFlag::new(true);
//!     let config = SyncConfig::new("192.168.1.20", "long-lived-token")
//!         .with_switches(["switch.pump", "switch.fan", "switch.heater"])
//!         .with_scene("scene.evening");
//!
//!     let engine = SyncEngine::builder(config, ReqwestBackend::new())
//!         .with_link_monitor(link.clone())
//!         .build()?;
//!
//!     engine.on_status_change(|update| {
//!         println!("status: {} (ready={})", update.text(), update.is_ready());
//!     });
//!     engine.on_states_synced(|switches| {
//!         println!("switches: {switches:?}");
//!     });
//!
//!     // Called by the connectivity manager when the link comes up.
//!     engine.link_connected().await?;
//!
//!     engine.set_switch("switch.pump", true).await?;
//!     engine.trigger_scene().await?;
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Backends
//!
//! Without the default `http` feature the crate has no HTTP client. Any
//! [`transport::HttpBackend`] implementation can drive the engine; the tests
//! use one that counts attempts.

pub mod command;
pub mod config;
mod engine;
pub mod error;
pub mod link;
pub mod parser;
pub mod status;
pub mod subscription;
pub mod sync;
pub mod transport;
pub mod types;

pub use command::{Command, CommandDispatcher, SceneCommand, SwitchCommand};
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncEngineBuilder};
pub use error::{ConfigError, Error, ParseError, Result, TransportError};
pub use link::{AlwaysUp, CountingLiveness, LinkFlag, LinkMonitor, Liveness, NoopLiveness};
pub use parser::{EntityStates, ParserStats, parse_sync};
pub use status::{StatusMachine, StatusUpdate, SyncStatus};
pub use subscription::{CallbackRegistry, Subscribable, SubscriptionId};
pub use sync::{CycleOutcome, FetchPath, SwitchSnapshot};
pub use transport::{HttpBackend, HttpRequest, HttpResponse, Method, RetryPolicy, Transport};
#[cfg(feature = "http")]
pub use transport::ReqwestBackend;
pub use types::{EntityState, ServiceCallRequest, SwitchState};
