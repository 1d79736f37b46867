//! gobj - embeddable component runtime
//!
//! Applications are built from a tree of objects ("gobjs"), each an
//! instance of a registered class ("gclass"). A class declares:
//! - a finite-state machine: ordered states, each mapping input events to actions
//! - the event types it consumes and publishes
//! - a typed attribute schema
//! - an optional command table
//! - a method table with lifecycle hooks
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Runtime                          │
//! │  classes ─ gobj arena ─ services ─ subscriptions         │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │                yuno (root, service)                      │
//! │               ┌───────┴────────┐                         │
//! │          service A         service B ──bottom──▶ child   │
//! │           ┌──┴──┐                                        │
//! │        child  child                                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! ## Events
//!
//! [`Runtime::send_event`] runs the action bound to the event in the
//! destination's current state, synchronously and to completion.
//! [`Runtime::publish_event`] fans an output event out to subscribers.
//!
//! ## Lifecycle
//!
//! `running` and `playing` are independent flags driven by
//! `start`/`stop`/`play`/`pause`; tree cascades start and stop whole
//! subtrees, skipping disabled and manual-start nodes.
//!
//! ## Attributes
//!
//! Values are coerced to their declared type on every write. An attribute
//! missing on an object is looked up along its bottom chain.

pub mod attrs;
pub mod command;
pub mod config;
pub mod error;
pub mod fsm;
pub mod gclass;
pub mod gobj;
pub mod identity;
pub mod lifecycle;
pub mod methods;
pub mod persistence;
pub mod runtime;
pub mod sdata;
pub mod subscription;
pub mod trace;
pub mod types;
pub mod walk;

pub use command::{build_command_response, CommandDesc, CommandFn, CommandParserFn, StatsParserFn};
pub use config::{ConfigError, NodeConfig, Settings, YunoConfig};
pub use error::{GclassError, GobjError, Result, SdataError};
pub use gclass::{ActionFn, EventAction, EventType, GClass, GClassBuilder, EV_STATE_CHANGED};
pub use gobj::Gobj;
pub use identity::{Identity, IdentityError};
pub use methods::{GMethods, LoggingMethods, NoopMethods, PreFilter};
pub use persistence::{JsonFilePersistence, MemoryPersistence, Persistence, PersistenceError};
pub use runtime::{Runtime, RuntimeStats};
pub use sdata::{DataType, SdataDesc};
pub use subscription::Subscription;
pub use trace::TraceLevels;
pub use types::{EventFlags, GclassFlags, GobjFlags, GobjId, Json, JsonMap, SdFlags, SubscriptionId};
pub use walk::{Visit, WalkDirection, WalkOrder, WalkType};
