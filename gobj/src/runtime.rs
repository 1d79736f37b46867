//! Runtime context
//!
//! The runtime owns everything that is process-wide in a classic component
//! system:
//! - the class registry
//! - the object arena and the named-service table
//! - the yuno (root) and default-service handles
//! - the subscription table
//! - trace levels, persistence, command/stats parsers, node identity
//!
//! Every operation takes the runtime by reference, so independent runtimes
//! can live side by side.

use crate::command::{CommandParserFn, StatsParserFn};
use crate::config::Settings;
use crate::gclass::{EventType, GClass, EV_STATE_CHANGED};
use crate::gobj::Gobj;
use crate::identity::Identity;
use crate::persistence::{JsonFilePersistence, Persistence};
use crate::subscription::Subscription;
use crate::trace::TraceLevels;
use crate::types::{EventFlags, GobjId, SubscriptionId};
use once_cell::unsync::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Registry slot of a class
pub(crate) struct ClassEntry {
    pub(crate) gclass: Arc<GClass>,
    pub(crate) instances: usize,
    pub(crate) trace: TraceLevels,
}

/// Counters describing the runtime contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub gclasses: usize,
    pub gobjs: usize,
    pub services: usize,
    pub subscriptions: usize,
}

/// The component runtime
///
/// # Example
///
/// ```ignore
/// use gobj::{Runtime, GClassBuilder, GobjFlags};
/// use serde_json::json;
///
/// let mut runtime = Runtime::with_defaults();
/// runtime.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))?;
/// let yuno = runtime.create_yuno("my-yuno", "C_YUNO", json!({}))?;
/// runtime.start_tree(yuno)?;
/// runtime.end();
/// ```
pub struct Runtime {
    pub(crate) settings: Settings,
    pub(crate) classes: BTreeMap<String, ClassEntry>,
    pub(crate) global_events: Vec<EventType>,
    pub(crate) gobjs: HashMap<GobjId, Gobj>,
    pub(crate) next_gobj: u64,
    pub(crate) services: BTreeMap<String, GobjId>,
    pub(crate) yuno: Option<GobjId>,
    pub(crate) default_service: Option<GobjId>,
    pub(crate) subscriptions: HashMap<SubscriptionId, Subscription>,
    pub(crate) next_subscription: u64,
    pub(crate) shutting_down: bool,
    pub(crate) inside: usize,
    pub(crate) global_trace: TraceLevels,
    pub(crate) persistence: Option<Box<dyn Persistence>>,
    pub(crate) command_parser: Option<CommandParserFn>,
    pub(crate) stats_parser: Option<StatsParserFn>,
    pub(crate) identity: OnceCell<Identity>,
}

impl Runtime {
    /// Runtime with default settings and no persistence
    pub fn with_defaults() -> Self {
        Self::start_up(Settings::default())
    }

    /// Create a runtime from settings.
    ///
    /// A configured persistence directory installs a [`JsonFilePersistence`].
    pub fn start_up(settings: Settings) -> Self {
        let global_trace = TraceLevels::from_names(&settings.trace_levels);
        let persistence: Option<Box<dyn Persistence>> = settings
            .persistent_dir
            .as_ref()
            .map(|dir| Box::new(JsonFilePersistence::new(dir)) as Box<dyn Persistence>);

        tracing::debug!(
            trace = ?global_trace,
            persistence = persistence.is_some(),
            "gobj runtime started"
        );

        Self {
            settings,
            classes: BTreeMap::new(),
            global_events: vec![EventType::new(
                EV_STATE_CHANGED,
                EventFlags::SYSTEM | EventFlags::OUTPUT | EventFlags::NO_WARN_SUBS,
            )],
            gobjs: HashMap::new(),
            next_gobj: 1,
            services: BTreeMap::new(),
            yuno: None,
            default_service: None,
            subscriptions: HashMap::new(),
            next_subscription: 1,
            shutting_down: false,
            inside: 0,
            global_trace,
            persistence,
            command_parser: None,
            stats_parser: None,
            identity: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Install the persistence collaborator
    pub fn set_persistence(&mut self, persistence: impl Persistence + 'static) {
        self.persistence = Some(Box::new(persistence));
    }

    /// Install a runtime-wide command parser, taking over `command`
    pub fn set_command_parser(&mut self, parser: CommandParserFn) {
        self.command_parser = Some(parser);
    }

    /// Install a runtime-wide stats parser, taking over `stats`
    pub fn set_stats_parser(&mut self, parser: StatsParserFn) {
        self.stats_parser = Some(parser);
    }

    /// Global event catalog (holds `EV_STATE_CHANGED`)
    pub fn global_events(&self) -> &[EventType] {
        &self.global_events
    }

    /// Depth of nested `send_event` calls currently running
    pub fn dispatch_depth(&self) -> usize {
        self.inside
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Stop the services, then pause and stop the yuno and its tree.
    ///
    /// A second call is ignored.
    pub fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        self.stop_services();
        let Some(yuno) = self.yuno else {
            return;
        };
        if self.is_destroying(yuno) {
            return;
        }
        if self.is_playing(yuno) {
            if let Err(e) = self.pause(yuno) {
                tracing::warn!(error = %e, "pausing yuno on shutdown failed");
            }
        }
        if self.is_running(yuno) {
            if let Err(e) = self.stop_tree(yuno) {
                tracing::warn!(error = %e, "stopping yuno on shutdown failed");
            }
        }
    }

    /// Shut down, destroy the yuno and unregister every class
    pub fn end(&mut self) {
        self.shutdown();
        if let Some(yuno) = self.yuno {
            if let Err(e) = self.destroy(yuno) {
                tracing::error!(error = %e, "destroying yuno failed");
            }
        }
        let names: Vec<String> = self.classes.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.unregister_gclass(&name) {
                tracing::error!(gclass = %name, error = %e, "unregister on end failed");
            }
        }
        tracing::debug!("gobj runtime ended");
    }

    /// Counters of registered classes, live objects, services and subscriptions
    pub fn stats_summary(&self) -> RuntimeStats {
        RuntimeStats {
            gclasses: self.classes.len(),
            gobjs: self.gobjs.len(),
            services: self.services.len(),
            subscriptions: self.subscriptions.len(),
        }
    }

    pub(crate) fn class_entry_mut(&mut self, gclass: &str) -> Option<&mut ClassEntry> {
        self.classes.get_mut(gclass)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::with_defaults()
    }
}
