//! Trace levels
//!
//! Levels can be switched on for the whole runtime, for a class or for a
//! single object. An object is traced at a level when any of the three
//! enables it. Trace records go to `tracing` on target `gobj::trace`.

use crate::error::{GobjError, Result};
use crate::runtime::Runtime;
use crate::types::{flag_set, GobjId};
use serde::{Deserialize, Serialize};
use std::fmt;

flag_set! {
    /// Trace level bits
    pub struct TraceLevels: u32 {
        /// Event dispatch and state changes
        const MACHINE = 0x0001;
        /// Object creation and destruction
        const CREATE_DELETE = 0x0002;
        /// Subscriptions and publications
        const SUBSCRIPTIONS = 0x0004;
        /// start/stop/play/pause
        const START_STOP = 0x0008;
        /// Payload of dispatched events
        const EV_KW = 0x0010;
    }
}

impl TraceLevels {
    /// Combine level names; unknown names are logged and skipped
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut levels = Self::empty();
        for name in names {
            match Self::from_name(name.as_ref()) {
                Some(level) => levels.insert(level),
                None => tracing::warn!(level = name.as_ref(), "unknown trace level"),
            }
        }
        levels
    }
}

fn parse_level(level: &str) -> Result<TraceLevels> {
    TraceLevels::from_name(level).ok_or_else(|| {
        tracing::error!(level, "unknown trace level");
        GobjError::Parameter(format!("unknown trace level {level:?}"))
    })
}

impl Runtime {
    /// True when `level` is enabled globally, for the object's class or for the object
    pub fn is_tracing(&self, id: GobjId, level: TraceLevels) -> bool {
        if self.global_trace.intersects(level) {
            return true;
        }
        let Some(gobj) = self.gobj(id) else {
            return false;
        };
        gobj.trace.intersects(level)
            || self
                .classes
                .get(gobj.gclass_name())
                .is_some_and(|e| e.trace.intersects(level))
    }

    pub fn set_global_trace(&mut self, level: &str, set: bool) -> Result<()> {
        let level = parse_level(level)?;
        self.global_trace.set(level, set);
        Ok(())
    }

    pub fn set_gclass_trace(&mut self, gclass: &str, level: &str, set: bool) -> Result<()> {
        let level = parse_level(level)?;
        let entry = self
            .class_entry_mut(gclass)
            .ok_or_else(|| GobjError::ClassNotFound(gclass.to_string()))?;
        entry.trace.set(level, set);
        Ok(())
    }

    pub fn set_gobj_trace(&mut self, id: GobjId, level: &str, set: bool) -> Result<()> {
        let level = parse_level(level)?;
        let gobj = self.gobj_mut(id).ok_or(GobjError::GobjNotFound(id))?;
        gobj.trace.set(level, set);
        Ok(())
    }

    pub fn global_trace(&self) -> TraceLevels {
        self.global_trace
    }

    pub(crate) fn configured_gclass_trace(&self, gclass: &str) -> TraceLevels {
        self.settings
            .gclass_trace
            .get(gclass)
            .map(|names| TraceLevels::from_names(names.as_slice()))
            .unwrap_or_default()
    }

    pub(crate) fn configured_gobj_trace(&self, name: &str) -> TraceLevels {
        self.settings
            .gobj_trace
            .get(name)
            .map(|names| TraceLevels::from_names(names.as_slice()))
            .unwrap_or_default()
    }
}
