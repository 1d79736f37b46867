//! FSM event dispatch
//!
//! `send_event` looks up the `(current_state, event)` entry of the
//! destination's class. A named next state is entered before the action
//! runs; an action that picks its state conditionally leaves the entry's
//! next state empty and calls [`Runtime::change_state`] itself.

use crate::error::{GobjError, Result};
use crate::gclass::{EventType, GClass, EV_STATE_CHANGED};
use crate::runtime::Runtime;
use crate::trace::TraceLevels;
use crate::types::{GobjId, Json};
use serde_json::json;

impl Runtime {
    /// Dispatch `event` to `dst`, moving `kw` into the action.
    ///
    /// Returns the action result, or the injection hook result for events
    /// the current state does not handle.
    pub fn send_event(&mut self, dst: GobjId, event: &str, kw: Json, src: Option<GobjId>) -> Result<i32> {
        let Some(gobj) = self.gobj(dst) else {
            tracing::error!(gobj = %dst, event, "send_event: gobj not found");
            return Err(GobjError::GobjNotFound(dst));
        };
        if gobj.destroying || gobj.destroyed {
            let name = self.full_name(dst);
            tracing::error!(gobj = %name, event, "send_event: gobj destroying");
            return Err(GobjError::Destroying(name));
        }
        let gclass = gobj.gclass.clone();
        let state = gobj.current_state;

        self.inside += 1;
        let result = self.dispatch(dst, state, event, kw, src, &gclass);
        self.inside = self.inside.saturating_sub(1);
        result
    }

    fn dispatch(
        &mut self,
        dst: GobjId,
        state: usize,
        event: &str,
        kw: Json,
        src: Option<GobjId>,
        gclass: &GClass,
    ) -> Result<i32> {
        let state_name = gclass.state_name(state).unwrap_or_default();

        if self.is_tracing(dst, TraceLevels::MACHINE) {
            tracing::info!(
                target: "gobj::trace",
                depth = self.inside,
                gobj = %self.full_name(dst),
                src = %src.map(|s| self.full_name(s)).unwrap_or_default(),
                event,
                state = state_name,
                "send event"
            );
        }
        if self.is_tracing(dst, TraceLevels::EV_KW) {
            tracing::info!(target: "gobj::trace", gobj = %self.full_name(dst), event, kw = %kw, "event kw");
        }

        let Some(entry) = gclass.find_action(state, event) else {
            if let Some(ret) = gclass.methods().mt_inject_event(self, dst, event, kw, src) {
                return Ok(ret);
            }
            tracing::error!(
                gobj = %self.full_name(dst),
                event,
                state = state_name,
                "event not defined in state"
            );
            return Err(GobjError::EventNotDefined {
                gobj: self.full_name(dst),
                event: event.to_string(),
                state: state_name.to_string(),
            });
        };
        let action = entry.action.clone();

        if let Some(next) = entry.next_state.as_deref() {
            if let Err(e) = self.change_state(dst, next) {
                tracing::error!(gobj = %self.full_name(dst), event, next_state = next, error = %e, "state change failed");
            }
        }

        match action {
            Some(action) => Ok(action(self, dst, event, kw, src)),
            None => Ok(0),
        }
    }

    /// Enter `new_state`; `Ok(false)` when already there.
    ///
    /// The class's `mt_state_changed` receives the transition when it
    /// implements it, otherwise `EV_STATE_CHANGED` is published.
    pub fn change_state(&mut self, id: GobjId, new_state: &str) -> Result<bool> {
        let gobj = self.live(id)?;
        let gclass = gobj.gclass.clone();
        let Some(index) = gclass.state_index(new_state) else {
            tracing::error!(gobj = %self.full_name(id), state = new_state, "state not found");
            return Err(GobjError::StateNotFound {
                gobj: self.full_name(id),
                state: new_state.to_string(),
            });
        };
        let previous = gobj.current_state;
        if previous == index {
            return Ok(false);
        }
        if let Some(node) = self.gobj_mut(id) {
            node.last_state = previous;
            node.current_state = index;
        }
        let previous_name = gclass.state_name(previous).unwrap_or_default();

        if self.is_tracing(id, TraceLevels::MACHINE) {
            tracing::info!(
                target: "gobj::trace",
                depth = self.inside,
                gobj = %self.full_name(id),
                from = previous_name,
                to = new_state,
                "state changed"
            );
        }

        let kw = json!({
            "previous_state": previous_name,
            "current_state": new_state,
        });
        if gclass.methods().mt_state_changed(self, id, &kw).is_none() {
            if let Err(e) = self.publish_event(id, EV_STATE_CHANGED, kw) {
                tracing::debug!(gobj = %self.full_name(id), error = %e, "state change not published");
            }
        }
        Ok(true)
    }

    pub fn current_state(&self, id: GobjId) -> Option<&str> {
        self.gobj(id).map(|g| g.current_state())
    }

    pub fn last_state(&self, id: GobjId) -> Option<&str> {
        self.gobj(id).map(|g| g.last_state())
    }

    pub fn in_this_state(&self, id: GobjId, state: &str) -> bool {
        self.current_state(id) == Some(state)
    }

    /// True when the current state has an entry for `event`
    pub fn has_input_event(&self, id: GobjId, event: &str) -> bool {
        self.gobj(id)
            .is_some_and(|g| g.gclass.find_action(g.current_state, event).is_some())
    }

    /// True when any state of the class has an entry for `event`
    pub fn has_event(&self, id: GobjId, event: &str) -> bool {
        self.gobj(id)
            .is_some_and(|g| g.gclass.states().iter().any(|s| s.find(event).is_some()))
    }

    /// Event type declared by the class, else by the global catalog
    pub fn event_type(&self, id: GobjId, event: &str) -> Option<EventType> {
        let gobj = self.gobj(id)?;
        gobj.gclass
            .event_type(event)
            .or_else(|| self.global_events.iter().find(|e| e.name == event))
            .cloned()
    }

    pub fn has_output_event(&self, id: GobjId, event: &str) -> bool {
        self.event_type(id, event)
            .is_some_and(|e| e.is_output() || e.is_system())
    }
}
