//! Class registry
//!
//! A [`GClass`] bundles everything its instances share:
//! - the FSM table (ordered states, each with its event/action entries)
//! - the event-type catalog
//! - the attribute schema
//! - the command table
//! - the method table ([`GMethods`])
//! - class flags
//!
//! Classes are described with a [`GClassBuilder`] and become immutable once
//! registered in a [`Runtime`].

use crate::command::CommandDesc;
use crate::error::{GclassError, GobjError, Result};
use crate::methods::{GMethods, NoopMethods};
use crate::runtime::{ClassEntry, Runtime};
use crate::sdata::{self, SdataDesc};
use crate::types::{EventFlags, GclassFlags, GobjId, Json};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// FSM action: `(runtime, gobj, event, kw, src) -> result`
///
/// The kw is owned by the action.
pub type ActionFn =
    Arc<dyn Fn(&mut Runtime, GobjId, &str, Json, Option<GobjId>) -> i32 + Send + Sync>;

/// System event raised on every state change
pub const EV_STATE_CHANGED: &str = "EV_STATE_CHANGED";

/// Characters that separate names in short and full object names
pub(crate) const RESERVED_NAME_CHARS: [char; 3] = ['`', '^', '.'];

/// One entry of a state's action list
#[derive(Clone)]
pub struct EventAction {
    pub event: String,
    pub action: Option<ActionFn>,
    /// State entered before the action runs
    pub next_state: Option<String>,
}

impl EventAction {
    pub fn new<F>(event: &str, action: F, next_state: Option<&str>) -> Self
    where
        F: Fn(&mut Runtime, GobjId, &str, Json, Option<GobjId>) -> i32 + Send + Sync + 'static,
    {
        Self {
            event: event.to_string(),
            action: Some(Arc::new(action)),
            next_state: next_state.map(str::to_string),
        }
    }

    /// Entry without action function: the event is accepted and its kw dropped
    pub fn without_action(event: &str, next_state: Option<&str>) -> Self {
        Self {
            event: event.to_string(),
            action: None,
            next_state: next_state.map(str::to_string),
        }
    }
}

impl fmt::Debug for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAction")
            .field("event", &self.event)
            .field("action", &self.action.is_some())
            .field("next_state", &self.next_state)
            .finish()
    }
}

/// A named FSM state with its ordered action list
#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub actions: Vec<EventAction>,
}

impl State {
    pub fn find(&self, event: &str) -> Option<&EventAction> {
        self.actions.iter().find(|a| a.event == event)
    }
}

/// Event declared by a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventType {
    pub name: String,
    pub flags: EventFlags,
}

impl EventType {
    pub fn new(name: &str, flags: EventFlags) -> Self {
        Self {
            name: name.to_string(),
            flags,
        }
    }

    pub fn is_output(&self) -> bool {
        self.flags.contains(EventFlags::OUTPUT)
    }

    pub fn is_system(&self) -> bool {
        self.flags.contains(EventFlags::SYSTEM)
    }
}

/// Registered class descriptor
pub struct GClass {
    name: String,
    states: Vec<State>,
    event_types: Vec<EventType>,
    attrs: Vec<SdataDesc>,
    commands: Vec<CommandDesc>,
    methods: Arc<dyn GMethods>,
    flags: GclassFlags,
}

impl GClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> GclassFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: GclassFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state_index(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == state)
    }

    pub fn state_name(&self, index: usize) -> Option<&str> {
        self.states.get(index).map(|s| s.name.as_str())
    }

    /// Action bound to `event` in the state at `state_index`
    pub fn find_action(&self, state_index: usize, event: &str) -> Option<&EventAction> {
        self.states.get(state_index).and_then(|s| s.find(event))
    }

    pub fn event_types(&self) -> &[EventType] {
        &self.event_types
    }

    pub fn event_type(&self, event: &str) -> Option<&EventType> {
        self.event_types.iter().find(|e| e.name == event)
    }

    pub fn attrs(&self) -> &[SdataDesc] {
        &self.attrs
    }

    pub fn attr_desc(&self, name: &str) -> Option<&SdataDesc> {
        sdata::find_desc(&self.attrs, name)
    }

    pub fn commands(&self) -> &[CommandDesc] {
        &self.commands
    }

    pub fn methods(&self) -> &Arc<dyn GMethods> {
        &self.methods
    }

    /// Class description: states with their events, event types, attributes, commands
    pub fn to_json(&self) -> Json {
        let states: serde_json::Map<String, Json> = self
            .states
            .iter()
            .map(|s| {
                let entries: Vec<Json> = s
                    .actions
                    .iter()
                    .map(|a| {
                        json!({
                            "event": a.event,
                            "action": a.action.is_some(),
                            "next_state": a.next_state,
                        })
                    })
                    .collect();
                (s.name.clone(), Json::Array(entries))
            })
            .collect();
        let events: Vec<Json> = self
            .event_types
            .iter()
            .map(|e| json!({"event": e.name, "flag": e.flags.names()}))
            .collect();
        json!({
            "id": self.name,
            "gclass_flag": self.flags.names(),
            "fsm": states,
            "event_types": events,
            "attrs": self.attrs.iter().map(SdataDesc::to_json).collect::<Vec<_>>(),
            "commands": self.commands.iter().map(CommandDesc::to_json).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Debug for GClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GClass")
            .field("name", &self.name)
            .field("states", &self.states)
            .field("event_types", &self.event_types)
            .field("attrs", &self.attrs.len())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Declarative class description
///
/// ```ignore
/// let gclass = GClassBuilder::new("C_COUNTER")
///     .state("ST_IDLE", vec![EventAction::new("EV_TICK", ac_tick, None)])
///     .event_type("EV_TICK", EventFlags::empty())
///     .attr(SdataDesc::integer("limit", SdFlags::WR | SdFlags::REQUIRED, "", "Tick limit"));
/// runtime.register_gclass(gclass)?;
/// ```
pub struct GClassBuilder {
    name: String,
    table: Vec<(String, Vec<EventAction>)>,
    states: Vec<State>,
    event_types: Vec<EventType>,
    attrs: Vec<SdataDesc>,
    commands: Vec<CommandDesc>,
    methods: Arc<dyn GMethods>,
    flags: GclassFlags,
}

impl GClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: Vec::new(),
            states: Vec::new(),
            event_types: Vec::new(),
            attrs: Vec::new(),
            commands: Vec::new(),
            methods: Arc::new(NoopMethods),
            flags: GclassFlags::empty(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a state and its action list.
    ///
    /// Entries are validated at registration; a bad entry is reported and
    /// skipped without failing the class.
    pub fn state(mut self, name: &str, actions: Vec<EventAction>) -> Self {
        self.table.push((name.to_string(), actions));
        self
    }

    pub fn event_type(mut self, name: &str, flags: EventFlags) -> Self {
        self.event_types.push(EventType::new(name, flags));
        self
    }

    pub fn attr(mut self, desc: SdataDesc) -> Self {
        self.attrs.push(desc);
        self
    }

    pub fn attrs(mut self, descs: impl IntoIterator<Item = SdataDesc>) -> Self {
        self.attrs.extend(descs);
        self
    }

    pub fn command(mut self, desc: CommandDesc) -> Self {
        self.commands.push(desc);
        self
    }

    pub fn methods(mut self, methods: impl GMethods + 'static) -> Self {
        self.methods = Arc::new(methods);
        self
    }

    pub fn flags(mut self, flags: GclassFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Append a state with an empty action list
    pub fn add_state(&mut self, state: &str) -> std::result::Result<(), GclassError> {
        if self.states.iter().any(|s| s.name == state) {
            return Err(GclassError::DuplicateState {
                gclass: self.name.clone(),
                state: state.to_string(),
            });
        }
        self.states.push(State {
            name: state.to_string(),
            actions: Vec::new(),
        });
        Ok(())
    }

    /// Bind an event in an existing state; an event is bound at most once per state
    pub fn add_ev_action(
        &mut self,
        state: &str,
        entry: EventAction,
    ) -> std::result::Result<(), GclassError> {
        let gclass = self.name.clone();
        let st = self
            .states
            .iter_mut()
            .find(|s| s.name == state)
            .ok_or_else(|| GclassError::StateNotFound {
                gclass: gclass.clone(),
                state: state.to_string(),
            })?;
        if st.find(&entry.event).is_some() {
            return Err(GclassError::DuplicateEvent {
                gclass,
                state: state.to_string(),
                event: entry.event,
            });
        }
        st.actions.push(entry);
        Ok(())
    }

    /// Action entries whose next state is not declared
    fn unknown_next_states(&self) -> Vec<GclassError> {
        let mut errors = Vec::new();
        for st in &self.states {
            for entry in &st.actions {
                let Some(next) = entry.next_state.as_deref() else {
                    continue;
                };
                if !self.states.iter().any(|s| s.name == next) {
                    errors.push(GclassError::UnknownNextState {
                        gclass: self.name.clone(),
                        state: st.name.clone(),
                        event: entry.event.clone(),
                        next_state: next.to_string(),
                    });
                }
            }
        }
        errors
    }

    fn build(mut self) -> std::result::Result<GClass, GclassError> {
        validate_gclass_name(&self.name)?;

        for (state, actions) in std::mem::take(&mut self.table) {
            if let Err(e) = self.add_state(&state) {
                tracing::error!(gclass = %self.name, error = %e, "add state failed");
                continue;
            }
            for entry in actions {
                if let Err(e) = self.add_ev_action(&state, entry) {
                    tracing::error!(gclass = %self.name, error = %e, "add event action failed");
                }
            }
        }
        if self.states.is_empty() {
            return Err(GclassError::NoStates(self.name));
        }
        for e in self.unknown_next_states() {
            tracing::error!(gclass = %self.name, error = %e, "bad next state in event action");
        }

        Ok(GClass {
            name: self.name,
            states: self.states,
            event_types: self.event_types,
            attrs: self.attrs,
            commands: self.commands,
            methods: self.methods,
            flags: self.flags,
        })
    }
}

fn validate_gclass_name(name: &str) -> std::result::Result<(), GclassError> {
    if name.is_empty() || name.contains(RESERVED_NAME_CHARS) {
        return Err(GclassError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Runtime {
    /// Register a class; the first registration of a name wins
    pub fn register_gclass(&mut self, builder: GClassBuilder) -> Result<Arc<GClass>> {
        let name = builder.name().to_string();
        if self.classes.contains_key(&name) {
            tracing::error!(gclass = %name, "gclass already registered");
            return Err(GclassError::AlreadyRegistered(name).into());
        }
        let gclass = match builder.build() {
            Ok(gclass) => Arc::new(gclass),
            Err(e) => {
                tracing::error!(gclass = %name, error = %e, "gclass registration failed");
                return Err(e.into());
            }
        };
        let trace = self.configured_gclass_trace(&name);
        self.classes.insert(
            name,
            ClassEntry {
                gclass: gclass.clone(),
                instances: 0,
                trace,
            },
        );
        Ok(gclass)
    }

    /// Look up a class; a miss is silent
    pub fn find_gclass(&self, name: &str) -> Option<Arc<GClass>> {
        self.classes.get(name).map(|e| e.gclass.clone())
    }

    /// Remove a class without live instances
    pub fn unregister_gclass(&mut self, name: &str) -> Result<()> {
        let entry = self.classes.get(name).ok_or_else(|| {
            tracing::error!(gclass = %name, "gclass not found");
            GobjError::ClassNotFound(name.to_string())
        })?;
        if entry.instances > 0 {
            tracing::error!(gclass = %name, instances = entry.instances, "cannot unregister gclass with instances");
            return Err(GclassError::HasInstances {
                name: name.to_string(),
                instances: entry.instances,
            }
            .into());
        }
        self.classes.remove(name);
        Ok(())
    }

    /// Live instances of a class (0 for unknown classes)
    pub fn gclass_instances(&self, name: &str) -> usize {
        self.classes.get(name).map(|e| e.instances).unwrap_or(0)
    }

    /// Registered class names, sorted
    pub fn gclass_names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }
}
