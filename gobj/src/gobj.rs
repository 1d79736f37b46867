//! Object tree
//!
//! Objects live in the runtime arena and are addressed by [`GobjId`].
//! Each object:
//! - is owned by its parent (the yuno by the runtime)
//! - may be registered as a named service
//! - may delegate attribute lookups to a bottom object
//!
//! Destroying an object destroys its subtree.

use crate::config::NodeConfig;
use crate::error::{GobjError, Result};
use crate::gclass::{GClass, RESERVED_NAME_CHARS};
use crate::runtime::Runtime;
use crate::sdata;
use crate::trace::TraceLevels;
use crate::types::{GclassFlags, GobjFlags, GobjId, Json, JsonMap, SubscriptionId};
use once_cell::unsync::OnceCell;
use serde_json::json;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Path alias resolving to the yuno in [`Runtime::find_gobj`]
pub const PATH_YUNO: &str = "__yuno__";
/// Path alias resolving to the default service in [`Runtime::find_gobj`]
pub const PATH_DEFAULT_SERVICE: &str = "__default_service__";

/// An object instance
pub struct Gobj {
    pub(crate) id: GobjId,
    pub(crate) name: String,
    pub(crate) gclass: Arc<GClass>,
    pub(crate) flags: GobjFlags,
    pub(crate) parent: Option<GobjId>,
    pub(crate) children: Vec<GobjId>,
    pub(crate) bottom: Option<GobjId>,
    pub(crate) current_state: usize,
    pub(crate) last_state: usize,
    pub(crate) running: bool,
    pub(crate) playing: bool,
    pub(crate) disabled: bool,
    pub(crate) created: bool,
    pub(crate) destroying: bool,
    pub(crate) destroyed: bool,
    pub(crate) attrs: JsonMap,
    pub(crate) user_data: JsonMap,
    pub(crate) stats: JsonMap,
    pub(crate) private: Option<Box<dyn Any>>,
    pub(crate) subscriptions: Vec<SubscriptionId>,
    pub(crate) subscribings: Vec<SubscriptionId>,
    pub(crate) trace: TraceLevels,
    short_name: OnceCell<String>,
    full_name: OnceCell<String>,
}

impl Gobj {
    fn new(id: GobjId, name: &str, gclass: Arc<GClass>, flags: GobjFlags, parent: Option<GobjId>) -> Self {
        let attrs = sdata::build_store(gclass.attrs());
        Self {
            id,
            name: name.to_string(),
            gclass,
            flags,
            parent,
            children: Vec::new(),
            bottom: None,
            current_state: 0,
            last_state: 0,
            running: false,
            playing: false,
            disabled: false,
            created: false,
            destroying: false,
            destroyed: false,
            attrs,
            user_data: JsonMap::new(),
            stats: JsonMap::new(),
            private: None,
            subscriptions: Vec::new(),
            subscribings: Vec::new(),
            trace: TraceLevels::empty(),
            short_name: OnceCell::new(),
            full_name: OnceCell::new(),
        }
    }

    pub fn id(&self) -> GobjId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gclass(&self) -> &Arc<GClass> {
        &self.gclass
    }

    pub fn gclass_name(&self) -> &str {
        self.gclass.name()
    }

    pub fn flags(&self) -> GobjFlags {
        self.flags
    }

    pub fn parent(&self) -> Option<GobjId> {
        self.parent
    }

    pub fn children(&self) -> &[GobjId] {
        &self.children
    }

    pub fn bottom(&self) -> Option<GobjId> {
        self.bottom
    }

    pub fn current_state(&self) -> &str {
        self.gclass.state_name(self.current_state).unwrap_or_default()
    }

    pub fn last_state(&self) -> &str {
        self.gclass.state_name(self.last_state).unwrap_or_default()
    }

    /// Attribute store of this object only (no bottom delegation)
    pub fn attrs(&self) -> &JsonMap {
        &self.attrs
    }

    pub fn user_data(&self) -> &JsonMap {
        &self.user_data
    }

    pub fn stats(&self) -> &JsonMap {
        &self.stats
    }

    /// `gclass^name`
    pub fn short_name(&self) -> &str {
        self.short_name
            .get_or_init(|| format!("{}^{}", self.gclass.name(), self.name))
    }
}

impl fmt::Debug for Gobj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gobj")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("gclass", &self.gclass.name())
            .field("state", &self.current_state())
            .field("running", &self.running)
            .field("playing", &self.playing)
            .field("disabled", &self.disabled)
            .field("children", &self.children)
            .finish()
    }
}

fn validate_gobj_name(name: &str) -> Result<()> {
    if name.contains(RESERVED_NAME_CHARS) {
        return Err(GobjError::Parameter(format!(
            "gobj name {name:?} contains reserved characters"
        )));
    }
    Ok(())
}

impl Runtime {
    /// Create an object.
    ///
    /// Validation runs before anything is allocated. Attribute values are
    /// layered: schema defaults, then settings for the class name, then
    /// settings for the object name, then `kw`, then persisted values for
    /// services. Hooks run once the object is attached: `mt_create`, the
    /// parent's `mt_child_added`, the yuno's `mt_gobj_created`.
    pub fn create_gobj(
        &mut self,
        name: &str,
        gclass_name: &str,
        kw: Json,
        parent: Option<GobjId>,
        flags: GobjFlags,
    ) -> Result<GobjId> {
        let mut flags = flags;
        if flags.intersects(GobjFlags::YUNO | GobjFlags::DEFAULT_SERVICE) {
            flags.insert(GobjFlags::SERVICE);
        }

        if flags.contains(GobjFlags::YUNO) {
            if self.yuno.is_some() {
                tracing::error!(name, gclass = gclass_name, "yuno already exists");
                return Err(GobjError::operational(name, "yuno already exists"));
            }
        } else {
            let Some(parent_id) = parent else {
                tracing::error!(name, gclass = gclass_name, "gobj without parent");
                return Err(GobjError::Parameter(format!("{gclass_name}^{name}: parent required")));
            };
            if self.is_destroying(parent_id) {
                tracing::error!(name, gclass = gclass_name, parent = %parent_id, "parent destroying");
                return Err(GobjError::Destroying(parent_id.to_string()));
            }
        }

        validate_gobj_name(name).inspect_err(|e| {
            tracing::error!(name, gclass = gclass_name, error = %e, "invalid gobj name");
        })?;

        if flags.contains(GobjFlags::SERVICE) {
            if name.is_empty() {
                tracing::error!(gclass = gclass_name, "service without name");
                return Err(GobjError::Parameter("service name empty".to_string()));
            }
            if self.services.contains_key(name) {
                tracing::error!(service = name, "service already registered");
                return Err(GobjError::operational(name, "service already registered"));
            }
        }
        if flags.contains(GobjFlags::DEFAULT_SERVICE) && self.default_service.is_some() {
            tracing::error!(name, "default service already exists");
            return Err(GobjError::operational(name, "default service already exists"));
        }

        let Some(gclass) = self.find_gclass(gclass_name) else {
            tracing::error!(name, gclass = gclass_name, "gclass not found");
            return Err(GobjError::ClassNotFound(gclass_name.to_string()));
        };
        if gclass.has_flag(GclassFlags::SINGLETON) && self.gclass_instances(gclass_name) > 0 {
            tracing::error!(name, gclass = gclass_name, "singleton gclass already instantiated");
            return Err(GobjError::operational(name, "singleton gclass already instantiated"));
        }

        let id = GobjId(self.next_gobj);
        let mut node = Gobj::new(id, name, gclass.clone(), flags, parent);
        node.trace = self.configured_gobj_trace(name);
        self.apply_settings_and_kw(&mut node, &kw)?;

        self.next_gobj += 1;
        self.gobjs.insert(id, node);

        if self.is_tracing(id, TraceLevels::CREATE_DELETE) {
            tracing::info!(target: "gobj::trace", gobj = %format!("{gclass_name}^{name}"), "creating");
        }

        if flags.contains(GobjFlags::SERVICE) {
            if self.persistence.is_some() {
                if let Err(e) = self.load_persistent_attrs(id, None) {
                    tracing::error!(service = name, error = %e, "loading persistent attrs failed");
                }
            }
            self.register_service(name, id);
        }
        if flags.contains(GobjFlags::YUNO) {
            self.yuno = Some(id);
        }
        if flags.contains(GobjFlags::DEFAULT_SERVICE) {
            self.default_service = Some(id);
        }
        if !flags.contains(GobjFlags::YUNO) {
            if let Some(parent_node) = parent.and_then(|p| self.gobjs.get_mut(&p)) {
                parent_node.children.push(id);
            }
        }

        gclass.methods().mt_create(self, id, &kw);
        match self.gobjs.get_mut(&id) {
            Some(node) => node.created = true,
            None => {
                tracing::error!(gobj = %id, "gobj destroyed inside mt_create");
                return Err(GobjError::GobjNotFound(id));
            }
        }
        // Counted once created; destroy releases only created objects.
        if let Some(entry) = self.class_entry_mut(gclass_name) {
            entry.instances += 1;
        }

        if let Some(parent_id) = parent.filter(|_| !flags.contains(GobjFlags::YUNO)) {
            if let Some(parent_class) = self.gobjs.get(&parent_id).map(|p| p.gclass.clone()) {
                parent_class.methods().mt_child_added(self, parent_id, id);
            }
        }

        if self.is_tracing(id, TraceLevels::CREATE_DELETE) {
            tracing::info!(target: "gobj::trace", gobj = %self.full_name(id), "created");
        }

        if let Some(yuno) = self.yuno {
            if let Some(yuno_class) = self.gobjs.get(&yuno).map(|y| y.gclass.clone()) {
                yuno_class.methods().mt_gobj_created(self, yuno, id);
            }
        }

        Ok(id)
    }

    /// Create the yuno (root)
    pub fn create_yuno(&mut self, name: &str, gclass: &str, kw: Json) -> Result<GobjId> {
        self.create_gobj(name, gclass, kw, None, GobjFlags::YUNO)
    }

    /// Create a named service
    pub fn create_service(&mut self, name: &str, gclass: &str, kw: Json, parent: GobjId) -> Result<GobjId> {
        self.create_gobj(name, gclass, kw, Some(parent), GobjFlags::SERVICE)
    }

    /// Create the default service
    pub fn create_default_service(
        &mut self,
        name: &str,
        gclass: &str,
        kw: Json,
        parent: GobjId,
    ) -> Result<GobjId> {
        self.create_gobj(name, gclass, kw, Some(parent), GobjFlags::DEFAULT_SERVICE)
    }

    /// Create a plain child
    pub fn create_child(&mut self, name: &str, gclass: &str, kw: Json, parent: GobjId) -> Result<GobjId> {
        self.create_gobj(name, gclass, kw, Some(parent), GobjFlags::empty())
    }

    pub fn create_volatil(&mut self, name: &str, gclass: &str, kw: Json, parent: GobjId) -> Result<GobjId> {
        self.create_gobj(name, gclass, kw, Some(parent), GobjFlags::VOLATIL)
    }

    pub fn create_pure_child(&mut self, name: &str, gclass: &str, kw: Json, parent: GobjId) -> Result<GobjId> {
        self.create_gobj(name, gclass, kw, Some(parent), GobjFlags::PURE_CHILD)
    }

    /// Build a subtree from its declarative description.
    ///
    /// Without a parent the node becomes the yuno. A child marked
    /// `as_bottom` is set as the bottom object of its parent.
    pub fn create_tree(&mut self, parent: Option<GobjId>, node: &NodeConfig) -> Result<GobjId> {
        let mut flags = node.gobj_flags();
        if parent.is_none() {
            flags.insert(GobjFlags::YUNO);
        }
        let id = self.create_gobj(&node.name, &node.gclass, node.kw.clone(), parent, flags)?;
        if node.disabled {
            if let Some(gobj) = self.gobjs.get_mut(&id) {
                gobj.disabled = true;
            }
        }
        for child in &node.children {
            let child_id = self.create_tree(Some(id), child)?;
            if child.as_bottom {
                self.set_bottom_gobj(id, Some(child_id))?;
            }
        }
        Ok(id)
    }

    fn apply_settings_and_kw(&self, node: &mut Gobj, kw: &Json) -> Result<()> {
        let gclass = node.gclass.clone();
        for key in [gclass.name(), node.name.as_str()] {
            let Some(settings) = self.settings.global_settings.get(key) else {
                continue;
            };
            for (attr, value) in settings {
                let Some(desc) = gclass.attr_desc(attr) else {
                    tracing::debug!(gclass = %gclass.name(), attr = %attr, "setting for unknown attr ignored");
                    continue;
                };
                let value = desc.coerce(value.clone()).inspect_err(|e| {
                    tracing::error!(gobj = %node.short_name(), attr = %attr, error = %e, "bad setting value");
                })?;
                node.attrs.insert(attr.clone(), value);
            }
        }

        let entries = match kw {
            Json::Null => return Ok(()),
            Json::Object(map) => map,
            other => {
                tracing::error!(gobj = %node.short_name(), kw = %other, "kw must be an object");
                return Err(GobjError::Parameter(format!("{}: kw must be an object", node.short_name())));
            }
        };
        for (attr, value) in entries {
            let Some(desc) = gclass.attr_desc(attr) else {
                if !attr.starts_with("__") && !gclass.has_flag(GclassFlags::IGNORE_UNKNOWN_ATTRS) {
                    tracing::error!(gobj = %node.short_name(), attr = %attr, "attr not found");
                }
                continue;
            };
            let value = desc.coerce(value.clone()).inspect_err(|e| {
                tracing::error!(gobj = %node.short_name(), attr = %attr, error = %e, "bad attr value");
            })?;
            node.attrs.insert(attr.clone(), value);
        }
        Ok(())
    }

    fn register_service(&mut self, name: &str, id: GobjId) {
        if let Some(previous) = self.services.insert(name.to_string(), id) {
            tracing::warn!(service = name, previous = %previous, "service already registered, replaced");
        }
    }

    fn deregister_service(&mut self, name: &str, id: GobjId) {
        if self.services.get(name) == Some(&id) {
            self.services.remove(name);
        } else {
            tracing::error!(service = name, gobj = %id, "service not registered");
        }
    }

    /// Destroy an object and its subtree.
    ///
    /// A second call while the first is in progress is refused.
    pub fn destroy(&mut self, id: GobjId) -> Result<()> {
        let node = self.gobjs.get_mut(&id).ok_or_else(|| {
            tracing::error!(gobj = %id, "destroy: gobj not found");
            GobjError::GobjNotFound(id)
        })?;
        if node.destroying {
            let name = node.short_name().to_string();
            tracing::error!(gobj = %name, "gobj already destroying");
            return Err(GobjError::Destroying(name));
        }
        node.destroying = true;
        let parent = node.parent;
        let flags = node.flags;
        let name = node.name.clone();
        let gclass = node.gclass.clone();
        let (playing, running, created) = (node.playing, node.running, node.created);

        if self.is_tracing(id, TraceLevels::CREATE_DELETE) {
            tracing::info!(target: "gobj::trace", gobj = %self.full_name(id), "destroying");
        }

        if let Some(parent_id) = parent {
            if let Some(parent_class) = self.gobjs.get(&parent_id).map(|p| p.gclass.clone()) {
                parent_class.methods().mt_child_removed(self, parent_id, id);
            }
        }

        if flags.contains(GobjFlags::SERVICE) {
            self.deregister_service(&name, id);
        }

        if playing {
            tracing::error!(gobj = %self.full_name(id), "destroying a playing gobj");
            self.force_pause(id);
        }
        if running {
            tracing::error!(gobj = %self.full_name(id), "destroying a running gobj");
            self.force_stop(id);
        }

        self.unsubscribe_all(id);

        if let Some(parent_node) = parent.and_then(|p| self.gobjs.get_mut(&p)) {
            parent_node.children.retain(|c| *c != id);
        }

        self.destroy_childs(id);

        if created {
            gclass.methods().mt_destroy(self, id);
        }

        if self.is_tracing(id, TraceLevels::CREATE_DELETE) {
            tracing::info!(target: "gobj::trace", gobj = %self.full_name(id), "destroyed");
        }

        if let Some(mut node) = self.gobjs.remove(&id) {
            node.destroyed = true;
        }
        if self.yuno == Some(id) {
            self.yuno = None;
        }
        if self.default_service == Some(id) {
            self.default_service = None;
        }
        if created {
            if let Some(entry) = self.class_entry_mut(gclass.name()) {
                entry.instances = entry.instances.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// Destroy every child still alive, first to last
    pub fn destroy_childs(&mut self, id: GobjId) {
        let children = self.children(id).to_vec();
        for child in children {
            if self.is_destroying(child) {
                continue;
            }
            if let Err(e) = self.destroy(child) {
                tracing::error!(gobj = %child, error = %e, "destroying child failed");
            }
        }
    }

    /// Object by handle
    pub fn gobj(&self, id: GobjId) -> Option<&Gobj> {
        self.gobjs.get(&id)
    }

    pub(crate) fn gobj_mut(&mut self, id: GobjId) -> Option<&mut Gobj> {
        self.gobjs.get_mut(&id)
    }

    /// Object by handle, failing for destroyed handles
    pub(crate) fn live(&self, id: GobjId) -> Result<&Gobj> {
        self.gobjs.get(&id).ok_or(GobjError::GobjNotFound(id))
    }

    pub fn yuno(&self) -> Option<GobjId> {
        self.yuno
    }

    pub fn default_service(&self) -> Option<GobjId> {
        self.default_service
    }

    pub fn name(&self, id: GobjId) -> Option<&str> {
        self.gobj(id).map(|g| g.name())
    }

    pub fn gclass_name(&self, id: GobjId) -> Option<&str> {
        self.gobj(id).map(|g| g.gclass_name())
    }

    pub fn parent(&self, id: GobjId) -> Option<GobjId> {
        self.gobj(id).and_then(|g| g.parent)
    }

    /// Children handles, empty for unknown handles
    pub fn children(&self, id: GobjId) -> &[GobjId] {
        self.gobj(id).map(|g| g.children.as_slice()).unwrap_or(&[])
    }

    /// `gclass^name`, or `???` for an unknown handle
    pub fn short_name(&self, id: GobjId) -> String {
        self.gobj(id)
            .map(|g| g.short_name().to_string())
            .unwrap_or_else(|| "???".to_string())
    }

    /// Short names from the yuno down to the object, joined with backticks
    pub fn full_name(&self, id: GobjId) -> String {
        let Some(gobj) = self.gobj(id) else {
            return "???".to_string();
        };
        gobj.full_name
            .get_or_init(|| {
                let mut names = vec![gobj.short_name().to_string()];
                let mut visited = HashSet::from([id]);
                let mut cursor = gobj.parent;
                while let Some(pid) = cursor {
                    if !visited.insert(pid) {
                        break;
                    }
                    match self.gobj(pid) {
                        Some(parent) => {
                            names.push(parent.short_name().to_string());
                            cursor = parent.parent;
                        }
                        None => break,
                    }
                }
                names.reverse();
                names.join("`")
            })
            .clone()
    }

    /// Service by name; a miss is logged only when `verbose`
    pub fn find_service(&self, service: &str, verbose: bool) -> Option<GobjId> {
        let found = self.services.get(service).copied();
        if found.is_none() && (verbose || self.settings.verbose_lookups) {
            tracing::error!(service, "service not found");
        }
        found
    }

    /// Registered services, sorted by name
    pub fn services(&self) -> Vec<(String, GobjId)> {
        self.services.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// First child named `name`
    pub fn child_by_name(&self, parent: GobjId, name: &str) -> Option<GobjId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.gobj(*c).is_some_and(|g| g.name == name))
    }

    /// Resolve a backtick-separated path.
    ///
    /// The first segment names the yuno, a service, or one of the aliases
    /// `__yuno__` / `__default_service__`; the rest descend through
    /// children matched by `name` or `gclass^name`.
    pub fn find_gobj(&self, path: &str) -> Option<GobjId> {
        let mut segments = path.split('`').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = match first {
            PATH_YUNO => self.yuno,
            PATH_DEFAULT_SERVICE => self.default_service,
            _ => self
                .yuno
                .filter(|y| self.matches_segment(*y, first))
                .or_else(|| self.services.get(first).copied()),
        };

        for segment in segments {
            let parent = current?;
            current = self
                .children(parent)
                .iter()
                .copied()
                .find(|c| self.matches_segment(*c, segment));
        }

        if current.is_none() && self.settings.verbose_lookups {
            tracing::warn!(path, "gobj not found");
        }
        current
    }

    fn matches_segment(&self, id: GobjId, segment: &str) -> bool {
        self.gobj(id)
            .is_some_and(|g| g.name == segment || g.short_name() == segment)
    }

    /// Set or clear the bottom object.
    ///
    /// Replacing an existing bottom is logged; a bottom whose own chain
    /// leads back to `id` is refused.
    pub fn set_bottom_gobj(&mut self, id: GobjId, bottom: Option<GobjId>) -> Result<()> {
        self.live(id)?;
        if let Some(bottom_id) = bottom {
            self.live(bottom_id)?;
            let mut visited = HashSet::new();
            let mut cursor = Some(bottom_id);
            while let Some(b) = cursor {
                if b == id {
                    tracing::error!(
                        gobj = %self.full_name(id),
                        bottom = %self.full_name(bottom_id),
                        "bottom gobj would close a cycle"
                    );
                    return Err(GobjError::Parameter(format!(
                        "{}: bottom chain cycle",
                        self.short_name(id)
                    )));
                }
                if !visited.insert(b) {
                    break;
                }
                cursor = self.gobj(b).and_then(|g| g.bottom);
            }
        }

        if self.is_tracing(id, TraceLevels::MACHINE) {
            tracing::info!(
                target: "gobj::trace",
                gobj = %self.short_name(id),
                bottom = %bottom.map(|b| self.short_name(b)).unwrap_or_default(),
                "set_bottom_gobj"
            );
        }
        let previous = self.gobj(id).and_then(|g| g.bottom);
        if let (Some(prev), Some(new)) = (previous, bottom) {
            tracing::warn!(
                gobj = %self.full_name(id),
                prev_gobj = %self.full_name(prev),
                new_gobj = %self.full_name(new),
                "bottom_gobj already set"
            );
        }
        if let Some(node) = self.gobj_mut(id) {
            node.bottom = bottom;
        }
        Ok(())
    }

    /// Next object of the bottom chain
    pub fn bottom_gobj(&self, id: GobjId) -> Option<GobjId> {
        self.gobj(id).and_then(|g| g.bottom)
    }

    /// Deepest object of the bottom chain, `None` without bottom
    pub fn last_bottom_gobj(&self, id: GobjId) -> Option<GobjId> {
        let mut visited = HashSet::from([id]);
        let mut last = None;
        let mut cursor = self.bottom_gobj(id);
        while let Some(b) = cursor {
            if !visited.insert(b) {
                break;
            }
            last = Some(b);
            cursor = self.bottom_gobj(b);
        }
        last
    }

    /// Attach typed private data
    pub fn set_priv<T: Any>(&mut self, id: GobjId, data: T) -> Result<()> {
        let node = self.gobj_mut(id).ok_or(GobjError::GobjNotFound(id))?;
        node.private = Some(Box::new(data));
        Ok(())
    }

    pub fn priv_ref<T: Any>(&self, id: GobjId) -> Option<&T> {
        self.gobj(id)
            .and_then(|g| g.private.as_ref())
            .and_then(|p| p.downcast_ref::<T>())
    }

    pub fn priv_mut<T: Any>(&mut self, id: GobjId) -> Option<&mut T> {
        self.gobj_mut(id)
            .and_then(|g| g.private.as_mut())
            .and_then(|p| p.downcast_mut::<T>())
    }

    pub fn is_running(&self, id: GobjId) -> bool {
        self.gobj(id).is_some_and(|g| g.running)
    }

    pub fn is_playing(&self, id: GobjId) -> bool {
        self.gobj(id).is_some_and(|g| g.playing)
    }

    pub fn is_disabled(&self, id: GobjId) -> bool {
        self.gobj(id).is_some_and(|g| g.disabled)
    }

    pub fn is_service(&self, id: GobjId) -> bool {
        self.gobj(id)
            .is_some_and(|g| g.flags.contains(GobjFlags::SERVICE))
    }

    pub fn is_volatil(&self, id: GobjId) -> bool {
        self.gobj(id)
            .is_some_and(|g| g.flags.contains(GobjFlags::VOLATIL))
    }

    pub fn is_pure_child(&self, id: GobjId) -> bool {
        self.gobj(id)
            .is_some_and(|g| g.flags.contains(GobjFlags::PURE_CHILD))
    }

    /// True for destroying objects and for handles that no longer resolve
    pub fn is_destroying(&self, id: GobjId) -> bool {
        self.gobj(id).map_or(true, |g| g.destroying || g.destroyed)
    }

    /// Snapshot of a subtree: names, states and lifecycle flags
    pub fn view_tree(&self, id: GobjId) -> Json {
        let Some(gobj) = self.gobj(id) else {
            return Json::Null;
        };
        let childs: Vec<Json> = gobj.children.iter().map(|c| self.view_tree(*c)).collect();
        json!({
            "name": gobj.name,
            "gclass": gobj.gclass_name(),
            "state": gobj.current_state(),
            "running": gobj.running,
            "playing": gobj.playing,
            "disabled": gobj.disabled,
            "service": gobj.flags.contains(GobjFlags::SERVICE),
            "bottom": gobj.bottom.map(|b| self.short_name(b)),
            "childs": childs,
        })
    }
}
