//! Attribute access
//!
//! Reads and writes resolve the attribute on the object first and then
//! along its bottom chain. Values are coerced to the declared type on
//! write. The class hooks `mt_reading` and `mt_writing` run around each
//! access; `mt_writing` stays silent until creation has finished.

use crate::error::{GobjError, Result};
use crate::runtime::Runtime;
use crate::sdata::{self, SdataDesc};
use crate::types::{GobjId, Json, JsonMap, SdFlags};
use std::collections::HashSet;

impl Runtime {
    /// First object of the bottom chain (starting at `id`) declaring `attr`
    pub fn attr_owner(&self, id: GobjId, attr: &str) -> Option<GobjId> {
        let mut visited = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !visited.insert(current) {
                tracing::error!(gobj = %self.full_name(id), attr, "bottom chain cycle");
                return None;
            }
            let gobj = self.gobj(current)?;
            if gobj.gclass.attr_desc(attr).is_some() {
                return Some(current);
            }
            cursor = gobj.bottom;
        }
        None
    }

    pub fn has_attr(&self, id: GobjId, attr: &str) -> bool {
        self.attr_owner(id, attr).is_some()
    }

    /// Descriptor of `attr`, searched along the bottom chain
    pub fn attr_desc(&self, id: GobjId, attr: &str) -> Option<&SdataDesc> {
        let owner = self.attr_owner(id, attr)?;
        self.gobj(owner).and_then(|g| g.gclass.attr_desc(attr))
    }

    pub fn is_readable_attr(&self, id: GobjId, attr: &str) -> bool {
        self.attr_desc(id, attr).is_some_and(SdataDesc::is_readable)
    }

    pub fn is_writable_attr(&self, id: GobjId, attr: &str) -> bool {
        self.attr_desc(id, attr).is_some_and(SdataDesc::is_writable)
    }

    /// Current value without running `mt_reading`
    pub fn peek_attr(&self, id: GobjId, attr: &str) -> Option<&Json> {
        let owner = self.attr_owner(id, attr)?;
        self.gobj(owner).and_then(|g| g.attrs.get(attr))
    }

    /// Current value, after the owner's `mt_reading` hook
    pub fn read_attr(&mut self, id: GobjId, attr: &str) -> Option<Json> {
        let Some(owner) = self.attr_owner(id, attr) else {
            tracing::warn!(gobj = %self.full_name(id), attr, "attr not found");
            return None;
        };
        let gobj = self.gobj(owner)?;
        if !gobj.destroying {
            let gclass = gobj.gclass.clone();
            gclass.methods().mt_reading(self, owner, attr);
        }
        self.gobj(owner).and_then(|g| g.attrs.get(attr).cloned())
    }

    pub fn read_str_attr(&mut self, id: GobjId, attr: &str) -> Option<String> {
        match self.read_attr(id, attr)? {
            Json::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn read_bool_attr(&mut self, id: GobjId, attr: &str) -> Option<bool> {
        self.read_attr(id, attr)?.as_bool()
    }

    pub fn read_integer_attr(&mut self, id: GobjId, attr: &str) -> Option<i64> {
        self.read_attr(id, attr)?.as_i64()
    }

    pub fn read_real_attr(&mut self, id: GobjId, attr: &str) -> Option<f64> {
        self.read_attr(id, attr)?.as_f64()
    }

    pub fn read_json_attr(&mut self, id: GobjId, attr: &str) -> Option<Json> {
        self.read_attr(id, attr)
    }

    pub fn read_pointer_attr(&mut self, id: GobjId, attr: &str) -> Option<u64> {
        self.read_attr(id, attr)?.as_u64()
    }

    /// Coerce and store `value`, then run the owner's `mt_writing` hook
    pub fn write_attr(&mut self, id: GobjId, attr: &str, value: Json) -> Result<()> {
        let Some(owner) = self.attr_owner(id, attr) else {
            tracing::error!(gobj = %self.full_name(id), attr, "attr not found");
            return Err(GobjError::AttrNotFound {
                gobj: self.full_name(id),
                attr: attr.to_string(),
            });
        };
        let gobj = self.live(owner)?;
        if gobj.destroying {
            let name = self.full_name(owner);
            tracing::error!(gobj = %name, attr, "write_attr: gobj destroying");
            return Err(GobjError::Destroying(name));
        }
        let gclass = gobj.gclass.clone();
        let created = gobj.created;
        let Some(desc) = gclass.attr_desc(attr) else {
            return Err(GobjError::Internal(format!("{attr}: descriptor vanished")));
        };
        let value = desc.coerce(value).inspect_err(|e| {
            tracing::error!(gobj = %self.full_name(owner), attr, error = %e, "write_attr failed");
        })?;
        if let Some(node) = self.gobj_mut(owner) {
            node.attrs.insert(attr.to_string(), value);
        }
        if created {
            gclass.methods().mt_writing(self, owner, attr);
        }
        Ok(())
    }

    pub fn write_str_attr(&mut self, id: GobjId, attr: &str, value: &str) -> Result<()> {
        self.write_attr(id, attr, Json::String(value.to_string()))
    }

    pub fn write_bool_attr(&mut self, id: GobjId, attr: &str, value: bool) -> Result<()> {
        self.write_attr(id, attr, Json::Bool(value))
    }

    pub fn write_integer_attr(&mut self, id: GobjId, attr: &str, value: i64) -> Result<()> {
        self.write_attr(id, attr, Json::from(value))
    }

    /// Non-finite values cannot be stored
    pub fn write_real_attr(&mut self, id: GobjId, attr: &str, value: f64) -> Result<()> {
        let number = serde_json::Number::from_f64(value).ok_or_else(|| {
            tracing::error!(gobj = %self.full_name(id), attr, value, "real value not finite");
            GobjError::Parameter(format!("{attr}: {value} is not a finite real"))
        })?;
        self.write_attr(id, attr, Json::Number(number))
    }

    pub fn write_json_attr(&mut self, id: GobjId, attr: &str, value: Json) -> Result<()> {
        self.write_attr(id, attr, value)
    }

    pub fn write_pointer_attr(&mut self, id: GobjId, attr: &str, value: u64) -> Result<()> {
        self.write_attr(id, attr, Json::from(value))
    }

    /// Own attributes whose flags intersect `mask`; an empty mask selects all
    pub fn read_attrs(&self, id: GobjId, mask: SdFlags) -> Result<JsonMap> {
        let gobj = self.live(id)?;
        Ok(gobj
            .gclass
            .attrs()
            .iter()
            .filter(|desc| mask.is_empty() || desc.flags.intersects(mask))
            .filter_map(|desc| {
                gobj.attrs
                    .get(&desc.name)
                    .map(|v| (desc.name.clone(), v.clone()))
            })
            .collect())
    }

    /// Write the keys of `kw` that name own attributes matching `mask`.
    ///
    /// Other keys are ignored. The first coercion failure stops the update.
    pub fn write_attrs(&mut self, id: GobjId, kw: &JsonMap, mask: SdFlags) -> Result<()> {
        let gclass = self.live(id)?.gclass.clone();
        for (attr, value) in kw {
            let Some(desc) = gclass.attr_desc(attr) else {
                tracing::debug!(gobj = %self.full_name(id), attr = %attr, "write_attrs: key ignored");
                continue;
            };
            if !mask.is_empty() && !desc.flags.intersects(mask) {
                continue;
            }
            self.write_attr(id, attr, value.clone())?;
        }
        Ok(())
    }

    /// Restore the defaults of the VOLATIL attributes
    pub fn reset_volatil_attrs(&mut self, id: GobjId) -> Result<()> {
        self.reset_attrs_flagged(id, SdFlags::VOLATIL)
    }

    pub(crate) fn reset_attrs_flagged(&mut self, id: GobjId, mask: SdFlags) -> Result<()> {
        let node = self.gobj_mut(id).ok_or(GobjError::GobjNotFound(id))?;
        let gclass = node.gclass.clone();
        for desc in gclass.attrs().iter().filter(|d| d.flags.intersects(mask)) {
            node.attrs.insert(desc.name.clone(), desc.default_value());
        }
        Ok(())
    }

    /// Names of the REQUIRED attributes still holding an empty value
    pub fn missing_required_attrs(&self, id: GobjId) -> Vec<String> {
        let Some(gobj) = self.gobj(id) else {
            return Vec::new();
        };
        gobj.gclass
            .attrs()
            .iter()
            .filter(|desc| desc.is_required())
            .filter(|desc| desc.is_missing(gobj.attrs.get(&desc.name).unwrap_or(&Json::Null)))
            .map(|desc| desc.name.clone())
            .collect()
    }

    pub fn read_user_data(&self, id: GobjId, key: &str) -> Option<&Json> {
        self.gobj(id).and_then(|g| g.user_data.get(key))
    }

    pub fn write_user_data(&mut self, id: GobjId, key: &str, value: Json) -> Result<()> {
        let node = self.gobj_mut(id).ok_or(GobjError::GobjNotFound(id))?;
        node.user_data.insert(key.to_string(), value);
        Ok(())
    }

    pub fn read_stat(&self, id: GobjId, key: &str) -> Option<&Json> {
        self.gobj(id).and_then(|g| g.stats.get(key))
    }

    pub fn set_stat(&mut self, id: GobjId, key: &str, value: Json) -> Result<()> {
        let node = self.gobj_mut(id).ok_or(GobjError::GobjNotFound(id))?;
        node.stats.insert(key.to_string(), value);
        Ok(())
    }

    /// Add `delta` to an integer counter (absent counts as 0) and return the new value
    pub fn incr_stat(&mut self, id: GobjId, key: &str, delta: i64) -> Result<i64> {
        let node = self.gobj_mut(id).ok_or(GobjError::GobjNotFound(id))?;
        let current = node.stats.get(key).and_then(Json::as_i64).unwrap_or(0);
        let value = current.saturating_add(delta);
        node.stats.insert(key.to_string(), Json::from(value));
        Ok(value)
    }

    /// Zero the stats map: numbers to 0, booleans to false, lists emptied
    pub(crate) fn reset_stats(&mut self, id: GobjId) {
        if let Some(node) = self.gobj_mut(id) {
            for value in node.stats.values_mut() {
                match value {
                    Json::Number(n) if n.is_f64() => *value = Json::from(0.0),
                    Json::Number(_) => *value = Json::from(0),
                    Json::Bool(_) => *value = Json::Bool(false),
                    Json::Array(items) => items.clear(),
                    _ => {}
                }
            }
        }
    }
}

/// Schema of the attributes matching `mask` (all when empty)
pub fn schema_with_flags(schema: &[SdataDesc], mask: SdFlags) -> Vec<&SdataDesc> {
    schema
        .iter()
        .filter(|desc| mask.is_empty() || desc.flags.intersects(mask))
        .collect()
}

/// Typed default store for the attributes matching `mask`
pub fn defaults_with_flags(schema: &[SdataDesc], mask: SdFlags) -> JsonMap {
    let selected: Vec<SdataDesc> = schema_with_flags(schema, mask).into_iter().cloned().collect();
    sdata::build_store(&selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gclass::GClassBuilder;
    use crate::methods::GMethods;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl GMethods for Recorder {
        fn mt_reading(&self, _rt: &mut Runtime, _gobj: GobjId, attr: &str) {
            self.0.lock().unwrap().push(format!("read:{attr}"));
        }

        fn mt_writing(&self, _rt: &mut Runtime, _gobj: GobjId, attr: &str) {
            self.0.lock().unwrap().push(format!("write:{attr}"));
        }
    }

    fn runtime(log: Arc<Mutex<Vec<String>>>) -> (Runtime, GobjId) {
        let mut rt = Runtime::with_defaults();
        rt.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))
            .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_CONF")
                .state("ST_IDLE", vec![])
                .methods(Recorder(log))
                .attrs([
                    SdataDesc::string("url", SdFlags::WR | SdFlags::REQUIRED, "", "Endpoint"),
                    SdataDesc::boolean("enabled", SdFlags::RD, "true", "Enabled"),
                    SdataDesc::integer("retries", SdFlags::PERSIST, "3", "Retries"),
                    SdataDesc::real("ratio", SdFlags::WR, "0.5", "Ratio"),
                    SdataDesc::list("peers", SdFlags::WR, "[]", "Peers"),
                    SdataDesc::json("extra", SdFlags::NOTACCESS, "", "Extra"),
                    SdataDesc::pointer("handle", SdFlags::VOLATIL, "Handle"),
                    SdataDesc::integer("txed", SdFlags::STATS | SdFlags::VOLATIL, "0", "Sent"),
                ]),
        )
        .unwrap();
        let yuno = rt.create_yuno("yuno", "C_YUNO", json!({})).unwrap();
        (rt, yuno)
    }

    #[test]
    fn test_typed_round_trip() {
        let (mut rt, yuno) = runtime(Arc::default());
        let conf = rt.create_child("conf", "C_CONF", json!({}), yuno).unwrap();

        rt.write_str_attr(conf, "url", "tcp://localhost:7000").unwrap();
        assert_eq!(rt.read_str_attr(conf, "url").as_deref(), Some("tcp://localhost:7000"));
        rt.write_bool_attr(conf, "enabled", false).unwrap();
        assert_eq!(rt.read_bool_attr(conf, "enabled"), Some(false));
        rt.write_integer_attr(conf, "retries", -4).unwrap();
        assert_eq!(rt.read_integer_attr(conf, "retries"), Some(-4));
        rt.write_real_attr(conf, "ratio", 2.25).unwrap();
        assert_eq!(rt.read_real_attr(conf, "ratio"), Some(2.25));
        rt.write_json_attr(conf, "extra", json!({"a": [1]})).unwrap();
        assert_eq!(rt.read_json_attr(conf, "extra"), Some(json!({"a": [1]})));
        rt.write_pointer_attr(conf, "handle", 0xdead).unwrap();
        assert_eq!(rt.read_pointer_attr(conf, "handle"), Some(0xdead));
    }

    #[test]
    fn test_coercion_and_rejection() {
        let (mut rt, yuno) = runtime(Arc::default());
        let conf = rt.create_child("conf", "C_CONF", json!({}), yuno).unwrap();

        rt.write_attr(conf, "retries", json!("12")).unwrap();
        assert_eq!(rt.read_integer_attr(conf, "retries"), Some(12));
        rt.write_attr(conf, "peers", json!("[\"a\", \"b\"]")).unwrap();
        assert_eq!(rt.read_json_attr(conf, "peers"), Some(json!(["a", "b"])));

        assert!(rt.write_attr(conf, "peers", json!("{\"a\": 1}")).is_err());
        assert!(rt.write_attr(conf, "handle", json!("0x10")).is_err());
        assert!(rt.write_real_attr(conf, "ratio", f64::NAN).is_err());
        assert!(rt.write_attr(conf, "nope", json!(1)).is_err());
        assert_eq!(rt.read_json_attr(conf, "peers"), Some(json!(["a", "b"])));
    }

    #[test]
    fn test_hooks_fire_after_creation_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (mut rt, yuno) = runtime(log.clone());
        let conf = rt
            .create_child("conf", "C_CONF", json!({"url": "x"}), yuno)
            .unwrap();
        assert!(log.lock().unwrap().is_empty());

        rt.write_str_attr(conf, "url", "y").unwrap();
        rt.read_str_attr(conf, "url");
        assert_eq!(*log.lock().unwrap(), vec!["write:url", "read:url"]);
        assert_eq!(rt.peek_attr(conf, "url"), Some(&json!("y")));
    }

    #[test]
    fn test_bottom_delegation() {
        let (mut rt, yuno) = runtime(Arc::default());
        rt.register_gclass(GClassBuilder::new("C_WRAP").state("ST_IDLE", vec![]))
            .unwrap();
        let wrap = rt.create_child("wrap", "C_WRAP", json!({}), yuno).unwrap();
        let conf = rt.create_child("conf", "C_CONF", json!({}), wrap).unwrap();

        assert!(!rt.has_attr(wrap, "retries"));
        rt.set_bottom_gobj(wrap, Some(conf)).unwrap();
        assert!(rt.has_attr(wrap, "retries"));
        assert_eq!(rt.attr_owner(wrap, "retries"), Some(conf));
        rt.write_integer_attr(wrap, "retries", 9).unwrap();
        assert_eq!(rt.read_integer_attr(conf, "retries"), Some(9));
        assert!(rt.is_writable_attr(wrap, "retries"));
        assert!(!rt.is_writable_attr(wrap, "enabled"));
        assert!(rt.is_readable_attr(wrap, "enabled"));
    }

    #[test]
    fn test_masks_and_resets() {
        let (mut rt, yuno) = runtime(Arc::default());
        let conf = rt.create_child("conf", "C_CONF", json!({}), yuno).unwrap();

        let persistent = rt.read_attrs(conf, SdFlags::PERSIST).unwrap();
        assert_eq!(persistent.keys().collect::<Vec<_>>(), vec!["retries"]);

        let kw = json!({"url": "u", "retries": 8, "ghost": 1});
        rt.write_attrs(conf, kw.as_object().unwrap(), SdFlags::ATTR_WRITABLE)
            .unwrap();
        assert_eq!(rt.read_integer_attr(conf, "retries"), Some(8));
        assert_eq!(rt.read_str_attr(conf, "url").as_deref(), Some("u"));

        rt.write_pointer_attr(conf, "handle", 5).unwrap();
        rt.write_integer_attr(conf, "txed", 40).unwrap();
        rt.reset_volatil_attrs(conf).unwrap();
        assert_eq!(rt.read_pointer_attr(conf, "handle"), Some(0));
        assert_eq!(rt.read_integer_attr(conf, "txed"), Some(0));

        let defaults = defaults_with_flags(rt.gobj(conf).unwrap().gclass().attrs(), SdFlags::ANY_STATS);
        assert_eq!(defaults.get("txed"), Some(&json!(0)));
    }

    #[test]
    fn test_required_attrs() {
        let (mut rt, yuno) = runtime(Arc::default());
        let conf = rt.create_child("conf", "C_CONF", json!({}), yuno).unwrap();
        assert_eq!(rt.missing_required_attrs(conf), vec!["url"]);
        rt.write_str_attr(conf, "url", "x").unwrap();
        assert!(rt.missing_required_attrs(conf).is_empty());
    }

    #[test]
    fn test_user_data_and_stats() {
        let (mut rt, yuno) = runtime(Arc::default());
        rt.write_user_data(yuno, "owner", json!("ops")).unwrap();
        assert_eq!(rt.read_user_data(yuno, "owner"), Some(&json!("ops")));

        assert_eq!(rt.incr_stat(yuno, "hits", 2).unwrap(), 2);
        assert_eq!(rt.incr_stat(yuno, "hits", 3).unwrap(), 5);
        rt.set_stat(yuno, "label", json!("x")).unwrap();
        rt.reset_stats(yuno);
        assert_eq!(rt.read_stat(yuno, "hits"), Some(&json!(0)));
        assert_eq!(rt.read_stat(yuno, "label"), Some(&json!("x")));
    }
}
