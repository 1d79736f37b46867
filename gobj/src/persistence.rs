//! Persistent attributes
//!
//! A [`Persistence`] backend stores one JSON map per service. Implementors
//! only provide `read` and `write`; the key-filtered `load`, `save`,
//! `remove` and `list` operations are built on top of them.
//!
//! Only services persist, and only their PERSIST attributes.

use crate::error::{GobjError, Result};
use crate::runtime::Runtime;
use crate::types::{GobjId, Json, JsonMap, SdFlags};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}: stored attributes are not a JSON object")]
    NotAnObject(String),

    #[error("{0}: only services have persistent attributes")]
    NotService(String),

    #[error("no persistence backend installed")]
    NotConfigured,
}

type PResult<T> = std::result::Result<T, PersistenceError>;

/// Storage of persistent attributes keyed by service name
pub trait Persistence {
    /// Stored map of `service`; empty when nothing was saved
    fn read(&self, service: &str) -> PResult<JsonMap>;

    /// Replace the stored map of `service`
    fn write(&self, service: &str, attrs: JsonMap) -> PResult<()>;

    /// Stored values, restricted to `keys` when given
    fn load(&self, service: &str, keys: Option<&[String]>) -> PResult<JsonMap> {
        Ok(filter_keys(self.read(service)?, keys))
    }

    /// Store `attrs` (restricted to `keys`), keeping stored keys not being saved
    fn save(&self, service: &str, attrs: JsonMap, keys: Option<&[String]>) -> PResult<()> {
        let mut merged = filter_keys(attrs, keys);
        for (key, value) in self.read(service)? {
            merged.entry(key).or_insert(value);
        }
        self.write(service, merged)
    }

    /// Forget `keys`, or everything when none are given
    fn remove(&self, service: &str, keys: Option<&[String]>) -> PResult<()> {
        let remaining = match keys {
            None => JsonMap::new(),
            Some(keys) => {
                let mut stored = self.read(service)?;
                for key in keys {
                    stored.remove(key);
                }
                stored
            }
        };
        self.write(service, remaining)
    }

    fn list(&self, service: &str, keys: Option<&[String]>) -> PResult<JsonMap> {
        self.load(service, keys)
    }
}

fn filter_keys(mut map: JsonMap, keys: Option<&[String]>) -> JsonMap {
    if let Some(keys) = keys {
        map.retain(|k, _| keys.iter().any(|key| key == k));
    }
    map
}

/// In-process backend; clones share the same store
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    store: Arc<RwLock<HashMap<String, JsonMap>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Services with a stored map
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Persistence for MemoryPersistence {
    fn read(&self, service: &str) -> PResult<JsonMap> {
        Ok(self.store.read().get(service).cloned().unwrap_or_default())
    }

    fn write(&self, service: &str, attrs: JsonMap) -> PResult<()> {
        let mut store = self.store.write();
        if attrs.is_empty() {
            store.remove(service);
        } else {
            store.insert(service.to_string(), attrs);
        }
        Ok(())
    }
}

/// One `<service>.json` file per service under a directory
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    dir: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{service}.json"))
    }
}

impl Persistence for JsonFilePersistence {
    fn read(&self, service: &str) -> PResult<JsonMap> {
        let path = self.path(service);
        if !path.exists() {
            return Ok(JsonMap::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<Json>(&contents)? {
            Json::Object(map) => Ok(map),
            _ => Err(PersistenceError::NotAnObject(path.display().to_string())),
        }
    }

    fn write(&self, service: &str, attrs: JsonMap) -> PResult<()> {
        let path = self.path(service);
        if attrs.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            return Ok(());
        }
        std::fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(&Json::Object(attrs))?;
        std::fs::write(&path, contents)?;
        tracing::debug!(path = %path.display(), "persistent attrs written");
        Ok(())
    }
}

impl Runtime {
    /// Service name of `id`, or an error when it is not a service
    fn persistent_key(&self, id: GobjId) -> Result<String> {
        let gobj = self.live(id)?;
        if !self.is_service(id) {
            let name = self.full_name(id);
            tracing::error!(gobj = %name, "persistent attrs need a service");
            return Err(PersistenceError::NotService(name).into());
        }
        Ok(gobj.name().to_string())
    }

    fn backend(&self) -> Result<&dyn Persistence> {
        self.persistence
            .as_deref()
            .ok_or(GobjError::Persistence(PersistenceError::NotConfigured))
    }

    /// Overwrite PERSIST attributes with their stored values.
    ///
    /// Stored keys that are not PERSIST attributes are ignored. Runs
    /// automatically when a service is created.
    pub fn load_persistent_attrs(&mut self, id: GobjId, keys: Option<&[String]>) -> Result<()> {
        let service = self.persistent_key(id)?;
        let stored = self.backend()?.load(&service, keys)?;
        let gclass = self.live(id)?.gclass.clone();

        for (attr, value) in stored {
            let Some(desc) = gclass
                .attr_desc(&attr)
                .filter(|d| d.flags.contains(SdFlags::PERSIST))
            else {
                tracing::warn!(service = %service, attr = %attr, "stored attr is not persistent, ignored");
                continue;
            };
            let value = desc.coerce(value).inspect_err(|e| {
                tracing::error!(service = %service, attr = %attr, error = %e, "stored attr rejected");
            })?;
            if let Some(node) = self.gobj_mut(id) {
                node.attrs.insert(attr, value);
            }
        }
        Ok(())
    }

    /// Save the current PERSIST attributes (restricted to `keys` when given)
    pub fn save_persistent_attrs(&mut self, id: GobjId, keys: Option<&[String]>) -> Result<()> {
        let service = self.persistent_key(id)?;
        let attrs = self.read_attrs(id, SdFlags::PERSIST)?;
        self.backend()?.save(&service, attrs, keys)?;
        tracing::debug!(service = %service, "persistent attrs saved");
        Ok(())
    }

    pub fn remove_persistent_attrs(&mut self, id: GobjId, keys: Option<&[String]>) -> Result<()> {
        let service = self.persistent_key(id)?;
        self.backend()?.remove(&service, keys)?;
        Ok(())
    }

    /// Stored values of the service, not the live attributes
    pub fn list_persistent_attrs(&self, id: GobjId, keys: Option<&[String]>) -> Result<JsonMap> {
        let service = self.persistent_key(id)?;
        Ok(self.backend()?.list(&service, keys)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gclass::GClassBuilder;
    use crate::sdata::SdataDesc;
    use serde_json::json;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_memory_save_merges() {
        let store = MemoryPersistence::new();
        let mut first = JsonMap::new();
        first.insert("a".into(), json!(1));
        first.insert("b".into(), json!(2));
        store.save("svc", first, None).unwrap();

        let mut second = JsonMap::new();
        second.insert("a".into(), json!(10));
        second.insert("c".into(), json!(3));
        store.save("svc", second, Some(keys(&["a"]).as_slice())).unwrap();

        let stored = store.load("svc", None).unwrap();
        assert_eq!(Json::Object(stored), json!({"a": 10, "b": 2}));
    }

    #[test]
    fn test_memory_remove() {
        let store = MemoryPersistence::new();
        let mut attrs = JsonMap::new();
        attrs.insert("a".into(), json!(1));
        attrs.insert("b".into(), json!(2));
        store.save("svc", attrs, None).unwrap();

        store.remove("svc", Some(keys(&["a"]).as_slice())).unwrap();
        assert_eq!(Json::Object(store.list("svc", None).unwrap()), json!({"b": 2}));

        store.remove("svc", None).unwrap();
        assert!(store.services().is_empty());
    }

    #[test]
    fn test_json_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path().join("persist"));
        assert!(store.load("svc", None).unwrap().is_empty());

        let mut attrs = JsonMap::new();
        attrs.insert("port".into(), json!(8080));
        store.save("svc", attrs, None).unwrap();
        assert!(dir.path().join("persist/svc.json").exists());

        let reopened = JsonFilePersistence::new(dir.path().join("persist"));
        assert_eq!(reopened.load("svc", None).unwrap()["port"], 8080);

        reopened.remove("svc", None).unwrap();
        assert!(!dir.path().join("persist/svc.json").exists());
    }

    #[test]
    fn test_json_file_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("svc.json"), "[1, 2]").unwrap();
        let store = JsonFilePersistence::new(dir.path());
        assert!(matches!(
            store.load("svc", None),
            Err(PersistenceError::NotAnObject(_))
        ));
    }

    fn runtime(store: MemoryPersistence) -> (Runtime, GobjId) {
        let mut rt = Runtime::with_defaults();
        rt.set_persistence(store);
        rt.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))
            .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_CONF").state("ST_IDLE", vec![]).attrs([
                SdataDesc::integer("port", SdFlags::PERSIST, "80", "listen port"),
                SdataDesc::string("label", SdFlags::PERSIST, "", "label"),
                SdataDesc::integer("hits", SdFlags::RD, "0", "not persisted"),
            ]),
        )
        .unwrap();
        let yuno = rt.create_yuno("yuno", "C_YUNO", json!({})).unwrap();
        (rt, yuno)
    }

    #[test]
    fn test_service_round_trip() {
        let store = MemoryPersistence::new();
        let (mut rt, yuno) = runtime(store.clone());
        let conf = rt.create_service("conf", "C_CONF", json!({}), yuno).unwrap();

        rt.write_integer_attr(conf, "port", 9000).unwrap();
        rt.write_integer_attr(conf, "hits", 5).unwrap();
        rt.save_persistent_attrs(conf, None).unwrap();

        let stored = rt.list_persistent_attrs(conf, None).unwrap();
        assert_eq!(stored["port"], 9000);
        assert!(!stored.contains_key("hits"));
        assert_eq!(store.services(), vec!["conf"]);

        rt.destroy(conf).unwrap();
        let conf = rt.create_service("conf", "C_CONF", json!({"port": 1}), yuno).unwrap();
        assert_eq!(rt.read_integer_attr(conf, "port"), Some(9000));
    }

    #[test]
    fn test_load_ignores_foreign_keys() {
        let store = MemoryPersistence::new();
        let mut attrs = JsonMap::new();
        attrs.insert("hits".into(), json!(99));
        attrs.insert("label".into(), json!("kept"));
        store.write("conf", attrs).unwrap();

        let (mut rt, yuno) = runtime(store);
        let conf = rt.create_service("conf", "C_CONF", json!({}), yuno).unwrap();
        assert_eq!(rt.read_integer_attr(conf, "hits"), Some(0));
        assert_eq!(rt.read_str_attr(conf, "label").as_deref(), Some("kept"));
    }

    #[test]
    fn test_children_do_not_persist() {
        let (mut rt, yuno) = runtime(MemoryPersistence::new());
        let child = rt.create_child("conf", "C_CONF", json!({}), yuno).unwrap();
        let err = rt.save_persistent_attrs(child, None).unwrap_err();
        assert!(matches!(
            err,
            GobjError::Persistence(PersistenceError::NotService(_))
        ));
    }

    #[test]
    fn test_without_backend() {
        let mut rt = Runtime::with_defaults();
        rt.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))
            .unwrap();
        let yuno = rt.create_yuno("yuno", "C_YUNO", json!({})).unwrap();
        assert!(matches!(
            rt.save_persistent_attrs(yuno, None),
            Err(GobjError::Persistence(PersistenceError::NotConfigured))
        ));
    }
}
