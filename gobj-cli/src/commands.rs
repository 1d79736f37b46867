use crate::classes;
use anyhow::{anyhow, bail, Context, Result};
use gobj::{GobjId, Json, Runtime, YunoConfig};
use std::path::Path;

/// Load the config, register the demo classes, build the tree and run it
pub fn boot(config_path: &Path) -> Result<Runtime> {
    let config = YunoConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let mut rt = Runtime::start_up(config.runtime.clone());
    classes::register_all(&mut rt)?;
    let yuno = rt.create_tree(None, &config.yuno)?;
    if rt.has_attr(yuno, "node_uuid") {
        let uuid = rt.node_uuid()?;
        rt.write_str_attr(yuno, "node_uuid", &uuid)?;
    }

    rt.autostart_services();
    rt.autoplay_services();
    tracing::debug!(yuno = %rt.full_name(yuno), gobjs = config.yuno.count(), "yuno running");
    Ok(rt)
}

fn print_json(value: &Json) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_kw(kw: Option<&str>) -> Result<Json> {
    let Some(text) = kw else {
        return Ok(Json::Object(Default::default()));
    };
    let value: Json = serde_json::from_str(text).context("--kw is not valid JSON")?;
    if !value.is_object() {
        bail!("--kw must be a JSON object");
    }
    Ok(value)
}

fn lookup(rt: &Runtime, path: &str) -> Result<GobjId> {
    rt.find_gobj(path).ok_or_else(|| anyhow!("gobj not found: {path}"))
}

pub fn tree(rt: &mut Runtime) -> Result<()> {
    let yuno = rt.yuno().ok_or_else(|| anyhow!("no yuno"))?;
    print_json(&rt.view_tree(yuno))
}

pub fn classes(rt: &Runtime) -> Result<()> {
    let classes: Vec<Json> = rt
        .gclass_names()
        .iter()
        .filter_map(|name| rt.find_gclass(name))
        .map(|gclass| gclass.to_json())
        .collect();
    print_json(&Json::Array(classes))
}

pub fn command(rt: &mut Runtime, path: &str, line: &str, kw: Option<&str>) -> Result<()> {
    let id = lookup(rt, path)?;
    let kw = parse_kw(kw)?;
    let Some(response) = rt.command(id, line, kw, None) else {
        println!("{}", serde_json::json!({"result": 0, "comment": "dispatched as event"}));
        return Ok(());
    };
    print_json(&response)?;
    if response["result"].as_i64().unwrap_or(0) < 0 {
        bail!("{}", response["comment"].as_str().unwrap_or("command failed"));
    }
    Ok(())
}

pub fn stats(rt: &mut Runtime, path: &str, selector: &str) -> Result<()> {
    let id = lookup(rt, path)?;
    let response = rt.stats(id, selector, Json::Null, None);
    print_json(&response)
}

pub fn send(rt: &mut Runtime, path: &str, event: &str, kw: Option<&str>, count: u32) -> Result<()> {
    let id = lookup(rt, path)?;
    let kw = parse_kw(kw)?;
    for _ in 0..count {
        let ret = rt.send_event(id, event, kw.clone(), None)?;
        if ret < 0 {
            bail!("{event} refused by {path} ({ret})");
        }
    }
    stats(rt, path, "")
}
