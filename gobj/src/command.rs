//! Command and stats surface
//!
//! A class may carry a command table. `Runtime::command` parses a command
//! line against it: the first word selects the command (by name or alias,
//! case-insensitively), leading REQUIRED parameters are taken positionally,
//! the others come from kw or their defaults, and `key=value` words
//! override them. Every value goes through its parameter's type.
//!
//! Responses use the `{result, comment, schema, data}` envelope built by
//! [`build_command_response`].

use crate::runtime::Runtime;
use crate::sdata::{DataType, SdataDesc};
use crate::trace::TraceLevels;
use crate::types::{GobjId, Json, JsonMap, SdFlags};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

/// Command handler: `(runtime, gobj, command, kw, src) -> response`.
///
/// `None` means the response is delivered asynchronously.
pub type CommandFn =
    Arc<dyn Fn(&mut Runtime, GobjId, &str, Json, Option<GobjId>) -> Option<Json> + Send + Sync>;

/// Runtime-wide replacement of the command parser
pub type CommandParserFn =
    Arc<dyn Fn(&mut Runtime, GobjId, &str, Json, Option<GobjId>) -> Option<Json> + Send + Sync>;

/// Runtime-wide replacement of the stats builder
pub type StatsParserFn =
    Arc<dyn Fn(&mut Runtime, GobjId, &str, Json, Option<GobjId>) -> Json + Send + Sync>;

/// Stats selector that resets the resettable counters before reading
pub const STATS_RESET: &str = "__reset__";

/// Entry of a command table
#[derive(Clone)]
pub struct CommandDesc {
    pub name: String,
    pub aliases: Vec<String>,
    pub params: Vec<SdataDesc>,
    pub handler: Option<CommandFn>,
    pub description: String,
    /// Accept `key=value` options not declared in `params`
    pub wild: bool,
}

impl CommandDesc {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            params: Vec::new(),
            handler: None,
            description: description.to_string(),
            wild: false,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn param(mut self, desc: SdataDesc) -> Self {
        self.params.push(desc);
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Runtime, GobjId, &str, Json, Option<GobjId>) -> Option<Json>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn wild(mut self) -> Self {
        self.wild = true;
        self
    }

    /// True when `word` is the name or one of the aliases
    pub fn matches(&self, word: &str) -> bool {
        self.name.eq_ignore_ascii_case(word) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(word))
    }

    /// Event raised by a command without handler
    pub fn event_name(&self) -> &str {
        self.aliases.first().unwrap_or(&self.name)
    }

    pub fn to_json(&self) -> Json {
        json!({
            "command": self.name,
            "alias": self.aliases,
            "description": self.description,
            "usage": self.usage(),
            "parameters": self.params.iter().map(SdataDesc::to_json).collect::<Vec<_>>(),
            "wild": self.wild,
        })
    }

    /// One-line usage: `name (aliases) <required> [optional='default']`
    pub fn usage(&self) -> String {
        let mut line = self.name.clone();
        if !self.aliases.is_empty() {
            let _ = write!(line, " ({})", self.aliases.join(", "));
        }
        for param in self.params.iter().filter(|p| !p.flags.contains(SdFlags::NOTACCESS)) {
            if param.is_required() {
                let _ = write!(line, " <{}>", param.name);
            } else {
                let _ = write!(line, " [{}='{}']", param.name, param.default);
            }
        }
        line
    }

    fn find_param(&self, key: &str) -> Option<&SdataDesc> {
        self.params.iter().find(|p| p.name.eq_ignore_ascii_case(key))
    }
}

impl fmt::Debug for CommandDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDesc")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("params", &self.params.len())
            .field("handler", &self.handler.is_some())
            .field("wild", &self.wild)
            .finish()
    }
}

/// Response envelope; a missing schema or data is `null`
pub fn build_command_response(result: i64, comment: &str, schema: Option<Json>, data: Option<Json>) -> Json {
    json!({
        "result": result,
        "comment": comment,
        "schema": schema.unwrap_or(Json::Null),
        "data": data.unwrap_or(Json::Null),
    })
}

fn error_response(comment: String) -> Json {
    build_command_response(-1, &comment, None, None)
}

/// Split a command line into words; single or double quotes group spaces
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Convert a textual parameter to its declared type
fn parameter_value(desc: &SdataDesc, text: &str) -> Result<Json, String> {
    let value = match desc.data_type {
        DataType::Json => serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.to_string())),
        _ => Json::String(text.to_string()),
    };
    desc.coerce(value).map_err(|e| e.to_string())
}

/// Build the kw of `cmd` from the words after the command name and the caller's kw
fn build_cmd_kw(owner: &str, cmd: &CommandDesc, words: &[String], kw: &JsonMap) -> Result<JsonMap, String> {
    let mut kw_cmd = JsonMap::new();
    let mut words = words.iter().peekable();
    let mut params = cmd
        .params
        .iter()
        .filter(|p| !p.flags.contains(SdFlags::NOTACCESS))
        .peekable();

    while let Some(param) = params.next_if(|p| p.is_required()) {
        match words.next_if(|w| !w.contains('=')) {
            Some(word) => {
                kw_cmd.insert(param.name.clone(), parameter_value(param, word)?);
            }
            None => match kw.get(&param.name) {
                Some(value) => {
                    kw_cmd.insert(param.name.clone(), value.clone());
                }
                None => {
                    return Err(format!(
                        "{owner}: command '{}', parameter '{}' is required",
                        cmd.name, param.name
                    ))
                }
            },
        }
    }

    for param in params {
        if let Some(value) = kw.get(&param.name) {
            let value = match value {
                Json::String(s) if param.data_type != DataType::String => parameter_value(param, s)?,
                other => other.clone(),
            };
            kw_cmd.insert(param.name.clone(), value);
        } else if !param.default.is_empty() || param.data_type == DataType::String {
            let value = param.default_value();
            if !value.is_null() {
                kw_cmd.insert(param.name.clone(), value);
            }
        }
    }

    let mut extra = Vec::new();
    for word in words {
        let Some((key, value)) = word.split_once('=') else {
            extra.push(word.as_str());
            continue;
        };
        let value = match cmd.find_param(key) {
            Some(param) => {
                kw_cmd.insert(param.name.clone(), parameter_value(param, value)?);
                continue;
            }
            None if cmd.wild => Json::String(value.to_string()),
            None => return Err(format!("{owner}: '{}' command has no option '{key}'", cmd.name)),
        };
        kw_cmd.insert(key.to_string(), value);
    }
    if !extra.is_empty() {
        return Err(format!(
            "{owner}: command '{}' with extra parameters: '{}'",
            cmd.name,
            extra.join(" ")
        ));
    }

    for (key, value) in kw {
        kw_cmd.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Ok(kw_cmd)
}

fn help_text(owner: &str, commands: &[CommandDesc], only: Option<&str>) -> Option<String> {
    let mut text = String::new();
    match only {
        Some(word) => {
            let cmd = commands.iter().find(|c| c.matches(word))?;
            let _ = writeln!(text, "{}\n{}", cmd.name, "=".repeat(cmd.name.len()));
            if !cmd.description.is_empty() {
                let _ = writeln!(text, "{}", cmd.description);
            }
            let _ = writeln!(text, "- {}", cmd.usage());
            for param in &cmd.params {
                let _ = writeln!(
                    text,
                    "    - {:<16} Type:{:<8}, Desc:{}, Flag:{}",
                    param.name,
                    param.data_type,
                    param.description,
                    param.flags.names().join("|")
                );
            }
        }
        None => {
            let _ = writeln!(text, "Available commands\n==================\n\n> {owner}");
            for cmd in commands {
                let _ = writeln!(text, "- {:<28} {}", cmd.usage(), cmd.description);
            }
        }
    }
    Some(text)
}

impl Runtime {
    /// Run a command line on `id`.
    ///
    /// Returns the response envelope, or `None` when the command was
    /// redirected as an event or its handler answers asynchronously.
    /// A redirect the current state refuses gets an error envelope.
    pub fn command(&mut self, id: GobjId, line: &str, kw: Json, src: Option<GobjId>) -> Option<Json> {
        if let Some(parser) = self.command_parser.clone() {
            return parser(self, id, line, kw, src);
        }

        let Some(gobj) = self.gobj(id) else {
            tracing::error!(gobj = %id, command = line, "command: gobj not found");
            return Some(error_response(format!("gobj {id} not found")));
        };
        if gobj.destroying {
            let name = self.full_name(id);
            tracing::error!(gobj = %name, command = line, "command: gobj destroying");
            return Some(error_response(format!("{name}: gobj destroying")));
        }
        let gclass = gobj.gclass.clone();
        let owner = self.short_name(id);

        if gclass.commands().is_empty() {
            return match gclass.methods().mt_command(self, id, line, kw, src) {
                Some(response) => Some(response),
                None => {
                    tracing::warn!(gobj = %self.full_name(id), command = line, "no command table");
                    Some(error_response(format!("{owner}: No command table")))
                }
            };
        }

        let words = split_words(line);
        let Some((word, rest)) = words.split_first() else {
            return Some(error_response(format!("{owner}: No command")));
        };
        let Some(cmd) = gclass.commands().iter().find(|c| c.matches(word)) else {
            if word.eq_ignore_ascii_case("help") {
                return Some(
                    match help_text(&owner, gclass.commands(), rest.first().map(String::as_str)) {
                        Some(text) => build_command_response(0, "", None, Some(Json::String(text))),
                        None => error_response(format!("{owner}: command '{}' not available", rest[0])),
                    },
                );
            }
            tracing::warn!(gobj = %self.full_name(id), command = %word, "command not available");
            return Some(error_response(format!(
                "{owner}: command not available: '{word}'. Try 'help' command."
            )));
        };

        let kw_map = match kw {
            Json::Object(map) => map,
            Json::Null => JsonMap::new(),
            other => {
                return Some(error_response(format!(
                    "{owner}: command kw must be a dict, got {other}"
                )))
            }
        };
        let kw_cmd = match build_cmd_kw(&owner, cmd, rest, &kw_map) {
            Ok(kw_cmd) => Json::Object(kw_cmd),
            Err(comment) => {
                tracing::warn!(gobj = %self.full_name(id), command = %cmd.name, error = %comment, "bad command");
                return Some(error_response(comment));
            }
        };
        if self.is_tracing(id, TraceLevels::EV_KW) {
            tracing::info!(target: "gobj::trace", gobj = %self.full_name(id), command = %cmd.name, kw = %kw_cmd, "expanded command");
        }

        match cmd.handler.clone() {
            Some(handler) => handler(self, id, &cmd.name, kw_cmd, src),
            None => {
                let event = cmd.event_name().to_string();
                match self.send_event(id, &event, kw_cmd, src) {
                    Ok(_) => None,
                    Err(e) => {
                        tracing::error!(gobj = %self.full_name(id), event = %event, error = %e, "command redirect failed");
                        Some(error_response(format!("{owner}: {e}")))
                    }
                }
            }
        }
    }

    /// Read the statistics of `id` and its bottom chain.
    ///
    /// `stats` selects attributes by name or name prefix; empty selects all,
    /// [`STATS_RESET`] resets the RSTATS attributes and the stats map first.
    pub fn stats(&mut self, id: GobjId, stats: &str, kw: Json, src: Option<GobjId>) -> Json {
        if let Some(parser) = self.stats_parser.clone() {
            return parser(self, id, stats, kw, src);
        }
        let Some(gobj) = self.gobj(id) else {
            tracing::error!(gobj = %id, "stats: gobj not found");
            return error_response(format!("gobj {id} not found"));
        };
        let gclass = gobj.gclass.clone();
        if let Some(response) = gclass.methods().mt_stats(self, id, stats, kw, src) {
            return response;
        }

        let mut data = JsonMap::new();
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(node) = current.filter(|n| seen.insert(*n)) {
            let node_stats = self.build_stats(node, stats);
            data.insert(self.short_name(node), Json::Object(node_stats));
            current = self.bottom_gobj(node);
        }
        build_command_response(0, "", None, Some(Json::Object(data)))
    }

    fn build_stats(&mut self, id: GobjId, stats: &str) -> JsonMap {
        let mut selector = stats;
        if selector == STATS_RESET {
            if let Err(e) = self.reset_attrs_flagged(id, SdFlags::RSTATS) {
                tracing::error!(gobj = %self.full_name(id), error = %e, "resetting stats failed");
            }
            self.reset_stats(id);
            selector = "";
        }

        let mut data = JsonMap::new();
        let Some(gclass) = self.gobj(id).map(|g| g.gclass.clone()) else {
            return data;
        };
        for desc in gclass.attrs() {
            if !(desc.data_type.is_number() || desc.data_type == DataType::String) {
                continue;
            }
            if !desc.flags.intersects(SdFlags::ANY_STATS) || !stats_selected(selector, &desc.name) {
                continue;
            }
            let value = match desc.data_type {
                DataType::Real => self.read_real_attr(id, &desc.name).map(Json::from),
                DataType::Boolean => self.read_bool_attr(id, &desc.name).map(|b| Json::from(b as i64)),
                DataType::Integer => self.read_integer_attr(id, &desc.name).map(Json::from),
                _ => self.read_str_attr(id, &desc.name).map(Json::String),
            };
            data.insert(desc.name.clone(), value.unwrap_or(Json::Null));
        }

        if let Some(gobj) = self.gobj(id) {
            for (key, value) in &gobj.stats {
                if selector.is_empty() || selector.contains(key.as_str()) {
                    data.insert(key.clone(), value.clone());
                }
            }
            data.insert("__state__".to_string(), Json::String(gobj.current_state().to_string()));
        }
        data
    }
}

/// Attribute selection: the whole name, or the part before the first `_`
fn stats_selected(selector: &str, name: &str) -> bool {
    if selector.is_empty() || selector.contains(name) {
        return true;
    }
    match name.split_once('_') {
        Some((prefix, _)) => selector.contains(prefix),
        None => true,
    }
}
