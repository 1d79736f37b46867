//! Demo classes available to config files

use gobj::{
    build_command_response, CommandDesc, EventAction, EventFlags, GClassBuilder, GclassFlags,
    GobjId, Json, LoggingMethods, Runtime, SdFlags, SdataDesc,
};
use serde_json::json;

pub const C_YUNO: &str = "C_YUNO";
pub const C_COUNTER: &str = "C_COUNTER";

/// Register every demo class on `rt`
pub fn register_all(rt: &mut Runtime) -> gobj::Result<()> {
    rt.register_gclass(yuno_gclass())?;
    rt.register_gclass(counter_gclass())?;
    Ok(())
}

fn yuno_gclass() -> GClassBuilder {
    GClassBuilder::new(C_YUNO)
        .state("ST_IDLE", vec![])
        .attrs([
            SdataDesc::string("yuno_role", SdFlags::RD, "demo", "Role of this yuno"),
            SdataDesc::string("node_uuid", SdFlags::RD, "", "Uuid of the node"),
        ])
        .methods(LoggingMethods::new("yuno"))
        .flags(GclassFlags::SINGLETON)
}

/// Counts EV_TICK events and publishes EV_LIMIT once `limit` is reached
fn counter_gclass() -> GClassBuilder {
    GClassBuilder::new(C_COUNTER)
        .state(
            "ST_COUNTING",
            vec![
                EventAction::new("EV_TICK", ac_tick, None),
                EventAction::new("EV_RESET", ac_reset, None),
            ],
        )
        .state(
            "ST_DONE",
            vec![
                EventAction::new("EV_TICK", ac_overflow, None),
                EventAction::new("EV_RESET", ac_reset, Some("ST_COUNTING")),
            ],
        )
        .event_type("EV_TICK", EventFlags::PUBLIC)
        .event_type("EV_RESET", EventFlags::PUBLIC)
        .event_type("EV_LIMIT", EventFlags::OUTPUT | EventFlags::NO_WARN_SUBS)
        .attrs([
            SdataDesc::integer(
                "limit",
                SdFlags::WR | SdFlags::PERSIST | SdFlags::REQUIRED,
                "",
                "Ticks before EV_LIMIT",
            ),
            SdataDesc::integer("step", SdFlags::WR, "1", "Increment per tick"),
            SdataDesc::integer("count", SdFlags::RSTATS, "0", "Current count"),
            SdataDesc::integer("limits_reached", SdFlags::STATS, "0", "Times the limit was reached"),
        ])
        .command(
            CommandDesc::new("tick", "Send EV_TICK to the counter")
                .param(SdataDesc::integer("times", SdFlags::empty(), "1", "Number of ticks"))
                .handler(cmd_tick),
        )
        .command(CommandDesc::new("reset", "Reset the count").alias("EV_RESET"))
        .command(CommandDesc::new("view", "Show count and limit").handler(cmd_view))
}

fn ac_tick(rt: &mut Runtime, gobj: GobjId, _event: &str, _kw: Json, _src: Option<GobjId>) -> i32 {
    let step = rt.read_integer_attr(gobj, "step").unwrap_or(1);
    let count = rt.read_integer_attr(gobj, "count").unwrap_or(0) + step;
    if let Err(e) = rt.write_integer_attr(gobj, "count", count) {
        tracing::error!(gobj = %rt.full_name(gobj), error = %e, "count not written");
        return -1;
    }
    let _ = rt.incr_stat(gobj, "ticks", 1);

    let limit = rt.read_integer_attr(gobj, "limit").unwrap_or(i64::MAX);
    if count < limit {
        return 0;
    }
    let reached = rt.read_integer_attr(gobj, "limits_reached").unwrap_or(0) + 1;
    let _ = rt.write_integer_attr(gobj, "limits_reached", reached);
    if let Err(e) = rt.change_state(gobj, "ST_DONE") {
        tracing::error!(gobj = %rt.full_name(gobj), error = %e, "state change failed");
        return -1;
    }
    if let Err(e) = rt.publish_event(gobj, "EV_LIMIT", json!({"count": count, "limit": limit})) {
        tracing::error!(gobj = %rt.full_name(gobj), error = %e, "EV_LIMIT not published");
    }
    0
}

fn ac_overflow(rt: &mut Runtime, gobj: GobjId, _event: &str, _kw: Json, _src: Option<GobjId>) -> i32 {
    let _ = rt.incr_stat(gobj, "overflows", 1);
    0
}

fn ac_reset(rt: &mut Runtime, gobj: GobjId, _event: &str, _kw: Json, _src: Option<GobjId>) -> i32 {
    match rt.write_integer_attr(gobj, "count", 0) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

fn cmd_tick(rt: &mut Runtime, gobj: GobjId, _cmd: &str, kw: Json, src: Option<GobjId>) -> Option<Json> {
    let times = kw["times"].as_i64().unwrap_or(1);
    for _ in 0..times {
        if let Err(e) = rt.send_event(gobj, "EV_TICK", json!({}), src) {
            return Some(build_command_response(-1, &e.to_string(), None, None));
        }
    }
    cmd_view(rt, gobj, "view", Json::Null, src)
}

fn cmd_view(rt: &mut Runtime, gobj: GobjId, _cmd: &str, _kw: Json, _src: Option<GobjId>) -> Option<Json> {
    let data = json!({
        "count": rt.read_integer_attr(gobj, "count"),
        "limit": rt.read_integer_attr(gobj, "limit"),
        "state": rt.current_state(gobj),
    });
    Some(build_command_response(0, "", None, Some(data)))
}
