//! Lifecycle: start, stop, play, pause, enable, disable
//!
//! `running`, `playing` and `disabled` are independent flags. Transitions
//! refused by the current flags are logged and returned as operational
//! errors. Two transitions correct themselves: stopping a playing object
//! pauses it first, and playing a stopped object starts it first unless
//! its class requires an explicit start.

use crate::error::{GobjError, Result};
use crate::runtime::Runtime;
use crate::trace::TraceLevels;
use crate::types::{GclassFlags, GobjFlags, GobjId};
use crate::walk::{Visit, WalkDirection, WalkType};

impl Runtime {
    fn lifecycle_target(&self, id: GobjId, op: &'static str) -> Result<()> {
        let gobj = self.live(id).inspect_err(|_| {
            tracing::error!(gobj = %id, op, "gobj not found");
        })?;
        if gobj.destroying {
            let name = self.full_name(id);
            tracing::error!(gobj = %name, op, "gobj destroying");
            return Err(GobjError::Destroying(name));
        }
        Ok(())
    }

    fn trace_start_stop(&self, id: GobjId, op: &'static str) {
        if self.is_tracing(id, TraceLevels::START_STOP) {
            tracing::info!(target: "gobj::trace", gobj = %self.full_name(id), op, "lifecycle");
        }
    }

    fn set_running(&mut self, id: GobjId, running: bool) {
        if let Some(node) = self.gobj_mut(id) {
            node.running = running;
        }
    }

    fn set_playing(&mut self, id: GobjId, playing: bool) {
        if let Some(node) = self.gobj_mut(id) {
            node.playing = playing;
        }
    }

    fn has_gclass_flag(&self, id: GobjId, flag: GclassFlags) -> bool {
        self.gobj(id).is_some_and(|g| g.gclass.has_flag(flag))
    }

    /// Start the object; refused when running, disabled or missing required attributes.
    ///
    /// Returns the `mt_start` result.
    pub fn start(&mut self, id: GobjId) -> Result<i32> {
        self.lifecycle_target(id, "start")?;
        if self.is_running(id) {
            tracing::error!(gobj = %self.full_name(id), "gobj already running");
            return Err(GobjError::operational(self.full_name(id), "already running"));
        }
        if self.is_disabled(id) {
            tracing::warn!(gobj = %self.full_name(id), "gobj disabled");
            return Err(GobjError::operational(self.full_name(id), "disabled"));
        }
        let missing = self.missing_required_attrs(id);
        if !missing.is_empty() {
            tracing::error!(
                gobj = %self.full_name(id),
                attrs = ?missing,
                "cannot start without all required attributes"
            );
            return Err(GobjError::RequiredAttrs {
                gobj: self.full_name(id),
                attrs: missing,
            });
        }

        self.trace_start_stop(id, "start");
        self.set_running(id, true);
        let gclass = self.live(id)?.gclass.clone();
        Ok(gclass.methods().mt_start(self, id))
    }

    /// Stop the object, pausing it first when playing.
    ///
    /// A stopped object is refused, silently while shutting down.
    pub fn stop(&mut self, id: GobjId) -> Result<i32> {
        self.lifecycle_target(id, "stop")?;
        if !self.is_running(id) {
            if !self.shutting_down {
                tracing::error!(gobj = %self.full_name(id), "gobj not running");
            }
            return Err(GobjError::operational(self.full_name(id), "not running"));
        }
        if self.is_playing(id) {
            tracing::info!(gobj = %self.full_name(id), "stopping without previous pause");
            if let Err(e) = self.pause(id) {
                tracing::warn!(gobj = %self.full_name(id), error = %e, "auto-pause failed");
            }
        }
        Ok(self.stop_unchecked(id))
    }

    fn stop_unchecked(&mut self, id: GobjId) -> i32 {
        self.trace_start_stop(id, "stop");
        self.set_running(id, false);
        match self.gobj(id).map(|g| g.gclass.clone()) {
            Some(gclass) => gclass.methods().mt_stop(self, id),
            None => 0,
        }
    }

    /// Play the object.
    ///
    /// A stopped object is started first, unless its class requires an
    /// explicit start. A negative `mt_play` result rolls `playing` back.
    pub fn play(&mut self, id: GobjId) -> Result<i32> {
        self.lifecycle_target(id, "play")?;
        if self.is_playing(id) {
            tracing::warn!(gobj = %self.full_name(id), "gobj already playing");
            return Err(GobjError::operational(self.full_name(id), "already playing"));
        }
        if self.is_disabled(id) {
            tracing::warn!(gobj = %self.full_name(id), "gobj disabled");
            return Err(GobjError::operational(self.full_name(id), "disabled"));
        }
        if !self.is_running(id) {
            if self.has_gclass_flag(id, GclassFlags::REQUIRED_START_TO_PLAY) {
                tracing::error!(gobj = %self.full_name(id), "cannot play, start not done");
                return Err(GobjError::operational(self.full_name(id), "start not done"));
            }
            tracing::error!(gobj = %self.full_name(id), "playing without previous start");
            self.start(id)?;
        }

        self.trace_start_stop(id, "play");
        self.set_playing(id, true);
        let gclass = self.live(id)?.gclass.clone();
        let ret = gclass.methods().mt_play(self, id);
        if ret < 0 {
            self.set_playing(id, false);
            tracing::error!(gobj = %self.full_name(id), ret, "mt_play failed");
            return Err(GobjError::operational(self.full_name(id), "mt_play failed"));
        }
        Ok(ret)
    }

    /// Pause the object; `playing` is cleared whatever `mt_pause` returns
    pub fn pause(&mut self, id: GobjId) -> Result<i32> {
        self.lifecycle_target(id, "pause")?;
        if !self.is_playing(id) {
            tracing::info!(gobj = %self.full_name(id), "gobj not playing");
            return Err(GobjError::operational(self.full_name(id), "not playing"));
        }
        Ok(self.pause_unchecked(id))
    }

    fn pause_unchecked(&mut self, id: GobjId) -> i32 {
        self.trace_start_stop(id, "pause");
        self.set_playing(id, false);
        match self.gobj(id).map(|g| g.gclass.clone()) {
            Some(gclass) => gclass.methods().mt_pause(self, id),
            None => 0,
        }
    }

    /// Pause during destruction, bypassing the destroying guard
    pub(crate) fn force_pause(&mut self, id: GobjId) {
        if self.is_playing(id) {
            self.pause_unchecked(id);
        }
    }

    /// Stop during destruction, bypassing the destroying guard
    pub(crate) fn force_stop(&mut self, id: GobjId) {
        if self.is_running(id) {
            self.force_pause(id);
            self.stop_unchecked(id);
        }
    }

    /// Disable the object; without `mt_disable` its tree is stopped
    pub fn disable(&mut self, id: GobjId) -> Result<i32> {
        self.lifecycle_target(id, "disable")?;
        if self.is_disabled(id) {
            tracing::info!(gobj = %self.full_name(id), "gobj already disabled");
            return Err(GobjError::operational(self.full_name(id), "already disabled"));
        }
        if let Some(node) = self.gobj_mut(id) {
            node.disabled = true;
        }
        let gclass = self.live(id)?.gclass.clone();
        match gclass.methods().mt_disable(self, id) {
            Some(ret) => Ok(ret),
            None => self.stop_tree(id).map(|_| 0),
        }
    }

    /// Enable the object; without `mt_enable` its tree is started
    pub fn enable(&mut self, id: GobjId) -> Result<i32> {
        self.lifecycle_target(id, "enable")?;
        if !self.is_disabled(id) {
            tracing::info!(gobj = %self.full_name(id), "gobj not disabled");
            return Err(GobjError::operational(self.full_name(id), "not disabled"));
        }
        if let Some(node) = self.gobj_mut(id) {
            node.disabled = false;
        }
        let gclass = self.live(id)?.gclass.clone();
        match gclass.methods().mt_enable(self, id) {
            Some(ret) => Ok(ret),
            None => self.start_tree(id).map(|_| 0),
        }
    }

    /// Start the direct children that are stopped and enabled
    pub fn start_childs(&mut self, id: GobjId) -> Result<()> {
        self.lifecycle_target(id, "start_childs")?;
        let _ = self.walk_childs(id, WalkDirection::FirstToLast, |rt, child| {
            if rt.has_gclass_flag(child, GclassFlags::MANUAL_START) {
                return Visit::Continue;
            }
            if !rt.is_running(child) && !rt.is_disabled(child) {
                let _ = rt.start(child);
            }
            Visit::Continue
        });
        Ok(())
    }

    /// Start the object and its tree, top-down.
    ///
    /// MANUAL_START objects and disabled objects are skipped together with
    /// their subtrees. Individual start failures are logged, not returned.
    pub fn start_tree(&mut self, id: GobjId) -> Result<()> {
        self.lifecycle_target(id, "start_tree")?;
        self.trace_start_stop(id, "start_tree");

        if self.has_gclass_flag(id, GclassFlags::MANUAL_START) || self.is_disabled(id) {
            return Ok(());
        }
        if !self.is_running(id) {
            let _ = self.start(id);
        }
        let _ = self.walk_childs_tree(id, WalkType::top_to_bottom(), |rt, child| {
            if rt.has_gclass_flag(child, GclassFlags::MANUAL_START) || rt.is_disabled(child) {
                return Visit::Skip;
            }
            if !rt.is_running(child) {
                let _ = rt.start(child);
            }
            Visit::Continue
        });
        Ok(())
    }

    /// Stop the running direct children
    pub fn stop_childs(&mut self, id: GobjId) -> Result<()> {
        self.lifecycle_target(id, "stop_childs")?;
        let _ = self.walk_childs(id, WalkDirection::FirstToLast, |rt, child| {
            if rt.is_running(child) {
                let _ = rt.stop(child);
            }
            Visit::Continue
        });
        Ok(())
    }

    /// Stop the object and every running object of its tree
    pub fn stop_tree(&mut self, id: GobjId) -> Result<()> {
        self.lifecycle_target(id, "stop_tree")?;
        self.trace_start_stop(id, "stop_tree");

        if self.is_running(id) {
            let _ = self.stop(id);
        }
        let _ = self.walk_childs_tree(id, WalkType::top_to_bottom(), |rt, child| {
            if rt.is_running(child) {
                let _ = rt.stop(child);
            }
            Visit::Continue
        });
        Ok(())
    }

    fn service_ids(&self) -> Vec<GobjId> {
        self.services
            .values()
            .copied()
            .filter(|id| Some(*id) != self.yuno)
            .collect()
    }

    /// Start the services flagged AUTOSTART.
    ///
    /// A service whose class drives its own play is started alone; any
    /// other gets its whole tree started.
    pub fn autostart_services(&mut self) {
        for id in self.service_ids() {
            let Some(gobj) = self.gobj(id) else {
                continue;
            };
            if !gobj.flags.contains(GobjFlags::AUTOSTART) {
                continue;
            }
            let owns_play = gobj.gclass.methods().owns_play();
            tracing::debug!(service = %gobj.name, owns_play, "autostart");
            let result = if owns_play {
                if self.is_running(id) {
                    Ok(())
                } else {
                    self.start(id).map(|_| ())
                }
            } else {
                self.start_tree(id)
            };
            if let Err(e) = result {
                tracing::error!(service = %self.full_name(id), error = %e, "autostart failed");
            }
        }
    }

    /// Play the services flagged AUTOPLAY
    pub fn autoplay_services(&mut self) {
        for id in self.service_ids() {
            let autoplay = self
                .gobj(id)
                .is_some_and(|g| g.flags.contains(GobjFlags::AUTOPLAY));
            if !autoplay || self.is_playing(id) {
                continue;
            }
            tracing::debug!(service = %self.full_name(id), "autoplay");
            if let Err(e) = self.play(id) {
                tracing::error!(service = %self.full_name(id), error = %e, "autoplay failed");
            }
        }
    }

    /// Pause and stop every service and its tree
    pub fn stop_services(&mut self) {
        for id in self.service_ids() {
            if self.is_destroying(id) {
                continue;
            }
            tracing::debug!(service = %self.full_name(id), "stop service");
            if self.is_playing(id) {
                let _ = self.pause(id);
            }
            if let Err(e) = self.stop_tree(id) {
                tracing::error!(service = %self.full_name(id), error = %e, "stop service failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gclass::GClassBuilder;
    use crate::methods::GMethods;
    use crate::sdata::SdataDesc;
    use crate::types::SdFlags;
    use serde_json::json;

    struct FailingPlay;

    impl GMethods for FailingPlay {
        fn mt_play(&self, _rt: &mut Runtime, _gobj: GobjId) -> i32 {
            -1
        }

        fn mt_pause(&self, _rt: &mut Runtime, _gobj: GobjId) -> i32 {
            -1
        }
    }

    fn runtime() -> (Runtime, GobjId) {
        let mut rt = Runtime::with_defaults();
        rt.register_gclass(GClassBuilder::new("C_YUNO").state("ST_IDLE", vec![]))
            .unwrap();
        rt.register_gclass(GClassBuilder::new("C_NODE").state("ST_IDLE", vec![]))
            .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_MANUAL")
                .state("ST_IDLE", vec![])
                .flags(GclassFlags::MANUAL_START),
        )
        .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_STRICT")
                .state("ST_IDLE", vec![])
                .flags(GclassFlags::REQUIRED_START_TO_PLAY),
        )
        .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_FAILING")
                .state("ST_IDLE", vec![])
                .methods(FailingPlay),
        )
        .unwrap();
        rt.register_gclass(
            GClassBuilder::new("C_NEEDS")
                .state("ST_IDLE", vec![])
                .attr(SdataDesc::string("peer", SdFlags::WR | SdFlags::REQUIRED, "", "Peer")),
        )
        .unwrap();
        let yuno = rt.create_yuno("yuno", "C_YUNO", json!({})).unwrap();
        (rt, yuno)
    }

    #[test]
    fn test_start_stop() {
        let (mut rt, yuno) = runtime();
        let node = rt.create_child("node", "C_NODE", json!({}), yuno).unwrap();

        assert!(rt.stop(node).is_err());
        rt.start(node).unwrap();
        assert!(rt.is_running(node));
        assert!(rt.start(node).is_err());

        rt.play(node).unwrap();
        rt.stop(node).unwrap();
        assert!(!rt.is_running(node));
        assert!(!rt.is_playing(node));
    }

    #[test]
    fn test_required_gate() {
        let (mut rt, yuno) = runtime();
        let node = rt.create_child("node", "C_NEEDS", json!({}), yuno).unwrap();
        let err = rt.start(node).unwrap_err();
        assert!(matches!(err, GobjError::RequiredAttrs { .. }));
        assert!(!rt.is_running(node));

        rt.write_str_attr(node, "peer", "10.0.0.1").unwrap();
        rt.start(node).unwrap();
    }

    #[test]
    fn test_play_rules() {
        let (mut rt, yuno) = runtime();
        let node = rt.create_child("node", "C_NODE", json!({}), yuno).unwrap();
        rt.play(node).unwrap();
        assert!(rt.is_running(node));
        assert!(rt.play(node).is_err());

        let strict = rt.create_child("strict", "C_STRICT", json!({}), yuno).unwrap();
        assert!(rt.play(strict).is_err());
        assert!(!rt.is_running(strict));

        let failing = rt.create_child("failing", "C_FAILING", json!({}), yuno).unwrap();
        assert!(rt.play(failing).is_err());
        assert!(!rt.is_playing(failing));
        assert!(rt.is_running(failing));
    }

    #[test]
    fn test_pause_clears_playing_even_on_hook_failure() {
        let (mut rt, yuno) = runtime();
        let failing = rt.create_child("failing", "C_FAILING", json!({}), yuno).unwrap();
        rt.start(failing).unwrap();
        rt.gobj_mut(failing).unwrap().playing = true;
        assert_eq!(rt.pause(failing).unwrap(), -1);
        assert!(!rt.is_playing(failing));
        assert!(rt.pause(failing).is_err());
    }

    #[test]
    fn test_disable_enable() {
        let (mut rt, yuno) = runtime();
        let node = rt.create_child("node", "C_NODE", json!({}), yuno).unwrap();
        let leaf = rt.create_child("leaf", "C_NODE", json!({}), node).unwrap();
        rt.start_tree(node).unwrap();
        assert!(rt.is_running(leaf));

        rt.disable(node).unwrap();
        assert!(rt.is_disabled(node));
        assert!(!rt.is_running(node));
        assert!(!rt.is_running(leaf));
        assert!(rt.play(node).is_err());
        assert!(rt.start(node).is_err());
        assert!(rt.disable(node).is_err());

        rt.enable(node).unwrap();
        assert!(rt.is_running(node));
        assert!(rt.is_running(leaf));
        assert!(rt.enable(node).is_err());
    }

    #[test]
    fn test_tree_cascade_skips_manual_start() {
        let (mut rt, yuno) = runtime();
        let a = rt.create_child("a", "C_NODE", json!({}), yuno).unwrap();
        let manual = rt.create_child("manual", "C_MANUAL", json!({}), a).unwrap();
        let under = rt.create_child("under", "C_NODE", json!({}), manual).unwrap();
        let b = rt.create_child("b", "C_NODE", json!({}), a).unwrap();

        rt.start_tree(yuno).unwrap();
        assert!(rt.is_running(yuno));
        assert!(rt.is_running(a));
        assert!(rt.is_running(b));
        assert!(!rt.is_running(manual));
        assert!(!rt.is_running(under));

        rt.start(manual).unwrap();
        rt.stop_tree(yuno).unwrap();
        assert!(!rt.is_running(a));
        assert!(!rt.is_running(manual));
    }

    #[test]
    fn test_childs_only() {
        let (mut rt, yuno) = runtime();
        let a = rt.create_child("a", "C_NODE", json!({}), yuno).unwrap();
        let a1 = rt.create_child("a1", "C_NODE", json!({}), a).unwrap();
        rt.start_childs(yuno).unwrap();
        assert!(rt.is_running(a));
        assert!(!rt.is_running(a1));
        rt.stop_childs(yuno).unwrap();
        assert!(!rt.is_running(a));
    }

    #[test]
    fn test_services_autostart_autoplay() {
        let (mut rt, yuno) = runtime();
        let svc = rt
            .create_gobj(
                "svc",
                "C_NODE",
                json!({}),
                Some(yuno),
                GobjFlags::SERVICE | GobjFlags::AUTOSTART | GobjFlags::AUTOPLAY,
            )
            .unwrap();
        let inner = rt.create_child("inner", "C_NODE", json!({}), svc).unwrap();
        let idle = rt.create_service("idle", "C_NODE", json!({}), yuno).unwrap();

        rt.autostart_services();
        assert!(rt.is_running(svc));
        assert!(rt.is_running(inner));
        assert!(!rt.is_running(idle));
        assert!(!rt.is_running(yuno));

        rt.autoplay_services();
        assert!(rt.is_playing(svc));

        rt.stop_services();
        assert!(!rt.is_playing(svc));
        assert!(!rt.is_running(svc));
        assert!(!rt.is_running(inner));
    }

    #[test]
    fn test_shutdown_stops_tree() {
        let (mut rt, yuno) = runtime();
        let node = rt.create_child("node", "C_NODE", json!({}), yuno).unwrap();
        rt.start_tree(yuno).unwrap();
        rt.play(yuno).unwrap();

        rt.shutdown();
        assert!(!rt.is_playing(yuno));
        assert!(!rt.is_running(yuno));
        assert!(!rt.is_running(node));
        assert!(rt.stop(node).is_err());
    }
}
