//! Method table of a class
//!
//! Every hook has a default body, so a class implements only what it
//! needs. Hooks that replace a built-in behavior return `Option`: `None`
//! means "not implemented, run the default".

use crate::runtime::Runtime;
use crate::subscription::Subscription;
use crate::types::{GobjId, Json};

/// Verdict of [`GMethods::mt_publication_pre_filter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreFilter {
    /// Go on with this subscription
    Deliver,
    /// Skip this subscription only
    Skip,
    /// Stop the whole publication
    Stop,
}

/// Class behavior hooks
///
/// Hooks receive the runtime by mutable reference and may call back into
/// it (create children, send events, write attributes).
///
/// # Example
///
/// ```ignore
/// struct Timer;
///
/// impl GMethods for Timer {
///     fn mt_start(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
///         let _ = rt.write_bool_attr(gobj, "armed", true);
///         0
///     }
/// }
/// ```
pub trait GMethods: Send + Sync {
    /// Called once the object is attached to the tree, with the creation kw
    fn mt_create(&self, rt: &mut Runtime, gobj: GobjId, kw: &Json) {
        let _ = (rt, gobj, kw);
    }

    /// Called after the children are destroyed
    fn mt_destroy(&self, rt: &mut Runtime, gobj: GobjId) {
        let _ = (rt, gobj);
    }

    fn mt_start(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
        let _ = (rt, gobj);
        0
    }

    fn mt_stop(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
        let _ = (rt, gobj);
        0
    }

    /// A negative result rolls `playing` back
    fn mt_play(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
        let _ = (rt, gobj);
        0
    }

    fn mt_pause(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
        let _ = (rt, gobj);
        0
    }

    /// True when `mt_play` starts the object's own subtree.
    ///
    /// Autostart then starts only the service object itself.
    fn owns_play(&self) -> bool {
        false
    }

    /// Replaces the default disable behavior (stop the subtree)
    fn mt_disable(&self, rt: &mut Runtime, gobj: GobjId) -> Option<i32> {
        let _ = (rt, gobj);
        None
    }

    /// Replaces the default enable behavior (start the subtree)
    fn mt_enable(&self, rt: &mut Runtime, gobj: GobjId) -> Option<i32> {
        let _ = (rt, gobj);
        None
    }

    /// Called before an attribute is read
    fn mt_reading(&self, rt: &mut Runtime, gobj: GobjId, attr: &str) {
        let _ = (rt, gobj, attr);
    }

    /// Called after an attribute is written, once the object is created
    fn mt_writing(&self, rt: &mut Runtime, gobj: GobjId, attr: &str) {
        let _ = (rt, gobj, attr);
    }

    fn mt_child_added(&self, rt: &mut Runtime, gobj: GobjId, child: GobjId) {
        let _ = (rt, gobj, child);
    }

    /// Called while the child is still attached
    fn mt_child_removed(&self, rt: &mut Runtime, gobj: GobjId, child: GobjId) {
        let _ = (rt, gobj, child);
    }

    /// Called on the yuno's class for every object created after it
    fn mt_gobj_created(&self, rt: &mut Runtime, yuno: GobjId, gobj: GobjId) {
        let _ = (rt, yuno, gobj);
    }

    /// Catch-all for events without an entry in the current state.
    ///
    /// `Some` consumes the event and bypasses the FSM.
    fn mt_inject_event(
        &self,
        rt: &mut Runtime,
        gobj: GobjId,
        event: &str,
        kw: Json,
        src: Option<GobjId>,
    ) -> Option<i32> {
        let _ = (rt, gobj, event, kw, src);
        None
    }

    /// Replaces the publication of `EV_STATE_CHANGED`.
    ///
    /// kw holds `previous_state` and `current_state`.
    fn mt_state_changed(&self, rt: &mut Runtime, gobj: GobjId, kw: &Json) -> Option<i32> {
        let _ = (rt, gobj, kw);
        None
    }

    /// Command fallback for classes without a command table
    fn mt_command(
        &self,
        rt: &mut Runtime,
        gobj: GobjId,
        command: &str,
        kw: Json,
        src: Option<GobjId>,
    ) -> Option<Json> {
        let _ = (rt, gobj, command, kw, src);
        None
    }

    /// Replaces the built-in stats builder
    fn mt_stats(
        &self,
        rt: &mut Runtime,
        gobj: GobjId,
        stats: &str,
        kw: Json,
        src: Option<GobjId>,
    ) -> Option<Json> {
        let _ = (rt, gobj, stats, kw, src);
        None
    }

    /// Called on the publisher; a negative result refuses the subscription
    fn mt_subscription_added(&self, rt: &mut Runtime, gobj: GobjId, subs: &Subscription) -> i32 {
        let _ = (rt, gobj, subs);
        0
    }

    fn mt_subscription_deleted(&self, rt: &mut Runtime, gobj: GobjId, subs: &Subscription) {
        let _ = (rt, gobj, subs);
    }

    /// Called on the publisher before broadcasting; `false` publishes nothing
    fn mt_publish_event(&self, rt: &mut Runtime, gobj: GobjId, event: &str, kw: &Json) -> bool {
        let _ = (rt, gobj, event, kw);
        true
    }

    /// Called on the publisher for every subscription, before matching
    fn mt_publication_pre_filter(
        &self,
        rt: &mut Runtime,
        gobj: GobjId,
        subs: &Subscription,
        event: &str,
        kw: &Json,
    ) -> PreFilter {
        let _ = (rt, gobj, subs, event, kw);
        PreFilter::Deliver
    }

    /// Called on the publisher for every matching subscriber
    fn mt_publication_filter(
        &self,
        rt: &mut Runtime,
        gobj: GobjId,
        event: &str,
        kw: &Json,
        subscriber: GobjId,
    ) -> bool {
        let _ = (rt, gobj, event, kw, subscriber);
        true
    }

    /// Type name for logging
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Method table without behavior
pub struct NoopMethods;

impl GMethods for NoopMethods {
    fn type_name(&self) -> &'static str {
        "NoopMethods"
    }
}

/// Method table that logs lifecycle hooks
pub struct LoggingMethods {
    prefix: String,
}

impl LoggingMethods {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl GMethods for LoggingMethods {
    fn mt_create(&self, rt: &mut Runtime, gobj: GobjId, _kw: &Json) {
        tracing::info!(prefix = %self.prefix, gobj = %rt.full_name(gobj), "created");
    }

    fn mt_destroy(&self, rt: &mut Runtime, gobj: GobjId) {
        tracing::info!(prefix = %self.prefix, gobj = %rt.full_name(gobj), "destroyed");
    }

    fn mt_start(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
        tracing::info!(prefix = %self.prefix, gobj = %rt.full_name(gobj), "started");
        0
    }

    fn mt_stop(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
        tracing::info!(prefix = %self.prefix, gobj = %rt.full_name(gobj), "stopped");
        0
    }

    fn mt_play(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
        tracing::info!(prefix = %self.prefix, gobj = %rt.full_name(gobj), "playing");
        0
    }

    fn mt_pause(&self, rt: &mut Runtime, gobj: GobjId) -> i32 {
        tracing::info!(prefix = %self.prefix, gobj = %rt.full_name(gobj), "paused");
        0
    }

    fn type_name(&self) -> &'static str {
        "LoggingMethods"
    }
}
