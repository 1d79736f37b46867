//! Core type definitions for the gobj runtime

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload and attribute value type.
///
/// Payloads move into the operation that receives them; a caller that
/// wants to keep a copy clones before sending.
pub type Json = serde_json::Value;

/// JSON object used for attribute dictionaries, user data and stats
pub type JsonMap = serde_json::Map<String, Json>;

/// Handle of an object in the runtime arena
///
/// Handles are never reused, so a handle to a destroyed object simply
/// stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GobjId(pub u64);

impl fmt::Display for GobjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subs-{}", self.0)
    }
}

/// Declares a copyable bit set with named constants.
macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        pub struct $name:ident : $repr:ty {
            $( $(#[$cmeta:meta])* const $flag:ident = $value:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub struct $name($repr);

        impl $name {
            $( $(#[$cmeta])* pub const $flag: Self = Self($value); )*

            /// Flag names paired with their values, in declaration order
            pub const NAMES: &'static [(&'static str, $name)] = &[
                $( (stringify!($flag), Self($value)), )*
            ];

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn bits(&self) -> $repr {
                self.0
            }

            pub const fn is_empty(&self) -> bool {
                self.0 == 0
            }

            /// True when every bit of `other` is set
            pub const fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// True when at least one bit of `other` is set
            pub const fn intersects(&self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }

            pub fn set(&mut self, other: Self, value: bool) {
                if value {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }

            /// Look up a single flag by its name, case-insensitively
            pub fn from_name(name: &str) -> Option<Self> {
                Self::NAMES
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(name))
                    .map(|(_, f)| *f)
            }

            /// Names of the single flags contained in this set
            pub fn names(&self) -> Vec<&'static str> {
                Self::NAMES
                    .iter()
                    .filter(|(_, f)| f.0.count_ones() == 1 && self.contains(*f))
                    .map(|(n, _)| *n)
                    .collect()
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.names().join("|"))
            }
        }
    };
}

pub(crate) use flag_set;

flag_set! {
    /// Class-wide behavior switches
    pub struct GclassFlags: u32 {
        /// Tree cascades skip instances of this class (and their subtrees)
        const MANUAL_START = 0x0001;
        /// Subscriptions and publications are not checked against output events
        const NO_CHECK_OUTPUT_EVENTS = 0x0002;
        /// Unknown keys in creation kw are ignored instead of reported
        const IGNORE_UNKNOWN_ATTRS = 0x0004;
        /// `play` fails instead of auto-starting a stopped instance
        const REQUIRED_START_TO_PLAY = 0x0008;
        /// At most one live instance
        const SINGLETON = 0x0010;
    }
}

flag_set! {
    /// Per-object creation flags
    pub struct GobjFlags: u32 {
        /// Root of the runtime; implies SERVICE
        const YUNO = 0x0001;
        /// The default service; implies SERVICE
        const DEFAULT_SERVICE = 0x0002;
        /// Registered in the named-service table
        const SERVICE = 0x0004;
        const VOLATIL = 0x0008;
        const PURE_CHILD = 0x0010;
        /// Started by `autostart_services`
        const AUTOSTART = 0x0020;
        /// Played by `autoplay_services`
        const AUTOPLAY = 0x0040;
    }
}

flag_set! {
    /// Event type flags
    pub struct EventFlags: u32 {
        /// No warning when published without subscribers
        const NO_WARN_SUBS = 0x0001;
        /// Output event, may be subscribed and published
        const OUTPUT = 0x0002;
        /// System event
        const SYSTEM = 0x0004;
        /// Public event, reachable from outside the yuno
        const PUBLIC = 0x0008;
    }
}

flag_set! {
    /// Attribute descriptor flags
    pub struct SdFlags: u32 {
        const NOTACCESS = 0x0000_0001;
        const RD = 0x0000_0002;
        const WR = 0x0000_0004;
        const REQUIRED = 0x0000_0008;
        const PERSIST = 0x0000_0010;
        const VOLATIL = 0x0000_0020;
        const RESOURCE = 0x0000_0040;
        const PKEY = 0x0000_0080;
        const WILD_CMD = 0x0000_0100;
        const STATS = 0x0000_0200;
        const FKEY = 0x0000_0400;
        const RSTATS = 0x0000_0800;
        const PSTATS = 0x0000_1000;
        const AUTHZ_R = 0x0000_2000;
        const AUTHZ_W = 0x0000_4000;
        const AUTHZ_X = 0x0000_8000;
        const AUTHZ_P = 0x0001_0000;
        const AUTHZ_S = 0x0002_0000;
        const AUTHZ_RS = 0x0004_0000;
    }
}

impl SdFlags {
    /// Attributes that may be written from outside
    pub const ATTR_WRITABLE: Self = Self(Self::WR.0 | Self::PERSIST.0);

    /// Attributes that may be read from outside
    pub const ATTR_READABLE: Self = Self(
        Self::RD.0
            | Self::WR.0
            | Self::PERSIST.0
            | Self::STATS.0
            | Self::VOLATIL.0
            | Self::RSTATS.0
            | Self::PSTATS.0,
    );

    /// Any kind of statistic attribute
    pub const ANY_STATS: Self = Self(Self::STATS.0 | Self::RSTATS.0 | Self::PSTATS.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gobj_id_display() {
        assert_eq!(GobjId(7).to_string(), "#7");
        assert_eq!(SubscriptionId(3).to_string(), "subs-3");
    }

    #[test]
    fn test_flag_operations() {
        let mut flags = GobjFlags::SERVICE | GobjFlags::AUTOSTART;
        assert!(flags.contains(GobjFlags::SERVICE));
        assert!(!flags.contains(GobjFlags::SERVICE | GobjFlags::YUNO));
        assert!(flags.intersects(GobjFlags::SERVICE | GobjFlags::YUNO));

        flags.remove(GobjFlags::SERVICE);
        assert_eq!(flags, GobjFlags::AUTOSTART);

        flags.set(GobjFlags::AUTOPLAY, true);
        assert_eq!(flags.names(), vec!["AUTOSTART", "AUTOPLAY"]);
    }

    #[test]
    fn test_composite_masks() {
        assert!(SdFlags::ATTR_WRITABLE.contains(SdFlags::PERSIST));
        assert!(SdFlags::ATTR_READABLE.contains(SdFlags::RSTATS));
        assert!(!SdFlags::ATTR_READABLE.intersects(SdFlags::REQUIRED));
    }

    #[test]
    fn test_flag_from_name() {
        assert_eq!(EventFlags::from_name("output"), Some(EventFlags::OUTPUT));
        assert_eq!(EventFlags::from_name("nope"), None);
    }
}
