//! Newtypes over the auto-assigned integer ids the Store hands out. SQLite's
//! `INTEGER PRIMARY KEY` is a signed 64-bit rowid, so all three wrap `i64`;
//! keeping them distinct types stops a device id from being passed where a
//! channel id is expected.

use std::fmt;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

id_newtype!(DeviceId);
id_newtype!(ChannelId);
id_newtype!(GroupId);
