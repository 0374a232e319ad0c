use std::fmt;

use serde::{Deserialize, Serialize};

/// Transient identity of one transport connection.
///
/// A connection is an attribute of a roster entry, never its key: the stable key is the
/// member's external id, so a reconnect simply swaps the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
