//! User records and delivery targets.

use std::collections::BTreeSet;
use std::net::SocketAddr;

/// The server's record of one connected user.
///
/// A user always sits in a personal room named after their own nick, so
/// `rooms` is never empty while the user is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub nick: String,
    /// Where pushed packets for this user go.
    pub address: SocketAddr,
    pub rooms: BTreeSet<String>,
}

impl User {
    pub(crate) fn new(nick: String, address: SocketAddr) -> Self {
        let rooms = BTreeSet::from([nick.clone()]);
        Self {
            nick,
            address,
            rooms,
        }
    }

    /// Returns `true` if the user has joined `room` (or it is their
    /// personal room).
    pub fn is_in(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    pub(crate) fn peer(&self) -> Peer {
        Peer {
            nick: self.nick.clone(),
            address: self.address,
        }
    }
}

/// A snapshot of one delivery target: who, and where to push.
///
/// Peers are copied out of the directory while its lock is held and then
/// used for network I/O after the lock is released.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Peer {
    pub nick: String,
    pub address: SocketAddr,
}
