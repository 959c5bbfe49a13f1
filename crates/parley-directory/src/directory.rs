//! The directory: every connected user and every room, behind one lock.
//!
//! # Concurrency
//!
//! All state lives in a private [`DirectoryState`] guarded by a single
//! `tokio::sync::Mutex`. Each public method takes the lock once, does its
//! check-then-mutate work, and releases it before returning, so every
//! operation is atomic with respect to every other. Callers never see the
//! guard or the live maps; anything that leaves the lock is a copy
//! ([`Peer`], [`User`], `Vec<String>`).
//!
//! That is what makes `register` and `create_room` safe under races: two
//! tasks registering the same nick are serialized, and the second one
//! finds the first one's entry.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;

use tokio::sync::Mutex;

use crate::{DirectoryError, Peer, User};

/// Shared registry of users and rooms.
///
/// Wrap it in an `Arc` to share it between connection tasks.
#[derive(Debug, Default)]
pub struct Directory {
    state: Mutex<DirectoryState>,
}

/// The data behind the lock.
///
/// Rooms are just names. Membership is not stored per room; it is derived
/// by scanning users for the room name, so removing a user removes them
/// from every room at once.
#[derive(Debug, Default)]
struct DirectoryState {
    /// Connected users keyed by nick. A `BTreeMap` keeps listings sorted.
    users: BTreeMap<String, User>,
    /// Existing room names.
    rooms: BTreeSet<String>,
}

impl DirectoryState {
    fn user(&self, nick: &str) -> Result<&User, DirectoryError> {
        self.users
            .get(nick)
            .ok_or_else(|| DirectoryError::UnknownUser(nick.to_owned()))
    }

    fn require_room(&self, room: &str) -> Result<(), DirectoryError> {
        if self.rooms.contains(room) {
            Ok(())
        } else {
            Err(DirectoryError::UnknownRoom(room.to_owned()))
        }
    }

    fn members<'a>(&'a self, room: &'a str) -> impl Iterator<Item = &'a User> + 'a {
        self.users.values().filter(move |user| user.is_in(room))
    }

    fn peers_in(&self, room: &str) -> Vec<Peer> {
        self.members(room).map(User::peer).collect()
    }

    /// Everyone in at least one of `rooms`, each listed once.
    fn peers_in_any(&self, rooms: &[String]) -> Vec<Peer> {
        let wanted: BTreeSet<&str> = rooms.iter().map(String::as_str).collect();
        self.users
            .values()
            .filter(|user| user.rooms.iter().any(|room| wanted.contains(room.as_str())))
            .map(User::peer)
            .collect()
    }
}

impl Directory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    // -- Users --------------------------------------------------------------

    /// Registers a user with their callback address.
    ///
    /// # Errors
    /// [`DirectoryError::DuplicateNick`] if the nick is taken.
    pub async fn register(
        &self,
        nick: &str,
        address: SocketAddr,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(nick) {
            return Err(DirectoryError::DuplicateNick(nick.to_owned()));
        }
        state
            .users
            .insert(nick.to_owned(), User::new(nick.to_owned(), address));
        tracing::info!(%nick, %address, "user registered");
        Ok(())
    }

    /// Removes a user, and with them every room membership they held.
    ///
    /// # Errors
    /// [`DirectoryError::UnknownUser`] if the nick isn't registered.
    pub async fn unregister(&self, nick: &str) -> Result<User, DirectoryError> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .remove(nick)
            .ok_or_else(|| DirectoryError::UnknownUser(nick.to_owned()))?;
        tracing::info!(%nick, "user unregistered");
        Ok(user)
    }

    /// Removes `nick` only if it is still registered at `address`.
    ///
    /// Used to prune users whose callback listener stopped answering. The
    /// address check keeps a stale failure from evicting someone who has
    /// since reconnected under the same nick. Returns whether a user was
    /// removed.
    pub async fn unregister_at(&self, nick: &str, address: SocketAddr) -> bool {
        let mut state = self.state.lock().await;
        let matches = state
            .users
            .get(nick)
            .is_some_and(|user| user.address == address);
        if matches {
            state.users.remove(nick);
            tracing::info!(%nick, %address, "unreachable user pruned");
        }
        matches
    }

    /// Returns the callback address of a user.
    ///
    /// # Errors
    /// [`DirectoryError::UnknownUser`] if the nick isn't registered.
    pub async fn lookup(&self, nick: &str) -> Result<SocketAddr, DirectoryError> {
        let state = self.state.lock().await;
        state.user(nick).map(|user| user.address)
    }

    /// Returns a delivery target for a user.
    pub async fn peer(&self, nick: &str) -> Result<Peer, DirectoryError> {
        let state = self.state.lock().await;
        state.user(nick).map(User::peer)
    }

    /// Returns a copy of a user's record, if registered.
    pub async fn user(&self, nick: &str) -> Option<User> {
        self.state.lock().await.users.get(nick).cloned()
    }

    /// Every registered user as a delivery target, sorted by nick.
    pub async fn snapshot(&self) -> Vec<Peer> {
        let state = self.state.lock().await;
        state.users.values().map(User::peer).collect()
    }

    /// Number of registered users.
    pub async fn len(&self) -> usize {
        self.state.lock().await.users.len()
    }

    /// Returns `true` if no users are registered.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.users.is_empty()
    }

    // -- Rooms --------------------------------------------------------------

    /// Creates an empty room.
    ///
    /// # Errors
    /// [`DirectoryError::RoomExists`] if the name is taken.
    pub async fn create_room(&self, name: &str) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        if !state.rooms.insert(name.to_owned()) {
            return Err(DirectoryError::RoomExists(name.to_owned()));
        }
        tracing::info!(room = %name, "room created");
        Ok(())
    }

    /// Removes a room and drops it from every user's room set.
    ///
    /// A user's personal room is left alone even if a shared room with the
    /// same name is destroyed.
    ///
    /// # Errors
    /// [`DirectoryError::UnknownRoom`] if no such room exists.
    pub async fn destroy_room(&self, name: &str) -> Result<(), DirectoryError> {
        let mut state = self.state.lock().await;
        if !state.rooms.remove(name) {
            return Err(DirectoryError::UnknownRoom(name.to_owned()));
        }

        let mut evicted = 0usize;
        for user in state.users.values_mut() {
            if user.nick != name && user.rooms.remove(name) {
                evicted += 1;
            }
        }

        tracing::info!(room = %name, evicted, "room destroyed");
        Ok(())
    }

    /// Returns `true` if a room with this name exists.
    pub async fn room_exists(&self, name: &str) -> bool {
        self.state.lock().await.rooms.contains(name)
    }

    /// Adds a user to a room. Joining twice is a no-op.
    ///
    /// Returns the room's members after the join (the joiner included),
    /// ready to be notified.
    ///
    /// # Errors
    /// [`DirectoryError::UnknownUser`] or [`DirectoryError::UnknownRoom`].
    pub async fn join_room(
        &self,
        nick: &str,
        room: &str,
    ) -> Result<Vec<Peer>, DirectoryError> {
        let mut state = self.state.lock().await;
        state.user(nick)?;
        state.require_room(room)?;

        if let Some(user) = state.users.get_mut(nick) {
            user.rooms.insert(room.to_owned());
        }
        tracing::debug!(%nick, %room, "joined room");
        Ok(state.peers_in(room))
    }

    /// Removes a user from a room.
    ///
    /// Returns the members that remain, ready to be notified.
    ///
    /// # Errors
    /// [`DirectoryError::UnknownUser`], [`DirectoryError::UnknownRoom`], or
    /// [`DirectoryError::NotInRoom`] if the user never joined.
    pub async fn leave_room(
        &self,
        nick: &str,
        room: &str,
    ) -> Result<Vec<Peer>, DirectoryError> {
        let mut state = self.state.lock().await;
        state.user(nick)?;
        state.require_room(room)?;

        let removed = state
            .users
            .get_mut(nick)
            .is_some_and(|user| user.rooms.remove(room));
        if !removed {
            return Err(DirectoryError::NotInRoom {
                nick: nick.to_owned(),
                room: room.to_owned(),
            });
        }
        tracing::debug!(%nick, %room, "left room");
        Ok(state.peers_in(room))
    }

    /// All room names, sorted.
    pub async fn list_rooms(&self) -> Vec<String> {
        self.state.lock().await.rooms.iter().cloned().collect()
    }

    /// Nicks of a room's members, sorted.
    ///
    /// # Errors
    /// [`DirectoryError::UnknownRoom`] if no such room exists.
    pub async fn list_members(&self, room: &str) -> Result<Vec<String>, DirectoryError> {
        let state = self.state.lock().await;
        state.require_room(room)?;
        Ok(state.members(room).map(|user| user.nick.clone()).collect())
    }

    /// Nicks of everyone in at least one of `rooms`, each listed once.
    pub async fn members_of(&self, rooms: &[String]) -> Vec<String> {
        self.peers_of(rooms)
            .await
            .into_iter()
            .map(|peer| peer.nick)
            .collect()
    }

    /// Delivery targets for everyone in at least one of `rooms`, each
    /// listed once.
    ///
    /// Room names that don't exist simply contribute nobody, except that a
    /// nick still reaches that user through their personal room.
    pub async fn peers_of(&self, rooms: &[String]) -> Vec<Peer> {
        self.state.lock().await.peers_in_any(rooms)
    }

    /// Delivery targets for a broadcast `sender` posts to `rooms`.
    ///
    /// Checks, under the same lock that collects the audience, that the
    /// sender is registered. The sender needs no membership in `rooms`.
    ///
    /// # Errors
    /// [`DirectoryError::UnknownUser`] if the sender isn't registered.
    pub async fn broadcast_audience(
        &self,
        sender: &str,
        rooms: &[String],
    ) -> Result<Vec<Peer>, DirectoryError> {
        let state = self.state.lock().await;
        state.user(sender)?;
        Ok(state.peers_in_any(rooms))
    }

    /// Delivery targets for a message `sender` posts to `room`.
    ///
    /// Checks, under one lock, that the sender is registered, the room
    /// exists and the sender is a member, then returns all members
    /// (the sender included).
    ///
    /// # Errors
    /// [`DirectoryError::UnknownUser`], [`DirectoryError::UnknownRoom`], or
    /// [`DirectoryError::NotInRoom`].
    pub async fn room_audience(
        &self,
        sender: &str,
        room: &str,
    ) -> Result<Vec<Peer>, DirectoryError> {
        let state = self.state.lock().await;
        let user = state.user(sender)?;
        state.require_room(room)?;
        if !user.is_in(room) {
            return Err(DirectoryError::NotInRoom {
                nick: sender.to_owned(),
                room: room.to_owned(),
            });
        }
        Ok(state.peers_in(room))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn nicks(peers: &[Peer]) -> Vec<&str> {
        peers.iter().map(|p| p.nick.as_str()).collect()
    }

    async fn directory_with(users: &[&str], rooms: &[&str]) -> Directory {
        let dir = Directory::new();
        for (i, nick) in users.iter().enumerate() {
            dir.register(nick, addr(20_000 + i as u16)).await.unwrap();
        }
        for room in rooms {
            dir.create_room(room).await.unwrap();
        }
        dir
    }

    // =====================================================================
    // Users
    // =====================================================================

    #[tokio::test]
    async fn test_register_seeds_personal_room() {
        let dir = directory_with(&["ann"], &[]).await;
        let user = dir.user("ann").await.unwrap();
        assert_eq!(user.address, addr(20_000));
        assert!(user.is_in("ann"));
        assert_eq!(user.rooms.len(), 1);
    }

    #[tokio::test]
    async fn test_register_duplicate_nick() {
        let dir = directory_with(&["ann"], &[]).await;
        let err = dir.register("ann", addr(1)).await.unwrap_err();
        assert_eq!(err, DirectoryError::DuplicateNick("ann".into()));
        // The original registration is untouched.
        assert_eq!(dir.lookup("ann").await.unwrap(), addr(20_000));
    }

    #[tokio::test]
    async fn test_unregister_unknown_user() {
        let dir = Directory::new();
        assert_eq!(
            dir.unregister("ghost").await.unwrap_err(),
            DirectoryError::UnknownUser("ghost".into())
        );
    }

    #[tokio::test]
    async fn test_unregister_removes_memberships() {
        let dir = directory_with(&["ann", "bob"], &["lobby"]).await;
        dir.join_room("ann", "lobby").await.unwrap();
        dir.join_room("bob", "lobby").await.unwrap();

        dir.unregister("ann").await.unwrap();

        assert_eq!(dir.list_members("lobby").await.unwrap(), vec!["bob"]);
        assert!(dir.lookup("ann").await.is_err());
    }

    #[tokio::test]
    async fn test_unregister_at_requires_matching_address() {
        let dir = directory_with(&["ann"], &[]).await;
        assert!(!dir.unregister_at("ann", addr(1)).await);
        assert!(dir.user("ann").await.is_some());

        assert!(dir.unregister_at("ann", addr(20_000)).await);
        assert!(dir.is_empty().await);
        assert!(!dir.unregister_at("ann", addr(20_000)).await);
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted_by_nick() {
        let dir = directory_with(&["cat", "ann", "bob"], &[]).await;
        let snapshot = dir.snapshot().await;
        assert_eq!(nicks(&snapshot), vec!["ann", "bob", "cat"]);
        assert_eq!(dir.len().await, 3);
    }

    // =====================================================================
    // Rooms
    // =====================================================================

    #[tokio::test]
    async fn test_room_lifecycle() {
        let dir = Directory::new();
        dir.create_room("lobby").await.unwrap();
        assert_eq!(
            dir.create_room("lobby").await.unwrap_err(),
            DirectoryError::RoomExists("lobby".into())
        );
        dir.destroy_room("lobby").await.unwrap();
        assert_eq!(
            dir.destroy_room("lobby").await.unwrap_err(),
            DirectoryError::UnknownRoom("lobby".into())
        );
    }

    #[tokio::test]
    async fn test_list_rooms_sorted() {
        let dir = directory_with(&[], &["zeta", "alpha", "mid"]).await;
        assert_eq!(dir.list_rooms().await, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_join_requires_user_and_room() {
        let dir = directory_with(&["ann"], &[]).await;
        assert_eq!(
            dir.join_room("ann", "lobby").await.unwrap_err(),
            DirectoryError::UnknownRoom("lobby".into())
        );
        dir.create_room("lobby").await.unwrap();
        assert_eq!(
            dir.join_room("ghost", "lobby").await.unwrap_err(),
            DirectoryError::UnknownUser("ghost".into())
        );
    }

    #[tokio::test]
    async fn test_join_returns_members_including_joiner() {
        let dir = directory_with(&["ann", "bob"], &["lobby"]).await;
        let first = dir.join_room("bob", "lobby").await.unwrap();
        assert_eq!(nicks(&first), vec!["bob"]);

        let second = dir.join_room("ann", "lobby").await.unwrap();
        assert_eq!(nicks(&second), vec!["ann", "bob"]);

        // Joining again changes nothing.
        let again = dir.join_room("ann", "lobby").await.unwrap();
        assert_eq!(again, second);
    }

    #[tokio::test]
    async fn test_leave_returns_remaining_members() {
        let dir = directory_with(&["ann", "bob"], &["lobby"]).await;
        dir.join_room("ann", "lobby").await.unwrap();
        dir.join_room("bob", "lobby").await.unwrap();

        let remaining = dir.leave_room("ann", "lobby").await.unwrap();
        assert_eq!(nicks(&remaining), vec!["bob"]);

        assert_eq!(
            dir.leave_room("ann", "lobby").await.unwrap_err(),
            DirectoryError::NotInRoom {
                nick: "ann".into(),
                room: "lobby".into()
            }
        );
    }

    #[tokio::test]
    async fn test_list_members_unknown_room() {
        let dir = directory_with(&["ann"], &[]).await;
        // Personal rooms are not listable rooms.
        assert!(matches!(
            dir.list_members("ann").await,
            Err(DirectoryError::UnknownRoom(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_purges_membership() {
        let dir = directory_with(&["ann"], &["lobby"]).await;
        dir.join_room("ann", "lobby").await.unwrap();
        dir.destroy_room("lobby").await.unwrap();
        dir.create_room("lobby").await.unwrap();

        assert!(dir.list_members("lobby").await.unwrap().is_empty());
        assert!(!dir.user("ann").await.unwrap().is_in("lobby"));
    }

    #[tokio::test]
    async fn test_destroy_keeps_personal_room_with_same_name() {
        let dir = directory_with(&["ann"], &["ann"]).await;
        dir.destroy_room("ann").await.unwrap();
        assert!(dir.user("ann").await.unwrap().is_in("ann"));
    }

    // =====================================================================
    // Audiences
    // =====================================================================

    #[tokio::test]
    async fn test_members_of_deduplicates() {
        let dir = directory_with(&["ann", "bob", "cat"], &["r1", "r2", "r3"]).await;
        dir.join_room("ann", "r1").await.unwrap();
        dir.join_room("ann", "r2").await.unwrap();
        dir.join_room("bob", "r2").await.unwrap();
        dir.join_room("cat", "r3").await.unwrap();

        let members = dir.members_of(&["r1".into(), "r2".into()]).await;
        assert_eq!(members, vec!["ann", "bob"]);
    }

    #[tokio::test]
    async fn test_peers_of_reaches_personal_rooms() {
        let dir = directory_with(&["ann", "bob"], &[]).await;
        let peers = dir.peers_of(&["bob".into(), "nowhere".into()]).await;
        assert_eq!(nicks(&peers), vec!["bob"]);
    }

    #[tokio::test]
    async fn test_broadcast_audience() {
        let dir = directory_with(&["ann", "bob", "cat"], &["r1", "r2"]).await;
        dir.join_room("bob", "r1").await.unwrap();
        dir.join_room("bob", "r2").await.unwrap();
        dir.join_room("cat", "r2").await.unwrap();

        let rooms = vec!["r1".to_string(), "r2".to_string()];
        let audience = dir.broadcast_audience("ann", &rooms).await.unwrap();
        assert_eq!(nicks(&audience), vec!["bob", "cat"]);

        assert_eq!(
            dir.broadcast_audience("ghost", &rooms).await,
            Err(DirectoryError::UnknownUser("ghost".into()))
        );
    }

    #[tokio::test]
    async fn test_room_audience_requires_membership() {
        let dir = directory_with(&["ann", "bob"], &["lobby"]).await;
        dir.join_room("bob", "lobby").await.unwrap();

        assert!(matches!(
            dir.room_audience("ann", "lobby").await,
            Err(DirectoryError::NotInRoom { .. })
        ));
        assert!(matches!(
            dir.room_audience("ann", "nowhere").await,
            Err(DirectoryError::UnknownRoom(_))
        ));
        assert!(matches!(
            dir.room_audience("ghost", "lobby").await,
            Err(DirectoryError::UnknownUser(_))
        ));

        dir.join_room("ann", "lobby").await.unwrap();
        let audience = dir.room_audience("ann", "lobby").await.unwrap();
        assert_eq!(nicks(&audience), vec!["ann", "bob"]);
        assert_eq!(audience[1].address, addr(20_001));
    }
}
