//! Races against the directory from many tasks at once.
//!
//! These run on the multi-threaded runtime so the tasks really do contend
//! for the lock from different worker threads.

use std::net::SocketAddr;
use std::sync::Arc;

use parley_directory::{Directory, DirectoryError};

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_room_has_one_winner() {
    let dir = Arc::new(Directory::new());

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let dir = Arc::clone(&dir);
        tasks.push(tokio::spawn(async move { dir.create_room("lobby").await }));
    }

    let mut ok = 0;
    let mut exists = 0;
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(()) => ok += 1,
            Err(DirectoryError::RoomExists(room)) => {
                assert_eq!(room, "lobby");
                exists += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(exists, 31);
    assert_eq!(dir.list_rooms().await, vec!["lobby"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_same_nick_has_one_winner() {
    let dir = Arc::new(Directory::new());

    let mut tasks = Vec::new();
    for i in 0..16u16 {
        let dir = Arc::clone(&dir);
        tasks.push(tokio::spawn(async move {
            dir.register("ann", addr(30_000 + i)).await.map(|()| i)
        }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.expect("task panicked") {
            Ok(i) => winners.push(i),
            Err(err) => assert_eq!(err, DirectoryError::DuplicateNick("ann".into())),
        }
    }

    assert_eq!(winners.len(), 1);
    // The stored address belongs to the one registration that won.
    assert_eq!(dir.lookup("ann").await.unwrap(), addr(30_000 + winners[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_all_land() {
    let dir = Arc::new(Directory::new());
    dir.create_room("lobby").await.unwrap();
    for i in 0..20u16 {
        dir.register(&format!("user{i:02}"), addr(31_000 + i))
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for i in 0..20u16 {
        let dir = Arc::clone(&dir);
        tasks.push(tokio::spawn(async move {
            dir.join_room(&format!("user{i:02}"), "lobby").await
        }));
    }
    for task in tasks {
        task.await.expect("task panicked").expect("join should succeed");
    }

    let members = dir.list_members("lobby").await.unwrap();
    assert_eq!(members.len(), 20);
    assert_eq!(members.first().map(String::as_str), Some("user00"));
    assert_eq!(members.last().map(String::as_str), Some("user19"));
}
