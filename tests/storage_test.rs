// tests/storage_test.rs
// Conversation storage contract, run against both providers

use std::sync::Arc;
use std::time::Duration;

use nlweb::embedding::SimHashEmbedder;
use nlweb::storage::{ConversationStorage, MemoryStorage, SqliteStorage};

async fn providers() -> Vec<(&'static str, Arc<dyn ConversationStorage>)> {
    let embedder = Arc::new(SimHashEmbedder::default());
    vec![
        ("memory", Arc::new(MemoryStorage::new(Some(embedder.clone()))) as _),
        (
            "sqlite",
            Arc::new(
                SqliteStorage::connect(":memory:", Some(embedder))
                    .await
                    .expect("in-memory sqlite should open"),
            ) as _,
        ),
    ]
}

#[tokio::test]
async fn null_thread_id_always_starts_a_new_thread() {
    for (name, storage) in providers().await {
        let a = storage
            .add_conversation("u1", "seriouseats", None, "q1", "r1")
            .await
            .unwrap();
        let b = storage
            .add_conversation("u1", "seriouseats", None, "q2", "r2")
            .await
            .unwrap();
        assert_ne!(a.thread_id, b.thread_id, "{name}: thread ids must be fresh");
        assert_ne!(a.conversation_id, b.conversation_id);
        assert!(a.embedding.is_some(), "{name}: embedding computed on add");
    }
}

#[tokio::test]
async fn recent_conversations_ordering_contract() {
    for (name, storage) in providers().await {
        // Two threads, interleaved in time: t1 gets the latest entry.
        let t1 = storage
            .add_conversation("u1", "seriouseats", None, "first in t1", "r")
            .await
            .unwrap()
            .thread_id;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let t2 = storage
            .add_conversation("u1", "seriouseats", None, "first in t2", "r")
            .await
            .unwrap()
            .thread_id;
        tokio::time::sleep(Duration::from_millis(5)).await;
        storage
            .add_conversation("u1", "seriouseats", Some(t1.clone()), "second in t1", "r")
            .await
            .unwrap();

        let threads = storage
            .get_recent_conversations("u1", "seriouseats", 50)
            .await
            .unwrap();
        assert_eq!(threads.len(), 2, "{name}");
        assert_eq!(threads[0].id, t1, "{name}: most recent thread first");
        assert_eq!(threads[1].id, t2, "{name}");

        // Oldest-first inside each thread; non-increasing max across.
        for thread in &threads {
            let times: Vec<&str> = thread
                .conversations
                .iter()
                .map(|c| c["time"].as_str().unwrap())
                .collect();
            let mut sorted = times.clone();
            sorted.sort();
            assert_eq!(times, sorted, "{name}: conversations oldest-first");
        }
    }
}

#[tokio::test]
async fn site_filter_and_all() {
    for (name, storage) in providers().await {
        storage
            .add_conversation("u1", "seriouseats", None, "about pasta", "r")
            .await
            .unwrap();
        storage
            .add_conversation("u1", "imdb", None, "about movies", "r")
            .await
            .unwrap();

        let one_site = storage
            .get_recent_conversations("u1", "seriouseats", 50)
            .await
            .unwrap();
        assert_eq!(one_site.len(), 1, "{name}");

        let all_sites = storage.get_recent_conversations("u1", "all", 50).await.unwrap();
        assert_eq!(all_sites.len(), 2, "{name}: site=all disables the filter");
    }
}

#[tokio::test]
async fn delete_is_idempotent_and_scoped_to_user() {
    for (name, storage) in providers().await {
        let entry = storage
            .add_conversation("u1", "seriouseats", None, "q", "r")
            .await
            .unwrap();

        // Wrong user cannot delete.
        assert!(
            !storage
                .delete_conversation(&entry.conversation_id, Some("intruder"))
                .await
                .unwrap(),
            "{name}"
        );
        assert!(
            storage
                .delete_conversation(&entry.conversation_id, Some("u1"))
                .await
                .unwrap(),
            "{name}"
        );
        // Second delete finds nothing.
        assert!(
            !storage
                .delete_conversation(&entry.conversation_id, Some("u1"))
                .await
                .unwrap(),
            "{name}: delete must be idempotent"
        );
    }
}

#[tokio::test]
async fn search_finds_semantically_close_conversations() {
    for (name, storage) in providers().await {
        storage
            .add_conversation("u1", "seriouseats", None, "easy chicken dinner ideas", "try the stir fry")
            .await
            .unwrap();
        storage
            .add_conversation("u1", "seriouseats", None, "galaxy formation physics", "out of scope")
            .await
            .unwrap();

        let results = storage
            .search_conversations("chicken dinner", Some("u1"), None, 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1, "{name}");
        assert!(
            results[0].user_prompt.contains("chicken"),
            "{name}: closest conversation should win"
        );
    }
}
