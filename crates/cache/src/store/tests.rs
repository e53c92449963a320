use super::*;
use std::sync::Arc;
use std::thread;

fn store(max_entries: usize) -> CacheStore<String> {
    CacheStore::new("test", max_entries, Duration::from_secs(60))
}

#[test]
fn test_round_trip() {
    let store = store(10);
    store.set_with_ttl("k", "v".to_string(), Duration::from_secs(30));

    assert_eq!(store.get("k"), Some("v".to_string()));
    let stats = store.stats();
    assert_eq!(stats.hit_count, 1);
    assert_eq!(stats.miss_count, 0);
    assert_eq!(stats.size, 1);
}

#[test]
fn test_miss_is_counted() {
    let store = store(10);
    assert_eq!(store.get("absent"), None);
    assert_eq!(store.stats().miss_count, 1);
}

#[test]
fn test_lru_eviction_drops_oldest() {
    let store = store(3);
    for i in 0..4 {
        store.set(format!("key{i}"), i.to_string());
    }

    assert_eq!(store.size(), 3);
    assert_eq!(store.get("key0"), None);
    assert_eq!(store.get("key3"), Some("3".to_string()));
    assert_eq!(store.stats().evictions, 1);
}

#[test]
fn test_access_refreshes_recency() {
    let store = store(2);
    store.set("key1", "value1".to_string());
    store.set("key2", "value2".to_string());

    // key1 becomes most recently used, so key2 is the eviction candidate
    assert!(store.get("key1").is_some());
    store.set("key3", "value3".to_string());

    assert_eq!(store.get("key2"), None);
    assert_eq!(store.get("key1"), Some("value1".to_string()));
    assert_eq!(store.get("key3"), Some("value3".to_string()));
}

#[test]
fn test_overwrite_refreshes_without_eviction() {
    let store = store(2);
    store.set("a", "1".to_string());
    store.set("b", "2".to_string());
    store.set("a", "updated".to_string());

    assert_eq!(store.size(), 2);
    assert_eq!(store.stats().evictions, 0);

    store.set("c", "3".to_string());
    assert_eq!(store.get("b"), None);
    assert_eq!(store.get("a"), Some("updated".to_string()));
}

#[test]
fn test_ttl_expiry() {
    let store = store(10);
    store.set_with_ttl("short", "v".to_string(), Duration::from_millis(100));
    assert!(store.get("short").is_some());

    thread::sleep(Duration::from_millis(200));

    assert_eq!(store.get("short"), None);
    let stats = store.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.size, 0);
}

#[test]
fn test_size_includes_unpurged_expired_entries() {
    let store = store(10);
    store.set_with_ttl("a", "1".to_string(), Duration::from_millis(20));
    store.set_with_ttl("b", "2".to_string(), Duration::from_secs(60));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(store.size(), 2);
    assert_eq!(store.purge_expired(), 1);
    assert_eq!(store.size(), 1);
    assert_eq!(store.get("b"), Some("2".to_string()));
}

#[test]
fn test_expired_tail_counts_as_expiration() {
    let store = store(2);
    store.set_with_ttl("stale", "1".to_string(), Duration::from_millis(20));
    store.set("live", "2".to_string());
    thread::sleep(Duration::from_millis(50));

    store.set("new", "3".to_string());

    assert_eq!(store.get("live"), Some("2".to_string()));
    let stats = store.stats();
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.expirations, 1);
}

#[test]
fn test_full_store_only_inspects_the_tail() {
    let store = store(2);
    store.set_with_ttl("stale", "1".to_string(), Duration::from_millis(40));
    store.set("live", "2".to_string());
    // stale becomes most recently used, leaving live at the tail
    assert!(store.get("stale").is_some());
    thread::sleep(Duration::from_millis(80));

    store.set("new", "3".to_string());

    let stats = store.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.expirations, 0);
    // the expired entry is still held until something purges it
    assert_eq!(stats.size, 2);
    assert_eq!(store.purge_expired(), 1);
    assert_eq!(store.get("new"), Some("3".to_string()));
}

#[test]
fn test_each_insert_into_full_store_evicts_once() {
    let store = store(4);
    for i in 0..4 {
        store.set(format!("key{i}"), i.to_string());
    }

    for i in 4..20 {
        let before = store.stats();
        store.set(format!("key{i}"), i.to_string());
        let after = store.stats();
        assert_eq!(after.evictions, before.evictions + 1);
        assert_eq!(after.expirations, before.expirations);
        assert_eq!(after.size, 4);
    }
}

#[test]
fn test_zero_ttl_uses_default() {
    let store: CacheStore<String> = CacheStore::new("test", 10, Duration::from_millis(30));
    store.set_with_ttl("k", "v".to_string(), Duration::ZERO);
    assert!(store.get("k").is_some());

    thread::sleep(Duration::from_millis(60));
    assert_eq!(store.get("k"), None);
}

#[test]
fn test_zero_capacity_store_keeps_nothing() {
    let store = store(0);
    store.set("k", "v".to_string());

    assert_eq!(store.size(), 0);
    assert_eq!(store.get("k"), None);
    assert_eq!(store.stats().evictions, 1);
}

#[test]
fn test_delete_and_clear() {
    let store = store(10);
    store.set("a", "1".to_string());
    store.set("b", "2".to_string());

    assert!(store.delete("a"));
    assert!(!store.delete("a"));
    assert_eq!(store.size(), 1);

    store.clear();
    assert_eq!(store.size(), 0);
    assert_eq!(store.get("b"), None);
}

#[test]
fn test_concurrent_access_never_exceeds_capacity() {
    let store = Arc::new(store(16));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("t{t}-{}", i % 32);
                    store.set(key.clone(), i.to_string());
                    let _ = store.get(&key);
                    assert!(store.size() <= 16);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = store.stats();
    assert!(stats.size <= 16);
    assert_eq!(stats.hit_count + stats.miss_count, 8 * 200);
}
