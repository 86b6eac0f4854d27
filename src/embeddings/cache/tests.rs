use super::*;

#[test]
fn miss_then_hit() {
    let cache = EmbeddingCache::new(4);
    let key = EmbeddingCache::key("stub", "m", 3, "text");

    assert!(cache.get(&key).is_none());
    cache.insert(key, vec![1.0, 2.0, 3.0]);
    assert_eq!(cache.get(&key), Some(vec![1.0, 2.0, 3.0]));

    let (hits, misses) = cache.stats();
    assert_eq!(hits, 1);
    assert_eq!(misses, 1);
}

#[test]
fn key_depends_on_every_component() {
    let base = EmbeddingCache::key("openai", "model-a", 256, "text");
    assert_ne!(base, EmbeddingCache::key("gemini", "model-a", 256, "text"));
    assert_ne!(base, EmbeddingCache::key("openai", "model-b", 256, "text"));
    assert_ne!(base, EmbeddingCache::key("openai", "model-a", 512, "text"));
    assert_ne!(base, EmbeddingCache::key("openai", "model-a", 256, "other"));
}

#[test]
fn key_normalises_whitespace() {
    let a = EmbeddingCache::key("p", "m", 8, "  some\n\ttext  here ");
    let b = EmbeddingCache::key("p", "m", 8, "some text here");
    assert_eq!(a, b);
}

#[test]
fn eviction_removes_least_recently_used() {
    let cache = EmbeddingCache::new(2);
    let first = EmbeddingCache::key("p", "m", 2, "first");
    let second = EmbeddingCache::key("p", "m", 2, "second");
    let third = EmbeddingCache::key("p", "m", 2, "third");

    cache.insert(first, vec![1.0]);
    cache.insert(second, vec![2.0]);

    // Touch `first` so `second` becomes the eviction candidate.
    assert!(cache.get(&first).is_some());
    cache.insert(third, vec![3.0]);

    assert_eq!(cache.len(), 2);
    assert!(cache.get(&first).is_some());
    assert!(cache.get(&second).is_none());
    assert!(cache.get(&third).is_some());
}

#[test]
fn zero_capacity_disables_storage() {
    let cache = EmbeddingCache::new(0);
    let key = EmbeddingCache::key("p", "m", 2, "text");
    cache.insert(key, vec![1.0, 2.0]);
    assert!(cache.get(&key).is_none());
    assert!(cache.is_empty());
}

#[test]
fn clear_empties_the_cache() {
    let cache = EmbeddingCache::new(4);
    let key = EmbeddingCache::key("p", "m", 1, "text");
    cache.insert(key, vec![1.0]);
    assert_eq!(cache.len(), 1);
    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.get(&key).is_none());
}

#[test]
fn reinserting_updates_without_eviction() {
    let cache = EmbeddingCache::new(1);
    let key = EmbeddingCache::key("p", "m", 1, "text");
    cache.insert(key, vec![1.0]);
    cache.insert(key, vec![2.0]);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&key), Some(vec![2.0]));
}
