//! Bounded memory manager.
//!
//! Owns the three pieces of shared mutable state: the conversation log, the
//! search-result cache, and the search rate-limit clock. Bounds are enforced
//! inline on every mutation and again by a periodic background sweep, so no
//! structure grows without limit regardless of conversation length or cache
//! churn.
//!
//! Single-writer discipline: the agent loop appends conversation entries, the
//! search tool touches the cache and the rate-limit clock. Each lives behind
//! its own async mutex so a sweep can interleave with an in-flight turn; the
//! loop works from cloned slices, never from references into the log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Limits;
use crate::conversation::{truncate_with_marker, ConversationEntry};
use crate::tools::search::SearchResponse;

struct CacheEntry {
    value: SearchResponse,
    inserted_at: Instant,
}

/// Explicit-lifecycle owner of all bounded state: create, sweep, clear.
pub struct MemoryManager {
    limits: Limits,
    conversation: Mutex<Vec<ConversationEntry>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    next_search_at: Mutex<Option<Instant>>,
}

impl MemoryManager {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            conversation: Mutex::new(Vec::new()),
            cache: Mutex::new(HashMap::new()),
            next_search_at: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// How many rendered message elements a collaborator UI should retain,
    /// oldest non-anchor first when evicting. Contract only; no rendering
    /// happens server-side.
    pub fn rendered_cap(&self) -> usize {
        self.limits.rendered_cap
    }

    // ── Conversation ─────────────────────────────────────────────────────

    /// Append an entry, applying the per-message content cap and then the
    /// conversation length cap.
    pub async fn append(&self, mut entry: ConversationEntry) {
        entry.content = truncate_with_marker(&entry.content, self.limits.max_message_chars);
        let mut log = self.conversation.lock().await;
        log.push(entry);
        Self::prune(&mut log, self.limits.max_conversation_len);
    }

    /// Keep the anchor (entry 0) plus the most recent `cap - 1` entries,
    /// discarding the middle.
    fn prune(log: &mut Vec<ConversationEntry>, cap: usize) {
        if log.len() <= cap || cap == 0 {
            return;
        }
        let tail_start = log.len() - (cap - 1);
        let anchor = log[0].clone();
        let tail: Vec<ConversationEntry> = log[tail_start..].to_vec();
        log.clear();
        log.push(anchor);
        log.extend(tail);
    }

    /// Full retained history, for local display.
    pub async fn snapshot(&self) -> Vec<ConversationEntry> {
        self.conversation.lock().await.clone()
    }

    /// The trailing window actually sent to a provider, bounding per-call
    /// payload size independent of the retained history.
    pub async fn outbound_slice(&self) -> Vec<ConversationEntry> {
        let log = self.conversation.lock().await;
        let start = log.len().saturating_sub(self.limits.outbound_window);
        log[start..].to_vec()
    }

    pub async fn conversation_len(&self) -> usize {
        self.conversation.lock().await.len()
    }

    /// Discard the conversation wholesale.
    pub async fn clear_conversation(&self) {
        self.conversation.lock().await.clear();
    }

    // ── Search cache ─────────────────────────────────────────────────────

    /// Fetch a fresh cached response. Stale entries are never returned.
    pub async fn cache_get(&self, key: &str) -> Option<SearchResponse> {
        let cache = self.cache.lock().await;
        let entry = cache.get(key)?;
        if entry.inserted_at.elapsed() > self.limits.cache_ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert a response, evicting oldest-by-timestamp past the entry cap.
    pub async fn cache_put(&self, key: String, value: SearchResponse) {
        let mut cache = self.cache.lock().await;
        cache.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        Self::evict(&mut cache, self.limits.max_cache_entries);
    }

    fn evict(cache: &mut HashMap<String, CacheEntry>, cap: usize) {
        while cache.len() > cap {
            let oldest = cache
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => cache.remove(&key),
                None => break,
            };
        }
    }

    pub async fn cache_size(&self) -> usize {
        self.cache.lock().await.len()
    }

    // ── Search rate limit ────────────────────────────────────────────────

    /// Reserve the next search slot. Returns how long the caller must delay
    /// before issuing its request; slots are handed out `search_cooldown`
    /// apart, so bursts queue rather than reject.
    pub async fn acquire_search_slot(&self) -> Duration {
        let mut next_at = self.next_search_at.lock().await;
        let now = Instant::now();
        let start = match *next_at {
            Some(at) if at > now => at,
            _ => now,
        };
        *next_at = Some(start + self.limits.search_cooldown);
        start.saturating_duration_since(now)
    }

    // ── Sweep ────────────────────────────────────────────────────────────

    /// One sweep pass: drop stale cache entries, enforce the cache entry cap,
    /// re-check the conversation cap.
    pub async fn sweep(&self) {
        let ttl = self.limits.cache_ttl;
        {
            let mut cache = self.cache.lock().await;
            cache.retain(|_, e| e.inserted_at.elapsed() <= ttl);
            Self::evict(&mut cache, self.limits.max_cache_entries);
        }
        {
            let mut log = self.conversation.lock().await;
            Self::prune(&mut log, self.limits.max_conversation_len);
        }
    }

    /// Spawn the periodic background sweep. Runs until the handle is dropped
    /// or aborted; never blocks the agent loop.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = manager.limits.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.sweep().await;
                let cache_size = manager.cache_size().await;
                tracing::debug!(cache_size, "memory sweep complete");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::search::{SearchResponse, SearchResult};

    fn manager_with(limits: Limits) -> MemoryManager {
        MemoryManager::new(limits)
    }

    fn response(query: &str) -> SearchResponse {
        SearchResponse {
            query: query.to_string(),
            results: vec![SearchResult {
                title: "t".into(),
                link: "https://example.com".into(),
                snippet: "s".into(),
                display_link: "example.com".into(),
            }],
            source: "Test".into(),
            total_results: "1".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            cached: false,
            note: None,
        }
    }

    #[tokio::test]
    async fn conversation_stays_bounded_and_anchor_survives() {
        let limits = Limits {
            max_conversation_len: 5,
            ..Limits::for_tests()
        };
        let memory = manager_with(limits);

        memory.append(ConversationEntry::user("anchor")).await;
        for i in 0..40 {
            memory
                .append(ConversationEntry::user(format!("msg {}", i)))
                .await;
        }

        let log = memory.snapshot().await;
        assert_eq!(log.len(), 5);
        assert_eq!(log[0].content, "anchor");
        assert_eq!(log[4].content, "msg 39");
    }

    #[tokio::test]
    async fn long_content_gets_visible_marker() {
        let limits = Limits {
            max_message_chars: 16,
            ..Limits::for_tests()
        };
        let memory = manager_with(limits);
        memory
            .append(ConversationEntry::user("a".repeat(100)))
            .await;
        let log = memory.snapshot().await;
        assert!(log[0].content.ends_with("... [truncated]"));
    }

    #[tokio::test]
    async fn outbound_slice_is_windowed() {
        let limits = Limits {
            outbound_window: 3,
            ..Limits::for_tests()
        };
        let memory = manager_with(limits);
        for i in 0..10 {
            memory
                .append(ConversationEntry::user(format!("msg {}", i)))
                .await;
        }
        let slice = memory.outbound_slice().await;
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].content, "msg 7");
        assert_eq!(memory.conversation_len().await, 10);
    }

    #[tokio::test]
    async fn stale_cache_entries_are_never_returned_and_sweep_drops_them() {
        let memory = manager_with(Limits::for_tests());
        memory.cache_put("ibm_3".into(), response("ibm")).await;
        assert!(memory.cache_get("ibm_3").await.is_some());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(memory.cache_get("ibm_3").await.is_none());

        memory.sweep().await;
        assert_eq!(memory.cache_size().await, 0);
    }

    #[tokio::test]
    async fn background_sweeper_drops_stale_entries() {
        let memory = Arc::new(manager_with(Limits::for_tests()));
        memory.cache_put("ibm_3".into(), response("ibm")).await;

        let handle = memory.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(memory.cache_size().await, 0);
        handle.abort();
    }

    #[tokio::test]
    async fn cache_evicts_oldest_past_cap() {
        let limits = Limits {
            max_cache_entries: 2,
            cache_ttl: Duration::from_secs(60),
            ..Limits::for_tests()
        };
        let memory = manager_with(limits);
        memory.cache_put("a_1".into(), response("a")).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        memory.cache_put("b_1".into(), response("b")).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        memory.cache_put("c_1".into(), response("c")).await;

        assert_eq!(memory.cache_size().await, 2);
        assert!(memory.cache_get("a_1").await.is_none());
        assert!(memory.cache_get("c_1").await.is_some());
    }

    #[tokio::test]
    async fn search_slots_are_spaced_by_cooldown() {
        let limits = Limits {
            search_cooldown: Duration::from_millis(100),
            ..Limits::for_tests()
        };
        let memory = manager_with(limits);

        let first = memory.acquire_search_slot().await;
        let second = memory.acquire_search_slot().await;
        assert_eq!(first, Duration::ZERO);
        assert!(second >= Duration::from_millis(90));
    }
}
