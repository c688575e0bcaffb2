//! Per-conversation message log.
//!
//! The store is an explicitly injected, process-lifetime component rather
//! than a bare global map: every thread is created lazily on first access,
//! appends within one thread serialize on a per-thread lock, and idle
//! threads are evicted under a capacity cap plus an idle-age expiry so the
//! map cannot grow without bound. Messages inside a live thread are
//! append-only and never reordered.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use leadlens_core::{Message, Role};

#[derive(Clone, Debug)]
pub struct ThreadStoreConfig {
    /// Hard cap on live threads; least-recently-active threads are evicted
    /// when a new id arrives at capacity.
    pub max_threads: usize,
    /// Threads idle for longer than this are swept on the next access.
    pub idle_ttl: Duration,
}

impl Default for ThreadStoreConfig {
    fn default() -> Self {
        Self { max_threads: 1024, idle_ttl: Duration::from_secs(60 * 60) }
    }
}

pub struct ThreadStore {
    config: ThreadStoreConfig,
    threads: Mutex<HashMap<String, Arc<ThreadHandle>>>,
}

pub struct ThreadHandle {
    id: String,
    state: Mutex<ThreadState>,
}

struct ThreadState {
    messages: Vec<Message>,
    last_active: DateTime<Utc>,
}

impl ThreadStore {
    pub fn new(config: ThreadStoreConfig) -> Self {
        Self { config, threads: Mutex::new(HashMap::new()) }
    }

    /// Fetch the thread for `thread_id`, creating an empty one on first
    /// access. There is no "not found" path. Expired threads are swept and
    /// the capacity cap enforced before insertion.
    pub fn get_or_create(&self, thread_id: &str) -> Arc<ThreadHandle> {
        let mut threads = self.threads.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.idle_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        threads.retain(|_, handle| now - handle.last_active() <= ttl);

        if let Some(handle) = threads.get(thread_id) {
            handle.touch(now);
            return Arc::clone(handle);
        }

        if threads.len() >= self.config.max_threads {
            if let Some(oldest) = threads
                .iter()
                .min_by_key(|(_, handle)| handle.last_active())
                .map(|(id, _)| id.clone())
            {
                threads.remove(&oldest);
            }
        }

        let handle = Arc::new(ThreadHandle {
            id: thread_id.to_string(),
            state: Mutex::new(ThreadState { messages: Vec::new(), last_active: now }),
        });
        threads.insert(thread_id.to_string(), Arc::clone(&handle));
        handle
    }

    pub fn len(&self) -> usize {
        self.threads.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ThreadHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn append(&self, message: Message) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.last_active = Utc::now();
        state.messages.push(message);
    }

    /// Full message list in insertion order.
    pub fn history(&self) -> Vec<Message> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).messages.clone()
    }

    /// Projection used as LLM context: user/assistant roles only, content
    /// text only. Internal fields such as the response id never reach a
    /// prompt through this view.
    pub fn context_view(&self) -> Vec<(Role, String)> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .messages
            .iter()
            .filter(|message| matches!(message.role, Role::User | Role::Assistant))
            .map(|message| (message.role, message.content.clone()))
            .collect()
    }

    fn last_active(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).last_active
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).last_active = now;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use leadlens_core::{Message, Role};

    use super::{ThreadStore, ThreadStoreConfig};

    #[test]
    fn appends_preserve_insertion_order() {
        let store = ThreadStore::new(ThreadStoreConfig::default());
        let thread = store.get_or_create("t-1");

        for i in 0..5 {
            thread.append(Message::user(format!("question {i}")));
        }

        let history = thread.history();
        assert_eq!(history.len(), 5);
        for (i, message) in history.iter().enumerate() {
            assert_eq!(message.content, format!("question {i}"));
        }
    }

    #[test]
    fn unseen_id_creates_an_empty_thread() {
        let store = ThreadStore::new(ThreadStoreConfig::default());
        let thread = store.get_or_create("fresh");
        assert!(thread.history().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn same_id_returns_same_thread() {
        let store = ThreadStore::new(ThreadStoreConfig::default());
        store.get_or_create("t-1").append(Message::user("hello"));
        assert_eq!(store.get_or_create("t-1").history().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn context_view_excludes_system_messages_and_response_ids() {
        let store = ThreadStore::new(ThreadStoreConfig::default());
        let thread = store.get_or_create("t-1");

        thread.append(Message {
            role: Role::System,
            content: "internal prompt".to_string(),
            response_id: None,
            created_at: Utc::now(),
        });
        thread.append(Message::user("show me my leads"));
        thread.append(Message::assistant("You have 2 leads.", Some("resp-1".to_string())));

        let view = thread.context_view();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0], (Role::User, "show me my leads".to_string()));
        assert_eq!(view[1], (Role::Assistant, "You have 2 leads.".to_string()));
    }

    #[test]
    fn capacity_cap_evicts_least_recently_active() {
        let store = ThreadStore::new(ThreadStoreConfig {
            max_threads: 2,
            idle_ttl: Duration::from_secs(3600),
        });

        store.get_or_create("a").append(Message::user("first"));
        std::thread::sleep(Duration::from_millis(2));
        store.get_or_create("b").append(Message::user("second"));
        std::thread::sleep(Duration::from_millis(2));
        // touching `a` makes `b` the eviction candidate
        store.get_or_create("a");
        store.get_or_create("c");

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_or_create("a").history().len(), 1, "a should have survived");
        assert!(store.get_or_create("b").history().is_empty(), "b should have been evicted");
    }

    #[test]
    fn idle_threads_are_swept() {
        let store = ThreadStore::new(ThreadStoreConfig {
            max_threads: 16,
            idle_ttl: Duration::from_millis(0),
        });

        store.get_or_create("stale").append(Message::user("old"));
        std::thread::sleep(Duration::from_millis(5));

        let revived = store.get_or_create("stale");
        assert!(revived.history().is_empty(), "expired thread should restart empty");
    }
}
