use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::generators::{InsightGenerator, MoodMessage, MoodMessageGenerator};
use super::task::{insight_projection, mood_projection, BoardSummary, Task};
use crate::cache::{
    CacheEntry, CacheStats, CacheStore, EphemeralStore, Encoding, Fingerprint, FingerprintCache,
    Generator, KeyValueStore, PendingPolicy, PersistentStore, Resolution,
};
use crate::constants::{INSIGHT_CACHE_KEY, MOOD_CACHE_KEY};
use crate::models::{CompletionOptions, Model, TimeoutGenerator};

/// Stores backing the two dashboard artifacts
pub struct DashboardStores {
    pub insight: Arc<dyn CacheStore<String>>,
    pub mood: Arc<dyn CacheStore<MoodMessage>>,
}

impl DashboardStores {
    /// Both artifacts under one namespace of a shared backend
    pub fn persistent(backend: Arc<dyn KeyValueStore>, namespace: &str, encoding: Encoding) -> Self {
        Self {
            insight: Arc::new(
                PersistentStore::<String>::new(Arc::clone(&backend), namespace)
                    .with_encoding(encoding),
            ),
            mood: Arc::new(
                PersistentStore::<MoodMessage>::new(backend, namespace).with_encoding(encoding),
            ),
        }
    }

    pub fn ephemeral() -> Self {
        Self {
            insight: Arc::new(EphemeralStore::<String>::new()),
            mood: Arc::new(EphemeralStore::<MoodMessage>::new()),
        }
    }
}

/// Everything the dashboard shows for one board snapshot
#[derive(Debug, Clone)]
pub struct DashboardReport {
    pub summary: BoardSummary,
    pub insight: Resolution<String>,
    pub mood: Resolution<MoodMessage>,
}

impl DashboardReport {
    pub fn has_failures(&self) -> bool {
        self.insight.is_failure() || self.mood.is_failure()
    }
}

/// The board insight and mood message, each cached against its own projection
pub struct Dashboard {
    insights: FingerprintCache<Task, String>,
    moods: FingerprintCache<Task, MoodMessage>,
    insight_generator: Arc<dyn Generator<Task, String>>,
    mood_generator: Arc<dyn Generator<Task, MoodMessage>>,
}

impl Dashboard {
    pub fn new(
        stores: DashboardStores,
        insight_generator: Arc<dyn Generator<Task, String>>,
        mood_generator: Arc<dyn Generator<Task, MoodMessage>>,
    ) -> Self {
        Self {
            insights: FingerprintCache::new(stores.insight, insight_projection),
            moods: FingerprintCache::new(stores.mood, |task: &Task| {
                mood_projection(task, Local::now().naive_local())
            }),
            insight_generator,
            mood_generator,
        }
    }

    /// Dashboard whose generators call `model`, each bounded by `timeout`
    pub fn with_model(
        stores: DashboardStores,
        model: Arc<dyn Model>,
        options: CompletionOptions,
        timeout: Duration,
    ) -> Self {
        let insight = InsightGenerator::new(Arc::clone(&model), options);
        let mood = MoodMessageGenerator::new(model, options);
        Self::new(
            stores,
            Arc::new(TimeoutGenerator::new(insight, timeout)),
            Arc::new(TimeoutGenerator::new(mood, timeout)),
        )
    }

    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.insights = self.insights.with_pending_policy(policy);
        self.moods = self.moods.with_pending_policy(policy);
        self
    }

    pub async fn insight(&self, tasks: &[Task]) -> Resolution<String> {
        self.insights
            .resolve(INSIGHT_CACHE_KEY, tasks, Arc::clone(&self.insight_generator))
            .await
    }

    pub async fn mood(&self, tasks: &[Task]) -> Resolution<MoodMessage> {
        self.moods
            .resolve(MOOD_CACHE_KEY, tasks, Arc::clone(&self.mood_generator))
            .await
    }

    /// Resolve both artifacts concurrently
    pub async fn refresh(&self, tasks: &[Task]) -> DashboardReport {
        let (insight, mood) = tokio::join!(self.insight(tasks), self.mood(tasks));
        info!(
            "Dashboard refreshed: insight {}, mood {}",
            insight.status(),
            mood.status()
        );

        DashboardReport {
            summary: BoardSummary::of(tasks, Local::now().naive_local()),
            insight,
            mood,
        }
    }

    pub fn insight_fingerprint(&self, tasks: &[Task]) -> Result<Fingerprint, serde_json::Error> {
        self.insights.fingerprint(INSIGHT_CACHE_KEY, tasks)
    }

    pub fn mood_fingerprint(&self, tasks: &[Task]) -> Result<Fingerprint, serde_json::Error> {
        self.moods.fingerprint(MOOD_CACHE_KEY, tasks)
    }

    pub fn stored_insight(&self) -> Option<CacheEntry<String>> {
        self.insights.peek(INSIGHT_CACHE_KEY)
    }

    pub fn stored_mood(&self) -> Option<CacheEntry<MoodMessage>> {
        self.moods.peek(MOOD_CACHE_KEY)
    }

    pub fn clear_insight(&self) {
        self.insights.invalidate(INSIGHT_CACHE_KEY);
    }

    pub fn clear_mood(&self) {
        self.moods.invalidate(MOOD_CACHE_KEY);
    }

    pub fn insight_stats(&self) -> CacheStats {
        self.insights.stats()
    }

    pub fn mood_stats(&self) -> CacheStats {
        self.moods.stats()
    }
}
