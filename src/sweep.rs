use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};

use crate::db::RepositoryProvider;
use crate::notifier::{Notifier, new_chapter_message};
use crate::sources::SourceRegistry;
use crate::subscriptions::Subscription;

pub struct SweepState {
    pub repositories: RepositoryProvider,
    pub sources: Arc<SourceRegistry>,
    pub notifier: Arc<dyn Notifier>,
    /// Subscriptions checked at the same time within one sweep.
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Unchanged,
    Updated,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checked: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl SweepReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            checked: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            errors: Vec::new(),
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        self.checked += 1;
        match outcome {
            ItemOutcome::Unchanged => self.unchanged += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed(reason) => self.errors.push(reason),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    fn log(&self) {
        let elapsed_ms = self.duration().num_milliseconds();
        if self.errors.is_empty() {
            log::info!(
                "Sweep finished at {}: {} checked, {} updated, {} unchanged, {} skipped in {}ms",
                self.finished_at, self.checked, self.updated, self.unchanged, self.skipped, elapsed_ms
            );
        } else {
            log::warn!(
                "Sweep finished at {} with {} errors: {} checked, {} updated, {} unchanged, {} skipped in {}ms",
                self.finished_at, self.errors.len(), self.checked, self.updated, self.unchanged, self.skipped, elapsed_ms
            );
            for error in &self.errors {
                log::warn!("Sweep error: {error}");
            }
        }
    }
}

pub async fn spawn(state: Arc<SweepState>, interval_secs: u64) {
    tokio::spawn(async move {
        run(state, Duration::from_secs(interval_secs)).await;
    });
}

async fn run(state: Arc<SweepState>, period: Duration) {
    log::info!("Starting manga update sweep every {}s", period.as_secs());

    // Ticks wait for the previous sweep, so sweeps never overlap.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep(&state).await;
    }
}

/// Checks every subscription once and waits for all of them.
pub async fn sweep(state: &SweepState) -> SweepReport {
    let mut report = SweepReport::new(Utc::now());
    log::info!("Sweep started at {}", report.started_at);

    match state.repositories.subscriptions().find_all().await {
        Ok(subscriptions) => {
            let outcomes: Vec<ItemOutcome> = stream::iter(subscriptions)
                .map(|subscription| check_subscription(state, subscription))
                .buffer_unordered(state.concurrency.max(1))
                .collect()
                .await;

            for outcome in outcomes {
                report.record(outcome);
            }
        }
        Err(e) => {
            report.errors.push(format!("failed to list subscriptions: {e}"));
        }
    }

    report.finished_at = Utc::now();
    report.log();
    report
}

async fn check_subscription(state: &SweepState, mut subscription: Subscription) -> ItemOutcome {
    let Some(source) = state.sources.get(subscription.manga_feed) else {
        log::debug!("No source for feed {} of subscription {}", subscription.manga_feed, subscription.id);
        return ItemOutcome::Skipped;
    };

    let latest = match source.latest_chapter(&subscription.manga_url).await {
        Ok(url) => url,
        Err(e) => {
            return ItemOutcome::Failed(format!("{} ({}): {e}", subscription.manga_name, subscription.manga_url));
        }
    };

    // Some pages resolve to the bare view template when they list no chapter.
    if latest.is_empty() || latest == source.view_url_template() {
        log::debug!("No chapter found for {}", subscription.manga_url);
        return ItemOutcome::Skipped;
    }

    if latest == subscription.last_chapter_url {
        return ItemOutcome::Unchanged;
    }

    subscription.last_chapter_url = latest;
    subscription.updated_at = Utc::now();

    log::debug!("Sending notification for {} to {}", subscription.manga_name, subscription.chat_id);
    if let Err(e) = state
        .notifier
        .notify(subscription.chat_id, new_chapter_message(&subscription))
        .await
    {
        log::warn!("Failed to notify chat {} about {}: {e}", subscription.chat_id, subscription.manga_name);
    }

    match state.repositories.subscriptions().update(&subscription).await {
        Ok(()) => ItemOutcome::Updated,
        Err(e) => ItemOutcome::Failed(format!("failed to update subscription {}: {e}", subscription.id)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::setup_test_pool;
    use crate::sources::test_support::StaticSource;
    use crate::sources::{Feed, MangaSource};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, chat_id: i64, text: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.sent.lock().unwrap().push((chat_id, text));
            Ok(())
        }
    }

    struct Fixture {
        state: SweepState,
        notifier: Arc<RecordingNotifier>,
    }

    async fn fixture(sources: Vec<Arc<dyn MangaSource>>) -> Fixture {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = SweepState {
            repositories: RepositoryProvider::new(setup_test_pool().await),
            sources: Arc::new(SourceRegistry::from_sources(sources)),
            notifier: notifier.clone(),
            concurrency: 4,
        };
        Fixture { state, notifier }
    }

    async fn store(fixture: &Fixture, chat_id: i64, feed: Feed, manga_url: &str, last_chapter_url: &str) -> Subscription {
        let now = Utc::now();
        let subscription = Subscription {
            id: Uuid::now_v7(),
            chat_id,
            user_id: 1,
            user_name: "Gus".to_string(),
            manga_name: "One Piece".to_string(),
            manga_url: manga_url.to_string(),
            last_chapter_url: last_chapter_url.to_string(),
            manga_feed: feed.code(),
            created_at: now,
            updated_at: now,
        };
        fixture.state.repositories.subscriptions().insert(&subscription).await.unwrap();
        subscription
    }

    async fn reload(fixture: &Fixture, subscription: &Subscription) -> Subscription {
        fixture.state.repositories.subscriptions().find_by_id(&subscription.id).await.unwrap()
    }

    #[tokio::test]
    async fn same_chapter_sends_nothing_and_writes_nothing() {
        let fx = fixture(vec![Arc::new(StaticSource::new(Feed::Manganelo, "https://x/op/1000"))]).await;
        let stored = store(&fx, 10, Feed::Manganelo, "https://x/op", "https://x/op/1000").await;

        let report = sweep(&fx.state).await;

        assert_eq!(report.unchanged, 1);
        assert!(fx.notifier.sent.lock().unwrap().is_empty());
        assert_eq!(reload(&fx, &stored).await, stored);
    }

    #[tokio::test]
    async fn new_chapter_notifies_once_and_persists() {
        let fx = fixture(vec![Arc::new(StaticSource::new(Feed::Manganelo, "https://x/op/1001"))]).await;
        let stored = store(&fx, 10, Feed::Manganelo, "https://x/op", "https://x/op/1000").await;

        let report = sweep(&fx.state).await;

        assert_eq!(report.updated, 1);
        let sent = fx.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 10);
        assert!(sent[0].1.contains("One Piece"));
        assert!(sent[0].1.contains("https://x/op/1001"));
        assert_eq!(reload(&fx, &stored).await.last_chapter_url, "https://x/op/1001");
    }

    #[tokio::test]
    async fn second_sweep_after_update_is_quiet() {
        let source = Arc::new(StaticSource::new(Feed::Manganelo, "https://x/op/1001"));
        let shared: Arc<dyn MangaSource> = source.clone();
        let fx = fixture(vec![shared]).await;
        store(&fx, 10, Feed::Manganelo, "https://x/op", "").await;

        sweep(&fx.state).await;
        sweep(&fx.state).await;
        assert_eq!(fx.notifier.sent.lock().unwrap().len(), 1);

        source.set_chapter("https://x/op/1002");
        sweep(&fx.state).await;
        assert_eq!(fx.notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_or_template_results_are_skipped() {
        let fx = fixture(vec![
            Arc::new(StaticSource::new(Feed::Manganelo, "")),
            Arc::new(StaticSource::new(Feed::Kissmanga, "https://static.example{}")),
        ])
        .await;
        let a = store(&fx, 1, Feed::Manganelo, "https://x/a", "https://x/a/1").await;
        let b = store(&fx, 2, Feed::Kissmanga, "https://x/b", "https://x/b/1").await;

        let report = sweep(&fx.state).await;

        assert_eq!(report.skipped, 2);
        assert!(fx.notifier.sent.lock().unwrap().is_empty());
        assert_eq!(reload(&fx, &a).await, a);
        assert_eq!(reload(&fx, &b).await, b);
    }

    #[tokio::test]
    async fn failures_do_not_stop_other_subscriptions() {
        let fx = fixture(vec![
            Arc::new(StaticSource::failing(Feed::MangaEden)),
            Arc::new(StaticSource::new(Feed::Manganelo, "https://x/ok/2")),
        ])
        .await;
        store(&fx, 1, Feed::MangaEden, "https://x/broken", "https://x/broken/1").await;
        store(&fx, 2, Feed::Manganelo, "https://x/ok", "https://x/ok/1").await;
        store(&fx, 3, Feed::Mangadex, "https://x/unregistered", "").await;

        let report = sweep(&fx.state).await;

        assert_eq!(report.checked, 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        let sent = fx.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 2);
    }

    #[tokio::test]
    async fn empty_store_produces_empty_report() {
        let fx = fixture(vec![]).await;
        let report = sweep(&fx.state).await;
        assert_eq!(report.checked, 0);
        assert!(report.errors.is_empty());
        assert!(report.duration() >= chrono::Duration::zero());
    }
}
