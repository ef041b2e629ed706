use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use family_events::domain::{AgeGroup, Event, EventDraft, PriceType};
use family_events::pipeline::{CycleResult, Orchestrator};
use family_events::storage::{EventStore, InMemoryEventStore, StoreGateway};
use family_events::types::{EventSource, OutcomeKind, ScrapeOutcome};
use std::sync::Arc;
use tokio::sync::Notify;

fn event(source: &str, n: usize, image: Option<&str>) -> Event {
    let start = Utc.with_ymd_and_hms(2026, 11, 14, 17, 0, 0).unwrap() + Duration::days(n as i64);
    EventDraft {
        title: format!("{} Family Morning {}", source, n),
        description: "Crafts, songs and snacks".into(),
        date_start: start,
        date_end: start + Duration::hours(2),
        location_name: format!("{} Hall", source),
        address: "1 Main St, Denver, CO 80202".into(),
        city: "Denver".into(),
        latitude: 39.74,
        longitude: -104.99,
        age_group: AgeGroup::Kid,
        categories: vec!["family".into()],
        price_type: PriceType::Free,
        source_url: format!("https://example.org/{}/{}", source, n),
        image_url: image.map(str::to_string),
    }
    .into_event()
    .unwrap()
}

/// Yields two complete events every call.
struct FixedSource(&'static str);

#[async_trait]
impl EventSource for FixedSource {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn scrape(&self) -> ScrapeOutcome {
        let image = Some("https://example.org/img.jpg");
        ScrapeOutcome::Ok(vec![event(self.0, 1, image), event(self.0, 2, image)])
    }
}

struct PanickingSource;

#[async_trait]
impl EventSource for PanickingSource {
    fn name(&self) -> &'static str {
        "panicky"
    }

    async fn scrape(&self) -> ScrapeOutcome {
        panic!("markup changed under us");
    }
}

struct EmptySource;

#[async_trait]
impl EventSource for EmptySource {
    fn name(&self) -> &'static str {
        "empty"
    }

    async fn scrape(&self) -> ScrapeOutcome {
        ScrapeOutcome::Empty { reason: "nothing listed".into() }
    }
}

/// Blocks until released so a second run can be attempted meanwhile.
struct GatedSource {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl EventSource for GatedSource {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn scrape(&self) -> ScrapeOutcome {
        self.entered.notify_one();
        self.release.notified().await;
        ScrapeOutcome::Ok(vec![event("gated", 1, Some("https://example.org/g.jpg"))])
    }
}

fn orchestrator(sources: Vec<Arc<dyn EventSource>>) -> (Arc<Orchestrator>, Arc<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new());
    let gateway = Arc::new(StoreGateway::new(store.clone()));
    (Arc::new(Orchestrator::new(sources, gateway)), store)
}

fn three_sources() -> Vec<Arc<dyn EventSource>> {
    vec![
        Arc::new(FixedSource("alpha")),
        Arc::new(FixedSource("beta")),
        Arc::new(FixedSource("gamma")),
    ]
}

#[tokio::test]
async fn cold_start_saves_everything() {
    let (orchestrator, store) = orchestrator(three_sources());

    let result = orchestrator.run_manual().await;
    assert!(result.success);
    assert_eq!(store.count().await.unwrap(), 6);

    let stats = orchestrator.stats_snapshot();
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.total_events_scraped, 6);
    assert_eq!(stats.events_by_source.get("alpha"), Some(&2));
    assert_eq!(stats.last_cycle.as_ref().map(|c| c.saved), Some(6));
}

#[tokio::test]
async fn rerun_skips_duplicates_but_still_succeeds() {
    let (orchestrator, store) = orchestrator(three_sources());
    orchestrator.run_manual().await;

    let result = orchestrator.run_manual().await;
    assert!(result.success);
    assert_eq!(store.count().await.unwrap(), 6);

    let last = orchestrator.stats_snapshot().last_cycle.unwrap();
    assert_eq!(last.saved, 0);
    assert_eq!(last.skipped, 6);
}

#[tokio::test]
async fn panicking_adapter_is_isolated() {
    let sources: Vec<Arc<dyn EventSource>> =
        vec![Arc::new(FixedSource("alpha")), Arc::new(PanickingSource), Arc::new(FixedSource("gamma"))];
    let (orchestrator, store) = orchestrator(sources);

    let result = orchestrator.run_manual().await;
    assert!(result.success);
    assert_eq!(store.count().await.unwrap(), 4);
    let stats = orchestrator.stats_snapshot();
    assert_eq!(stats.failed_sources, vec!["panicky".to_string()]);
    assert_eq!(stats.last_source_outcomes.get("alpha"), Some(&OutcomeKind::Ok));
    assert!(!stats.last_source_outcomes.contains_key("panicky"));
}

#[tokio::test]
async fn zero_yield_is_a_failed_run() {
    let (orchestrator, store) = orchestrator(vec![Arc::new(EmptySource)]);

    let result = orchestrator.run_manual().await;
    assert!(!result.success);
    assert_eq!(store.count().await.unwrap(), 0);

    let stats = orchestrator.stats_snapshot();
    assert_eq!(stats.failed_runs, 1);
    assert_eq!(stats.last_error.as_deref(), Some("No events found from any source"));
    assert_eq!(stats.last_source_outcomes.get("empty"), Some(&OutcomeKind::Empty));
}

#[tokio::test]
async fn events_without_images_never_reach_the_store() {
    struct NoImages;

    #[async_trait]
    impl EventSource for NoImages {
        fn name(&self) -> &'static str {
            "no_images"
        }

        async fn scrape(&self) -> ScrapeOutcome {
            ScrapeOutcome::Ok(vec![event("no_images", 1, None), event("no_images", 2, Some("https://x/y.png"))])
        }
    }

    let (orchestrator, store) = orchestrator(vec![Arc::new(NoImages)]);
    assert!(orchestrator.run_manual().await.success);
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(orchestrator.stats_snapshot().events_without_images, 1);
}

#[tokio::test]
async fn overlapping_run_is_rejected() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let gated = GatedSource { entered: entered.clone(), release: release.clone() };
    let (orchestrator, _store) = orchestrator(vec![Arc::new(gated)]);

    let first = {
        let o = Arc::clone(&orchestrator);
        tokio::spawn(async move { o.run_cycle().await })
    };
    entered.notified().await;
    assert!(orchestrator.is_running());

    let second = orchestrator.run_manual().await;
    assert!(!second.success);
    assert_eq!(second.message, "Scraping already in progress");

    release.notify_one();
    match first.await.unwrap() {
        CycleResult::Completed(report) => assert!(report.success),
        CycleResult::AlreadyRunning => panic!("first run should have held the guard"),
    }
    assert_eq!(orchestrator.stats_snapshot().total_runs, 1);
}

/// Never finishes within any reasonable budget.
struct HungSource;

#[async_trait]
impl EventSource for HungSource {
    fn name(&self) -> &'static str {
        "hung"
    }

    async fn scrape(&self) -> ScrapeOutcome {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        ScrapeOutcome::Empty { reason: "woke up".into() }
    }
}

#[tokio::test]
async fn hung_adapter_is_cut_off_at_its_budget() {
    let store = Arc::new(InMemoryEventStore::new());
    let gateway = Arc::new(StoreGateway::new(store.clone()));
    let sources: Vec<Arc<dyn EventSource>> =
        vec![Arc::new(FixedSource("alpha")), Arc::new(HungSource), Arc::new(FixedSource("gamma"))];
    let orchestrator =
        Orchestrator::new(sources, gateway).with_adapter_timeout(std::time::Duration::from_millis(200));

    let started = std::time::Instant::now();
    let result = orchestrator.run_manual().await;
    assert!(started.elapsed() < std::time::Duration::from_secs(5));

    assert!(result.success);
    assert_eq!(store.count().await.unwrap(), 4);
    assert_eq!(orchestrator.stats_snapshot().failed_sources, vec!["hung".to_string()]);
}
