//! End-to-end checks through the workflow engine with mock ports.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use sitesentry::config::MonitorConfig;
use sitesentry::error::MonitorError;
use sitesentry::scheduler::ManualClock;
use sitesentry::stores::MemoryStore;
use sitesentry::testing::{CapturingNotifier, MockEmbedder, MockFetcher, MockLlm};
use sitesentry::traits::SnapshotStore;
use sitesentry::types::{AlertKind, AlertSeverity, Schedule, Site, Verdict};
use sitesentry::workflow::{CheckContext, CheckRunner, WorkflowEngine};

const SITE_URL: &str = "https://shop.example";

struct Harness {
    engine: WorkflowEngine,
    fetcher: Arc<MockFetcher>,
    store: Arc<MemoryStore>,
    notifier: CapturingNotifier,
    clock: Arc<ManualClock>,
    llm: Arc<MockLlm>,
    site: Site,
}

fn page(body: &str) -> String {
    format!(
        "<html><head><title>Corner Shop</title>\
         <meta name=\"description\" content=\"Neighborhood hardware store\"></head>\
         <body>{body}</body></html>"
    )
}

const BASELINE_BODY: &str = "<h1>Corner Shop</h1>\
    <p>catalog anvils rockets hardware tooling supplies quality industrial shipping warranty</p>";

fn harness(llm: MockLlm) -> Harness {
    let mut config = MonitorConfig::default();
    config.classifier.llm_timeout_seconds = 1;
    config.vectorizer.dimension = 128;

    let fetcher = Arc::new(MockFetcher::new().with_page(SITE_URL, page(BASELINE_BODY)));
    let store = Arc::new(MemoryStore::new());
    let notifier = CapturingNotifier::new();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()));
    let llm = Arc::new(llm);

    let engine = WorkflowEngine::new(
        config,
        fetcher.clone(),
        Arc::new(MockEmbedder::new(128)),
        llm.clone(),
        store.clone(),
        Arc::new(notifier.clone()),
        clock.clone(),
    );

    let site = Site::new(SITE_URL, "Corner Shop", Schedule::parse("5m").unwrap());
    Harness { engine, fetcher, store, notifier, clock, llm, site }
}

impl Harness {
    async fn check(&self) -> sitesentry::Result<sitesentry::workflow::CheckReport> {
        self.clock.advance(chrono::Duration::seconds(60));
        self.engine.run_check(CheckContext::new(self.site.clone())).await
    }
}

#[tokio::test]
async fn first_check_establishes_the_baseline() {
    let h = harness(MockLlm::replying(Verdict::Benign, 0.9, "unused"));

    let report = h.check().await.unwrap();
    assert_eq!(report.verdict, Some(Verdict::Initial));
    assert!(report.change.is_none());
    assert!(!report.alerted);
    assert_eq!(h.store.snapshot_count(), 1);
    assert_eq!(h.llm.call_count(), 0);
}

#[tokio::test]
async fn unchanged_page_inherits_baseline_verdict_and_skips_classifier() {
    let h = harness(MockLlm::replying(Verdict::Defacement, 0.99, "must never be consulted"));

    let first = h.check().await.unwrap();
    let second = h.check().await.unwrap();

    // Same page, same fingerprints, same verdict lineage; the classifier is
    // never invoked and no alert is added.
    assert_eq!(second.verdict, Some(Verdict::Initial));
    assert_eq!(h.llm.call_count(), 0);
    assert!(h.notifier.alerts().is_empty());
    assert_eq!(h.store.snapshot_count(), 2);

    let snapshots = h.store.recent_snapshots(h.site.id, 10).await.unwrap();
    assert_eq!(snapshots[0].fingerprints, snapshots[1].fingerprints);
    assert!(snapshots[0].captured_at > snapshots[1].captured_at);

    let _ = first;
}

#[tokio::test]
async fn benign_rewording_is_minor_without_classification() {
    let h = harness(MockLlm::replying(Verdict::Defacement, 0.99, "must never be consulted"));
    h.check().await.unwrap();

    // One keyword of ten replaced; identical DOM structure.
    h.fetcher.set_page(
        SITE_URL,
        page(
            "<h1>Corner Shop</h1>\
             <p>catalog anvils rockets hardware tooling supplies quality industrial shipping discount</p>",
        ),
    );

    let report = h.check().await.unwrap();
    let change = report.change.expect("baseline present");
    assert!(change.keyword_similarity >= 0.85, "similarity {}", change.keyword_similarity);
    assert!((change.structural_similarity - 1.0).abs() < 1e-9);
    assert_eq!(report.verdict, Some(Verdict::Benign));
    assert_eq!(h.llm.call_count(), 0);
    assert!(h.notifier.alerts().is_empty());
}

#[tokio::test]
async fn clear_defacement_raises_a_high_severity_alert() {
    let h = harness(MockLlm::replying(Verdict::Defacement, 0.95, "defacement banner and taunts"));
    h.check().await.unwrap();

    h.fetcher.set_page(
        SITE_URL,
        page(
            "<h1>HACKED BY PHANTOM</h1>\
             <marquee>pwned greetz to the crew your security is a joke</marquee>",
        ),
    );

    let report = h.check().await.unwrap();
    assert_eq!(report.verdict, Some(Verdict::Defacement));
    assert!(report.confidence.unwrap() >= 0.8, "confidence {:?}", report.confidence);
    assert!(report.alerted);
    assert_eq!(h.llm.call_count(), 1);

    let alerts = h.notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Defacement);
    assert_eq!(alerts[0].severity, AlertSeverity::High);
    assert_eq!(alerts[0].verdict_label.as_deref(), Some("defacement"));

    // The defaced snapshot is not a baseline; the original page still is.
    let baseline = h.store.baseline_snapshot(h.site.id).await.unwrap().unwrap();
    assert_eq!(baseline.verdict, Some(Verdict::Initial));
}

#[tokio::test]
async fn ambiguous_change_with_llm_timeout_lands_unclear() {
    let h = harness(MockLlm::hanging());
    h.check().await.unwrap();

    // Half the vocabulary changes, structure stays; no suspicious tokens.
    h.fetcher.set_page(
        SITE_URL,
        page(
            "<h1>Corner Shop</h1>\
             <p>catalog anvils rockets hardware tooling garden patio furniture outdoor seasonal</p>",
        ),
    );

    let report = h.check().await.unwrap();
    let change = report.change.expect("baseline present");
    assert!(change.class.needs_classification(), "change class {:?}", change.class);
    assert_eq!(report.verdict, Some(Verdict::Unclear));

    let alerts = h.notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Suspicious);
    assert_eq!(alerts[0].severity, AlertSeverity::Low);
}

#[tokio::test]
async fn fetch_failures_surface_and_alert_site_down_once() {
    let h = harness(MockLlm::replying(Verdict::Benign, 0.9, "unused"));
    let failure_threshold = 5;

    for consecutive in 0..failure_threshold {
        h.clock.advance(chrono::Duration::seconds(60));
        let ctx = CheckContext::new(h.site.clone())
            .with_consecutive_failures(consecutive);
        // Unknown URL: the mock fetcher serves nothing for it.
        let mut site_down = h.site.clone();
        site_down.url = "https://unreachable.example".to_string();
        let ctx = CheckContext { site: site_down, ..ctx };

        let err = h.engine.run_check(ctx).await.unwrap_err();
        assert!(matches!(err, MonitorError::Fetch(_)));
    }

    // 404 is permanent, no site-down accounting; script transient timeouts
    // instead.
    assert!(h.notifier.alerts().is_empty());
    assert_eq!(h.store.snapshot_count(), 0);

    let transient = Arc::new(MockFetcher::new().with_script(
        "https://flaky.example",
        (0..failure_threshold)
            .map(|_| {
                Err(sitesentry::FetchError::Timeout { url: "https://flaky.example".to_string() })
            })
            .collect(),
    ));
    let store = Arc::new(MemoryStore::new());
    let notifier = CapturingNotifier::new();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()));
    let engine = WorkflowEngine::new(
        MonitorConfig::default(),
        transient,
        Arc::new(MockEmbedder::new(64)),
        Arc::new(MockLlm::replying(Verdict::Benign, 0.9, "unused")),
        store.clone(),
        Arc::new(notifier.clone()),
        clock.clone(),
    );

    let site = Site::new("https://flaky.example", "Flaky", Schedule::parse("5m").unwrap());
    for consecutive in 0..failure_threshold {
        clock.advance(chrono::Duration::seconds(60));
        let ctx = CheckContext::new(site.clone()).with_consecutive_failures(consecutive);
        let err = engine.run_check(ctx).await.unwrap_err();
        assert!(matches!(err, MonitorError::Fetch(ref f) if f.is_transient()));
    }

    // Exactly one site-down alert, at the threshold crossing; no snapshots.
    let alerts = notifier.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::SiteDown);
    assert_eq!(store.snapshot_count(), 0);
}

#[tokio::test]
async fn keep_scans_override_prunes_but_spares_the_baseline() {
    let mut h = harness(MockLlm::replying(Verdict::Benign, 0.9, "unused"));
    h.site = h.site.clone().with_keep_scans(3);

    for _ in 0..6 {
        h.check().await.unwrap();
    }

    assert_eq!(h.store.snapshot_count(), 3);
    assert!(h.store.baseline_snapshot(h.site.id).await.unwrap().is_some());
    // Vectors were pruned with their snapshots.
    let remaining = h.store.recent_snapshots(h.site.id, 10).await.unwrap();
    assert_eq!(remaining.len(), 3);
}

#[tokio::test]
async fn recovered_page_returns_to_benign_without_new_alerts() {
    let h = harness(MockLlm::replying(Verdict::Defacement, 0.95, "banner"));
    h.check().await.unwrap();

    h.fetcher.set_page(SITE_URL, page("<h1>HACKED BY PHANTOM</h1><p>pwned</p>"));
    let defaced = h.check().await.unwrap();
    assert_eq!(defaced.verdict, Some(Verdict::Defacement));
    assert_eq!(h.notifier.alerts().len(), 1);

    // Site restored: compared against the old baseline it is unchanged.
    h.fetcher.set_page(SITE_URL, page(BASELINE_BODY));
    let restored = h.check().await.unwrap();
    assert_eq!(restored.verdict, Some(Verdict::Initial));
    assert_eq!(h.notifier.alerts().len(), 1, "restoration must not alert");
}
