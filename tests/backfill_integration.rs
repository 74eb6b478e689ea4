use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;

use inventory_backfill::backfill::{
    run_backfill, BackfillError, BackfillOptions, PublishOutcome,
};
use inventory_backfill::contract::{
    InventoryArtifact, LedgerError, MockMaterialiser, MockPublisher, MockRegistry,
};
use inventory_backfill::ledger::published_releases;
use inventory_backfill::resolve::ResolvedCommit;

fn artifact_for(date: NaiveDate) -> InventoryArtifact {
    let stamp = date.format("%Y%m%d").to_string();
    // unique per day: abc1001, abc1002, ...
    let short = format!("abc{}", &stamp[4..]);
    InventoryArtifact {
        version: format!("1.0.0-{stamp}-{short}"),
        short_commit: short.clone(),
        commit: ResolvedCommit {
            full_hash: format!("{short}0000000000000000000000000000000000"),
            short_hash: short,
            author_instant: Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap()),
        },
        inventory: json!([{ "path": "/docs/a", "title": "A" }]),
        redirects_source: "/old\t/new\n".to_string(),
    }
}

fn options(dry_run: bool, continue_on_duplicate: bool) -> BackfillOptions {
    BackfillOptions {
        package_name: "content-inventory".to_string(),
        start_date: NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
        dry_run,
        continue_on_duplicate,
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 10, 3, 0, 0, 0).unwrap()
}

fn published_with_oct_2() -> BTreeMap<String, String> {
    let mut set = BTreeMap::new();
    set.insert(
        "0.1.0-20231002-deadbee".to_string(),
        "2023-10-02T06:00:00.000Z".to_string(),
    );
    set
}

#[tokio::test]
async fn three_day_dry_run_publishes_every_day() {
    let mut materialiser = MockMaterialiser::new();
    materialiser
        .expect_materialise()
        .times(3)
        .returning(|date| Ok(artifact_for(date)));
    materialiser.expect_tear_down().times(3).returning(|| Ok(()));

    // The ledger is re-fetched once per day, not cached across iterations.
    let mut registry = MockRegistry::new();
    registry
        .expect_release_times()
        .times(3)
        .returning(|_| Ok(BTreeMap::new()));

    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .times(3)
        .withf(|artifact, dry_run| {
            *dry_run && artifact.redirects().get("/old").map(String::as_str) == Some("/new")
        })
        .returning(|_, _| Ok(()));

    let report = run_backfill(&options(true, false), &materialiser, &registry, &publisher, fixed_now())
        .await
        .expect("dry run should complete all three days");

    assert_eq!(report.days.len(), 3);
    let dates: Vec<_> = report.days.iter().map(|day| day.date.to_string()).collect();
    assert_eq!(dates, vec!["2023-10-01", "2023-10-02", "2023-10-03"]);
    for day in &report.days {
        assert_eq!(day.outcome, PublishOutcome::Published { dry_run: true });
    }
}

#[tokio::test]
async fn duplicate_aborts_the_run_by_default() {
    let mut materialiser = MockMaterialiser::new();
    materialiser
        .expect_materialise()
        .times(2)
        .returning(|date| Ok(artifact_for(date)));
    // day one's teardown plus the best-effort teardown on the abort path
    materialiser.expect_tear_down().times(2).returning(|| Ok(()));

    let mut registry = MockRegistry::new();
    registry
        .expect_release_times()
        .times(2)
        .returning(|_| Ok(published_with_oct_2()));

    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .times(1)
        .withf(|artifact, _| artifact.version.contains("20231001"))
        .returning(|_, _| Ok(()));

    let err = run_backfill(&options(true, false), &materialiser, &registry, &publisher, fixed_now())
        .await
        .expect_err("the Oct 2 duplicate should abort the run");

    match err {
        BackfillError::DuplicateDetected { date, existing, .. } => {
            assert_eq!(date, NaiveDate::from_ymd_opt(2023, 10, 2).unwrap());
            assert_eq!(existing, "0.1.0-20231002-deadbee");
        }
        other => panic!("expected DuplicateDetected, got {other:?}"),
    }
}

#[tokio::test]
async fn continue_mode_skips_the_duplicate_and_completes() {
    let mut materialiser = MockMaterialiser::new();
    materialiser
        .expect_materialise()
        .times(3)
        .returning(|date| Ok(artifact_for(date)));
    materialiser.expect_tear_down().times(3).returning(|| Ok(()));

    let mut registry = MockRegistry::new();
    registry
        .expect_release_times()
        .times(3)
        .returning(|_| Ok(published_with_oct_2()));

    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .times(2)
        .returning(|_, _| Ok(()));

    let report = run_backfill(&options(true, true), &materialiser, &registry, &publisher, fixed_now())
        .await
        .expect("continue mode should complete all three days");

    assert_eq!(report.days.len(), 3);
    assert_eq!(
        report.days[0].outcome,
        PublishOutcome::Published { dry_run: true }
    );
    assert_eq!(
        report.days[1].outcome,
        PublishOutcome::SkippedDuplicate {
            existing: "0.1.0-20231002-deadbee".to_string()
        }
    );
    assert_eq!(
        report.days[2].outcome,
        PublishOutcome::Published { dry_run: true }
    );
}

#[tokio::test]
async fn dry_run_and_real_run_make_identical_decisions() {
    let mut reports = Vec::new();
    for dry_run in [true, false] {
        let mut materialiser = MockMaterialiser::new();
        materialiser
            .expect_materialise()
            .times(3)
            .returning(|date| Ok(artifact_for(date)));
        materialiser.expect_tear_down().times(3).returning(|| Ok(()));

        let mut registry = MockRegistry::new();
        registry
            .expect_release_times()
            .times(3)
            .returning(|_| Ok(BTreeMap::new()));

        let mut publisher = MockPublisher::new();
        let expected_flag = dry_run;
        publisher
            .expect_publish()
            .times(3)
            .withf(move |_, dry| *dry == expected_flag)
            .returning(|_, _| Ok(()));

        let report = run_backfill(
            &options(dry_run, false),
            &materialiser,
            &registry,
            &publisher,
            fixed_now(),
        )
        .await
        .expect("both modes should complete");
        reports.push(report);
    }

    // Same days, same identities; only the registry-write flag differs.
    let (dry, real) = (&reports[0], &reports[1]);
    assert_eq!(dry.days.len(), real.days.len());
    for (a, b) in dry.days.iter().zip(&real.days) {
        assert_eq!(a.date, b.date);
        assert_eq!(a.version, b.version);
        assert_eq!(a.short_commit, b.short_commit);
        assert_eq!(a.outcome, PublishOutcome::Published { dry_run: true });
        assert_eq!(b.outcome, PublishOutcome::Published { dry_run: false });
    }
}

#[tokio::test]
async fn ledger_failure_degrades_to_an_empty_set() {
    let mut registry = MockRegistry::new();
    registry.expect_release_times().returning(|_| {
        Err(LedgerError::CommandFailed {
            status: "exit status: 1".to_string(),
            stderr: "npm ERR! 404 Not Found".to_string(),
        })
    });

    let set = published_releases(&registry, "content-inventory").await;
    assert!(set.is_empty());
}

#[tokio::test]
async fn first_time_package_publishes_despite_ledger_failure() {
    let start = NaiveDate::from_ymd_opt(2023, 10, 1).unwrap();
    let now = Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap();

    let mut materialiser = MockMaterialiser::new();
    materialiser
        .expect_materialise()
        .times(1)
        .returning(|date| Ok(artifact_for(date)));
    materialiser.expect_tear_down().times(1).returning(|| Ok(()));

    let mut registry = MockRegistry::new();
    registry.expect_release_times().times(1).returning(|_| {
        Err(LedgerError::CommandFailed {
            status: "exit status: 1".to_string(),
            stderr: "npm ERR! 404 Not Found".to_string(),
        })
    });

    let mut publisher = MockPublisher::new();
    publisher.expect_publish().times(1).returning(|_, _| Ok(()));

    let opts = BackfillOptions {
        package_name: "content-inventory".to_string(),
        start_date: start,
        dry_run: true,
        continue_on_duplicate: false,
    };
    let report = run_backfill(&opts, &materialiser, &registry, &publisher, now)
        .await
        .expect("a missing ledger must not block the first publish");
    assert_eq!(report.days.len(), 1);
}

#[tokio::test]
async fn materialisation_failure_is_fatal() {
    use inventory_backfill::contract::MaterialiseError;

    let mut materialiser = MockMaterialiser::new();
    materialiser.expect_materialise().times(1).returning(|_| {
        Err(MaterialiseError::DependencyInstall {
            stderr: "npm ERR! network".to_string(),
        })
    });
    // Build failures abort before dedupe, publish or teardown.
    materialiser.expect_tear_down().times(0);

    let registry = MockRegistry::new();
    let publisher = MockPublisher::new();

    let err = run_backfill(&options(true, false), &materialiser, &registry, &publisher, fixed_now())
        .await
        .expect_err("a failed build should abort the run");
    assert!(matches!(err, BackfillError::Materialise(_)));
}
