//! Batch pipeline integration tests
//!
//! Full runs over a seeded in-memory store, exercising the phase chain
//! end to end.

mod helpers;

use helpers::{count_rows, create_test_pool, group_of, seed_lookup, seed_record, test_config, SeedRecord};
use resolver_engine::performers::PerformerStore;
use resolver_engine::pipeline::{BatchMode, BatchOrchestrator, BatchRequest};

fn full_run() -> BatchRequest {
    BatchRequest {
        mode: BatchMode::Full,
        limit: None,
        target_sources: None,
        dry_run: false,
        skip_merge: false,
    }
}

/// Three same-code records across sources, a crawl lookup row for the
/// code, a kanji/katakana performer pair and a placeholder performer.
async fn seed_scenario(pool: &sqlx::SqlitePool) -> ScenarioIds {
    let (r1, p1) = seed_record(
        pool,
        SeedRecord {
            normalized_id: "dmm-ssis865",
            maker_code: Some("ssis00865"),
            title: "Title main",
            release_date: Some("2020-05-01"),
            source: "dmm",
            ..Default::default()
        },
    )
    .await;
    let (r2, p2) = seed_record(
        pool,
        SeedRecord {
            normalized_id: "mgs-ssis865",
            maker_code: Some("ssis00865"),
            title: "Title mirror",
            release_date: Some("2020-06-15"),
            source: "mgstage",
            ..Default::default()
        },
    )
    .await;
    let (r3, p3) = seed_record(
        pool,
        SeedRecord {
            normalized_id: "duga-ssis865",
            maker_code: Some("ssis00865"),
            title: "Title third",
            source: "duga",
            ..Default::default()
        },
    )
    .await;

    seed_lookup(pool, "SSIS-865", "crawl", "Yua Mikami").await;

    let store = PerformerStore::new(pool.clone());

    // Placeholder performer pinned to the coded product p3
    let fake = store.upsert("素人, 24歳").await.unwrap();
    store.link(p3, fake).await.unwrap();

    // Script-variant pair on unrelated products
    let (_, q1) = seed_record(
        pool,
        SeedRecord {
            normalized_id: "dmm-q1",
            title: "Unrelated first feature",
            source: "dmm",
            ..Default::default()
        },
    )
    .await;
    let (_, q2) = seed_record(
        pool,
        SeedRecord {
            normalized_id: "dmm-q2",
            title: "Another standalone production",
            source: "dmm",
            ..Default::default()
        },
    )
    .await;

    let hanako = store.upsert("山田花子").await.unwrap();
    let hanako_kana = store.upsert("ヤマダ ハナコ").await.unwrap();
    store.link(q1, hanako).await.unwrap();
    store.link(q2, hanako).await.unwrap();
    store.link(q2, hanako_kana).await.unwrap();

    ScenarioIds {
        r1,
        r2,
        r3,
        p1,
        p2,
        fake,
        hanako,
        hanako_kana,
    }
}

struct ScenarioIds {
    r1: i64,
    r2: i64,
    r3: i64,
    p1: i64,
    p2: i64,
    fake: i64,
    hanako: i64,
    hanako_kana: i64,
}

#[tokio::test]
async fn full_run_resolves_links_and_dedups() {
    let pool = create_test_pool().await;
    let ids = seed_scenario(&pool).await;

    let orchestrator = BatchOrchestrator::new(pool.clone(), test_config());
    let report = orchestrator.run(full_run()).await;

    assert!(report.success, "run failed: {:?}", report.error);
    assert!(report.resume_from.is_none());
    assert_eq!(report.phases.len(), 8);

    // Same-code records converge to one group
    let group = group_of(&pool, ids.r1).await;
    assert!(group.is_some());
    assert_eq!(group_of(&pool, ids.r2).await, group);
    assert_eq!(group_of(&pool, ids.r3).await, group);

    let store = PerformerStore::new(pool.clone());

    // Lookup names were linked to the unlinked coded products
    let yua = store.find_by_name("Yua Mikami").await.unwrap().expect("performer from lookup");
    let products = store.linked_products(yua.id).await.unwrap();
    assert!(products.contains(&ids.p1));
    assert!(products.contains(&ids.p2));

    // The placeholder merged into the real identity found via shared code
    assert!(store.fetch(ids.fake).await.unwrap().is_none());
    assert!(store
        .aliases(yua.id)
        .await
        .unwrap()
        .contains(&"素人, 24歳".to_string()));

    // Script variants merged; the survivor keeps the other as an alias
    assert!(store.fetch(ids.hanako_kana).await.unwrap().is_none());
    let hanako = store.fetch(ids.hanako).await.unwrap().expect("dedup winner");
    assert!(store
        .aliases(hanako.id)
        .await
        .unwrap()
        .contains(&"ヤマダ ハナコ".to_string()));

    // Debut backfill and statistics resync
    let yua = store.fetch(yua.id).await.unwrap().unwrap();
    assert_eq!(yua.debut_year, Some(2020));
    assert_eq!(yua.release_count, 3);
    assert_eq!(hanako.release_count, 2);
}

#[tokio::test]
async fn rerunning_is_idempotent() {
    let pool = create_test_pool().await;
    seed_scenario(&pool).await;

    let orchestrator = BatchOrchestrator::new(pool.clone(), test_config());
    let first = orchestrator.run(full_run()).await;
    assert!(first.success);

    let groups = count_rows(&pool, "identity_groups").await;
    let members = count_rows(&pool, "identity_group_members").await;
    let performers = count_rows(&pool, "performers").await;
    let links = count_rows(&pool, "product_performers").await;

    let second = orchestrator.run(full_run()).await;
    assert!(second.success);

    assert_eq!(count_rows(&pool, "identity_groups").await, groups);
    assert_eq!(count_rows(&pool, "identity_group_members").await, members);
    assert_eq!(count_rows(&pool, "performers").await, performers);
    assert_eq!(count_rows(&pool, "product_performers").await, links);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let pool = create_test_pool().await;
    seed_scenario(&pool).await;

    let before_groups = count_rows(&pool, "identity_groups").await;
    let before_members = count_rows(&pool, "identity_group_members").await;
    let before_performers = count_rows(&pool, "performers").await;
    let before_links = count_rows(&pool, "product_performers").await;
    let before_aliases = count_rows(&pool, "performer_aliases").await;

    let orchestrator = BatchOrchestrator::new(pool.clone(), test_config());
    let report = orchestrator
        .run(BatchRequest {
            dry_run: true,
            ..full_run()
        })
        .await;

    assert!(report.success);
    // The dry run still reports the work it would have done
    assert!(report.totals().processed > 0);

    assert_eq!(count_rows(&pool, "identity_groups").await, before_groups);
    assert_eq!(count_rows(&pool, "identity_group_members").await, before_members);
    assert_eq!(count_rows(&pool, "performers").await, before_performers);
    assert_eq!(count_rows(&pool, "product_performers").await, before_links);
    assert_eq!(count_rows(&pool, "performer_aliases").await, before_aliases);
}

#[tokio::test]
async fn skip_merge_keeps_performers_apart() {
    let pool = create_test_pool().await;
    let ids = seed_scenario(&pool).await;

    let orchestrator = BatchOrchestrator::new(pool.clone(), test_config());
    let report = orchestrator
        .run(BatchRequest {
            skip_merge: true,
            ..full_run()
        })
        .await;
    assert!(report.success);

    let store = PerformerStore::new(pool.clone());
    // Grouping and linking still happened
    assert!(group_of(&pool, ids.r1).await.is_some());
    assert!(store.find_by_name("Yua Mikami").await.unwrap().is_some());
    // But no performer was consumed by a merge
    assert!(store.fetch(ids.hanako).await.unwrap().is_some());
    assert!(store.fetch(ids.hanako_kana).await.unwrap().is_some());
    assert!(store.fetch(ids.fake).await.unwrap().is_some());
}

#[tokio::test]
async fn target_sources_scope_the_resolution_sweep() {
    let pool = create_test_pool().await;
    let ids = seed_scenario(&pool).await;

    let orchestrator = BatchOrchestrator::new(pool.clone(), test_config());
    let report = orchestrator
        .run(BatchRequest {
            target_sources: Some(vec!["dmm".to_string()]),
            ..full_run()
        })
        .await;
    assert!(report.success);

    // The dmm record was swept; the match pulled its counterpart into
    // the same group, but the remaining record was never visited
    assert!(group_of(&pool, ids.r1).await.is_some());
    assert_eq!(group_of(&pool, ids.r1).await, group_of(&pool, ids.r2).await);
    assert_eq!(group_of(&pool, ids.r3).await, None);
}
