//! Group manager integration tests

mod helpers;

use helpers::{count_rows, create_test_pool, group_of, seed_record, test_config, SeedRecord};
use resolver_engine::db::fetch_record;
use resolver_engine::groups::GroupManager;
use resolver_engine::matching::{MatchMethod, MatchResult};

fn code_match(record_id: i64, group_id: Option<i64>) -> MatchResult {
    MatchResult {
        record_id,
        group_id,
        confidence: 95,
        method: MatchMethod::CodeNormalized,
        title_similarity: None,
        matched_performers: None,
    }
}

async fn seed_simple(pool: &sqlx::SqlitePool, source: &str, tag: &str) -> i64 {
    seed_record(
        pool,
        SeedRecord {
            normalized_id: &format!("{source}-{tag}"),
            title: &format!("Title {tag}"),
            source,
            ..Default::default()
        },
    )
    .await
    .0
}

#[tokio::test]
async fn chained_merges_collapse_to_one_group() {
    let pool = create_test_pool().await;
    let groups = GroupManager::new(pool.clone(), test_config());

    let a = seed_simple(&pool, "dmm", "a").await;
    let b = seed_simple(&pool, "duga", "b").await;
    let c = seed_simple(&pool, "sokmil", "c").await;

    let ra = fetch_record(&pool, a).await.unwrap().unwrap();
    let rb = fetch_record(&pool, b).await.unwrap().unwrap();
    let rc = fetch_record(&pool, c).await.unwrap().unwrap();

    let g1 = groups.create_group(&ra, MatchMethod::GroupSeed).await.unwrap();
    let g2 = groups.create_group(&rb, MatchMethod::GroupSeed).await.unwrap();
    let g3 = groups.create_group(&rc, MatchMethod::GroupSeed).await.unwrap();

    groups.merge_groups(g1, g2).await.unwrap();
    groups.merge_groups(g1, g3).await.unwrap();

    assert_eq!(group_of(&pool, a).await, Some(g1));
    assert_eq!(group_of(&pool, b).await, Some(g1));
    assert_eq!(group_of(&pool, c).await, Some(g1));
    assert_eq!(count_rows(&pool, "identity_groups").await, 1);
}

#[tokio::test]
async fn merge_into_self_is_a_no_op() {
    let pool = create_test_pool().await;
    let groups = GroupManager::new(pool.clone(), test_config());

    let a = seed_simple(&pool, "dmm", "a").await;
    let ra = fetch_record(&pool, a).await.unwrap().unwrap();
    let g1 = groups.create_group(&ra, MatchMethod::GroupSeed).await.unwrap();

    groups.merge_groups(g1, g1).await.unwrap();

    assert_eq!(count_rows(&pool, "identity_groups").await, 1);
    assert_eq!(count_rows(&pool, "identity_group_members").await, 1);
}

#[tokio::test]
async fn master_tracks_membership_changes() {
    let pool = create_test_pool().await;
    let groups = GroupManager::new(pool.clone(), test_config());

    // fc2 member first, then a dmm member with higher source priority
    let (a, _) = seed_record(
        &pool,
        SeedRecord {
            normalized_id: "fc2-a",
            title: "Title a",
            source: "fc2",
            ..Default::default()
        },
    )
    .await;
    let (b, _) = seed_record(
        &pool,
        SeedRecord {
            normalized_id: "dmm-b",
            title: "Title b",
            source: "dmm",
            ..Default::default()
        },
    )
    .await;

    let ra = fetch_record(&pool, a).await.unwrap().unwrap();
    let rb = fetch_record(&pool, b).await.unwrap().unwrap();

    let g1 = groups.create_group(&ra, MatchMethod::GroupSeed).await.unwrap();
    groups.add_to_group(g1, &rb, &code_match(a, Some(g1))).await.unwrap();

    let master: Option<i64> =
        sqlx::query_scalar("SELECT master_record_id FROM identity_groups WHERE id = ?")
            .bind(g1)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(master, Some(b));

    // Removing the master hands the role back to the remaining member
    assert!(groups.remove_from_group(b).await.unwrap());
    let master: Option<i64> =
        sqlx::query_scalar("SELECT master_record_id FROM identity_groups WHERE id = ?")
            .bind(g1)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(master, Some(a));
}

#[tokio::test]
async fn removing_last_member_deletes_the_group() {
    let pool = create_test_pool().await;
    let groups = GroupManager::new(pool.clone(), test_config());

    let a = seed_simple(&pool, "dmm", "a").await;
    let ra = fetch_record(&pool, a).await.unwrap().unwrap();
    groups.create_group(&ra, MatchMethod::GroupSeed).await.unwrap();

    assert!(groups.remove_from_group(a).await.unwrap());
    assert_eq!(count_rows(&pool, "identity_groups").await, 0);
    assert_eq!(count_rows(&pool, "identity_group_members").await, 0);

    // Removing an ungrouped record reports false
    assert!(!groups.remove_from_group(a).await.unwrap());
}

#[tokio::test]
async fn re_adding_a_member_is_idempotent() {
    let pool = create_test_pool().await;
    let groups = GroupManager::new(pool.clone(), test_config());

    let a = seed_simple(&pool, "dmm", "a").await;
    let b = seed_simple(&pool, "duga", "b").await;
    let ra = fetch_record(&pool, a).await.unwrap().unwrap();
    let rb = fetch_record(&pool, b).await.unwrap().unwrap();

    let g1 = groups.create_group(&ra, MatchMethod::GroupSeed).await.unwrap();
    groups.add_to_group(g1, &rb, &code_match(a, Some(g1))).await.unwrap();
    groups.add_to_group(g1, &rb, &code_match(a, Some(g1))).await.unwrap();

    assert_eq!(count_rows(&pool, "identity_group_members").await, 2);
}

#[tokio::test]
async fn merge_adopts_canonical_code_when_target_has_none() {
    let pool = create_test_pool().await;
    let groups = GroupManager::new(pool.clone(), test_config());

    // Target seeded from a codeless record, source from a coded one
    let a = seed_simple(&pool, "dmm", "a").await;
    let (b, _) = seed_record(
        &pool,
        SeedRecord {
            normalized_id: "duga-b",
            maker_code: Some("ssis00865"),
            title: "Title b",
            source: "duga",
            ..Default::default()
        },
    )
    .await;

    let ra = fetch_record(&pool, a).await.unwrap().unwrap();
    let rb = fetch_record(&pool, b).await.unwrap().unwrap();

    let g1 = groups.create_group(&ra, MatchMethod::GroupSeed).await.unwrap();
    let g2 = groups.create_group(&rb, MatchMethod::GroupSeed).await.unwrap();

    groups.merge_groups(g1, g2).await.unwrap();

    let code: Option<String> =
        sqlx::query_scalar("SELECT canonical_code FROM identity_groups WHERE id = ?")
            .bind(g1)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(code.as_deref(), Some("SSIS-865"));
}
