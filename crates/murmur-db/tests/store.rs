//! Persistence tests against a migrated in-memory SQLite database.

use chrono::{Duration, Utc};
use murmur_core::{
    PublicationAnalysis, Publication, Report, SentimentLabel, Source, UnitKind, UnitSentiment,
};
use murmur_db::{
    complete_run, connect_in_memory, count_publications_by_source, create_run, fail_run, get_run,
    insert_publication, latest_analysis, latest_report, list_publications, list_recent_runs,
    persist_report, start_run, DbError, InsertOutcome, RunType,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn publication(source: Source, topic: &str, id: &str) -> Publication {
    Publication {
        id: id.to_string(),
        source,
        topic: topic.to_string(),
        requested_at: Utc::now(),
        published_at: "2024-05-01".to_string(),
        raw_text: format!("post {id} | a reply"),
    }
}

fn report(source: Source, topic: &str, text: &str, offset_secs: i64) -> Report {
    Report {
        source,
        topic: topic.to_string(),
        report_text: text.to_string(),
        model: "test-model".to_string(),
        concurrency_limit: 4,
        analyses: vec![PublicationAnalysis {
            publication_id: "RD_1".to_string(),
            overall_label: SentimentLabel::Positive,
            post_result: Some(UnitSentiment {
                kind: UnitKind::Post,
                label: SentimentLabel::Positive,
                explanation: "upbeat".to_string(),
                latency_seconds: 0.25,
            }),
            comment_results: vec![],
            processing_seconds: 0.25,
        }],
        created_at: Utc::now() + Duration::seconds(offset_secs),
    }
}

// ---------------------------------------------------------------------------
// publications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reinserting_same_key_is_a_duplicate() {
    let pool = connect_in_memory().await.unwrap();
    let p = publication(Source::Reddit, "climate policy", "RD_1");

    assert_eq!(
        insert_publication(&pool, &p, None).await.unwrap(),
        InsertOutcome::Inserted
    );
    assert_eq!(
        insert_publication(&pool, &p, None).await.unwrap(),
        InsertOutcome::Duplicate
    );

    let stored = list_publications(&pool, Source::Reddit, "climate policy")
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].raw_text, "post RD_1 | a reply");
}

#[tokio::test]
async fn same_id_under_other_topic_or_source_is_distinct() {
    let pool = connect_in_memory().await.unwrap();
    insert_publication(&pool, &publication(Source::Reddit, "a", "X1"), None)
        .await
        .unwrap();
    let other_topic = insert_publication(&pool, &publication(Source::Reddit, "b", "X1"), None)
        .await
        .unwrap();
    let other_source = insert_publication(&pool, &publication(Source::Twitter, "a", "X1"), None)
        .await
        .unwrap();
    assert_eq!(other_topic, InsertOutcome::Inserted);
    assert_eq!(other_source, InsertOutcome::Inserted);
}

#[tokio::test]
async fn list_preserves_insertion_order_and_counts_group_by_source() {
    let pool = connect_in_memory().await.unwrap();
    for id in ["c", "a", "b"] {
        insert_publication(&pool, &publication(Source::Reddit, "t", id), None)
            .await
            .unwrap();
    }
    insert_publication(&pool, &publication(Source::Facebook, "t", "f1"), None)
        .await
        .unwrap();

    let ids: Vec<String> = list_publications(&pool, Source::Reddit, "t")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);

    let counts = count_publications_by_source(&pool, "t").await.unwrap();
    assert_eq!(counts, vec![(Source::Facebook, 1), (Source::Reddit, 3)]);
}

// ---------------------------------------------------------------------------
// reports / analyses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn latest_report_prefers_newest_created_at() {
    let pool = connect_in_memory().await.unwrap();
    persist_report(&pool, &report(Source::Reddit, "t", "older", 0))
        .await
        .unwrap();
    persist_report(&pool, &report(Source::Reddit, "t", "newer", 10))
        .await
        .unwrap();
    persist_report(&pool, &report(Source::Reddit, "other", "elsewhere", 5))
        .await
        .unwrap();

    let row = latest_report(&pool, Source::Reddit, Some("t"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.report_text, "newer");
    assert_eq!(row.model, "test-model");
    assert_eq!(row.concurrency_limit, 4);

    let any_topic = latest_report(&pool, Source::Reddit, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(any_topic.report_text, "newer");

    assert!(latest_report(&pool, Source::Twitter, None)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn persisted_analyses_decode_back() {
    let pool = connect_in_memory().await.unwrap();
    let r = report(Source::Instagram, "t", "text", 0);
    persist_report(&pool, &r).await.unwrap();

    let stored = latest_analysis(&pool, Source::Instagram, "t")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.source, Source::Instagram);
    assert_eq!(stored.analyses, r.analyses);
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_lifecycle_succeeds_in_order() {
    let pool = connect_in_memory().await.unwrap();
    let run = create_run(&pool, RunType::Harvest, "cli", "t").await.unwrap();
    assert_eq!(run.status, "queued");

    start_run(&pool, run.id).await.unwrap();
    complete_run(&pool, run.id, 6).await.unwrap();

    let fetched = get_run(&pool, run.public_id).await.unwrap();
    assert_eq!(fetched.status, "succeeded");
    assert_eq!(fetched.records_processed, 6);
    assert!(fetched.started_at.is_some());
    assert!(fetched.completed_at.is_some());
}

#[tokio::test]
async fn completing_a_queued_run_is_rejected() {
    let pool = connect_in_memory().await.unwrap();
    let run = create_run(&pool, RunType::Analysis, "cli", "t").await.unwrap();

    let result = complete_run(&pool, run.id, 1).await;
    assert!(
        matches!(
            result,
            Err(DbError::InvalidRunTransition {
                expected_status: "running",
                ..
            })
        ),
        "expected InvalidRunTransition, got: {result:?}"
    );
}

#[tokio::test]
async fn failed_run_cannot_be_failed_again() {
    let pool = connect_in_memory().await.unwrap();
    let run = create_run(&pool, RunType::Harvest, "cli", "t").await.unwrap();
    start_run(&pool, run.id).await.unwrap();
    fail_run(&pool, run.id, "boom").await.unwrap();

    let fetched = get_run(&pool, run.public_id).await.unwrap();
    assert_eq!(fetched.status, "failed");
    assert_eq!(fetched.error_message.as_deref(), Some("boom"));

    assert!(fail_run(&pool, run.id, "again").await.is_err());
}

#[tokio::test]
async fn recent_runs_are_newest_first() {
    let pool = connect_in_memory().await.unwrap();
    let first = create_run(&pool, RunType::Harvest, "cli", "a").await.unwrap();
    let second = create_run(&pool, RunType::Analysis, "cli", "b").await.unwrap();

    let runs = list_recent_runs(&pool, 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, second.id);
    assert_eq!(runs[1].id, first.id);

    assert_eq!(list_recent_runs(&pool, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_public_id_is_not_found() {
    let pool = connect_in_memory().await.unwrap();
    let result = get_run(&pool, uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(DbError::NotFound)));
}
