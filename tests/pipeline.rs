//! End-to-end test of the scheduler, worker and notifier roles over the
//! in-memory broker.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use sitewatch::{
    config::AppConfig,
    fetch::FetcherSet,
    metrics::{MONITOR_STATE, MONITORS_PROCESSED_TOTAL},
    models::{CheckDefinition, NotifierDefinition},
    persistence::{CheckLogStore, MonitorRepository, SqliteStateRepository},
    queue::{Channel, InMemoryBroker},
    supervisor::{Role, Supervisor},
    test_helpers::{MonitorDefinitionBuilder, StaticFetcher},
};

async fn setup_db() -> Arc<SqliteStateRepository> {
    let repo = SqliteStateRepository::new("sqlite::memory:")
        .await
        .expect("Failed to set up in-memory database");
    repo.run_migrations().await.expect("Failed to run migrations");
    Arc::new(repo)
}

#[tokio::test]
async fn test_pipeline_notifies_once_for_a_matching_monitor() {
    let state = setup_db().await;
    let definition = MonitorDefinitionBuilder::new("X")
        .interval(Duration::from_secs(3600))
        .check(CheckDefinition {
            name: "stock".to_string(),
            kind: "regex".to_string(),
            path: None,
            value: "In stock".to_string(),
            expected: true,
        })
        .notifier(NotifierDefinition {
            name: "audit".to_string(),
            kind: "log".to_string(),
            options: BTreeMap::new(),
        })
        .build();
    let id = state.save_definition(&definition).await.unwrap();

    let broker = Arc::new(InMemoryBroker::new());
    let fetcher = StaticFetcher::body("<p>In stock</p>");
    let config = AppConfig { tick_interval_ms: Duration::from_millis(10), ..Default::default() };
    let supervisor = Supervisor::builder()
        .config(config)
        .role(Role::Pipeline)
        .state(state.clone())
        .broker(broker.clone())
        .fetchers(FetcherSet::uniform(Arc::new(fetcher.clone())))
        .build()
        .await
        .unwrap();
    let token = supervisor.cancellation_token();
    let metrics = supervisor.metrics();
    let handle = tokio::spawn(supervisor.run());

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.recent(10).await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no notification was recorded");
    // Further ticks must not schedule the monitor again.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // One job and one result, both acknowledged.
    assert_eq!(broker.acked(), 2);
    assert_eq!(broker.rejected(), 0);
    assert_eq!(broker.depth(Channel::Schedule), 0);
    assert_eq!(broker.depth(Channel::Notifications), 0);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(metrics.value(MONITORS_PROCESSED_TOTAL, Some("X")), Some(1.0));
    assert_eq!(metrics.value(MONITOR_STATE, Some("X")), Some(1.0));

    let logs = state.recent(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].name, "X");
    assert!(logs[0].matches_checks);
    assert!(state.definition(id).await.unwrap().last_seen_state);

    token.cancel();
    handle.await.unwrap().unwrap();
}
