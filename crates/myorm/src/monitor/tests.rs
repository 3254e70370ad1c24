use super::*;
use crate::error::OrmResult;
use crate::executor::Executor;
use crate::test_util::RecordingExecutor;
use crate::value::Params;

#[test]
fn query_type_classification() {
    assert_eq!(QueryType::from_sql("SELECT 1"), QueryType::Select);
    assert_eq!(QueryType::from_sql("  show tables"), QueryType::Select);
    assert_eq!(QueryType::from_sql("(SELECT a) UNION (SELECT b)"), QueryType::Select);
    assert_eq!(QueryType::from_sql("/* hint */ INSERT INTO t VALUES (1)"), QueryType::Insert);
    assert_eq!(QueryType::from_sql("REPLACE INTO t VALUES (1)"), QueryType::Insert);
    assert_eq!(QueryType::from_sql("-- c\nupdate t set a = 1"), QueryType::Update);
    assert_eq!(QueryType::from_sql("DELETE FROM t"), QueryType::Delete);
    assert_eq!(QueryType::from_sql("CREATE TABLE t (id INT)"), QueryType::Other);
    assert_eq!(QueryType::from_sql("SELECTED"), QueryType::Other);
}

#[test]
fn truncation_respects_char_boundaries() {
    assert_eq!(truncate_sql_bytes("abcdef", 3), "abc");
    assert_eq!(truncate_sql_bytes("héllo", 2), "h");
    assert_eq!(MonitorConfig::new().max_sql_length(3).truncate_sql("SELECT"), "SEL...");
    assert_eq!(MonitorConfig::new().no_truncate().truncate_sql("SELECT"), "SELECT");
}

#[tokio::test]
async fn collection_records_readable_sql() {
    let collection = SqlCollection::new();
    let conn = InstrumentedExecutor::new(RecordingExecutor::new()).with_collection(collection.clone());

    let params = Params::new().with("id", 5).with("name", "Bob");
    conn.execute_select("SELECT * FROM `user` WHERE id = :id AND name = :name", &params)
        .await
        .unwrap();
    conn.execute("TRUNCATE `user`").await.unwrap();

    assert_eq!(
        collection.snapshot(),
        vec![
            "SELECT * FROM `user` WHERE id = 5 AND name = 'Bob'".to_string(),
            "TRUNCATE `user`".to_string(),
        ]
    );
    // The inner executor still sees placeholders.
    assert_eq!(
        conn.inner().statements()[0],
        "SELECT * FROM `user` WHERE id = :id AND name = :name"
    );
    assert_eq!(collection.take().len(), 2);
    assert!(collection.is_empty());
}

#[tokio::test]
async fn errors_pass_through() {
    let inner = RecordingExecutor::new();
    inner.fail_next("boom");
    let conn = InstrumentedExecutor::new(inner);
    let err = conn.execute_update("UPDATE t SET a = 1", &Params::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "Execution error: boom");
}

#[tokio::test]
async fn transaction_handle_stays_instrumented() -> OrmResult<()> {
    let collection = SqlCollection::new();
    let conn = InstrumentedExecutor::new(RecordingExecutor::new()).with_collection(collection.clone());

    let tx = conn.transaction().await?;
    tx.execute_update("UPDATE t SET a = :a", &Params::new().with("a", 1))
        .await?;
    tx.commit().await?;

    assert_eq!(
        collection.snapshot(),
        vec!["START TRANSACTION", "UPDATE t SET a = 1", "COMMIT"]
    );
    assert_eq!(
        conn.inner().statements(),
        vec!["BEGIN", "UPDATE t SET a = :a", "COMMIT"]
    );
    Ok(())
}
