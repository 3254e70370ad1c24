use super::*;
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::row::Row;
use crate::test_util::RecordingExecutor;
use crate::value::{Params, Value};
use serde_json::json;

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

#[test]
fn list_condition_binds_by_column() {
    let c = normalize(&Where::and([("height", 170)])).unwrap();
    assert_eq!(c.fragment, "height = :height");
    assert_eq!(c.params, Params::new().with("height", 170));
}

#[test]
fn list_condition_disambiguates_repeated_columns() {
    let c = normalize(&Where::or([("a", 1), ("a", 2)])).unwrap();
    assert_eq!(c.fragment, "a = :a OR a = :a_2");
    assert_eq!(c.params.get(":a_2"), Some(&Value::Int(2)));
}

#[test]
fn list_condition_with_fragment_and_paths() {
    let c = normalize(&Where::and([
        ("age", Arg::from(Expr::between(18, 30))),
        ("json_column", Arg::paths([("a.b", 1)])),
        ("deleted_at", Arg::from(Expr::raw(["IS NULL"]))),
    ]))
    .unwrap();
    assert_eq!(
        c.fragment,
        "age BETWEEN 18 AND 30 AND `json_column`->'$.a.b' = :json_column_a_b AND deleted_at IS NULL"
    );
    assert_eq!(c.params.len(), 1);
}

#[test]
fn list_condition_rejects_documents() {
    let err = normalize(&Where::and([("meta", json!({"a": 1}))])).unwrap_err();
    assert!(matches!(err, OrmError::Normalization(_)));

    let nested = Arg::paths([("a", Arg::paths([("b", 1)]))]);
    let err = normalize(&Where::and([("meta", nested)])).unwrap_err();
    assert!(matches!(err, OrmError::Normalization(_)));
}

#[test]
fn sql_condition_named_params() {
    let c = normalize(&Where::sql("id = :id AND name = :name").bind("id", 5).bind(":name", "Bo"))
        .unwrap();
    assert_eq!(c.fragment, "id = :id AND name = :name");
    assert_eq!(c.params, Params::new().with("id", 5).with("name", "Bo"));
}

#[test]
fn sql_condition_inlines_fragments_and_renumbers() {
    let c = normalize(
        &Where::sql("a = ? AND b = ? AND c = ?")
            .push(1)
            .push(Expr::raw(["NOW()"]))
            .push(3),
    )
    .unwrap();
    assert_eq!(c.fragment, "a = ? AND b = NOW() AND c = ?");
    assert_eq!(c.params.positional(1), Some(&Value::Int(1)));
    assert_eq!(c.params.positional(2), Some(&Value::Int(3)));
    assert_eq!(c.params.positional_len(), 2);
}

#[test]
fn sql_condition_ignores_placeholders_in_literals() {
    let c = normalize(&Where::sql("note = ':skip' AND id = :id").bind("id", 1)).unwrap();
    assert_eq!(c.params.len(), 1);
    assert_eq!(c.fragment, "note = ':skip' AND id = :id");
}

#[test]
fn expr_condition_renders_and_binds() {
    let filter = Where::expr(Expr::and([
        Part::from(Expr::or(["a = :a", "b = 2"])),
        Part::from("c = 3"),
    ]))
    .bind("a", 1);
    let c = normalize(&filter).unwrap();
    assert_eq!(c.fragment, "(a = :a OR b = 2) AND c = 3");
    assert_eq!(c.params.get(":a"), Some(&Value::Int(1)));
}

#[test]
fn path_map_parameter_is_rejected() {
    let err = normalize(&Where::sql("x = :x").bind("x", Arg::paths([("a", 1)]))).unwrap_err();
    assert!(matches!(err, OrmError::Normalization(_)));
}

#[test]
fn unbound_placeholders_are_rejected() {
    let err = normalize(&Where::sql("id = :id")).unwrap_err();
    assert!(matches!(err, OrmError::Normalization(ref m) if m == "Missing value for parameter :id"));

    let err = normalize(&Where::sql("a = ? AND b = ?").push(1)).unwrap_err();
    assert!(
        matches!(err, OrmError::Normalization(ref m) if m == "Missing value for positional parameter 2")
    );

    let err = normalize(&Where::expr(Expr::or(["a = :a", "b = :b"])).bind("a", 1)).unwrap_err();
    assert!(matches!(err, OrmError::Normalization(_)));
}

#[tokio::test]
async fn unbound_placeholder_fails_before_any_statement() {
    let conn = RecordingExecutor::new();
    let mut qb = SqlBuilder::new();
    qb.database("app").table("user").filter(Where::sql("id = :id"));
    assert!(qb.select(&conn).await.is_err());
    assert!(conn.statements().is_empty());
}

/// Yields between the database switch and the statement unless they arrive
/// together through `run_on`.
struct Yielding(RecordingExecutor);

#[async_trait::async_trait]
impl Executor for Yielding {
    async fn execute(&self, sql: &str) -> OrmResult<u64> {
        tokio::task::yield_now().await;
        self.0.execute(sql).await
    }

    async fn execute_insert(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        tokio::task::yield_now().await;
        self.0.execute_insert(sql, params).await
    }

    async fn execute_select(&self, sql: &str, params: &Params) -> OrmResult<Vec<Row>> {
        tokio::task::yield_now().await;
        self.0.execute_select(sql, params).await
    }

    async fn execute_update(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        tokio::task::yield_now().await;
        self.0.execute_update(sql, params).await
    }

    async fn execute_delete(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        tokio::task::yield_now().await;
        self.0.execute_delete(sql, params).await
    }

    async fn use_database(&self, name: &str) -> OrmResult<()> {
        self.0.use_database(name).await?;
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn begin_transaction(&self) -> OrmResult<()> {
        self.0.begin_transaction().await
    }

    async fn commit(&self) -> OrmResult<()> {
        self.0.commit().await
    }

    async fn rollback(&self) -> OrmResult<()> {
        self.0.rollback().await
    }

    async fn run_on(
        &self,
        database: Option<&str>,
        statement: crate::executor::Statement<'_>,
    ) -> OrmResult<crate::executor::QueryOutcome> {
        self.0.run_on(database, statement).await
    }
}

#[tokio::test]
async fn concurrent_builders_run_on_their_own_database() -> OrmResult<()> {
    let conn = Yielding(RecordingExecutor::new());
    let mut a = SqlBuilder::new();
    a.database("app_a").table("in_a");
    let mut b = SqlBuilder::new();
    b.database("app_b").table("in_b");
    let mut c = SqlBuilder::new();
    c.database("app_a").table("in_a").filter(Where::and([("id", 1)]));

    let (ra, rb, rc) = tokio::join!(a.select(&conn), b.select(&conn), c.count(&conn));
    ra?;
    rb?;
    rc?;

    let ran_on = conn.0.ran_on();
    let statements: Vec<_> = ran_on.iter().filter(|(_, sql)| !sql.starts_with("USE")).collect();
    assert_eq!(statements.len(), 3);
    for (database, sql) in statements {
        let expected = if sql.contains("`in_a`") { "app_a" } else { "app_b" };
        assert_eq!(database.as_deref(), Some(expected), "{sql}");
    }
    Ok(())
}

#[test]
fn join_keyword_parsing() {
    assert_eq!(Join::parse("AND").unwrap(), Join::And);
    assert_eq!(Join::parse("or").unwrap(), Join::Or);
    assert!(Join::parse("xor").is_err());
}

// ---------------------------------------------------------------------------
// SqlBuilder
// ---------------------------------------------------------------------------

#[test]
fn select_with_fields_and_list_filter() {
    let mut qb = SqlBuilder::new();
    qb.table("user")
        .fields(["first_name", "last_name"])
        .filter(Where::and([("first_name", "Name")]));
    let built = qb.build_sql(Action::Select).unwrap();
    assert_eq!(
        built.sql,
        "SELECT `first_name`, `last_name` FROM `user` WHERE first_name = :first_name"
    );
    assert_eq!(built.params, Params::new().with("first_name", "Name"));

    // Building again yields the same statement.
    assert_eq!(qb.build_sql(Action::Select).unwrap(), built);
}

#[test]
fn select_full_clause_order() {
    let mut qb = SqlBuilder::new();
    qb.table_as("user", "u")
        .field("u.id")
        .field(Field::json("u.profile", "address.city"))
        .join_as(JoinType::Left, "order", "o", "o.user_id = u.id")
        .filter(Where::sql("u.age > :age").bind("age", 18))
        .group("u.id")
        .having("COUNT(o.id) > 1")
        .order("u.id", Direction::Desc)
        .order("u.name", Direction::Unspecified)
        .length(10)
        .offset(20);
    let built = qb.build_sql(Action::Select).unwrap();
    assert_eq!(
        built.sql,
        "SELECT u.id, u.profile->>'$.address.city' FROM `user` AS `u` \
         LEFT JOIN `order` AS `o` ON o.user_id = u.id WHERE u.age > :age \
         GROUP BY u.id HAVING COUNT(o.id) > 1 ORDER BY u.id DESC, u.name LIMIT 10 OFFSET 20"
    );
}

#[test]
fn having_requires_group() {
    let mut qb = SqlBuilder::new();
    qb.table("t").having("COUNT(*) > 1");
    assert_eq!(qb.build_sql(Action::Select).unwrap().sql, "SELECT * FROM `t`");
}

#[test]
fn order_updates_known_key_in_place() {
    let mut qb = SqlBuilder::new();
    qb.table("t")
        .order("a", Direction::Asc)
        .order("b", Direction::Asc)
        .order("a", Direction::Desc);
    assert_eq!(
        qb.build_sql(Action::Select).unwrap().sql,
        "SELECT * FROM `t` ORDER BY `a` DESC, `b` ASC"
    );
}

#[test]
fn limit_zero_is_emitted() {
    let mut qb = SqlBuilder::new();
    qb.table("t");
    assert_eq!(qb.build_sql(Action::Select).unwrap().sql, "SELECT * FROM `t`");
    qb.length(0);
    assert_eq!(qb.build_sql(Action::Select).unwrap().sql, "SELECT * FROM `t` LIMIT 0");
    qb.length(-1);
    assert_eq!(qb.build_sql(Action::Select).unwrap().sql, "SELECT * FROM `t`");
}

#[test]
fn json_remove_field() {
    let mut qb = SqlBuilder::new();
    qb.table("t")
        .field("id")
        .field(Expr::json_remove("json_column", ["e.0.ea"]));
    assert_eq!(
        qb.build_sql(Action::Select).unwrap().sql,
        "SELECT `id`, JSON_REMOVE(`json_column`, '$.e[0].ea') FROM `t`"
    );
}

#[test]
fn validation_happens_before_execution() {
    let mut qb = SqlBuilder::new();
    let err = qb.build_sql(Action::Select).unwrap_err();
    assert_eq!(
        err.to_string(),
        OrmError::build("Empty target when executing query in SQLBuilder").to_string()
    );

    qb.table("user");
    let err = qb.build_sql(Action::Insert).unwrap_err();
    assert!(err.is_build_error());
    assert!(err.to_string().contains("Empty data when executing insert query"));
    let err = qb.build_sql(Action::Update).unwrap_err();
    assert!(err.to_string().contains("Empty data when executing update query"));
}

#[tokio::test]
async fn invalid_builder_never_reaches_executor() {
    let conn = RecordingExecutor::new();
    let mut qb = SqlBuilder::new();
    qb.table("user").database("app");
    assert!(qb.insert(&conn).await.is_err());
    assert!(conn.statements().is_empty());
}

#[test]
fn insert_binds_values_and_inlines_fragments() {
    let mut qb = SqlBuilder::new();
    qb.table("user")
        .data("name", "Ann")
        .data("created_at", Expr::raw(["NOW()"]))
        .data("meta", Arg::paths([("a", 1)]))
        .data("tags", json!(["x"]))
        .data("name", "Bo");
    let built = qb.build_sql(Action::Insert).unwrap();
    assert_eq!(
        built.sql,
        "INSERT INTO `user` (`name`, `created_at`, `meta`, `tags`) VALUES (:ins_name, NOW(), :ins_meta, :ins_tags)"
    );
    assert_eq!(built.params.get(":ins_name"), Some(&Value::from("Bo")));
    assert_eq!(built.params.get(":ins_meta"), Some(&Value::from(r#"{"a":1}"#)));
    assert_eq!(built.params.get(":ins_tags"), Some(&Value::from(r#"["x"]"#)));
}

#[test]
fn update_with_json_set() {
    let mut qb = SqlBuilder::new();
    qb.table("user")
        .data("json_column", Arg::paths([("a", 100)]))
        .filter(Where::and([("id", 5)]));
    let built = qb.build_sql(Action::Update).unwrap();
    assert!(
        built
            .sql
            .contains("`json_column` = JSON_SET(`json_column`, '$.a', :upd_json_column_a)")
    );
    assert_eq!(built.params.get(":upd_json_column_a"), Some(&Value::Int(100)));
    assert_eq!(built.params.get(":id"), Some(&Value::Int(5)));
}

#[test]
fn update_paths_with_same_bind_name_get_distinct_params() {
    let mut qb = SqlBuilder::new();
    qb.table("t")
        .data("doc", Arg::paths([("a.b", 1), ("a_b", 2)]))
        .filter(Where::and([("id", 5)]));
    let built = qb.build_sql(Action::Update).unwrap();
    assert_eq!(
        built.sql,
        "UPDATE `t` SET `doc` = JSON_SET(`doc`, '$.a.b', :upd_doc_a_b, '$.a_b', :upd_doc_a_b_2) \
         WHERE id = :id"
    );
    assert_eq!(built.params.get(":upd_doc_a_b"), Some(&Value::Int(1)));
    assert_eq!(built.params.get(":upd_doc_a_b_2"), Some(&Value::Int(2)));
    assert_eq!(built.params.get(":id"), Some(&Value::Int(5)));
}

#[test]
fn update_set_values_never_take_where_params() {
    let mut qb = SqlBuilder::new();
    qb.table("t")
        .data("x", 1)
        .filter(Where::and([("upd_x", 5)]));
    let built = qb.build_sql(Action::Update).unwrap();
    assert_eq!(built.sql, "UPDATE `t` SET `x` = :upd_x_2 WHERE upd_x = :upd_x");
    assert_eq!(built.params.get(":upd_x_2"), Some(&Value::Int(1)));
    assert_eq!(built.params.get(":upd_x"), Some(&Value::Int(5)));

    let mut qb = SqlBuilder::new();
    qb.table("t")
        .data("x", 1)
        .filter(Where::sql("upd_x = :upd_x").bind("upd_x", 5));
    let built = qb.build_sql(Action::Update).unwrap();
    assert_eq!(built.sql, "UPDATE `t` SET `x` = :upd_x_2 WHERE upd_x = :upd_x");
    assert_eq!(built.params.len(), 2);
}

#[test]
fn insert_columns_with_same_bind_name_get_distinct_params() {
    let mut qb = SqlBuilder::new();
    qb.table("t").data("user-id", 1).data("user_id", 2);
    let built = qb.build_sql(Action::Insert).unwrap();
    assert_eq!(
        built.sql,
        "INSERT INTO `t` (`user-id`, `user_id`) VALUES (:ins_user_id, :ins_user_id_2)"
    );
    assert_eq!(built.params.get(":ins_user_id"), Some(&Value::Int(1)));
    assert_eq!(built.params.get(":ins_user_id_2"), Some(&Value::Int(2)));
}

#[test]
fn update_json_set_casts_documents_and_inlines_fragments() {
    let mut qb = SqlBuilder::new();
    qb.table("t")
        .data(
            "doc",
            Arg::paths([
                ("list", Arg::from(json!([1, 2]))),
                ("n", Arg::from(Expr::raw(["JSON_EXTRACT(doc, '$.m')"]))),
            ]),
        )
        .data("counter", Expr::raw(["counter + 1"]))
        .length(1);
    let built = qb.build_sql(Action::Update).unwrap();
    assert_eq!(
        built.sql,
        "UPDATE `t` SET `doc` = JSON_SET(`doc`, '$.list', CAST(:upd_doc_list AS JSON), \
         '$.n', JSON_EXTRACT(doc, '$.m')), `counter` = counter + 1 LIMIT 1"
    );
    assert_eq!(built.params.get(":upd_doc_list"), Some(&Value::from("[1,2]")));
}

#[test]
fn delete_with_limit() {
    let mut qb = SqlBuilder::new();
    qb.table("log")
        .filter(Where::sql("created_at < :before").bind("before", "2024-01-01"))
        .order("id", Direction::Asc)
        .length(100);
    assert_eq!(
        qb.build_sql(Action::Delete).unwrap().sql,
        "DELETE FROM `log` WHERE created_at < :before ORDER BY `id` ASC LIMIT 100"
    );
}

#[test]
fn reset_keeps_database() {
    let mut qb = SqlBuilder::new();
    qb.database("app").table("t").length(3);
    qb.reset();
    assert_eq!(qb.database_name(), Some("app"));
    assert_eq!(qb.table_name(), None);
}

#[test]
fn union_suffixes_right_hand_placeholders() {
    let mut left = SqlBuilder::new();
    left.table("user").filter(Where::and([("name", "a")]));
    let mut right = SqlBuilder::new();
    right.table("user").filter(Where::and([("name", "b")]));

    let built = left.build_union(&mut right).unwrap();
    assert_eq!(
        built.sql,
        "(SELECT * FROM `user` WHERE name = :name) UNION (SELECT * FROM `user` WHERE name = :name_union1)"
    );
    assert_eq!(built.params.get(":name"), Some(&Value::from("a")));
    assert_eq!(built.params.get(":name_union1"), Some(&Value::from("b")));

    // A second union build bumps the counter.
    let again = right.build_sql(Action::Union).unwrap();
    assert!(again.sql.ends_with("name = :name_union2"));
}

#[test]
fn union_rejects_positional_params() {
    let mut left = SqlBuilder::new();
    left.table("a").filter(Where::sql("x = ?").push(1));
    let mut right = SqlBuilder::new();
    right.table("b");
    assert!(left.build_union(&mut right).unwrap_err().is_build_error());

    let mut right = SqlBuilder::new();
    right.table("b").filter(Where::sql("y = ?").push(2));
    assert!(right.build_sql(Action::Union).is_err());
}

#[test]
fn union_with_raw_sql_checks_conflicts() {
    let mut left = SqlBuilder::new();
    left.table("a").filter(Where::and([("id", 1)]));
    let err = left
        .build_union(UnionWith::Sql {
            sql: "SELECT * FROM `b` WHERE id = :id".to_string(),
            params: Params::new().with("id", 2),
        })
        .unwrap_err();
    assert!(err.is_build_error());

    let ok = left
        .build_union(UnionWith::Sql {
            sql: "SELECT * FROM `b` WHERE id = :id".to_string(),
            params: Params::new().with("id", 1),
        })
        .unwrap();
    assert_eq!(ok.params.len(), 1);
}

// ---------------------------------------------------------------------------
// execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn count_leaves_fields_untouched() {
    let conn = RecordingExecutor::new();
    conn.push_rows(vec![Row::new().with("cnt", 3)]);
    let mut qb = SqlBuilder::new();
    qb.database("app").table("user").field("name").filter(Where::and([("age", 30)]));

    assert_eq!(qb.count(&conn).await.unwrap(), 3);
    qb.select(&conn).await.unwrap();
    assert_eq!(
        conn.statements(),
        vec![
            "USE `app`",
            "SELECT COUNT(1) AS cnt FROM `user` WHERE age = :age",
            "SELECT `name` FROM `user` WHERE age = :age",
        ]
    );
}

#[tokio::test]
async fn no_rows_is_empty_not_error() {
    let conn = RecordingExecutor::new();
    let mut qb = SqlBuilder::new();
    qb.table("user");
    assert!(qb.select(&conn).await.unwrap().is_empty());
    assert_eq!(qb.count(&conn).await.unwrap(), 0);
}

#[tokio::test]
async fn mutations_return_executor_results() {
    let conn = RecordingExecutor::new();
    conn.set_insert_id(12).set_affected(4);
    let mut qb = SqlBuilder::new();
    qb.table("user").data("name", "Ann");
    assert_eq!(qb.insert(&conn).await.unwrap(), 12);
    assert_eq!(qb.update(&conn).await.unwrap(), 4);
    assert_eq!(qb.delete(&conn).await.unwrap(), 4);
    assert_eq!(conn.last_params(), Params::new());
}

#[tokio::test]
async fn union_executes_combined_statement() {
    let conn = RecordingExecutor::new();
    conn.push_rows(vec![Row::new().with("id", 1), Row::new().with("id", 2)]);
    let mut left = SqlBuilder::new();
    left.table("a").field("id");
    let mut right = SqlBuilder::new();
    right.table("b").field("id");

    let rows = left.union(&conn, &mut right).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        conn.statements(),
        vec!["(SELECT `id` FROM `a`) UNION (SELECT `id` FROM `b`)"]
    );
}

#[tokio::test]
async fn execution_errors_propagate() {
    let conn = RecordingExecutor::new();
    conn.fail_next("Duplicate entry");
    let mut qb = SqlBuilder::new();
    qb.table("user").data("name", "Ann");
    let err = qb.insert(&conn).await.unwrap_err();
    assert!(matches!(err, OrmError::Execution(_)));
    // The recording executor is usable again afterwards.
    conn.execute("SELECT 1").await.unwrap();
}
