//! Transaction helper macro.
//!
//! [`Executor::transaction`](crate::Executor::transaction) begins a
//! transaction and returns a handle; statements sent through the handle run
//! inside it, and `commit` or `rollback` on the handle ends it. The
//! [`transaction!`] macro wraps a block between the two.
//!
//! # Example
//!
//! ```ignore
//! use myorm::{OrmResult, SqlBuilder, Where};
//!
//! # async fn demo(conn: std::sync::Arc<dyn myorm::Executor>) -> OrmResult<()> {
//! myorm::transaction!(conn, tx, {
//!     SqlBuilder::new()
//!         .table("accounts")
//!         .data("balance", myorm::Expr::raw(["balance - 100"]))
//!         .filter(Where::and([("id", 1)]))
//!         .update(&*tx)
//!         .await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

/// Runs the given block inside a database transaction.
///
/// - `$conn` is anything that dereferences to an executor (`Arc<dyn Executor>`,
///   `&MySqlExecutor`, ...).
/// - `$tx` names the transaction handle inside the block.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `myorm::OrmResult<T>`. No retry is attempted; a
/// failed commit is returned as the error.
///
/// Statements in the block go through `$tx`. A MySQL executor keeps other
/// callers waiting until the transaction ends, so using `$conn` itself inside
/// the block never completes.
#[macro_export]
macro_rules! transaction {
    ($conn:expr, $tx:ident, $body:block) => {{
        let $tx = $crate::Executor::transaction(&*$conn).await?;

        let __myorm_tx_body_result = async { $body }.await;
        match __myorm_tx_body_result {
            Ok(value) => {
                $crate::Executor::commit(&*$tx).await?;
                Ok(value)
            }
            Err(error) => match $crate::Executor::rollback(&*$tx).await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

#[cfg(test)]
mod tests {
    use crate::error::{OrmError, OrmResult};
    use crate::test_util::RecordingExecutor;

    async fn run(conn: &RecordingExecutor, fail: bool) -> OrmResult<u32> {
        crate::transaction!(conn, tx, {
            tx.execute("UPDATE t SET n = n + 1").await?;
            if fail {
                Err(OrmError::validation("nope"))
            } else {
                Ok(1)
            }
        })
    }

    #[tokio::test]
    async fn commits_on_success() {
        let conn = RecordingExecutor::new();
        assert_eq!(run(&conn, false).await.unwrap(), 1);
        assert_eq!(conn.statements(), vec!["BEGIN", "UPDATE t SET n = n + 1", "COMMIT"]);
    }

    #[tokio::test]
    async fn rolls_back_on_error() {
        let conn = RecordingExecutor::new();
        assert!(run(&conn, true).await.is_err());
        assert_eq!(conn.statements(), vec!["BEGIN", "UPDATE t SET n = n + 1", "ROLLBACK"]);
    }
}
