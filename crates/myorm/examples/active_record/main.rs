//! Active-record walkthrough.
//!
//! Expects a config file (default `database.toml`, override with
//! `MYORM_CONFIG`) such as:
//!
//! ```toml
//! sql_collection = true
//! slow_query_ms = 200
//!
//! [sources.main]
//! host = "127.0.0.1"
//! dbname = "myorm_demo"
//! user = "${MYSQL_USER}"
//! password = "${MYSQL_PASSWORD}"
//! ```
//!
//! Run with `RUST_LOG=myorm.sql=debug` to see every statement.

use myorm::{
    Arg, DatabaseConfig, Direction, Manager, Model, ModelOptions, OrmError, Registry, SaveOutcome,
    Where,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), OrmError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::var("MYORM_CONFIG").unwrap_or_else(|_| "database.toml".to_string());
    let registry = Registry::mysql(DatabaseConfig::load(&path)?);

    let conn = registry.executor(None).await?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS demo_user (
            id INT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(64) NOT NULL,
            age INT(11) NOT NULL DEFAULT 0,
            active TINYINT(1) NOT NULL DEFAULT 1,
            settings JSON NULL
        )",
    )
    .await?;

    // Insert through a model; the auto-increment id is captured.
    let mut user = Model::open(&registry, "demo_user", ModelOptions::new()).await?;
    user.set("name", "Ann")?.set("age", "31")?;
    user.set_json("settings", serde_json::json!({"theme": "light", "lang": "en"}))?;
    let SaveOutcome::Inserted(id) = user.save().await? else {
        return Err(OrmError::Other("expected an insert".to_string()));
    };
    println!("inserted user {id}");

    // Load it back and patch one JSON path.
    let mut user = Model::open(&registry, "demo_user", ModelOptions::new()).await?;
    if user.load(id).await? {
        user.json_mut("settings")?.alter("theme", "dark")?;
        println!("save: {:?}", user.save().await?);
        println!("row:  {:?}", user.data());
    }

    // Condition-based access.
    let users = Manager::open(&registry, "demo_user", ModelOptions::new()).await?;
    for row in users.find_by_field("name", "A%", true).await? {
        println!("match: {row:?}");
    }

    let mut qb = users.adapter().create_sql();
    qb.field("id")
        .field(myorm::Field::json("settings", "theme"))
        .filter(Where::and([("active", Arg::from(true))]))
        .order("id", Direction::Desc)
        .length(10);
    println!("latest: {:?}", qb.select(&*conn).await?);
    println!("total:  {}", users.count(None).await?);

    if let Some(collection) = registry.sql_collection() {
        for sql in collection.take() {
            println!("sql> {sql}");
        }
    }
    Ok(())
}
