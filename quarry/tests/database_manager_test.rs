use quarry::{Connection, ConnectionConfig, DatabaseConfig, DatabaseManager, Drivers, Error};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn test_connections_open_lazily_from_config() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let config = DatabaseConfig::new("main")
        .with_connection("main", ConnectionConfig::sqlite(":memory:"))
        .with_connection("audit", ConnectionConfig::sqlite(":memory:"));
    let mut manager = DatabaseManager::new(config);

    assert!(manager.has_connection("audit"));
    assert!(!manager.is_connected("main"));

    let main = manager.connection(None).await?;
    assert_eq!(main.name(), "main");
    assert_eq!(main.driver(), Drivers::SQLite);
    main.statement("CREATE TABLE notes (body TEXT)").await?;

    // The same handle comes back on the next lookup.
    assert!(manager.is_connected("main"));
    assert!(manager.connection(Some("main")).await?.table_exists("notes").await?);

    // A different name is a different database.
    assert!(!manager.connection(Some("audit")).await?.table_exists("notes").await?);

    let missing = manager.connection(Some("nope")).await;
    assert!(matches!(missing, Err(Error::Configuration(_))));

    manager.reset().await;
    assert!(!manager.is_connected("main"));

    Ok(())
}

#[tokio::test]
async fn test_connections_share_one_query_log() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let config = DatabaseConfig::new("a").with_connection("a", ConnectionConfig::sqlite(":memory:"));
    let mut manager = DatabaseManager::new(config);
    manager.enable_query_log();

    manager.connection(Some("a")).await?.select("SELECT 1", Vec::new()).await?;

    let extra = Connection::configure("sqlite::memory:").name("b").connect().await?;
    manager.add_connection(extra);
    manager.connection(Some("b")).await?.select("SELECT 2", Vec::new()).await?;

    let sql: Vec<String> = manager.get_query_log().into_iter().map(|entry| entry.sql).collect();
    assert_eq!(sql, vec!["SELECT 1".to_string(), "SELECT 2".to_string()]);

    manager.clear_query_log();
    assert!(manager.get_query_log().is_empty());

    manager.disable_query_log();
    manager.connection(Some("a")).await?.select("SELECT 3", Vec::new()).await?;
    assert!(manager.get_query_log().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_default_connection_can_be_replaced() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let mut manager = DatabaseManager::new(DatabaseConfig::default());
    assert_eq!(manager.default_name(), "default");
    assert!(manager.connection(None).await.is_err());

    let scratch = Connection::configure("sqlite::memory:").name("scratch").max_cache_size(5).connect().await?;
    manager.set_default_connection(scratch);
    assert_eq!(manager.default_name(), "scratch");
    assert_eq!(manager.connection(None).await?.get_cache_stats().max_size, 5);

    manager.disconnect("scratch").await?;
    assert!(!manager.has_connection("scratch"));

    Ok(())
}

#[tokio::test]
async fn test_config_from_json() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let config: DatabaseConfig = serde_json::from_str(
        r#"{
            "default": "local",
            "log_queries": true,
            "connections": {
                "local": { "driver": "sqlite", "database": ":memory:", "max_cache_size": 7 },
                "reports": {
                    "driver": "pgsql",
                    "host": "db.internal",
                    "port": 5433,
                    "database": "reports",
                    "username": "app",
                    "password": "s3cret"
                }
            }
        }"#,
    )?;

    assert_eq!(config.connections["reports"].max_cache_size, 100);
    assert_eq!(
        config.connections["reports"].to_dsn()?,
        "pgsql:host=db.internal;port=5433;dbname=reports;user=app;password=s3cret"
    );

    let mut manager = DatabaseManager::new(config);
    assert!(manager.query_log().is_enabled());

    let local = manager.connection(None).await?;
    assert_eq!(local.get_cache_stats().max_size, 7);
    local.select("SELECT 1", Vec::new()).await?;
    assert_eq!(manager.get_query_log().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_query_log_follows_config_flag() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let config = DatabaseConfig::new("a").with_connection("a", ConnectionConfig::sqlite(":memory:"));
    let mut manager = DatabaseManager::new(config.clone());
    manager.connection(None).await?.select("SELECT 1", Vec::new()).await?;
    assert_eq!(manager.get_query_log().len(), 1);

    let mut quiet = DatabaseManager::new(DatabaseConfig { log_queries: false, ..config });
    assert!(!quiet.query_log().is_enabled());
    quiet.connection(None).await?.select("SELECT 1", Vec::new()).await?;
    assert!(quiet.get_query_log().is_empty());

    Ok(())
}
