use quarry::{Connection, Direction, Error, Row, Value};

async fn users_connection() -> Result<Connection, Error> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut conn = Connection::configure("sqlite::memory:").name("main").connect().await?;
    conn.statement(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT UNIQUE,
            active INTEGER NOT NULL DEFAULT 1,
            votes INTEGER NOT NULL DEFAULT 0,
            balance REAL NOT NULL DEFAULT 0,
            created_at TEXT
        )",
    )
    .await?;
    Ok(conn)
}

async fn seed_users(conn: &mut Connection, count: i64) -> Result<(), Error> {
    let rows = (1..=count)
        .map(|i| {
            Row::new()
                .with("name", format!("user{}", i))
                .with("email", format!("user{}@example.com", i))
                .with("active", i64::from(i <= 15))
                .with("votes", i)
        })
        .collect();
    conn.table("users").insert_many(rows).await?;
    Ok(())
}

#[tokio::test]
async fn test_filtered_ordered_limited_select() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    seed_users(&mut conn, 20).await?;

    let rows = conn.table("users").where_eq("active", 1).order_by("id", Direction::Desc).limit(10).get().await?;

    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].try_get::<i64>("id")?, 15);
    assert_eq!(rows[9].try_get::<i64>("id")?, 6);

    println!("Filtered select test passed!");
    Ok(())
}

#[tokio::test]
async fn test_insert_get_id_and_find() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;

    let first = conn.table("users").insert_get_id(Row::new().with("name", "Alice")).await?;
    let second = conn.table("users").insert_get_id(Row::new().with("name", "Bob")).await?;
    assert_eq!(second, first + 1);

    let bob = conn.table("users").find(second).await?.expect("Bob should exist");
    assert_eq!(bob.try_get::<String>("name")?, "Bob");
    assert!(conn.table("users").find(999).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_update_delete_return_affected_rows() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    seed_users(&mut conn, 20).await?;

    let updated = conn.table("users").where_eq("active", 0).update(Row::new().with("name", "inactive")).await?;
    assert_eq!(updated, 5);

    let deleted = conn.table("users").where_("votes", "<=", 3).delete().await?;
    assert_eq!(deleted, 3);
    assert_eq!(conn.table("users").count().await?, 17);

    // No matching rows is not an error.
    assert_eq!(conn.table("users").where_eq("id", 1000).delete().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_limited_update_touches_only_limit_rows() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    seed_users(&mut conn, 10).await?;

    let updated = conn
        .table("users")
        .order_by("id", Direction::Asc)
        .limit(2)
        .update(Row::new().with("name", "first-two"))
        .await?;
    assert_eq!(updated, 2);
    assert_eq!(conn.table("users").where_eq("name", "first-two").count().await?, 2);

    Ok(())
}

#[tokio::test]
async fn test_increment_each_updates_in_one_statement() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    conn.table("users").insert(Row::new().with("name", "Carol").with("votes", 10).with("balance", 1.5)).await?;

    let affected =
        conn.table("users").where_eq("name", "Carol").increment_each(Row::new().with("votes", 5).with("balance", 2.5)).await?;
    assert_eq!(affected, 1);

    conn.table("users").where_eq("name", "Carol").decrement("votes", 3).await?;

    let carol = conn.table("users").where_eq("name", "Carol").first().await?.expect("Carol should exist");
    assert_eq!(carol.try_get::<i64>("votes")?, 12);
    assert_eq!(carol.try_get::<f64>("balance")?, 4.0);

    let rejected = conn.table("users").increment("votes", "lots").await;
    assert!(matches!(rejected, Err(Error::InvalidArgument(_))));

    Ok(())
}

#[tokio::test]
async fn test_aggregates_ignore_order_and_limit() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    seed_users(&mut conn, 20).await?;

    assert_eq!(conn.table("users").order_by("id", Direction::Desc).limit(3).count().await?, 20);
    assert_eq!(conn.table("users").where_eq("active", 1).sum("votes").await?, Value::Int(120));
    assert_eq!(conn.table("users").max("votes").await?, Value::Int(20));
    assert_eq!(conn.table("users").min("votes").await?, Value::Int(1));
    assert_eq!(conn.table("users").avg("votes").await?.as_f64(), Some(10.5));
    assert_eq!(conn.table("users").group_by(&["active"]).count().await?, 2);

    assert!(conn.table("users").where_eq("votes", 7).exists().await?);
    assert!(conn.table("users").where_eq("votes", 70).doesnt_exist().await?);

    Ok(())
}

#[tokio::test]
async fn test_value_and_pluck() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    seed_users(&mut conn, 3).await?;

    let name = conn.table("users").where_eq("id", 2).value("name").await?;
    assert_eq!(name, Some(Value::from("user2")));

    let names = conn.table("users").order_by_desc("id").pluck("name").await?;
    assert_eq!(names, vec![Value::from("user3"), Value::from("user2"), Value::from("user1")]);

    Ok(())
}

#[tokio::test]
async fn test_insert_or_ignore_and_upsert() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    conn.table("users").insert(Row::new().with("name", "Dan").with("email", "dan@example.com")).await?;

    let inserted = conn
        .table("users")
        .insert_or_ignore(vec![
            Row::new().with("name", "Dan again").with("email", "dan@example.com"),
            Row::new().with("name", "Eve").with("email", "eve@example.com"),
        ])
        .await?;
    assert_eq!(inserted, 1);

    conn.table("users")
        .upsert(
            vec![Row::new().with("name", "Daniel").with("email", "dan@example.com").with("votes", 9)],
            &["email"],
            &["name", "votes"],
        )
        .await?;

    let dan = conn.table("users").where_eq("email", "dan@example.com").first().await?.expect("Dan should exist");
    assert_eq!(dan.try_get::<String>("name")?, "Daniel");
    assert_eq!(dan.try_get::<i64>("votes")?, 9);
    assert_eq!(conn.table("users").count().await?, 2);

    let missing_keys = conn.table("users").upsert(vec![Row::new().with("name", "x")], &[], &["name"]).await;
    assert!(matches!(missing_keys, Err(Error::InvalidArgument(_))));

    Ok(())
}

#[tokio::test]
async fn test_where_date_parts_on_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    conn.table("users")
        .insert_many(vec![
            Row::new().with("name", "march").with("created_at", "2024-03-05 10:00:00"),
            Row::new().with("name", "april").with("created_at", "2024-04-05 10:00:00"),
        ])
        .await?;

    let march = conn.table("users").where_month("created_at", "=", 3).pluck("name").await?;
    assert_eq!(march, vec![Value::from("march")]);

    let in_2024 = conn.table("users").where_year("created_at", "=", 2024).where_day("created_at", "=", 5).count().await?;
    assert_eq!(in_2024, 2);

    let by_date = conn.table("users").where_date("created_at", "=", "2024-04-05").count().await?;
    assert_eq!(by_date, 1);

    Ok(())
}

#[tokio::test]
async fn test_pagination() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    seed_users(&mut conn, 23).await?;

    let page = conn.table("users").order_by("id", Direction::Asc).paginate(3, 10).await?;
    assert_eq!(page.total, 23);
    assert_eq!(page.last_page, 3);
    assert_eq!(page.data.len(), 3);
    assert_eq!(page.data[0].try_get::<i64>("id")?, 21);
    assert!(!page.has_more_pages());

    assert!(conn.table("users").is_page_valid(3, 10).await?);
    assert!(!conn.table("users").is_page_valid(4, 10).await?);
    assert!(!conn.table("users").is_page_valid(0, 10).await?);

    // An empty table still has one (empty) page.
    conn.table("users").truncate().await?;
    assert!(conn.table("users").is_page_valid(1, 10).await?);

    let zero = conn.table("users").paginate(1, 0).await;
    assert!(matches!(zero, Err(Error::InvalidArgument(_))));

    Ok(())
}

#[tokio::test]
async fn test_statement_cache_is_lru_bounded() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    conn.set_max_cache_size(2);
    conn.clear_statement_cache();

    conn.select("SELECT 1", Vec::new()).await?;
    conn.select("SELECT 2", Vec::new()).await?;
    conn.select("SELECT 1", Vec::new()).await?;
    conn.select("SELECT 3", Vec::new()).await?;

    let stats = conn.get_cache_stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.max_size, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);

    // "SELECT 2" was least recently used and got evicted.
    conn.select("SELECT 2", Vec::new()).await?;
    assert_eq!(conn.get_cache_stats().misses, 4);
    conn.select("SELECT 3", Vec::new()).await?;
    assert_eq!(conn.get_cache_stats().hits, 2);

    conn.clear_statement_cache();
    let stats = conn.get_cache_stats();
    assert_eq!((stats.size, stats.hits, stats.misses), (0, 0, 0));

    Ok(())
}

#[tokio::test]
async fn test_disabled_cache_still_executes() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut conn = Connection::configure("sqlite::memory:").max_cache_size(0).connect().await?;

    let rows = conn.select("SELECT ? AS answer", vec![Value::Int(42)]).await?;
    assert_eq!(rows[0].try_get::<i64>("answer")?, 42);
    assert_eq!(conn.get_cache_stats().size, 0);

    Ok(())
}

#[tokio::test]
async fn test_query_log_records_sql_and_bindings() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;

    // Logging is on from the start, so the schema statement is already there.
    assert!(conn.query_log().is_enabled());
    let entries = conn.query_log().entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].sql.starts_with("CREATE TABLE users"));
    conn.query_log().clear();

    conn.table("users").where_eq("name", "Zed").get().await?;
    conn.disable_query_log();
    conn.table("users").get().await?;

    let entries = conn.query_log().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sql, "SELECT * FROM \"users\" WHERE \"name\" = ?");
    assert_eq!(entries[0].bindings, vec![Value::from("Zed")]);
    assert!(entries[0].time_ms >= 0.0);

    conn.query_log().clear();
    assert!(conn.query_log().is_empty());

    conn.enable_query_log();
    conn.select("SELECT 1", Vec::new()).await?;
    assert_eq!(conn.query_log().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_schema_introspection() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    conn.statement("CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT)").await?;

    assert_eq!(conn.get_tables().await?, vec!["posts".to_string(), "users".to_string()]);
    assert!(conn.table_exists("posts").await?);
    assert!(!conn.table_exists("comments").await?);

    assert_eq!(conn.get_column_listing("posts").await?, vec!["id".to_string(), "title".to_string()]);
    assert!(conn.column_exists("users", "EMAIL").await?);
    assert!(!conn.column_exists("users", "password").await?);

    conn.table("posts").insert(Row::new().with("title", "Hello")).await?;
    conn.truncate_table("posts").await?;
    assert_eq!(conn.table("posts").count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_driver_errors_keep_native_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;

    let result = conn.table("missing_table").get().await;
    match result {
        Err(Error::Execution(sqlx::Error::Database(db))) => assert!(db.message().contains("no such table")),
        other => panic!("expected the database error, got {:?}", other),
    }
    // A rejected prepare is neither cached nor retried unprepared.
    assert_eq!(conn.get_cache_stats().size, 0);

    // The connection stays usable afterwards.
    assert_eq!(conn.table("users").count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_regexp_fails_fast_on_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    seed_users(&mut conn, 3).await?;
    conn.query_log().clear();

    let result = conn.table("users").where_regexp("name", "^user[0-9]$").get().await;
    assert!(matches!(result, Err(Error::QueryCompilation(_))));
    let result = conn.table("users").where_not_regexp("email", "@example").count().await;
    assert!(matches!(result, Err(Error::QueryCompilation(_))));

    // Nothing reached the database.
    assert!(conn.query_log().is_empty());
    assert_eq!(conn.table("users").where_like("name", "user%").count().await?, 3);

    Ok(())
}

#[tokio::test]
async fn test_insert_get_id_reads_returning_key() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    seed_users(&mut conn, 4).await?;
    conn.query_log().clear();

    let id = conn.table("users").insert_get_id(Row::new().with("name", "Eve").with("votes", 9)).await?;
    assert_eq!(id, 5);
    assert_eq!(conn.query_log().entries()[0].sql, "INSERT INTO \"users\" (\"name\", \"votes\") VALUES (?, ?) RETURNING \"id\"");

    let eve = conn.table("users").where_eq("id", id).value("name").await?;
    assert_eq!(eve, Some(Value::from("Eve")));

    Ok(())
}

#[tokio::test]
async fn test_disconnected_connection_reports_configuration_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = users_connection().await?;
    conn.disconnect().await?;
    assert!(!conn.is_connected());

    let result = conn.select("SELECT 1", Vec::new()).await;
    assert!(matches!(result, Err(Error::Configuration(_))));

    conn.reconnect().await?;
    assert!(conn.is_connected());
    // A fresh in-memory database.
    assert!(!conn.table_exists("users").await?);

    Ok(())
}
