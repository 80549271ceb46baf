use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use quarry::{Connection, Error, Row};

async fn accounts_connection() -> Result<Connection, Error> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut conn = Connection::connect("sqlite::memory:").await?;
    conn.statement("CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, balance INTEGER NOT NULL)")
        .await?;
    Ok(conn)
}

fn counter() -> (Arc<AtomicUsize>, impl FnOnce() -> Result<(), Error> + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&count);
    (count, move || {
        handle.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[tokio::test]
async fn test_transaction_commits_on_success() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = accounts_connection().await?;

    let id = conn
        .transaction(|c| {
            Box::pin(async move {
                c.table("accounts").insert_get_id(Row::new().with("owner", "alice").with("balance", 100)).await
            })
        })
        .await?;

    assert_eq!(conn.transaction_level(), 0);
    assert_eq!(conn.table("accounts").find(id).await?.map(|r| r.try_get::<i64>("balance")).transpose()?, Some(100));

    Ok(())
}

#[tokio::test]
async fn test_transaction_rolls_back_and_returns_original_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = accounts_connection().await?;

    let result: Result<(), Error> = conn
        .transaction(|c| {
            Box::pin(async move {
                c.table("accounts").insert(Row::new().with("owner", "bob").with("balance", 5)).await?;
                Err(Error::InvalidArgument("insufficient funds".to_string()))
            })
        })
        .await;

    match result {
        Err(Error::InvalidArgument(message)) => assert_eq!(message, "insufficient funds"),
        other => panic!("expected the callback's error, got {:?}", other),
    }
    assert_eq!(conn.transaction_level(), 0);
    assert_eq!(conn.table("accounts").count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_nested_levels_share_one_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = accounts_connection().await?;

    conn.begin_transaction().await?;
    conn.table("accounts").insert(Row::new().with("owner", "outer").with("balance", 1)).await?;

    conn.begin_transaction().await?;
    assert_eq!(conn.transaction_level(), 2);
    conn.table("accounts").insert(Row::new().with("owner", "inner").with("balance", 2)).await?;
    conn.commit().await?;
    assert_eq!(conn.transaction_level(), 1);

    conn.commit().await?;
    assert_eq!(conn.transaction_level(), 0);
    assert!(!conn.in_transaction());
    assert_eq!(conn.table("accounts").count().await?, 2);

    Ok(())
}

#[tokio::test]
async fn test_inner_rollback_discards_the_whole_unit() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = accounts_connection().await?;

    let result: Result<(), Error> = conn
        .transaction(|c| {
            Box::pin(async move {
                c.table("accounts").insert(Row::new().with("owner", "outer").with("balance", 1)).await?;

                let inner: Result<(), Error> = c
                    .transaction(|c| {
                        Box::pin(async move {
                            c.table("accounts").insert(Row::new().with("owner", "inner").with("balance", 2)).await?;
                            Err(Error::InvalidArgument("inner failure".to_string()))
                        })
                    })
                    .await;
                assert!(inner.is_err());
                Ok(())
            })
        })
        .await;

    assert!(matches!(result, Err(Error::Transaction(_))));
    assert_eq!(conn.transaction_level(), 0);
    assert_eq!(conn.table("accounts").count().await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_after_commit_runs_once_after_outermost_commit() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = accounts_connection().await?;
    let (committed, on_commit) = counter();
    let (rolled_back, on_rollback) = counter();

    conn.begin_transaction().await?;
    conn.begin_transaction().await?;
    conn.after_commit(on_commit)?;
    conn.after_rollback(on_rollback)?;
    conn.commit().await?;
    assert_eq!(committed.load(Ordering::SeqCst), 0);

    conn.commit().await?;
    assert_eq!(committed.load(Ordering::SeqCst), 1);
    assert_eq!(rolled_back.load(Ordering::SeqCst), 0);

    // Queues are empty now: a second transaction fires nothing.
    conn.begin_transaction().await?;
    conn.commit().await?;
    assert_eq!(committed.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_after_rollback_runs_once_and_commit_callbacks_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = accounts_connection().await?;
    let (committed, on_commit) = counter();
    let (rolled_back, on_rollback) = counter();

    conn.begin_transaction().await?;
    conn.after_commit(on_commit)?;
    conn.after_rollback(on_rollback)?;
    conn.roll_back().await?;

    assert_eq!(rolled_back.load(Ordering::SeqCst), 1);
    assert_eq!(committed.load(Ordering::SeqCst), 0);

    conn.begin_transaction().await?;
    conn.commit().await?;
    assert_eq!(committed.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_callback_errors_surface_after_all_callbacks_run() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = accounts_connection().await?;
    let (ran, on_commit) = counter();

    conn.begin_transaction().await?;
    conn.table("accounts").insert(Row::new().with("owner", "carol").with("balance", 3)).await?;
    conn.after_commit(|| Err(Error::InvalidData("mailer unavailable".to_string())))?;
    conn.after_commit(on_commit)?;

    let result = conn.commit().await;
    assert!(matches!(result, Err(Error::TransactionCallback(_))));
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    // The data itself was committed.
    assert_eq!(conn.transaction_level(), 0);
    assert_eq!(conn.table("accounts").count().await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_misuse_outside_a_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = accounts_connection().await?;

    assert!(matches!(conn.commit().await, Err(Error::Transaction(_))));
    assert!(matches!(conn.roll_back().await, Err(Error::Transaction(_))));
    assert!(matches!(conn.after_commit(|| Ok(())), Err(Error::Transaction(_))));
    assert!(matches!(conn.after_rollback(|| Ok(())), Err(Error::Transaction(_))));
    assert_eq!(conn.transaction_level(), 0);

    Ok(())
}
