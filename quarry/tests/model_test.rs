use quarry::{Connection, FromRow, Model, Row, Value};

#[derive(Debug, Clone, Model, FromRow, PartialEq)]
#[orm(table = "posts")]
struct Post {
    #[orm(primary_key, skip)]
    id: i64,
    title: String,
    #[orm(column = "view_count")]
    views: i64,
    #[orm(soft_delete)]
    deleted_at: Option<String>,
}

#[derive(Debug, Clone, Model, FromRow)]
struct BlogAuthor {
    #[orm(primary_key, column = "author_id", skip)]
    id: i64,
    name: String,
}

async fn blog_connection() -> Result<Connection, quarry::Error> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut conn = Connection::connect("sqlite::memory:").await?;
    conn.statement(
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL, view_count INTEGER NOT NULL, deleted_at TEXT)",
    )
    .await?;
    conn.statement("CREATE TABLE blog_author (author_id INTEGER PRIMARY KEY, name TEXT NOT NULL)").await?;
    Ok(conn)
}

fn post(title: &str, views: i64) -> Post {
    Post { id: 0, title: title.to_string(), views, deleted_at: None }
}

#[test]
fn test_derived_metadata() {
    assert_eq!(Post::table_name(), "posts");
    assert_eq!(Post::primary_key(), "id");
    assert_eq!(Post::soft_delete_column(), Some("deleted_at"));

    assert_eq!(BlogAuthor::table_name(), "blog_author");
    assert_eq!(BlogAuthor::primary_key(), "author_id");
    assert_eq!(BlogAuthor::soft_delete_column(), None);
}

#[test]
fn test_to_row_skips_and_renames() {
    let row = post("Hello", 3).to_row();
    assert_eq!(row.columns().collect::<Vec<_>>(), vec!["title", "view_count", "deleted_at"]);
    assert_eq!(row.get("deleted_at"), Some(&Value::Null));
}

#[test]
fn test_from_row_reads_renamed_columns() -> Result<(), quarry::Error> {
    let row = Row::new().with("id", 4).with("title", "Hi").with("view_count", 9).with("deleted_at", Value::Null);
    let post = Post::from_row(&row)?;
    assert_eq!(post, Post { id: 4, title: "Hi".to_string(), views: 9, deleted_at: None });

    let incomplete = Row::new().with("id", 4);
    assert!(matches!(Post::from_row(&incomplete), Err(quarry::Error::InvalidData(_))));
    Ok(())
}

#[tokio::test]
async fn test_model_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = blog_connection().await?;

    conn.query().insert_model(&post("First", 10)).await?;
    conn.model::<Post>().insert_model(&post("Second", 20)).await?;

    let posts: Vec<Post> = conn.model::<Post>().order_by_desc("view_count").get_as().await?;
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].title, "Second");
    assert_eq!(posts[1].views, 10);

    let found: Option<Post> = conn.model::<Post>().find_as(posts[1].id).await?;
    assert_eq!(found.map(|p| p.title), Some("First".to_string()));

    let author_id = conn.model::<BlogAuthor>().insert_get_id(BlogAuthor { id: 0, name: "Ann".into() }.to_row()).await?;
    let author: Option<BlogAuthor> = conn.model::<BlogAuthor>().find_as(author_id).await?;
    assert_eq!(author.map(|a| a.name), Some("Ann".to_string()));

    println!("Model round trip test passed!");
    Ok(())
}

#[tokio::test]
async fn test_soft_delete_restore() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = blog_connection().await?;
    conn.model::<Post>().insert_model(&post("Draft", 0)).await?;
    conn.model::<Post>().insert_model(&post("Live", 5)).await?;

    conn.model::<Post>().where_eq("title", "Draft").update(Row::new().with("deleted_at", "2024-01-01 00:00:00")).await?;
    assert_eq!(conn.model::<Post>().where_not_null("deleted_at").count().await?, 1);

    let restored = conn.model::<Post>().where_eq("title", "Draft").restore().await?;
    assert_eq!(restored, 1);

    let draft: Option<Post> = conn.model::<Post>().where_eq("title", "Draft").first_as().await?;
    assert_eq!(draft.and_then(|p| p.deleted_at), None);
    assert_eq!(conn.model::<Post>().where_null("deleted_at").count().await?, 2);

    // Tables without a soft-delete column cannot be restored.
    let result = conn.table("posts").restore().await;
    assert!(matches!(result, Err(quarry::Error::InvalidArgument(_))));

    println!("Soft delete restore test passed!");
    Ok(())
}

#[tokio::test]
async fn test_paginated_rows_hydrate() -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = blog_connection().await?;
    for i in 1..=7 {
        conn.model::<Post>().insert_model(&post(&format!("Post {}", i), i)).await?;
    }

    let page = quarry::Pagination::new(2, 5).paginate(conn.model::<Post>().oldest_by("id")).await?.hydrate::<Post>()?;
    assert_eq!(page.total, 7);
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[0].title, "Post 6");

    Ok(())
}
