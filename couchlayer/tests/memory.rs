use couchlayer::{memory::InMemoryDriver, prelude::*};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Chicken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    name: String,
    eggs: u32,
}

impl Chicken {
    fn new(name: &str, eggs: u32) -> Self {
        Self {
            id: None,
            rev: None,
            name: name.to_string(),
            eggs,
        }
    }
}

async fn client(ctx: &Context) -> CouchClient {
    CouchClient::connect(ctx, &InMemoryDriver, "memory://").await.unwrap()
}

async fn database(ctx: &Context, name: &str) -> CouchDatabase {
    let client = client(ctx).await;
    client
        .create_db(ctx, name, &CreateDbOptions::default())
        .await
        .unwrap();

    client.db(ctx, name, &ServerOptions::default()).await.unwrap()
}

#[tokio::test]
async fn test_create_and_destroy_chicken() {
    let ctx = Context::background();
    let client = client(&ctx).await;

    client
        .create_db(&ctx, "chicken", &CreateDbOptions::default())
        .await
        .unwrap();
    assert!(client.db_exists(&ctx, "chicken", &ServerOptions::default()).await.unwrap());

    client.destroy_db(&ctx, "chicken", &ServerOptions::default()).await.unwrap();
    assert!(!client.db_exists(&ctx, "chicken", &ServerOptions::default()).await.unwrap());

    let err = client.destroy_db(&ctx, "missing", &ServerOptions::default()).await.unwrap_err();
    assert_eq!(err.status(), Status::NotFound);
}

#[tokio::test]
async fn test_memory_backend_statuses() {
    let ctx = Context::background();
    let client = client(&ctx).await;
    client
        .create_db(&ctx, "chicken", &CreateDbOptions::default())
        .await
        .unwrap();

    let err = client
        .create_db(&ctx, "chicken", &CreateDbOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Status::PreconditionFailed);

    let err = client.config(&ctx).await.unwrap_err();
    assert_eq!(err.status(), Status::NotImplemented);

    let info = client
        .server_info(&ctx, &ServerOptions::default())
        .await
        .unwrap();
    assert_eq!(info.vendor(), couchlayer::memory::VENDOR);
    assert!(client.capabilities().is_empty());
}

#[tokio::test]
async fn test_document_lifecycle() {
    let ctx = Context::background();
    let db = database(&ctx, "chicken").await;

    let rev = db
        .put(&ctx, "henrietta", &Chicken::new("Henrietta", 3), &WriteOptions::default())
        .await
        .unwrap();

    let hen: Chicken = db
        .get(&ctx, "henrietta", &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(hen.name, "Henrietta");
    assert_eq!(hen.rev.as_deref(), Some(rev.as_str()));

    let stale = db
        .put(&ctx, "henrietta", &Chicken::new("Henrietta", 4), &WriteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(stale.status(), Status::Conflict);

    let updated = Chicken { eggs: 4, ..hen };
    let rev = db
        .put(&ctx, "henrietta", &updated, &WriteOptions::default())
        .await
        .unwrap();

    let (id, _) = db
        .create_doc(&ctx, &Chicken::new("Ginger", 1), &WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(id.len(), 32);

    let info = db.info(&ctx, &ServerOptions::default()).await.unwrap();
    assert_eq!(info.doc_count, 2);

    db.delete(&ctx, "henrietta", &rev, &WriteOptions::default())
        .await
        .unwrap();
    let err = db
        .get_raw(&ctx, "henrietta", &GetOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Status::NotFound);
    assert_eq!(db.info(&ctx, &ServerOptions::default()).await.unwrap().deleted_count, 1);
}

#[tokio::test]
async fn test_all_docs_listing() {
    let ctx = Context::background();
    let db = database(&ctx, "chicken").await;
    for name in ["c", "a", "b"] {
        db.put(&ctx, name, &Chicken::new(name, 0), &WriteOptions::default())
            .await
            .unwrap();
    }

    let options = ViewOptions {
        include_docs: true,
        skip: 1,
        ..Default::default()
    };
    let mut rows = db.all_docs(&ctx, &options).await.unwrap();
    assert_eq!(rows.inner().total_rows(), Some(3));
    assert_eq!(rows.inner().offset(), 1);

    let row = rows.next().await.unwrap().unwrap();
    assert_eq!(row.id, "b");
    assert_eq!(row.doc.unwrap()["name"], "b");

    let rest = rows.collect().await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, "c");
}

#[tokio::test]
async fn test_bulk_results_follow_input_order() {
    let ctx = Context::background();
    let db = database(&ctx, "chicken").await;
    db.put(&ctx, "taken", &json!({}), &WriteOptions::default())
        .await
        .unwrap();

    let docs = vec![
        json!({ "_id": "first" }),
        json!({ "_id": "taken" }),
        json!({ "_id": "_illegal" }),
        json!({ "name": "anonymous" }),
        json!({ "_id": "last" }),
    ];
    let results = db
        .bulk_docs(&ctx, &docs, &WriteOptions::default())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(results.len(), docs.len());
    assert_eq!(results[0].id, "first");
    assert!(results[0].is_ok());
    assert_eq!(results[1].status(), Some(Status::Conflict));
    assert_eq!(results[2].status(), Some(Status::BadRequest));
    assert!(results[3].is_ok());
    assert_eq!(results[4].id, "last");
    assert!(results[4].rev.starts_with("1-"));
}

#[tokio::test]
async fn test_continuous_changes_cancelled_after_k_records() {
    const K: usize = 3;

    let ctx = Context::background();
    let db = database(&ctx, "chicken").await;

    let feed_ctx = ctx.child();
    let options = ChangesOptions {
        feed: FeedMode::Continuous,
        ..Default::default()
    };
    let mut changes = db.changes(&feed_ctx, &options).await.unwrap();

    let writer = db.clone();
    let write_ctx = ctx.clone();
    let producer = tokio::spawn(async move {
        for i in 0..K {
            writer
                .put(&write_ctx, &format!("hen-{i}"), &json!({ "i": i }), &WriteOptions::default())
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let mut seen = Vec::new();
    while seen.len() < K {
        let change = changes.next().await.unwrap().unwrap();
        seen.push(change.id);
    }
    producer.await.unwrap();
    feed_ctx.cancel();

    let err = changes.next().await.unwrap_err();
    assert_eq!(err.status(), Status::Cancelled);
    assert!(changes.is_closed());
    assert!(changes.close().is_ok());
    assert_eq!(seen, ["hen-0", "hen-1", "hen-2"]);
}

#[tokio::test]
async fn test_changes_stream() {
    let ctx = Context::background();
    let db = database(&ctx, "chicken").await;
    for id in ["a", "b"] {
        db.put(&ctx, id, &json!({}), &WriteOptions::default())
            .await
            .unwrap();
    }

    let ids: Vec<String> = db
        .changes(&ctx, &ChangesOptions::default())
        .await
        .unwrap()
        .into_stream()
        .map(|change| change.unwrap().id)
        .collect()
        .await;

    assert_eq!(ids, ["a", "b"]);
}

#[tokio::test]
async fn test_changes_options_from_bag() {
    let bag: OptionBag = json!({ "feed": "longpoll", "since": "now", "timeout": 10, "style": "all_docs" })
        .as_object()
        .cloned()
        .unwrap();
    let options = ChangesOptions::from_bag(&bag).unwrap();
    assert_eq!(options.feed, FeedMode::Longpoll);

    let ctx = Context::background();
    let db = database(&ctx, "chicken").await;
    db.put(&ctx, "before", &json!({}), &WriteOptions::default())
        .await
        .unwrap();

    // Nothing is written after "now", so the longpoll times out empty.
    let changes = db.changes(&ctx, &options).await.unwrap();
    assert!(changes.collect().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_attachments() {
    let ctx = Context::background();
    let db = database(&ctx, "chicken").await;

    let rev = db
        .put_attachment(&ctx, "henrietta", "", NewAttachment::new("photo.png", "image/png", vec![1, 2, 3]), &WriteOptions::default())
        .await
        .unwrap();

    let att = db
        .get_attachment(&ctx, "henrietta", None, "photo.png")
        .await
        .unwrap();
    assert_eq!(att.body, [1, 2, 3]);
    assert_eq!(att.content_type, "image/png");

    let err = db
        .get_attachment(&ctx, "henrietta", Some("1-stale"), "photo.png")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Status::NotFound);

    db.delete_attachment(&ctx, "henrietta", &rev, "photo.png", &WriteOptions::default())
        .await
        .unwrap();
    let err = db
        .get_attachment(&ctx, "henrietta", None, "photo.png")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Status::NotFound);
}

#[tokio::test]
async fn test_security_round_trip() {
    let ctx = Context::background();
    let db = database(&ctx, "chicken").await;
    assert_eq!(db.security(&ctx, &ServerOptions::default()).await.unwrap(), Security::default());

    let mut security = Security::default();
    security.admins.names.push("bob".into());
    security.members.roles.push("farmers".into());

    db.set_security(&ctx, &security, &WriteOptions::default()).await.unwrap();
    assert_eq!(db.security(&ctx, &ServerOptions::default()).await.unwrap(), security);
}

#[tokio::test]
async fn test_handle_to_destroyed_database() {
    let ctx = Context::background();
    let client = client(&ctx).await;
    client
        .create_db(&ctx, "chicken", &CreateDbOptions::default())
        .await
        .unwrap();
    let db = client.db(&ctx, "chicken", &ServerOptions::default()).await.unwrap();

    client.destroy_db(&ctx, "chicken", &ServerOptions::default()).await.unwrap();

    let err = db.info(&ctx, &ServerOptions::default()).await.unwrap_err();
    assert_eq!(err.status(), Status::NotFound);
}

#[tokio::test]
async fn test_cancelled_context() {
    let ctx = Context::background();
    let client = client(&ctx).await;
    ctx.cancel();

    let err = client
        .all_dbs(&ctx, &AllDbsOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Status::Cancelled);

    let ctx = Context::background().with_timeout(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(1)).await;
    let err = client
        .all_dbs(&ctx, &AllDbsOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Status::Cancelled);
}

#[tokio::test]
async fn test_default_registry() {
    let ctx = Context::background();
    let registry = couchlayer::default_registry().unwrap();
    assert_eq!(registry.names(), ["memory"]);

    let client = registry.connect(&ctx, "memory", "").await.unwrap();
    assert!(client.all_dbs(&ctx, &AllDbsOptions::default()).await.unwrap().is_empty());

    let err = registry.connect(&ctx, "couch", "").await.unwrap_err();
    assert_eq!(err.status(), Status::NotFound);
}
