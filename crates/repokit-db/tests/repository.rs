//! Repository operations against an in-memory SQLite database.

mod common;

use common::{database, Author, Book, Note, Widget, WidgetPrice};
use repokit_db::{
    DbError, Filter, IsolationLevel, QueryError, SeekPage, Specification, Tracking, Value,
};

/// Seeds through its own unit of work; the returned one starts clean.
async fn seeded(n: usize) -> (repokit_db::Database, repokit_db::UnitOfWork) {
    let db = database().await;
    let seed = db.unit_of_work();
    seed.repository::<Widget>()
        .add_range(Widget::numbered(n))
        .await
        .unwrap();
    seed.complete().await.unwrap();
    let uow = db.unit_of_work();
    (db, uow)
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_add_then_get_by_key() {
    let db = database().await;
    let uow = db.unit_of_work();
    let widgets = uow.repository::<Widget>();

    let widget = Widget::new("w1", "sprocket", "tools", 250);
    let key = widgets.add(widget.clone()).await.unwrap().get().unwrap();
    assert_eq!(key, "w1");

    // Staged only until the unit of work completes.
    assert_eq!(widgets.get_by_key(&key).await.unwrap(), None);

    assert_eq!(uow.complete().await.unwrap(), 1);
    assert_eq!(widgets.get_by_key(&key).await.unwrap(), Some(widget));
}

#[tokio::test]
async fn test_add_without_key_is_rejected() {
    let db = database().await;
    let uow = db.unit_of_work();
    let widgets = uow.repository::<Widget>();

    let result = widgets.add(Widget::new("", "nameless", "tools", 1)).await;

    assert!(matches!(result, Err(DbError::MissingKey { .. })));
    assert!(!uow.has_changes().await);
}

#[tokio::test]
async fn test_add_range_is_all_or_nothing() {
    let db = database().await;
    let uow = db.unit_of_work();
    let widgets = uow.repository::<Widget>();

    assert_eq!(widgets.add_range(Vec::new()).await.unwrap(), 0);

    let mixed = vec![Widget::new("w1", "a", "x", 1), Widget::new("", "b", "x", 2)];
    assert!(matches!(
        widgets.add_range(mixed).await,
        Err(DbError::MissingKey { .. })
    ));
    assert_eq!(uow.context().pending_count().await, 0);
}

#[tokio::test]
async fn test_update_and_delete() {
    let (_db, uow) = seeded(3).await;
    let widgets = uow.repository::<Widget>();

    let mut w2 = widgets.get_by_key(&"w02".to_string()).await.unwrap().unwrap();
    w2.price_cents = 999;
    widgets.update(w2).await.unwrap();

    let w3 = widgets.get_by_key(&"w03".to_string()).await.unwrap().unwrap();
    widgets.delete(w3).await.unwrap();

    assert_eq!(widgets.save().await.unwrap(), 2);

    let w2 = widgets.get_by_key(&"w02".to_string()).await.unwrap().unwrap();
    assert_eq!(w2.price_cents, 999);
    assert_eq!(widgets.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_of_detached_entity() {
    let (db, uow) = seeded(2).await;
    let widgets = uow.repository::<Widget>();

    // Read elsewhere, never attached here.
    let mut w1 = db
        .unit_of_work()
        .repository::<Widget>()
        .get_by_key(&"w01".to_string())
        .await
        .unwrap()
        .unwrap();
    assert!(!uow.context().is_attached::<Widget>(&w1.id).await);

    w1.name = "renamed".into();
    widgets.update(w1).await.unwrap();
    assert_eq!(uow.complete().await.unwrap(), 1);

    let w1 = widgets.get_by_key(&"w01".to_string()).await.unwrap().unwrap();
    assert_eq!(w1.name, "renamed");
}

#[tokio::test]
async fn test_bulk_insert_runs_immediately() {
    let db = database().await;
    let uow = db.unit_of_work();
    let widgets = uow.repository::<Widget>();

    assert_eq!(widgets.bulk_insert(Vec::new()).await.unwrap(), 0);
    assert_eq!(widgets.bulk_insert(Widget::numbered(25)).await.unwrap(), 25);

    assert!(!uow.has_changes().await);
    assert_eq!(widgets.count().await.unwrap(), 25);
}

#[tokio::test]
async fn test_bulk_insert_across_several_statements() {
    let db = database().await;
    let uow = db.unit_of_work();
    let widgets = uow.repository::<Widget>();

    let inserted = widgets
        .bulk_insert_in_chunks(Widget::numbered(25), 4)
        .await
        .unwrap();
    assert_eq!(inserted, 25);
    assert_eq!(widgets.count().await.unwrap(), 25);

    // Zero is treated as one row per statement.
    let more: Vec<_> = (26..=28)
        .map(|i| Widget::new(&format!("w{i}"), &format!("widget {i}"), "odd", 1))
        .collect();
    assert_eq!(widgets.bulk_insert_in_chunks(more, 0).await.unwrap(), 3);
}

#[tokio::test]
async fn test_bulk_insert_failure_in_later_statement_rolls_back_all() {
    let db = database().await;
    let uow = db.unit_of_work();
    let widgets = uow.repository::<Widget>();

    let mut rows = Widget::numbered(10);
    // Same id as the first row, landing in the third statement.
    rows.push(Widget::new("w01", "duplicate", "odd", 1));

    let result = widgets.bulk_insert_in_chunks(rows, 4).await;
    assert!(matches!(result, Err(DbError::UniqueViolation { .. })));
    assert_eq!(widgets.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_generated_key_is_assigned_on_complete() {
    let db = database().await;
    let uow = db.unit_of_work();
    let notes = uow.repository::<Note>();

    let first = notes.add(Note::new("first")).await.unwrap();
    let second = notes.add(Note::new("second")).await.unwrap();
    assert_eq!(first.get(), None);
    assert!(!second.is_assigned());

    assert_eq!(uow.complete().await.unwrap(), 2);

    let first_id = first.get().unwrap();
    let second_id = second.get().unwrap();
    assert_ne!(first_id, second_id);
    assert!(uow.context().is_attached::<Note>(&first_id).await);

    let stored = notes.get_by_key(&second_id).await.unwrap().unwrap();
    assert_eq!(stored.id, Some(second_id));
    assert_eq!(stored.body, "second");
}

#[tokio::test]
async fn test_generated_key_stays_unassigned_after_rollback() {
    let db = database().await;
    let uow = db.unit_of_work();

    let key = uow.repository::<Note>().add(Note::new("lost")).await.unwrap();
    // Fails the whole flush.
    uow.repository::<Book>()
        .add(Book::new(1, 99, "Orphan"))
        .await
        .unwrap();

    assert!(uow.complete().await.is_err());
    assert_eq!(key.get(), None);
    assert_eq!(uow.repository::<Note>().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_generated_keys_in_bulk_insert() {
    let db = database().await;
    let uow = db.unit_of_work();
    let notes = uow.repository::<Note>();

    let inserted = notes
        .bulk_insert(vec![Note::new("a"), Note::new("b"), Note::new("c")])
        .await
        .unwrap();
    assert_eq!(inserted, 3);

    let ids: Vec<i64> = notes
        .get_all_as(Tracking::NoTracking)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|n| n.id)
        .collect();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_update_where_and_delete_where() {
    let (_db, uow) = seeded(6).await;
    let widgets = uow.repository::<Widget>();

    let updated = widgets
        .update_where(
            Filter::eq("category", "even"),
            &[("category", Value::from("sale"))],
        )
        .await
        .unwrap();
    assert_eq!(updated, 3);
    assert_eq!(widgets.count_where(Filter::eq("category", "sale")).await.unwrap(), 3);

    let deleted = widgets
        .delete_where(Filter::lt("price_cents", 300_i64))
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let none = widgets
        .delete_where(Filter::eq("category", "missing"))
        .await
        .unwrap();
    assert_eq!(none, 0);
}

#[tokio::test]
async fn test_update_where_rejects_bad_assignments() {
    let (_db, uow) = seeded(1).await;
    let widgets = uow.repository::<Widget>();

    let empty = widgets.update_where(Filter::eq("id", "w01"), &[]).await;
    assert!(matches!(
        empty,
        Err(DbError::Query(QueryError::NoAssignments { .. }))
    ));

    let unknown = widgets
        .update_where(Filter::eq("id", "w01"), &[("colour", Value::from("red"))])
        .await;
    assert!(matches!(
        unknown,
        Err(DbError::Query(QueryError::UnknownColumn { .. }))
    ));
}

// =============================================================================
// Soft Delete
// =============================================================================

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let (_db, uow) = seeded(2).await;
    let widgets = uow.repository::<Widget>();
    let key = "w01".to_string();

    assert!(widgets.soft_delete(&key).await.unwrap());
    uow.complete().await.unwrap();

    let flagged = widgets.get_by_key(&key).await.unwrap().unwrap();
    assert!(flagged.is_deleted);
    assert_eq!(widgets.count_where(Filter::eq("is_deleted", false)).await.unwrap(), 1);

    assert!(widgets.restore(&key).await.unwrap());
    uow.complete().await.unwrap();
    assert!(!widgets.get_by_key(&key).await.unwrap().unwrap().is_deleted);
}

#[tokio::test]
async fn test_soft_delete_missing_key() {
    let (_db, uow) = seeded(1).await;
    let widgets = uow.repository::<Widget>();

    assert!(!widgets.soft_delete(&"nope".to_string()).await.unwrap());
    assert!(!uow.has_changes().await);
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_find_first_and_single() {
    let (_db, uow) = seeded(5).await;
    let widgets = uow.repository::<Widget>();

    let found = widgets.find(Filter::eq("category", "odd")).await.unwrap();
    assert_eq!(found.map(|w| w.id), Some("w01".to_string()));

    let first = widgets
        .first(Filter::gt("price_cents", 250_i64), &[], Tracking::NoTracking)
        .await
        .unwrap();
    assert_eq!(first.map(|w| w.id), Some("w03".to_string()));

    let single = widgets
        .single(Filter::eq("name", "widget 4"), &[], Tracking::Tracked)
        .await
        .unwrap();
    assert_eq!(single.map(|w| w.id), Some("w04".to_string()));

    let many = widgets
        .single(Filter::eq("category", "even"), &[], Tracking::Tracked)
        .await;
    assert!(matches!(many, Err(DbError::MultipleResults { .. })));

    let nothing = widgets.find(Filter::eq("category", "none")).await.unwrap();
    assert!(nothing.is_none());
}

#[tokio::test]
async fn test_tracking_modes() {
    let (_db, uow) = seeded(3).await;
    let widgets = uow.repository::<Widget>();
    let ctx = uow.context();
    let w01 = "w01".to_string();

    widgets.get_all_as(Tracking::NoTracking).await.unwrap();
    assert!(!ctx.is_attached::<Widget>(&w01).await);

    let all = widgets.get_all().await.unwrap();
    assert_eq!(all.len(), 3);
    for widget in &all {
        assert!(ctx.is_attached::<Widget>(&widget.id).await);
    }
}

#[tokio::test]
async fn test_exists_and_counts() {
    let (_db, uow) = seeded(7).await;
    let widgets = uow.repository::<Widget>();

    assert!(widgets.exists(Filter::eq("id", "w07")).await.unwrap());
    assert!(!widgets.exists(Filter::eq("id", "w08")).await.unwrap());

    assert_eq!(widgets.count().await.unwrap(), 7);
    assert_eq!(widgets.count_where(Filter::eq("category", "odd")).await.unwrap(), 4);

    let spec = Specification::new()
        .with_criteria(Filter::eq("category", "odd"))
        .apply_paging(0, 1);
    assert_eq!(widgets.count_matching(&spec).await.unwrap(), 4);
}

#[tokio::test]
async fn test_list_by_specification() {
    let (_db, uow) = seeded(6).await;
    let widgets = uow.repository::<Widget>();

    let spec = Specification::new()
        .with_criteria(Filter::eq("category", "even"))
        .order_by_descending("price_cents")
        .apply_paging(1, 2);
    let rows = widgets.list(&spec).await.unwrap();

    let ids: Vec<_> = rows.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["w04", "w02"]);
}

#[tokio::test]
async fn test_ascending_order_wins_over_descending() {
    let (_db, uow) = seeded(3).await;
    let widgets = uow.repository::<Widget>();

    let spec = Specification::new()
        .order_by("price_cents")
        .order_by_descending("price_cents");
    let rows = widgets.list(&spec).await.unwrap();

    assert_eq!(rows.first().map(|w| w.id.as_str()), Some("w01"));
}

#[tokio::test]
async fn test_unknown_column_never_reaches_sql() {
    let (_db, uow) = seeded(1).await;
    let widgets = uow.repository::<Widget>();

    let result = widgets
        .get_all_where(Filter::eq("1=1; DROP TABLE widgets; --", 1_i64))
        .await;
    assert!(matches!(
        result,
        Err(DbError::Query(QueryError::UnknownColumn { .. }))
    ));
    assert_eq!(widgets.count().await.unwrap(), 1);
}

// =============================================================================
// Paging
// =============================================================================

#[tokio::test]
async fn test_get_page() {
    let (_db, uow) = seeded(25).await;
    let widgets = uow.repository::<Widget>();

    let page = widgets.get_page(3, 10, None).await.unwrap();

    assert_eq!(page.total_count, 25);
    assert_eq!(page.page_index, 3);
    assert_eq!(page.page_size, 10);
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.items[0].id, "w21");
    assert_eq!(page.page_count(), 3);
    assert!(page.has_previous_page());
    assert!(!page.has_next_page());
}

#[tokio::test]
async fn test_get_page_clamps_bad_input() {
    let (_db, uow) = seeded(12).await;
    let widgets = uow.repository::<Widget>();

    let page = widgets.get_page(0, -5, None).await.unwrap();

    assert_eq!(page.page_index, 1);
    assert_eq!(page.page_size, 10);
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.items[0].id, "w01");
}

#[tokio::test]
async fn test_get_page_with_filter_and_spec() {
    let (_db, uow) = seeded(10).await;
    let widgets = uow.repository::<Widget>();

    let odd = widgets
        .get_page(2, 2, Some(Filter::eq("category", "odd")))
        .await
        .unwrap();
    assert_eq!(odd.total_count, 5);
    let ids: Vec<_> = odd.items.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["w05", "w07"]);

    // The specification's own paging is replaced by the page request.
    let spec = Specification::new()
        .with_criteria(Filter::eq("category", "even"))
        .order_by_descending("price_cents")
        .apply_paging(100, 100);
    let even = widgets.get_page_by_spec(1, 3, &spec).await.unwrap();
    assert_eq!(even.total_count, 5);
    let ids: Vec<_> = even.items.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["w10", "w08", "w06"]);
}

#[tokio::test]
async fn test_page_past_the_end_is_empty() {
    let (_db, uow) = seeded(3).await;
    let widgets = uow.repository::<Widget>();

    let page = widgets.get_page(5, 10, None).await.unwrap();
    assert_eq!(page.total_count, 3);
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_seek_forward_and_backward() {
    let (_db, uow) = seeded(7).await;
    let widgets = uow.repository::<Widget>();

    let first = widgets.seek(&SeekPage::first("id", 3), None).await.unwrap();
    let ids: Vec<_> = first.iter().map(|w| w.id.clone()).collect();
    assert_eq!(ids, vec!["w01", "w02", "w03"]);

    let next = widgets
        .seek(&SeekPage::after("id", ids[2].clone(), 3), None)
        .await
        .unwrap();
    let ids: Vec<_> = next.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["w04", "w05", "w06"]);

    let back = widgets
        .seek(&SeekPage::before("price_cents", 400_i64, 2), None)
        .await
        .unwrap();
    let ids: Vec<_> = back.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["w03", "w02"]);

    let filtered = widgets
        .seek(
            &SeekPage::after("id", "w01", 10),
            Some(Filter::eq("category", "odd")),
        )
        .await
        .unwrap();
    let ids: Vec<_> = filtered.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["w03", "w05", "w07"]);
}

// =============================================================================
// Projections
// =============================================================================

#[tokio::test]
async fn test_select_projections() {
    let (_db, uow) = seeded(4).await;
    let widgets = uow.repository::<Widget>();

    let prices: Vec<WidgetPrice> = widgets
        .select(&["name", "price_cents"], Some(Filter::eq("category", "even")))
        .await
        .unwrap();
    assert_eq!(
        prices,
        vec![
            WidgetPrice {
                name: "widget 2".into(),
                price_cents: 200
            },
            WidgetPrice {
                name: "widget 4".into(),
                price_cents: 400
            },
        ]
    );

    let page = widgets
        .select_page::<WidgetPrice>(&["name", "price_cents"], 2, 3, None)
        .await
        .unwrap();
    assert_eq!(page.total_count, 4);
    assert_eq!(page.items.len(), 1);

    let spec = Specification::new().order_by_descending("price_cents");
    let top: Vec<(String,)> = widgets.select_by_spec(&["id"], &spec).await.unwrap();
    assert_eq!(top.first().map(|t| t.0.as_str()), Some("w04"));

    let bad = widgets.select::<(String,)>(&["secret"], None).await;
    assert!(matches!(
        bad,
        Err(DbError::Query(QueryError::UnknownColumn { .. }))
    ));
}

// =============================================================================
// Includes
// =============================================================================

#[tokio::test]
async fn test_include_loads_related_rows() {
    let db = database().await;
    let uow = db.unit_of_work();
    let authors = uow.repository::<Author>();
    let books = uow.repository::<Book>();

    authors
        .add_range(vec![Author::new(1, "Le Guin"), Author::new(2, "Banks")])
        .await
        .unwrap();
    books
        .add_range(vec![
            Book::new(10, 1, "The Dispossessed"),
            Book::new(11, 2, "Excession"),
            Book::new(12, 1, "The Lathe of Heaven"),
        ])
        .await
        .unwrap();
    uow.complete().await.unwrap();

    let le_guin = authors
        .first(Filter::eq("id", 1_i64), &["books"], Tracking::NoTracking)
        .await
        .unwrap()
        .unwrap();
    let titles: Vec<_> = le_guin.books.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["The Dispossessed", "The Lathe of Heaven"]);

    let spec = Specification::new().include("books").order_by("id");
    let all = authors.list(&spec).await.unwrap();
    assert_eq!(all[1].books.len(), 1);

    let bad = authors
        .first(Filter::eq("id", 1_i64), &["publisher"], Tracking::NoTracking)
        .await;
    assert!(matches!(
        bad,
        Err(DbError::Query(QueryError::UnknownInclude { .. }))
    ));
}

#[tokio::test]
async fn test_projection_ignores_includes() {
    let db = database().await;
    let uow = db.unit_of_work();
    let authors = uow.repository::<Author>();

    authors
        .add_range(vec![Author::new(1, "Le Guin"), Author::new(2, "Banks")])
        .await
        .unwrap();
    uow.complete().await.unwrap();

    let spec = Specification::new().include("books").order_by("name");
    let names: Vec<(String,)> = authors.select_by_spec(&["name"], &spec).await.unwrap();
    assert_eq!(names, vec![("Banks".to_string(),), ("Le Guin".to_string(),)]);

    let unknown = Specification::new().include("publisher");
    let bad = authors.select_by_spec::<(String,)>(&["name"], &unknown).await;
    assert!(matches!(
        bad,
        Err(DbError::Query(QueryError::UnknownInclude { .. }))
    ));
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn test_execute_in_transaction_commits() {
    let (_db, uow) = seeded(3).await;
    let widgets = uow.repository::<Widget>();

    let moved = widgets
        .execute_in_transaction(IsolationLevel::Serializable, |conn| {
            Box::pin(async move {
                let n = sqlx::query("UPDATE widgets SET category = 'sale' WHERE price_cents < 300")
                    .execute(conn)
                    .await?
                    .rows_affected();
                Ok(n)
            })
        })
        .await
        .unwrap();

    assert_eq!(moved, 2);
    assert_eq!(widgets.count_where(Filter::eq("category", "sale")).await.unwrap(), 2);
}

#[tokio::test]
async fn test_execute_in_transaction_rolls_back_on_error() {
    let (_db, uow) = seeded(3).await;
    let widgets = uow.repository::<Widget>();

    let result: Result<(), DbError> = widgets
        .execute_in_transaction(IsolationLevel::ReadCommitted, |conn| {
            Box::pin(async move {
                sqlx::query("DELETE FROM widgets").execute(&mut *conn).await?;
                Err(DbError::Internal("abort".into()))
            })
        })
        .await;

    assert!(matches!(result, Err(DbError::Internal(_))));
    assert_eq!(widgets.count().await.unwrap(), 3);
}

// =============================================================================
// Escape Hatch
// =============================================================================

#[tokio::test]
async fn test_query_and_fetch() {
    let (_db, uow) = seeded(5).await;
    let widgets = uow.repository::<Widget>();

    let query = widgets
        .query()
        .filter(Filter::is_in("id", ["w02", "w04", "w09"]))
        .order_by_descending("id")
        .as_no_tracking();
    let rows = widgets.fetch(query).await.unwrap();

    let ids: Vec<_> = rows.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["w04", "w02"]);
    assert!(!uow.context().is_attached::<Widget>(&"w04".to_string()).await);
}
