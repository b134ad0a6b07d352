// tests/engine/paging_test.rs
#[path = "../support/mod.rs"]
mod support;

use heron::prelude::*;
use support::{ids, library, library_db};

fn paged(reg: &Registry) -> Select<'_> {
    Select::new(reg, "Author")
        .unwrap()
        .join(JoinNode::new(reg, "Author", "books").unwrap())
        .order_by("id", SortDir::Asc)
        .page(2, 2)
}

#[test]
fn test_pages_count_roots_not_rows() {
    let reg = library();
    let conn = library_db();

    let cases = [
        (Strategy::Auto, PagingMethod::LimitOffset),
        (Strategy::In, PagingMethod::LimitOffset),
        (Strategy::Exists, PagingMethod::LimitOffset),
        (Strategy::TwoQuery, PagingMethod::LimitOffset),
        (Strategy::Auto, PagingMethod::TwoQuery),
    ];
    for (strategy, method) in cases {
        let select = paged(&reg).strategy(strategy).paging_method(method);
        let authors = select.execute(&conn).unwrap();
        assert_eq!(ids(&authors), vec![3, 4], "{strategy:?} / {method:?}");
    }
}

#[test]
fn test_page_follows_requested_order() {
    let reg = library();
    let conn = library_db();
    let authors = Select::new(&reg, "Author")
        .unwrap()
        .order_by("name", SortDir::Desc)
        .page(1, 3)
        .execute(&conn)
        .unwrap();
    // Wolfe, Le Guin, Herbert, Butler, Banks
    assert_eq!(ids(&authors), vec![1, 2, 4]);
}

#[test]
fn test_client_side_paging_slices_ids() {
    let reg = library();
    let conn = library_db();
    let select = paged(&reg).paging_method(PagingMethod::TwoQuery);
    assert_eq!(select.resolve(Dialect::Sqlite).0, Strategy::TwoQuery);
    assert!(!select.statements(Dialect::Sqlite).unwrap()[0].sql.contains("LIMIT"));
    assert_eq!(select.ids(&conn).unwrap(), vec![Key::Int(3), Key::Int(4)]);
}

#[test]
fn test_page_past_the_end_is_empty() {
    let reg = library();
    let conn = library_db();
    let authors = paged(&reg).page(10, 2).execute(&conn).unwrap();
    assert!(authors.is_empty());
}

#[test]
fn test_limit_without_offset() {
    let reg = library();
    let conn = library_db();
    let authors = Select::new(&reg, "Author")
        .unwrap()
        .filter(Evaluation::ne("name", "Le Guin"))
        .limit(2)
        .execute(&conn)
        .unwrap();
    assert_eq!(ids(&authors), vec![2, 3]);
}
