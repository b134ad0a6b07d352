// tests/engine/delete_test.rs
#[path = "../support/mod.rs"]
mod support;

use heron::prelude::*;
use support::{library, library_db, scalar};

#[test]
fn test_delete_through_join_restriction() {
    let reg = library();
    let conn = library_db();
    let removed = Delete::new(&reg, "Author")
        .unwrap()
        .join(
            JoinNode::new(&reg, "Author", "books")
                .unwrap()
                .filter(Evaluation::lt("year", 1966i64)),
        )
        .execute(&conn)
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM author WHERE id = 2"), 0);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM author"), 4);
}

#[test]
fn test_delete_elements_in_batches() {
    let reg = library();
    let conn = library_db();
    let descriptor = reg.entity("Author").unwrap();
    let doomed: Vec<Object> = [1i64, 3, 5].into_iter().map(|id| Object::with_id(descriptor.clone(), id)).collect();
    let options = ExecutionOptions {
        max_parameters: Some(2),
        ..Default::default()
    };
    let delete = Delete::new(&reg, "Author").unwrap().elements(&doomed).options(options);
    assert_eq!(delete.statements(Dialect::Sqlite).unwrap().len(), 2);
    assert_eq!(delete.execute(&conn).unwrap(), 3);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM author"), 2);
}

#[test]
fn test_elements_and_filter_combine() {
    let reg = library();
    let conn = library_db();
    let descriptor = reg.entity("Author").unwrap();
    let candidates: Vec<Object> = [1i64, 2].into_iter().map(|id| Object::with_id(descriptor.clone(), id)).collect();
    let removed = Delete::new(&reg, "Author")
        .unwrap()
        .elements(&candidates)
        .filter(Evaluation::eq("name", "Herbert"))
        .execute(&conn)
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM author WHERE id = 1"), 1);
}

#[test]
fn test_unrestricted_delete_needs_opt_in() {
    let reg = library();
    let conn = library_db();
    assert_eq!(Delete::new(&reg, "Book").unwrap().execute(&conn).unwrap(), 0);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM book"), 3);

    assert_eq!(Delete::new(&reg, "Book").unwrap().unrestricted().execute(&conn).unwrap(), 3);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM book"), 0);
}
