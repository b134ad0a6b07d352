// tests/evaluation/evaluation_test.rs
#[path = "../support/mod.rs"]
mod support;

use heron::prelude::*;
use support::{ids, library, library_db};

fn authors(reg: &Registry, conn: &SqliteConnection, filter: Evaluation) -> Vec<i64> {
    let found = Select::new(reg, "Author").unwrap().filter(filter).execute(conn).unwrap();
    ids(&found)
}

#[test]
fn test_comparisons() {
    let reg = library();
    let conn = library_db();
    assert_eq!(authors(&reg, &conn, Evaluation::ge("id", 4i64)), vec![4, 5]);
    assert_eq!(authors(&reg, &conn, Evaluation::like("name", "B%")), vec![3, 4]);
    assert_eq!(
        authors(&reg, &conn, Evaluation::compare("name", Operator::NotLike, "%e%")),
        vec![3]
    );
    assert_eq!(authors(&reg, &conn, Evaluation::ne("name", Value::Null)).len(), 5);
}

#[test]
fn test_or_and_nesting() {
    let reg = library();
    let conn = library_db();
    let filter = Evaluation::and(vec![
        Evaluation::or(vec![Evaluation::eq("name", "Banks"), Evaluation::eq("name", "Wolfe")]),
        Evaluation::lt("id", 5i64),
    ]);
    assert_eq!(authors(&reg, &conn, filter), vec![3]);
}

#[test]
fn test_empty_groups_do_not_restrict() {
    let reg = library();
    let conn = library_db();
    assert_eq!(authors(&reg, &conn, Evaluation::or(vec![])).len(), 5);
    assert_eq!(authors(&reg, &conn, Evaluation::id_in(Vec::<i64>::new())).len(), 5);
    assert_eq!(authors(&reg, &conn, Evaluation::is_in("name", Vec::<&str>::new())).len(), 5);
}

#[test]
fn test_in_lists() {
    let reg = library();
    let conn = library_db();
    assert_eq!(authors(&reg, &conn, Evaluation::id_in([5i64, 1, 5])), vec![1, 5]);
    assert_eq!(
        authors(&reg, &conn, Evaluation::is_in("name", ["Butler", "Nobody"])),
        vec![4]
    );
}

#[test]
fn test_explicit_sql_inside_join_restriction() {
    let reg = library();
    let conn = library_db();
    let found = Select::new(&reg, "Author")
        .unwrap()
        .join(
            JoinNode::new(&reg, "Author", "books")
                .unwrap()
                .filter(Evaluation::explicit("{this}.year % 2 = :parity", [("parity", Value::from(1i64))])),
        )
        .execute(&conn)
        .unwrap();
    assert_eq!(ids(&found), vec![2]);
}

#[test]
fn test_cross_path_reaches_joined_columns() {
    let reg = library();
    let conn = library_db();
    let select = Select::new(&reg, "Book")
        .unwrap()
        .join(JoinNode::new(&reg, "Book", "author").unwrap());

    let by_author = select
        .clone()
        .filter(Evaluation::cross(
            CrossPath::new("Book", &["author"], "name"),
            Operator::Eq,
            "Herbert",
        ))
        .execute(&conn)
        .unwrap();
    assert_eq!(ids(&by_author), vec![12]);

    // Column against column: no book is titled after its author.
    let untitled = select
        .filter(Evaluation::compare(
            "title",
            Operator::Ne,
            CrossPath::new("Book", &["author"], "name"),
        ))
        .execute(&conn)
        .unwrap();
    assert_eq!(ids(&untitled), vec![10, 11, 12]);
}
