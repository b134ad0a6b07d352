// tests/engine/serialized_test.rs
#[path = "../support/mod.rs"]
mod support;

use heron::prelude::*;
use support::{ids, library, library_db};

#[test]
fn test_document_executes_like_the_builder() {
    let reg = library();
    let conn = library_db();
    let select = Select::new(&reg, "Author")
        .unwrap()
        .filter(Evaluation::or(vec![
            Evaluation::eq("name", "Le Guin"),
            Evaluation::eq("name", "Herbert"),
        ]))
        .join(
            JoinNode::new(&reg, "Author", "books")
                .unwrap()
                .child(JoinNode::new(&reg, "Book", "tags").unwrap().filter(Evaluation::eq("label", "classic"))),
        )
        .order_by("name", SortDir::Asc);

    let json = select.to_json().unwrap();
    let rebuilt = Select::from_json(&reg, &json).unwrap();
    assert_eq!(
        rebuilt.statements(Dialect::Sqlite).unwrap(),
        select.statements(Dialect::Sqlite).unwrap()
    );
    assert_eq!(ids(&rebuilt.execute(&conn).unwrap()), vec![2, 1]);
}

#[test]
fn test_hand_written_document() {
    let reg = library();
    let conn = library_db();
    let json = r#"{
        "target": "Book",
        "joins": [{"relation": "author", "where": {"kind": "like", "field": "name", "pattern": "Le%"}}],
        "order_by": [{"field": "year", "dir": "desc"}],
        "page": {"limit": 1}
    }"#;
    // "like" is an operator, not an evaluation kind.
    assert!(Select::from_json(&reg, json).is_err());

    let json = r#"{
        "target": "Book",
        "joins": [{"relation": "author", "where": {"kind": "comparison", "field": "name", "operator": "like", "operand": {"value": "Le%"}}}],
        "order_by": [{"field": "year", "dir": "desc"}],
        "page": {"limit": 1}
    }"#;
    let books = Select::from_json(&reg, json).unwrap().execute(&conn).unwrap();
    assert_eq!(ids(&books), vec![11]);
}

#[test]
fn test_cross_path_survives_round_trip() {
    let reg = library();
    let conn = library_db();
    let select = Select::new(&reg, "Author")
        .unwrap()
        .join(JoinNode::new(&reg, "Author", "books").unwrap())
        .filter(Evaluation::cross(
            CrossPath::new("Author", &["books"], "title"),
            Operator::Eq,
            "Dune",
        ));
    let rebuilt = Select::from_json(&reg, &select.to_json().unwrap()).unwrap();
    assert_eq!(ids(&rebuilt.execute(&conn).unwrap()), vec![2]);

    let stale = select.to_json().unwrap().replace("\"title\"", "\"subtitle\"");
    assert!(matches!(
        Select::from_json(&reg, &stale).unwrap_err(),
        Error::SerializedQuery(_)
    ));
}
