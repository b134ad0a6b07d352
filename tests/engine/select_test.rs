// tests/engine/select_test.rs
#[path = "../support/mod.rs"]
mod support;

use heron::prelude::*;
use support::{ids, library, library_db};

fn books_after(reg: &Registry, year: i64) -> JoinNode {
    JoinNode::new(reg, "Author", "books")
        .unwrap()
        .filter(Evaluation::gt("year", year))
}

#[test]
fn test_strategies_return_the_same_roots() {
    let reg = library();
    let conn = library_db();

    for strategy in [Strategy::Exists, Strategy::In, Strategy::TwoQuery] {
        let authors = Select::new(&reg, "Author")
            .unwrap()
            .join(books_after(&reg, 1966))
            .strategy(strategy)
            .execute(&conn)
            .unwrap();
        assert_eq!(ids(&authors), vec![1], "{strategy:?}");

        // The join filter picks roots; it does not trim what is loaded.
        let books = authors[0].many("books").unwrap();
        assert_eq!(books.len(), 2, "{strategy:?}");
    }
}

#[test]
fn test_unrestricted_select_keeps_roots_without_relations() {
    let reg = library();
    let conn = library_db();
    let authors = Select::new(&reg, "Author")
        .unwrap()
        .join(JoinNode::new(&reg, "Author", "books").unwrap())
        .order_by("name", SortDir::Asc)
        .execute(&conn)
        .unwrap();
    assert_eq!(ids(&authors), vec![3, 4, 2, 1, 5]);
    assert!(authors[0].related("books").unwrap().is_loaded());
    assert!(authors[0].many("books").unwrap().is_empty());
}

#[test]
fn test_on_clause_limits_loaded_rows() {
    let reg = library();
    let conn = library_db();
    let authors = Select::new(&reg, "Author")
        .unwrap()
        .filter(Evaluation::eq("name", "Le Guin"))
        .join(
            JoinNode::new(&reg, "Author", "books")
                .unwrap()
                .on(Evaluation::lt("year", 1970i64)),
        )
        .execute(&conn)
        .unwrap();
    assert_eq!(ids(&authors), vec![1]);
    let titles: Vec<Value> = authors[0]
        .many("books")
        .unwrap()
        .iter()
        .map(|b| b.get("title").unwrap())
        .collect();
    assert_eq!(titles, vec![Value::from("Earthsea")]);
}

#[test]
fn test_cache_keeps_one_instance_per_row() {
    let reg = library();
    let conn = library_db();
    let mut cache = FirstLevelCache::new();

    let books = Select::new(&reg, "Book")
        .unwrap()
        .join(JoinNode::new(&reg, "Book", "author").unwrap())
        .execute_with(&conn, &mut cache)
        .unwrap();
    let earthsea = books.iter().find(|b| b.id() == Some(Key::Int(10))).unwrap();
    let dispossessed = books.iter().find(|b| b.id() == Some(Key::Int(11))).unwrap();
    let a = earthsea.one("author").unwrap().unwrap();
    let b = dispossessed.one("author").unwrap().unwrap();
    assert!(a.same(&b));

    let authors = Select::new(&reg, "Author")
        .unwrap()
        .filter(Evaluation::id_in([1i64]))
        .execute_with(&conn, &mut cache)
        .unwrap();
    assert!(authors[0].same(&a));
}

#[test]
fn test_join_profiles_and_join_all() {
    let reg = library();
    let conn = library_db();

    let authors = Select::new(&reg, "Author")
        .unwrap()
        .filter(Evaluation::id_in([1i64]))
        .join_profiles(&["catalog"])
        .unwrap()
        .execute(&conn)
        .unwrap();
    let books = authors[0].many("books").unwrap();
    let earthsea = books.iter().find(|b| b.id() == Some(Key::Int(10))).unwrap();
    assert_eq!(earthsea.many("tags").unwrap().len(), 2);

    // Author.books -> Book.author -> Author.books repeats; traversal stops there.
    let everything = Select::new(&reg, "Author").unwrap().join_all().unwrap();
    assert_eq!(everything.execute(&conn).unwrap().len(), 5);
}

#[test]
fn test_count_and_ids() {
    let reg = library();
    let conn = library_db();
    let select = Select::new(&reg, "Author")
        .unwrap()
        .join(JoinNode::new(&reg, "Author", "books").unwrap().filter(Evaluation::like("title", "%e%")));
    assert_eq!(select.count(&conn).unwrap(), 2);
    assert_eq!(
        select.clone().order_by("name", SortDir::Desc).ids(&conn).unwrap(),
        vec![Key::Int(1), Key::Int(2)]
    );
}

#[test]
fn test_natural_key_match_with_missing_value() {
    let reg = library();
    let conn = library_db();
    conn.execute_batch("INSERT INTO tag (id, label) VALUES (102, NULL);").unwrap();

    let reference = Object::new(reg.entity("Tag").unwrap());
    let select = Select::new(&reg, "Tag")
        .unwrap()
        .filter(Evaluation::natural_key_match(&reference).unwrap());
    assert!(select.statements(Dialect::Sqlite).unwrap()[0].sql.contains("IS NULL"));
    assert_eq!(select.ids(&conn).unwrap(), vec![Key::Int(102)]);
}

#[test]
fn test_execution_error_carries_statement() {
    let reg = library();
    let conn = SqliteConnection::open_in_memory().unwrap();
    let err = Select::new(&reg, "Author").unwrap().execute(&conn).unwrap_err();
    match err {
        Error::Execution(e) => assert!(e.statement.sql.contains("FROM \"author\"")),
        other => panic!("unexpected error: {other}"),
    }
}
