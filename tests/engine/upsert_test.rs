// tests/engine/upsert_test.rs
#[path = "../support/mod.rs"]
mod support;

use heron::prelude::*;
use support::{empty_library_db, library, library_db, scalar};

fn author(reg: &Registry, id: i64, name: &str) -> Object {
    let a = Object::with_id(reg.entity("Author").unwrap(), id);
    a.set("name", name).unwrap();
    a
}

fn book(reg: &Registry, id: i64, title: &str, year: i64) -> Object {
    let b = Object::with_id(reg.entity("Book").unwrap(), id);
    b.set("title", title).unwrap();
    b.set("year", year).unwrap();
    b
}

fn tag(reg: &Registry, label: &str) -> Object {
    let t = Object::new(reg.entity("Tag").unwrap());
    t.set("label", label).unwrap();
    t
}

#[test]
fn test_insert_then_update() {
    let reg = library();
    let conn = empty_library_db();
    let authors: Vec<Object> = (1..=3).map(|i| author(&reg, i, &format!("author {i}"))).collect();

    let summary = Upsert::new(&reg, "Author")
        .unwrap()
        .elements(&authors)
        .force_insert()
        .execute(&conn)
        .unwrap();
    assert_eq!(summary.inserted, 3);
    // Assigned ids batch into one multi-row insert.
    assert_eq!(summary.statements, 1);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM author"), 3);

    authors[1].set("name", "renamed").unwrap();
    let summary = Upsert::new(&reg, "Author")
        .unwrap()
        .element(&authors[1])
        .execute(&conn)
        .unwrap();
    assert_eq!(summary.updated, 1);
    let name: String = conn
        .inner()
        .query_row("SELECT name FROM author WHERE id = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(name, "renamed");
}

#[test]
fn test_generated_ids_are_written_back() {
    let reg = library();
    let conn = library_db();
    let fresh = tag(&reg, "space opera");
    Upsert::new(&reg, "Tag").unwrap().element(&fresh).execute(&conn).unwrap();
    assert_eq!(fresh.id(), Some(Key::Int(102)));
}

#[test]
fn test_association_is_fully_replaced() {
    let reg = library();
    let conn = library_db();

    let earthsea = book(&reg, 10, "Earthsea", 1968);
    let classic = Object::with_id(reg.entity("Tag").unwrap(), 101);
    classic.set("label", "classic").unwrap();
    let wizards = tag(&reg, "wizards");
    earthsea.set_many("tags", vec![classic, wizards.clone()]).unwrap();

    let summary = Upsert::new(&reg, "Book")
        .unwrap()
        .element(&earthsea)
        .join(JoinNode::new(&reg, "Book", "tags").unwrap())
        .execute(&conn)
        .unwrap();
    assert_eq!(summary.associations_deleted, 2);
    assert_eq!(summary.associations_inserted, 2);

    let wizards_id = match wizards.id() {
        Some(Key::Int(id)) => id,
        other => panic!("tag was not inserted: {other:?}"),
    };
    let linked: Vec<i64> = {
        let mut stmt = conn
            .inner()
            .prepare("SELECT tag_id FROM book_tag WHERE book_id = 10 ORDER BY tag_id")
            .unwrap();
        stmt.query_map([], |r| r.get::<_, i64>(0))
            .unwrap()
            .map(|row| row.unwrap())
            .collect()
    };
    assert_eq!(linked, vec![101, wizards_id]);
    // Other books keep their links.
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM book_tag WHERE book_id = 12"), 1);
}

#[test]
fn test_remote_relation_reassigns_children() {
    let reg = library();
    let conn = library_db();

    let le_guin = author(&reg, 1, "Le Guin");
    le_guin.set_many("books", vec![book(&reg, 12, "Dune", 1965)]).unwrap();
    let summary = Upsert::new(&reg, "Author")
        .unwrap()
        .element(&le_guin)
        .join(JoinNode::new(&reg, "Author", "books").unwrap())
        .execute(&conn)
        .unwrap();
    assert_eq!(summary.reassigned, 1);
    assert_eq!(scalar(&conn, "SELECT author_id FROM book WHERE id = 12"), 1);
    assert_eq!(
        scalar(&conn, "SELECT COUNT(*) FROM book WHERE author_id IS NULL"),
        2
    );
}

#[test]
fn test_local_relation_writes_foreign_key() {
    let reg = library();
    let conn = library_db();
    let dune = book(&reg, 12, "Dune", 1965);
    dune.set_one("author", Some(author(&reg, 3, "Banks"))).unwrap();
    Upsert::new(&reg, "Book").unwrap().element(&dune).execute(&conn).unwrap();
    assert_eq!(scalar(&conn, "SELECT author_id FROM book WHERE id = 12"), 3);
}

#[test]
fn test_natural_key_finds_existing_rows() {
    let reg = library();
    let conn = library_db();
    let classic = tag(&reg, "classic");
    let novel = tag(&reg, "novel");

    let summary = Upsert::new(&reg, "Tag")
        .unwrap()
        .elements([&classic, &novel])
        .check_natural_id()
        .execute(&conn)
        .unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.inserted, 1);
    assert_eq!(classic.id(), Some(Key::Int(101)));
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM tag"), 3);
}

#[test]
fn test_natural_key_lookup_skips_elements_with_ids() {
    let reg = library();
    let conn = library_db();
    let fantasy = Object::with_id(reg.entity("Tag").unwrap(), 100);
    fantasy.set("label", "high fantasy").unwrap();

    let summary = Upsert::new(&reg, "Tag")
        .unwrap()
        .element(&fantasy)
        .check_natural_id()
        .execute(&conn)
        .unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.statements, 1);
    assert_eq!(fantasy.id(), Some(Key::Int(100)));
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM tag"), 2);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM tag WHERE id = 100 AND label = 'high fantasy'"), 1);
}

#[test]
fn test_id_only_entity_inserts_default_row() {
    let reg = Registry::builder()
        .entity(
            EntityDescriptor::builder("Ticket")
                .id("id", FieldKind::Int, IdGeneration::Identity)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE ticket (id INTEGER PRIMARY KEY AUTOINCREMENT);").unwrap();

    let first = Object::new(reg.entity("Ticket").unwrap());
    let second = Object::new(reg.entity("Ticket").unwrap());
    let summary = Upsert::new(&reg, "Ticket")
        .unwrap()
        .elements([&first, &second])
        .execute(&conn)
        .unwrap();
    assert_eq!(summary.inserted, 2);
    assert_eq!(first.id(), Some(Key::Int(1)));
    assert_eq!(second.id(), Some(Key::Int(2)));
}

#[test]
fn test_empty_and_mistyped_input() {
    let reg = library();
    let conn = library_db();
    let summary = Upsert::new(&reg, "Author").unwrap().execute(&conn).unwrap();
    assert_eq!(summary, UpsertSummary::default());

    let err = Upsert::new(&reg, "Author")
        .unwrap()
        .element(&tag(&reg, "x"))
        .execute(&conn)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
}

#[test]
fn test_select_then_upsert_round_trip() {
    let reg = library();
    let conn = library_db();
    let books = Select::new(&reg, "Book")
        .unwrap()
        .join(JoinNode::new(&reg, "Book", "author").unwrap())
        .execute(&conn)
        .unwrap();
    for b in &books {
        b.set("year", 2000i64).unwrap();
    }
    let summary = Upsert::new(&reg, "Book").unwrap().elements(&books).execute(&conn).unwrap();
    assert_eq!(summary.updated, 3);
    assert_eq!(scalar(&conn, "SELECT COUNT(*) FROM book WHERE year = 2000"), 3);
    // Loaded authors keep their foreign keys.
    assert_eq!(scalar(&conn, "SELECT author_id FROM book WHERE id = 12"), 2);
}
