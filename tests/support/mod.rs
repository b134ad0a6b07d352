// tests/support/mod.rs
#![allow(dead_code)]

use heron::prelude::*;

/// Authors write books; books carry tags through `book_tag`.
pub fn library() -> Registry {
    Registry::builder()
        .entity(
            EntityDescriptor::builder("Author")
                .id("id", FieldKind::Int, IdGeneration::Assigned)
                .field("name", FieldKind::Text)
                .relation(
                    RelationDescriptor::many("books", "Book")
                        .join_column("author_id", JoinSide::Remote)
                        .profile("catalog"),
                )
                .build()
                .unwrap(),
        )
        .entity(
            EntityDescriptor::builder("Book")
                .id("id", FieldKind::Int, IdGeneration::Assigned)
                .field("title", FieldKind::Text)
                .field("year", FieldKind::Int)
                .relation(RelationDescriptor::one("author", "Author").join_column("author_id", JoinSide::Local))
                .relation(
                    RelationDescriptor::many("tags", "Tag")
                        .join_table("book_tag", "book_id", "tag_id")
                        .profile("catalog"),
                )
                .build()
                .unwrap(),
        )
        .entity(
            EntityDescriptor::builder("Tag")
                .id("id", FieldKind::Int, IdGeneration::Identity)
                .field("label", FieldKind::Text)
                .natural_key(["label"])
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

pub const LIBRARY_SCHEMA: &str = "
    CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT);
    CREATE TABLE book (id INTEGER PRIMARY KEY, title TEXT, year INTEGER, author_id INTEGER);
    CREATE TABLE tag (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT);
    CREATE TABLE book_tag (book_id INTEGER NOT NULL, tag_id INTEGER NOT NULL);
";

/// Five authors; the first two have books, and the books have tags.
pub const LIBRARY_ROWS: &str = "
    INSERT INTO author (id, name) VALUES
        (1, 'Le Guin'), (2, 'Herbert'), (3, 'Banks'), (4, 'Butler'), (5, 'Wolfe');
    INSERT INTO book (id, title, year, author_id) VALUES
        (10, 'Earthsea', 1968, 1),
        (11, 'The Dispossessed', 1974, 1),
        (12, 'Dune', 1965, 2);
    INSERT INTO tag (id, label) VALUES (100, 'fantasy'), (101, 'classic');
    INSERT INTO book_tag (book_id, tag_id) VALUES (10, 100), (10, 101), (12, 101);
";

pub fn library_db() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_batch(LIBRARY_SCHEMA).unwrap();
    conn.execute_batch(LIBRARY_ROWS).unwrap();
    conn
}

pub fn empty_library_db() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_batch(LIBRARY_SCHEMA).unwrap();
    conn
}

/// Alpha -> Beta -> Gamma -> Alpha, all to-one.
pub fn ring() -> Registry {
    let hop = |name: &str, next: &str, relation: &str| {
        EntityDescriptor::builder(name)
            .id("id", FieldKind::Int, IdGeneration::Assigned)
            .field("label", FieldKind::Text)
            .relation(
                RelationDescriptor::one(relation, next).join_column(&format!("{relation}_id"), JoinSide::Local),
            )
            .build()
            .unwrap()
    };
    Registry::builder()
        .entity(hop("Alpha", "Beta", "beta"))
        .entity(hop("Beta", "Gamma", "gamma"))
        .entity(hop("Gamma", "Alpha", "alpha"))
        .build()
        .unwrap()
}

pub fn ring_db() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_batch(
        "
        CREATE TABLE alpha (id INTEGER PRIMARY KEY, label TEXT, beta_id INTEGER);
        CREATE TABLE beta (id INTEGER PRIMARY KEY, label TEXT, gamma_id INTEGER);
        CREATE TABLE gamma (id INTEGER PRIMARY KEY, label TEXT, alpha_id INTEGER);
        INSERT INTO alpha VALUES (1, 'a', 2);
        INSERT INTO beta VALUES (2, 'b', 3);
        INSERT INTO gamma VALUES (3, 'c', 1);
        ",
    )
    .unwrap();
    conn
}

pub fn ids(objects: &[Object]) -> Vec<i64> {
    objects
        .iter()
        .filter_map(|o| match o.id() {
            Some(Key::Int(id)) => Some(id),
            _ => None,
        })
        .collect()
}

pub fn scalar(conn: &SqliteConnection, sql: &str) -> i64 {
    conn.inner().query_row(sql, [], |row| row.get(0)).unwrap()
}
