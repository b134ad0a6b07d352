// tests/join/join_graph_test.rs
#[path = "../support/mod.rs"]
mod support;

use heron::prelude::*;
use support::{ids, library};

fn staff() -> Registry {
    Registry::builder()
        .entity(
            EntityDescriptor::builder("Employee")
                .id("id", FieldKind::Int, IdGeneration::Assigned)
                .field("name", FieldKind::Text)
                .relation(RelationDescriptor::one("manager", "Employee").join_column("manager_id", JoinSide::Local))
                .relation(RelationDescriptor::many("reports", "Employee").join_column("manager_id", JoinSide::Remote))
                .relation(RelationDescriptor::one("desk", "Desk").join_column("desk_id", JoinSide::Local))
                .build()
                .unwrap(),
        )
        .entity(
            EntityDescriptor::builder("Desk")
                .id("id", FieldKind::Int, IdGeneration::Assigned)
                .field("floor", FieldKind::Int)
                .relation(
                    RelationDescriptor::one("occupant", "Employee")
                        .join_column("desk_id", JoinSide::Remote)
                        .no_auto_join(),
                )
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn paths(nodes: &[JoinNode], prefix: &str, out: &mut Vec<String>) {
    for node in nodes {
        let path = format!("{prefix}{}", node.relation.name);
        out.push(path.clone());
        paths(&node.children, &format!("{path}."), out);
    }
}

#[test]
fn test_self_referencing_schema_terminates() {
    let reg = staff();
    let tree = join_all(&reg, "Employee").unwrap();
    let mut out = Vec::new();
    paths(&tree, "", &mut out);

    // Each relation appears at most once along any root-to-leaf path.
    for path in &out {
        let steps: Vec<&str> = path.split('.').collect();
        let mut unique = steps.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), steps.len(), "{path}");
    }
    assert!(out.contains(&"manager.reports.desk".to_string()));
    // Excluded from auto-join.
    assert!(!out.iter().any(|p| p.contains("occupant")));
    assert!(reg.schema_graph().is_cyclic("Employee"));
}

#[test]
fn test_join_all_executes_on_cyclic_schema() {
    let reg = staff();
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute_batch(
        "
        CREATE TABLE employee (id INTEGER PRIMARY KEY, name TEXT, manager_id INTEGER, desk_id INTEGER);
        CREATE TABLE desk (id INTEGER PRIMARY KEY, floor INTEGER);
        INSERT INTO desk VALUES (1, 3), (2, 4);
        INSERT INTO employee VALUES (1, 'boss', NULL, 1), (2, 'dev', 1, 2), (3, 'intern', 2, NULL);
        ",
    )
    .unwrap();

    let staff = Select::new(&reg, "Employee").unwrap().join_all().unwrap().execute(&conn).unwrap();
    assert_eq!(ids(&staff), vec![1, 2, 3]);

    let dev = &staff[1];
    assert!(dev.one("manager").unwrap().unwrap().same(&staff[0]));
    assert_eq!(dev.many("reports").unwrap().len(), 1);
    assert_eq!(dev.one("desk").unwrap().unwrap().get("floor").unwrap(), Value::from(4i64));
    assert!(staff[2].one("desk").unwrap().is_none());
}

#[test]
fn test_profiles_select_tagged_relations_only() {
    let reg = library();
    let tree = join_profiles(&reg, "Book", &["catalog"]).unwrap();
    let mut out = Vec::new();
    paths(&tree, "", &mut out);
    assert_eq!(out, vec!["tags"]);

    let tree = join_profiles(&reg, "Author", &["catalog"]).unwrap();
    let mut out = Vec::new();
    paths(&tree, "", &mut out);
    assert_eq!(out, vec!["books", "books.tags"]);
}
