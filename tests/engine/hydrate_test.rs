// tests/engine/hydrate_test.rs
#[path = "../support/mod.rs"]
mod support;

use std::collections::BTreeSet;

use heron::prelude::*;
use support::{library, library_db, ring, ring_db};

fn ring_joins(reg: &Registry) -> Vec<JoinNode> {
    vec![
        JoinNode::new(reg, "Alpha", "beta").unwrap(),
        JoinNode::new(reg, "Beta", "gamma").unwrap(),
        JoinNode::new(reg, "Gamma", "alpha").unwrap(),
    ]
}

#[test]
fn test_recursive_hydrate_terminates_on_cycles() {
    let reg = ring();
    let conn = ring_db();
    let alpha = Object::with_id(reg.entity("Alpha").unwrap(), 1);

    let mut hydrate = Hydrate::new(&reg).element(&alpha).recurse();
    for node in ring_joins(&reg) {
        hydrate = hydrate.join(node);
    }
    let report = hydrate.execute(&conn).unwrap();

    let expected: BTreeSet<EntityRef> = [
        EntityRef::new("Alpha", 1i64),
        EntityRef::new("Beta", 2i64),
        EntityRef::new("Gamma", 3i64),
    ]
    .into_iter()
    .collect();
    assert_eq!(report.done, expected);
    assert_eq!(report.waves, 3);
    assert_eq!(report.statements, 3);

    // The graph closes back onto the seed instance.
    let beta = alpha.one("beta").unwrap().unwrap();
    let gamma = beta.one("gamma").unwrap().unwrap();
    assert!(gamma.one("alpha").unwrap().unwrap().same(&alpha));
    assert_eq!(beta.get("label").unwrap(), Value::from("b"));
    // Reaching the seed again through the cycle does not overwrite it.
    assert_eq!(alpha.get("label").unwrap(), Value::Null);
}

#[test]
fn test_single_wave_without_recurse() {
    let reg = ring();
    let conn = ring_db();
    let alpha = Object::with_id(reg.entity("Alpha").unwrap(), 1);

    let mut hydrate = Hydrate::new(&reg).element(&alpha);
    for node in ring_joins(&reg) {
        hydrate = hydrate.join(node);
    }
    let report = hydrate.execute(&conn).unwrap();
    assert_eq!(report.waves, 1);
    assert_eq!(report.done.len(), 1);

    let beta = alpha.one("beta").unwrap().unwrap();
    assert!(!beta.related("gamma").unwrap().is_loaded());
}

#[test]
fn test_hydrate_loads_relations_onto_given_instances() {
    let reg = library();
    let conn = library_db();
    let descriptor = reg.entity("Author").unwrap();
    let authors: Vec<Object> = [1i64, 2, 3].into_iter().map(|id| Object::with_id(descriptor.clone(), id)).collect();
    authors[0].set("name", "edited locally").unwrap();

    let report = Hydrate::new(&reg)
        .elements(&authors)
        .join(JoinNode::new(&reg, "Author", "books").unwrap())
        .join(JoinNode::new(&reg, "Book", "tags").unwrap())
        .recurse()
        .execute(&conn)
        .unwrap();
    assert_eq!(report.waves, 3);

    assert_eq!(authors[0].many("books").unwrap().len(), 2);
    assert_eq!(authors[1].many("books").unwrap().len(), 1);
    assert!(authors[2].many("books").unwrap().is_empty());
    // Seed fields are left as the caller had them.
    assert_eq!(authors[0].get("name").unwrap(), Value::from("edited locally"));
    assert_eq!(authors[1].get("name").unwrap(), Value::Null);

    let dune = authors[1].many("books").unwrap().remove(0);
    assert_eq!(dune.many("tags").unwrap().len(), 1);
    assert!(report.done.contains(&EntityRef::new("Tag", 101i64)));
}
