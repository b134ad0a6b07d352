//! Positional row mapping onto cached instances.
//!
//! A select lists every field column of the root context, then of each
//! joined context in pre-order. Each context owns one contiguous segment of
//! the row; a NULL id in a segment means the LEFT JOIN found nothing there.

use std::collections::{HashMap, HashSet};

use crate::cache::FirstLevelCache;
use crate::connection::Rows;
use crate::context::Context;
use crate::join::JoinStep;
use crate::mapping::FieldHandle;
use crate::object::Object;
use crate::sql::expr::Expr;
use crate::value::Key;

struct Segment {
    context: Context,
    start: usize,
    /// Owning segment and the relation slot on its instance.
    parent: Option<(usize, usize)>,
}

/// Column layout of a select over one root and its joined contexts.
pub(crate) struct RowLayout {
    segments: Vec<Segment>,
    width: usize,
}

impl RowLayout {
    pub(crate) fn new(root: &Context, steps: &[JoinStep<'_>]) -> Self {
        let mut segments = vec![Segment {
            context: root.clone(),
            start: 0,
            parent: None,
        }];
        let mut index = HashMap::from([(root.path().to_string(), 0usize)]);
        let mut width = root.target().fields().len();

        for step in steps {
            if index.contains_key(step.context.path()) {
                continue;
            }
            let Some(&parent) = index.get(step.parent.path()) else {
                continue;
            };
            let Some(slot) = step.parent.target().relation_index(&step.node.relation.name) else {
                continue;
            };
            index.insert(step.context.path().to_string(), segments.len());
            segments.push(Segment {
                context: step.context.clone(),
                start: width,
                parent: Some((parent, slot)),
            });
            width += step.context.target().fields().len();
        }
        Self { segments, width }
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    /// Every mapped column, segment by segment.
    pub(crate) fn select_list(&self) -> Vec<Expr> {
        self.segments
            .iter()
            .flat_map(|s| {
                let ctx = &s.context;
                (0..ctx.target().fields().len()).map(move |i| ctx.column_at(FieldHandle(i)))
            })
            .collect()
    }

    /// Id columns of the joined (non-root) contexts, in pre-order.
    pub(crate) fn joined_id_columns(&self) -> Vec<Expr> {
        self.segments[1..].iter().map(|s| s.context.id_column()).collect()
    }
}

/// Accumulates mapped roots across one or more result sets.
pub(crate) struct Mapper {
    layout: RowLayout,
    /// Relation slots already reset during this select, by (instance, slot).
    initialized: HashSet<(usize, usize)>,
    seen: HashSet<usize>,
    roots: Vec<Object>,
}

impl Mapper {
    pub(crate) fn new(layout: RowLayout) -> Self {
        Self {
            layout,
            initialized: HashSet::new(),
            seen: HashSet::new(),
            roots: Vec::new(),
        }
    }

    /// Map every row of `rows`, merging into instances held by `cache`.
    pub(crate) fn consume(&mut self, rows: &Rows, cache: &mut FirstLevelCache) {
        for row in rows.iter() {
            if row.len() < self.layout.width {
                tracing::warn!(
                    expected = self.layout.width,
                    actual = row.len(),
                    "skipping short row"
                );
                continue;
            }
            self.consume_row(row, cache);
        }
    }

    fn consume_row(&mut self, row: &[crate::value::Value], cache: &mut FirstLevelCache) {
        let mut instances: Vec<Option<Object>> = Vec::with_capacity(self.layout.segments.len());
        for segment in &self.layout.segments {
            let owner = match segment.parent {
                None => None,
                Some((parent, slot)) => match &instances[parent] {
                    Some(object) => Some((object.clone(), slot)),
                    None => {
                        instances.push(None);
                        continue;
                    }
                },
            };
            if let Some((owner, slot)) = &owner {
                if self.initialized.insert((owner.addr(), *slot)) {
                    owner.init_relation(*slot);
                }
            }

            let descriptor = segment.context.target();
            let id_at = segment.start + descriptor.id_handle().index();
            let Some(id) = row[id_at].as_key() else {
                instances.push(None);
                continue;
            };
            let (object, _) = cache.get_or_allocate(descriptor, id);
            for (i, field) in descriptor.fields().iter().enumerate() {
                let raw = row[segment.start + i].clone();
                let value = field.kind.coerce(raw.clone()).unwrap_or(raw);
                object.set_at(FieldHandle(i), value);
            }
            if let Some((owner, slot)) = owner {
                owner.push_related(slot, &object);
            }
            instances.push(Some(object));
        }

        if let Some(Some(root)) = instances.into_iter().next() {
            if self.seen.insert(root.addr()) {
                self.roots.push(root);
            }
        }
    }

    /// Reorder the mapped roots to follow `ids`.
    pub(crate) fn order_by_ids(&mut self, ids: &[Key]) {
        let position: HashMap<&Key, usize> = ids.iter().enumerate().map(|(i, k)| (k, i)).collect();
        self.roots.sort_by_key(|o| o.id().and_then(|id| position.get(&id).copied()).unwrap_or(usize::MAX));
    }

    pub(crate) fn finish(self) -> Vec<Object> {
        self.roots
    }
}
