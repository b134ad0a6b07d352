//! INSERT-or-UPDATE over an object graph.
//!
//! For each level of the join tree the related objects are written first
//! (depth-first), then the level's own rows, then each joined relation is
//! synchronized:
//!
//! - local join columns travel with the row itself;
//! - remote join columns are nulled for the written parents (when nullable)
//!   and reassigned to the current children;
//! - join tables are rewritten: one DELETE per chunk of parent ids, issued
//!   before any INSERT of the current pairs.
//!
//! Unloaded relation slots are never touched. An instance is written at most
//! once per upsert, however often the graph reaches it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::options::ExecutionOptions;
use super::select::Select;
use super::run_execute;
use crate::connection::Connection;
use crate::error::{Error, MappingError, Result};
use crate::evaluation::Evaluation;
use crate::join::{self, JoinNode};
use crate::mapping::{EntityDescriptor, FieldHandle, IdGeneration, JoinMechanism, JoinSide, MappingProvider};
use crate::object::{Object, Related};
use crate::sql::dml::{Delete as DeleteStatement, Insert, Update};
use crate::sql::expr::{col, Expr, ExprExt};
use crate::sql::{Dialect, Parameter, SqlDialect, Statement};
use crate::value::{Key, Value};

/// What an upsert wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    /// Rows removed from join tables before rewriting them.
    pub associations_deleted: u64,
    /// Rows written to join tables.
    pub associations_inserted: u64,
    /// Remote join-column rows reassigned.
    pub reassigned: u64,
    pub statements: usize,
}

/// Writes instances of one entity type and, through joins, their relations.
#[must_use = "builders have no effect until executed"]
pub struct Upsert<'p> {
    provider: &'p dyn MappingProvider,
    entity: Arc<EntityDescriptor>,
    elements: Vec<Object>,
    joins: Vec<JoinNode>,
    force_insert: bool,
    check_natural_id: bool,
    options: ExecutionOptions,
}

struct State<'c> {
    conn: &'c dyn Connection,
    dialect: Dialect,
    written: HashSet<usize>,
    summary: UpsertSummary,
}

impl State<'_> {
    fn execute(&mut self, statement: Statement) -> Result<crate::connection::ExecuteResult> {
        self.summary.statements += 1;
        run_execute(self.conn, &statement)
    }
}

impl<'p> Upsert<'p> {
    pub fn new(provider: &'p dyn MappingProvider, entity: &str) -> Result<Self> {
        Ok(Self {
            provider,
            entity: provider.entity(entity)?,
            elements: Vec::new(),
            joins: Vec::new(),
            force_insert: false,
            check_natural_id: false,
            options: ExecutionOptions::default(),
        })
    }

    pub fn element(mut self, element: &Object) -> Self {
        self.elements.push(element.clone());
        self
    }

    pub fn elements<'o>(mut self, elements: impl IntoIterator<Item = &'o Object>) -> Self {
        self.elements.extend(elements.into_iter().cloned());
        self
    }

    /// Write the objects reached through `node` and synchronize the relation.
    pub fn join(mut self, node: JoinNode) -> Self {
        self.joins.push(node);
        self
    }

    pub fn join_all(mut self) -> Result<Self> {
        let nodes = join::join_all(self.provider, self.entity.name())?;
        self.joins.extend(nodes);
        Ok(self)
    }

    /// Insert top-level elements even when they carry an id.
    pub fn force_insert(mut self) -> Self {
        self.force_insert = true;
        self
    }

    /// Look existing rows up by natural key before deciding insert or update.
    pub fn check_natural_id(mut self) -> Self {
        self.check_natural_id = true;
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn execute(&self, conn: &dyn Connection) -> Result<UpsertSummary> {
        if self.elements.is_empty() {
            tracing::warn!(entity = %self.entity.name(), "upsert of an empty element set is a no-op");
            return Ok(UpsertSummary::default());
        }
        if let Some(stranger) = self.elements.iter().find(|e| e.entity_name() != self.entity.name()) {
            return Err(Error::InvalidQuery(format!(
                "upsert of `{}` given a `{}` instance",
                self.entity.name(),
                stranger.entity_name()
            )));
        }
        let mut state = State {
            conn,
            dialect: conn.dialect(),
            written: HashSet::new(),
            summary: UpsertSummary::default(),
        };
        self.write_level(&self.entity, &self.elements, &self.joins, self.force_insert, &mut state)?;
        tracing::debug!(
            entity = %self.entity.name(),
            inserted = state.summary.inserted,
            updated = state.summary.updated,
            "upsert finished"
        );
        Ok(state.summary)
    }

    fn write_level(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        elements: &[Object],
        joins: &[JoinNode],
        force_insert: bool,
        state: &mut State<'_>,
    ) -> Result<()> {
        let elements = distinct(elements);

        for node in joins {
            let slot = relation_slot(descriptor, &node.relation.name)?;
            let related = distinct(&elements.iter().flat_map(|e| e.related_at(slot).objects()).collect::<Vec<_>>());
            if related.is_empty() {
                continue;
            }
            let target = self.provider.entity(&node.relation.target)?;
            self.write_level(&target, &related, &node.children, false, state)?;
        }

        let pending: Vec<Object> = elements
            .iter()
            .filter(|e| !state.written.contains(&e.addr()))
            .cloned()
            .collect();
        self.write_rows(descriptor, &pending, force_insert, state)?;

        for node in joins {
            self.sync_relation(descriptor, &elements, node, state)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------

    fn write_rows(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        elements: &[Object],
        force_insert: bool,
        state: &mut State<'_>,
    ) -> Result<()> {
        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        for element in elements {
            let lookup = self.check_natural_id && element.id().is_none() && !descriptor.natural_key().is_empty();
            let insert = if lookup {
                match self.natural_id(element, state)? {
                    Some(existing) => {
                        element.set_id(existing);
                        force_insert
                    }
                    None => true,
                }
            } else {
                force_insert || element.id().is_none()
            };
            if insert {
                inserts.push(element.clone());
            } else {
                updates.push(element.clone());
            }
        }

        match descriptor.id_generation() {
            IdGeneration::Assigned => self.insert_batched(descriptor, &inserts, state)?,
            IdGeneration::Identity | IdGeneration::Sequence(_) => {
                for element in &inserts {
                    self.insert_generated(descriptor, element, state)?;
                }
            }
        }
        for element in &updates {
            self.update(descriptor, element, state)?;
        }
        for element in elements {
            state.written.insert(element.addr());
        }
        Ok(())
    }

    /// Id of the row sharing `element`'s natural key, if any.
    fn natural_id(&self, element: &Object, state: &mut State<'_>) -> Result<Option<Key>> {
        let select = Select::new(self.provider, &element.entity_name())?
            .filter(Evaluation::natural_key_match(element)?)
            .options(self.options.clone());
        state.summary.statements += 1;
        let found = select.ids(state.conn)?;
        if found.len() > 1 {
            tracing::warn!(
                entity = %element.entity_name(),
                matches = found.len(),
                "natural key matches several rows; updating the first"
            );
        }
        Ok(found.into_iter().next())
    }

    /// Columns and values written for `element`, id excluded.
    fn row(&self, descriptor: &EntityDescriptor, element: &Object) -> Result<Vec<(String, Value)>> {
        let locals = local_join_values(self.provider, descriptor, element)?;
        let mut row: Vec<(String, Value)> = descriptor
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, f)| *i != descriptor.id_handle().index() && !locals.contains_key(&f.column))
            .map(|(i, f)| (f.column.clone(), element.get_at(FieldHandle(i))))
            .collect();
        row.extend(locals);
        Ok(row)
    }

    /// Assigned-id inserts, grouped by column list and batched multi-row.
    fn insert_batched(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        elements: &[Object],
        state: &mut State<'_>,
    ) -> Result<()> {
        // Rows differ in columns only when local join slots differ in loaded state.
        let mut groups: Vec<(Vec<String>, Vec<Vec<Expr>>)> = Vec::new();
        for element in elements {
            let (columns, values) = self.insert_row(descriptor, element)?;
            match groups.iter_mut().find(|(c, _)| *c == columns) {
                Some((_, rows)) => rows.push(values),
                None => groups.push((columns, vec![values])),
            }
        }

        for (columns, rows) in groups {
            let per_statement = if state.dialect.supports_multi_row_insert() {
                (self.options.parameter_ceiling(state.dialect) / columns.len().max(1)).max(1)
            } else {
                1
            };
            for chunk in rows.chunks(per_statement) {
                let statement = self
                    .insert_into(descriptor)
                    .columns(columns.clone())
                    .values_many(chunk.to_vec())
                    .to_statement(state.dialect)
                    .with_timeout(self.options.timeout);
                state.execute(statement)?;
                state.summary.inserted += chunk.len();
            }
        }
        Ok(())
    }

    /// Single-row insert reading back the generated id.
    fn insert_generated(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        element: &Object,
        state: &mut State<'_>,
    ) -> Result<()> {
        let (columns, values) = self.insert_row(descriptor, element)?;
        let insert = if columns.is_empty() {
            self.insert_into(descriptor).default_values(&descriptor.id_field().column)
        } else {
            self.insert_into(descriptor).columns(columns).values(values)
        };
        let statement = insert
            .to_statement(state.dialect)
            .with_generated_key(descriptor.id_field().column.clone())
            .with_timeout(self.options.timeout);
        let result = state.execute(statement)?;
        let key = result.generated_keys.into_iter().next().ok_or_else(|| {
            Error::InvalidQuery(format!("insert into `{}` returned no generated key", descriptor.table()))
        })?;
        element.set_id(key);
        state.summary.inserted += 1;
        Ok(())
    }

    /// INSERT columns and values for `element`. Identity ids are left out,
    /// sequence ids render the sequence's next value.
    fn insert_row(&self, descriptor: &EntityDescriptor, element: &Object) -> Result<(Vec<String>, Vec<Expr>)> {
        let id_field = descriptor.id_field();
        let mut columns = Vec::new();
        let mut values = Vec::new();
        match descriptor.id_generation() {
            IdGeneration::Identity => {}
            IdGeneration::Sequence(sequence) => {
                columns.push(id_field.column.clone());
                values.push(Expr::NextValue(sequence.clone()));
            }
            IdGeneration::Assigned => {
                let id = element.id().ok_or_else(|| {
                    Error::InvalidQuery(format!(
                        "`{}` uses assigned ids but an instance has none",
                        descriptor.name()
                    ))
                })?;
                columns.push(id_field.column.clone());
                values.push(Expr::Param(Parameter::field(descriptor.name(), &id_field.name, id)));
            }
        }
        for (column, value) in self.row(descriptor, element)? {
            values.push(column_param(descriptor, &column, value));
            columns.push(column);
        }
        Ok((columns, values))
    }

    fn update(&self, descriptor: &Arc<EntityDescriptor>, element: &Object, state: &mut State<'_>) -> Result<()> {
        let Some(id) = element.id() else {
            return Ok(());
        };
        let row = self.row(descriptor, element)?;
        if row.is_empty() {
            return Ok(());
        }
        let id_field = descriptor.id_field();
        let mut update = Update::table(descriptor.table()).schema(descriptor.schema().map(String::from));
        for (column, value) in row {
            let param = column_param(descriptor, &column, value);
            update = update.set(column, param);
        }
        let statement = update
            .filter(col(&id_field.column).eq(Parameter::field(descriptor.name(), &id_field.name, id)))
            .to_statement(state.dialect)
            .with_timeout(self.options.timeout);
        state.execute(statement)?;
        state.summary.updated += 1;
        Ok(())
    }

    fn insert_into(&self, descriptor: &EntityDescriptor) -> Insert {
        Insert::into(descriptor.table()).schema(descriptor.schema().map(String::from))
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    fn sync_relation(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        elements: &[Object],
        node: &JoinNode,
        state: &mut State<'_>,
    ) -> Result<()> {
        let slot = relation_slot(descriptor, &node.relation.name)?;
        // Parents whose slot is loaded, with their current related objects.
        let mut pairs: Vec<(Object, Vec<Object>)> = Vec::new();
        for element in elements {
            let related = element.related_at(slot);
            if !matches!(related, Related::Unloaded) && element.id().is_some() {
                pairs.push((element.clone(), related.objects()));
            }
        }
        if pairs.is_empty() {
            return Ok(());
        }
        let target = self.provider.entity(&node.relation.target)?;

        match &node.relation.mechanism {
            JoinMechanism::JoinColumn { side: JoinSide::Local, .. } => Ok(()),
            JoinMechanism::JoinColumn {
                column,
                side: JoinSide::Remote,
                referenced_column,
                nullable,
            } => {
                let referenced = descriptor.referenced_column(referenced_column);
                let handle = descriptor.field_by_column(referenced).ok_or_else(|| {
                    Error::InvalidQuery(format!("`{}` has no column `{referenced}`", descriptor.name()))
                })?;
                let parent_values: Vec<Value> = pairs.iter().map(|(p, _)| p.get_at(handle)).collect();
                if *nullable {
                    self.null_remote(&target, column, &parent_values, state)?;
                }
                for (parent, children) in &pairs {
                    let value = parent.get_at(handle);
                    let ids: Vec<Key> = children.iter().filter_map(Object::id).collect();
                    self.assign_remote(&target, column, value, &ids, state)?;
                }
                Ok(())
            }
            JoinMechanism::JoinTable {
                table,
                schema,
                source_column,
                target_column,
            } => {
                let link = LinkTable {
                    table,
                    schema: schema.as_deref(),
                    source_column,
                    target_column,
                };
                self.rewrite_links(&link, &pairs, state)
            }
        }
    }

    fn null_remote(
        &self,
        target: &EntityDescriptor,
        column: &str,
        parents: &[Value],
        state: &mut State<'_>,
    ) -> Result<()> {
        for chunk in parents.chunks(self.options.in_list_ceiling(state.dialect)) {
            let values = chunk.iter().map(|v| Expr::Param(Parameter::new(column, v.clone()))).collect();
            let statement = Update::table(target.table())
                .schema(target.schema().map(String::from))
                .set(column, Expr::Param(Parameter::new(column, Value::Null)))
                .filter(col(column).in_list(values))
                .to_statement(state.dialect)
                .with_timeout(self.options.timeout);
            state.execute(statement)?;
        }
        Ok(())
    }

    fn assign_remote(
        &self,
        target: &EntityDescriptor,
        column: &str,
        parent: Value,
        children: &[Key],
        state: &mut State<'_>,
    ) -> Result<()> {
        let id_field = target.id_field();
        // One slot goes to the assigned value.
        let per_statement = self.options.in_list_ceiling(state.dialect).saturating_sub(1).max(1);
        for chunk in children.chunks(per_statement) {
            let ids = chunk
                .iter()
                .map(|id| Expr::Param(Parameter::field(target.name(), &id_field.name, id)))
                .collect();
            let statement = Update::table(target.table())
                .schema(target.schema().map(String::from))
                .set(column, Expr::Param(Parameter::new(column, parent.clone())))
                .filter(col(&id_field.column).in_list(ids))
                .to_statement(state.dialect)
                .with_timeout(self.options.timeout);
            state.summary.reassigned += state.execute(statement)?.affected;
        }
        Ok(())
    }

    fn rewrite_links(&self, link: &LinkTable<'_>, pairs: &[(Object, Vec<Object>)], state: &mut State<'_>) -> Result<()> {
        let parents: Vec<Key> = pairs.iter().filter_map(|(p, _)| p.id()).collect();
        for chunk in parents.chunks(self.options.in_list_ceiling(state.dialect)) {
            let values = chunk
                .iter()
                .map(|id| Expr::Param(Parameter::new(link.source_column, id)))
                .collect();
            let statement = DeleteStatement::from(link.table)
                .schema(link.schema.map(String::from))
                .filter(col(link.source_column).in_list(values))
                .to_statement(state.dialect)
                .with_timeout(self.options.timeout);
            state.summary.associations_deleted += state.execute(statement)?.affected;
        }

        let mut seen = HashSet::new();
        let rows: Vec<Vec<Expr>> = pairs
            .iter()
            .flat_map(|(parent, children)| {
                let source = parent.id();
                children.iter().filter_map(move |c| Some((source.clone()?, c.id()?)))
            })
            .filter(|pair| seen.insert(pair.clone()))
            .map(|(source, target)| {
                vec![
                    Expr::Param(Parameter::new(link.source_column, source)),
                    Expr::Param(Parameter::new(link.target_column, target)),
                ]
            })
            .collect();
        let per_statement = if state.dialect.supports_multi_row_insert() {
            (self.options.parameter_ceiling(state.dialect) / 2).max(1)
        } else {
            1
        };
        for chunk in rows.chunks(per_statement) {
            let statement = Insert::into(link.table)
                .schema(link.schema.map(String::from))
                .columns([link.source_column, link.target_column])
                .values_many(chunk.to_vec())
                .to_statement(state.dialect)
                .with_timeout(self.options.timeout);
            state.summary.associations_inserted += state.execute(statement)?.affected;
        }
        Ok(())
    }
}

struct LinkTable<'a> {
    table: &'a str,
    schema: Option<&'a str>,
    source_column: &'a str,
    target_column: &'a str,
}

/// Instances in first-seen order, each once.
fn distinct(objects: &[Object]) -> Vec<Object> {
    let mut seen = HashSet::new();
    objects.iter().filter(|o| seen.insert(o.addr())).cloned().collect()
}

fn relation_slot(descriptor: &EntityDescriptor, relation: &str) -> Result<usize> {
    descriptor.relation_index(relation).ok_or_else(|| {
        MappingError::UnknownRelation {
            entity: descriptor.name().into(),
            relation: relation.into(),
        }
        .into()
    })
}

/// Local join-column values of `element`'s loaded to-one slots.
fn local_join_values(
    provider: &dyn MappingProvider,
    descriptor: &EntityDescriptor,
    element: &Object,
) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (slot, relation) in descriptor.relations().iter().enumerate() {
        let JoinMechanism::JoinColumn {
            column,
            side: JoinSide::Local,
            referenced_column,
            ..
        } = &relation.mechanism
        else {
            continue;
        };
        let value = match element.related_at(slot) {
            Related::Unloaded => continue,
            Related::One(None) => Value::Null,
            Related::One(Some(target)) => {
                let target_descriptor = provider.entity(&relation.target)?;
                let referenced = target_descriptor.referenced_column(referenced_column);
                match target_descriptor.field_by_column(referenced) {
                    Some(handle) => target.get_at(handle),
                    None => Value::Null,
                }
            }
            Related::Many(_) => continue,
        };
        out.insert(column.clone(), value);
    }
    Ok(out)
}

/// Bound value for `column`, named after its field when it maps to one.
fn column_param(descriptor: &EntityDescriptor, column: &str, value: Value) -> Expr {
    let parameter = match descriptor.field_by_column(column) {
        Some(handle) => Parameter::field(descriptor.name(), &descriptor.field_at(handle).name, value),
        None => Parameter::new(column, value),
    };
    Expr::Param(parameter)
}
