//! SELECT over a root entity with joins, restrictions and paging.
//!
//! # Strategies
//!
//! Joined to-many relations fan the root rows out, so the rows a caller
//! restricts (and pages) are not the rows the database returns. Each
//! strategy separates "which roots" from "fetch everything about them":
//!
//! - **EXISTS**: the restriction runs in a correlated subquery over the same
//!   join tree relabeled with a `_0` suffix.
//! - **IN**: the restriction runs as an id subquery; when paging, the id
//!   query is ordered, windowed and wrapped in a derived table.
//! - **Two-query**: ids are fetched first (and sliced in memory when the
//!   paging method has no SQL form), then full rows for those ids.

use std::collections::HashSet;

use super::mapper::{Mapper, RowLayout};
use super::options::{ExecutionOptions, Strategy};
use super::run_query;
use crate::cache::FirstLevelCache;
use crate::connection::Connection;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::evaluation::Evaluation;
use crate::join::{self, to_sql_join, walk, JoinNode};
use crate::mapping::MappingProvider;
use crate::object::Object;
use crate::sql::expr::{conjunction, count_distinct, exists, lit_int, table_col, Expr, ExprExt};
use crate::sql::query::{Join, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
use crate::sql::{Dialect, PagingMethod, Parameter, Statement};
use crate::value::{Key, Value};

/// Suffix of the relabeled context tree inside restriction subqueries.
const SUBQUERY_SUFFIX: &str = "_0";
/// Alias of the derived table holding a paged id window.
const PAGE_ALIAS: &str = "page";
const ID_ALIAS: &str = "id";

/// A SELECT of one root entity type.
#[derive(Clone)]
#[must_use = "builders have no effect until executed"]
pub struct Select<'p> {
    pub(super) provider: &'p dyn MappingProvider,
    pub(super) root: Context,
    pub(super) filters: Vec<Evaluation>,
    pub(super) joins: Vec<JoinNode>,
    pub(super) order: Vec<(String, SortDir)>,
    pub(super) offset: Option<u64>,
    pub(super) limit: Option<u64>,
    strategy: Option<Strategy>,
    paging_method: Option<PagingMethod>,
    options: ExecutionOptions,
}

/// What a select runs for one dialect.
enum Plan {
    Single(Statement),
    TwoQuery { ids: Statement, slice: bool },
}

impl<'p> Select<'p> {
    pub fn new(provider: &'p dyn MappingProvider, entity: &str) -> Result<Self> {
        let root = Context::root(provider.entity(entity)?);
        Ok(Self {
            provider,
            root,
            filters: Vec::new(),
            joins: Vec::new(),
            order: Vec::new(),
            offset: None,
            limit: None,
            strategy: None,
            paging_method: None,
            options: ExecutionOptions::default(),
        })
    }

    /// Restrict the root rows; filters are AND-ed.
    pub fn filter(mut self, evaluation: Evaluation) -> Self {
        self.filters.push(evaluation);
        self
    }

    pub fn join(mut self, node: JoinNode) -> Self {
        self.joins.push(node);
        self
    }

    /// Join every auto-joinable relation reachable from the root.
    pub fn join_all(mut self) -> Result<Self> {
        let nodes = join::join_all(self.provider, self.root.target().name())?;
        self.joins.extend(nodes);
        Ok(self)
    }

    /// Join every relation tagged with one of `profiles`.
    pub fn join_profiles(mut self, profiles: &[&str]) -> Result<Self> {
        let nodes = join::join_profiles(self.provider, self.root.target().name(), profiles)?;
        self.joins.extend(nodes);
        Ok(self)
    }

    /// Order roots by a root field. The id is always the final tiebreak.
    pub fn order_by(mut self, field: &str, dir: SortDir) -> Self {
        self.order.push((field.to_string(), dir));
        self
    }

    /// Skip `offset` roots and return at most `limit`.
    pub fn page(mut self, offset: u64, limit: u64) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn paging_method(mut self, method: PagingMethod) -> Self {
        self.paging_method = Some(method);
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> &Context {
        &self.root
    }

    pub fn is_paged(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }

    /// The strategy and paging method this select uses on `dialect`.
    pub fn resolve(&self, dialect: Dialect) -> (Strategy, PagingMethod) {
        let method = self
            .paging_method
            .unwrap_or_else(|| self.options.paging_method(dialect));
        let requested = self.strategy.unwrap_or(self.options.strategy);
        let strategy = if !self.is_paged() {
            match requested {
                Strategy::Auto => Strategy::Exists,
                other => other,
            }
        } else if !method.is_server_side() {
            Strategy::TwoQuery
        } else {
            match requested {
                Strategy::TwoQuery => Strategy::TwoQuery,
                Strategy::Exists => {
                    tracing::debug!("EXISTS cannot page roots independently of joins; using IN");
                    Strategy::In
                }
                Strategy::Auto | Strategy::In => Strategy::In,
            }
        };
        (strategy, method)
    }

    /// Statements this select runs first on `dialect`. For the two-query
    /// strategy that is the id query; the data queries depend on its result.
    pub fn statements(&self, dialect: Dialect) -> Result<Vec<Statement>> {
        Ok(match self.plan(dialect)? {
            Plan::Single(statement) => vec![statement],
            Plan::TwoQuery { ids, .. } => vec![ids],
        })
    }

    /// [`Select::statements`] on the dialect named in the options.
    pub fn preview(&self) -> Result<Vec<Statement>> {
        self.statements(self.options.dialect)
    }

    pub fn execute(&self, conn: &dyn Connection) -> Result<Vec<Object>> {
        let mut cache = FirstLevelCache::new();
        self.execute_with(conn, &mut cache)
    }

    /// Execute, sharing `cache` with the caller's other operations.
    pub fn execute_with(&self, conn: &dyn Connection, cache: &mut FirstLevelCache) -> Result<Vec<Object>> {
        self.run(conn, cache).map(|(objects, _)| objects)
    }

    /// Execute, also returning how many statements ran.
    pub(crate) fn run(&self, conn: &dyn Connection, cache: &mut FirstLevelCache) -> Result<(Vec<Object>, usize)> {
        let dialect = conn.dialect();
        let mut mapper = Mapper::new(self.layout()?);
        let mut statements = 0;
        match self.plan(dialect)? {
            Plan::Single(statement) => {
                let rows = run_query(conn, &statement)?;
                statements += 1;
                mapper.consume(&rows, cache);
            }
            Plan::TwoQuery { ids, slice } => {
                let ids = self.collect_ids(conn, &ids, slice)?;
                statements += 1;
                for chunk in ids.chunks(self.options.in_list_ceiling(dialect)) {
                    let statement = self.data_statement_for(chunk, dialect)?;
                    let rows = run_query(conn, &statement)?;
                    statements += 1;
                    mapper.consume(&rows, cache);
                }
                mapper.order_by_ids(&ids);
            }
        }
        Ok((mapper.finish(), statements))
    }

    /// Number of distinct roots matching the restriction. Paging is ignored.
    pub fn count(&self, conn: &dyn Connection) -> Result<u64> {
        let dialect = conn.dialect();
        let (joins, condition) = self.restriction(&self.root)?;
        let mut query = Query::new()
            .select(vec![count_distinct(self.root.id_column())])
            .from(self.root.table_ref())
            .joins(joins);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        let statement = self.finish_statement(query.to_statement(dialect), dialect);
        let rows = run_query(conn, &statement)?;
        match rows.rows.first().and_then(|r| r.first()) {
            Some(Value::Int(n)) => Ok(u64::try_from(*n).unwrap_or_default()),
            other => Err(Error::InvalidQuery(format!(
                "COUNT returned {other:?} instead of an integer"
            ))),
        }
    }

    /// Ids of the matching roots in result order, paging applied.
    pub fn ids(&self, conn: &dyn Connection) -> Result<Vec<Key>> {
        let dialect = conn.dialect();
        let (_, method) = self.resolve(dialect);
        let server_side = self.is_paged() && method.is_server_side();
        let query = self.id_query(&self.root, true, server_side.then_some(method))?;
        let statement = self.finish_statement(query.to_statement(dialect), dialect);
        self.collect_ids(conn, &statement, self.is_paged() && !server_side)
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    fn layout(&self) -> Result<RowLayout> {
        let steps = walk(&self.joins, &self.root, self.provider)?;
        Ok(RowLayout::new(&self.root, &steps))
    }

    fn plan(&self, dialect: Dialect) -> Result<Plan> {
        let (strategy, method) = self.resolve(dialect);
        tracing::debug!(
            entity = %self.root.target().name(),
            ?strategy,
            ?method,
            paged = self.is_paged(),
            "planning select"
        );
        let data = self.data_query()?;
        let plan = match strategy {
            Strategy::TwoQuery => {
                let server_side = self.is_paged() && method.is_server_side();
                let ids = self.id_query(&self.root, true, server_side.then_some(method))?;
                Plan::TwoQuery {
                    ids: self.finish_statement(ids.to_statement(dialect), dialect),
                    slice: self.is_paged() && !server_side,
                }
            }
            Strategy::In => {
                let sub = self.root.relabel(SUBQUERY_SUFFIX);
                let query = if self.is_paged() {
                    let window = self.id_query(&sub, true, Some(method))?;
                    let page = Query::new()
                        .select(vec![table_col(PAGE_ALIAS, ID_ALIAS)])
                        .from(TableRef::derived(window, PAGE_ALIAS));
                    data.filter(self.root.id_column().in_subquery(page))
                } else if self.is_restricted()? {
                    let ids = self.id_query(&sub, false, None)?;
                    data.filter(self.root.id_column().in_subquery(ids))
                } else {
                    data
                };
                Plan::Single(self.finish_statement(query.to_statement(dialect), dialect))
            }
            Strategy::Exists | Strategy::Auto => {
                let sub = self.root.relabel(SUBQUERY_SUFFIX);
                let (joins, condition) = self.restriction(&sub)?;
                let query = match condition {
                    Some(condition) => {
                        let probe = Query::new()
                            .select(vec![lit_int(1)])
                            .from(sub.table_ref())
                            .joins(joins)
                            .filter(sub.id_column().eq(self.root.id_column()))
                            .filter(condition);
                        data.filter(exists(probe))
                    }
                    None => data,
                };
                Plan::Single(self.finish_statement(query.to_statement(dialect), dialect))
            }
        };
        Ok(plan)
    }

    fn finish_statement(&self, statement: Statement, dialect: Dialect) -> Statement {
        let ceiling = self.options.parameter_ceiling(dialect);
        if statement.bind_count() > ceiling {
            tracing::warn!(
                parameters = statement.bind_count(),
                ceiling,
                "select binds more parameters than the dialect accepts"
            );
        }
        statement.with_timeout(self.options.timeout)
    }

    fn is_restricted(&self) -> Result<bool> {
        Ok(self.restriction(&self.root)?.1.is_some())
    }

    fn restriction(&self, ctx: &Context) -> Result<(Vec<Join>, Option<Expr>)> {
        restriction(self.provider, &self.filters, &self.joins, ctx)
    }

    /// Root ordering at `ctx`, closed with the id.
    fn order_exprs(&self, ctx: &Context) -> Result<Vec<OrderByExpr>> {
        let id_name = &ctx.target().id_field().name;
        let mut out = Vec::with_capacity(self.order.len() + 1);
        for (field, dir) in &self.order {
            out.push(OrderByExpr::new(ctx.column(field)?, *dir));
        }
        if !self.order.iter().any(|(f, _)| f == id_name) {
            out.push(OrderByExpr::asc(ctx.id_column()));
        }
        Ok(out)
    }

    /// Distinct ids of roots matching the restriction at `ctx`.
    ///
    /// Ordered queries also select the ordering columns so DISTINCT and
    /// ORDER BY agree.
    fn id_query(&self, ctx: &Context, ordered: bool, window: Option<PagingMethod>) -> Result<Query> {
        let (joins, condition) = self.restriction(ctx)?;
        let has_joins = !joins.is_empty();
        let mut query = Query::new().from(ctx.table_ref()).joins(joins);
        if let Some(condition) = condition {
            query = query.filter(condition);
        }
        if !ordered {
            query = query.select(vec![ctx.id_column()]);
            return Ok(if has_joins { query.distinct() } else { query });
        }

        let order = self.order_exprs(ctx)?;
        let id_column = ctx.id_column();
        let mut select = vec![SelectExpr::new(id_column.clone()).with_alias(ID_ALIAS)];
        for (i, o) in order.iter().enumerate() {
            if o.expr != id_column {
                select.push(SelectExpr::new(o.expr.clone()).with_alias(&format!("o{i}")));
            }
        }
        query = query.select(select).distinct().order_by(order);
        if let Some(method) = window {
            query = query.page(self.offset, self.limit, Some(method));
        }
        Ok(query)
    }

    /// Every mapped column of the root and joined contexts.
    fn data_query(&self) -> Result<Query> {
        let layout = self.layout()?;
        let topology = to_sql_join(&self.joins, &self.root, self.provider, false)?;
        let mut order = self.order_exprs(&self.root)?;
        order.extend(layout.joined_id_columns().into_iter().map(OrderByExpr::asc));
        Ok(Query::new()
            .select(layout.select_list())
            .from(self.root.table_ref())
            .joins(topology.joins())
            .order_by(order))
    }

    fn data_statement_for(&self, ids: &[Key], dialect: Dialect) -> Result<Statement> {
        let descriptor = self.root.target();
        let id_name = &descriptor.id_field().name;
        let values = ids
            .iter()
            .map(|id| Expr::Param(Parameter::field(descriptor.name(), id_name, id)))
            .collect();
        let query = self.data_query()?.filter(self.root.id_column().in_list(values));
        Ok(self.finish_statement(query.to_statement(dialect), dialect))
    }

    /// Run an id statement, deduplicate and optionally slice in memory.
    fn collect_ids(&self, conn: &dyn Connection, statement: &Statement, slice: bool) -> Result<Vec<Key>> {
        let rows = run_query(conn, statement)?;
        let mut seen = HashSet::new();
        let mut ids: Vec<Key> = rows
            .iter()
            .filter_map(|row| row.first().and_then(Value::as_key))
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if slice {
            let offset = usize::try_from(self.offset.unwrap_or(0)).unwrap_or(usize::MAX);
            let limit = self
                .limit
                .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
            ids = ids.into_iter().skip(offset).take(limit).collect();
        }
        Ok(ids)
    }
}

/// Joins and WHERE condition restricting roots at `ctx`.
pub(super) fn restriction(
    provider: &dyn MappingProvider,
    filters: &[Evaluation],
    joins: &[JoinNode],
    ctx: &Context,
) -> Result<(Vec<Join>, Option<Expr>)> {
    let set = to_sql_join(joins, ctx, provider, true)?;
    let mut parts = Vec::new();
    for filter in filters {
        if let Some(expr) = filter.to_expr(ctx, provider)? {
            parts.push(expr);
        }
    }
    parts.extend(set.filters());
    Ok((set.joins(), conjunction(parts)))
}

impl std::fmt::Debug for Select<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Select")
            .field("root", &self.root)
            .field("filters", &self.filters)
            .field("joins", &self.joins)
            .field("order", &self.order)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{EntityDescriptor, FieldKind, IdGeneration, JoinSide, RelationDescriptor, Registry};

    pub(crate) fn library() -> Registry {
        Registry::builder()
            .entity(
                EntityDescriptor::builder("Author")
                    .id("id", FieldKind::Int, IdGeneration::Identity)
                    .field("name", FieldKind::Text)
                    .relation(RelationDescriptor::many("books", "Book").join_column("author_id", JoinSide::Remote))
                    .build()
                    .unwrap(),
            )
            .entity(
                EntityDescriptor::builder("Book")
                    .id("id", FieldKind::Int, IdGeneration::Identity)
                    .field("title", FieldKind::Text)
                    .relation(RelationDescriptor::one("author", "Author").join_column("author_id", JoinSide::Local))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_preview_uses_configured_dialect() {
        let reg = library();
        let settings = crate::config::Settings::from_toml("[engine]\ndialect = \"mysql\"").unwrap();
        let select = Select::new(&reg, "Author")
            .unwrap()
            .options(ExecutionOptions::from_settings(&settings).unwrap());
        let preview = select.preview().unwrap();
        assert_eq!(preview, select.statements(Dialect::MySql).unwrap());
        assert!(preview[0].sql.contains("`Author`.`id`"));
    }

    #[test]
    fn test_auto_strategy_resolution() {
        let reg = library();
        let select = Select::new(&reg, "Author").unwrap();
        assert_eq!(select.resolve(Dialect::Sqlite).0, Strategy::Exists);

        let paged = select.clone().page(0, 10);
        assert_eq!(paged.resolve(Dialect::Sqlite), (Strategy::In, PagingMethod::LimitOffset));
        assert_eq!(paged.resolve(Dialect::TSql), (Strategy::In, PagingMethod::OffsetFetch));

        let forced = paged.clone().strategy(Strategy::Exists);
        assert_eq!(forced.resolve(Dialect::Sqlite).0, Strategy::In);

        let no_sql_paging = paged.paging_method(PagingMethod::TwoQuery);
        assert_eq!(no_sql_paging.resolve(Dialect::Sqlite).0, Strategy::TwoQuery);
    }

    #[test]
    fn test_unrestricted_exists_is_plain_select() {
        let reg = library();
        let statements = Select::new(&reg, "Author").unwrap().statements(Dialect::Sqlite).unwrap();
        assert_eq!(statements.len(), 1);
        assert!(!statements[0].sql.contains("EXISTS"));
        assert!(!statements[0].sql.contains("WHERE"));
    }

    #[test]
    fn test_unknown_order_field_is_rejected() {
        let reg = library();
        let err = Select::new(&reg, "Author")
            .unwrap()
            .order_by("age", SortDir::Desc)
            .statements(Dialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn test_two_query_plan_returns_id_statement() {
        let reg = library();
        let statements = Select::new(&reg, "Author")
            .unwrap()
            .filter(Evaluation::like("name", "A%"))
            .strategy(Strategy::TwoQuery)
            .statements(Dialect::Sqlite)
            .unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].sql.starts_with("SELECT DISTINCT"));
        assert_eq!(statements[0].bind_count(), 1);
    }

    mod snapshot_tests {
        use super::*;
        use crate::sql::test_utils::validate_sql;
        use insta::assert_snapshot;

        fn restricted(reg: &Registry) -> Select<'_> {
            Select::new(reg, "Author")
                .unwrap()
                .filter(Evaluation::like("name", "A%"))
                .join(
                    JoinNode::new(reg, "Author", "books")
                        .unwrap()
                        .filter(Evaluation::eq("title", "Dune")),
                )
        }

        #[test]
        fn test_exists_strategy_postgres() {
            let reg = library();
            let st = restricted(&reg).statements(Dialect::Postgres).unwrap().remove(0);
            assert_snapshot!(st.sql, @r#"
            SELECT
              "Author"."id",
              "Author"."name",
              "Author$books$Book"."id",
              "Author$books$Book"."title"
            FROM "author" AS "Author"
            LEFT JOIN "book" AS "Author$books$Book" ON "Author$books$Book"."author_id" = "Author"."id"
            WHERE EXISTS (SELECT
              1
            FROM "author" AS "Author_0"
            LEFT JOIN "book" AS "Author$books$Book_0" ON "Author$books$Book_0"."author_id" = "Author_0"."id"
            WHERE "Author_0"."id" = "Author"."id" AND "Author_0"."name" LIKE ? AND "Author$books$Book_0"."title" = ?)
            ORDER BY "Author"."id" ASC, "Author$books$Book"."id" ASC
            "#);
            assert_eq!(st.bind_count(), 2);
            validate_sql(&st.sql, Dialect::Postgres).unwrap();
        }

        #[test]
        fn test_paged_in_strategy_mysql() {
            let reg = library();
            let st = restricted(&reg)
                .order_by("name", SortDir::Desc)
                .page(2, 2)
                .statements(Dialect::MySql)
                .unwrap()
                .remove(0);
            assert!(st.sql.contains("IN (SELECT\n  `page`.`id`"));
            assert!(st.sql.contains("LIMIT 2 OFFSET 2"));
            validate_sql(&st.sql, Dialect::MySql).unwrap();
        }

        #[test]
        fn test_paged_in_strategy_tsql() {
            let reg = library();
            let st = restricted(&reg)
                .page(2, 2)
                .statements(Dialect::TSql)
                .unwrap()
                .remove(0);
            assert!(st.sql.contains("OFFSET 2 ROWS FETCH NEXT 2 ROWS ONLY"));
            validate_sql(&st.sql, Dialect::TSql).unwrap();
        }
    }
}
