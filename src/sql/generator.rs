use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock};

use lru::LruCache;

use crate::core::{DbError, Result};
use crate::dialect::{Dialect, LockMode};
use crate::mapping::{AggregatePath, RelationalPersistentEntity, SqlIdentifier};

use super::model::{
    BindMarker, ColumnRef, Condition, Delete, Expression, Insert, Join, OrderByField, Select,
    Statement, TableRef, Update,
};
use super::render::SqlRenderer;
use super::sort::{Pageable, Sort};

pub const ID_PARAMETER: &str = "id";
pub const IDS_PARAMETER: &str = "ids";
pub const ROOT_ID_PARAMETER: &str = "rootId";
pub const VERSION_PARAMETER: &str = "___oldOptimisticLockingVersion";

const INSERT_CACHE_SIZE: usize = 64;

/// Rendered SQL together with the model it was rendered from.
#[derive(Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub model: Arc<Statement>,
}

impl SqlStatement {
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

impl fmt::Debug for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SqlStatement({})", self.sql)
    }
}

/// Whether the columns of `path` come back with a select of its root, either from
/// the root table itself or through a chain of one-to-one joins.
pub fn is_selected_with_root(path: &AggregatePath) -> bool {
    let owner = path.table_owning_path();
    if owner.is_root() {
        return true;
    }
    if owner.is_multi_valued() {
        return false;
    }
    match owner.id_defining_parent_path() {
        Ok(parent) => {
            let parent_has_id = parent
                .leaf_entity()
                .is_some_and(|entity| entity.has_id_property());
            parent_has_id && is_selected_with_root(&parent)
        }
        Err(_) => false,
    }
}

fn table_ref(path: &AggregatePath) -> Result<TableRef> {
    let info = path.table_info()?;
    Ok(TableRef::aliased(info.qualified_table_name, info.table_alias))
}

/// SQL statements for one entity type.
///
/// Statements that do not depend on arguments are rendered once and cached.
pub struct SqlGenerator {
    entity: Arc<RelationalPersistentEntity>,
    root: AggregatePath,
    renderer: SqlRenderer,
    find_one: OnceLock<SqlStatement>,
    find_all: OnceLock<SqlStatement>,
    find_all_in_list: OnceLock<SqlStatement>,
    exists: OnceLock<SqlStatement>,
    count: OnceLock<SqlStatement>,
    update: OnceLock<SqlStatement>,
    update_with_version: OnceLock<SqlStatement>,
    delete_by_id: OnceLock<SqlStatement>,
    delete_by_id_and_version: OnceLock<SqlStatement>,
    delete_by_list: OnceLock<SqlStatement>,
    insert_cache: Mutex<LruCache<Vec<SqlIdentifier>, SqlStatement>>,
}

impl SqlGenerator {
    pub fn new(entity: Arc<RelationalPersistentEntity>, dialect: &'static dyn Dialect) -> Self {
        let capacity = NonZeroUsize::new(INSERT_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            root: AggregatePath::root(entity.clone()),
            entity,
            renderer: SqlRenderer::new(dialect),
            find_one: OnceLock::new(),
            find_all: OnceLock::new(),
            find_all_in_list: OnceLock::new(),
            exists: OnceLock::new(),
            count: OnceLock::new(),
            update: OnceLock::new(),
            update_with_version: OnceLock::new(),
            delete_by_id: OnceLock::new(),
            delete_by_id_and_version: OnceLock::new(),
            delete_by_list: OnceLock::new(),
            insert_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn entity(&self) -> &Arc<RelationalPersistentEntity> {
        &self.entity
    }

    pub fn root_path(&self) -> &AggregatePath {
        &self.root
    }

    fn statement(&self, model: Statement) -> Result<SqlStatement> {
        let sql = self.renderer.render(&model)?;
        Ok(SqlStatement {
            sql,
            model: Arc::new(model),
        })
    }

    fn cached(
        &self,
        cell: &OnceLock<SqlStatement>,
        build: impl FnOnce() -> Result<Statement>,
    ) -> Result<SqlStatement> {
        if let Some(statement) = cell.get() {
            return Ok(statement.clone());
        }
        let statement = self.statement(build()?)?;
        Ok(cell.get_or_init(|| statement).clone())
    }

    fn table(&self) -> TableRef {
        TableRef::new(self.entity.qualified_table_name().clone())
    }

    fn id_column(&self) -> Result<ColumnRef> {
        let id = self.entity.id_column().ok_or_else(|| {
            DbError::Mapping(format!(
                "Entity '{}' has no id property",
                self.entity.type_name()
            ))
        })?;
        Ok(self.table().column(id.clone()))
    }

    fn version_column(&self) -> Result<ColumnRef> {
        let version = self.entity.version_property().ok_or_else(|| {
            DbError::Mapping(format!(
                "Entity '{}' has no version property",
                self.entity.type_name()
            ))
        })?;
        Ok(self.table().column(version.column_name().clone()))
    }

    /// Simple property paths stored in this entity's own table.
    fn own_column_paths(&self) -> Vec<AggregatePath> {
        self.root
            .descendants()
            .into_iter()
            .filter(|p| !p.is_entity() && p.table_owning_path().is_root())
            .collect()
    }

    fn join(&self, path: &AggregatePath) -> Result<Option<Join>> {
        if !path.is_entity() || path.is_embedded() || path.is_multi_valued() {
            return Ok(None);
        }
        if !is_selected_with_root(path) {
            return Ok(None);
        }
        let parent = path.id_defining_parent_path()?;
        let info = path.table_info()?;
        let parent_info = parent.table_info()?;
        let (Some(reverse), Some(parent_id)) = (info.reverse_column, parent_info.id_column) else {
            return Ok(None);
        };
        let table = TableRef::aliased(info.qualified_table_name, info.table_alias);
        let parent_table = table_ref(&parent)?;
        Ok(Some(Join {
            left: table.column(reverse.name),
            right: parent_table.column(parent_id),
            table,
        }))
    }

    fn column(&self, path: &AggregatePath) -> Result<Option<Expression>> {
        if path.is_embedded() || path.is_multi_valued() || !is_selected_with_root(path) {
            return Ok(None);
        }
        if path.is_entity() {
            if path.has_id_property() {
                return Ok(None);
            }
            // Distinguishes a missing child from one whose columns are all NULL.
            let info = path.table_info()?;
            let Some(reverse) = info.reverse_column else {
                return Ok(None);
            };
            let table = TableRef::aliased(info.qualified_table_name, info.table_alias);
            return Ok(Some(Expression::Aliased(
                table.column(reverse.name),
                reverse.alias,
            )));
        }
        let info = path.column_info()?;
        let table = table_ref(&path.table_owning_path())?;
        Ok(Some(Expression::Aliased(table.column(info.name), info.alias)))
    }

    fn select_all(&self, extra: Vec<Expression>) -> Result<Select> {
        let mut projection = Vec::new();
        let mut joins = Vec::new();
        for path in self.root.descendants() {
            if let Some(join) = self.join(&path)? {
                joins.push(join);
            }
            if let Some(column) = self.column(&path)? {
                projection.push(column);
            }
        }
        projection.extend(extra);

        let mut select = Select::new(projection, self.table());
        for join in joins {
            select = select.join(join);
        }
        Ok(select)
    }

    fn order_by_fields(&self, sort: &Sort) -> Result<Vec<OrderByField>> {
        sort.orders()
            .iter()
            .map(|order| {
                let path = self.resolve_property(&order.property)?;
                if path.is_entity() || !is_selected_with_root(&path) {
                    return Err(DbError::InvalidApiUsage(format!(
                        "Cannot sort '{}' by '{}'",
                        self.entity.type_name(),
                        order.property
                    )));
                }
                let info = path.column_info()?;
                let table = table_ref(&path.table_owning_path())?;
                Ok(OrderByField {
                    column: table.column(info.name),
                    direction: order.direction,
                    nulls: order.nulls,
                })
            })
            .collect()
    }

    fn resolve_property(&self, dot_path: &str) -> Result<AggregatePath> {
        let mut path = self.root.clone();
        for segment in dot_path.split('.') {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    pub fn find_one(&self) -> Result<SqlStatement> {
        self.cached(&self.find_one, || {
            let id = self.id_column()?;
            Ok(Statement::Select(
                self.select_all(Vec::new())?
                    .filter(Condition::Equal(id, BindMarker::new(ID_PARAMETER))),
            ))
        })
    }

    pub fn find_all(&self) -> Result<SqlStatement> {
        self.cached(&self.find_all, || {
            Ok(Statement::Select(self.select_all(Vec::new())?))
        })
    }

    pub fn find_all_in_list(&self) -> Result<SqlStatement> {
        self.cached(&self.find_all_in_list, || {
            let id = self.id_column()?;
            Ok(Statement::Select(
                self.select_all(Vec::new())?
                    .filter(Condition::In(id, BindMarker::new(IDS_PARAMETER))),
            ))
        })
    }

    /// Select of the elements referencing a parent, filtered on every identifier
    /// column. `key_column` is selected, and sorted on when `ordered`.
    pub fn find_all_by_property(
        &self,
        identifier_columns: &[SqlIdentifier],
        key_column: Option<&SqlIdentifier>,
        ordered: bool,
    ) -> Result<SqlStatement> {
        let table = self.table();
        let extra = key_column
            .map(|key| vec![Expression::Column(table.column(key.clone()))])
            .unwrap_or_default();
        let mut select = self.select_all(extra)?;

        for column in identifier_columns {
            select = select.filter(Condition::Equal(
                table.column(column.clone()),
                BindMarker::for_column(column),
            ));
        }
        if let (true, Some(key)) = (ordered, key_column) {
            select = select.order_by(OrderByField {
                column: table.column(key.clone()),
                direction: Default::default(),
                nulls: Default::default(),
            });
        }
        self.statement(Statement::Select(select))
    }

    pub fn find_all_sorted(&self, sort: &Sort) -> Result<SqlStatement> {
        let mut select = self.select_all(Vec::new())?;
        for field in self.order_by_fields(sort)? {
            select = select.order_by(field);
        }
        self.statement(Statement::Select(select))
    }

    pub fn find_all_paged(&self, pageable: &Pageable) -> Result<SqlStatement> {
        let mut select = self.select_all(Vec::new())?;
        for field in self.order_by_fields(pageable.sort())? {
            select = select.order_by(field);
        }
        let offset = (pageable.offset() > 0).then_some(pageable.offset());
        self.statement(Statement::Select(
            select.limit_offset(Some(pageable.size()), offset),
        ))
    }

    pub fn exists(&self) -> Result<SqlStatement> {
        self.cached(&self.exists, || {
            let id = self.id_column()?;
            Ok(Statement::Select(
                Select::new(vec![Expression::Count(id.clone())], self.table())
                    .filter(Condition::Equal(id, BindMarker::new(ID_PARAMETER))),
            ))
        })
    }

    pub fn count(&self) -> Result<SqlStatement> {
        self.cached(&self.count, || {
            Ok(Statement::Select(Select::new(
                vec![Expression::CountAll],
                self.table(),
            )))
        })
    }

    /// Columns written on insert besides `additional_columns`: every column of
    /// this table except the id and read-only ones.
    pub fn insertable_columns(&self) -> Result<Vec<SqlIdentifier>> {
        let mut columns = Vec::new();
        for path in self.own_column_paths() {
            let property = path.required_leaf_property()?;
            if property.is_read_only() || (property.is_id() && path.len() == 1) {
                continue;
            }
            columns.push(path.column_info()?.name);
        }
        Ok(columns)
    }

    /// Columns written on update: insertable columns minus insert-only ones.
    pub fn updatable_columns(&self) -> Result<Vec<SqlIdentifier>> {
        let mut columns = Vec::new();
        for path in self.own_column_paths() {
            let property = path.required_leaf_property()?;
            if property.is_read_only() || property.is_insert_only() || property.is_id() {
                continue;
            }
            columns.push(path.column_info()?.name);
        }
        Ok(columns)
    }

    pub fn insert(&self, additional_columns: &[SqlIdentifier]) -> Result<SqlStatement> {
        let mut key = additional_columns.to_vec();
        key.sort();
        key.dedup();

        if let Some(statement) = self.insert_cache.lock()?.get(&key) {
            return Ok(statement.clone());
        }

        let mut columns = self.insertable_columns()?;
        for column in &key {
            if !columns.iter().any(|c| c.matches(column)) {
                columns.push(column.clone());
            }
        }
        columns.sort_by(|a, b| a.reference().cmp(b.reference()));

        let values = columns.iter().map(BindMarker::for_column).collect();
        let statement = self.statement(Statement::Insert(Insert {
            table: self.table(),
            columns,
            values,
        }))?;

        self.insert_cache.lock()?.put(key, statement.clone());
        Ok(statement)
    }

    fn update_model(&self) -> Result<Update> {
        let id = self.id_column()?;
        let mut assignments: Vec<_> = self
            .updatable_columns()?
            .into_iter()
            .map(|c| {
                let marker = BindMarker::for_column(&c);
                (c, marker)
            })
            .collect();
        if assignments.is_empty() {
            assignments.push((id.name.clone(), BindMarker::for_column(&id.name)));
        }
        let marker = BindMarker::for_column(&id.name);
        Ok(Update {
            table: self.table(),
            assignments,
            condition: Some(Condition::Equal(id, marker)),
        })
    }

    pub fn update(&self) -> Result<SqlStatement> {
        self.cached(&self.update, || Ok(Statement::Update(self.update_model()?)))
    }

    pub fn update_with_version(&self) -> Result<SqlStatement> {
        self.cached(&self.update_with_version, || {
            let mut update = self.update_model()?;
            let version = self.version_column()?;
            update.condition = update
                .condition
                .map(|c| c.and(Condition::Equal(version, BindMarker::new(VERSION_PARAMETER))));
            Ok(Statement::Update(update))
        })
    }

    pub fn delete_by_id(&self) -> Result<SqlStatement> {
        self.cached(&self.delete_by_id, || {
            Ok(Statement::Delete(Delete {
                table: self.table(),
                condition: Some(Condition::Equal(
                    self.id_column()?,
                    BindMarker::new(ID_PARAMETER),
                )),
            }))
        })
    }

    pub fn delete_by_id_and_version(&self) -> Result<SqlStatement> {
        self.cached(&self.delete_by_id_and_version, || {
            let condition = Condition::Equal(self.id_column()?, BindMarker::new(ID_PARAMETER))
                .and(Condition::Equal(
                    self.version_column()?,
                    BindMarker::new(VERSION_PARAMETER),
                ));
            Ok(Statement::Delete(Delete {
                table: self.table(),
                condition: Some(condition),
            }))
        })
    }

    pub fn delete_by_list(&self) -> Result<SqlStatement> {
        self.cached(&self.delete_by_list, || {
            Ok(Statement::Delete(Delete {
                table: self.table(),
                condition: Some(Condition::In(
                    self.id_column()?,
                    BindMarker::new(IDS_PARAMETER),
                )),
            }))
        })
    }

    /// Deletes every row of this entity's table, or of the table behind `path`.
    pub fn delete_all(&self, path: Option<&AggregatePath>) -> Result<SqlStatement> {
        match path {
            None => self.statement(Statement::Delete(Delete {
                table: self.table(),
                condition: None,
            })),
            Some(path) => self.delete_by_path_and_criteria(path, &|column| {
                Condition::IsNotNull(column)
            }),
        }
    }

    /// Deletes the rows behind `path` belonging to the root with id `:rootId`.
    pub fn delete_by_path(&self, path: &AggregatePath) -> Result<SqlStatement> {
        self.delete_by_path_and_criteria(path, &|column| {
            Condition::Equal(column, BindMarker::new(ROOT_ID_PARAMETER))
        })
    }

    /// Deletes the rows behind `path` belonging to any root in `:ids`.
    pub fn delete_in_by_path(&self, path: &AggregatePath) -> Result<SqlStatement> {
        self.delete_by_path_and_criteria(path, &|column| {
            Condition::In(column, BindMarker::new(IDS_PARAMETER))
        })
    }

    fn delete_by_path_and_criteria(
        &self,
        path: &AggregatePath,
        root_condition: &dyn Fn(ColumnRef) -> Condition,
    ) -> Result<SqlStatement> {
        let info = path.table_info()?;
        let table = TableRef::new(info.qualified_table_name);
        let reverse = info.reverse_column.ok_or_else(|| {
            DbError::IllegalState(format!("Path '{}' has no back-reference column", path))
        })?;
        let filter = table.column(reverse.name);

        let condition = if path.len() == 1 {
            root_condition(filter)
        } else {
            self.subselect_condition(path, root_condition, filter)?
        };
        self.statement(Statement::Delete(Delete {
            table,
            condition: Some(condition),
        }))
    }

    /// Builds `filter IN (SELECT id FROM parent WHERE ...)` up to the root,
    /// skipping parents without an id of their own.
    fn subselect_condition(
        &self,
        path: &AggregatePath,
        root_condition: &dyn Fn(ColumnRef) -> Condition,
        filter: ColumnRef,
    ) -> Result<Condition> {
        let parent = path.parent().ok_or_else(|| {
            DbError::IllegalState(format!("Path '{}' has no parent", path))
        })?;

        if !parent.has_id_property() {
            if parent.len() > 1 {
                return self.subselect_condition(&parent, root_condition, filter);
            }
            return Ok(root_condition(filter));
        }

        let info = parent.table_info()?;
        let table = TableRef::new(info.qualified_table_name);
        let id = info.id_column.ok_or_else(|| {
            DbError::IllegalState(format!("Path '{}' has no id column", parent))
        })?;
        let select_filter = info.effective_id_column.ok_or_else(|| {
            DbError::IllegalState(format!("Path '{}' has no back-reference column", parent))
        })?;
        let select_filter = table.column(select_filter);

        let inner = if parent.len() == 1 {
            root_condition(select_filter)
        } else {
            self.subselect_condition(&parent, root_condition, select_filter)?
        };

        let select = Select::new(vec![Expression::Column(table.column(id))], table).filter(inner);
        Ok(Condition::InSelect(filter, Box::new(select)))
    }

    pub fn acquire_lock_by_id(&self, mode: LockMode) -> Result<SqlStatement> {
        let id = self.id_column()?;
        let select = Select::new(vec![Expression::Column(id.clone())], self.table())
            .filter(Condition::Equal(id, BindMarker::new(ID_PARAMETER)))
            .lock(mode);
        self.statement(Statement::Select(select))
    }

    pub fn acquire_lock_all(&self, mode: LockMode) -> Result<SqlStatement> {
        let select = Select::new(vec![Expression::Column(self.id_column()?)], self.table()).lock(mode);
        self.statement(Statement::Select(select))
    }

    /// Query for the next value of the id property's sequence.
    pub fn next_sequence_value(&self) -> Result<SqlStatement> {
        let sequence = self
            .entity
            .id_property()
            .and_then(|p| p.sequence())
            .ok_or_else(|| {
                DbError::Mapping(format!(
                    "Entity '{}' has no id sequence",
                    self.entity.type_name()
                ))
            })?;
        self.statement(Statement::NextSequenceValue(sequence.clone()))
    }
}
