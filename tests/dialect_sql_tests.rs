use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use relmap::dialect::{PostgresDialect, SqliteDialect};
use relmap::jdbc::{KeyHolder, SqlParameterSource};
use relmap::sql::SqlStatement;
use relmap::{
    Dialect, Entity, InMemoryDatabase, JdbcAggregateTemplate, JdbcOperations,
    RelationalMappingContext, Result, Row, Value,
};

#[derive(Debug, Clone, PartialEq, Entity)]
struct Ticket {
    #[column(id)]
    id: Option<i64>,
    title: String,
    comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Comment {
    text: String,
}

/// Forwards to an in-memory database and keeps the SQL of every statement.
struct RecordingOperations {
    inner: InMemoryDatabase,
    statements: Mutex<Vec<String>>,
}

impl RecordingOperations {
    fn new(inner: InMemoryDatabase) -> Self {
        Self {
            inner,
            statements: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, statement: &SqlStatement) {
        if let Ok(mut statements) = self.statements.lock() {
            statements.push(statement.sql.clone());
        }
    }

    fn take(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|mut statements| std::mem::take(&mut *statements))
            .unwrap_or_default()
    }
}

#[async_trait]
impl JdbcOperations for RecordingOperations {
    async fn query(&self, statement: &SqlStatement, params: &SqlParameterSource) -> Result<Vec<Row>> {
        self.record(statement);
        self.inner.query(statement, params).await
    }

    async fn update(&self, statement: &SqlStatement, params: &SqlParameterSource) -> Result<u64> {
        self.record(statement);
        self.inner.update(statement, params).await
    }

    async fn update_returning_keys(
        &self,
        statement: &SqlStatement,
        params: &SqlParameterSource,
        key_columns: Option<&[String]>,
    ) -> Result<KeyHolder> {
        self.record(statement);
        self.inner
            .update_returning_keys(statement, params, key_columns)
            .await
    }
}

fn recording_template(
    force_quote: bool,
    dialect: &'static dyn Dialect,
) -> Result<(JdbcAggregateTemplate, Arc<RecordingOperations>)> {
    let context = RelationalMappingContext::builder()
        .entity::<Ticket>()
        .force_quote(force_quote)
        .build()?;
    let operations = Arc::new(RecordingOperations::new(InMemoryDatabase::new(
        &context, dialect,
    )?));
    let template = JdbcAggregateTemplate::from_operations(context, dialect, operations.clone())?;
    Ok((template, operations))
}

fn ticket(title: &str, comments: &[&str]) -> Ticket {
    Ticket {
        id: None,
        title: title.to_string(),
        comments: comments
            .iter()
            .map(|text| Comment {
                text: text.to_string(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_root_statements_without_quoting() -> Result<()> {
    let (template, operations) = recording_template(false, &PostgresDialect)?;

    let saved = template.save(ticket("bug", &[])).await?;
    let id = saved.id.expect("id");
    assert_eq!(
        operations.take(),
        vec!["INSERT INTO ticket (title) VALUES (:title)".to_string()]
    );

    template.count::<Ticket>().await?;
    assert_eq!(operations.take(), vec!["SELECT COUNT(*) FROM ticket".to_string()]);

    template.exists_by_id::<Ticket>(id).await?;
    assert_eq!(
        operations.take(),
        vec!["SELECT COUNT(ticket.id) FROM ticket WHERE ticket.id = :id".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_delete_removes_children_before_the_root() -> Result<()> {
    let (template, operations) = recording_template(false, &PostgresDialect)?;

    let saved = template.save(ticket("crash", &["repro", "fixed"])).await?;
    operations.take();

    template.delete_by_id::<Ticket>(saved.id.expect("id")).await?;
    let statements = operations.take();
    assert_eq!(
        statements,
        vec![
            "SELECT ticket.id FROM ticket WHERE ticket.id = :id FOR UPDATE OF ticket".to_string(),
            "DELETE FROM comment WHERE comment.ticket = :rootId".to_string(),
            "DELETE FROM ticket WHERE ticket.id = :id".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_insert_writes_root_before_children() -> Result<()> {
    let (template, operations) = recording_template(false, &PostgresDialect)?;

    template.save(ticket("feature", &["a", "b"])).await?;
    let statements = operations.take();

    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("INSERT INTO ticket "));
    assert!(statements[1..].iter().all(|sql| sql.starts_with("INSERT INTO comment ")));
    Ok(())
}

#[tokio::test]
async fn test_children_are_loaded_in_list_order() -> Result<()> {
    let (template, operations) = recording_template(false, &PostgresDialect)?;

    let saved = template.save(ticket("ordered", &["first", "second", "third"])).await?;
    operations.take();

    let loaded = template
        .find_by_id::<Ticket>(saved.id.expect("id"))
        .await?
        .expect("stored ticket");
    assert_eq!(loaded, saved);

    let statements = operations.take();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].ends_with("FROM ticket WHERE ticket.id = :id"));
    assert!(statements[1].contains("FROM comment WHERE comment.ticket = :ticket"));
    assert!(statements[1].ends_with("ORDER BY comment.ticket_key ASC"));
    Ok(())
}

#[tokio::test]
async fn test_forced_quoting_quotes_every_identifier() -> Result<()> {
    let (template, operations) = recording_template(true, &PostgresDialect)?;

    template.count::<Ticket>().await?;
    assert_eq!(
        operations.take(),
        vec![r#"SELECT COUNT(*) FROM "ticket""#.to_string()]
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Device {
    #[column(id)]
    id: Option<i64>,
    enabled: bool,
    serial: Uuid,
}

#[tokio::test]
async fn test_sqlite_converts_booleans_and_uuids() -> Result<()> {
    let context = RelationalMappingContext::builder().entity::<Device>().build()?;
    let database = Arc::new(InMemoryDatabase::new(&context, &SqliteDialect)?);
    let template = JdbcAggregateTemplate::from_operations(context, &SqliteDialect, database.clone())?;

    let serial = Uuid::new_v4();
    let saved = template
        .save(Device {
            id: None,
            enabled: true,
            serial,
        })
        .await?;

    let rows = database.rows("device").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("enabled"), Some(&Value::Integer(1)));
    assert_eq!(rows[0].get("serial"), Some(&Value::Text(serial.to_string())));

    let loaded = template.find_by_id::<Device>(saved.id.expect("id")).await?;
    assert_eq!(loaded, Some(saved));
    Ok(())
}
