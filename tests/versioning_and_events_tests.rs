use std::sync::Arc;

use relmap::dialect::PostgresDialect;
use relmap::jdbc::{CollectingEventPublisher, DataAccessStrategy, create_data_access_strategy};
use relmap::{
    DbError, Entity, EntityCallback, InMemoryDatabase, JdbcAggregateTemplate, Record,
    RelationalEvent, RelationalMappingContext, Result, Value,
};

#[derive(Debug, Clone, PartialEq, Entity)]
struct Document {
    #[column(id)]
    id: Option<i64>,
    #[column(version)]
    version: Option<i64>,
    title: String,
    sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Section {
    heading: String,
}

fn document(title: &str, headings: &[&str]) -> Document {
    Document {
        id: None,
        version: None,
        title: title.to_string(),
        sections: headings
            .iter()
            .map(|h| Section {
                heading: h.to_string(),
            })
            .collect(),
    }
}

fn setup() -> Result<(RelationalMappingContext, Arc<InMemoryDatabase>)> {
    let context = RelationalMappingContext::builder().entity::<Document>().build()?;
    let database = Arc::new(InMemoryDatabase::new(&context, &PostgresDialect)?);
    Ok((context, database))
}

fn template() -> Result<(JdbcAggregateTemplate, Arc<InMemoryDatabase>)> {
    let (context, database) = setup()?;
    let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database.clone())?;
    Ok((template, database))
}

#[tokio::test]
async fn test_version_starts_at_one_and_increments() -> Result<()> {
    let (template, _) = template()?;

    let saved = template.save(document("draft", &["intro"])).await?;
    assert_eq!(saved.version, Some(1));

    let mut edited = saved.clone();
    edited.title = "final".into();
    let edited = template.save(edited).await?;
    assert_eq!(edited.version, Some(2));

    let loaded = template
        .find_by_id::<Document>(saved.id.expect("id"))
        .await?
        .expect("stored document");
    assert_eq!(loaded.version, Some(2));
    assert_eq!(loaded.title, "final");
    Ok(())
}

#[tokio::test]
async fn test_stale_update_fails_without_touching_the_aggregate() -> Result<()> {
    let (template, database) = template()?;

    let saved = template.save(document("v1", &["a", "b"])).await?;
    let stale = saved.clone();

    let mut fresh = saved;
    fresh.title = "v2".into();
    let fresh = template.save(fresh).await?;

    let mut conflicting = stale;
    conflicting.title = "lost update".into();
    conflicting.sections.clear();
    let err = template.save(conflicting).await.unwrap_err();
    assert!(matches!(err, DbError::OptimisticLockingFailure(_)), "{}", err);
    assert!(err.to_string().contains("was changed or deleted in between"), "{}", err);

    assert_eq!(database.row_count("section").await?, 2);
    let loaded = template.find_by_id::<Document>(fresh.id.expect("id")).await?;
    assert_eq!(loaded, Some(fresh));
    Ok(())
}

#[tokio::test]
async fn test_versioned_update_reports_whether_a_row_matched() -> Result<()> {
    let (context, database) = setup()?;
    let template =
        JdbcAggregateTemplate::from_operations(context.clone(), &PostgresDialect, database.clone())?;
    let strategy = create_data_access_strategy(context, &PostgresDialect, database.clone())?;

    let saved = template.save(document("v1", &[])).await?;
    let edited = saved.to_record().set("title", Value::from("v2"));

    assert!(!strategy.update_with_version(&edited, "Document", &Value::Integer(7)).await?);
    let rows = database.rows("document").await?;
    assert_eq!(rows[0].get("title"), Some(&Value::from("v1")));

    assert!(strategy.update_with_version(&edited, "Document", &Value::Integer(1)).await?);
    let rows = database.rows("document").await?;
    assert_eq!(rows[0].get("title"), Some(&Value::from("v2")));
    Ok(())
}

#[tokio::test]
async fn test_stale_delete_keeps_the_root() -> Result<()> {
    let (template, _) = template()?;

    let saved = template.save(document("v1", &[])).await?;
    let stale = saved.clone();
    template.save(saved).await?;

    let err = template.delete(&stale).await.unwrap_err();
    assert!(err.is_optimistic_locking_failure(), "{}", err);
    assert_eq!(template.count::<Document>().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_insert_ignores_existing_version() -> Result<()> {
    let (template, _) = template()?;

    let mut imported = document("imported", &[]);
    imported.version = Some(41);
    let saved = template.insert(imported).await?;
    assert_eq!(saved.version, Some(1));
    assert!(saved.id.is_some());
    Ok(())
}

#[tokio::test]
async fn test_lifecycle_events_are_published_in_order() -> Result<()> {
    let (context, database) = setup()?;
    let events = Arc::new(CollectingEventPublisher::new());
    let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database)?
        .with_event_publisher(events.clone());

    let saved = template.save(document("events", &["one", "two"])).await?;
    assert_eq!(events.names(), vec!["BeforeConvert", "BeforeSave", "AfterSave"]);

    let id = saved.id.expect("id");
    template.find_by_id::<Document>(id).await?;
    template.delete_by_id::<Document>(id).await?;

    assert_eq!(
        events.names(),
        vec![
            "BeforeConvert",
            "BeforeSave",
            "AfterSave",
            "AfterConvert",
            "BeforeDelete",
            "AfterDelete",
        ]
    );

    let all = events.events();
    assert!(all.iter().all(|event| event.entity_type() == "Document"));
    match &all[2] {
        RelationalEvent::AfterSave { entity, .. } => {
            assert_eq!(entity.value("id"), Value::Integer(id));
        }
        other => panic!("unexpected event {}", other),
    }
    match &all[4] {
        RelationalEvent::BeforeDelete { id: deleted, entity, .. } => {
            assert_eq!(*deleted, Value::Integer(id));
            assert!(entity.is_none());
        }
        other => panic!("unexpected event {}", other),
    }
    Ok(())
}

struct UppercaseTitles;

impl EntityCallback for UppercaseTitles {
    fn supports(&self, entity_type: &str) -> bool {
        entity_type == "Document"
    }

    fn before_convert(&self, entity: Record) -> Result<Record> {
        let title = entity.value("title");
        let upper = title.as_str().unwrap_or_default().to_uppercase();
        Ok(entity.set("title", Value::from(upper)))
    }
}

struct RejectDeletes;

impl EntityCallback for RejectDeletes {
    fn before_delete(&self, id: &Value, _entity: Option<Record>) -> Result<Option<Record>> {
        Err(DbError::InvalidApiUsage(format!("Deleting {} is not allowed", id)))
    }
}

#[tokio::test]
async fn test_callbacks_replace_the_aggregate_before_conversion() -> Result<()> {
    let (context, database) = setup()?;
    let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database)?
        .with_callback(Arc::new(UppercaseTitles));

    let saved = template.save(document("quiet title", &[])).await?;
    assert_eq!(saved.title, "QUIET TITLE");

    let loaded = template
        .find_by_id::<Document>(saved.id.expect("id"))
        .await?
        .expect("stored document");
    assert_eq!(loaded.title, "QUIET TITLE");
    Ok(())
}

#[tokio::test]
async fn test_failing_callback_aborts_the_delete() -> Result<()> {
    let (context, database) = setup()?;
    let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database)?
        .with_callback(Arc::new(RejectDeletes));

    let saved = template.save(document("keep me", &["s"])).await?;
    let id = saved.id.expect("id");

    let err = template.delete_by_id::<Document>(id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidApiUsage(_)));
    assert!(template.exists_by_id::<Document>(id).await?);
    Ok(())
}
