use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use relmap::dialect::PostgresDialect;
use relmap::jdbc::SqlParameterSource;
use relmap::sql::SqlGeneratorSource;
use relmap::{
    DbError, Entity, InMemoryDatabase, JdbcAggregateTemplate, JdbcOperations, RelationalConfig,
    RelationalMappingContext, Result, Value,
};

#[derive(Debug, Clone, PartialEq, Entity)]
struct Playlist {
    #[column(id)]
    id: Option<i64>,
    name: String,
    tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Track {
    title: String,
    credits: Vec<Credit>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Credit {
    artist: String,
}

fn track(title: &str, artists: &[&str]) -> Track {
    Track {
        title: title.to_string(),
        credits: artists
            .iter()
            .map(|artist| Credit {
                artist: artist.to_string(),
            })
            .collect(),
    }
}

async fn playlist_template() -> Result<(JdbcAggregateTemplate, Arc<InMemoryDatabase>)> {
    let context = RelationalMappingContext::builder().entity::<Playlist>().build()?;
    let database = Arc::new(InMemoryDatabase::new(&context, &PostgresDialect)?);
    let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database.clone())?;
    Ok((template, database))
}

#[tokio::test]
async fn test_catalog_creates_a_table_per_entity() -> Result<()> {
    let (_, database) = playlist_template().await?;
    assert_eq!(database.table_names().await, vec!["credit", "playlist", "track"]);
    assert_eq!(database.dialect().name(), "PostgreSQL");
    Ok(())
}

#[tokio::test]
async fn test_nested_lists_round_trip() -> Result<()> {
    let (template, database) = playlist_template().await?;

    let saved = template
        .save(Playlist {
            id: None,
            name: "mix".into(),
            tracks: vec![
                track("one", &["a", "b"]),
                track("two", &[]),
                track("three", &["c"]),
            ],
        })
        .await?;
    let id = saved.id.expect("id");

    let credits = database.rows("credit").await?;
    assert_eq!(credits.len(), 3);
    for row in &credits {
        assert_eq!(row.get("playlist"), Some(&Value::Integer(id)));
        assert!(row.contains("playlist_key"));
        assert!(row.contains("track_key"));
    }

    let loaded = template.find_by_id::<Playlist>(id).await?;
    assert_eq!(loaded, Some(saved));
    Ok(())
}

#[tokio::test]
async fn test_nested_lists_are_deleted_with_their_root() -> Result<()> {
    let (template, database) = playlist_template().await?;

    let saved = template
        .save(Playlist {
            id: None,
            name: "gone".into(),
            tracks: vec![track("x", &["y", "z"])],
        })
        .await?;
    template.delete(&saved).await?;

    assert_eq!(database.row_count("playlist").await?, 0);
    assert_eq!(database.row_count("track").await?, 0);
    assert_eq!(database.row_count("credit").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_foreign_keys_restrict_deleting_a_referenced_root() -> Result<()> {
    let context = RelationalMappingContext::builder().entity::<Playlist>().build()?;
    let database = Arc::new(InMemoryDatabase::new(&context, &PostgresDialect)?);
    let generators = SqlGeneratorSource::new(&context, &PostgresDialect);
    let template =
        JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database.clone())?;

    let saved = template
        .save(Playlist {
            id: None,
            name: "pinned".into(),
            tracks: vec![track("t", &[])],
        })
        .await?;
    let id = saved.id.expect("id");

    let delete_root = generators.get("Playlist")?.delete_by_id()?;
    let params = SqlParameterSource::new().with("id", id);
    let err = database.update(&delete_root, &params).await.unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation(_)), "{}", err);
    assert_eq!(database.row_count("playlist").await?, 1);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Invoice {
    #[column(id, sequence = "invoice_seq")]
    id: Option<i64>,
    amount: f64,
}

#[tokio::test]
async fn test_sequence_ids_are_fetched_before_insert() -> Result<()> {
    let context = RelationalMappingContext::builder().entity::<Invoice>().build()?;
    let database = Arc::new(InMemoryDatabase::new(&context, &PostgresDialect)?);
    let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database)?;

    let first = template.save(Invoice { id: None, amount: 9.5 }).await?;
    let second = template.save(Invoice { id: None, amount: 20.0 }).await?;
    assert_eq!(first.id, Some(1));
    assert_eq!(second.id, Some(2));

    let loaded = template.find_by_id::<Invoice>(2).await?;
    assert_eq!(loaded, Some(second));
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Customer {
    #[column(id)]
    id: Option<i64>,
    #[column(name = "display_name")]
    name: String,
    #[column(embedded = "home_")]
    home: Location,
    settings: BTreeMap<String, Setting>,
    roles: HashSet<Role>,
    nicknames: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Location {
    street: String,
    zip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Setting {
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Entity)]
struct Role {
    code: String,
}

fn customer() -> Customer {
    let mut settings = BTreeMap::new();
    settings.insert(
        "theme".to_string(),
        Setting {
            value: "dark".into(),
        },
    );
    settings.insert(
        "locale".to_string(),
        Setting {
            value: "de".into(),
        },
    );
    Customer {
        id: None,
        name: "Grete".into(),
        home: Location {
            street: "Lindenweg 3".into(),
            zip: None,
        },
        settings,
        roles: HashSet::from([
            Role {
                code: "admin".into(),
            },
            Role {
                code: "billing".into(),
            },
        ]),
        nicknames: vec!["gr".into(), "g".into()],
    }
}

#[tokio::test]
async fn test_embedded_map_set_and_array_properties_round_trip() -> Result<()> {
    let context = RelationalMappingContext::builder().entity::<Customer>().build()?;
    let database = Arc::new(InMemoryDatabase::new(&context, &PostgresDialect)?);
    let template =
        JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database.clone())?;

    let saved = template.save(customer()).await?;
    let id = saved.id.expect("id");

    let rows = database.rows("customer").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("display_name"), Some(&Value::from("Grete")));
    assert_eq!(rows[0].get("home_street"), Some(&Value::from("Lindenweg 3")));
    assert_eq!(rows[0].get("home_zip"), Some(&Value::Null));

    let settings = database.rows("setting").await?;
    let mut keys: Vec<_> = settings
        .iter()
        .filter_map(|row| row.get("customer_key").and_then(Value::as_str).map(str::to_string))
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["locale", "theme"]);
    assert_eq!(database.row_count("role").await?, 2);

    let loaded = template.find_by_id::<Customer>(id).await?;
    assert_eq!(loaded, Some(saved));
    Ok(())
}

#[tokio::test]
async fn test_config_drives_dialect_schema_and_quoting() -> Result<()> {
    let config = RelationalConfig::from_url("jdbc:h2:mem:test?schema=app&forceQuote=false")?;
    config.validate()?;
    let dialect = config.resolve_dialect();
    let context = config.mapping_builder().entity::<Invoice>().build()?;

    let generators = SqlGeneratorSource::new(&context, dialect);
    let count = generators.get("Invoice")?.count()?;
    assert_eq!(count.sql.to_lowercase(), "select count(*) from app.invoice");

    let database = Arc::new(InMemoryDatabase::new(&context, dialect)?);
    let template = JdbcAggregateTemplate::from_operations(context, dialect, database)?;
    let saved = template.save(Invoice { id: None, amount: 1.25 }).await?;
    assert_eq!(saved.id, Some(1));
    assert_eq!(template.count::<Invoice>().await?, 1);
    Ok(())
}
