use std::sync::Arc;

use relmap::dialect::PostgresDialect;
use relmap::{
    Entity, InMemoryDatabase, JdbcAggregateTemplate, Order, Pageable, RelationalMappingContext,
    Result, Sort, Value,
};

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(table = "purchase_orders")]
struct PurchaseOrder {
    #[column(id)]
    id: Option<i64>,
    customer: String,
    shipping: Option<Address>,
    items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Address {
    street: String,
    city: String,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct LineItem {
    product: String,
    quantity: i64,
}

fn order(customer: &str, items: &[(&str, i64)]) -> PurchaseOrder {
    PurchaseOrder {
        id: None,
        customer: customer.to_string(),
        shipping: None,
        items: items
            .iter()
            .map(|(product, quantity)| LineItem {
                product: product.to_string(),
                quantity: *quantity,
            })
            .collect(),
    }
}

fn setup() -> Result<(JdbcAggregateTemplate, Arc<InMemoryDatabase>)> {
    let context = RelationalMappingContext::builder()
        .entity::<PurchaseOrder>()
        .build()?;
    let database = Arc::new(InMemoryDatabase::new(&context, &PostgresDialect)?);
    let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database.clone())?;
    Ok((template, database))
}

#[tokio::test]
async fn test_save_assigns_generated_id_and_loads_whole_aggregate() -> Result<()> {
    let (template, _) = setup()?;

    let mut new_order = order("ada", &[("pen", 2), ("ink", 1)]);
    new_order.shipping = Some(Address {
        street: "Main Street 1".into(),
        city: "Springfield".into(),
    });

    let saved = template.save(new_order).await?;
    let id = saved.id.expect("generated id");

    let loaded = template.find_by_id::<PurchaseOrder>(id).await?;
    assert_eq!(loaded, Some(saved));
    Ok(())
}

#[tokio::test]
async fn test_list_elements_carry_back_reference_and_index() -> Result<()> {
    let (template, database) = setup()?;

    let saved = template
        .save(order("grace", &[("a", 1), ("b", 2), ("c", 3)]))
        .await?;
    let id = saved.id.expect("generated id");

    let rows = database.rows("line_item").await?;
    assert_eq!(rows.len(), 3);
    let mut keys: Vec<i64> = rows
        .iter()
        .map(|row| {
            assert_eq!(row.get("purchase_orders"), Some(&Value::Integer(id)));
            row.get("purchase_orders_key")
                .and_then(Value::as_i64)
                .expect("list index")
        })
        .collect();
    keys.sort();
    assert_eq!(keys, vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_missing_one_to_one_loads_as_none() -> Result<()> {
    let (template, database) = setup()?;

    let saved = template.save(order("linus", &[])).await?;
    assert_eq!(database.row_count("address").await?, 0);

    let loaded = template
        .find_by_id::<PurchaseOrder>(saved.id.expect("generated id"))
        .await?
        .expect("stored order");
    assert_eq!(loaded.shipping, None);
    assert!(loaded.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_update_replaces_referenced_entities() -> Result<()> {
    let (template, database) = setup()?;

    let mut saved = template.save(order("barbara", &[("a", 1), ("b", 2)])).await?;
    saved.customer = "barbara liskov".into();
    saved.items = vec![LineItem {
        product: "c".into(),
        quantity: 7,
    }];
    saved.shipping = Some(Address {
        street: "Elm".into(),
        city: "Boston".into(),
    });

    let updated = template.save(saved.clone()).await?;
    assert_eq!(updated.id, saved.id);
    assert_eq!(database.row_count("purchase_orders").await?, 1);
    assert_eq!(database.row_count("line_item").await?, 1);
    assert_eq!(database.row_count("address").await?, 1);

    let loaded = template.find_by_id::<PurchaseOrder>(saved.id.expect("id")).await?;
    assert_eq!(loaded, Some(updated));
    Ok(())
}

#[tokio::test]
async fn test_update_of_unknown_id_fails() -> Result<()> {
    let (template, _) = setup()?;

    let mut ghost = order("nobody", &[]);
    ghost.id = Some(4711);
    let err = template.update(ghost).await.unwrap_err();
    assert!(err.is_incorrect_update_semantics(), "{}", err);
    Ok(())
}

#[tokio::test]
async fn test_delete_removes_aggregate_with_children() -> Result<()> {
    let (template, database) = setup()?;

    let mut first = order("ken", &[("a", 1), ("b", 1)]);
    first.shipping = Some(Address {
        street: "Bell Labs".into(),
        city: "Murray Hill".into(),
    });
    let first = template.save(first).await?;
    let second = template.save(order("dennis", &[("c", 1)])).await?;

    template.delete(&first).await?;

    assert_eq!(template.find_by_id::<PurchaseOrder>(first.id.expect("id")).await?, None);
    assert_eq!(database.row_count("address").await?, 0);
    assert_eq!(database.row_count("line_item").await?, 1);
    assert!(template.exists_by_id::<PurchaseOrder>(second.id.expect("id")).await?);
    Ok(())
}

#[tokio::test]
async fn test_delete_by_id_of_missing_aggregate_is_silent() -> Result<()> {
    let (template, _) = setup()?;
    template.delete_by_id::<PurchaseOrder>(99).await?;
    assert_eq!(template.count::<PurchaseOrder>().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_save_all_and_delete_all_by_id() -> Result<()> {
    let (template, database) = setup()?;

    let saved = template
        .save_all(vec![
            order("a", &[("x", 1)]),
            order("b", &[("y", 1), ("z", 2)]),
            order("c", &[]),
        ])
        .await?;
    assert_eq!(saved.len(), 3);
    assert!(saved.iter().all(|o| o.id.is_some()));
    assert_eq!(template.count::<PurchaseOrder>().await?, 3);
    assert_eq!(database.row_count("line_item").await?, 3);

    let ids: Vec<Value> = saved[..2]
        .iter()
        .filter_map(|o| o.id)
        .map(Value::from)
        .collect();
    let found = template.find_all_by_id::<PurchaseOrder>(ids.clone()).await?;
    assert_eq!(found.len(), 2);

    template.delete_all_by_id::<PurchaseOrder>(ids).await?;
    assert_eq!(template.count::<PurchaseOrder>().await?, 1);
    assert_eq!(database.row_count("line_item").await?, 0);

    let remaining = template.find_all::<PurchaseOrder>().await?;
    assert_eq!(remaining, vec![saved[2].clone()]);
    Ok(())
}

#[tokio::test]
async fn test_delete_all_of_type_empties_every_table() -> Result<()> {
    let (template, database) = setup()?;

    template
        .save_all(vec![order("a", &[("x", 1)]), order("b", &[("y", 1)])])
        .await?;
    template.delete_all_of::<PurchaseOrder>().await?;

    assert_eq!(template.count::<PurchaseOrder>().await?, 0);
    assert_eq!(database.row_count("line_item").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_find_all_sorted() -> Result<()> {
    let (template, _) = setup()?;

    for customer in ["carol", "alice", "bob"] {
        template.save(order(customer, &[])).await?;
    }

    let ascending = template
        .find_all_sorted::<PurchaseOrder>(&Sort::by(&["customer"]))
        .await?;
    let names: Vec<_> = ascending.iter().map(|o| o.customer.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);

    let descending = template
        .find_all_sorted::<PurchaseOrder>(&Sort::unsorted().and(Order::desc("customer")))
        .await?;
    let names: Vec<_> = descending.iter().map(|o| o.customer.as_str()).collect();
    assert_eq!(names, vec!["carol", "bob", "alice"]);
    Ok(())
}

#[tokio::test]
async fn test_find_all_paged() -> Result<()> {
    let (template, _) = setup()?;

    for customer in ["e", "d", "c", "b", "a"] {
        template.save(order(customer, &[("item", 1)])).await?;
    }

    let pageable = Pageable::sorted(1, 2, Sort::by(&["customer"]))?;
    let page = template.find_all_paged::<PurchaseOrder>(&pageable).await?;

    assert_eq!(page.total_elements, 5);
    assert_eq!(page.total_pages(), 3);
    let names: Vec<_> = page.content.iter().map(|o| o.customer.as_str()).collect();
    assert_eq!(names, vec!["c", "d"]);
    assert!(page.content.iter().all(|o| o.items.len() == 1));
    Ok(())
}

#[tokio::test]
async fn test_count_and_exists() -> Result<()> {
    let (template, _) = setup()?;

    assert_eq!(template.count::<PurchaseOrder>().await?, 0);
    let saved = template.save(order("solo", &[])).await?;
    let id = saved.id.expect("id");

    assert_eq!(template.count::<PurchaseOrder>().await?, 1);
    assert!(template.exists_by_id::<PurchaseOrder>(id).await?);
    assert!(!template.exists_by_id::<PurchaseOrder>(id + 1).await?);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Shipment {
    #[column(id)]
    id: Option<i64>,
    #[column(version)]
    version: Option<i64>,
    parcels: Vec<Parcel>,
}

#[derive(Debug, Clone, PartialEq, Entity)]
struct Parcel {
    #[column(id)]
    id: Option<i64>,
    label: String,
}

#[tokio::test]
async fn test_children_with_ids_receive_generated_ids() -> Result<()> {
    let context = RelationalMappingContext::builder().entity::<Shipment>().build()?;
    let database = Arc::new(InMemoryDatabase::new(&context, &PostgresDialect)?);
    let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database.clone())?;

    let saved = template
        .save(Shipment {
            id: None,
            version: None,
            parcels: vec![
                Parcel {
                    id: None,
                    label: "A".into(),
                },
                Parcel {
                    id: None,
                    label: "B".into(),
                },
            ],
        })
        .await?;
    let id = saved.id.expect("shipment id");
    assert_eq!(saved.version, Some(1));
    assert!(saved.parcels.iter().all(|p| p.id.is_some()));
    assert_ne!(saved.parcels[0].id, saved.parcels[1].id);

    for row in database.rows("parcel").await? {
        assert_eq!(row.get("shipment"), Some(&Value::Integer(id)));
    }

    let loaded = template.find_by_id::<Shipment>(id).await?;
    assert_eq!(loaded, Some(saved));
    Ok(())
}
