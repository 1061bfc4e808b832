use std::collections::HashMap;

use crate::core::{DbError, Result, Value};
use crate::mapping::{AggregatePath, Record, RelationalMappingContext, RelationalPersistentEntity};

use super::action::{ActionId, DbAction, Delete, IdValueSource, Insert, InsertRoot, UpdateRoot};
use super::change::RootAggregateChange;

/// Turns an aggregate root into the actions that persist it.
pub trait EntityWriter {
    fn write(&self, root: &Record, change: &mut RootAggregateChange) -> Result<()>;
}

/// Decides between insert and update from the state of the root.
pub struct RelationalEntityWriter {
    context: RelationalMappingContext,
}

/// Always plans an insert.
pub struct RelationalEntityInsertWriter {
    context: RelationalMappingContext,
}

/// Always plans an update.
pub struct RelationalEntityUpdateWriter {
    context: RelationalMappingContext,
}

impl RelationalEntityWriter {
    pub fn new(context: RelationalMappingContext) -> Self {
        Self { context }
    }
}

impl RelationalEntityInsertWriter {
    pub fn new(context: RelationalMappingContext) -> Self {
        Self { context }
    }
}

impl RelationalEntityUpdateWriter {
    pub fn new(context: RelationalMappingContext) -> Self {
        Self { context }
    }
}

impl EntityWriter for RelationalEntityWriter {
    fn write(&self, root: &Record, change: &mut RootAggregateChange) -> Result<()> {
        let mut writing = WritingContext::new(&self.context, root, change)?;
        if is_new(writing.entity, root) {
            writing.insert()
        } else {
            writing.update()
        }
    }
}

impl EntityWriter for RelationalEntityInsertWriter {
    fn write(&self, root: &Record, change: &mut RootAggregateChange) -> Result<()> {
        WritingContext::new(&self.context, root, change)?.insert()
    }
}

impl EntityWriter for RelationalEntityUpdateWriter {
    fn write(&self, root: &Record, change: &mut RootAggregateChange) -> Result<()> {
        WritingContext::new(&self.context, root, change)?.update()
    }
}

/// Whether `record` has never been stored.
///
/// Versioned entities are new while the version is null or zero. Otherwise a
/// null id, or a zero id for a non-nullable integer id, marks a new entity.
pub fn is_new(entity: &RelationalPersistentEntity, record: &Record) -> bool {
    if let Some(version) = entity.version_property() {
        return matches!(record.value(version.name()), Value::Null | Value::Integer(0));
    }
    match entity.id_property() {
        None => true,
        Some(id) => match record.value(id.name()) {
            Value::Null => true,
            Value::Integer(0) => !id.is_nullable(),
            _ => false,
        },
    }
}

/// One element found at a path while walking the aggregate.
struct PathNode {
    path: AggregatePath,
    parent: Option<usize>,
    qualifier: Option<Value>,
    value: Record,
}

struct WritingContext<'a> {
    root: &'a Record,
    entity: &'a RelationalPersistentEntity,
    entity_type: String,
    paths: Vec<AggregatePath>,
    change: &'a mut RootAggregateChange,
    nodes: Vec<PathNode>,
    nodes_by_path: HashMap<AggregatePath, Vec<usize>>,
    actions_by_node: HashMap<usize, (ActionId, Vec<(AggregatePath, Value)>)>,
    root_action: Option<ActionId>,
}

impl<'a> WritingContext<'a> {
    fn new(
        context: &'a RelationalMappingContext,
        root: &'a Record,
        change: &'a mut RootAggregateChange,
    ) -> Result<Self> {
        let entity = context.required_entity(root.type_name())?;
        let paths = AggregatePath::root(entity.clone()).entity_paths();
        Ok(Self {
            root,
            entity,
            entity_type: entity.type_name().to_string(),
            paths,
            change,
            nodes: Vec::new(),
            nodes_by_path: HashMap::new(),
            actions_by_node: HashMap::new(),
            root_action: None,
        })
    }

    fn insert(&mut self) -> Result<()> {
        let id = self.change.next_action_id();
        self.change.add_action(DbAction::InsertRoot(InsertRoot {
            id,
            entity_type: self.entity_type.clone(),
            entity: self.root.clone(),
            id_value_source: IdValueSource::for_record(self.entity, self.root),
        }));
        self.root_action = Some(id);
        self.insert_referenced()
    }

    fn update(&mut self) -> Result<()> {
        let id = self.change.next_action_id();
        let previous_version = self.change.previous_version().cloned();
        self.change.add_action(DbAction::UpdateRoot(UpdateRoot {
            id,
            entity_type: self.entity_type.clone(),
            entity: self.root.clone(),
            previous_version,
        }));
        self.root_action = Some(id);
        self.delete_referenced()?;
        self.insert_referenced()
    }

    fn delete_referenced(&mut self) -> Result<()> {
        let id_property = self.entity.id_property().ok_or_else(|| {
            DbError::Mapping(format!(
                "Cannot update '{}' without an id property",
                self.entity_type
            ))
        })?;
        let root_id = self.root.value(id_property.name());
        for path in self.paths.iter().rev() {
            self.change.add_action(DbAction::Delete(Delete {
                root_id: root_id.clone(),
                path: path.clone(),
            }));
        }
        Ok(())
    }

    fn insert_referenced(&mut self) -> Result<()> {
        let root_action = self.root_action.ok_or_else(|| {
            DbError::IllegalState("Children planned before the root action".into())
        })?;

        for path in self.paths.clone() {
            let nodes = self.collect_nodes(&path)?;
            for index in nodes {
                let node = &self.nodes[index];

                let (depending_on, mut qualifiers) = match node.parent {
                    None => (root_action, Vec::new()),
                    Some(parent) => {
                        let (action, parent_qualifiers) = self
                            .actions_by_node
                            .get(&parent)
                            .cloned()
                            .ok_or_else(|| {
                                DbError::IllegalState(format!(
                                    "No action planned for the parent of '{}'",
                                    node.path
                                ))
                            })?;
                        let parent_path = &self.nodes[parent].path;
                        if parent_path.has_id_property() {
                            (action, Vec::new())
                        } else {
                            (action, parent_qualifiers)
                        }
                    }
                };
                if let Some(qualifier) = &node.qualifier {
                    qualifiers.push((path.clone(), qualifier.clone()));
                }

                let target = path.required_leaf_entity()?;
                let id = self.change.next_action_id();
                self.change.add_action(DbAction::Insert(Insert {
                    id,
                    entity: node.value.clone(),
                    path: path.clone(),
                    depending_on,
                    qualifiers: qualifiers.clone(),
                    id_value_source: IdValueSource::for_record(target, &node.value),
                }));
                self.actions_by_node.insert(index, (id, qualifiers));
            }
        }
        Ok(())
    }

    /// Nodes for every value at `path`, read from the nodes of the nearest
    /// ancestor owning a table (through embedded values in between).
    fn collect_nodes(&mut self, path: &AggregatePath) -> Result<Vec<usize>> {
        let mut owner = path.parent();
        while let Some(candidate) = &owner {
            if candidate.is_root() || !candidate.is_embedded() {
                break;
            }
            owner = candidate.parent();
        }
        let owner = owner.ok_or_else(|| {
            DbError::IllegalState(format!("Path '{}' has no owning parent", path))
        })?;
        let relative: Vec<String> = path
            .relative_to(&owner)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let relative: Vec<&str> = relative.iter().map(String::as_str).collect();

        let parents: Vec<(Option<usize>, Record)> = if owner.is_root() {
            vec![(None, self.root.clone())]
        } else {
            self.nodes_by_path
                .get(&owner)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|index| (Some(index), self.nodes[index].value.clone()))
                .collect()
        };

        let mut created = Vec::new();
        for (parent, value) in parents {
            let property = value.get_path(&relative);
            for (qualifier, element) in property.elements() {
                created.push(self.nodes.len());
                self.nodes.push(PathNode {
                    path: path.clone(),
                    parent,
                    qualifier: if path.is_qualified() { qualifier } else { None },
                    value: element.clone(),
                });
            }
        }
        self.nodes_by_path.insert(path.clone(), created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::change::AggregateChange;
    use crate::core::DataType;
    use crate::mapping::{EntityDescriptor, PropertyDescriptor, PropertyValue, TypeInfo};

    fn id() -> PropertyDescriptor {
        PropertyDescriptor::new("id", TypeInfo::simple(DataType::Integer).nullable()).id()
    }

    fn tag() -> EntityDescriptor {
        EntityDescriptor::new("Tag")
            .property(PropertyDescriptor::new("label", TypeInfo::simple(DataType::Text)))
    }

    fn item() -> EntityDescriptor {
        EntityDescriptor::new("Item")
            .property(PropertyDescriptor::new("name", TypeInfo::simple(DataType::Text)))
            .property(PropertyDescriptor::new("tags", TypeInfo::list(TypeInfo::entity(tag))))
    }

    fn order() -> EntityDescriptor {
        EntityDescriptor::new("Order")
            .property(id())
            .property(PropertyDescriptor::new("items", TypeInfo::list(TypeInfo::entity(item))))
    }

    fn context() -> RelationalMappingContext {
        RelationalMappingContext::builder().descriptor(order()).build().unwrap()
    }

    fn order_with_items(id: Option<i64>) -> Record {
        let item = |name: &str, tags: usize| {
            Record::new("Item").with("name", Value::from(name)).with(
                "tags",
                PropertyValue::List((0..tags).map(|_| Record::new("Tag")).collect()),
            )
        };
        Record::new("Order")
            .with("id", Value::from(id))
            .with("items", PropertyValue::List(vec![item("a", 0), item("b", 2)]))
    }

    #[test]
    fn test_insert_plans_root_then_children() -> Result<()> {
        let mut change = RootAggregateChange::save("Order", None);
        RelationalEntityWriter::new(context()).write(&order_with_items(None), &mut change)?;

        let actions = change.actions();
        assert_eq!(actions.len(), 5);
        assert!(matches!(&actions[0], DbAction::InsertRoot(a) if a.id_value_source == IdValueSource::Generated));

        let inserts: Vec<&Insert> = actions
            .iter()
            .filter_map(|a| match a {
                DbAction::Insert(insert) => Some(insert),
                _ => None,
            })
            .collect();
        assert_eq!(inserts[0].qualifier(), Some(&Value::Integer(0)));
        assert_eq!(inserts[1].qualifier(), Some(&Value::Integer(1)));
        assert_eq!(inserts[0].depending_on, ActionId::new(0));

        // Tags of the id-less second item inherit its index.
        let tag = inserts[2];
        assert_eq!(tag.path.dot_path(), "items.tags");
        assert_eq!(tag.depending_on, inserts[1].id);
        let qualifiers: Vec<_> = tag.qualifiers.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(qualifiers, vec![Value::Integer(1), Value::Integer(0)]);
        Ok(())
    }

    #[test]
    fn test_update_deletes_children_deepest_first() -> Result<()> {
        let mut change = RootAggregateChange::save("Order", None);
        RelationalEntityWriter::new(context()).write(&order_with_items(Some(4)), &mut change)?;

        let names: Vec<String> = change
            .actions()
            .iter()
            .map(|a| match a {
                DbAction::UpdateRoot(_) => "update".to_string(),
                DbAction::Delete(d) => format!("delete {}", d.path.dot_path()),
                DbAction::Insert(i) => format!("insert {}", i.path.dot_path()),
                other => other.to_string(),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                "update",
                "delete items.tags",
                "delete items",
                "insert items",
                "insert items",
                "insert items.tags",
                "insert items.tags",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_is_new() -> Result<()> {
        let context = context();
        let order = context.required_entity("Order")?;
        assert!(is_new(order, &Record::new("Order")));
        assert!(!is_new(order, &Record::new("Order").with("id", Value::Integer(0))));
        assert!(!is_new(order, &Record::new("Order").with("id", Value::Integer(3))));
        Ok(())
    }
}
