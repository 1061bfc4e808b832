use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{DbError, Result};
use crate::dialect::Dialect;
use crate::mapping::RelationalMappingContext;

use super::generator::SqlGenerator;

/// One [`SqlGenerator`] per registered entity type, all sharing a dialect.
pub struct SqlGeneratorSource {
    dialect: &'static dyn Dialect,
    generators: HashMap<String, Arc<SqlGenerator>>,
}

impl SqlGeneratorSource {
    pub fn new(context: &RelationalMappingContext, dialect: &'static dyn Dialect) -> Self {
        let generators = context
            .entities()
            .map(|entity| {
                (
                    entity.type_name().to_string(),
                    Arc::new(SqlGenerator::new(entity.clone(), dialect)),
                )
            })
            .collect();
        Self {
            dialect,
            generators,
        }
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn get(&self, type_name: &str) -> Result<Arc<SqlGenerator>> {
        self.generators.get(type_name).cloned().ok_or_else(|| {
            DbError::Mapping(format!("No SQL generator for entity '{}'", type_name))
        })
    }
}
