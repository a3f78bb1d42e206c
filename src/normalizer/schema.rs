use crate::error::RelmapError;
use crate::relation::{Relation, Relationship, SchemaNode};
use crate::schema::Schema;
use std::sync::Arc;

/// Decomposition rules for one entity as reached from one parent entity.
#[derive(Debug, Clone)]
pub struct NormalizationSchema {
    schema: Arc<Schema>,
    parent: Option<Arc<Schema>>,
    uid_fields: Vec<String>,
    relations: Vec<(String, SchemaNode)>,
}

impl NormalizationSchema {
    pub(crate) fn build(schema: Arc<Schema>, parent: Option<Arc<Schema>>) -> Self {
        let uid_fields = schema
            .attributes()
            .filter(|(_, attribute)| attribute.is_uid())
            .map(|(name, _)| name.to_string())
            .collect();
        let relations = schema
            .relations()
            .map(|(name, relation)| (name.to_string(), relation.decomposition()))
            .collect();
        Self {
            schema,
            parent,
            uid_fields,
            relations,
        }
    }

    pub fn entity(&self) -> &str {
        self.schema.entity()
    }

    pub fn parent_entity(&self) -> Option<&str> {
        self.parent.as_deref().map(Schema::entity)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Relation on the parent entity through which this entity was reached.
    pub fn parent_relation(&self, field: &str) -> Result<&Relation, RelmapError> {
        match &self.parent {
            Some(parent) => parent.relation(field),
            None => Err(RelmapError::UnknownRelation {
                entity: self.entity().to_string(),
                relation: field.to_string(),
            }),
        }
    }

    /// Fields generated when absent, in declaration order.
    pub fn uid_fields(&self) -> &[String] {
        &self.uid_fields
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &SchemaNode)> {
        self.relations.iter().map(|(name, node)| (name.as_str(), node))
    }
}
