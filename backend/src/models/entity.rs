//! Entity types and instances (brands, products) that measures are asked about.

use serde::{Deserialize, Serialize};

use crate::define_id_type;

define_id_type!(i64, EntityInstanceId);

/// A kind of entity a question can be asked about, e.g. `"brand"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(pub String);

impl EntityType {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    pub fn identifier(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One concrete entity, e.g. brand 3 "Acme".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityInstance {
    pub id: EntityInstanceId,
    pub name: String,
}

impl EntityInstance {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: EntityInstanceId(id),
            name: name.into(),
        }
    }
}

/// The entity instances a calculation is requested for.
///
/// Instances are always kept sorted by id with duplicates removed, so every
/// downstream array built from a `TargetInstances` shares one ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetInstances {
    pub entity_type: EntityType,
    instances: Vec<EntityInstance>,
}

impl TargetInstances {
    pub fn new(entity_type: EntityType, mut instances: Vec<EntityInstance>) -> Self {
        instances.sort_by_key(|i| i.id);
        instances.dedup_by_key(|i| i.id);
        Self {
            entity_type,
            instances,
        }
    }

    pub fn instances(&self) -> &[EntityInstance] {
        &self.instances
    }

    pub fn ids(&self) -> Vec<EntityInstanceId> {
        self.instances.iter().map(|i| i.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_instances_are_sorted_and_unique() {
        let targets = TargetInstances::new(
            EntityType::new("brand"),
            vec![
                EntityInstance::new(3, "C"),
                EntityInstance::new(1, "A"),
                EntityInstance::new(3, "C again"),
                EntityInstance::new(2, "B"),
            ],
        );

        let ids: Vec<i64> = targets.ids().into_iter().map(i64::from).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
