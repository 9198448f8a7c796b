//! Knowledge Graph (C6, spec §4.6)
//!
//! An append-mostly store of entities and weighted relationships, used to learn
//! keyword → category associations over time. Cyclic references (file ↔ category ↔
//! keyword) are modeled as arena-style integer-free UUID ids in dense tables joined
//! by query rather than back-pointers (spec §9 "Cyclic references").

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{CategoryId, FileId};

pub type EntityId = Uuid;
pub type RelationshipId = Uuid;

/// Penalty applied by an explicit human rejection (spec §4.6).
pub const REJECTION_PENALTY: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    File,
    Category,
    Keyword,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Mentions,
    CategorizedAs,
    SuggestsCategory,
    HumanConfirmed,
    HumanRejected,
    SimilarTo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub entity_type: EntityType,
    /// For `File` entities this is the file id rendered as a string; for `Category`
    /// entities, the normalized full path joined with `/`; for `Keyword`/`Pattern`,
    /// the literal keyword/pattern text.
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: RelationshipId,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub relationship_type: RelationshipType,
    pub weight: f32,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),
    #[error("invalid weight {0}: must be in [0, 1]")]
    InvalidWeight(f32),
}

pub type Result<T> = std::result::Result<T, GraphError>;

fn clamp_weight(weight: f32) -> f32 {
    weight.clamp(0.0, 1.0)
}

/// Append-mostly knowledge graph of entities and weighted relationships.
pub struct KnowledgeGraph {
    entities: HashMap<EntityId, Entity>,
    by_type_name: HashMap<(EntityType, String), EntityId>,
    relationships: HashMap<RelationshipId, Relationship>,
    /// Index for fast `(source, target, type)` lookups, used to implement the
    /// weighted-max merge-on-repeat rule.
    by_source_target_type: HashMap<(EntityId, EntityId, RelationshipType), RelationshipId>,
    outgoing: HashMap<EntityId, Vec<RelationshipId>>,
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            by_type_name: HashMap::new(),
            relationships: HashMap::new(),
            by_source_target_type: HashMap::new(),
            outgoing: HashMap::new(),
        }
    }

    fn normalize_name(entity_type: EntityType, name: &str) -> String {
        match entity_type {
            EntityType::Keyword | EntityType::Pattern => name.to_ascii_lowercase(),
            _ => name.to_string(),
        }
    }

    /// Find an entity by `(type, name)` or create it. Idempotent: two calls with the
    /// same arguments return the same id (spec §8).
    pub fn find_or_create_entity(&mut self, entity_type: EntityType, name: &str) -> EntityId {
        let key = (entity_type, Self::normalize_name(entity_type, name));
        if let Some(&id) = self.by_type_name.get(&key) {
            return id;
        }
        let id = Uuid::new_v4();
        self.entities.insert(
            id,
            Entity {
                id,
                entity_type,
                name: name.to_string(),
                created_at: Utc::now(),
            },
        );
        self.by_type_name.insert(key, id);
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn file_entity(&mut self, file_id: FileId) -> EntityId {
        self.find_or_create_entity(EntityType::File, &file_id.to_string())
    }

    pub fn keyword_entity(&mut self, keyword: &str) -> EntityId {
        self.find_or_create_entity(EntityType::Keyword, keyword)
    }

    /// Idempotent creation of a chain of category entities from an ordered path.
    /// Two calls with the same path return the same ids (spec §8).
    pub fn get_or_create_category_path(&mut self, path: &[String]) -> Vec<CategoryId> {
        let mut ids = Vec::with_capacity(path.len());
        let mut prefix = String::new();
        for segment in path {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            let id = self.find_or_create_entity(EntityType::Category, &prefix);
            ids.push(id);
        }
        ids
    }

    /// Add (or weighted-max-merge, for confirmation-style edges) a relationship.
    /// On repeated confirmations the edge weight is updated by weighted max
    /// (`w ← max(w_old, w_new)`), never reset downward except by explicit rejection
    /// (spec §4.6).
    pub fn add_relationship(
        &mut self,
        source_id: EntityId,
        target_id: EntityId,
        relationship_type: RelationshipType,
        weight: f32,
        metadata: Option<serde_json::Value>,
    ) -> Result<RelationshipId> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(GraphError::InvalidWeight(weight));
        }
        if !self.entities.contains_key(&source_id) {
            return Err(GraphError::EntityNotFound(source_id));
        }
        if !self.entities.contains_key(&target_id) {
            return Err(GraphError::EntityNotFound(target_id));
        }

        let key = (source_id, target_id, relationship_type);
        if relationship_type != RelationshipType::HumanRejected {
            if let Some(&existing_id) = self.by_source_target_type.get(&key) {
                let existing = self.relationships.get_mut(&existing_id).unwrap();
                existing.weight = existing.weight.max(clamp_weight(weight));
                if metadata.is_some() {
                    existing.metadata = metadata;
                }
                return Ok(existing_id);
            }
        }

        let id = Uuid::new_v4();
        self.relationships.insert(
            id,
            Relationship {
                id,
                source_id,
                target_id,
                relationship_type,
                weight: clamp_weight(weight),
                created_at: Utc::now(),
                metadata,
            },
        );
        if relationship_type != RelationshipType::HumanRejected {
            self.by_source_target_type.insert(key, id);
        }
        self.outgoing.entry(source_id).or_default().push(id);
        Ok(id)
    }

    /// Learn that `keyword` is evidence for `category`, with `weight` confidence.
    pub fn learn_keyword_suggestion(&mut self, keyword: &str, category: CategoryId, weight: f32) -> Result<RelationshipId> {
        let keyword_id = self.keyword_entity(keyword);
        self.add_relationship(keyword_id, category, RelationshipType::SuggestsCategory, weight, None)
    }

    /// Record a human confirmation of `subject` (file or keyword entity) belonging
    /// to `category`.
    pub fn record_human_confirmation(&mut self, subject: EntityId, category: CategoryId, weight: f32) -> Result<RelationshipId> {
        self.add_relationship(subject, category, RelationshipType::HumanConfirmed, weight, None)
    }

    /// Record a human rejection of `subject` belonging to `category`. This always
    /// adds a new penalty edge rather than overwriting any prior confirmation
    /// (spec §4.6).
    pub fn record_human_rejection(&mut self, subject: EntityId, category: CategoryId) -> Result<RelationshipId> {
        self.add_relationship(subject, category, RelationshipType::HumanRejected, REJECTION_PENALTY, None)
    }

    /// Candidates for `keyword`, sorted by cumulative weight across incoming
    /// suggestion/confirmation edges, net of rejection penalties (spec §4.6).
    pub fn category_candidates_for_keyword(&self, keyword: &str) -> Vec<(CategoryId, f32)> {
        let normalized = Self::normalize_name(EntityType::Keyword, keyword);
        let Some(&keyword_id) = self.by_type_name.get(&(EntityType::Keyword, normalized)) else {
            return Vec::new();
        };

        let mut cumulative: HashMap<CategoryId, f32> = HashMap::new();
        if let Some(edges) = self.outgoing.get(&keyword_id) {
            for edge_id in edges {
                let edge = &self.relationships[edge_id];
                let delta = match edge.relationship_type {
                    RelationshipType::SuggestsCategory | RelationshipType::HumanConfirmed => edge.weight,
                    RelationshipType::HumanRejected => -edge.weight,
                    _ => 0.0,
                };
                *cumulative.entry(edge.target_id).or_insert(0.0) += delta;
            }
        }

        let mut candidates: Vec<(CategoryId, f32)> = cumulative
            .into_iter()
            .map(|(id, w)| (id, w.max(0.0)))
            .filter(|(_, w)| *w > 0.0)
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }
}
