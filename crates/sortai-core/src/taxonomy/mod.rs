//! Taxonomy Tree (C8, spec §4.8)
//!
//! The authoritative category hierarchy. Node identity is shared with the
//! knowledge graph's `Category` entities: [`TaxonomyTree::get_or_create_path`]
//! delegates id minting to [`crate::graph::KnowledgeGraph`] so the two stores never
//! disagree about what a category id means.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::KnowledgeGraph;
use crate::model::CategoryId;

#[derive(Debug, thiserror::Error)]
pub enum TaxonomyError {
    #[error("node not found: {0}")]
    NodeNotFound(CategoryId),
    #[error("sibling name collision: {0:?} already has a child named {1:?}")]
    NameCollision(CategoryId, String),
    #[error("cannot move a node under its own descendant")]
    CyclicMove,
    #[error("root node has no parent")]
    NoParent,
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyNode {
    pub id: CategoryId,
    pub name: String,
    pub parent: Option<CategoryId>,
    pub children: Vec<CategoryId>,
    pub user_edited: bool,
    pub created_at: DateTime<Utc>,
}

/// Root-anchored category hierarchy.
pub struct TaxonomyTree {
    nodes: HashMap<CategoryId, TaxonomyNode>,
    root: CategoryId,
}

impl TaxonomyTree {
    /// Create a tree with a fresh root node, registering it in `graph` under the
    /// empty path so node ids stay consistent with the knowledge graph.
    pub fn new(graph: &mut KnowledgeGraph) -> Self {
        let root = graph.get_or_create_category_path(&["__root__".to_string()])[0];
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            TaxonomyNode {
                id: root,
                name: String::new(),
                parent: None,
                children: Vec::new(),
                user_edited: false,
                created_at: Utc::now(),
            },
        );
        Self { nodes, root }
    }

    pub fn root(&self) -> CategoryId {
        self.root
    }

    pub fn node(&self, id: CategoryId) -> Option<&TaxonomyNode> {
        self.nodes.get(&id)
    }

    fn node_mut(&mut self, id: CategoryId) -> Result<&mut TaxonomyNode> {
        self.nodes.get_mut(&id).ok_or(TaxonomyError::NodeNotFound(id))
    }

    fn find_child_by_name(&self, parent: CategoryId, name: &str) -> Option<CategoryId> {
        let parent_node = self.nodes.get(&parent)?;
        parent_node
            .children
            .iter()
            .find(|&&child_id| {
                self.nodes
                    .get(&child_id)
                    .is_some_and(|c| c.name.eq_ignore_ascii_case(name))
            })
            .copied()
    }

    pub fn create_child(&mut self, parent: CategoryId, id: CategoryId, name: &str) -> Result<()> {
        if !self.nodes.contains_key(&parent) {
            return Err(TaxonomyError::NodeNotFound(parent));
        }
        if self.find_child_by_name(parent, name).is_some() {
            return Err(TaxonomyError::NameCollision(parent, name.to_string()));
        }
        self.nodes.insert(
            id,
            TaxonomyNode {
                id,
                name: name.to_string(),
                parent: Some(parent),
                children: Vec::new(),
                user_edited: false,
                created_at: Utc::now(),
            },
        );
        self.node_mut(parent)?.children.push(id);
        Ok(())
    }

    /// Idempotently create (or reuse) an ordered chain of category nodes under the
    /// root, using `graph` as the id source so both stores share identity
    /// (spec §4.6 `get_or_create_category_path`, spec §4.8 node creation).
    pub fn get_or_create_path(&mut self, graph: &mut KnowledgeGraph, path: &[String]) -> Result<Vec<CategoryId>> {
        let ids = graph.get_or_create_category_path(path);
        let mut parent = self.root;
        let mut result = Vec::with_capacity(ids.len());
        for (segment, &id) in path.iter().zip(ids.iter()) {
            if !self.nodes.contains_key(&id) {
                self.create_child(parent, id, segment)?;
            }
            result.push(id);
            parent = id;
        }
        Ok(result)
    }

    pub fn rename(&mut self, id: CategoryId, new_name: &str) -> Result<()> {
        let parent = self.node(id).and_then(|n| n.parent).ok_or(TaxonomyError::NoParent)?;
        if let Some(existing) = self.find_child_by_name(parent, new_name) {
            if existing != id {
                return Err(TaxonomyError::NameCollision(parent, new_name.to_string()));
            }
        }
        self.node_mut(id)?.name = new_name.to_string();
        Ok(())
    }

    pub fn mark_user_edited(&mut self, id: CategoryId) -> Result<()> {
        self.node_mut(id)?.user_edited = true;
        Ok(())
    }

    pub fn is_user_edited(&self, id: CategoryId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.user_edited)
    }

    fn is_descendant_of(&self, candidate: CategoryId, ancestor: CategoryId) -> bool {
        let mut current = candidate;
        while let Some(node) = self.nodes.get(&current) {
            match node.parent {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    pub fn move_node(&mut self, id: CategoryId, new_parent: CategoryId) -> Result<()> {
        if id == new_parent || self.is_descendant_of(new_parent, id) {
            return Err(TaxonomyError::CyclicMove);
        }
        let name = self.node(id).ok_or(TaxonomyError::NodeNotFound(id))?.name.clone();
        if let Some(existing) = self.find_child_by_name(new_parent, &name) {
            if existing != id {
                return Err(TaxonomyError::NameCollision(new_parent, name));
            }
        }
        let old_parent = self.node(id).and_then(|n| n.parent).ok_or(TaxonomyError::NoParent)?;
        self.node_mut(old_parent)?.children.retain(|&c| c != id);
        self.node_mut(new_parent)?.children.push(id);
        self.node_mut(id)?.parent = Some(new_parent);
        Ok(())
    }

    /// Merge `source` into `target`: `target` inherits all of `source`'s children,
    /// and `source` is removed. Atomic: either both steps apply or neither does
    /// (spec "atomic merge/split").
    pub fn merge(&mut self, source: CategoryId, target: CategoryId) -> Result<()> {
        if source == target {
            return Ok(());
        }
        if !self.nodes.contains_key(&source) {
            return Err(TaxonomyError::NodeNotFound(source));
        }
        if !self.nodes.contains_key(&target) {
            return Err(TaxonomyError::NodeNotFound(target));
        }
        let children: Vec<CategoryId> = self.nodes[&source].children.clone();
        for child in &children {
            self.node_mut(*child)?.parent = Some(target);
        }
        self.node_mut(target)?.children.extend(children);
        let source_parent = self.node(source).and_then(|n| n.parent);
        if let Some(parent) = source_parent {
            self.node_mut(parent)?.children.retain(|&c| c != source);
        }
        self.nodes.remove(&source);
        Ok(())
    }

    /// Split `source` into two sibling nodes `first_name`/`second_name`, partitioning
    /// its children by `partition` (true = goes to the first node). The original
    /// node is removed.
    pub fn split(
        &mut self,
        source: CategoryId,
        first: CategoryId,
        first_name: &str,
        second: CategoryId,
        second_name: &str,
        partition: impl Fn(CategoryId) -> bool,
    ) -> Result<()> {
        let parent = self.node(source).and_then(|n| n.parent).ok_or(TaxonomyError::NoParent)?;
        let children = self.nodes[&source].children.clone();
        let (first_children, second_children): (Vec<_>, Vec<_>) = children.into_iter().partition(|&c| partition(c));

        self.create_child(parent, first, first_name)?;
        self.create_child(parent, second, second_name)?;
        for child in &first_children {
            self.node_mut(*child)?.parent = Some(first);
        }
        self.node_mut(first)?.children = first_children;
        for child in &second_children {
            self.node_mut(*child)?.parent = Some(second);
        }
        self.node_mut(second)?.children = second_children;

        self.node_mut(parent)?.children.retain(|&c| c != source);
        self.nodes.remove(&source);
        Ok(())
    }

    pub fn depth(&self, id: CategoryId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(node) = self.nodes.get(&current) {
            match node.parent {
                Some(parent) => {
                    depth += 1;
                    current = parent;
                }
                None => break,
            }
        }
        depth
    }

    pub fn path(&self, id: CategoryId) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(node) = self.nodes.get(&current) {
            if node.parent.is_none() {
                break;
            }
            segments.push(node.name.clone());
            current = node.parent.unwrap();
        }
        segments.reverse();
        segments
    }

    /// Remove childless, non-root, non-user-edited nodes bottom-up. Returns the
    /// number of nodes pruned.
    pub fn prune_empty(&mut self) -> usize {
        let mut pruned = 0;
        loop {
            let candidate = self.nodes.values().find_map(|n| {
                (n.parent.is_some() && n.children.is_empty() && !n.user_edited).then_some(n.id)
            });
            let Some(id) = candidate else { break };
            let parent = self.nodes[&id].parent.unwrap();
            self.nodes.get_mut(&parent).unwrap().children.retain(|&c| c != id);
            self.nodes.remove(&id);
            pruned += 1;
        }
        pruned
    }
}
