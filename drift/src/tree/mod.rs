//! Time-calibrated rooted trees.
//!
//! Nodes are stored in one arena owned by the tree; relations go through
//! internal indices, and the external node ids of the input file are kept
//! for reporting. TimeStages never point back at nodes, so there are no
//! cycles anywhere.

use std::collections::HashMap;
use std::io::BufRead;

use paleo::tsv::{ReadError, TsvReader};

use crate::error::DriftError;

#[cfg(test)]
mod test;

/// A node of a [`Tree`]. `parent` and `children` are internal indices.
#[derive(Clone, Debug)]
pub struct Node {
    /// External id, as given in the tree file.
    pub id: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Age in years; larger is older.
    pub age: u64,
    /// Taxon name, for terminals.
    pub taxon: Option<String>,
}

impl Node {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Tree {
    name: String,
    nodes: Vec<Node>,
    root: usize,
}

impl Tree {
    /// Builds a tree from `(id, parent id, age, taxon)` rows. The root
    /// row names itself as its parent. Row order is free.
    pub fn new(
        name: &str,
        rows: Vec<(usize, usize, u64, Option<String>)>,
    ) -> Result<Tree, DriftError> {
        if rows.is_empty() {
            return Err(DriftError::Config(format!("tree {:?} has no nodes", name)));
        }

        let mut index: HashMap<usize, usize> = HashMap::new();
        for (at, (id, _, _, _)) in rows.iter().enumerate() {
            if index.insert(*id, at).is_some() {
                return Err(DriftError::Config(format!(
                    "tree {:?}: repeated node id {}",
                    name, id
                )));
            }
        }

        let mut nodes: Vec<Node> = rows
            .iter()
            .map(|(id, _, age, taxon)| Node {
                id: *id,
                parent: None,
                children: Vec::new(),
                age: *age,
                taxon: taxon.clone(),
            })
            .collect();

        let mut root = None;
        for (at, (id, parent, _, _)) in rows.iter().enumerate() {
            if parent == id {
                if let Some(r) = root {
                    let r: &Node = &nodes[r];
                    return Err(DriftError::Config(format!(
                        "tree {:?}: two roots, {} and {}",
                        name, r.id, id
                    )));
                }
                root = Some(at);
                continue;
            }
            let p = *index.get(parent).ok_or_else(|| {
                DriftError::Config(format!("tree {:?}: node {}: unknown parent {}", name, id, parent))
            })?;
            nodes[at].parent = Some(p);
            nodes[p].children.push(at);
        }
        let root = root
            .ok_or_else(|| DriftError::Config(format!("tree {:?} has no root", name)))?;

        let tree = Tree {
            name: name.to_string(),
            nodes,
            root,
        };
        tree.check()?;
        Ok(tree)
    }

    fn check(&self) -> Result<(), DriftError> {
        for node in &self.nodes {
            if let Some(p) = node.parent {
                if node.age > self.nodes[p].age {
                    return Err(DriftError::Config(format!(
                        "tree {:?}: node {} is older than its parent {}",
                        self.name, node.id, self.nodes[p].id
                    )));
                }
            }
            if node.is_terminal() && node.taxon.is_none() {
                return Err(DriftError::Config(format!(
                    "tree {:?}: terminal node {} has no taxon",
                    self.name, node.id
                )));
            }
        }
        // Every node must hang from the root.
        let mut seen = vec![false; self.nodes.len()];
        for at in self.post_order() {
            seen[at] = true;
        }
        if seen.iter().any(|s| !s) {
            return Err(DriftError::Config(format!(
                "tree {:?} is not connected",
                self.name
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn root(&self) -> usize {
        self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, at: usize) -> &Node {
        &self.nodes[at]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Internal index of the terminal labelled `taxon`, if any.
    pub fn terminal(&self, taxon: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.taxon.as_deref() == Some(taxon))
    }

    /// Internal indices in post-order: children always before parents.
    pub fn post_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((at, expanded)) = stack.pop() {
            if expanded {
                order.push(at);
                continue;
            }
            stack.push((at, true));
            for child in &self.nodes[at].children {
                stack.push((*child, false));
            }
        }
        order
    }

    /// Internal indices in pre-order: parents always before children.
    pub fn pre_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(at) = stack.pop() {
            order.push(at);
            for child in &self.nodes[at].children {
                stack.push(*child);
            }
        }
        order
    }
}

/// Reads every tree of a tree file: columns `tree`, `node`, `parent`,
/// `age`, and `taxon` (empty for internal nodes).
pub fn read<R: BufRead>(r: &mut TsvReader<R>) -> Result<Vec<Tree>, DriftError> {
    let mut rows: Vec<(String, (usize, usize, u64, Option<String>))> = Vec::new();
    while r.next_row()? {
        let tree = r.field("tree")?.to_string();
        let node: usize = r.parse("node")?;
        let parent: usize = r.parse("parent")?;
        let age: u64 = r.parse("age")?;
        let taxon = match r.field("taxon") {
            Ok("") => None,
            Ok(t) => Some(t.to_string()),
            Err(ReadError::Header { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        rows.push((tree, (node, parent, age, taxon)));
    }

    let mut names: Vec<String> = Vec::new();
    for (name, _) in &rows {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }

    let mut trees = Vec::with_capacity(names.len());
    for name in names {
        let own = rows
            .iter()
            .filter(|(t, _)| *t == name)
            .map(|(_, row)| row.clone())
            .collect();
        trees.push(Tree::new(&name, own)?);
    }
    Ok(trees)
}
