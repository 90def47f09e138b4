//! Arena storage for setting nodes.
//!
//! Nodes live in a [`SlotMap`] owned by the tree. Callers never see raw keys;
//! they either borrow a node through [`Setting`]/[`SettingMut`] or keep a
//! [`SettingId`], which pairs the versioned key with the tree's epoch. A
//! removed node's key stops resolving, and replacing a tree changes the
//! epoch, so an old id is rejected with [`Error::StaleHandle`] instead of
//! silently pointing at a different node.

use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::{new_key_type, SlotMap};

use crate::errors::{Error, Result};
use crate::key_path::{is_valid_name, KeyPath};
use crate::options::Options;
use crate::setting::{Setting, SettingMut};
use crate::value::{SettingFormat, SettingType, Value};

new_key_type! { pub(crate) struct NodeKey; }

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// Long-lived, copyable reference to a node of a particular tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SettingId {
    epoch: u64,
    key: NodeKey,
}

#[derive(Clone, Debug)]
pub(crate) enum NodeData {
    Children(Vec<NodeKey>),
    Scalar(Value),
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) kind: SettingType,
    pub(crate) name: Option<String>,
    pub(crate) format: SettingFormat,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) data: NodeData,
}

impl Node {
    fn new(
        kind: SettingType,
        name: Option<String>,
        parent: Option<NodeKey>,
        format: SettingFormat,
    ) -> Self {
        let data = match kind.default_value() {
            Some(value) => NodeData::Scalar(value),
            None => NodeData::Children(Vec::new()),
        };
        Self {
            kind,
            name,
            format: if kind == SettingType::Int {
                format
            } else {
                SettingFormat::Default
            },
            parent,
            data,
        }
    }

    pub(crate) fn children(&self) -> &[NodeKey] {
        match &self.data {
            NodeData::Children(children) => children,
            NodeData::Scalar(_) => &[],
        }
    }

    pub(crate) fn value(&self) -> Option<&Value> {
        match &self.data {
            NodeData::Scalar(value) => Some(value),
            NodeData::Children(_) => None,
        }
    }
}

/// A settings document: one root Group plus all of its descendants.
#[derive(Debug)]
pub struct Tree {
    epoch: u64,
    nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,
    options: Options,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Tree {
    /// Deep copy. The copy gets its own epoch, so ids taken from `self` do not
    /// resolve against it.
    fn clone(&self) -> Self {
        Self {
            epoch: next_epoch(),
            nodes: self.nodes.clone(),
            root: self.root,
            options: self.options.clone(),
        }
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(
            SettingType::Group,
            None,
            None,
            SettingFormat::Default,
        ));
        Self {
            epoch: next_epoch(),
            nodes,
            root,
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    pub fn root(&self) -> Setting<'_> {
        Setting::new(self, self.root)
    }

    pub fn root_mut(&mut self) -> SettingMut<'_> {
        let root = self.root;
        SettingMut::new(self, root)
    }

    pub(crate) fn root_key(&self) -> NodeKey {
        self.root
    }

    /// Borrow the node behind `id`, if it still exists.
    pub fn setting(&self, id: SettingId) -> Result<Setting<'_>> {
        let key = self.resolve_id(id)?;
        Ok(Setting::new(self, key))
    }

    pub fn setting_mut(&mut self, id: SettingId) -> Result<SettingMut<'_>> {
        let key = self.resolve_id(id)?;
        Ok(SettingMut::new(self, key))
    }

    pub fn lookup(&self, path: &str) -> Result<Setting<'_>> {
        self.root().lookup(path)
    }

    pub fn lookup_mut(&mut self, path: &str) -> Result<SettingMut<'_>> {
        let key = self.resolve(self.root_key(), path)?;
        Ok(SettingMut::new(self, key))
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, key: NodeKey) -> &Node {
        match self.nodes.get(key) {
            Some(node) => node,
            None => unreachable!("removed node {key:?} reached through a live view"),
        }
    }

    pub(crate) fn node_mut(&mut self, key: NodeKey) -> &mut Node {
        match self.nodes.get_mut(key) {
            Some(node) => node,
            None => unreachable!("removed node {key:?} reached through a live view"),
        }
    }

    pub(crate) fn id_of(&self, key: NodeKey) -> SettingId {
        SettingId {
            epoch: self.epoch,
            key,
        }
    }

    fn resolve_id(&self, id: SettingId) -> Result<NodeKey> {
        if id.epoch == self.epoch && self.nodes.contains_key(id.key) {
            Ok(id.key)
        } else {
            Err(Error::StaleHandle)
        }
    }

    /// Walk `path` starting at `start`.
    pub(crate) fn resolve(&self, start: NodeKey, path: &str) -> Result<NodeKey> {
        let key_path = KeyPath::parse(path).map_err(|_| Error::not_found(path))?;
        crate::resolver::resolve(self, start, &key_path).inspect_err(|err| {
            tracing::trace!(path, %err, "path lookup failed");
        })
    }

    /// Full path of a node, e.g. `server.ports[1]`. Empty for the root.
    pub(crate) fn path_of(&self, key: NodeKey) -> String {
        let mut parts = Vec::new();
        let mut cur = key;
        while let Some(parent) = self.node(cur).parent {
            let node = self.node(cur);
            match &node.name {
                Some(name) => parts.push(name.clone()),
                None => {
                    let index = self.position(parent, cur).unwrap_or_default();
                    parts.push(format!("[{index}]"));
                }
            }
            cur = parent;
        }
        parts.reverse();

        let mut out = String::new();
        for part in parts {
            if !out.is_empty() && !part.starts_with('[') {
                out.push('.');
            }
            out.push_str(&part);
        }
        out
    }

    pub(crate) fn position(&self, parent: NodeKey, child: NodeKey) -> Option<usize> {
        self.node(parent).children().iter().position(|&c| c == child)
    }

    pub(crate) fn child_path(&self, parent: NodeKey, segment: &str) -> String {
        let base = self.path_of(parent);
        if base.is_empty() || segment.starts_with('[') {
            format!("{base}{segment}")
        } else {
            format!("{base}.{segment}")
        }
    }

    /// Create a child of `parent`, enforcing the container invariants.
    pub(crate) fn insert_child(
        &mut self,
        parent: NodeKey,
        name: Option<&str>,
        kind: SettingType,
    ) -> Result<NodeKey> {
        let parent_node = self.node(parent);
        let parent_kind = parent_node.kind;

        if kind == SettingType::None {
            return Err(Error::mismatch(
                self.path_of(parent),
                "cannot create a setting of type none",
            ));
        }

        match (parent_kind, name) {
            (SettingType::Group, Some(name)) => {
                if !is_valid_name(name) {
                    return Err(Error::InvalidName(name.to_owned()));
                }
                let exists = parent_node
                    .children()
                    .iter()
                    .any(|&c| self.node(c).name.as_deref() == Some(name));
                if exists {
                    return Err(Error::AlreadyExists {
                        path: self.child_path(parent, name),
                    });
                }
            }
            (SettingType::Group, None) => {
                return Err(Error::mismatch(
                    self.path_of(parent),
                    "group members must be named",
                ));
            }
            (SettingType::Array | SettingType::List, Some(_)) => {
                return Err(Error::mismatch(
                    self.path_of(parent),
                    format!("{parent_kind} elements cannot be named"),
                ));
            }
            (SettingType::Array, None) => {
                if !kind.is_scalar() {
                    return Err(Error::mismatch(
                        self.path_of(parent),
                        format!("array elements must be scalar, not {kind}"),
                    ));
                }
                if let Some(&first) = parent_node.children().first() {
                    let element = self.node(first).kind;
                    if element != kind {
                        return Err(Error::mismatch(
                            self.path_of(parent),
                            format!("array holds {element} elements, cannot add {kind}"),
                        ));
                    }
                }
            }
            (SettingType::List, None) => {}
            (other, _) => {
                return Err(Error::mismatch(
                    self.path_of(parent),
                    format!("{other} setting cannot have children"),
                ));
            }
        }

        let node = Node::new(
            kind,
            name.map(str::to_owned),
            Some(parent),
            self.options.default_format,
        );
        let key = self.nodes.insert(node);
        if let NodeData::Children(children) = &mut self.node_mut(parent).data {
            children.push(key);
        }
        Ok(key)
    }

    /// Detach the `index`-th child of `parent` and free its subtree.
    pub(crate) fn remove_child_at(&mut self, parent: NodeKey, index: usize) -> Result<()> {
        let node = self.node(parent);
        if !node.kind.is_aggregate() {
            return Err(Error::mismatch(
                self.path_of(parent),
                format!("{} setting has no children", node.kind),
            ));
        }
        if index >= node.children().len() {
            return Err(Error::not_found(
                self.child_path(parent, &format!("[{index}]")),
            ));
        }

        let child = match &mut self.node_mut(parent).data {
            NodeData::Children(children) => children.remove(index),
            NodeData::Scalar(_) => return Ok(()),
        };
        let freed = self.free_subtree(child);
        tracing::trace!(parent = %self.path_of(parent), index, freed, "removed setting");
        Ok(())
    }

    fn free_subtree(&mut self, key: NodeKey) -> usize {
        let mut stack = vec![key];
        let mut freed = 0;
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.remove(cur) {
                stack.extend_from_slice(node.children());
                freed += 1;
            }
        }
        freed
    }

    /// Structural equality of two subtrees: types, names, order and values.
    /// Integer formats are ignored.
    pub(crate) fn same_subtree(&self, key: NodeKey, other: &Tree, other_key: NodeKey) -> bool {
        let a = self.node(key);
        let b = other.node(other_key);
        if a.kind != b.kind || a.name != b.name {
            return false;
        }
        match (&a.data, &b.data) {
            (NodeData::Scalar(x), NodeData::Scalar(y)) => x.same_as(y),
            (NodeData::Children(xs), NodeData::Children(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|(&x, &y)| self.same_subtree(x, other, y))
            }
            _ => false,
        }
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.same_subtree(self.root, other, other.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_storage_does_not_revive_old_ids() {
        let mut tree = Tree::new();
        let root = tree.root_key();
        let a = tree.insert_child(root, Some("a"), SettingType::Int).unwrap();
        let old = tree.id_of(a);
        tree.remove_child_at(root, 0).unwrap();
        let b = tree.insert_child(root, Some("b"), SettingType::Int).unwrap();

        assert_ne!(a, b);
        assert!(matches!(tree.setting(old), Err(Error::StaleHandle)));
        assert!(tree.setting(tree.id_of(b)).is_ok());
    }

    #[test]
    fn removing_a_group_frees_descendants() {
        let mut tree = Tree::new();
        let root = tree.root_key();
        let g = tree.insert_child(root, Some("g"), SettingType::Group).unwrap();
        let l = tree.insert_child(g, Some("l"), SettingType::List).unwrap();
        let x = tree.insert_child(l, None, SettingType::Float).unwrap();
        let deep = tree.id_of(x);
        assert_eq!(tree.node_count(), 4);

        tree.remove_child_at(root, 0).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert!(matches!(tree.setting(deep), Err(Error::StaleHandle)));
    }

    #[test]
    fn clone_gets_fresh_epoch() {
        let mut tree = Tree::new();
        let root = tree.root_key();
        let a = tree.insert_child(root, Some("a"), SettingType::Int).unwrap();
        let id = tree.id_of(a);
        let copy = tree.clone();

        assert!(copy == tree);
        assert!(matches!(copy.setting(id), Err(Error::StaleHandle)));
    }

    #[test]
    fn paths_render_names_and_indices() {
        let mut tree = Tree::new();
        let root = tree.root_key();
        let s = tree.insert_child(root, Some("server"), SettingType::Group).unwrap();
        let l = tree.insert_child(s, Some("routes"), SettingType::List).unwrap();
        tree.insert_child(l, None, SettingType::Int).unwrap();
        let g = tree.insert_child(l, None, SettingType::Group).unwrap();
        let p = tree.insert_child(g, Some("prefix"), SettingType::String).unwrap();

        assert_eq!(tree.path_of(root), "");
        assert_eq!(tree.path_of(l), "server.routes");
        assert_eq!(tree.path_of(g), "server.routes[1]");
        assert_eq!(tree.path_of(p), "server.routes[1].prefix");
    }

    #[test]
    fn lookup_mut_starts_at_the_root() {
        let mut tree = Tree::new();
        let root = tree.root_key();
        let s = tree.insert_child(root, Some("server"), SettingType::Group).unwrap();
        tree.insert_child(s, Some("port"), SettingType::Int).unwrap();

        tree.lookup_mut("server.port").unwrap().set(8080).unwrap();
        assert_eq!(tree.lookup("server.port").unwrap().get::<i64>().unwrap(), 8080);
        assert!(tree.lookup_mut("").unwrap().as_setting().is_root());
        assert!(matches!(tree.lookup_mut("port"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn only_int_nodes_keep_a_format() {
        let mut tree = Tree::with_options(Options {
            default_format: SettingFormat::Hex,
            ..Options::default()
        });
        let root = tree.root_key();
        let i = tree.insert_child(root, Some("i"), SettingType::Int).unwrap();
        let f = tree.insert_child(root, Some("f"), SettingType::Float).unwrap();
        assert_eq!(tree.node(i).format, SettingFormat::Hex);
        assert_eq!(tree.node(f).format, SettingFormat::Default);
    }
}
