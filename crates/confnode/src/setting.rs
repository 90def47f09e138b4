//! Borrowed views into a [`Tree`].
//!
//! [`Setting`] is a shared, `Copy` view used for navigation and typed reads.
//! [`SettingMut`] is the exclusive view through which values are assigned and
//! children are added or removed. Views borrow the tree, so the compiler
//! rejects any use of a view after a structural change; use [`SettingId`] to
//! hold on to a node across mutations.

use std::fmt;

use crate::errors::{Error, Result};
use crate::tree::{Node, NodeData, NodeKey, SettingId, Tree};
use crate::value::{FromValue, IntoValue, SettingFormat, SettingType, Value};

#[derive(Clone, Copy)]
pub struct Setting<'a> {
    tree: &'a Tree,
    key: NodeKey,
}

impl<'a> Setting<'a> {
    pub(crate) fn new(tree: &'a Tree, key: NodeKey) -> Self {
        Self { tree, key }
    }

    fn node(&self) -> &'a Node {
        self.tree.node(self.key)
    }

    /// Handle that stays valid until this node is removed or its tree replaced.
    pub fn id(&self) -> SettingId {
        self.tree.id_of(self.key)
    }

    pub fn setting_type(&self) -> SettingType {
        self.node().kind
    }

    pub fn format(&self) -> SettingFormat {
        self.node().format
    }

    /// Name of a Group member; `None` for the root and for Array/List elements.
    pub fn name(&self) -> Option<&'a str> {
        self.node().name.as_deref()
    }

    /// Number of children. Always 0 for scalars.
    pub fn len(&self) -> usize {
        self.node().children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_group(&self) -> bool {
        self.setting_type() == SettingType::Group
    }

    pub fn is_array(&self) -> bool {
        self.setting_type() == SettingType::Array
    }

    pub fn is_list(&self) -> bool {
        self.setting_type() == SettingType::List
    }

    pub fn is_aggregate(&self) -> bool {
        self.setting_type().is_aggregate()
    }

    pub fn is_scalar(&self) -> bool {
        self.setting_type().is_scalar()
    }

    pub fn is_number(&self) -> bool {
        self.setting_type().is_number()
    }

    pub fn is_root(&self) -> bool {
        self.node().parent.is_none()
    }

    pub fn parent(&self) -> Option<Setting<'a>> {
        self.node().parent.map(|p| Setting::new(self.tree, p))
    }

    /// Position within the parent container.
    pub fn index(&self) -> Option<usize> {
        let parent = self.node().parent?;
        self.tree.position(parent, self.key)
    }

    /// Full path from the root, e.g. `server.ports[1]`.
    pub fn path(&self) -> String {
        self.tree.path_of(self.key)
    }

    /// Scalar type shared by the elements of an Array; `None` when the array is
    /// empty or this is not an Array.
    pub fn element_type(&self) -> SettingType {
        match (self.setting_type(), self.node().children().first()) {
            (SettingType::Array, Some(&first)) => self.tree.node(first).kind,
            _ => SettingType::None,
        }
    }

    pub fn children(
        &self,
    ) -> impl DoubleEndedIterator<Item = Setting<'a>> + ExactSizeIterator + 'a {
        let tree = self.tree;
        self.node()
            .children()
            .iter()
            .map(move |&key| Setting::new(tree, key))
    }

    /// Child by position (Group, Array or List).
    pub fn at(&self, index: usize) -> Option<Setting<'a>> {
        self.node()
            .children()
            .get(index)
            .map(|&key| Setting::new(self.tree, key))
    }

    /// Group member by name.
    pub fn member(&self, name: &str) -> Option<Setting<'a>> {
        if !self.is_group() {
            return None;
        }
        self.children().find(|child| child.name() == Some(name))
    }

    /// Raw scalar payload, `None` for containers.
    pub fn value(&self) -> Option<&'a Value> {
        self.node().value()
    }

    /// Strict typed read. Fails with `TypeMismatch` when the node is not of
    /// the requested type, and `OutOfRange` when an integer does not fit `T`.
    pub fn get<T: FromValue>(&self) -> Result<T> {
        let node = self.node();
        match node.value() {
            Some(value) => T::from_value(value, self.tree.options().auto_convert)
                .map_err(|conversion| conversion.into_error(self.path())),
            None => Err(Error::mismatch(
                self.path(),
                format!("expected {}, found {}", T::TYPE, node.kind),
            )),
        }
    }

    /// Borrowed view of a String setting.
    pub fn as_str(&self) -> Result<&'a str> {
        match self.node().value() {
            Some(Value::String(s)) => Ok(s),
            _ => Err(Error::mismatch(
                self.path(),
                format!("expected string, found {}", self.setting_type()),
            )),
        }
    }

    /// Strict lookup relative to this node.
    pub fn lookup(&self, path: &str) -> Result<Setting<'a>> {
        let key = self.tree.resolve(self.key, path)?;
        Ok(Setting::new(self.tree, key))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_ok()
    }

    /// Permissive typed read of `path` relative to this node. `out` is only
    /// written when the whole lookup and conversion succeed.
    pub fn lookup_value<T: FromValue>(&self, path: &str, out: &mut T) -> bool {
        match self.try_lookup(path) {
            Some(value) => {
                *out = value;
                true
            }
            None => false,
        }
    }

    pub fn try_lookup<T: FromValue>(&self, path: &str) -> Option<T> {
        self.lookup(path).and_then(|setting| setting.get()).ok()
    }

    pub fn lookup_or<T: FromValue>(&self, path: &str, default: T) -> T {
        self.try_lookup(path).unwrap_or(default)
    }
}

impl<'b> PartialEq<Setting<'b>> for Setting<'_> {
    /// Structural equality (types, names, order, values); formats are ignored.
    fn eq(&self, other: &Setting<'b>) -> bool {
        self.tree.same_subtree(self.key, other.tree, other.key)
    }
}

impl fmt::Debug for Setting<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Setting");
        out.field("path", &self.path())
            .field("type", &self.setting_type());
        match self.value() {
            Some(value) => out.field("value", value),
            None => out.field("len", &self.len()),
        };
        out.finish()
    }
}

pub struct SettingMut<'a> {
    tree: &'a mut Tree,
    key: NodeKey,
}

impl<'a> SettingMut<'a> {
    pub(crate) fn new(tree: &'a mut Tree, key: NodeKey) -> Self {
        Self { tree, key }
    }

    /// Read-only view of the same node.
    pub fn as_setting(&self) -> Setting<'_> {
        Setting::new(self.tree, self.key)
    }

    pub fn into_setting(self) -> Setting<'a> {
        Setting::new(self.tree, self.key)
    }

    pub fn id(&self) -> SettingId {
        self.tree.id_of(self.key)
    }

    pub fn setting_type(&self) -> SettingType {
        self.tree.node(self.key).kind
    }

    pub fn name(&self) -> Option<&str> {
        self.tree.node(self.key).name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.as_setting().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> String {
        self.tree.path_of(self.key)
    }

    pub fn get<T: FromValue>(&self) -> Result<T> {
        self.as_setting().get()
    }

    /// Strict typed write. The node keeps its type: assigning a value of a
    /// different type fails with `TypeMismatch` (unless auto-conversion
    /// between Int and Float is enabled).
    pub fn set<V: IntoValue>(&mut self, value: V) -> Result<()> {
        let kind = self.setting_type();
        if !kind.is_scalar() {
            return Err(Error::mismatch(
                self.path(),
                format!("cannot assign a value to a {kind} setting"),
            ));
        }
        let auto_convert = self.tree.options().auto_convert;
        let value = value
            .into_value()
            .and_then(|v| v.coerce(kind, auto_convert))
            .map_err(|conversion| conversion.into_error(self.path()))?;
        self.tree.node_mut(self.key).data = NodeData::Scalar(value);
        Ok(())
    }

    /// Only Int settings carry a format; any other type is a `TypeMismatch`.
    pub fn set_format(&mut self, format: SettingFormat) -> Result<()> {
        let kind = self.setting_type();
        if kind != SettingType::Int {
            return Err(Error::mismatch(
                self.path(),
                format!("only int settings have a format, this is {kind}"),
            ));
        }
        self.tree.node_mut(self.key).format = format;
        Ok(())
    }

    /// Add a named child to this Group.
    pub fn add(&mut self, name: &str, kind: SettingType) -> Result<SettingMut<'_>> {
        let key = self.tree.insert_child(self.key, Some(name), kind)?;
        Ok(SettingMut::new(self.tree, key))
    }

    /// Append an unnamed child to this Array or List.
    pub fn append(&mut self, kind: SettingType) -> Result<SettingMut<'_>> {
        let key = self.tree.insert_child(self.key, None, kind)?;
        Ok(SettingMut::new(self.tree, key))
    }

    /// `add` followed by `set`, with the type taken from the value.
    pub fn add_value<V: IntoValue>(&mut self, name: &str, value: V) -> Result<SettingMut<'_>> {
        let value = self.scalar(value)?;
        let key = self
            .tree
            .insert_child(self.key, Some(name), value.setting_type())?;
        self.tree.node_mut(key).data = NodeData::Scalar(value);
        Ok(SettingMut::new(self.tree, key))
    }

    /// `append` followed by `set`, with the type taken from the value.
    pub fn append_value<V: IntoValue>(&mut self, value: V) -> Result<SettingMut<'_>> {
        let value = self.scalar(value)?;
        let key = self.tree.insert_child(self.key, None, value.setting_type())?;
        self.tree.node_mut(key).data = NodeData::Scalar(value);
        Ok(SettingMut::new(self.tree, key))
    }

    fn scalar<V: IntoValue>(&self, value: V) -> Result<Value> {
        value
            .into_value()
            .map_err(|conversion| conversion.into_error(self.path()))
    }

    /// Remove a Group member and everything below it.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let node = self.tree.node(self.key);
        if node.kind != SettingType::Group {
            return Err(Error::mismatch(
                self.path(),
                format!("cannot remove `{name}` by name from a {} setting", node.kind),
            ));
        }
        let index = node
            .children()
            .iter()
            .position(|&c| self.tree.node(c).name.as_deref() == Some(name))
            .ok_or_else(|| Error::not_found(self.tree.child_path(self.key, name)))?;
        self.tree.remove_child_at(self.key, index)
    }

    /// Remove the `index`-th child of any container.
    pub fn remove_at(&mut self, index: usize) -> Result<()> {
        self.tree.remove_child_at(self.key, index)
    }

    pub fn lookup_mut(&mut self, path: &str) -> Result<SettingMut<'_>> {
        let key = self.tree.resolve(self.key, path)?;
        Ok(SettingMut::new(self.tree, key))
    }

    pub fn at_mut(&mut self, index: usize) -> Option<SettingMut<'_>> {
        let key = *self.tree.node(self.key).children().get(index)?;
        Some(SettingMut::new(self.tree, key))
    }

    pub fn member_mut(&mut self, name: &str) -> Option<SettingMut<'_>> {
        let key = self.as_setting().member(name)?.key;
        Some(SettingMut::new(self.tree, key))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.as_setting().exists(path)
    }
}

impl fmt::Debug for SettingMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.as_setting(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    #[test]
    fn add_and_read_back() {
        let mut tree = Tree::new();
        let mut root = tree.root_mut();
        let mut server = root.add("server", SettingType::Group).unwrap();
        server.add("port", SettingType::Int).unwrap().set(8080).unwrap();
        server
            .add("host", SettingType::String)
            .unwrap()
            .set("localhost")
            .unwrap();

        let port = tree.lookup("server.port").unwrap();
        assert_eq!(port.get::<i64>().unwrap(), 8080);
        assert_eq!(port.get::<u16>().unwrap(), 8080);
        assert_eq!(tree.lookup("server.host").unwrap().as_str().unwrap(), "localhost");
        assert_eq!(port.path(), "server.port");
        assert_eq!(port.index(), Some(0));
        assert_eq!(port.parent().and_then(|p| p.name()), Some("server"));
    }

    #[test]
    fn set_never_changes_the_type() {
        let mut tree = Tree::new();
        let mut root = tree.root_mut();
        let mut flag = root.add("flag", SettingType::Boolean).unwrap();
        assert!(matches!(flag.set(1), Err(Error::TypeMismatch { .. })));
        flag.set(true).unwrap();
        assert_eq!(flag.setting_type(), SettingType::Boolean);
        assert!(flag.get::<bool>().unwrap());
    }

    #[test]
    fn strict_get_reports_type_and_range_errors() {
        let mut tree = Tree::new();
        tree.root_mut().add_value("neg", -5).unwrap();
        let neg = tree.lookup("neg").unwrap();
        assert!(matches!(neg.get::<String>(), Err(Error::TypeMismatch { .. })));
        assert!(matches!(neg.get::<f64>(), Err(Error::TypeMismatch { .. })));
        assert!(matches!(
            neg.get::<u32>(),
            Err(Error::OutOfRange { target: "u32", .. })
        ));
        assert_eq!(neg.get::<i32>().unwrap(), -5);
    }

    #[test]
    fn auto_convert_applies_to_get_and_set() {
        let mut tree = Tree::with_options(Options {
            auto_convert: true,
            ..Options::default()
        });
        let mut root = tree.root_mut();
        root.add("ratio", SettingType::Float).unwrap().set(2).unwrap();
        root.add_value("count", 7).unwrap().set(3.9).unwrap();

        assert_eq!(tree.lookup("ratio").unwrap().get::<f64>().unwrap(), 2.0);
        assert_eq!(tree.lookup("count").unwrap().get::<i64>().unwrap(), 3);
        assert_eq!(tree.lookup("count").unwrap().get::<f64>().unwrap(), 3.0);
    }

    #[test]
    fn group_names_are_unique() {
        let mut tree = Tree::new();
        let mut root = tree.root_mut();
        root.add("name", SettingType::Int).unwrap();
        for ty in [SettingType::Int, SettingType::Group, SettingType::String] {
            assert!(matches!(
                root.add("name", ty),
                Err(Error::AlreadyExists { .. })
            ));
        }
        assert!(matches!(
            root.add("bad name", SettingType::Int),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn arrays_are_homogeneous_and_scalar() {
        let mut tree = Tree::new();
        let mut root = tree.root_mut();
        let mut array = root.add("ports", SettingType::Array).unwrap();
        array.append_value(80).unwrap();
        array.append_value(443).unwrap();

        assert!(matches!(
            array.append(SettingType::Float),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            array.append(SettingType::Group),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            array.add("named", SettingType::Int),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(array.as_setting().element_type(), SettingType::Int);
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn lists_take_anything_but_names() {
        let mut tree = Tree::new();
        let mut root = tree.root_mut();
        let mut list = root.add("mixed", SettingType::List).unwrap();
        list.append_value("text").unwrap();
        list.append_value(1.5).unwrap();
        list.append(SettingType::Group)
            .unwrap()
            .add_value("inner", true)
            .unwrap();
        list.append(SettingType::Array).unwrap();
        assert!(matches!(
            list.append(SettingType::None),
            Err(Error::TypeMismatch { .. })
        ));

        let mixed = tree.lookup("mixed").unwrap();
        let types: Vec<_> = mixed.children().map(|c| c.setting_type()).collect();
        assert_eq!(
            types,
            [
                SettingType::String,
                SettingType::Float,
                SettingType::Group,
                SettingType::Array
            ]
        );
        assert!(tree.lookup("mixed.[2].inner").unwrap().get::<bool>().unwrap());
    }

    #[test]
    fn group_rejects_unnamed_children() {
        let mut tree = Tree::new();
        assert!(matches!(
            tree.root_mut().append(SettingType::Int),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn remove_by_name_and_position() {
        let mut tree = Tree::new();
        let mut root = tree.root_mut();
        root.add_value("a", 1).unwrap();
        root.add_value("b", 2).unwrap();
        root.add_value("c", 3).unwrap();

        root.remove("b").unwrap();
        assert!(matches!(root.remove("b"), Err(Error::NotFound { .. })));
        root.remove_at(0).unwrap();
        assert!(matches!(root.remove_at(5), Err(Error::NotFound { .. })));

        let names: Vec<_> = tree.root().children().filter_map(|c| c.name()).collect();
        assert_eq!(names, ["c"]);

        let mut c = tree.lookup_mut("c").unwrap();
        assert!(matches!(c.remove("x"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(c.remove_at(0), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn format_is_int_only() {
        let mut tree = Tree::new();
        let mut root = tree.root_mut();
        root.add_value("mask", 255)
            .unwrap()
            .set_format(SettingFormat::Hex)
            .unwrap();
        assert!(matches!(
            root.add_value("name", "x")
                .unwrap()
                .set_format(SettingFormat::Hex),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(tree.lookup("mask").unwrap().format(), SettingFormat::Hex);
    }

    #[test]
    fn permissive_lookup_leaves_out_untouched_on_failure() {
        let mut tree = Tree::new();
        tree.root_mut().add_value("port", 8080).unwrap();
        let root = tree.root();

        let mut port = 0u16;
        assert!(root.lookup_value("port", &mut port));
        assert_eq!(port, 8080);

        let mut text = String::from("unchanged");
        assert!(!root.lookup_value("port", &mut text));
        assert!(!root.lookup_value("missing", &mut text));
        assert!(!root.lookup_value("port.sub", &mut text));
        assert!(!root.lookup_value("..", &mut text));
        assert_eq!(text, "unchanged");

        let mut small = 7u8;
        assert!(!root.lookup_value("port", &mut small));
        assert_eq!(small, 7);
        assert_eq!(root.lookup_or("missing", 3i32), 3);
    }
}
