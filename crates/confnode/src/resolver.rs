use crate::errors::{Error, Result};
use crate::key_path::{KeyPath, Segment};
use crate::tree::{NodeKey, Tree};
use crate::value::SettingType;

/// Walk `path` from `start`, one segment at a time.
///
/// Missing names and out-of-range indices are `NotFound`; stepping into a
/// scalar, or by name into an Array/List, is `TypeMismatch`. The error path is
/// the prefix walked so far plus the failing segment.
pub(crate) fn resolve(tree: &Tree, start: NodeKey, path: &KeyPath) -> Result<NodeKey> {
    let mut cur = start;
    let mut walked = tree.path_of(start);

    for segment in path.segments() {
        let node = tree.node(cur);
        let next = match segment {
            Segment::Name(name) => match node.kind {
                SettingType::Group => node
                    .children()
                    .iter()
                    .copied()
                    .find(|&c| tree.node(c).name.as_deref() == Some(name.as_str())),
                SettingType::Array | SettingType::List => {
                    return Err(Error::mismatch(
                        walked,
                        format!("{} elements have no names (looked up `{name}`)", node.kind),
                    ));
                }
                kind => {
                    return Err(Error::mismatch(
                        walked,
                        format!("{kind} setting has no members (looked up `{name}`)"),
                    ));
                }
            },
            Segment::Index(index) => {
                if !node.kind.is_aggregate() {
                    return Err(Error::mismatch(
                        walked,
                        format!("{} setting cannot be indexed", node.kind),
                    ));
                }
                node.children().get(*index).copied()
            }
        };

        append(&mut walked, segment);
        cur = next.ok_or_else(|| Error::not_found(walked.clone()))?;
    }

    Ok(cur)
}

fn append(walked: &mut String, segment: &Segment) {
    if !walked.is_empty() && matches!(segment, Segment::Name(_)) {
        walked.push('.');
    }
    walked.push_str(&segment.to_string());
}
