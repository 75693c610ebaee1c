// Path Resolver: walks a tree snapshot from its root by segment name, and maps
// node ids back to paths. Nothing here caches across snapshots.

use super::normalize::{join, segments, ROOT_PATH};
use crate::types::Node;

/// Resolve a path against a snapshot.
///
/// `/` always yields the root. A segment that does not match any child at its
/// depth makes the whole path unresolvable; there is no partial result.
pub fn resolve<'a>(tree: &'a Node, path: &str) -> Option<&'a Node> {
    resolve_chain(tree, path).and_then(|chain| chain.last().copied())
}

/// Resolve a path and return every node visited, root first.
pub fn resolve_chain<'a>(tree: &'a Node, path: &str) -> Option<Vec<&'a Node>> {
    let parts = segments(path).ok()?;
    let mut chain = Vec::with_capacity(parts.len() + 1);
    let mut current = tree;
    chain.push(current);
    for part in parts {
        current = current.child(part)?;
        chain.push(current);
    }
    Some(chain)
}

/// First path (depth-first, children in order) at which `id` appears.
pub fn canonical_path(tree: &Node, id: &str) -> Option<String> {
    if tree.id == id {
        return Some(ROOT_PATH.to_string());
    }
    let mut stack: Vec<String> = Vec::new();
    find_path(tree, id, &mut stack).then(|| format!("/{}", stack.join("/")))
}

fn find_path(node: &Node, id: &str, stack: &mut Vec<String>) -> bool {
    for child in &node.children {
        stack.push(child.name.clone());
        if child.id == id || find_path(child, id, stack) {
            return true;
        }
        stack.pop();
    }
    false
}

/// Every path at which `id` appears. Shared layers yield more than one.
pub fn paths_of(tree: &Node, id: &str) -> Vec<String> {
    walk(tree).filter(|(_, node)| node.id == id).map(|(path, _)| path).collect()
}

/// First node carrying `id`.
pub fn find_by_id<'a>(tree: &'a Node, id: &str) -> Option<&'a Node> {
    if tree.id == id {
        return Some(tree);
    }
    tree.children.iter().find_map(|child| find_by_id(child, id))
}

/// Rebuild a path from a chain of node ids, root first, matching ids at each
/// level. This is how a selection survives renames: the ids stay, the names
/// are read fresh from the snapshot.
pub fn path_for_chain(tree: &Node, ids: &[String]) -> Option<String> {
    let (first, rest) = ids.split_first()?;
    if *first != tree.id {
        return None;
    }
    let mut current = tree;
    let mut path = ROOT_PATH.to_string();
    for id in rest {
        current = current.children.iter().find(|child| child.id == *id)?;
        path = join(&path, &current.name);
    }
    Some(path)
}

/// Depth-first walk yielding `(path, node)` for every node, root first.
pub fn walk(tree: &Node) -> impl Iterator<Item = (String, &Node)> {
    let mut stack = vec![(ROOT_PATH.to_string(), tree)];
    std::iter::from_fn(move || {
        let (path, node) = stack.pop()?;
        for child in node.children.iter().rev() {
            stack.push((join(&path, &child.name), child));
        }
        Some((path, node))
    })
}
