use arbor_persist::Message;

use crate::tree::ThreadTree;

/// Root-to-target chain used to build model context.
///
/// With no target the deepest path is used. When the target has replies,
/// its first reply is appended. An unknown target yields an empty path.
pub fn resolve_path<'a>(tree: &'a ThreadTree, target_message_id: Option<&str>) -> Vec<&'a Message> {
    let Some(target) = target_message_id else {
        return tree.find_deepest_path();
    };

    let Some(mut path) = tree.path_to(target) else {
        tracing::debug!(message_id = target, "Target not in tree, returning empty path");
        return Vec::new();
    };

    if let Some(first) = tree.first_child(target) {
        path.push(first);
    }
    path
}

/// Messages sent as context: the in-context members of `path`, in order.
pub fn context_messages(path: &[&Message]) -> Vec<arbor_llm::Message> {
    path.iter()
        .filter(|m| m.is_context)
        .map(|&m| arbor_llm::Message::from(m))
        .collect()
}
