use std::collections::{HashMap, VecDeque};

use arbor_persist::Message;
use serde::Serialize;

/// A message with its nested replies, as rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub message: Message,
    pub children: Vec<TreeNode>,
}

/// Arena of a thread's messages indexed by id, with parent/child links.
///
/// Children keep the order of the input list (creation order). Messages
/// whose parent is absent, or that sit on a parent cycle, are promoted to
/// roots so every input message appears exactly once.
#[derive(Debug, Clone, Default)]
pub struct ThreadTree {
    nodes: Vec<Message>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
    index: HashMap<String, usize>,
}

impl ThreadTree {
    pub fn build(messages: Vec<Message>) -> Self {
        let mut nodes = Vec::with_capacity(messages.len());
        let mut index = HashMap::with_capacity(messages.len());

        for message in messages {
            if index.contains_key(&message.id) {
                tracing::warn!(message_id = %message.id, "Duplicate message id, keeping first");
                continue;
            }
            index.insert(message.id.clone(), nodes.len());
            nodes.push(message);
        }

        let n = nodes.len();
        let mut parent = vec![None; n];
        let mut children = vec![Vec::new(); n];
        let mut roots = Vec::new();

        for (i, message) in nodes.iter().enumerate() {
            match message.parent_message_id.as_deref() {
                None => roots.push(i),
                Some(pid) => match index.get(pid) {
                    Some(&p) if p != i => {
                        parent[i] = Some(p);
                        children[p].push(i);
                    }
                    _ => {
                        tracing::warn!(
                            message_id = %message.id,
                            parent_id = pid,
                            "Parent missing from thread, treating message as root"
                        );
                        roots.push(i);
                    }
                },
            }
        }

        let mut tree = Self {
            nodes,
            parent,
            children,
            roots,
            index,
        };
        tree.break_cycles();
        tree
    }

    /// Promote the first node of every cycle to a root.
    fn break_cycles(&mut self) {
        let n = self.nodes.len();
        let mut reached = vec![false; n];
        let mut queue: VecDeque<usize> = self.roots.iter().copied().collect();
        self.mark(&mut reached, &mut queue);

        let mut promoted = false;
        for i in 0..n {
            if reached[i] {
                continue;
            }
            if let Some(p) = self.parent[i].take() {
                self.children[p].retain(|&c| c != i);
            }
            tracing::warn!(message_id = %self.nodes[i].id, "Parent cycle detected, treating message as root");
            self.roots.push(i);
            promoted = true;
            queue.push_back(i);
            self.mark(&mut reached, &mut queue);
        }

        if promoted {
            self.roots.sort_unstable();
        }
    }

    fn mark(&self, reached: &mut [bool], queue: &mut VecDeque<usize>) {
        while let Some(i) = queue.pop_front() {
            if reached[i] {
                continue;
            }
            reached[i] = true;
            queue.extend(self.children[i].iter().copied());
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.index.contains_key(message_id)
    }

    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.index.get(message_id).map(|&i| &self.nodes[i])
    }

    pub fn roots(&self) -> impl Iterator<Item = &Message> {
        self.roots.iter().map(|&i| &self.nodes[i])
    }

    /// Direct children in creation order; empty for unknown ids.
    pub fn children(&self, message_id: &str) -> Vec<&Message> {
        self.index
            .get(message_id)
            .map(|&i| self.children[i].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    pub fn first_child(&self, message_id: &str) -> Option<&Message> {
        let &i = self.index.get(message_id)?;
        self.children[i].first().map(|&c| &self.nodes[c])
    }

    /// Root-to-message chain (inclusive), or `None` when the id is unknown.
    pub fn path_to(&self, message_id: &str) -> Option<Vec<&Message>> {
        let &target = self.index.get(message_id)?;
        Some(self.chain(target))
    }

    fn chain(&self, mut i: usize) -> Vec<&Message> {
        let mut path = vec![&self.nodes[i]];
        while let Some(p) = self.parent[i] {
            path.push(&self.nodes[p]);
            i = p;
        }
        path.reverse();
        path
    }

    /// Ids of every transitive descendant, breadth-first, excluding the message itself.
    pub fn descendant_ids(&self, message_id: &str) -> Vec<String> {
        let Some(&start) = self.index.get(message_id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut queue: VecDeque<usize> = self.children[start].iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            out.push(self.nodes[i].id.clone());
            queue.extend(self.children[i].iter().copied());
        }
        out
    }

    /// Longest root-to-leaf path by node count.
    ///
    /// Traversal is pre-order with siblings in creation order; on equal
    /// length the first path reached wins.
    pub fn find_deepest_path(&self) -> Vec<&Message> {
        let mut best: Option<(usize, usize)> = None;
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&r| (r, 1)).collect();

        while let Some((i, depth)) = stack.pop() {
            if self.children[i].is_empty() {
                if best.map_or(true, |(_, d)| depth > d) {
                    best = Some((i, depth));
                }
                continue;
            }
            stack.extend(self.children[i].iter().rev().map(|&c| (c, depth + 1)));
        }

        best.map(|(leaf, _)| self.chain(leaf)).unwrap_or_default()
    }

    /// Nested forest view, built bottom-up without recursion.
    pub fn to_forest(&self) -> Vec<TreeNode> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(self.children[i].iter().rev());
        }

        let mut built: Vec<Option<TreeNode>> = (0..self.nodes.len()).map(|_| None).collect();
        for &i in order.iter().rev() {
            let children = self.children[i]
                .iter()
                .filter_map(|&c| built[c].take())
                .collect();
            built[i] = Some(TreeNode {
                message: self.nodes[i].clone(),
                children,
            });
        }

        self.roots.iter().filter_map(|&r| built[r].take()).collect()
    }
}
