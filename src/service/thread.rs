//! Comment thread assembly
//!
//! Turns the flat, newest-first comment list of a category or item into
//! a reply forest.

use std::collections::HashMap;

use serde::Serialize;

use crate::data::Comment;

/// A comment with its direct replies
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

/// Assemble a reply forest.
///
/// - A comment whose parent is missing from `comments` (or is itself)
///   becomes a root.
/// - Comments only reachable through a parent cycle are kept: the oldest
///   member of each cycle is promoted to a root.
/// - When ids repeat, replies attach to the first occurrence.
/// - Roots and every `replies` list are ordered newest first; equal
///   timestamps keep input order.
///
/// Every input comment appears exactly once in the output.
pub fn build_thread(comments: Vec<Comment>) -> Vec<CommentNode> {
    let count = comments.len();

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(count);
    for (position, comment) in comments.iter().enumerate() {
        index.entry(comment.id.as_str()).or_insert(position);
    }

    let mut parent: Vec<Option<usize>> = comments
        .iter()
        .enumerate()
        .map(|(position, comment)| {
            comment
                .parent_id
                .as_deref()
                .and_then(|parent_id| index.get(parent_id).copied())
                .filter(|&target| target != position)
        })
        .collect();
    drop(index);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (position, target) in parent.iter().enumerate() {
        if let Some(target) = target {
            children[*target].push(position);
        }
    }

    let mut roots: Vec<usize> = (0..count).filter(|&i| parent[i].is_none()).collect();

    // Everything reachable from a root is placed; whatever is left hangs off a cycle.
    let mut placed = vec![false; count];
    for &root in &roots {
        mark_subtree(root, &children, &mut placed);
    }

    for start in 0..count {
        if placed[start] {
            continue;
        }
        let promoted = oldest_in_cycle(start, &parent, &comments);
        if let Some(former_parent) = parent[promoted].take() {
            children[former_parent].retain(|&child| child != promoted);
        }
        roots.push(promoted);
        mark_subtree(promoted, &children, &mut placed);
    }

    // Pre-order walk; building in reverse means children are finished
    // before their parent.
    let mut order = Vec::with_capacity(count);
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        order.push(node);
        stack.extend(children[node].iter().rev().copied());
    }

    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..count).map(|_| None).collect();
    for &node in order.iter().rev() {
        let mut replies: Vec<CommentNode> = children[node]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        sort_newest_first(&mut replies);

        if let Some(comment) = slots[node].take() {
            built[node] = Some(CommentNode { comment, replies });
        }
    }

    let mut forest: Vec<CommentNode> = roots
        .iter()
        .filter_map(|&root| built[root].take())
        .collect();
    sort_newest_first(&mut forest);
    forest
}

fn sort_newest_first(nodes: &mut [CommentNode]) {
    nodes.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));
}

fn mark_subtree(root: usize, children: &[Vec<usize>], placed: &mut [bool]) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if placed[node] {
            continue;
        }
        placed[node] = true;
        stack.extend(children[node].iter().copied());
    }
}

/// Follow parent links from an unplaced comment until they loop, then
/// return the oldest comment on the loop.
fn oldest_in_cycle(start: usize, parent: &[Option<usize>], comments: &[Comment]) -> usize {
    let mut seen_at: HashMap<usize, usize> = HashMap::new();
    let mut path: Vec<usize> = Vec::new();
    let mut current = start;

    loop {
        if let Some(&loop_start) = seen_at.get(&current) {
            return path[loop_start..]
                .iter()
                .copied()
                .min_by_key(|&node| (comments[node].created_at, node))
                .unwrap_or(current);
        }
        seen_at.insert(current, path.len());
        path.push(current);

        match parent[current] {
            Some(next) => current = next,
            // Only reachable if `start` was actually rooted.
            None => return current,
        }
    }
}
