use std::collections::{HashSet, VecDeque};

use crate::error::{SampleError, SampleResult};

/// Answer to "what are the direct children of this pid".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChildQuery {
    /// The pid has no children; a valid leaf.
    Leaf,
    Children(Vec<u32>),
}

/// Enumerates processes and their direct children.
pub trait ChildLister {
    /// Called once before each walk so table-backed listers can re-read the
    /// process table.
    fn refresh(&mut self) {}

    /// Whether `pid` is a live, unreaped process.
    fn is_alive(&mut self, pid: u32) -> bool;

    fn children(&mut self, pid: u32) -> SampleResult<ChildQuery>;
}

/// The pids found under one root, in discovery (breadth-first) order.
#[derive(Debug, Default)]
pub struct Discovery {
    order: Vec<u32>,
    seen: HashSet<u32>,
    /// Branches that could not be expanded.
    pub errors: Vec<SampleError>,
}

impl Discovery {
    fn insert(&mut self, pid: u32) -> bool {
        if self.seen.insert(pid) {
            self.order.push(pid);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.seen.contains(&pid)
    }

    pub fn pids(&self) -> &[u32] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Finds `root` and all of its live descendants.
///
/// Empty when the root itself is not alive. A pid reachable through more
/// than one parent appears once. A branch whose enumeration fails is recorded
/// in [`Discovery::errors`] and not expanded further.
pub fn descendants(lister: &mut dyn ChildLister, root: u32) -> Discovery {
    let mut found = Discovery::default();
    lister.refresh();
    if !lister.is_alive(root) {
        return found;
    }

    found.insert(root);
    let mut frontier = VecDeque::from([root]);
    while let Some(pid) = frontier.pop_front() {
        match lister.children(pid) {
            Ok(ChildQuery::Leaf) => {}
            Ok(ChildQuery::Children(children)) => {
                for child in children {
                    if found.contains(child) {
                        tracing::trace!(pid = child, parent = pid, "pid already discovered");
                        continue;
                    }
                    // Exited but unreaped children are still listed.
                    if !lister.is_alive(child) {
                        continue;
                    }
                    found.insert(child);
                    frontier.push_back(child);
                }
            }
            Err(err) => found.errors.push(err),
        }
    }
    found
}
