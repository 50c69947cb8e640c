//! A directed acyclic graph with insertion-ordered nodes.
//!
//! Edges mean "runs before": `add_edge(a, b)` makes `a` a dependency of `b`.
//! Every query that has a choice of order breaks ties by node insertion
//! order, so results are deterministic.
//!
//! The graph is shared behind a reader-writer lock. Readers (queries,
//! traversals) run concurrently; structural edits are serialized, and an
//! edge that would close a cycle is rolled back before the write lock is
//! released, so no reader ever observes a cyclic graph.

use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::error::GraphError;

pub trait NodeKey: Clone + Eq + Hash + Debug {}
impl<T: Clone + Eq + Hash + Debug> NodeKey for T {}

pub struct Dag<K, V> {
    inner: RwLock<Inner<K, V>>,
}

struct Inner<K, V> {
    nodes: IndexMap<K, V>,
    /// node -> nodes that depend on it
    out: IndexMap<K, IndexSet<K>>,
    /// node -> nodes it depends on
    inc: IndexMap<K, IndexSet<K>>,
}

impl<K, V> Default for Dag<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                nodes: IndexMap::new(),
                out: IndexMap::new(),
                inc: IndexMap::new(),
            }),
        }
    }
}

impl<K: NodeKey, V> Debug for Dag<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dag")
            .field("nodes", &self.nodes())
            .field("edges", &self.edges())
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

impl<K: NodeKey, V> Inner<K, V> {
    fn succ(&self, k: &K) -> impl Iterator<Item = &K> {
        self.out.get(k).into_iter().flatten()
    }

    fn roots(&self) -> impl Iterator<Item = &K> {
        self.nodes
            .keys()
            .filter(|k| self.inc.get(*k).is_none_or(|s| s.is_empty()))
    }

    /// DFS colouring: a grey node reached again closes a cycle. Returns the
    /// nodes on the grey path when one is found.
    fn find_cycle(&self) -> Option<Vec<K>> {
        let mut colour: IndexMap<&K, Colour> =
            self.nodes.keys().map(|k| (k, Colour::White)).collect();
        for start in self.nodes.keys() {
            if colour[start] != Colour::White {
                continue;
            }
            // (node, index of the next successor to visit)
            let mut stack: Vec<(&K, usize)> = vec![(start, 0)];
            colour.insert(start, Colour::Grey);
            while let Some((node, i)) = stack.last_mut() {
                let next = self.succ(*node).nth(*i);
                *i += 1;
                match next {
                    None => {
                        colour.insert(*node, Colour::Black);
                        stack.pop();
                    }
                    Some(n) => match colour.get(n).copied() {
                        Some(Colour::White) => {
                            colour.insert(n, Colour::Grey);
                            stack.push((n, 0));
                        }
                        Some(Colour::Grey) => {
                            let from = stack.iter().position(|(k, _)| *k == n).unwrap_or(0);
                            return Some(stack[from..].iter().map(|(k, _)| (*k).clone()).collect());
                        }
                        _ => {}
                    },
                }
            }
        }
        None
    }

    fn kahn(&self) -> Result<Vec<Vec<K>>, GraphError<K>> {
        let mut indeg: IndexMap<&K, usize> = self
            .nodes
            .keys()
            .map(|k| (k, self.inc.get(k).map_or(0, |s| s.len())))
            .collect();
        let mut level: Vec<&K> = indeg
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();
        let mut levels = Vec::new();
        let mut seen = 0;
        while !level.is_empty() {
            seen += level.len();
            let mut next = Vec::new();
            for k in &level {
                for s in self.succ(k) {
                    if let Some(d) = indeg.get_mut(s) {
                        *d -= 1;
                        if *d == 0 {
                            next.push(s);
                        }
                    }
                }
            }
            // Keep each level in insertion order.
            next.sort_by_key(|k| self.nodes.get_index_of(*k));
            levels.push(level.into_iter().cloned().collect());
            level = next;
        }
        if seen != self.nodes.len() {
            let stuck = indeg
                .into_iter()
                .filter(|(_, d)| *d > 0)
                .map(|(k, _)| k.clone())
                .collect();
            return Err(GraphError::CycleDetected(stuck));
        }
        Ok(levels)
    }
}

impl<K: NodeKey, V> Dag<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, k: &K) -> bool {
        self.inner.read().nodes.contains_key(k)
    }

    pub fn nodes(&self) -> Vec<K> {
        self.inner.read().nodes.keys().cloned().collect()
    }

    /// Every edge `(from, to)`, grouped by `from` in insertion order.
    pub fn edges(&self) -> Vec<(K, K)> {
        let g = self.inner.read();
        g.nodes
            .keys()
            .flat_map(|from| g.succ(from).map(move |to| (from.clone(), to.clone())))
            .collect()
    }

    pub fn has_edge(&self, from: &K, to: &K) -> bool {
        self.inner
            .read()
            .out
            .get(from)
            .is_some_and(|s| s.contains(to))
    }

    pub fn get(&self, k: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.read().nodes.get(k).cloned()
    }

    pub fn with_node<R>(&self, k: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.inner.read().nodes.get(k).map(f)
    }

    pub fn add_node(&self, k: K, v: V) -> Result<(), GraphError<K>> {
        let mut g = self.inner.write();
        if g.nodes.contains_key(&k) {
            return Err(GraphError::DuplicateNode(k));
        }
        g.out.insert(k.clone(), IndexSet::new());
        g.inc.insert(k.clone(), IndexSet::new());
        g.nodes.insert(k, v);
        Ok(())
    }

    /// Add `from -> to`. Re-adding an existing edge is a no-op. An edge that
    /// would close a cycle is rejected and the graph is left exactly as it
    /// was.
    pub fn add_edge(&self, from: K, to: K) -> Result<(), GraphError<K>> {
        let mut g = self.inner.write();
        for k in [&from, &to] {
            if !g.nodes.contains_key(k) {
                return Err(GraphError::UnknownNode(k.clone()));
            }
        }
        if g.out.get(&from).is_some_and(|s| s.contains(&to)) {
            return Ok(());
        }
        if from == to {
            return Err(GraphError::Cycle { from, to });
        }

        g.out.entry(from.clone()).or_default().insert(to.clone());
        g.inc.entry(to.clone()).or_default().insert(from.clone());
        if let Some(path) = g.find_cycle() {
            // IndexSet::pop removes the last insert, which keeps the
            // remaining order untouched.
            g.out.get_mut(&from).and_then(|s| s.pop());
            g.inc.get_mut(&to).and_then(|s| s.pop());
            log::debug!(
                target: crate::LOG_TARGET,
                "rejected edge {from:?} -> {to:?}; cycle through {path:?}"
            );
            return Err(GraphError::Cycle { from, to });
        }
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&self, k: &K) -> Option<V> {
        let mut g = self.inner.write();
        let v = g.nodes.shift_remove(k)?;
        let outs = g.out.shift_remove(k).unwrap_or_default();
        let ins = g.inc.shift_remove(k).unwrap_or_default();
        for o in &outs {
            if let Some(s) = g.inc.get_mut(o) {
                s.shift_remove(k);
            }
        }
        for i in &ins {
            if let Some(s) = g.out.get_mut(i) {
                s.shift_remove(k);
            }
        }
        Some(v)
    }

    pub fn remove_edge(&self, from: &K, to: &K) -> bool {
        let mut g = self.inner.write();
        let removed = g.out.get_mut(from).is_some_and(|s| s.shift_remove(to));
        if removed && let Some(s) = g.inc.get_mut(to) {
            s.shift_remove(from);
        }
        removed
    }

    /// Nodes that must come before `k`.
    pub fn dependencies(&self, k: &K) -> Vec<K> {
        self.inner
            .read()
            .inc
            .get(k)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Nodes that come after `k`.
    pub fn dependents(&self, k: &K) -> Vec<K> {
        self.inner
            .read()
            .out
            .get(k)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Nodes with no dependencies.
    pub fn roots(&self) -> Vec<K> {
        self.inner.read().roots().cloned().collect()
    }

    /// Kahn's algorithm. Every node appears once and every edge points
    /// forward.
    pub fn topological_sort(&self) -> Result<Vec<K>, GraphError<K>> {
        Ok(self.levels()?.into_iter().flatten().collect())
    }

    /// Nodes grouped so that each depends only on nodes in earlier groups.
    pub fn levels(&self) -> Result<Vec<Vec<K>>, GraphError<K>> {
        self.inner.read().kahn()
    }

    /// Breadth-first from the roots, then from anything left unreached.
    pub fn bfs(&self) -> Vec<K> {
        let g = self.inner.read();
        let mut seen: IndexSet<&K> = IndexSet::new();
        let mut queue: VecDeque<&K> = VecDeque::new();
        let starts: Vec<&K> = g.roots().chain(g.nodes.keys()).collect();
        for start in starts {
            if !seen.insert(start) {
                continue;
            }
            queue.push_back(start);
            while let Some(k) = queue.pop_front() {
                for s in g.succ(k) {
                    if seen.insert(s) {
                        queue.push_back(s);
                    }
                }
            }
        }
        seen.into_iter().cloned().collect()
    }

    /// Depth-first pre-order from the roots, then from anything left
    /// unreached.
    pub fn dfs(&self) -> Vec<K> {
        let g = self.inner.read();
        let mut seen: IndexSet<&K> = IndexSet::new();
        let starts: Vec<&K> = g.roots().chain(g.nodes.keys()).collect();
        for start in starts {
            let mut stack = vec![start];
            while let Some(k) = stack.pop() {
                if !seen.insert(k) {
                    continue;
                }
                let succ: Vec<&K> = g.succ(k).collect();
                stack.extend(succ.into_iter().rev().filter(|s| !seen.contains(*s)));
            }
        }
        seen.into_iter().cloned().collect()
    }

    /// Run `f` over every node, level by level. Nodes in one level run
    /// concurrently on scoped threads and are joined before the next level
    /// starts. The first error (in level order) is returned and later levels
    /// are skipped.
    ///
    /// Node values are cloned out first, so `f` may read or edit the graph.
    pub fn parallel_process<R, E, F>(&self, f: F) -> Result<IndexMap<K, R>, E>
    where
        K: Send + Sync,
        V: Clone + Send + Sync,
        R: Send,
        E: Send + From<GraphError<K>>,
        F: Fn(&K, &V) -> Result<R, E> + Sync,
    {
        let plan: Vec<Vec<(K, V)>> = {
            let g = self.inner.read();
            g.kahn()?
                .into_iter()
                .map(|level| {
                    level
                        .into_iter()
                        .filter_map(|k| g.nodes.get(&k).cloned().map(|v| (k, v)))
                        .collect()
                })
                .collect()
        };

        let mut out = IndexMap::new();
        for level in plan {
            let results: Vec<(K, Result<R, E>)> = if level.len() == 1 {
                level
                    .into_iter()
                    .map(|(k, v)| {
                        let r = f(&k, &v);
                        (k, r)
                    })
                    .collect()
            } else {
                let f = &f;
                std::thread::scope(|s| {
                    let handles: Vec<_> = level
                        .iter()
                        .map(|(k, v)| (k, s.spawn(move || f(k, v))))
                        .collect();
                    handles
                        .into_iter()
                        .map(|(k, h)| {
                            let r = h
                                .join()
                                .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
                            (k.clone(), r)
                        })
                        .collect()
                })
            };
            for (k, r) in results {
                out.insert(k, r?);
            }
        }
        Ok(out)
    }
}
