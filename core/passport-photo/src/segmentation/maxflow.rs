//! Boykov–Kolmogorov max-flow / min-cut on sparse graphs.
//!
//! Arcs are stored in pairs so an arc's reverse ("sister") is `arc ^ 1`.
//! Terminal capacities are folded into a single signed residual per node:
//! positive means residual capacity from the source, negative to the sink.

use std::collections::VecDeque;

const NONE: u32 = u32::MAX;
const INFINITE_DIST: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    /// Not in any search tree.
    Free,
    /// Attached directly to its terminal.
    Terminal,
    /// Cut off from its tree during augmentation, awaiting adoption.
    Orphan,
    /// Attached through this arc (pointing from the node to its parent).
    Arc(u32),
}

#[derive(Debug, Clone)]
struct Node {
    first: u32,
    parent: Parent,
    in_sink_tree: bool,
    active: bool,
    timestamp: u64,
    dist: u32,
    tr_cap: f64,
}

#[derive(Debug, Clone)]
struct Arc {
    head: u32,
    next: u32,
    r_cap: f64,
}

/// Which side of the minimum cut a node ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Connected to the source.
    Source,
    /// Connected to the sink.
    Sink,
}

/// Directed capacity graph with source/sink terminals.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    arcs: Vec<Arc>,
    flow: f64,
    active: VecDeque<u32>,
    orphans: VecDeque<u32>,
    time: u64,
}

impl Graph {
    /// Create a graph with `node_count` nodes and room for `edge_hint` edges.
    pub fn new(node_count: usize, edge_hint: usize) -> Self {
        let node = Node {
            first: NONE,
            parent: Parent::Free,
            in_sink_tree: false,
            active: false,
            timestamp: 0,
            dist: 0,
            tr_cap: 0.0,
        };
        Self {
            nodes: vec![node; node_count],
            arcs: Vec::with_capacity(edge_hint * 2),
            ..Self::default()
        }
    }

    /// Add source → `node` and `node` → sink capacities.
    ///
    /// May be called repeatedly for the same node; capacities accumulate.
    pub fn add_terminal_weights(&mut self, node: usize, source_cap: f64, sink_cap: f64) {
        let (mut source_cap, mut sink_cap) = (source_cap, sink_cap);
        let delta = self.nodes[node].tr_cap;
        if delta > 0.0 {
            source_cap += delta;
        } else {
            sink_cap -= delta;
        }
        self.flow += source_cap.min(sink_cap);
        self.nodes[node].tr_cap = source_cap - sink_cap;
    }

    /// Add an edge `from → to` with `cap` and `to → from` with `rev_cap`.
    pub fn add_edge(&mut self, from: usize, to: usize, cap: f64, rev_cap: f64) {
        debug_assert_ne!(from, to, "self loops carry no flow");
        let forward = self.arcs.len() as u32;
        let backward = forward + 1;

        self.arcs.push(Arc {
            head: to as u32,
            next: self.nodes[from].first,
            r_cap: cap,
        });
        self.arcs.push(Arc {
            head: from as u32,
            next: self.nodes[to].first,
            r_cap: rev_cap,
        });
        self.nodes[from].first = forward;
        self.nodes[to].first = backward;
    }

    /// Side of the cut `node` belongs to after [`Graph::maxflow`].
    ///
    /// Nodes reachable from neither terminal are reported on the source side.
    pub fn segment(&self, node: usize) -> Segment {
        let n = &self.nodes[node];
        if n.parent != Parent::Free && n.in_sink_tree {
            Segment::Sink
        } else {
            Segment::Source
        }
    }

    /// Compute the maximum flow and return its value.
    pub fn maxflow(&mut self) -> f64 {
        self.init_trees();

        let mut current: Option<u32> = None;
        loop {
            let i = match current.take() {
                Some(i) if self.nodes[i as usize].parent != Parent::Free => i,
                Some(i) => {
                    self.nodes[i as usize].active = false;
                    match self.next_active() {
                        Some(i) => i,
                        None => break,
                    }
                }
                None => match self.next_active() {
                    Some(i) => i,
                    None => break,
                },
            };

            match self.grow(i) {
                Some(middle) => {
                    self.time += 1;
                    self.augment(middle);
                    self.adopt_orphans();
                    current = Some(i);
                }
                None => {
                    self.time += 1;
                    self.nodes[i as usize].active = false;
                }
            }
        }

        self.flow
    }

    fn init_trees(&mut self) {
        self.active.clear();
        self.orphans.clear();
        self.time = 0;
        for i in 0..self.nodes.len() {
            let node = &mut self.nodes[i];
            node.active = false;
            node.timestamp = 0;
            if node.tr_cap > 0.0 {
                node.in_sink_tree = false;
                node.parent = Parent::Terminal;
                node.dist = 1;
                self.set_active(i as u32);
            } else if node.tr_cap < 0.0 {
                node.in_sink_tree = true;
                node.parent = Parent::Terminal;
                node.dist = 1;
                self.set_active(i as u32);
            } else {
                node.parent = Parent::Free;
            }
        }
    }

    fn set_active(&mut self, i: u32) {
        let node = &mut self.nodes[i as usize];
        if !node.active {
            node.active = true;
            self.active.push_back(i);
        }
    }

    fn next_active(&mut self) -> Option<u32> {
        while let Some(i) = self.active.pop_front() {
            if self.nodes[i as usize].parent != Parent::Free {
                return Some(i);
            }
            self.nodes[i as usize].active = false;
        }
        None
    }

    /// Grow the tree containing `i` by one layer. Returns the arc bridging
    /// the two trees (oriented source side → sink side) if one is found.
    fn grow(&mut self, i: u32) -> Option<u32> {
        let iu = i as usize;
        let in_sink = self.nodes[iu].in_sink_tree;
        let mut a = self.nodes[iu].first;

        while a != NONE {
            let sister = a ^ 1;
            let residual = if in_sink {
                self.arcs[sister as usize].r_cap
            } else {
                self.arcs[a as usize].r_cap
            };

            if residual > 0.0 {
                let j = self.arcs[a as usize].head as usize;
                match self.nodes[j].parent {
                    Parent::Free => {
                        let (ts, dist) = (self.nodes[iu].timestamp, self.nodes[iu].dist);
                        let node = &mut self.nodes[j];
                        node.in_sink_tree = in_sink;
                        node.parent = Parent::Arc(sister);
                        node.timestamp = ts;
                        node.dist = dist + 1;
                        self.set_active(j as u32);
                    }
                    _ if self.nodes[j].in_sink_tree != in_sink => {
                        return Some(if in_sink { sister } else { a });
                    }
                    _ => {
                        let (ts, dist) = (self.nodes[iu].timestamp, self.nodes[iu].dist);
                        let node = &mut self.nodes[j];
                        if node.timestamp <= ts && node.dist > dist {
                            node.parent = Parent::Arc(sister);
                            node.timestamp = ts;
                            node.dist = dist + 1;
                        }
                    }
                }
            }
            a = self.arcs[a as usize].next;
        }
        None
    }

    fn augment(&mut self, middle: u32) {
        let middle_sister = middle ^ 1;

        // Bottleneck along source side.
        let mut bottleneck = self.arcs[middle as usize].r_cap;
        let mut i = self.arcs[middle_sister as usize].head as usize;
        while let Parent::Arc(a) = self.nodes[i].parent {
            bottleneck = bottleneck.min(self.arcs[(a ^ 1) as usize].r_cap);
            i = self.arcs[a as usize].head as usize;
        }
        bottleneck = bottleneck.min(self.nodes[i].tr_cap);

        // Bottleneck along sink side.
        let mut i = self.arcs[middle as usize].head as usize;
        while let Parent::Arc(a) = self.nodes[i].parent {
            bottleneck = bottleneck.min(self.arcs[a as usize].r_cap);
            i = self.arcs[a as usize].head as usize;
        }
        bottleneck = bottleneck.min(-self.nodes[i].tr_cap);

        self.arcs[middle_sister as usize].r_cap += bottleneck;
        self.arcs[middle as usize].r_cap -= bottleneck;

        // Push along source side.
        let mut i = self.arcs[middle_sister as usize].head as usize;
        while let Parent::Arc(a) = self.nodes[i].parent {
            self.arcs[a as usize].r_cap += bottleneck;
            self.arcs[(a ^ 1) as usize].r_cap -= bottleneck;
            let next = self.arcs[a as usize].head as usize;
            if self.arcs[(a ^ 1) as usize].r_cap <= 0.0 {
                self.set_orphan_front(i);
            }
            i = next;
        }
        self.nodes[i].tr_cap -= bottleneck;
        if self.nodes[i].tr_cap <= 0.0 {
            self.set_orphan_front(i);
        }

        // Push along sink side.
        let mut i = self.arcs[middle as usize].head as usize;
        while let Parent::Arc(a) = self.nodes[i].parent {
            self.arcs[(a ^ 1) as usize].r_cap += bottleneck;
            self.arcs[a as usize].r_cap -= bottleneck;
            let next = self.arcs[a as usize].head as usize;
            if self.arcs[a as usize].r_cap <= 0.0 {
                self.set_orphan_front(i);
            }
            i = next;
        }
        self.nodes[i].tr_cap += bottleneck;
        if self.nodes[i].tr_cap >= 0.0 {
            self.set_orphan_front(i);
        }

        self.flow += bottleneck;
    }

    fn set_orphan_front(&mut self, i: usize) {
        self.nodes[i].parent = Parent::Orphan;
        self.orphans.push_front(i as u32);
    }

    fn set_orphan_rear(&mut self, i: usize) {
        self.nodes[i].parent = Parent::Orphan;
        self.orphans.push_back(i as u32);
    }

    fn adopt_orphans(&mut self) {
        while let Some(i) = self.orphans.pop_front() {
            self.process_orphan(i as usize);
        }
    }

    /// Distance from `j` to its terminal following parent links, or
    /// `INFINITE_DIST` if the path runs into an orphan.
    fn origin_distance(&mut self, j: usize) -> u32 {
        let mut d: u32 = 0;
        let mut k = j;
        loop {
            if self.nodes[k].timestamp == self.time {
                d += self.nodes[k].dist;
                break;
            }
            d += 1;
            match self.nodes[k].parent {
                Parent::Terminal => {
                    self.nodes[k].timestamp = self.time;
                    self.nodes[k].dist = 1;
                    break;
                }
                Parent::Arc(a) => k = self.arcs[a as usize].head as usize,
                Parent::Orphan | Parent::Free => return INFINITE_DIST,
            }
        }

        // Cache distances along the path for later queries this round.
        let mut k = j;
        let mut dist = d;
        while self.nodes[k].timestamp != self.time {
            self.nodes[k].timestamp = self.time;
            self.nodes[k].dist = dist;
            dist -= 1;
            match self.nodes[k].parent {
                Parent::Arc(a) => k = self.arcs[a as usize].head as usize,
                _ => break,
            }
        }
        d
    }

    fn process_orphan(&mut self, i: usize) {
        let in_sink = self.nodes[i].in_sink_tree;
        let mut best_arc = NONE;
        let mut best_dist = INFINITE_DIST;

        let mut a0 = self.nodes[i].first;
        while a0 != NONE {
            // Capacity must point from the tree towards `i`.
            let residual = if in_sink {
                self.arcs[a0 as usize].r_cap
            } else {
                self.arcs[(a0 ^ 1) as usize].r_cap
            };
            let j = self.arcs[a0 as usize].head as usize;
            if residual > 0.0
                && self.nodes[j].in_sink_tree == in_sink
                && self.nodes[j].parent != Parent::Free
            {
                let d = self.origin_distance(j);
                if d < best_dist {
                    best_arc = a0;
                    best_dist = d;
                }
            }
            a0 = self.arcs[a0 as usize].next;
        }

        if best_arc != NONE {
            let node = &mut self.nodes[i];
            node.parent = Parent::Arc(best_arc);
            node.timestamp = self.time;
            node.dist = best_dist + 1;
            return;
        }

        // No valid parent: free the node and wake up its neighbours.
        let mut a0 = self.nodes[i].first;
        while a0 != NONE {
            let j = self.arcs[a0 as usize].head as usize;
            let neighbour = &self.nodes[j];
            if neighbour.in_sink_tree == in_sink && neighbour.parent != Parent::Free {
                let residual = if in_sink {
                    self.arcs[a0 as usize].r_cap
                } else {
                    self.arcs[(a0 ^ 1) as usize].r_cap
                };
                if residual > 0.0 {
                    self.set_active(j as u32);
                }
                if let Parent::Arc(pa) = self.nodes[j].parent {
                    if self.arcs[pa as usize].head as usize == i {
                        self.set_orphan_rear(j);
                    }
                }
            }
            a0 = self.arcs[a0 as usize].next;
        }
        self.nodes[i].parent = Parent::Free;
    }
}
