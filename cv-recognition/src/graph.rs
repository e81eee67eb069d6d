use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    id: usize,
    fitness: i64,
    neighbors: BTreeSet<usize>,
}

impl GraphNode {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn fitness(&self) -> i64 {
        self.fitness
    }

    pub fn neighbors(&self) -> &BTreeSet<usize> {
        &self.neighbors
    }
}

/// The result of [`Graph::compute_maximal_on_off_partition`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnOffPartition {
    /// The ON nodes in the order they were switched on.
    pub on: Vec<usize>,
    pub off: Vec<usize>,
}

/// An undirected graph without self-loops whose nodes are addressed by their index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<GraphNode>,
}

impl Graph {
    /// Creates a graph with `num_nodes` isolated nodes of fitness zero.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            nodes: (0..num_nodes)
                .map(|id| GraphNode {
                    id,
                    fitness: 0,
                    neighbors: BTreeSet::new(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: usize) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Returns `false` for self-loops and unknown nodes.
    pub fn insert_undirected_edge(&mut self, a: usize, b: usize) -> bool {
        if a == b || a >= self.nodes.len() || b >= self.nodes.len() {
            return false;
        }
        self.nodes[a].neighbors.insert(b);
        self.nodes[b].neighbors.insert(a);
        true
    }

    /// Returns `true` if the edge existed.
    pub fn delete_undirected_edge(&mut self, a: usize, b: usize) -> bool {
        if a >= self.nodes.len() || b >= self.nodes.len() {
            return false;
        }
        let removed = self.nodes[a].neighbors.remove(&b);
        self.nodes[b].neighbors.remove(&a);
        removed
    }

    /// All edges `(a, b)` with `a < b`, in ascending order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.nodes.iter().flat_map(|node| {
            node.neighbors
                .range(node.id + 1..)
                .map(move |&neighbor| (node.id, neighbor))
        })
    }

    pub fn num_edges(&self) -> usize {
        self.edges().count()
    }

    pub fn neighbors(&self, id: usize) -> Option<&BTreeSet<usize>> {
        self.node(id).map(GraphNode::neighbors)
    }

    pub fn set_fitness(&mut self, id: usize, fitness: i64) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.fitness = fitness;
        }
    }

    /// Greedily splits the nodes into an independent ON set and the OFF rest.
    ///
    /// Nodes are visited by decreasing fitness, ties broken by increasing id. An undecided
    /// node is switched ON and its undecided neighbors OFF. No two ON nodes are adjacent
    /// and every OFF node has an ON neighbor.
    pub fn compute_maximal_on_off_partition(&self) -> OnOffPartition {
        let mut order: Vec<&GraphNode> = self.nodes.iter().collect();
        order.sort_by(|a, b| b.fitness.cmp(&a.fitness).then(a.id.cmp(&b.id)));

        let mut state: Vec<Option<bool>> = vec![None; self.nodes.len()];
        let mut partition = OnOffPartition::default();
        for node in order {
            if state[node.id].is_some() {
                continue;
            }
            state[node.id] = Some(true);
            partition.on.push(node.id);
            for &neighbor in &node.neighbors {
                if state[neighbor].is_none() {
                    state[neighbor] = Some(false);
                    partition.off.push(neighbor);
                }
            }
        }
        partition
    }
}
