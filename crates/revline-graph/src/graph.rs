//! Signal-routing graph.
//!
//! A general directed graph of [`SignalNode`]s. Ordinary connections must keep
//! the graph acyclic; a connection explicitly marked as feedback may close a
//! loop, but only into a delay node, which is what makes the loop causal.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use crate::node::{NodeId, NodeKind, ParamRef, SignalNode};

/// Where a connection delivers its signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// An input port of another node
    Node { node: NodeId, input: usize },
    /// Audio-rate modulation added onto a parameter's value
    Param(ParamRef),
    /// The context's output sink
    Output,
}

/// Connection from one node output to a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: NodeId,
    pub output: usize,
    pub to: Destination,
    /// Closes a loop; read one render block late
    pub feedback: bool,
}

impl Connection {
    /// The node this connection feeds, if any
    pub fn target_node(&self) -> Option<NodeId> {
        match self.to {
            Destination::Node { node, .. } => Some(node),
            Destination::Param(param) => Some(param.node),
            Destination::Output => None,
        }
    }
}

/// Errors raised while wiring a graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Node {0} not found")]
    UnknownNode(NodeId),

    #[error("Node {node} has {available} outputs, output {output} requested")]
    OutputOutOfRange {
        node: NodeId,
        output: usize,
        available: usize,
    },

    #[error("Node {node} has {available} inputs, input {input} requested")]
    InputOutOfRange {
        node: NodeId,
        input: usize,
        available: usize,
    },

    #[error("{0} does not exist")]
    UnknownParam(ParamRef),

    #[error("Connecting {from} -> {to} would create a cycle (mark it as feedback)")]
    Cycle { from: NodeId, to: NodeId },

    #[error("Feedback connection must target a delay node, node {0} is not one")]
    FeedbackWithoutDelay(NodeId),

    #[error("Graph contains an unresolved cycle involving nodes {0:?}")]
    UnresolvedCycle(Vec<NodeId>),
}

/// The signal graph
#[derive(Debug, Clone, Default)]
pub struct SignalGraph {
    nodes: Vec<SignalNode>,
    connections: Vec<Connection>,
}

impl SignalGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, label: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        let label = label.into();
        tracing::debug!("Added node {} ({}: {})", id, kind.type_name(), label);
        self.nodes.push(SignalNode::new(id, label, kind));
        id
    }

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&SignalNode> {
        self.nodes.get(id)
    }

    /// All nodes, in ID order
    pub fn nodes(&self) -> impl Iterator<Item = &SignalNode> {
        self.nodes.iter()
    }

    /// All source nodes (oscillators and noise players)
    pub fn sources(&self) -> impl Iterator<Item = &SignalNode> {
        self.nodes.iter().filter(|node| node.kind().is_source())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Connect output 0 of `from` to input 0 of `to`
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.connect_ports(from, 0, to, 0)
    }

    /// Connect a specific output port to a specific input port
    pub fn connect_ports(
        &mut self,
        from: NodeId,
        output: usize,
        to: NodeId,
        input: usize,
    ) -> Result<(), GraphError> {
        self.check_output(from, output)?;
        self.check_input(to, input)?;
        if self.reaches(to, from) {
            return Err(GraphError::Cycle { from, to });
        }
        self.push(Connection {
            from,
            output,
            to: Destination::Node { node: to, input },
            feedback: false,
        });
        Ok(())
    }

    /// Route output 0 of `from` into a parameter of another node
    pub fn connect_param(&mut self, from: NodeId, param: ParamRef) -> Result<(), GraphError> {
        self.check_output(from, 0)?;
        let target = self
            .nodes
            .get(param.node)
            .ok_or(GraphError::UnknownNode(param.node))?;
        if !target.kind().has_param(param.param) {
            return Err(GraphError::UnknownParam(param));
        }
        if self.reaches(param.node, from) {
            return Err(GraphError::Cycle {
                from,
                to: param.node,
            });
        }
        self.push(Connection {
            from,
            output: 0,
            to: Destination::Param(param),
            feedback: false,
        });
        Ok(())
    }

    /// Route output 0 of `from` to the output sink
    pub fn connect_output(&mut self, from: NodeId) -> Result<(), GraphError> {
        self.check_output(from, 0)?;
        self.push(Connection {
            from,
            output: 0,
            to: Destination::Output,
            feedback: false,
        });
        Ok(())
    }

    /// Close a loop back into a delay node
    pub fn connect_feedback(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.check_output(from, 0)?;
        self.check_input(to, 0)?;
        if !matches!(self.nodes[to].kind(), NodeKind::Delay { .. }) {
            return Err(GraphError::FeedbackWithoutDelay(to));
        }
        self.push(Connection {
            from,
            output: 0,
            to: Destination::Node { node: to, input: 0 },
            feedback: true,
        });
        Ok(())
    }

    /// Connections arriving at `node` (input ports and parameters)
    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |conn| conn.target_node() == Some(node))
    }

    /// Nodes that feed the output sink
    pub fn outputs(&self) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(|conn| conn.to == Destination::Output)
    }

    /// Order in which nodes must be processed so that every node runs after
    /// the nodes feeding it. Feedback connections are ignored.
    pub fn processing_order(&self) -> Result<Vec<NodeId>, GraphError> {
        self.topological_sort().map_err(GraphError::UnresolvedCycle)
    }

    fn push(&mut self, conn: Connection) {
        if self.connections.contains(&conn) {
            return;
        }
        tracing::debug!(
            "Connected {} -> {:?}{}",
            conn.from,
            conn.to,
            if conn.feedback { " (feedback)" } else { "" }
        );
        self.connections.push(conn);
    }

    fn check_output(&self, node: NodeId, output: usize) -> Result<(), GraphError> {
        let available = self
            .nodes
            .get(node)
            .ok_or(GraphError::UnknownNode(node))?
            .kind()
            .output_count();
        if output >= available {
            return Err(GraphError::OutputOutOfRange {
                node,
                output,
                available,
            });
        }
        Ok(())
    }

    fn check_input(&self, node: NodeId, input: usize) -> Result<(), GraphError> {
        let available = self
            .nodes
            .get(node)
            .ok_or(GraphError::UnknownNode(node))?
            .kind()
            .input_count();
        if input >= available {
            return Err(GraphError::InputOutOfRange {
                node,
                input,
                available,
            });
        }
        Ok(())
    }

    /// Whether `target` is reachable from `start` over non-feedback connections
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            stack.extend(
                self.connections
                    .iter()
                    .filter(|conn| conn.from == node && !conn.feedback)
                    .filter_map(Connection::target_node),
            );
        }
        false
    }

    /// Kahn's algorithm over non-feedback connections.
    ///
    /// A min-heap keeps the order deterministic (lowest ready ID first).
    /// Returns `Err(remaining_nodes)` if a cycle is left.
    fn topological_sort(&self) -> Result<Vec<NodeId>, Vec<NodeId>> {
        let mut in_degree = vec![0_usize; self.nodes.len()];
        let mut adjacency: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for conn in self.connections.iter().filter(|conn| !conn.feedback) {
            if let Some(to) = conn.target_node() {
                in_degree[to] += 1;
                adjacency[conn.from].push(to);
            }
        }

        let mut queue: BinaryHeap<Reverse<NodeId>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(id, _)| Reverse(id))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(node_id)) = queue.pop() {
            result.push(node_id);
            for &to_id in &adjacency[node_id] {
                in_degree[to_id] -= 1;
                if in_degree[to_id] == 0 {
                    queue.push(Reverse(to_id));
                }
            }
        }

        if result.len() == self.nodes.len() {
            Ok(result)
        } else {
            let processed: HashSet<NodeId> = result.into_iter().collect();
            Err((0..self.nodes.len())
                .filter(|id| !processed.contains(id))
                .collect())
        }
    }
}
