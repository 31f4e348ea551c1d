//! CPPN-NEAT genome representation
//!
//! Compositional Pattern Producing Networks evolved with NeuroEvolution of
//! Augmenting Topologies. The genome is a directed acyclic graph of nodes
//! with per-node activation functions; structural innovations are numbered
//! by a population-wide [`InnovationTracker`] so crossover can align genes.

use std::collections::BTreeMap;

use ahash::HashMap;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeRef, Topo};
use petgraph::Direction;
use rand::prelude::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::traits::{Genome, PhenotypeNetwork};

/// Range of freshly drawn connection weights, `[-INITIAL_WEIGHT, INITIAL_WEIGHT)`
const INITIAL_WEIGHT: f32 = 2.0;

/// Connection weights never leave `[-MAX_WEIGHT, MAX_WEIGHT]`
const MAX_WEIGHT: f32 = 4.0;

/// Activation functions for CPPN nodes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActivationFunction {
    Linear,
    /// Unsigned sigmoid, range (0, 1)
    Sigmoid,
    Tanh,
    Gaussian,
    Sine,
    Relu,
    Step,
}

impl ActivationFunction {
    /// Candidates for newly added hidden nodes
    pub const HIDDEN: [ActivationFunction; 5] = [
        ActivationFunction::Sigmoid,
        ActivationFunction::Tanh,
        ActivationFunction::Gaussian,
        ActivationFunction::Sine,
        ActivationFunction::Relu,
    ];

    /// Apply activation function to input
    pub fn activate(&self, x: f32) -> f32 {
        match self {
            Self::Linear => x,
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::Tanh => x.tanh(),
            Self::Gaussian => (-x * x).exp(),
            Self::Sine => x.sin(),
            Self::Relu => x.max(0.0),
            Self::Step => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Node in CPPN network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CppnNode {
    pub id: u64,
    pub activation: ActivationFunction,
    pub node_type: NodeType,
}

/// Type of CPPN node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeType {
    Input,
    Hidden,
    Output,
}

/// Connection between CPPN nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CppnConnection {
    pub weight: f32,
    pub enabled: bool,
    pub innovation_number: u64,
}

/// Serializable edge representation (stores source/target node IDs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedEdge {
    pub source_id: u64,
    pub target_id: u64,
    pub connection: CppnConnection,
}

/// Innovation bookkeeping shared by every genome of a population.
///
/// The same structural change gets the same number in every genome: a
/// connection between two node ids, or the node created by splitting a
/// given connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InnovationTracker {
    connections: HashMap<(u64, u64), u64>,
    splits: HashMap<u64, u64>,
    next_node_id: u64,
    next_innovation: u64,
}

impl InnovationTracker {
    /// Tracker for genomes with `inputs` input and `outputs` output nodes,
    /// which take node ids `0..inputs + outputs`
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            next_node_id: (inputs + outputs) as u64,
            ..Self::default()
        }
    }

    /// Innovation number of the connection `source -> target`
    pub fn connection(&mut self, source: u64, target: u64) -> u64 {
        if let Some(&existing) = self.connections.get(&(source, target)) {
            return existing;
        }
        let innovation = self.next_innovation;
        self.next_innovation += 1;
        self.connections.insert((source, target), innovation);
        innovation
    }

    /// Node id created by splitting connection `innovation`
    pub fn split(&mut self, innovation: u64) -> u64 {
        if let Some(&existing) = self.splits.get(&innovation) {
            return existing;
        }
        let node_id = self.next_node_id;
        self.next_node_id += 1;
        self.splits.insert(innovation, node_id);
        node_id
    }

    pub fn innovation_count(&self) -> u64 {
        self.next_innovation
    }
}

/// Configuration for CPPN mutation rates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub weight_mutation_rate: f32,   // Probability per weight
    pub weight_mutation_power: f32,  // Max perturbation magnitude
    pub add_connection_rate: f32,    // Probability of adding new connection
    pub add_node_rate: f32,          // Probability of adding new node
    pub toggle_connection_rate: f32, // Probability of toggling connection
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            weight_mutation_rate: 0.3,
            weight_mutation_power: 0.5,
            add_connection_rate: 0.15,
            add_node_rate: 0.10,
            toggle_connection_rate: 0.01,
        }
    }
}

/// CPPN genome. Deserializing rebuilds `graph` from the serialized fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredGenome")]
pub struct CppnGenome {
    #[serde(skip)]
    pub graph: DiGraph<CppnNode, CppnConnection>,

    // Serializable graph representation (synced after every change, used to
    // rebuild the graph after load)
    pub serialized_nodes: Vec<CppnNode>,
    pub serialized_edges: Vec<SerializedEdge>,

    pub input_node_ids: Vec<u64>,
    pub output_node_ids: Vec<u64>,

    pub fitness: f64,
}

/// The serialized half of [`CppnGenome`], field for field
#[derive(Deserialize)]
struct StoredGenome {
    serialized_nodes: Vec<CppnNode>,
    serialized_edges: Vec<SerializedEdge>,
    input_node_ids: Vec<u64>,
    output_node_ids: Vec<u64>,
    fitness: f64,
}

impl From<StoredGenome> for CppnGenome {
    fn from(stored: StoredGenome) -> Self {
        let mut cppn = Self {
            graph: DiGraph::new(),
            serialized_nodes: stored.serialized_nodes,
            serialized_edges: stored.serialized_edges,
            input_node_ids: stored.input_node_ids,
            output_node_ids: stored.output_node_ids,
            fitness: stored.fitness,
        };
        cppn.rebuild_graph();
        cppn
    }
}

impl CppnGenome {
    /// Get node index from node ID
    pub fn node_index_from_id(&self, node_id: u64) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&idx| self.graph[idx].id == node_id)
    }

    /// Fully connected inputs to outputs with random weights and no hidden
    /// nodes. Inputs are linear, outputs unsigned sigmoid.
    pub fn minimal<R: Rng + ?Sized>(
        inputs: usize,
        outputs: usize,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> Self {
        let mut graph = DiGraph::new();
        let mut input_node_ids = Vec::with_capacity(inputs);
        let mut output_node_ids = Vec::with_capacity(outputs);

        for id in 0..inputs as u64 {
            graph.add_node(CppnNode {
                id,
                activation: ActivationFunction::Linear,
                node_type: NodeType::Input,
            });
            input_node_ids.push(id);
        }
        for id in inputs as u64..(inputs + outputs) as u64 {
            graph.add_node(CppnNode {
                id,
                activation: ActivationFunction::Sigmoid,
                node_type: NodeType::Output,
            });
            output_node_ids.push(id);
        }

        // Node indices follow insertion order, so index == id here
        for i in 0..inputs {
            for o in inputs..inputs + outputs {
                let innovation = tracker.connection(i as u64, o as u64);
                graph.add_edge(
                    NodeIndex::new(i),
                    NodeIndex::new(o),
                    CppnConnection {
                        weight: rng.random_range(-INITIAL_WEIGHT..INITIAL_WEIGHT),
                        enabled: true,
                        innovation_number: innovation,
                    },
                );
            }
        }

        let mut cppn = Self {
            graph,
            serialized_nodes: Vec::new(),
            serialized_edges: Vec::new(),
            input_node_ids,
            output_node_ids,
            fitness: 0.0,
        };
        cppn.sync_to_serializable();
        cppn
    }

    pub fn hidden_count(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|n| n.node_type == NodeType::Hidden)
            .count()
    }

    /// Sync graph structure to serializable fields
    pub fn sync_to_serializable(&mut self) {
        self.serialized_nodes = self.graph.node_weights().cloned().collect();

        self.serialized_edges = self
            .graph
            .edge_indices()
            .filter_map(|edge_idx| {
                let (source_idx, target_idx) = self.graph.edge_endpoints(edge_idx)?;
                Some(SerializedEdge {
                    source_id: self.graph[source_idx].id,
                    target_id: self.graph[target_idx].id,
                    connection: self.graph[edge_idx].clone(),
                })
            })
            .collect();
    }

    /// Rebuild graph from serialized data
    pub fn rebuild_graph(&mut self) {
        self.graph = DiGraph::new();

        let mut id_to_idx: HashMap<u64, NodeIndex> = HashMap::default();
        for node in &self.serialized_nodes {
            let idx = self.graph.add_node(node.clone());
            id_to_idx.insert(node.id, idx);
        }

        for edge in &self.serialized_edges {
            if let (Some(&source_idx), Some(&target_idx)) = (
                id_to_idx.get(&edge.source_id),
                id_to_idx.get(&edge.target_id),
            ) {
                self.graph
                    .add_edge(source_idx, target_idx, edge.connection.clone());
            }
        }
    }

    // ===== NEAT Mutation Operators =====

    /// Mutate connection weights with given probability and perturbation power.
    /// Returns number of weights mutated
    pub fn mutate_weights<R: Rng + ?Sized>(
        &mut self,
        mutation_rate: f32,
        mutation_power: f32,
        rng: &mut R,
    ) -> usize {
        let mut mutated_count = 0;

        for edge_idx in self.graph.edge_indices() {
            if rng.random::<f32>() >= mutation_rate {
                continue;
            }
            let connection = &mut self.graph[edge_idx];

            // 90% chance to perturb, 10% chance to replace
            if rng.random::<f32>() < 0.9 {
                if mutation_power > 0.0 {
                    connection.weight += rng.random_range(-mutation_power..mutation_power);
                }
            } else {
                connection.weight = rng.random_range(-INITIAL_WEIGHT..INITIAL_WEIGHT);
            }
            connection.weight = connection.weight.clamp(-MAX_WEIGHT, MAX_WEIGHT);
            mutated_count += 1;
        }

        mutated_count
    }

    /// Add a connection between two unconnected nodes, never closing a cycle.
    /// Returns true if a connection was added
    pub fn add_connection<R: Rng + ?Sized>(
        &mut self,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> bool {
        let target_nodes: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].node_type != NodeType::Input)
            .collect();
        let source_nodes: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].node_type != NodeType::Output)
            .collect();

        // Try up to 20 times to find a valid pair
        for _ in 0..20 {
            let (Some(&source), Some(&target)) =
                (source_nodes.choose(rng), target_nodes.choose(rng))
            else {
                return false;
            };

            if source == target || self.graph.find_edge(source, target).is_some() {
                continue;
            }
            if has_path_connecting(&self.graph, target, source, None) {
                continue;
            }

            let innovation = tracker.connection(self.graph[source].id, self.graph[target].id);
            self.graph.add_edge(
                source,
                target,
                CppnConnection {
                    weight: rng.random_range(-1.0..1.0),
                    enabled: true,
                    innovation_number: innovation,
                },
            );
            return true;
        }

        false
    }

    /// Split an enabled connection with a new hidden node. The old connection
    /// is disabled; the incoming half gets weight 1 and the outgoing half the
    /// old weight. Returns true if a node was added
    pub fn add_node<R: Rng + ?Sized>(
        &mut self,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) -> bool {
        let enabled_edges: Vec<_> = self
            .graph
            .edge_indices()
            .filter(|&idx| self.graph[idx].enabled)
            .collect();

        let Some(&edge_idx) = enabled_edges.choose(rng) else {
            return false;
        };
        let Some((source_idx, target_idx)) = self.graph.edge_endpoints(edge_idx) else {
            return false;
        };

        let old = self.graph[edge_idx].clone();
        let new_node_id = tracker.split(old.innovation_number);
        // This genome already split the connection once
        if self.node_index_from_id(new_node_id).is_some() {
            return false;
        }

        let source_id = self.graph[source_idx].id;
        let target_id = self.graph[target_idx].id;
        self.graph[edge_idx].enabled = false;

        let activation = *ActivationFunction::HIDDEN
            .choose(rng)
            .unwrap_or(&ActivationFunction::Sigmoid);
        let new_node_idx = self.graph.add_node(CppnNode {
            id: new_node_id,
            activation,
            node_type: NodeType::Hidden,
        });

        self.graph.add_edge(
            source_idx,
            new_node_idx,
            CppnConnection {
                weight: 1.0,
                enabled: true,
                innovation_number: tracker.connection(source_id, new_node_id),
            },
        );
        self.graph.add_edge(
            new_node_idx,
            target_idx,
            CppnConnection {
                weight: old.weight,
                enabled: true,
                innovation_number: tracker.connection(new_node_id, target_id),
            },
        );

        true
    }

    /// Randomly enable or disable a connection.
    /// Returns true if a connection was toggled
    pub fn toggle_connection<R: Rng + ?Sized>(&mut self, disable_rate: f32, rng: &mut R) -> bool {
        let edges: Vec<_> = self.graph.edge_indices().collect();
        let Some(&edge_idx) = edges.choose(rng) else {
            return false;
        };

        let roll = rng.random::<f32>();
        let connection = &mut self.graph[edge_idx];
        if connection.enabled {
            if roll < disable_rate {
                connection.enabled = false;
                return true;
            }
        } else if roll < 0.25 {
            connection.enabled = true;
            return true;
        }

        false
    }

    /// Apply all mutations with given probabilities
    pub fn mutate<R: Rng + ?Sized>(
        &mut self,
        config: &MutationConfig,
        tracker: &mut InnovationTracker,
        rng: &mut R,
    ) {
        self.mutate_weights(config.weight_mutation_rate, config.weight_mutation_power, rng);

        if rng.random::<f32>() < config.add_connection_rate {
            self.add_connection(tracker, rng);
        }
        if rng.random::<f32>() < config.add_node_rate {
            self.add_node(tracker, rng);
        }
        if rng.random::<f32>() < config.toggle_connection_rate {
            self.toggle_connection(0.5, rng);
        }

        self.sync_to_serializable();
    }

    fn genes(&self) -> BTreeMap<u64, (NodeIndex, NodeIndex, &CppnConnection)> {
        self.graph
            .edge_references()
            .map(|e| (e.weight().innovation_number, (e.source(), e.target(), e.weight())))
            .collect()
    }

    /// NEAT crossover. Nodes and disjoint/excess genes come from the fitter
    /// parent (`self` on ties); matching genes are inherited from either
    /// parent at random. The child starts with fitness 0.
    pub fn crossover<R: Rng + ?Sized>(&self, other: &CppnGenome, rng: &mut R) -> CppnGenome {
        let (more_fit, less_fit) = if self.fitness >= other.fitness {
            (self, other)
        } else {
            (other, self)
        };

        let mut offspring = CppnGenome {
            graph: DiGraph::new(),
            serialized_nodes: Vec::new(),
            serialized_edges: Vec::new(),
            input_node_ids: more_fit.input_node_ids.clone(),
            output_node_ids: more_fit.output_node_ids.clone(),
            fitness: 0.0,
        };

        // Same insertion order keeps node indices identical to the parent's
        for node in more_fit.graph.node_weights() {
            offspring.graph.add_node(node.clone());
        }

        let partner = less_fit.genes();
        for (innovation, (source, target, gene)) in more_fit.genes() {
            let connection = match partner.get(&innovation) {
                Some((_, _, other_gene)) if rng.random::<bool>() => (*other_gene).clone(),
                _ => gene.clone(),
            };
            if offspring.graph.find_edge(source, target).is_none() {
                offspring.graph.add_edge(source, target, connection);
            }
        }

        offspring.sync_to_serializable();
        offspring
    }

    /// Compile the graph into a flat, topologically ordered network
    pub fn compile(&self) -> CppnNetwork {
        let mut slot_of: HashMap<NodeIndex, usize> = HashMap::default();
        let mut nodes = Vec::with_capacity(self.graph.node_count());

        let mut topo = Topo::new(&self.graph);
        while let Some(idx) = topo.next(&self.graph) {
            let node = &self.graph[idx];
            let input = match node.node_type {
                NodeType::Input => self.input_node_ids.iter().position(|&id| id == node.id),
                _ => None,
            };
            let incoming = self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .filter(|e| e.weight().enabled)
                .filter_map(|e| slot_of.get(&e.source()).map(|&s| (s, e.weight().weight)))
                .collect();

            slot_of.insert(idx, nodes.len());
            nodes.push(CompiledNode {
                activation: node.activation,
                input,
                incoming,
            });
        }

        let outputs = self
            .output_node_ids
            .iter()
            .map(|&id| {
                self.node_index_from_id(id)
                    .and_then(|idx| slot_of.get(&idx).copied())
            })
            .collect();

        CppnNetwork {
            nodes,
            input_count: self.input_node_ids.len(),
            outputs,
        }
    }
}

impl Genome for CppnGenome {
    type Network = CppnNetwork;

    fn build_phenotype(&self) -> CppnNetwork {
        self.compile()
    }

    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }
}

#[derive(Debug, Clone)]
struct CompiledNode {
    activation: ActivationFunction,
    /// Position in the input vector, for input nodes
    input: Option<usize>,
    incoming: Vec<(usize, f32)>,
}

/// Feed-forward phenotype of a [`CppnGenome`]
#[derive(Debug, Clone)]
pub struct CppnNetwork {
    nodes: Vec<CompiledNode>,
    input_count: usize,
    outputs: Vec<Option<usize>>,
}

impl PhenotypeNetwork for CppnNetwork {
    fn input_count(&self) -> usize {
        self.input_count
    }

    fn output_count(&self) -> usize {
        self.outputs.len()
    }

    fn query(&self, inputs: &[f32]) -> Vec<f32> {
        let mut values = vec![0.0f32; self.nodes.len()];
        for (slot, node) in self.nodes.iter().enumerate() {
            values[slot] = match node.input {
                Some(k) => inputs.get(k).copied().unwrap_or(0.0),
                None => {
                    let sum: f32 = node.incoming.iter().map(|&(s, w)| values[s] * w).sum();
                    node.activation.activate(sum)
                }
            };
        }

        self.outputs
            .iter()
            .map(|slot| slot.map_or(0.0, |s| values[s]))
            .collect()
    }
}
