//! Dependency graph builder.
//!
//! From the per-unit parsed-imports records this builds the bipartite
//! Declaration/Definition graph: every unit contributes a `Declaration`
//! node, and a `Definition` node unless it is external. Ordinary imports add
//! edges from both the declaration and definition of the importer to the
//! declaration of the imported unit; `bodydep` imports add an edge from the
//! definition only, which is the mechanism used to cut mutual-reference
//! cycles.

use crate::error::{CpplError, Result};
use crate::pool::{StringPool, Sym};
use crate::record::ParsedImports;
use std::collections::{HashMap, HashSet};

/// Which half of a unit's bipartite pair a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Declaration,
    Definition,
}

/// `Kind⊕UnitID` encoded in a single 64-bit word: top bit is the kind tag,
/// the remaining 63 bits are the unit's interned symbol id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

const KIND_BIT: u64 = 1 << 63;

impl NodeId {
    fn new(kind: NodeKind, sym: Sym) -> Self {
        let tag = match kind {
            NodeKind::Declaration => 0,
            NodeKind::Definition => KIND_BIT,
        };
        NodeId(tag | sym.index() as u64)
    }

    pub fn kind(self) -> NodeKind {
        if self.0 & KIND_BIT != 0 {
            NodeKind::Definition
        } else {
            NodeKind::Declaration
        }
    }

    pub fn sym(self) -> Sym {
        Sym::from_index((self.0 & !KIND_BIT) as u32)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub unit_id: String,
    pub incoming: HashSet<NodeId>,
    pub outgoing: HashSet<NodeId>,
}

impl Node {
    fn new(id: NodeId, kind: NodeKind, unit_id: String) -> Self {
        Self { id, kind, unit_id, incoming: HashSet::new(), outgoing: HashSet::new() }
    }

    pub fn is_terminal(&self) -> bool {
        self.incoming.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.outgoing.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    pub nodes: HashMap<NodeId, Node>,
    pub roots: HashSet<NodeId>,
    pub terminals: HashSet<NodeId>,
    pub public_nodes: HashSet<NodeId>,
    pub external_nodes: HashSet<NodeId>,
}

impl Graph {
    /// Builds the graph from a unit-id-keyed map of parsed-imports records.
    /// Fails with `GraphCycle` if the resulting graph is non-empty but has
    /// no roots (no node with zero outgoing edges), and with `UnknownImport`
    /// if an import names a unit absent from `records`.
    pub fn build(records: &HashMap<String, ParsedImports>, pool: &StringPool) -> Result<Self> {
        let mut graph = Graph::default();

        // Pass 1: create nodes.
        for record in records.values() {
            let sym = pool.intern(&record.unit_id);
            let decl_id = NodeId::new(NodeKind::Declaration, sym);
            graph.nodes.insert(decl_id, Node::new(decl_id, NodeKind::Declaration, record.unit_id.clone()));

            if record.is_public {
                graph.public_nodes.insert(decl_id);
            }
            if record.is_external {
                graph.external_nodes.insert(decl_id);
            } else {
                let def_id = NodeId::new(NodeKind::Definition, sym);
                graph
                    .nodes
                    .insert(def_id, Node::new(def_id, NodeKind::Definition, record.unit_id.clone()));
            }
        }

        // Pass 2: add edges.
        for record in records.values() {
            let u_sym = pool.intern(&record.unit_id);
            let u_decl = NodeId::new(NodeKind::Declaration, u_sym);
            let u_def = NodeId::new(NodeKind::Definition, u_sym);

            for target in &record.decl_imports {
                let Some(target_record) = records.get(target) else {
                    return Err(CpplError::UnknownImport(target.clone(), record.unit_id.clone()));
                };
                let v_sym = pool.intern(&target_record.unit_id);
                let v_decl = NodeId::new(NodeKind::Declaration, v_sym);
                graph.add_edge(u_decl, v_decl);
                if !record.is_external {
                    graph.add_edge(u_def, v_decl);
                }
            }

            for target in &record.body_imports {
                let Some(target_record) = records.get(target) else {
                    return Err(CpplError::UnknownImport(target.clone(), record.unit_id.clone()));
                };
                if record.is_external {
                    // External units are declaration-only; a bodydep import with no definition
                    // node to hang it on is simply not representable and is a no-op.
                    continue;
                }
                let v_sym = pool.intern(&target_record.unit_id);
                let v_decl = NodeId::new(NodeKind::Declaration, v_sym);
                graph.add_edge(u_def, v_decl);
            }
        }

        // Pass 3: derive roots/terminals from the final edge sets.
        for node in graph.nodes.values() {
            if node.is_root() {
                graph.roots.insert(node.id);
            }
            if node.is_terminal() {
                graph.terminals.insert(node.id);
            }
        }

        // Pass 4: public closure — propagate along declaration->declaration edges from every
        // already-public node. Declaration nodes only ever point at other declaration nodes
        // (construction rules above never add Decl -> Def edges), so following `outgoing` from
        // a public declaration reaches exactly the set of declarations a public API transitively
        // depends on; seeding the worklist with all public nodes (rather than literally starting
        // from `terminals`) reaches the identical closure and avoids a redundant full-graph scan.
        let mut worklist: Vec<NodeId> = graph.public_nodes.iter().copied().collect();
        while let Some(id) = worklist.pop() {
            let Some(node) = graph.nodes.get(&id) else { continue };
            for &next in &node.outgoing.clone() {
                if graph.public_nodes.insert(next) {
                    worklist.push(next);
                }
            }
        }

        if !graph.nodes.is_empty() && graph.roots.is_empty() {
            return Err(CpplError::GraphCycle);
        }

        Ok(graph)
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(n) = self.nodes.get_mut(&from) {
            n.outgoing.insert(to);
        }
        if let Some(n) = self.nodes.get_mut(&to) {
            n.incoming.insert(from);
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn decl_id(&self, pool: &StringPool, unit_id: &str) -> NodeId {
        NodeId::new(NodeKind::Declaration, pool.intern(unit_id))
    }

    pub fn def_id(&self, pool: &StringPool, unit_id: &str) -> NodeId {
        NodeId::new(NodeKind::Definition, pool.intern(unit_id))
    }
}
