use crate::connectivity::EnclosedAtoms;
use serde::Serialize;
use std::fmt;

/// Whether an irreducible domain belongs to an atom or to the valence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Atom,
    #[serde(rename = "val")]
    Valence,
}

/// The bonding character of an irreducible domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subtype {
    Core,
    Shell,
    Covalent,
    Metallic,
    LonePair,
    #[serde(rename = "bare electron")]
    BareElectron,
}

/// A domain that vanished without splitting.
#[derive(Clone, Debug, Serialize)]
pub struct Irreducible {
    /// Highest ELF value in the domain.
    pub max_elf: f64,
    /// Fractional position of that value.
    pub max_frac: [f64; 3],
    /// max_elf minus the cutoff the parent split at.
    pub depth: f64,
    /// Charge of the zero-flux basins making up the domain.
    pub charge: f64,
    /// Volume of the zero-flux basins making up the domain.
    pub volume: f64,
    pub nearest_atom: usize,
    pub atom_distance: f64,
    pub feature: FeatureType,
    pub subtype: Option<Subtype>,
    /// The atom an atomic domain belongs to.
    pub atom: Option<usize>,
    pub electride_score: Option<f64>,
    pub is_electride: bool,
    /// Atoms enclosed by the domain at the last cutoff it was present.
    #[serde(skip)]
    pub enclosed: EnclosedAtoms,
}

/// A domain that split into several children.
#[derive(Clone, Debug)]
pub struct Reducible {
    /// The cutoff at which the children separated.
    pub split: f64,
    pub children: Vec<usize>,
    /// Atoms enclosed by the domain just before it split.
    pub enclosed: EnclosedAtoms,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Still being tracked by the scan.
    Pending,
    Reducible(Reducible),
    Irreducible(Irreducible),
}

/// A node of the bifurcation graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: usize,
    pub parent: Option<usize>,
    /// depth of the node in the tree
    pub subset: usize,
    /// zero-flux basins present in the domain when it was created
    pub basins: Vec<usize>,
    /// false once removed as a gridding artifact
    pub alive: bool,
    pub kind: NodeKind,
}

impl Node {
    pub fn irreducible(&self) -> Option<&Irreducible> {
        match &self.kind {
            NodeKind::Irreducible(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn irreducible_mut(&mut self) -> Option<&mut Irreducible> {
        match &mut self.kind {
            NodeKind::Irreducible(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn reducible(&self) -> Option<&Reducible> {
        match &self.kind {
            NodeKind::Reducible(node) => Some(node),
            _ => None,
        }
    }
}

/// A rooted out-tree recording how ELF domains split as the cutoff rises.
///
/// Nodes live in an arena and refer to each other by index. The root, id 0,
/// is the whole cell at a cutoff of zero.
#[derive(Clone, Debug)]
pub struct BifurcationGraph {
    nodes: Vec<Node>,
}

impl BifurcationGraph {
    /// Creates a graph holding only the root domain.
    pub fn new(basins: Vec<usize>) -> Self {
        Self { nodes: vec![Node { id: 0,
                                  parent: None,
                                  subset: 0,
                                  basins,
                                  alive: true,
                                  kind: NodeKind::Pending }] }
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: usize) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Adds a pending child to a node.
    pub fn add_child(&mut self, parent: usize, basins: Vec<usize>) -> usize {
        let id = self.nodes.len();
        let subset = self.nodes[parent].subset + 1;
        self.nodes.push(Node { id,
                               parent: Some(parent),
                               subset,
                               basins,
                               alive: true,
                               kind: NodeKind::Pending });
        if let NodeKind::Reducible(node) = &mut self.nodes[parent].kind {
            node.children.push(id);
        }
        id
    }

    /// Marks a node as split at `split`, ready for children to be added.
    pub fn set_reducible(&mut self,
                         id: usize,
                         split: f64,
                         enclosed: EnclosedAtoms) {
        self.nodes[id].kind = NodeKind::Reducible(Reducible { split,
                                                              children: vec![],
                                                              enclosed });
    }

    pub fn set_irreducible(&mut self, id: usize, leaf: Irreducible) {
        self.nodes[id].kind = NodeKind::Irreducible(leaf);
    }

    /// Removes every child of a node and returns it to pending.
    pub fn collapse(&mut self, id: usize) {
        let children = match &self.nodes[id].kind {
            NodeKind::Reducible(node) => node.children.clone(),
            _ => vec![],
        };
        for child in children {
            self.nodes[child].alive = false;
        }
        self.nodes[id].kind = NodeKind::Pending;
    }

    /// The live children of a node.
    pub fn children(&self, id: usize) -> Vec<usize> {
        match &self.nodes[id].kind {
            NodeKind::Reducible(node) => node.children
                                             .iter()
                                             .copied()
                                             .filter(|c| self.nodes[*c].alive)
                                             .collect(),
            _ => vec![],
        }
    }

    /// Live nodes in breadth first order from the root.
    pub fn breadth_first(&self) -> Vec<usize> {
        let mut out = vec![self.root()];
        let mut i = 0;
        while i < out.len() {
            out.extend(self.children(out[i]));
            i += 1;
        }
        out
    }

    /// Live reducible nodes, parents before children.
    pub fn reducible_nodes(&self) -> Vec<usize> {
        self.breadth_first()
            .into_iter()
            .filter(|id| self.nodes[*id].reducible().is_some())
            .collect()
    }

    /// Live irreducible nodes in breadth first order.
    pub fn leaves(&self) -> Vec<usize> {
        self.breadth_first()
            .into_iter()
            .filter(|id| self.nodes[*id].irreducible().is_some())
            .collect()
    }

    /// Every live irreducible node below `id`.
    pub fn descendant_leaves(&self, id: usize) -> Vec<usize> {
        let mut stack = self.children(id);
        let mut out = vec![];
        while let Some(node) = stack.pop() {
            match &self.nodes[node].kind {
                NodeKind::Irreducible(_) => out.push(node),
                NodeKind::Reducible(_) => stack.extend(self.children(node)),
                NodeKind::Pending => (),
            }
        }
        out.sort_unstable();
        out
    }

    /// The cutoff the parent of a node split at, 0 for the root.
    pub fn parent_split(&self, id: usize) -> f64 {
        self.nodes[id].parent
                      .and_then(|p| self.nodes[p].reducible())
                      .map(|r| r.split)
                      .unwrap_or(0.)
    }

    /// Number of nodes ever created, including removed ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Display for BifurcationGraph {
    /// An indented outline of the live tree.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            let indent = "  ".repeat(node.subset);
            match &node.kind {
                NodeKind::Pending => writeln!(f, "{}{}: pending", indent, id)?,
                NodeKind::Reducible(r) => {
                    writeln!(f,
                             "{}{}: split {:.2} enclosing {}",
                             indent,
                             id,
                             r.split,
                             match &r.enclosed {
                                 EnclosedAtoms::Finite(atoms) => {
                                     format!("{:?}", atoms)
                                 }
                                 EnclosedAtoms::Infinite => {
                                     String::from("infinite")
                                 }
                             })?;
                }
                NodeKind::Irreducible(l) => {
                    writeln!(f,
                             "{}{}: {:?} {:?} max {:.3} depth {:.3} charge {:.3}",
                             indent,
                             id,
                             l.feature,
                             l.subtype,
                             l.max_elf,
                             l.depth,
                             l.charge)?;
                }
            }
            let mut children = self.children(id);
            children.reverse();
            stack.extend(children);
        }
        Ok(())
    }
}
