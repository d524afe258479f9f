use crate::atoms::{SiteKind, Structure, COORDINATION_TOLERANCE};
use crate::connectivity::{atoms_surrounded,
                          label_components,
                          Connectivity,
                          EnclosedAtoms};
use crate::elements;
use crate::errors::{BadElfError, Result};
use crate::graph::{BifurcationGraph,
                   FeatureType,
                   Irreducible,
                   Subtype};
use crate::grid::ScalarGrid;
use crate::methods::{assign_maxima, zero_flux_basins, BasinMap};
use crate::progress::Bar;
use crate::utils;
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use serde::Serialize;

/// Radius of an idealised hydride anion in angstroms.
pub const HYDRIDE_RADIUS: f64 = 2.08;

/// Thresholds used when labelling the ELF features.
#[derive(Clone, Debug, Serialize)]
pub struct FinderSettings {
    /// Step between ELF cutoffs in the bifurcation scan.
    pub resolution: f64,
    /// Atomic features shallower than this are shells.
    pub shell_depth: f64,
    /// Valence features shallower than this are metallic.
    pub metal_depth_cutoff: f64,
    /// Smallest atom-feature-atom angle, in degrees, for a covalent bond.
    pub min_covalent_angle: f64,
    /// Smallest ratio of the shorter feature-atom distance to the bond length
    /// for a covalent bond.
    pub min_covalent_bond_ratio: f64,
    pub electride_elf_min: f64,
    pub electride_depth_min: f64,
    pub electride_charge_min: f64,
    pub electride_volume_min: f64,
    /// Smallest distance of an electride beyond the covalent radius of its
    /// nearest atom.
    pub electride_radius_min: f64,
    /// Continue when some atoms have no core or shell feature.
    pub ignore_low_pseudopotentials: bool,
    /// The grids hold a single spin channel.
    pub spin_polarized: bool,
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self { resolution: 0.02,
               shell_depth: 0.05,
               metal_depth_cutoff: 0.1,
               min_covalent_angle: 135.,
               min_covalent_bond_ratio: 0.35,
               electride_elf_min: 0.5,
               electride_depth_min: 0.2,
               electride_charge_min: 0.5,
               electride_volume_min: 10.,
               electride_radius_min: 0.3,
               ignore_low_pseudopotentials: false,
               spin_polarized: false,
               verbose: false }
    }
}

/// The labelled ELF topology of a structure.
#[derive(Clone, Debug)]
pub struct LabelingResult {
    pub graph: BifurcationGraph,
    /// Zero-flux basins of the ELF.
    pub basins: BasinMap,
    /// Atoms, then electrides, then shared features.
    pub structure: Structure,
    /// ELF basins claimed by each dummy site, empty for atoms.
    pub site_basins: Vec<Vec<usize>>,
}

impl LabelingResult {
    /// The site of the labelled structure owning each ELF basin. Basins not
    /// claimed by a dummy site belong to their nearest atom.
    pub fn basin_owners(&self) -> Vec<usize> {
        let mut owners = self.basins.nearest_atom.clone();
        for (site, basins) in self.site_basins.iter().enumerate() {
            for b in basins.iter() {
                owners[*b] = site;
            }
        }
        owners
    }

    pub fn nelectrides(&self) -> usize {
        self.structure.num_electrides()
    }
}

/// Builds and labels the bifurcation graph of an ELF grid.
pub struct ElectrideFinder<'a> {
    elf: &'a ScalarGrid,
    charge: &'a ScalarGrid,
    /// the atoms of the ELF structure
    structure: Structure,
    pub settings: FinderSettings,
}

/// A domain followed through the scan.
struct Tracked {
    id: usize,
    voxels: Vec<usize>,
}

impl<'a> ElectrideFinder<'a> {
    pub fn new(elf: &'a ScalarGrid,
               charge: &'a ScalarGrid,
               settings: FinderSettings)
               -> Result<Self> {
        elf.check_compatible(charge)?;
        if !(settings.resolution > 0. && settings.resolution < 1.) {
            return Err(BadElfError::InvalidSetting(format!("resolution must lie in (0, 1), got {}",
                                                           settings.resolution)));
        }
        let structure = elf.structure.atoms_only();
        if structure.is_empty() {
            return Err(BadElfError::InvalidSetting(String::from("structure contains no atoms")));
        }
        Ok(Self { elf,
                  charge,
                  structure,
                  settings })
    }

    /// The atoms being labelled.
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Runs the full labelling pipeline.
    pub fn run(&self) -> Result<LabelingResult> {
        info!("Finding zero-flux basins of the ELF");
        let bar = Bar::stage(self.elf.grid.size.total,
                             "Zero-flux basins:",
                             self.settings.verbose);
        let mut basins = zero_flux_basins(self.elf, None, bar);
        let (nearest_atom, atom_distance) =
            assign_maxima(&basins.maxima, self.elf, &self.structure);
        basins.nearest_atom = nearest_atom;
        basins.atom_distance = atom_distance;
        info!("Found {} ELF basins", basins.len());
        let (basin_charge, _) = basins.integrate(self.charge);
        let basin_volume = basins.volumes(self.charge);
        let mut graph = self.scan(&basins, &basin_charge, &basin_volume);
        self.mark_atomic_basins(&mut graph)?;
        self.mark_metallic_covalent_easy(&mut graph);
        self.mark_electride_character(&mut graph);
        debug!("Bifurcation graph:\n{}", graph);
        let (structure, site_basins) = self.labeled_structure(&graph);
        info!("Labelled {} atoms, {} electrides and {} shared features",
              structure.num_atoms(),
              structure.num_electrides(),
              structure.len()
              - structure.num_atoms()
              - structure.num_electrides());
        Ok(LabelingResult { graph,
                            basins,
                            structure,
                            site_basins })
    }

    /// Follows the connected ELF domains as the cutoff rises, recording every
    /// split.
    pub fn scan(&self,
                basins: &BasinMap,
                basin_charge: &[f64],
                basin_volume: &[f64])
                -> BifurcationGraph {
        let grid = &self.elf.grid;
        let resolution = self.settings.resolution;
        let steps = (1. / resolution).round() as usize;
        let all = (0..grid.size.total).collect::<Vec<usize>>();
        let mut graph = BifurcationGraph::new((0..basins.len()).collect());
        let mut created = vec![0usize];
        let mut active = vec![Tracked { id: 0, voxels: all }];
        let bar = Bar::stage(steps, "Bifurcation scan:", self.settings.verbose);
        for step in 1..=steps {
            if active.is_empty() {
                break;
            }
            let cutoff = utils::round12(step as f64 * resolution).min(1.);
            let mask = self.elf
                           .data
                           .iter()
                           .map(|v| *v >= cutoff)
                           .collect::<Vec<bool>>();
            let components = label_components(grid, &mask, Connectivity::Full);
            let mut members = vec![Vec::<usize>::new(); components.count];
            for (p, label) in components.labels.iter().enumerate() {
                if *label > 0 {
                    members[label - 1].push(p);
                }
            }
            let labels = active.iter()
                               .map(|t| components.labels_at(&t.voxels))
                               .collect::<Vec<Vec<usize>>>();
            let removed = self.repair(&mut graph, &mut active, &labels, &created, step);
            let mut next = Vec::with_capacity(active.len());
            for (i, tracked) in active.into_iter().enumerate() {
                if removed[i] {
                    continue;
                }
                match labels[i].len() {
                    0 => self.finalize(&mut graph,
                                       tracked,
                                       basins,
                                       basin_charge,
                                       basin_volume),
                    1 => {
                        let voxels = std::mem::take(&mut members[labels[i][0] - 1]);
                        next.push(Tracked { id: tracked.id,
                                            voxels });
                    }
                    n => {
                        let enclosed = self.enclosed_atoms(&tracked.voxels);
                        debug!("Domain {} split into {} at {:.2}, enclosing {:?}",
                               tracked.id,
                               n,
                               cutoff,
                               enclosed);
                        graph.set_reducible(tracked.id, cutoff, enclosed);
                        for label in labels[i].iter() {
                            let voxels = std::mem::take(&mut members[label - 1]);
                            let mut child_basins = voxels.iter()
                                                         .filter_map(|p| {
                                                             let b = basins.labels[*p];
                                                             (b >= 0).then(|| b as usize)
                                                         })
                                                         .collect::<Vec<usize>>();
                            child_basins.sort_unstable();
                            child_basins.dedup();
                            let child = graph.add_child(tracked.id, child_basins);
                            created.push(step);
                            next.push(Tracked { id: child, voxels });
                        }
                    }
                }
            }
            active = next;
            bar.tick();
        }
        for tracked in active {
            self.finalize(&mut graph, tracked, basins, basin_charge, basin_volume);
        }
        graph
    }

    /// Removes domains that split off one step ago and have already vanished.
    ///
    /// When a child vanishes on the step after its parent split, and the
    /// parent had exactly two children, the pair is treated as a gridding
    /// artifact: both children are removed and the parent carries on in place
    /// of the surviving sibling. Returns which tracked domains were removed.
    fn repair(&self,
              graph: &mut BifurcationGraph,
              active: &mut [Tracked],
              labels: &[Vec<usize>],
              created: &[usize],
              step: usize)
              -> Vec<bool> {
        let mut removed = vec![false; active.len()];
        for i in 0..active.len() {
            if removed[i] || !labels[i].is_empty() {
                continue;
            }
            let id = active[i].id;
            if created[id] + 1 != step {
                continue;
            }
            let parent = match graph.node(id).parent {
                Some(parent) => parent,
                None => continue,
            };
            let siblings = graph.children(parent);
            if siblings.len() != 2 {
                continue;
            }
            let sibling = if siblings[0] == id { siblings[1] } else { siblings[0] };
            let j = match active.iter().position(|t| t.id == sibling) {
                Some(j) => j,
                None => continue,
            };
            if removed[j] || labels[j].is_empty() {
                continue;
            }
            warn!("Removing domains {} and {} that split from {} for a single ELF step",
                  id,
                  sibling,
                  parent);
            graph.collapse(parent);
            removed[i] = true;
            active[j].id = parent;
        }
        removed
    }

    /// Records the terminal attributes of a domain that has vanished.
    fn finalize(&self,
                graph: &mut BifurcationGraph,
                tracked: Tracked,
                basins: &BasinMap,
                basin_charge: &[f64],
                basin_volume: &[f64]) {
        let (max_p, max_elf) = match tracked.voxels
                                            .iter()
                                            .map(|p| (*p, self.elf[*p]))
                                            .max_by(|a, b| {
                                                a.1.total_cmp(&b.1).then(b.0.cmp(&a.0))
                                            }) {
            Some(max) => max,
            None => return,
        };
        let max_frac = self.elf.grid.to_fractional(max_p);
        let (nearest_atom, atom_distance) = self.structure
                                                .nearest_atom(max_frac)
                                                .unwrap_or((0, f64::INFINITY));
        let node = graph.node(tracked.id);
        let charge = node.basins.iter().map(|b| basin_charge[*b]).sum();
        let volume = node.basins.iter().map(|b| basin_volume[*b]).sum();
        let depth = max_elf - graph.parent_split(tracked.id);
        let enclosed = self.enclosed_atoms(&tracked.voxels);
        debug!("Domain {} vanished with maximum {:.3} ({} of {} basins)",
               tracked.id,
               max_elf,
               node.basins.len(),
               basins.len());
        graph.set_irreducible(tracked.id,
                              Irreducible { max_elf,
                                            max_frac,
                                            depth,
                                            charge,
                                            volume,
                                            nearest_atom,
                                            atom_distance,
                                            feature: FeatureType::Valence,
                                            subtype: None,
                                            atom: None,
                                            electride_score: None,
                                            is_electride: false,
                                            enclosed });
    }

    /// Atoms enclosed by a set of voxels.
    fn enclosed_atoms(&self, voxels: &[usize]) -> EnclosedAtoms {
        let grid = &self.elf.grid;
        let mut region = vec![false; grid.size.total];
        for p in voxels.iter() {
            region[*p] = true;
        }
        atoms_surrounded(grid, &region, &self.structure)
    }

    /// Atoms enclosed by a leaf when it vanished.
    fn enclosed_by(graph: &BifurcationGraph, id: usize) -> EnclosedAtoms {
        graph.node(id)
             .irreducible()
             .map(|l| l.enclosed.clone())
             .unwrap_or(EnclosedAtoms::Infinite)
    }

    /// The single atom a leaf encloses, if it encloses exactly one.
    fn single_atom(graph: &BifurcationGraph, id: usize) -> Option<usize> {
        match Self::enclosed_by(graph, id) {
            EnclosedAtoms::Finite(atoms) if atoms.len() == 1 => Some(atoms[0]),
            _ => None,
        }
    }

    fn set_label(graph: &mut BifurcationGraph,
                 id: usize,
                 feature: FeatureType,
                 subtype: Option<Subtype>,
                 atom: Option<usize>) {
        if let Some(leaf) = graph.node_mut(id).irreducible_mut() {
            leaf.feature = feature;
            leaf.subtype = subtype;
            leaf.atom = atom;
        }
    }

    /// Labels the irreducible domains belonging to atomic cores and shells.
    ///
    /// Fails when an atom is left without a core or shell, unless
    /// `ignore_low_pseudopotentials` is set.
    pub fn mark_atomic_basins(&self, graph: &mut BifurcationGraph) -> Result<()> {
        let root = graph.root();
        if graph.node(root).irreducible().is_some() {
            match Self::single_atom(graph, root) {
                Some(atom) => Self::set_label(graph,
                                              root,
                                              FeatureType::Atom,
                                              Some(Subtype::Core),
                                              Some(atom)),
                None => Self::set_label(graph, root, FeatureType::Valence, None, None),
            }
        }
        let mut corrections = vec![];
        for id in graph.reducible_nodes() {
            let enclosed = match graph.node(id).reducible() {
                Some(node) => node.enclosed.clone(),
                None => continue,
            };
            let children = graph.children(id);
            let leaves = children.iter()
                                 .copied()
                                 .filter(|c| graph.node(*c).irreducible().is_some())
                                 .collect::<Vec<usize>>();
            match enclosed.len() {
                Some(0) => {
                    for leaf in leaves {
                        Self::set_label(graph, leaf, FeatureType::Valence, None, None);
                    }
                }
                Some(1) => {
                    let atom = match &enclosed {
                        EnclosedAtoms::Finite(atoms) => atoms[0],
                        EnclosedAtoms::Infinite => continue,
                    };
                    let mut others = vec![];
                    let mut has_core = false;
                    for leaf in leaves.iter().copied() {
                        let depth = graph.node(leaf)
                                         .irreducible()
                                         .map(|l| l.depth)
                                         .unwrap_or(0.);
                        if depth < self.settings.shell_depth {
                            Self::set_label(graph,
                                            leaf,
                                            FeatureType::Atom,
                                            Some(Subtype::Shell),
                                            Some(atom));
                        } else if matches!(Self::enclosed_by(graph, leaf),
                                           EnclosedAtoms::Finite(a) if a.contains(&atom))
                        {
                            has_core = true;
                            Self::set_label(graph,
                                            leaf,
                                            FeatureType::Atom,
                                            Some(Subtype::Core),
                                            Some(atom));
                        } else {
                            others.push(leaf);
                        }
                    }
                    let subtype = if has_core {
                        Some(Subtype::LonePair)
                    } else if !others.is_empty() && others.len() == leaves.len() {
                        Some(Subtype::Covalent)
                    } else {
                        None
                    };
                    for leaf in others.iter().copied() {
                        Self::set_label(graph, leaf, FeatureType::Valence, subtype, None);
                    }
                    if !others.is_empty() && subtype.is_some() {
                        for child in children.iter().copied() {
                            if graph.node(child).reducible().is_some() {
                                corrections.push((child, subtype));
                            }
                        }
                    }
                }
                _ => {
                    for leaf in leaves {
                        match Self::single_atom(graph, leaf) {
                            Some(atom) => Self::set_label(graph,
                                                          leaf,
                                                          FeatureType::Atom,
                                                          Some(Subtype::Core),
                                                          Some(atom)),
                            None => Self::set_label(graph,
                                                    leaf,
                                                    FeatureType::Valence,
                                                    None,
                                                    None),
                        }
                    }
                }
            }
        }
        for (branch, subtype) in corrections {
            for leaf in graph.descendant_leaves(branch) {
                let unlabelled = graph.node(leaf)
                                      .irreducible()
                                      .map(|l| l.feature == FeatureType::Valence && l.subtype.is_none())
                                      .unwrap_or(false);
                if unlabelled {
                    Self::set_label(graph, leaf, FeatureType::Valence, subtype, None);
                }
            }
        }
        self.check_atom_coverage(graph)
    }

    /// Every atom must own at least one core or shell domain.
    fn check_atom_coverage(&self, graph: &BifurcationGraph) -> Result<()> {
        let covered = graph.leaves()
                           .into_iter()
                           .filter_map(|id| graph.node(id).irreducible())
                           .filter(|l| l.feature == FeatureType::Atom)
                           .filter_map(|l| l.atom)
                           .collect::<FxHashSet<usize>>();
        let missing = (0..self.structure.len()).filter(|a| !covered.contains(a))
                                               .collect::<Vec<usize>>();
        if missing.is_empty() {
            Ok(())
        } else if self.settings.ignore_low_pseudopotentials {
            warn!("No core or shell ELF feature found for atoms {:?}, continuing as requested",
                  missing);
            Ok(())
        } else {
            Err(BadElfError::InsufficientPseudopotential { missing })
        }
    }

    /// Whether a feature sits on a near linear path between its nearest atom
    /// and one of that atom's coordinating atoms.
    pub fn is_covalent_geometry(&self, feature: [f64; 3], atom: usize) -> bool {
        let lattice = &self.structure.lattice;
        let atom_frac = self.structure.sites[atom].frac;
        let to_feature = lattice.minimum_image(utils::sub(feature, atom_frac));
        let a = utils::norm(to_feature);
        if a < 1e-8 {
            return false;
        }
        for neighbor in self.structure.coordination(atom, COORDINATION_TOLERANCE) {
            let bond = lattice.to_cartesian(utils::sub(neighbor.frac, atom_frac));
            let c = utils::norm(bond);
            let b = utils::norm(utils::sub(bond, to_feature));
            if b < 1e-8 {
                continue;
            }
            let cos = ((a.powi(2) + b.powi(2) - c.powi(2)) / (2. * a * b)).clamp(-1., 1.);
            let angle = cos.acos().to_degrees();
            if angle > self.settings.min_covalent_angle
               && a.min(b) / c > self.settings.min_covalent_bond_ratio
            {
                return true;
            }
        }
        false
    }

    /// Labels the remaining valence domains as metallic, covalent or bare
    /// electrons.
    pub fn mark_metallic_covalent_easy(&self, graph: &mut BifurcationGraph) {
        for id in graph.leaves() {
            let (depth, max_frac, nearest_atom) = match graph.node(id).irreducible() {
                Some(l) if l.feature == FeatureType::Valence && l.subtype.is_none() => {
                    (l.depth, l.max_frac, l.nearest_atom)
                }
                _ => continue,
            };
            let subtype = if depth < self.settings.metal_depth_cutoff {
                Subtype::Metallic
            } else if self.is_covalent_geometry(max_frac, nearest_atom) {
                Subtype::Covalent
            } else {
                Subtype::BareElectron
            };
            Self::set_label(graph, id, FeatureType::Valence, Some(subtype), None);
        }
        for id in graph.reducible_nodes() {
            let children = graph.children(id);
            let subtypes = children.iter()
                                   .map(|c| graph.node(*c).irreducible().and_then(|l| l.subtype))
                                   .collect::<Vec<Option<Subtype>>>();
            let has_covalent = subtypes.contains(&Some(Subtype::Covalent));
            let all_valence_pairs = subtypes.iter().all(|s| {
                                                 matches!(s,
                                                          Some(Subtype::Covalent)
                                                          | Some(Subtype::LonePair)
                                                          | Some(Subtype::BareElectron))
                                             });
            if has_covalent && all_valence_pairs {
                for (child, subtype) in children.iter().zip(subtypes.iter()) {
                    if *subtype == Some(Subtype::BareElectron) {
                        Self::set_label(graph,
                                        *child,
                                        FeatureType::Valence,
                                        Some(Subtype::LonePair),
                                        None);
                    }
                }
            }
        }
    }

    /// Composite score in [0, 1] of how electride-like a bare electron is.
    pub fn electride_score(&self, leaf: &Irreducible) -> f64 {
        let radius = self.atomic_radius(leaf.nearest_atom);
        let expected = if self.settings.spin_polarized { 1. } else { 2. };
        let hydride_volume = 4. / 3. * std::f64::consts::PI * HYDRIDE_RADIUS.powi(3);
        let elf = leaf.max_elf.clamp(0., 1.);
        let charge = (1. - (leaf.charge - expected).abs() / expected).clamp(0., 1.);
        let depth = leaf.depth.clamp(0., 1.);
        let volume = (leaf.volume / hydride_volume).min(1.);
        let distance = ((leaf.atom_distance - 0.9 * radius)
                        / (radius + HYDRIDE_RADIUS - 0.9 * radius)).clamp(0., 1.);
        0.2 * (elf + charge + depth + volume + distance)
    }

    /// Whether a bare electron passes every electride threshold.
    pub fn passes_electride_thresholds(&self, leaf: &Irreducible) -> bool {
        let s = &self.settings;
        leaf.max_elf >= s.electride_elf_min
        && leaf.depth >= s.electride_depth_min
        && leaf.charge >= s.electride_charge_min
        && leaf.volume >= s.electride_volume_min
        && leaf.atom_distance - self.atomic_radius(leaf.nearest_atom)
           >= s.electride_radius_min
    }

    fn atomic_radius(&self, atom: usize) -> f64 {
        self.structure
            .sites
            .get(atom)
            .and_then(|s| elements::covalent_radius(&s.species))
            .unwrap_or(1.)
    }

    /// Scores every bare electron and flags the electrides.
    pub fn mark_electride_character(&self, graph: &mut BifurcationGraph) {
        for id in graph.leaves() {
            let (score, is_electride) = match graph.node(id).irreducible() {
                Some(l) if l.subtype == Some(Subtype::BareElectron) => {
                    (self.electride_score(l), self.passes_electride_thresholds(l))
                }
                _ => continue,
            };
            if let Some(leaf) = graph.node_mut(id).irreducible_mut() {
                leaf.electride_score = Some(score);
                leaf.is_electride = is_electride;
            }
        }
    }

    /// The atoms followed by a dummy site on every electride and shared
    /// feature, with the ELF basins each dummy site claims.
    pub fn labeled_structure(&self,
                             graph: &BifurcationGraph)
                             -> (Structure, Vec<Vec<usize>>) {
        let mut structure = self.structure.clone();
        let mut site_basins = vec![Vec::<usize>::new(); structure.len()];
        let leaves = graph.leaves();
        let mut shared = vec![];
        for id in leaves.iter().copied() {
            let leaf = match graph.node(id).irreducible() {
                Some(l) if l.feature == FeatureType::Valence => l,
                _ => continue,
            };
            let kind = match leaf.subtype {
                Some(Subtype::BareElectron) if leaf.is_electride => SiteKind::Electride,
                Some(Subtype::BareElectron) => SiteKind::BareElectron,
                Some(Subtype::Covalent) => SiteKind::Covalent,
                Some(Subtype::Metallic) => SiteKind::Metallic,
                Some(Subtype::LonePair) => SiteKind::LonePair,
                _ => continue,
            };
            if kind == SiteKind::Electride {
                if let Some(symbol) = kind.symbol() {
                    structure.push(symbol, leaf.max_frac);
                    site_basins.push(graph.node(id).basins.clone());
                }
            } else {
                shared.push((kind, leaf.max_frac, graph.node(id).basins.clone()));
            }
        }
        for (kind, frac, basins) in shared {
            if let Some(symbol) = kind.symbol() {
                structure.push(symbol, frac);
                site_basins.push(basins);
            }
        }
        (structure, site_basins)
    }
}
