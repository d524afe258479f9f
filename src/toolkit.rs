use crate::analysis::{self, ChargeVolume};
use crate::atoms::{Site, SiteKind, Structure};
use crate::dimensionality::{DimensionalityResult, ElectrideNetwork};
use crate::errors::{BadElfError, Result};
use crate::finder::{ElectrideFinder, FinderSettings, LabelingResult};
use crate::graph::Irreducible;
use crate::grid::{Interpolation, ScalarGrid};
use crate::io::potcar;
use crate::io::vasp::Vasp;
use crate::io::{FileFormat, GridKind};
use crate::partitioning::{PartitioningResult, PartitioningToolkit};
use crate::voxel_assignment::VoxelAssignment;
use crate::voxel_map::VoxelMap;
use log::{info, warn};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How space is divided between the sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Algorithm {
    /// Planes between atoms, electrides keep their zero-flux basins.
    #[serde(rename = "badelf")]
    BadElf,
    /// Planes between atoms and electrides.
    #[serde(rename = "voronelf")]
    VoronElf,
    /// Zero-flux basins of the ELF for every site.
    #[serde(rename = "zero-flux")]
    ZeroFlux,
}

impl FromStr for Algorithm {
    type Err = BadElfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "badelf" => Ok(Self::BadElf),
            "voronelf" => Ok(Self::VoronElf),
            "zero-flux" | "zero_flux" | "zeroflux" => Ok(Self::ZeroFlux),
            _ => Err(BadElfError::InvalidSetting(format!("Unknown algorithm: {}", s))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadElf => "badelf",
            Self::VoronElf => "voronelf",
            Self::ZeroFlux => "zero-flux",
        };
        write!(f, "{}", name)
    }
}

/// How the charge of covalent, metallic and lone-pair features reaches the
/// atoms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    /// The dividing planes cut through the feature.
    Plane,
    /// In proportion to the electronegativity of each neighbouring atom.
    Pauling,
    /// Equally between the neighbouring atoms.
    Equal,
    /// In proportion to the inverse distance to each neighbouring atom.
    Dist,
    /// All to the nearest atom.
    Nearest,
}

impl FromStr for SplitMethod {
    type Err = BadElfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "plane" => Ok(Self::Plane),
            "pauling" => Ok(Self::Pauling),
            "equal" => Ok(Self::Equal),
            "dist" => Ok(Self::Dist),
            "nearest" => Ok(Self::Nearest),
            _ => Err(BadElfError::InvalidSetting(format!("Unknown shared feature splitting method: {}",
                                                         s))),
        }
    }
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Plane => "plane",
            Self::Pauling => "pauling",
            Self::Equal => "equal",
            Self::Dist => "dist",
            Self::Nearest => "nearest",
        };
        write!(f, "{}", name)
    }
}

/// Settings of a full analysis.
#[derive(Clone, Debug, Serialize)]
pub struct BadElfSettings {
    pub algorithm: Algorithm,
    pub split: SplitMethod,
    /// Fail when an atom-atom bond looks covalent.
    pub check_covalency: bool,
    pub threads: usize,
    pub interpolation: Interpolation,
    /// How far inside every plane of a cell a voxel must lie to be assigned
    /// without splitting.
    pub min_dist: f64,
    /// Charge density below which a voxel is vacuum.
    pub vacuum_tolerance: Option<f64>,
    /// ELF cutoff at which the electride dimensionality is measured.
    pub electride_connection_cutoff: f64,
    pub finder: FinderSettings,
    #[serde(skip)]
    pub verbose: bool,
}

impl Default for BadElfSettings {
    fn default() -> Self {
        Self { algorithm: Algorithm::BadElf,
               split: SplitMethod::Pauling,
               check_covalency: true,
               threads: default_threads(),
               interpolation: Interpolation::Linear,
               min_dist: 0.,
               vacuum_tolerance: None,
               electride_connection_cutoff: 0.,
               finder: FinderSettings::default(),
               verbose: false }
    }
}

/// 90% of the available threads, at least one.
pub fn default_threads() -> usize {
    ((num_cpus::get() as f64 * 0.9) as usize).max(1)
}

impl BadElfSettings {
    /// Validates the settings, replacing plane splitting with pauling for the
    /// zero-flux algorithm.
    pub fn resolve(mut self) -> Result<Self> {
        if self.algorithm == Algorithm::ZeroFlux && self.split == SplitMethod::Plane {
            warn!("Plane splitting is not possible with the zero-flux algorithm, using pauling");
            self.split = SplitMethod::Pauling;
        }
        if self.min_dist < 0. {
            return Err(BadElfError::InvalidSetting(format!("min_dist must not be negative, got {}",
                                                           self.min_dist)));
        }
        if !(0. ..1.).contains(&self.electride_connection_cutoff) {
            return Err(BadElfError::InvalidSetting(format!("electride connection cutoff must lie in [0, 1), got {}",
                                                           self.electride_connection_cutoff)));
        }
        self.threads = self.threads.max(1);
        self.finder.verbose = self.verbose;
        Ok(self)
    }
}

/// Runs the labelling, partitioning and charge assignment of an ELF and
/// charge density pair.
pub struct BadElfToolkit {
    elf: ScalarGrid,
    charge: ScalarGrid,
    pub settings: BadElfSettings,
    potcar: Option<PathBuf>,
}

impl BadElfToolkit {
    pub fn new(elf: ScalarGrid,
               charge: ScalarGrid,
               settings: BadElfSettings)
               -> Result<Self> {
        elf.check_compatible(&charge)?;
        let settings = settings.resolve()?;
        Ok(Self { elf,
                  charge,
                  settings,
                  potcar: None })
    }

    /// Reads an ELFCAR and a CHGCAR. A POTCAR next to the CHGCAR is used
    /// for oxidation states.
    pub fn from_files(elf_path: &Path,
                      charge_path: &Path,
                      settings: BadElfSettings)
                      -> Result<Self> {
        let (elf, charge) = read_pair(elf_path, charge_path)?;
        let potcar = charge_path.parent()
                                .unwrap_or_else(|| Path::new("."))
                                .join("POTCAR");
        let toolkit = Self::new(elf, charge, settings)?;
        Ok(if potcar.exists() {
               toolkit.with_potcar(potcar)
           } else {
               toolkit
           })
    }

    /// Uses the POTCAR at path for valence electron counts.
    pub fn with_potcar(mut self, path: impl Into<PathBuf>) -> Self {
        self.potcar = Some(path.into());
        self
    }

    pub fn elf(&self) -> &ScalarGrid {
        &self.elf
    }

    pub fn charge(&self) -> &ScalarGrid {
        &self.charge
    }

    /// Labels the ELF features and builds the ordered labelled structure.
    pub fn labeling(&self) -> Result<LabelingResult> {
        ElectrideFinder::new(&self.elf, &self.charge, self.settings.finder.clone())?.run()
    }

    /// The dividing planes of the partition sites, None for zero-flux.
    pub fn partitioning(&self, labeled: &Structure) -> Result<Option<PartitioningResult>> {
        let filter: fn(&Site) -> bool = match self.settings.algorithm {
            Algorithm::ZeroFlux => return Ok(None),
            Algorithm::BadElf => |s: &Site| s.kind == SiteKind::Atom,
            Algorithm::VoronElf => {
                |s: &Site| matches!(s.kind, SiteKind::Atom | SiteKind::Electride)
            }
        };
        let mut toolkit = PartitioningToolkit::new(&self.elf,
                                                   labeled,
                                                   filter,
                                                   self.settings.interpolation);
        toolkit.verbose = self.settings.verbose;
        if self.settings.check_covalency {
            toolkit.check_structure_for_covalency()?;
        }
        Ok(Some(toolkit.partition()?))
    }

    /// Voxels below the vacuum tolerance.
    fn vacuum(&self) -> Vec<bool> {
        match self.settings.vacuum_tolerance {
            Some(tol) => self.charge.data.iter().map(|v| *v < tol).collect(),
            None => vec![false; self.charge.data.len()],
        }
    }

    /// Assigns every voxel to a site of the labelled structure.
    pub fn voxel_map(&self,
                     labeling: &LabelingResult,
                     partitioning: Option<&PartitioningResult>)
                     -> Result<VoxelMap> {
        let structure = &labeling.structure;
        let vacuum = self.vacuum();
        let grid = self.charge.grid.clone();
        let partitioning = match partitioning {
            Some(p) => p,
            None => {
                info!("Assigning voxels to the zero-flux basins of the ELF");
                let owners = labeling.basin_owners();
                let labels = labeling.basins
                                     .labels
                                     .iter()
                                     .zip(vacuum.iter())
                                     .map(|(b, vac)| match (*b, *vac) {
                                         (b, false) if b >= 0 => owners[b as usize] as isize,
                                         _ => -1,
                                     })
                                     .collect();
                return Ok(VoxelMap::from_labels(grid, structure.len(), labels));
            }
        };
        // basins kept whole by their dummy site
        let mut fixed_basin = vec![0usize; labeling.basins.len()];
        for (site, basins) in labeling.site_basins.iter().enumerate() {
            let kind = structure.sites[site].kind;
            let keep = match kind {
                SiteKind::Atom => false,
                SiteKind::Electride => self.settings.algorithm == Algorithm::BadElf,
                _ => self.settings.split != SplitMethod::Plane,
            };
            if keep {
                for b in basins.iter() {
                    fixed_basin[*b] = site + 1;
                }
            }
        }
        let fixed = labeling.basins
                            .labels
                            .iter()
                            .map(|b| if *b >= 0 { fixed_basin[*b as usize] } else { 0 })
                            .collect::<Vec<usize>>();
        let mut assignment = VoxelAssignment::new(&grid,
                                                  partitioning,
                                                  structure.len(),
                                                  self.settings.min_dist,
                                                  self.settings.threads);
        assignment.verbose = self.settings.verbose;
        assignment.assign(&fixed, &vacuum)
    }

    /// Valence electrons of each species from the POTCAR, None when it is
    /// missing or unreadable.
    pub fn valences(&self) -> Option<FxHashMap<String, f64>> {
        let path = match &self.potcar {
            Some(p) => p,
            None => {
                warn!("No POTCAR supplied, oxidation states will not be calculated");
                return None;
            }
        };
        match potcar::read_valences(path) {
            Ok(valences) => Some(potcar::valence_map(&valences)),
            Err(e) => {
                warn!("{}, oxidation states will not be calculated", e);
                None
            }
        }
    }

    /// Runs the full analysis.
    pub fn run(&self) -> Result<BadElfResults> {
        let labeling = self.labeling()?;
        self.run_with(labeling)
    }

    /// Runs the analysis on an existing labelling.
    pub fn run_with(&self, labeling: LabelingResult) -> Result<BadElfResults> {
        let structure = labeling.structure.clone();
        if !structure.is_ordered() {
            return Err(BadElfError::UnorderedStructure);
        }
        let partitioning = self.partitioning(&structure)?;
        let voxel_map = self.voxel_map(&labeling, partitioning.as_ref())?;
        let threads = self.settings.threads;
        let site_values = analysis::sum_site_charges(&self.charge, &voxel_map, threads)?;
        info!("Partitioned {:.4} of {:.4} electrons",
              site_values.total_charge() - site_values.vacuum_charge,
              self.charge.total());
        let values = analysis::split_shared(&structure, &site_values, self.settings.split)?;
        let electride_structure = structure.electride_augmented();
        let kept = electride_structure.len();
        let (mut min_surface_distance, mut avg_surface_distance) =
            analysis::surface_distances(&voxel_map, &structure, threads);
        min_surface_distance.truncate(kept);
        avg_surface_distance.truncate(kept);
        let dimensionality =
            ElectrideNetwork::new(&self.elf, &voxel_map, &structure)
                .map(|network| network.analyse(self.settings.electride_connection_cutoff));
        let oxidation_states = self.valences()
                                   .and_then(|v| oxidation_states(&electride_structure,
                                                                  &values.charges,
                                                                  &v));
        Ok(BadElfResults { settings: self.settings.clone(),
                           nelectrides: electride_structure.num_electrides(),
                           structure,
                           electride_structure,
                           values,
                           site_values,
                           min_surface_distance,
                           avg_surface_distance,
                           dimensionality,
                           oxidation_states,
                           voxel_map,
                           partitioning,
                           labeling })
    }
}

/// Reads the ELF and charge density, keeping the first data block of each.
pub fn read_pair(elf_path: &Path, charge_path: &Path) -> Result<(ScalarGrid, ScalarGrid)> {
    let vasp = Vasp {};
    info!("Reading {}", elf_path.display());
    let elf = first_block(vasp.read(elf_path, GridKind::Elf)?, elf_path)?;
    info!("Reading {}", charge_path.display());
    let charge = first_block(vasp.read(charge_path, GridKind::Charge)?, charge_path)?;
    Ok((elf, charge))
}

/// The first data block of a file.
pub fn first_block(grids: Vec<ScalarGrid>, path: &Path) -> Result<ScalarGrid> {
    grids.into_iter()
         .next()
         .ok_or_else(|| BadElfError::parse(path, "no grid data"))
}

/// Valence minus charge for atoms and minus the charge for electrides.
/// None when a species has no valence.
pub fn oxidation_states(structure: &Structure,
                        charges: &[f64],
                        valences: &FxHashMap<String, f64>)
                        -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(charges.len());
    for (site, charge) in structure.sites.iter().zip(charges) {
        match site.kind {
            SiteKind::Atom => match valences.get(&site.species) {
                Some(v) => out.push(v - charge),
                None => {
                    warn!("No valence found for {}, oxidation states will not be calculated",
                          site.species);
                    return None;
                }
            },
            _ => out.push(-charge),
        }
    }
    Some(out)
}

/// Everything produced by a full analysis.
#[derive(Clone, Debug)]
pub struct BadElfResults {
    pub settings: BadElfSettings,
    /// Atoms, electrides and shared features, the sites of the voxel map.
    pub structure: Structure,
    /// Atoms and electrides, the sites of `values`.
    pub electride_structure: Structure,
    /// Charge and volume after splitting the shared features.
    pub values: ChargeVolume,
    /// Charge and volume of every site of the voxel map.
    pub site_values: ChargeVolume,
    pub min_surface_distance: Vec<f64>,
    pub avg_surface_distance: Vec<f64>,
    pub nelectrides: usize,
    pub dimensionality: Option<DimensionalityResult>,
    pub oxidation_states: Option<Vec<f64>>,
    pub voxel_map: VoxelMap,
    pub partitioning: Option<PartitioningResult>,
    pub labeling: LabelingResult,
}

/// The serialisable summary of an analysis.
#[derive(Clone, Debug, Serialize)]
pub struct BadElfSummary {
    pub settings: BadElfSettings,
    /// POSCAR of the atoms and electrides.
    pub structure: String,
    /// POSCAR of every labelled feature.
    pub labeled_structure: String,
    pub species: Vec<String>,
    pub charges: Vec<f64>,
    pub volumes: Vec<f64>,
    pub oxidation_states: Option<Vec<f64>>,
    pub min_surface_distance: Vec<f64>,
    pub avg_surface_distance: Vec<f64>,
    pub nelectrides: usize,
    pub electride_dimensionality: Option<DimensionalityResult>,
    pub vacuum_charge: f64,
    pub vacuum_volume: f64,
    pub total_charge: f64,
    pub total_volume: f64,
    pub features: Vec<Irreducible>,
}

impl BadElfResults {
    pub fn summary(&self) -> BadElfSummary {
        let features = self.labeling
                           .graph
                           .leaves()
                           .into_iter()
                           .filter_map(|id| self.labeling.graph.node(id).irreducible().cloned())
                           .collect();
        BadElfSummary { settings: self.settings.clone(),
                        structure: self.electride_structure.to_string(),
                        labeled_structure: self.structure.to_string(),
                        species: self.electride_structure
                                     .sites
                                     .iter()
                                     .map(|s| s.species.clone())
                                     .collect(),
                        charges: self.values.charges.clone(),
                        volumes: self.values.volumes.clone(),
                        oxidation_states: self.oxidation_states.clone(),
                        min_surface_distance: self.min_surface_distance.clone(),
                        avg_surface_distance: self.avg_surface_distance.clone(),
                        nelectrides: self.nelectrides,
                        electride_dimensionality: self.dimensionality.clone(),
                        vacuum_charge: self.values.vacuum_charge,
                        vacuum_volume: self.values.vacuum_volume,
                        total_charge: self.values.total_charge(),
                        total_volume: self.values.total_volume(),
                        features }
    }

    /// The summary as pretty printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summary())?)
    }

    /// Writes `grid` keeping only the share of each voxel owned by the sites
    /// given, the sites index the labelled structure.
    fn write_sites(&self,
                   grid: &ScalarGrid,
                   kind: GridKind,
                   sites: &[usize],
                   path: &Path,
                   overlay: bool)
                   -> Result<()> {
        if grid.grid.size.total != self.voxel_map.grid.size.total {
            return Err(BadElfError::GridMismatch(String::from("grid differs from the voxel map")));
        }
        let weights = (0..grid.grid.size.total).map(|p| {
                                                   sites.iter()
                                                        .map(|s| self.voxel_map.weight(p, *s))
                                                        .sum::<f64>()
                                               })
                                               .collect::<Vec<f64>>();
        let structure = if overlay {
            self.structure.clone()
        } else {
            self.structure.atoms_only()
        };
        let masked = grid.masked(&weights)?.with_structure(structure);
        Vasp {}.write(&masked, kind, path)
    }

    /// Writes the part of `grid` belonging to every site of a species.
    pub fn write_species_file(&self,
                              grid: &ScalarGrid,
                              kind: GridKind,
                              species: &str,
                              path: &Path,
                              overlay: bool)
                              -> Result<()> {
        let sites = self.structure
                        .sites
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| s.species == species)
                        .map(|(i, _)| i)
                        .collect::<Vec<usize>>();
        if sites.is_empty() {
            return Err(BadElfError::InvalidSetting(format!("No sites of species {}", species)));
        }
        self.write_sites(grid, kind, &sites, path, overlay)
    }

    /// Writes the part of `grid` belonging to a single site.
    pub fn write_atom_file(&self,
                           grid: &ScalarGrid,
                           kind: GridKind,
                           site: usize,
                           path: &Path,
                           overlay: bool)
                           -> Result<()> {
        if site >= self.structure.len() {
            return Err(BadElfError::InvalidSetting(format!("Site {} is out of range, the structure has {} sites",
                                                           site,
                                                           self.structure.len())));
        }
        self.write_sites(grid, kind, &[site], path, overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;

    #[test]
    fn toolkit_algorithm_from_str() {
        assert_eq!("badelf".parse::<Algorithm>().unwrap(), Algorithm::BadElf);
        assert_eq!("VoronELF".parse::<Algorithm>().unwrap(), Algorithm::VoronElf);
        assert_eq!("zero-flux".parse::<Algorithm>().unwrap(), Algorithm::ZeroFlux);
        assert!(matches!("bader".parse::<Algorithm>(),
                         Err(BadElfError::InvalidSetting(_))));
        assert_eq!(Algorithm::ZeroFlux.to_string(), "zero-flux");
    }

    #[test]
    fn toolkit_split_from_str() {
        for name in ["plane", "pauling", "equal", "dist", "nearest"] {
            assert_eq!(name.parse::<SplitMethod>().unwrap().to_string(), name);
        }
        assert!("half".parse::<SplitMethod>().is_err());
    }

    #[test]
    fn toolkit_resolve_zero_flux_plane() {
        let settings = BadElfSettings { algorithm: Algorithm::ZeroFlux,
                                        split: SplitMethod::Plane,
                                        ..BadElfSettings::default() };
        let settings = settings.resolve().unwrap();
        assert_eq!(settings.split, SplitMethod::Pauling);
    }

    #[test]
    fn toolkit_resolve_bad_cutoff() {
        let settings = BadElfSettings { electride_connection_cutoff: 1.5,
                                        ..BadElfSettings::default() };
        assert!(settings.resolve().is_err());
    }

    #[test]
    fn toolkit_default_threads() {
        assert!(default_threads() >= 1);
    }

    #[test]
    fn toolkit_oxidation_states() {
        let lattice =
            Lattice::new([[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]]).unwrap();
        let mut structure = Structure::new(lattice, vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("E", [0.5, 0.5, 0.5]);
        let mut valences = FxHashMap::default();
        valences.insert(String::from("Na"), 7.);
        let ox = oxidation_states(&structure, &[6.2, 0.8], &valences).unwrap();
        assert!((ox[0] - 0.8).abs() < 1e-12);
        assert_eq!(ox[1], -0.8);
        valences.clear();
        assert!(oxidation_states(&structure, &[6.2, 0.8], &valences).is_none());
    }
}
