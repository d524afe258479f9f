use crate::atoms::{SiteKind, Structure};
use crate::errors::{BadElfError, Result};
use crate::grid::ScalarGrid;
use crate::io::vasp::Vasp;
use crate::io::{FileFormat, GridKind};
use crate::toolkit::{oxidation_states,
                     BadElfResults,
                     BadElfSettings,
                     BadElfSummary,
                     BadElfToolkit};
use crossbeam_utils::thread;
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Electride sites of the two channels closer than this, in angstroms, are
/// the same feature.
pub const SPIN_MATCH_TOLERANCE: f64 = 0.5;

/// Runs the analysis on each spin channel and merges the results.
pub struct SpinBadElfToolkit {
    pub up: BadElfToolkit,
    pub down: BadElfToolkit,
}

impl SpinBadElfToolkit {
    /// Each channel gets half of the threads and expects half the electrons
    /// of a closed shell feature.
    pub fn new(elf_up: ScalarGrid,
               elf_down: ScalarGrid,
               charge_up: ScalarGrid,
               charge_down: ScalarGrid,
               mut settings: BadElfSettings)
               -> Result<Self> {
        settings.finder.spin_polarized = true;
        settings.threads = (settings.threads / 2).max(1);
        let up = BadElfToolkit::new(elf_up, charge_up, settings.clone())?;
        let down = BadElfToolkit::new(elf_down, charge_down, settings)?;
        Ok(Self { up, down })
    }

    /// Reads a spin polarised ELFCAR, holding the up and down ELF, and a
    /// CHGCAR holding the total and magnetisation densities.
    pub fn from_files(elf_path: &Path,
                      charge_path: &Path,
                      settings: BadElfSettings)
                      -> Result<Self> {
        let vasp = Vasp {};
        info!("Reading {}", elf_path.display());
        let mut elf = vasp.read(elf_path, GridKind::Elf)?.into_iter();
        let (elf_up, elf_down) = match (elf.next(), elf.next()) {
            (Some(up), Some(down)) => (up, down),
            _ => {
                return Err(BadElfError::parse(elf_path,
                                              "expected two ELF blocks for a spin polarised run"))
            }
        };
        info!("Reading {}", charge_path.display());
        let mut charge = vasp.read(charge_path, GridKind::Charge)?.into_iter();
        let (charge_up, charge_down) = match (charge.next(), charge.next()) {
            (Some(total), Some(magnetization)) => total.split_spin(&magnetization)?,
            _ => {
                return Err(BadElfError::parse(charge_path,
                                              "expected a magnetisation block for a spin polarised run"))
            }
        };
        let toolkit = Self::new(elf_up, elf_down, charge_up, charge_down, settings)?;
        let potcar = charge_path.parent()
                                .unwrap_or_else(|| Path::new("."))
                                .join("POTCAR");
        Ok(if potcar.exists() {
               toolkit.with_potcar(potcar)
           } else {
               toolkit
           })
    }

    pub fn with_potcar(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self { up: self.up.with_potcar(path.clone()),
               down: self.down.with_potcar(path) }
    }

    /// Runs both channels side by side and merges them.
    pub fn run(&self) -> Result<SpinBadElfResults> {
        let (up, down) = thread::scope(|s| {
                             let up = s.spawn(|_| self.up.run());
                             let down = s.spawn(|_| self.down.run());
                             (up.join().unwrap_or_else(|e| std::panic::resume_unwind(e)),
                              down.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                         }).unwrap_or_else(|e| std::panic::resume_unwind(e));
        let (up, down) = (up?, down?);
        let mut merged = merge_channels(&up, &down);
        merged.oxidation_states =
            self.up
                .valences()
                .and_then(|v| oxidation_states(&merged.structure, &merged.charges, &v));
        Ok(SpinBadElfResults { up,
                               down,
                               merged })
    }
}

/// The two channels combined into a single set of sites.
///
/// Atoms sum their charge and average their volume. Electrides found in both
/// channels are merged the same way, the rest keep the charge of their
/// channel and gain an "xu" or "xd" suffix.
#[derive(Clone, Debug, Serialize)]
pub struct MergedSpin {
    #[serde(skip)]
    pub structure: Structure,
    pub species: Vec<String>,
    pub charges: Vec<f64>,
    pub volumes: Vec<f64>,
    pub min_surface_distance: Vec<f64>,
    pub avg_surface_distance: Vec<f64>,
    pub oxidation_states: Option<Vec<f64>>,
    pub nelectrides: usize,
    pub vacuum_charge: f64,
    pub vacuum_volume: f64,
}

/// Merges the atoms and electrides of both channels.
pub fn merge_channels(up: &BadElfResults, down: &BadElfResults) -> MergedSpin {
    let s_up = &up.electride_structure;
    let s_down = &down.electride_structure;
    let mut structure = Structure::new(s_up.lattice.clone(), vec![]);
    let mut charges = vec![];
    let mut volumes = vec![];
    let mut min_surface_distance = vec![];
    let mut avg_surface_distance = vec![];
    let mut both = |structure: &mut Structure, species: &str, i: usize, j: usize| {
        structure.push(species, s_up.sites[i].frac);
        charges.push(up.values.charges[i] + down.values.charges[j]);
        volumes.push((up.values.volumes[i] + down.values.volumes[j]) / 2.);
        min_surface_distance.push(up.min_surface_distance[i].min(down.min_surface_distance[j]));
        avg_surface_distance.push((up.avg_surface_distance[i] + down.avg_surface_distance[j]) / 2.);
    };
    for i in 0..s_up.num_atoms() {
        both(&mut structure, &s_up.sites[i].species, i, i);
    }
    let electrides = |s: &Structure| {
        s.sites
         .iter()
         .enumerate()
         .filter(|(_, site)| site.kind == SiteKind::Electride)
         .map(|(i, _)| i)
         .collect::<Vec<usize>>()
    };
    let e_up = electrides(s_up);
    let mut e_down = electrides(s_down);
    let mut only_up = vec![];
    for i in e_up {
        let nearest = e_down.iter()
                            .enumerate()
                            .map(|(k, j)| {
                                (k, s_up.lattice.distance(s_up.sites[i].frac, s_down.sites[*j].frac))
                            })
                            .filter(|(_, d)| *d < SPIN_MATCH_TOLERANCE)
                            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((k, _)) => {
                let j = e_down.remove(k);
                both(&mut structure, "E", i, j);
            }
            None => only_up.push(i),
        }
    }
    let single = [(only_up, up, "Exu"), (e_down, down, "Exd")];
    for (sites, results, species) in single.iter() {
        for i in sites.iter().copied() {
            structure.push(species,
                           results.electride_structure.sites[i].frac);
            charges.push(results.values.charges[i]);
            volumes.push(results.values.volumes[i]);
            min_surface_distance.push(results.min_surface_distance[i]);
            avg_surface_distance.push(results.avg_surface_distance[i]);
        }
    }
    MergedSpin { species: structure.sites.iter().map(|s| s.species.clone()).collect(),
                 nelectrides: structure.num_electrides(),
                 structure,
                 charges,
                 volumes,
                 min_surface_distance,
                 avg_surface_distance,
                 oxidation_states: None,
                 vacuum_charge: up.values.vacuum_charge + down.values.vacuum_charge,
                 vacuum_volume: (up.values.vacuum_volume + down.values.vacuum_volume) / 2. }
}

/// Results of both channels and their merge.
#[derive(Clone, Debug)]
pub struct SpinBadElfResults {
    pub up: BadElfResults,
    pub down: BadElfResults,
    pub merged: MergedSpin,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpinBadElfSummary {
    /// POSCAR of the merged atoms and electrides.
    pub structure: String,
    pub merged: MergedSpin,
    pub up: BadElfSummary,
    pub down: BadElfSummary,
}

impl SpinBadElfResults {
    pub fn summary(&self) -> SpinBadElfSummary {
        SpinBadElfSummary { structure: self.merged.structure.to_string(),
                            merged: self.merged.clone(),
                            up: self.up.summary(),
                            down: self.down.summary() }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summary())?)
    }
}
