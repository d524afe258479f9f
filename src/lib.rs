//! Topological analysis of the electron localization function (ELF) on
//! periodic grids, finding electrides and partitioning charge between atoms
//! and non-atomic features.
//!
//! The ELF is scanned from low to high values, recording where its connected
//! domains split into a bifurcation graph. The leaves of the graph are
//! classified as atom cores, shells, covalent and metallic bonds, lone pairs
//! and electrides. Dummy sites are placed at the non-atomic features and
//! space is then divided between the sites:
//! - badelf: planes at the ELF minimum along every atom-atom bond, with
//!   electrides keeping their zero-flux basins.
//! - voronelf: planes between every atom and electride.
//! - zero-flux: the zero-flux basins of the ELF for every site.
//!
//! Charge held by covalent, metallic and lone-pair features is then handed
//! to the surrounding atoms.
//!
//! ## Installing the binary
//! ```sh
//! $ cargo install --path .
//! ```
//! ## Usage
//! The program takes an ELFCAR and a CHGCAR from the same VASP calculation.
//! ```sh
//! $ badelf ELFCAR CHGCAR
//! ```
//! A POTCAR next to the CHGCAR, or passed with -p, supplies the valence
//! electrons needed for oxidation states. Spin polarised calculations are
//! analysed one channel at a time with the --spin flag.
//! ```sh
//! $ badelf ELFCAR CHGCAR --spin -p ../POTCAR
//! ```
//! For a detailed list of usage options run
//! ```sh
//! $ badelf --help
//! ```
//! ## Output
//! The program writes badelf.json, holding the full summary including the
//! labelled features, and BCF.dat, a table of the charge, volume, surface
//! distances and oxidation state of every atom and electride.
//! ## License
//! MIT

/// Sums charge over a [VoxelMap](voxel_map::VoxelMap) and splits shared
/// features between atoms.
pub mod analysis;
/// For parsing command-line arguments.
pub mod arguments;
/// Contains [Structure](atoms::Structure) and [Lattice](atoms::Lattice) for
/// the sites of a calculation and the cell that holds them.
pub mod atoms;
/// Connected components of periodic voxel masks and their dimensionality.
pub mod connectivity;
/// How the electride voxels connect through the cell.
pub mod dimensionality;
/// Tabulated element data.
pub mod elements;
/// Provides custom errors types.
pub mod errors;
/// Builds the bifurcation graph and labels the ELF features.
pub mod finder;
/// The [BifurcationGraph](graph::BifurcationGraph) and its nodes.
pub mod graph;
/// Contains [Grid](grid::Grid) for moving around a periodic grid and
/// [ScalarGrid](grid::ScalarGrid) for the data stored on it.
pub mod grid;
/// Handles the File I/O for the volumetric files and result files.
pub mod io;
/// Zero-flux basins of a scalar field found by on-grid steepest ascent.
pub mod methods;
pub mod partitioning;
/// Provides a [Bar](progress::Bar) that can be hidden.
pub mod progress;
/// Runs both channels of a spin polarised calculation.
pub mod spin;
/// The full analysis from a pair of grids to charges and oxidation states.
pub mod toolkit;
/// Misc functions mainly for vector and matrix manipulation.
pub mod utils;
/// Assigns voxels to sites using the dividing planes.
pub mod voxel_assignment;
/// Provides the [VoxelMap](voxel_map::VoxelMap) for storing the site or
/// weights of every voxel.
pub mod voxel_map;
