use crate::errors::{BadElfError, Result};
use crate::finder::FinderSettings;
use crate::grid::Interpolation;
use crate::toolkit::{default_threads, Algorithm, BadElfSettings, SplitMethod};
use clap::{Arg, ArgMatches, Command};

/// Which result files to write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Json,
    Table,
    All,
}

/// Create a container for dealing with clap and being able to test arg parsing
pub enum ClapApp {
    App,
}

impl ClapApp {
    /// Create and return the clap::Command
    pub fn get(&self) -> Command<'static> {
        Command::new("BadELF Electride Analysis")
            .version(env!("CARGO_PKG_VERSION"))
            .arg(Arg::new("elf")
                .required(true)
                .index(1)
                .help("The ELFCAR to label and partition."))
            .arg(Arg::new("charge")
                .required(true)
                .index(2)
                .help("The CHGCAR holding the charge density to integrate."))
            .arg(Arg::new("algorithm")
                .short('a')
                .long("algorithm")
                .takes_value(true)
                .possible_values(["badelf", "voronelf", "zero-flux"])
                .default_value("badelf")
                .help("How to divide space between the sites.")
                .long_help(
"\"badelf\" divides atoms with planes at the ELF minimum along each bond and
keeps the zero-flux ELF basins of electrides. \"voronelf\" places planes between
electrides too. \"zero-flux\" uses the zero-flux ELF basins for every site."))
            .arg(Arg::new("split")
                .short('s')
                .long("split")
                .takes_value(true)
                .possible_values(["plane", "pauling", "equal", "dist", "nearest"])
                .default_value("pauling")
                .help("How to divide covalent, metallic and lone-pair features.")
                .long_help(
"The charge of shared features is handed to the atoms coordinating them. \"plane\"
lets the dividing planes cut through the feature, \"pauling\" splits by the
electronegativity of the atoms, \"equal\" splits evenly, \"dist\" by inverse
distance and \"nearest\" gives everything to the closest atom. \"plane\" is not
possible with the zero-flux algorithm and falls back to \"pauling\"."))
            .arg(Arg::new("potcar")
                .short('p')
                .long("potcar")
                .takes_value(true)
                .help("POTCAR used for oxidation states.")
                .long_help(
"The POTCAR supplying the valence electrons of each species. Defaults to a
POTCAR in the directory of the CHGCAR, oxidation states are skipped if none
is found."))
            .arg(Arg::new("spin")
                .long("spin")
                .takes_value(false)
                .help("Analyse the spin up and spin down channels separately."))
            .arg(Arg::new("threads")
                .short('J')
                .long("threads")
                .takes_value(true)
                .default_value("0")
                .help("Number of threads to distribute the calculation over.")
                .long_help(
"The number of threads to be used by the program. A default value of 0 uses 90%
of the available threads, split between the channels of a spin run."))
            .arg(Arg::new("resolution")
                .long("resolution")
                .takes_value(true)
                .default_value("0.02")
                .help("Step between ELF cutoffs in the bifurcation scan."))
            .arg(Arg::new("interpolation")
                .long("interpolation")
                .takes_value(true)
                .possible_values(["linear", "cubic"])
                .default_value("linear")
                .help("Interpolation used along the bonds."))
            .arg(Arg::new("vacuum tolerance")
                .short('v')
                .long("vac")
                .takes_value(true)
                .help("Cut-off at which charge is considered vacuum.")
                .long_help(
"Values of density below the supplied value are considered vacuum and are not
assigned to any site. A value of \"auto\" can be passed to use 1E-3."))
            .arg(Arg::new("no covalency check")
                .long("no-covalency-check")
                .takes_value(false)
                .help("Continue even if atom-atom bonds look covalent."))
            .arg(Arg::new("ignore low pseudopotentials")
                .long("ignore-low-pseudopotentials")
                .takes_value(false)
                .help("Continue even if some atoms have no core ELF feature."))
            .arg(Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .possible_values(["json", "table", "all"])
                .default_value("all")
                .help("Which result files to write."))
            .arg(Arg::new("species")
                .long("species")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Write the charge belonging to a species.")
                .long_help(
"Writes CHGCAR_<species> holding only the charge of the sites of a species,
dummy species such as E can be used. Can be passed more than once."))
            .arg(Arg::new("atom")
                .long("atom")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Write the charge belonging to a site, counting from 1.")
                .long_help(
"Writes CHGCAR_<atom> holding only the charge of a site of the labelled
structure, counting from 1. Can be passed more than once."))
            .arg(Arg::new("verbose")
                .long("verbose")
                .takes_value(false)
                .help("Show progress bars and debug logging."))
    }
}

/// Holds the arguments passed to the program from the command-line
pub struct Args {
    pub elf: String,
    pub charge: String,
    pub algorithm: Algorithm,
    pub split: SplitMethod,
    pub potcar: Option<String>,
    pub spin: bool,
    pub threads: usize,
    pub resolution: f64,
    pub interpolation: Interpolation,
    pub vacuum_tolerance: Option<f64>,
    pub check_covalency: bool,
    pub ignore_low_pseudopotentials: bool,
    pub output: Output,
    pub species: Vec<String>,
    /// zero indexed sites
    pub atoms: Vec<usize>,
    pub verbose: bool,
}

/// Parses an argument, naming it in the error.
fn parse<T: std::str::FromStr>(arguments: &ArgMatches, name: &str) -> Result<Option<T>> {
    match arguments.value_of(name) {
        Some(s) => s.parse::<T>().map(Some).map_err(|_| {
                                      BadElfError::InvalidSetting(format!("Couldn't parse {} from '{}'",
                                                                          name, s))
                                  }),
        None => Ok(None),
    }
}

impl Args {
    /// Initialises the structure from the command-line arguments.
    pub fn new(arguments: ArgMatches) -> Result<Self> {
        let elf = arguments.value_of("elf").unwrap_or("ELFCAR").to_string();
        let charge = arguments.value_of("charge").unwrap_or("CHGCAR").to_string();
        let algorithm = arguments.value_of("algorithm")
                                 .unwrap_or("badelf")
                                 .parse::<Algorithm>()?;
        let split = arguments.value_of("split")
                             .unwrap_or("pauling")
                             .parse::<SplitMethod>()?;
        let interpolation = arguments.value_of("interpolation")
                                     .unwrap_or("linear")
                                     .parse::<Interpolation>()?;
        let threads = match parse::<usize>(&arguments, "threads")? {
            Some(0) | None => default_threads(),
            Some(x) => x,
        };
        let resolution = parse::<f64>(&arguments, "resolution")?.unwrap_or(0.02);
        let vacuum_tolerance = match arguments.value_of("vacuum tolerance") {
            Some("auto") => Some(1E-3),
            _ => parse::<f64>(&arguments, "vacuum tolerance")?,
        };
        let output = match arguments.value_of("output") {
            Some("json") => Output::Json,
            Some("table") => Output::Table,
            _ => Output::All,
        };
        let species = match arguments.values_of("species") {
            Some(x) => x.map(String::from).collect(),
            None => Vec::with_capacity(0),
        };
        let atoms = match arguments.values_of("atom") {
            Some(x) => x.map(|a| match a.parse::<usize>() {
                            Ok(i) if i > 0 => Ok(i - 1),
                            _ => Err(BadElfError::InvalidSetting(format!("Couldn't parse atom index from '{}'",
                                                                         a))),
                        })
                        .collect::<Result<Vec<usize>>>()?,
            None => Vec::with_capacity(0),
        };
        Ok(Self { elf,
                  charge,
                  algorithm,
                  split,
                  potcar: arguments.value_of("potcar").map(String::from),
                  spin: arguments.is_present("spin"),
                  threads,
                  resolution,
                  interpolation,
                  vacuum_tolerance,
                  check_covalency: !arguments.is_present("no covalency check"),
                  ignore_low_pseudopotentials:
                      arguments.is_present("ignore low pseudopotentials"),
                  output,
                  species,
                  atoms,
                  verbose: arguments.is_present("verbose") })
    }

    /// The analysis settings described by the arguments.
    pub fn settings(&self) -> BadElfSettings {
        let finder = FinderSettings { resolution: self.resolution,
                                      ignore_low_pseudopotentials:
                                          self.ignore_low_pseudopotentials,
                                      verbose: self.verbose,
                                      ..FinderSettings::default() };
        BadElfSettings { algorithm: self.algorithm,
                         split: self.split,
                         check_covalency: self.check_covalency,
                         threads: self.threads,
                         interpolation: self.interpolation,
                         vacuum_tolerance: self.vacuum_tolerance,
                         finder,
                         verbose: self.verbose,
                         ..BadElfSettings::default() }
    }
}
