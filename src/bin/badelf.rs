use anyhow::{Context, Result};
use badelf::arguments::{Args, ClapApp, Output};
use badelf::grid::ScalarGrid;
use badelf::io::{output, GridKind};
use badelf::spin::SpinBadElfToolkit;
use badelf::toolkit::{BadElfResults, BadElfToolkit};
use log::info;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    // argument parsing
    let app = ClapApp::App.get();
    let args = Args::new(app.get_matches()).context("Parsing the arguments")?;
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    // print splash
    println!("BadELF Electride Analysis ({})", env!("CARGO_PKG_VERSION"));
    println!("Running on {} threads.", args.threads);
    let elf_path = Path::new(&args.elf);
    let charge_path = Path::new(&args.charge);
    let settings = args.settings();
    if args.spin {
        let mut toolkit = SpinBadElfToolkit::from_files(elf_path, charge_path, settings)
            .context("Setting up the spin polarised analysis")?;
        if let Some(potcar) = &args.potcar {
            toolkit = toolkit.with_potcar(potcar);
        }
        let results = toolkit.run().context("Running the spin polarised analysis")?;
        if args.output != Output::Table {
            output::write(results.to_json()?, Path::new("badelf.json"))?;
        }
        if args.output != Output::Json {
            output::write(output::merged_file(&results.merged), Path::new("BCF.dat"))?;
            output::write(output::results_file(&results.up), Path::new("BCF_up.dat"))?;
            output::write(output::results_file(&results.down),
                          Path::new("BCF_down.dat"))?;
        }
        write_partial_charges(&args, &results.up, toolkit.up.charge(), "_up")?;
        write_partial_charges(&args, &results.down, toolkit.down.charge(), "_down")?;
    } else {
        let mut toolkit = BadElfToolkit::from_files(elf_path, charge_path, settings)
            .context("Setting up the analysis")?;
        if let Some(potcar) = &args.potcar {
            toolkit = toolkit.with_potcar(potcar);
        }
        let results = toolkit.run().context("Running the analysis")?;
        if args.output != Output::Table {
            output::write(results.to_json()?, Path::new("badelf.json"))?;
        }
        if args.output != Output::Json {
            output::write(output::results_file(&results), Path::new("BCF.dat"))?;
        }
        write_partial_charges(&args, &results, toolkit.charge(), "")?;
    }
    Ok(())
}

/// Writes the charge of every requested species and site.
fn write_partial_charges(args: &Args,
                         results: &BadElfResults,
                         charge: &ScalarGrid,
                         suffix: &str)
                         -> Result<()> {
    for species in args.species.iter() {
        let path = PathBuf::from(format!("CHGCAR_{}{}", species, suffix));
        info!("Writing {}", path.display());
        results.write_species_file(charge, GridKind::Charge, species, &path, true)
               .with_context(|| format!("Writing the charge of {}", species))?;
    }
    for atom in args.atoms.iter() {
        let path = PathBuf::from(format!("CHGCAR_{}{}", atom + 1, suffix));
        info!("Writing {}", path.display());
        results.write_atom_file(charge, GridKind::Charge, *atom, &path, true)
               .with_context(|| format!("Writing the charge of site {}", atom + 1))?;
    }
    Ok(())
}
