mod common;

#[cfg(test)]
mod tests {
    use super::common;
    use badelf::atoms::SiteKind;
    use badelf::errors::BadElfError;
    use badelf::grid::ScalarGrid;
    use badelf::io::vasp::Vasp;
    use badelf::io::{FileFormat, GridKind};
    use badelf::spin::SpinBadElfToolkit;
    use badelf::toolkit::{Algorithm, BadElfResults, BadElfSettings, BadElfToolkit};

    fn settings(algorithm: Algorithm, threads: usize) -> BadElfSettings {
        BadElfSettings { algorithm,
                         threads,
                         ..BadElfSettings::default() }
    }

    fn run(algorithm: Algorithm) -> (BadElfResults, ScalarGrid) {
        let (elf, charge) = common::grids(true);
        let toolkit =
            BadElfToolkit::new(elf, charge.clone(), settings(algorithm, 2)).unwrap();
        (toolkit.run().unwrap(), charge)
    }

    fn assert_conserved(results: &BadElfResults, charge: &ScalarGrid) {
        let partitioned = results.values.total_charge();
        assert!((partitioned - charge.total()).abs() < 1e-4,
                "{} != {}",
                partitioned,
                charge.total());
        let volume = charge.structure.lattice.volume;
        assert!((results.values.total_volume() - volume).abs() < 1e-6);
    }

    #[test]
    fn toolkit_badelf_finds_electride() {
        let (results, charge) = run(Algorithm::BadElf);
        assert_eq!(results.nelectrides, 1);
        let structure = &results.electride_structure;
        assert_eq!(structure.len(), 3);
        assert_eq!(structure.sites[2].kind, SiteKind::Electride);
        assert_eq!(structure.sites[2].species, "E");
        assert!(structure.lattice.distance(structure.sites[2].frac, common::ELECTRIDE) < 0.2);
        assert!(results.values.charges[2] > 0.5);
        assert_conserved(&results, &charge);
        assert!(results.dimensionality.is_some());
        // no POTCAR given
        assert!(results.oxidation_states.is_none());
    }

    #[test]
    fn toolkit_other_algorithms_conserve_charge() {
        for algorithm in [Algorithm::VoronElf, Algorithm::ZeroFlux] {
            let (results, charge) = run(algorithm);
            assert_eq!(results.nelectrides, 1);
            assert_eq!(results.partitioning.is_none(),
                       algorithm == Algorithm::ZeroFlux);
            assert_conserved(&results, &charge);
        }
    }

    #[test]
    fn toolkit_threads_agree() {
        let (elf, charge) = common::grids(true);
        let one = BadElfToolkit::new(elf.clone(),
                                     charge.clone(),
                                     settings(Algorithm::BadElf, 1)).unwrap()
                                                                     .run()
                                                                     .unwrap();
        let three = BadElfToolkit::new(elf, charge, settings(Algorithm::BadElf, 3)).unwrap()
                                                                                    .run()
                                                                                    .unwrap();
        for (a, b) in one.values.charges.iter().zip(three.values.charges.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert_eq!(one.min_surface_distance, three.min_surface_distance);
    }

    #[test]
    fn toolkit_missing_core() {
        let (elf, charge) = common::grids(false);
        let toolkit = BadElfToolkit::new(elf.clone(),
                                         charge.clone(),
                                         settings(Algorithm::BadElf, 2)).unwrap();
        match toolkit.run() {
            Err(BadElfError::InsufficientPseudopotential { missing }) => {
                assert_eq!(missing, vec![1])
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("expected the Cl atom to be missing"),
        }
        let mut settings = settings(Algorithm::BadElf, 2);
        settings.finder.ignore_low_pseudopotentials = true;
        // no ELF around Cl to test the Na-Cl bonds with
        settings.check_covalency = false;
        let results = BadElfToolkit::new(elf, charge, settings).unwrap().run().unwrap();
        assert_eq!(results.nelectrides, 1);
    }

    #[test]
    fn toolkit_summary_json() {
        let (results, _) = run(Algorithm::BadElf);
        let json = results.to_json().unwrap();
        assert!(json.contains("\"nelectrides\": 1"));
        assert!(json.contains("\"algorithm\": \"badelf\""));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["species"][2], "E");
    }

    #[test]
    fn toolkit_write_species_file() {
        let (results, charge) = run(Algorithm::BadElf);
        let path = std::env::temp_dir().join(format!("badelf_{}_CHGCAR_E", std::process::id()));
        results.write_species_file(&charge, GridKind::Charge, "E", &path, true)
               .unwrap();
        let written = Vasp {}.read(&path, GridKind::Charge).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written[0].structure.len(), 3);
        assert!((written[0].total() - results.values.charges[2]).abs() < 1e-6);
        assert!(results.write_species_file(&charge, GridKind::Charge, "K", &path, true)
                       .is_err());
    }

    #[test]
    fn toolkit_spin_channels_merge() {
        let (elf, charge) = common::grids(true);
        let half = charge.with_data(charge.data.iter().map(|v| v / 2.).collect())
                         .unwrap();
        let toolkit = SpinBadElfToolkit::new(elf.clone(),
                                             elf,
                                             half.clone(),
                                             half,
                                             settings(Algorithm::BadElf, 2)).unwrap();
        let results = toolkit.run().unwrap();
        assert_eq!(results.up.nelectrides, 1);
        let merged = &results.merged;
        assert_eq!(merged.species, vec!["Na", "Cl", "E"]);
        assert_eq!(merged.nelectrides, 1);
        let total = merged.charges.iter().sum::<f64>() + merged.vacuum_charge;
        assert!((total - charge.total()).abs() < 1e-4);
        assert!((merged.charges[2] - results.up.values.charges[2] * 2.).abs() < 1e-9);
    }

    #[test]
    fn toolkit_voxel_map_repeatable() {
        let (first, _) = run(Algorithm::BadElf);
        let (second, _) = run(Algorithm::BadElf);
        let (labels, weights) = first.voxel_map.clone().into_inner();
        assert_eq!((labels, weights.clone()), second.voxel_map.into_inner());
        for row in weights.iter() {
            assert!((row.iter().sum::<f64>() - 1.).abs() < 1e-12);
        }
    }

    #[test]
    fn toolkit_covalent_bond() {
        let (elf, charge) = common::bonded_grids();
        let toolkit =
            BadElfToolkit::new(elf.clone(), charge.clone(), settings(Algorithm::BadElf, 2)).unwrap();
        match toolkit.run() {
            Err(BadElfError::CovalencyDetected { site, neighbor }) => {
                assert_eq!((site, neighbor), (0, 1))
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("expected the Na-Cl bond to be flagged"),
        }
        let mut settings = settings(Algorithm::BadElf, 2);
        settings.check_covalency = false;
        assert!(BadElfToolkit::new(elf, charge, settings).unwrap().run().is_ok());
    }
}
