mod common;

#[cfg(test)]
mod tests {
    use super::common;
    use badelf::io::vasp::Vasp;
    use badelf::io::{FileFormat, GridKind};
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("badelf_{}_{}", std::process::id(), name))
    }

    #[test]
    fn vasp_write_read_charge() {
        let (_, charge) = common::grids(true);
        let path = temp_path("CHGCAR");
        Vasp {}.write(&charge, GridKind::Charge, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let grids = Vasp {}.read(&path, GridKind::Charge).unwrap();
        fs::remove_file(&path).unwrap();
        // stored multiplied by the 216 cubic angstrom volume
        let first = text.lines().nth(12).unwrap().split_whitespace().next().unwrap();
        let stored = first.parse::<f64>().unwrap();
        assert!((stored / 216. - charge.data[0]).abs() < 1e-9 * charge.data[0]);
        assert_eq!(grids.len(), 1);
        let read = &grids[0];
        assert_eq!(read.shape(), [common::POINTS; 3]);
        assert_eq!(read.structure.len(), 2);
        assert_eq!(read.structure.sites[1].species, "Cl");
        assert_eq!(read.structure.sites[1].frac, [0.5, 0.5, 0.5]);
        for (a, b) in read.data.iter().zip(charge.data.iter()) {
            assert!((a - b).abs() <= 1e-9 * b.abs().max(1e-12));
        }
    }

    #[test]
    fn vasp_write_read_elf() {
        let (elf, _) = common::grids(true);
        let path = temp_path("ELFCAR");
        Vasp {}.write(&elf, GridKind::Elf, &path).unwrap();
        let grids = Vasp {}.read(&path, GridKind::Elf).unwrap();
        fs::remove_file(&path).unwrap();
        // the Na peak is unscaled
        assert!((grids[0].data[0] - elf.data[0]).abs() < 1e-9);
        assert!((grids[0].max() - elf.max()).abs() < 1e-9);
    }

    #[test]
    fn vasp_read_spin() {
        let (_, charge) = common::grids(true);
        let magnetization =
            charge.with_data(charge.data.iter().map(|v| v * 0.1).collect()).unwrap();
        let total_path = temp_path("CHGCAR_total");
        let mag_path = temp_path("CHGCAR_mag");
        let spin_path = temp_path("CHGCAR_spin");
        Vasp {}.write(&charge, GridKind::Charge, &total_path).unwrap();
        Vasp {}.write(&magnetization, GridKind::Charge, &mag_path).unwrap();
        let total = fs::read_to_string(&total_path).unwrap();
        let mag = fs::read_to_string(&mag_path).unwrap();
        let grid_line = format!("{:>5}{:>5}{:>5}\n", common::POINTS, common::POINTS, common::POINTS);
        let data = mag.split_once(&grid_line).unwrap().1;
        let contents = format!("{}augmentation occupancies   1   4\n  0.1 0.2 0.3 0.4\n{}{}",
                               total, grid_line, data);
        fs::write(&spin_path, contents).unwrap();
        let grids = Vasp {}.read(&spin_path, GridKind::Charge).unwrap();
        for path in [total_path, mag_path, spin_path] {
            fs::remove_file(path).unwrap();
        }
        assert_eq!(grids.len(), 2);
        let (up, down) = grids[0].split_spin(&grids[1]).unwrap();
        assert!((up.total() - 0.55 * charge.total()).abs() < 1e-6);
        assert!((down.total() - 0.45 * charge.total()).abs() < 1e-6);
    }

    #[test]
    fn vasp_read_missing() {
        let path = temp_path("missing");
        assert!(Vasp {}.read(&path, GridKind::Charge).is_err());
    }
}
