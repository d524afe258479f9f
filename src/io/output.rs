use crate::atoms::Structure;
use crate::errors::{BadElfError, Result};
use crate::spin::MergedSpin;
use crate::toolkit::BadElfResults;
use prettytable::{format, row, Row, Table};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// The per site columns of a partitions file.
pub struct SiteColumns<'a> {
    pub structure: &'a Structure,
    pub charges: &'a [f64],
    pub volumes: &'a [f64],
    pub min_surface_distance: &'a [f64],
    pub avg_surface_distance: &'a [f64],
    pub oxidation_states: Option<&'a [f64]>,
}

/// The totals printed beneath the table.
pub struct Footer {
    pub vacuum_charge: f64,
    pub vacuum_volume: f64,
    pub partitioned_charge: f64,
    pub nelectrides: usize,
    pub dimensionality: Option<usize>,
}

/// Creates a format for the output tables.
pub fn table_format() -> format::TableFormat {
    let line_position =
        &[format::LinePosition::Title, format::LinePosition::Bottom];
    let line_separator = format::LineSeparator::new('-', '+', '+', '+');
    format::FormatBuilder::new().column_separator('|')
                                .separators(line_position, line_separator)
                                .padding(1, 1)
                                .build()
}

/// Headers of the partitions table.
pub fn site_titles() -> Row {
    row![c => "#", "Species", "X", "Y", "Z", "Charge", "Volume", "Min. Dist.", "Avg. Dist.", "Ox."]
}

/// Builds the table of every site followed by the footer.
pub fn partitions_file(columns: SiteColumns, footer: Footer) -> String {
    let mut table = Table::new();
    table.set_format(table_format());
    table.set_titles(site_titles());
    for (i, site) in columns.structure.sites.iter().enumerate() {
        let [x, y, z] = site.frac;
        let ox = match columns.oxidation_states {
            Some(ox) => format!("{:.4}", ox[i]),
            None => String::from("-"),
        };
        table.add_row(row![r => i + 1,
                           site.species,
                           format!("{:.6}", x),
                           format!("{:.6}", y),
                           format!("{:.6}", z),
                           format!("{:.6}", columns.charges[i]),
                           format!("{:.6}", columns.volumes[i]),
                           format!("{:.6}", columns.min_surface_distance[i]),
                           format!("{:.6}", columns.avg_surface_distance[i]),
                           ox]);
    }
    let mut file = table.to_string();
    file.push_str(&self::footer(&footer));
    file
}

/// Produces the footer for the partitions file.
pub fn footer(footer: &Footer) -> String {
    let dimensionality = match footer.dimensionality {
        Some(d) => format!("{}D", d),
        None => String::from("-"),
    };
    format!(
        "  Vacuum Charge: {:>18.4}\n  Vacuum Volume: {:>18.4}\n  Partitioned Charge: {:>13.4}\n  Electrides: {:>21}\n  Dimensionality: {:>17}\n",
        footer.vacuum_charge,
        footer.vacuum_volume,
        footer.partitioned_charge,
        footer.nelectrides,
        dimensionality
    )
}

/// The partitions file of a single analysis.
pub fn results_file(results: &BadElfResults) -> String {
    let columns = SiteColumns { structure: &results.electride_structure,
                                charges: &results.values.charges,
                                volumes: &results.values.volumes,
                                min_surface_distance: &results.min_surface_distance,
                                avg_surface_distance: &results.avg_surface_distance,
                                oxidation_states: results.oxidation_states.as_deref() };
    let footer = Footer { vacuum_charge: results.values.vacuum_charge,
                          vacuum_volume: results.values.vacuum_volume,
                          partitioned_charge: results.values.charges.iter().sum(),
                          nelectrides: results.nelectrides,
                          dimensionality: results.dimensionality
                                                 .as_ref()
                                                 .map(|d| d.dimensionality) };
    partitions_file(columns, footer)
}

/// The partitions file of the merged spin channels.
pub fn merged_file(merged: &MergedSpin) -> String {
    let columns = SiteColumns { structure: &merged.structure,
                                charges: &merged.charges,
                                volumes: &merged.volumes,
                                min_surface_distance: &merged.min_surface_distance,
                                avg_surface_distance: &merged.avg_surface_distance,
                                oxidation_states: merged.oxidation_states.as_deref() };
    let footer = Footer { vacuum_charge: merged.vacuum_charge,
                          vacuum_volume: merged.vacuum_volume,
                          partitioned_charge: merged.charges.iter().sum(),
                          nelectrides: merged.nelectrides,
                          dimensionality: None };
    partitions_file(columns, footer)
}

/// Write a file.
pub fn write(contents: String, path: &Path) -> Result<()> {
    let mut file = File::create(path).map_err(|e| BadElfError::io(path, e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| BadElfError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;

    #[test]
    fn output_partitions_file() {
        let lattice =
            Lattice::new([[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]]).unwrap();
        let mut structure = Structure::new(lattice, vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("E", [0.5, 0.5, 0.5]);
        let columns = SiteColumns { structure: &structure,
                                    charges: &[6.2, 1.1],
                                    volumes: &[20., 44.],
                                    min_surface_distance: &[1.2, 1.5],
                                    avg_surface_distance: &[1.6, 1.9],
                                    oxidation_states: None };
        let footer = Footer { vacuum_charge: 0.,
                              vacuum_volume: 0.,
                              partitioned_charge: 7.3,
                              nelectrides: 1,
                              dimensionality: Some(0) };
        let file = partitions_file(columns, footer);
        assert!(file.contains("Species"));
        assert!(file.contains("6.200000"));
        assert!(file.contains("0D"));
        assert!(file.contains("Partitioned Charge:        7.3000"));
    }
}
