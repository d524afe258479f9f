use crate::errors::{BadElfError, Result};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;

/// The species and valence electron count of every potential in a POTCAR, in
/// file order.
pub fn read_valences(path: &Path) -> Result<Vec<(String, f64)>> {
    let text = fs::read_to_string(path).map_err(|e| BadElfError::io(path, e))?;
    parse_valences(&text).map_err(|message| BadElfError::parse(path, message))
}

/// Parses the TITEL and ZVAL entries of POTCAR text.
fn parse_valences(text: &str) -> std::result::Result<Vec<(String, f64)>, String> {
    let titel = Regex::new(r"TITEL\s*=\s*\S+\s+(\S+)").map_err(|e| e.to_string())?;
    let zval = Regex::new(r"ZVAL\s*=\s*([-+0-9.eE]+)").map_err(|e| e.to_string())?;
    let species = titel.captures_iter(text)
                       .map(|c| {
                           // Na_pv -> Na
                           c[1].split('_').next().unwrap_or(&c[1]).to_string()
                       })
                       .collect::<Vec<String>>();
    let valences = zval.captures_iter(text)
                       .map(|c| c[1].parse::<f64>().map_err(|e| e.to_string()))
                       .collect::<std::result::Result<Vec<f64>, String>>()?;
    if species.is_empty() {
        return Err(String::from("no potentials found"));
    }
    if species.len() != valences.len() {
        return Err(format!("found {} TITEL entries but {} ZVAL entries",
                           species.len(),
                           valences.len()));
    }
    Ok(species.into_iter().zip(valences).collect())
}

/// Valence electron count keyed by species.
pub fn valence_map(valences: &[(String, f64)]) -> FxHashMap<String, f64> {
    valences.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POTCAR: &str = "  PAW_PBE Na_pv 19Sep2006
 10.0000000000000
 parameters from PSCTR are:
   VRHFIN =Na: 2p3s
   TITEL  = PAW_PBE Na_pv 19Sep2006
   POMASS =   22.990; ZVAL   =    7.000    mass and valenz
 End of Dataset
  PAW_PBE Cl 06Sep2000
 7.00000000000000000
   TITEL  = PAW_PBE Cl 06Sep2000
   POMASS =   35.453; ZVAL   =    7.000    mass and valenz
 End of Dataset
";

    #[test]
    fn potcar_parse_valences() {
        let valences = parse_valences(POTCAR).unwrap();
        assert_eq!(valences,
                   vec![(String::from("Na"), 7.), (String::from("Cl"), 7.)]);
        let map = valence_map(&valences);
        assert_eq!(map.get("Cl"), Some(&7.));
    }

    #[test]
    fn potcar_parse_empty() {
        assert!(parse_valences("nothing here").is_err());
    }

    #[test]
    fn potcar_missing_file() {
        assert!(matches!(read_valences(Path::new("/no/such/POTCAR")),
                         Err(BadElfError::Io { .. })));
    }
}
