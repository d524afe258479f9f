/// Returns (covalent radius in angstroms, Pauling electronegativity).
/// Radii are the Cordero covalent radii. Noble gases without a Pauling value
/// report 0.
fn properties(element: &str) -> Option<(f64, f64)> {
    let p = match element {
        // --- Period 1 ---
        "H"  => (0.31, 2.20), "He" => (0.28, 0.00),
        // --- Period 2 ---
        "Li" => (1.28, 0.98), "Be" => (0.96, 1.57), "B"  => (0.84, 2.04),
        "C"  => (0.76, 2.55), "N"  => (0.71, 3.04), "O"  => (0.66, 3.44),
        "F"  => (0.57, 3.98), "Ne" => (0.58, 0.00),
        // --- Period 3 ---
        "Na" => (1.66, 0.93), "Mg" => (1.41, 1.31), "Al" => (1.21, 1.61),
        "Si" => (1.11, 1.90), "P"  => (1.07, 2.19), "S"  => (1.05, 2.58),
        "Cl" => (1.02, 3.16), "Ar" => (1.06, 0.00),
        // --- Period 4 ---
        "K"  => (2.03, 0.82), "Ca" => (1.76, 1.00), "Sc" => (1.70, 1.36),
        "Ti" => (1.60, 1.54), "V"  => (1.53, 1.63), "Cr" => (1.39, 1.66),
        "Mn" => (1.39, 1.55), "Fe" => (1.32, 1.83), "Co" => (1.26, 1.88),
        "Ni" => (1.24, 1.91), "Cu" => (1.32, 1.90), "Zn" => (1.22, 1.65),
        "Ga" => (1.22, 1.81), "Ge" => (1.20, 2.01), "As" => (1.19, 2.18),
        "Se" => (1.20, 2.55), "Br" => (1.20, 2.96), "Kr" => (1.16, 3.00),
        // --- Period 5 ---
        "Rb" => (2.20, 0.82), "Sr" => (1.95, 0.95), "Y"  => (1.90, 1.22),
        "Zr" => (1.75, 1.33), "Nb" => (1.64, 1.60), "Mo" => (1.54, 2.16),
        "Tc" => (1.47, 1.90), "Ru" => (1.46, 2.20), "Rh" => (1.42, 2.28),
        "Pd" => (1.39, 2.20), "Ag" => (1.45, 1.93), "Cd" => (1.44, 1.69),
        "In" => (1.42, 1.78), "Sn" => (1.39, 1.96), "Sb" => (1.39, 2.05),
        "Te" => (1.38, 2.10), "I"  => (1.39, 2.66), "Xe" => (1.40, 2.60),
        // --- Period 6 ---
        "Cs" => (2.44, 0.79), "Ba" => (2.15, 0.89), "La" => (2.07, 1.10),
        "Ce" => (2.04, 1.12), "Pr" => (2.03, 1.13), "Nd" => (2.01, 1.14),
        "Pm" => (1.99, 1.13), "Sm" => (1.98, 1.17), "Eu" => (1.98, 1.20),
        "Gd" => (1.96, 1.20), "Tb" => (1.94, 1.10), "Dy" => (1.92, 1.22),
        "Ho" => (1.92, 1.23), "Er" => (1.89, 1.24), "Tm" => (1.90, 1.25),
        "Yb" => (1.87, 1.10), "Lu" => (1.87, 1.27), "Hf" => (1.75, 1.30),
        "Ta" => (1.70, 1.50), "W"  => (1.62, 2.36), "Re" => (1.51, 1.90),
        "Os" => (1.44, 2.20), "Ir" => (1.41, 2.20), "Pt" => (1.36, 2.28),
        "Au" => (1.36, 2.54), "Hg" => (1.32, 2.00), "Tl" => (1.45, 1.62),
        "Pb" => (1.46, 2.33), "Bi" => (1.48, 2.02), "Po" => (1.40, 2.00),
        "At" => (1.50, 2.20), "Rn" => (1.50, 2.20),
        // --- Period 7 (selected) ---
        "Fr" => (2.60, 0.70), "Ra" => (2.21, 0.90), "Ac" => (2.15, 1.10),
        "Th" => (2.06, 1.30), "Pa" => (2.00, 1.50), "U"  => (1.96, 1.38),
        "Np" => (1.90, 1.36), "Pu" => (1.87, 1.28),
        _ => return None,
    };
    Some(p)
}

/// Strips a spin suffix or any trailing charge/digits from a species label.
fn symbol(species: &str) -> &str {
    let trimmed = species.trim_end_matches(|c: char| {
                                              c.is_ascii_digit() || c == '+' || c == '-'
                                          });
    trimmed.strip_suffix("xu")
           .or_else(|| trimmed.strip_suffix("xd"))
           .unwrap_or(trimmed)
}

/// Covalent radius of an element, None for unknown symbols and dummy species.
pub fn covalent_radius(species: &str) -> Option<f64> {
    properties(symbol(species)).map(|p| p.0)
}

/// Pauling electronegativity of an element.
pub fn electronegativity(species: &str) -> Option<f64> {
    properties(symbol(species)).map(|p| p.1)
}
