use crate::errors::{BadElfError, Result};
use crate::utils;
use serde::Serialize;
use std::fmt;

/// Atoms within this factor of the nearest atom distance form a coordination
/// shell.
pub const COORDINATION_TOLERANCE: f64 = 1.1;

/// Lattice - structure for containing information on the cell
///
/// > a: f64 - length of the a-vector
/// > b: f64 - length of the b-vector
/// > c: f64 - length of the c-vector
/// > translations: [[i32; 3]; 27] - the periodic cell translations, identity first
/// > to_fractional: [[f64; 3]; 3] - transformation matrix for converting to fractional
/// >                                coordinates
/// > to_cartesian: [[f64; 3]; 3] - transformation matrix for converting to cartesian
/// >                               coordinates
/// > reduced: [[f64; 3]; 3] - the LLL reduced lattice used for minimum images
#[derive(Clone, Debug)]
pub struct Lattice {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub translations: [[i32; 3]; 27],
    pub to_fractional: [[f64; 3]; 3],
    pub to_cartesian: [[f64; 3]; 3],
    pub volume: f64,
    pub reduced: [[f64; 3]; 3],
    reduced_to_fractional: [[f64; 3]; 3],
    reduced_shifts: [[f64; 3]; 27],
}

impl Lattice {
    /// Initialises the structure. Builds all the fields of the lattice structure
    /// from a 2d vector in the form:
    ///
    /// > [
    /// >     [ax, ay, az],
    /// >     [bx, by, bz],
    /// >     [cx, cy, cz],
    /// >  ]
    pub fn new(lattice: [[f64; 3]; 3]) -> Result<Self> {
        let to_fractional = utils::invert_lattice(&lattice).ok_or_else(|| {
                                BadElfError::InvalidSetting(String::from("Lattice doesn't span 3D space"))
                            })?;
        let translations = Self::translations();
        let reduced = lll_lattice(lattice);
        let reduced_to_fractional = utils::invert_lattice(&reduced).ok_or_else(|| {
                                        BadElfError::InvalidSetting(String::from("Lattice doesn't span 3D space"))
                                    })?;
        let mut reduced_shifts = [[0f64; 3]; 27];
        for (shift, t) in reduced_shifts.iter_mut().zip(translations.iter()) {
            *shift = utils::dot([t[0] as f64, t[1] as f64, t[2] as f64],
                                reduced);
        }
        Ok(Self { a: utils::norm(lattice[0]),
                  b: utils::norm(lattice[1]),
                  c: utils::norm(lattice[2]),
                  translations,
                  to_fractional,
                  to_cartesian: lattice,
                  volume: utils::determinant(&lattice).abs(),
                  reduced,
                  reduced_to_fractional,
                  reduced_shifts })
    }

    /// The 27 translations of the unit cell with the identity first.
    fn translations() -> [[i32; 3]; 27] {
        let mut out = [[0i32; 3]; 27];
        let mut i = 1;
        for x in -1..=1 {
            for y in -1..=1 {
                for z in -1..=1 {
                    if x == 0 && y == 0 && z == 0 {
                        continue;
                    }
                    out[i] = [x, y, z];
                    i += 1;
                }
            }
        }
        out
    }

    /// fractional to cartesian
    pub fn to_cartesian(&self, frac: [f64; 3]) -> [f64; 3] {
        utils::dot(frac, self.to_cartesian)
    }

    /// cartesian to fractional
    pub fn to_fractional(&self, cart: [f64; 3]) -> [f64; 3] {
        utils::dot(cart, self.to_fractional)
    }

    /// The shortest cartesian vector equivalent to a fractional displacement.
    pub fn minimum_image(&self, frac_diff: [f64; 3]) -> [f64; 3] {
        let cart = self.to_cartesian(frac_diff);
        let mut reduced_frac = utils::dot(cart, self.reduced_to_fractional);
        for f in &mut reduced_frac {
            *f -= f.round();
        }
        let base = utils::dot(reduced_frac, self.reduced);
        let mut best = base;
        let mut best_distance = utils::norm(base);
        for shift in self.reduced_shifts.iter().skip(1) {
            let v = utils::add(base, *shift);
            let d = utils::norm(v);
            if d < best_distance {
                best_distance = d;
                best = v;
            }
        }
        best
    }

    /// Minimum image distance between two fractional positions.
    pub fn distance(&self, a: [f64; 3], b: [f64; 3]) -> f64 {
        utils::norm(self.minimum_image(utils::sub(b, a)))
    }

    /// Spacing between the lattice planes perpendicular to each axis.
    pub fn plane_spacing(&self) -> [f64; 3] {
        let l = self.to_cartesian;
        [self.volume / utils::norm(utils::cross(l[1], l[2])),
         self.volume / utils::norm(utils::cross(l[2], l[0])),
         self.volume / utils::norm(utils::cross(l[0], l[1]))]
    }

    /// Whether two lattices describe the same cell.
    pub fn approx_eq(&self, other: &Lattice, tolerance: f64) -> bool {
        self.to_cartesian
            .iter()
            .zip(other.to_cartesian.iter())
            .all(|(a, b)| a.iter().zip(b).all(|(x, y)| (x - y).abs() < tolerance))
    }
}

/// Lenstra-Lenstra-Lovasz reduction of the lattice vectors.
fn lll_lattice(lattice: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let delta = 0.75;
    let mut a = lattice;
    let (mut b, mut mu) = gram_schmidt(&a);
    let mut i = 1usize;
    while i <= 2 {
        for j in (0..i).rev() {
            match mu[i][j] {
                q if q.abs() <= 0.5 => (),
                q => {
                    for k in 0..3 {
                        a[i][k] -= q.round() * a[j][k];
                    }
                    let (b_temp, mu_temp) = gram_schmidt(&a);
                    b = b_temp;
                    mu = mu_temp;
                }
            }
        }
        if utils::vdot(b[i], b[i])
           >= (delta - mu[i][i - 1].powi(2)) * utils::vdot(b[i - 1], b[i - 1])
        {
            i += 1;
        } else {
            a.swap(i, i - 1);
            let (b_temp, mu_temp) = gram_schmidt(&a);
            b = b_temp;
            mu = mu_temp;
            i = 1usize.max(i - 1);
        }
    }
    a
}

fn gram_schmidt(v: &[[f64; 3]; 3]) -> ([[f64; 3]; 3], [[f64; 3]; 3]) {
    let mut u = [[0f64; 3]; 3];
    let mut mu = [[0f64; 3]; 3];
    u[0] = v[0];
    mu[1][0] = utils::vdot(v[1], u[0]) / utils::vdot(u[0], u[0]);
    for i in 0..3 {
        u[1][i] = v[1][i] - (mu[1][0] * u[0][i]);
    }
    mu[2][0] = utils::vdot(v[2], u[0]) / utils::vdot(u[0], u[0]);
    mu[2][1] = utils::vdot(v[2], u[1]) / utils::vdot(u[1], u[1]);
    for i in 0..3 {
        u[2][i] = v[2][i] - (mu[2][0] * u[0][i]) - (mu[2][1] * u[1][i]);
    }
    (u, mu)
}

/// What a site in a structure represents.
///
/// Everything except `Atom` is a dummy site placed on an ELF feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SiteKind {
    Atom,
    /// A bare electron that passes every electride threshold, "E".
    Electride,
    /// A bare electron that fails at least one threshold, "Le".
    BareElectron,
    /// "Z"
    Covalent,
    /// "M"
    Metallic,
    /// "Lp"
    LonePair,
}

impl SiteKind {
    /// Classifies a species symbol, ignoring any spin suffix.
    pub fn from_species(species: &str) -> Self {
        let stripped = species.strip_suffix("xu")
                              .or_else(|| species.strip_suffix("xd"))
                              .unwrap_or(species);
        match stripped {
            "E" => Self::Electride,
            "Le" => Self::BareElectron,
            "Z" => Self::Covalent,
            "M" => Self::Metallic,
            "Lp" => Self::LonePair,
            _ => Self::Atom,
        }
    }

    /// The dummy symbol used for this kind.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Self::Atom => None,
            Self::Electride => Some("E"),
            Self::BareElectron => Some("Le"),
            Self::Covalent => Some("Z"),
            Self::Metallic => Some("M"),
            Self::LonePair => Some("Lp"),
        }
    }

    /// Features whose charge is divided between neighbouring atoms.
    pub fn is_shared(&self) -> bool {
        matches!(self,
                 Self::BareElectron
                 | Self::Covalent
                 | Self::Metallic
                 | Self::LonePair)
    }

    /// The position of the kind in an ordered labelled structure.
    fn order(&self) -> usize {
        match self {
            Self::Atom => 0,
            Self::Electride => 1,
            _ => 2,
        }
    }
}

/// A single site of a structure.
#[derive(Clone, Debug)]
pub struct Site {
    pub species: String,
    pub kind: SiteKind,
    /// fractional coordinates in [0, 1)
    pub frac: [f64; 3],
}

impl Site {
    pub fn new(species: &str, frac: [f64; 3]) -> Self {
        Self { species: species.to_string(),
               kind: SiteKind::from_species(species),
               frac: wrap_frac(frac) }
    }
}

/// A periodic image of a site near some point.
#[derive(Clone, Copy, Debug)]
pub struct Neighbor {
    /// index of the site in the structure
    pub index: usize,
    /// the cell the image lives in
    pub image: [i32; 3],
    /// fractional position of the image, not wrapped
    pub frac: [f64; 3],
    pub distance: f64,
}

/// Lattice and ordered sites.
#[derive(Clone, Debug)]
pub struct Structure {
    pub lattice: Lattice,
    pub sites: Vec<Site>,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Appends a site, wrapping it into the unit cell.
    pub fn push(&mut self, species: &str, frac: [f64; 3]) {
        self.sites.push(Site::new(species, frac));
    }

    pub fn cartesian(&self, i: usize) -> [f64; 3] {
        self.lattice.to_cartesian(self.sites[i].frac)
    }

    /// Minimum image distance between two sites.
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.lattice.distance(self.sites[i].frac, self.sites[j].frac)
    }

    /// Indices of the sites that are real atoms.
    pub fn atom_indices(&self) -> Vec<usize> {
        self.sites
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SiteKind::Atom)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn num_atoms(&self) -> usize {
        self.sites.iter().filter(|s| s.kind == SiteKind::Atom).count()
    }

    pub fn num_electrides(&self) -> usize {
        self.sites
            .iter()
            .filter(|s| s.kind == SiteKind::Electride)
            .count()
    }

    /// Every periodic image of the sites passing `filter` that lies within
    /// `radius` of `point`, sorted by distance.
    pub fn images_within<F>(&self,
                            point: [f64; 3],
                            radius: f64,
                            filter: F)
                            -> Vec<Neighbor>
        where F: Fn(usize, &Site) -> bool
    {
        let spacing = self.lattice.plane_spacing();
        let range = [(radius / spacing[0]).ceil() as i32 + 1,
                     (radius / spacing[1]).ceil() as i32 + 1,
                     (radius / spacing[2]).ceil() as i32 + 1];
        let base = [point[0].floor() as i32,
                    point[1].floor() as i32,
                    point[2].floor() as i32];
        let mut out = Vec::new();
        for (index, site) in self.sites.iter().enumerate() {
            if !filter(index, site) {
                continue;
            }
            for x in -range[0]..=range[0] {
                for y in -range[1]..=range[1] {
                    for z in -range[2]..=range[2] {
                        let image = [base[0] + x, base[1] + y, base[2] + z];
                        let frac = [site.frac[0] + image[0] as f64,
                                    site.frac[1] + image[1] as f64,
                                    site.frac[2] + image[2] as f64];
                        let distance =
                            utils::norm(self.lattice
                                            .to_cartesian(utils::sub(frac,
                                                                     point)));
                        if distance <= radius {
                            out.push(Neighbor { index,
                                                image,
                                                frac,
                                                distance });
                        }
                    }
                }
            }
        }
        out.sort_by(|a, b| {
               a.distance
                .total_cmp(&b.distance)
                .then(a.index.cmp(&b.index))
                .then(a.image.cmp(&b.image))
           });
        out
    }

    /// The `n` nearest periodic images to `point` of the sites passing
    /// `filter`, ignoring anything closer than 1e-8.
    pub fn nearest_images<F>(&self,
                             point: [f64; 3],
                             n: usize,
                             filter: F)
                             -> Vec<Neighbor>
        where F: Fn(usize, &Site) -> bool
    {
        let count = self.sites
                        .iter()
                        .enumerate()
                        .filter(|(i, s)| filter(*i, s))
                        .count();
        if count == 0 || n == 0 {
            return vec![];
        }
        let mut radius = self.lattice
                             .plane_spacing()
                             .iter()
                             .fold(f64::INFINITY, |a, b| a.min(*b));
        loop {
            let mut images = self.images_within(point, radius, &filter);
            images.retain(|nb| nb.distance > 1e-8);
            if images.len() >= n {
                images.truncate(n);
                return images;
            }
            radius *= 1.5;
        }
    }

    /// The `n` nearest neighbours of site `i` among the sites passing `filter`.
    pub fn neighbors<F>(&self, i: usize, n: usize, filter: F) -> Vec<Neighbor>
        where F: Fn(usize, &Site) -> bool
    {
        self.nearest_images(self.sites[i].frac, n, filter)
    }

    /// The atoms coordinating a point: every atom image within `tolerance`
    /// times the nearest atom distance.
    pub fn coordination_at(&self,
                           point: [f64; 3],
                           tolerance: f64)
                           -> Vec<Neighbor> {
        let nearest =
            self.nearest_images(point, 1, |_, s| s.kind == SiteKind::Atom);
        match nearest.first() {
            Some(nb) => {
                let mut shell =
                    self.images_within(point,
                                       nb.distance * tolerance + 1e-8,
                                       |_, s| s.kind == SiteKind::Atom);
                shell.retain(|nb| nb.distance > 1e-8);
                shell
            }
            None => vec![],
        }
    }

    /// The coordination shell of site `i` among the atoms.
    pub fn coordination(&self, i: usize, tolerance: f64) -> Vec<Neighbor> {
        self.coordination_at(self.sites[i].frac, tolerance)
    }

    /// The nearest atom to a fractional position and its distance.
    pub fn nearest_atom(&self, frac: [f64; 3]) -> Option<(usize, f64)> {
        self.sites
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SiteKind::Atom)
            .map(|(i, s)| (i, self.lattice.distance(frac, s.frac)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Atoms first, then electrides, then shared features.
    pub fn is_ordered(&self) -> bool {
        self.sites
            .windows(2)
            .all(|w| w[0].kind.order() <= w[1].kind.order())
    }

    /// Copy keeping only the sites passing `filter`.
    pub fn filtered<F>(&self, filter: F) -> Structure
        where F: Fn(&Site) -> bool
    {
        Structure { lattice: self.lattice.clone(),
                    sites: self.sites
                               .iter()
                               .filter(|s| filter(s))
                               .cloned()
                               .collect() }
    }

    pub fn atoms_only(&self) -> Structure {
        self.filtered(|s| s.kind == SiteKind::Atom)
    }

    /// Atoms followed by the electride sites.
    pub fn electride_augmented(&self) -> Structure {
        self.filtered(|s| {
                matches!(s.kind, SiteKind::Atom | SiteKind::Electride)
            })
    }

    /// Species and counts of consecutive runs of the same species.
    pub fn species_groups(&self) -> Vec<(String, usize)> {
        let mut groups: Vec<(String, usize)> = vec![];
        for site in self.sites.iter() {
            match groups.last_mut() {
                Some((species, count)) if *species == site.species => {
                    *count += 1
                }
                _ => groups.push((site.species.clone(), 1)),
            }
        }
        groups
    }
}

impl fmt::Display for Structure {
    /// The structure as a POSCAR.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = self.species_groups();
        let title = groups.iter()
                          .map(|(s, n)| format!("{}{}", s, n))
                          .collect::<Vec<String>>()
                          .join(" ");
        writeln!(f, "{}", title)?;
        writeln!(f, "   1.00000000000000")?;
        for v in self.lattice.to_cartesian.iter() {
            writeln!(f, " {:>12.6} {:>12.6} {:>12.6}", v[0], v[1], v[2])?;
        }
        writeln!(f,
                 "{}",
                 groups.iter()
                       .map(|(s, _)| format!("{:>5}", s))
                       .collect::<String>())?;
        writeln!(f,
                 "{}",
                 groups.iter()
                       .map(|(_, n)| format!("{:>6}", n))
                       .collect::<String>())?;
        writeln!(f, "Direct")?;
        for site in self.sites.iter() {
            writeln!(f,
                     "  {:.6}  {:.6}  {:.6}",
                     site.frac[0], site.frac[1], site.frac[2])?;
        }
        Ok(())
    }
}

/// Wraps fractional coordinates into [0, 1).
pub fn wrap_frac(frac: [f64; 3]) -> [f64; 3] {
    let mut out = frac;
    for f in &mut out {
        *f = f.rem_euclid(1.);
        if *f >= 1. {
            *f = 0.;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(a: f64) -> Lattice {
        Lattice::new([[a, 0., 0.], [0., a, 0.], [0., 0., a]]).unwrap()
    }

    #[test]
    fn lattice_new() {
        let lattice = Lattice::new([[1., 0., 0.], [0., 2., 0.], [0., 0., 2.]]).unwrap();
        assert_eq!(lattice.volume, 4.);
        assert_eq!(lattice.translations[0], [0, 0, 0]);
        assert_eq!(lattice.translations[1], [-1, -1, -1]);
        assert_eq!(lattice.translations[26], [1, 1, 1]);
    }

    #[test]
    fn lattice_new_non_invert() {
        assert!(Lattice::new([[1., 0., 0.], [1., 0., 0.], [0., 0., 2.]]).is_err())
    }

    #[test]
    fn lattice_lll_lattice() {
        let lat = [[0., 1., 0.], [1., 0., 1.], [-1., 0., 2.]];
        assert_eq!(lat,
                   lll_lattice([[1., 1., 1.], [-1., 0., 2.], [3., 5., 6.]]));
    }

    #[test]
    fn lattice_distance_wraps() {
        let lattice = cubic(5.);
        let d = lattice.distance([0.05, 0., 0.], [0.95, 0., 0.]);
        assert!((d - 0.5).abs() < 1e-12)
    }

    #[test]
    fn lattice_distance_skewed() {
        let lattice =
            Lattice::new([[4., 0., 0.], [3.9, 1., 0.], [0., 0., 4.]]).unwrap();
        // a - b is a short vector of this cell
        let d = lattice.distance([0., 0., 0.], [1., -1., 0.]);
        assert!(d < 1e-10);
        let d = lattice.distance([0., 0., 0.], [0.5, -0.5, 0.]);
        assert!((d - 0.5 * (0.01f64 + 1.).sqrt()).abs() < 1e-10);
    }

    #[test]
    fn site_kind_from_species() {
        assert_eq!(SiteKind::from_species("E"), SiteKind::Electride);
        assert_eq!(SiteKind::from_species("Exu"), SiteKind::Electride);
        assert_eq!(SiteKind::from_species("Lpxd"), SiteKind::LonePair);
        assert_eq!(SiteKind::from_species("Na"), SiteKind::Atom);
        assert!(SiteKind::from_species("M").is_shared());
        assert!(!SiteKind::from_species("E").is_shared());
    }

    #[test]
    fn structure_neighbors() {
        let mut structure = Structure::new(cubic(3.), vec![]);
        structure.push("Na", [0., 0., 0.]);
        let nbs = structure.neighbors(0, 6, |_, _| true);
        assert_eq!(nbs.len(), 6);
        assert!(nbs.iter().all(|nb| (nb.distance - 3.).abs() < 1e-12));
        let nbs = structure.neighbors(0, 18, |_, _| true);
        assert!((nbs[17].distance - 18f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn structure_coordination() {
        let mut structure = Structure::new(cubic(4.), vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("Cl", [0.5, 0.5, 0.5]);
        // the body centre is surrounded by 8 Na images
        let shell = structure.coordination(1, 1.1);
        assert_eq!(shell.len(), 8);
        assert!(shell.iter().all(|nb| nb.index == 0));
    }

    #[test]
    fn structure_is_ordered() {
        let mut structure = Structure::new(cubic(4.), vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("E", [0.5, 0., 0.]);
        structure.push("Z", [0.5, 0.5, 0.]);
        assert!(structure.is_ordered());
        structure.push("Cl", [0.5, 0.5, 0.5]);
        assert!(!structure.is_ordered());
        assert_eq!(structure.electride_augmented().len(), 3);
        assert_eq!(structure.atoms_only().len(), 2);
    }

    #[test]
    fn structure_species_groups() {
        let mut structure = Structure::new(cubic(4.), vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("Na", [0.5, 0., 0.]);
        structure.push("Cl", [0.5, 0.5, 0.5]);
        assert_eq!(structure.species_groups(),
                   vec![(String::from("Na"), 2), (String::from("Cl"), 1)]);
    }

    #[test]
    fn structure_wraps_sites() {
        let mut structure = Structure::new(cubic(4.), vec![]);
        structure.push("Na", [-0.25, 1.5, 1.]);
        assert_eq!(structure.sites[0].frac, [0.75, 0.5, 0.]);
    }
}
