use std::path::PathBuf;
use thiserror::Error;

/// A type to simplify the results of fallible library functions.
pub type Result<T> = std::result::Result<T, BadElfError>;

/// Errors raised by the analysis. The chemistry and geometry variants are
/// fatal for the analysis that raised them and are never retried.
#[derive(Error, Debug)]
pub enum BadElfError {
    /// An unknown or unusable setting was supplied.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Two grids used together do not share a shape or a lattice.
    #[error("Grids are not compatible: {0}")]
    GridMismatch(String),

    /// The ELF along a nearest neighbour bond looks covalent or metallic, which
    /// breaks the dividing plane assumption.
    #[error(
        "Covalent or metallic bonding detected between sites {site} and {neighbor}. \
The dividing plane method cannot partition this bond, use the zero-flux algorithm \
or disable the covalency check and accept degraded results."
    )]
    CovalencyDetected {
        /// Index of the site the bond was tested from.
        site: usize,
        /// Index of the neighbouring site.
        neighbor: usize,
    },

    /// The nearest neighbour of an atom is the same species as the atom.
    #[error(
        "The nearest neighbour of site {site} is site {neighbor}, which is also {species}. \
This usually indicates covalent bonding, disable the covalency check to continue anyway."
    )]
    SameSpeciesNeighbor {
        /// Index of the atom.
        site: usize,
        /// Index of its nearest neighbour.
        neighbor: usize,
        /// The shared species.
        species: String,
    },

    /// Some atoms never received a core or shell basin during labelling.
    #[error(
        "No core or shell ELF basin was found for atoms {missing:?}. The pseudopotentials \
likely lack core electrons, set ignore_low_pseudopotentials to continue anyway."
    )]
    InsufficientPseudopotential {
        /// Atoms without an assigned core or shell basin.
        missing: Vec<usize>,
    },

    /// No bounded polyhedron could be built around a site.
    #[error("Unable to close the partitioning polyhedron of site {site} using {neighbors} neighbours.")]
    PartitioningDegenerate {
        /// The site being partitioned.
        site: usize,
        /// The number of neighbours considered on the final attempt.
        neighbors: usize,
    },

    /// The boundary voxel search grew beyond half the shortest lattice vector.
    #[error(
        "Searched to a radius of {radius:.4} (limit {limit:.4}) and {unresolved} voxels \
still have no assigned neighbour. The partitioning is malformed."
    )]
    SearchExhausted {
        /// The radius reached.
        radius: f64,
        /// Half the shortest lattice vector.
        limit: f64,
        /// Voxels left without an owner.
        unresolved: usize,
    },

    /// A labelled structure does not list atoms, then electrides, then shared features.
    #[error("Labelled structure must be ordered atoms, electrides then shared features.")]
    UnorderedStructure,

    /// An I/O error with the path that caused it.
    #[error("I/O error at path '{}': {source}", .path.display())]
    Io {
        /// The path of the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file could be opened but not understood.
    #[error("Unable to parse '{}': {message}", .path.display())]
    Parse {
        /// The path of the file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A summary could not be serialised.
    #[error("Unable to serialise results: {0}")]
    Json(#[from] serde_json::Error),
}

impl BadElfError {
    /// Wraps an I/O error with the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(),
                   source }
    }

    /// Builds a parse error for the offending path.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse { path: path.into(),
                      message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_covalency() {
        let e = BadElfError::CovalencyDetected { site: 0, neighbor: 3 };
        assert!(format!("{}", e).contains("sites 0 and 3"))
    }

    #[test]
    fn errors_display_pseudopotential() {
        let e = BadElfError::InsufficientPseudopotential { missing: vec![1, 2] };
        assert!(format!("{}", e).contains("[1, 2]"))
    }
}
