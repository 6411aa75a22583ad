//! Archive and centroid loading.
//!
//! Archive rows are laid out as
//!
//! ```text
//! [fitness] [d descriptor cols] [d reserved cols] [k controller cols]
//! ```
//!
//! The reserved block is counted and dropped. Centroid rows are `d` columns
//! and only serve to fix `d`.

use crate::error::ArchiveError;
use crate::util::{format_row, parse_numeric_rows};
use std::fs;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub descriptor_dim: usize,
    pub controller_dim: usize,
    pub reserved_block: bool,
}

impl ArchiveLayout {
    pub fn new(descriptor_dim: usize, controller_dim: usize) -> Self {
        Self {
            descriptor_dim,
            controller_dim,
            reserved_block: true,
        }
    }

    /// Layout of an exported [`CorrectedMap`], which carries no reserved block.
    pub fn without_reserved(descriptor_dim: usize, controller_dim: usize) -> Self {
        Self {
            descriptor_dim,
            controller_dim,
            reserved_block: false,
        }
    }

    pub fn columns(&self) -> usize {
        1 + self.descriptor_dim + self.reserved_dim() + self.controller_dim
    }

    fn reserved_dim(&self) -> usize {
        if self.reserved_block {
            self.descriptor_dim
        } else {
            0
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Centroids {
    pub points: Vec<Vec<f64>>,
}

impl Centroids {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.points.first().map_or(0, Vec::len)
    }
}

/// Immutable offline archive. All three columns share length N.
#[derive(Clone, Debug, PartialEq)]
pub struct Archive {
    pub fitness: Vec<f64>,
    pub descriptors: Vec<Vec<f64>>,
    pub controllers: Vec<Vec<f64>>,
    pub layout: ArchiveLayout,
}

impl Archive {
    pub fn len(&self) -> usize {
        self.fitness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fitness.is_empty()
    }

    pub fn descriptor_dim(&self) -> usize {
        self.layout.descriptor_dim
    }

    pub fn controller_dim(&self) -> usize {
        self.layout.controller_dim
    }

    /// Best simulated fitness; `None` only for an empty archive.
    pub fn max_fitness(&self) -> Option<f64> {
        self.fitness.iter().copied().reduce(f64::max)
    }

    /// Checks the shared-length and per-row dimension invariants.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.is_empty() {
            return Err(ArchiveError::Empty { what: "archive" });
        }
        let n = self.len();
        if self.descriptors.len() != n || self.controllers.len() != n {
            return Err(ArchiveError::LengthMismatch {
                fitness: n,
                descriptors: self.descriptors.len(),
                controllers: self.controllers.len(),
            });
        }
        let rows = self.descriptors.iter().zip(&self.controllers);
        for (idx, (descriptor, controller)) in rows.enumerate() {
            if descriptor.len() != self.descriptor_dim() || controller.len() != self.controller_dim() {
                return Err(ArchiveError::RaggedRow {
                    line: idx + 1,
                    expected: self.layout.columns(),
                    found: 1 + descriptor.len() + self.layout.reserved_dim() + controller.len(),
                });
            }
            let controller_start = 2 + self.descriptor_dim() + self.layout.reserved_dim();
            let values = std::iter::once((1, self.fitness[idx]))
                .chain(descriptor.iter().enumerate().map(|(j, &v)| (2 + j, v)))
                .chain(
                    controller
                        .iter()
                        .enumerate()
                        .map(|(j, &v)| (controller_start + j, v)),
                );
            for (column, value) in values {
                if !value.is_finite() {
                    return Err(ArchiveError::NonFinite {
                        line: idx + 1,
                        column,
                        token: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fails unless the archive descriptors live in the centroid space.
    pub fn check_centroids(&self, centroids: &Centroids) -> Result<(), ArchiveError> {
        if centroids.dim() != self.descriptor_dim() {
            return Err(ArchiveError::DimensionMismatch {
                centroid_dim: centroids.dim(),
                descriptor_dim: self.descriptor_dim(),
            });
        }
        Ok(())
    }
}

pub fn parse_centroids(text: &str) -> Result<Centroids, ArchiveError> {
    let points = parse_numeric_rows(text)?;
    if points.is_empty() {
        return Err(ArchiveError::Empty { what: "centroid file" });
    }
    Ok(Centroids { points })
}

pub fn load_centroids(path: &Path) -> Result<Centroids, ArchiveError> {
    parse_centroids(&read_text(path)?)
}

pub fn parse_archive(text: &str, layout: ArchiveLayout) -> Result<Archive, ArchiveError> {
    let rows = parse_numeric_rows(text)?;
    if rows.is_empty() {
        return Err(ArchiveError::Empty { what: "archive" });
    }

    let expected = layout.columns();
    let found = rows[0].len();
    if found != expected {
        return Err(ArchiveError::ColumnMismatch {
            expected,
            found,
            descriptor_dim: layout.descriptor_dim,
            controller_dim: layout.controller_dim,
        });
    }

    let d = layout.descriptor_dim;
    let controller_start = 1 + d + layout.reserved_dim();

    let mut fitness = Vec::with_capacity(rows.len());
    let mut descriptors = Vec::with_capacity(rows.len());
    let mut controllers = Vec::with_capacity(rows.len());
    for row in rows {
        fitness.push(row[0]);
        descriptors.push(row[1..=d].to_vec());
        controllers.push(row[controller_start..].to_vec());
    }

    Ok(Archive {
        fitness,
        descriptors,
        controllers,
        layout,
    })
}

pub fn load_archive(path: &Path, layout: ArchiveLayout) -> Result<Archive, ArchiveError> {
    parse_archive(&read_text(path)?, layout)
}

/// Loads centroids first to derive `d`, then the archive against it.
pub fn load_map(
    archive_path: &Path,
    centroids_path: &Path,
    controller_dim: usize,
) -> Result<(Archive, Centroids), ArchiveError> {
    let centroids = load_centroids(centroids_path)?;
    let archive = load_archive(
        archive_path,
        ArchiveLayout::new(centroids.dim(), controller_dim),
    )?;
    archive.check_centroids(&centroids)?;
    Ok((archive, centroids))
}

fn read_text(path: &Path) -> Result<String, ArchiveError> {
    fs::read_to_string(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The archive with its fitness column replaced by corrected fitness.
///
/// Built once from the parsed archive and updated in place; the source file
/// is never re-read.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectedMap {
    pub fitness: Vec<f64>,
    pub descriptors: Vec<Vec<f64>>,
    pub controllers: Vec<Vec<f64>>,
}

impl CorrectedMap {
    pub fn from_archive(archive: &Archive) -> Self {
        Self {
            fitness: archive.fitness.clone(),
            descriptors: archive.descriptors.clone(),
            controllers: archive.controllers.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.fitness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fitness.is_empty()
    }

    /// Row `i` as `[fitness, descriptor.., controller..]`.
    pub fn row(&self, i: usize) -> Vec<f64> {
        let mut row = Vec::with_capacity(1 + self.descriptors[i].len() + self.controllers[i].len());
        row.push(self.fitness[i]);
        row.extend_from_slice(&self.descriptors[i]);
        row.extend_from_slice(&self.controllers[i]);
        row
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for i in 0..self.len() {
            out.push_str(&format_row(self.row(i)));
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<(), ArchiveError> {
        let io_err = |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_text()).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_D_ARCHIVE: &str = "\
5.0 0.1 0.2 9 9 1.0 2.0 3.0
3.0 0.3 0.4 9 9 4.0 5.0 6.0
";

    #[test]
    fn splits_columns_and_drops_reserved_block() {
        let archive = parse_archive(TWO_D_ARCHIVE, ArchiveLayout::new(2, 3)).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.fitness, vec![5.0, 3.0]);
        assert_eq!(archive.descriptors[1], vec![0.3, 0.4]);
        assert_eq!(archive.controllers[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(archive.max_fitness(), Some(5.0));
    }

    #[test]
    fn column_count_must_match_layout() {
        let err = parse_archive(TWO_D_ARCHIVE, ArchiveLayout::new(2, 4)).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::ColumnMismatch {
                expected: 9,
                found: 8,
                ..
            }
        ));
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(matches!(
            parse_archive("# nothing\n", ArchiveLayout::new(1, 1)),
            Err(ArchiveError::Empty { .. })
        ));
        assert!(matches!(
            parse_centroids("\n\n"),
            Err(ArchiveError::Empty { .. })
        ));
    }

    #[test]
    fn non_finite_entries_are_format_errors() {
        let err = parse_archive("5.0 0.1 NaN 9 9 1 2 3\n", ArchiveLayout::new(2, 3)).unwrap_err();
        assert!(matches!(err, ArchiveError::NonFinite { line: 1, column: 3, .. }));
        assert!(matches!(
            parse_centroids("0.1 0.2\ninf 0.3\n"),
            Err(ArchiveError::NonFinite { line: 2, column: 1, .. })
        ));

        let mut archive = parse_archive(TWO_D_ARCHIVE, ArchiveLayout::new(2, 3)).unwrap();
        archive.controllers[1][2] = f64::NEG_INFINITY;
        assert!(matches!(
            archive.validate(),
            Err(ArchiveError::NonFinite { line: 2, column: 8, .. })
        ));
    }

    #[test]
    fn centroid_dimension_is_checked() {
        let archive = parse_archive(TWO_D_ARCHIVE, ArchiveLayout::new(2, 3)).unwrap();
        let centroids = parse_centroids("0.1 0.2 0.3\n0.4 0.5 0.6\n").unwrap();
        assert_eq!(centroids.dim(), 3);
        assert!(matches!(
            archive.check_centroids(&centroids),
            Err(ArchiveError::DimensionMismatch {
                centroid_dim: 3,
                descriptor_dim: 2
            })
        ));
    }

    #[test]
    fn corrected_map_rows_omit_reserved_block() {
        let archive = parse_archive(TWO_D_ARCHIVE, ArchiveLayout::new(2, 3)).unwrap();
        let mut map = CorrectedMap::from_archive(&archive);
        map.fitness[1] = -1.5;
        assert_eq!(map.row(1), vec![-1.5, 0.3, 0.4, 4.0, 5.0, 6.0]);

        let reread = parse_archive(&map.to_text(), ArchiveLayout::without_reserved(2, 3)).unwrap();
        assert_eq!(reread.fitness, map.fitness);
        assert_eq!(reread.descriptors, archive.descriptors);
        assert_eq!(reread.controllers, archive.controllers);
    }
}
