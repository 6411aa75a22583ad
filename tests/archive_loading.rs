use anyhow::Result;
use map_adapt::archive::{load_archive, load_centroids, load_map, ArchiveLayout};
use map_adapt::evaluator::{EvalOutcome, Evaluator, TableEvaluator};
use map_adapt::ArchiveError;
use std::fs;

const CENTROIDS: &str = "\
0.125 0.125
0.375 0.125
0.125 0.375
0.375 0.375
";

// d = 2, k = 3
const ARCHIVE: &str = "\
# fitness  desc(2)  reserved(2)  controller(3)
0.8125 0.1 0.2 0 0 0.5 -0.25 1e-3
1.5 0.3 0.15 0 0 -1 2 3
-0.5 0.33 0.41 0 0 0.125 0.25 0.375
";

#[test]
fn loads_shapes_from_disk() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("archive.dat"), ARCHIVE)?;
    fs::write(tmp.path().join("centroids.dat"), CENTROIDS)?;

    let (archive, centroids) = load_map(
        &tmp.path().join("archive.dat"),
        &tmp.path().join("centroids.dat"),
        3,
    )?;
    assert_eq!(centroids.len(), 4);
    assert_eq!(centroids.dim(), 2);
    assert_eq!(archive.len(), 3);
    assert!(archive.descriptors.iter().all(|d| d.len() == 2));
    assert!(archive.controllers.iter().all(|c| c.len() == 3));
    assert_eq!(archive.fitness, vec![0.8125, 1.5, -0.5]);
    assert_eq!(archive.controllers[0], vec![0.5, -0.25, 0.001]);
    assert_eq!(archive.max_fitness(), Some(1.5));
    Ok(())
}

#[test]
fn reloading_is_bit_identical() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("archive.dat");
    fs::write(&path, ARCHIVE)?;

    let first = load_archive(&path, ArchiveLayout::new(2, 3))?;
    let second = load_archive(&path, ArchiveLayout::new(2, 3))?;
    let bits = |values: &[f64]| values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&first.fitness), bits(&second.fitness));
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn malformed_files_report_format_errors() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("archive.dat");

    fs::write(&path, "1.0 0.1 0.2 0 0 1 2 3\n2.0 0.1 0.2 0 0 1 2\n")?;
    assert!(matches!(
        load_archive(&path, ArchiveLayout::new(2, 3)),
        Err(ArchiveError::RaggedRow { line: 2, .. })
    ));

    fs::write(&path, "1.0 0.1 0.2 0 0 1 2 nan?\n")?;
    assert!(matches!(
        load_archive(&path, ArchiveLayout::new(2, 3)),
        Err(ArchiveError::InvalidNumber { line: 1, column: 8, .. })
    ));

    assert!(matches!(
        load_archive(&tmp.path().join("missing.dat"), ArchiveLayout::new(2, 3)),
        Err(ArchiveError::Io { .. })
    ));
    Ok(())
}

#[test]
fn centroid_dimension_drives_archive_layout() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("archive.dat"), ARCHIVE)?;
    // Three-dimensional centroids make the 8-column archive too narrow.
    fs::write(tmp.path().join("centroids.dat"), "0.1 0.2 0.3\n")?;

    let err = load_map(
        &tmp.path().join("archive.dat"),
        &tmp.path().join("centroids.dat"),
        3,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::ColumnMismatch {
            expected: 10,
            found: 8,
            descriptor_dim: 3,
            controller_dim: 3
        }
    ));

    let centroids = load_centroids(&tmp.path().join("centroids.dat"))?;
    assert_eq!(centroids.dim(), 3);
    Ok(())
}

#[test]
fn corrected_map_round_trips_through_disk() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("archive.dat"), ARCHIVE)?;
    let archive = load_archive(&tmp.path().join("archive.dat"), ArchiveLayout::new(2, 3))?;

    let mut corrected = map_adapt::archive::CorrectedMap::from_archive(&archive);
    corrected.fitness[0] = 1.0 / 3.0;
    let out = tmp.path().join("nested/dir/corrected.dat");
    corrected.write(&out)?;

    let reread = load_archive(&out, ArchiveLayout::without_reserved(2, 3))?;
    assert_eq!(reread.fitness, corrected.fitness);
    assert_eq!(reread.descriptors, archive.descriptors);
    assert_eq!(reread.controllers, archive.controllers);
    Ok(())
}

#[test]
fn truth_table_replays_recorded_outcomes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("truth.dat");
    fs::write(&path, ARCHIVE)?;

    let mut truth = TableEvaluator::load(&path, ArchiveLayout::new(2, 3))?;
    assert_eq!(truth.len(), 3);
    assert_eq!(
        truth.evaluate(&[-1.0, 2.0, 3.0]),
        EvalOutcome::Completed {
            fitness: 1.5,
            descriptor: vec![0.3, 0.15]
        }
    );
    assert!(matches!(
        truth.evaluate(&[9.0, 9.0, 9.0]),
        EvalOutcome::Failed { .. }
    ));
    Ok(())
}
