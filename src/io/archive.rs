//! Zipped vector bundles (shapefiles with their sidecar files).
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};

/// Vector formats looked for inside an archive, in order of preference.
const VECTOR_EXTENSIONS: [&str; 4] = ["shp", "gpkg", "geojson", "json"];

/// Extract `archive` into `dir` and return the path of the vector file it
/// holds. Archives with several layers are rejected.
pub fn extract_vector(archive: &Path, dir: &Path) -> Result<PathBuf> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    debug!("Extracting {} entries of {:?}", zip.len(), archive);
    zip.extract(dir)?;
    find_vector(dir)
}

/// The single vector file below `dir`, searched recursively.
pub fn find_vector(dir: &Path) -> Result<PathBuf> {
    let mut found = Vec::new();
    collect_files(dir, &mut found)?;
    for extension in VECTOR_EXTENSIONS {
        let mut matches: Vec<_> = found
            .iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
            })
            .cloned()
            .collect();
        match matches.len() {
            0 => continue,
            1 => return Ok(matches.remove(0)),
            n => {
                matches.sort();
                return Err(Error::Processing(format!(
                    "{n} .{extension} layers in {dir:?}: {matches:?}"
                )));
            }
        }
    }
    Err(Error::NotFound(format!("no vector layer in {dir:?}")))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, names: &[&str]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for name in names {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"payload").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn finds_the_shapefile_in_a_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("01_rgi60_Alaska.zip");
        write_zip(
            &archive,
            &["01_rgi60_Alaska.dbf", "01_rgi60_Alaska.prj", "01_rgi60_Alaska.shp", "01_rgi60_Alaska.shx"],
        );
        let out = dir.path().join("extracted");
        let vector = extract_vector(&archive, &out).unwrap();
        assert_eq!(vector, out.join("01_rgi60_Alaska.shp"));
    }

    #[test]
    fn nested_and_ambiguous_layers() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_zip(&archive, &["data/a.geojson", "data/b.geojson"]);
        let out = dir.path().join("x");
        assert!(matches!(extract_vector(&archive, &out), Err(Error::Processing(_))));

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(find_vector(empty.path()), Err(Error::NotFound(_))));
    }
}
