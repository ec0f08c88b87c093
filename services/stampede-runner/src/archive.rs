//! Bundles a run's HTML report and CSV exports into one deflated zip archive.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_EXTENSION: &str = "zip";

/// Files that belong with `html_report`: the report itself plus every `.csv` in the
/// same directory whose name starts with the report's base name.
pub fn collect_artifacts(html_report: &Path) -> io::Result<Vec<PathBuf>> {
    let dir = html_report.parent().unwrap_or_else(|| Path::new("."));
    let base = base_name(html_report);

    let mut files = vec![html_report.to_path_buf()];
    let mut csvs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&base))
        })
        .collect();
    csvs.sort();
    files.extend(csvs);
    Ok(files)
}

/// Write `<dir>/<base>.zip` next to the report and return its path. Entries are
/// stored flat under their file names.
pub fn archive_report(html_report: &Path) -> io::Result<PathBuf> {
    let dir = html_report.parent().unwrap_or_else(|| Path::new("."));
    let archive_path = dir.join(format!("{}.{ARCHIVE_EXTENSION}", base_name(html_report)));
    let files = collect_artifacts(html_report)?;

    let mut writer = ZipWriter::new(File::create(&archive_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in &files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string_lossy().into_owned());
        debug!(file = %file.display(), "Adding to archive");
        writer.start_file(name, options).map_err(zip_error)?;
        io::copy(&mut File::open(file)?, &mut writer)?;
    }
    writer.finish().map_err(zip_error)?;

    info!(archive = %archive_path.display(), files = files.len(), "Report archived");
    Ok(archive_path)
}

fn zip_error(e: zip::result::ZipError) -> io::Error {
    match e {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_collects_matching_csvs_only() {
        let dir = TempDir::new().unwrap();
        let html = dir.path().join("crm_dev_20240501_100000.html");
        std::fs::write(&html, "<html/>").unwrap();
        std::fs::write(dir.path().join("crm_dev_20240501_100000_stats.csv"), "a").unwrap();
        std::fs::write(dir.path().join("crm_dev_20240501_100000_failures.csv"), "b").unwrap();
        std::fs::write(dir.path().join("crm_dev_20240430_090000_stats.csv"), "c").unwrap();

        let files = collect_artifacts(&html).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0], html);
        assert!(files[1..]
            .iter()
            .all(|f| f.to_string_lossy().contains("20240501_100000")));
    }

    #[test]
    fn test_archive_contents() {
        let dir = TempDir::new().unwrap();
        let html = dir.path().join("run.html");
        std::fs::write(&html, "<html/>").unwrap();
        std::fs::write(dir.path().join("run_stats.csv"), "Type,Name\n").unwrap();

        let archive = archive_report(&html).unwrap();
        assert_eq!(archive, dir.path().join("run.zip"));

        let mut reader = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut names: Vec<String> = reader.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["run.html", "run_stats.csv"]);

        let mut stats = reader.by_name("run_stats.csv").unwrap();
        assert_eq!(stats.compression(), CompressionMethod::Deflated);
        let mut content = String::new();
        stats.read_to_string(&mut content).unwrap();
        assert_eq!(content, "Type,Name\n");
    }

    #[test]
    fn test_archive_replaces_previous_one() {
        let dir = TempDir::new().unwrap();
        let html = dir.path().join("run.html");
        std::fs::write(&html, "<html/>").unwrap();
        std::fs::write(dir.path().join("run.zip"), "stale").unwrap();

        let archive = archive_report(&html).unwrap();
        let reader = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(reader.len(), 1);
    }
}
