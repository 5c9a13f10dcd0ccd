//! Import from compressed and BOM-prefixed sources
//!
//! The same fixture written as plain-with-BOM, gzip and zstd must import to
//! the same rows.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use kpd::{ClassificationService, ConflictMode, ExpiryFilter, ImportOptions};

fn fixture_bytes() -> Vec<u8> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/kpd_sample.csv");
    std::fs::read(path).unwrap()
}

async fn import(path: &Path, options: &ImportOptions) -> (ClassificationService, kpd::ImportReport) {
    let service = ClassificationService::in_memory().unwrap();
    let report = service.load_from_file(path, options).await.unwrap();
    (service, report)
}

#[tokio::test]
async fn test_plain_with_bom() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kpd.csv");
    let mut bytes = b"\xEF\xBB\xBF".to_vec();
    bytes.extend(fixture_bytes());
    std::fs::write(&path, bytes).unwrap();

    let (service, report) = import(&path, &ImportOptions::default()).await;
    assert_eq!(report.processed, 12);
    assert_eq!(report.rejected(), 1);
    assert!(service.get_by_code("A").await.unwrap().is_some());
}

#[tokio::test]
async fn test_gzip_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kpd.csv.gz");
    let mut encoder = flate2::write::GzEncoder::new(
        File::create(&path).unwrap(),
        flate2::Compression::default(),
    );
    encoder.write_all(&fixture_bytes()).unwrap();
    encoder.finish().unwrap();

    let (service, report) = import(&path, &ImportOptions::default()).await;
    assert_eq!(report.processed, 12);
    assert_eq!(
        service.count(None, ExpiryFilter::IncludeExpired).await.unwrap(),
        12
    );
}

#[tokio::test]
async fn test_zstd_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kpd.csv.zst");
    let compressed = zstd::encode_all(&fixture_bytes()[..], 3).unwrap();
    std::fs::write(&path, compressed).unwrap();

    let (service, report) = import(&path, &ImportOptions::default()).await;
    assert_eq!(report.processed, 12);
    let wheat = service.get_by_code("01.11.1").await.unwrap().unwrap();
    assert_eq!(wheat.name_en, "Wheat");
}

#[tokio::test]
async fn test_semicolon_delimited_skip_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kpd.csv");
    std::fs::write(
        &path,
        "code;start;end;hr;hr_short;en;en_short;level;full\n\
         A;01.01.2025;;Poljoprivreda;P;Agriculture;A;1;A\n\
         A;01.01.2025;;Promijenjeno;P;Changed;C;1;A\n",
    )
    .unwrap();

    let options = ImportOptions {
        delimiter: b';',
        conflict_mode: ConflictMode::Skip,
        batch_size: 1,
        concurrency: 1,
        ..ImportOptions::default()
    };
    let (service, report) = import(&path, &options).await;
    assert_eq!(report.processed, 2);

    let entry = service.get_by_code("A").await.unwrap().unwrap();
    assert_eq!(entry.name_hr, "Poljoprivreda");
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let service = ClassificationService::in_memory().unwrap();
    let err = service
        .load_from_file("/nonexistent/kpd.csv", &ImportOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, kpd::KpdError::Io(_)));
    assert_eq!(err.http_status(), 500);
}
