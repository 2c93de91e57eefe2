use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::client::GenotypeApi;
use crate::domain::{DatasetId, FileDescriptor};
use crate::error::ResolverError;
use crate::temp::TempLedger;

/// Locates, downloads and unpacks a dataset's genotype archive. Every
/// directory it creates is registered with the run's ledger.
pub struct ArchiveRetriever<'a, C: GenotypeApi> {
    api: &'a C,
    ledger: &'a TempLedger,
    dataset: &'a DatasetId,
}

impl<'a, C: GenotypeApi> ArchiveRetriever<'a, C> {
    pub fn new(api: &'a C, ledger: &'a TempLedger, dataset: &'a DatasetId) -> Self {
        Self {
            api,
            ledger,
            dataset,
        }
    }

    pub async fn download(&self, url: &str) -> Result<PathBuf, ResolverError> {
        let handle = self.ledger.acquire()?;
        let destination = handle.path().join(download_file_name(
            self.dataset,
            chrono::Utc::now().timestamp_millis(),
            url,
        ));
        tracing::info!(url, destination = %destination.display(), "downloading archive");
        let start = std::time::Instant::now();
        self.api.download(url, &destination).await?;
        tracing::info!(
            latency_ms = start.elapsed().as_millis() as u64,
            "archive downloaded"
        );
        Ok(destination)
    }

    pub async fn extract(&self, archive: &Path) -> Result<PathBuf, ResolverError> {
        let handle = self.ledger.acquire()?;
        let target = handle.path().to_path_buf();
        let source = archive.to_path_buf();
        let dir = target.clone();
        tokio::task::spawn_blocking(move || extract_zip(&source, &dir))
            .await
            .map_err(|err| ResolverError::TaskFailed(err.to_string()))??;
        tracing::info!(target = %target.display(), "archive extracted");
        Ok(target)
    }
}

/// URL of the first descriptor whose basename, without query string or
/// fragment, ends with `suffix`.
pub fn locate_archive(descriptors: &[FileDescriptor], suffix: &str) -> Result<String, ResolverError> {
    descriptors
        .iter()
        .find(|descriptor| basename(&descriptor.id).ends_with(suffix))
        .map(|descriptor| descriptor.id.clone())
        .ok_or_else(|| ResolverError::ArchiveNotFound {
            suffix: suffix.to_string(),
        })
}

fn basename(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    path.rsplit('/').next().unwrap_or(path)
}

fn download_file_name(dataset: &DatasetId, timestamp_millis: i64, url: &str) -> String {
    let extension = Path::new(basename(url))
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    format!("{}-{timestamp_millis}{extension}", dataset.as_str())
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), ResolverError> {
    let extraction = |message: String| ResolverError::Extraction {
        path: zip_path.to_path_buf(),
        message,
    };
    let file = fs::File::open(zip_path).map_err(|err| extraction(format!("open: {err}")))?;
    let mut archive = ZipArchive::new(file).map_err(|err| extraction(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| extraction(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(extraction(format!(
                    "entry {:?} escapes the target directory",
                    entry.name()
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| ResolverError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| ResolverError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| ResolverError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| extraction(err.to_string()))?;
    }
    Ok(())
}
