use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use crate::config::LinePolicy;
use crate::domain::{GenotypeCall, ProbabilityRecord, SnpId};
use crate::error::ResolverError;

/// Minimum number of whitespace-separated fields in a probability line.
pub const MIN_FIELDS: usize = 8;

/// Streams genotype-probability files and turns the requested SNPs into calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenotypeDecoder {
    policy: LinePolicy,
}

impl GenotypeDecoder {
    pub fn new(policy: LinePolicy) -> Self {
        Self { policy }
    }

    /// Decodes every regular file under `dir`, one task per file.
    ///
    /// Each task stops reading its file once every requested SNP has been seen
    /// by any task; files already being read by other tasks are not
    /// interrupted. When a SNP appears in several files, the file that sorts
    /// first by path wins.
    ///
    /// Every regular file is treated as a probability file. Under
    /// [`LinePolicy::Strict`] an archive that ships companion files (a
    /// `.sample` table, a README) fails on their first line; use
    /// [`LinePolicy::Skip`] for such archives.
    pub async fn decode(
        &self,
        dir: &Path,
        requested: &HashSet<SnpId>,
    ) -> Result<HashMap<SnpId, GenotypeCall>, ResolverError> {
        let files = list_files(dir).await?;
        tracing::debug!(files = files.len(), requested = requested.len(), "decoding genotype files");

        let requested = Arc::new(requested.clone());
        let resolved = Arc::new(Mutex::new(HashSet::new()));
        let mut tasks = JoinSet::new();
        for (index, path) in files.iter().cloned().enumerate() {
            let requested = Arc::clone(&requested);
            let resolved = Arc::clone(&resolved);
            let policy = self.policy;
            tasks.spawn(async move {
                decode_file(path, requested, resolved, policy)
                    .await
                    .map(|calls| (index, calls))
            });
        }

        let mut partials = vec![HashMap::new(); files.len()];
        while let Some(joined) = tasks.join_next().await {
            // Returning early drops the set, which aborts the remaining tasks.
            let (index, calls) =
                joined.map_err(|err| ResolverError::TaskFailed(err.to_string()))??;
            partials[index] = calls;
        }

        let mut merged = HashMap::new();
        for calls in partials {
            for (snp, call) in calls {
                merged.entry(snp).or_insert(call);
            }
        }
        Ok(merged)
    }
}

async fn decode_file(
    path: PathBuf,
    requested: Arc<HashSet<SnpId>>,
    resolved: Arc<Mutex<HashSet<SnpId>>>,
    policy: LinePolicy,
) -> Result<HashMap<SnpId, GenotypeCall>, ResolverError> {
    let file = File::open(&path)
        .await
        .map_err(|err| ResolverError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut calls = HashMap::new();
    let mut line_number = 0usize;

    loop {
        if resolved_count(&resolved) >= requested.len() {
            tracing::debug!(path = %path.display(), line_number, "all requested SNPs resolved, closing file");
            break;
        }
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|err| ResolverError::Filesystem(format!("read {}: {err}", path.display())))?;
        if read == 0 {
            break;
        }
        line_number += 1;

        let parsed = std::str::from_utf8(&buf)
            .map_err(|err| format!("line is not valid UTF-8: {err}"))
            .and_then(parse_line);
        let record = match parsed {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(reason) => match policy {
                LinePolicy::Strict => {
                    return Err(ResolverError::MalformedRecord {
                        path,
                        line: line_number,
                        reason,
                    });
                }
                LinePolicy::Skip => {
                    tracing::warn!(path = %path.display(), line_number, %reason, "skipping malformed line");
                    continue;
                }
            },
        };

        if requested.contains(&record.snp) {
            let call = record.call();
            lock(&resolved).insert(record.snp.clone());
            calls.insert(record.snp, call);
        }
    }
    Ok(calls)
}

/// Parses one probability line. Blank lines yield `None`.
///
/// Field layout: `_ snp _ allele1 allele2 p_hom1 p_het p_hom2 ...`.
pub fn parse_line(line: &str) -> Result<Option<ProbabilityRecord>, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.is_empty() {
        return Ok(None);
    }
    if fields.len() < MIN_FIELDS {
        return Err(format!(
            "expected at least {MIN_FIELDS} fields, found {}",
            fields.len()
        ));
    }
    let snp: SnpId = fields[1].parse().map_err(|err: ResolverError| err.to_string())?;
    let mut probabilities = [0.0; 3];
    for (slot, raw) in probabilities.iter_mut().zip(&fields[5..8]) {
        *slot = raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| format!("invalid probability {raw:?}"))?;
    }
    Ok(Some(ProbabilityRecord {
        snp,
        allele1: fields[3].to_string(),
        allele2: fields[4].to_string(),
        probabilities,
    }))
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ResolverError> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|err| ResolverError::Filesystem(format!("read {}: {err}", current.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ResolverError::Filesystem(err.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| ResolverError::Filesystem(err.to_string()))?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

fn resolved_count(resolved: &Mutex<HashSet<SnpId>>) -> usize {
    lock(resolved).len()
}

fn lock(resolved: &Mutex<HashSet<SnpId>>) -> std::sync::MutexGuard<'_, HashSet<SnpId>> {
    resolved
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
