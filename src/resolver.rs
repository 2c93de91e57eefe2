use std::collections::HashSet;

use crate::archive::{ArchiveRetriever, locate_archive};
use crate::batch;
use crate::client::GenotypeApi;
use crate::config::ResolverConfig;
use crate::decoder::GenotypeDecoder;
use crate::domain::{DatasetId, GenotypeRecord, ResolutionResult, SnpId};
use crate::error::ResolverError;
use crate::temp::TempLedger;

/// Entry point for both resolution strategies.
pub struct Resolver<C: GenotypeApi> {
    api: C,
    config: ResolverConfig,
}

impl<C: GenotypeApi> Resolver<C> {
    pub fn new(api: C, config: ResolverConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Queries the remote endpoint batch by batch. Each query waits for the
    /// previous response, and records come back in batch order.
    pub async fn resolve_via_remote_query(
        &self,
        token: &str,
        dataset: &DatasetId,
        ids: &[SnpId],
        quality: f64,
    ) -> Result<Vec<GenotypeRecord>, ResolverError> {
        let batches = batch::split(ids, self.config.max_query_length);
        tracing::info!(
            dataset = %dataset,
            ids = ids.len(),
            batches = batches.len(),
            "querying genotypes"
        );
        let mut records = Vec::new();
        for (index, batch) in batches.iter().enumerate() {
            let start = std::time::Instant::now();
            let mut batch_records = self
                .api
                .query_genotypes(token, dataset, batch, quality)
                .await?;
            tracing::debug!(
                batch = index,
                ids = batch.len(),
                records = batch_records.len(),
                latency_ms = start.elapsed().as_millis() as u64,
                "batch resolved"
            );
            records.append(&mut batch_records);
        }
        Ok(records)
    }

    /// Downloads the dataset's genotype archive and decodes the requested SNPs
    /// from it. Temporary files of this run are removed before returning,
    /// whether or not resolution succeeded.
    pub async fn resolve_via_archive(
        &self,
        token: &str,
        dataset: &DatasetId,
        ids: &[SnpId],
    ) -> Result<ResolutionResult, ResolverError> {
        let ledger = TempLedger::new(self.config.temp_root.clone());
        let outcome = self.run_archive_pipeline(&ledger, token, dataset, ids).await;
        let released = ledger.release_all();
        let result = outcome?;
        released?;
        Ok(result)
    }

    async fn run_archive_pipeline(
        &self,
        ledger: &TempLedger,
        token: &str,
        dataset: &DatasetId,
        ids: &[SnpId],
    ) -> Result<ResolutionResult, ResolverError> {
        tracing::info!(dataset = %dataset, ids = ids.len(), "phase=Resolve; listing dataset files");
        let descriptors = self.api.list_files(token, dataset).await?;
        let url = locate_archive(&descriptors, &self.config.archive_suffix)?;

        let retriever = ArchiveRetriever::new(&self.api, ledger, dataset);
        let archive = retriever.download(&url).await?;
        let dir = retriever.extract(&archive).await?;

        let requested: HashSet<SnpId> = ids.iter().cloned().collect();
        let calls = GenotypeDecoder::new(self.config.malformed_lines)
            .decode(&dir, &requested)
            .await?;
        tracing::info!(
            requested = requested.len(),
            resolved = calls.len(),
            "phase=Decode; genotypes resolved"
        );
        Ok(calls.into_iter().collect())
    }
}
