use serde::Serialize;

use crate::domain::SnpId;

/// Identifiers sent together in one remote query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Batch(Vec<SnpId>);

impl Batch {
    pub fn ids(&self) -> &[SnpId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space-joined form used as the `names` query parameter.
    pub fn joined(&self) -> String {
        joined(&self.0)
    }

    pub fn joined_len(&self) -> usize {
        joined_len(&self.0)
    }
}

/// Splits `ids` into batches whose space-joined length fits in `limit`.
///
/// The working list sheds a trailing tenth of its length (at least one id) per
/// iteration until it fits; the shed ids, kept in input order, are then split
/// the same way and their batches follow. Concatenating the batches gives back
/// `ids` in order. An empty input yields a single empty batch.
///
/// A single id longer than `limit` cannot be split further and ends up alone in
/// a batch that still exceeds the limit.
pub fn split(ids: &[SnpId], limit: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut rest = ids;
    loop {
        let mut end = rest.len();
        while end > 1 && joined_len(&rest[..end]) > limit {
            end -= (end / 10).max(1);
        }
        batches.push(Batch(rest[..end].to_vec()));
        rest = &rest[end..];
        if rest.is_empty() {
            break;
        }
    }
    tracing::debug!(ids = ids.len(), batches = batches.len(), limit, "split identifiers");
    batches
}

fn joined(ids: &[SnpId]) -> String {
    ids.iter()
        .map(SnpId::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

fn joined_len(ids: &[SnpId]) -> usize {
    let chars: usize = ids.iter().map(SnpId::len).sum();
    chars + ids.len().saturating_sub(1)
}
