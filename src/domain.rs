use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ResolverError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnpId(String);

impl SnpId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SnpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SnpId {
    type Err = ResolverError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        // Whitespace separates ids on the wire and in probability files.
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(ResolverError::InvalidSnpId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = ResolverError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && !trimmed.contains('/')
            && !trimmed.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(ResolverError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Allele pair such as `AG`, built from the two alleles of a probability record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenotypeCall(String);

impl GenotypeCall {
    pub fn from_alleles(first: &str, second: &str) -> Self {
        Self(format!("{first}{second}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenotypeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityRecord {
    pub snp: SnpId,
    pub allele1: String,
    pub allele2: String,
    /// p(hom allele1), p(het), p(hom allele2).
    pub probabilities: [f64; 3],
}

impl ProbabilityRecord {
    /// Index of the most probable genotype. Ties go to the later index.
    pub fn most_probable(&self) -> usize {
        let mut best = (self.probabilities[0], 0);
        for (index, &value) in self.probabilities.iter().enumerate().skip(1) {
            if value >= best.0 {
                best = (value, index);
            }
        }
        best.1
    }

    pub fn call(&self) -> GenotypeCall {
        match self.most_probable() {
            0 => GenotypeCall::from_alleles(&self.allele1, &self.allele1),
            1 => GenotypeCall::from_alleles(&self.allele1, &self.allele2),
            _ => GenotypeCall::from_alleles(&self.allele2, &self.allele2),
        }
    }
}

/// Genotype calls keyed by the requested SNP. SNPs that were never observed
/// have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolutionResult {
    calls: BTreeMap<SnpId, GenotypeCall>,
}

impl ResolutionResult {
    pub fn get(&self, snp: &SnpId) -> Option<&GenotypeCall> {
        self.calls.get(snp)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SnpId, &GenotypeCall)> {
        self.calls.iter()
    }
}

impl FromIterator<(SnpId, GenotypeCall)> for ResolutionResult {
    fn from_iter<I: IntoIterator<Item = (SnpId, GenotypeCall)>>(iter: I) -> Self {
        Self {
            calls: iter.into_iter().collect(),
        }
    }
}

/// Entry of the dataset file listing. `id` holds the file's URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
}

/// Record returned by the batched genotype query endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenotypeRecord {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(default)]
    pub genotype: Option<String>,
    #[serde(default)]
    pub quality: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
