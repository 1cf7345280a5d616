//! `mapUsers` document building
//!
//! The document is a YAML list of `{userarn, username, groups}` records as
//! understood by aws-iam-authenticator. Building is pure: the same resolved
//! inputs always render to the same bytes.

use serde::{Deserialize, Serialize};

use crate::config::CapabilityBinding;
use crate::resolver::ExternalPrincipal;
use crate::{Error, ResolveError};

/// One `mapUsers` record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// IAM user ARN
    #[serde(rename = "userarn")]
    pub principal_id: String,
    /// Kubernetes username (the IAM user name)
    #[serde(rename = "username")]
    pub principal_name: String,
    /// Kubernetes groups granted to the user
    #[serde(rename = "groups")]
    pub cluster_groups: Vec<String>,
}

/// A binding together with the outcome of resolving its IAM group
#[derive(Clone, Debug)]
pub struct ResolvedBinding<'a> {
    /// The configured binding
    pub binding: &'a CapabilityBinding,
    /// Members of the IAM group, or why they could not be resolved
    pub members: Result<Vec<ExternalPrincipal>, ResolveError>,
}

impl<'a> ResolvedBinding<'a> {
    /// Pair a binding with its resolution result
    pub fn new(
        binding: &'a CapabilityBinding,
        members: Result<Vec<ExternalPrincipal>, ResolveError>,
    ) -> Self {
        Self { binding, members }
    }
}

/// Expand resolved bindings into entries
///
/// Entries follow binding order, then member order within a binding. A
/// binding whose resolution failed contributes nothing.
pub fn build_entries(results: &[ResolvedBinding<'_>]) -> Vec<MappingEntry> {
    results
        .iter()
        .filter_map(|r| r.members.as_ref().ok().map(|members| (r.binding, members)))
        .flat_map(|(binding, members)| {
            members.iter().map(move |principal| MappingEntry {
                principal_id: principal.principal_id.clone(),
                principal_name: principal.principal_name.clone(),
                cluster_groups: binding.cluster_groups().to_vec(),
            })
        })
        .collect()
}

/// Render entries as the `mapUsers` YAML document
///
/// No entries renders as `[]`, which is a valid document granting nothing.
pub fn render(entries: &[MappingEntry]) -> Result<String, Error> {
    serde_yaml::to_string(entries).map_err(|e| Error::serialization(e.to_string()))
}

/// Build the `mapUsers` document for one pass
pub fn build(results: &[ResolvedBinding<'_>]) -> Result<String, Error> {
    render(&build_entries(results))
}

/// Parse a `mapUsers` document
///
/// An empty or whitespace-only document is treated as no entries.
pub fn parse(document: &str) -> Result<Vec<MappingEntry>, Error> {
    if document.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(document).map_err(|e| Error::serialization(e.to_string()))
}
