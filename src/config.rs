//! IAM group to Kubernetes group bindings
//!
//! Bindings are read once at startup, either from the flag pair
//! `--aws-iam-group=devs;jenkins` / `--k8s-cap=system:masters,aggregate-to-admin;system:basic-user`
//! or from a YAML file. Both are validated the same way and any problem is a
//! fatal [`Error::Configuration`].

use std::collections::HashSet;

use serde::Deserialize;

use crate::Error;

/// Separator between bindings in the flag form
pub const BINDING_SEPARATOR: char = ';';

/// Separator between Kubernetes groups of one binding in the flag form
pub const GROUP_SEPARATOR: char = ',';

/// Kubernetes groups granted to members of one IAM group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityBinding {
    external_group: String,
    cluster_groups: Vec<String>,
}

impl CapabilityBinding {
    /// Create a binding, trimming names and dropping repeated cluster groups
    ///
    /// Fails if the IAM group name is empty, or if no cluster group remains.
    pub fn new<I, S>(external_group: impl Into<String>, cluster_groups: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let external_group = external_group.into().trim().to_string();
        if external_group.is_empty() {
            return Err(Error::configuration("IAM group name must not be empty"));
        }

        let mut seen = HashSet::new();
        let mut groups = Vec::new();
        for group in cluster_groups {
            let group = group.into().trim().to_string();
            if group.is_empty() {
                return Err(Error::configuration(format!(
                    "IAM group {external_group} has an empty Kubernetes group name"
                )));
            }
            if seen.insert(group.clone()) {
                groups.push(group);
            }
        }

        if groups.is_empty() {
            return Err(Error::configuration(format!(
                "IAM group {external_group} must grant at least one Kubernetes group"
            )));
        }

        Ok(Self {
            external_group,
            cluster_groups: groups,
        })
    }

    /// IAM group name
    pub fn external_group(&self) -> &str {
        &self.external_group
    }

    /// Kubernetes groups in declaration order
    pub fn cluster_groups(&self) -> &[String] {
        &self.cluster_groups
    }
}

/// The validated, ordered list of bindings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncConfig {
    bindings: Vec<CapabilityBinding>,
}

impl SyncConfig {
    /// Build from already constructed bindings, rejecting duplicate IAM groups
    pub fn new(bindings: Vec<CapabilityBinding>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for binding in &bindings {
            if !seen.insert(binding.external_group()) {
                return Err(Error::configuration(format!(
                    "IAM group {} is bound more than once",
                    binding.external_group()
                )));
            }
        }
        Ok(Self { bindings })
    }

    /// Parse the flag form
    ///
    /// The number of `;`-separated IAM groups must equal the number of
    /// `;`-separated capability sets.
    pub fn from_flags(iam_groups: &str, k8s_caps: &str) -> Result<Self, Error> {
        let groups: Vec<&str> = iam_groups.split(BINDING_SEPARATOR).collect();
        let caps: Vec<&str> = k8s_caps.split(BINDING_SEPARATOR).collect();

        if groups.len() != caps.len() {
            return Err(Error::configuration(format!(
                "amount of IAM groups ({}) and Kubernetes capability sets ({}) do not match",
                groups.len(),
                caps.len()
            )));
        }

        let bindings = groups
            .into_iter()
            .zip(caps)
            .map(|(group, cap)| CapabilityBinding::new(group, cap.split(GROUP_SEPARATOR)))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(bindings)
    }

    /// Parse the YAML file form
    ///
    /// ```yaml
    /// bindings:
    ///   - iamGroup: devs
    ///     clusterGroups: [viewer]
    /// ```
    pub fn from_yaml(content: &str) -> Result<Self, Error> {
        let file: BindingsFile = serde_yaml::from_str(content)
            .map_err(|e| Error::configuration(format!("invalid bindings file: {e}")))?;

        let bindings = file
            .bindings
            .into_iter()
            .map(|b| CapabilityBinding::new(b.iam_group, b.cluster_groups))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(bindings)
    }

    /// Bindings in declaration order
    pub fn bindings(&self) -> &[CapabilityBinding] {
        &self.bindings
    }

    /// Consume into the ordered bindings
    pub fn into_bindings(self) -> Vec<CapabilityBinding> {
        self.bindings
    }

    /// True when no binding is configured
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BindingsFile {
    #[serde(default)]
    bindings: Vec<BindingEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct BindingEntry {
    iam_group: String,
    cluster_groups: Vec<String>,
}
