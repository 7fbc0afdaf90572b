// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codespec: a versioned container spec template (spec §3).
//!
//! A codespec version is immutable once created; fetching by name without
//! a version returns the highest version (enforced by the Repository
//! contract, not here — this module only models the shape).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource requests for a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: Option<String>,
    pub memory: Option<String>,
    /// GPU count. `0` or absent means no GPU requested.
    #[serde(default)]
    pub gpu: u32,
}

/// Declared buffer parameters for a Job codespec (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferParameters {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl BufferParameters {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// Total count of declared buffer parameters, used to compute the
    /// expected container count in the socket/augmentation rule (spec §4.2).
    pub fn len(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inputs.iter().any(|p| p == name) || self.outputs.iter().any(|p| p == name)
    }
}

/// A declared socket on a Job codespec's main container (spec §3, §4.1.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketSpec {
    pub port: u16,
    #[serde(default)]
    pub input_buffer: Option<String>,
    #[serde(default)]
    pub output_buffer: Option<String>,
}

/// Whether a codespec describes a Job's main container or a Worker replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodespecKind {
    Job,
    Worker,
}

/// A versioned container spec template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codespec {
    pub name: String,
    pub version: i64,
    pub kind: CodespecKind,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub resources: Resources,
    /// Only meaningful for `CodespecKind::Job`.
    #[serde(default)]
    pub buffers: BufferParameters,
    /// Only meaningful for `CodespecKind::Job`.
    #[serde(default)]
    pub sockets: Vec<SocketSpec>,
}

impl Codespec {
    pub fn has_gpu_request(&self) -> bool {
        self.resources.gpu > 0
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }
}

/// A parsed `codespecRef` (spec §3: `"<name>"` or `"<name>/versions/<n>"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodespecRef {
    Latest(String),
    Exact(String, i64),
}

impl CodespecRef {
    pub fn parse(raw: &str) -> Result<Self, crate::ValidationError> {
        match raw.split_once("/versions/") {
            None => {
                if raw.is_empty() {
                    return Err(crate::ValidationError::MalformedCodespecRef(raw.to_string()));
                }
                Ok(CodespecRef::Latest(raw.to_string()))
            }
            Some((name, version_str)) => {
                if name.is_empty() {
                    return Err(crate::ValidationError::MalformedCodespecRef(raw.to_string()));
                }
                let version = version_str
                    .parse::<i64>()
                    .map_err(|_| crate::ValidationError::MalformedCodespecRef(raw.to_string()))?;
                Ok(CodespecRef::Exact(name.to_string(), version))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CodespecRef::Latest(name) => name,
            CodespecRef::Exact(name, _) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name_as_latest() {
        assert_eq!(
            CodespecRef::parse("hello").unwrap(),
            CodespecRef::Latest("hello".to_string())
        );
    }

    #[test]
    fn parses_exact_version() {
        assert_eq!(
            CodespecRef::parse("hello/versions/3").unwrap(),
            CodespecRef::Exact("hello".to_string(), 3)
        );
    }

    #[test]
    fn rejects_malformed_version_suffix() {
        assert!(CodespecRef::parse("hello/versions/abc").is_err());
    }

    #[test]
    fn rejects_empty_ref() {
        assert!(CodespecRef::parse("").is_err());
    }

    #[test]
    fn buffer_parameters_len_counts_inputs_and_outputs() {
        let params = BufferParameters {
            inputs: vec!["a".into()],
            outputs: vec!["b".into(), "c".into()],
        };
        assert_eq!(params.len(), 3);
        assert!(params.contains("b"));
        assert!(!params.contains("z"));
    }
}
