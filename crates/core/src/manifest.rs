//! The `phantom.yaml` pipeline manifest.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Manifest file name, looked up at the root of a commit snapshot.
pub const MANIFEST_FILE: &str = "phantom.yaml";

/// Errors raised while reading a manifest that exists.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// File exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// File is not a valid manifest.
    #[error("invalid manifest {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
}

/// Parsed pipeline manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Container images to build.
    #[serde(default)]
    pub builds: Vec<BuildSpec>,
    /// Tests to run against built images.
    #[serde(default)]
    pub tests: Vec<TestSpec>,
    /// Deployment environments whose resources are validated.
    #[serde(default, alias = "deploy")]
    pub environments: Vec<EnvironmentSpec>,
}

/// One image build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSpec {
    /// Build name, unique within the manifest.
    pub name: String,
    /// Build context relative to the repository root.
    #[serde(default)]
    pub path: String,
    /// Dockerfile relative to the build context.
    #[serde(default = "default_dockerfile")]
    pub file: String,
}

/// One test, run inside the image of the build it names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestSpec {
    /// Test name, unique within the manifest.
    pub name: String,
    /// Name of the build whose image runs the test.
    pub build: String,
    /// Shell command run inside the image.
    pub command: String,
}

/// One deployment environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentSpec {
    /// Environment name.
    pub environment: String,
    /// Resources the environment expects to exist.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

/// A cloud resource declared by an environment. Provider-specific keys are kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSpec {
    /// Resource type, e.g. `bucket`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Resource name.
    pub name: String,
    /// Remaining keys.
    #[serde(flatten)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

impl Manifest {
    /// Loads the manifest from a snapshot root. `Ok(None)` means the commit has no manifest.
    pub fn load(dir: &Path) -> Result<Option<Self>, ManifestError> {
        let path = dir.join(MANIFEST_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Read { path, source }),
        };
        Self::parse(&raw)
            .map(Some)
            .map_err(|source| ManifestError::Parse { path, source })
    }

    /// Parses manifest YAML. An empty document is an empty manifest.
    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Build declared under `name`.
    pub fn build(&self, name: &str) -> Option<&BuildSpec> {
        self.builds.iter().find(|b| b.name == name)
    }

    /// Test declared under `name`.
    pub fn test(&self, name: &str) -> Option<&TestSpec> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Environment declared under `name`.
    pub fn environment(&self, name: &str) -> Option<&EnvironmentSpec> {
        self.environments.iter().find(|e| e.environment == name)
    }

    /// Tests that run against the given build.
    pub fn tests_for_build<'a>(&'a self, build: &'a str) -> impl Iterator<Item = &'a TestSpec> + 'a {
        self.tests.iter().filter(move |t| t.build == build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
builds:
  - name: api
    path: services/api
  - name: web
    path: web
    file: web.Dockerfile
tests:
  - name: unit
    build: api
    command: cargo test
  - name: e2e
    build: web
    command: npm run e2e
environments:
  - environment: prod
    resources:
      - type: cloud_run
        name: api
        region: us-central1
"#;

    #[test]
    fn parses_builds_tests_and_environments() {
        let m = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(m.build("api").unwrap().file, "Dockerfile");
        assert_eq!(m.build("web").unwrap().file, "web.Dockerfile");
        assert_eq!(m.test("unit").unwrap().command, "cargo test");

        let prod = m.environment("prod").unwrap();
        assert_eq!(prod.resources[0].kind, "cloud_run");
        assert_eq!(
            prod.resources[0].settings.get("region"),
            Some(&serde_json::json!("us-central1"))
        );
        assert!(m.environment("staging").is_none());
    }

    #[test]
    fn scopes_tests_to_their_build() {
        let m = Manifest::parse(SAMPLE).unwrap();
        let names: Vec<_> = m.tests_for_build("web").map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["e2e"]);
    }

    #[test]
    fn deploy_is_an_alias_for_environments() {
        let m = Manifest::parse("deploy:\n  - environment: dev\n").unwrap();
        assert_eq!(m.environments.len(), 1);
        assert!(m.environments[0].resources.is_empty());
    }

    #[test]
    fn empty_document_is_an_empty_manifest() {
        assert_eq!(Manifest::parse("  \n").unwrap(), Manifest::default());
    }
}
