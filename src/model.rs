//! Deployment value objects.
//!
//! Plain records describing which containerised applications should run on
//! which nodes. They carry no behaviour beyond parsing and formatting image
//! names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

fn default_tag() -> String {
    "latest".to_string()
}

/// A Docker image reference, `repository[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DockerImage {
    pub repository: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Docker image names must have format 'repository[:tag]'. Found '{0}'.")]
pub struct ImageNameError(pub String);

impl DockerImage {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// `repository:tag`, as passed to `docker run`.
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

impl FromStr for DockerImage {
    type Err = ImageNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (repository, tag) = match s.rsplit_once(':') {
            Some((repo, tag)) => (repo, tag.to_string()),
            None => (s, default_tag()),
        };
        if repository.is_empty() {
            return Err(ImageNameError(s.to_string()));
        }
        Ok(Self::new(repository, tag))
    }
}

impl fmt::Display for DockerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// A single application and the image it runs from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    pub image: DockerImage,
}

/// A node applications are deployed to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Resolvable hostname or literal IP address.
    pub hostname: String,
    #[serde(default)]
    pub applications: Vec<Application>,
}

/// Configuration of applications across cooperating nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub nodes: BTreeSet<Node>,
}

impl Deployment {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read deployment {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse deployment {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_without_tag_defaults_to_latest() {
        let image: DockerImage = "hybridcluster/flocker".parse().unwrap();
        assert_eq!(image, DockerImage::new("hybridcluster/flocker", "latest"));
        assert_eq!(image.full_name(), "hybridcluster/flocker:latest");
    }

    #[test]
    fn image_tag_splits_on_last_colon() {
        let image: DockerImage = "registry:5000/app:release-14.0".parse().unwrap();
        assert_eq!(image.repository, "registry:5000/app");
        assert_eq!(image.tag, "release-14.0");
    }

    #[test]
    fn empty_repository_is_rejected() {
        let err = ":latest".parse::<DockerImage>().unwrap_err();
        assert_eq!(err, ImageNameError(":latest".into()));
        assert!("".parse::<DockerImage>().is_err());
    }

    #[test]
    fn deployment_json_defaults() {
        let raw = r#"{
            "nodes": [
                {"hostname": "10.0.0.2"},
                {"hostname": "10.0.0.1", "applications": [
                    {"name": "pgsql-payroll", "image": {"repository": "postgres"}}
                ]}
            ]
        }"#;
        let deployment: Deployment = serde_json::from_str(raw).unwrap();
        let hostnames: Vec<_> = deployment.nodes.iter().map(|n| n.hostname.as_str()).collect();
        assert_eq!(hostnames, ["10.0.0.1", "10.0.0.2"]);

        let node = deployment.nodes.iter().next().unwrap();
        assert_eq!(node.applications[0].image.full_name(), "postgres:latest");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Deployment::load(Path::new("/nonexistent/deployment.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read deployment"));
    }
}
