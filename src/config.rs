//! Injector configuration.
//!
//! Loaded from the sidecar YAML file plus the template of the active sidecar
//! type. The whole value is rebuilt on every reload and swapped in as one
//! piece, see [`crate::store::ConfigStore`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use k8s_openapi::api::core::v1::ResourceRequirements;
use serde::Deserialize;

use crate::render::{RenderError, Renderer};

pub const FILEBEAT_DEFAULT_IMAGE: &str = "elastic/filebeat:6.7.0";
pub const VECTOR_DEFAULT_IMAGE: &str = "timberio/vector:0.39.0-alpine";
pub const INIT_CONTAINER_DEFAULT_IMAGE: &str = "alpine:3.9";

/// Log paths the template is trial rendered with when it is loaded.
pub const SAMPLE_PATHS: [&str; 2] = [
    "/container-app/var/log/app/*.log",
    "/container-app/data/access.log",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path:?} failed, {err}")]
    Read {
        path: PathBuf,
        err: std::io::Error,
    },
    #[error("parse {path:?} failed, {err}")]
    Parse {
        path: PathBuf,
        err: serde_yaml::Error,
    },
    #[error("compile template {path:?} failed, {err}")]
    Template { path: PathBuf, err: RenderError },
    #[error("render template {path:?} failed, {err}")]
    Render { path: PathBuf, err: RenderError },
}

/// Which log shipper runs in the sidecar.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SidecarType {
    #[default]
    Filebeat,
    Vector,
}

impl SidecarType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SidecarType::Filebeat => "filebeat",
            SidecarType::Vector => "vector",
        }
    }

    pub const fn default_image(&self) -> &'static str {
        match self {
            SidecarType::Filebeat => FILEBEAT_DEFAULT_IMAGE,
            SidecarType::Vector => VECTOR_DEFAULT_IMAGE,
        }
    }

    /// Name of the rendered config file inside the shared config volume.
    pub const fn config_file_name(&self) -> &'static str {
        match self {
            SidecarType::Filebeat => "filebeat.yaml",
            SidecarType::Vector => "vector.yaml",
        }
    }
}

impl fmt::Display for SidecarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub image_pull_policy: Option<String>,

    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

impl ContainerConfig {
    fn default_image(&mut self, image: &str) {
        if self.image.trim().is_empty() {
            self.image = image.to_string();
        }
    }
}

/// The content of the sidecar config file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidecarConfig {
    #[serde(default, rename = "type")]
    pub kind: SidecarType,

    /// Deny admission when the annotation references a container or volume
    /// mount that does not exist, instead of skipping the entry.
    #[serde(default)]
    pub strict_mounts: bool,

    #[serde(default)]
    pub init_container: ContainerConfig,

    // `container` is what older config files call it
    #[serde(default, alias = "container")]
    pub filebeat: ContainerConfig,

    #[serde(default)]
    pub vector: ContainerConfig,
}

impl SidecarConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            err,
        })?;

        let mut config = if content.trim().is_empty() {
            SidecarConfig::default()
        } else {
            serde_yaml::from_str::<SidecarConfig>(&content).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                err,
            })?
        };

        config.apply_defaults();

        Ok(config)
    }

    pub fn apply_defaults(&mut self) {
        self.init_container
            .default_image(INIT_CONTAINER_DEFAULT_IMAGE);
        self.filebeat
            .default_image(SidecarType::Filebeat.default_image());
        self.vector.default_image(SidecarType::Vector.default_image());
    }

    /// Container settings of the active sidecar type.
    pub fn sidecar(&self) -> &ContainerConfig {
        match self.kind {
            SidecarType::Filebeat => &self.filebeat,
            SidecarType::Vector => &self.vector,
        }
    }
}

/// Files the injector config is built from.
#[derive(Clone, Debug)]
pub struct ConfigPaths {
    pub sidecar: PathBuf,
    pub filebeat: PathBuf,
    pub vector: PathBuf,
}

impl ConfigPaths {
    pub fn template(&self, kind: SidecarType) -> &Path {
        match kind {
            SidecarType::Filebeat => &self.filebeat,
            SidecarType::Vector => &self.vector,
        }
    }
}

#[derive(Debug)]
pub struct InjectorConfig {
    pub kind: SidecarType,
    pub strict_mounts: bool,
    pub sidecar: ContainerConfig,
    pub init_container: ContainerConfig,
    pub renderer: Renderer,
}

impl InjectorConfig {
    pub fn new(config: SidecarConfig, renderer: Renderer) -> Self {
        Self {
            kind: config.kind,
            strict_mounts: config.strict_mounts,
            sidecar: config.sidecar().clone(),
            init_container: config.init_container,
            renderer,
        }
    }

    /// Read the sidecar config, then compile the template of the sidecar type
    /// it selects and render it once with [`SAMPLE_PATHS`]. Templates of other
    /// types are never touched.
    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let sidecar = SidecarConfig::load(&paths.sidecar)?;

        let path = paths.template(sidecar.kind);
        let source = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            err,
        })?;
        let renderer = Renderer::new(source).map_err(|err| ConfigError::Template {
            path: path.to_path_buf(),
            err,
        })?;
        renderer
            .render(&SAMPLE_PATHS.map(String::from))
            .map_err(|err| ConfigError::Render {
                path: path.to_path_buf(),
                err,
            })?;

        Ok(Self::new(sidecar, renderer))
    }
}
