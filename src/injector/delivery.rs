use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Volume, VolumeMount};

use super::{INIT_CONTAINER_NAME, VOLUME_NAME};
use crate::config::ContainerConfig;

/// Where the config volume is mounted, in both the init container and the
/// sidecar.
pub const CONFIG_DIR: &str = "/etc/logsidecar";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("config line {line:?} cannot be quoted for a shell, {err}")]
    Quote { line: String, err: shlex::QuoteError },
}

/// Pod artifacts which place the rendered config into the sidecar's
/// filesystem.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivered {
    pub volume: Volume,
    pub init_container: Container,
    /// Mount of `volume` for the sidecar container
    pub mount: VolumeMount,
}

pub trait Delivery {
    /// Build the artifacts which materialize `document` at `file`, which is
    /// always below [`CONFIG_DIR`].
    fn deliver(
        &self,
        file: &str,
        document: &str,
        init: &ContainerConfig,
    ) -> Result<Delivered, DeliveryError>;
}

/// Writes the document line by line from a shell init container into an
/// `emptyDir` volume. Lines go through `printf '%s\n'`, `echo` of dash and
/// others expands backslash escapes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellEcho;

impl ShellEcho {
    /// The script truncates `file` first, so a restarted init container
    /// does not append a second copy. Blank lines are skipped.
    pub fn script(file: &str, document: &str) -> Result<String, DeliveryError> {
        let mut script = format!(": > {file} ; ");

        for line in document.lines().filter(|line| !line.trim().is_empty()) {
            let quoted = shlex::try_quote(line).map_err(|err| DeliveryError::Quote {
                line: line.to_string(),
                err,
            })?;

            script.push_str(r"printf '%s\n' ");
            script.push_str(&quoted);
            script.push_str(" >> ");
            script.push_str(file);
            script.push_str(" ; ");
        }

        Ok(script)
    }
}

impl Delivery for ShellEcho {
    fn deliver(
        &self,
        file: &str,
        document: &str,
        init: &ContainerConfig,
    ) -> Result<Delivered, DeliveryError> {
        let script = Self::script(file, document)?;

        let mount = VolumeMount {
            name: VOLUME_NAME.to_string(),
            mount_path: CONFIG_DIR.to_string(),
            ..Default::default()
        };

        Ok(Delivered {
            volume: Volume {
                name: VOLUME_NAME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
            init_container: Container {
                name: INIT_CONTAINER_NAME.to_string(),
                image: Some(init.image.clone()),
                image_pull_policy: init.image_pull_policy.clone(),
                resources: init.resources.clone(),
                command: Some(vec!["/bin/sh".to_string()]),
                args: Some(vec!["-c".to_string(), script]),
                volume_mounts: Some(vec![mount.clone()]),
                ..Default::default()
            },
            mount,
        })
    }
}
