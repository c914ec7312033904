mod annotation;
mod delivery;
mod mounts;

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, VolumeMount};

pub use annotation::{ContainerLogConfigs, LogSidecarAnnotation};
pub use delivery::{CONFIG_DIR, Delivered, Delivery, DeliveryError, ShellEcho};
pub use mounts::{Resolution, ResolveError, ResolvedMount, clean, resolve};

use crate::config::{InjectorConfig, SidecarType};
use crate::render::{self, RenderError};

/// Holds the log config of containers, see [`LogSidecarAnnotation`].
pub const ANNOTATION: &str = "logging.kubesphere.io/logsidecar-config";
pub const FILEBEAT_OVERLAY_ANNOTATION: &str =
    "logging.kubesphere.io/logsidecar-filebeat-config-jsonpatch";
pub const VECTOR_OVERLAY_ANNOTATION: &str =
    "logging.kubesphere.io/logsidecar-vector-config-jsonpatch";

pub const INIT_CONTAINER_NAME: &str = "logsidecar-init-container-logging-kubesphere-io";
pub const CONTAINER_NAME: &str = "logsidecar-container-logging-kubesphere-io";
pub const VOLUME_NAME: &str = "logsidecar-config-volume-logging-kubesphere-io";

#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("unable to decode annotations[{key}] in pod {pod}: {err}")]
    Decode {
        key: &'static str,
        pod: String,
        err: serde_json::Error,
    },
    #[error("unable to resolve log paths of pod {pod}: {err}")]
    Resolve { pod: String, err: ResolveError },
    #[error("failed to render {kind} config of pod {pod}: {err}")]
    Render {
        kind: SidecarType,
        pod: String,
        err: RenderError,
    },
    #[error("failed to inject logsidecar into pod {pod}: {err}")]
    Delivery { pod: String, err: DeliveryError },
}

/// Annotation which carries the optional JSON patch for the rendered config.
pub const fn overlay_annotation(kind: SidecarType) -> &'static str {
    match kind {
        SidecarType::Filebeat => FILEBEAT_OVERLAY_ANNOTATION,
        SidecarType::Vector => VECTOR_OVERLAY_ANNOTATION,
    }
}

fn sidecar_args(kind: SidecarType, file: &str) -> Vec<String> {
    match kind {
        SidecarType::Filebeat => vec!["-c".to_string(), file.to_string()],
        SidecarType::Vector => vec!["--config-yaml".to_string(), file.to_string()],
    }
}

/// `namespace/name` of the pod, `generateName` stands in for the name until
/// the pod is named.
pub fn pod_name(pod: &Pod) -> String {
    let metadata = &pod.metadata;
    let name = metadata
        .name
        .as_deref()
        .or(metadata.generate_name.as_deref())
        .unwrap_or_default();

    format!(
        "{}/{}",
        metadata.namespace.as_deref().unwrap_or_default(),
        name
    )
}

/// The trimmed value of annotation `key`, if it is not blank.
fn annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// Remove every artifact a previous injection added. A list emptied by the
/// removal is reset to absent, so the pod gets its original shape back.
pub fn strip(spec: &mut PodSpec) {
    remove_named(&mut spec.init_containers, INIT_CONTAINER_NAME, |c| &c.name);
    spec.containers.retain(|c| c.name != CONTAINER_NAME);
    remove_named(&mut spec.volumes, VOLUME_NAME, |v| &v.name);
}

fn remove_named<T>(items: &mut Option<Vec<T>>, name: &str, name_of: impl Fn(&T) -> &String) {
    let Some(list) = items else {
        return;
    };

    let before = list.len();
    list.retain(|item| name_of(item) != name);
    if before > 0 && list.is_empty() {
        *items = None;
    }
}

pub struct Injector<D = ShellEcho> {
    config: Arc<InjectorConfig>,
    delivery: D,
}

impl Injector {
    pub fn new(config: Arc<InjectorConfig>) -> Self {
        Self {
            config,
            delivery: ShellEcho,
        }
    }
}

impl<D: Delivery> Injector<D> {
    pub fn with_delivery(config: Arc<InjectorConfig>, delivery: D) -> Self {
        Self { config, delivery }
    }

    /// Inject the log sidecar into `pod`, or only strip a previous injection
    /// when the pod does not ask for one.
    ///
    /// On error the pod is left stripped.
    pub fn mutate(&self, pod: &mut Pod) -> Result<(), InjectError> {
        if let Some(spec) = pod.spec.as_mut() {
            strip(spec);
        }

        let Some(value) = annotation(pod, ANNOTATION) else {
            return Ok(());
        };

        let name = pod_name(pod);
        let parsed = LogSidecarAnnotation::decode(value).map_err(|err| InjectError::Decode {
            key: ANNOTATION,
            pod: name.clone(),
            err,
        })?;

        let Resolution { mounts, paths } =
            resolve(pod.spec.as_ref(), &parsed, self.config.strict_mounts).map_err(|err| {
                InjectError::Resolve {
                    pod: name.clone(),
                    err,
                }
            })?;
        if paths.is_empty() {
            debug!(message = "no log path resolved, skip injection", pod = %name);

            return Ok(());
        }

        let kind = self.config.kind;
        let render_err = |err| InjectError::Render {
            kind,
            pod: name.clone(),
            err,
        };
        let mut document = self.config.renderer.render(&paths).map_err(render_err)?;
        if let Some(patch) = annotation(pod, overlay_annotation(kind)) {
            document = render::apply_overlay(&document, patch).map_err(render_err)?;
        }

        let file = format!("{CONFIG_DIR}/{}", kind.config_file_name());
        let Delivered {
            volume,
            init_container,
            mount,
        } = self
            .delivery
            .deliver(&file, &document, &self.config.init_container)
            .map_err(|err| InjectError::Delivery { pod: name, err })?;

        let sidecar = &self.config.sidecar;
        let mut volume_mounts = mounts
            .into_iter()
            .map(|resolved| VolumeMount {
                name: resolved.volume,
                mount_path: resolved.mount_path,
                ..Default::default()
            })
            .collect::<Vec<_>>();
        volume_mounts.push(mount);
        let container = Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(sidecar.image.clone()),
            image_pull_policy: sidecar.image_pull_policy.clone(),
            resources: sidecar.resources.clone(),
            args: Some(sidecar_args(kind, &file)),
            volume_mounts: Some(volume_mounts),
            ..Default::default()
        };

        let spec = pod.spec.get_or_insert_with(PodSpec::default);
        spec.volumes.get_or_insert_with(Vec::new).push(volume);
        spec.init_containers
            .get_or_insert_with(Vec::new)
            .push(init_container);
        spec.containers.push(container);

        Ok(())
    }
}
