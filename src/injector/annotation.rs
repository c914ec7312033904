use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Container name to volume name to log path globs, relative to the mount
/// path of that volume in that container.
pub type ContainerLogConfigs = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// The decoded value of the `logging.kubesphere.io/logsidecar-config`
/// annotation, e.g.
///
/// ```json
/// {"containerLogConfigs": {"app": {"data": ["log/*.log"]}}}
/// ```
///
/// A `null` at any level reads as empty.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(from = "NullableAnnotation", rename_all = "camelCase")]
pub struct LogSidecarAnnotation {
    pub container_log_configs: ContainerLogConfigs,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NullableAnnotation {
    #[serde(default)]
    container_log_configs: Option<BTreeMap<String, Option<BTreeMap<String, Option<Vec<String>>>>>>,
}

impl From<NullableAnnotation> for LogSidecarAnnotation {
    fn from(annotation: NullableAnnotation) -> Self {
        let container_log_configs = annotation
            .container_log_configs
            .unwrap_or_default()
            .into_iter()
            .map(|(container, volumes)| {
                let volumes = volumes
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(volume, paths)| (volume, paths.unwrap_or_default()))
                    .collect();

                (container, volumes)
            })
            .collect();

        Self {
            container_log_configs,
        }
    }
}

impl LogSidecarAnnotation {
    pub fn decode(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Option<Self>>(value.trim()).map(Option::unwrap_or_default)
    }
}
