use std::collections::HashMap;

use k8s_openapi::api::core::v1::PodSpec;

use super::annotation::LogSidecarAnnotation;

/// A volume the sidecar mounts, at a path derived from the owning
/// container's name and mount path so that two containers mounting the same
/// path never collide.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedMount {
    pub volume: String,
    pub mount_path: String,
}

#[derive(Debug, Default, Eq, PartialEq)]
pub struct Resolution {
    pub mounts: Vec<ResolvedMount>,
    pub paths: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("container {0:?} not found or has no volume mounts")]
    MissingContainer(String),
    #[error("container {container:?} does not mount volume {volume:?}")]
    MissingVolume { container: String, volume: String },
}

/// Map the annotation onto the mounts declared by the pod's containers.
///
/// Output is ordered by container, volume and then relative path. Entries
/// referencing a missing container or volume are dropped, unless `strict`
/// is set.
pub fn resolve(
    spec: Option<&PodSpec>,
    annotation: &LogSidecarAnnotation,
    strict: bool,
) -> Result<Resolution, ResolveError> {
    // container -> volume -> mount path
    let mut index = HashMap::<&str, HashMap<&str, &str>>::new();
    if let Some(spec) = spec {
        for container in &spec.containers {
            let Some(mounts) = container.volume_mounts.as_ref().filter(|m| !m.is_empty()) else {
                continue;
            };

            let volumes = index.entry(container.name.as_str()).or_default();
            for mount in mounts {
                volumes.insert(mount.name.as_str(), mount.mount_path.as_str());
            }
        }
    }

    let mut resolution = Resolution::default();
    for (container, volumes) in &annotation.container_log_configs {
        for (volume, relatives) in volumes {
            if relatives.is_empty() {
                continue;
            }

            let Some(mount_path) = index
                .get(container.as_str())
                .and_then(|volumes| volumes.get(volume.as_str()))
            else {
                if strict {
                    return Err(if index.contains_key(container.as_str()) {
                        ResolveError::MissingVolume {
                            container: container.clone(),
                            volume: volume.clone(),
                        }
                    } else {
                        ResolveError::MissingContainer(container.clone())
                    });
                }

                debug!(
                    message = "skip log config without matched volume mount",
                    %container,
                    %volume
                );

                continue;
            };

            let mount_path = clean(&format!("/container-{container}/{mount_path}"));

            let mut relatives = relatives
                .iter()
                .map(|relative| relative.trim())
                .filter(|relative| !relative.is_empty())
                .collect::<Vec<_>>();
            relatives.sort_unstable();

            resolution.paths.extend(
                relatives
                    .into_iter()
                    .map(|relative| clean(&format!("{mount_path}/{relative}"))),
            );
            resolution.mounts.push(ResolvedMount {
                volume: volume.clone(),
                mount_path,
            });
        }
    }

    Ok(resolution)
}

/// Lexically clean an absolute path: repeated separators collapse, `.` is
/// dropped and `..` removes the previous element, but never climbs above
/// the root.
pub fn clean(path: &str) -> String {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }

    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Pod;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn pod() -> Pod {
        serde_json::from_value(json!({
            "metadata": {"name": "demo", "namespace": "default"},
            "spec": {
                "containers": [
                    {
                        "name": "app-container",
                        "image": "app",
                        "volumeMounts": [
                            {"name": "datavolume", "mountPath": "/data"},
                            {"name": "cache", "mountPath": "/var/cache/"}
                        ]
                    },
                    {"name": "bare", "image": "bare"},
                    {
                        "name": "other",
                        "image": "other",
                        "volumeMounts": [{"name": "datavolume", "mountPath": "/srv/data"}]
                    }
                ]
            }
        }))
        .unwrap()
    }

    fn annotation(value: &str) -> LogSidecarAnnotation {
        LogSidecarAnnotation::decode(value).unwrap()
    }

    #[test]
    fn clean_paths() {
        for (input, want) in [
            ("/", "/"),
            ("//a//b/", "/a/b"),
            ("/a/./b/.", "/a/b"),
            ("/a/b/../c", "/a/c"),
            ("/../../a", "/a"),
            ("/container-app//data/../log/*.log", "/container-app/log/*.log"),
        ] {
            assert_eq!(clean(input), want, "{input}");
        }
    }

    #[test]
    fn single() {
        let pod = pod();
        let resolution = resolve(
            pod.spec.as_ref(),
            &annotation(r#"{"containerLogConfigs":{"app-container":{"datavolume":["log/*.log"]}}}"#),
            false,
        )
        .unwrap();

        assert_eq!(
            resolution,
            Resolution {
                mounts: vec![ResolvedMount {
                    volume: "datavolume".to_string(),
                    mount_path: "/container-app-container/data".to_string(),
                }],
                paths: vec!["/container-app-container/data/log/*.log".to_string()],
            }
        );
    }

    #[test]
    fn ordered() {
        let pod = pod();
        let resolution = resolve(
            pod.spec.as_ref(),
            &annotation(
                r#"{"containerLogConfigs":{
                    "other": {"datavolume": ["z.log", " a.log ", ""]},
                    "app-container": {"datavolume": ["b.log"], "cache": ["./x/../y.log"]}
                }}"#,
            ),
            false,
        )
        .unwrap();

        assert_eq!(
            resolution.mounts,
            vec![
                ResolvedMount {
                    volume: "cache".to_string(),
                    mount_path: "/container-app-container/var/cache".to_string(),
                },
                ResolvedMount {
                    volume: "datavolume".to_string(),
                    mount_path: "/container-app-container/data".to_string(),
                },
                ResolvedMount {
                    volume: "datavolume".to_string(),
                    mount_path: "/container-other/srv/data".to_string(),
                },
            ]
        );
        assert_eq!(
            resolution.paths,
            vec![
                "/container-app-container/var/cache/y.log",
                "/container-app-container/data/b.log",
                "/container-other/srv/data/a.log",
                "/container-other/srv/data/z.log",
            ]
        );
    }

    #[test]
    fn lenient() {
        let pod = pod();
        let resolution = resolve(
            pod.spec.as_ref(),
            &annotation(
                r#"{"containerLogConfigs":{
                    "missing": {"datavolume": ["a.log"]},
                    "bare": {"datavolume": ["a.log"]},
                    "app-container": {"nope": ["a.log"], "datavolume": []}
                }}"#,
            ),
            false,
        )
        .unwrap();

        assert_eq!(resolution, Resolution::default());
    }

    #[test]
    fn strict() {
        let pod = pod();

        let err = resolve(
            pod.spec.as_ref(),
            &annotation(r#"{"containerLogConfigs":{"bare":{"datavolume":["a.log"]}}}"#),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::MissingContainer(name) if name == "bare"));

        let err = resolve(
            pod.spec.as_ref(),
            &annotation(r#"{"containerLogConfigs":{"app-container":{"nope":["a.log"]}}}"#),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::MissingVolume { volume, .. } if volume == "nope"));

        // empty path lists are skipped before the check
        let resolution = resolve(
            pod.spec.as_ref(),
            &annotation(r#"{"containerLogConfigs":{"missing":{"nope":[]}}}"#),
            true,
        )
        .unwrap();
        assert_eq!(resolution, Resolution::default());
    }

    #[test]
    fn no_spec() {
        let resolution = resolve(
            None,
            &annotation(r#"{"containerLogConfigs":{"a":{"b":["c"]}}}"#),
            false,
        )
        .unwrap();

        assert_eq!(resolution, Resolution::default());
    }
}
