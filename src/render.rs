use minijinja::{Environment, UndefinedBehavior, context};

const TEMPLATE_NAME: &str = "sidecar";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template error, {0}")]
    Template(#[from] minijinja::Error),
    #[error("invalid json patch, {0}")]
    InvalidPatch(serde_json::Error),
    #[error("invalid yaml document, {0}")]
    InvalidYaml(serde_yaml::Error),
    #[error("yaml document cannot be represented as json, {0}")]
    NotJson(serde_json::Error),
    #[error("apply json patch failed, {0}")]
    Apply(#[from] json_patch::PatchError),
    #[error("serialize yaml document failed, {0}")]
    Serialize(serde_yaml::Error),
}

/// Holds the compiled sidecar config template.
#[derive(Debug)]
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    /// Compile the template, syntax errors are reported here rather than at
    /// render time.
    pub fn new(source: String) -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_template_owned(TEMPLATE_NAME, source)?;

        Ok(Self { env })
    }

    /// Render the config document, the template sees the absolute log paths
    /// as `paths`.
    pub fn render(&self, paths: &[String]) -> Result<String, RenderError> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let document = template.render(context! { paths => paths })?;

        Ok(document)
    }
}

/// Apply an RFC 6902 patch to a YAML document. The document is handled as a
/// JSON tree, so mapping keys come out sorted and comments are lost.
pub fn apply_overlay(document: &str, patch: &str) -> Result<String, RenderError> {
    let patch =
        serde_json::from_str::<json_patch::Patch>(patch).map_err(RenderError::InvalidPatch)?;

    // serde_yaml::Value rejects duplicate keys, serde_json::Value would keep the last one
    let yaml =
        serde_yaml::from_str::<serde_yaml::Value>(document).map_err(RenderError::InvalidYaml)?;
    let mut value = serde_json::to_value(yaml).map_err(RenderError::NotJson)?;

    json_patch::patch(&mut value, &patch)?;

    serde_yaml::to_string(&value).map_err(RenderError::Serialize)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const FILEBEAT: &str = r#"filebeat.inputs:
- type: log
  paths:
{%- for path in paths %}
  - {{ path }}
{%- endfor %}
output.console:
  pretty: true
"#;

    #[test]
    fn render_paths() {
        let renderer = Renderer::new(FILEBEAT.to_string()).unwrap();
        let document = renderer
            .render(&[
                "/container-app/data/log/*.log".to_string(),
                "/container-app/data/err.log".to_string(),
            ])
            .unwrap();

        assert_eq!(
            document,
            r#"filebeat.inputs:
- type: log
  paths:
  - /container-app/data/log/*.log
  - /container-app/data/err.log
output.console:
  pretty: true
"#
        );
    }

    #[test]
    fn deterministic() {
        let renderer = Renderer::new(FILEBEAT.to_string()).unwrap();
        let paths = vec!["/a/b.log".to_string(), "/c/*.log".to_string()];

        assert_eq!(
            renderer.render(&paths).unwrap(),
            renderer.render(&paths).unwrap()
        );
    }

    #[test]
    fn undefined_variable() {
        let renderer = Renderer::new("{{ nope.field }}".to_string()).unwrap();
        let err = renderer.render(&[]).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)), "{err}");
    }

    #[test]
    fn syntax_error() {
        let err = Renderer::new("{% if paths %}".to_string()).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)), "{err}");
    }

    #[test]
    fn overlay_add() {
        let document = "x:\n- a: 1\n";
        let output =
            apply_overlay(document, r#"[{"op":"add","path":"/x/0/y","value":true}]"#).unwrap();

        assert_eq!(output, "x:\n- a: 1\n  y: true\n");
    }

    #[test]
    fn overlay_errors() {
        let document = "x:\n- a: 1\n";

        let err = apply_overlay(document, "{not json").unwrap_err();
        assert!(matches!(err, RenderError::InvalidPatch(_)), "{err}");

        let err = apply_overlay(document, r#"[{"op":"jump","path":"/x"}]"#).unwrap_err();
        assert!(matches!(err, RenderError::InvalidPatch(_)), "{err}");

        let err =
            apply_overlay(document, r#"[{"op":"remove","path":"/missing/0"}]"#).unwrap_err();
        assert!(matches!(err, RenderError::Apply(_)), "{err}");

        let err = apply_overlay(document, r#"[{"op":"test","path":"/x/0/a","value":2}]"#)
            .unwrap_err();
        assert!(matches!(err, RenderError::Apply(_)), "{err}");

        let err = apply_overlay("a: 1\na: 2\n", "[]").unwrap_err();
        assert!(matches!(err, RenderError::InvalidYaml(_)), "{err}");
    }
}
