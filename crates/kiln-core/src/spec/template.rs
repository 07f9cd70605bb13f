use kiln_model::{BuildInputs, BuildSpec};
use serde::{Deserialize, Serialize};

use super::{BuildClass, SpecError};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Build class rendered from a text template.
///
/// Placeholders are written `{{name}}`. The names `source`, `runtime`, `entrypoint` and `args`
/// bind to the matching input fields (`args` renders as a JSON array); any other name is looked
/// up in the free-form `vars`. A missing or blank `runtime` is reported as
/// [`SpecError::MissingRuntime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateClass {
    pub name: String,
    pub template: String,
}

impl TemplateClass {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }

    fn lookup(&self, key: &str, inputs: &BuildInputs) -> Result<String, SpecError> {
        let value = match key {
            "source" => inputs.source.clone(),
            "runtime" => match inputs.runtime.as_deref() {
                Some(runtime) if !runtime.trim().is_empty() => Some(runtime.to_string()),
                _ => return Err(SpecError::MissingRuntime(self.name.clone())),
            },
            "entrypoint" => inputs.entrypoint.clone(),
            "args" => Some(
                serde_json::to_string(&inputs.args)
                    .map_err(|e| SpecError::InvalidJobManifest(e.to_string()))?,
            ),
            other => inputs.vars.get(other).cloned(),
        };
        value.ok_or_else(|| {
            SpecError::InvalidJobManifest(format!(
                "class {}: placeholder '{key}' has no value",
                self.name
            ))
        })
    }

    fn render(&self, inputs: &BuildInputs) -> Result<String, SpecError> {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];
            let end = after.find(CLOSE).ok_or_else(|| {
                SpecError::InvalidJobManifest(format!(
                    "class {}: unterminated placeholder",
                    self.name
                ))
            })?;

            let key = after[..end].trim();
            if key.is_empty() {
                return Err(SpecError::InvalidJobManifest(format!(
                    "class {}: empty placeholder",
                    self.name
                )));
            }
            out.push_str(&self.lookup(key, inputs)?);
            rest = &after[end + CLOSE.len()..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl BuildClass for TemplateClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, inputs: &BuildInputs) -> Result<BuildSpec, SpecError> {
        Ok(BuildSpec {
            class: self.name.clone(),
            content: self.render(inputs)?,
        })
    }
}

/// Classes available without any template file.
pub fn builtin_classes() -> Vec<TemplateClass> {
    vec![
        TemplateClass::new(
            "python-pip",
            "FROM {{runtime}}\n\
             WORKDIR /app\n\
             ADD {{source}} /app\n\
             RUN pip install --no-cache-dir -r requirements.txt\n\
             ENTRYPOINT [\"python\", \"{{entrypoint}}\"]\n\
             CMD {{args}}\n",
        ),
        TemplateClass::new(
            "node-npm",
            "FROM {{runtime}}\n\
             WORKDIR /app\n\
             ADD {{source}} /app\n\
             RUN npm ci --omit=dev\n\
             ENTRYPOINT [\"node\", \"{{entrypoint}}\"]\n\
             CMD {{args}}\n",
        ),
    ]
}

/// Parse a JSON array of `{"name", "template"}` objects.
pub fn templates_from_json(raw: &str) -> Result<Vec<TemplateClass>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn inputs() -> BuildInputs {
        BuildInputs {
            source: Some("https://git.local/acme/train.git".into()),
            runtime: Some("python:3.12".into()),
            entrypoint: Some("train.py".into()),
            args: vec!["--epochs".into(), "3".into()],
            vars: BTreeMap::from([("extra".to_string(), "x".to_string())]),
        }
    }

    #[test]
    fn renders_every_binding() {
        let class = TemplateClass::new("t", "{{runtime}}|{{ source }}|{{entrypoint}}|{{args}}|{{extra}}");
        let spec = class.generate(&inputs()).unwrap();
        assert_eq!(
            spec.content,
            r#"python:3.12|https://git.local/acme/train.git|train.py|["--epochs","3"]|x"#
        );
        assert_eq!(spec.class, "t");
    }

    #[test]
    fn rendering_is_deterministic() {
        let class = &builtin_classes()[0];
        let a = class.generate(&inputs()).unwrap();
        let b = class.generate(&inputs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unbound_placeholder_is_rejected() {
        let class = TemplateClass::new("t", "FROM {{runtime}}\nENV X={{missing}}\n");
        let err = class.generate(&inputs()).unwrap_err();
        assert!(matches!(err, SpecError::InvalidJobManifest(_)));
    }

    #[test]
    fn missing_optional_input_is_rejected() {
        let class = TemplateClass::new("t", "ENTRYPOINT {{entrypoint}}");
        let err = class.generate(&BuildInputs::default()).unwrap_err();
        assert!(matches!(err, SpecError::InvalidJobManifest(_)));
    }

    #[test]
    fn missing_or_blank_runtime_has_its_own_code() {
        let class = &builtin_classes()[0];
        for runtime in [None, Some("   ".to_string())] {
            let err = class
                .generate(&BuildInputs {
                    runtime,
                    ..inputs()
                })
                .unwrap_err();
            assert_eq!(err, SpecError::MissingRuntime("python-pip".into()));
            assert_eq!(err.code(), kiln_model::ErrorCode::InvalidPackageRuntime);
        }
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        let class = TemplateClass::new("t", "FROM {{runtime");
        assert!(class.generate(&inputs()).is_err());
    }

    #[test]
    fn text_without_placeholders_is_kept() {
        let class = TemplateClass::new("t", "FROM scratch\n");
        assert_eq!(class.generate(&inputs()).unwrap().content, "FROM scratch\n");
    }

    #[test]
    fn templates_parse_from_json() {
        let raw = r#"[{"name": "go-mod", "template": "FROM {{runtime}}"}]"#;
        let classes = templates_from_json(raw).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "go-mod");
    }
}
