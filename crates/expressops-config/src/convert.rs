//! Conversions from the YAML-facing model types to the engine's own
//! `Flow`/`Step`/`Value` types.

use std::collections::BTreeMap;

use expressops_core::{Flow, Step, Value};

use crate::env_expand::expand_scalar;
use crate::error::ConfigError;
use crate::model::{FlowSpec, StepSpec};

pub fn yaml_value_to_value(v: &serde_yaml::Value) -> Result<Value, ConfigError> {
    Ok(match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_yaml::Value::String(s) => Value::Str(expand_scalar(s)?),
        serde_yaml::Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(yaml_value_to_value(item)?);
            }
            Value::List(out)
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                let key = k.as_str().unwrap_or_default().to_string();
                out.insert(key, yaml_value_to_value(v)?);
            }
            Value::Map(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_value_to_value(&tagged.value)?,
    })
}

fn parameters_to_values(params: &BTreeMap<String, serde_yaml::Value>) -> Result<BTreeMap<String, Value>, ConfigError> {
    let mut out = BTreeMap::new();
    for (k, v) in params {
        out.insert(k.clone(), yaml_value_to_value(v)?);
    }
    Ok(out)
}

impl TryFrom<&StepSpec> for Step {
    type Error = ConfigError;

    fn try_from(spec: &StepSpec) -> Result<Self, ConfigError> {
        Ok(Step {
            plugin_ref: spec.plugin_ref.clone(),
            parameters: parameters_to_values(&spec.parameters)?,
            depends_on: spec.depends_on.clone(),
            parallel: spec.parallel,
        })
    }
}

impl TryFrom<&FlowSpec> for Flow {
    type Error = ConfigError;

    fn try_from(spec: &FlowSpec) -> Result<Self, ConfigError> {
        let mut pipeline = Vec::with_capacity(spec.pipeline.len());
        for step in &spec.pipeline {
            pipeline.push(Step::try_from(step)?);
        }
        Ok(Flow { name: spec.name.clone(), custom_handler: spec.custom_handler.clone(), pipeline })
    }
}
