//! Argument and result validation against a tool descriptor

use crate::tools::types::{json_type_name, ToolDescriptor};
use crate::types::ToolArgs;
use serde_json::Value;

/// Validate `args` and return them with defaults filled in
///
/// Rejects undeclared arguments, missing required arguments and values of the
/// wrong type. The error string names the offending parameter.
pub fn validate_args(descriptor: &ToolDescriptor, args: &ToolArgs) -> Result<ToolArgs, String> {
    if let Some(unknown) = args.keys().find(|key| descriptor.parameter(key).is_none()) {
        return Err(format!("unexpected argument '{}'", unknown));
    }

    let mut validated = ToolArgs::new();

    for parameter in &descriptor.parameters {
        match args.get(&parameter.name) {
            Some(value) => {
                if !parameter.param_type.matches(value) {
                    return Err(format!(
                        "argument '{}' must be {}, got {}",
                        parameter.name,
                        parameter.param_type.name(),
                        json_type_name(value)
                    ));
                }
                validated.insert(parameter.name.clone(), value.clone());
            }
            None if parameter.required => {
                return Err(format!("missing required argument '{}'", parameter.name));
            }
            None => {
                if let Some(default) = &parameter.default {
                    validated.insert(parameter.name.clone(), default.clone());
                }
            }
        }
    }

    Ok(validated)
}

/// Check a tool result against the declared result type
pub fn validate_result(descriptor: &ToolDescriptor, result: &Value) -> Result<(), String> {
    if descriptor.returns.matches(result) {
        Ok(())
    } else {
        Err(format!(
            "result schema violation: expected {}, got {}",
            descriptor.returns.name(),
            json_type_name(result)
        ))
    }
}

/// Check a descriptor is well formed before registration
pub fn validate_descriptor(descriptor: &ToolDescriptor) -> Result<(), String> {
    if descriptor.name.trim().is_empty() {
        return Err("tool name must not be empty".to_string());
    }

    for (index, parameter) in descriptor.parameters.iter().enumerate() {
        if descriptor.parameters[..index]
            .iter()
            .any(|p| p.name == parameter.name)
        {
            return Err(format!("duplicate parameter '{}'", parameter.name));
        }

        if let Some(default) = &parameter.default {
            if parameter.required {
                return Err(format!(
                    "required parameter '{}' cannot have a default",
                    parameter.name
                ));
            }
            if !parameter.param_type.matches(default) {
                return Err(format!(
                    "default for '{}' is not {}",
                    parameter.name,
                    parameter.param_type.name()
                ));
            }
        }
    }

    Ok(())
}
