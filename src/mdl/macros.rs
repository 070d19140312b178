//! Macro definitions.
//!
//! A definition reads `(a: Expression, b: Macro) => body`. Only the structure is
//! checked here; rendering the body happens before expressions reach the analyzer.

use std::convert::TryFrom;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static PARAMETER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*:\s*([A-Za-z_]+)\s*$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    Expression,
    Macro,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub parameter_type: ParameterType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RawMacro {
    name: String,
    definition: String,
}

/// A parsed macro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMacro", into = "RawMacro")]
pub struct Macro {
    pub name: String,
    pub definition: String,
    pub parameters: Vec<Parameter>,
    pub body: String,
}

impl Macro {
    pub fn parse(name: impl Into<String>, definition: impl Into<String>) -> Result<Self> {
        let definition = definition.into();
        let (params, body) = definition
            .split_once("=>")
            .ok_or_else(|| Error::malformed(format!("definition is invalid: {}", definition)))?;
        let parameters = parse_parameters(params.trim())?;
        Ok(Self {
            name: name.into(),
            body: body.trim().to_string(),
            parameters,
            definition,
        })
    }
}

fn parse_parameters(list: &str) -> Result<Vec<Parameter>> {
    let inner = list
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::malformed(format!("parameter list is invalid: {}", list)))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|param| {
            let caps = PARAMETER
                .captures(param)
                .ok_or_else(|| Error::malformed(format!("parameter is invalid: {}", param.trim())))?;
            let parameter_type = match caps[2].to_ascii_lowercase().as_str() {
                "expression" => ParameterType::Expression,
                "macro" => ParameterType::Macro,
                other => {
                    return Err(Error::malformed(format!("unsupported parameter type: {}", other)))
                }
            };
            Ok(Parameter {
                name: caps[1].to_string(),
                parameter_type,
            })
        })
        .collect()
}

impl TryFrom<RawMacro> for Macro {
    type Error = Error;

    fn try_from(raw: RawMacro) -> Result<Self> {
        Macro::parse(raw.name, raw.definition)
    }
}

impl From<Macro> for RawMacro {
    fn from(m: Macro) -> Self {
        RawMacro {
            name: m.name,
            definition: m.definition,
        }
    }
}
