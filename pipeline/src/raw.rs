use std::collections::BTreeMap;

use serde::Deserialize;

use crate::Error;

/// One step exactly as written in the pipeline file.
///
/// Everything is optional so that a step can tell "not set, inherit it"
/// apart from "set to empty".
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStep {
    pub command: Option<String>,
    pub inputs: Option<Vec<String>>,
    pub outputs: Option<Vec<String>>,
    pub clean: Option<Vec<String>>,
    pub explicit: Option<bool>,
    pub delete_on_fail: Option<bool>,
    pub direct: Option<bool>,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    pub base_step: Option<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

impl RawStep {
    /// Fill in everything this step leaves unset from `base`.
    /// Abstractness is never inherited.
    fn inherit(&self, base: RawStep) -> RawStep {
        let mut vars = base.vars;
        vars.extend(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        RawStep {
            command: self.command.clone().or(base.command),
            inputs: self.inputs.clone().or(base.inputs),
            outputs: self.outputs.clone().or(base.outputs),
            clean: self.clean.clone().or(base.clean),
            explicit: self.explicit.or(base.explicit),
            delete_on_fail: self.delete_on_fail.or(base.delete_on_fail),
            direct: self.direct.or(base.direct),
            is_abstract: self.is_abstract,
            base_step: None,
            vars,
        }
    }
}

/// Decode pipeline text into raw steps keyed by name.
pub fn parse(text: &str) -> Result<BTreeMap<String, RawStep>, Error> {
    let blank = text
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'));
    if blank {
        return Ok(BTreeMap::new());
    }
    let steps: Option<BTreeMap<String, RawStep>> = serde_yaml::from_str(text)?;
    Ok(steps.unwrap_or_default())
}

/// Flatten every step's `base_step` chain.
pub fn resolve_inheritance(
    raw: &BTreeMap<String, RawStep>,
) -> Result<BTreeMap<String, RawStep>, Error> {
    let mut chain = Vec::with_capacity(4);
    let mut resolved = BTreeMap::new();
    for name in raw.keys() {
        let step = flatten(name, raw, &mut chain)?;
        resolved.insert(name.clone(), step);
    }
    Ok(resolved)
}

fn flatten<'a>(
    name: &'a str,
    raw: &'a BTreeMap<String, RawStep>,
    chain: &mut Vec<&'a str>,
) -> Result<RawStep, Error> {
    if chain.contains(&name) {
        return Err(Error::BaseCycle(name.to_owned()));
    }
    let step = &raw[name];
    let Some(base_name) = step.base_step.as_deref() else {
        return Ok(step.clone());
    };
    if !raw.contains_key(base_name) {
        return Err(Error::UnknownBase(name.to_owned(), base_name.to_owned()));
    }

    chain.push(name);
    let base = flatten(base_name, raw, chain)?;
    chain.pop();

    log::trace!("step {name} inherits from {base_name}");
    Ok(step.inherit(base))
}
