use std::collections::BTreeMap;
use std::path::Path;

use util::{PathEncodingError, UniqueStrings};

use crate::raw::RawStep;
use crate::{Error, Step};

/// Turn a flattened raw step into a runnable `Step`:
/// expand variables in every file list, then glob inputs and clean files.
/// Outputs are never globbed since they usually don't exist yet.
pub fn expand_step(name: String, raw: RawStep, base_dir: &Path) -> Result<Step, Error> {
    let vars = raw.vars;
    let expand_list = |files: Option<Vec<String>>| -> Vec<String> {
        files
            .unwrap_or_default()
            .iter()
            .map(|file| expand_env(file, &vars))
            .filter(|file| !file.trim().is_empty())
            .collect()
    };

    let inputs = multi_glob(&expand_list(raw.inputs), base_dir)?;
    let outputs = expand_list(raw.outputs);
    let clean = multi_glob(&expand_list(raw.clean), base_dir)?;

    Ok(Step {
        name,
        command: raw.command.unwrap_or_default(),
        inputs,
        outputs,
        clean,
        explicit: raw.explicit.unwrap_or(false),
        delete_on_fail: raw.delete_on_fail.unwrap_or(false),
        direct: raw.direct.unwrap_or(false),
        vars,
    })
}

/// Expand `$NAME` and `${NAME}`, looking in `vars` before the process
/// environment. Unknown names expand to nothing.
pub fn expand_env(text: &str, vars: &BTreeMap<String, String>) -> String {
    shellexpand::env_with_context_no_errors(text, |name| {
        let value = match vars.get(name) {
            Some(value) => value.clone(),
            None => std::env::var(name).unwrap_or_default(),
        };
        Some(value)
    })
    .into_owned()
}

/// Expand every glob pattern in `patterns` relative to `base_dir`.
///
/// Entries without glob metacharacters are kept as-is, whether or not they
/// exist. Matches of relative patterns are relative to `base_dir`, matches of
/// absolute patterns are absolute. The result is sorted with duplicates removed.
pub fn multi_glob(patterns: &[String], base_dir: &Path) -> Result<Vec<String>, Error> {
    let mut found = UniqueStrings::new();
    let root = glob::Pattern::escape(base_dir.to_str().ok_or(PathEncodingError)?);

    for pattern in patterns {
        if !is_pattern(pattern) {
            found.add(pattern.as_str());
            continue;
        }
        let absolute = Path::new(pattern).is_absolute();
        let full = if absolute {
            pattern.clone()
        } else {
            format!("{root}/{pattern}")
        };
        let paths = glob::glob(&full).map_err(|e| Error::Pattern(pattern.clone(), e))?;
        for entry in paths {
            let path = entry.map_err(|e| Error::Glob(pattern.clone(), e))?;
            let path = if absolute {
                path.as_path()
            } else {
                path.strip_prefix(base_dir).unwrap_or(&path)
            };
            found.add(path.to_str().ok_or(PathEncodingError)?);
        }
    }

    Ok(found.into_sorted())
}

fn is_pattern(s: &str) -> bool {
    s.contains(['*', '?', '[', ']'])
}
