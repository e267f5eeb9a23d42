use std::collections::VecDeque;

use util::{HashMap, HashSet};

use crate::{Error, Pipeline, Step};

/// Choose which steps take part in a run.
///
/// With no targets, every non-explicit step runs. With targets, only the
/// named steps and (transitively) the steps producing their inputs run;
/// explicit steps are included when something in that closure needs them.
pub fn select(pipeline: &Pipeline, targets: &[String]) -> Result<Vec<Step>, Error> {
    if targets.is_empty() {
        return Ok(pipeline.steps().filter(|s| !s.explicit).cloned().collect());
    }

    let mut producers: HashMap<&str, Vec<&Step>> = HashMap::default();
    for step in pipeline.steps() {
        for output in &step.outputs {
            producers.entry(output.as_str()).or_default().push(step);
        }
    }

    let mut queue = VecDeque::with_capacity(targets.len());
    for target in targets {
        match pipeline.get(target) {
            Some(step) => queue.push_back(step),
            None if pipeline.is_abstract(target) => {
                return Err(Error::AbstractTarget(target.clone()))
            }
            None => return Err(Error::UnknownStep(target.clone())),
        }
    }

    let mut chosen: HashSet<&str> = HashSet::default();
    while let Some(step) = queue.pop_front() {
        if !chosen.insert(step.name.as_str()) {
            continue;
        }
        log::debug!("selected step {}", step.name);
        for input in &step.inputs {
            if let Some(deps) = producers.get(input.as_str()) {
                queue.extend(deps.iter().copied());
            }
        }
    }

    Ok(pipeline
        .steps()
        .filter(|s| chosen.contains(s.name.as_str()))
        .cloned()
        .collect())
}
