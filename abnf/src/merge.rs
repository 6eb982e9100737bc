use std::collections::HashMap;

use tracing::trace;

use crate::error::Error;
use crate::position::Position;
use crate::{DefinedAs, Rule, RuleName};

/// One rule as it appeared in the input, and the byte offset of its name.
pub(crate) struct Occurrence {
    pub rule: Rule,
    pub offset: usize,
}

/// Fold occurrences into one rule per name, in order of each name's first
/// appearance.
pub(crate) fn merge_occurrences(
    full: &[u8],
    occurrences: Vec<Occurrence>,
) -> Result<Vec<Rule>, Error> {
    let mut rules: Vec<Rule> = Vec::with_capacity(occurrences.len());
    let mut index: HashMap<RuleName, usize> = HashMap::new();

    for Occurrence { rule, offset } in occurrences {
        match index.get(&rule.name) {
            Some(&idx) => merge(&mut rules[idx], rule).map_err(|name| {
                let Position { line, column } = Position::locate(full, offset);
                Error::Collision {
                    rule: name.0,
                    line,
                    column,
                }
            })?,
            None => {
                index.insert(rule.name.clone(), rules.len());
                rules.push(rule);
            }
        }
    }
    Ok(rules)
}

/// Append the branches of a later occurrence to an existing record.
///
/// Only one full definition is allowed per name. A full definition promotes
/// an incremental record; the branches are appended either way.
fn merge(record: &mut Rule, occurrence: Rule) -> Result<(), RuleName> {
    if occurrence.defined_as == DefinedAs::Fresh {
        if record.defined_as == DefinedAs::Fresh {
            return Err(occurrence.name);
        }
        record.defined_as = DefinedAs::Fresh;
    }
    trace!(
        rule = %record.name,
        branches = occurrence.body.0.len(),
        "merging rule occurrence"
    );
    record.body.0.extend(occurrence.body.0);
    Ok(())
}
