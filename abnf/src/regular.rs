//! Sorting rules by whether an automaton can be built for them.
//!
//! A rule is regular once every rule it references is already known to be
//! satisfiable. Rules are resolved in passes until a pass makes no progress.
//! Only direct self-reference is recognised; longer cycles stay unresolved.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::{Rule, RuleName};

/// The rules found to be regular, addressable by name.
///
/// Only [`classify`] builds this set, so everything inside it has had its
/// dependencies checked.
#[derive(Debug, Clone, Default)]
pub struct RegularRules {
    rules: Vec<Rule>,
    index: HashMap<RuleName, usize>,
}

impl RegularRules {
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.index.get(name).map(|&idx| &self.rules[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Rules in the order they were found to be regular.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn push(&mut self, rule: Rule) {
        self.index.insert(rule.name.clone(), self.rules.len());
        self.rules.push(rule);
    }
}

impl<'a> IntoIterator for &'a RegularRules {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The three-way partition of a rule set.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    regular: RegularRules,
    self_resolvable: Vec<Rule>,
    unresolved: Vec<Rule>,
}

impl Classification {
    pub fn regular(&self) -> &RegularRules {
        &self.regular
    }

    /// Rules whose only unmet dependency was themselves. These are not
    /// compiled.
    pub fn self_resolvable(&self) -> &[Rule] {
        &self.self_resolvable
    }

    /// Rules left over once no pass makes progress, in input order.
    pub fn unresolved(&self) -> &[Rule] {
        &self.unresolved
    }

    /// Whether every rule was classified regular.
    pub fn is_regular_grammar(&self) -> bool {
        self.self_resolvable.is_empty() && self.unresolved.is_empty()
    }
}

/// Partition `rules` into regular, self-resolvable, and unresolved rules.
pub fn classify(rules: &[Rule]) -> Classification {
    let mut classification = Classification::default();
    let mut satisfied: HashSet<&RuleName> = HashSet::new();
    let mut pending: Vec<Option<&Rule>> = rules.iter().map(Some).collect();

    let mut pass = 0;
    loop {
        pass += 1;
        let mut progressed = false;

        for slot in pending.iter_mut().rev() {
            let rule = match *slot {
                Some(rule) => rule,
                None => continue,
            };
            let mut dependencies = rule.dependent_rule_names();

            if dependencies.iter().all(|name| satisfied.contains(name)) {
                trace!(rule = %rule.name, pass, "regular");
                satisfied.insert(&rule.name);
                classification.regular.push(rule.clone());
                *slot = None;
                progressed = true;
                continue;
            }

            if dependencies.remove(&rule.name)
                && dependencies.iter().all(|name| satisfied.contains(name))
            {
                trace!(rule = %rule.name, pass, "self-resolvable");
                satisfied.insert(&rule.name);
                classification.self_resolvable.push(rule.clone());
                *slot = None;
                progressed = true;
            }
        }

        if !progressed {
            break;
        }
    }

    classification.unresolved = pending.into_iter().flatten().cloned().collect();
    debug!(
        passes = pass,
        regular = classification.regular.len(),
        self_resolvable = classification.self_resolvable.len(),
        unresolved = classification.unresolved.len(),
        "classified rules"
    );
    classification
}
