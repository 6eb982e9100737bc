use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Index of a state within its automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub(crate) usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Outgoing edges of a single state.
///
/// A byte may lead to several states; nothing here resolves that choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    transitions: BTreeMap<u8, BTreeSet<StateId>>,
    epsilon: BTreeSet<StateId>,
}

impl State {
    /// Successors on `byte`.
    pub fn next(&self, byte: u8) -> impl Iterator<Item = StateId> + '_ {
        self.transitions.get(&byte).into_iter().flatten().copied()
    }

    pub fn transitions(&self) -> &BTreeMap<u8, BTreeSet<StateId>> {
        &self.transitions
    }

    pub fn epsilon(&self) -> &BTreeSet<StateId> {
        &self.epsilon
    }

    fn successors(&self) -> impl Iterator<Item = StateId> + '_ {
        self.transitions
            .values()
            .flatten()
            .chain(self.epsilon.iter())
            .copied()
    }
}

/// A finished automaton. It owns all of its states and is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nfa {
    states: Vec<State>,
    entry: StateId,
    accepting: BTreeSet<StateId>,
}

impl Nfa {
    pub fn entry(&self) -> StateId {
        self.entry
    }

    pub fn accepting(&self) -> &BTreeSet<StateId> {
        &self.accepting
    }

    pub fn is_accepting(&self, id: StateId) -> bool {
        self.accepting.contains(&id)
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0)
    }

    /// Every allocated state, including any not reachable from the entry.
    pub fn states(&self) -> impl Iterator<Item = (StateId, &State)> {
        self.states
            .iter()
            .enumerate()
            .map(|(idx, state)| (StateId(idx), state))
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// States reachable from the entry over byte and epsilon edges.
    pub fn reachable_states(&self) -> BTreeSet<StateId> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(state) = self.state(id) {
                stack.extend(state.successors().filter(|next| !visited.contains(next)));
            }
        }
        visited
    }
}

/// Allocates states and edges for an automaton under construction.
#[derive(Debug, Default)]
pub struct NfaBuilder {
    states: Vec<State>,
}

impl NfaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self) -> StateId {
        self.states.push(State::default());
        StateId(self.states.len() - 1)
    }

    /// Panics if `from` was not allocated by this builder.
    pub fn add_transition(&mut self, from: StateId, byte: u8, to: StateId) {
        self.states[from.0]
            .transitions
            .entry(byte)
            .or_default()
            .insert(to);
    }

    /// Panics if `from` was not allocated by this builder.
    pub fn add_epsilon(&mut self, from: StateId, to: StateId) {
        self.states[from.0].epsilon.insert(to);
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn finish<I>(self, entry: StateId, accepting: I) -> Nfa
    where
        I: IntoIterator<Item = StateId>,
    {
        Nfa {
            states: self.states,
            entry,
            accepting: accepting.into_iter().collect(),
        }
    }
}
