//! Thompson-style construction over the grammar model.
//!
//! Every node is emitted between an entry and an exit state supplied by its
//! parent. Rule references are inlined, so the finished automaton has no
//! notion of rules at all.

use abnf::{
    Alternation, Concatenation, DefinedAs, Element, NumericValue, RegularRules, Repetition,
    RuleName,
};
use tracing::{debug, trace};

use crate::error::{CompileError, CompileErrorKind};
use crate::nfa::{Nfa, NfaBuilder, StateId};

/// How a ranged numeric value such as `%x30-39` is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeMode {
    /// Two transitions in a row, on the lower bound and then the upper bound.
    #[default]
    Sequence,
    /// One transition from entry to exit for every byte in the inclusive range.
    Inclusive,
}

/// How a bare repeat count such as `3"x"` is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    /// At least that many occurrences, like `3*"x"`.
    #[default]
    AtLeast,
    /// Exactly that many occurrences, like `3*3"x"`. A bare `0` compiles to
    /// an epsilon edge.
    Exact,
}

/// The largest repeat count compiled by default.
pub const DEFAULT_REPEAT_LIMIT: u32 = 1 << 16;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub range_mode: RangeMode,
    pub count_mode: CountMode,
    /// Repetitions needing more element copies than this fail with
    /// [`CompileErrorKind::RepeatTooLarge`]. Each copy allocates at least one
    /// state.
    pub repeat_limit: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            range_mode: RangeMode::default(),
            count_mode: CountMode::default(),
            repeat_limit: DEFAULT_REPEAT_LIMIT,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range_mode(mut self, range_mode: RangeMode) -> Self {
        self.range_mode = range_mode;
        self
    }

    pub fn with_count_mode(mut self, count_mode: CountMode) -> Self {
        self.count_mode = count_mode;
        self
    }

    pub fn with_repeat_limit(mut self, repeat_limit: u32) -> Self {
        self.repeat_limit = repeat_limit;
        self
    }
}

/// Build an automaton for `root`.
///
/// Only rules in `rules` are visible. The root is looked up like any other
/// reference, so an undefined or incremental-only root is an error. The
/// automaton has a single accepting state.
///
/// Repetitions are unrolled, so the state count grows with repeat counts. See
/// [`CompileOptions::repeat_limit`].
pub fn compile(
    root: &str,
    rules: &RegularRules,
    options: &CompileOptions,
) -> Result<Nfa> {
    let root = RuleName::from(root);
    let mut compiler = Compiler {
        builder: NfaBuilder::new(),
        rules,
        options,
        root: root.clone(),
        stack: Vec::new(),
    };

    let entry = compiler.builder.add_state();
    let exit = compiler.builder.add_state();
    compiler.emit_reference(&root, entry, exit)?;

    let nfa = compiler.builder.finish(entry, [exit]);
    debug!(root = %root, states = nfa.state_count(), "compiled automaton");
    Ok(nfa)
}

struct Compiler<'a> {
    builder: NfaBuilder,
    rules: &'a RegularRules,
    options: &'a CompileOptions,
    root: RuleName,
    /// Rules currently being inlined, innermost last.
    stack: Vec<&'a RuleName>,
}

type Result<T> = std::result::Result<T, CompileError>;

impl<'a> Compiler<'a> {
    fn error(&self, kind: CompileErrorKind) -> CompileError {
        let rule = self.stack.last().map_or(&self.root, |name| *name);
        CompileError {
            kind,
            rule: rule.clone(),
        }
    }

    fn emit_reference(&mut self, name: &RuleName, entry: StateId, exit: StateId) -> Result<()> {
        let rules = self.rules;
        let rule = match rules.get(name.as_str()) {
            Some(rule) => rule,
            None => return Err(self.error(CompileErrorKind::UndefinedRule(name.clone()))),
        };
        if rule.defined_as == DefinedAs::Incremental {
            return Err(self.error(CompileErrorKind::IncrementalRule(name.clone())));
        }

        trace!(rule = %rule.name, depth = self.stack.len(), "inlining rule");
        self.stack.push(&rule.name);
        let result = self.emit_alternation(&rule.body, entry, exit);
        self.stack.pop();
        result
    }

    /// Every branch shares the same entry and exit.
    fn emit_alternation(
        &mut self,
        alternation: &'a Alternation,
        entry: StateId,
        exit: StateId,
    ) -> Result<()> {
        if alternation.branches().is_empty() {
            return Err(self.error(CompileErrorKind::EmptyAlternation));
        }
        for branch in alternation.branches() {
            self.emit_concatenation(branch, entry, exit)?;
        }
        Ok(())
    }

    fn emit_concatenation(
        &mut self,
        concatenation: &'a Concatenation,
        entry: StateId,
        exit: StateId,
    ) -> Result<()> {
        let repetitions = concatenation.repetitions();
        if repetitions.is_empty() {
            self.builder.add_epsilon(entry, exit);
            return Ok(());
        }

        let mut from = entry;
        for (idx, repetition) in repetitions.iter().enumerate() {
            let to = if idx + 1 == repetitions.len() {
                exit
            } else {
                self.builder.add_state()
            };
            self.emit_repetition(repetition, from, to)?;
            from = to;
        }
        Ok(())
    }

    fn emit_repetition(
        &mut self,
        repetition: &'a Repetition,
        entry: StateId,
        exit: StateId,
    ) -> Result<()> {
        let element = &repetition.element;
        let repeat = match repetition.repeat {
            Some(repeat) => repeat,
            None => return self.emit_element(element, entry, exit),
        };

        let max = match (repeat.starred, self.options.count_mode) {
            (false, CountMode::Exact) => Some(repeat.min),
            _ => repeat.max,
        };
        let copies = max.unwrap_or(repeat.min);
        if copies > self.options.repeat_limit {
            return Err(self.error(CompileErrorKind::RepeatTooLarge {
                count: copies,
                limit: self.options.repeat_limit,
            }));
        }

        match (repeat.min, max) {
            (min, Some(max)) if max < min => {
                Err(self.error(CompileErrorKind::InvalidRepeat { min, max }))
            }
            (0, Some(0)) if !repeat.starred => {
                self.builder.add_epsilon(entry, exit);
                Ok(())
            }
            // Zero or more: skip straight to exit, then loop on exit.
            (0, None) => {
                self.builder.add_epsilon(entry, exit);
                self.emit_element(element, exit, exit)
            }
            (min, None) => {
                let last = self.emit_chain(element, entry, min - 1)?;
                self.emit_element(element, last, exit)?;
                self.emit_element(element, exit, exit)
            }
            (0, Some(max)) => self.emit_optional_chain(element, entry, exit, max),
            (min, Some(max)) if min == max => {
                let last = self.emit_chain(element, entry, max - 1)?;
                self.emit_element(element, last, exit)
            }
            (min, Some(max)) => {
                let last = self.emit_chain(element, entry, min)?;
                self.emit_optional_chain(element, last, exit, max - min)
            }
        }
    }

    /// `count` mandatory copies of `element` starting at `from`, each into a
    /// fresh state. Returns the state after the last copy.
    fn emit_chain(&mut self, element: &'a Element, from: StateId, count: u32) -> Result<StateId> {
        let mut current = from;
        for _ in 0..count {
            let next = self.builder.add_state();
            self.emit_element(element, current, next)?;
            current = next;
        }
        Ok(current)
    }

    /// Up to `count` copies of `element`, where the walk may leave for `exit`
    /// before any of them. A `count` of zero behaves like one.
    fn emit_optional_chain(
        &mut self,
        element: &'a Element,
        from: StateId,
        exit: StateId,
        count: u32,
    ) -> Result<()> {
        let mut current = from;
        for _ in 1..count {
            self.builder.add_epsilon(current, exit);
            let next = self.builder.add_state();
            self.emit_element(element, current, next)?;
            current = next;
        }
        self.builder.add_epsilon(current, exit);
        self.emit_element(element, current, exit)
    }

    fn emit_element(&mut self, element: &'a Element, entry: StateId, exit: StateId) -> Result<()> {
        match element {
            Element::Rule(name) => self.emit_reference(name, entry, exit),
            Element::Group(alternation) => self.emit_alternation(alternation, entry, exit),
            Element::Option(alternation) => {
                self.builder.add_epsilon(entry, exit);
                self.emit_alternation(alternation, entry, exit)
            }
            Element::Literal(bytes) | Element::Prose(bytes) => {
                self.emit_bytes(bytes, true, entry, exit);
                Ok(())
            }
            Element::NumericValue(value) => self.emit_numeric_value(value, entry, exit),
        }
    }

    fn emit_numeric_value(
        &mut self,
        value: &NumericValue,
        entry: StateId,
        exit: StateId,
    ) -> Result<()> {
        let bytes = value
            .values
            .iter()
            .map(|&v| u8::try_from(v).map_err(|_| self.error(CompileErrorKind::ValueOutOfRange(v))))
            .collect::<Result<Vec<u8>>>()?;

        match (value.ranged, self.options.range_mode, bytes.as_slice()) {
            (true, RangeMode::Inclusive, &[lower, upper]) => {
                if upper < lower {
                    return Err(self.error(CompileErrorKind::InvalidRange { lower, upper }));
                }
                for byte in lower..=upper {
                    self.builder.add_transition(entry, byte, exit);
                }
            }
            _ => self.emit_bytes(&bytes, false, entry, exit),
        }
        Ok(())
    }

    /// A linear chain with one transition per byte, the last landing on
    /// `exit`. With `fold_case`, ASCII letters match in either case.
    fn emit_bytes(&mut self, bytes: &[u8], fold_case: bool, entry: StateId, exit: StateId) {
        let (last, init) = match bytes.split_last() {
            Some(split) => split,
            None => {
                self.builder.add_epsilon(entry, exit);
                return;
            }
        };

        let mut from = entry;
        for &byte in init {
            let next = self.builder.add_state();
            self.add_byte(from, byte, fold_case, next);
            from = next;
        }
        self.add_byte(from, *last, fold_case, exit);
    }

    fn add_byte(&mut self, from: StateId, byte: u8, fold_case: bool, to: StateId) {
        if fold_case && byte.is_ascii_alphabetic() {
            self.builder
                .add_transition(from, byte.to_ascii_lowercase(), to);
            self.builder
                .add_transition(from, byte.to_ascii_uppercase(), to);
        } else {
            self.builder.add_transition(from, byte, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abnf::{classify, Grammar, Rule};
    use pretty_assertions::assert_eq;

    fn compile_str(input: &str, root: &str, options: &CompileOptions) -> Result<Nfa> {
        let grammar: Grammar = input.parse().unwrap();
        compile(root, grammar.classify().regular(), options)
    }

    fn error_of(input: &str, root: &str) -> CompileError {
        compile_str(input, root, &CompileOptions::default()).unwrap_err()
    }

    fn edges(nfa: &Nfa, id: StateId) -> Vec<(u8, Vec<usize>)> {
        nfa.state(id)
            .unwrap()
            .transitions()
            .iter()
            .map(|(byte, to)| (*byte, to.iter().map(|s| s.index()).collect()))
            .collect()
    }

    #[test]
    fn state_counts() {
        let tests = vec![
            ("a = \"abc\"\r\n", 4),
            ("a = \"\"\r\n", 2),
            ("a = \"x\" / \"y\"\r\n", 2),
            ("a = \"x\" \"y\" \"z\"\r\n", 4),
            ("a = 3\"x\"\r\n", 4),
            ("a = *\"x\"\r\n", 2),
            ("a = 2*\"x\"\r\n", 3),
            ("a = *3\"x\"\r\n", 4),
            ("a = 1*3\"x\"\r\n", 4),
            ("a = 0\"x\"\r\n", 2),
            ("a = *0\"x\"\r\n", 2),
            ("a = b b\r\nb = \"xy\"\r\n", 5),
        ];
        for (input, expected) in tests {
            let nfa = compile_str(input, "a", &CompileOptions::default()).unwrap();
            assert_eq!(nfa.state_count(), expected, "input: {:?}", input);
            assert_eq!(nfa.reachable_states().len(), expected, "input: {:?}", input);
        }
    }

    #[test]
    fn literal_letters_fold_case() {
        let nfa = compile_str("a = \"a1\"\r\n", "a", &CompileOptions::default()).unwrap();
        assert_eq!(edges(&nfa, nfa.entry()), vec![(b'A', vec![2]), (b'a', vec![2])]);
        assert_eq!(edges(&nfa, StateId(2)), vec![(b'1', vec![1])]);
    }

    #[test]
    fn numeric_values_do_not_fold_case() {
        let nfa = compile_str("a = %x61\r\n", "a", &CompileOptions::default()).unwrap();
        assert_eq!(edges(&nfa, nfa.entry()), vec![(b'a', vec![1])]);
    }

    #[test]
    fn option_adds_skip_edge() {
        let nfa = compile_str("a = [ \"x\" ]\r\n", "a", &CompileOptions::default()).unwrap();
        let entry = nfa.state(nfa.entry()).unwrap();
        assert!(entry.epsilon().contains(&StateId(1)));
        assert_eq!(edges(&nfa, nfa.entry()), vec![(b'X', vec![1]), (b'x', vec![1])]);
    }

    #[test]
    fn ranged_values_follow_range_mode() {
        let grammar = "digit = %x30-32\r\n";

        let nfa = compile_str(grammar, "digit", &CompileOptions::default()).unwrap();
        assert_eq!(nfa.state_count(), 3);
        assert_eq!(edges(&nfa, nfa.entry()), vec![(0x30, vec![2])]);
        assert_eq!(edges(&nfa, StateId(2)), vec![(0x32, vec![1])]);

        let options = CompileOptions::new().with_range_mode(RangeMode::Inclusive);
        let nfa = compile_str(grammar, "digit", &options).unwrap();
        assert_eq!(nfa.state_count(), 2);
        assert_eq!(
            edges(&nfa, nfa.entry()),
            vec![(0x30, vec![1]), (0x31, vec![1]), (0x32, vec![1])]
        );
    }

    #[test]
    fn errors_carry_rule_context() {
        let tests = vec![
            ("a = b\r\n", "a", CompileErrorKind::UndefinedRule("a".into()), "a"),
            (
                "a = \"x\" b\r\nb = \"y\" / b \"y\"\r\n",
                "a",
                CompileErrorKind::UndefinedRule("b".into()),
                "a",
            ),
            ("a = \"x\"\r\n", "z", CompileErrorKind::UndefinedRule("z".into()), "z"),
            (
                "a = \"x\" b\r\nb =/ \"y\"\r\n",
                "a",
                CompileErrorKind::IncrementalRule("b".into()),
                "a",
            ),
            ("b =/ \"y\"\r\n", "b", CompileErrorKind::IncrementalRule("b".into()), "b"),
            (
                "a = \"x\" b\r\nb = 3*1\"y\"\r\n",
                "a",
                CompileErrorKind::InvalidRepeat { min: 3, max: 1 },
                "b",
            ),
            ("a = %x100\r\n", "a", CompileErrorKind::ValueOutOfRange(0x100), "a"),
        ];
        for (input, root, kind, rule) in tests {
            let got = error_of(input, root);
            assert_eq!(
                got,
                CompileError {
                    kind,
                    rule: rule.into()
                },
                "input: {:?}",
                input
            );
        }
    }

    #[test]
    fn bare_counts_follow_count_mode() {
        let tests = vec![
            ("a = 3\"x\"\r\n", CountMode::AtLeast, 4, true),
            ("a = 3\"x\"\r\n", CountMode::Exact, 4, false),
            ("a = 0\"x\"\r\n", CountMode::AtLeast, 2, true),
            ("a = 0\"x\"\r\n", CountMode::Exact, 2, false),
        ];
        for (input, mode, states, loops_on_exit) in tests {
            let options = CompileOptions::new().with_count_mode(mode);
            let nfa = compile_str(input, "a", &options).unwrap();
            assert_eq!(nfa.state_count(), states, "input: {:?} {:?}", input, mode);
            let exit = nfa.state(StateId(1)).unwrap();
            assert_eq!(
                exit.next(b'x').any(|to| to == StateId(1)),
                loops_on_exit,
                "input: {:?} {:?}",
                input,
                mode
            );
        }
    }

    #[test]
    fn zero_maximum_keeps_final_optional_copy() {
        for input in ["a = *0\"x\"\r\n", "a = 0*0\"x\"\r\n"] {
            let nfa = compile_str(input, "a", &CompileOptions::default()).unwrap();
            let entry = nfa.state(nfa.entry()).unwrap();
            assert!(entry.epsilon().contains(&StateId(1)), "input: {:?}", input);
            assert_eq!(edges(&nfa, nfa.entry()), vec![(b'X', vec![1]), (b'x', vec![1])]);
        }
    }

    #[test]
    fn repeat_counts_are_limited() {
        let tests = vec![
            (
                "a = 4000000000\"x\"\r\n",
                CompileOptions::default(),
                4_000_000_000,
                DEFAULT_REPEAT_LIMIT,
            ),
            (
                "a = *70000\"x\"\r\n",
                CompileOptions::default(),
                70_000,
                DEFAULT_REPEAT_LIMIT,
            ),
            ("a = 1*3\"x\"\r\n", CompileOptions::new().with_repeat_limit(2), 3, 2),
        ];
        for (input, options, count, limit) in tests {
            let err = compile_str(input, "a", &options).unwrap_err();
            assert_eq!(
                err.kind,
                CompileErrorKind::RepeatTooLarge { count, limit },
                "input: {:?}",
                input
            );
        }
        let options = CompileOptions::new().with_repeat_limit(3);
        assert!(compile_str("a = 1*3\"x\"\r\n", "a", &options).is_ok());
    }

    #[test]
    fn transitions_stay_inside_the_arena() {
        let nfa = compile_str(
            "a = 2*4( b / [ %x30.31 ] ) *\"z\"\r\nb = \"xy\" 3\"q\"\r\n",
            "a",
            &CompileOptions::default(),
        )
        .unwrap();
        let mut seen = 0;
        for (id, state) in nfa.states() {
            assert_eq!(id.index(), seen);
            seen += 1;
            for to in state.transitions().values().flatten().chain(state.epsilon()) {
                assert!(to.index() < nfa.state_count(), "{} -> {}", id, to);
            }
        }
        assert_eq!(seen, nfa.state_count());
    }

    #[test]
    fn self_resolvable_rules_are_not_compiled() {
        let err = error_of("a = \"x\" / a \"x\"\r\n", "a");
        assert_eq!(err.kind, CompileErrorKind::UndefinedRule("a".into()));
    }

    #[test]
    fn inverted_inclusive_range_is_an_error() {
        let options = CompileOptions::new().with_range_mode(RangeMode::Inclusive);
        let err = compile_str("a = %x39-30\r\n", "a", &options).unwrap_err();
        assert_eq!(
            err.kind,
            CompileErrorKind::InvalidRange {
                lower: 0x39,
                upper: 0x30
            }
        );
    }

    #[test]
    fn empty_alternation_is_an_error() {
        let rules = vec![Rule {
            name: "a".into(),
            defined_as: DefinedAs::Fresh,
            body: Alternation(Vec::new()),
        }];
        let classification = classify(&rules);
        let err = compile("a", classification.regular(), &CompileOptions::default()).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::EmptyAlternation);
    }

    #[test]
    fn compilations_are_independent() {
        let grammar: Grammar = "a = \"xy\"\r\n".parse().unwrap();
        let classification = grammar.classify();
        let first = compile("a", classification.regular(), &CompileOptions::default()).unwrap();
        let second = compile("a", classification.regular(), &CompileOptions::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.entry().index(), 0);
    }
}
