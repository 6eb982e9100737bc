//! Grammar model and reader for ABNF documents.
//!
//! Rules are read with [`Grammar::from_str`] or [`Grammar::from_reader`], with
//! repeated definitions of a name merged into one record. [`classify`] then
//! sorts the rules by whether an automaton can be built for them.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::io::Read;
use std::str::FromStr;

mod error;
mod merge;
mod parser;
mod position;
mod regular;

pub use error::Error;
pub use position::Position;
pub use regular::{classify, Classification, RegularRules};

/// An identifier naming a rule. Names compare case-sensitively.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub struct RuleName(pub String);

impl RuleName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for RuleName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// How a rule occurrence was introduced.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DefinedAs {
    /// A full definition, `=`.
    Fresh,
    /// Alternatives appended to a rule, `=/`.
    Incremental,
}

impl Display for DefinedAs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DefinedAs::Fresh => write!(f, "="),
            DefinedAs::Incremental => write!(f, "=/"),
        }
    }
}

/// A named rule.
///
/// After reading, a name has exactly one `Rule`. Its body holds the branches
/// of every occurrence of the name, in the order they were declared.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Rule {
    pub name: RuleName,
    pub defined_as: DefinedAs,
    pub body: Alternation,
}

impl Rule {
    /// Names referenced directly from this rule's body.
    pub fn dependent_rule_names(&self) -> BTreeSet<&RuleName> {
        self.body.dependent_rule_names()
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.defined_as, self.body)
    }
}

/// Branches separated by `/`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Alternation(pub Vec<Concatenation>);

impl Alternation {
    pub fn branches(&self) -> &[Concatenation] {
        &self.0
    }

    pub fn dependent_rule_names(&self) -> BTreeSet<&RuleName> {
        let mut names = BTreeSet::new();
        self.collect_rule_names(&mut names);
        names
    }

    fn collect_rule_names<'a>(&'a self, names: &mut BTreeSet<&'a RuleName>) {
        for concatenation in &self.0 {
            concatenation.collect_rule_names(names);
        }
    }
}

impl Display for Alternation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (idx, concatenation) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, " / ")?;
            }
            write!(f, "{}", concatenation)?;
        }
        Ok(())
    }
}

impl FromStr for Alternation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_alternation(s.as_bytes())
    }
}

/// Repetitions matched one after the other.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Concatenation(pub Vec<Repetition>);

impl Concatenation {
    pub fn repetitions(&self) -> &[Repetition] {
        &self.0
    }

    pub fn dependent_rule_names(&self) -> BTreeSet<&RuleName> {
        let mut names = BTreeSet::new();
        self.collect_rule_names(&mut names);
        names
    }

    fn collect_rule_names<'a>(&'a self, names: &mut BTreeSet<&'a RuleName>) {
        for repetition in &self.0 {
            repetition.element.collect_rule_names(names);
        }
    }
}

impl Display for Concatenation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (idx, repetition) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", repetition)?;
        }
        Ok(())
    }
}

/// An element with an optional repeat count. No count means exactly once.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Repetition {
    pub repeat: Option<Repeat>,
    pub element: Element,
}

impl Repetition {
    /// An element matched exactly once.
    pub fn once(element: Element) -> Self {
        Repetition {
            repeat: None,
            element,
        }
    }

    pub fn dependent_rule_names(&self) -> BTreeSet<&RuleName> {
        self.element.dependent_rule_names()
    }
}

impl Display for Repetition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.repeat {
            Some(repeat) => write!(f, "{}{}", repeat, self.element),
            None => write!(f, "{}", self.element),
        }
    }
}

/// Repeat bounds. A `max` of `None` is unbounded.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Repeat {
    pub min: u32,
    pub max: Option<u32>,
    /// Written with `*` (`n*m`), rather than as a bare count (`n`).
    pub starred: bool,
}

impl Repeat {
    /// `n`, a bare count. It is read as a minimum with no maximum; the
    /// automaton compiler can be told to treat it as an exact count instead.
    pub fn count(n: u32) -> Self {
        Repeat {
            min: n,
            max: None,
            starred: false,
        }
    }

    /// `min*max`, where either side may be omitted.
    pub fn between(min: u32, max: Option<u32>) -> Self {
        Repeat {
            min,
            max,
            starred: true,
        }
    }
}

impl Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.starred {
            return write!(f, "{}", self.min);
        }
        if self.min != 0 {
            write!(f, "{}", self.min)?;
        }
        write!(f, "*")?;
        if let Some(max) = self.max {
            write!(f, "{}", max)?;
        }
        Ok(())
    }
}

/// Radix of a numeric-value literal.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Base {
    Binary,
    Decimal,
    Hexadecimal,
}

impl Base {
    pub fn radix(self) -> u32 {
        match self {
            Base::Binary => 2,
            Base::Decimal => 10,
            Base::Hexadecimal => 16,
        }
    }

    /// The letter following `%`.
    pub fn prefix(self) -> char {
        match self {
            Base::Binary => 'b',
            Base::Decimal => 'd',
            Base::Hexadecimal => 'x',
        }
    }

    pub fn from_prefix(c: u8) -> Option<Self> {
        match c.to_ascii_lowercase() {
            b'b' => Some(Base::Binary),
            b'd' => Some(Base::Decimal),
            b'x' => Some(Base::Hexadecimal),
            _ => None,
        }
    }

    pub fn is_digit(self, b: u8) -> bool {
        match self {
            Base::Binary => b == b'0' || b == b'1',
            Base::Decimal => b.is_ascii_digit(),
            Base::Hexadecimal => b.is_ascii_hexdigit(),
        }
    }

    fn write_value(self, f: &mut fmt::Formatter, value: u32) -> fmt::Result {
        match self {
            Base::Binary => write!(f, "{:b}", value),
            Base::Decimal => write!(f, "{}", value),
            Base::Hexadecimal => write!(f, "{:X}", value),
        }
    }
}

/// A `%b`, `%d`, or `%x` literal.
///
/// Ranged literals (`%x30-39`) hold exactly two values, lower then upper.
/// Otherwise the values are a dot-separated sequence (`%x0D.0A`).
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct NumericValue {
    pub base: Base,
    pub ranged: bool,
    pub values: Vec<u32>,
}

impl Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.base.prefix())?;
        let separator = if self.ranged { "-" } else { "." };
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, "{}", separator)?;
            }
            self.base.write_value(f, *value)?;
        }
        Ok(())
    }
}

/// The element variants a repetition can wrap.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Element {
    /// A reference to another rule by name.
    Rule(RuleName),
    /// `( ... )`
    Group(Alternation),
    /// `[ ... ]`
    Option(Alternation),
    /// A quoted string, matched without regard to ASCII case.
    Literal(Vec<u8>),
    NumericValue(NumericValue),
    /// `< ... >`, compiled like a literal.
    Prose(Vec<u8>),
}

impl Element {
    /// Rule names this element references, without looking into the bodies
    /// of the referenced rules.
    pub fn dependent_rule_names(&self) -> BTreeSet<&RuleName> {
        let mut names = BTreeSet::new();
        self.collect_rule_names(&mut names);
        names
    }

    fn collect_rule_names<'a>(&'a self, names: &mut BTreeSet<&'a RuleName>) {
        match self {
            Element::Rule(name) => {
                names.insert(name);
            }
            Element::Group(alternation) | Element::Option(alternation) => {
                alternation.collect_rule_names(names)
            }
            Element::Literal(_) | Element::NumericValue(_) | Element::Prose(_) => (),
        }
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Element::Rule(name) => write!(f, "{}", name),
            Element::Group(alternation) => write!(f, "( {} )", alternation),
            Element::Option(alternation) => write!(f, "[ {} ]", alternation),
            Element::Literal(bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            Element::NumericValue(value) => write!(f, "{}", value),
            Element::Prose(bytes) => write!(f, "<{}>", String::from_utf8_lossy(bytes)),
        }
    }
}

/// An ordered set of rules, one per name.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Grammar {
    pub rules: Vec<Rule>,
}

impl Grammar {
    /// Read a whole grammar document from a byte stream.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, Error> {
        let mut input = Vec::new();
        reader.read_to_end(&mut input)?;
        Self::from_bytes(&input)
    }

    pub fn from_bytes(input: &[u8]) -> Result<Self, Error> {
        let rules = parser::parse_rules(input)?;
        Ok(Grammar { rules })
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.name.as_str() == name)
    }

    pub fn classify(&self) -> Classification {
        classify(&self.rules)
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}

impl FromStr for Grammar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}
