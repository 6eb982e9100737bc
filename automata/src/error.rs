use abnf::RuleName;
use thiserror::Error;

/// A failed compilation. No automaton is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("compiling rule {rule}: {kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    /// The rule whose body was being compiled.
    pub rule: RuleName,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("empty alternation")]
    EmptyAlternation,
    #[error("undefined rule reference: {0}")]
    UndefinedRule(RuleName),
    #[error("cannot compile an incrementally-defined rule: {0}")]
    IncrementalRule(RuleName),
    #[error("invalid repeat: maximum {max} is below minimum {min}")]
    InvalidRepeat { min: u32, max: u32 },
    #[error("repeat count {count} exceeds the limit of {limit}")]
    RepeatTooLarge { count: u32, limit: u32 },
    #[error("numeric value {0:#X} does not fit in a byte")]
    ValueOutOfRange(u32),
    #[error("range lower bound {lower:#04X} is above upper bound {upper:#04X}")]
    InvalidRange { lower: u8, upper: u8 },
}
