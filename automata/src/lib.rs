//! Nondeterministic automata built from regular ABNF rules.
//!
//! ```
//! use abnf::Grammar;
//! use automata::{compile, CompileOptions};
//!
//! let grammar: Grammar = "greeting = \"hi\" 1*\"!\"\r\n".parse().unwrap();
//! let classification = grammar.classify();
//! let nfa = compile("greeting", classification.regular(), &CompileOptions::default()).unwrap();
//! assert_eq!(nfa.accepting().len(), 1);
//! ```

mod compile;
mod error;
mod nfa;

pub use compile::{compile, CompileOptions, CountMode, RangeMode, DEFAULT_REPEAT_LIMIT};
pub use error::{CompileError, CompileErrorKind};
pub use nfa::{Nfa, NfaBuilder, State, StateId};
