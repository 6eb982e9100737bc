use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use abnf::{Grammar, Rule};
use anyhow::{Context, Result};
use automata::{compile, CompileOptions, CountMode, RangeMode, DEFAULT_REPEAT_LIMIT};
use clap::{ArgAction, Parser};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "abnfc")]
#[command(about = "Compile ABNF rules into nondeterministic automata")]
struct Args {
    /// Path to the grammar file
    path: PathBuf,

    /// Rule to compile. Without it only the classification is printed.
    #[arg(short, long)]
    root: Option<String>,

    /// Compile `%x30-39` style ranges as any byte within the bounds
    #[arg(long)]
    inclusive_ranges: bool,

    /// Compile a bare count such as `3"x"` as exactly that many, not at least
    #[arg(long)]
    exact_counts: bool,

    /// Largest repeat count to unroll
    #[arg(long, default_value_t = DEFAULT_REPEAT_LIMIT)]
    repeat_limit: u32,

    /// Log more; repeat for more detail. `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let file = File::open(&args.path)
        .with_context(|| format!("open grammar file: {}", args.path.display()))?;
    let grammar = Grammar::from_reader(BufReader::new(file))
        .with_context(|| format!("read grammar: {}", args.path.display()))?;
    info!(rules = grammar.rules.len(), "read grammar");

    for rule in &grammar.rules {
        println!("{}", rule);
    }

    let classification = grammar.classify();
    print_partition("Regular", classification.regular().iter());
    print_partition("Self-resolvable", classification.self_resolvable().iter());
    print_partition("Unresolved", classification.unresolved().iter());
    if !classification.is_regular_grammar() {
        warn!("grammar is not regular; only regular rules can be compiled");
    }

    if let Some(root) = &args.root {
        let range_mode = if args.inclusive_ranges {
            RangeMode::Inclusive
        } else {
            RangeMode::Sequence
        };
        let count_mode = if args.exact_counts {
            CountMode::Exact
        } else {
            CountMode::AtLeast
        };
        let options = CompileOptions::new()
            .with_range_mode(range_mode)
            .with_count_mode(count_mode)
            .with_repeat_limit(args.repeat_limit);
        let nfa = compile(root, classification.regular(), &options)?;
        let reachable = nfa.reachable_states();
        let unreachable = nfa
            .states()
            .filter(|(id, _)| !reachable.contains(id))
            .count();
        info!(allocated = nfa.state_count(), unreachable, "compiled {}", root);
        println!("Total states = {}", reachable.len());
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn print_partition<'a, I>(title: &str, rules: I)
where
    I: Iterator<Item = &'a Rule>,
{
    println!("Begin {} Rules", title);
    for rule in rules {
        println!("{}", rule);
    }
    println!("End {} Rules", title);
}
