use std::fs;
use std::path::PathBuf;

use clap::Parser;
use cs_converter::{
    build_cs_representation, format_cs_output, format_parse_tree, parse_grammar, parse_string,
};
use eyre::{Result, WrapErr};

/// Convert a context-free grammar to its Chomsky–Schützenberger
/// representation and optionally build a parse tree for an input string.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path to the grammar file (one rule per line, `LHS -> RHS | RHS`)
    grammar: PathBuf,

    /// Input string to build a parse tree for
    #[arg(short, long)]
    input: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let text = fs::read_to_string(&args.grammar)
        .wrap_err_with(|| format!("could not read grammar file {}", args.grammar.display()))?;

    let grammar = parse_grammar(&text)?;
    let cs = build_cs_representation(&grammar);

    let parse_tree_text = match &args.input {
        Some(input) => Some(format_parse_tree(&parse_string(&grammar, input)?)),
        None => None,
    };

    println!(
        "{}",
        format_cs_output(&grammar, &cs, parse_tree_text.as_deref())
    );
    Ok(())
}
