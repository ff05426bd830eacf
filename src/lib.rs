//! Converts a context-free grammar into its Chomsky–Schützenberger
//! representation — a Dyck language intersected with a regular filter,
//! projected by a homomorphism — and builds parse trees for input strings
//! under that grammar.

pub mod cs_representation;
pub mod grammar;
pub mod parse_tree;

pub use cs_representation::{
    build_cs_representation, format_cs_output, BracketPair, CsRepresentation,
};
pub use grammar::{parse_grammar, Grammar, GrammarSyntaxError, Production};
pub use parse_tree::{
    format_parse_tree, parse_string, ParseChild, ParseNode, ParseSyntaxError,
};
