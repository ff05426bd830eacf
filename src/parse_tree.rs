use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::grammar::{Grammar, EPSILON_DISPLAY};

/// Upper bound on terminal segmentations generated per input. The bound is
/// a heuristic, not a correctness guarantee: grammars with heavily
/// overlapping terminal prefixes may exhaust it before a valid segmentation
/// is found.
pub const MAX_SEGMENTATION_VARIANTS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseSyntaxError {
    EmptyInput,
    NoDerivation,
}

impl fmt::Display for ParseSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "empty input string for parse tree construction"),
            Self::NoDerivation => {
                write!(f, "could not build a parse tree for the input string")
            }
        }
    }
}

impl std::error::Error for ParseSyntaxError {}

/// A child of a parse node: either a subtree or a raw leaf marker (used
/// for the explicit ε marker under an epsilon expansion).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseChild {
    Node(ParseNode),
    Marker(String),
}

/// A parse-tree node: a symbol label and its ordered children. Terminal
/// matches are childless nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNode {
    symbol: String,
    children: Vec<ParseChild>,
}

impl ParseNode {
    pub fn new(symbol: impl Into<String>, children: Vec<ParseChild>) -> Self {
        ParseNode {
            symbol: symbol.into(),
            children,
        }
    }

    pub fn leaf(symbol: impl Into<String>) -> Self {
        ParseNode::new(symbol, Vec::new())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn children(&self) -> &[ParseChild] {
        &self.children
    }

    // One line per node, two-space indents, markers on their own line.
    fn pretty(&self, indent: usize) -> Vec<String> {
        let prefix = "  ".repeat(indent);
        let mut lines = vec![format!("{prefix}{}", self.symbol)];
        for child in &self.children {
            match child {
                ParseChild::Node(node) => lines.extend(node.pretty(indent + 1)),
                ParseChild::Marker(marker) => lines.push(format!("{prefix}  {marker}")),
            }
        }
        lines
    }
}

/// Renders a parse tree as indented text.
pub fn format_parse_tree(node: &ParseNode) -> String {
    node.pretty(0).join("\n")
}

/// Builds a parse tree for `input_text` under `grammar`.
///
/// The input is first turned into candidate token sequences (space split,
/// terminal segmentation, character and whole-string fallbacks); candidates
/// are then tried in order and the first complete derivation wins. The
/// derivation search is memoized and bounded by a step budget, so
/// left-recursive or cyclic grammars terminate.
pub fn parse_string(grammar: &Grammar, input_text: &str) -> Result<ParseNode, ParseSyntaxError> {
    let variants = tokenization_variants(input_text, grammar);
    if variants.is_empty() {
        return Err(ParseSyntaxError::EmptyInput);
    }

    for tokens in &variants {
        let max_steps = std::cmp::max(80, tokens.len() * 20);
        // Memo table scoped to this candidate sequence, discarded after.
        let mut memo: HashMap<MemoKey, Vec<(ParseNode, usize)>> = HashMap::new();
        let derivations =
            derive_symbol(grammar, tokens, grammar.start_symbol(), 0, max_steps, &mut memo);
        for (node, end) in derivations {
            if end == tokens.len() {
                return Ok(node);
            }
        }
    }

    Err(ParseSyntaxError::NoDerivation)
}

// Ordered, deduplicated candidate token sequences for the input.
fn tokenization_variants(text: &str, grammar: &Grammar) -> Vec<Vec<String>> {
    let raw = text.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut variants: Vec<Vec<String>> = Vec::new();

    if raw.contains(char::is_whitespace) {
        let spaced: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
        let compact: String = spaced.concat();
        variants.push(spaced);
        variants.extend(segment_with_terminals(&compact, grammar));
        variants.push(compact.chars().map(|c| c.to_string()).collect());
        variants.push(vec![compact]);
    } else {
        variants.extend(segment_with_terminals(raw, grammar));
        variants.push(raw.chars().map(|c| c.to_string()).collect());
        variants.push(vec![raw.to_string()]);
    }

    // Deduplicate, keeping first occurrence so the priority order holds.
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    variants.retain(|variant| seen.insert(variant.clone()));
    variants
}

// All segmentations of `text` into grammar terminals, longest-first at
// every position, capped at MAX_SEGMENTATION_VARIANTS per position.
fn segment_with_terminals(text: &str, grammar: &Grammar) -> Vec<Vec<String>> {
    if text.is_empty() {
        return vec![Vec::new()];
    }
    let mut terminals: Vec<&str> = grammar
        .terminals()
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .collect();
    terminals.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut memo: HashMap<usize, Vec<Vec<String>>> = HashMap::new();
    segment_from(text, 0, &terminals, &mut memo)
}

fn segment_from(
    text: &str,
    pos: usize,
    terminals: &[&str],
    memo: &mut HashMap<usize, Vec<Vec<String>>>,
) -> Vec<Vec<String>> {
    if pos == text.len() {
        return vec![Vec::new()];
    }
    if let Some(hit) = memo.get(&pos) {
        return hit.clone();
    }

    let mut segmentations: Vec<Vec<String>> = Vec::new();
    'terminals: for terminal in terminals {
        if !text[pos..].starts_with(terminal) {
            continue;
        }
        for suffix in segment_from(text, pos + terminal.len(), terminals, memo) {
            let mut segmentation = Vec::with_capacity(suffix.len() + 1);
            segmentation.push(terminal.to_string());
            segmentation.extend(suffix);
            segmentations.push(segmentation);
            if segmentations.len() >= MAX_SEGMENTATION_VARIANTS {
                break 'terminals;
            }
        }
    }

    memo.insert(pos, segmentations.clone());
    segmentations
}

type MemoKey = (String, usize, usize);

// Memoized recursive derivation of one grammar symbol at `position`.
// Returns every (subtree, next position) pair reachable within the budget.
// The budget decrements once per nonterminal-expansion recursion level;
// an exhausted branch yields nothing.
fn derive_symbol(
    grammar: &Grammar,
    tokens: &[String],
    symbol: &str,
    position: usize,
    steps_left: usize,
    memo: &mut HashMap<MemoKey, Vec<(ParseNode, usize)>>,
) -> Vec<(ParseNode, usize)> {
    if steps_left == 0 {
        return Vec::new();
    }
    let key = (symbol.to_string(), position, steps_left);
    if let Some(hit) = memo.get(&key) {
        return hit.clone();
    }

    let mut results: Vec<(ParseNode, usize)> = Vec::new();

    if grammar.is_nonterminal(symbol) {
        for rhs in grammar.alternatives_for(symbol).unwrap_or(&[]) {
            if rhs.is_empty() {
                let epsilon_child = ParseChild::Marker(EPSILON_DISPLAY.to_string());
                results.push((ParseNode::new(symbol, vec![epsilon_child]), position));
                continue;
            }
            // Left-to-right fold over the alternative, carrying every
            // (partial node, position) pair: full backtracking over the
            // ways earlier symbols' spans could end.
            let mut partials: Vec<(ParseNode, usize)> = vec![(ParseNode::leaf(symbol), position)];
            for part in rhs {
                let mut extended: Vec<(ParseNode, usize)> = Vec::new();
                for (node, pos) in &partials {
                    for (child, next_pos) in
                        derive_symbol(grammar, tokens, part, *pos, steps_left - 1, memo)
                    {
                        let mut grown = node.clone();
                        grown.children.push(ParseChild::Node(child));
                        extended.push((grown, next_pos));
                    }
                }
                partials = extended;
            }
            results.extend(partials);
        }
    } else if position < tokens.len() && tokens[position] == *symbol {
        results.push((ParseNode::leaf(symbol), position + 1));
    }

    memo.insert(key, results.clone());
    results
}
