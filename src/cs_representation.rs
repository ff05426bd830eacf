use std::collections::BTreeMap;

use crate::grammar::{Grammar, EPSILON_DISPLAY};

// Bottom-of-stack marker, a member of the stack alphabet K.
pub const BOTTOM_MARKER: &str = "⊥";

/// One Γ bracket pair, synthesized for a stack-alphabet symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketPair {
    pub open: String,
    pub close: String,
    pub symbol: String,
}

/// Chomsky–Schützenberger representation of a grammar:
///
///   L(G) = h(R ∩ Dyck_Γ)
///
/// following the constructive proof via a PDA simulation of the CFG:
/// - K is the stack alphabet (nonterminals, terminals, bottom marker).
/// - Γ has one bracket pair per symbol of K.
/// - R is a regular filter over Γ* describing valid local PDA steps
///   (expansions and terminal matches).
/// - Dyck_Γ enforces stack discipline (well-nested, type-correct push/pop).
/// - h maps closing terminal brackets to their terminal, all else to ε.
///
/// The representation is correct but not necessarily minimal. It is
/// recomputed fresh from a [`Grammar`] on every request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsRepresentation {
    stack_symbols: Vec<String>,
    gamma_pairs: Vec<BracketPair>,
    step_regex: String,
    r_regex: String,
    homomorphism: BTreeMap<String, String>,
}

impl CsRepresentation {
    /// Stack alphabet K, in canonical display order.
    pub fn stack_symbols(&self) -> &[String] {
        &self.stack_symbols
    }

    pub fn gamma_pairs(&self) -> &[BracketPair] {
        &self.gamma_pairs
    }

    /// The STEP alternation: one alternative per production, then one per
    /// terminal match, in that order.
    pub fn step_regex(&self) -> &str {
        &self.step_regex
    }

    /// The envelope `R = [⊥ [S (STEP)* ]⊥`.
    pub fn r_regex(&self) -> &str {
        &self.r_regex
    }

    /// Homomorphism over every bracket of Γ. The empty string denotes ε.
    pub fn homomorphism(&self) -> &BTreeMap<String, String> {
        &self.homomorphism
    }
}

pub fn open_bracket(symbol: &str) -> String {
    format!("[{symbol}")
}

pub fn close_bracket(symbol: &str) -> String {
    format!("]{symbol}")
}

/// Builds K, Γ, R, and h for an arbitrary CFG, ε-productions included.
/// Total: every syntactically valid grammar has a representation.
pub fn build_cs_representation(grammar: &Grammar) -> CsRepresentation {
    let stack_symbols = build_stack_alphabet(grammar);

    let gamma_pairs: Vec<BracketPair> = stack_symbols
        .iter()
        .map(|symbol| BracketPair {
            open: open_bracket(symbol),
            close: close_bracket(symbol),
            symbol: symbol.clone(),
        })
        .collect();

    let (r_regex, step_regex) = build_r_components(grammar);

    // h is derived from the stack alphabet, so it is total over Γ by
    // construction: ]t maps to the terminal t, every other bracket to ε.
    let mut homomorphism = BTreeMap::new();
    for symbol in &stack_symbols {
        if grammar.is_terminal(symbol) {
            homomorphism.insert(open_bracket(symbol), String::new());
            homomorphism.insert(close_bracket(symbol), symbol.clone());
        } else {
            homomorphism.insert(open_bracket(symbol), String::new());
            homomorphism.insert(close_bracket(symbol), String::new());
        }
    }

    CsRepresentation {
        stack_symbols,
        gamma_pairs,
        step_regex,
        r_regex,
        homomorphism,
    }
}

// K = N ∪ Σ ∪ {⊥}: sorted nonterminals, sorted terminals, bottom marker,
// duplicates suppressed keeping the first occurrence. The start symbol is
// always included since the envelope pushes it.
fn build_stack_alphabet(grammar: &Grammar) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::new();
    let mut add = |symbol: &str, ordered: &mut Vec<String>| {
        if !ordered.iter().any(|s| s == symbol) {
            ordered.push(symbol.to_string());
        }
    };

    let mut nonterminal_group: Vec<&str> =
        grammar.nonterminals().iter().map(String::as_str).collect();
    if !grammar.is_nonterminal(grammar.start_symbol())
        && !grammar.is_terminal(grammar.start_symbol())
    {
        nonterminal_group.push(grammar.start_symbol());
        nonterminal_group.sort();
    }

    for symbol in nonterminal_group {
        add(symbol, &mut ordered);
    }
    for symbol in grammar.terminals() {
        add(symbol, &mut ordered);
    }
    add(BOTTOM_MARKER, &mut ordered);
    ordered
}

// STEP alternatives, in the observable contract order: one per production
// alternative (grammar order), then one per terminal (sorted order).
fn build_r_components(grammar: &Grammar) -> (String, String) {
    let mut step_alternatives: Vec<String> = Vec::new();

    // Expansion A -> X1 X2 ... Xk becomes ]A [Xk ... [X1: the symbols are
    // pushed in reverse so X1 ends up on top of the stack. For k = 0 the
    // alternative is just ]A.
    for production in grammar.productions() {
        for rhs in production.alternatives() {
            let mut parts = vec![close_bracket(production.lhs())];
            parts.extend(rhs.iter().rev().map(|symbol| open_bracket(symbol)));
            step_alternatives.push(parts.join(" "));
        }
    }

    // Matching a terminal against the next input symbol pops it.
    for terminal in grammar.terminals() {
        step_alternatives.push(close_bracket(terminal));
    }

    let step_regex = if step_alternatives.is_empty() {
        EPSILON_DISPLAY.to_string()
    } else {
        step_alternatives
            .iter()
            .map(|alt| format!("({alt})"))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let r_regex = format!(
        "{} {} (STEP)* {}",
        open_bracket(BOTTOM_MARKER),
        open_bracket(grammar.start_symbol()),
        close_bracket(BOTTOM_MARKER)
    );
    (r_regex, step_regex)
}

/// Sectioned, human-readable rendering of the representation. The section
/// order is an externally observed contract; callers compare it verbatim.
pub fn format_cs_output(
    grammar: &Grammar,
    cs: &CsRepresentation,
    parse_tree_text: Option<&str>,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("Chomsky–Schützenberger representation".to_string());
    lines.push("L = h(R ∩ Dyck_Γ)".to_string());
    lines.push(String::new());

    lines.push("[SECTION Steps]".to_string());
    lines.push("1) Build the stack alphabet K = N ∪ Σ ∪ {⊥}.".to_string());
    lines.push(
        "2) Build Γ = {[X, ]X | X ∈ K} (one bracket pair per stack symbol).".to_string(),
    );
    lines.push(
        "3) Build the regular filter R as the valid local CFG→PDA steps (expansion/match)."
            .to_string(),
    );
    lines.push(
        "4) Intersect R with Dyck_Γ (Dyck enforces stack discipline: nesting and type match)."
            .to_string(),
    );
    lines.push(
        "5) Apply the homomorphism h: ]t -> t for terminals t, every other bracket -> ε."
            .to_string(),
    );
    lines.push(String::new());

    lines.push("[SECTION K]".to_string());
    lines.push("Stack alphabet K (nonterminals, terminals, ⊥):".to_string());
    lines.push(format!("K = {{{}}}", cs.stack_symbols.join(", ")));
    lines.push(String::new());

    lines.push("[SECTION Γ]".to_string());
    lines.push("Bracket alphabet Γ (one pair per stack symbol):".to_string());
    for pair in &cs.gamma_pairs {
        lines.push(format!(
            "- {} ... {}   (for stack symbol {})",
            pair.open, pair.close, pair.symbol
        ));
    }
    lines.push(String::new());

    lines.push("[SECTION Dyck_Γ]".to_string());
    lines.push(
        "Dyck_Γ is the set of well-nested, type-matched bracket words over Γ.".to_string(),
    );
    lines.push(String::new());

    lines.push("[SECTION R]".to_string());
    lines.push("Regular filter R ⊆ Γ* (regex-like notation):".to_string());
    lines.push(format!("STEP = {}", cs.step_regex));
    lines.push(format!("R = {}", cs.r_regex));
    lines.push(String::new());

    lines.push("STEP decoded (local PDA steps):".to_string());
    for production in grammar.productions() {
        for rhs in production.alternatives() {
            let rhs_str = if rhs.is_empty() {
                EPSILON_DISPLAY.to_string()
            } else {
                rhs.join(" ")
            };
            let mut parts = vec![close_bracket(production.lhs())];
            parts.extend(rhs.iter().rev().map(|symbol| open_bracket(symbol)));
            lines.push(format!(
                "  - expand: {} -> {}   ==>   {}",
                production.lhs(),
                rhs_str,
                parts.join(" ")
            ));
        }
    }
    for terminal in grammar.terminals() {
        lines.push(format!(
            "  - match : {}   ==>   {}",
            terminal,
            close_bracket(terminal)
        ));
    }
    lines.push(String::new());

    lines.push("[SECTION h]".to_string());
    lines.push("Homomorphism h: Γ* -> Σ*".to_string());
    for (bracket, image) in &cs.homomorphism {
        let image = if image.is_empty() {
            EPSILON_DISPLAY
        } else {
            image.as_str()
        };
        lines.push(format!("  {bracket} -> {image}"));
    }

    if let Some(tree_text) = parse_tree_text {
        lines.push(String::new());
        lines.push("[SECTION Parse Tree]".to_string());
        lines.push("Parse tree for the input string:".to_string());
        lines.push(tree_text.to_string());
    }

    lines.join("\n")
}
