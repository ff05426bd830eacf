use std::collections::BTreeSet;
use std::fmt;

// How ε (the empty symbol sequence) is displayed in rendered output.
pub const EPSILON_DISPLAY: &str = "ε";

// Spellings that denote an epsilon alternative in grammar text.
const EPSILON_SPELLINGS: [&str; 3] = ["ε", "epsilon", "\"\""];

// Accepted arrow markers between the left- and right-hand side of a rule.
const ARROWS: [&str; 2] = ["->", "→"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarSyntaxError {
    EmptyInput,
    MissingArrow(usize),
    ContinuationWithoutRule(usize),
    EmptyLeftHandSide(usize),
    EmptyRightHandSide(usize),
    UnterminatedQuote(usize),
    EmptyQuotedLiteral(usize),
    ReservedToken(String, usize),
}

impl GrammarSyntaxError {
    /// 1-based source line the error was detected on, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::EmptyInput => None,
            Self::MissingArrow(line)
            | Self::ContinuationWithoutRule(line)
            | Self::EmptyLeftHandSide(line)
            | Self::EmptyRightHandSide(line)
            | Self::UnterminatedQuote(line)
            | Self::EmptyQuotedLiteral(line)
            | Self::ReservedToken(_, line) => Some(*line),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::EmptyInput => "empty grammar input".to_string(),
            Self::MissingArrow(_) => {
                "missing '->' (or '→') and not a '|' continuation line".to_string()
            }
            Self::ContinuationWithoutRule(_) => {
                "continuation line '|' without a preceding rule".to_string()
            }
            Self::EmptyLeftHandSide(_) => "empty left-hand side of rule".to_string(),
            Self::EmptyRightHandSide(_) => "empty right-hand side of rule".to_string(),
            Self::UnterminatedQuote(_) => "unterminated quoted literal".to_string(),
            Self::EmptyQuotedLiteral(_) => {
                "empty quoted literal; use ε for an epsilon alternative".to_string()
            }
            Self::ReservedToken(token, _) => {
                format!("reserved control token inside a symbol: {token}")
            }
        }
    }
}

impl fmt::Display for GrammarSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line() {
            Some(line) => write!(f, "Line {}: {}", line, self.message()),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for GrammarSyntaxError {}

/// One grammar rule: a nonterminal and its ordered alternative right-hand
/// sides. An empty alternative denotes ε.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    lhs: String,
    alternatives: Vec<Vec<String>>,
}

impl Production {
    pub fn new(lhs: impl Into<String>, alternatives: Vec<Vec<String>>) -> Self {
        Production {
            lhs: lhs.into(),
            alternatives,
        }
    }

    pub fn lhs(&self) -> &str {
        &self.lhs
    }

    pub fn alternatives(&self) -> &[Vec<String>] {
        &self.alternatives
    }
}

/// A context-free grammar, immutable once built. Production order and
/// symbol order within alternatives are preserved from the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    start_symbol: String,
    productions: Vec<Production>,
    nonterminals: BTreeSet<String>,
    terminals: BTreeSet<String>,
}

impl Grammar {
    // The terminal set is derived, not declared: every right-hand-side
    // symbol that is not a production left-hand side is a terminal.
    pub fn new(productions: Vec<Production>, start_symbol: impl Into<String>) -> Self {
        let nonterminals: BTreeSet<String> =
            productions.iter().map(|p| p.lhs.clone()).collect();

        let mut terminals = BTreeSet::new();
        for production in &productions {
            for alternative in &production.alternatives {
                for symbol in alternative {
                    if !nonterminals.contains(symbol) {
                        terminals.insert(symbol.clone());
                    }
                }
            }
        }

        Grammar {
            start_symbol: start_symbol.into(),
            productions,
            nonterminals,
            terminals,
        }
    }

    pub fn start_symbol(&self) -> &str {
        &self.start_symbol
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn nonterminals(&self) -> &BTreeSet<String> {
        &self.nonterminals
    }

    pub fn terminals(&self) -> &BTreeSet<String> {
        &self.terminals
    }

    pub fn is_nonterminal(&self, symbol: &str) -> bool {
        self.nonterminals.contains(symbol)
    }

    pub fn is_terminal(&self, symbol: &str) -> bool {
        self.terminals.contains(symbol)
    }

    pub fn find_production(&self, lhs: &str) -> Option<&Production> {
        self.productions.iter().find(|p| p.lhs == lhs)
    }

    /// The alternative right-hand sides of a nonterminal, in declared order.
    pub fn alternatives_for(&self, lhs: &str) -> Option<&[Vec<String>]> {
        self.find_production(lhs).map(|p| p.alternatives())
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for production in &self.productions {
            let alternatives: Vec<String> = production
                .alternatives
                .iter()
                .map(|alt| {
                    if alt.is_empty() {
                        EPSILON_DISPLAY.to_string()
                    } else {
                        alt.join(" ")
                    }
                })
                .collect();
            writeln!(f, "{} -> {}", production.lhs, alternatives.join(" | "))?;
        }
        Ok(())
    }
}

/// Parses line-oriented grammar text into a [`Grammar`].
///
/// The first left-hand side encountered becomes the start symbol. Lines
/// starting with `|` extend the previous rule; blank lines are skipped.
pub fn parse_grammar(text: &str) -> Result<Grammar, GrammarSyntaxError> {
    if text.trim().is_empty() {
        return Err(GrammarSyntaxError::EmptyInput);
    }

    // Pre-scan every left-hand side so that a nonterminal defined later in
    // the text is already recognized while tokenizing earlier rules.
    let lhs_names = collect_lhs_names(text);

    let mut productions: Vec<Production> = Vec::new();
    let mut start_symbol: Option<String> = None;
    let mut last_lhs: Option<String> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('|') {
            // Continuation line: more alternatives for the previous rule.
            let lhs = last_lhs
                .clone()
                .ok_or(GrammarSyntaxError::ContinuationWithoutRule(line_no))?;
            let alternatives = parse_rhs(rest, &lhs_names, line_no)?;
            extend_production(&mut productions, &lhs, alternatives);
            continue;
        }

        let (lhs_raw, rhs) =
            split_at_arrow(line).ok_or(GrammarSyntaxError::MissingArrow(line_no))?;
        let lhs = normalize_symbol(lhs_raw.trim());
        if lhs.is_empty() {
            return Err(GrammarSyntaxError::EmptyLeftHandSide(line_no));
        }

        if start_symbol.is_none() {
            start_symbol = Some(lhs.clone());
        }

        let alternatives = parse_rhs(rhs, &lhs_names, line_no)?;
        extend_production(&mut productions, &lhs, alternatives);
        last_lhs = Some(lhs);
    }

    let start_symbol = start_symbol.ok_or(GrammarSyntaxError::EmptyInput)?;
    Ok(Grammar::new(productions, start_symbol))
}

// Appends alternatives to an existing rule for `lhs`, or starts a new one.
fn extend_production(
    productions: &mut Vec<Production>,
    lhs: &str,
    alternatives: Vec<Vec<String>>,
) {
    match productions.iter_mut().find(|p| p.lhs == lhs) {
        Some(production) => production.alternatives.extend(alternatives),
        None => productions.push(Production::new(lhs, alternatives)),
    }
}

// Splits a line at the earliest arrow marker, returning (lhs, rhs).
fn split_at_arrow(line: &str) -> Option<(&str, &str)> {
    let (pos, len) = ARROWS
        .iter()
        .filter_map(|arrow| line.find(arrow).map(|pos| (pos, arrow.len())))
        .min_by_key(|(pos, _)| *pos)?;
    Some((&line[..pos], &line[pos + len..]))
}

// Unwraps a token fully wrapped in angle brackets: `<Name>` becomes `Name`.
fn normalize_symbol(symbol: &str) -> String {
    if symbol.len() >= 2 && symbol.starts_with('<') && symbol.ends_with('>') {
        symbol[1..symbol.len() - 1].to_string()
    } else {
        symbol.to_string()
    }
}

// Collects every (normalized) left-hand-side name in the text.
fn collect_lhs_names(text: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('|') {
            continue;
        }
        if let Some((lhs_raw, _)) = split_at_arrow(line) {
            let lhs = normalize_symbol(lhs_raw.trim());
            if !lhs.is_empty() {
                names.insert(lhs);
            }
        }
    }
    names
}

// Parses the right-hand side of a rule into alternatives of symbol
// sequences. The `|` separator is quote-aware.
fn parse_rhs(
    rhs: &str,
    lhs_names: &BTreeSet<String>,
    line_no: usize,
) -> Result<Vec<Vec<String>>, GrammarSyntaxError> {
    if rhs.trim().is_empty() {
        return Err(GrammarSyntaxError::EmptyRightHandSide(line_no));
    }

    let mut alternatives = Vec::new();
    for alternative in split_alternatives(rhs, line_no)? {
        let alternative = alternative.trim();
        if alternative.is_empty() || EPSILON_SPELLINGS.contains(&alternative) {
            alternatives.push(Vec::new());
            continue;
        }
        alternatives.push(tokenize_symbols(alternative, lhs_names, line_no)?);
    }
    Ok(alternatives)
}

// Splits on `|`, ignoring separators inside double-quoted literals.
fn split_alternatives(rhs: &str, line_no: usize) -> Result<Vec<String>, GrammarSyntaxError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut chars = rhs.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '\\' if in_quote => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '|' if !in_quote => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    if in_quote {
        return Err(GrammarSyntaxError::UnterminatedQuote(line_no));
    }
    parts.push(current);
    Ok(parts)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

// Tries the longest known nonterminal name matching at the start of `rest`.
// A match is accepted only when it is a single character, starts with a
// non-identifier character, or ends on an identifier boundary; otherwise a
// short nonterminal would swallow the prefix of a longer identifier.
fn match_nonterminal<'a>(rest: &str, names: &[&'a str]) -> Option<&'a str> {
    for &name in names {
        if !rest.starts_with(name) {
            continue;
        }
        let first = name.chars().next()?;
        let single_char = name.chars().count() == 1;
        let boundary = rest[name.len()..]
            .chars()
            .next()
            .map_or(true, |next| !is_identifier_char(next));
        if single_char || !is_identifier_start(first) || boundary {
            return Some(name);
        }
    }
    None
}

// Scans a quoted literal starting at the opening `"`. Returns the unescaped
// contents and the number of bytes consumed, including both quotes.
fn scan_quoted_literal(
    rest: &str,
    line_no: usize,
) -> Result<(String, usize), GrammarSyntaxError> {
    let mut contents = String::new();
    let mut chars = rest.char_indices().skip(1);

    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((contents, idx + 1)),
            '\\' => match chars.next() {
                Some((_, escaped @ ('"' | '\\'))) => contents.push(escaped),
                Some((_, other)) => {
                    // Unknown escape: keep the backslash literally.
                    contents.push('\\');
                    contents.push(other);
                }
                None => return Err(GrammarSyntaxError::UnterminatedQuote(line_no)),
            },
            _ => contents.push(c),
        }
    }
    Err(GrammarSyntaxError::UnterminatedQuote(line_no))
}

// Tokenizes one alternative into grammar symbols, left to right. Known
// nonterminal names are matched longest-first so that compact notation
// like `N(P)` and spaced notation coexist in the same grammar.
fn tokenize_symbols(
    alternative: &str,
    lhs_names: &BTreeSet<String>,
    line_no: usize,
) -> Result<Vec<String>, GrammarSyntaxError> {
    // An arrow outside a quoted literal means malformed quoting; it would
    // otherwise be shredded into punctuation tokens and silently accepted.
    if let Some(arrow) = find_bare_arrow(alternative) {
        return Err(GrammarSyntaxError::ReservedToken(arrow.to_string(), line_no));
    }

    let mut names: Vec<&str> = lhs_names.iter().map(String::as_str).collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut tokens: Vec<String> = Vec::new();
    let mut rest = alternative;

    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            rest = &rest[c.len_utf8()..];
            continue;
        }

        // `<Name>` span: one token, angle brackets stripped.
        if c == '<' {
            if let Some(end) = rest.find('>') {
                tokens.push(rest[1..end].to_string());
                rest = &rest[end + 1..];
                continue;
            }
            // No closing bracket: `<` falls through to a punctuation token.
        }

        // Quoted terminal literal with escapes.
        if c == '"' {
            let (literal, consumed) = scan_quoted_literal(rest, line_no)?;
            if literal.is_empty() {
                return Err(GrammarSyntaxError::EmptyQuotedLiteral(line_no));
            }
            tokens.push(literal);
            rest = &rest[consumed..];
            continue;
        }

        if let Some(name) = match_nonterminal(rest, &names) {
            tokens.push(name.to_string());
            rest = &rest[name.len()..];
            continue;
        }

        if c.is_ascii_digit() {
            tokens.push(c.to_string());
            rest = &rest[c.len_utf8()..];
            continue;
        }

        if is_identifier_start(c) {
            // Greedy identifier run, stopping where a known nonterminal
            // name begins so a contiguous run splits at the reference.
            let mut end = c.len_utf8();
            while let Some(next) = rest[end..].chars().next() {
                if !is_identifier_char(next) || match_nonterminal(&rest[end..], &names).is_some()
                {
                    break;
                }
                end += next.len_utf8();
            }
            tokens.push(rest[..end].to_string());
            rest = &rest[end..];
            continue;
        }

        // Operator or punctuation terminal.
        tokens.push(c.to_string());
        rest = &rest[c.len_utf8()..];
    }

    Ok(tokens)
}

// Looks for an arrow marker in the unquoted portions of an alternative.
fn find_bare_arrow(alternative: &str) -> Option<&'static str> {
    let mut bare = String::new();
    let mut in_quote = false;
    let mut chars = alternative.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quote = !in_quote,
            '\\' if in_quote => {
                chars.next();
            }
            _ if !in_quote => bare.push(c),
            _ => {}
        }
    }
    ARROWS.iter().find(|arrow| bare.contains(*arrow)).copied()
}

#[cfg(test)]
mod grammar_parser_tests {
    use super::*;

    #[test]
    fn parses_basic_rule_with_epsilon() {
        let grammar = parse_grammar("S -> a S b | ε").unwrap();
        assert_eq!(grammar.start_symbol(), "S");
        assert_eq!(
            grammar.alternatives_for("S").unwrap(),
            &[
                vec!["a".to_string(), "S".to_string(), "b".to_string()],
                vec![]
            ]
        );
        assert!(grammar.is_terminal("a"));
        assert!(grammar.is_terminal("b"));
        assert!(grammar.is_nonterminal("S"));
    }

    #[test]
    fn parses_multiple_rules_and_keeps_order() {
        let grammar = parse_grammar("S -> A B | b\nA -> a A | a\nB -> b B | b").unwrap();
        assert_eq!(grammar.start_symbol(), "S");
        let lhs_order: Vec<&str> = grammar.productions().iter().map(|p| p.lhs()).collect();
        assert_eq!(lhs_order, ["S", "A", "B"]);
        assert_eq!(grammar.alternatives_for("A").unwrap().len(), 2);
        assert_eq!(grammar.alternatives_for("B").unwrap().len(), 2);
    }

    #[test]
    fn reparsing_is_deterministic() {
        let text = "S -> A B | b\nA -> a A | a\nB -> b B | b";
        assert_eq!(parse_grammar(text).unwrap(), parse_grammar(text).unwrap());
    }

    #[test]
    fn terminal_and_nonterminal_sets_are_disjoint() {
        let grammar = parse_grammar("S -> a S b | A\nA -> a A | ε").unwrap();
        assert!(grammar.nonterminals().is_disjoint(grammar.terminals()));
        for production in grammar.productions() {
            for alternative in production.alternatives() {
                for symbol in alternative {
                    assert!(
                        grammar.is_terminal(symbol) != grammar.is_nonterminal(symbol),
                        "symbol {symbol} must be in exactly one set"
                    );
                }
            }
        }
    }

    #[test]
    fn continuation_line_extends_previous_rule() {
        let grammar = parse_grammar("S -> a\n| b | c").unwrap();
        assert_eq!(grammar.alternatives_for("S").unwrap().len(), 3);
    }

    #[test]
    fn continuation_without_rule_is_an_error() {
        let err = parse_grammar("| a").unwrap_err();
        assert_eq!(err, GrammarSyntaxError::ContinuationWithoutRule(1));
    }

    #[test]
    fn unicode_arrow_is_accepted() {
        let grammar = parse_grammar("S → a b").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap(),
            &[vec!["a".to_string(), "b".to_string()]]
        );
    }

    #[test]
    fn angle_bracket_lhs_is_normalized() {
        let grammar = parse_grammar("<Expr> -> a <Expr> | a").unwrap();
        assert_eq!(grammar.start_symbol(), "Expr");
        assert!(grammar.is_nonterminal("Expr"));
    }

    #[test]
    fn later_rule_for_same_lhs_merges_alternatives() {
        let grammar = parse_grammar("S -> a\nS -> b").unwrap();
        assert_eq!(grammar.alternatives_for("S").unwrap().len(), 2);
        assert_eq!(grammar.productions().len(), 1);
    }

    #[test]
    fn missing_arrow_is_an_error_with_line() {
        let err = parse_grammar("S -> a\nS a S b").unwrap_err();
        assert_eq!(err, GrammarSyntaxError::MissingArrow(2));
        assert_eq!(err.line(), Some(2));
    }

    #[test]
    fn blank_input_is_an_error() {
        assert_eq!(parse_grammar("   \n  "), Err(GrammarSyntaxError::EmptyInput));
    }

    #[test]
    fn empty_lhs_is_an_error() {
        assert_eq!(
            parse_grammar(" -> a"),
            Err(GrammarSyntaxError::EmptyLeftHandSide(1))
        );
    }

    #[test]
    fn empty_rhs_is_an_error() {
        assert_eq!(
            parse_grammar("S -> "),
            Err(GrammarSyntaxError::EmptyRightHandSide(1))
        );
    }

    #[test]
    fn unterminated_quote_reports_its_line() {
        let err = parse_grammar("A -> a\nS -> \"abc").unwrap_err();
        assert_eq!(err, GrammarSyntaxError::UnterminatedQuote(2));
        assert!(err.to_string().contains("Line 2"));
    }

    #[test]
    fn empty_quoted_literal_among_symbols_is_an_error() {
        assert_eq!(
            parse_grammar("S -> a \"\" b"),
            Err(GrammarSyntaxError::EmptyQuotedLiteral(1))
        );
    }

    #[test]
    fn lone_empty_quoted_literal_is_epsilon() {
        let grammar = parse_grammar("S -> a | \"\"").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap(),
            &[vec!["a".to_string()], vec![]]
        );
    }

    #[test]
    fn quoted_literal_keeps_pipe_and_escapes() {
        let grammar = parse_grammar(r#"S -> "a|b" | "say \"hi\"" | "back\\slash""#).unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap(),
            &[
                vec!["a|b".to_string()],
                vec!["say \"hi\"".to_string()],
                vec!["back\\slash".to_string()]
            ]
        );
    }

    #[test]
    fn quoted_literal_with_punctuation() {
        let grammar = parse_grammar("S -> \"ISSUE(tenant=\" id \")\"").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap(),
            &[vec![
                "ISSUE(tenant=".to_string(),
                "id".to_string(),
                ")".to_string()
            ]]
        );
    }

    #[test]
    fn compact_notation_splits_at_nonterminal_references() {
        let grammar = parse_grammar("P -> N(P) | N\nN -> 1 | 2").unwrap();
        assert_eq!(
            grammar.alternatives_for("P").unwrap()[0],
            vec![
                "N".to_string(),
                "(".to_string(),
                "P".to_string(),
                ")".to_string()
            ]
        );
    }

    #[test]
    fn longest_nonterminal_name_wins() {
        let grammar =
            parse_grammar("S -> NumProd\nNumProd -> Num * NumProd | Num\nNum -> 1").unwrap();
        assert_eq!(
            grammar.alternatives_for("NumProd").unwrap()[0],
            vec!["Num".to_string(), "*".to_string(), "NumProd".to_string()]
        );
    }

    #[test]
    fn short_nonterminal_does_not_split_longer_identifier() {
        // `Num` must not match as a prefix of the identifier `Number`.
        let grammar = parse_grammar("S -> Number\nNum -> 1").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap(),
            &[vec!["Number".to_string()]]
        );
        assert!(grammar.is_terminal("Number"));
    }

    #[test]
    fn identifier_run_splits_at_embedded_nonterminal() {
        let grammar = parse_grammar("S -> readS | x").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap()[0],
            vec!["read".to_string(), "S".to_string()]
        );
    }

    #[test]
    fn multi_character_terminal_word_survives() {
        let grammar = parse_grammar("S -> read_write | x").unwrap();
        assert!(grammar.is_terminal("read_write"));
    }

    #[test]
    fn digits_are_single_tokens() {
        let grammar = parse_grammar("S -> 12 | a").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap()[0],
            vec!["1".to_string(), "2".to_string()]
        );
    }

    #[test]
    fn compact_characters_split_one_by_one() {
        let grammar = parse_grammar("S -> aSb | ε").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap()[0],
            vec!["a".to_string(), "S".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn nonterminal_defined_later_is_recognized_earlier() {
        let grammar = parse_grammar("S -> ExprEnd\nExpr -> a\nEnd -> .").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap()[0],
            vec!["Expr".to_string(), "End".to_string()]
        );
    }

    #[test]
    fn angle_bracket_reference_in_rhs() {
        let grammar = parse_grammar("S -> <S> a | b").unwrap();
        assert_eq!(
            grammar.alternatives_for("S").unwrap()[0],
            vec!["S".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn reserved_arrow_token_is_rejected() {
        let err = parse_grammar("S -> <a->b>").unwrap_err();
        assert!(matches!(err, GrammarSyntaxError::ReservedToken(_, 1)));
    }

    #[test]
    fn display_renders_rules_with_epsilon() {
        let grammar = parse_grammar("S -> a S b | ε").unwrap();
        assert_eq!(grammar.to_string(), "S -> a S b | ε\n");
    }
}
