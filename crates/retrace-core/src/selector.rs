//! CSS selector subset: parsing, matching against a [`Document`], and escaping.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute
//! selectors (`[a]`, `=`, `^=`, `$=`, `*=`, `~=`, `|=`, optional `i` flag),
//! `:nth-of-type(n)`, `:first-of-type`, descendant and child combinators, and
//! selector lists. The grammar lives in `selector.pest`; input it rejects is
//! [`SelectorError::Invalid`], and parsed features outside the subset (sibling
//! combinators, other pseudo-classes, pseudo-elements) are
//! [`SelectorError::Unsupported`].

use crate::dom::{Document, NodeId};
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use retrace_common::SelectorError;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

/// Compounds joined by combinators; `combinators[i]` sits between `parts[i]` and `parts[i + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexSelector {
    pub parts: Vec<CompoundSelector>,
    pub combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
    pub nth_of_type: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttrSelector {
    pub name: String,
    pub op: AttrOp,
    pub value: String,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Substring,
    Includes,
    DashMatch,
}

#[derive(Parser)]
#[grammar = "selector.pest"]
struct CssParser;

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let list = CssParser::parse(Rule::selector_list, input)
            .map_err(|e| invalid(input, e.variant.message()))?
            .next()
            .ok_or_else(|| invalid(input, "expected a selector"))?;

        let mut selectors = Vec::new();
        for pair in list.into_inner() {
            if pair.as_rule() == Rule::complex {
                selectors.push(build_complex(input, pair)?);
            }
        }
        Ok(SelectorList { selectors })
    }
}

fn invalid(selector: &str, reason: impl Into<String>) -> SelectorError {
    SelectorError::Invalid {
        selector: selector.to_string(),
        reason: reason.into(),
    }
}

fn unsupported(selector: &str, feature: impl Into<String>) -> SelectorError {
    SelectorError::Unsupported {
        selector: selector.to_string(),
        feature: feature.into(),
    }
}

fn build_complex(source: &str, pair: Pair<Rule>) -> Result<ComplexSelector, SelectorError> {
    let mut parts = Vec::new();
    let mut combinators = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::compound => parts.push(build_compound(source, inner)?),
            Rule::child => combinators.push(Combinator::Child),
            Rule::descendant => combinators.push(Combinator::Descendant),
            Rule::sibling => return Err(unsupported(source, "sibling combinators")),
            rule => return Err(invalid(source, format!("unexpected {:?}", rule))),
        }
    }
    Ok(ComplexSelector { parts, combinators })
}

fn build_compound(source: &str, pair: Pair<Rule>) -> Result<CompoundSelector, SelectorError> {
    let mut compound = CompoundSelector::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::type_sel => {
                if inner.as_str() != "*" {
                    compound.tag = Some(unescape(inner.as_str()).to_ascii_lowercase());
                }
            }
            Rule::id_sel => compound.id = Some(first_ident(inner)),
            Rule::class_sel => compound.classes.push(first_ident(inner)),
            Rule::attr_sel => compound.attrs.push(build_attr(inner)),
            Rule::pseudo => apply_pseudo(source, inner, &mut compound)?,
            Rule::pseudo_element => return Err(unsupported(source, "pseudo-elements")),
            rule => return Err(invalid(source, format!("unexpected {:?}", rule))),
        }
    }
    Ok(compound)
}

fn first_ident(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|ident| unescape(ident.as_str()))
        .unwrap_or_default()
}

fn build_attr(pair: Pair<Rule>) -> AttrSelector {
    let mut parts = pair.into_inner();
    let name = parts
        .next()
        .map(|ident| unescape(ident.as_str()).to_ascii_lowercase())
        .unwrap_or_default();
    let mut attr = AttrSelector {
        name,
        op: AttrOp::Exists,
        value: String::new(),
        case_insensitive: false,
    };
    for part in parts {
        match part.as_rule() {
            Rule::attr_op => {
                attr.op = match part.as_str() {
                    "=" => AttrOp::Equals,
                    "^=" => AttrOp::Prefix,
                    "$=" => AttrOp::Suffix,
                    "*=" => AttrOp::Substring,
                    "~=" => AttrOp::Includes,
                    _ => AttrOp::DashMatch,
                }
            }
            Rule::string => {
                attr.value = part
                    .into_inner()
                    .next()
                    .map(|body| unescape(body.as_str()))
                    .unwrap_or_default()
            }
            Rule::ident => attr.value = unescape(part.as_str()),
            Rule::attr_flag => attr.case_insensitive = part.as_str().eq_ignore_ascii_case("i"),
            _ => {}
        }
    }
    attr
}

fn apply_pseudo(
    source: &str,
    pair: Pair<Rule>,
    compound: &mut CompoundSelector,
) -> Result<(), SelectorError> {
    let mut parts = pair.into_inner();
    let name = parts
        .next()
        .map(|ident| unescape(ident.as_str()).to_ascii_lowercase())
        .unwrap_or_default();
    let arg = parts
        .next()
        .and_then(|args| args.into_inner().next())
        .map(|arg| arg.as_str().trim().to_string());

    match (name.as_str(), arg) {
        ("first-of-type", None) => compound.nth_of_type = Some(1),
        ("nth-of-type", Some(arg)) => {
            let n = arg
                .parse::<usize>()
                .map_err(|_| unsupported(source, ":nth-of-type with a formula"))?;
            if n == 0 {
                return Err(invalid(source, ":nth-of-type index starts at 1"));
            }
            compound.nth_of_type = Some(n);
        }
        ("nth-of-type", None) => return Err(invalid(source, "expected '(' after :nth-of-type")),
        (other, _) => return Err(unsupported(source, format!(":{}", other))),
    }
    Ok(())
}

/// Resolve CSS escapes in an identifier or string body.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let mut hex = String::new();
        while hex.len() < 6 {
            match chars.peek() {
                Some(h) if h.is_ascii_hexdigit() => {
                    hex.push(*h);
                    chars.next();
                }
                _ => break,
            }
        }
        if hex.is_empty() {
            // An escaped newline is a line continuation.
            match chars.next() {
                Some('\n') | None => {}
                Some(other) => out.push(other),
            }
            continue;
        }
        // One whitespace character terminates a hex escape.
        if chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let decoded = u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .filter(|c| *c != '\0');
        out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    out
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

pub fn matches(doc: &Document, id: NodeId, list: &SelectorList) -> bool {
    list.selectors
        .iter()
        .any(|complex| !complex.parts.is_empty() && matches_at(doc, id, complex, complex.parts.len() - 1))
}

fn matches_at(doc: &Document, id: NodeId, complex: &ComplexSelector, idx: usize) -> bool {
    if !matches_compound(doc, id, &complex.parts[idx]) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match complex.combinators[idx - 1] {
        Combinator::Child => doc
            .parent(id)
            .is_some_and(|p| matches_at(doc, p, complex, idx - 1)),
        Combinator::Descendant => doc
            .ancestors(id)
            .any(|a| matches_at(doc, a, complex, idx - 1)),
    }
}

fn matches_compound(doc: &Document, id: NodeId, compound: &CompoundSelector) -> bool {
    let Some(node) = doc.node(id) else {
        return false;
    };
    if let Some(tag) = &compound.tag
        && *tag != node.tag
    {
        return false;
    }
    if let Some(want) = &compound.id
        && node.attr("id") != Some(want.as_str())
    {
        return false;
    }
    if !compound
        .classes
        .iter()
        .all(|c| node.classes().any(|have| have == c))
    {
        return false;
    }
    if !compound
        .attrs
        .iter()
        .all(|a| matches_attr(node.attr(&a.name), a))
    {
        return false;
    }
    if let Some(n) = compound.nth_of_type
        && doc.nth_of_type(id) != n
    {
        return false;
    }
    true
}

fn matches_attr(actual: Option<&str>, sel: &AttrSelector) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let (actual, want) = if sel.case_insensitive {
        (actual.to_lowercase(), sel.value.to_lowercase())
    } else {
        (actual.to_string(), sel.value.clone())
    };
    match sel.op {
        AttrOp::Exists => true,
        AttrOp::Equals => actual == want,
        AttrOp::Prefix => !want.is_empty() && actual.starts_with(&want),
        AttrOp::Suffix => !want.is_empty() && actual.ends_with(&want),
        AttrOp::Substring => !want.is_empty() && actual.contains(&want),
        AttrOp::Includes => !want.is_empty() && actual.split_whitespace().any(|w| w == want),
        AttrOp::DashMatch => actual == want || actual.starts_with(&format!("{}-", want)),
    }
}

/// Escape a value for use inside a double-quoted CSS string.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push_str(&format!("\\{:x} ", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// `CSS.escape` for identifiers (ids, classes).
pub fn escape_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let chars: Vec<char> = ident.chars().collect();
    if chars == ['-'] {
        return "\\-".to_string();
    }
    for (i, &c) in chars.iter().enumerate() {
        let leading_digit =
            c.is_ascii_digit() && (i == 0 || (i == 1 && chars[0] == '-'));
        if c == '\0' {
            out.push(char::REPLACEMENT_CHARACTER);
        } else if c.is_control() || leading_digit {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if is_name_char(c) {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// `[name="value"]` with the value escaped.
pub fn attr_selector(name: &str, value: &str) -> String {
    format!("[{}=\"{}\"]", name, escape_string(value))
}
