//! Model-name patterns as the proxy's limit enforcer evaluates them.
//!
//! Patterns use `filepath.Match` syntax: `*` and `?` never match `/`,
//! `[a-z]` and `[^...]` are character classes and `\` escapes the next
//! character. They are rewritten into the `glob` crate's dialect before
//! matching. A malformed pattern only matches itself.

use glob::{MatchOptions, Pattern};
use std::iter::Peekable;
use std::str::Chars;

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Whether `model` matches `pattern`
pub fn match_model(pattern: &str, model: &str) -> bool {
    if pattern == model {
        return true;
    }
    compile(pattern).is_some_and(|compiled| compiled.matches_with(model, OPTIONS))
}

fn compile(pattern: &str) -> Option<Pattern> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            // `**` has a path meaning in `glob`; a run of stars is one star here
            '*' => {
                while chars.next_if_eq(&'*').is_some() {}
                out.push('*');
            }
            '?' => out.push('?'),
            '[' => class(&mut chars, &mut out)?,
            '\\' => push_literal(&mut out, chars.next()?),
            c => push_literal(&mut out, c),
        }
    }
    Pattern::new(&out).ok()
}

fn push_literal(out: &mut String, c: char) {
    match c {
        '*' | '?' | '[' | ']' => {
            out.push('[');
            out.push(c);
            out.push(']');
        }
        c => out.push(c),
    }
}

/// One member of a class: a plain or escaped character, never a bare `-` or `]`
fn class_char(chars: &mut Peekable<Chars>) -> Option<char> {
    match chars.next()? {
        '-' | ']' => None,
        '\\' => chars.next(),
        c => Some(c),
    }
}

/// Rewrite the class whose `[` was just consumed
fn class(chars: &mut Peekable<Chars>, out: &mut String) -> Option<()> {
    let negated = chars.next_if_eq(&'^').is_some();
    let mut ranges = Vec::new();
    loop {
        if !ranges.is_empty() && chars.next_if_eq(&']').is_some() {
            break;
        }
        let lo = class_char(chars)?;
        let hi = match chars.next_if_eq(&'-') {
            Some(_) => class_char(chars)?,
            None => lo,
        };
        ranges.push((lo, hi));
    }

    if let [(lo, hi)] = ranges[..]
        && lo == hi
        && !negated
    {
        push_literal(out, lo);
        return Some(());
    }

    // `]` is only a member right after the opening bracket and `-` only at the end
    if ranges
        .iter()
        .any(|&(lo, hi)| lo != hi && ([lo, hi].contains(&'-') || [lo, hi].contains(&']')))
    {
        return None;
    }
    let position = |&(lo, _): &(char, char)| match lo {
        ']' => 0,
        '!' => 2,
        '-' => 3,
        _ => 1,
    };
    ranges.sort_by_key(position);
    // A leading `!` would read as negation
    if !negated && ranges.first().is_some_and(|&(lo, _)| lo == '!') {
        return None;
    }

    out.push('[');
    if negated {
        out.push('!');
    }
    for (lo, hi) in ranges {
        out.push(lo);
        if lo != hi {
            out.push('-');
            out.push(hi);
        }
    }
    out.push(']');
    Some(())
}
