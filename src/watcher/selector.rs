// ============================================================================
// chatmod-core - Compound Selectors
//
// Minimal selector engine for the virtual document: type, universal,
// .class, #id, [attr], [attr=value], compounds of those, and comma lists.
// Combinators are not supported; the virtual document has no tree.
// ============================================================================

use crate::core::error::DomError;
use crate::watcher::virtual_dom::VirtualElement;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, el: &VirtualElement) -> bool {
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(el.tag()) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.id() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| el.has_class(c)) {
            return false;
        }
        self.attributes.iter().all(|(name, expected)| match expected {
            Some(value) => el.attribute(name) == Some(value.as_str()),
            None => el.attribute(name).is_some(),
        })
    }
}

/// A parsed comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    compounds: Vec<Compound>,
}

impl SelectorList {
    pub fn parse(source: &str) -> Result<Self, DomError> {
        let invalid = || DomError::InvalidSelector(source.to_string());

        let compounds = source
            .split(',')
            .map(|part| parse_compound(part.trim()).ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { compounds })
    }

    pub fn matches(&self, el: &VirtualElement) -> bool {
        self.compounds.iter().any(|c| c.matches(el))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    (!ident.is_empty()).then_some(ident)
}

fn parse_compound(source: &str) -> Option<Compound> {
    if source.is_empty() {
        return None;
    }

    let mut compound = Compound::default();
    let mut chars = source.chars().peekable();

    match chars.peek() {
        Some('*') => {
            chars.next();
        }
        Some(&c) if is_ident_char(c) => compound.tag = Some(take_ident(&mut chars)?),
        _ => {}
    }

    while let Some(c) = chars.next() {
        match c {
            '.' => compound.classes.push(take_ident(&mut chars)?),
            '#' => {
                if compound.id.is_some() {
                    return None;
                }
                compound.id = Some(take_ident(&mut chars)?);
            }
            '[' => {
                let name = take_ident(&mut chars)?;
                let value = match chars.next()? {
                    ']' => None,
                    '=' => {
                        let value = take_attr_value(&mut chars)?;
                        if chars.next()? != ']' {
                            return None;
                        }
                        Some(value)
                    }
                    _ => return None,
                };
                compound.attributes.push((name, value));
            }
            _ => return None,
        }
    }
    Some(compound)
}

fn take_attr_value(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<String> {
    match chars.peek().copied() {
        Some(quote @ ('"' | '\'')) => {
            chars.next();
            let mut value = String::new();
            loop {
                let c = chars.next()?;
                if c == quote {
                    return Some(value);
                }
                value.push(c);
            }
        }
        _ => take_ident(chars),
    }
}

// =============================================================================
// TESTS
// =============================================================================
