//! The selector subset understood by [`crate::SimHost`].
//!
//! Supported: type (`div`), id (`#a`), class (`.b`), universal (`*`), compounds
//! (`div.card#x`), the descendant combinator (whitespace) and selector lists (`,`).
//! Everything else is rejected with [`SelectorError::Invalid`].

use visible::SelectorError;

use crate::node::{NodeId, Tree};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    // `None` is the universal selector.
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Compound {
    fn parse(source: &str) -> Result<Self, String> {
        let mut compound = Self::default();
        let mut rest = source;
        if let Some(r) = rest.strip_prefix('*') {
            rest = r;
        } else {
            let (tag, r) = split_ident(rest);
            if !tag.is_empty() {
                compound.tag = Some(tag.to_ascii_lowercase());
            }
            rest = r;
        }

        while let Some(marker) = rest.chars().next() {
            if marker != '#' && marker != '.' {
                return Err(format!("unsupported character `{marker}`"));
            }
            let (name, r) = split_ident(&rest[marker.len_utf8()..]);
            if name.is_empty() {
                return Err(format!("expected a name after `{marker}`"));
            }
            if marker == '#' {
                compound.id = Some(name.to_owned());
            } else {
                compound.classes.push(name.to_owned());
            }
            rest = r;
        }
        Ok(compound)
    }

    fn matches(&self, tree: &Tree, node: NodeId) -> bool {
        let Some(data) = tree.get(node) else {
            return false;
        };
        self.tag.as_ref().is_none_or(|t| *t == data.tag)
            && self
                .id
                .as_ref()
                .is_none_or(|id| data.id.as_ref() == Some(id))
            && self.classes.iter().all(|c| data.classes.contains(c))
    }
}

fn split_ident(s: &str) -> (&str, &str) {
    let end = s
        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
        .unwrap_or(s.len());
    s.split_at(end)
}

/// A parsed comma-separated selector list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SelectorList {
    // Each entry is a descendant chain, outermost compound first.
    complexes: Vec<Vec<Compound>>,
}

impl SelectorList {
    pub(crate) fn parse(selector: &str) -> Result<Self, SelectorError> {
        let mut complexes = Vec::new();
        for part in selector.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(SelectorError::invalid(selector, "empty selector"));
            }
            let chain = part
                .split_whitespace()
                .map(Compound::parse)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| SelectorError::invalid(selector, reason))?;
            complexes.push(chain);
        }
        Ok(Self { complexes })
    }

    pub(crate) fn matches(&self, tree: &Tree, node: NodeId) -> bool {
        self.complexes
            .iter()
            .any(|chain| matches_chain(chain, tree, node))
    }
}

fn matches_chain(chain: &[Compound], tree: &Tree, node: NodeId) -> bool {
    let Some((subject, ancestors)) = chain.split_last() else {
        return false;
    };
    if !subject.matches(tree, node) {
        return false;
    }
    // Descendant-only chains can be matched greedily against the nearest ancestor.
    let mut cursor = tree.parent(node);
    for compound in ancestors.iter().rev() {
        loop {
            let Some(a) = cursor else {
                return false;
            };
            cursor = tree.parent(a);
            if compound.matches(tree, a) {
                break;
            }
        }
    }
    true
}
