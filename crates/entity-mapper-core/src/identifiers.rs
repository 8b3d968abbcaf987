//! Identifier cleaning and the key-normalization chain used when matching
//! input identifiers against fetched datasets.

use std::collections::{HashMap, HashSet};

use crate::config::MatchPolicy;

const NULL_TOKENS: [&str; 3] = ["nan", "none", "null"];
const QUOTE_CHARS: [char; 2] = ['\'', '"'];

pub fn is_null_token(value: &str) -> bool {
    NULL_TOKENS
        .iter()
        .any(|token| value.eq_ignore_ascii_case(token))
}

pub fn strip_quotes(value: &str) -> String {
    value.chars().filter(|c| !QUOTE_CHARS.contains(c)).collect()
}

/// Cleans a raw identifier for use in a remote lookup. Returns `None` for
/// blank and null-like values.
pub fn clean_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_null_token(trimmed) {
        return None;
    }

    let cleaned = strip_quotes(trimmed);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || is_null_token(cleaned) {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Cleans and deduplicates identifiers, keeping first-seen order.
pub fn prepare_identifiers<'a, I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(clean_identifier)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

pub type KeyNormalizer = fn(&str) -> Option<String>;

#[derive(Debug, Clone, Copy)]
pub struct NormalizationStep {
    pub name: &'static str,
    pub normalize: KeyNormalizer,
}

fn as_is(id: &str) -> Option<String> {
    Some(id.to_string())
}

fn strip_leading_zeros(id: &str) -> Option<String> {
    Some(id.trim_start_matches('0').to_string())
}

fn canonical_integer(id: &str) -> Option<String> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = id.trim_start_matches('0');
    Some(if digits.is_empty() {
        "0".to_string()
    } else {
        digits.to_string()
    })
}

const EXACT_STEPS: &[NormalizationStep] = &[NormalizationStep {
    name: "exact",
    normalize: as_is,
}];

const FALLBACK_STEPS: &[NormalizationStep] = &[
    NormalizationStep {
        name: "exact",
        normalize: as_is,
    },
    NormalizationStep {
        name: "strip_leading_zeros",
        normalize: strip_leading_zeros,
    },
    NormalizationStep {
        name: "canonical_integer",
        normalize: canonical_integer,
    },
];

/// A lookup hit: the matched value and the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMatch<'a, T> {
    pub value: &'a T,
    pub rule: &'static str,
}

impl<T> KeyMatch<'_, T> {
    pub fn is_fallback(&self) -> bool {
        self.rule != "exact"
    }
}

/// Ordered list of normalizations tried against a key map; first hit wins.
#[derive(Debug, Clone, Copy)]
pub struct FallbackChain {
    policy: MatchPolicy,
    steps: &'static [NormalizationStep],
}

impl FallbackChain {
    pub fn for_policy(policy: MatchPolicy) -> Self {
        let steps = match policy {
            MatchPolicy::Exact => EXACT_STEPS,
            MatchPolicy::Fallback => FALLBACK_STEPS,
        };
        Self { policy, steps }
    }

    /// Every non-empty form `raw` takes under the chain's steps, in step
    /// order and without repeats.
    pub fn candidates(&self, raw: &str) -> Vec<String> {
        let probe = self.probe_key(raw);
        let mut candidates: Vec<String> = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            let Some(candidate) = (step.normalize)(&probe) else {
                continue;
            };
            if !candidate.is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    /// Widens cleaned lookup identifiers with their normalized forms, so keys
    /// stored only as `7` are fetched for an input of `007`.
    pub fn expand_lookup_ids(&self, ids: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        ids.iter()
            .flat_map(|id| self.candidates(id))
            .filter(|candidate| seen.insert(candidate.clone()))
            .collect()
    }

    /// Form a fetched key takes in the lookup map.
    pub fn index_key(&self, key: &str) -> String {
        match self.policy {
            MatchPolicy::Exact => key.to_string(),
            MatchPolicy::Fallback => key.trim().to_string(),
        }
    }

    /// Form an input identifier takes before the chain runs.
    pub fn probe_key(&self, raw: &str) -> String {
        match self.policy {
            MatchPolicy::Exact => raw.to_string(),
            MatchPolicy::Fallback => strip_quotes(raw).trim().to_string(),
        }
    }

    pub fn resolve<'a, T>(&self, map: &'a HashMap<String, T>, raw: &str) -> Option<KeyMatch<'a, T>> {
        clean_identifier(raw)?;
        let probe = self.probe_key(raw);

        self.steps.iter().find_map(|step| {
            let candidate = (step.normalize)(&probe)?;
            if candidate.is_empty() {
                return None;
            }
            map.get(&candidate).map(|value| KeyMatch {
                value,
                rule: step.name,
            })
        })
    }
}
