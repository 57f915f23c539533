//! Matching of identity-provider entitlement claims against configured patterns.

use regex::Regex;

/// One or more entitlement values asserted by an identity provider.
#[derive(Debug, Clone, Copy)]
pub enum EntitlementValue<'a> {
    Single(&'a str),
    Many(&'a [String]),
}

impl<'a> From<&'a str> for EntitlementValue<'a> {
    fn from(value: &'a str) -> Self {
        EntitlementValue::Single(value)
    }
}

impl<'a> From<&'a String> for EntitlementValue<'a> {
    fn from(value: &'a String) -> Self {
        EntitlementValue::Single(value)
    }
}

impl<'a> From<&'a [String]> for EntitlementValue<'a> {
    fn from(value: &'a [String]) -> Self {
        EntitlementValue::Many(value)
    }
}

impl<'a> From<&'a Vec<String>> for EntitlementValue<'a> {
    fn from(value: &'a Vec<String>) -> Self {
        EntitlementValue::Many(value.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementMatch {
    Matched,
    NotMatched,
    /// The pattern did not compile; carries the compiler's message.
    InvalidPattern(String),
}

impl EntitlementMatch {
    pub fn is_match(&self) -> bool {
        matches!(self, EntitlementMatch::Matched)
    }
}

/// Evaluate `pattern` against the claim(s) without collapsing a bad pattern into `false`.
pub fn match_entitlement<'a>(
    value: impl Into<EntitlementValue<'a>>,
    pattern: &str,
) -> EntitlementMatch {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => return EntitlementMatch::InvalidPattern(e.to_string()),
    };

    let matched = match value.into() {
        EntitlementValue::Single(claim) => regex.is_match(claim),
        EntitlementValue::Many(claims) => claims.iter().any(|claim| regex.is_match(claim)),
    };

    if matched {
        EntitlementMatch::Matched
    } else {
        EntitlementMatch::NotMatched
    }
}

/// Fail-closed entitlement check: an invalid pattern is logged and treated as no match.
pub fn entitlement_attribute_matches<'a>(
    value: impl Into<EntitlementValue<'a>>,
    pattern: &str,
) -> bool {
    match match_entitlement(value, pattern) {
        EntitlementMatch::Matched => true,
        EntitlementMatch::NotMatched => false,
        EntitlementMatch::InvalidPattern(message) => {
            tracing::error!(
                pattern = %pattern,
                error = %message,
                "Invalid entitlement matcher pattern"
            );
            false
        }
    }
}
