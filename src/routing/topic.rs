use std::fmt;

use super::errors::RoutingError;

// ============================================================================
// Topic Matching - AMQP topic-exchange semantics
// ============================================================================
//
// Routing keys and binding patterns are dot-separated token sequences.
// Pattern tokens:
// - literal  must equal the key token exactly (case-sensitive)
// - `*`      matches exactly one token
// - `#`      only as the final token, matches zero or more remaining tokens
//
// Patterns are validated once, at registration time. Matching itself never
// fails.
//
// ============================================================================

const SEPARATOR: char = '.';
const SINGLE_WILDCARD: &str = "*";
const MULTI_WILDCARD: &str = "#";

/// A single token of a validated topic pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternToken {
    Literal(String),
    /// `*`
    AnyOne,
    /// Trailing `#`
    AnyRest,
}

/// A validated binding pattern such as `order.*` or `product.#`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    tokens: Vec<PatternToken>,
}

impl TopicPattern {
    /// Parse and validate a pattern. Fails on empty patterns or tokens, on
    /// `#` anywhere but the last position, and on tokens mixing wildcard
    /// characters with literal text.
    pub fn parse(pattern: &str) -> Result<Self, RoutingError> {
        if pattern.is_empty() {
            return Err(RoutingError::invalid_pattern(pattern, "pattern is empty"));
        }

        let raw_tokens: Vec<&str> = pattern.split(SEPARATOR).collect();
        let last = raw_tokens.len() - 1;
        let mut tokens = Vec::with_capacity(raw_tokens.len());

        for (position, token) in raw_tokens.into_iter().enumerate() {
            let parsed = match token {
                MULTI_WILDCARD if position == last => PatternToken::AnyRest,
                MULTI_WILDCARD => {
                    return Err(RoutingError::invalid_pattern(
                        pattern,
                        format!("`#` may only appear as the last token (found at position {})", position),
                    ));
                }
                SINGLE_WILDCARD => PatternToken::AnyOne,
                "" => {
                    return Err(RoutingError::invalid_pattern(
                        pattern,
                        format!("empty token at position {}", position),
                    ));
                }
                literal if literal.contains(['*', '#']) => {
                    return Err(RoutingError::invalid_pattern(
                        pattern,
                        format!("token `{}` mixes wildcard characters with literal text", literal),
                    ));
                }
                literal => PatternToken::Literal(literal.to_string()),
            };
            tokens.push(parsed);
        }

        Ok(Self {
            raw: pattern.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    /// True for the bare catch-all pattern `#`
    pub fn is_catch_all(&self) -> bool {
        matches!(self.tokens.as_slice(), [PatternToken::AnyRest])
    }

    /// Check this pattern against a routing key
    pub fn matches(&self, key: &RoutingKey) -> bool {
        if key.is_empty() {
            return false;
        }

        let key_tokens: Vec<&str> = key.tokens().collect();
        let mut position = 0;

        for token in &self.tokens {
            match token {
                PatternToken::AnyRest => return true,
                PatternToken::AnyOne => {
                    if position >= key_tokens.len() {
                        return false;
                    }
                }
                PatternToken::Literal(literal) => match key_tokens.get(position) {
                    Some(candidate) if *candidate == literal.as_str() => {}
                    _ => return false,
                },
            }
            position += 1;
        }

        position == key_tokens.len()
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A routing key attached to a delivery, e.g. `order.created`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(String);

impl RoutingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }
}

impl From<&str> for RoutingKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convenience wrapper: validate `pattern` and match it against `routing_key`.
/// An invalid pattern never matches.
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    TopicPattern::parse(pattern)
        .map(|pattern| pattern.matches(&RoutingKey::from(routing_key)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_all_matches_every_key() {
        for key in ["order", "order.created", "a.b.c.d.e", "customer.deleted"] {
            assert!(matches("#", key), "`#` should match {}", key);
        }
    }

    #[test]
    fn test_catch_all_rejects_empty_key() {
        assert!(!matches("#", ""));
    }

    #[test]
    fn test_single_wildcard_requires_exact_arity() {
        assert!(matches("order.*", "order.created"));
        assert!(!matches("order.*", "order.created.extra"));
        assert!(!matches("order.*", "order"));
        assert!(matches("*.created", "product.created"));
        assert!(matches("*.*", "a.b"));
    }

    #[test]
    fn test_trailing_hash_matches_zero_or_more() {
        assert!(matches("order.#", "order.created.extra.detail"));
        assert!(matches("order.#", "order.created"));
        assert!(matches("order.#", "order"));
        assert!(!matches("order.#", "product.created"));
        assert!(matches("*.#", "order"));
    }

    #[test]
    fn test_literal_matching_is_exact_and_case_sensitive() {
        assert!(matches("order.created", "order.created"));
        assert!(!matches("order.created", "order.updated"));
        assert!(!matches("order.created", "Order.Created"));
        assert!(!matches("order.created", "order"));
        assert!(!matches("order", "order.created"));
    }

    #[test]
    fn test_hash_not_in_final_position_is_rejected() {
        let err = TopicPattern::parse("a.#.b").unwrap_err();
        assert!(matches!(err, RoutingError::InvalidPattern { .. }));
        assert!(TopicPattern::parse("#.order").is_err());
    }

    #[test]
    fn test_mixed_wildcard_tokens_and_empty_pattern_are_rejected() {
        assert!(TopicPattern::parse("ord*.created").is_err());
        assert!(TopicPattern::parse("order.cre#").is_err());
        assert!(TopicPattern::parse("").is_err());
        assert!(TopicPattern::parse("order..created").is_err());
        assert!(TopicPattern::parse("order.").is_err());
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(!matches("a.#.b", "a.x.b"));
    }

    #[test]
    fn test_matching_is_deterministic() {
        let pattern = TopicPattern::parse("order.*").unwrap();
        let key = RoutingKey::from("order.created");
        let first = pattern.matches(&key);
        for _ in 0..10 {
            assert_eq!(pattern.matches(&key), first);
        }
    }

    #[test]
    fn test_catch_all_detection() {
        assert!(TopicPattern::parse("#").unwrap().is_catch_all());
        assert!(!TopicPattern::parse("order.#").unwrap().is_catch_all());
        assert_eq!(TopicPattern::parse("order.#").unwrap().to_string(), "order.#");
    }
}
