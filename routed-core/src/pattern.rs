//! Path pattern parsing and matching.
//!
//! A pattern is parsed once, at route-registration time, into an ordered
//! list of [`PathSegment`]s. Matching walks a candidate path's segments
//! against the pattern's segments in lockstep; type-tag mismatches are "no
//! match", not an error, so the route table can keep searching sibling
//! routes.

use crate::error::ConfigurationError;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A custom `{name:tag}` validator resolved from the engine's type registry
/// at `build()`.
pub type CustomValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// The recognized type tags for a `{name:type}` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Int,
    Uint,
    Slug,
    Email,
    Uuid,
    Custom(String),
}

impl TypeTag {
    fn name(&self) -> &str {
        match self {
            TypeTag::String => "string",
            TypeTag::Int => "int",
            TypeTag::Uint => "uint",
            TypeTag::Slug => "slug",
            TypeTag::Email => "email",
            TypeTag::Uuid => "uuid",
            TypeTag::Custom(name) => name,
        }
    }

    fn from_token(token: &str) -> TypeTag {
        match token {
            "string" => TypeTag::String,
            "int" => TypeTag::Int,
            "uint" => TypeTag::Uint,
            "slug" => TypeTag::Slug,
            "email" => TypeTag::Email,
            "uuid" => TypeTag::Uuid,
            other => TypeTag::Custom(other.to_string()),
        }
    }

    /// Whether `value` satisfies this type tag. `Custom` tags never decide
    /// on their own — they're resolved to a [`CustomValidator`] at
    /// `build()` (see [`PathPattern::resolve_custom_types`]); a pattern
    /// still carrying an unresolved `Custom` tag at match time is a build
    /// that never happened, so this treats it as a non-match rather than
    /// guessing.
    fn accepts(&self, value: &str) -> bool {
        match self {
            TypeTag::String => !value.is_empty(),
            TypeTag::Int => !value.is_empty() && value.parse::<i64>().is_ok(),
            TypeTag::Uint => !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()),
            TypeTag::Slug => {
                !value.is_empty()
                    && value
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
            }
            TypeTag::Uuid => is_canonical_uuid(value),
            TypeTag::Email => is_practical_email(value),
            TypeTag::Custom(_) => false,
        }
    }
}

fn is_canonical_uuid(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

fn is_practical_email(value: &str) -> bool {
    let Some(at) = value.find('@') else {
        return false;
    };
    let (local, domain) = (&value[..at], &value[at + 1..]);
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

/// One `/`-separated token of a parsed pattern.
#[derive(Debug, Clone)]
pub enum PathSegment {
    Literal(String),
    Param {
        name: String,
        type_tag: TypeTag,
        constraint: Option<Regex>,
        custom_validator: Option<CustomValidator>,
    },
    Wildcard(String),
}

impl PathSegment {
    pub fn param_name(&self) -> Option<&str> {
        match self {
            PathSegment::Literal(_) => None,
            PathSegment::Param { name, .. } => Some(name),
            PathSegment::Wildcard(name) => Some(name),
        }
    }

    /// Specificity rank used to order sibling routes: literal > typed/constrained
    /// param > untyped param > wildcard.
    fn specificity(&self) -> u8 {
        match self {
            PathSegment::Literal(_) => 3,
            PathSegment::Param {
                type_tag,
                constraint,
                ..
            } => {
                if constraint.is_some() || !matches!(type_tag, TypeTag::String) {
                    2
                } else {
                    1
                }
            }
            PathSegment::Wildcard(_) => 0,
        }
    }
}

/// A parsed path pattern plus the indexing metadata the route table uses.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pub raw: String,
    pub segments: Vec<PathSegment>,
    pub has_wildcard: bool,
    pub has_trailing_slash: bool,
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PathPattern {
    /// Parse `raw` (e.g. `/a/{id:int}/{*rest}`) with an optional per-route
    /// `constraints` map keyed by parameter name.
    pub fn parse(
        raw: &str,
        constraints: &std::collections::HashMap<String, String>,
    ) -> Result<PathPattern, ConfigurationError> {
        let has_trailing_slash = raw.len() > 1 && raw.ends_with('/');
        let tokens: Vec<&str> = raw.split('/').filter(|t| !t.is_empty()).collect();

        let mut segments = Vec::with_capacity(tokens.len());
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut has_wildcard = false;

        for (idx, token) in tokens.iter().enumerate() {
            if has_wildcard {
                return Err(ConfigurationError::WildcardNotLast {
                    pattern: raw.to_string(),
                });
            }

            if let Some(stripped) = token.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
                if let Some(name) = stripped.strip_prefix('*') {
                    if name.is_empty() {
                        return Err(ConfigurationError::InvalidPattern {
                            pattern: raw.to_string(),
                            reason: "wildcard parameter has no name".into(),
                        });
                    }
                    if idx != tokens.len() - 1 {
                        return Err(ConfigurationError::WildcardNotLast {
                            pattern: raw.to_string(),
                        });
                    }
                    if !seen_names.insert(name.to_string()) {
                        return Err(ConfigurationError::DuplicateParam {
                            pattern: raw.to_string(),
                            name: name.to_string(),
                        });
                    }
                    has_wildcard = true;
                    segments.push(PathSegment::Wildcard(name.to_string()));
                    continue;
                }

                let (name, type_tag) = match stripped.split_once(':') {
                    Some((name, type_token)) => (name, TypeTag::from_token(type_token)),
                    None => (stripped, TypeTag::String),
                };
                if name.is_empty() {
                    return Err(ConfigurationError::InvalidPattern {
                        pattern: raw.to_string(),
                        reason: "parameter has no name".into(),
                    });
                }
                if !seen_names.insert(name.to_string()) {
                    return Err(ConfigurationError::DuplicateParam {
                        pattern: raw.to_string(),
                        name: name.to_string(),
                    });
                }

                let constraint = match constraints.get(name) {
                    Some(pattern) => Some(compile_anchored(name, pattern)?),
                    None => None,
                };

                segments.push(PathSegment::Param {
                    name: name.to_string(),
                    type_tag,
                    constraint,
                    custom_validator: None,
                });
            } else {
                segments.push(PathSegment::Literal(token.to_string()));
            }
        }

        Ok(PathPattern {
            raw: raw.to_string(),
            segments,
            has_wildcard,
            has_trailing_slash,
        })
    }

    /// The leading run of literal segments, used to index the route table
    /// by static prefix.
    pub fn static_prefix(&self) -> String {
        let mut prefix = String::from("/");
        for segment in &self.segments {
            match segment {
                PathSegment::Literal(text) => {
                    prefix.push_str(text);
                    prefix.push('/');
                }
                _ => break,
            }
        }
        prefix
    }

    /// Attempt to match `path` (already split into non-empty segments by the
    /// caller) against this pattern, returning the extracted parameters.
    pub fn matches(&self, path_segments: &[&str]) -> Option<Vec<(String, String)>> {
        let mut params = Vec::new();
        let mut i = 0usize;

        for segment in &self.segments {
            match segment {
                PathSegment::Wildcard(name) => {
                    let rest = path_segments[i..].join("/");
                    params.push((name.clone(), rest));
                    return Some(params);
                }
                PathSegment::Literal(text) => {
                    let candidate = path_segments.get(i)?;
                    if candidate != text {
                        return None;
                    }
                    i += 1;
                }
                PathSegment::Param {
                    name,
                    type_tag,
                    constraint,
                    custom_validator,
                } => {
                    let candidate = path_segments.get(i)?;
                    let type_ok = match (type_tag, custom_validator) {
                        (TypeTag::Custom(_), Some(validator)) => validator(candidate),
                        _ => type_tag.accepts(candidate),
                    };
                    if !type_ok {
                        return None;
                    }
                    if let Some(re) = constraint {
                        if !re.is_match(candidate) {
                            return None;
                        }
                    }
                    params.push((name.clone(), candidate.to_string()));
                    i += 1;
                }
            }
        }

        if i == path_segments.len() {
            Some(params)
        } else {
            None
        }
    }

    /// Sum of per-segment specificity, used to order sibling routes so the
    /// most specific match wins when several could apply.
    pub fn specificity_rank(&self) -> Vec<u8> {
        self.segments.iter().map(PathSegment::specificity).collect()
    }

    /// Resolve every `Custom(name)` type tag in this pattern against
    /// `registry`, at `build()` time — the same two-phase shape as
    /// `MiddlewareSlot::Named` resolution: an unresolved reference is a
    /// configuration error caught at `build()`, never a runtime surprise.
    pub fn resolve_custom_types(&mut self, registry: &TypeRegistry) -> Result<(), ConfigurationError> {
        for segment in &mut self.segments {
            if let PathSegment::Param {
                type_tag: TypeTag::Custom(tag_name),
                custom_validator,
                ..
            } = segment
            {
                let validator = registry
                    .get(tag_name)
                    .ok_or_else(|| ConfigurationError::UnresolvedCustomType(tag_name.to_string()))?;
                *custom_validator = Some(validator);
            }
        }
        Ok(())
    }
}

fn compile_anchored(name: &str, pattern: &str) -> Result<Regex, ConfigurationError> {
    let anchored = if pattern.starts_with('^') && pattern.ends_with('$') {
        pattern.to_string()
    } else {
        format!("^{}$", pattern.trim_start_matches('^').trim_end_matches('$'))
    };
    Regex::new(&anchored).map_err(|source| ConfigurationError::InvalidConstraint {
        name: name.to_string(),
        source,
    })
}

/// A registry of `{name:tag}` custom type validators, keyed by tag name.
/// Populated during `Configuring` via `Engine::register_type`, consulted
/// once per route at `build()`.
#[derive(Default, Clone)]
pub struct TypeRegistry {
    entries: std::collections::HashMap<String, CustomValidator>,
}

impl TypeRegistry {
    pub fn register(&mut self, name: impl Into<String>, validator: impl Fn(&str) -> bool + Send + Sync + 'static) {
        self.entries.insert(name.into(), Arc::new(validator));
    }

    pub fn get(&self, name: &str) -> Option<CustomValidator> {
        self.entries.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(raw: &str) -> PathPattern {
        PathPattern::parse(raw, &HashMap::new()).unwrap()
    }

    fn split(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    #[test]
    fn literal_pattern_matches_exact_path() {
        let pattern = parse("/health");
        let segments = split("/health");
        assert!(pattern.matches(&segments).is_some());
    }

    #[test]
    fn typed_int_param_rejects_non_digits() {
        let pattern = parse("/users/{id:int}");
        assert!(pattern.matches(&split("/users/42")).is_some());
        assert!(pattern.matches(&split("/users/abc")).is_none());
    }

    #[test]
    fn wildcard_captures_remainder_with_slashes() {
        let pattern = parse("/test/{name}/{last_name}/{*wild}");
        let params = pattern
            .matches(&split("/test/john/smith/is/super/great"))
            .unwrap();
        assert_eq!(
            params,
            vec![
                ("name".to_string(), "john".to_string()),
                ("last_name".to_string(), "smith".to_string()),
                ("wild".to_string(), "is/super/great".to_string()),
            ]
        );
    }

    #[test]
    fn wildcard_not_last_is_rejected_at_parse() {
        let err = PathPattern::parse("/a/{*w}/b", &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigurationError::WildcardNotLast { .. }));
    }

    #[test]
    fn duplicate_param_name_is_rejected() {
        let err = PathPattern::parse("/a/{id}/{id}", &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateParam { .. }));
    }

    #[test]
    fn constraint_must_hold_in_addition_to_type() {
        let mut constraints = HashMap::new();
        constraints.insert("id".to_string(), "^[0-9]{4}$".to_string());
        let pattern = PathPattern::parse("/orders/{id}", &constraints).unwrap();
        assert!(pattern.matches(&split("/orders/1234")).is_some());
        assert!(pattern.matches(&split("/orders/12")).is_none());
    }

    #[test]
    fn specificity_orders_literal_above_param_above_wildcard() {
        let literal = parse("/a");
        let param = parse("/{x}");
        let wildcard = parse("/{*x}");
        assert!(literal.specificity_rank() > param.specificity_rank());
        assert!(param.specificity_rank() > wildcard.specificity_rank());
    }

    #[test]
    fn uuid_type_tag_accepts_only_canonical_form() {
        let pattern = parse("/items/{id:uuid}");
        assert!(pattern
            .matches(&split("/items/550e8400-e29b-41d4-a716-446655440000"))
            .is_some());
        assert!(pattern.matches(&split("/items/not-a-uuid")).is_none());
    }

    #[test]
    fn custom_type_tag_is_unresolved_until_registered() {
        let mut pattern = parse("/colors/{hex:hexcolor}");
        assert!(pattern.matches(&split("/colors/ff00aa")).is_none());

        let mut registry = TypeRegistry::default();
        registry.register("hexcolor", |v: &str| {
            v.len() == 6 && v.bytes().all(|b| b.is_ascii_hexdigit())
        });
        pattern.resolve_custom_types(&registry).unwrap();

        assert!(pattern.matches(&split("/colors/ff00aa")).is_some());
        assert!(pattern.matches(&split("/colors/not-hex")).is_none());
    }

    #[test]
    fn resolving_an_unregistered_custom_type_is_a_configuration_error() {
        let mut pattern = parse("/colors/{hex:hexcolor}");
        let registry = TypeRegistry::default();
        let err = pattern.resolve_custom_types(&registry).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnresolvedCustomType(_)));
    }
}
