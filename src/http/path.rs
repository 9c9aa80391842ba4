//! Path templates such as `/products/(id:string)`.

use super::{parse_wire, value_to_text};
use crate::errors::ContractError;
use crate::pattern::row::{narrow_keyed, product};
use crate::pattern::{
    token, Failure, FailureReason, MatchResult, Pattern, Resolver, Row, StringPattern,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Literal(String),
    Param { name: String, pattern: Pattern },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern {
    segments: Vec<PathSegment>,
}

impl PathPattern {
    /// Parse a template. Segments written as `(name:type)` are named
    /// parameters, bare `(type)` tokens are anonymous ones.
    pub fn parse(template: &str) -> Result<Self, ContractError> {
        if !template.starts_with('/') {
            return Err(ContractError::InvalidPath {
                template: template.to_string(),
                reason: "must start with '/'".to_string(),
            });
        }
        let segments = split_segments(template)
            .into_iter()
            .enumerate()
            .map(|(i, segment)| {
                if let Some((name, pattern)) = token::parse_named_token(segment) {
                    Ok(PathSegment::Param { name, pattern })
                } else if token::is_token(segment) {
                    Ok(PathSegment::Param {
                        name: format!("param{}", i),
                        pattern: token::parse_token(segment)?,
                    })
                } else {
                    Ok(PathSegment::Literal(segment.to_string()))
                }
            })
            .collect::<Result<Vec<_>, ContractError>>()?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &Pattern)> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Param { name, pattern } => Some((name.as_str(), pattern)),
            PathSegment::Literal(_) => None,
        })
    }

    /// Literal mismatches only say "this is another endpoint", so they are
    /// reported before any parameter is looked at.
    pub fn matches(&self, path: &str, resolver: &Resolver) -> MatchResult {
        let actual = split_segments(path);
        if actual.len() != self.segments.len()
            || self.segments.iter().zip(&actual).any(|(s, a)| match s {
                PathSegment::Literal(expected) => expected != a,
                PathSegment::Param { .. } => false,
            })
        {
            return MatchResult::Failure(
                Failure::new(
                    resolver
                        .messages()
                        .mismatch(&format!("path {}", self), &format!("path {}", path)),
                )
                .with_reason(FailureReason::PathMismatch),
            );
        }

        let failures: Vec<Failure> = self
            .segments
            .iter()
            .zip(&actual)
            .filter_map(|(segment, raw)| match segment {
                PathSegment::Literal(_) => None,
                PathSegment::Param { name, pattern } => {
                    let result = match parse_wire(pattern, raw, resolver) {
                        Ok(value) => pattern.matches(&value, resolver),
                        Err(failure) => MatchResult::Failure(failure),
                    };
                    result.into_failure().map(|f| f.breadcrumb(name.as_str()))
                }
            })
            .collect();
        MatchResult::from_failures(failures)
    }

    pub fn generate(&self, resolver: &Resolver) -> Result<String, ContractError> {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                PathSegment::Literal(text) => path.push_str(text),
                PathSegment::Param { name, pattern } => {
                    let mut text = value_to_text(&resolver.generate_keyed(name, pattern)?);
                    if text.is_empty() {
                        text = non_empty_segment(name, pattern, resolver)?;
                    }
                    path.push_str(&text);
                }
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }

    pub fn new_based_on(&self, row: &Row, resolver: &Resolver) -> Result<Vec<PathPattern>, ContractError> {
        let slots = self
            .segments
            .iter()
            .map(|segment| match segment {
                PathSegment::Literal(_) => Ok(vec![segment.clone()]),
                PathSegment::Param { name, pattern } => Ok(narrow_keyed(name, pattern, row, resolver)?
                    .into_iter()
                    .map(|narrowed| PathSegment::Param {
                        name: name.clone(),
                        pattern: narrowed,
                    })
                    .collect()),
            })
            .collect::<Result<Vec<_>, ContractError>>()?;
        Ok(product(slots, resolver.variant_limit())
            .into_iter()
            .map(|segments| PathPattern { segments })
            .collect())
    }
}

/// Empty segments collapse on the wire, so a parameter that generated
/// nothing gets some text it still accepts.
fn non_empty_segment(
    name: &str,
    pattern: &Pattern,
    resolver: &Resolver,
) -> Result<String, ContractError> {
    let candidate =
        Pattern::String(StringPattern::default().with_min_length(1)).generate(resolver)?;
    let text = value_to_text(&candidate);
    let accepted = parse_wire(pattern, &text, resolver)
        .map(|value| pattern.matches(&value, resolver).is_success())
        .unwrap_or(false);
    if accepted {
        Ok(text)
    } else {
        Err(ContractError::InvalidPattern(format!(
            "path parameter '{}' cannot produce a non-empty segment",
            name
        )))
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                PathSegment::Literal(text) => write!(f, "/{}", text)?,
                PathSegment::Param { name, pattern } => match pattern {
                    Pattern::Exact(exact) => write!(f, "/{}", value_to_text(exact.value()))?,
                    other => write!(f, "/({}:{})", name, token_name(other))?,
                },
            }
        }
        Ok(())
    }
}

/// The token spelling of a pattern, for round-tripping templates.
fn token_name(pattern: &Pattern) -> String {
    match pattern {
        Pattern::Reference(r) => r.name().to_string(),
        Pattern::List(l) => format!("{}*", token_name(l.element())),
        Pattern::AnyOf(a) if a.branches().len() == 2 && a.branches()[0] == Pattern::Null => {
            format!("{}?", token_name(&a.branches()[1]))
        }
        other => other.type_name(),
    }
}

impl TryFrom<String> for PathPattern {
    type Error = ContractError;

    fn try_from(template: String) -> Result<Self, Self::Error> {
        PathPattern::parse(&template)
    }
}

impl From<PathPattern> for String {
    fn from(path: PathPattern) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template() {
        let path = PathPattern::parse("/products/(id:number)/reviews").unwrap();
        assert_eq!(path.segments().len(), 3);
        let params: Vec<_> = path.params().map(|(n, _)| n).collect();
        assert_eq!(params, vec!["id"]);
        assert!(PathPattern::parse("products").is_err());
    }

    #[test]
    fn test_literal_mismatch_is_fluff() {
        let resolver = Resolver::default();
        let path = PathPattern::parse("/products/(id:number)").unwrap();
        let result = path.matches("/orders/10", &resolver);
        assert!(result.as_failure().unwrap().is_fluff());
        let result = path.matches("/products/10/extra", &resolver);
        assert!(result.as_failure().unwrap().is_fluff());
    }

    #[test]
    fn test_param_mismatch_is_specific() {
        let resolver = Resolver::default();
        let path = PathPattern::parse("/products/(id:number)").unwrap();
        assert!(path.matches("/products/10", &resolver).is_success());
        let failure = path.matches("/products/abc", &resolver).into_failure().unwrap();
        assert!(!failure.is_fluff());
        assert_eq!(failure.report().entries()[0].rendered_path(), "id");
    }

    #[test]
    fn test_generate_uses_facts() {
        let resolver = Resolver::default().with_fact("id", serde_json::json!("abc"));
        let path = PathPattern::parse("/products/(id:string)").unwrap();
        assert_eq!(path.generate(&resolver).unwrap(), "/products/abc");
    }

    #[test]
    fn test_generated_segments_are_never_empty() {
        let resolver = Resolver::default();
        let path = PathPattern {
            segments: vec![
                PathSegment::Literal("items".to_string()),
                PathSegment::Param {
                    name: "id".to_string(),
                    pattern: Pattern::Any,
                },
            ],
        };
        for _ in 0..10 {
            let generated = path.generate(&resolver).unwrap();
            assert!(path.matches(&generated, &resolver).is_success(), "{}", generated);
        }

        let unusable = PathPattern {
            segments: vec![PathSegment::Param {
                name: "code".to_string(),
                pattern: Pattern::String(StringPattern::default().with_max_length(0)),
            }],
        };
        assert!(matches!(
            unusable.generate(&resolver),
            Err(ContractError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_root_path() {
        let resolver = Resolver::default();
        let root = PathPattern::parse("/").unwrap();
        assert!(root.matches("/", &resolver).is_success());
        assert_eq!(root.generate(&resolver).unwrap(), "/");
        assert_eq!(root.to_string(), "/");
    }

    #[test]
    fn test_display_round_trip() {
        let path = PathPattern::parse("/users/(id:uuid)/tags/(tag:string?)").unwrap();
        let again = PathPattern::parse(&path.to_string()).unwrap();
        assert_eq!(path, again);
    }

    #[test]
    fn test_generation_mode_accepts_tokens() {
        let resolver = Resolver::default().in_generation_mode();
        let path = PathPattern::parse("/products/(id:number)").unwrap();
        assert!(path.matches("/products/(number)", &resolver).is_success());
        assert!(path.matches("/products/(string)", &resolver).is_failure());
    }

    #[test]
    fn test_new_based_on_pins_param() {
        let path = PathPattern::parse("/products/(id:number)").unwrap();
        let row = Row::new().with("id", "42");
        let variants = path.new_based_on(&row, &Resolver::default()).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].generate(&Resolver::default()).unwrap(), "/products/42");
    }
}
