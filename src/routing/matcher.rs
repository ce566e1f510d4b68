//! Route pattern parsing and path matching.
//!
//! # Pattern Syntax
//! - `/users/me` literal segments (case-sensitive)
//! - `/users/{id}` parameter: any non-empty segment
//! - `/users/{id:\d+}` parameter constrained by a whole-segment regex
//! - `/files/{stem}.{ext}` parameters mixed with literals inside one segment
//! - `/static/{*rest}` trailing catch-all, may span several segments
//!
//! # Design Decisions
//! - Patterns are parsed once; a [`RouteMatcher`] is immutable afterwards
//! - Parameter values are addressed by position; names are only used when
//!   handlers are compiled
//! - Plain literal and parameter segments are compared without regex
//! - A single trailing slash is ignored on both patterns and paths

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

/// A route pattern could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum RoutePatternError {
    #[error("route pattern '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("route pattern '{0}' has an unterminated parameter")]
    Unterminated(String),

    #[error("route pattern '{pattern}' has an unexpected '}}' at offset {offset}")]
    UnexpectedBrace { pattern: String, offset: usize },

    #[error("route pattern '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("route pattern '{0}' contains a parameter without a name")]
    EmptyParameterName(String),

    #[error("invalid parameter name '{0}'")]
    InvalidParameterName(String),

    #[error("duplicate parameter name '{0}'")]
    DuplicateParameter(String),

    #[error("invalid constraint for parameter '{name}': {source}")]
    InvalidConstraint {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("catch-all parameter '{0}' must be the last segment on its own")]
    CatchAllNotLast(String),

    #[error("route pattern '{0}' has adjacent parameters without a separator")]
    AdjacentParameters(String),
}

/// Values extracted from a successful match, in parameter declaration order.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    names: Arc<[String]>,
    values: Vec<String>,
}

impl RouteMatch {
    /// A match without parameters.
    pub fn empty() -> Self {
        Self {
            names: Arc::from(Vec::new()),
            values: Vec::new(),
        }
    }

    /// Value at parameter position `index`.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Value of the parameter called `name`.
    pub fn by_name(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.get(i))
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

impl Default for RouteMatch {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Param {
        index: usize,
        constraint: Option<(String, Regex)>,
    },
    Composite {
        regex: Regex,
        parts: Vec<Part>,
    },
    CatchAll {
        index: usize,
    },
}

#[derive(Debug)]
enum Part {
    Literal(String),
    Param {
        index: usize,
        constraint: Option<String>,
    },
}

impl Segment {
    /// Lower ranks are tried first when routes are ordered.
    fn rank(&self) -> u8 {
        match self {
            Segment::Literal(_) => 0,
            Segment::Composite { .. } => 1,
            Segment::Param {
                constraint: Some(_),
                ..
            } => 2,
            Segment::Param { .. } => 3,
            Segment::CatchAll { .. } => 4,
        }
    }
}

#[derive(Debug)]
enum Token {
    Literal(String),
    Param {
        name: String,
        constraint: Option<String>,
        catch_all: bool,
    },
}

/// A parsed route pattern.
#[derive(Debug)]
pub struct RouteMatcher {
    pattern: String,
    segments: Vec<Segment>,
    names: Arc<[String]>,
}

impl RouteMatcher {
    /// Parse `pattern` into a matcher.
    pub fn parse(pattern: &str) -> Result<Self, RoutePatternError> {
        if !pattern.starts_with('/') {
            return Err(RoutePatternError::MissingLeadingSlash(pattern.to_string()));
        }

        let body = trim_trailing_slash(pattern);
        let raw_segments = tokenize(pattern, &body[1..])?;

        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut segments = Vec::with_capacity(raw_segments.len());
        let last = raw_segments.len().saturating_sub(1);

        for (position, tokens) in raw_segments.into_iter().enumerate() {
            for token in &tokens {
                if let Token::Param { name, .. } = token {
                    if !seen.insert(name.clone()) {
                        return Err(RoutePatternError::DuplicateParameter(name.clone()));
                    }
                }
            }
            segments.push(build_segment(pattern, tokens, position == last, &mut names)?);
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
            names: Arc::from(names),
        })
    }

    /// The pattern this matcher was parsed from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names in declaration order.
    pub fn parameter_names(&self) -> &[String] {
        &self.names
    }

    /// Position of the parameter called `name`.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Match a raw (still percent-encoded) request path.
    ///
    /// The path is split on `/` first and each segment is decoded on its
    /// own, so `%2F` stays inside a single parameter value. A segment that
    /// does not decode to UTF-8 never matches.
    pub fn try_match(&self, path: &str) -> Option<RouteMatch> {
        if !path.starts_with('/') {
            return None;
        }
        let path = trim_trailing_slash(path);
        let parts: Vec<String> = if path == "/" {
            Vec::new()
        } else {
            path[1..]
                .split('/')
                .map(decode_segment)
                .collect::<Option<_>>()?
        };

        let has_catch_all = matches!(self.segments.last(), Some(Segment::CatchAll { .. }));
        let fixed = if has_catch_all {
            self.segments.len() - 1
        } else {
            self.segments.len()
        };
        if parts.len() < fixed || (!has_catch_all && parts.len() != fixed) {
            return None;
        }

        let mut values = vec![String::new(); self.names.len()];
        for (segment, part) in self.segments.iter().zip(parts.iter()) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param { index, constraint } => {
                    if part.is_empty() {
                        return None;
                    }
                    if let Some((_, regex)) = constraint {
                        if !regex.is_match(part) {
                            return None;
                        }
                    }
                    values[*index] = part.clone();
                }
                Segment::Composite { regex, parts: pieces } => {
                    let captures = regex.captures(part)?;
                    for piece in pieces {
                        if let Part::Param { index, .. } = piece {
                            let value = captures.name(&group_name(*index))?.as_str();
                            values[*index] = value.to_string();
                        }
                    }
                }
                Segment::CatchAll { .. } => {}
            }
        }

        if let Some(Segment::CatchAll { index }) = self.segments.last() {
            values[*index] = parts[fixed..].join("/");
        }

        Some(RouteMatch {
            names: Arc::clone(&self.names),
            values,
        })
    }

    /// Rebuild a concrete path from parameter values in declaration order.
    ///
    /// Returns `None` if the number of values is wrong.
    pub fn render<S: AsRef<str>>(&self, values: &[S]) -> Option<String> {
        if values.len() != self.names.len() {
            return None;
        }
        let mut path = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => {
                    path.push('/');
                    path.push_str(literal);
                }
                Segment::Param { index, .. } => {
                    path.push('/');
                    path.push_str(values[*index].as_ref());
                }
                Segment::Composite { parts, .. } => {
                    path.push('/');
                    for part in parts {
                        match part {
                            Part::Literal(literal) => path.push_str(literal),
                            Part::Param { index, .. } => path.push_str(values[*index].as_ref()),
                        }
                    }
                }
                Segment::CatchAll { index } => {
                    let rest = values[*index].as_ref();
                    if !rest.is_empty() {
                        path.push('/');
                        path.push_str(rest);
                    }
                }
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Some(path)
    }

    /// Pattern with parameter names erased; two routes with the same
    /// canonical form can never be told apart.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Param { constraint, .. } => match constraint {
                    Some((source, _)) => {
                        out.push_str("{:");
                        out.push_str(source);
                        out.push('}');
                    }
                    None => out.push_str("{}"),
                },
                Segment::Composite { parts, .. } => {
                    for part in parts {
                        match part {
                            Part::Literal(literal) => out.push_str(literal),
                            Part::Param { constraint: Some(c), .. } => {
                                out.push_str("{:");
                                out.push_str(c);
                                out.push('}');
                            }
                            Part::Param { constraint: None, .. } => out.push_str("{}"),
                        }
                    }
                }
                Segment::CatchAll { .. } => out.push_str("{*}"),
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Order two matchers so that more specific patterns come first.
    pub fn cmp_specificity(&self, other: &Self) -> Ordering {
        let left = self.segments.iter().map(Segment::rank);
        let right = other.segments.iter().map(Segment::rank);
        left.cmp(right)
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

fn decode_segment(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|segment| segment.into_owned())
}

fn group_name(index: usize) -> String {
    format!("p{index}")
}

/// Split the pattern body into segments of tokens, honouring nested braces
/// inside constraints.
fn tokenize(pattern: &str, body: &str) -> Result<Vec<Vec<Token>>, RoutePatternError> {
    let mut segments = Vec::new();
    if body.is_empty() {
        return Ok(segments);
    }

    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = body.char_indices();

    while let Some((offset, c)) = chars.next() {
        match c {
            '/' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                if tokens.is_empty() {
                    return Err(RoutePatternError::EmptySegment(pattern.to_string()));
                }
                segments.push(std::mem::take(&mut tokens));
            }
            '{' => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                let mut depth = 1usize;
                let mut content = String::new();
                for (_, inner) in chars.by_ref() {
                    match inner {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    content.push(inner);
                }
                if depth != 0 {
                    return Err(RoutePatternError::Unterminated(pattern.to_string()));
                }
                tokens.push(parse_param(pattern, &content)?);
            }
            '}' => {
                return Err(RoutePatternError::UnexpectedBrace {
                    pattern: pattern.to_string(),
                    offset: offset + 1,
                });
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    if tokens.is_empty() {
        return Err(RoutePatternError::EmptySegment(pattern.to_string()));
    }
    segments.push(tokens);
    Ok(segments)
}

fn parse_param(pattern: &str, content: &str) -> Result<Token, RoutePatternError> {
    let (catch_all, rest) = match content.strip_prefix('*') {
        Some(rest) => (true, rest),
        None => (false, content),
    };
    let (name, constraint) = match rest.split_once(':') {
        Some((name, constraint)) if !catch_all => (name, Some(constraint.to_string())),
        Some(_) => return Err(RoutePatternError::InvalidParameterName(content.to_string())),
        None => (rest, None),
    };

    if name.is_empty() {
        return Err(RoutePatternError::EmptyParameterName(pattern.to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RoutePatternError::InvalidParameterName(name.to_string()));
    }

    Ok(Token::Param {
        name: name.to_string(),
        constraint,
        catch_all,
    })
}

fn compile_constraint(name: &str, source: &str) -> Result<Regex, RoutePatternError> {
    Regex::new(&format!("^(?:{source})$")).map_err(|source| RoutePatternError::InvalidConstraint {
        name: name.to_string(),
        source,
    })
}

fn build_segment(
    pattern: &str,
    mut tokens: Vec<Token>,
    is_last: bool,
    names: &mut Vec<String>,
) -> Result<Segment, RoutePatternError> {
    if tokens.len() == 1 {
        return match tokens.remove(0) {
            Token::Literal(literal) => Ok(Segment::Literal(literal)),
            Token::Param {
                name,
                catch_all: true,
                ..
            } => {
                if !is_last {
                    return Err(RoutePatternError::CatchAllNotLast(name));
                }
                names.push(name);
                Ok(Segment::CatchAll {
                    index: names.len() - 1,
                })
            }
            Token::Param {
                name, constraint, ..
            } => {
                let constraint = match constraint {
                    Some(source) => {
                        let regex = compile_constraint(&name, &source)?;
                        Some((source, regex))
                    }
                    None => None,
                };
                names.push(name);
                Ok(Segment::Param {
                    index: names.len() - 1,
                    constraint,
                })
            }
        };
    }

    let mut regex_source = String::from("^");
    let mut parts = Vec::with_capacity(tokens.len());
    let mut previous_was_param = false;

    for token in tokens {
        match token {
            Token::Literal(literal) => {
                regex_source.push_str(&regex::escape(&literal));
                parts.push(Part::Literal(literal));
                previous_was_param = false;
            }
            Token::Param {
                name,
                catch_all: true,
                ..
            } => return Err(RoutePatternError::CatchAllNotLast(name)),
            Token::Param {
                name, constraint, ..
            } => {
                if previous_was_param {
                    return Err(RoutePatternError::AdjacentParameters(pattern.to_string()));
                }
                if let Some(source) = &constraint {
                    // Validate the constraint on its own so errors name the parameter.
                    compile_constraint(&name, source)?;
                }
                names.push(name);
                let index = names.len() - 1;
                let body = constraint.as_deref().unwrap_or("[^/]+");
                regex_source.push_str(&format!("(?P<{}>{})", group_name(index), body));
                parts.push(Part::Param { index, constraint });
                previous_was_param = true;
            }
        }
    }
    regex_source.push('$');

    let regex = Regex::new(&regex_source).map_err(|source| RoutePatternError::InvalidConstraint {
        name: pattern.to_string(),
        source,
    })?;
    Ok(Segment::Composite { regex, parts })
}
