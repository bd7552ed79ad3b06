use super::error::FilterParseError;
use super::node::{Clock, FilterField, FilterNode, PackageNamesProvider, TextRange};
use crate::record::LogLevel;
use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::Arc;
use std::time::Duration;

/// The `package:`/`app:` value that selects the project-package filter
/// instead of a literal application-id match.
pub const MY_PACKAGE: &str = "mine";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Contains,
    Exact,
    Regex,
}

#[derive(Debug, Clone)]
struct RawTerm {
    /// Term text with quotes stripped and `\"`/`\\` escapes resolved.
    cooked: String,
    range: TextRange,
}

#[derive(Debug, Clone)]
enum Token {
    LParen(usize),
    RParen(usize),
    Bar(usize),
    Amp(usize),
    Term(RawTerm),
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
    input_len: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn end_range(&self) -> TextRange {
        TextRange::new(self.input_len, self.input_len)
    }
}

/// Parses filter expression text into a [`FilterNode`] tree.
///
/// Terms are `key:value` pairs (`tag:`, `package:`/`app:`, `message:`/`msg:`,
/// `line:`, `process:`, `level:`, `age:`, `is:`, `name:`), with `~` and `=`
/// key suffixes for regex and exact matching and a `-` prefix for negation.
/// Bare terms match anywhere in the formatted line. Adjacent terms combine
/// with AND, `|` combines with OR, and parentheses group.
///
/// ```text
/// tag:NetworkScheduler level:WARN          warnings from one tag
/// package:mine is:crash | is:stacktrace    my app's crashes
/// -message~:retry\s+\d+ "exact phrase"     negation, regex, quoting
/// ```
pub struct FilterParser {
    packages: Arc<dyn PackageNamesProvider>,
    clock: Arc<dyn Clock>,
}

impl FilterParser {
    pub fn new(packages: Arc<dyn PackageNamesProvider>, clock: Arc<dyn Clock>) -> Self {
        FilterParser { packages, clock }
    }

    /// Blank input means "no filter" and parses to `None`.
    pub fn parse(&self, text: &str) -> Result<Option<FilterNode>, FilterParseError> {
        let tokens = lex(text);
        if tokens.is_empty() {
            return Ok(None);
        }
        let mut cursor = Cursor {
            tokens,
            pos: 0,
            input_len: text.len(),
        };
        let node = self.parse_or(&mut cursor)?;
        match cursor.next() {
            None => Ok(Some(node)),
            Some(Token::RParen(pos)) => Err(FilterParseError::UnbalancedParen {
                range: TextRange::new(pos, pos + 1),
            }),
            Some(token) => Err(FilterParseError::MissingTerm {
                range: token_range(&token),
            }),
        }
    }

    fn parse_or(&self, cursor: &mut Cursor) -> Result<FilterNode, FilterParseError> {
        let mut children = vec![self.parse_and(cursor)?];
        while matches!(cursor.peek(), Some(Token::Bar(_))) {
            cursor.next();
            children.push(self.parse_and(cursor)?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            FilterNode::or(children)
        })
    }

    fn parse_and(&self, cursor: &mut Cursor) -> Result<FilterNode, FilterParseError> {
        let mut children = vec![self.parse_primary(cursor)?];
        loop {
            match cursor.peek() {
                Some(Token::Amp(_)) => {
                    cursor.next();
                    children.push(self.parse_primary(cursor)?);
                }
                // Plain adjacency is AND.
                Some(Token::Term(_)) | Some(Token::LParen(_)) => {
                    children.push(self.parse_primary(cursor)?);
                }
                _ => break,
            }
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            FilterNode::and(children)
        })
    }

    fn parse_primary(&self, cursor: &mut Cursor) -> Result<FilterNode, FilterParseError> {
        match cursor.next() {
            Some(Token::LParen(open)) => {
                let node = self.parse_or(cursor)?;
                match cursor.next() {
                    Some(Token::RParen(_)) => Ok(node),
                    _ => Err(FilterParseError::UnbalancedParen {
                        range: TextRange::new(open, open + 1),
                    }),
                }
            }
            Some(Token::Term(term)) => self.term_to_node(&term.cooked, term.range),
            Some(Token::RParen(pos)) => Err(FilterParseError::UnbalancedParen {
                range: TextRange::new(pos, pos + 1),
            }),
            Some(Token::Bar(pos)) | Some(Token::Amp(pos)) => Err(FilterParseError::MissingTerm {
                range: TextRange::new(pos, pos + 1),
            }),
            None => Err(FilterParseError::MissingTerm {
                range: cursor.end_range(),
            }),
        }
    }

    fn term_to_node(
        &self,
        cooked: &str,
        range: TextRange,
    ) -> Result<FilterNode, FilterParseError> {
        let (negated, body, body_offset) = match cooked.strip_prefix('-') {
            Some(rest) => (true, rest, 1usize),
            None => (false, cooked, 0usize),
        };
        if body.is_empty() {
            return Err(FilterParseError::MissingTerm { range });
        }

        let Some(colon) = body.find(':') else {
            return Ok(FilterNode::string(
                body,
                FilterField::ImplicitLine,
                false,
                negated,
                range,
            ));
        };

        let raw_key = &body[..colon];
        let value = &body[colon + 1..];
        let (key, modifier) = if let Some(key) = raw_key.strip_suffix('~') {
            (key, Modifier::Regex)
        } else if let Some(key) = raw_key.strip_suffix('=') {
            (key, Modifier::Exact)
        } else {
            (raw_key, Modifier::Contains)
        };
        let key_range = TextRange::new(
            range.start + body_offset,
            range.start + body_offset + raw_key.len(),
        );
        let value_range = TextRange::new(range.start + body_offset + colon + 1, range.end);

        match key.to_ascii_lowercase().as_str() {
            "tag" => self.string_node(value, FilterField::Tag, modifier, negated, "tag", range, value_range),
            "package" | "app" => {
                if modifier == Modifier::Contains && !negated && value == MY_PACKAGE {
                    Ok(FilterNode::project_package(Arc::clone(&self.packages), range))
                } else {
                    self.string_node(value, FilterField::App, modifier, negated, "package", range, value_range)
                }
            }
            "message" | "msg" => {
                self.string_node(value, FilterField::Message, modifier, negated, "message", range, value_range)
            }
            "line" => self.string_node(value, FilterField::Line, modifier, negated, "line", range, value_range),
            "process" => {
                self.string_node(value, FilterField::Process, modifier, negated, "process", range, value_range)
            }
            "level" if modifier == Modifier::Contains => {
                if negated {
                    return Err(FilterParseError::InvalidNegation {
                        key: "level".to_string(),
                        range,
                    });
                }
                if value.is_empty() {
                    return Err(FilterParseError::EmptyValue {
                        key: "level".to_string(),
                        range,
                    });
                }
                let level: LogLevel =
                    value.parse().map_err(|_| FilterParseError::InvalidLevel {
                        value: value.to_string(),
                        range: value_range,
                    })?;
                Ok(FilterNode::level_at_least(level, range))
            }
            "age" if modifier == Modifier::Contains => {
                if negated {
                    return Err(FilterParseError::InvalidNegation {
                        key: "age".to_string(),
                        range,
                    });
                }
                let max_age = parse_age(value, value_range)?;
                Ok(FilterNode::age_at_most(max_age, Arc::clone(&self.clock), range))
            }
            "is" if modifier == Modifier::Contains => {
                if negated {
                    return Err(FilterParseError::InvalidNegation {
                        key: "is".to_string(),
                        range,
                    });
                }
                match value.to_ascii_lowercase().as_str() {
                    "crash" => Ok(FilterNode::crash(range)),
                    "stacktrace" => Ok(FilterNode::stack_frame(range)),
                    _ => Err(FilterParseError::InvalidQualifier {
                        value: value.to_string(),
                        range: value_range,
                    }),
                }
            }
            "name" if modifier == Modifier::Contains => {
                if negated {
                    return Err(FilterParseError::InvalidNegation {
                        key: "name".to_string(),
                        range,
                    });
                }
                if value.is_empty() {
                    return Err(FilterParseError::EmptyValue {
                        key: "name".to_string(),
                        range,
                    });
                }
                Ok(FilterNode::name(value, range))
            }
            _ => Err(FilterParseError::UnknownKey {
                key: raw_key.to_string(),
                range: key_range,
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn string_node(
        &self,
        value: &str,
        field: FilterField,
        modifier: Modifier,
        negated: bool,
        key: &str,
        range: TextRange,
        value_range: TextRange,
    ) -> Result<FilterNode, FilterParseError> {
        if value.is_empty() {
            return Err(FilterParseError::EmptyValue {
                key: key.to_string(),
                range,
            });
        }
        match modifier {
            Modifier::Contains => Ok(FilterNode::string(value, field, false, negated, range)),
            Modifier::Exact => Ok(FilterNode::string(value, field, true, negated, range)),
            // The node spans the whole term, but a bad pattern should point
            // at the pattern text alone.
            Modifier::Regex => FilterNode::regex(value, field, negated, range).map_err(|err| {
                match err {
                    FilterParseError::InvalidRegex {
                        pattern, reason, ..
                    } => FilterParseError::InvalidRegex {
                        pattern,
                        reason,
                        range: value_range,
                    },
                    other => other,
                }
            }),
        }
    }
}

fn token_range(token: &Token) -> TextRange {
    match token {
        Token::LParen(pos) | Token::RParen(pos) | Token::Bar(pos) | Token::Amp(pos) => {
            TextRange::new(*pos, *pos + 1)
        }
        Token::Term(term) => term.range,
    }
}

fn parse_age(value: &str, range: TextRange) -> Result<Duration, FilterParseError> {
    let invalid = || FilterParseError::InvalidAge {
        value: value.to_string(),
        range,
    };
    if !value.is_ascii() || value.len() < 2 {
        return Err(invalid());
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let count: u64 = digits.parse().map_err(|_| invalid())?;
    let seconds = match unit {
        "s" => count,
        "m" => count * 60,
        "h" => count * 3600,
        "d" => count * 86400,
        _ => return Err(invalid()),
    };
    Ok(Duration::from_secs(seconds))
}

fn lex(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen(i));
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen(i));
                chars.next();
            }
            '|' => {
                tokens.push(Token::Bar(i));
                chars.next();
            }
            '&' => {
                tokens.push(Token::Amp(i));
                chars.next();
            }
            _ => tokens.push(lex_term(&mut chars)),
        }
    }
    tokens
}

/// Scans one term, honoring double quotes: a quoted segment may contain
/// whitespace and the structural characters, with `\"` and `\\` escapes.
/// An unterminated quote runs to the end of the input.
fn lex_term(chars: &mut Peekable<CharIndices<'_>>) -> Token {
    let mut cooked = String::new();
    let mut start = None;
    let mut end = 0;
    let mut in_quotes = false;

    while let Some(&(i, c)) = chars.peek() {
        if !in_quotes && (c.is_whitespace() || matches!(c, '(' | ')' | '|' | '&')) {
            break;
        }
        chars.next();
        start.get_or_insert(i);
        end = i + c.len_utf8();
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => match chars.peek().copied() {
                Some((j, next)) if next == '"' || next == '\\' => {
                    chars.next();
                    end = j + next.len_utf8();
                    cooked.push(next);
                }
                _ => cooked.push('\\'),
            },
            _ => cooked.push(c),
        }
    }

    let start = start.unwrap_or(end);
    Token::Term(RawTerm {
        cooked,
        range: TextRange::new(start, end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::node::{StaticPackageNames, SystemClock};

    fn parser() -> FilterParser {
        FilterParser::new(
            Arc::new(StaticPackageNames::new(["com.example.app"])),
            Arc::new(SystemClock),
        )
    }

    fn parse(text: &str) -> FilterNode {
        parser()
            .parse(text)
            .expect("expression should parse")
            .expect("expression should not be blank")
    }

    fn parse_err(text: &str) -> FilterParseError {
        parser().parse(text).expect_err("expression should be rejected")
    }

    #[test]
    fn test_blank_input_is_no_filter() {
        assert_eq!(parser().parse("").expect("blank parses"), None);
        assert_eq!(parser().parse("   \t ").expect("blank parses"), None);
    }

    #[test]
    fn test_bare_term_matches_implicit_line() {
        let node = parse("timeout");
        assert_eq!(
            node,
            FilterNode::string("timeout", FilterField::ImplicitLine, false, false, TextRange::new(0, 7))
        );
    }

    #[test]
    fn test_keyed_term_with_aliases() {
        assert!(matches!(
            parse("tag:net"),
            FilterNode::StringMatch { field: FilterField::Tag, exact: false, negated: false, .. }
        ));
        assert!(matches!(
            parse("msg:hello"),
            FilterNode::StringMatch { field: FilterField::Message, .. }
        ));
        assert!(matches!(
            parse("app:com.example"),
            FilterNode::StringMatch { field: FilterField::App, .. }
        ));
        assert!(matches!(
            parse("process:system_server"),
            FilterNode::StringMatch { field: FilterField::Process, .. }
        ));
    }

    #[test]
    fn test_modifiers_and_negation() {
        assert!(matches!(
            parse("tag=:MyTag"),
            FilterNode::StringMatch { exact: true, negated: false, .. }
        ));
        assert!(matches!(
            parse("-tag:MyTag"),
            FilterNode::StringMatch { exact: false, negated: true, .. }
        ));
        assert!(matches!(
            parse("-tag=:MyTag"),
            FilterNode::StringMatch { exact: true, negated: true, .. }
        ));
        assert!(matches!(
            parse("tag~:My.*"),
            FilterNode::RegexMatch { negated: false, .. }
        ));
        assert!(matches!(
            parse("-tag~:My.*"),
            FilterNode::RegexMatch { negated: true, .. }
        ));
    }

    #[test]
    fn test_quoted_value_preserves_spaces_and_escapes() {
        let node = parse(r#"message:"two words \"quoted\"""#);
        let FilterNode::StringMatch { text, .. } = node else {
            panic!("expected string node");
        };
        assert_eq!(text, r#"two words "quoted""#);
    }

    #[test]
    fn test_level_age_is_and_name_terms() {
        assert!(matches!(
            parse("level:warn"),
            FilterNode::LevelAtLeast { level: LogLevel::Warn, .. }
        ));
        let FilterNode::AgeAtMost { max_age, .. } = parse("age:5m") else {
            panic!("expected age node");
        };
        assert_eq!(max_age, Duration::from_secs(300));
        assert!(matches!(parse("is:crash"), FilterNode::Crash { .. }));
        assert!(matches!(parse("is:stacktrace"), FilterNode::StackFrame { .. }));
        let FilterNode::Name { name, .. } = parse("name:mine") else {
            panic!("expected name node");
        };
        assert_eq!(name, "mine");
    }

    #[test]
    fn test_package_mine_builds_project_package_filter() {
        assert!(matches!(
            parse("package:mine"),
            FilterNode::ProjectPackage { .. }
        ));
        assert!(matches!(parse("app:mine"), FilterNode::ProjectPackage { .. }));
        // A literal value stays a plain string match.
        assert!(matches!(
            parse("package:mine.field"),
            FilterNode::StringMatch { field: FilterField::App, .. }
        ));
    }

    #[test]
    fn test_adjacency_is_and_and_bar_is_or() {
        let FilterNode::And { children, .. } = parse("tag:a tag:b tag:c") else {
            panic!("expected and node");
        };
        assert_eq!(children.len(), 3);

        let FilterNode::Or { children, .. } = parse("tag:a | tag:b | tag:c") else {
            panic!("expected or node");
        };
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        let FilterNode::Or { children, .. } = parse("tag:a | tag:b tag:c") else {
            panic!("expected or node");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(children[0], FilterNode::StringMatch { .. }));
        assert!(matches!(&children[1], FilterNode::And { children, .. } if children.len() == 2));
    }

    #[test]
    fn test_parens_group_explicitly() {
        let FilterNode::And { children, .. } = parse("(tag:a | tag:b) level:ERROR") else {
            panic!("expected and node");
        };
        assert!(matches!(children[0], FilterNode::Or { .. }));
        assert!(matches!(children[1], FilterNode::LevelAtLeast { .. }));
    }

    #[test]
    fn test_term_ranges_cover_source_text() {
        let text = "tag:a level:ERROR";
        let FilterNode::And { children, range } = parse(text) else {
            panic!("expected and node");
        };
        assert_eq!(children[0].range(), TextRange::new(0, 5));
        assert_eq!(children[1].range(), TextRange::new(6, 17));
        assert_eq!(range, TextRange::new(0, 17));
    }

    #[test]
    fn test_invalid_regex_is_rejected_with_pattern_range() {
        let err = parse_err("message~:(");
        let FilterParseError::InvalidRegex { pattern, range, .. } = err else {
            panic!("expected invalid regex error");
        };
        assert_eq!(pattern, "(");
        assert_eq!(range, TextRange::new(9, 10));
    }

    #[test]
    fn test_unknown_key_points_at_key() {
        let err = parse_err("bogus:value");
        let FilterParseError::UnknownKey { key, range } = err else {
            panic!("expected unknown key error");
        };
        assert_eq!(key, "bogus");
        assert_eq!(range, TextRange::new(0, 5));
    }

    #[test]
    fn test_bad_level_age_and_qualifier_are_rejected() {
        assert!(matches!(parse_err("level:chatty"), FilterParseError::InvalidLevel { .. }));
        assert!(matches!(parse_err("age:5x"), FilterParseError::InvalidAge { .. }));
        assert!(matches!(parse_err("age:m"), FilterParseError::InvalidAge { .. }));
        assert!(matches!(parse_err("is:anr"), FilterParseError::InvalidQualifier { .. }));
        assert!(matches!(parse_err("-level:INFO"), FilterParseError::InvalidNegation { .. }));
        assert!(matches!(parse_err("tag:"), FilterParseError::EmptyValue { .. }));
    }

    #[test]
    fn test_unbalanced_parens_are_rejected() {
        assert!(matches!(
            parse_err("(tag:a"),
            FilterParseError::UnbalancedParen { .. }
        ));
        let err = parse_err("tag:a )");
        let FilterParseError::UnbalancedParen { range } = err else {
            panic!("expected unbalanced paren error");
        };
        assert_eq!(range, TextRange::new(6, 7));
    }

    #[test]
    fn test_dangling_operator_is_rejected() {
        assert!(matches!(parse_err("tag:a |"), FilterParseError::MissingTerm { .. }));
        assert!(matches!(parse_err("| tag:a"), FilterParseError::MissingTerm { .. }));
    }
}
