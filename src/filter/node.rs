use super::error::FilterParseError;
use crate::record::{LogLevel, LogRecord, RecordView};
use chrono::FixedOffset;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// A stack frame inside a logged exception body looks like
/// `\n    at com.example.Foo.bar(Foo.java:42)\n`.
static STACK_FRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*at .+\(.+\)\n").expect("valid stack frame regex"));

/// Half-open range of character offsets into the filter expression text.
///
/// Nodes keep the range they were parsed from so errors and editor-style
/// lookups can point back into the original expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        TextRange { start, end }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Source of "now" for the age filter. Injected so tests can pin time.
pub trait Clock: fmt::Debug {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Source of the package names belonging to the user's own project, for
/// the `package:mine` filter. Queried once per prepare, not per record.
pub trait PackageNamesProvider: fmt::Debug {
    fn package_names(&self) -> HashSet<String>;
}

/// A fixed set of package names, e.g. from config or `--package` flags.
#[derive(Debug, Default)]
pub struct StaticPackageNames {
    names: HashSet<String>,
}

impl StaticPackageNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StaticPackageNames {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl PackageNamesProvider for StaticPackageNames {
    fn package_names(&self) -> HashSet<String> {
        self.names.clone()
    }
}

/// The record field a string/regex filter matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    Tag,
    App,
    Message,
    Line,
    /// Same value as [`FilterField::Line`]; marks terms that were written
    /// without a key, so the expression keeps the shape it was typed with.
    ImplicitLine,
    Process,
}

impl FilterField {
    /// Extracts the field value. Total: a field a record does not carry
    /// resolves to the empty string, never to an error.
    pub fn value<'a>(&self, view: &'a RecordView) -> &'a str {
        match self {
            FilterField::Tag => &view.record().header.tag,
            FilterField::App => &view.record().header.application_id,
            FilterField::Message => &view.record().message,
            FilterField::Line | FilterField::ImplicitLine => view.line(),
            FilterField::Process => &view.record().header.process_name,
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn equals_ci(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}

fn same_instance<T: ?Sized>(left: &Arc<T>, right: &Arc<T>) -> bool {
    Arc::as_ptr(left) as *const () == Arc::as_ptr(right) as *const ()
}

/// One node of a parsed filter expression tree.
///
/// Leaves are predicates over a single record; `And`/`Or` combine child
/// nodes. A tree is built once per expression and is immutable afterwards,
/// except for the caches refreshed by [`FilterNode::prepare`].
#[derive(Debug, Clone)]
pub enum FilterNode {
    /// Case-insensitive containment (`exact: false`) or equality
    /// (`exact: true`) of a literal against a field.
    StringMatch {
        text: String,
        field: FilterField,
        exact: bool,
        negated: bool,
        range: TextRange,
    },
    /// Unanchored regex search against a field. The pattern is compiled at
    /// construction; a malformed pattern never survives to matching.
    RegexMatch {
        pattern: String,
        regex: Regex,
        field: FilterField,
        negated: bool,
        range: TextRange,
    },
    /// Record level is at or above the threshold (inclusive).
    LevelAtLeast { level: LogLevel, range: TextRange },
    /// Record is no older than `max_age` according to the injected clock
    /// (inclusive boundary, millisecond precision).
    AgeAtMost {
        max_age: Duration,
        clock: Arc<dyn Clock>,
        range: TextRange,
    },
    /// Record belongs to the user's project: its application id is one of
    /// the provider's packages, or it is an ERROR-or-above record whose
    /// message mentions one of them.
    ProjectPackage {
        provider: Arc<dyn PackageNamesProvider>,
        packages: HashSet<String>,
        package_regex: Option<Regex>,
        range: TextRange,
    },
    /// Record is the header of a JVM or native crash.
    Crash { range: TextRange },
    /// Record's message contains a stack frame line.
    StackFrame { range: TextRange },
    /// Always matches; carries a display name for the whole expression.
    Name { name: String, range: TextRange },
    And {
        children: Vec<FilterNode>,
        range: TextRange,
    },
    Or {
        children: Vec<FilterNode>,
        range: TextRange,
    },
}

fn span_of(children: &[FilterNode]) -> TextRange {
    assert!(!children.is_empty(), "combinator requires at least one child");
    TextRange::new(
        children[0].range().start,
        children[children.len() - 1].range().end,
    )
}

impl FilterNode {
    pub fn string(
        text: impl Into<String>,
        field: FilterField,
        exact: bool,
        negated: bool,
        range: TextRange,
    ) -> Self {
        FilterNode::StringMatch {
            text: text.into(),
            field,
            exact,
            negated,
            range,
        }
    }

    /// Compiles `pattern` eagerly so malformed regexes surface during
    /// parsing, not mid-sweep.
    pub fn regex(
        pattern: impl Into<String>,
        field: FilterField,
        negated: bool,
        range: TextRange,
    ) -> Result<Self, FilterParseError> {
        let pattern = pattern.into();
        let regex = Regex::new(&pattern).map_err(|err| FilterParseError::InvalidRegex {
            pattern: pattern.clone(),
            reason: err.to_string(),
            range,
        })?;
        Ok(FilterNode::RegexMatch {
            pattern,
            regex,
            field,
            negated,
            range,
        })
    }

    pub fn level_at_least(level: LogLevel, range: TextRange) -> Self {
        FilterNode::LevelAtLeast { level, range }
    }

    pub fn age_at_most(max_age: Duration, clock: Arc<dyn Clock>, range: TextRange) -> Self {
        FilterNode::AgeAtMost {
            max_age,
            clock,
            range,
        }
    }

    pub fn project_package(provider: Arc<dyn PackageNamesProvider>, range: TextRange) -> Self {
        FilterNode::ProjectPackage {
            provider,
            packages: HashSet::new(),
            package_regex: None,
            range,
        }
    }

    pub fn crash(range: TextRange) -> Self {
        FilterNode::Crash { range }
    }

    pub fn stack_frame(range: TextRange) -> Self {
        FilterNode::StackFrame { range }
    }

    pub fn name(name: impl Into<String>, range: TextRange) -> Self {
        FilterNode::Name {
            name: name.into(),
            range,
        }
    }

    /// Combinator over a non-empty child list; its range spans from the
    /// first child's start to the last child's end.
    pub fn and(children: Vec<FilterNode>) -> Self {
        let range = span_of(&children);
        FilterNode::And { children, range }
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        let range = span_of(&children);
        FilterNode::Or { children, range }
    }

    pub fn range(&self) -> TextRange {
        match self {
            FilterNode::StringMatch { range, .. }
            | FilterNode::RegexMatch { range, .. }
            | FilterNode::LevelAtLeast { range, .. }
            | FilterNode::AgeAtMost { range, .. }
            | FilterNode::ProjectPackage { range, .. }
            | FilterNode::Crash { range }
            | FilterNode::StackFrame { range }
            | FilterNode::Name { range, .. }
            | FilterNode::And { range, .. }
            | FilterNode::Or { range, .. } => *range,
        }
    }

    /// Refreshes per-sweep caches. Called once by [`MasterFilter::filter`]
    /// before any record is matched; repeated calls replace the caches
    /// rather than growing them.
    pub fn prepare(&mut self) {
        match self {
            FilterNode::And { children, .. } | FilterNode::Or { children, .. } => {
                for child in children {
                    child.prepare();
                }
            }
            FilterNode::ProjectPackage {
                provider,
                packages,
                package_regex,
                ..
            } => {
                *packages = provider.package_names();
                *package_regex = if packages.is_empty() {
                    None
                } else {
                    let mut escaped: Vec<String> =
                        packages.iter().map(|name| name.replace('.', "\\.")).collect();
                    escaped.sort();
                    // Matching must not fail, so a name that still does not
                    // form a valid pattern just disables the message scan.
                    Regex::new(&escaped.join("|")).ok()
                };
            }
            _ => {}
        }
    }

    /// Pure predicate over one record view. Never fails.
    pub fn matches(&self, view: &RecordView) -> bool {
        match self {
            FilterNode::StringMatch {
                text,
                field,
                exact,
                negated,
                ..
            } => {
                let value = field.value(view);
                let hit = if *exact {
                    equals_ci(value, text)
                } else {
                    contains_ci(value, text)
                };
                hit != *negated
            }
            FilterNode::RegexMatch {
                regex,
                field,
                negated,
                ..
            } => regex.is_match(field.value(view)) != *negated,
            FilterNode::LevelAtLeast { level, .. } => view.record().header.level >= *level,
            FilterNode::AgeAtMost { max_age, clock, .. } => {
                clock.now_millis() - view.record().header.timestamp.timestamp_millis()
                    <= max_age.as_millis() as i64
            }
            FilterNode::ProjectPackage {
                packages,
                package_regex,
                ..
            } => {
                let header = &view.record().header;
                packages.contains(&header.application_id)
                    || (header.level >= LogLevel::Error
                        && package_regex
                            .as_ref()
                            .is_some_and(|regex| regex.is_match(&view.record().message)))
            }
            FilterNode::Crash { .. } => {
                let header = &view.record().header;
                (header.level == LogLevel::Error
                    && header.tag == "AndroidRuntime"
                    && view.record().message.starts_with("FATAL EXCEPTION"))
                    || (header.level == LogLevel::Assert
                        && (header.tag == "DEBUG" || header.tag == "libc"))
            }
            FilterNode::StackFrame { .. } => STACK_FRAME_RE.is_match(&view.record().message),
            FilterNode::Name { .. } => true,
            FilterNode::And { children, .. } => children.iter().all(|child| child.matches(view)),
            FilterNode::Or { children, .. } => children.iter().any(|child| child.matches(view)),
        }
    }

    /// Display name of the expression: the last `name:` marker in tree
    /// order, if any.
    pub fn filter_name(&self) -> Option<&str> {
        match self {
            FilterNode::Name { name, .. } => Some(name),
            FilterNode::And { children, .. } | FilterNode::Or { children, .. } => {
                children.iter().filter_map(FilterNode::filter_name).last()
            }
            _ => None,
        }
    }

    /// The innermost node governing `offset` in the expression text: the
    /// first child (in list order) that resolves, or the combinator itself
    /// when only its own range covers the offset.
    pub fn node_at_offset(&self, offset: usize) -> Option<&FilterNode> {
        match self {
            FilterNode::And { children, range } | FilterNode::Or { children, range } => {
                if !range.contains(offset) {
                    return None;
                }
                children
                    .iter()
                    .find_map(|child| child.node_at_offset(offset))
                    .or(Some(self))
            }
            _ => self.range().contains(offset).then_some(self),
        }
    }
}

/// Two project-package filters sharing a provider are interchangeable, so
/// their equality (and hash) is the provider's identity, not the current
/// package set. Everything else compares structurally, with compiled
/// regexes represented by their source pattern.
impl PartialEq for FilterNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                FilterNode::StringMatch {
                    text: a,
                    field: fa,
                    exact: ea,
                    negated: na,
                    range: ra,
                },
                FilterNode::StringMatch {
                    text: b,
                    field: fb,
                    exact: eb,
                    negated: nb,
                    range: rb,
                },
            ) => a == b && fa == fb && ea == eb && na == nb && ra == rb,
            (
                FilterNode::RegexMatch {
                    pattern: a,
                    field: fa,
                    negated: na,
                    range: ra,
                    ..
                },
                FilterNode::RegexMatch {
                    pattern: b,
                    field: fb,
                    negated: nb,
                    range: rb,
                    ..
                },
            ) => a == b && fa == fb && na == nb && ra == rb,
            (
                FilterNode::LevelAtLeast {
                    level: a,
                    range: ra,
                },
                FilterNode::LevelAtLeast {
                    level: b,
                    range: rb,
                },
            ) => a == b && ra == rb,
            (
                FilterNode::AgeAtMost {
                    max_age: a,
                    clock: ca,
                    range: ra,
                },
                FilterNode::AgeAtMost {
                    max_age: b,
                    clock: cb,
                    range: rb,
                },
            ) => a == b && same_instance(ca, cb) && ra == rb,
            (
                FilterNode::ProjectPackage { provider: a, .. },
                FilterNode::ProjectPackage { provider: b, .. },
            ) => same_instance(a, b),
            (FilterNode::Crash { range: a }, FilterNode::Crash { range: b }) => a == b,
            (FilterNode::StackFrame { range: a }, FilterNode::StackFrame { range: b }) => a == b,
            (
                FilterNode::Name { name: a, range: ra },
                FilterNode::Name { name: b, range: rb },
            ) => a == b && ra == rb,
            (FilterNode::And { children: a, .. }, FilterNode::And { children: b, .. }) => a == b,
            (FilterNode::Or { children: a, .. }, FilterNode::Or { children: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for FilterNode {}

impl Hash for FilterNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FilterNode::StringMatch {
                text,
                field,
                exact,
                negated,
                range,
            } => {
                text.hash(state);
                field.hash(state);
                exact.hash(state);
                negated.hash(state);
                range.hash(state);
            }
            FilterNode::RegexMatch {
                pattern,
                field,
                negated,
                range,
                ..
            } => {
                pattern.hash(state);
                field.hash(state);
                negated.hash(state);
                range.hash(state);
            }
            FilterNode::LevelAtLeast { level, range } => {
                level.hash(state);
                range.hash(state);
            }
            FilterNode::AgeAtMost { max_age, range, .. } => {
                max_age.hash(state);
                range.hash(state);
            }
            FilterNode::ProjectPackage { provider, .. } => {
                (Arc::as_ptr(provider) as *const () as usize).hash(state);
            }
            FilterNode::Crash { range } | FilterNode::StackFrame { range } => range.hash(state),
            FilterNode::Name { name, range } => {
                name.hash(state);
                range.hash(state);
            }
            FilterNode::And { children, .. } | FilterNode::Or { children, .. } => {
                children.hash(state);
            }
        }
    }
}

/// The top-level filter: prepares a tree once, then sweeps a batch of
/// records through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterFilter {
    filter: Option<FilterNode>,
}

impl MasterFilter {
    /// `None` means "no filter": the sweep is the identity.
    pub fn new(filter: Option<FilterNode>) -> Self {
        MasterFilter { filter }
    }

    pub fn node(&self) -> Option<&FilterNode> {
        self.filter.as_ref()
    }

    /// One complete sweep. Output preserves input order; system records
    /// are retained unconditionally and never reach the predicate tree.
    pub fn filter(&mut self, records: &[LogRecord], zone: FixedOffset) -> Vec<LogRecord> {
        let Some(node) = self.filter.as_mut() else {
            return records.to_vec();
        };
        node.prepare();
        let node = &*node;
        records
            .iter()
            .filter(|record| record.is_system() || node.matches(&RecordView::new(record, zone)))
            .cloned()
            .collect()
    }
}
