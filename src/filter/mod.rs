//! Filter expression parsing and evaluation
//!
//! This module turns a filter expression string into a boolean tree of
//! predicates over log records, then sweeps record batches through it.
//! The tree is built once per expression; each sweep runs a one-time
//! `prepare` pass (refreshing caches such as the project package set)
//! followed by a pure per-record `matches` walk.
//!
//! # Syntax
//!
//! ```text
//! key:value            match a field (case-insensitive containment)
//! key=:value           exact match        key~:regex   regex match
//! -key:value           negated form of any of the above
//! bare text            match anywhere in the formatted line
//! level:WARN           at or above a level        age:5m   at most this old
//! is:crash             crash headers              is:stacktrace   stack frames
//! package:mine         records from the project's own packages
//! name:label           names the filter; matches everything
//! a b | c  (a b) | c   adjacency is AND, `|` is OR, parens group
//! ```
//!
//! # Examples
//!
//! ```text
//! tag:NetworkScheduler level:WARN       warnings from one tag
//! package:mine is:crash                 my app's crash headers
//! -message~:polling  age:10m            drop matches of a regex, recent only
//! ```

pub mod error;
pub mod node;
pub mod parser;

pub use error::FilterParseError;
pub use node::{
    Clock, FilterField, FilterNode, MasterFilter, PackageNamesProvider, StaticPackageNames,
    SystemClock, TextRange,
};
pub use parser::{FilterParser, MY_PACKAGE};
