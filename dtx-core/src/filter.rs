//! Test name filters
//!
//! A filter selects which tests a run covers. The empty filter selects every
//! test. Names are compared after stripping the parenthesized argument list,
//! since generated names may embed literals that contain dots or operators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Remove the parenthesized argument list from a test name
///
/// Everything from the first `(` up to the last `)` is dropped, so
/// `A.B.Test(x: "a(b)")` becomes `A.B.Test`.
pub fn strip_arguments(name: &str) -> String {
    let Some(open) = name.find('(') else {
        return name.to_string();
    };
    match name.rfind(')') {
        Some(close) if close > open => {
            let mut stripped = String::with_capacity(name.len());
            stripped.push_str(&name[..open]);
            stripped.push_str(&name[close + 1..]);
            stripped
        }
        _ => name.to_string(),
    }
}

/// Identifier the toolchain filters a test by
///
/// Arguments are stripped and nested classes, reported as `Outer+Inner`,
/// are addressed as `Outer.Inner`.
pub fn run_id(name: &str) -> String {
    strip_arguments(name).replace('+', ".")
}

/// A request to run a subset of tests
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestFilter {
    /// Test name or name prefix; empty means all tests
    pub name: String,
    /// Whether `name` must match a single test exactly
    pub exact: bool,
}

impl TestFilter {
    /// Filter that selects every test
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter that selects one test
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exact: true,
        }
    }

    /// Filter that selects every test whose name starts with `prefix`
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            name: prefix.into(),
            exact: false,
        }
    }

    /// Whether this filter selects every test
    pub fn is_all(&self) -> bool {
        self.name.is_empty()
    }

    /// The `--filter` expression handed to `dotnet test`
    ///
    /// Returns `None` for the all-tests filter.
    pub fn expression(&self) -> Option<String> {
        if self.is_all() {
            return None;
        }
        let op = if self.exact { '=' } else { '~' };
        Some(format!("FullyQualifiedName{}{}", op, strip_arguments(&self.name)))
    }

    /// Whether a test with the given name is covered by this filter
    pub fn matches(&self, test_name: &str) -> bool {
        if self.is_all() {
            return true;
        }
        let wanted = run_id(&self.name);
        let candidate = run_id(test_name);
        if self.exact {
            candidate == wanted
        } else {
            candidate.starts_with(&wanted)
        }
    }
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            write!(f, "all tests")
        } else if self.exact {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}*", self.name)
        }
    }
}
