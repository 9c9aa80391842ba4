//! Match outcomes
//!
//! A [`MatchResult`] is either a success or a [`Failure`]. Failures form a
//! tree: each node carries an optional breadcrumb (field name, array index,
//! `REQUEST`, `STATUS`, ...) and a message, and breadcrumbs are prepended as
//! the failure travels outward across structural boundaries. [`Results`]
//! aggregates many outcomes and knows how to drop low-information failures
//! so the most specific mismatch is reported first.

use serde::Serialize;
use std::fmt;

/// Classifies failures that callers need to rank or act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The request used a different HTTP method.
    MethodMismatch,
    /// The request is for a different path shape or literal segment.
    PathMismatch,
    /// The response status code differs.
    StatusMismatch,
    /// A discriminated union saw a discriminator value it does not know.
    DiscriminatorMismatch,
    /// The contract itself is broken (e.g. a reference that does not resolve).
    InvalidContract,
}

impl FailureReason {
    /// Fluff failures only say "this scenario is about something else".
    pub fn is_fluff(self) -> bool {
        matches!(
            self,
            FailureReason::MethodMismatch | FailureReason::PathMismatch
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    message: String,
    breadcrumb: Option<String>,
    causes: Vec<Failure>,
    reason: Option<FailureReason>,
    advisory: bool,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            breadcrumb: None,
            causes: Vec::new(),
            reason: None,
            advisory: false,
        }
    }

    /// A failure whose detail lives in `cause`.
    pub fn caused_by(message: impl Into<String>, cause: Failure) -> Self {
        let reason = cause.reason;
        Self {
            message: message.into(),
            breadcrumb: None,
            causes: vec![cause],
            reason,
            advisory: false,
        }
    }

    /// Merge sibling failures into one node. A single failure is returned as is.
    pub fn combine(mut failures: Vec<Failure>) -> Failure {
        if failures.len() == 1 {
            return failures.remove(0);
        }
        Self {
            message: String::new(),
            breadcrumb: None,
            causes: failures,
            reason: None,
            advisory: false,
        }
    }

    pub fn with_reason(mut self, reason: FailureReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Prepend a structural location to this failure.
    pub fn breadcrumb(self, crumb: impl Into<String>) -> Self {
        let crumb = crumb.into();
        if self.breadcrumb.is_none() {
            return Self {
                breadcrumb: Some(crumb),
                ..self
            };
        }
        let reason = self.reason;
        let advisory = self.advisory;
        Self {
            message: String::new(),
            breadcrumb: Some(crumb),
            causes: vec![self],
            reason,
            advisory,
        }
    }

    /// Mark this failure as advisory: reported, but not counted against success.
    pub fn into_advisory(mut self) -> Self {
        self.advisory = true;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reason(&self) -> Option<FailureReason> {
        self.reason
    }

    pub fn causes(&self) -> &[Failure] {
        &self.causes
    }

    pub fn is_advisory(&self) -> bool {
        self.advisory
    }

    /// True when every leaf of this failure only says "wrong endpoint".
    pub fn is_fluff(&self) -> bool {
        match self.reason {
            Some(reason) => reason.is_fluff(),
            None if self.causes.is_empty() => false,
            None => self.causes.iter().all(Failure::is_fluff),
        }
    }

    /// True when this failure, or anything beneath it, is a contract defect.
    pub fn is_fatal(&self) -> bool {
        self.reason == Some(FailureReason::InvalidContract)
            || self.causes.iter().any(Failure::is_fatal)
    }

    /// True when any node in the tree carries the given breadcrumb.
    pub fn has_breadcrumb(&self, crumb: &str) -> bool {
        self.breadcrumb.as_deref() == Some(crumb)
            || self.causes.iter().any(|c| c.has_breadcrumb(crumb))
    }

    pub fn report(&self) -> FailureReport {
        let mut entries = Vec::new();
        self.collect(&mut Vec::new(), &mut Vec::new(), &mut entries);
        FailureReport { entries }
    }

    fn collect(
        &self,
        path: &mut Vec<String>,
        messages: &mut Vec<String>,
        out: &mut Vec<ReportEntry>,
    ) {
        let crumb_pushed = match &self.breadcrumb {
            Some(crumb) => {
                path.push(crumb.clone());
                true
            }
            None => false,
        };
        let message_pushed = if self.message.is_empty() {
            false
        } else {
            messages.push(self.message.clone());
            true
        };

        if self.causes.is_empty() {
            // Innermost message first.
            let mut ordered = messages.clone();
            ordered.reverse();
            out.push(ReportEntry {
                path: path.clone(),
                messages: ordered,
            });
        } else {
            for cause in &self.causes {
                cause.collect(path, messages, out);
            }
        }

        if message_pushed {
            messages.pop();
        }
        if crumb_pushed {
            path.pop();
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report())
    }
}

/// One flattened line of a failure: where it happened and what went wrong.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub path: Vec<String>,
    pub messages: Vec<String>,
}

impl ReportEntry {
    /// Render the breadcrumb path outside-in, e.g. `REQUEST.BODY.items[0].id`.
    pub fn rendered_path(&self) -> String {
        let mut out = String::new();
        let mut previous_spaced = false;
        for (i, crumb) in self.path.iter().enumerate() {
            let spaced = crumb.contains(' ');
            if i > 0 {
                if spaced || previous_spaced {
                    out.push_str(" >> ");
                } else if !crumb.starts_with('[') {
                    out.push('.');
                }
            }
            out.push_str(crumb);
            previous_spaced = spaced;
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureReport {
    entries: Vec<ReportEntry>,
}

impl FailureReport {
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append(&mut self, other: FailureReport) {
        for entry in other.entries {
            if !self.entries.contains(&entry) {
                self.entries.push(entry);
            }
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            if !entry.path.is_empty() {
                writeln!(f, ">> {}", entry.rendered_path())?;
                writeln!(f)?;
            }
            for message in &entry.messages {
                writeln!(f, "   {}", message)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Success,
    Failure(Failure),
}

impl MatchResult {
    pub fn failure(message: impl Into<String>) -> Self {
        MatchResult::Failure(Failure::new(message))
    }

    /// Success when there are no failures, otherwise one combined failure.
    pub fn from_failures(failures: Vec<Failure>) -> Self {
        if failures.is_empty() {
            MatchResult::Success
        } else {
            MatchResult::Failure(Failure::combine(failures))
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MatchResult::Success)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn breadcrumb(self, crumb: impl Into<String>) -> Self {
        match self {
            MatchResult::Success => MatchResult::Success,
            MatchResult::Failure(f) => MatchResult::Failure(f.breadcrumb(crumb)),
        }
    }

    pub fn with_reason(self, reason: FailureReason) -> Self {
        match self {
            MatchResult::Success => MatchResult::Success,
            MatchResult::Failure(f) => MatchResult::Failure(f.with_reason(reason)),
        }
    }

    /// Run `next` only when this result succeeded.
    pub fn and_then(self, next: impl FnOnce() -> MatchResult) -> MatchResult {
        match self {
            MatchResult::Success => next(),
            failure => failure,
        }
    }

    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            MatchResult::Success => None,
            MatchResult::Failure(f) => Some(f),
        }
    }

    pub fn into_failure(self) -> Option<Failure> {
        match self {
            MatchResult::Success => None,
            MatchResult::Failure(f) => Some(f),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.as_failure().is_some_and(Failure::is_fatal)
    }

    pub fn report(&self) -> FailureReport {
        self.as_failure().map(Failure::report).unwrap_or_default()
    }
}

/// An aggregate of outcomes, e.g. one per scenario tried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Results {
    results: Vec<MatchResult>,
}

impl Results {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: MatchResult) {
        self.results.push(result);
    }

    pub fn extend(&mut self, other: Results) {
        self.results.extend(other.results);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.results.iter().filter_map(MatchResult::as_failure)
    }

    /// Every outcome succeeded, ignoring advisory failures.
    pub fn is_success(&self) -> bool {
        self.failures().all(Failure::is_advisory)
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Number of failures that count against success.
    pub fn failure_count(&self) -> usize {
        self.failures().filter(|f| !f.is_advisory()).count()
    }

    pub fn advisory_count(&self) -> usize {
        self.failures().filter(|f| f.is_advisory()).count()
    }

    pub fn first_fatal(&self) -> Option<&Failure> {
        self.failures().find(|f| f.is_fatal())
    }

    /// Drop "wrong endpoint" failures whenever a more specific failure exists,
    /// and put the remaining failures most-specific first.
    pub fn without_fluff(&self) -> Results {
        let failures: Vec<&Failure> = self.failures().collect();
        let has_specific = failures.iter().any(|f| !f.is_fluff());

        let mut kept: Vec<MatchResult> = if has_specific {
            failures
                .into_iter()
                .filter(|f| !f.is_fluff())
                .cloned()
                .map(MatchResult::Failure)
                .collect()
        } else {
            failures.into_iter().cloned().map(MatchResult::Failure).collect()
        };
        // Deeper failures carry more detail; show them first.
        kept.sort_by_key(|r| std::cmp::Reverse(specificity(r)));
        kept.extend(self.results.iter().filter(|r| r.is_success()).cloned());
        Results { results: kept }
    }

    pub fn report(&self) -> FailureReport {
        let mut report = FailureReport::default();
        for failure in self.failures() {
            report.append(failure.report());
        }
        report
    }
}

impl FromIterator<MatchResult> for Results {
    fn from_iter<I: IntoIterator<Item = MatchResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

fn specificity(result: &MatchResult) -> usize {
    result
        .report()
        .entries()
        .iter()
        .map(|e| e.path.len())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breadcrumbs_read_outside_in() {
        let failure = Failure::new("Expected number, actual was \"abc\"")
            .breadcrumb("id")
            .breadcrumb("BODY")
            .breadcrumb("REQUEST");

        let report = failure.report();
        assert_eq!(report.entries().len(), 1);
        assert_eq!(report.entries()[0].rendered_path(), "REQUEST.BODY.id");
    }

    #[test]
    fn test_messages_most_specific_first() {
        let inner = Failure::new("inner detail").breadcrumb("name");
        let outer = Failure::caused_by("outer summary", inner).breadcrumb("BODY");

        let report = outer.report();
        let entry = &report.entries()[0];
        assert_eq!(entry.messages, vec!["inner detail", "outer summary"]);
        assert_eq!(entry.rendered_path(), "BODY.name");
    }

    #[test]
    fn test_array_index_breadcrumb_rendering() {
        let failure = Failure::new("bad")
            .breadcrumb("[2]")
            .breadcrumb("items")
            .breadcrumb("BODY");
        assert_eq!(
            failure.report().entries()[0].rendered_path(),
            "BODY.items[2]"
        );
    }

    #[test]
    fn test_method_path_breadcrumb_rendering() {
        let failure = Failure::new("bad")
            .breadcrumb("STATUS")
            .breadcrumb("RESPONSE")
            .breadcrumb("POST /orders");
        assert_eq!(
            failure.report().entries()[0].rendered_path(),
            "POST /orders >> RESPONSE.STATUS"
        );
    }

    #[test]
    fn test_combined_failures_produce_one_entry_each() {
        let combined = Failure::combine(vec![
            Failure::new("missing").breadcrumb("a"),
            Failure::new("wrong type").breadcrumb("b"),
        ])
        .breadcrumb("BODY");

        let report = combined.report();
        assert_eq!(report.entries().len(), 2);
        assert_eq!(report.entries()[0].rendered_path(), "BODY.a");
        assert_eq!(report.entries()[1].rendered_path(), "BODY.b");
    }

    #[test]
    fn test_fluff_detection_propagates_through_breadcrumbs() {
        let fluff = Failure::new("different path")
            .with_reason(FailureReason::PathMismatch)
            .breadcrumb("PATH")
            .breadcrumb("REQUEST");
        assert!(fluff.is_fluff());

        let specific = Failure::new("Expected number").breadcrumb("BODY");
        assert!(!specific.is_fluff());
    }

    #[test]
    fn test_without_fluff_keeps_specific_failures() {
        let results: Results = vec![
            MatchResult::Failure(
                Failure::new("other path").with_reason(FailureReason::PathMismatch),
            ),
            MatchResult::Failure(Failure::new("wrong body").breadcrumb("BODY")),
        ]
        .into_iter()
        .collect();

        let filtered = results.without_fluff();
        assert_eq!(filtered.failure_count(), 1);
        assert!(filtered.report().to_string().contains("wrong body"));
    }

    #[test]
    fn test_without_fluff_keeps_fluff_when_nothing_else() {
        let results: Results = vec![MatchResult::Failure(
            Failure::new("other method").with_reason(FailureReason::MethodMismatch),
        )]
        .into_iter()
        .collect();

        assert_eq!(results.without_fluff().failure_count(), 1);
    }

    #[test]
    fn test_results_success_ignores_advisory() {
        let mut results = Results::new();
        results.push(MatchResult::Success);
        results.push(MatchResult::Failure(Failure::new("meh").into_advisory()));
        assert!(results.is_success());
        assert_eq!(results.failure_count(), 0);
        assert_eq!(results.advisory_count(), 1);

        results.push(MatchResult::failure("real"));
        assert!(!results.is_success());
    }

    #[test]
    fn test_fatal_detection() {
        let failure = Failure::caused_by(
            "while matching",
            Failure::new("reference not found").with_reason(FailureReason::InvalidContract),
        );
        assert!(failure.is_fatal());
        assert!(MatchResult::Failure(failure).is_fatal());
        assert!(!MatchResult::Success.is_fatal());
    }

    #[test]
    fn test_and_then_short_circuits() {
        let mut called = false;
        let result = MatchResult::failure("first").and_then(|| {
            called = true;
            MatchResult::Success
        });
        assert!(result.is_failure());
        assert!(!called);
    }

    #[test]
    fn test_has_breadcrumb() {
        let failure = Failure::new("x").breadcrumb("STATUS").breadcrumb("RESPONSE");
        assert!(failure.has_breadcrumb("STATUS"));
        assert!(!failure.has_breadcrumb("BODY"));
    }
}
