//! Diagnostics infrastructure for tracking issues during a conversion run.
//!
//! Recoverable conditions never abort a conversion: a substation that fails
//! structural validation falls back to bus-breaker topology, a clamped
//! magnetizing susceptance keeps the transformer, a voltage level that
//! blows the export node budget is re-exported bus-breaker. All of those
//! outcomes are visible only through the diagnostics collected here.
//!
//! # Example
//!
//! ```
//! use gmx_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("topology", "substation 4 spans two buses, using bus-breaker");
//! diag.add_error_with_entity("reference", "node 12 not owned by bus 400", "Load L1");
//!
//! assert_eq!(diag.warning_count(), 1);
//! assert_eq!(diag.error_count(), 1);
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but conversion continued (e.g. bus-breaker fallback)
    Warning,
    /// Could not convert an element (e.g. malformed record)
    Error,
}

/// A single diagnostic issue encountered during a conversion
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    /// Severity of the issue
    pub severity: Severity,
    /// Category for grouping (e.g. "parse", "topology", "transformer")
    pub category: String,
    /// Human-readable description of the issue
    pub message: String,
    /// Optional line number (for file-based operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    /// Optional entity reference (e.g. "Substation 4", "Transformer T-1-2-1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    /// Create a new diagnostic issue
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            line: None,
            entity: None,
        }
    }

    /// Add line number to the issue
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Add entity reference to the issue
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };

        write!(f, "[{}:{}] {}", severity, self.category, self.message)?;

        if let Some(entity) = &self.entity {
            write!(f, " ({})", entity)?;
        }
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }

        Ok(())
    }
}

/// Collection of diagnostic issues for one conversion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// All collected issues
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    /// Create new empty diagnostics
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw issue directly
    pub fn add(&mut self, issue: DiagnosticIssue) {
        self.issues.push(issue);
    }

    /// Add a warning with category and message
    pub fn add_warning(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    /// Add a warning with line number
    pub fn add_warning_at_line(&mut self, category: &str, message: &str, line: usize) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_line(line));
    }

    /// Add a warning with entity reference
    pub fn add_warning_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    /// Add an error with category and message
    pub fn add_error(&mut self, category: &str, message: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    /// Add an error with line number
    pub fn add_error_at_line(&mut self, category: &str, message: &str, line: usize) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_line(line));
    }

    /// Add an error with entity reference
    pub fn add_error_with_entity(&mut self, category: &str, message: &str, entity: &str) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message).with_entity(entity));
    }

    /// Count warning issues
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Count error issues
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    /// Check if there are any issues
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Warning)
    }

    /// Get issues filtered by category
    pub fn issues_by_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a DiagnosticIssue> {
        self.issues.iter().filter(move |i| i.category == category)
    }

    /// Get only error issues
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Get only warning issues
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    /// Merge another diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        let warnings = self.warning_count();
        let errors = self.error_count();

        match (warnings, errors) {
            (0, 0) => "No issues".to_string(),
            (w, 0) => format!("{} warning{}", w, if w == 1 { "" } else { "s" }),
            (0, e) => format!("{} error{}", e, if e == 1 { "" } else { "s" }),
            (w, e) => format!(
                "{} warning{}, {} error{}",
                w,
                if w == 1 { "" } else { "s" },
                e,
                if e == 1 { "" } else { "s" }
            ),
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Diagnostics: {}", self.summary())?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}

// ============================================================================
// Conversion-specific extensions
// ============================================================================

/// Counters for one conversion run (either direction)
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    /// Substations that passed node-breaker validation
    pub substations_valid: usize,
    /// Substations (or voltage levels) that fell back to bus-breaker
    pub substations_fallback: usize,
    pub switches: usize,
    pub busbar_sections: usize,
    /// Nodes allocated to resolve equipment collisions / collapse islands
    pub synthetic_nodes: usize,
    pub internal_connections: usize,
    pub transformers: usize,
    /// Values clamped during numeric conversion (e.g. negative susceptance)
    pub clamped_values: usize,
}

/// Diagnostics plus counters for a conversion run.
///
/// This is the primary companion return value of the importer and exporter
/// entry points: the converted model, plus everything that was degraded or
/// skipped along the way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionDiagnostics {
    /// Element counts and fallback statistics
    pub stats: ConversionStats,
    /// All collected issues (warnings and errors)
    #[serde(skip_serializing_if = "Diagnostics::is_empty_ref")]
    pub diagnostics: Diagnostics,
}

impl Diagnostics {
    fn is_empty_ref(d: &Diagnostics) -> bool {
        d.issues.is_empty()
    }
}

impl ConversionDiagnostics {
    /// Create new empty conversion diagnostics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a clamped value with its warning in one step
    pub fn add_clamp(&mut self, category: &str, message: &str, entity: &str) {
        self.diagnostics
            .add_warning_with_entity(category, message, entity);
        self.stats.clamped_values += 1;
    }

    /// Record a bus-breaker fallback with its warning in one step
    pub fn add_fallback(&mut self, message: &str, entity: &str) {
        self.diagnostics
            .add_warning_with_entity("topology", message, entity);
        self.stats.substations_fallback += 1;
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "{} substations valid, {} fallback, {} switches, {} transformers | {}",
            self.stats.substations_valid,
            self.stats.substations_fallback,
            self.stats.switches,
            self.stats.transformers,
            self.diagnostics.summary()
        )
    }
}

impl std::fmt::Display for ConversionDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Conversion: {}", self.summary())?;
        for issue in &self.diagnostics.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}
