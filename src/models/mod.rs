//! Data models for cardwright.
//!
//! This module defines the core data structures:
//! - `TestCase` / `TestScriptRow` - Spreadsheet rows grouped by test case ID
//! - `CellValue` - A raw spreadsheet cell before sanitization
//! - `IssueKey` - Tracker-assigned ticket key (e.g., "BTV-3100")
//! - `RunningNumber` - Sequential number embedded in ticket summaries
//! - `ExecutionStatus` / `ExecutionOutcome` - Result of one manual test run

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single spreadsheet cell as read from the workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    /// Blank cell (or a cell the reader could not interpret)
    #[default]
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl CellValue {
    /// Shorthand for a text cell.
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// True for blank cells and NaN floats.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Float(f) => f.is_nan(),
            _ => false,
        }
    }
}

/// One test script line belonging to a test case.
///
/// `None` means the column is absent from the sheet, which is different from
/// a blank cell in a present column (`Some(CellValue::Empty)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestScriptRow {
    pub script_id: Option<CellValue>,
    pub name: Option<CellValue>,
    pub tbn_status: Option<CellValue>,
    pub bam_status: Option<CellValue>,
    pub description: Option<CellValue>,
    pub group: Option<CellValue>,
    pub test_date: Option<CellValue>,
}

/// A test case: every script row that shares one `Test Case ID`.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    /// Stable external key (e.g., "TC_NPL01008")
    pub id: String,

    /// Script rows in sheet order (never empty)
    pub rows: Vec<TestScriptRow>,
}

impl TestCase {
    /// The first script row, which carries the case-level columns.
    pub fn first_row(&self) -> &TestScriptRow {
        &self.rows[0]
    }
}

/// Group rows by test case ID, preserving first-appearance order of the IDs
/// and sheet order within each group.
pub fn group_test_cases(rows: Vec<(String, TestScriptRow)>) -> Vec<TestCase> {
    let mut cases: Vec<TestCase> = Vec::new();
    for (id, row) in rows {
        match cases.iter_mut().find(|c| c.id == id) {
            Some(case) => case.rows.push(row),
            None => cases.push(TestCase { id, rows: vec![row] }),
        }
    }
    cases
}

/// Tracker-assigned ticket key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueKey(String);

impl IssueKey {
    pub fn new(key: impl Into<String>) -> Self {
        IssueKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IssueKey {
    fn from(s: &str) -> Self {
        IssueKey(s.to_string())
    }
}

/// Sequential number embedded in a ticket summary tag such as `[NPL006]`.
///
/// Always positive. Displays zero-padded to three digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunningNumber(u32);

impl RunningNumber {
    /// The first number in an empty namespace.
    pub const FIRST: RunningNumber = RunningNumber(1);

    /// Wrap a raw value. Zero is lifted to 1.
    pub fn new(value: u32) -> Self {
        RunningNumber(value.max(1))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// The number after this one.
    pub fn next(&self) -> Self {
        RunningNumber(self.0.saturating_add(1))
    }

    /// Summary tag body, e.g. `NPL006` for namespace `NPL` and value 6.
    pub fn tag(&self, namespace: &str) -> String {
        format!("{}{}", namespace, self)
    }
}

impl fmt::Display for RunningNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Outcome of a manual test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pass,
    Fail,
    Cancel,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pass => "pass",
            ExecutionStatus::Fail => "fail",
            ExecutionStatus::Cancel => "cancel",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution result entered by the tester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,

    /// Test date as entered (usually YYYY-MM-DD)
    pub test_date: String,

    /// Free-text remark; for failures the part before the first ':' titles the bug
    pub remark: String,
}

impl ExecutionOutcome {
    pub fn new(status: ExecutionStatus, test_date: impl Into<String>, remark: impl Into<String>) -> Self {
        Self {
            status,
            test_date: test_date.into(),
            remark: remark.into(),
        }
    }

    /// Title used in a defect summary: the remark up to its first ':'.
    pub fn defect_title(&self) -> &str {
        self.remark.split(':').next().unwrap_or("")
    }
}
