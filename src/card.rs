//! Ticket payload synthesis in Atlassian Document Format (ADF).
//!
//! Everything here is a pure function of its inputs: no network, no
//! filesystem. The reconciliation driver and the execution processor build
//! their request bodies from these documents.

use serde::{Deserialize, Serialize};

use crate::models::{CellValue, TestScriptRow};

/// Column headings of the script table, in order.
pub const SCRIPT_TABLE_HEADERS: [&str; 4] = [
    "Test Script ID",
    "Test Script Name",
    "TBN Test Script Status",
    "BAM Test Script Status",
];

/// Placeholder for a column missing from the sheet.
const NOT_AVAILABLE: &str = "N/A";

/// Inline text mark (only `strong` is used).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdfMark {
    #[serde(rename = "type")]
    pub kind: String,
}

/// A block or inline ADF node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfNode {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<AdfNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Vec<AdfMark>>,
}

impl AdfNode {
    fn block(kind: &str, content: Vec<AdfNode>) -> Self {
        Self {
            kind: kind.to_string(),
            attrs: None,
            content: Some(content),
            text: None,
            marks: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            attrs: None,
            content: None,
            text: Some(text.into()),
            marks: None,
        }
    }

    pub fn strong(text: impl Into<String>) -> Self {
        Self {
            marks: Some(vec![AdfMark {
                kind: "strong".to_string(),
            }]),
            ..Self::text(text)
        }
    }

    pub fn paragraph(content: Vec<AdfNode>) -> Self {
        Self::block("paragraph", content)
    }

    fn cell(inline: AdfNode) -> Self {
        Self::block("tableCell", vec![Self::paragraph(vec![inline])])
    }

    fn row(cells: Vec<AdfNode>) -> Self {
        Self::block("tableRow", cells)
    }
}

/// Top-level ADF document (`type: doc`, `version: 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfDocument {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: u32,
    pub content: Vec<AdfNode>,
}

impl AdfDocument {
    pub fn new(content: Vec<AdfNode>) -> Self {
        Self {
            kind: "doc".to_string(),
            version: 1,
            content,
        }
    }

    /// Document holding a single plain-text paragraph.
    pub fn single_paragraph(text: impl Into<String>) -> Self {
        Self::new(vec![AdfNode::paragraph(vec![AdfNode::text(text)])])
    }

    pub fn to_value(&self) -> serde_json::Value {
        // Plain data structs always serialize
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Render a cell as clean single-line text.
///
/// Line breaks become spaces, surrounding whitespace is trimmed and missing
/// or NaN values render as the empty string.
pub fn sanitize_cell(value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::Float(f) if f.is_nan() => String::new(),
        CellValue::Text(s) => s.replace('\n', " ").replace('\r', " ").trim().to_string(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        CellValue::Float(f) => f.to_string().trim().to_string(),
        CellValue::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
    }
}

/// Sanitize an optional column, substituting `default` when the column is absent.
pub fn sanitize_or(value: Option<&CellValue>, default: &str) -> String {
    match value {
        Some(v) => sanitize_cell(v),
        None => default.to_string(),
    }
}

/// Build the script table: a bold header row followed by one row per script.
pub fn build_script_table(rows: &[TestScriptRow]) -> AdfNode {
    let mut table_rows = Vec::with_capacity(rows.len() + 1);

    table_rows.push(AdfNode::row(
        SCRIPT_TABLE_HEADERS
            .iter()
            .map(|h| AdfNode::cell(AdfNode::strong(*h)))
            .collect(),
    ));

    for row in rows {
        let cells = [
            &row.script_id,
            &row.name,
            &row.tbn_status,
            &row.bam_status,
        ]
        .into_iter()
        .map(|col| AdfNode::cell(AdfNode::text(sanitize_or(col.as_ref(), NOT_AVAILABLE))))
        .collect();
        table_rows.push(AdfNode::row(cells));
    }

    AdfNode {
        kind: "table".to_string(),
        attrs: Some(serde_json::json!({
            "isNumberColumnEnabled": false,
            "layout": "default",
        })),
        content: Some(table_rows),
        text: None,
        marks: None,
    }
}

/// Intro text for a newly created card.
pub fn creation_summary_text(tbn_status: &str, tbn_test_date: &str) -> String {
    format!(
        "Test Status by TBN: {}\nTBN Test Date: {}\n\nTest Script Details:",
        tbn_status, tbn_test_date
    )
}

/// Intro text for a description refresh.
pub fn update_summary_text(bam_status: &str) -> String {
    format!(
        "Updated BAM Test Script Status: {}\n\nTest Script Details:",
        bam_status
    )
}

fn paragraph_and_table(status_summary: &str, table: AdfNode) -> AdfDocument {
    AdfDocument::new(vec![
        AdfNode::paragraph(vec![AdfNode::text(status_summary)]),
        table,
    ])
}

/// Description for a new card: intro paragraph plus the script table.
pub fn build_creation_description(status_summary: &str, table: AdfNode) -> AdfDocument {
    paragraph_and_table(status_summary, table)
}

/// Description that replaces an existing card's description.
pub fn build_update_description(status_summary: &str, table: AdfNode) -> AdfDocument {
    paragraph_and_table(status_summary, table)
}

/// Content of the remark custom field after an execution.
pub fn build_remark_document(status: &str, test_date: &str, remark: &str) -> AdfDocument {
    AdfDocument::single_paragraph(format!(
        "Test Status: {}\nTest Date: {}\nRemark: {}",
        status, test_date, remark
    ))
}

/// Description of a defect ticket: the full remark.
pub fn build_defect_description(remark: &str) -> AdfDocument {
    AdfDocument::single_paragraph(remark)
}

/// Summary of a test case card: `[<tag>] <group> - <id> - <description>`.
pub fn card_summary(tag: &str, group: &str, test_case_id: &str, description: &str) -> String {
    format!("[{}] {} - {} - {}", tag, group, test_case_id, description)
}

/// Summary of a defect card: `[<tag>] - <id> - <title>`.
pub fn defect_summary(tag: &str, test_case_id: &str, title: &str) -> String {
    format!("[{}] - {} - {}", tag, test_case_id, title)
}

/// `fields` object for an issue create request.
pub fn issue_fields(
    project: &str,
    issue_type: &str,
    summary: &str,
    description: &AdfDocument,
) -> serde_json::Value {
    serde_json::json!({
        "project": { "key": project },
        "summary": summary,
        "description": description.to_value(),
        "issuetype": { "name": issue_type },
    })
}

/// Update body that replaces an issue's description.
pub fn description_update_body(description: &AdfDocument) -> serde_json::Value {
    serde_json::json!({
        "update": {
            "description": [ { "set": description.to_value() } ]
        }
    })
}

/// Update body that overwrites one rich-text custom field.
pub fn field_update_body(field_id: &str, document: &AdfDocument) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    fields.insert(field_id.to_string(), document.to_value());
    serde_json::json!({ "fields": fields })
}
