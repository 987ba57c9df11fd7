//! Test case loading from a spreadsheet.
//!
//! One sheet of one workbook per run. The first row holds the column
//! headings; every following row is one test script. Rows are grouped into
//! test cases by the `Test Case ID` column.

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use tracing::{debug, info};

use crate::card::sanitize_cell;
use crate::models::{CellValue, TestCase, TestScriptRow, group_test_cases};
use crate::{Error, Result};

pub const COL_TEST_CASE_ID: &str = "Test Case ID";
pub const COL_TEST_SCRIPT_ID: &str = "Test Script ID";
pub const COL_TEST_SCRIPT_NAME: &str = "Test Script Name";
pub const COL_TEST_SCRIPT_STATUS: &str = "Test Script Status";
pub const COL_BAM_STATUS: &str = "BAM Test Script Status";
pub const COL_DESCRIPTION: &str = "Test Case Description";
pub const COL_GROUP: &str = "Group";
pub const COL_TEST_DATE: &str = "Test Date";

/// Positions of the known columns in the heading row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ColumnMap {
    test_case_id: usize,
    script_id: usize,
    script_name: Option<usize>,
    tbn_status: Option<usize>,
    bam_status: Option<usize>,
    description: Option<usize>,
    group: Option<usize>,
    test_date: Option<usize>,
}

impl ColumnMap {
    fn from_headings(headings: &[String]) -> Result<Self> {
        let find = |name: &str| headings.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| Error::Sheet(format!("missing required column '{}'", name)))
        };

        Ok(Self {
            test_case_id: require(COL_TEST_CASE_ID)?,
            script_id: require(COL_TEST_SCRIPT_ID)?,
            script_name: find(COL_TEST_SCRIPT_NAME),
            tbn_status: find(COL_TEST_SCRIPT_STATUS),
            bam_status: find(COL_BAM_STATUS),
            description: find(COL_DESCRIPTION),
            group: find(COL_GROUP),
            test_date: find(COL_TEST_DATE),
        })
    }
}

/// A present column with a short row yields an empty cell, an absent column yields `None`.
fn column(row: &[CellValue], idx: Option<usize>) -> Option<CellValue> {
    idx.map(|i| row.get(i).cloned().unwrap_or_default())
}

/// Group a heading row plus data rows into test cases.
///
/// Rows whose `Test Case ID` is blank are skipped.
pub fn test_cases_from_grid(headings: &[String], rows: Vec<Vec<CellValue>>) -> Result<Vec<TestCase>> {
    let cols = ColumnMap::from_headings(headings)?;

    let mut keyed = Vec::with_capacity(rows.len());
    for (line, row) in rows.into_iter().enumerate() {
        let id = row
            .get(cols.test_case_id)
            .map(sanitize_cell)
            .unwrap_or_default();
        if id.is_empty() {
            // +2: one for the heading row, one for 1-based numbering
            debug!(row = line + 2, "row without test case id, skipped");
            continue;
        }

        let script = TestScriptRow {
            script_id: column(&row, Some(cols.script_id)),
            name: column(&row, cols.script_name),
            tbn_status: column(&row, cols.tbn_status),
            bam_status: column(&row, cols.bam_status),
            description: column(&row, cols.description),
            group: column(&row, cols.group),
            test_date: column(&row, cols.test_date),
        };
        keyed.push((id, script));
    }

    Ok(group_test_cases(keyed))
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) if naive.time() == chrono::NaiveTime::MIN => {
                CellValue::Text(naive.format("%Y-%m-%d").to_string())
            }
            Some(naive) => CellValue::Text(naive.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => CellValue::Empty,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

/// Load and group the test cases of `sheet_name` in the workbook at `path`.
pub fn load_test_cases(path: &Path, sheet_name: &str) -> Result<Vec<TestCase>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::Sheet(format!("cannot open {}: {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| Error::Sheet(format!("cannot read sheet '{}': {}", sheet_name, e)))?;

    let mut rows = range.rows();
    let headings: Vec<String> = match rows.next() {
        Some(first) => first.iter().map(|c| sanitize_cell(&cell_from_data(c))).collect(),
        None => return Err(Error::Sheet(format!("sheet '{}' is empty", sheet_name))),
    };
    let data: Vec<Vec<CellValue>> = rows
        .map(|r| r.iter().map(cell_from_data).collect())
        .collect();

    let cases = test_cases_from_grid(&headings, data)?;
    info!(
        workbook = %path.display(),
        sheet = sheet_name,
        test_cases = cases.len(),
        "loaded test cases"
    );
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};
    use std::path::PathBuf;

    fn headings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn text_row(cells: &[&str]) -> Vec<CellValue> {
        cells
            .iter()
            .map(|c| if c.is_empty() { CellValue::Empty } else { CellValue::text(*c) })
            .collect()
    }

    #[test]
    fn test_missing_required_column() {
        let err = test_cases_from_grid(&headings(&["Test Case ID", "Group"]), vec![]).unwrap_err();
        assert!(err.to_string().contains("Test Script ID"));
    }

    #[test]
    fn test_groups_rows_and_tracks_absent_columns() {
        let cols = headings(&["Test Case ID", "Test Script ID", "Test Script Name", "Group"]);
        let rows = vec![
            text_row(&["TC_NPL01008", "TS_01", "Open", "Import"]),
            text_row(&["TC_NPL01009", "TS_01", "", "Import"]),
            text_row(&["TC_NPL01008", "TS_02", "Save", "Import"]),
        ];

        let cases = test_cases_from_grid(&cols, rows).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id, "TC_NPL01008");
        assert_eq!(cases[0].rows.len(), 2);
        assert_eq!(cases[0].rows[1].script_id, Some(CellValue::text("TS_02")));

        let first = cases[0].first_row();
        assert_eq!(first.group, Some(CellValue::text("Import")));
        // Absent columns stay None, blank cells are Some(Empty)
        assert_eq!(first.bam_status, None);
        assert_eq!(first.description, None);
        assert_eq!(cases[1].first_row().name, Some(CellValue::Empty));
    }

    #[test]
    fn test_rows_without_id_are_skipped() {
        let cols = headings(&["Test Case ID", "Test Script ID"]);
        let rows = vec![
            text_row(&["", "TS_00"]),
            text_row(&["  ", "TS_00"]),
            text_row(&["TC_A", "TS_01"]),
        ];
        let cases = test_cases_from_grid(&cols, rows).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "TC_A");
    }

    #[test]
    fn test_short_rows_pad_with_empty_cells() {
        let cols = headings(&["Test Case ID", "Test Script ID", "Test Date"]);
        let cases = test_cases_from_grid(&cols, vec![text_row(&["TC_A", "TS_01"])]).unwrap();
        assert_eq!(cases[0].first_row().test_date, Some(CellValue::Empty));
    }

    #[test]
    fn test_numeric_case_id_is_stringified() {
        let cols = headings(&["Test Case ID", "Test Script ID"]);
        let rows = vec![vec![CellValue::Float(1008.0), CellValue::Int(1)]];
        let cases = test_cases_from_grid(&cols, rows).unwrap();
        assert_eq!(cases[0].id, "1008");
    }

    #[test]
    fn test_heading_whitespace_is_ignored() {
        let cols = headings(&[" Test Case ID ", "Test Script ID"]);
        let cases = test_cases_from_grid(&cols, vec![text_row(&["TC_A", "TS"])]).unwrap();
        assert_eq!(cases.len(), 1);
    }

    #[test]
    fn test_cell_from_data_variants() {
        assert_eq!(cell_from_data(&Data::Empty), CellValue::Empty);
        assert_eq!(cell_from_data(&Data::Int(3)), CellValue::Int(3));
        assert_eq!(cell_from_data(&Data::String("x".into())), CellValue::text("x"));
        assert_eq!(
            cell_from_data(&Data::DateTimeIso("2024-10-12".into())),
            CellValue::text("2024-10-12")
        );
    }

    #[test]
    fn test_date_cells_render_as_iso_dates() {
        let date = ExcelDateTime::new(45577.0, ExcelDateTimeType::DateTime, false);
        assert_eq!(cell_from_data(&Data::DateTime(date)), CellValue::text("2024-10-12"));

        let stamp = ExcelDateTime::new(45577.5, ExcelDateTimeType::DateTime, false);
        assert_eq!(
            cell_from_data(&Data::DateTime(stamp)),
            CellValue::text("2024-10-12 12:00:00")
        );
    }

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cases.xlsx")
    }

    #[test]
    fn test_load_workbook_groups_and_renders_cells() {
        let cases = load_test_cases(&fixture(), "Login").unwrap();

        // The row without an id is dropped, the rest group by id in sheet order
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id, "TC_NPL01008");
        assert_eq!(cases[0].rows.len(), 2);
        assert_eq!(cases[1].id, "TC_NPL01009");

        let first = cases[0].first_row();
        assert_eq!(first.name, Some(CellValue::text("Open file")));
        assert_eq!(first.test_date, Some(CellValue::text("2024-10-12")));
        assert_eq!(cases[1].first_row().test_date, Some(CellValue::text("2024-10-13")));
        assert_eq!(cases[1].first_row().script_id, Some(CellValue::Float(2.0)));

        // Columns missing from the sheet stay absent
        assert_eq!(first.description, None);
        assert_eq!(first.bam_status, None);
    }

    #[test]
    fn test_load_unknown_sheet() {
        let err = load_test_cases(&fixture(), "Checkout").unwrap_err();
        assert!(err.to_string().contains("cannot read sheet 'Checkout'"));
    }

    #[test]
    fn test_load_missing_workbook() {
        let err = load_test_cases(Path::new("/nonexistent/cases.xlsx"), "Sheet1").unwrap_err();
        assert!(matches!(err, Error::Sheet(_)));
    }
}
