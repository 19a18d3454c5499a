//! Tabular document types: row snapshots, match decisions and A1 references.

use serde::{Deserialize, Serialize};

/// Where reconciliation reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetTarget {
    pub spreadsheet_id: String,

    /// Tab title inside the spreadsheet
    pub sheet_name: String,

    /// First data row (1-based); rows above it are headers
    pub start_row: u32,
}

impl SheetTarget {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        start_row: u32,
    ) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            start_row,
        }
    }

    /// Name column (A) from the start row to the end of the sheet
    pub fn name_range(&self) -> String {
        format!("{}!A{}:A", sheet_prefix(&self.sheet_name), self.start_row)
    }

    /// Link column (B) from the start row to the end of the sheet
    pub fn link_range(&self) -> String {
        format!("{}!B{}:B", sheet_prefix(&self.sheet_name), self.start_row)
    }

    /// The link column (B) of a given row
    pub fn link_cell(&self, row: u32) -> String {
        format!("{}!B{}", sheet_prefix(&self.sheet_name), row)
    }

    /// Anchor cell for writing whole rows starting at `row`
    pub fn row_anchor(&self, row: u32) -> String {
        format!("{}!A{}", sheet_prefix(&self.sheet_name), row)
    }
}

/// Render a sheet name for use in an A1 reference.
///
/// Names made of ASCII alphanumerics and underscores are used verbatim;
/// anything else is wrapped in single quotes with inner quotes doubled.
pub fn sheet_prefix(sheet_name: &str) -> String {
    let plain = !sheet_name.is_empty()
        && sheet_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if plain {
        sheet_name.to_string()
    } else {
        format!("'{}'", sheet_name.replace('\'', "''"))
    }
}

/// Build the hyperlink cell value, resolved by the document at display time
pub fn hyperlink_formula(link: &str, label: &str) -> String {
    format!(
        "=HYPERLINK(\"{}\",\"{}\")",
        link.replace('"', "\"\""),
        label.replace('"', "\"\"")
    )
}

/// One row of the document as read at the start of a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based, document-relative row index
    pub row_index: u32,

    /// Displayed text of column A
    pub first_column: String,

    /// Stored value of column B (formula when read with formula rendering)
    pub link_value: String,

    /// Whether any cell in the row is non-empty
    pub has_content: bool,
}

impl SheetRow {
    pub fn from_cells(row_index: u32, cells: &[String]) -> Self {
        Self {
            row_index,
            first_column: cells.first().cloned().unwrap_or_default(),
            link_value: cells.get(1).cloned().unwrap_or_default(),
            has_content: cells.iter().any(|c| !c.is_empty()),
        }
    }
}

/// Zip separately read A and B columns into `[name, link]` rows.
///
/// Either column may be shorter than the other (trailing blanks are omitted
/// by the document), so the result is as long as the longer one.
pub fn join_columns(names: &[Vec<String>], links: &[Vec<String>]) -> Vec<Vec<String>> {
    let first = |column: &[Vec<String>], i: usize| {
        column
            .get(i)
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or_default()
    };

    (0..names.len().max(links.len()))
        .map(|i| {
            let mut row = vec![first(names, i), first(links, i)];
            while row.last().map(|v| v.is_empty()).unwrap_or(false) {
                row.pop();
            }
            row
        })
        .collect()
}

/// Turn raw cell values read from `start_row` downwards into row snapshots
pub fn snapshot_rows(start_row: u32, values: &[Vec<String>]) -> Vec<SheetRow> {
    values
        .iter()
        .enumerate()
        .map(|(offset, cells)| SheetRow::from_cells(start_row + offset as u32, cells))
        .collect()
}

/// What to do with one uploaded item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision {
    /// Write the formula into column B of the matched row
    UpdateRow { row: u32, formula: String },

    /// The matched row already holds this exact formula
    AlreadyLinked { row: u32 },

    /// No row matched; candidate for appending
    Unmatched { name: String, formula: String },
}

/// Unmatched items collected during one reconciliation pass, in scan order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAppendBatch {
    entries: Vec<(String, String)>,
}

impl PendingAppendBatch {
    pub fn push(&mut self, name: String, formula: String) {
        self.entries.push((name, formula));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Rows to write: `[name, formula]` each
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.entries
            .into_iter()
            .map(|(name, formula)| vec![name, formula])
            .collect()
    }
}
