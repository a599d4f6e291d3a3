//! CSV export of the grade book.
//!
//! The file starts with a UTF-8 byte-order mark so spreadsheet tools detect
//! the encoding, then a GPA summary block, a blank line, and one row per
//! grade record in collection order.

use std::path::{Component, Path, PathBuf};

use crate::entities::{GpaSummary, GradeBook, GradeRecord};
use crate::error::{Result, ValidationError};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// File name used when the caller gives none.
pub const DEFAULT_FILE_NAME: &str = "grades.csv";

const SUMMARY_HEADER: [&str; 9] = [
    "GPA",
    "All-course GPA",
    "Average score",
    "All-course average",
    "Rank",
    "Cohort size",
    "Rank percentage",
    "Passed courses",
    "Total credit",
];

const RECORD_HEADER: [&str; 15] = [
    "Term",
    "Course ID",
    "Course name",
    "Course name (EN)",
    "Credit",
    "Score",
    "Raw score",
    "Exam type",
    "Course type",
    "Course category",
    "Department",
    "Passed",
    "Retake",
    "Rank",
    "Cohort size",
];

/// Render the grade book as CSV bytes.
pub fn render_grades_csv(book: &GradeBook) -> Result<Vec<u8>> {
    let mut out = BOM.to_vec();

    let mut summary = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    summary.write_record(["GPA summary"])?;
    summary.write_record(SUMMARY_HEADER)?;
    summary.write_record(summary_row(&book.gpa))?;
    out.extend(finish(summary)?);
    out.extend_from_slice(b"\n");

    let mut records = csv::Writer::from_writer(Vec::new());
    records.write_record(RECORD_HEADER)?;
    for record in &book.records {
        records.write_record(record_row(record))?;
    }
    out.extend(finish(records)?);

    Ok(out)
}

/// Resolve the export target: `.csv` is appended when missing and
/// relative names land in `directory`.
pub fn export_path(directory: &Path, file_name: Option<&str>) -> PathBuf {
    let name = file_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME);
    let name = if name.to_ascii_lowercase().ends_with(".csv") {
        name.to_string()
    } else {
        format!("{}.csv", name)
    };
    let path = Path::new(&name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        directory.join(path)
    }
}

/// Like [`export_path`], but the name must be relative and may not climb
/// out of `directory`. Used for names that come from tool callers.
pub fn confined_export_path(
    directory: &Path,
    file_name: Option<&str>,
) -> std::result::Result<PathBuf, ValidationError> {
    if let Some(name) = file_name {
        let escapes = Path::new(name.trim())
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ValidationError::ExportPathOutsideDirectory(name.to_string()));
        }
    }
    Ok(export_path(directory, file_name))
}

/// Write the grade book to `path` and return its absolute location.
pub async fn write_grades_csv(book: &GradeBook, path: &Path) -> Result<PathBuf> {
    let bytes = render_grades_csv(book)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    let absolute = tokio::fs::canonicalize(path).await?;
    tracing::info!(path = %absolute.display(), records = book.records.len(), "Grades exported");
    Ok(absolute)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()).into())
}

fn summary_row(gpa: &GpaSummary) -> Vec<String> {
    vec![
        gpa.gpa.to_string(),
        gpa.all_course_gpa.to_string(),
        gpa.average_score.to_string(),
        gpa.all_course_average.to_string(),
        gpa.rank.to_string(),
        gpa.cohort_size.to_string(),
        format!("{}%", gpa.rank_percentage),
        gpa.passed_courses.to_string(),
        gpa.total_credit.to_string(),
    ]
}

fn record_row(record: &GradeRecord) -> Vec<String> {
    let yes_no = |flag: bool| if flag { "yes" } else { "no" }.to_string();
    let optional = |value: Option<u32>| value.map(|v| v.to_string()).unwrap_or_default();
    vec![
        record.term_name.clone(),
        record.course_id.clone(),
        record.course_name.clone(),
        record.course_name_en.clone(),
        record.credit.to_string(),
        record.score.to_string(),
        record.raw_score.to_string(),
        record.exam_type.clone(),
        record.course_type.clone(),
        record.course_category.clone(),
        record.department.clone(),
        yes_no(record.passed),
        yes_no(record.retake),
        optional(record.rank),
        optional(record.cohort_size),
    ]
}
