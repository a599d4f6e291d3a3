//! Output formatting for CLI commands.
//!
//! Every printer takes a `json` flag: pretty JSON for scripts, aligned text
//! for people.

use anyhow::Result;
use registrar::{
    entities::{GpaSummary, GradeRecord, TermDescriptor},
    mcp::{
        BuildingsResponse, ExportResponse, FindClassroomsResponse, GradesResponse,
        LocateDateResponse, TermGradesResponse, TermsResponse, WeekMaskResponse,
    },
};
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

fn print_records(records: &[GradeRecord]) {
    println!(
        "{:<14} {:<12} {:<32} {:>6} {:>8}  PASSED",
        "TERM", "COURSE", "NAME", "CREDIT", "SCORE"
    );
    println!("{}", "-".repeat(86));
    for record in records {
        println!(
            "{:<14} {:<12} {:<32} {:>6} {:>8}  {}",
            record.term_code,
            record.course_id,
            truncate(&record.course_name, 32),
            record.credit,
            record.score.to_string(),
            if record.passed { "yes" } else { "no" }
        );
    }
}

fn print_gpa_lines(gpa: &GpaSummary) {
    println!("GPA: {} (all courses: {})", gpa.gpa, gpa.all_course_gpa);
    println!(
        "Average score: {} (all courses: {})",
        gpa.average_score, gpa.all_course_average
    );
    println!(
        "Rank: {}/{} ({}%)",
        gpa.rank, gpa.cohort_size, gpa.rank_percentage
    );
    println!(
        "Passed courses: {}, total credit: {}",
        gpa.passed_courses, gpa.total_credit
    );
}

/// Print all grades with the GPA summary.
pub fn print_grades(result: &GradesResponse, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    print_records(&result.records);
    println!("\nTotal: {} records\n", result.total);
    print_gpa_lines(&result.gpa);
    Ok(())
}

/// Print the grades of one term.
pub fn print_term_grades(result: &TermGradesResponse, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    print_records(&result.records);
    println!("\nTotal: {} records in {}", result.total, result.term_code);
    Ok(())
}

/// Print the GPA summary.
pub fn print_gpa(gpa: &GpaSummary, json: bool) -> Result<()> {
    if json {
        return print_json(gpa);
    }
    print_gpa_lines(gpa);
    Ok(())
}

/// Print the term list.
pub fn print_terms(result: &TermsResponse, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    println!("{:<12} {:<6} {:<16} TERM", "YEAR", "TERM", "YEAR NAME");
    println!("{}", "-".repeat(60));
    for term in &result.terms {
        println!(
            "{:<12} {:<6} {:<16} {}",
            term.key.academic_year, term.key.term, term.year_name, term.term_name
        );
    }
    println!("\nTotal: {} terms", result.total);
    Ok(())
}

/// Print one term.
pub fn print_term(term: &TermDescriptor, json: bool) -> Result<()> {
    if json {
        return print_json(term);
    }
    println!("Term: {}", term.key);
    if !term.term_name.is_empty() {
        println!("Name: {} {}", term.year_name, term.term_name);
    }
    if let Some(first_day) = term.first_day {
        println!("First day: {}", first_day);
    }
    Ok(())
}

/// Print where a date falls in its term.
pub fn print_position(result: &LocateDateResponse, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    let position = &result.position;
    println!(
        "{} is in week {} of {}, {} (term started {})",
        position.date, position.week, result.term, position.weekday_name, position.first_day
    );
    Ok(())
}

/// Print the building list.
pub fn print_buildings(result: &BuildingsResponse, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    println!("{:<10} NAME", "CODE");
    println!("{}", "-".repeat(40));
    for building in &result.buildings {
        println!("{:<10} {}", building.code, building.name);
    }
    println!("\nTotal: {} buildings", result.total);
    Ok(())
}

/// Print free classrooms.
pub fn print_classrooms(result: &FindClassroomsResponse, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    if result.classrooms.is_empty() {
        println!("No free classrooms.");
        return Ok(());
    }
    println!(
        "{:<12} {:<24} {:>6} {:<8} TIERED",
        "CODE", "NAME", "SEATS", "MOVABLE"
    );
    println!("{}", "-".repeat(62));
    for room in &result.classrooms {
        println!(
            "{:<12} {:<24} {:>6} {:<8} {}",
            room.code,
            truncate(&room.name, 24),
            room.seats,
            if room.has_movable_seats { "yes" } else { "no" },
            if room.is_tiered { "yes" } else { "no" }
        );
    }
    println!(
        "\n{} of {} bookable rooms free in {} during weeks {}",
        result.total, result.bookable_total, result.building_code, result.weeks
    );
    Ok(())
}

/// Print a week set.
pub fn print_weeks(result: &WeekMaskResponse, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    println!("Weeks: {}", result.description);
    println!("Mask: {}", result.mask);
    println!("Portal string: {}", result.portal_string);
    Ok(())
}

/// Print the export result.
pub fn print_export(result: &ExportResponse, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }
    println!("Exported {} records to {}", result.records, result.path);
    Ok(())
}
