//! Markdown report generation.
//!
//! Renders a dashboard snapshot as one Markdown section per view, in the
//! order the dashboard lays them out.

use crate::analysis::{monthly_totals, top_virtual_districts};
use crate::config::ReportConfig;
use crate::dashboard::DashboardSnapshot;
use crate::models::{
    CrossTabCell, DistrictShare, Highlighted, ModelShare, Report, ReportMetadata, SizeGroup,
    SizeGroupCount, TimeSeriesPoint,
};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportConfig) -> String {
    let snapshot = &report.snapshot;
    let mut output = String::new();

    // Title
    output.push_str("# Learning Model Dashboard Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(options));
    output.push_str(&generate_selection_section(snapshot));

    output.push_str(&generate_size_group_section(
        &snapshot.size_groups,
        &snapshot.size_group_counts,
    ));
    output.push_str(&generate_share_section(&snapshot.model_shares));

    if options.include_district_shares {
        output.push_str(&generate_district_section(
            &snapshot.district_shares,
            options.max_district_rows,
        ));
    }

    output.push_str(&generate_cross_tab_section(&snapshot.cross_tab));

    if options.include_time_series {
        output.push_str(&generate_time_series_section(&snapshot.time_series));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Dataset:** `{}`\n", metadata.dataset));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Records Loaded:** {}\n",
        metadata.records_loaded
    ));
    if metadata.rows_dropped > 0 {
        section.push_str(&format!("- **Rows Dropped:** {}\n", metadata.rows_dropped));
    }
    section.push_str(&format!(
        "- **Events Applied:** {}\n",
        metadata.events_applied
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_table_of_contents(options: &ReportConfig) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Selection](#selection)\n");
    toc.push_str("- [Schools by Size Group](#schools-by-size-group)\n");
    toc.push_str("- [Enrollment Share by Learning Model](#enrollment-share-by-learning-model)\n");
    if options.include_district_shares {
        toc.push_str("- [Virtual Learning by District](#virtual-learning-by-district)\n");
    }
    toc.push_str("- [School Type by Learning Model](#school-type-by-learning-model)\n");
    if options.include_time_series {
        toc.push_str("- [Enrollment over Time](#enrollment-over-time)\n");
    }
    toc.push('\n');

    toc
}

/// Active filters, highlight and headline numbers.
fn generate_selection_section(snapshot: &DashboardSnapshot) -> String {
    let mut section = String::new();
    let selection = &snapshot.selection;

    section.push_str("## Selection\n\n");
    section.push_str("| Control | Value |\n");
    section.push_str("|:---|:---|\n");

    let month = match (&snapshot.month_label, snapshot.slider_index) {
        (Some(label), Some(index)) => {
            format!("{} (slider {}/{})", label, index + 1, snapshot.slider_len)
        }
        (Some(label), None) => label.clone(),
        _ => "No data".to_string(),
    };
    section.push_str(&format!("| Month | {} |\n", month));
    section.push_str(&format!("| District | {} |\n", selection.district));
    section.push_str(&format!("| School Type | {} |\n", selection.school_type));
    section.push_str(&format!(
        "| Learning Model | {} |\n",
        selection.learning_model
    ));
    section.push_str(&format!("| Enrollment | {} |\n", selection.enrollment));

    let highlight = match snapshot.highlight.selected() {
        Some(model) => format!("**{}**", model),
        None => "None".to_string(),
    };
    section.push_str(&format!("| Highlight | {} |\n\n", highlight));

    section.push_str(&format!(
        "**{}** schools in the working set, **{}** students enrolled.\n\n",
        snapshot.working_set_size, snapshot.total_enrollment
    ));

    if snapshot.working_set_size == 0 {
        section.push_str("> No records match the current filters.\n\n");
    }

    section
}

/// Grouped bar chart as a size group × learning model table.
fn generate_size_group_section(
    groups: &[SizeGroup],
    counts: &[Highlighted<SizeGroupCount>],
) -> String {
    let mut section = String::new();

    section.push_str("## Schools by Size Group\n\n");

    let mut models = Vec::new();
    for count in counts {
        if !models.contains(&count.row.learning_model) {
            models.push(count.row.learning_model.clone());
        }
    }

    section.push_str("| Size Group |");
    for model in &models {
        section.push_str(&format!(" {} |", model));
    }
    section.push_str("\n|:---|");
    section.push_str(&"---:|".repeat(models.len()));
    section.push('\n');

    for group in groups {
        if group.open_ended {
            section.push_str(&format!("| {} (max {}) |", group.label, group.max));
        } else {
            section.push_str(&format!("| {} |", group.label));
        }
        for model in &models {
            let cell = counts
                .iter()
                .find(|c| c.row.size_group == group.label && &c.row.learning_model == model)
                .map(|c| emphasize(&c.row.count.to_string(), c.opacity))
                .unwrap_or_else(|| "0".to_string());
            section.push_str(&format!(" {} |", cell));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

/// Bubble chart as a share table.
fn generate_share_section(shares: &[Highlighted<ModelShare>]) -> String {
    let mut section = String::new();

    section.push_str("## Enrollment Share by Learning Model\n\n");

    if shares.is_empty() {
        section.push_str("No enrollment in the working set.\n\n");
        return section;
    }

    section.push_str("| Learning Model | Enrollment | Share |\n");
    section.push_str("|:---|---:|---:|\n");
    for share in shares {
        section.push_str(&format!(
            "| {} | {} | {:.2}% |\n",
            emphasize(share.row.learning_model.as_str(), share.opacity),
            share.row.enrollment,
            share.row.percent,
        ));
    }
    section.push('\n');

    section
}

/// Choropleth as the districts with the highest virtual share.
fn generate_district_section(shares: &[DistrictShare], max_rows: usize) -> String {
    let mut section = String::new();

    section.push_str("## Virtual Learning by District\n\n");

    if shares.is_empty() {
        section.push_str("No district data for the selected month.\n\n");
        return section;
    }

    let top = top_virtual_districts(shares, max_rows);
    section.push_str(&format!(
        "*Top {} of {} districts by share of virtual enrollment.*\n\n",
        top.len(),
        shares.len()
    ));
    section.push_str("| District | Virtual |\n");
    section.push_str("|:---|---:|\n");
    for share in &top {
        section.push_str(&format!(
            "| {} | {:.2}% |\n",
            share.district, share.percent_virtual
        ));
    }
    section.push('\n');

    section
}

/// Heatmap as a school type × learning model table.
fn generate_cross_tab_section(cells: &[Highlighted<CrossTabCell>]) -> String {
    let mut section = String::new();

    section.push_str("## School Type by Learning Model\n\n");

    if cells.is_empty() {
        section.push_str("No schools in the working set.\n\n");
        return section;
    }

    let school_types: BTreeSet<&str> = cells.iter().map(|c| c.row.school_type.as_str()).collect();
    let mut models = Vec::new();
    for cell in cells {
        if !models.contains(&&cell.row.learning_model) {
            models.push(&cell.row.learning_model);
        }
    }
    models.sort();

    section.push_str("| School Type |");
    for model in &models {
        section.push_str(&format!(" {} |", model));
    }
    section.push_str("\n|:---|");
    section.push_str(&":---:|".repeat(models.len()));
    section.push('\n');

    for school_type in school_types {
        section.push_str(&format!("| {} |", school_type));
        for model in &models {
            let cell = cells
                .iter()
                .find(|c| c.row.school_type == school_type && &&c.row.learning_model == model)
                .map(|c| emphasize(&c.row.count.to_string(), c.opacity))
                .unwrap_or_else(|| "-".to_string());
            section.push_str(&format!(" {} |", cell));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

/// Line chart as a month × learning model table with a total column.
fn generate_time_series_section(points: &[Highlighted<TimeSeriesPoint>]) -> String {
    let mut section = String::new();

    section.push_str("## Enrollment over Time\n\n");

    if points.is_empty() {
        section.push_str("No enrollment matches the current filters in any month.\n\n");
        return section;
    }

    let rows: Vec<TimeSeriesPoint> = points.iter().map(|p| p.row.clone()).collect();
    let totals = monthly_totals(&rows);

    let mut models = Vec::new();
    for point in &rows {
        if !models.contains(&point.learning_model) {
            models.push(point.learning_model.clone());
        }
    }
    models.sort();

    section.push_str("| Month |");
    for model in &models {
        section.push_str(&format!(" {} |", model));
    }
    section.push_str(" **Total** |\n|:---|");
    section.push_str(&"---:|".repeat(models.len() + 1));
    section.push('\n');

    for (month, total) in totals {
        section.push_str(&format!("| {} |", month.label()));
        for model in &models {
            let cell = points
                .iter()
                .find(|p| {
                    p.row.date == month.first_day() && &p.row.learning_model == model
                })
                .map(|p| emphasize(&p.row.value.to_string(), p.opacity))
                .unwrap_or_else(|| "-".to_string());
            section.push_str(&format!(" {} |", cell));
        }
        section.push_str(&format!(" **{}** |\n", total));
    }
    section.push('\n');

    section
}

/// Dimmed marks are rendered in italics.
fn emphasize(text: &str, opacity: f64) -> String {
    if opacity < 1.0 {
        format!("_{}_", text)
    } else {
        text.to_string()
    }
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by lmdash v{}. Dimmed values are in italics.*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a rendered report to a file.
pub async fn write_report(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
