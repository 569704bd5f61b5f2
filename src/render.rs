//! Terminal tables for reports, leaderboards and top-measure scans

use crate::report::{DistrictReport, Highlight, LeaderboardEntry, TopMeasures};

const GREEN: &str = "\x1b[30;102m";
const RED: &str = "\x1b[30;101m";
const RESET: &str = "\x1b[0m";

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        let cut: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn paint(line: String, highlight: Highlight, color: bool) -> String {
    match (color, highlight) {
        (true, Highlight::Top) => format!("{}{}{}", GREEN, line, RESET),
        (true, Highlight::Bottom) => format!("{}{}{}", RED, line, RESET),
        (false, Highlight::Top) => format!("{} ▲", line),
        (false, Highlight::Bottom) => format!("{} ▼", line),
        (_, Highlight::Neutral) => line,
    }
}

pub fn section_header(title: &str) -> String {
    format!("{}\n  {}\n{}\n", "═".repeat(96), title, "═".repeat(96))
}

pub fn district_report(report: &DistrictReport, color: bool) -> String {
    let mut out = section_header(&format!("{} (ranked {})", report.district, report.scope));
    out.push_str(&format!(
        "  {:<28}  {:<48}  {:>7}  {:>6}\n",
        "Category", "Measure", "Percent", "Rank"
    ));
    out.push_str(&format!("  {}\n", "─".repeat(94)));

    let mut shown = 0;
    for row in report.displayed_rows() {
        let line = format!(
            "  {:<28}  {:<48}  {:>7}  {:>6}",
            truncate(&row.category, 28),
            truncate(&row.measure, 48),
            row.value,
            format!("{}/{}", row.rank, report.total_districts)
        );
        out.push_str(&paint(line, row.highlight, color));
        out.push('\n');
        shown += 1;
    }

    out.push_str(&format!("  {}\n", "─".repeat(94)));
    out.push_str(&format!(
        "  {} measures processed, {} shown",
        report.processed(),
        shown
    ));
    if !report.skipped_variables.is_empty() {
        out.push_str(&format!(
            ", {} variables missing from the data",
            report.skipped_variables.len()
        ));
    }
    out.push('\n');
    out
}

pub fn leaderboard(title: &str, entries: &[LeaderboardEntry]) -> String {
    let mut out = section_header(title);
    out.push_str(&format!(
        "  {:>6}  {:>8}  {:<24}  {:>12}\n",
        "Rank", "District", "State", "Value"
    ));
    out.push_str(&format!("  {}\n", "─".repeat(58)));
    for e in entries {
        let district = match e.district_number {
            Some(0) | Some(98) => "AL".to_string(),
            Some(n) => n.to_string(),
            None => "?".to_string(),
        };
        let value = e.value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "N/A".to_string());
        out.push_str(&format!(
            "  {:>6}  {:>8}  {:<24}  {:>12}\n",
            format!("{:.1}", e.rank),
            district,
            truncate(&e.state_name, 24),
            value
        ));
    }
    out
}

pub fn top_measures(top: &TopMeasures) -> String {
    let mut out = section_header(&format!("Measures where {} ranks in the top 10", top.district));
    if top.measures.is_empty() {
        out.push_str(&format!("  No measures found where {} is in the top 10.\n", top.district));
        return out;
    }
    for m in &top.measures {
        out.push_str(&format!(
            "  {:>5}  {:<14}  {:>10.1}  {}\n",
            format!("{:.1}", m.rank),
            m.code,
            m.value,
            truncate(&m.description, 60)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::RankScope;
    use crate::report::ReportRow;

    fn report() -> DistrictReport {
        DistrictReport {
            district: "NY-12".to_string(),
            key: None,
            scope: RankScope::National,
            total_districts: 100,
            rows: vec![
                ReportRow {
                    code: "A".into(),
                    category: "AGE".into(),
                    measure: "Percent under 5 years".into(),
                    value: 6,
                    rank: 3,
                    highlight: Highlight::Top,
                },
                ReportRow {
                    code: "B".into(),
                    category: "INCOME".into(),
                    measure: "Median household income".into(),
                    value: 70000,
                    rank: 50,
                    highlight: Highlight::Neutral,
                },
                ReportRow {
                    code: "C".into(),
                    category: "HOUSING".into(),
                    measure: "Percent vacant".into(),
                    value: 2,
                    rank: 95,
                    highlight: Highlight::Bottom,
                },
            ],
            skipped_variables: vec!["X".into()],
        }
    }

    #[test]
    fn test_report_colors_top_and_bottom_rows() {
        let text = district_report(&report(), true);
        let top = text.lines().find(|l| l.contains("Percent under 5")).unwrap();
        assert!(top.starts_with(GREEN) && top.ends_with(RESET));
        let bottom = text.lines().find(|l| l.contains("Percent vacant")).unwrap();
        assert!(bottom.starts_with(RED));
        assert!(!text.contains("Median household income"));
        assert!(text.contains("3 measures processed, 2 shown"));
        assert!(text.contains("1 variables missing"));
    }

    #[test]
    fn test_plain_report_marks_rows() {
        let text = district_report(&report(), false);
        assert!(!text.contains('\x1b'));
        assert!(text.lines().any(|l| l.contains("Percent under 5") && l.ends_with('▲')));
        assert!(text.lines().any(|l| l.contains("Percent vacant") && l.ends_with('▼')));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer label", 10), "a much ...");
    }
}
