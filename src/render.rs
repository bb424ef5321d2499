//! Plain-text rendering: prediction summaries, table previews, and charts.

use std::fmt::Write as _;

use churn_io::RawTable;
use churn_model::{ChurnPrediction, TrainingOutcome};

const BAR_WIDTH: usize = 40;
const N_BUCKETS: usize = 10;

pub fn prediction(p: &ChurnPrediction) -> String {
    format!(
        "Churn prediction: {}\nChurn probability: {:.2}%\n",
        if p.churn_prediction == 1 { "Yes" } else { "No" },
        p.churn_probability * 100.0
    )
}

pub fn training(outcome: &TrainingOutcome) -> String {
    let meta = &outcome.metadata;
    let mut out = format!(
        "Trained {} trees on {} rows ({} features, {} drawn per split), evaluated on {} held-out rows.\n\n{}\n",
        meta.n_trees,
        outcome.split.n_train,
        meta.n_features,
        meta.max_features_resolved,
        outcome.split.n_test,
        outcome.report
    );
    out.push_str("Top features:\n");
    for feature in outcome.importances.iter().take(5) {
        let _ = writeln!(out, "{:>3}. {:<18} {:.3}", feature.rank, feature.name, feature.importance);
    }
    out
}

/// Horizontal bars scaled so the largest count fills the full width.
pub fn bar_chart(title: &str, bars: &[(&str, usize)]) -> String {
    let label_width = bars.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    let max = bars.iter().map(|&(_, n)| n).max().unwrap_or(0);
    let mut out = format!("{title}\n");
    for &(label, count) in bars {
        let len = if max == 0 { 0 } else { count * BAR_WIDTH / max };
        let _ = writeln!(out, "{label:<label_width$} | {} {count}", "#".repeat(len));
    }
    out
}

/// Churn vs. retained counts.
pub fn class_counts(n_churn: usize, n_retained: usize) -> String {
    bar_chart(
        "Predicted outcome",
        &[("Churn", n_churn), ("Retained", n_retained)],
    )
}

/// Ten equal-width buckets over [0, 1]; 1.0 falls in the last bucket.
pub fn probability_histogram(probabilities: &[f64]) -> String {
    let mut counts = [0usize; N_BUCKETS];
    for &p in probabilities {
        let bucket = ((p.clamp(0.0, 1.0) * N_BUCKETS as f64) as usize).min(N_BUCKETS - 1);
        counts[bucket] += 1;
    }
    let labels: Vec<String> = (0..N_BUCKETS)
        .map(|b| format!("{:.1}-{:.1}", b as f64 / 10.0, (b + 1) as f64 / 10.0))
        .collect();
    let bars: Vec<(&str, usize)> = labels
        .iter()
        .map(String::as_str)
        .zip(counts)
        .collect();
    bar_chart("Churn probability distribution", &bars)
}

/// Column-aligned view of the first `max_rows` rows.
pub fn table_preview(table: &RawTable, max_rows: usize) -> String {
    let rows = &table.rows()[..table.n_rows().min(max_rows)];
    let widths: Vec<usize> = table
        .headers()
        .iter()
        .enumerate()
        .map(|(i, h)| rows.iter().map(|r| r[i].len()).fold(h.len(), usize::max))
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = line(table.headers());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    if table.n_rows() > max_rows {
        let _ = writeln!(out, "... {} more rows", table.n_rows() - max_rows);
    }
    out
}
