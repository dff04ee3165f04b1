//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the pipeline and fitting code stay free of presentation
//! - output changes are localized

use crate::app::pipeline::RunOutput;
use crate::domain::{FitResult, RunConfig};

/// Format the full run summary: selection counts, per-group fits, failures, artifacts.
pub fn format_run_summary(output: &RunOutput, config: &RunConfig) -> String {
    let mut out = String::new();

    out.push_str("=== assay - Concentration Response Fit ===\n");
    out.push_str(&format!("Selection: {}\n", config.filters.dir_name()));
    out.push_str(&format!(
        "Metadata: {} rows read, {} selected\n",
        output.stats.rows_read, output.stats.records
    ));
    out.push_str(&format!(
        "Files: {} indexed | {} matched | {} with samples\n",
        output.stats.indexed_files, output.stats.matched_files, output.stats.extracted_files
    ));
    out.push_str(&format!(
        "Window: [{}, {}) s on `{}`\n",
        config.schema.window.0, config.schema.window.1, config.schema.signal_column
    ));

    out.push_str("\nFits (by concentration):\n");
    out.push_str(&format_fit_table(&output.fits));

    if !output.fit_failures.is_empty() {
        out.push_str("\nFailed groups:\n");
        for failure in &output.fit_failures {
            out.push_str(&format!("  {:<10} {}\n", failure.concentration.to_string(), failure.error));
        }
    }

    out.push_str(&format!("\nOutput: {}\n", output.output_dir.display()));
    out.push_str(&format!("- {} artifacts written\n", output.artifacts.len()));
    for failure in &output.write_failures {
        out.push_str(&format!("- failed: {} ({})\n", failure.path.display(), failure.message));
    }

    out
}

/// One row per fit: parameters, inflection point, RMSE.
pub fn format_fit_table(fits: &[FitResult]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<10} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}\n",
            "conc", "files", "L", "x0", "k", "b", "inflect", "rmse"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<10} {:-<6} {:-<10} {:-<10} {:-<10} {:-<10} {:-<10} {:-<10}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for fit in fits {
        let p = &fit.params;
        out.push_str(
            format!(
                "{:<10} {:>6} {:>10.4} {:>10.3} {:>10.5} {:>10.4} {:>10.2} {:>10.4}\n",
                truncate(&fit.concentration.to_string(), 10),
                fit.files,
                p.l,
                p.x0,
                p.k,
                p.b,
                fit.inflection_x,
                fit.quality.rmse,
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Detailed single-fit output for the `fit` command.
pub fn format_fit_detail(fit: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Concentration: {}\n", fit.concentration));
    out.push_str(&format!("- L  : {:.6}\n", fit.params.l));
    out.push_str(&format!("- x0 : {:.6}\n", fit.params.x0));
    out.push_str(&format!("- k  : {:.6}\n", fit.params.k));
    out.push_str(&format!("- b  : {:.6}\n", fit.params.b));
    out.push_str(&format!("- inflection: {:.3} s\n", fit.inflection_x));
    out.push_str(&format!(
        "- n={} SSE={:.4} RMSE={:.4} evaluations={}\n",
        fit.quality.n, fit.quality.sse, fit.quality.rmse, fit.quality.evaluations
    ));
    out
}

/// Distinct values of one metadata column, one per line under a heading.
pub fn format_distinct_values(column: &str, values: &[String]) -> String {
    let mut out = format!("{column} ({}):\n", values.len());
    for v in values {
        out.push_str(&format!("  {v}\n"));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
