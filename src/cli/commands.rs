use crate::config::CalcOptions;
use crate::core::{
    check_continuity, partition, Continuity, ContinuityReport, Pipeline, PipelineOutput,
};
use crate::error::{PanelError, PanelResult};
use crate::formula::FormulaKind;
use crate::parser::{self, Job};
use crate::types::{CellValue, RowStore};
use crate::writer;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Most row errors listed before the rest are summarised
const MAX_ERRORS_SHOWN: usize = 10;
/// Rows previewed when no output file is given
const PREVIEW_ROWS: usize = 10;

/// Options of the calculate command
#[derive(Debug, Clone, Default)]
pub struct CalculateArgs {
    pub file: PathBuf,
    pub output: Option<PathBuf>,
    pub dry_run: bool,
    pub verbose: bool,
    pub id_column: Option<String>,
    pub sequential: bool,
}

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    // Round to 6 decimal places for display
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn format_cell(value: &CellValue) -> String {
    match value {
        CellValue::Number(n) => format_number(*n),
        CellValue::Absent => "·".to_string(),
        other => other.to_string(),
    }
}

fn load_job(file: &Path, id_column: Option<String>) -> PanelResult<Job> {
    let mut job = parser::parse_job(file)?;
    if let Some(column) = id_column {
        job.spec.panel.group_key_column = Some(column);
    }
    Ok(job)
}

/// Execute the calculate command
pub fn calculate(args: CalculateArgs) -> PanelResult<()> {
    println!("{}", "🔥 panelcalc - Calculating variables".bold().green());
    println!("   Job: {}", args.file.display());
    println!();

    if args.dry_run {
        println!(
            "{}",
            "📋 DRY RUN MODE - No output will be written\n".yellow()
        );
    }

    let job = load_job(&args.file, args.id_column.clone())?;
    let formulas = job.formulas()?;

    if args.verbose {
        println!("{}", "📖 Loading data...".cyan());
    }
    let data = job.load_data()?;
    if args.verbose {
        println!(
            "   {} rows, {} columns",
            data.store.len(),
            data.store.columns().len()
        );
        match job.config().group_key_column.as_deref() {
            Some(id) => println!("   Grouped by {}", id.bright_blue()),
            None => println!("   No id column: all rows form one group"),
        }
        println!();
    }

    let options = if args.sequential {
        CalcOptions::sequential()
    } else {
        CalcOptions::default()
    };
    let verbose = args.verbose;
    let pipeline = Pipeline::new(job.config())
        .with_options(options)
        .with_progress(move |index, total, name| {
            if verbose {
                println!("   🧮 [{}/{}] {}", index + 1, total, name.cyan());
            }
        });

    if args.dry_run {
        pipeline.check(&data.store, &formulas)?;
        println!(
            "{}",
            format!("✅ {} formula(s) checked against {} rows", formulas.len(), data.store.len())
                .bold()
                .green()
        );
        println!("{}", "📋 Dry run complete - nothing computed or written".yellow());
        return Ok(());
    }

    let output = pipeline.run(&data.store, &formulas)?;
    if verbose {
        println!();
    }

    print_summary(&output, &formulas.iter().map(|f| f.name.clone()).collect::<Vec<_>>());
    print_row_errors(&output);

    match args.output.or_else(|| job.output_path()) {
        Some(path) => {
            writer::write_output(&output.table, &path, &data.column_sources)?;
            println!(
                "{}",
                format!("💾 Results written to {}", path.display()).bold().green()
            );
        }
        None => print_preview(&output.table),
    }

    Ok(())
}

fn print_summary(output: &PipelineOutput, names: &[String]) {
    println!("{}", "✅ Calculation Results:".bold().green());
    let rows = output.table.len();
    for name in names {
        let blank = output
            .table
            .column_values(name)
            .map_or(0, |values| values.iter().filter(|v| v.is_absent()).count());
        println!(
            "   {} {} of {} rows computed ({} blank)",
            name.bright_blue().bold(),
            (rows - blank).to_string().bold(),
            rows,
            blank
        );
    }
    println!();
}

fn print_row_errors(output: &PipelineOutput) {
    if output.errors.is_empty() {
        return;
    }
    println!(
        "{}",
        format!("⚠️  {} row error(s):", output.errors.len()).bold().yellow()
    );
    for error in output.errors.iter().take(MAX_ERRORS_SHOWN) {
        println!(
            "   {} row {}: {}",
            error.formula.bright_blue(),
            error.position,
            error.error.to_string().yellow()
        );
    }
    if output.errors.len() > MAX_ERRORS_SHOWN {
        println!("   ... and {} more", output.errors.len() - MAX_ERRORS_SHOWN);
    }
    println!();
}

fn print_preview(table: &RowStore) {
    println!("{}", "📊 Preview:".bold().cyan());
    let header: Vec<String> = table
        .columns()
        .iter()
        .map(|c| format!("{:>12}", c))
        .collect();
    println!("   {}", header.join(" ").bold());
    for record in table.rows().iter().take(PREVIEW_ROWS) {
        let cells: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("{:>12}", format_cell(record.get(c))))
            .collect();
        println!("   {}", cells.join(" "));
    }
    if table.len() > PREVIEW_ROWS {
        println!("   ... {} more rows", table.len() - PREVIEW_ROWS);
    }
    println!();
    println!("{}", "   Use -o <file> (.csv, .yaml, .json, .xlsx) to save results".dimmed());
}

/// Execute the validate command: parse, load and check each job without computing
pub fn validate(files: Vec<PathBuf>) -> PanelResult<()> {
    println!("{}", "✅ Validating jobs".bold().green());
    println!();

    let mut failed = 0;
    for file in &files {
        match validate_internal(file) {
            Ok(summary) => println!("   {} {} {}", "✅".green(), file.display(), summary.dimmed()),
            Err(e) => {
                failed += 1;
                println!("   {} {}", "❌".red(), file.display());
                println!("      {}", e.to_string().red());
            }
        }
    }
    println!();

    if failed > 0 {
        return Err(PanelError::Configuration(format!(
            "{} of {} job(s) failed validation",
            failed,
            files.len()
        )));
    }
    println!("{}", "✅ All jobs valid".bold().green());
    Ok(())
}

fn validate_internal(file: &Path) -> PanelResult<String> {
    let job = parser::parse_job(file)?;
    let formulas = job.formulas()?;
    let data = job.load_data()?;
    Pipeline::new(job.config()).check(&data.store, &formulas)?;
    // Null key policy and key column are checked by partitioning
    partition(&data.store, job.config())?;
    Ok(format!(
        "({} rows, {} formulas)",
        data.store.len(),
        formulas.len()
    ))
}

/// Execute the groups command: list the entity groups the job's data splits into
pub fn groups(file: PathBuf, id_column: Option<String>) -> PanelResult<()> {
    println!("{}", "🔍 panelcalc - Groups".bold().green());
    println!("   Job: {}\n", file.display());

    let job = load_job(&file, id_column)?;
    let data = job.load_data()?;
    let grouping = partition(&data.store, job.config())?;

    match job.config().group_key_column.as_deref() {
        Some(id) => println!(
            "   {} groups by {} ({} rows)\n",
            grouping.len().to_string().bold(),
            id.bright_blue(),
            data.store.len()
        ),
        None => println!("   No id column: all {} rows form one group\n", data.store.len()),
    }

    let continuity = match job.config().time_column.as_deref() {
        Some(time) => Some(check_continuity(&data.store, &grouping, time)?),
        None => None,
    };

    for (i, group) in grouping.groups().iter().enumerate() {
        let key = group.key().to_string();
        let key = if group.key().is_blank() {
            key.yellow()
        } else {
            key.bright_blue()
        };
        let periods = continuity
            .as_ref()
            .and_then(|report| report.entities.get(i))
            .map(|entity| {
                let status = match &entity.continuity {
                    Continuity::Gaps(gaps) => {
                        let gaps: Vec<String> = gaps.iter().map(ToString::to_string).collect();
                        format!("gaps: {}", gaps.join(", ")).red()
                    }
                    Continuity::NoPeriods => "no periods".red(),
                    _ if !entity.duplicates.is_empty() => {
                        let repeated: Vec<String> =
                            entity.duplicates.iter().map(ToString::to_string).collect();
                        format!("repeated: {}", repeated.join(", ")).red()
                    }
                    Continuity::Unchecked => "not numeric".yellow(),
                    Continuity::Continuous => "✓".green(),
                };
                format!("  {:<12} {}", entity.span(), status)
            })
            .unwrap_or_default();
        println!("   {:<20} {:>4} rows{}", key, group.len(), periods);
    }

    if let Some(report) = &continuity {
        print_continuity_summary(report);
    }

    let blank = grouping
        .groups()
        .iter()
        .filter(|g| g.key().is_blank())
        .map(|g| g.len())
        .sum::<usize>()
        + grouping.excluded().count();
    if blank > 0 {
        println!(
            "\n{}",
            format!(
                "⚠️  {} row(s) with a blank id ({} policy)",
                blank,
                job.config().null_keys
            )
            .yellow()
        );
    }
    Ok(())
}

fn print_continuity_summary(report: &ContinuityReport) {
    let continuous = report.continuous_count();
    let summary = format!(
        "\n   {} ids | continuous: {} | gaps or repeats: {}",
        report.len(),
        continuous,
        report.len() - continuous
    );
    if report.has_gaps() {
        println!("{}", summary.red());
        println!(
            "{}",
            "   Offsets step over rows, so x-1 is not the previous period for these ids".yellow()
        );
    } else {
        println!("{}", summary.green());
    }
}

/// Execute the columns command: data columns with their sources, then formulas
pub fn columns(file: PathBuf) -> PanelResult<()> {
    println!("{}", "📋 panelcalc - Columns".bold().green());
    println!("   Job: {}\n", file.display());

    let job = parser::parse_job(&file)?;
    let data = job.load_data()?;

    println!("{}", "   Data columns:".bold().cyan());
    for column in data.store.columns() {
        let source = data
            .column_sources
            .get(column)
            .map(String::as_str)
            .unwrap_or("-");
        println!("      {:<24} {}", column.bright_blue(), source.dimmed());
    }

    println!("\n{}", "   Formulas:".bold().cyan());
    for formula in job.formulas()? {
        let kind = match &formula.kind {
            FormulaKind::Row(expr) if expr.uses_offsets() => "row (offsets)",
            FormulaKind::Row(_) => "row",
            FormulaKind::Aggregate { .. } => "aggregate",
        };
        println!(
            "      {:<24} {:<14} {}",
            formula.name.bright_blue(),
            kind,
            formula.kind.to_string().bright_yellow()
        );
        if let FormulaKind::Row(expr) = &formula.kind {
            let reads: Vec<&str> = expr.columns().into_iter().collect();
            if !reads.is_empty() {
                println!("      {:<24} reads: {}", "", reads.join(", ").dimmed());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
