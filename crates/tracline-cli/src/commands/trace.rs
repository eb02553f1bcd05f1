//! `tracline trace ...`

use anyhow::Result;
use colored::Colorize;
use comfy_table::Cell;
use std::path::Path;
use tracline_daemon::{AddOutcome, MatrixRequest, RemoveOutcome, TraceabilityMatrix};

use crate::cli::{OutputFormat, TraceCommands};
use crate::config::CliContext;
use crate::formatting::{format_timestamp, or_dash, table, to_json};

pub async fn handle(ctx: CliContext, cmd: TraceCommands) -> Result<()> {
    let trace = ctx.trace();
    match cmd {
        TraceCommands::AddFile { task, file } => {
            let (_, path, outcome) = trace.add_file(&task, &file).await?;
            match outcome {
                AddOutcome::Inserted => println!("Added file '{}' to task '{}'", path.display(), task),
                AddOutcome::Reactivated => {
                    println!("Re-activated file '{}' for task '{}'", path.display(), task)
                }
                AddOutcome::AlreadyActive => {
                    println!("File '{}' is already associated with task '{}'", path.display(), task)
                }
            }
        }
        TraceCommands::RemoveFile { task, file } => {
            let (path, outcome) = trace.remove_file(&task, &file).await?;
            match outcome {
                RemoveOutcome::Deactivated => {
                    println!("Removed file '{}' from task '{}'", path.display(), task)
                }
                RemoveOutcome::AlreadyInactive | RemoveOutcome::NotAssociated => {
                    println!("File '{}' is not associated with task '{}'", path.display(), task)
                }
            }
        }
        TraceCommands::LsTrace {
            file,
            project,
            status,
            format,
        } => {
            let result = trace.ls_trace(&file, project.as_deref(), status.as_deref()).await?;
            if format == OutputFormat::Json {
                println!("{}", to_json(&result.tasks));
                return Ok(());
            }
            if result.tasks.is_empty() {
                println!("No tasks reference '{}'", file.display());
                return Ok(());
            }

            println!("\nTasks referencing '{}':", file.display());
            if !result.exists {
                println!("{}", "Warning: File does not exist".yellow());
            }
            if format == OutputFormat::List {
                println!("Found {} task(s)\n", result.tasks.len());
                for entry in &result.tasks {
                    let task = &entry.task;
                    println!("• [{}] {}", task.id, task.title);
                    println!(
                        "  Status: {}, Assignee: {}, Project: {}",
                        task.status,
                        task.assignee.as_deref().unwrap_or("Unassigned"),
                        task.project_id
                    );
                }
            } else {
                let mut out = table(["ID", "Title", "Status", "Assignee", "Priority", "Project", "Associated"]);
                for entry in &result.tasks {
                    let task = &entry.task;
                    out.add_row(vec![
                        task.id.clone(),
                        task.title.clone(),
                        task.status.clone(),
                        or_dash(task.assignee.as_deref()),
                        task.priority.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                        task.project_id.clone(),
                        format_timestamp(&entry.associated_at),
                    ]);
                }
                println!("{}", out);
            }
        }
        TraceCommands::Stats { project, top } => {
            let stats = trace.stats(&project, top).await?;
            if stats.is_empty() {
                println!("No file associations found");
                return Ok(());
            }
            println!("\nTop {} referenced files:", stats.len());
            println!("Project: {}\n", project);
            let mut out = table(["#", "File", "Tasks", "Assignees"]);
            for (i, stat) in stats.iter().enumerate() {
                out.add_row(vec![
                    (i + 1).to_string(),
                    stat.path.display().to_string(),
                    stat.task_count.to_string(),
                    stat.assignee_count.to_string(),
                ]);
            }
            println!("{}", out);
        }
        TraceCommands::Matrix {
            project,
            extension,
            file_contains,
            task_contains,
            status,
            reference_counts,
            top,
            json,
        } => {
            let request = MatrixRequest {
                project_id: project,
                file_extension: extension,
                file_name_contains: file_contains,
                task_name_contains: task_contains,
                task_status: status,
                include_reference_counts: reference_counts,
                top_k: top,
            };
            let matrix = trace.matrix(&request).await?;
            if json {
                println!("{}", to_json(&matrix.to_json()));
            } else {
                print_matrix(&matrix);
            }
        }
        TraceCommands::Extensions { project } => {
            let extensions = trace.extensions(&project).await?;
            if extensions.is_empty() {
                println!("No associated files in project '{}'", project);
            } else {
                for ext in extensions {
                    println!("{}", ext);
                }
            }
        }
        TraceCommands::FileStats { project, json } => {
            let report = trace.file_stats(&project).await?;
            if json {
                println!("{}", to_json(&report));
                return Ok(());
            }
            if report.files.is_empty() {
                println!("No associated files in project '{}'", project);
                return Ok(());
            }

            let mut files = table(["File", "References", "Tasks"]);
            for file in &report.files {
                files.add_row(vec![
                    file.path.display().to_string(),
                    file.reference_count.to_string(),
                    file.tasks.join(", "),
                ]);
            }
            println!("{}", files);

            let mut by_ext = table(["Extension", "Files", "References"]);
            for ext in &report.extensions {
                by_ext.add_row(vec![
                    ext.extension.clone(),
                    ext.files.to_string(),
                    ext.references.to_string(),
                ]);
            }
            println!("{}", by_ext);
        }
    }
    Ok(())
}

fn print_matrix(matrix: &TraceabilityMatrix) {
    let summary = &matrix.summary;
    if matrix.files.is_empty() {
        println!("No associated files match the filters");
    } else {
        let mut header = vec![Cell::new("File")];
        header.extend(matrix.tasks.iter().map(|t| Cell::new(&t.id)));
        if matrix.file_reference_counts.is_some() {
            header.push(Cell::new("Refs"));
        }
        let mut out = table(header);

        for (file_idx, path) in matrix.files.iter().enumerate() {
            let mut row = vec![Cell::new(short_name(path))];
            for task_idx in 0..matrix.tasks.len() {
                row.push(Cell::new(if matrix.get(task_idx, file_idx) { "✓" } else { "" }));
            }
            if let Some(counts) = &matrix.file_reference_counts {
                row.push(Cell::new(counts.get(path).copied().unwrap_or(0)));
            }
            out.add_row(row);
        }
        println!("{}", out);
    }

    println!("\nTasks: {}  Files: {}  Associations: {}", summary.total_tasks, summary.total_files, summary.total_associations);
    println!("Average files per task: {:.2}", summary.avg_files_per_task);
    if !summary.most_referenced.is_empty() {
        println!("Most referenced:");
        for file in &summary.most_referenced {
            println!("  {} ({})", file.path.display(), file.task_count);
        }
    }
}

fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
