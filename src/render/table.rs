use crate::model::{ResidencyKind, ResidencyReport, ResidencyRow, UNKNOWN_TASK_GROUP};

/// Render rows as a fixed-width table, one line per row.
///
/// Columns: key, name, tgid (task rows only), cpu_0..cpu_{n-1}, total, max_run.
/// Unknown task groups print as -1.
pub fn render_table(rows: &[ResidencyRow], num_cpus: usize) -> String {
    let kind = rows
        .first()
        .map(|r| r.key.kind())
        .unwrap_or(ResidencyKind::Task);

    let mut header: Vec<String> = vec![
        match kind {
            ResidencyKind::Task => "pid",
            ResidencyKind::TaskGroup => "tgid",
            ResidencyKind::Cgroup => "cgroup",
        }
        .to_string(),
    ];
    match kind {
        ResidencyKind::Task => {
            header.push("name".to_string());
            header.push("tgid".to_string());
        }
        ResidencyKind::TaskGroup => {
            header.push("name".to_string());
            header.push("tasks".to_string());
        }
        ResidencyKind::Cgroup => header.push("tasks".to_string()),
    }
    header.extend((0..num_cpus).map(|c| format!("cpu_{}", c)));
    header.push("total".to_string());
    header.push("max_run".to_string());

    let mut lines: Vec<Vec<String>> = vec![header];
    for row in rows {
        let mut cells = vec![row.key.to_string()];
        match kind {
            ResidencyKind::Task => {
                cells.push(row.name.clone());
                cells.push(row.task_group.unwrap_or(UNKNOWN_TASK_GROUP).to_string());
            }
            ResidencyKind::TaskGroup => {
                cells.push(row.name.clone());
                cells.push(row.members.to_string());
            }
            ResidencyKind::Cgroup => cells.push(row.members.to_string()),
        }
        cells.extend(row.per_cpu.iter().map(|t| t.to_string()));
        cells.push(row.total.to_string());
        cells.push(row.max_runtime.to_string());
        lines.push(cells);
    }

    let columns = lines.iter().map(|l| l.len()).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|i| {
            lines
                .iter()
                .filter_map(|l| l.get(i))
                .map(|c| c.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();
    // Name-like columns are left aligned, numbers right aligned.
    let text_columns = match kind {
        ResidencyKind::Task | ResidencyKind::TaskGroup => 2,
        ResidencyKind::Cgroup => 1,
    };

    let mut out = String::new();
    for line in &lines {
        let mut rendered = String::new();
        for (i, cell) in line.iter().enumerate() {
            if i > 0 {
                rendered.push_str("  ");
            }
            let pad = widths[i] - cell.chars().count();
            if i > 0 && i < text_columns {
                rendered.push_str(cell);
                rendered.push_str(&" ".repeat(pad));
            } else {
                rendered.push_str(&" ".repeat(pad));
                rendered.push_str(cell);
            }
        }
        out.push_str(rendered.trim_end());
        out.push('\n');
    }
    out
}

/// Short footer with report-wide totals and busy time per CPU.
pub fn render_summary(report: &ResidencyReport, anomalies: u64) -> String {
    let busy: String = report
        .cpu_totals()
        .iter()
        .enumerate()
        .map(|(cpu, t)| format!(" cpu_{}={}", cpu, t))
        .collect();
    format!(
        "tasks: {}  with tgid: {}  total time: {}  anomalies: {}\nbusy:{}\n",
        report.totals.tasks,
        report.totals.tasks_with_group,
        report.totals.total_time,
        anomalies,
        busy
    )
}
