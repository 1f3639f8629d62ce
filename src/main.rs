use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;

mod model;
mod render;
mod residency;
mod taskgroup;
mod trace;

pub type Result<T> = anyhow::Result<T>;

/// Per anomaly kind, how many are logged at warn before dropping to debug.
const ANOMALY_WARN_LIMIT: u64 = 10;

#[derive(Parser)]
#[command(name = "sched-residency")]
#[command(about = "Per-task CPU residency from scheduler switch traces", long_about = None)]
struct Cli {
    /// Enable verbose output. Specify multiple times to increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fold a switch trace and print residency per task, task group or cgroup.
    Report(ReportArgs),
}

#[derive(clap::Args)]
struct ReportArgs {
    /// JSON-lines file of sched_switch records, in timestamp order.
    #[arg(long)]
    trace: String,

    /// Number of CPUs. Defaults to the highest CPU in the trace plus one.
    #[arg(long)]
    cpus: Option<usize>,

    /// JSON object {"<pid>": <tgid>} overriding task groups seen in the trace.
    #[arg(long)]
    task_groups: Option<String>,

    /// JSON object {"<pid>": "<cgroup>"}; required for --group-by cgroup.
    #[arg(long)]
    cgroups: Option<String>,

    #[arg(long, value_enum, default_value_t = GroupBy::Task)]
    group_by: GroupBy,

    /// Only print rows whose name matches this regex.
    #[arg(long)]
    filter: Option<String>,

    #[arg(long, value_enum, default_value_t = SortBy::Id)]
    sort: SortBy,

    /// Print at most this many rows.
    #[arg(long)]
    top: Option<usize>,

    /// Account runs still open at this timestamp.
    #[arg(long, conflicts_with = "close_at_end")]
    close_at: Option<u64>,

    /// Account runs still open at the last timestamp of the trace.
    #[arg(long)]
    close_at_end: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupBy {
    Task,
    Tgid,
    Cgroup,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortBy {
    /// Ascending key.
    Id,
    /// Descending total time.
    Total,
}

fn init_logging(verbose: u8) -> Result<()> {
    let llv = match verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    };
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Off)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        llv,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.cmd {
        Commands::Report(args) => run_report(args)?,
    }

    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    // 1) Validate arguments that do not need the trace.
    let filter = args
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --filter regex")?;
    let cgroups = match (args.group_by, &args.cgroups) {
        (GroupBy::Cgroup, None) => anyhow::bail!("--group-by cgroup requires --cgroups"),
        (_, Some(path)) => Some(trace::parse::parse_cgroup_file(path)?),
        (_, None) => None,
    };

    // 2) Load trace and task groups.
    let loaded = trace::parse_trace_file(&args.trace)?;
    let num_cpus = args.cpus.unwrap_or_else(|| loaded.cpu_count());
    let end = loaded.last_timestamp();
    log::info!(
        "loaded {} switch events from {} ({} cpus)",
        loaded.events.len(),
        args.trace,
        num_cpus
    );

    let mut index =
        taskgroup::TaskGroupIndex::from_observations(loaded.task_groups.iter().copied());
    if let Some(path) = &args.task_groups {
        index.extend(trace::parse::parse_task_group_file(path)?);
    }
    log::debug!("task group index covers {} tasks", index.len());
    for (task, group) in index.iter() {
        log::trace!("task {} -> group {}", task, group);
    }

    // 3) Fold.
    let mut sink = residency::LogSink::new(ANOMALY_WARN_LIMIT);
    let mut table = residency::fold(loaded.events, num_cpus, &mut sink)
        .with_context(|| format!("fold trace {}", args.trace))?;
    for (kind, n) in sink.counts() {
        log::info!("{} anomalies: {}", kind.describe(), n);
    }

    let cutoff = match (args.close_at, args.close_at_end) {
        (Some(ts), _) => Some(ts),
        (None, true) => end,
        (None, false) => None,
    };
    if let Some(ts) = cutoff {
        let closed = table.close_open_runs(ts)?;
        log::debug!("closed {} open runs at ts={}", closed, ts);
    }

    // 4) Aggregate and select rows.
    let report = model::aggregate(&table, &index);
    let mut rows = match args.group_by {
        GroupBy::Task => report.rows.clone(),
        GroupBy::Tgid => report.by_task_group(),
        GroupBy::Cgroup => report.by_cgroup(&cgroups.unwrap_or_default()),
    };
    if let Some(re) = &filter {
        rows.retain(|r| re.is_match(&r.name));
    }
    if let SortBy::Total = args.sort {
        rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
    }
    if let Some(n) = args.top {
        rows.truncate(n);
    }

    // 5) Render.
    print!("{}", render::render_table(&rows, report.num_cpus));
    print!("{}", render::render_summary(&report, sink.total()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn demo_trace_end_to_end() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/two_cpu.jsonl");
        let loaded = trace::parse_trace_file(path).unwrap();
        let end = loaded.last_timestamp().unwrap();
        let num_cpus = loaded.cpu_count();
        let index =
            taskgroup::TaskGroupIndex::from_observations(loaded.task_groups.iter().copied());

        let mut anomalies: Vec<residency::diag::Anomaly> = Vec::new();
        let mut table = residency::fold(loaded.events, num_cpus, &mut anomalies).unwrap();
        assert_eq!(anomalies.len(), 2);
        assert_eq!(table.close_open_runs(end).unwrap(), 2);

        let report = model::aggregate(&table, &index);
        let summary: Vec<(String, Vec<u64>, Option<i32>)> = report
            .rows
            .iter()
            .map(|r| (r.key.to_string(), r.per_cpu.clone(), r.task_group))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("0".to_string(), vec![900, 1100], Some(0)),
                ("55".to_string(), vec![100, 0], None),
                ("100".to_string(), vec![1000, 500], Some(100)),
                ("101".to_string(), vec![0, 400], Some(100)),
            ]
        );

        let groups = report.by_task_group();
        assert_eq!(
            groups
                .iter()
                .map(|g| (g.key.to_string(), g.name.as_str(), g.total))
                .collect::<Vec<_>>(),
            vec![
                ("-1".to_string(), "kworker/0:1", 100),
                ("0".to_string(), "swapper/0", 2000),
                ("100".to_string(), "app", 1900),
            ]
        );
    }

    #[test]
    fn cli_parses_report_flags() {
        let cli = Cli::try_parse_from([
            "sched-residency",
            "-vv",
            "report",
            "--trace",
            "t.jsonl",
            "--group-by",
            "tgid",
            "--sort",
            "total",
            "--close-at-end",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Report(args) = cli.cmd;
        assert!(matches!(args.group_by, GroupBy::Tgid));
        assert!(matches!(args.sort, SortBy::Total));
        assert!(args.close_at_end);
        assert_eq!(args.cpus, None);
    }

    #[test]
    fn cli_rejects_conflicting_close_flags() {
        let res = Cli::try_parse_from([
            "sched-residency",
            "report",
            "--trace",
            "t.jsonl",
            "--close-at",
            "5",
            "--close-at-end",
        ]);
        assert!(res.is_err());
    }
}
