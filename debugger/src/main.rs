use std::path::PathBuf;

use clap::{Parser, Subcommand};
use libdebugger::{
    branchwatch::filter::SelectionFilter,
    codetrace::{
        output::TraceLog,
        replay::{RangeBound, TraceQuery, TraceTarget},
    },
    config::{DEFAULT_LOG_CAPACITY, DEFAULT_RESULTS_LIMIT},
    BranchWatch, CpuThreadGuard, Direction, HitFilter, HitType, TraceConfig,
};
use libppcisa::{branch::BranchKind, Address};
use log::{info, warn};

mod command;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Load a branch watch snapshot and list the remaining candidates.
    BranchWatch {
        snapshot: PathBuf,

        /// Branch kinds to list, e.g. "bl,blr". All kinds when omitted.
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<BranchKind>,

        #[arg(long, conflicts_with = "not_taken")]
        taken: bool,
        #[arg(long)]
        not_taken: bool,

        #[arg(long = "virtual", conflicts_with = "physical")]
        virtual_only: bool,
        #[arg(long)]
        physical: bool,

        #[arg(long, conflicts_with = "unconditional")]
        conditional: bool,
        #[arg(long)]
        unconditional: bool,

        #[arg(long, value_parser = command::parse_address)]
        origin_min: Option<Address>,
        #[arg(long, value_parser = command::parse_address)]
        origin_max: Option<Address>,
        #[arg(long, value_parser = command::parse_address)]
        destin_min: Option<Address>,
        #[arg(long, value_parser = command::parse_address)]
        destin_max: Option<Address>,
    },

    /// Replay a recorded trace log, optionally following a register or memory word.
    Trace {
        log: PathBuf,

        /// Register ("r3", "sp", "f1") or 8 hex digit memory address.
        #[arg(short, long)]
        target: Option<TraceTarget>,

        #[arg(short, long)]
        backtrace: bool,

        /// "#N" for the Nth logged instruction, or the first hit of a hex address.
        #[arg(long)]
        start: Option<RangeBound>,
        /// "#N", or the last hit of a hex address.
        #[arg(long)]
        end: Option<RangeBound>,

        #[arg(short, long, default_value_t = DEFAULT_RESULTS_LIMIT)]
        limit: usize,

        /// Hit types to report, e.g. "loadstore,active". "active" also reports partial
        /// updates. All when omitted.
        #[arg(long, value_delimiter = ',')]
        filter: Vec<HitType>,

        #[arg(long, default_value_t = DEFAULT_LOG_CAPACITY)]
        capacity: usize,
    },
}

/// Files are inspected without a running core behind them.
struct Offline;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.action {
        Action::BranchWatch {
            snapshot,
            kinds,
            taken,
            not_taken,
            virtual_only,
            physical,
            conditional,
            unconditional,
            origin_min,
            origin_max,
            destin_min,
            destin_max,
        } => {
            let filter = SelectionFilter {
                taken_only: taken,
                not_taken_only: not_taken,
                virtual_only,
                physical_only: physical,
                conditional_only: conditional,
                unconditional_only: unconditional,
                ..SelectionFilter::new()
            }
            .with_origin_range(origin_min, origin_max)
            .with_destination_range(destin_min, destin_max);

            let filter = if kinds.is_empty() {
                filter
            } else {
                filter.with_kinds(kinds)
            };

            branch_watch(snapshot, &filter)
        }
        Action::Trace {
            log,
            target,
            backtrace,
            start,
            end,
            limit,
            filter,
            capacity,
        } => {
            let config = TraceConfig::new()
                .with_results_limit(limit)
                .with_log_capacity(capacity);

            let mut query = TraceQuery {
                target,
                direction: if backtrace {
                    Direction::Backward
                } else {
                    Direction::Forward
                },
                start,
                end,
                results_limit: config.results_limit,
                ..TraceQuery::new()
            };

            if !filter.is_empty() {
                query.filter = filter.into_iter().collect::<HitFilter>();
            }

            trace(log, &config, &query)
        }
    }
}

fn branch_watch(snapshot: PathBuf, filter: &SelectionFilter) -> anyhow::Result<()> {
    let mut core = Offline;
    let guard = CpuThreadGuard::new(&mut core);

    let mut watch = BranchWatch::new();
    watch.load_from_path(&guard, &snapshot)?;
    info!(
        "Loaded '{}' in the {} phase",
        snapshot.display(),
        watch.phase()
    );

    println!("{}", watch.status(filter));

    for (index, entry, counters) in watch.filtered_selection(filter) {
        println!("{}", command::format_candidate(index, entry, counters));
    }

    Ok(())
}

fn trace(path: PathBuf, config: &TraceConfig, query: &TraceQuery) -> anyhow::Result<()> {
    let log = TraceLog::read_from_path(&path, config.log_capacity)?;
    let report = log.replay(query);

    for result in &report.results {
        println!("{}", command::format_hit(result, &log[result.index]));
    }

    println!(
        "Results: {} of {} recorded instructions",
        report.results.len(),
        report.recorded
    );

    for diagnostic in &report.diagnostics {
        warn!("{}", diagnostic);
        println!("{}", diagnostic);
    }

    Ok(())
}
