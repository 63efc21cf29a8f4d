use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use rulescope_core::{
    ListOptions, RuleCatalog, RuleFilter, RulescopeConfig, RulescopeError, SearchSpec, SortOrder,
    SortSpec, StatusFilter,
};

mod logging;

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG_FILE: &str = "rulescope.yaml";

#[derive(Parser)]
#[command(name = "rulescope")]
#[command(about = "Inspect detection rule files: status, rules, groups and compliance tags")]
struct Args {
    /// Path to config file (YAML format) holding the rules include list
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the rules directory from the config
    #[arg(long, global = true)]
    rules_path: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List rule files with their enabled/disabled status
    Files {
        /// enabled, disabled or all
        #[arg(long)]
        status: Option<String>,

        #[command(flatten)]
        list: ListArgs,
    },
    /// List rules
    Rules {
        #[command(flatten)]
        filter: RuleArgs,

        #[command(flatten)]
        list: ListArgs,
    },
    /// List every group used by any rule
    Groups {
        #[command(flatten)]
        list: ListArgs,
    },
    /// List every compliance requirement used by any rule
    Compliance {
        #[command(flatten)]
        list: ListArgs,
    },
}

#[derive(clap::Args)]
struct RuleArgs {
    /// enabled, disabled or all
    #[arg(long)]
    status: Option<String>,

    /// Only rules carrying this group
    #[arg(long)]
    group: Option<String>,

    /// Only rules carrying this compliance requirement (prefix removed)
    #[arg(long)]
    compliance: Option<String>,

    /// Only rules from this rule file
    #[arg(long)]
    file: Option<String>,

    /// Only the rule with this id
    #[arg(long)]
    id: Option<i64>,

    /// Level or inclusive level range, e.g. 5 or 4-6
    #[arg(long)]
    level: Option<String>,
}

#[derive(clap::Args)]
struct ListArgs {
    /// First item to return
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Maximum number of items to return (0 = no limit; default from config)
    #[arg(long)]
    limit: Option<usize>,

    /// Comma-separated sort fields
    #[arg(long)]
    sort: Option<String>,

    /// Sort order: asc or desc
    #[arg(long)]
    order: Option<String>,

    /// Case-insensitive text to look for in any value
    #[arg(long)]
    search: Option<String>,

    /// Return the items that do NOT match --search
    #[arg(long, requires = "search")]
    negate: bool,
}

impl ListArgs {
    fn to_options(&self, default_limit: usize) -> Result<ListOptions, RulescopeError> {
        let limit = match self.limit {
            Some(0) => None,
            Some(limit) => Some(limit),
            None => Some(default_limit),
        };
        let mut options = ListOptions::default().with_page(self.offset, limit);

        if self.sort.is_some() || self.order.is_some() {
            let order = match &self.order {
                Some(order) => order.parse()?,
                None => SortOrder::Asc,
            };
            let fields = self
                .sort
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty());
            options = options.with_sort(SortSpec::new(fields, order));
        }

        if let Some(search) = &self.search {
            options = options.with_search(SearchSpec::new(search.as_str(), self.negate));
        }

        Ok(options)
    }
}

impl RuleArgs {
    fn to_filter(&self) -> Result<RuleFilter, RulescopeError> {
        let mut filter =
            RuleFilter::new().status(StatusFilter::parse_optional(self.status.as_deref())?);
        if let Some(group) = &self.group {
            filter = filter.group(group.as_str());
        }
        if let Some(compliance) = &self.compliance {
            filter = filter.compliance(compliance.as_str());
        }
        if let Some(file) = &self.file {
            filter = filter.file(file.as_str());
        }
        if let Some(id) = self.id {
            filter = filter.id(id);
        }
        if let Some(level) = &self.level {
            filter = filter.level(level)?;
        }
        Ok(filter)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = logging::init_logging(args.verbose) {
        eprintln!("warning: {e:#}");
    }

    if let Err(e) = run(&args) {
        match e.downcast_ref::<RulescopeError>() {
            Some(error) => eprintln!("error {}: {e:#}", error.code()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(rules_path) = &args.rules_path {
        config.rules_path = rules_path.clone();
    }
    info!(rules_path = %config.rules_path.display(), "using rules directory");

    let default_limit = config.default_limit;
    let catalog = RuleCatalog::from_config(config);

    match &args.command {
        Command::Files { status, list } => {
            let status = StatusFilter::parse_optional(status.as_deref())?;
            print_json(&catalog.rule_files(status, &list.to_options(default_limit)?)?)
        }
        Command::Rules { filter, list } => {
            let filter = filter.to_filter()?;
            print_json(&catalog.rules(&filter, &list.to_options(default_limit)?)?)
        }
        Command::Groups { list } => {
            print_json(&catalog.groups(&list.to_options(default_limit)?)?)
        }
        Command::Compliance { list } => {
            print_json(&catalog.compliance_tags(&list.to_options(default_limit)?)?)
        }
    }
}

/// An explicit `--config` must load; otherwise `rulescope.yaml` in the working
/// directory is used when present.
fn load_config(path: Option<&Path>) -> Result<RulescopeConfig> {
    match path {
        Some(path) => RulescopeConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            Ok(RulescopeConfig::load_with_fallback(
                default_path.exists().then_some(default_path),
            ))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn list_args_default_to_config_limit() {
        let args = parse(&["rulescope", "groups"]);
        let Command::Groups { list } = &args.command else {
            panic!("expected groups command");
        };
        let options = list.to_options(500).unwrap();
        assert_eq!(options.limit, Some(500));
        assert_eq!(options.offset, 0);
        assert!(options.sort.is_none());
    }

    #[test]
    fn zero_limit_means_unlimited_and_sort_fields_split() {
        let args = parse(&[
            "rulescope", "rules", "--limit", "0", "--sort", "level, id", "--order", "desc",
        ]);
        let Command::Rules { list, .. } = &args.command else {
            panic!("expected rules command");
        };
        let options = list.to_options(500).unwrap();
        assert_eq!(options.limit, None);
        assert_eq!(
            options.sort,
            Some(SortSpec::new(["level", "id"], SortOrder::Desc))
        );
    }

    #[test]
    fn bad_order_is_an_invalid_parameter() {
        let args = parse(&["rulescope", "files", "--order", "sideways"]);
        let Command::Files { list, .. } = &args.command else {
            panic!("expected files command");
        };
        assert!(list.to_options(10).unwrap_err().is_invalid_parameter());
    }

    #[test]
    fn rule_args_build_filter() {
        let args = parse(&[
            "rulescope", "rules", "--status", "enabled", "--group", "syslog", "--level", "4-6",
        ]);
        let Command::Rules { filter, .. } = &args.command else {
            panic!("expected rules command");
        };
        let filter = filter.to_filter().unwrap();
        assert_eq!(filter.status, StatusFilter::Enabled);
        assert_eq!(filter.group.as_deref(), Some("syslog"));
        assert_eq!(filter.level, Some(rulescope_core::LevelFilter::Range(4, 6)));
    }

    #[test]
    fn rule_args_reject_bad_status_and_level() {
        let args = parse(&["rulescope", "rules", "--status", "on"]);
        let Command::Rules { filter, .. } = &args.command else {
            panic!("expected rules command");
        };
        assert!(matches!(filter.to_filter(), Err(RulescopeError::InvalidStatus(_))));

        let args = parse(&["rulescope", "rules", "--level", "1-2-3"]);
        let Command::Rules { filter, .. } = &args.command else {
            panic!("expected rules command");
        };
        assert!(matches!(filter.to_filter(), Err(RulescopeError::InvalidLevelRange(_))));
    }
}
