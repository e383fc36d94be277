use std::fs;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use perfbench_core::options::parse_flag;
use perfbench_core::{
    AdminClient, FilterSpec, LoadGenerator, PerfbenchConfig, WriteAcknowledgement,
};
use perfbench_runner::{
    write_report, CatalogLoader, InMemoryAdmin, Narrator, Selection, SimulatedGenerator,
    SuiteDriver,
};
use serde_json::Value;
use tracing::info;

use crate::http::{HttpAdminClient, HttpLoadGenerator};
use crate::RunArgs;

pub async fn execute(args: RunArgs) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => PerfbenchConfig::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => PerfbenchConfig::load().context("failed to load settings")?,
    };
    apply_overrides(&args, &mut config)?;
    config.validate().context("invalid settings")?;

    let catalog = CatalogLoader::load_files(&args.testfiles).context("failed to load test files")?;
    info!(tests = catalog.len(), "catalog loaded");

    let (admin, generator): (Arc<dyn AdminClient>, Arc<dyn LoadGenerator>) = if args.dry_run {
        info!("dry run: using in-memory admin and simulated generator");
        (
            Arc::new(InMemoryAdmin::new()),
            Arc::new(SimulatedGenerator::default()),
        )
    } else {
        info!(endpoint = %config.agent.endpoint, target = %config.target.address(), "using agent");
        (
            Arc::new(HttpAdminClient::new(&config.agent)),
            Arc::new(HttpLoadGenerator::new(&config.agent)),
        )
    };

    let driver = SuiteDriver::from_config(&config, admin, generator, Narrator::stdout());
    let report = driver
        .run(&catalog, &config.run_params()?, &Selection::from(&config))
        .await
        .context("suite run aborted")?;

    write_report(&mut io::stdout().lock(), &report)?;

    if let Some(out) = &args.out {
        let body = serde_json::to_string_pretty(&report)?;
        fs::write(out, body).with_context(|| format!("failed to write {}", out.display()))?;
        info!(file = %out.display(), "report written");
    }

    if args.metrics {
        eprintln!("{}", perfbench_core::metrics::gather_text());
    }

    Ok(ExitCode::SUCCESS)
}

/// Copies every flag given on the command line over the loaded settings.
fn apply_overrides(args: &RunArgs, config: &mut PerfbenchConfig) -> Result<()> {
    if !args.threads.is_empty() {
        config.run.thread_counts = args.threads.clone();
    }
    if let Some(multidb) = args.multidb {
        config.run.multidb = multidb;
    }
    if let Some(multicoll) = args.multicoll {
        config.run.multicoll = multicoll;
    }
    if let Some(seconds) = args.trial_time {
        config.run.trial_seconds = seconds;
    }
    if let Some(count) = args.trial_count {
        config.run.trial_count = count;
    }
    if let Some(shard) = args.shard {
        config.run.shard = shard;
    }

    if let Some(host) = &args.host {
        config.target.host = host.clone();
    }
    if let Some(port) = args.port {
        config.target.port = port;
    }
    if let Some(username) = &args.username {
        config.target.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        config.target.password = Some(password.clone());
    }

    if let Some(safe) = &args.safe {
        config.crud.safe = flag("--safe", safe)?;
    }
    if let Some(w) = &args.w {
        config.crud.write_concern.w = match w.parse::<u32>() {
            Ok(nodes) => WriteAcknowledgement::Nodes(nodes),
            Err(_) => WriteAcknowledgement::Tag(w.clone()),
        };
    }
    if let Some(j) = &args.j {
        config.crud.write_concern.j = flag("-j", j)?;
    }
    if let Some(write_cmd) = &args.write_cmd {
        config.crud.write_cmd = flag("--write-cmd", write_cmd)?;
    }
    if let Some(read_cmd) = &args.read_cmd {
        config.crud.read_cmd = flag("--read-cmd", read_cmd)?;
    }

    if let Some(include) = &args.include {
        config.filter.include = include
            .parse::<FilterSpec>()
            .context("invalid --include")?;
    }
    if let Some(exclude) = &args.exclude {
        config.filter.exclude = Some(exclude.parse::<FilterSpec>().context("invalid --exclude")?);
    }
    Ok(())
}

fn flag(name: &str, raw: &str) -> Result<bool> {
    parse_flag(&Value::String(raw.to_string())).map_err(|err| anyhow!("{name}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfbench_core::ShardMode;

    #[test]
    fn flags_override_settings() {
        let args = RunArgs {
            threads: vec![2, 8],
            multidb: Some(3),
            shard: Some(2),
            host: Some("db1".into()),
            w: Some("majority".into()),
            j: Some("TRUE".into()),
            write_cmd: Some("false".into()),
            include: Some("['insert','update']".into()),
            exclude: Some("[['slow'],['big']]".into()),
            ..RunArgs::default()
        };
        let mut config = PerfbenchConfig::default();
        apply_overrides(&args, &mut config).unwrap();

        assert_eq!(config.run.thread_counts, vec![2, 8]);
        assert_eq!(config.target.address(), "db1:27017");
        assert_eq!(
            config.crud.write_concern.w,
            WriteAcknowledgement::Tag("majority".into())
        );
        assert!(config.crud.write_concern.j);
        assert!(!config.crud.write_cmd);
        assert_eq!(
            config.filter.include,
            FilterSpec::AnyOf(vec!["insert".into(), "update".into()])
        );
        assert_eq!(
            config.filter.exclude,
            Some(FilterSpec::AllOf(vec![vec!["slow".into()], vec!["big".into()]]))
        );

        let params = config.run_params().unwrap();
        assert_eq!(params.fanout.multidb, 3);
        assert_eq!(params.fanout.shard, ShardMode::Ranged);
    }

    #[test]
    fn numeric_w_is_a_node_count() {
        let args = RunArgs {
            w: Some("2".into()),
            ..RunArgs::default()
        };
        let mut config = PerfbenchConfig::default();
        apply_overrides(&args, &mut config).unwrap();
        assert_eq!(config.crud.write_concern.w, WriteAcknowledgement::Nodes(2));
    }

    #[test]
    fn bad_flag_values_are_rejected() {
        let args = RunArgs {
            safe: Some("maybe".into()),
            ..RunArgs::default()
        };
        let mut config = PerfbenchConfig::default();
        assert!(apply_overrides(&args, &mut config).is_err());
    }
}
