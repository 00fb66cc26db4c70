//! mloader - CLI entry point.

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use mloader::{
    api::{
        verify_capture_schema, verify_capture_schema_against_baseline, MangaPlusApi,
        PayloadCapture,
    },
    cli::Args,
    config::{validate_config, validate_mode_flags, Config},
    discovery::{discover_title_ids, HttpDiscoverySource},
    download::{request_cancel, Downloader},
    error::{exit_codes, Error, Result},
    export::FormatExporterFactory,
    manga::{normalize_targets, WorkUnit},
    output::{
        create_spinner, print_banner, print_config_summary, print_error, print_info,
        print_json_report, print_success, print_summary, print_warning, ReportTargets, RunMode,
        RunReport,
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments; clap exits with 2 on usage errors.
    let args = Args::parse();
    init_tracing(&args);

    let json = args.json;
    let mode = if args.verify_capture_schema.is_some() {
        RunMode::VerifyCapture
    } else if args.list_only {
        RunMode::ListOnly
    } else {
        RunMode::Download
    };

    let mut report = RunReport::new(mode, ReportTargets::default());
    if let Err(e) = run(&args, &mut report).await {
        tracing::debug!("Run failed: {:?}", e);
        report.fail(e.exit_code(), e.to_string());
    }

    if json {
        if let Err(e) = print_json_report(&report) {
            print_error(&format!("Cannot write report: {}", e));
        }
    } else if let Some(error) = &report.error {
        print_error(error);
    }

    ExitCode::from(report.exit_code as u8)
}

fn init_tracing(args: &Args) {
    let level = if args.json || args.quiet {
        "warn"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Keep stdout for the JSON document.
    if args.json {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}

async fn run(args: &Args, report: &mut RunReport) -> Result<()> {
    let human = !args.json;
    let chatty = human && !args.quiet;

    validate_mode_flags(&args.mode_flags())?;

    if let Some(dir) = &args.verify_capture_schema {
        let summary = match &args.verify_capture_baseline {
            Some(baseline) => verify_capture_schema_against_baseline(dir, baseline)?,
            None => verify_capture_schema(dir)?,
        };
        if human {
            print_success(&format!(
                "Verified {} capture record(s) in {}",
                summary.total_records,
                dir.display()
            ));
            for (endpoint, count) in &summary.endpoint_counts {
                print_info(&format!("  {}: {}", endpoint, count));
            }
        }
        report.record_verification(summary);
        return Ok(());
    }

    // Load configuration: file and environment, then CLI flags on top.
    let cwd = std::env::current_dir()?;
    let mut config = Config::load_layered(args.config.as_deref(), &cwd, |key| {
        std::env::var(key).ok()
    })?;
    args.merge_into_config(&mut config)?;
    validate_config(&config)?;

    let mut units = normalize_targets(&args.urls, &args.titles, &args.chapters)?;
    if units.is_empty() && !args.all {
        return Err(Error::InvalidInputs(vec![
            "No URLs, --title or --chapter ids given".to_string(),
        ]));
    }

    // Initialize API client
    let timeout = Duration::from_secs(config.options.request_timeout_secs);
    let mut api = MangaPlusApi::new(config.auth.clone(), timeout)?;
    if let Some(dir) = &config.options.capture_dir {
        api = api.with_capture(PayloadCapture::new(dir)?);
        tracing::info!("Capturing API payloads to {}", dir.display());
    }

    if args.all {
        let spinner = create_spinner("Discovering titles...", config.options.show_progress);
        let source = HttpDiscoverySource::new(&api, timeout);
        let discovery = discover_title_ids(&source, &config.discovery).await;
        spinner.finish_and_clear();
        let discovery = discovery?;

        if human {
            for notice in &discovery.notices {
                print_warning(notice);
            }
            print_info(&format!(
                "Discovered {} title(s) via {}",
                discovery.title_ids.len(),
                discovery.stage
            ));
        }

        if args.list_only {
            if human {
                for id in &discovery.title_ids {
                    println!("{}", id);
                }
            }
            report.targets.titles = discovery.title_ids.clone();
            report.record_discovery(discovery);
            return Ok(());
        }

        let mut seen: HashSet<WorkUnit> = units.iter().copied().collect();
        for &id in &discovery.title_ids {
            if seen.insert(WorkUnit::Title(id)) {
                units.push(WorkUnit::Title(id));
            }
        }
        report.record_discovery(discovery);
    }

    report.targets = ReportTargets::from_units(&units);
    if chatty {
        print_banner();
        print_config_summary(
            &report.targets.titles,
            &report.targets.chapters,
            &config.options.format.to_string(),
            &config.options.out_dir.display().to_string(),
        );
    }

    // Ctrl-C stops the run between chapters; a second one quits at once.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if request_cancel(&cancel) {
                    print_warning("Interrupted again; exiting without finishing the chapter");
                    std::process::exit(exit_codes::EXTERNAL_FAILURE);
                }
                tracing::warn!(
                    "Interrupt received; finishing the current chapter (Ctrl-C again to quit)"
                );
            }
        });
    }

    let exporters = FormatExporterFactory::from_config(&config);
    let outcome = Downloader::new(&api, &exporters, &config)
        .with_cancel_flag(cancel)
        .run(&units)
        .await;

    if human {
        print_summary(&outcome);
    }
    report.record_outcome(&outcome);
    Ok(())
}
