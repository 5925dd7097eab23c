//! Command-line binary entrypoint for `segfetch`.
//!
//! Parses arguments, assembles a `DownloadJob` and drives it with a
//! `DownloadController`, rendering progress on a terminal bar.
mod args;

use anyhow::{Result, anyhow};
use args::{Args, Commands, parse_cookie, parse_header};
use clap::Parser;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use segfetch::observer::ConsoleObserver;
use segfetch::{DownloadController, DownloadJob, DownloadOptions, Settings, plan_chunks, utils};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct RunOptions {
    url: String,
    output: Option<String>,
    dir: String,
    threads: u8,
    headers: Vec<String>,
    cookies: Vec<String>,
    resume_from: u64,
    verify_sha256: Option<String>,
}

/// Download a single URL with a progress bar, then optionally verify it.
async fn process_url(run: RunOptions, options: DownloadOptions) -> Result<()> {
    let filename = run
        .output
        .unwrap_or_else(|| utils::get_filename_from_url(&run.url));

    let mut job = DownloadJob::new(run.url.clone(), PathBuf::from(&run.dir), filename.clone())
        .concurrency(run.threads as usize)
        .resume_from(run.resume_from);
    for raw in &run.headers {
        let (name, value) = parse_header(raw).ok_or_else(|| anyhow!("Invalid header: {}", raw))?;
        job = job.header(name, value);
    }
    for raw in &run.cookies {
        let (name, value) = parse_cookie(raw).ok_or_else(|| anyhow!("Invalid cookie: {}", raw))?;
        job = job.cookie(name, value);
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )?
        .progress_chars("=>-"),
    );
    let observer = Arc::new(ConsoleObserver { pb });

    let controller = DownloadController::new(job, options, observer)?;
    let signal_controller = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Received Ctrl+C. Stopping; partial files are kept for resume...");
            signal_controller.cancel();
        }
    });

    let size = controller.start().await?;
    let output_path = controller.job().destination();
    println!("✅ Finished {} ({})", output_path.display(), HumanBytes(size));

    if let Some(expected_hash) = run.verify_sha256 {
        println!("Verifying file integrity...");
        tokio::task::spawn_blocking(move || {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:40.yellow/blue}] {bytes}/{total_bytes} ({eta})",
                )?
                .progress_chars("#>-"),
            );
            pb.set_message("Hashing");
            let result = utils::verify_file_integrity(&output_path, &expected_hash, &pb);
            pb.finish_and_clear();
            result
        })
        .await??;
        println!("✅ Integrity Check PASSED!");
    }

    Ok(())
}

fn print_plan(size: u64, threads: u8) {
    let plan = plan_chunks(size, threads as usize);
    if plan.len() <= 1 {
        println!("Single stream ({})", HumanBytes(size));
        return;
    }
    println!("{:<6} {:<16} {:<16} {:<12}", "Part", "Start", "End", "Size");
    println!("{}", "-".repeat(52));
    for chunk in plan {
        println!(
            "{:<6} {:<16} {:<16} {:<12}",
            chunk.index,
            chunk.start,
            chunk.end,
            HumanBytes(chunk.size()).to_string()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::load().unwrap_or_default();

    match args.command {
        Some(Commands::Run {
            url,
            output,
            dir,
            threads,
            headers,
            cookies,
            resume_from,
            rate_limit,
            verify_sha256,
        }) => {
            let mut options = DownloadOptions::default();
            settings.apply(&mut options);
            if let Some(rate) = rate_limit {
                options.rate_limit = Some(rate);
            }

            let run = RunOptions {
                url,
                output,
                dir: dir
                    .or(settings.default_dir.clone())
                    .unwrap_or_else(|| ".".to_string()),
                threads: threads.or(settings.threads).unwrap_or(4),
                headers,
                cookies,
                resume_from,
                verify_sha256,
            };
            process_url(run, options).await?;
        }
        Some(Commands::Plan { size, threads }) => print_plan(size, threads),
        None => {
            println!("Please use a subcommand: run or plan.");
        }
    }

    Ok(())
}
