//! Command-line argument definitions for the `segfetch` binary.
use clap::{Parser, Subcommand};

/// A segmented, resumable file downloader.
///
/// Splits a file into byte ranges, downloads them in parallel and merges
/// them, resuming from partial files when interrupted.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a file
    Run {
        /// The URL of the file to download.
        #[arg(short, long)]
        url: String,

        /// The name of the output file. Derived from the URL if not provided.
        #[arg(short, long)]
        output: Option<String>,

        /// The directory to save the file in. Defaults to the current directory.
        #[arg(short = 'd', long)]
        dir: Option<String>,

        /// Desired number of concurrent chunk workers.
        #[arg(short = 't', long)]
        threads: Option<u8>,

        /// Extra request header, as "Name: value". May be repeated.
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Cookie sent with every request, as "name=value". May be repeated.
        #[arg(long = "cookie")]
        cookies: Vec<String>,

        /// Bytes already downloaded by a previous single-stream run.
        #[arg(long, default_value_t = 0)]
        resume_from: u64,

        /// A rate limit in bytes per second (e.g., 1048576 for 1MB/s).
        #[arg(long)]
        rate_limit: Option<u32>,

        /// An optional SHA-256 hash to verify file integrity after download.
        #[arg(long)]
        verify_sha256: Option<String>,
    },
    /// Print the chunk plan for a file size
    Plan {
        /// Total size in bytes.
        #[arg(short, long)]
        size: u64,

        /// Desired number of concurrent chunk workers.
        #[arg(short = 't', long, default_value_t = 4)]
        threads: u8,
    },
}

/// Splits "Name: value" into its parts.
pub fn parse_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
}

/// Splits "name=value" into its parts.
pub fn parse_cookie(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers_and_cookies() {
        assert_eq!(
            parse_header("Authorization: Bearer a:b"),
            Some(("Authorization".into(), "Bearer a:b".into()))
        );
        assert_eq!(parse_header("no colon"), None);
        assert_eq!(parse_cookie("sid=abc=="), Some(("sid".into(), "abc==".into())));
        assert_eq!(parse_cookie("=x"), None);
    }

    #[test]
    fn run_accepts_repeated_headers() {
        let args = Args::parse_from([
            "segfetch", "run", "-u", "https://example.com/f", "-H", "A: 1", "-H", "B: 2",
        ]);
        match args.command {
            Some(Commands::Run { headers, threads, .. }) => {
                assert_eq!(headers.len(), 2);
                assert!(threads.is_none());
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }
}
