//! Fakeweb - CLI Entry Point
//!
//! Validates fixture files and dry-runs requests against them.

use anyhow::Result;
use clap::Parser;
use fakeweb::{
    FakeWeb, FixtureConfig, HttpClient, HttpRequestOptions, RequestOptions, RequestTarget, Scheme,
    Verdict,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "fakeweb",
    about = "Deterministic HTTP interception - validate fixtures and dry-run requests",
    version
)]
struct Args {
    /// Path to fixture file
    #[arg(short, long, default_value = "fakeweb.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print an example fixture file and exit
    #[arg(long)]
    print_config: bool,

    /// Validate fixture file and exit
    #[arg(long)]
    validate: bool,

    /// Resolve a URL against the fixtures and print the outcome
    #[arg(long, value_name = "URL")]
    resolve: Option<String>,

    /// Method used with --resolve
    #[arg(short, long, default_value = "GET")]
    method: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let example = include_str!("../fixtures/example.yaml");
        println!("{}", example);
        return Ok(());
    }

    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading fixtures");
        FixtureConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Fixture file not found: {:?}", args.config);
    } else {
        info!("Using empty fixtures");
        FixtureConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!(
            "Fixture file is valid ({} rules, {} ignored URIs)",
            config.rules.len(),
            config.ignore.len()
        );
        return Ok(());
    }

    let Some(url) = args.resolve else {
        println!("Nothing to do; pass --validate, --resolve <URL> or --print-config");
        return Ok(());
    };

    let web = FakeWeb::from_config(&config)?;
    let method = args.method.to_uppercase();
    match web.is_intercepted(Some(&url), &method) {
        Verdict::Intercept(result) => {
            println!("INTERCEPT {} {} (rule {})", method, url, result.rule);
        }
        Verdict::Forward => {
            println!("FORWARD {} {}", method, url);
            return Ok(());
        }
        Verdict::Deny(err) => anyhow::bail!(err),
    }

    let (status, headers, body) = match method.as_str() {
        "GET" => {
            let response = web.get(RequestOptions::new(url.as_str()))?;
            (response.status_code, response.headers, response.body.map(|b| b.to_bytes()))
        }
        "POST" => {
            let response = web.post(RequestOptions::new(url.as_str()))?;
            (response.status_code, response.headers, response.body.map(|b| b.to_bytes()))
        }
        _ => {
            let (scheme, target) = socket_target(&url, &method)?;
            let mut response = web.request(scheme, target, None)?.end()?;
            let head = response.head().clone();
            let body = response.read_body()?;
            (head.status_code, head.headers, Some(body))
        }
    };

    println!("status: {}", status);
    let mut names: Vec<_> = headers.keys().collect();
    names.sort();
    for name in names {
        println!("{}: {}", name, headers[name]);
    }
    if let Some(body) = body {
        println!();
        println!("{}", String::from_utf8_lossy(&body));
    }

    Ok(())
}

/// Split a URL into low-level request options so a non-GET method survives.
fn socket_target(raw: &str, method: &str) -> Result<(Scheme, RequestTarget)> {
    let parsed = Url::parse(raw)?;
    let scheme = match parsed.scheme() {
        "https" => Scheme::Https,
        "http" => Scheme::Http,
        other => anyhow::bail!("Unsupported scheme for --method {}: {}", method, other),
    };
    let path = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };
    let options = HttpRequestOptions {
        hostname: parsed.host_str().map(str::to_string),
        host: None,
        port: parsed.port_or_known_default(),
        path: Some(path),
        method: Some(method.to_string()),
    };
    Ok((scheme, RequestTarget::Options(options)))
}
