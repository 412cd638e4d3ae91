use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use zrsync::cli::Cli;
use zrsync::http::{ProxyConfig, ReqwestHttpCollaborator};
use zrsync::logging;
use zrsync::progress::IndicatifProgressCollaborator;
use zrsync::{ClientDriver, RunRequest};

/// `http_proxy`/`https_proxy`/`no_proxy` env vars (spec §6.5,
/// `clientcommand.c`'s `getenv("http_proxy")`), made explicit per
/// SPEC_FULL §9 rather than left to reqwest's implicit env-sniffing.
fn proxy_config_from_env() -> ProxyConfig {
    let first_nonempty = |names: &[&str]| -> Option<String> {
        names.iter().find_map(|n| std::env::var(n).ok().filter(|v| !v.is_empty()))
    };
    ProxyConfig {
        http_proxy: first_nonempty(&["http_proxy", "HTTP_PROXY"]),
        https_proxy: first_nonempty(&["https_proxy", "HTTPS_PROXY"]),
        no_proxy: first_nonempty(&["no_proxy", "NO_PROXY"]),
    }
}

/// URL-selection PRNG seed, drawn from OS entropy (REDESIGN FLAGS: replaces
/// `original_source/clientcommand.c`'s `getpid() ^ time(NULL)`, which tests
/// can't control and which collides across processes started in the same
/// second). Tests construct `ClientState`/`RunRequest` with a fixed literal
/// seed instead of calling this.
fn rng_seed() -> u64 {
    use rand::{RngCore, SeedableRng};
    rand::rngs::StdRng::from_entropy().next_u64()
}

#[tokio::main]
async fn main() {
    // Exit code 3 for usage errors (spec §6.5), rather than clap's default
    // of 2, requires parsing manually instead of via `Cli::parse()`.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().ok();
            std::process::exit(3);
        }
    };
    logging::init(cli.verbose, cli.log_format);

    let quiet = cli.quiet || !std::io::stdout().is_terminal();

    let auth = match cli.auth_table() {
        Ok(table) => table,
        Err(e) => {
            // Exit code 1: CLI misuse, a malformed `-A` argument (spec §6.5).
            eprintln!("zrsync: {e}");
            std::process::exit(1);
        }
    };

    let http = match ReqwestHttpCollaborator::new(
        concat!("zrsync/", env!("CARGO_PKG_VERSION")),
        &[],
        auth,
        Duration::from_secs(60),
        2,
        400,
        proxy_config_from_env(),
    ) {
        Ok(h) => Arc::new(h),
        Err(e) => {
            eprintln!("zrsync: failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let progress = Arc::new(IndicatifProgressCollaborator::new(quiet));

    let req = RunRequest {
        control_location: cli.control_location.clone(),
        output_override: cli.output.clone(),
        seed_paths: cli.input.clone(),
        referrer: cli.referrer.clone(),
        quiet,
        keep_control_path: cli.keep_control.clone(),
        rng_seed: rng_seed(),
    };

    match ClientDriver::run(http, progress, req).await {
        Ok(report) => {
            if !quiet {
                println!(
                    "{}: {} bytes local, {} bytes downloaded",
                    report.final_path.display(),
                    report.local_used,
                    report.http_bytes_downloaded
                );
            }
        }
        Err(e) => {
            eprintln!("zrsync: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
