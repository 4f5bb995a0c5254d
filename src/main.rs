use std::{path::PathBuf, process::ExitCode};

use avscan_client::{
    models::{ScanFinding, ThreatClass},
    scan::STOPPED_BY_USER,
    AntivirusService, Config, DirectoryUpload, Result, ScanEvent, ScanSession, ScanTarget,
    SessionStatus,
};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(
    name = "avscan",
    version,
    about = "Scan files and manage network protection through the antivirus service"
)]
struct Cli {
    /// Config file to read instead of the per-user one
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Base URL of the antivirus API
    #[arg(long)]
    api_url: Option<String>,

    /// Base URL of the network-security API
    #[arg(long)]
    network_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload and scan a single file
    File { path: PathBuf },
    /// Upload and scan every file in a directory
    Dir {
        path: PathBuf,
        /// Only scan files directly inside the directory
        #[arg(long)]
        no_recursive: bool,
    },
    /// Run a full system scan on the server (Ctrl-C requests a stop)
    System,
    /// Show protection and resource status
    Status,
    /// List past scan results
    History {
        /// Only show infected files
        #[arg(long)]
        infected: bool,
    },
    /// Show network protection status
    Network,
    /// Run a network security scan on the server
    NetworkScan,
    Firewall { state: Toggle },
    WebProtection { state: Toggle },
    Block {
        domain: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Unblock { domain: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::debug!("{e:?}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::new()?,
    };
    if let Some(url) = &cli.api_url {
        config.antivirus_url = url.clone();
    }
    if let Some(url) = &cli.network_url {
        config.network_security_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let (service, events) = AntivirusService::new(config)?;
    let client = service.client.clone();

    match cli.command {
        Command::File { path } => scan(&service, events, ScanTarget::File(path)).await,
        Command::Dir { path, no_recursive } => {
            let upload = DirectoryUpload::new(path, !no_recursive);
            scan(&service, events, ScanTarget::Directory(upload)).await
        }
        Command::System => scan(&service, events, ScanTarget::System).await,
        Command::Status => {
            let status = client.system_status().await?;
            println!("system protected:    {}", yes_no(status.system_protected));
            println!("realtime protection: {}", yes_no(status.realtime_protection));
            if let Some(cpu) = status.cpu_usage {
                println!("cpu usage:           {cpu:.1}%");
            }
            for disk in &status.disk_usage {
                println!(
                    "disk {:<14} {:.0}% used",
                    disk.name,
                    disk.used_ratio() * 100.0
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::History { infected } => {
            let findings = if infected {
                client.infected_files().await?
            } else {
                client.scan_history().await?
            };
            findings.iter().for_each(print_finding);
            Ok(ExitCode::SUCCESS)
        }
        Command::Network => {
            let status = client.network_status().await?;
            println!("firewall:        {}", on_off(status.firewall_enabled()));
            println!("web protection:  {}", on_off(status.web_protection_enabled()));
            println!("active threats:  {}", status.active_threats);
            println!("connections:     {}", status.active_connections);
            println!("blocked:         {}", status.blocked_attempts);
            for domain in &status.blocked_domains {
                println!("  blocked {}", domain.domain);
            }
            for conn in &status.recent_connections {
                println!(
                    "  {} {}",
                    conn.domain.as_deref().unwrap_or("-"),
                    conn.ip.as_deref().unwrap_or("-")
                );
            }
            if let Some(warning) = &status.warning {
                eprintln!("warning: {warning}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::NetworkScan => {
            let result = client.scan_network().await?;
            println!("firewall:        {}", on_off(result.firewall_enabled));
            println!("web protection:  {}", on_off(result.web_protection_enabled));
            println!("open ports:      {}", result.open_ports.join(", "));
            for conn in &result.suspicious_connections {
                println!("  suspicious {conn}");
            }
            for vuln in &result.vulnerabilities {
                println!("[{}] {}: {}", vuln.severity, vuln.kind, vuln.description);
                if let Some(recommendation) = &vuln.recommendation {
                    println!("    {recommendation}");
                }
            }
            println!("\n{} threats found", result.threats);
            if result.is_clean() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(2))
            }
        }
        Command::Firewall { state } => {
            client.toggle_firewall(state.enabled()).await?;
            let status = client.network_status().await?;
            println!("firewall: {}", on_off(status.firewall_enabled()));
            Ok(ExitCode::SUCCESS)
        }
        Command::WebProtection { state } => {
            client.toggle_web_protection(state.enabled()).await?;
            let status = client.network_status().await?;
            println!("web protection: {}", on_off(status.web_protection_enabled()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Block { domain, reason } => {
            let response = client.block_domain(&domain, reason.as_deref()).await?;
            println!(
                "{}",
                response
                    .message
                    .unwrap_or_else(|| format!("blocked {domain}"))
            );
            if let Some(warning) = response.warning {
                eprintln!("warning: {warning}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Unblock { domain } => {
            let response = client.unblock_domain(&domain).await?;
            println!(
                "{}",
                response
                    .message
                    .unwrap_or_else(|| format!("unblocked {domain}"))
            );
            if let Some(warning) = response.warning {
                eprintln!("warning: {warning}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn scan(
    service: &AntivirusService,
    events: UnboundedReceiver<ScanEvent>,
    target: ScanTarget,
) -> Result<ExitCode> {
    let mut session = service.start_scan(target).await?;
    if session.status == SessionStatus::Running {
        println!("system scan running, press Ctrl-C to stop");
        session = wait_for_scan(service, events).await;
    }
    Ok(report(&session))
}

async fn wait_for_scan(
    service: &AntivirusService,
    mut events: UnboundedReceiver<ScanEvent>,
) -> ScanSession {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ScanEvent::PollFailed { message, .. }) => {
                    eprintln!("status check failed, still waiting: {message}");
                }
                Some(ScanEvent::StopRequestFailed { message, .. }) => {
                    eprintln!("server did not confirm the stop: {message}");
                }
                Some(ScanEvent::Completed { .. }) | Some(ScanEvent::Failed { .. }) | None => break,
                Some(_) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("stopping scan...");
                service.stop_scan().await;
            }
        }
    }
    service.session().await
}

fn report(session: &ScanSession) -> ExitCode {
    if session.needs_elevation {
        eprintln!(
            "{}",
            session.error_message.as_deref().unwrap_or_default()
        );
        eprintln!("Restart the scanner service as administrator and run the scan again.");
        return ExitCode::FAILURE;
    }

    if let Some(findings) = session.results() {
        findings.iter().for_each(print_finding);
        if let Some(summary) = session.summary() {
            println!(
                "\n{} files: {} threats, {} errors/skipped, {} clean",
                summary.total_files, summary.threats, summary.errors, summary.clean
            );
            if summary.threats > 0 {
                return ExitCode::from(2);
            }
        }
        return ExitCode::SUCCESS;
    }

    let message = session.error_message.as_deref().unwrap_or("scan did not finish");
    eprintln!("{message}");
    if let Some(stop_error) = &session.stop_error {
        eprintln!("stop request: {stop_error}");
    }
    if message == STOPPED_BY_USER {
        ExitCode::from(130)
    } else {
        ExitCode::FAILURE
    }
}

fn print_finding(finding: &ScanFinding) {
    let tag = match finding.classify() {
        ThreatClass::Clean => "clean   ",
        ThreatClass::Infected => "INFECTED",
        ThreatClass::ScanError => "error   ",
        ThreatClass::Warning => "warning ",
    };
    let threat = finding.threat_type.as_deref().unwrap_or("");
    match finding.threat_details.as_deref() {
        Some(details) if finding.classify() != ThreatClass::Clean => {
            println!("{tag} {} {threat}: {details}", finding.file_path)
        }
        _ => println!("{tag} {}", finding.file_path),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
