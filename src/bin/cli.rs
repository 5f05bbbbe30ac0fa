//! snmp-cli: a manual exerciser for the Command Generator applications.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;

use snmp_engine::cmdgen::facade::{AuthData, TransportTarget};
use snmp_engine::cmdgen::CommandGenerator;
use snmp_engine::config::EngineConfig;
use snmp_engine::pdu::{Oid, SnmpValue, VarBind};
use snmp_engine::security::usm::crypto::{AuthProtocol, PrivProtocol};

#[derive(Parser)]
#[command(name = "snmp-cli")]
#[command(about = "Command-line SNMP manager")]
#[command(version = snmp_engine::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Target UDP port
    #[arg(long, default_value = "161")]
    port: u16,

    /// SNMP version: v1, v2c or v3
    #[arg(long, default_value = "v2c")]
    version: String,

    /// Community string (v1/v2c)
    #[arg(long, default_value = "public")]
    community: String,

    /// USM security name (v3)
    #[arg(long)]
    user: Option<String>,

    /// Remote engineID as hex (v3, required since this engine does not
    /// localise USM keys lazily after discovery)
    #[arg(long)]
    engine_id: Option<String>,

    /// USM authentication protocol: md5 or sha (v3)
    #[arg(long)]
    auth_protocol: Option<String>,

    #[arg(long)]
    auth_password: Option<String>,

    /// USM privacy protocol: des, 3des, aes128, aes192 or aes256 (v3)
    #[arg(long)]
    priv_protocol: Option<String>,

    #[arg(long)]
    priv_password: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "1000")]
    timeout_ms: u64,

    #[arg(long, default_value = "5")]
    retries: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// GET-REQUEST for one or more OIDs
    Get { oids: Vec<String> },
    /// GET-NEXT-REQUEST for one or more OIDs
    GetNext { oids: Vec<String> },
    /// GET-BULK-REQUEST
    GetBulk {
        #[arg(long, default_value = "0")]
        non_repeaters: i32,
        #[arg(long, default_value = "10")]
        max_repetitions: i32,
        oids: Vec<String>,
    },
    /// Walk a table via repeated GET-NEXT
    Walk { oids: Vec<String> },
    /// Walk a table via repeated GET-BULK
    WalkBulk {
        #[arg(long, default_value = "10")]
        max_repetitions: i32,
        oids: Vec<String>,
    },
    /// SET-REQUEST, oid=integer-value pairs
    Set { assignments: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = EngineConfig::default_config();
    snmp_engine::utils::setup_logging(&config.logging)?;
    let cmdgen = CommandGenerator::bind(&config, "0.0.0.0:0".parse()?, Duration::from_millis(200)).await?;

    let auth_data = build_auth_data(&cli)?;
    let target = build_transport_target(&cli).await?;

    match &cli.command {
        Commands::Get { oids } => {
            let oids = parse_oids(oids)?;
            let result = cmdgen.get(&auth_data, &target, &oids).await?;
            print_command_result(&result.error_indication.map(|i| i.to_string()), result.error_status, result.error_index, &result.var_binds);
        }
        Commands::GetNext { oids } => {
            let oids = parse_oids(oids)?;
            let result = cmdgen.get_next(&auth_data, &target, &oids).await?;
            print_command_result(&result.error_indication.map(|i| i.to_string()), result.error_status, result.error_index, &result.var_binds);
        }
        Commands::GetBulk {
            non_repeaters,
            max_repetitions,
            oids,
        } => {
            let oids = parse_oids(oids)?;
            let result = cmdgen
                .get_bulk(&auth_data, &target, *non_repeaters, *max_repetitions, &oids)
                .await?;
            print_command_result(&result.error_indication.map(|i| i.to_string()), result.error_status, result.error_index, &result.var_binds);
        }
        Commands::Walk { oids } => {
            let heads = parse_oids(oids)?;
            let result = cmdgen.walk_next(&auth_data, &target, &heads, false).await?;
            print_walk_result(&result.error_indication.map(|i| i.to_string()), result.error_status, result.error_index, &result.var_binds);
        }
        Commands::WalkBulk { max_repetitions, oids } => {
            let heads = parse_oids(oids)?;
            let result = cmdgen
                .walk_bulk(&auth_data, &target, &heads, *max_repetitions, false)
                .await?;
            print_walk_result(&result.error_indication.map(|i| i.to_string()), result.error_status, result.error_index, &result.var_binds);
        }
        Commands::Set { assignments } => {
            let var_binds = parse_assignments(assignments)?;
            let result = cmdgen.set(&auth_data, &target, var_binds).await?;
            print_command_result(&result.error_indication.map(|i| i.to_string()), result.error_status, result.error_index, &result.var_binds);
        }
    }

    cmdgen.shutdown().await;
    Ok(())
}

fn build_auth_data(cli: &Cli) -> Result<AuthData, Box<dyn std::error::Error>> {
    match cli.version.as_str() {
        "v1" | "v2c" => {
            let mp_model = if cli.version == "v1" { 0 } else { 1 };
            Ok(AuthData::Community {
                security_name: cli.community.clone(),
                community: cli.community.clone(),
                mp_model,
                context_engine_id: Vec::new(),
                context_name: Vec::new(),
            })
        }
        "v3" => {
            let user = cli
                .user
                .clone()
                .ok_or("--user is required for SNMPv3")?;
            let engine_id = hex::decode(
                cli.engine_id
                    .as_ref()
                    .ok_or("--engine-id is required for SNMPv3 (no discovery-time user cloning)")?,
            )?;
            let auth_protocol = cli
                .auth_protocol
                .as_deref()
                .map(parse_auth_protocol)
                .transpose()?;
            let priv_protocol = cli
                .priv_protocol
                .as_deref()
                .map(parse_priv_protocol)
                .transpose()?;
            Ok(AuthData::V3User {
                security_name: user,
                engine_id,
                auth_protocol,
                auth_password: cli.auth_password.as_ref().map(|p| p.as_bytes().to_vec()),
                priv_protocol,
                priv_password: cli.priv_password.as_ref().map(|p| p.as_bytes().to_vec()),
                context_engine_id: Vec::new(),
                context_name: Vec::new(),
            })
        }
        other => Err(format!("unknown SNMP version {:?}", other).into()),
    }
}

fn parse_auth_protocol(s: &str) -> Result<AuthProtocol, Box<dyn std::error::Error>> {
    match s {
        "md5" => Ok(AuthProtocol::HmacMd5),
        "sha" => Ok(AuthProtocol::HmacSha1),
        other => Err(format!("unknown auth protocol {:?}", other).into()),
    }
}

fn parse_priv_protocol(s: &str) -> Result<PrivProtocol, Box<dyn std::error::Error>> {
    match s {
        "des" => Ok(PrivProtocol::Des),
        "3des" => Ok(PrivProtocol::TripleDes),
        "aes128" => Ok(PrivProtocol::Aes128),
        "aes192" => Ok(PrivProtocol::Aes192),
        "aes256" => Ok(PrivProtocol::Aes256),
        other => Err(format!("unknown privacy protocol {:?}", other).into()),
    }
}

async fn build_transport_target(cli: &Cli) -> Result<TransportTarget, Box<dyn std::error::Error>> {
    let addr: SocketAddr = tokio::net::lookup_host((cli.host.as_str(), cli.port))
        .await?
        .next()
        .ok_or_else(|| format!("could not resolve {}:{}", cli.host, cli.port))?;
    Ok(TransportTarget::udp(addr)
        .with_timeout(Duration::from_millis(cli.timeout_ms))
        .with_retries(cli.retries))
}

fn parse_oids(raw: &[String]) -> Result<Vec<Oid>, Box<dyn std::error::Error>> {
    raw.iter()
        .map(|s| Oid::from_string(s).map_err(|e| e.to_string().into()))
        .collect()
}

/// `oid=value` where `value` parses as an integer, falling back to an
/// octet string; enough for manual exercising without pulling in a
/// full MIB-typed syntax resolver (spec.md §6 leaves that external).
fn parse_assignments(raw: &[String]) -> Result<Vec<VarBind>, Box<dyn std::error::Error>> {
    raw.iter()
        .map(|assignment| {
            let (oid, value) = assignment
                .split_once('=')
                .ok_or_else(|| format!("expected oid=value, got {:?}", assignment))?;
            let oid = Oid::from_string(oid).map_err(|e| e.to_string())?;
            let value = match value.parse::<i64>() {
                Ok(n) => SnmpValue::Integer(n),
                Err(_) => SnmpValue::OctetString(value.as_bytes().to_vec()),
            };
            Ok(VarBind::new(oid, value))
        })
        .collect()
}

fn print_command_result(
    error_indication: &Option<String>,
    error_status: snmp_engine::ErrorStatus,
    error_index: i32,
    var_binds: &[VarBind],
) {
    if let Some(indication) = error_indication {
        println!("{} {}", "errorIndication:".red().bold(), indication);
        return;
    }
    if error_status.is_error() {
        println!(
            "{} {:?} {} {}",
            "errorStatus:".red().bold(),
            error_status,
            "at index".dimmed(),
            error_index
        );
        return;
    }
    for vb in var_binds {
        println!("{} = {}", vb.oid.to_string().cyan(), format_value(&vb.value));
    }
}

fn print_walk_result(
    error_indication: &Option<String>,
    error_status: snmp_engine::ErrorStatus,
    error_index: i32,
    var_binds: &[VarBind],
) {
    print_command_result(error_indication, error_status, error_index, var_binds);
    println!("{} {}", "rows:".dimmed(), var_binds.len());
}

fn format_value(value: &SnmpValue) -> String {
    match value {
        SnmpValue::Integer(n) => n.to_string(),
        SnmpValue::OctetString(bytes) => String::from_utf8_lossy(bytes).to_string(),
        SnmpValue::Null => "Null".to_string(),
        SnmpValue::ObjectId(oid) => oid.to_string(),
        SnmpValue::IpAddress(octets) => octets.map(|o| o.to_string()).join("."),
        SnmpValue::Counter32(n) => format!("{} (Counter32)", n),
        SnmpValue::Gauge32(n) => format!("{} (Gauge32)", n),
        SnmpValue::TimeTicks(n) => format!("{} (TimeTicks)", n),
        SnmpValue::Opaque(bytes) => format!("{} bytes (Opaque)", bytes.len()),
        SnmpValue::Counter64(n) => format!("{} (Counter64)", n),
        SnmpValue::NoSuchObject => "noSuchObject".yellow().to_string(),
        SnmpValue::NoSuchInstance => "noSuchInstance".yellow().to_string(),
        SnmpValue::EndOfMibView => "endOfMibView".yellow().to_string(),
    }
}
