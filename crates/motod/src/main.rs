//! motod - bike diagnostics driver
//!
//! Thin command-line front over the diagnostics stack:
//!
//!   motod [OPTIONS] <COMMAND>
//!
//! Commands:
//!   scan            Probe the bus and list compatible ECUs
//!   dtc-read        Connect to the first ECU and print stored codes
//!   dtc-clear       Connect to the first ECU and clear stored codes
//!   monitor         Print every CAN frame received from the bridge
//!   send <hex>      Send one raw CAN frame (hex byte string)
//!
//! Options:
//!   -c, --config <path>  TOML config (link settings, ECU profiles)
//!   -p, --port <name>    Serial port, overrides discovery by USB VID

use std::sync::Arc;
use std::time::Duration;

use moto_ecu::{EcuManager, EcuProfile, EmptyDictionary};
use moto_link::{CanFrame, LinkConfig, SerialLink};
use moto_uds::TESTER_ID;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Deserialize)]
struct DriverConfig {
    #[serde(default)]
    link: LinkConfig,
    #[serde(default)]
    profiles: Vec<EcuProfile>,
}

#[derive(Debug)]
enum Command {
    Scan,
    DtcRead,
    DtcClear,
    Monitor,
    Send(String),
}

struct Args {
    config_path: Option<String>,
    port: Option<String>,
    command: Command,
}

fn parse_args() -> anyhow::Result<Args> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path = None;
    let mut port = None;
    let mut command = None;

    let mut i = 0;
    while i < argv.len() {
        match argv[i].as_str() {
            "-c" | "--config" => {
                config_path = Some(
                    argv.get(i + 1)
                        .ok_or_else(|| anyhow::anyhow!("missing argument for --config"))?
                        .clone(),
                );
                i += 2;
            }
            "-p" | "--port" => {
                port = Some(
                    argv.get(i + 1)
                        .ok_or_else(|| anyhow::anyhow!("missing argument for --port"))?
                        .clone(),
                );
                i += 2;
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "scan" => {
                command = Some(Command::Scan);
                i += 1;
            }
            "dtc-read" => {
                command = Some(Command::DtcRead);
                i += 1;
            }
            "dtc-clear" => {
                command = Some(Command::DtcClear);
                i += 1;
            }
            "monitor" => {
                command = Some(Command::Monitor);
                i += 1;
            }
            "send" => {
                let hex = argv
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("missing hex bytes for send"))?
                    .clone();
                command = Some(Command::Send(hex));
                i += 2;
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(Args {
        config_path,
        port,
        command: command.unwrap_or(Command::Scan),
    })
}

fn print_help() {
    eprintln!(
        r#"motod - bike diagnostics driver

Usage: motod [OPTIONS] <COMMAND>

Commands:
  scan            Probe the bus and list compatible ECUs (default)
  dtc-read        Connect to the first ECU and print stored trouble codes
  dtc-clear       Connect to the first ECU and clear stored trouble codes
  monitor         Print every CAN frame received from the bridge
  send <hex>      Send one raw CAN frame, e.g. `motod send 023E00`

Options:
  -c, --config <path>  TOML config file (link settings, ECU profiles)
  -p, --port <name>    Serial port name, overrides discovery by USB VID
  -h, --help           Print this help
"#
    );
}

fn load_config(args: &Args) -> anyhow::Result<DriverConfig> {
    let mut config = match &args.config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => DriverConfig::default(),
    };
    if config.profiles.is_empty() {
        config.profiles = vec![EcuProfile::k01()];
    }
    if let Some(port) = &args.port {
        config.link.port = Some(port.clone());
    }
    Ok(config)
}

/// Parse a hex byte string like `023E00` into a tester-addressed frame.
fn parse_hex_frame(hex: &str) -> anyhow::Result<CanFrame> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        anyhow::bail!("hex string has an odd length: {hex}");
    }
    let data = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()?;
    CanFrame::new(TESTER_ID, &data).map_err(|e| anyhow::anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "motod=info,moto_link=info,moto_uds=info,moto_ecu=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;
    let config = load_config(&args)?;

    let root = CancellationToken::new();
    {
        let root = root.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                root.cancel();
            }
        });
    }

    let link = SerialLink::open(&config.link, &root).await?;
    let manager = EcuManager::new(
        link.clone(),
        config.profiles,
        Arc::new(EmptyDictionary),
        &root,
    );

    let result = run_command(&args.command, &link, &manager, &root).await;

    manager.shutdown().await;
    link.shutdown().await;
    result
}

async fn run_command(
    command: &Command,
    link: &Arc<SerialLink>,
    manager: &EcuManager,
    root: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Command::Scan => {
            let labels = manager.scan(root).await?;
            for label in labels {
                println!("{label}");
            }
        }
        Command::DtcRead => {
            connect_first(manager, root).await?;
            let dtcs = manager.read_dtcs(root).await?;
            if dtcs.is_empty() {
                println!("no errors stored");
            }
            for dtc in dtcs {
                println!("DTC: {dtc}");
            }
        }
        Command::DtcClear => {
            connect_first(manager, root).await?;
            manager.clear_dtcs(root).await?;
            println!("errors cleared");
        }
        Command::Monitor => {
            let mut frames = link.subscribe_frames();
            loop {
                tokio::select! {
                    _ = root.cancelled() => break,
                    frame = frames.recv() => match frame {
                        Some(frame) => println!("{frame}"),
                        None => break,
                    },
                }
            }
        }
        Command::Send(hex) => {
            let frame = parse_hex_frame(hex)?;
            link.send_frame(root, &frame).await?;
            println!("sent {frame}");
            // leave a moment for an answer to show up in the log
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
    Ok(())
}

async fn connect_first(manager: &EcuManager, root: &CancellationToken) -> anyhow::Result<()> {
    let labels = manager.scan(root).await?;
    let first = labels
        .first()
        .ok_or_else(|| anyhow::anyhow!("no compatible ECU found"))?;
    manager.connect(first).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_frames() {
        let frame = parse_hex_frame("023E00").unwrap();
        assert_eq!(frame.id(), TESTER_ID);
        assert_eq!(frame.data(), &[0x02, 0x3E, 0x00]);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(parse_hex_frame("02G").is_err());
        assert!(parse_hex_frame("0102030405060708AA").is_err());
    }

    #[test]
    fn config_defaults_to_the_k01_profile() {
        let args = Args {
            config_path: None,
            port: Some("/dev/ttyUSB0".to_string()),
            command: Command::Scan,
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].name, "K01");
        assert_eq!(config.link.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.link.baud_rate, 921_600);
    }

    #[test]
    fn config_parses_from_toml() {
        let toml_text = r#"
            [link]
            port = "/dev/ttyACM1"
            baud_rate = 921600

            [[profiles]]
            name = "K01"
            compatible_hardware_ids = ["613.41.031.300"]
            compatible_software_ids = ["KM2A0EU17H0631"]
            compatible_models = ["FE/FS 701"]
        "#;
        let config: DriverConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.link.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(config.profiles[0].read_errors_service, 0x03);
        assert_eq!(config.profiles[0].ident_subfunctions.model, 0x08);
    }
}
