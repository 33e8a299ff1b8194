use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pinwire::arduino_cli::ArduinoCli;
use pinwire::client::HostClient;
use pinwire::codegen::CodegenOptions;
use pinwire::model::Model;
use pinwire::pipeline;
use pinwire::profile::{Profile, ProfileStore};
use pinwire::transport::{Transport, TransportConfig};
use pinwire::upload::{compile_and_upload, BoardCatalog, PortEnumerator, SerialPorts, Target};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pinwire",
    version,
    about = "Pin model compiler — generates serial-controlled microcontroller firmware and talks to it"
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Log each stage and serial exchange to stderr
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the communication map of a graph
    Map {
        /// Graph file (JSON array of operations)
        graph: PathBuf,
        /// Print the map as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate firmware source
    Gen {
        graph: PathBuf,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Requested polling cadence in milliseconds
        #[arg(long, default_value_t = 10)]
        cadence_ms: u32,
    },
    /// Print build provenance (map fingerprint, generator version) as JSON
    BuildInfo {
        graph: PathBuf,
        #[arg(long, default_value_t = 10)]
        cadence_ms: u32,
    },
    /// Compile and flash firmware with arduino-cli
    #[command(group(
        clap::ArgGroup::new("target")
            .required(true)
            .args(["fqbn", "board"]),
    ))]
    Upload {
        graph: PathBuf,
        #[arg(long)]
        port: String,
        /// Fully qualified board name, e.g. arduino:avr:uno
        #[arg(long)]
        fqbn: Option<String>,
        /// Board name as `pinwire boards` lists it, e.g. "Arduino Uno"
        #[arg(long)]
        board: Option<String>,
        #[arg(long, default_value_t = 10)]
        cadence_ms: u32,
        /// arduino-cli executable
        #[arg(long, default_value = "arduino-cli")]
        cli: PathBuf,
        /// arduino-cli configuration file
        #[arg(long)]
        config_file: Option<PathBuf>,
    },
    /// Set a variable on a flashed device
    Set {
        /// Graph the device was flashed from
        graph: PathBuf,
        #[arg(long)]
        port: String,
        name: String,
        /// HIGH, LOW, or a number
        value: String,
        /// Reply timeout in milliseconds
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
    /// Read a variable from a flashed device
    Get {
        graph: PathBuf,
        #[arg(long)]
        port: String,
        name: String,
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
    /// List serial ports
    Ports,
    /// List boards known to arduino-cli
    Boards {
        #[arg(long, default_value = "arduino-cli")]
        cli: PathBuf,
        #[arg(long)]
        config_file: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Cmd::Map { graph, json } => {
            let model = load_model(&graph);
            let map = pinwire::comm_map::CommMap::build(&model);
            if json {
                match serde_json::to_string_pretty(&map) {
                    Ok(text) => println!("{}", text),
                    Err(e) => fail(1, e),
                }
            } else {
                println!("{}", map.describe().trim_end());
            }
        }

        Cmd::Gen {
            graph,
            output,
            cadence_ms,
        } => {
            let model = load_model(&graph);
            let compiled = pipeline::compile(&model, &CodegenOptions { cadence_ms });
            match output {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, &compiled.firmware.source) {
                        fail(1, format_args!("{}: {}", path.display(), e));
                    }
                    tracing::info!(path = %path.display(), "firmware written");
                }
                None => print!("{}", compiled.firmware.source),
            }
        }

        Cmd::BuildInfo { graph, cadence_ms } => {
            let model = load_model(&graph);
            let compiled = pipeline::compile(&model, &CodegenOptions { cadence_ms });
            print!("{}", compiled.provenance.to_json());
        }

        Cmd::Upload {
            graph,
            port,
            fqbn,
            board,
            cadence_ms,
            cli,
            config_file,
        } => {
            let model = load_model(&graph);
            let store = ProfileStore::new();
            let tool = ArduinoCli {
                cli_path: cli,
                config_file,
            };
            let fqbn = match (fqbn, board) {
                (Some(fqbn), _) => fqbn,
                (None, Some(name)) => match tool.fqbn_for(&name) {
                    Ok(fqbn) => {
                        tracing::debug!(board = %name, fqbn = %fqbn, "board resolved");
                        fqbn
                    }
                    Err(e) => fail(1, e),
                },
                (None, None) => fail(2, "one of --fqbn or --board is required"),
            };
            match compile_and_upload(
                &store,
                &tool,
                &Target::new(port, fqbn),
                &model,
                &CodegenOptions { cadence_ms },
            ) {
                Ok(report) => {
                    tracing::info!(
                        cadence_ms = report.provenance.cadence_ms,
                        fingerprint = %report.provenance.map_fingerprint,
                        "uploaded"
                    );
                    println!("{}", report.message);
                    println!("{}", report.profile.map.describe().trim_end());
                }
                Err(e) => fail(1, e),
            }
        }

        Cmd::Set {
            graph,
            port,
            name,
            value,
            timeout_ms,
        } => {
            let store = profile_store_for(&graph, &port);
            let client = serial_client(&store, timeout_ms);
            match client.set(&port, &name, &value) {
                Ok(ack) => println!("{}", ack),
                Err(e) => fail(1, e),
            }
        }

        Cmd::Get {
            graph,
            port,
            name,
            timeout_ms,
        } => {
            let store = profile_store_for(&graph, &port);
            let client = serial_client(&store, timeout_ms);
            match client.get(&port, &name) {
                Ok(value) => println!("{}", value),
                Err(e) => fail(1, e),
            }
        }

        Cmd::Ports => match SerialPorts.ports() {
            Ok(ports) if ports.is_empty() => println!("No serial ports found"),
            Ok(ports) => {
                for port in ports {
                    println!("{}", port);
                }
            }
            Err(e) => fail(1, e),
        },

        Cmd::Boards { cli, config_file } => {
            let tool = ArduinoCli {
                cli_path: cli,
                config_file,
            };
            match tool.boards() {
                Ok(boards) => {
                    let mut names: Vec<String> = boards.into_iter().map(|b| b.name).collect();
                    names.sort();
                    names.dedup();
                    for name in names {
                        println!("{}", name);
                    }
                }
                Err(e) => fail(1, e),
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// `RUST_LOG` when set, else `warn`; `--verbose` forces `debug`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(code: i32, msg: impl std::fmt::Display) -> ! {
    eprintln!("pinwire: error: {}", msg);
    std::process::exit(code);
}

fn load_model(path: &Path) -> Model {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => fail(2, format_args!("{}: {}", path.display(), e)),
    };
    match pinwire::model::model_from_json(&text) {
        Ok(model) => model,
        Err(e) => fail(2, format_args!("{}: {}", path.display(), e)),
    }
}

/// The map is a pure function of the model, so rebuilding it from the same
/// graph reproduces the profile the upload stored.
fn profile_store_for(graph: &Path, port: &str) -> ProfileStore {
    let model = load_model(graph);
    let compiled = pipeline::compile(&model, &CodegenOptions::default());
    let store = ProfileStore::new();
    store.insert(Profile {
        port: port.to_string(),
        board: String::new(),
        map: compiled.map,
        map_fingerprint: compiled.provenance.map_fingerprint,
    });
    store
}

fn serial_client(store: &ProfileStore, timeout_ms: u64) -> HostClient<'_> {
    let config = TransportConfig {
        timeout: Duration::from_millis(timeout_ms),
        ..TransportConfig::default()
    };
    HostClient::with_transport(store, Transport::serial(config))
}
