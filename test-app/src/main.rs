// labwire test application -- CLI tool for exercising every instrument
// adapter against real hardware or a scripted mock.
//
// Usage:
//   labwire-test-app --port /dev/ttyUSB0 refmeter version
//   labwire-test-app --mock refmeter measure
//   labwire-test-app --config bench.toml source loadpoint --voltage 230 --current 5
//   labwire-test-app --mock zif activate 2
//   labwire-test-app --endpoint 192.168.1.40:14207 errcalc probe
//   labwire-test-app --endpoint http://192.168.1.41 http-version
//   labwire-test-app --port /dev/ttyACM0 barcode --duration 30
//
// Config file (every table optional, keys as in DeviceOptions):
//   [refmeter]
//   devicePath = "/dev/ttyUSB0"
//   readTimeoutMs = 2000
//
//   [errcalc]
//   endpoint = "192.168.1.40:14207"

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use labwire::probe::{BarcodeReader, ErrorCalculator, HttpVersionProbe};
use labwire::refmeter::{RefMeter, RefMeterBuilder, models as refmeter_models};
use labwire::source::{SourceBuilder, SourceDevice};
use labwire::zif::frame::{self, Frame};
use labwire::zif::{ZifBuilder, ZifController};
use labwire::{DeviceOptions, Loadpoint, PhaseOutput, ReferenceMeter, Source, ZifSocket};
use labwire_test_harness::{MockTcpServer, MockTransport, ScriptedReply};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// labwire test application -- exercises instrument adapters from the
/// command line.
#[derive(Parser)]
#[command(name = "labwire-test-app", version, about)]
struct Cli {
    /// TOML file with one options table per device
    /// ([refmeter], [source], [zif], [errcalc], [http], [barcode]).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port path (e.g. /dev/ttyUSB0, COM3). Overrides devicePath.
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate. Overrides baudRate.
    #[arg(long)]
    baud: Option<u32>,

    /// Network endpoint: host:port for errcalc, an http:// URL for
    /// http-version. Overrides endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Reply timeout in milliseconds. Overrides readTimeoutMs and
    /// recvTimeoutMs.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Run against a scripted mock device instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Log filter used when RUST_LOG is not set (e.g. debug,
    /// labwire_text_io=trace).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reference meter operations.
    Refmeter {
        #[command(subcommand)]
        action: RefMeterAction,
    },

    /// Programmable source operations.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// ZIF socket controller operations.
    Zif {
        #[command(subcommand)]
        action: ZifAction,
    },

    /// Error calculator firmware queries over TCP.
    Errcalc {
        /// Name reported in logs.
        #[arg(long, default_value = "errcalc")]
        name: String,

        #[command(subcommand)]
        action: ErrCalcAction,
    },

    /// Read model and version from an instrument's HTTP service.
    HttpVersion,

    /// Print barcode scans as they arrive.
    Barcode {
        /// Stop after this many seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },
}

#[derive(Subcommand)]
enum RefMeterAction {
    /// Print model and firmware version.
    Version,
    /// Take one measurement and print it as JSON.
    Measure,
    /// List the measurement modes the meter supports.
    Modes,
    /// Select a measurement mode by device code (e.g. 4LW, 3LBE, MQBase).
    SetMode { code: String },
}

#[derive(Subcommand)]
enum SourceAction {
    /// Print model and firmware version.
    Version,
    /// Print the output limits of the connected model.
    Capabilities,
    /// Program a symmetric loadpoint (0/120/240 degrees).
    Loadpoint {
        #[arg(long, default_value_t = 50.0)]
        frequency: f64,
        /// RMS voltage per phase in volts.
        #[arg(long, default_value_t = 230.0)]
        voltage: f64,
        /// RMS current per phase in amperes.
        #[arg(long, default_value_t = 1.0)]
        current: f64,
        /// Number of phases to switch on.
        #[arg(long, default_value_t = 3)]
        phases: usize,
    },
    /// Switch every output off.
    Off,
}

#[derive(Subcommand)]
enum ZifAction {
    /// Print the controller firmware version.
    Version,
    /// Print the controller serial number.
    Serial,
    /// Switch a socket on (or off with --off).
    Activate {
        socket: u8,
        #[arg(long)]
        off: bool,
    },
    /// Check whether the controller answers.
    Probe,
}

#[derive(Subcommand)]
enum ErrCalcAction {
    /// Print model and firmware version.
    Version,
    /// Check whether the calculator answers.
    Probe,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-device options loaded from `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    refmeter: Option<DeviceOptions>,
    source: Option<DeviceOptions>,
    zif: Option<DeviceOptions>,
    errcalc: Option<DeviceOptions>,
    http: Option<DeviceOptions>,
    barcode: Option<DeviceOptions>,
}

impl Config {
    fn section(&self, command: &Command) -> Option<&DeviceOptions> {
        match command {
            Command::Refmeter { .. } => self.refmeter.as_ref(),
            Command::Source { .. } => self.source.as_ref(),
            Command::Zif { .. } => self.zif.as_ref(),
            Command::Errcalc { .. } => self.errcalc.as_ref(),
            Command::HttpVersion => self.http.as_ref(),
            Command::Barcode { .. } => self.barcode.as_ref(),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
}

/// Options for the selected device: the config table, then CLI overrides.
fn device_options(cli: &Cli, config: &Config) -> DeviceOptions {
    let mut options = config.section(&cli.command).cloned().unwrap_or_default();
    if let Some(port) = &cli.port {
        options.device_path = Some(port.clone());
    }
    if let Some(baud) = cli.baud {
        options.baud_rate = baud;
    }
    if let Some(endpoint) = &cli.endpoint {
        options.endpoint = Some(endpoint.clone());
    }
    if let Some(ms) = cli.timeout_ms {
        options.read_timeout_ms = ms;
        options.recv_timeout_ms = ms;
    }
    options
}

// ---------------------------------------------------------------------------
// Mock devices
// ---------------------------------------------------------------------------

fn mock_refmeter(action: &RefMeterAction) -> MockTransport {
    let mut mock = MockTransport::new();
    match action {
        RefMeterAction::Version => mock.expect(b"AAV\r", b"MT786V06.27\rAAVACK\r"),
        RefMeterAction::Measure => mock.expect(
            b"AME\r",
            b"0;230.02\r1;229.97\r2;230.05\r3;5.001\r4;4.998\r5;5.003\r\
              6;0.00\r7;120.01\r8;239.98\r9;0.12\r10;120.09\r11;240.15\r\
              21;3450.2\r24;50.001\rAMEACK\r",
        ),
        RefMeterAction::Modes => mock.expect(b"MI\r", b"MI2LW;3LW;3LBE;4LW;4LB;MQBase;\r"),
        RefMeterAction::SetMode { .. } => mock.reply(ScriptedReply::new(b"OKMA\r")),
    }
    mock
}

fn mock_source(action: &SourceAction) -> MockTransport {
    let mut mock = MockTransport::new();
    match action {
        SourceAction::Version | SourceAction::Capabilities => {
            mock.expect(b"AAV\r", b"MT786V06.27\rAAVACK\r");
        }
        SourceAction::Loadpoint { .. } => {
            mock.expect(b"AAV\r", b"MT786V06.27\rAAVACK\r");
            for ack in ["SOKFR", "SOKUP", "SOKIP", "SOKUI"] {
                mock.reply(ScriptedReply::new(format!("{ack}\r")));
            }
        }
        SourceAction::Off => mock.expect(b"SUIAAAAAA\r", b"SOKUI\r"),
    }
    mock
}

fn mock_zif(action: &ZifAction) -> MockTransport {
    let mut mock = MockTransport::new();
    match action {
        ZifAction::Version | ZifAction::Probe => {
            mock.expect(&Frame::version().encode(), &[frame::ACK, 0x0A, 0, 0, 0, 0x01]);
        }
        ZifAction::Serial => {
            let data = 20_240_117u32.to_le_bytes();
            let mut reply = vec![frame::ACK];
            reply.extend_from_slice(&data);
            reply.push(frame::checksum(frame::OP_SERIAL_NUMBER, &data));
            mock.expect(&Frame::serial_number().encode(), &reply);
        }
        ZifAction::Activate { socket, off } => {
            mock.expect(&Frame::set_active(*socket, !off).encode(), &[frame::ACK]);
        }
    }
    mock
}

async fn mock_errcalc() -> Result<MockTcpServer> {
    let mut server = MockTcpServer::new().await?;
    server.expect(b"AAV\r", b"EPZ303V2.11\rAAVACK\r");
    server.start();
    Ok(server)
}

async fn mock_http() -> Result<MockTcpServer> {
    let body = r#"{"ModelName":"EPZ303","Version":"2.11"}"#;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    let mut server = MockTcpServer::new().await?;
    server.respond_after(b"\r\n\r\n", response.as_bytes());
    server.start();
    Ok(server)
}

fn mock_barcode() -> MockTransport {
    let mut mock = MockTransport::new();
    for code in ["4006381333931", "DUT-000417", "4006381333948"] {
        mock.push_incoming(ScriptedReply::delayed(
            format!("{code}\r\n"),
            Duration::from_millis(750),
        ));
    }
    mock
}

// ---------------------------------------------------------------------------
// Device construction
// ---------------------------------------------------------------------------

async fn create_refmeter(cli: &Cli, options: &DeviceOptions, action: &RefMeterAction) -> Result<RefMeter> {
    let builder = RefMeterBuilder::from_options(options);
    if cli.mock {
        println!("Connected (mock transport) -- reference meter");
        return Ok(builder.build_with_transport(Box::new(mock_refmeter(action))));
    }
    let meter = builder
        .build()
        .await
        .context("failed to open reference meter (set --port or devicePath)")?;
    Ok(meter)
}

async fn create_source(cli: &Cli, options: &DeviceOptions, action: &SourceAction) -> Result<SourceDevice> {
    let builder = SourceBuilder::from_options(options);
    if cli.mock {
        println!("Connected (mock transport) -- source");
        return Ok(builder.build_with_transport(Box::new(mock_source(action))));
    }
    let source = builder
        .build()
        .await
        .context("failed to open source (set --port or devicePath)")?;
    Ok(source)
}

async fn create_zif(cli: &Cli, options: &DeviceOptions, action: &ZifAction) -> Result<ZifController> {
    let builder = ZifBuilder::from_options(options);
    if cli.mock {
        println!("Connected (mock transport) -- ZIF controller");
        return Ok(builder.build_with_transport(Box::new(mock_zif(action))));
    }
    let controller = builder
        .build()
        .await
        .context("failed to open ZIF controller (set --port or devicePath)")?;
    Ok(controller)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_refmeter(meter: &RefMeter, action: &RefMeterAction) -> Result<()> {
    match action {
        RefMeterAction::Version => {
            let version = meter.version().await?;
            println!("Model:    {}", version.model_name);
            println!("Version:  {}", version.version);
        }
        RefMeterAction::Measure => {
            let values = meter.measure().await?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        RefMeterAction::Modes => {
            let modes = meter.supported_measurement_modes().await?;
            for mode in modes {
                let code = refmeter_models::code_for_mode(mode).unwrap_or("?");
                println!("{code:<8} {mode}");
            }
        }
        RefMeterAction::SetMode { code } => {
            let mode = refmeter_models::mode_from_code(code).with_context(|| {
                format!(
                    "unknown measurement mode code {code:?} (known: {})",
                    known_mode_codes()
                )
            })?;
            meter.set_actual_measurement_mode(mode).await?;
            println!("Measurement mode set to {mode}");
        }
    }
    Ok(())
}

fn known_mode_codes() -> String {
    refmeter_models::known_modes()
        .filter_map(refmeter_models::code_for_mode)
        .collect::<Vec<_>>()
        .join(", ")
}

fn symmetric_loadpoint(frequency: f64, voltage: f64, current: f64, phases: usize) -> Loadpoint {
    let mut loadpoint = Loadpoint {
        frequency,
        ..Loadpoint::default()
    };
    for phase in 0..phases.min(3) {
        let angle = 120.0 * phase as f64;
        loadpoint.voltages[phase] = PhaseOutput::on(voltage, angle);
        loadpoint.currents[phase] = PhaseOutput::on(current, angle);
    }
    loadpoint
}

async fn cmd_source(source: &SourceDevice, action: &SourceAction) -> Result<()> {
    match action {
        SourceAction::Version => {
            let version = source.version().await?;
            println!("Model:    {}", version.model_name);
            println!("Version:  {}", version.version);
        }
        SourceAction::Capabilities => {
            let caps = source.capabilities().await?;
            println!("{}", serde_json::to_string_pretty(&caps)?);
        }
        SourceAction::Loadpoint {
            frequency,
            voltage,
            current,
            phases,
        } => {
            if *phases == 0 || *phases > 3 {
                bail!("--phases must be between 1 and 3");
            }
            let loadpoint = symmetric_loadpoint(*frequency, *voltage, *current, *phases);
            source.set_loadpoint(&loadpoint).await?;
            println!(
                "Loadpoint set: {frequency} Hz, {voltage} V, {current} A on {phases} phase(s)"
            );
        }
        SourceAction::Off => {
            source.turn_off().await?;
            println!("All outputs off");
        }
    }
    Ok(())
}

async fn cmd_zif(controller: &ZifController, action: &ZifAction) -> Result<()> {
    match action {
        ZifAction::Version => println!("Version:  {}", controller.version().await?),
        ZifAction::Serial => println!("Serial:   {}", controller.serial_number().await?),
        ZifAction::Activate { socket, off } => {
            controller.set_active(*socket, !off).await?;
            let state = if *off { "off" } else { "on" };
            println!("Socket {socket} switched {state}");
        }
        ZifAction::Probe => print_probe(&controller.probe().await)?,
    }
    Ok(())
}

async fn cmd_errcalc(cli: &Cli, options: &DeviceOptions, name: &str, action: &ErrCalcAction) -> Result<()> {
    let mut options = options.clone();
    let _server = if cli.mock {
        let server = mock_errcalc().await?;
        options.endpoint = Some(server.addr().to_string());
        println!("Connected (mock server) -- error calculator");
        Some(server)
    } else {
        None
    };

    let mut calc = ErrorCalculator::new();
    calc.initialize_from_options(name, &options)
        .await
        .context("failed to connect to error calculator (set --endpoint or endpoint)")?;

    let result = match action {
        ErrCalcAction::Version => calc.get_version().await.map(|version| {
            println!("Model:    {}", version.model_name);
            println!("Version:  {}", version.version);
        }),
        ErrCalcAction::Probe => {
            let probe = calc.probe().await;
            calc.shutdown().await.ok();
            return print_probe(&probe);
        }
    };
    calc.shutdown().await.ok();
    result?;
    Ok(())
}

async fn cmd_http_version(cli: &Cli, options: &DeviceOptions) -> Result<()> {
    let mut options = options.clone();
    let _server = if cli.mock {
        let server = mock_http().await?;
        options.endpoint = Some(format!("http://{}", server.addr()));
        Some(server)
    } else {
        None
    };

    let version = HttpVersionProbe::from_options(&options).get_version().await?;
    println!("Model:    {}", version.model_name);
    println!("Version:  {}", version.version);
    Ok(())
}

async fn cmd_barcode(cli: &Cli, options: &DeviceOptions, duration_secs: u64) -> Result<()> {
    let reader = if cli.mock {
        println!("Connected (mock transport) -- barcode reader");
        BarcodeReader::spawn(Box::new(mock_barcode()))
    } else {
        BarcodeReader::open(options)
            .await
            .context("failed to open barcode reader (set --port or devicePath)")?
    };
    let mut events = reader.subscribe();

    println!("Waiting for scans (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Scan duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Ok(labwire::DeviceEvent::BarcodeScanned { code })) => println!("[scan] {code}"),
            Ok(Ok(event)) => println!("[event] {event:?}"),
            Ok(Err(RecvError::Lagged(n))) => {
                println!("[warning] missed {n} scans (consumer too slow)");
            }
            Ok(Err(RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => {}
        }
    }

    reader.shutdown().await.ok();
    Ok(())
}

fn print_probe(probe: &labwire::ProbeResult) -> Result<()> {
    if probe.successful {
        println!("Available: {}", probe.detail);
        Ok(())
    } else {
        bail!("device not available: {}", probe.detail)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = load_config(cli.config.as_deref())?;
    let options = device_options(&cli, &config);
    tracing::debug!(?options, mock = cli.mock, "device options");

    match &cli.command {
        Command::Refmeter { action } => {
            let meter = create_refmeter(&cli, &options, action).await?;
            let result = cmd_refmeter(&meter, action).await;
            meter.shutdown().await.ok();
            result
        }
        Command::Source { action } => {
            let source = create_source(&cli, &options, action).await?;
            let result = cmd_source(&source, action).await;
            source.shutdown().await.ok();
            result
        }
        Command::Zif { action } => {
            let controller = create_zif(&cli, &options, action).await?;
            let result = cmd_zif(&controller, action).await;
            controller.shutdown().await.ok();
            result
        }
        Command::Errcalc { name, action } => cmd_errcalc(&cli, &options, name, action).await,
        Command::HttpVersion => cmd_http_version(&cli, &options).await,
        Command::Barcode { duration } => cmd_barcode(&cli, &options, *duration).await,
    }
}
