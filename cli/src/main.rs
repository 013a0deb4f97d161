use anyhow::Context;
use clap::Parser;
use serialdisk_core::{Handshake, Parity, SerialPortSettings, Settings, StopBits, TosVersion, BYTES_PER_MIB};
use serialdisk_daemon::{Listener, ProtocolEngine};
use serialdisk_filesystems::{Disk, DirectoryWatcher};
use serialport::{DataBits, FlowControl, SerialPort};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "serialdisk")]
#[command(about = "Serve a local directory as a FAT16 disk over a serial port", long_about = None)]
struct Cli {
    /// Local directory to serve
    local_directory: Option<PathBuf>,

    /// JSON settings file; command line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port (COM1, /dev/ttyUSB0, ...)
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud_rate: Option<u32>,

    /// Virtual disk size in MiB
    #[arg(short = 's', long)]
    disk_size: Option<u32>,

    /// Oldest TOS version that must read the disk (1.00 or 1.04)
    #[arg(short, long)]
    tos: Option<TosVersion>,

    #[arg(long)]
    root_directory_sectors: Option<u32>,

    /// LZ4 compress data sent to the remote
    #[arg(long)]
    compress: bool,

    /// -v for debug, -vv for trace output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    print_settings: bool,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_json_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };

        if let Some(directory) = &self.local_directory {
            settings.local_directory = directory.clone();
        }
        if let Some(port) = &self.port {
            settings.serial.port_name = port.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            settings.serial.baud_rate = baud_rate;
        }
        if let Some(disk_size) = self.disk_size {
            settings.disk.disk_size_mib = disk_size;
        }
        if let Some(tos) = self.tos {
            settings.disk.tos_compatibility = tos;
        }
        if let Some(sectors) = self.root_directory_sectors {
            settings.disk.root_directory_sectors = sectors;
        }
        settings.compression |= self.compress;
        settings.verbosity = settings.verbosity.max(self.verbose);

        Ok(settings)
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_port(settings: &SerialPortSettings) -> anyhow::Result<Box<dyn SerialPort>> {
    let data_bits = match settings.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    };
    let stop_bits = match settings.stop_bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    };
    let parity = match settings.parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    };
    let flow_control = match settings.handshake {
        Handshake::None => FlowControl::None,
        Handshake::XonXoff => FlowControl::Software,
        Handshake::Rts => FlowControl::Hardware,
    };

    let mut port = serialport::new(&settings.port_name, settings.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .timeout(Duration::from_millis(settings.timeout_ms))
        .open()
        .with_context(|| format!("Failed to open serial port {}", settings.port_name))?;

    if settings.handshake.uses_rts() {
        port.write_request_to_send(true)?;
        port.write_data_terminal_ready(true)?;
    }

    info!(
        "Opened {} at {} baud, {:?} data bits, {:?} parity, {:?} stop bits",
        settings.port_name, settings.baud_rate, data_bits, parity, stop_bits
    );
    Ok(port)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    if cli.print_settings {
        println!("{}", settings.to_json_string()?);
        return Ok(());
    }

    init_logging(settings.verbosity);
    settings.validate()?;

    let disk = Disk::new(&settings.disk, &settings.local_directory)
        .with_context(|| format!("Failed to build the virtual disk for {}", settings.local_directory.display()))?;

    let geometry = disk.geometry();
    info!(
        "Serving {} as a {}MiB disk ({}), {} entries, {} bytes used",
        disk.local_directory().display(),
        geometry.disk_size_bytes / BYTES_PER_MIB,
        geometry.tos_compatibility,
        disk.tracked_entries(),
        disk.local_directory_size()?
    );

    let _watcher = match DirectoryWatcher::start(disk.local_directory(), disk.monitor()) {
        Ok(watcher) => {
            info!("Watching {} for local changes", watcher.path().display());
            Some(watcher)
        }
        Err(e) => {
            warn!("Local changes will not be picked up: {}", e);
            None
        }
    };

    let port = open_port(&settings.serial)?;
    let mut listener = Listener::new(port, ProtocolEngine::new(disk, settings.compression));
    let stop = listener.stop_handle();
    let mut task = tokio::task::spawn_blocking(move || listener.run());

    tokio::select! {
        result = &mut task => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("Stopping");
            stop.stop();
            task.await??;
        }
    }

    Ok(())
}
