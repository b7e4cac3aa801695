use std::{
    error::Error,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        mpsc::{self, RecvTimeoutError, Sender},
    },
    time::Duration,
};

use clap::Parser;
use log::{info, warn};
use segwire::{
    ClientConfig, ClientConnection, NodeUri, ReplyProcessor, TcpClientConnection,
    connection::ProcessingError,
    protocol::{Hello, KeepAlive, Reply},
};

#[derive(Debug, Parser)]
#[command(version, about = "Connects to a segment store node and logs its replies", long_about = None)]
struct Cli {
    /// Segment store node, as host:port
    node: NodeUri,
    /// Seconds to keep listening for replies
    #[arg(long, default_value_t = 5)]
    wait: u64,
    /// Send a KeepAlive after the Hello
    #[arg(long)]
    keep_alive: bool,
    /// Connect over TLS
    #[arg(long)]
    tls: bool,
    /// PEM file with certificates to trust instead of the platform store
    #[arg(long)]
    trust_store: Option<PathBuf>,
    /// Accept a certificate issued for any host name
    #[arg(long)]
    no_validate_host_name: bool,
}

enum Signal {
    Dropped,
    Interrupted,
}

/// Logs every reply and reports when the connection goes away.
struct Probe {
    events: Mutex<Sender<Signal>>,
}

impl ReplyProcessor for Probe {
    fn process(&self, reply: Reply) -> Result<(), ProcessingError> {
        info!("received {reply:?}");
        if let Reply::Hello(hello) = reply {
            if hello.low_version > Hello::default().high_version {
                return Err(format!("node requires wire version {}", hello.low_version).into());
            }
        }
        Ok(())
    }

    fn processing_failure(&self, error: ProcessingError) {
        warn!("failed to process reply: {error}");
    }

    fn connection_dropped(&self) {
        if let Ok(events) = self.events.lock() {
            let _ = events.send(Signal::Dropped);
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::default()
        .with_tls(cli.tls)
        .with_host_name_validation(!cli.no_validate_host_name);
    if let Some(path) = cli.trust_store {
        config = config.with_trust_store(path);
    }

    let (tx, rx) = mpsc::channel();
    let interrupt = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(Signal::Interrupted);
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let probe = Arc::new(Probe {
        events: Mutex::new(tx),
    });
    let connection = runtime.block_on(TcpClientConnection::connect(
        cli.node,
        config,
        probe,
        runtime.handle(),
    ))?;

    connection.send(&Hello::default().into())?;
    if cli.keep_alive {
        connection.send(&KeepAlive.into())?;
    }

    match rx.recv_timeout(Duration::from_secs(cli.wait)) {
        Ok(Signal::Dropped) => warn!("{connection} dropped by the node"),
        Ok(Signal::Interrupted) => info!("interrupted"),
        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
    }

    connection.close();
    info!("{connection}");
    Ok(())
}
