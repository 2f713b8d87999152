// messenger: send or receive messages against a service over TCP.

mod config;
mod driver;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use messenger_core::{Body, Message, Messenger, ServiceAddress, SslOptions, Status};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::driver::Driver;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Service URL; overrides the config file and MESSENGER_SERVICE
    #[arg(long)]
    service: Option<String>,

    /// Client id; empty lets the session pick one
    #[arg(long)]
    client_id: Option<String>,

    #[arg(long, env = "MESSENGER_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "MESSENGER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// PEM file of trusted certificates
    #[arg(long)]
    trust_certificate: Option<PathBuf>,

    /// Give up after this many seconds without completing
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one text message per argument to ADDRESS
    Send {
        address: String,
        #[arg(required = true)]
        texts: Vec<String>,
        /// 0 = at most once, 1 = at least once
        #[arg(long, default_value_t = 1)]
        qos: i32,
        /// Message time-to-live in milliseconds; 0 never expires
        #[arg(long, default_value_t = 0)]
        ttl: i64,
    },
    /// Subscribe to ADDRESS and print messages as they arrive
    Recv {
        address: String,
        #[arg(long, default_value_t = 1)]
        qos: i32,
        /// Seconds the subscription outlives its link
        #[arg(long, default_value_t = 0)]
        ttl: u32,
        /// Messages to request per flow
        #[arg(long, default_value_t = 10)]
        credit: i64,
        /// Stop after this many messages
        #[arg(long)]
        count: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut cfg = config::load();
    merge(&mut cfg, &args);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let deadline = Duration::from_secs(args.timeout_secs);
        tokio::select! {
            r = tokio::time::timeout(deadline, run(&cfg, args.command)) => {
                r.context("timed out")?
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                Ok(())
            }
        }
    })
}

fn merge(cfg: &mut Config, args: &Args) {
    if let Some(s) = &args.service {
        cfg.service = s.clone();
    }
    if let Some(s) = &args.client_id {
        cfg.client_id = s.clone();
    }
    if let Some(s) = &args.username {
        cfg.username = s.clone();
    }
    if let Some(s) = &args.password {
        cfg.password = s.clone();
    }
    if let Some(p) = &args.trust_certificate {
        cfg.trust_certificate = Some(p.clone());
    }
}

/// `host:port` to dial for `service`.
fn dial_addr(service: &str) -> Result<String> {
    let address = ServiceAddress::parse(service)?;
    if address.is_tls() {
        bail!("amqps services need a TLS tunnel; this client speaks plain TCP only");
    }
    Ok(format!("{}:{}", address.host(), address.port().unwrap_or(5672)))
}

async fn open(cfg: &Config) -> Result<Driver> {
    let addr = dial_addr(&cfg.service)?;
    let mut messenger = Messenger::new(&cfg.client_id, &cfg.username, &cfg.password);
    let ssl = SslOptions {
        trust_certificate: cfg.trust_certificate.clone(),
        verify_peer_name: false,
    };
    messenger.connect(&cfg.service, &ssl)?;
    let mut driver = Driver::connect(messenger, &addr, cfg.heartbeat()).await?;
    driver.until(|m| m.started()).await?;
    tracing::info!(service = %cfg.service, "started");
    Ok(driver)
}

/// Address as the messenger sees it: relative names live on the service.
fn qualify(service: &str, address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("{}/{}", service.trim_end_matches('/'), address.trim_start_matches('/'))
    }
}

async fn run(cfg: &Config, command: Command) -> Result<()> {
    let mut driver = open(cfg).await?;
    match command {
        Command::Send {
            address,
            texts,
            qos,
            ttl,
        } => {
            let address = qualify(&cfg.service, &address);
            let mut sent = Vec::with_capacity(texts.len());
            for text in texts {
                let mut message = Message::new(address.as_str(), Body::Text(text));
                message.set_ttl(ttl);
                driver.call(|m, _| m.put(&mut message, qos)).await?;
                sent.push(message);
            }
            driver.call(|m, out| m.send(out)).await?;
            if qos == 1 {
                for message in &sent {
                    driver
                        .until(|m| Ok(m.status(message)? != Status::Pending))
                        .await?;
                    let status = driver.call(|m, _| m.status(message)).await?;
                    if status == Status::Rejected {
                        let reason = driver.call(|m, _| m.status_error(message)).await?;
                        eprintln!("rejected: {}", reason);
                    }
                    driver.call(|m, out| m.settle(message, out)).await?;
                }
            } else {
                driver
                    .until(|m| Ok(!m.pending_outbound(&address)?))
                    .await?;
            }
            println!("sent {} message(s) to {}", sent.len(), address);
        }
        Command::Recv {
            address,
            qos,
            ttl,
            credit,
            count,
        } => {
            let address = qualify(&cfg.service, &address);
            driver
                .call(|m, out| m.subscribe(&address, qos, ttl, out))
                .await?;
            driver.until(|m| m.subscribed(&address)).await?;
            driver.call(|m, out| m.flow(&address, credit, out)).await?;
            let mut received = 0usize;
            let mut outstanding = credit;
            while count.map_or(true, |c| received < c) {
                let messages = driver.call(|m, out| m.receive(out)).await?;
                if messages.is_empty() {
                    driver.turn().await?;
                    continue;
                }
                for message in messages {
                    print(&message);
                    received += 1;
                    outstanding -= 1;
                    if qos == 1 {
                        driver.call(|m, _| m.accept(&message)).await?;
                        driver.call(|m, out| m.settle(&message, out)).await?;
                    }
                }
                if outstanding <= 0 {
                    driver.call(|m, out| m.flow(&address, credit, out)).await?;
                    outstanding = credit;
                }
            }
            driver
                .call(|m, out| m.unsubscribe(&address, None, out))
                .await?;
            driver.until(|m| m.unsubscribed(&address)).await?;
        }
    }
    driver.shutdown().await
}

fn print(message: &Message) {
    let from = message.link_address().unwrap_or(message.address());
    match message.body() {
        Body::Text(text) => println!("{}: {}", from, text),
        Body::Binary(bytes) => println!("{}: <{} bytes>", from, bytes.len()),
        Body::Empty => println!("{}: <empty>", from),
    }
}
