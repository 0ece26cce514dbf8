use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use rover_fc::FcConfig;
use rover_gateway::{Gateway, GatewayConfig};
use rover_sim::{DifferentialDriveModel, SimConfig, SimulatorError};

#[derive(Debug, Parser)]
#[command(name = "rover-bridge", version, about = "Rover control bridge: client socket, autopilot link, physics workers")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and exit.
    Doctor,
    /// Run the bridge: simulator workers plus the client gateway.
    Run,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    fc: FcConfig,
    #[serde(default)]
    gateway: GatewayConfig,
    sim: Option<SimConfig>,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(cfg).await?,
    }
    Ok(())
}

fn check_pwm(name: &str, value: u16) -> Result<()> {
    ensure!(
        (1000..=2000).contains(&value),
        "{name}={value} outside the 1000..=2000 pulse range"
    );
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    ensure!(!cfg.fc.endpoint.is_empty(), "fc.endpoint empty");
    ensure!(cfg.fc.heartbeat_timeout_s > 0, "fc.heartbeat_timeout_s must be positive");

    cfg.gateway
        .listen
        .parse::<std::net::SocketAddr>()
        .with_context(|| format!("gateway.listen invalid: {}", cfg.gateway.listen))?;
    ensure!(cfg.gateway.poll_interval_ms > 0, "gateway.poll_interval_ms must be positive");

    let t = &cfg.gateway.tuning;
    check_pwm("tuning.forward_pwm", t.forward_pwm)?;
    check_pwm("tuning.backward_pwm", t.backward_pwm)?;
    check_pwm("tuning.left_pwm", t.left_pwm)?;
    check_pwm("tuning.right_pwm", t.right_pwm)?;
    ensure!(t.forward_pwm > 1500, "tuning.forward_pwm must be above neutral");
    ensure!(t.backward_pwm < 1500, "tuning.backward_pwm must be below neutral");

    if let Some(sim) = &cfg.sim {
        ensure!(sim.instances > 0, "sim.instances must be positive");
        ensure!(sim.base_port > 0, "sim.base_port must be nonzero");
        let last = sim.base_port as u32 + 10 * (sim.instances as u32 - 1) + 1;
        ensure!(last <= u16::MAX as u32, "sim physics ports overflow u16");
        ensure!(sim.model.timestep_ms > 0, "sim.model.timestep_ms must be positive");
        ensure!(
            sim.model.range_min_m < sim.model.range_max_m,
            "sim.model range bounds inverted"
        );
        ensure!(sim.model.max_wheel_velocity > 0.0, "sim.model.max_wheel_velocity must be positive");
    }

    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: Config) -> Result<()> {
    info!("run: starting");

    if let Some(sim) = cfg.sim {
        for instance in 0..sim.instances {
            let cfg = sim.clone();
            let vehicle = Box::new(DifferentialDriveModel::new(sim.model.clone()));
            tokio::spawn(async move {
                match rover_sim::run_instance(&cfg, instance, vehicle).await {
                    Ok(()) => info!(instance, "simulator worker finished"),
                    Err(SimulatorError::Disconnected) => {
                        info!(instance, "simulator worker stopped: vehicle gone")
                    }
                    Err(e) => warn!(instance, "simulator worker failed: {e}"),
                }
            });
        }
    }

    let gateway = Gateway::new(cfg.gateway, cfg.fc);
    tokio::select! {
        r = gateway.serve() => r,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    }
}
