use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mantis_zenoh_runtime::chassis::FrictionCoeffs;
use mantis_zenoh_runtime::error::BoxError;
use mantis_zenoh_runtime::{Robot, RobotConfig};

/// Command-line access to a Mantis robot over zenoh
#[derive(Parser, Debug)]
#[clap(author, version, name = "mantis")]
struct CommandLineArguments {
    /// Robot IP; without it the zenoh router is found by scouting
    #[clap(long)]
    ip: Option<String>,
    /// Zenoh router port on the robot
    #[clap(long)]
    port: Option<u16>,
    /// JSON config file (every field optional)
    #[clap(long)]
    config: Option<PathBuf>,
    /// Do not wait for joint feedback when connecting
    #[clap(long, action)]
    no_verify: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print joint feedback as it arrives
    Echo {
        /// Stop after this many seconds
        #[clap(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Send every limb to its home position and wait
    Home,
    /// Drive forward (negative: backward) by a distance in meters
    Forward {
        #[clap(allow_hyphen_values = true)]
        meters: f64,
        /// Friction compensation for the linear axis
        #[clap(long)]
        friction: Option<f64>,
    },
    /// Turn counter-clockwise (negative: clockwise) by an angle in degrees
    Turn {
        #[clap(allow_hyphen_values = true)]
        degrees: f64,
        /// Friction compensation for the angular axis
        #[clap(long)]
        friction: Option<f64>,
    },
}

fn load_config(args: &CommandLineArguments) -> Result<RobotConfig, BoxError> {
    let mut config = match &args.config {
        Some(path) => RobotConfig::from_json_file(path)?,
        None => RobotConfig::default(),
    };
    if args.ip.is_some() {
        config.ip = args.ip.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.no_verify {
        config.verify = false;
    }
    Ok(config)
}

async fn run(args: CommandLineArguments) -> Result<(), BoxError> {
    let config = load_config(&args)?;
    let robot = Robot::new(config);
    robot.connect().await?;

    let result = execute(&robot, args.command).await;
    robot.disconnect().await?;
    result
}

async fn execute(robot: &Robot, command: Command) -> Result<(), BoxError> {
    match command {
        Command::Echo { seconds } => {
            robot.on_feedback(|positions| {
                let mut joints: Vec<_> = positions.iter().collect();
                joints.sort_by(|a, b| a.0.cmp(b.0));
                println!("{:?}", joints);
                Ok(())
            });
            tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
        }
        Command::Home => {
            let report = robot.home_all(true).await?.into_result()?;
            info!("Home: {:?}", report.statuses());
        }
        Command::Forward { meters, friction } => {
            if let Some(linear) = friction {
                let current = robot.friction();
                robot.set_friction(FrictionCoeffs::new(linear, current.angular));
            }
            let status = if meters < 0.0 {
                robot.chassis().backward(meters, true).await?
            } else {
                robot.chassis().forward(meters, true).await?
            };
            info!("Chassis: {:?}", status);
        }
        Command::Turn { degrees, friction } => {
            if let Some(angular) = friction {
                let current = robot.friction();
                robot.set_friction(FrictionCoeffs::new(current.linear, angular));
            }
            let status = if degrees < 0.0 {
                robot.chassis().turn_right(degrees, true).await?
            } else {
                robot.chassis().turn_left(degrees, true).await?
            };
            info!("Chassis: {:?}", status);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = CommandLineArguments::parse();
    if let Err(e) = run(args).await {
        eprintln!("mantis error: {}", e);
        std::process::exit(1);
    }
}
