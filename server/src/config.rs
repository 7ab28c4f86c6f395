//! Command line arguments and the interactive port prompt

use crate::tagging::TagPolicy;
use clap::Parser;
use std::io::{self, BufRead, Write};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative server for the tag game", long_about = None)]
pub struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,

    /// TCP port to listen on; prompted for on stdin when omitted
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Map width in cells
    #[arg(long, default_value = "20")]
    pub map_width: usize,

    /// Map height in cells
    #[arg(long, default_value = "15")]
    pub map_height: usize,

    /// Chance for each interior cell to be an obstacle
    #[arg(long, default_value = "0.15")]
    pub obstacle_density: f64,

    /// Number of powerups placed at startup
    #[arg(long, default_value = "5")]
    pub powerups: usize,

    /// Frames (and broadcasts) per second
    #[arg(long, default_value = "60")]
    pub frame_rate: u32,

    /// Which admitted client becomes the tagger (0 disables)
    #[arg(long, default_value = "2")]
    pub tagger_slot: u32,

    /// What happens to the previous tagger after a tag
    #[arg(long, value_enum, default_value_t = TagPolicy::KeepPreviousTagger)]
    pub tag_policy: TagPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("map must be at least 3x3 cells, got {width}x{height}")]
    MapTooSmall { width: usize, height: usize },
    #[error("obstacle density must be in [0, 1), got {0}")]
    ObstacleDensity(f64),
    #[error("frame rate must be positive")]
    FrameRate,
    #[error("no port given before end of input")]
    NoPort,
    #[error("failed to read port: {0}")]
    Io(#[from] io::Error),
}

/// Validated server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub map_width: usize,
    pub map_height: usize,
    pub obstacle_density: f64,
    pub powerups: usize,
    pub frame_rate: u32,
    pub tagger_slot: u32,
    pub tag_policy: TagPolicy,
}

impl ServerConfig {
    /// Validates `args`, prompting on the terminal if no port was given
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        Self::from_args_with_prompt(args, &mut stdin.lock(), &mut stdout)
    }

    pub fn from_args_with_prompt<R: BufRead, W: Write>(
        args: Args,
        input: &mut R,
        output: &mut W,
    ) -> Result<Self, ConfigError> {
        if args.map_width < 3 || args.map_height < 3 {
            return Err(ConfigError::MapTooSmall {
                width: args.map_width,
                height: args.map_height,
            });
        }
        if !(0.0..1.0).contains(&args.obstacle_density) {
            return Err(ConfigError::ObstacleDensity(args.obstacle_density));
        }
        if args.frame_rate == 0 {
            return Err(ConfigError::FrameRate);
        }

        let port = match args.port {
            Some(port) => port,
            None => prompt_port(input, output)?,
        };

        Ok(Self {
            bind_addr: format!("{}:{}", args.host, port),
            map_width: args.map_width,
            map_height: args.map_height,
            obstacle_density: args.obstacle_density,
            powerups: args.powerups,
            frame_rate: args.frame_rate,
            tagger_slot: args.tagger_slot,
            tag_policy: args.tag_policy,
        })
    }
}

/// Asks for a port until a valid one is entered
pub fn prompt_port<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<u16, ConfigError> {
    loop {
        write!(output, "Enter port: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(ConfigError::NoPort);
        }

        match line.trim().parse::<u16>() {
            Ok(port) => return Ok(port),
            Err(_) => writeln!(output, "Invalid port: {}", line.trim())?,
        }
    }
}
