//! WSILayer CLI - Command-line probe
//!
//! Inspects pyramid geometry, resolves tile URLs and performs one-shot tile
//! fetches against a remote slide service, all through the library crate.

use clap::{Parser, Subcommand};
use tracing::debug;

use wsilayer::fetch::{self, ReqwestClient};
use wsilayer::{
    HostTileAddress, ImageDescriptor, PyramidGeometry, RenderOptions, SourceConfig,
    TierSizeCalculation, TileSource, TileState,
};

#[derive(Parser)]
#[command(name = "wsilayer", version, about = "Probe pyramidal whole-slide tile services")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the pyramid levels derived from an image size.
    Geometry {
        /// Full image width in pixels.
        #[arg(long)]
        width: u32,
        /// Full image height in pixels.
        #[arg(long)]
        height: u32,
        /// Tile edge length in pixels.
        #[arg(long, default_value_t = 256)]
        tile_size: u32,
        /// Tier size calculation: default or truncated.
        #[arg(long, default_value = "default")]
        strategy: String,
    },
    /// Resolve the request URL for one tile.
    Url {
        /// URL template with {z}/{x}/{y}/{s} placeholders.
        #[arg(long)]
        template: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, default_value_t = 256)]
        tile_size: u32,
        /// Host pyramid level, 0 = coarsest.
        #[arg(long)]
        level: u32,
        #[arg(long)]
        col: i32,
        /// Host row; the top row is -1.
        #[arg(long)]
        row: i32,
    },
    /// Fetch one tile and report its load state.
    Fetch {
        #[arg(long)]
        template: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, default_value_t = 256)]
        tile_size: u32,
        #[arg(long)]
        level: u32,
        #[arg(long)]
        col: i32,
        #[arg(long)]
        row: i32,
        /// Fetch the tile as a raw binary pixel buffer instead of an
        /// encoded image.
        #[arg(long)]
        raw: bool,
    },
}

fn build_source(
    template: &str,
    width: u32,
    height: u32,
    tile_size: u32,
    strategy: TierSizeCalculation,
    raw: bool,
) -> Result<TileSource, Box<dyn std::error::Error>> {
    let config = SourceConfig::new(template, width, height)
        .with_tile_size(tile_size)
        .with_tier_size_calculation(strategy);
    let options = RenderOptions::passthrough().with_raw_buffer(raw);
    Ok(TileSource::new(config, options)?)
}

fn print_geometry(
    width: u32,
    height: u32,
    tile_size: u32,
    strategy: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let strategy: TierSizeCalculation = strategy.parse()?;
    let descriptor =
        ImageDescriptor::new(width, height, tile_size).with_tier_size_calculation(strategy);
    let geometry = PyramidGeometry::build(&descriptor)?;

    println!(
        "{} level(s) for {}×{} with {}px tiles ({} strategy)",
        geometry.num_levels(),
        width,
        height,
        tile_size,
        strategy
    );
    println!("level  resolution  scale     tiles      pixels");
    for level in geometry.levels() {
        println!(
            "{:<6} {:<11} {:<9} {:<10} {}×{}",
            level.level,
            level.resolution,
            level.scale,
            format!("{}×{}", level.tier_size.0, level.tier_size.1),
            level.pixel_size.0,
            level.pixel_size.1,
        );
    }
    Ok(())
}

fn print_url(
    template: &str,
    width: u32,
    height: u32,
    tile_size: u32,
    addr: HostTileAddress,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = build_source(
        template,
        width,
        height,
        tile_size,
        TierSizeCalculation::Default,
        false,
    )?;
    match source.tile_url(Some(addr), 1.0, None) {
        Some(url) => println!("{}", url),
        None => {
            eprintln!(
                "no URL: address level={} col={} row={} is outside the pyramid",
                addr.level, addr.col, addr.row
            );
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn fetch_tile(
    template: &str,
    width: u32,
    height: u32,
    tile_size: u32,
    addr: HostTileAddress,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = build_source(
        template,
        width,
        height,
        tile_size,
        TierSizeCalculation::Default,
        raw,
    )?;
    let Some(url) = source.tile_url(Some(addr), 1.0, None) else {
        eprintln!("no URL for the requested tile");
        std::process::exit(1);
    };
    debug!(url = %url, raw, "Fetching tile");

    let client = ReqwestClient::new()?;
    let mut tile = source.create_tile(addr);
    if raw {
        fetch::load_raw(&client, &mut tile, &url).await;
    } else {
        fetch::load_encoded(&client, &mut tile, &url).await;
    }

    match tile.state {
        TileState::Loaded => {
            if let Some(bytes) = &tile.raw {
                println!("loaded: {} raw bytes from {}", bytes.len(), url);
            } else if let Some(image) = &tile.loaded_image {
                println!(
                    "loaded: {}×{} image from {}",
                    image.width(),
                    image.height(),
                    url
                );
            }
        }
        state => {
            eprintln!("tile ended in state {:?} for {}", state, url);
            std::process::exit(1);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Geometry {
            width,
            height,
            tile_size,
            strategy,
        } => print_geometry(width, height, tile_size, &strategy),
        Command::Url {
            template,
            width,
            height,
            tile_size,
            level,
            col,
            row,
        } => print_url(
            &template,
            width,
            height,
            tile_size,
            HostTileAddress::new(level, col, row),
        ),
        Command::Fetch {
            template,
            width,
            height,
            tile_size,
            level,
            col,
            row,
            raw,
        } => {
            fetch_tile(
                &template,
                width,
                height,
                tile_size,
                HostTileAddress::new(level, col, row),
                raw,
            )
            .await
        }
    }
}
