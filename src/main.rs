use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rfwatermark::{
    Document, EngineConfig, FixedPixelRatio, TextBackend, Watermark, WatermarkConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Rasterize and apply self-healing watermarks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Device pixel ratio to rasterize at
    #[arg(long, global = true, default_value_t = 1.0)]
    dpr: f32,

    /// Draw text with the font-free box engine instead of system fonts
    #[arg(long, global = true)]
    boxes: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one tile and write it as PNG
    Tile {
        #[command(flatten)]
        watermark: WatermarkArgs,

        /// Output PNG path
        #[arg(short, long, default_value = "watermark.png")]
        output: PathBuf,
    },
    /// Mount a watermark on an HTML document and write the result
    Apply {
        /// Input HTML file
        input: PathBuf,

        /// CSS selector of the container
        #[arg(long, default_value = "body")]
        selector: String,

        #[command(flatten)]
        watermark: WatermarkArgs,

        /// Output HTML path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct WatermarkArgs {
    /// JSON watermark configuration; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Text line (repeat for several lines)
    #[arg(short, long = "text")]
    text: Vec<String>,

    /// Image reference (path, URL or data URL)
    #[arg(long)]
    image: Option<String>,

    /// Rotation in degrees
    #[arg(long, allow_hyphen_values = true)]
    rotate: Option<f64>,

    /// Gap between tiles; one value for both axes or two for x and y
    #[arg(long, num_args = 1..=2)]
    gap: Vec<f64>,

    /// Font size, e.g. 16 or 16px
    #[arg(long)]
    font_size: Option<String>,

    /// Text color
    #[arg(long)]
    color: Option<String>,
}

impl WatermarkArgs {
    fn into_config(self) -> Result<WatermarkConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => WatermarkConfig::default(),
        };

        let font_style = if self.font_size.is_some() || self.color.is_some() {
            Some(rfwatermark::options::FontStyleConfig {
                font_size: self.font_size.map(Into::into),
                color: self.color,
                ..Default::default()
            })
        } else {
            None
        };
        config.merge(WatermarkConfig {
            content: (!self.text.is_empty()).then_some(self.text),
            image: self.image,
            rotate: self.rotate,
            gap: (!self.gap.is_empty()).then(|| self.gap.into_iter().map(Into::into).collect()),
            font_style,
            ..Default::default()
        });
        Ok(config)
    }
}

fn engine_config(cli: &Cli, base: Option<&Path>) -> EngineConfig {
    let image_base_url = base
        .and_then(|p| std::fs::canonicalize(p).ok())
        .and_then(|p| url::Url::from_directory_path(p).ok());
    EngineConfig {
        pixel_ratio: Arc::new(FixedPixelRatio(cli.dpr)),
        text_backend: if cli.boxes {
            TextBackend::Boxes
        } else {
            TextBackend::System
        },
        image_base_url,
        ..Default::default()
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    match cli.command {
        Command::Tile {
            ref watermark,
            ref output,
        } => {
            let engine = engine_config(&cli, Some(&cwd));
            let config = watermark.clone().into_config()?;
            let tile = rfwatermark::render_tile(&config, &engine).await?;
            std::fs::write(output, tile.png_bytes()?)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "tile {}x{}, surface {}x{} px -> {}",
                tile.width,
                tile.height,
                tile.pixel_width,
                tile.pixel_height,
                output.display()
            );
        }
        Command::Apply {
            ref input,
            ref selector,
            ref watermark,
            ref output,
        } => {
            let html = std::fs::read_to_string(input)
                .with_context(|| format!("reading {}", input.display()))?;
            let import = Document::parse_html(&html);
            let Some(container) = import.select_first(selector)? else {
                bail!("no element matches {:?} in {}", selector, input.display());
            };
            let doc = import.into_document();

            let base = input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(cwd.as_path());
            let engine = engine_config(&cli, Some(base));
            let config = watermark.clone().into_config()?;
            let wm = Watermark::mount(&doc, container, config, engine).await?;
            log::info!("watermark mounted on {} ({:?})", selector, wm.surface());

            let out = doc.to_html();
            match output {
                Some(path) => std::fs::write(path, out)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", out),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Warnings by default, override with RUST_LOG
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run(Cli::parse()).await
}
