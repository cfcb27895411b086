use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use webprint::async_api::ViewHandle;
use webprint::pipeline::PrintPipeline;
use webprint::raster::{build_print_job, build_print_job_from_image};
use webprint::transport::{send_print_job, DeviceTransport, PrinterTransport, TcpTransport};
use webprint::view::ScriptedView;
use webprint::{Config, PrintJob, Viewport};

#[derive(Parser)]
#[command(name = "webprint", version, about = "Print a web page element on a thermal receipt printer")]
struct Cli {
    /// Log every pipeline step
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a page in headless Chrome and print its `printable-content` element
    Capture {
        #[arg(long)]
        url: String,
        /// Also save the stitched canvas as PNG
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        output: Output,
    },
    /// Print an existing image
    PrintImage {
        #[arg(long)]
        image: PathBuf,
        #[command(flatten)]
        output: Output,
    },
    /// Print a synthetic test strip through the full capture pipeline
    Demo {
        #[arg(long, default_value_t = 375)]
        width: u32,
        #[arg(long, default_value_t = 1200)]
        height: u32,
        #[arg(long, default_value_t = 2.0)]
        ratio: f32,
        /// Also save the stitched canvas as PNG
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        output: Output,
    },
}

#[derive(Args)]
struct Output {
    /// Printer address: device node (e.g. /dev/rfcomm0) or host:port with --tcp
    #[arg(long)]
    printer: Option<String>,
    /// Treat --printer as a network printer
    #[arg(long)]
    tcp: bool,
    /// Write the raw command stream to a file
    #[arg(long)]
    job_out: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Output {
    fn load_config(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => Ok(Config::from_json_file(path)?),
            None => Ok(Config::default()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<webprint::Error>() {
                Some(e) => eprintln!("{}", e.user_message()),
                None => eprintln!("{:#}", err),
            }
            log::debug!("{:?}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Capture { url, out, output } => {
            let config = output.load_config()?;
            let view = open_browser(&url, &config).await?;
            let pipeline = PrintPipeline::new(view.clone(), config.capture.clone(), config.printer.clone());
            let job = capture_job(&pipeline, out.as_deref()).await;
            view.close().await.ok();
            match job? {
                Some(job) => deliver(&job, &output, &config).await,
                None => {
                    log::info!("capture was cancelled");
                    Ok(())
                }
            }
        }
        Command::PrintImage { image, output } => {
            let config = output.load_config()?;
            let img = image::open(&image).with_context(|| format!("reading {}", image.display()))?;
            let job = build_print_job_from_image(&img, &config.printer)?;
            deliver(&job, &output, &config).await
        }
        Command::Demo { width, height, ratio, out, output } => {
            let config = output.load_config()?;
            let viewport = config.capture.viewport;
            let view = ViewHandle::spawn(move || {
                Ok(ScriptedView::new(width, height)
                    .with_pixel_ratio(ratio)
                    .with_viewport(Viewport { width, ..viewport }))
            })
            .await?;
            let pipeline = PrintPipeline::new(view, config.capture.clone(), config.printer.clone());
            if let Some(job) = capture_job(&pipeline, out.as_deref()).await? {
                deliver(&job, &output, &config).await?;
            }
            Ok(())
        }
    }
}

#[cfg(feature = "cdp")]
async fn open_browser(url: &str, config: &Config) -> anyhow::Result<ViewHandle> {
    let url = url.to_string();
    let capture = config.capture.clone();
    Ok(ViewHandle::spawn(move || webprint::cdp::CdpView::open(&url, &capture)).await?)
}

#[cfg(not(feature = "cdp"))]
async fn open_browser(_url: &str, _config: &Config) -> anyhow::Result<ViewHandle> {
    Err(webprint::Error::ConfigError(
        "this build has no browser backend; rebuild with `--features cdp`".into(),
    )
    .into())
}

/// Capture and convert, saving the canvas on the way when asked to.
async fn capture_job(pipeline: &PrintPipeline, canvas_out: Option<&Path>) -> anyhow::Result<Option<PrintJob>> {
    let Some(path) = canvas_out else {
        return Ok(pipeline.prepare_job().await?);
    };
    let Some(canvas) = pipeline.capture_canvas().await? else {
        return Ok(None);
    };
    let png = canvas.to_png()?;
    std::fs::write(path, &png).with_context(|| format!("writing {}", path.display()))?;
    log::info!("saved {}x{} canvas to {}", canvas.width(), canvas.height(), path.display());
    Ok(Some(build_print_job(&png, pipeline.printer_config())?))
}

async fn deliver(job: &PrintJob, output: &Output, config: &Config) -> anyhow::Result<()> {
    if let Some(path) = &output.job_out {
        std::fs::write(path, job.bytes()).with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {} bytes to {}", job.len(), path.display());
    }

    match &output.printer {
        Some(address) => {
            let mut transport: Box<dyn PrinterTransport> = if output.tcp {
                Box::new(TcpTransport::new(&config.printer))
            } else {
                Box::new(DeviceTransport::new())
            };
            send_print_job(transport.as_mut(), address, job, &config.printer).await?;
        }
        None if output.job_out.is_none() => {
            println!(
                "print job {}: {}x{} dots, {} bytes (no --printer given, nothing sent)",
                job.fingerprint(),
                job.width_dots(),
                job.height_dots(),
                job.len()
            );
        }
        None => {}
    }
    Ok(())
}
