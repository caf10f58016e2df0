use clap::{Parser, Subcommand};
use std::path::PathBuf;

use coverage_map::client::CoverageSession;
use coverage_map::config::AppConfig;
use coverage_map::data;
use coverage_map::processing::Operation;
use coverage_map::query::Credentials;
use coverage_map::render::{ColorScale, PngRenderer, RenderOptions};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a coverage map from the configured inputs
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Check that the configured credentials load
    CheckCredentials {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config } => {
            println!("Rendering map with config: {:?}", config);
            let app_config = AppConfig::load_from_file(config)?;

            // This binary drives the pipeline offline, from a CSV export.
            // Remote sessions attach a QueryService implementation instead.
            let mut session = CoverageSession::offline(&app_config.input.table_name);

            let csv_path = app_config.input.coverage_csv.as_ref().ok_or_else(|| {
                anyhow::anyhow!("input.coverage_csv is required for offline rendering")
            })?;
            session.set_table(data::load_coverage_csv(csv_path)?);
            session.load_map(&app_config.input.map_file)?;

            let render = &app_config.render;
            let operation = render
                .operation
                .as_deref()
                .map(|name| Operation::parse(name, render.column.clone()))
                .transpose()?;
            let scale: ColorScale = render.color_scale.parse()?;
            let options = RenderOptions {
                width: render.width,
                height: render.height,
                point_color: render.point_color.clone(),
                marker_size: render.marker_size,
                output: render.output.clone(),
            };

            session.render_map(
                operation.as_ref(),
                scale,
                &render.legend_label,
                &options,
                &PngRenderer,
            )?;

            println!("Wrote {:?}", render.output);
        }
        Commands::CheckCredentials { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            let path = app_config.input.credentials.ok_or_else(|| {
                anyhow::anyhow!("input.credentials is not set in the configuration")
            })?;
            let creds = Credentials::from_file(&path)?;
            println!(
                "Credentials OK: project {} as {}",
                creds.project_id, creds.client_email
            );
        }
    }

    Ok(())
}
