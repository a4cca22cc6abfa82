use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use heifkit_codec::info::LIB_INFO_KEYS;
use heifkit_codec::{module, Encoder, HeifModule};
use heifkit_core::{CompressionFormat, HeifkitConfig};

#[derive(Parser)]
#[command(
    name = "heifkit",
    version,
    about = "Inspect libheif and encode images to HEIF/AVIF"
)]
struct Cli {
    /// Path to a heifkit.toml configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the libheif shared library (overrides the config file)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display libheif version and default encoder plugins
    Info {
        /// Print the lib_info table as JSON
        #[arg(long)]
        json: bool,
    },

    /// List encoder/decoder support per compression format
    Formats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Encode a raster image (PNG, JPEG, ...) to HEIF or AVIF
    Encode {
        /// Input image
        #[arg()]
        input: PathBuf,

        /// Output file (default: input with .heic/.avif extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compression format: hevc, av1, ... (default from config)
        #[arg(short, long)]
        format: Option<CompressionFormat>,

        /// Lossy quality 0-100
        #[arg(short, long, conflicts_with = "lossless")]
        quality: Option<i32>,

        /// Encode losslessly
        #[arg(long)]
        lossless: bool,

        /// Encoder parameter as name=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

#[derive(Debug, Serialize)]
struct FormatSupport {
    format: CompressionFormat,
    encoder: bool,
    decoder: bool,
    default_encoder: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HeifkitConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => HeifkitConfig::default(),
    };
    if let Some(library) = &cli.library {
        config.library.path = Some(library.clone());
    }

    // Logs go to stderr so --json output on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let heif = HeifModule::load(&config.library).context("failed to initialize libheif")?;
    let heif = module::install(heif)?;

    match cli.command {
        Commands::Info { json } => cmd_info(heif, json),
        Commands::Formats { json } => cmd_formats(heif, json),
        Commands::Encode {
            input,
            output,
            format,
            quality,
            lossless,
            params,
        } => {
            let mut encoder_config = config.encoder.clone();
            if let Some(format) = format {
                encoder_config.format = format;
            }
            if lossless {
                encoder_config.quality = Some(-1);
            } else if quality.is_some() {
                encoder_config.quality = quality;
            }
            encoder_config.params.extend(params);
            cmd_encode(heif, &input, output, &encoder_config)
        }
    }
}

fn cmd_info(heif: &HeifModule, json: bool) -> Result<()> {
    let info = heif.lib_info();
    if json {
        println!("{}", serde_json::to_string(info)?);
        return Ok(());
    }

    println!("heifkit {}", env!("CARGO_PKG_VERSION"));
    for key in LIB_INFO_KEYS {
        let value = info.get(key).unwrap_or_default();
        println!(
            "   {:<9}{}",
            format!("{}:", key),
            if value.is_empty() { "(none)" } else { value }
        );
    }
    Ok(())
}

fn cmd_formats(heif: &HeifModule, json: bool) -> Result<()> {
    let rows: Vec<FormatSupport> = CompressionFormat::ALL
        .iter()
        .map(|&format| FormatSupport {
            format,
            encoder: heif.have_encoder_for_format(format),
            decoder: heif.have_decoder_for_format(format),
            default_encoder: heif
                .encoder_descriptors(format, 1)
                .into_iter()
                .next()
                .map(|d| d.name),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<10} {:<8} {:<8} default encoder", "format", "encode", "decode");
    for row in rows {
        println!(
            "{:<10} {:<8} {:<8} {}",
            row.format.display_name(),
            yes_no(row.encoder),
            yes_no(row.decoder),
            row.default_encoder.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn cmd_encode(
    heif: &HeifModule,
    input: &Path,
    output: Option<PathBuf>,
    encoder_config: &heifkit_core::EncoderConfig,
) -> Result<()> {
    let output = match output {
        Some(path) => path,
        None => default_output_path(input, encoder_config.format)?,
    };

    let image = image::open(input)
        .with_context(|| format!("failed to read image {}", input.display()))?;
    let (width, height) = (image.width(), image.height());
    let alpha = image.color().has_alpha();

    let mut ctx = heif.new_encode_context()?;
    {
        let mut encoder = Encoder::for_format(&ctx, encoder_config.format).with_context(|| {
            format!("no {} encoder available", encoder_config.format.display_name())
        })?;
        encoder.apply(encoder_config)?;
        // Alpha is only written when the source carries it.
        if alpha {
            ctx.encode_rgba(&encoder, &image.to_rgba8())?;
        } else {
            ctx.encode_rgb(&encoder, &image.to_rgb8())?;
        }
    }
    let bytes = ctx.write()?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(&output, bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;

    tracing::info!(
        "Encoded {} ({}x{}{}) to {} [{} bytes, {}]",
        input.display(),
        width,
        height,
        if alpha { ", alpha" } else { "" },
        output.display(),
        bytes.len(),
        encoder_config.format.display_name(),
    );
    Ok(())
}

fn default_output_path(input: &Path, format: CompressionFormat) -> Result<PathBuf> {
    let extension = format.file_extension().with_context(|| {
        format!(
            "no default extension for {}; pass --output",
            format.display_name()
        )
    })?;
    Ok(input.with_extension(extension))
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("preset=slow").unwrap(),
            ("preset".to_string(), "slow".to_string())
        );
        assert_eq!(
            parse_param(" x265:crf = 22").unwrap(),
            ("x265:crf".to_string(), "22".to_string())
        );
        assert!(parse_param("preset").is_err());
        assert!(parse_param("=slow").is_err());
    }

    #[test]
    fn test_default_output_path() {
        let out = default_output_path(Path::new("shots/cat.png"), CompressionFormat::Av1).unwrap();
        assert_eq!(out, PathBuf::from("shots/cat.avif"));
        assert!(default_output_path(Path::new("cat.png"), CompressionFormat::Evc).is_err());
    }

    #[test]
    fn test_cli_parses_encode() {
        let cli = Cli::try_parse_from([
            "heifkit", "encode", "in.png", "-f", "avif", "-q", "60", "-p", "speed=6",
        ])
        .unwrap();
        match cli.command {
            Commands::Encode {
                format,
                quality,
                params,
                lossless,
                ..
            } => {
                assert_eq!(format, Some(CompressionFormat::Av1));
                assert_eq!(quality, Some(60));
                assert!(!lossless);
                assert_eq!(params, vec![("speed".to_string(), "6".to_string())]);
            }
            _ => panic!("expected encode"),
        }
    }

    #[test]
    fn test_quality_conflicts_with_lossless() {
        let result =
            Cli::try_parse_from(["heifkit", "encode", "in.png", "-q", "60", "--lossless"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_library_flag() {
        let cli = Cli::try_parse_from(["heifkit", "info", "--library", "/opt/libheif.so", "--json"])
            .unwrap();
        assert_eq!(cli.library, Some(PathBuf::from("/opt/libheif.so")));
        assert!(matches!(cli.command, Commands::Info { json: true }));
    }
}
