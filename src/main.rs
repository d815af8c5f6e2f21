use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use layout_translator::{InpaintMode, Mode, Output};

#[derive(Parser, Debug)]
#[command(
    name = "layout-translator",
    version,
    about = "Translate the text inside an image while keeping its layout"
)]
struct Cli {
    /// What to produce from the image
    #[arg(long = "mode", value_enum, default_value = "image")]
    mode: Mode,

    /// Image file to translate (reads stdin when omitted)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Target language (en-US, ko-KR, ja-JP)
    #[arg(short = 'l', long = "lang", default_value = "en-US")]
    lang: String,

    /// Model name or provider:model (e.g. openai:MODEL_ID)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// Model that rebuilds the image as markdown (defaults to --model)
    #[arg(long = "markdown-model")]
    markdown_model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Output file; image and markdown modes write to stdout when omitted
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// How the original text is removed before drawing
    #[arg(long = "inpaint", value_enum, default_value = "fill")]
    inpaint: InpaintMode,

    /// Directory holding <lang>/SansSerif-{Regular,SemiBold,Bold}.ttf
    #[arg(long = "font-dir")]
    font_dir: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    layout_translator::logging::init(cli.verbose)?;

    let image = read_image(cli.data.as_deref())?;
    let out = cli.out.clone();
    let output = layout_translator::run(
        layout_translator::Config {
            mode: cli.mode,
            lang: cli.lang,
            model: cli.model,
            markdown_model: cli.markdown_model,
            key: cli.key,
            settings_path: cli.read_settings,
            inpaint: cli.inpaint,
            font_dir: cli.font_dir,
        },
        image,
    )
    .await?;

    match output {
        Output::Image(png) => write_output(out.as_ref(), &png)?,
        Output::Markdown(markdown) => write_output(out.as_ref(), markdown.as_bytes())?,
        Output::Sentences(translation) => {
            println!(
                "{}",
                layout_translator::format_sentences(&translation.sentences)
            );
            if let Some(path) = out.as_ref() {
                std::fs::write(path, &translation.png)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
    }
    Ok(())
}

fn read_image(data: Option<&str>) -> Result<Vec<u8>> {
    let bytes = match data {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read image: {}", path))?
        }
        None => {
            if io::stdin().is_terminal() {
                return Err(anyhow!("no image given (use --data or pipe one to stdin)"));
            }
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };
    if !infer::is_image(&bytes) {
        let kind = infer::get(&bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("unknown");
        return Err(anyhow!("input is not an image (detected {})", kind));
    }
    Ok(bytes)
}

fn write_output(path: Option<&PathBuf>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
