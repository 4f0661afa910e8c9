//! GlyphX CLI - run safety-gated tools from the terminal
//!
//! Usage:
//!   glyphx -c "command"           Run a shell command through the safety layer
//!   glyphx --glyph IDENT          Run a saved glyph by id or name
//!   glyphx --tool NAME [JSON]     Invoke any tool with raw JSON arguments
//!   glyphx --list                 List saved glyphs
//!
//! Options:
//!   --registry PATH               Registry file (default: platform config dir)
//!   --unsafe                      Disable all safety checks

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing_subscriber::EnvFilter;

use glyphx::registry::{GlyphRegistry, default_registry_path};
use glyphx::safety::SafetyConfig;
use glyphx::tools::{ToolOutput, ToolReply, ToolsBridge};

enum Invocation {
    Shell(String),
    Glyph(String),
    Tool { name: String, arguments: String },
    List,
}

struct Options {
    invocation: Invocation,
    registry_path: Option<String>,
    disable_safety: bool,
}

fn usage() -> ! {
    eprintln!(
        "usage: glyphx [-c COMMAND | --glyph IDENT | --tool NAME [JSON] | --list] \
         [--registry PATH] [--unsafe]"
    );
    std::process::exit(2);
}

fn parse_args(args: Vec<String>) -> Options {
    let mut invocation = None;
    let mut registry_path = None;
    let mut disable_safety = false;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" => {
                let Some(command) = iter.next() else { usage() };
                invocation = Some(Invocation::Shell(command));
            }
            "--glyph" => {
                let Some(identifier) = iter.next() else { usage() };
                invocation = Some(Invocation::Glyph(identifier));
            }
            "--tool" => {
                let Some(name) = iter.next() else { usage() };
                let arguments = iter.next().unwrap_or_default();
                invocation = Some(Invocation::Tool { name, arguments });
            }
            "--list" => invocation = Some(Invocation::List),
            "--registry" => {
                let Some(path) = iter.next() else { usage() };
                registry_path = Some(path);
            }
            "--unsafe" => disable_safety = true,
            _ => usage(),
        }
    }

    let Some(invocation) = invocation else { usage() };
    Options {
        invocation,
        registry_path,
        disable_safety,
    }
}

fn open_registry(options: &Options) -> anyhow::Result<Arc<GlyphRegistry>> {
    let registry = match options.registry_path.clone() {
        Some(path) => GlyphRegistry::open(path).context("failed to open registry")?,
        None => match default_registry_path() {
            Some(path) => GlyphRegistry::open(path).context("failed to open registry")?,
            None => GlyphRegistry::in_memory(),
        },
    };
    Ok(Arc::new(registry))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = parse_args(std::env::args().skip(1).collect());
    let config = if options.disable_safety {
        SafetyConfig::disabled()
    } else {
        SafetyConfig::default()
    };
    let bridge = ToolsBridge::builder()
        .safety(config)
        .registry(open_registry(&options)?)
        .build()
        .context("invalid safety configuration")?;

    let reply = match &options.invocation {
        Invocation::Shell(command) => bridge.run_shell(command, None, None).await?,
        Invocation::Glyph(identifier) => bridge.run_glyph(identifier).await?,
        Invocation::Tool { name, arguments } => bridge.execute_text(name, arguments).await?,
        Invocation::List => bridge.list_glyphs()?,
    };

    match reply {
        ToolReply::Completed(ToolOutput::Shell(result)) => {
            // write_all + flush so nothing buffered is lost on exit.
            io::stdout().write_all(result.stdout.as_bytes()).ok();
            io::stdout().flush().ok();
            io::stderr().write_all(result.stderr.as_bytes()).ok();
            std::process::exit(result.exit_code);
        }
        ToolReply::Completed(output) => {
            let payload = ToolReply::Completed(output).into_payload();
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        ToolReply::Denied { reason, .. } => bail!("blocked by safety policy: {reason}"),
        ToolReply::Failed { reason, .. } => bail!("{reason}"),
    }
}
