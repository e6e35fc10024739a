// Masking preview tool
// Reads lines from stdin, runs the detection pipeline and prints what the
// LLM would see. Nothing leaves the process.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use pii_gateway::{Config, Engines, MaskingPipeline};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        // Masking needs no secret material; fall back to a throwaway one
        Err(_) => Config::from_pairs(vec![(
            "MASTER_SECRET".to_string(),
            "maskcheck-local".to_string(),
        )])
        .context("default config")?,
    };

    let engines = Arc::new(Engines::from_config(&config).context("building engines")?);
    let mut pipeline = MaskingPipeline::new("maskcheck", engines);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    eprintln!("Enter text; each line is masked with session-stable tokens. Ctrl-D to exit.");

    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let result = pipeline.mask(&line);

        writeln!(stdout, "masked   : {}", result.masked_text)?;
        writeln!(stdout, "entities : {}", result.entities_detected)?;
        for (token, mapping) in &result.tokens {
            writeln!(
                stdout,
                "           {} <- {} ({})",
                token,
                "●".repeat(mapping.original.chars().count().min(10)),
                mapping.entity_type
            )?;
        }
        let restored = pipeline.unmask(&result.masked_text);
        writeln!(stdout, "restored : {}", restored.unmasked_text)?;
        stdout.flush()?;
    }

    Ok(())
}
