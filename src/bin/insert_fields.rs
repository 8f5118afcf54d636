//! CLI tool for drawing filled-in fields onto a PDF
//!
//! Fields are read from a JSON array in the same shape the extractor
//! emits under `"fields"`.

use pdf_fields::renderer::RenderConfig;
use pdf_fields::{insert_fields, Field, FontData, FontResources, PdfError};
use std::env;
use std::fs;
use std::process;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 4 {
        eprintln!(
            "Usage: {} <input.pdf> <fields.json> <output.pdf> [--font <ttf>] [--signature-font <ttf>] [--debug] [--json]",
            args[0]
        );
        process::exit(1);
    }

    let json_output = args.iter().any(|a| a == "--json");

    match run(&args) {
        Ok(report) => {
            if json_output {
                let failures: Vec<_> = report
                    .failures
                    .iter()
                    .map(|f| serde_json::json!({ "id": f.field_id, "error": f.error.to_string() }))
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "rendered": report.rendered,
                        "skipped": report.skipped,
                        "failures": failures,
                    })
                );
            } else {
                println!("Rendered: {}", report.rendered.len());
                println!("Skipped (no value): {}", report.skipped.len());
                for failure in &report.failures {
                    println!("Failed: {} ({})", failure.field_id, failure.error);
                }
                println!("Written to {}", args[3]);
            }
            if !report.failures.is_empty() {
                process::exit(2);
            }
        }
        Err(e) => {
            if json_output {
                println!("{}", serde_json::json!({ "error": e.to_string() }));
            } else {
                eprintln!("Error: {}", e);
            }
            process::exit(1);
        }
    }
}

fn run(args: &[String]) -> Result<pdf_fields::RenderReport, PdfError> {
    let option = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
    };

    let json = fs::read_to_string(&args[2])?;
    let fields: Vec<Field> = serde_json::from_str(&json)?;

    let mut fonts = FontResources::default();
    if let Some(path) = option("--font") {
        fonts.text = FontData::load(path)?;
    }
    if let Some(path) = option("--signature-font") {
        fonts.signature = FontData::load(path)?;
    }

    let config = RenderConfig {
        debug: args.iter().any(|a| a == "--debug"),
        ..Default::default()
    };

    insert_fields(&args[1], &args[3], &fields, &fonts, &config)
}
