//! CLI tool for listing the `{{TYPE,rN,...}}` placeholders of a PDF

use pdf_fields::{extract_placeholders_mem, strip_placeholders_mem, ExtractionConfig, Field};
use std::env;
use std::fs;
use std::process;
use std::time::Instant;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <pdf_file> [--json] [--strip <output.pdf>]", args[0]);
        process::exit(1);
    }

    let pdf_path = &args[1];
    let json_output = args.iter().any(|a| a == "--json");
    let strip_output = args
        .iter()
        .position(|a| a == "--strip")
        .and_then(|i| args.get(i + 1));

    let buffer = match fs::read(pdf_path) {
        Ok(buffer) => buffer,
        Err(e) => fail(json_output, &e),
    };

    let config = ExtractionConfig::default();
    let start = Instant::now();

    let result = match strip_output {
        Some(output) => strip_placeholders_mem(&buffer, &config).and_then(|(bytes, scan)| {
            fs::write(output, bytes)?;
            Ok(scan)
        }),
        None => extract_placeholders_mem(&buffer, &config),
    };

    let scan = match result {
        Ok(scan) => scan,
        Err(e) => fail(json_output, &e),
    };
    let elapsed = start.elapsed();

    if json_output {
        let fields: Vec<Field> = scan.placeholders.iter().map(|p| p.to_field()).collect();
        let skipped: Vec<_> = scan
            .skipped
            .iter()
            .map(|s| {
                serde_json::json!({
                    "placeholder": s.placeholder,
                    "page": s.page,
                    "error": s.error.to_string(),
                })
            })
            .collect();
        let output = serde_json::json!({
            "placeholders": scan.placeholders,
            "fields": fields,
            "skipped": skipped,
            "extraction_time_ms": elapsed.as_millis() as u64,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(json_output, &e),
        }
        return;
    }

    println!("Placeholders in {}", pdf_path);
    println!("==========================");
    for p in &scan.placeholders {
        println!(
            "  page {:3}  x={:7.1} y={:7.1} w={:6.1} h={:5.1}  {:<14} {} <{}>  {}",
            p.page,
            p.x,
            p.y,
            p.width,
            p.height,
            p.field_type,
            p.recipient_tag,
            p.recipient.email,
            p.placeholder
        );
    }
    if !scan.skipped.is_empty() {
        println!();
        println!("Skipped:");
        for s in &scan.skipped {
            println!("  page {:3}  {}  ({})", s.page, s.placeholder, s.error);
        }
    }
    println!();
    println!(
        "{} placeholders, {} skipped, {}ms",
        scan.placeholders.len(),
        scan.skipped.len(),
        elapsed.as_millis()
    );
    if let Some(output) = strip_output {
        println!("Placeholder text covered in {}", output);
    }
}

fn fail(json_output: bool, e: &dyn std::fmt::Display) -> ! {
    if json_output {
        println!("{}", serde_json::json!({ "error": e.to_string() }));
    } else {
        eprintln!("Error: {}", e);
    }
    process::exit(1);
}
