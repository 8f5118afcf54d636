//! Debug tool: dump positioned text runs and per-glyph boxes

use pdf_fields::extractor::extract_text_runs;
use std::env;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: debug_chars <pdf_path> [max_page | min-max]");
        std::process::exit(1);
    }

    let range = args.get(2).map(|s| s.as_str()).unwrap_or("1-3");
    let (min_page, max_page) = if let Some((a, b)) = range.split_once('-') {
        (a.parse().unwrap_or(1), b.parse().unwrap_or(3))
    } else {
        (1, range.parse().unwrap_or(3))
    };

    let pages = match extract_text_runs(&args[1]) {
        Ok(pages) => pages,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    for page in pages
        .iter()
        .filter(|p| p.page >= min_page && p.page <= max_page)
    {
        println!(
            "=== PAGE {} ({:.0}x{:.0}, rotate {}, {} runs) ===",
            page.page,
            page.geometry.width,
            page.geometry.height,
            page.geometry.rotation.degrees(),
            page.runs.len()
        );
        for run in &page.runs {
            println!(
                "  font={:<6} fs={:5.1} text={:?}",
                run.font, run.font_size, run.text
            );
            for c in &run.chars {
                println!(
                    "      {:?} x={:7.1} y={:7.1} w={:6.2} h={:6.2}",
                    c.ch, c.x, c.y, c.width, c.height
                );
            }
        }
        println!();
    }
}
