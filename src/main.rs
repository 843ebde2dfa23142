use anyhow::{Context, Result};
use clap::{value_parser, Arg, Command};
use flexi_logger::Logger;
use std::fs;
use std::path::PathBuf;
use tachograph_summary::{parse_header_from_file, parse_summary_from_file};

fn main() -> Result<()> {
    let matches = Command::new("Tachograph Summary")
        .name(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .help("Input .ddd file path"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .help("Output JSON file path (stdout when omitted)"),
        )
        .arg(
            Arg::new("header-only")
                .long("header-only")
                .action(clap::ArgAction::SetTrue)
                .help("Only classify the file header"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("Enable verbose logging"),
        )
        .get_matches();

    let input = matches
        .get_one::<PathBuf>("input")
        .and_then(|path| path.to_str())
        .context("Input path is not valid UTF-8")?;
    let output = matches.get_one::<PathBuf>("output");

    // Set up logging if verbose flag is used
    if matches.get_count("verbose") > 0 {
        std::env::set_var("RUST_LOG", "trace");
        Logger::try_with_env()?
            .start()
            .context("Failed to start logger")?;
    }

    let json_output = if matches.get_flag("header-only") {
        let header = parse_header_from_file(input).context("Failed to read input file")?;
        serde_json::to_string_pretty(&header).context("Failed to serialize header")?
    } else {
        let summary = parse_summary_from_file(input).context("Failed to read input file")?;
        serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
    };

    match output {
        Some(path) => {
            fs::write(path, json_output).context("Failed to write output file")?;
            println!("Processing complete. Output written to: {:?}", path);
        }
        None => println!("{}", json_output),
    }

    Ok(())
}
