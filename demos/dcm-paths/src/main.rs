//! Prints the attribute values and pixel-item offsets found at a set of
//! caller-supplied tag paths in a DICOM stream.
//!
//! ```text
//! dcm-paths slide.dcm --path 0004,1220>0004,1500 --path 0028,0010
//! ```

use clap::Parser;
use dicom_wsi_parser::{BoundedView, DicomStreamParser, ElementHeader, ParseHandler, Tag};
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{error, info, Level};

/// Print DICOM attribute values and pixel-item offsets selected by tag path.
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// the DICOM file to read
    file: PathBuf,

    /// a nested tag path to extract, e.g. "0004,1220>0004,1500"
    #[arg(short = 'p', long = "path")]
    path: Vec<String>,

    /// verbose mode
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    /// Could not parse a --path argument
    InvalidPath { reason: String },

    /// Could not open the input file
    Open { source: dicom_wsi_parser::Error },

    /// Parsing failed
    Parse { source: dicom_wsi_parser::Error },
}

fn main() {
    run().unwrap_or_else(|err| {
        error!("{}", snafu::Report::from_error(err));
        std::process::exit(-2);
    });
}

fn run() -> Result<(), Error> {
    let App { file, path, verbose } = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .unwrap_or_else(|e| {
        error!("{}", snafu::Report::from_error(e));
    });

    let target_paths = path
        .iter()
        .map(|s| parse_tag_path(s).map_err(|reason| Error::InvalidPath { reason }))
        .collect::<Result<Vec<_>, Error>>()?;

    let mut parser = DicomStreamParser::open(&file).context(OpenSnafu)?;
    for p in target_paths {
        parser.add_target_path(p);
    }

    let mut handler = PrintingHandler { discard_first_pixel_item: true };
    parser.run(&mut handler).context(ParseSnafu)?;

    info!("done");
    Ok(())
}

/// Parse `"0004,1220>0004,1500"` into a nested tag path.
fn parse_tag_path(s: &str) -> Result<Vec<Tag>, String> {
    s.split('>').map(parse_tag).collect()
}

fn parse_tag(s: &str) -> Result<Tag, String> {
    let (group, element) = s
        .split_once(',')
        .ok_or_else(|| format!("expected GGGG,EEEE, found {:?}", s))?;
    let group = u16::from_str_radix(group.trim(), 16)
        .map_err(|e| format!("invalid group in {:?}: {}", s, e))?;
    let element = u16::from_str_radix(element.trim(), 16)
        .map_err(|e| format!("invalid element in {:?}: {}", s, e))?;
    Ok(Tag(group, element))
}

struct PrintingHandler {
    discard_first_pixel_item: bool,
}

impl ParseHandler for PrintingHandler {
    fn on_attribute(
        &mut self,
        path: &[Tag],
        header: ElementHeader,
        value: Option<&mut BoundedView<'_>>,
    ) {
        let path_str = path
            .iter()
            .map(Tag::to_string)
            .collect::<Vec<_>>()
            .join(">");
        match value {
            Some(view) => match view.read_all() {
                Ok(bytes) => {
                    println!("{} ({}) = {:?}", path_str, header.vr, String::from_utf8_lossy(&bytes));
                }
                Err(e) => error!("failed to read value at {}: {}", path_str, e),
            },
            None => println!("{} ({}) = <nested>", path_str, header.vr),
        }
    }

    fn on_pixel_item(&mut self, absolute_offset: u64, length: u32) {
        if self.discard_first_pixel_item {
            self.discard_first_pixel_item = false;
            info!(absolute_offset, length, "basic offset table (discarded)");
            return;
        }
        println!("pixel item at offset {} ({} bytes)", absolute_offset, length);
    }
}
