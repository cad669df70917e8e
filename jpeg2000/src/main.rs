use clap::Parser;
use std::error;
use std::error::Error;
use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use jp2::{decode_jp2, ParseOptions};
use jpc::decode_jpc;
use report::Report;

#[derive(Debug)]
enum JP2CheckError {
    DecodingContainer { error: String },
    UnsupportedExtension { extension: String },
}

impl error::Error for JP2CheckError {}
impl fmt::Display for JP2CheckError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DecodingContainer { error } => {
                write!(f, "error decoding jp2 container {}", error)
            }
            Self::UnsupportedExtension { extension } => {
                write!(f, "unsupported extension {}", extension)
            }
        }
    }
}

#[derive(Parser)]
#[clap(name = "jp2check")]
struct Opts {
    #[clap(subcommand)]
    subcommand: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    /// Validate a .jp2/.jpx container or a raw .j2c codestream and print
    /// its report
    Validate(Validate),
}

#[derive(Parser)]
struct Validate {
    /// Path to the image file
    path: String,

    /// Bytes buffered per read when reassembling fragmented boxes
    #[clap(long, default_value_t = 8192)]
    buffer_size: usize,

    /// Record codestream locations without parsing their marker segments
    #[clap(long)]
    skip_codestreams: bool,
}

fn validate(c: &Validate) -> Result<Report, Box<dyn Error>> {
    let path = Path::new(&c.path);
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("")
        .to_ascii_lowercase();

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    match extension.as_str() {
        "jp2" | "jpx" | "jpf" | "jpm" => {
            let options = ParseOptions {
                fragment_buffer_size: c.buffer_size.max(1),
                parse_codestreams: !c.skip_codestreams,
            };
            match decode_jp2(&mut reader, &options) {
                Ok(jp2) => Ok(jp2.into_report()),
                Err(error) => Err(JP2CheckError::DecodingContainer {
                    error: error.to_string(),
                }
                .into()),
            }
        }
        "j2c" | "j2k" | "jpc" => Ok(decode_jpc(&mut reader)),
        _ => Err(JP2CheckError::UnsupportedExtension { extension }.into()),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opts: Opts = Opts::parse();

    match opts.subcommand {
        SubCommand::Validate(c) => {
            let report = validate(&c)?;
            println!("{}", c.path);
            print!("{}", report);
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    match run() {
        Err(e) => Err(e.to_string().into()),
        Ok(_) => Ok(()),
    }
}
