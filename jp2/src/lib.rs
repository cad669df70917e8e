//! Structural validation and metadata extraction for JP2 and JPX files.
//!
//! [`decode_jp2`] walks the box structure of a file, checks it against the
//! rules of ISO/IEC 15444-1 Annex I and ISO/IEC 15444-2 Annex M, runs the
//! codestream parser over each contiguous or fragmented codestream and
//! records everything it finds in a [`Report`].

use log::info;
use report::Report;
use std::error;
use std::fmt;
use std::io;

mod boxes;
mod dispatch;
mod fragment;
mod header;
mod iter;
mod parser;
mod source;

pub use boxes::{
    uuid_text, BitsPerComponentBox, ChannelDefinitionBox, ColourSpecificationBox,
    ComponentMappingBox, FileTypeBox, FragmentListBox, ImageHeaderBox, JBox, PaletteBox,
    ReaderRequirementsBox, SignatureBox, FILTER_DEFLATE,
};
pub use dispatch::{BoxKind, Container};
pub use fragment::{Fragment, FragmentReader};
pub use header::{box_type_name, decode_box_header, BoxHeader, BoxType};
pub use parser::Profile;

#[derive(Debug)]
pub enum JP2Error {
    InvalidSignature {
        signature: [u8; 4],
        offset: u64,
    },
    NotCompatible {
        compatibility_list: Vec<String>,
    },
    PrematureEnd {
        offset: u64,
    },
    BoxLengthInvalid {
        box_type: BoxType,
        length: u64,
        offset: u64,
    },
    BoxUnexpected {
        box_type: BoxType,
        container: String,
        offset: u64,
    },
    BoxDuplicate {
        box_type: BoxType,
        offset: u64,
    },
    BoxMalformed {
        box_type: BoxType,
        reason: String,
        offset: u64,
    },
    BoxMissing {
        box_type: BoxType,
        container: String,
    },
    Overrun {
        box_type: BoxType,
        container: String,
        excess: u64,
        offset: u64,
    },
    // Raised after the failure has already been reported.
    Aborted,
}

impl error::Error for JP2Error {}
impl fmt::Display for JP2Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidSignature { signature, offset } => {
                write!(f, "invalid signature {:?} at offset {}", signature, offset)
            }
            Self::NotCompatible { compatibility_list } => {
                write!(
                    f,
                    "neither 'jp2 ' nor 'jpx ' found in compatibility list '{}'",
                    compatibility_list.join(", ")
                )
            }
            Self::PrematureEnd { offset } => {
                write!(f, "premature end of file at offset {}", offset)
            }
            Self::BoxLengthInvalid {
                box_type,
                length,
                offset,
            } => {
                write!(
                    f,
                    "invalid length {} for box type {} at offset {}",
                    length,
                    box_type_name(box_type),
                    offset
                )
            }
            Self::BoxUnexpected {
                box_type,
                container,
                offset,
            } => {
                write!(
                    f,
                    "box type {} at offset {} may not occur in {}",
                    box_type_name(box_type),
                    offset,
                    container
                )
            }
            Self::BoxDuplicate { box_type, offset } => {
                write!(
                    f,
                    "unexpected duplicate box type {} at offset {}",
                    box_type_name(box_type),
                    offset
                )
            }
            Self::BoxMalformed {
                box_type,
                reason,
                offset,
            } => {
                write!(
                    f,
                    "malformed box type {} at offset {}: {}",
                    box_type_name(box_type),
                    offset,
                    reason
                )
            }
            Self::BoxMissing {
                box_type,
                container,
            } => {
                write!(f, "box type {} missing from {}", box_type_name(box_type), container)
            }
            Self::Overrun {
                box_type,
                container,
                excess,
                offset,
            } => {
                write!(
                    f,
                    "Box overrun: box type {} at offset {} runs {} byte(s) past the end of the {}",
                    box_type_name(box_type),
                    offset,
                    excess,
                    container
                )
            }
            Self::Aborted => write!(f, "parse aborted"),
        }
    }
}

/// Knobs for one call to [`decode_jp2`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Bytes buffered per refill when reading fragmented data.
    pub fragment_buffer_size: usize,
    /// Run the codestream parser over each codestream; when false only the
    /// location of each codestream is recorded.
    pub parse_codestreams: bool,
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions {
            fragment_buffer_size: 8192,
            parse_codestreams: true,
        }
    }
}

#[derive(Debug)]
pub struct JP2File {
    length: u64,
    report: Report,
}

impl JP2File {
    /// Bytes covered by the top-level boxes that were read.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }
}

/// Validates a JP2 or JPX file read from `reader`.
///
/// Structural and conformance failures end up in the returned report; an
/// error is only returned when the reader itself cannot be positioned.
pub fn decode_jp2<R: io::Read + io::Seek>(
    reader: &mut R,
    options: &ParseOptions,
) -> Result<JP2File, Box<dyn error::Error>> {
    info!("JP2 decode start");
    let mut report = Report::new();
    let mut source = source::Source::new(reader)?;
    let length = parser::Parser::new(&mut report, options).parse(&mut source);
    info!(
        "JP2 decode finish: {} byte(s), well-formed {}, valid {}",
        length,
        report.is_well_formed(),
        report.is_valid()
    );
    Ok(JP2File { length, report })
}
