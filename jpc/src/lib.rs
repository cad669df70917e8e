//! JPEG 2000 codestream (ISO/IEC 15444-1 Annex A) marker parser.
//!
//! The parser walks the marker segments of the main header and of every
//! tile-part header, skipping the entropy-coded data of each tile-part
//! without interpreting it. Decoded segments are attached as properties to
//! the main header or to the tile whose header they appear in.

use log::{debug, info};
use report::{Property, Report};
use std::error;
use std::fmt;
use std::io;
use std::io::prelude::*;

mod model;
mod segment;

pub use model::{Codestream, Scope, Tile, TilePart};
pub use segment::{
    decode_packet_lengths, CodingStyleComponentSegment, CodingStyleMarkerSegment,
    CodingStyleParameters, CommentMarkerSegment, CommentRegistrationValue,
    ComponentRegistrationSegment, ImageAndTileSizeMarkerSegment, PackedPacketHeaderSegment,
    PacketLengthSegment, ProgressionOrder, ProgressionOrderChange, ProgressionOrderChangeSegment,
    QuantizationSegment, QuantizationStyle, RegionOfInterestSegment, SegmentContext,
    StartOfTileSegment, TilePartLengthsSegment, TransformationFilter,
};

#[derive(Debug)]
pub enum CodestreamError {
    IllFormed {
        offset: u64,
    },
    MarkerError {
        marker: MarkerSymbol,
        error: String,
    },
    MarkerMissing {
        marker: MarkerSymbol,
    },
    MarkerUnexpected {
        marker: MarkerSymbol,
        offset: u64,
    },
    MarkerDuplicate {
        marker: MarkerSymbol,
        offset: u64,
    },
    WrongPosition {
        marker: MarkerSymbol,
        offset: u64,
    },
    LengthInvalid {
        marker: MarkerSymbol,
        length: u16,
    },
    LengthMismatch {
        marker: MarkerSymbol,
        length: u16,
        consumed: u64,
    },
    ComponentOutOfRange {
        marker: MarkerSymbol,
        component: u16,
        components: u16,
    },
    TileIndexOutOfRange {
        tile_index: u16,
        tiles: u64,
    },
    TilePartOutOfSequence {
        tile_index: u16,
        expected: usize,
        found: u8,
    },
    TilePartOverrun {
        tile_index: u16,
        offset: u64,
    },
    PacketLengthTruncated,
    PacketLengthOverflow,
    UnexpectedEnd {
        offset: u64,
    },
    TileSizeOverflow {
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        reference_tile_width: u32,
        reference_tile_height: u32,
    },
    TileGridOffsetOverflow {
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
    },
}

impl error::Error for CodestreamError {}
impl fmt::Display for CodestreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::IllFormed { offset } => {
                write!(
                    f,
                    "ill-formed codestream: expected 0xFF at byte offset {}",
                    offset
                )
            }
            Self::MarkerError { marker, error } => {
                write!(f, "{} marker segment: {}", marker_name(*marker), error)
            }
            Self::MarkerMissing { marker } => {
                write!(f, "missing {} marker", marker_name(*marker))
            }
            Self::MarkerUnexpected { marker, offset } => {
                write!(
                    f,
                    "unexpected {} marker at byte offset {}",
                    marker_name(*marker),
                    offset
                )
            }
            Self::MarkerDuplicate { marker, offset } => {
                write!(
                    f,
                    "duplicate {} marker at byte offset {}",
                    marker_name(*marker),
                    offset
                )
            }
            Self::WrongPosition { marker, offset } => {
                write!(
                    f,
                    "{} marker segment at byte offset {} in wrong position in codestream",
                    marker_name(*marker),
                    offset
                )
            }
            Self::LengthInvalid { marker, length } => {
                write!(
                    f,
                    "{} marker segment has invalid length {}",
                    marker_name(*marker),
                    length
                )
            }
            Self::LengthMismatch {
                marker,
                length,
                consumed,
            } => {
                write!(
                    f,
                    "{} marker segment length {} does not match its contents ({} bytes)",
                    marker_name(*marker),
                    length,
                    consumed
                )
            }
            Self::ComponentOutOfRange {
                marker,
                component,
                components,
            } => {
                write!(
                    f,
                    "{} marker segment component index {} not below component count {}",
                    marker_name(*marker),
                    component,
                    components
                )
            }
            Self::TileIndexOutOfRange { tile_index, tiles } => {
                write!(
                    f,
                    "tile index {} not below tile count {}",
                    tile_index, tiles
                )
            }
            Self::TilePartOutOfSequence {
                tile_index,
                expected,
                found,
            } => {
                write!(
                    f,
                    "tile {} tile-part index {} out of sequence, expected {}",
                    tile_index, found, expected
                )
            }
            Self::TilePartOverrun { tile_index, offset } => {
                write!(
                    f,
                    "tile {} tile-part header runs past its declared length at byte offset {}",
                    tile_index, offset
                )
            }
            Self::PacketLengthTruncated => {
                write!(f, "packet length continues past the end of its field")
            }
            Self::PacketLengthOverflow => {
                write!(f, "packet length exceeds 32 bits")
            }
            Self::UnexpectedEnd { offset } => {
                write!(f, "premature end of codestream at byte offset {}", offset)
            }
            Self::TileGridOffsetOverflow {
                image_horizontal_offset,
                image_vertical_offset,
                tile_horizontal_offset,
                tile_vertical_offset,
            } => {
                write!(
                    f,
                    "tile grid offset overflow: XOSiz = {:?}, YOsiz = {:?}, XTOsiz = {:?}, YTOsiz = {:?}",
                    image_horizontal_offset,
                    image_vertical_offset,
                    tile_horizontal_offset,
                    tile_vertical_offset,
                )
            }
            // XTsiz + XTOsiz > XOsiz
            // YTsiz + YTOsiz > YOsiz
            Self::TileSizeOverflow {
                image_horizontal_offset,
                image_vertical_offset,
                tile_horizontal_offset,
                tile_vertical_offset,
                reference_tile_width,
                reference_tile_height,
            } => {
                write!(
                    f,
                    "tile size overflow: XOSiz = {:?}, YOsiz = {:?}, XTOsiz = {:?}, YTOsiz = {:?}, XTsize = {:?}, YTsize = {:?}",
                    image_horizontal_offset,
                    image_vertical_offset,
                    tile_horizontal_offset,
                    tile_vertical_offset,
                    reference_tile_width,
                    reference_tile_height,
                )
            }
        }
    }
}

pub type MarkerSymbol = [u8; 2];

// Delimiting markers and marker segments
const MARKER_SYMBOL_SOC: MarkerSymbol = [255, 79]; // Start of code stream
const MARKER_SYMBOL_SOT: MarkerSymbol = [255, 144]; // Start of tile-part
const MARKER_SYMBOL_SOD: MarkerSymbol = [255, 147]; // Start of data
const MARKER_SYMBOL_EOC: MarkerSymbol = [255, 217]; // End of codestream

// Fixed information marker segments
const MARKER_SYMBOL_SIZ: MarkerSymbol = [255, 81]; // Image and tile size

// Functional marker segments
const MARKER_SYMBOL_COD: MarkerSymbol = [255, 82]; // Coding style default
const MARKER_SYMBOL_COC: MarkerSymbol = [255, 83]; // Coding style component
const MARKER_SYMBOL_RGN: MarkerSymbol = [255, 94]; // Region-of-interest
const MARKER_SYMBOL_QCD: MarkerSymbol = [255, 92]; // Quantization default
const MARKER_SYMBOL_QCC: MarkerSymbol = [255, 93]; // Quantization component
const MARKER_SYMBOL_POC: MarkerSymbol = [255, 95]; // Progression order change

// Pointer marker segments
const MARKER_SYMBOL_TLM: MarkerSymbol = [255, 85]; // Tile-part lengths
const MARKER_SYMBOL_PLM: MarkerSymbol = [255, 87]; // Packet length, main header
const MARKER_SYMBOL_PLT: MarkerSymbol = [255, 88]; // Packet length, tile-part header
const MARKER_SYMBOL_PPM: MarkerSymbol = [255, 96]; // Packed packet headers, main header
const MARKER_SYMBOL_PPT: MarkerSymbol = [255, 97]; // Packed packet headers, tile-part header

// In bit stream markers and marker segments
const MARKER_SYMBOL_SOP: MarkerSymbol = [255, 145]; // Start of packet
const MARKER_SYMBOL_EPH: MarkerSymbol = [255, 146]; // End of packet header

// Informational marker segments
const MARKER_SYMBOL_CRG: MarkerSymbol = [255, 99]; // Component registration
const MARKER_SYMBOL_COM: MarkerSymbol = [255, 100]; // Comment

// SOT marker segment (12 bytes) followed by the SOD marker.
const MINIMUM_TILE_PART_LENGTH: u64 = 14;

pub fn marker_name(marker: MarkerSymbol) -> String {
    let name = match marker {
        MARKER_SYMBOL_SOC => "SOC",
        MARKER_SYMBOL_SOT => "SOT",
        MARKER_SYMBOL_SOD => "SOD",
        MARKER_SYMBOL_EOC => "EOC",
        MARKER_SYMBOL_SIZ => "SIZ",
        MARKER_SYMBOL_COD => "COD",
        MARKER_SYMBOL_COC => "COC",
        MARKER_SYMBOL_RGN => "RGN",
        MARKER_SYMBOL_QCD => "QCD",
        MARKER_SYMBOL_QCC => "QCC",
        MARKER_SYMBOL_POC => "POC",
        MARKER_SYMBOL_TLM => "TLM",
        MARKER_SYMBOL_PLM => "PLM",
        MARKER_SYMBOL_PLT => "PLT",
        MARKER_SYMBOL_PPM => "PPM",
        MARKER_SYMBOL_PPT => "PPT",
        MARKER_SYMBOL_SOP => "SOP",
        MARKER_SYMBOL_EPH => "EPH",
        MARKER_SYMBOL_CRG => "CRG",
        MARKER_SYMBOL_COM => "COM",
        _ => return format!("0x{:02X}{:02X}", marker[0], marker[1]),
    };
    name.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    AwaitingStart,
    InMainHeader,
    InTile(u16),
    InPacketData(u16),
    Closed,
}

// Counts bytes read so marker offsets can be reported without Seek.
struct Counter<'a, R> {
    inner: &'a mut R,
    position: u64,
}

impl<'a, R: io::Read> io::Read for Counter<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

#[derive(Debug, Default)]
struct MainHeaderMarkers {
    cod: bool,
    qcd: bool,
    checked: bool,
}

/// Codestream state machine.
///
/// Structural failures local to one marker segment are written to the report
/// and parsing resumes at the next segment; failures that leave the marker
/// boundary unknown are returned from [`parse`](CodestreamParser::parse).
pub struct CodestreamParser<'r> {
    report: &'r mut Report,
    offset: u64,
    position: u64,
    state: State,
    codestream: Codestream,
    main_header: MainHeaderMarkers,
    // Relative position of the end of the open tile-part, None when it runs
    // to the end of the codestream.
    tile_part_end: Option<u64>,
}

impl<'r> CodestreamParser<'r> {
    /// `offset` is the absolute position of the first codestream byte, used
    /// only for reporting.
    pub fn new(report: &'r mut Report, offset: u64) -> CodestreamParser<'r> {
        CodestreamParser {
            report,
            offset,
            position: 0,
            state: State::AwaitingStart,
            codestream: Codestream::new(offset),
            main_header: MainHeaderMarkers::default(),
            tile_part_end: None,
        }
    }

    pub fn into_codestream(self) -> Codestream {
        self.codestream
    }

    pub fn parse<R: io::Read>(&mut self, reader: &mut R) -> Result<(), Box<dyn error::Error>> {
        info!("Codestream start at byte offset {}", self.offset);
        let mut counter = Counter {
            inner: reader,
            position: 0,
        };
        let result = self.parse_markers(&mut counter);
        self.position = counter.position;
        self.codestream.set_length(counter.position);
        info!(
            "Codestream finish at byte offset {}",
            self.offset + counter.position
        );
        result
    }

    fn parse_markers<R: io::Read>(
        &mut self,
        reader: &mut Counter<R>,
    ) -> Result<(), Box<dyn error::Error>> {
        while self.state != State::Closed {
            let marker_offset = reader.position;
            let marker = match self.read_marker(reader)? {
                Some(marker) => marker,
                None if self.state == State::AwaitingStart => {
                    return Err(CodestreamError::MarkerMissing {
                        marker: MARKER_SYMBOL_SOC,
                    }
                    .into());
                }
                None => {
                    return Err(CodestreamError::MarkerMissing {
                        marker: MARKER_SYMBOL_EOC,
                    }
                    .into());
                }
            };
            let absolute = self.offset + marker_offset;
            debug!("{} at byte offset {}", marker_name(marker), absolute);

            match (self.state, marker) {
                (State::AwaitingStart, MARKER_SYMBOL_SOC) => {
                    self.state = State::InMainHeader;
                }
                (State::AwaitingStart, _) => {
                    return Err(CodestreamError::MarkerMissing {
                        marker: MARKER_SYMBOL_SOC,
                    }
                    .into());
                }
                (_, MARKER_SYMBOL_SOC) => {
                    self.report.malformed(
                        CodestreamError::MarkerDuplicate {
                            marker,
                            offset: absolute,
                        }
                        .to_string(),
                        absolute,
                    );
                }
                (_, MARKER_SYMBOL_EOC) => {
                    if self.state == State::InMainHeader {
                        self.check_main_header(absolute);
                    }
                    if let State::InTile(tile_index) = self.state {
                        self.report.malformed(
                            format!("tile {} tile-part has no SOD marker", tile_index),
                            absolute,
                        );
                    }
                    self.codestream.set_end_of_codestream();
                    self.state = State::Closed;
                }
                (State::InTile(tile_index), MARKER_SYMBOL_SOD) => {
                    self.skip_packet_data(reader, tile_index)?;
                }
                (State::InMainHeader, MARKER_SYMBOL_SOD) => {
                    // No SOT was read, so there is no packet data to skip.
                    self.check_main_header(absolute);
                    debug!("SOD without a tile-part at byte offset {}", absolute);
                    self.state = State::InPacketData(0);
                }
                (_, MARKER_SYMBOL_SOD) => {
                    return Err(CodestreamError::MarkerUnexpected {
                        marker,
                        offset: absolute,
                    }
                    .into());
                }
                (_, MARKER_SYMBOL_EPH) => {}
                (State::InPacketData(_), _) if marker != MARKER_SYMBOL_SOT => {
                    return Err(CodestreamError::MarkerUnexpected {
                        marker,
                        offset: absolute,
                    }
                    .into());
                }
                _ => {
                    self.read_segment(reader, marker, marker_offset)?;
                }
            }
        }
        Ok(())
    }

    fn read_marker<R: io::Read>(
        &mut self,
        reader: &mut Counter<R>,
    ) -> Result<Option<MarkerSymbol>, Box<dyn error::Error>> {
        let mut marker: MarkerSymbol = [0; 2];
        let offset = reader.position;
        if reader.read(&mut marker[..1])? == 0 {
            return Ok(None);
        }
        if marker[0] != 0xFF {
            return Err(CodestreamError::IllFormed {
                offset: self.offset + offset,
            }
            .into());
        }
        if reader.read(&mut marker[1..])? == 0 {
            return Err(CodestreamError::UnexpectedEnd {
                offset: self.offset + reader.position,
            }
            .into());
        }
        Ok(Some(marker))
    }

    fn read_segment<R: io::Read>(
        &mut self,
        reader: &mut Counter<R>,
        marker: MarkerSymbol,
        marker_offset: u64,
    ) -> Result<(), Box<dyn error::Error>> {
        let absolute = self.offset + marker_offset;
        let mut length: [u8; 2] = [0; 2];
        reader.read_exact(&mut length).map_err(|_| {
            Box::<dyn error::Error>::from(CodestreamError::UnexpectedEnd {
                offset: self.offset + reader.position,
            })
        })?;
        let length = u16::from_be_bytes(length);
        if length < 2 {
            return Err(CodestreamError::LengthInvalid { marker, length }.into());
        }
        let payload = (length - 2) as u64;

        let context = SegmentContext {
            components: self
                .codestream
                .image_and_tile_size()
                .map(|siz| siz.no_components()),
            payload: payload as usize,
            offset: absolute,
        };
        let mut segment = (&mut *reader).take(payload);
        let result = self.decode_segment(&mut segment, marker, &context, marker_offset);
        let leftover = segment.limit();
        if leftover > 0 {
            io::copy(&mut segment, &mut io::sink())?;
            if segment.limit() > 0 {
                return Err(CodestreamError::UnexpectedEnd {
                    offset: self.offset + reader.position,
                }
                .into());
            }
        }

        match result {
            Ok(()) if leftover > 0 => {
                self.report.malformed(
                    CodestreamError::LengthMismatch {
                        marker,
                        length,
                        consumed: payload - leftover + 2,
                    }
                    .to_string(),
                    absolute,
                );
            }
            Ok(()) => {}
            Err(error) => {
                let overran = match error.downcast_ref::<io::Error>() {
                    Some(e) => e.kind() == io::ErrorKind::UnexpectedEof,
                    None => false,
                };
                let message = if overran {
                    CodestreamError::LengthMismatch {
                        marker,
                        length,
                        consumed: payload + 2,
                    }
                    .to_string()
                        + ", contents run past the segment"
                } else {
                    error.to_string()
                };
                self.report.malformed(message, absolute);
            }
        }
        info!(
            "{} end at byte offset {}",
            marker_name(marker),
            self.offset + reader.position
        );
        Ok(())
    }

    fn scope(&mut self) -> &mut Scope {
        match self.state {
            State::InTile(tile_index) => self.codestream.tile_mut(tile_index).scope_mut(),
            _ => self.codestream.main_mut(),
        }
    }

    fn in_main_header(&self) -> bool {
        self.state == State::InMainHeader
    }

    fn require_main_header(&self, context: &SegmentContext, marker: MarkerSymbol) -> Result<(), Box<dyn error::Error>> {
        if !self.in_main_header() {
            return Err(CodestreamError::MarkerUnexpected {
                marker,
                offset: context.offset,
            }
            .into());
        }
        Ok(())
    }

    fn require_tile_header(&self, context: &SegmentContext, marker: MarkerSymbol) -> Result<(), Box<dyn error::Error>> {
        if let State::InTile(_) = self.state {
            return Ok(());
        }
        Err(CodestreamError::MarkerUnexpected {
            marker,
            offset: context.offset,
        }
        .into())
    }

    fn components(&self) -> u16 {
        self.codestream
            .image_and_tile_size()
            .map(|siz| siz.no_components())
            .unwrap_or(0)
    }

    fn report_violations(&mut self, violations: Vec<CodestreamError>, offset: u64) {
        for violation in violations {
            self.report.invalid(violation.to_string(), offset);
        }
    }

    fn decode_segment<R: io::Read>(
        &mut self,
        reader: &mut R,
        marker: MarkerSymbol,
        context: &SegmentContext,
        marker_offset: u64,
    ) -> Result<(), Box<dyn error::Error>> {
        match marker {
            MARKER_SYMBOL_SIZ => {
                self.require_main_header(context, marker)?;
                if self.codestream.image_and_tile_size().is_some() {
                    return Err(CodestreamError::MarkerDuplicate {
                        marker,
                        offset: context.offset,
                    }
                    .into());
                }
                let segment = segment::decode_siz(reader, context)?;
                self.report_violations(segment.violations(), context.offset);
                self.scope()
                    .add(Property::list("ImageAndTileSize", segment.properties()));
                self.codestream.set_siz(segment);
            }
            MARKER_SYMBOL_COD => {
                let segment = segment::decode_cod(reader, context)?;
                self.report_violations(segment.violations(), context.offset);
                if self.in_main_header() {
                    self.main_header.cod = true;
                }
                self.scope()
                    .add(Property::list("CodingStyleDefault", segment.properties()));
            }
            MARKER_SYMBOL_COC => {
                let segment = segment::decode_coc(reader, context)?;
                self.report_violations(segment.violations(self.components()), context.offset);
                self.scope()
                    .add(Property::list("CodingStyleComponent", segment.properties()));
            }
            MARKER_SYMBOL_QCD => {
                let segment = segment::decode_qcd(reader, context)?;
                self.report_violations(segment.violations(marker, self.components()), context.offset);
                if self.in_main_header() {
                    self.main_header.qcd = true;
                }
                self.scope()
                    .add(Property::list("QuantizationDefault", segment.properties()));
            }
            MARKER_SYMBOL_QCC => {
                let segment = segment::decode_qcc(reader, context)?;
                self.report_violations(segment.violations(marker, self.components()), context.offset);
                self.scope()
                    .add(Property::list("QuantizationComponent", segment.properties()));
            }
            MARKER_SYMBOL_RGN => {
                let segment = segment::decode_rgn(reader, context)?;
                self.report_violations(segment.violations(self.components()), context.offset);
                self.scope()
                    .add(Property::list("RegionOfInterest", segment.properties()));
            }
            MARKER_SYMBOL_POC => {
                let segment = segment::decode_poc(reader, context)?;
                self.report_violations(segment.violations(), context.offset);
                self.scope()
                    .add(Property::list("ProgressionOrderChange", segment.properties()));
            }
            MARKER_SYMBOL_TLM => {
                self.require_main_header(context, marker)?;
                let segment = segment::decode_tlm(reader, context)?;
                self.scope()
                    .add(Property::list("TilePartLengths", segment.properties()));
            }
            MARKER_SYMBOL_PLM => {
                self.require_main_header(context, marker)?;
                let segment = segment::decode_plm(reader, context)?;
                self.scope()
                    .add(Property::list("PacketLengths", segment.properties()));
            }
            MARKER_SYMBOL_PLT => {
                self.require_tile_header(context, marker)?;
                let segment = segment::decode_plt(reader, context)?;
                self.scope()
                    .add(Property::list("TilePacketLengths", segment.properties()));
            }
            MARKER_SYMBOL_PPM => {
                self.require_main_header(context, marker)?;
                let segment = segment::decode_packed_packet_headers(reader, context)?;
                self.scope()
                    .add(Property::list("PackedPacketHeaders", segment.properties()));
            }
            MARKER_SYMBOL_PPT => {
                self.require_tile_header(context, marker)?;
                let segment = segment::decode_packed_packet_headers(reader, context)?;
                self.scope()
                    .add(Property::list("TilePackedPacketHeaders", segment.properties()));
            }
            MARKER_SYMBOL_CRG => {
                self.require_main_header(context, marker)?;
                let segment = segment::decode_crg(reader, context)?;
                self.scope()
                    .add(Property::list("ComponentRegistration", segment.properties()));
            }
            MARKER_SYMBOL_COM => {
                let segment = segment::decode_com(reader, context)?;
                self.scope()
                    .add(Property::list("Comment", segment.properties()));
            }
            MARKER_SYMBOL_SOT => {
                self.start_tile_part(reader, context, marker_offset)?;
            }
            _ => {
                debug!(
                    "skipping {} marker segment at byte offset {}",
                    marker_name(marker),
                    context.offset
                );
                io::copy(reader, &mut io::sink())?;
            }
        }
        Ok(())
    }

    fn check_main_header(&mut self, offset: u64) {
        if self.main_header.checked {
            return;
        }
        self.main_header.checked = true;
        if self.codestream.image_and_tile_size().is_none() {
            self.report.malformed(
                CodestreamError::MarkerMissing {
                    marker: MARKER_SYMBOL_SIZ,
                }
                .to_string(),
                offset,
            );
        }
        if !self.main_header.cod {
            self.report.malformed(
                CodestreamError::MarkerMissing {
                    marker: MARKER_SYMBOL_COD,
                }
                .to_string(),
                offset,
            );
        }
        if !self.main_header.qcd {
            self.report.malformed(
                CodestreamError::MarkerMissing {
                    marker: MARKER_SYMBOL_QCD,
                }
                .to_string(),
                offset,
            );
        }
    }

    fn start_tile_part<R: io::Read>(
        &mut self,
        reader: &mut R,
        context: &SegmentContext,
        marker_offset: u64,
    ) -> Result<(), Box<dyn error::Error>> {
        if self.state == State::InMainHeader {
            self.check_main_header(context.offset);
        }
        if let State::InTile(tile_index) = self.state {
            self.report.malformed(
                format!("tile {} tile-part has no SOD marker", tile_index),
                context.offset,
            );
        }
        let sot = segment::decode_sot(reader, context)?;
        let tile_index = sot.tile_index();

        if let Some(siz) = self.codestream.image_and_tile_size() {
            let tiles = siz.num_tiles();
            if tile_index as u64 >= tiles {
                self.report.invalid(
                    CodestreamError::TileIndexOutOfRange { tile_index, tiles }.to_string(),
                    context.offset,
                );
            }
        }

        let tile = self.codestream.tile_mut(tile_index);
        let expected = tile.parts().len();
        tile.push_part(TilePart::new(
            sot.tile_part_index(),
            sot.no_tile_parts(),
            sot.tile_part_length(),
            context.offset,
        ));
        if sot.tile_part_index() as usize != expected {
            self.report.invalid(
                CodestreamError::TilePartOutOfSequence {
                    tile_index,
                    expected,
                    found: sot.tile_part_index(),
                }
                .to_string(),
                context.offset,
            );
        }
        if sot.no_tile_parts() != 0 && sot.tile_part_index() >= sot.no_tile_parts() {
            self.report.invalid(
                format!(
                    "tile {} tile-part index {} not below tile-part count {}",
                    tile_index,
                    sot.tile_part_index(),
                    sot.no_tile_parts()
                ),
                context.offset,
            );
        }

        self.tile_part_end = match sot.tile_part_length() as u64 {
            0 => None,
            length if length < MINIMUM_TILE_PART_LENGTH => {
                return Err(CodestreamError::MarkerError {
                    marker: MARKER_SYMBOL_SOT,
                    error: format!("tile-part length {} too small", length),
                }
                .into());
            }
            length => Some(marker_offset + length),
        };
        self.state = State::InTile(tile_index);
        Ok(())
    }

    fn skip_packet_data<R: io::Read>(
        &mut self,
        reader: &mut Counter<R>,
        tile_index: u16,
    ) -> Result<(), Box<dyn error::Error>> {
        match self.tile_part_end {
            Some(end) => {
                if end < reader.position {
                    return Err(CodestreamError::TilePartOverrun {
                        tile_index,
                        offset: self.offset + reader.position,
                    }
                    .into());
                }
                let countdown = end - reader.position;
                debug!("skipping {} bytes of tile {} data", countdown, tile_index);
                let skipped = io::copy(&mut (&mut *reader).take(countdown), &mut io::sink())?;
                if skipped < countdown {
                    return Err(CodestreamError::UnexpectedEnd {
                        offset: self.offset + reader.position,
                    }
                    .into());
                }
                self.state = State::InPacketData(tile_index);
            }
            None => {
                // The last tile-part runs to the end of the codestream, whose
                // final two bytes are the EOC marker.
                let mut buffer = [0u8; 8192];
                let mut tail: [u8; 2] = [0; 2];
                let mut total: u64 = 0;
                loop {
                    let n = reader.read(&mut buffer)?;
                    if n == 0 {
                        break;
                    }
                    if n >= 2 {
                        tail.copy_from_slice(&buffer[n - 2..n]);
                    } else {
                        tail = [tail[1], buffer[0]];
                    }
                    total += n as u64;
                }
                if total >= 2 && tail == MARKER_SYMBOL_EOC {
                    self.codestream.set_end_of_codestream();
                    self.state = State::Closed;
                } else {
                    return Err(CodestreamError::MarkerMissing {
                        marker: MARKER_SYMBOL_EOC,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// Parses one codestream, recording every failure in `report`, and returns
/// whatever structure was recovered.
pub fn parse_codestream<R: io::Read>(reader: &mut R, offset: u64, report: &mut Report) -> Codestream {
    let mut parser = CodestreamParser::new(report, offset);
    if let Err(error) = parser.parse(reader) {
        let at = parser.offset + parser.position;
        parser.report.malformed(error.to_string(), at);
    }
    parser.into_codestream()
}

/// Validates a raw codestream file (`.j2c`, `.j2k`).
pub fn decode_jpc<R: io::Read>(reader: &mut R) -> Report {
    let mut report = Report::new();
    let codestream = parse_codestream(reader, 0, &mut report);
    report.add_property(Property::list("Codestream", codestream.properties()));
    report
}
