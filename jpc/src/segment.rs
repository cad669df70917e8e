use log::{debug, info};
use report::Property;
use std::error;
use std::io;
use std::str;

use super::{CodestreamError, MarkerSymbol};
use super::{
    MARKER_SYMBOL_COC, MARKER_SYMBOL_CRG, MARKER_SYMBOL_PLM, MARKER_SYMBOL_PLT,
    MARKER_SYMBOL_POC, MARKER_SYMBOL_QCC, MARKER_SYMBOL_RGN, MARKER_SYMBOL_SIZ,
    MARKER_SYMBOL_TLM,
};

// Component indices are 8 bits wide while Csiz < 257, 16 bits otherwise.
const COMPONENT_INDEX_WIDE_THRESHOLD: u16 = 257;

const MAXIMUM_COMPONENTS: u16 = 16384;
const MAXIMUM_COMPONENT_DEPTH: u8 = 38;

#[derive(Debug, PartialEq)]
pub enum ProgressionOrder {
    // 0000 0000 Layer-resolution level-component-position progression
    LRLCPP,

    // 0000 0001 Resolution level-layer-component-position progression
    RLLCPP,

    // 0000 0010 Resolution level-position-component-layer progression
    RLPCLP,

    // 0000 0011 Position-component-resolution level-layer progression
    PCRLLP,

    // 0000 0100 Component-position-resolution level-layer progression
    CPRLLP,

    // All other values reserved
    Reserved { value: u8 },
}

impl ProgressionOrder {
    pub fn new(value: u8) -> ProgressionOrder {
        match value {
            0b0000_0000 => ProgressionOrder::LRLCPP,
            0b0000_0001 => ProgressionOrder::RLLCPP,
            0b0000_0010 => ProgressionOrder::RLPCLP,
            0b0000_0011 => ProgressionOrder::PCRLLP,
            0b0000_0100 => ProgressionOrder::CPRLLP,
            _ => ProgressionOrder::Reserved { value },
        }
    }

    pub fn name(&self) -> String {
        match self {
            ProgressionOrder::LRLCPP => "LRCP".to_string(),
            ProgressionOrder::RLLCPP => "RLCP".to_string(),
            ProgressionOrder::RLPCLP => "RPCL".to_string(),
            ProgressionOrder::PCRLLP => "PCRL".to_string(),
            ProgressionOrder::CPRLLP => "CPRL".to_string(),
            ProgressionOrder::Reserved { value } => format!("reserved ({})", value),
        }
    }
}

const TRANSFORMATION_FILTER_IRREVERSIBLE: u8 = 0;
const TRANSFORMATION_FILTER_REVERSIBLE: u8 = 1;

#[derive(Debug, PartialEq)]
pub enum TransformationFilter {
    // 9-7 irreversible filter
    Irreversible,
    // 5-3 reversible filter
    Reversible,

    // All other values reserved
    Reserved { value: u8 },
}

impl TransformationFilter {
    pub fn new(value: u8) -> TransformationFilter {
        match value {
            TRANSFORMATION_FILTER_IRREVERSIBLE => TransformationFilter::Irreversible,
            TRANSFORMATION_FILTER_REVERSIBLE => TransformationFilter::Reversible,
            _ => TransformationFilter::Reserved { value },
        }
    }

    pub fn name(&self) -> String {
        match self {
            TransformationFilter::Irreversible => "9-7 irreversible".to_string(),
            TransformationFilter::Reversible => "5-3 reversible".to_string(),
            TransformationFilter::Reserved { value } => format!("reserved ({})", value),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum QuantizationStyle {
    No { guard: u8 },
    ScalarDerived { guard: u8 },
    ScalarExpounded { guard: u8 },
    Reserved { value: u8 },
}

impl QuantizationStyle {
    pub fn new(byte: u8) -> QuantizationStyle {
        // xxx0 0000 No quantization
        // xxx0 0001 Scalar derived
        // xxx0 0010 Scalar expounded
        // 000x xxxx - 111x xxxx Number of guard bits 0-7
        let guard = byte >> 5;
        match byte & 0b0001_1111 {
            0 => QuantizationStyle::No { guard },
            1 => QuantizationStyle::ScalarDerived { guard },
            2 => QuantizationStyle::ScalarExpounded { guard },
            _ => QuantizationStyle::Reserved { value: byte },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QuantizationStyle::No { .. } => "none",
            QuantizationStyle::ScalarDerived { .. } => "scalar derived",
            QuantizationStyle::ScalarExpounded { .. } => "scalar expounded",
            QuantizationStyle::Reserved { .. } => "reserved",
        }
    }

    // Bytes per step-size value: one for reversible (exponent only), two for
    // the scalar styles (exponent and mantissa).
    fn value_width(&self) -> Option<usize> {
        match self {
            QuantizationStyle::No { .. } => Some(1),
            QuantizationStyle::ScalarDerived { .. } => Some(2),
            QuantizationStyle::ScalarExpounded { .. } => Some(2),
            QuantizationStyle::Reserved { .. } => None,
        }
    }
}

fn read_u8<R: io::Read>(reader: &mut R) -> Result<u8, Box<dyn error::Error>> {
    let mut buffer: [u8; 1] = [0; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

fn read_u16<R: io::Read>(reader: &mut R) -> Result<u16, Box<dyn error::Error>> {
    let mut buffer: [u8; 2] = [0; 2];
    reader.read_exact(&mut buffer)?;
    Ok(u16::from_be_bytes(buffer))
}

fn read_u32<R: io::Read>(reader: &mut R) -> Result<u32, Box<dyn error::Error>> {
    let mut buffer: [u8; 4] = [0; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

fn read_remaining<R: io::Read>(reader: &mut R) -> Result<Vec<u8>, Box<dyn error::Error>> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// What a handler may know about the codestream before decoding a segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentContext {
    /// Csiz from SIZ, once SIZ has been decoded.
    pub components: Option<u16>,
    /// Payload bytes following the length field (L - 2).
    pub payload: usize,
    pub offset: u64,
}

impl SegmentContext {
    fn require_components(&self, marker: MarkerSymbol) -> Result<u16, Box<dyn error::Error>> {
        match self.components {
            Some(components) => Ok(components),
            None => Err(CodestreamError::WrongPosition {
                marker,
                offset: self.offset,
            }
            .into()),
        }
    }

    fn component_index_width(&self, marker: MarkerSymbol) -> Result<usize, Box<dyn error::Error>> {
        if self.require_components(marker)? < COMPONENT_INDEX_WIDE_THRESHOLD {
            Ok(1)
        } else {
            Ok(2)
        }
    }
}

fn decode_component_index<R: io::Read>(
    reader: &mut R,
    width: usize,
) -> Result<u16, Box<dyn error::Error>> {
    if width == 1 {
        Ok(read_u8(reader)? as u16)
    } else {
        read_u16(reader)
    }
}

/// Decodes a run of 7-bit packet lengths.
///
/// Each byte carries seven bits of the value, most significant chunk first;
/// the high bit is set on every byte except the last of a value.
pub fn decode_packet_lengths(bytes: &[u8]) -> Result<Vec<u32>, Box<dyn error::Error>> {
    let mut lengths = Vec::new();
    let mut value: u64 = 0;
    let mut pending = false;
    for byte in bytes {
        value = (value << 7) | (byte & 0b0111_1111) as u64;
        if value > u32::MAX as u64 {
            return Err(CodestreamError::PacketLengthOverflow.into());
        }
        if byte & 0b1000_0000 != 0 {
            pending = true;
        } else {
            lengths.push(value as u32);
            value = 0;
            pending = false;
        }
    }
    if pending {
        return Err(CodestreamError::PacketLengthTruncated.into());
    }
    Ok(lengths)
}

// A.5.1
//
// Image and tile size (SIZ)
//
// Function: Provides information about the uncompressed image such as the
// width and height of the reference grid, the width and height of the tiles,
// the number of components, component bit depth, and the separation of
// component samples with respect to the reference grid.
//
// Usage: Main header. There shall be one and only one in the main header
// immediately after the SOC marker segment.
#[derive(Debug, Default, Clone)]
pub struct ImageAndTileSizeMarkerSegment {
    decoder_capabilities: [u8; 2],
    reference_grid_width: [u8; 4],
    reference_grid_height: [u8; 4],
    image_horizontal_offset: [u8; 4],
    image_vertical_offset: [u8; 4],
    reference_tile_width: [u8; 4],
    reference_tile_height: [u8; 4],
    tile_horizontal_offset: [u8; 4],
    tile_vertical_offset: [u8; 4],
    no_components: [u8; 2],
    precision: Vec<u8>,
    horizontal_separation: Vec<u8>,
    vertical_separation: Vec<u8>,
}

impl ImageAndTileSizeMarkerSegment {
    pub fn decoder_capabilities(&self) -> u16 {
        u16::from_be_bytes(self.decoder_capabilities)
    }

    // Xsiz
    pub fn reference_grid_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_width)
    }

    // Ysiz
    pub fn reference_grid_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_height)
    }

    // XOsiz
    pub fn image_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_horizontal_offset)
    }

    // YOsiz
    pub fn image_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_vertical_offset)
    }

    // XTsiz
    pub fn reference_tile_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_width)
    }

    // YTsiz
    pub fn reference_tile_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_height)
    }

    // XTOsiz
    pub fn tile_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_horizontal_offset)
    }

    // YTOsiz
    pub fn tile_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_vertical_offset)
    }

    // Csiz
    pub fn no_components(&self) -> u16 {
        u16::from_be_bytes(self.no_components)
    }

    /// Image area width, Xsiz - XOsiz.
    pub fn width(&self) -> u32 {
        self.reference_grid_width()
            .saturating_sub(self.image_horizontal_offset())
    }

    /// Image area height, Ysiz - YOsiz.
    pub fn height(&self) -> u32 {
        self.reference_grid_height()
            .saturating_sub(self.image_vertical_offset())
    }

    /// Component bit depth, counting the sign bit.
    pub fn precision(&self, i: usize) -> Option<u8> {
        self.precision.get(i).map(|ssiz| (ssiz & 0b0111_1111) + 1)
    }

    pub fn values_are_signed(&self, i: usize) -> Option<bool> {
        self.precision.get(i).map(|ssiz| ssiz & 0b1000_0000 != 0)
    }

    pub fn horizontal_separation(&self, i: usize) -> Option<u8> {
        self.horizontal_separation.get(i).copied()
    }

    pub fn vertical_separation(&self, i: usize) -> Option<u8> {
        self.vertical_separation.get(i).copied()
    }

    fn num_x_tiles(&self) -> u32 {
        let tile_width = self.reference_tile_width().max(1) as u64;
        let span = (self.reference_grid_width() as u64)
            .saturating_sub(self.tile_horizontal_offset() as u64);
        ((span + tile_width - 1) / tile_width) as u32
    }

    fn num_y_tiles(&self) -> u32 {
        let tile_height = self.reference_tile_height().max(1) as u64;
        let span = (self.reference_grid_height() as u64)
            .saturating_sub(self.tile_vertical_offset() as u64);
        ((span + tile_height - 1) / tile_height) as u32
    }

    /// Number of tiles on the reference grid (B-5, B-6).
    pub fn num_tiles(&self) -> u64 {
        self.num_x_tiles() as u64 * self.num_y_tiles() as u64
    }

    /// Normative constraints on the decoded values; each entry is one
    /// conformance failure.
    pub fn violations(&self) -> Vec<CodestreamError> {
        let mut violations = vec![];

        // 0 ≤ XTOsiz ≤ XOsiz
        // 0 ≤ YTOsiz ≤ YOsiz
        if self.tile_horizontal_offset() > self.image_horizontal_offset()
            || self.tile_vertical_offset() > self.image_vertical_offset()
        {
            violations.push(CodestreamError::TileGridOffsetOverflow {
                tile_horizontal_offset: self.tile_horizontal_offset(),
                image_horizontal_offset: self.image_horizontal_offset(),
                tile_vertical_offset: self.tile_vertical_offset(),
                image_vertical_offset: self.image_vertical_offset(),
            });
        }

        // XTsiz + XTOsiz > XOsiz
        // YTsiz + YTOsiz > YOsiz
        if (self.reference_tile_width() as u64 + self.tile_horizontal_offset() as u64)
            <= self.image_horizontal_offset() as u64
            || (self.reference_tile_height() as u64 + self.tile_vertical_offset() as u64)
                <= self.image_vertical_offset() as u64
        {
            violations.push(CodestreamError::TileSizeOverflow {
                reference_tile_width: self.reference_tile_width(),
                tile_horizontal_offset: self.tile_horizontal_offset(),
                image_horizontal_offset: self.image_horizontal_offset(),
                reference_tile_height: self.reference_tile_height(),
                tile_vertical_offset: self.tile_vertical_offset(),
                image_vertical_offset: self.image_vertical_offset(),
            });
        }

        if self.no_components() == 0 || self.no_components() > MAXIMUM_COMPONENTS {
            violations.push(CodestreamError::MarkerError {
                marker: MARKER_SYMBOL_SIZ,
                error: format!("component count {} out of range", self.no_components()),
            });
        }

        for i in 0..self.precision.len() {
            if self.precision(i).unwrap_or(0) > MAXIMUM_COMPONENT_DEPTH {
                violations.push(CodestreamError::MarkerError {
                    marker: MARKER_SYMBOL_SIZ,
                    error: format!("component {} bit depth out of range", i),
                });
            }
            if self.horizontal_separation[i] == 0 || self.vertical_separation[i] == 0 {
                violations.push(CodestreamError::MarkerError {
                    marker: MARKER_SYMBOL_SIZ,
                    error: format!("component {} has a zero sample separation", i),
                });
            }
        }

        violations
    }

    pub fn properties(&self) -> Vec<Property> {
        let mut components = Vec::with_capacity(self.precision.len());
        for i in 0..self.precision.len() {
            components.push(Property::list(
                "Component",
                vec![
                    Property::integer("precision", self.precision(i).unwrap_or(0)),
                    Property::boolean("signed", self.values_are_signed(i).unwrap_or(false)),
                    Property::integer("horizontalSeparation", self.horizontal_separation[i]),
                    Property::integer("verticalSeparation", self.vertical_separation[i]),
                ],
            ));
        }

        vec![
            Property::integer("decoderCapabilities", self.decoder_capabilities()),
            Property::integer("referenceGridWidth", self.reference_grid_width()),
            Property::integer("referenceGridHeight", self.reference_grid_height()),
            Property::integer("imageHorizontalOffset", self.image_horizontal_offset()),
            Property::integer("imageVerticalOffset", self.image_vertical_offset()),
            Property::integer("referenceTileWidth", self.reference_tile_width()),
            Property::integer("referenceTileHeight", self.reference_tile_height()),
            Property::integer("tileHorizontalOffset", self.tile_horizontal_offset()),
            Property::integer("tileVerticalOffset", self.tile_vertical_offset()),
            Property::integer("componentCount", self.no_components()),
            Property::list("Components", components),
        ]
    }
}

pub fn decode_siz<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<ImageAndTileSizeMarkerSegment, Box<dyn error::Error>> {
    info!("SIZ start at byte offset {}", context.offset);
    let mut segment = ImageAndTileSizeMarkerSegment::default();

    reader.read_exact(&mut segment.decoder_capabilities)?;
    reader.read_exact(&mut segment.reference_grid_width)?;
    reader.read_exact(&mut segment.reference_grid_height)?;
    reader.read_exact(&mut segment.image_horizontal_offset)?;
    reader.read_exact(&mut segment.image_vertical_offset)?;
    reader.read_exact(&mut segment.reference_tile_width)?;
    reader.read_exact(&mut segment.reference_tile_height)?;
    reader.read_exact(&mut segment.tile_horizontal_offset)?;
    reader.read_exact(&mut segment.tile_vertical_offset)?;
    reader.read_exact(&mut segment.no_components)?;

    // Lsiz = 38 + 3 * Csiz
    let no_components = segment.no_components() as usize;
    if context.payload != 36 + 3 * no_components {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_SIZ,
            error: format!(
                "length {} does not match {} components",
                context.payload + 2,
                no_components
            ),
        }
        .into());
    }

    segment.precision = Vec::with_capacity(no_components);
    segment.horizontal_separation = Vec::with_capacity(no_components);
    segment.vertical_separation = Vec::with_capacity(no_components);
    for _ in 0..no_components {
        segment.precision.push(read_u8(reader)?);
        segment.horizontal_separation.push(read_u8(reader)?);
        segment.vertical_separation.push(read_u8(reader)?);
    }
    debug!(
        "SIZ {}x{} with {} components",
        segment.width(),
        segment.height(),
        no_components
    );

    Ok(segment)
}

// A.4.2
//
// Start of tile-part (SOT)
//
// Function: Marks the beginning of a tile-part, the index of its tile, and the
// index of its tile-part. The tile-parts of a given tile shall appear in order
// (see TPsot) in the codestream. However, tile-parts from other tiles may be
// interleaved in the codestream.
#[derive(Debug, Default)]
pub struct StartOfTileSegment {
    tile_index: [u8; 2],
    tile_part_length: [u8; 4],
    tile_part_index: [u8; 1],
    no_tile_parts: [u8; 1],
}

impl StartOfTileSegment {
    // Isot
    pub fn tile_index(&self) -> u16 {
        u16::from_be_bytes(self.tile_index)
    }

    // Psot, measured from the first byte of the SOT marker. Zero means the
    // tile-part runs to the EOC marker.
    pub fn tile_part_length(&self) -> u32 {
        u32::from_be_bytes(self.tile_part_length)
    }

    // TPsot
    pub fn tile_part_index(&self) -> u8 {
        self.tile_part_index[0]
    }

    // TNsot, zero when not defined in this tile-part
    pub fn no_tile_parts(&self) -> u8 {
        self.no_tile_parts[0]
    }
}

pub fn decode_sot<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<StartOfTileSegment, Box<dyn error::Error>> {
    info!("SOT start at byte offset {}", context.offset);
    // Lsot is fixed at 10.
    if context.payload != 8 {
        return Err(CodestreamError::MarkerError {
            marker: super::MARKER_SYMBOL_SOT,
            error: format!("length {} is not 10", context.payload + 2),
        }
        .into());
    }
    let mut segment = StartOfTileSegment::default();
    reader.read_exact(&mut segment.tile_index)?;
    reader.read_exact(&mut segment.tile_part_length)?;
    reader.read_exact(&mut segment.tile_part_index)?;
    reader.read_exact(&mut segment.no_tile_parts)?;
    Ok(segment)
}

// Table A.16 – Coding style parameter values of the SPcod and SPcoc parameters
#[derive(Debug, Default)]
pub struct CodingStyleParameters {
    no_decomposition_levels: u8,
    code_block_width: u8,
    code_block_height: u8,
    code_block_style: u8,
    transformation: u8,
    precinct_sizes: Vec<u8>,
}

impl CodingStyleParameters {
    pub fn no_decomposition_levels(&self) -> u8 {
        self.no_decomposition_levels
    }

    // xcb = value + 2
    pub fn code_block_width(&self) -> u32 {
        1 << (self.code_block_width as u32 + 2).min(31)
    }

    // ycb = value + 2
    pub fn code_block_height(&self) -> u32 {
        1 << (self.code_block_height as u32 + 2).min(31)
    }

    pub fn code_block_style(&self) -> u8 {
        self.code_block_style
    }

    pub fn transformation(&self) -> TransformationFilter {
        TransformationFilter::new(self.transformation)
    }

    /// Precinct sizes as (PPx, PPy) exponents, one pair per resolution level.
    pub fn precinct_sizes(&self) -> Vec<(u8, u8)> {
        self.precinct_sizes
            .iter()
            .map(|size| (size & 0x0F, size >> 4))
            .collect()
    }

    fn violations(&self, marker: MarkerSymbol) -> Vec<CodestreamError> {
        let mut violations = vec![];
        if self.no_decomposition_levels > 32 {
            violations.push(CodestreamError::MarkerError {
                marker,
                error: format!(
                    "{} decomposition levels exceeds 32",
                    self.no_decomposition_levels
                ),
            });
        }
        // Code-block exponents xcb, ycb are in 2..=10 and xcb + ycb <= 12.
        if self.code_block_width > 8
            || self.code_block_height > 8
            || self.code_block_width + self.code_block_height > 8
        {
            violations.push(CodestreamError::MarkerError {
                marker,
                error: "code-block size out of range".to_string(),
            });
        }
        if let TransformationFilter::Reserved { value } = self.transformation() {
            violations.push(CodestreamError::MarkerError {
                marker,
                error: format!("reserved transformation {}", value),
            });
        }
        violations
    }

    fn properties(&self, properties: &mut Vec<Property>) {
        properties.push(Property::integer(
            "decompositionLevels",
            self.no_decomposition_levels,
        ));
        properties.push(Property::integer("codeBlockWidth", self.code_block_width()));
        properties.push(Property::integer("codeBlockHeight", self.code_block_height()));
        properties.push(Property::integer("codeBlockStyle", self.code_block_style));
        properties.push(Property::text("transformation", self.transformation().name()));
        if !self.precinct_sizes.is_empty() {
            let sizes: Vec<u8> = self.precinct_sizes.clone();
            properties.push(Property::integers("precinctSizes", &sizes));
        }
    }
}

fn decode_coding_style_parameters<R: io::Read>(
    reader: &mut R,
    has_precincts: bool,
) -> Result<CodingStyleParameters, Box<dyn error::Error>> {
    let mut parameters = CodingStyleParameters {
        no_decomposition_levels: read_u8(reader)?,
        code_block_width: read_u8(reader)?,
        code_block_height: read_u8(reader)?,
        code_block_style: read_u8(reader)?,
        transformation: read_u8(reader)?,
        ..Default::default()
    };
    if has_precincts {
        let levels = parameters.no_decomposition_levels as usize + 1;
        parameters.precinct_sizes = vec![0; levels];
        reader.read_exact(&mut parameters.precinct_sizes)?;
    }
    Ok(parameters)
}

// A.6.1
//
// Coding style default (COD)
//
// Function: Describes the coding style, number of decomposition levels, and
// layering that is the default used for compressing all components of an
// image (if in the main header) or a tile (if in the tile-part header).
#[derive(Debug, Default)]
pub struct CodingStyleMarkerSegment {
    coding_style: u8,
    progression_order: u8,
    no_layers: [u8; 2],
    multiple_component_transformation: u8,
    parameters: CodingStyleParameters,
}

impl CodingStyleMarkerSegment {
    pub fn coding_style(&self) -> u8 {
        self.coding_style
    }

    // xxxx xxx1 Entropy coder with precincts defined below
    pub fn has_defined_precincts(&self) -> bool {
        self.coding_style & 0b0000_0001 != 0
    }

    // xxxx xx1x SOP marker segments may be used
    pub fn may_use_sop(&self) -> bool {
        self.coding_style & 0b0000_0010 != 0
    }

    // xxxx x1xx EPH marker may be used
    pub fn may_use_eph(&self) -> bool {
        self.coding_style & 0b0000_0100 != 0
    }

    pub fn progression_order(&self) -> ProgressionOrder {
        ProgressionOrder::new(self.progression_order)
    }

    pub fn no_layers(&self) -> u16 {
        u16::from_be_bytes(self.no_layers)
    }

    pub fn multiple_component_transformation(&self) -> u8 {
        self.multiple_component_transformation
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.parameters
    }

    pub fn violations(&self) -> Vec<CodestreamError> {
        let mut violations = self.parameters.violations(super::MARKER_SYMBOL_COD);
        if let ProgressionOrder::Reserved { value } = self.progression_order() {
            violations.push(CodestreamError::MarkerError {
                marker: super::MARKER_SYMBOL_COD,
                error: format!("reserved progression order {}", value),
            });
        }
        if self.no_layers() == 0 {
            violations.push(CodestreamError::MarkerError {
                marker: super::MARKER_SYMBOL_COD,
                error: "zero quality layers".to_string(),
            });
        }
        violations
    }

    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![
            Property::integer("codingStyle", self.coding_style),
            Property::boolean("precincts", self.has_defined_precincts()),
            Property::boolean("startOfPacket", self.may_use_sop()),
            Property::boolean("endOfPacketHeader", self.may_use_eph()),
            Property::text("progressionOrder", self.progression_order().name()),
            Property::integer("layerCount", self.no_layers()),
            Property::integer(
                "multipleComponentTransformation",
                self.multiple_component_transformation,
            ),
        ];
        self.parameters.properties(&mut properties);
        properties
    }
}

pub fn decode_cod<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<CodingStyleMarkerSegment, Box<dyn error::Error>> {
    info!("COD start at byte offset {}", context.offset);
    let mut segment = CodingStyleMarkerSegment {
        coding_style: read_u8(reader)?,
        progression_order: read_u8(reader)?,
        ..Default::default()
    };
    reader.read_exact(&mut segment.no_layers)?;
    segment.multiple_component_transformation = read_u8(reader)?;
    segment.parameters =
        decode_coding_style_parameters(reader, segment.has_defined_precincts())?;
    Ok(segment)
}

// A.6.2
//
// Coding style component (COC)
//
// Function: Describes the coding style and number of decomposition levels
// used for compressing a particular component.
#[derive(Debug, Default)]
pub struct CodingStyleComponentSegment {
    component_index: u16,
    coding_style: u8,
    parameters: CodingStyleParameters,
}

impl CodingStyleComponentSegment {
    pub fn component_index(&self) -> u16 {
        self.component_index
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.parameters
    }

    pub fn violations(&self, components: u16) -> Vec<CodestreamError> {
        let mut violations = self.parameters.violations(MARKER_SYMBOL_COC);
        if self.component_index >= components {
            violations.push(CodestreamError::ComponentOutOfRange {
                marker: MARKER_SYMBOL_COC,
                component: self.component_index,
                components,
            });
        }
        violations
    }

    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![
            Property::integer("component", self.component_index),
            Property::integer("codingStyle", self.coding_style),
        ];
        self.parameters.properties(&mut properties);
        properties
    }
}

pub fn decode_coc<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<CodingStyleComponentSegment, Box<dyn error::Error>> {
    info!("COC start at byte offset {}", context.offset);
    let width = context.component_index_width(MARKER_SYMBOL_COC)?;
    let component_index = decode_component_index(reader, width)?;
    let coding_style = read_u8(reader)?;
    let parameters = decode_coding_style_parameters(reader, coding_style & 1 != 0)?;
    Ok(CodingStyleComponentSegment {
        component_index,
        coding_style,
        parameters,
    })
}

// A.6.4 / A.6.5
//
// Quantization default (QCD) and quantization component (QCC)
//
// Function: Describes the quantization used for compressing all components
// (QCD) or one component (QCC).
#[derive(Debug, Default)]
pub struct QuantizationSegment {
    component_index: Option<u16>,
    quantization_style: u8,
    values: Vec<u16>,
}

impl QuantizationSegment {
    pub fn component_index(&self) -> Option<u16> {
        self.component_index
    }

    pub fn quantization_style(&self) -> QuantizationStyle {
        QuantizationStyle::new(self.quantization_style)
    }

    pub fn guard_bits(&self) -> u8 {
        self.quantization_style >> 5
    }

    pub fn quantization_values(&self) -> &[u16] {
        &self.values
    }

    /// Step-size exponents, the upper five bits of each value.
    pub fn quantization_exponents(&self) -> Vec<u8> {
        match self.quantization_style() {
            QuantizationStyle::No { .. } => self.values.iter().map(|v| (v >> 3) as u8).collect(),
            _ => self.values.iter().map(|v| (v >> 11) as u8).collect(),
        }
    }

    pub fn violations(&self, marker: MarkerSymbol, components: u16) -> Vec<CodestreamError> {
        let mut violations = vec![];
        if let QuantizationStyle::Reserved { value } = self.quantization_style() {
            violations.push(CodestreamError::MarkerError {
                marker,
                error: format!("reserved quantization style {}", value),
            });
        }
        if let Some(component) = self.component_index {
            if component >= components {
                violations.push(CodestreamError::ComponentOutOfRange {
                    marker,
                    component,
                    components,
                });
            }
        }
        violations
    }

    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![];
        if let Some(component) = self.component_index {
            properties.push(Property::integer("component", component));
        }
        properties.push(Property::text(
            "quantizationStyle",
            self.quantization_style().name(),
        ));
        properties.push(Property::integer("guardBits", self.guard_bits()));
        properties.push(Property::integers("stepSizes", &self.values));
        properties
    }
}

fn decode_quantization_values<R: io::Read>(
    reader: &mut R,
    segment: &mut QuantizationSegment,
    remaining: usize,
    marker: MarkerSymbol,
) -> Result<(), Box<dyn error::Error>> {
    let width = match segment.quantization_style().value_width() {
        Some(width) => width,
        None => {
            // Reserved style: the values cannot be sized, keep the raw bytes out.
            let mut discard = vec![0; remaining];
            reader.read_exact(&mut discard)?;
            return Ok(());
        }
    };
    if remaining % width != 0 {
        return Err(CodestreamError::MarkerError {
            marker,
            error: format!("{} bytes is not a whole number of step sizes", remaining),
        }
        .into());
    }
    let count = remaining / width;
    segment.values = Vec::with_capacity(count);
    for _ in 0..count {
        let value = if width == 1 {
            read_u8(reader)? as u16
        } else {
            read_u16(reader)?
        };
        segment.values.push(value);
    }
    Ok(())
}

pub fn decode_qcd<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<QuantizationSegment, Box<dyn error::Error>> {
    info!("QCD start at byte offset {}", context.offset);
    let mut segment = QuantizationSegment {
        quantization_style: read_u8(reader)?,
        ..Default::default()
    };
    let remaining = context.payload.saturating_sub(1);
    decode_quantization_values(reader, &mut segment, remaining, super::MARKER_SYMBOL_QCD)?;
    Ok(segment)
}

pub fn decode_qcc<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<QuantizationSegment, Box<dyn error::Error>> {
    info!("QCC start at byte offset {}", context.offset);
    let width = context.component_index_width(MARKER_SYMBOL_QCC)?;
    let mut segment = QuantizationSegment {
        component_index: Some(decode_component_index(reader, width)?),
        quantization_style: read_u8(reader)?,
        ..Default::default()
    };
    let remaining = context.payload.saturating_sub(1 + width);
    decode_quantization_values(reader, &mut segment, remaining, MARKER_SYMBOL_QCC)?;
    Ok(segment)
}

// A.6.3
//
// Region of interest (RGN)
//
// Function: Signals the presence of an ROI in the codestream.
#[derive(Debug, Default)]
pub struct RegionOfInterestSegment {
    component_index: u16,
    style: u8,
    shift: u8,
}

impl RegionOfInterestSegment {
    pub fn component_index(&self) -> u16 {
        self.component_index
    }

    // Srgn, 0 is implicit ROI (maximum shift); other values reserved.
    pub fn style(&self) -> u8 {
        self.style
    }

    pub fn shift(&self) -> u8 {
        self.shift
    }

    pub fn violations(&self, components: u16) -> Vec<CodestreamError> {
        let mut violations = vec![];
        if self.style != 0 {
            violations.push(CodestreamError::MarkerError {
                marker: MARKER_SYMBOL_RGN,
                error: format!("reserved ROI style {}", self.style),
            });
        }
        if self.component_index >= components {
            violations.push(CodestreamError::ComponentOutOfRange {
                marker: MARKER_SYMBOL_RGN,
                component: self.component_index,
                components,
            });
        }
        violations
    }

    pub fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("component", self.component_index),
            Property::integer("roiStyle", self.style),
            Property::integer("roiShift", self.shift),
        ]
    }
}

pub fn decode_rgn<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<RegionOfInterestSegment, Box<dyn error::Error>> {
    info!("RGN start at byte offset {}", context.offset);
    let width = context.component_index_width(MARKER_SYMBOL_RGN)?;
    Ok(RegionOfInterestSegment {
        component_index: decode_component_index(reader, width)?,
        style: read_u8(reader)?,
        shift: read_u8(reader)?,
    })
}

// A.6.6
//
// Progression order change (POC)
//
// Function: Describes the bounds and progression order for any progression
// order other than default in the codestream.
#[derive(Debug, Default)]
pub struct ProgressionOrderChange {
    resolution_start: u8,
    component_start: u16,
    layer_end: u16,
    resolution_end: u8,
    component_end: u16,
    progression_order: u8,
}

impl ProgressionOrderChange {
    pub fn component_index_start(&self) -> u16 {
        self.component_start
    }

    pub fn component_index_end(&self) -> u16 {
        self.component_end
    }

    pub fn progression_order(&self) -> ProgressionOrder {
        ProgressionOrder::new(self.progression_order)
    }

    fn properties(&self) -> Property {
        Property::list(
            "ProgressionChange",
            vec![
                Property::integer("resolutionStart", self.resolution_start),
                Property::integer("componentStart", self.component_start),
                Property::integer("layerEnd", self.layer_end),
                Property::integer("resolutionEnd", self.resolution_end),
                Property::integer("componentEnd", self.component_end),
                Property::text("progressionOrder", self.progression_order().name()),
            ],
        )
    }
}

#[derive(Debug, Default)]
pub struct ProgressionOrderChangeSegment {
    changes: Vec<ProgressionOrderChange>,
}

impl ProgressionOrderChangeSegment {
    pub fn changes(&self) -> &[ProgressionOrderChange] {
        &self.changes
    }

    pub fn violations(&self) -> Vec<CodestreamError> {
        let mut violations = vec![];
        for change in &self.changes {
            if change.resolution_end <= change.resolution_start
                || change.component_end <= change.component_start
            {
                violations.push(CodestreamError::MarkerError {
                    marker: MARKER_SYMBOL_POC,
                    error: "progression change with an empty range".to_string(),
                });
            }
            if let ProgressionOrder::Reserved { value } = change.progression_order() {
                violations.push(CodestreamError::MarkerError {
                    marker: MARKER_SYMBOL_POC,
                    error: format!("reserved progression order {}", value),
                });
            }
        }
        violations
    }

    pub fn properties(&self) -> Vec<Property> {
        self.changes.iter().map(|c| c.properties()).collect()
    }
}

pub fn decode_poc<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<ProgressionOrderChangeSegment, Box<dyn error::Error>> {
    info!("POC start at byte offset {}", context.offset);
    let width = context.component_index_width(MARKER_SYMBOL_POC)?;
    let entry_length = 5 + 2 * width;
    if context.payload == 0 || context.payload % entry_length != 0 {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_POC,
            error: format!(
                "{} bytes is not a whole number of {}-byte progressions",
                context.payload, entry_length
            ),
        }
        .into());
    }
    let count = context.payload / entry_length;
    let mut segment = ProgressionOrderChangeSegment {
        changes: Vec::with_capacity(count),
    };
    for _ in 0..count {
        segment.changes.push(ProgressionOrderChange {
            resolution_start: read_u8(reader)?,
            component_start: decode_component_index(reader, width)?,
            layer_end: read_u16(reader)?,
            resolution_end: read_u8(reader)?,
            component_end: decode_component_index(reader, width)?,
            progression_order: read_u8(reader)?,
        });
    }
    Ok(segment)
}

// A.7.1
//
// Tile-part lengths (TLM)
//
// Function: Describes the length of every tile-part in the codestream.
#[derive(Debug, Default)]
pub struct TilePartLengthsSegment {
    index: u8,
    parameter_size: u8,
    tile_indices: Vec<u16>,
    tile_part_lengths: Vec<u32>,
}

impl TilePartLengthsSegment {
    pub fn index(&self) -> u8 {
        self.index
    }

    // ST: size of Ttlm in bytes (0, 1 or 2)
    fn tile_index_size(&self) -> usize {
        ((self.parameter_size >> 4) & 0b11) as usize
    }

    // SP: size of Ptlm, 2 or 4 bytes
    fn tile_part_length_size(&self) -> usize {
        if (self.parameter_size >> 6) & 1 == 0 {
            2
        } else {
            4
        }
    }

    pub fn tile_part_lengths(&self) -> &[u32] {
        &self.tile_part_lengths
    }

    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![Property::integer("index", self.index)];
        if !self.tile_indices.is_empty() {
            properties.push(Property::integers("tileIndices", &self.tile_indices));
        }
        properties.push(Property::integers(
            "tilePartLengths",
            &self.tile_part_lengths,
        ));
        properties
    }
}

pub fn decode_tlm<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<TilePartLengthsSegment, Box<dyn error::Error>> {
    info!("TLM start at byte offset {}", context.offset);
    let mut segment = TilePartLengthsSegment {
        index: read_u8(reader)?,
        parameter_size: read_u8(reader)?,
        ..Default::default()
    };
    let tile_index_size = segment.tile_index_size();
    if tile_index_size == 3 {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_TLM,
            error: "reserved Ttlm size".to_string(),
        }
        .into());
    }
    let entry_length = tile_index_size + segment.tile_part_length_size();
    let remaining = context.payload.saturating_sub(2);
    if remaining % entry_length != 0 {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_TLM,
            error: format!(
                "{} bytes is not a whole number of {}-byte entries",
                remaining, entry_length
            ),
        }
        .into());
    }
    for _ in 0..remaining / entry_length {
        match tile_index_size {
            1 => segment.tile_indices.push(read_u8(reader)? as u16),
            2 => segment.tile_indices.push(read_u16(reader)?),
            _ => {}
        }
        let length = if segment.tile_part_length_size() == 2 {
            read_u16(reader)? as u32
        } else {
            read_u32(reader)?
        };
        segment.tile_part_lengths.push(length);
    }
    Ok(segment)
}

// A.7.2 / A.7.3
//
// Packet length, main header (PLM) and packet length, tile-part header (PLT)
//
// Function: A list of packet lengths in the tile-parts, for every tile-part in
// order (PLM) or for one tile-part (PLT).
#[derive(Debug, Default)]
pub struct PacketLengthSegment {
    index: u8,
    packet_lengths: Vec<u32>,
}

impl PacketLengthSegment {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn packet_lengths(&self) -> &[u32] {
        &self.packet_lengths
    }

    pub fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("index", self.index),
            Property::integers("packetLengths", &self.packet_lengths),
        ]
    }
}

pub fn decode_plm<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<PacketLengthSegment, Box<dyn error::Error>> {
    info!("PLM start at byte offset {}", context.offset);
    let mut segment = PacketLengthSegment {
        index: read_u8(reader)?,
        ..Default::default()
    };

    // Nplm followed by that many bytes of Iplm, once per tile-part.
    let mut remaining = context.payload.saturating_sub(1);
    while remaining > 0 {
        let no_bytes = read_u8(reader)? as usize;
        if no_bytes + 1 > remaining {
            return Err(CodestreamError::MarkerError {
                marker: MARKER_SYMBOL_PLM,
                error: format!("Nplm {} exceeds the segment", no_bytes),
            }
            .into());
        }
        let mut lengths = vec![0; no_bytes];
        reader.read_exact(&mut lengths)?;
        segment
            .packet_lengths
            .extend(decode_packet_lengths(&lengths)?);
        remaining -= no_bytes + 1;
    }
    Ok(segment)
}

pub fn decode_plt<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<PacketLengthSegment, Box<dyn error::Error>> {
    info!("PLT start at byte offset {}", context.offset);
    let index = read_u8(reader)?;
    let lengths = read_remaining(reader)?;
    let packet_lengths = decode_packet_lengths(&lengths).map_err(|_| {
        Box::<dyn error::Error>::from(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_PLT,
            error: "packet length continues past the segment".to_string(),
        })
    })?;
    Ok(PacketLengthSegment {
        index,
        packet_lengths,
    })
}

// A.7.4 / A.7.5
//
// Packed packet headers, main header (PPM) and tile-part header (PPT)
//
// Function: A collection of the packet headers so multiple reads are not
// required to decode headers. The headers themselves are not interpreted.
#[derive(Debug, Default)]
pub struct PackedPacketHeaderSegment {
    index: u8,
    no_bytes: usize,
}

impl PackedPacketHeaderSegment {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn number_of_bytes(&self) -> usize {
        self.no_bytes
    }

    pub fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("index", self.index),
            Property::integer("packedHeaderBytes", self.no_bytes as i64),
        ]
    }
}

/// Shared by PPM and PPT: Z index followed by opaque header bytes.
pub fn decode_packed_packet_headers<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<PackedPacketHeaderSegment, Box<dyn error::Error>> {
    info!("PPM/PPT start at byte offset {}", context.offset);
    let index = read_u8(reader)?;
    let no_bytes = io::copy(reader, &mut io::sink())? as usize;
    Ok(PackedPacketHeaderSegment { index, no_bytes })
}

// A.9.1
//
// Component registration (CRG)
//
// Function: Allows specific registration of components with respect to each
// other.
#[derive(Debug, Default)]
pub struct ComponentRegistrationSegment {
    horizontal_offset: Vec<u16>,
    vertical_offset: Vec<u16>,
}

impl ComponentRegistrationSegment {
    pub fn properties(&self) -> Vec<Property> {
        vec![
            Property::integers("horizontalOffsets", &self.horizontal_offset),
            Property::integers("verticalOffsets", &self.vertical_offset),
        ]
    }
}

pub fn decode_crg<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<ComponentRegistrationSegment, Box<dyn error::Error>> {
    info!("CRG start at byte offset {}", context.offset);
    let no_components = context.require_components(MARKER_SYMBOL_CRG)? as usize;
    if context.payload != 4 * no_components {
        return Err(CodestreamError::MarkerError {
            marker: MARKER_SYMBOL_CRG,
            error: format!(
                "length {} does not match {} components",
                context.payload + 2,
                no_components
            ),
        }
        .into());
    }
    let mut segment = ComponentRegistrationSegment {
        horizontal_offset: Vec::with_capacity(no_components),
        vertical_offset: Vec::with_capacity(no_components),
    };
    for _ in 0..no_components {
        segment.horizontal_offset.push(read_u16(reader)?);
        segment.vertical_offset.push(read_u16(reader)?);
    }
    Ok(segment)
}

#[derive(Debug, PartialEq)]
pub enum CommentRegistrationValue {
    // General use (binary values)
    Binary,

    // General use (IS 8859-15:1999 (Latin) values)
    Latin,

    // All other values reserved
    Reserved { value: u16 },
}

impl CommentRegistrationValue {
    pub fn new(value: u16) -> CommentRegistrationValue {
        match value {
            0 => CommentRegistrationValue::Binary,
            1 => CommentRegistrationValue::Latin,
            _ => CommentRegistrationValue::Reserved { value },
        }
    }
}

// A.9.2
//
// Comment (COM)
//
// Function: Allows unstructured data in the header.
#[derive(Debug, Default)]
pub struct CommentMarkerSegment {
    registration_value: [u8; 2],
    comment: Vec<u8>,
}

impl CommentMarkerSegment {
    pub fn registration_value(&self) -> CommentRegistrationValue {
        CommentRegistrationValue::new(u16::from_be_bytes(self.registration_value))
    }

    pub fn comment_utf8(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.comment)
    }

    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![Property::integer(
            "registration",
            u16::from_be_bytes(self.registration_value),
        )];
        match (self.registration_value(), self.comment_utf8()) {
            (CommentRegistrationValue::Latin, Ok(comment)) => {
                properties.push(Property::text("comment", comment));
            }
            _ => {
                properties.push(Property::integer("commentLength", self.comment.len() as i64));
            }
        }
        properties
    }
}

pub fn decode_com<R: io::Read>(
    reader: &mut R,
    context: &SegmentContext,
) -> Result<CommentMarkerSegment, Box<dyn error::Error>> {
    info!("COM start at byte offset {}", context.offset);
    let mut segment = CommentMarkerSegment::default();
    reader.read_exact(&mut segment.registration_value)?;
    segment.comment = read_remaining(reader)?;
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_length_continuation() {
        assert_eq!(decode_packet_lengths(&[0x81, 0x02]).unwrap(), vec![130]);
    }

    #[test]
    fn test_packet_length_sequence() {
        assert_eq!(
            decode_packet_lengths(&[0x05, 0x82, 0x80, 0x01, 0x7F]).unwrap(),
            vec![5, 32769, 127]
        );
    }

    #[test]
    fn test_packet_length_truncated() {
        assert!(decode_packet_lengths(&[0x05, 0x81]).is_err());
    }

    #[test]
    fn test_packet_length_overflow() {
        assert_eq!(
            decode_packet_lengths(&[0x8F, 0xFF, 0xFF, 0xFF, 0x7F]).unwrap(),
            vec![u32::MAX]
        );
        let error = decode_packet_lengths(&[0x90, 0x80, 0x80, 0x80, 0x00]).unwrap_err();
        assert!(error.to_string().contains("exceeds 32 bits"));
    }

    #[test]
    fn test_quantization_style() {
        assert_eq!(
            QuantizationStyle::new(0b0100_0010),
            QuantizationStyle::ScalarExpounded { guard: 2 }
        );
        assert_eq!(
            QuantizationStyle::new(0b0000_0011),
            QuantizationStyle::Reserved { value: 3 }
        );
    }
}
