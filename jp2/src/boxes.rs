use icc::{decode_icc, ICCProfile};
use log::debug;
use report::Property;
use std::collections::HashSet;
use std::error;
use std::io;
use std::str;

use super::fragment::Fragment;
use super::header::*;
use super::JP2Error;

// <CR><LF><0x87><LF> (0x0D0A 870A).
pub const SIGNATURE_MAGIC: [u8; 4] = [13, 10, 135, 10];

// jp2\040
pub const BRAND_JP2: [u8; 4] = [106, 112, 50, 32];

// jpx\040
pub const BRAND_JPX: [u8; 4] = [106, 112, 120, 32];

// jpxb
pub const BRAND_JPX_BASELINE: [u8; 4] = [106, 112, 120, 98];

/// Deflate filter identifier for the Binary Filter box.
pub const FILTER_DEFLATE: [u8; 16] = [
    0xEC, 0x34, 0x0B, 0x04, 0x74, 0xC5, 0x11, 0xD4, 0xA7, 0x29, 0x87, 0x9E, 0xA3, 0x54, 0x8F,
    0x0E,
];

/// JPEG 2000 box trait.
///
/// The building-block of the JP2 file format is called a box. All information
/// contained within a JP2 or JPX file is encapsulated in boxes; some boxes are
/// defined to contain other boxes, which are handled by the parser rather than
/// by an implementation of this trait.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.4.
pub trait JBox {
    fn identifier(&self) -> BoxType;
    fn length(&self) -> u64;
    fn offset(&self) -> u64;

    /// Reads the box contents. The reader is limited to the box's data.
    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>>;

    fn properties(&self) -> Vec<Property>;

    /// Normative value violations, each making the file not valid.
    fn violations(&self) -> Vec<String> {
        Vec::new()
    }
}

pub fn decode_box<B, R>(header: &BoxHeader, reader: &mut R) -> Result<B, Box<dyn error::Error>>
where
    B: JBox + Default,
    R: io::Read,
{
    let mut jbox = B::default();
    match header.data_length() {
        Some(_) => jbox.decode(header, reader)?,
        None => {
            // Runs to the end of a stream of unknown length: measure it first.
            let mut contents = Vec::new();
            reader.read_to_end(&mut contents)?;
            let sized = header.with_data_length(contents.len() as u64);
            jbox.decode(&sized, &mut contents.as_slice())?;
        }
    }
    Ok(jbox)
}

fn read_u8<R: io::Read>(reader: &mut R) -> io::Result<u8> {
    let mut buffer: [u8; 1] = [0; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

fn read_u16<R: io::Read>(reader: &mut R) -> io::Result<u16> {
    let mut buffer: [u8; 2] = [0; 2];
    reader.read_exact(&mut buffer)?;
    Ok(u16::from_be_bytes(buffer))
}

fn read_u32<R: io::Read>(reader: &mut R) -> io::Result<u32> {
    let mut buffer: [u8; 4] = [0; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

fn read_u64<R: io::Read>(reader: &mut R) -> io::Result<u64> {
    let mut buffer: [u8; 8] = [0; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_be_bytes(buffer))
}

fn read_uuid<R: io::Read>(reader: &mut R) -> io::Result<[u8; 16]> {
    let mut buffer: [u8; 16] = [0; 16];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

fn data_length(header: &BoxHeader) -> u64 {
    header.data_length().unwrap_or(0)
}

fn malformed(header: &BoxHeader, reason: &str) -> Box<dyn error::Error> {
    JP2Error::BoxMalformed {
        box_type: header.box_type(),
        reason: reason.to_owned(),
        offset: header.offset(),
    }
    .into()
}

/// Formats a UUID in its canonical 8-4-4-4-12 form.
pub fn uuid_text(uuid: &[u8; 16]) -> String {
    let hex: Vec<String> = uuid.iter().map(|b| format!("{:02X}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        hex[0..4].concat(),
        hex[4..6].concat(),
        hex[6..8].concat(),
        hex[8..10].concat(),
        hex[10..16].concat()
    )
}

fn four_cc(value: &[u8; 4]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

fn icc_properties(profile: &ICCProfile) -> Property {
    Property::list(
        "ICCProfile",
        vec![
            Property::integer("size", profile.size()),
            Property::text("preferredCMM", profile.preferred_cmm()),
            Property::text("version", profile.version()),
            Property::text("deviceClass", profile.device_class()),
            Property::text("colourSpace", profile.colour_space()),
            Property::text("connectionSpace", profile.connection_space()),
            Property::text("primaryPlatform", profile.primary_platform()),
            Property::integer("renderingIntent", profile.rendering_intent()),
            Property::text("creator", profile.creator()),
            Property::integer("tagCount", profile.tags().len() as i64),
        ],
    )
}

/// JPEG 2000 Signature box.
///
/// The Signature box shall be the first box in the file. For file
/// verification purposes, this box can be considered a fixed-length 12-byte
/// string which shall have the value: 0x0000 000C 6A50 2020 0D0A 870A.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.1.
#[derive(Debug, Default)]
pub struct SignatureBox {
    length: u64,
    offset: u64,
    signature: [u8; 4],
}

impl SignatureBox {
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }
}

impl JBox for SignatureBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_SIGNATURE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    // The contents of this box shall be the 4-byte character string ‘<CR><LF><0x87><LF>’ (0x0D0A 870A).
    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length != 4 {
            return Err(malformed(header, "signature box length must be 12 bytes"));
        }
        reader.read_exact(&mut self.signature)?;
        if self.signature != SIGNATURE_MAGIC {
            return Err(JP2Error::InvalidSignature {
                signature: self.signature,
                offset: header.data_offset(),
            }
            .into());
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        Vec::new()
    }
}

/// File Type box.
///
/// Specifies the Recommendation | International Standard which completely
/// defines all of the contents of this file, as well as a separate list of
/// readers with which this file is compatible.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.2.
#[derive(Debug, Default)]
pub struct FileTypeBox {
    length: u64,
    offset: u64,
    brand: [u8; 4],
    minor_version: [u8; 4],
    compatibility_list: Vec<[u8; 4]>,
}

impl FileTypeBox {
    pub fn brand(&self) -> [u8; 4] {
        self.brand
    }

    pub fn minor_version(&self) -> u32 {
        u32::from_be_bytes(self.minor_version)
    }

    pub fn compatibility_list(&self) -> Vec<String> {
        self.compatibility_list.iter().map(four_cc).collect()
    }

    pub fn is_compatible_with(&self, brand: [u8; 4]) -> bool {
        self.compatibility_list.contains(&brand)
    }
}

impl JBox for FileTypeBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_FILE_TYPE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 8 || (self.length - 8) % 4 != 0 {
            return Err(malformed(
                header,
                "compatibility list is not a whole number of entries",
            ));
        }
        reader.read_exact(&mut self.brand)?;
        reader.read_exact(&mut self.minor_version)?;

        let count = (self.length - 8) / 4;
        for _ in 0..count {
            let mut entry: [u8; 4] = [0; 4];
            reader.read_exact(&mut entry)?;
            self.compatibility_list.push(entry);
        }
        debug!(
            "brand {:?} compatibility {:?}",
            four_cc(&self.brand),
            self.compatibility_list()
        );
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::text("brand", four_cc(&self.brand)),
            Property::integer("minorVersion", self.minor_version()),
            Property::list(
                "compatibilityList",
                self.compatibility_list
                    .iter()
                    .map(|b| Property::text("brand", four_cc(b)))
                    .collect(),
            ),
        ]
    }
}

/// Reader Requirements box (ISO/IEC 15444-2 M.11.1).
///
/// Mask fields are ML bytes wide; each feature entry pairs a feature
/// identifier with a mask saying which of the fully-understand and
/// decode-completely sets it belongs to.
#[derive(Debug, Default)]
pub struct ReaderRequirementsBox {
    length: u64,
    offset: u64,
    mask_length: u8,
    fully_understand_mask: u64,
    decode_completely_mask: u64,
    standard_features: Vec<(u16, u64)>,
    vendor_features: Vec<([u8; 16], u64)>,
}

impl ReaderRequirementsBox {
    pub fn mask_length(&self) -> u8 {
        self.mask_length
    }

    pub fn fully_understand_mask(&self) -> u64 {
        self.fully_understand_mask
    }

    pub fn decode_completely_mask(&self) -> u64 {
        self.decode_completely_mask
    }

    pub fn standard_features(&self) -> Vec<u16> {
        self.standard_features.iter().map(|(sf, _)| *sf).collect()
    }

    pub fn vendor_features(&self) -> Vec<String> {
        self.vendor_features
            .iter()
            .map(|(vf, _)| uuid_text(vf))
            .collect()
    }

    fn read_mask<R: io::Read>(&self, reader: &mut R) -> io::Result<u64> {
        let mut mask: u64 = 0;
        for _ in 0..self.mask_length {
            mask = (mask << 8) | read_u8(reader)? as u64;
        }
        Ok(mask)
    }
}

impl JBox for ReaderRequirementsBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_READER_REQUIREMENTS
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        self.mask_length = read_u8(reader)?;
        match self.mask_length {
            1 | 2 | 4 | 8 => {}
            _ => return Err(malformed(header, "mask length must be 1, 2, 4 or 8")),
        }
        self.fully_understand_mask = self.read_mask(reader)?;
        self.decode_completely_mask = self.read_mask(reader)?;

        let standard_count = read_u16(reader)?;
        for _ in 0..standard_count {
            let feature = read_u16(reader)?;
            let mask = self.read_mask(reader)?;
            self.standard_features.push((feature, mask));
        }

        let vendor_count = read_u16(reader)?;
        for _ in 0..vendor_count {
            let feature = read_uuid(reader)?;
            let mask = self.read_mask(reader)?;
            self.vendor_features.push((feature, mask));
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("maskLength", self.mask_length),
            Property::integer("fullyUnderstandMask", self.fully_understand_mask as i64),
            Property::integer("decodeCompletelyMask", self.decode_completely_mask as i64),
            Property::integers("standardFeatures", &self.standard_features()),
            Property::list(
                "vendorFeatures",
                self.vendor_features()
                    .into_iter()
                    .map(|uuid| Property::text("uuid", uuid))
                    .collect(),
            ),
        ]
    }
}

/// Image Header box.
///
/// This box contains fixed length generic information about the image, such
/// as the image size and number of components. The contents of the JP2 Header
/// box shall start with an Image Header box.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.3.1.
#[derive(Debug, Default, Clone)]
pub struct ImageHeaderBox {
    length: u64,
    offset: u64,
    height: [u8; 4],
    width: [u8; 4],
    components_num: [u8; 2],
    components_bits: [u8; 1],
    compression_type: [u8; 1],
    colourspace_unknown: [u8; 1],
    intellectual_property: [u8; 1],
}

impl ImageHeaderBox {
    pub fn height(&self) -> u32 {
        u32::from_be_bytes(self.height)
    }

    pub fn width(&self) -> u32 {
        u32::from_be_bytes(self.width)
    }

    pub fn components_num(&self) -> u16 {
        u16::from_be_bytes(self.components_num)
    }

    /// Raw BPC byte; 255 when component depths vary and are given by the
    /// Bits Per Component box.
    pub fn components_bits(&self) -> u8 {
        self.components_bits[0]
    }

    pub fn bits_vary(&self) -> bool {
        self.components_bits[0] == 255
    }

    /// Component bit depth (value + 1), None when depths vary.
    pub fn bit_depth(&self) -> Option<u8> {
        if self.bits_vary() {
            None
        } else {
            Some((self.components_bits[0] & 0b0111_1111) + 1)
        }
    }

    pub fn values_are_signed(&self) -> bool {
        !self.bits_vary() && (self.components_bits[0] & 0x80) == 0x80
    }

    pub fn compression_type(&self) -> u8 {
        self.compression_type[0]
    }

    pub fn colourspace_unknown(&self) -> u8 {
        self.colourspace_unknown[0]
    }

    pub fn intellectual_property(&self) -> u8 {
        self.intellectual_property[0]
    }
}

impl JBox for ImageHeaderBox {
    // The type of the Image Header box shall be ‘ihdr’ (0x6968 6472)
    fn identifier(&self) -> BoxType {
        BOX_TYPE_IMAGE_HEADER
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length != 14 {
            return Err(malformed(header, "Image Header box length must be 22 bytes"));
        }
        reader.read_exact(&mut self.height)?;
        reader.read_exact(&mut self.width)?;
        reader.read_exact(&mut self.components_num)?;
        reader.read_exact(&mut self.components_bits)?;
        reader.read_exact(&mut self.compression_type)?;
        reader.read_exact(&mut self.colourspace_unknown)?;
        reader.read_exact(&mut self.intellectual_property)?;

        debug!(
            "image {}x{} with {} component(s)",
            self.width(),
            self.height(),
            self.components_num()
        );
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        let mut properties = vec![
            Property::integer("width", self.width()),
            Property::integer("height", self.height()),
            Property::integer("componentCount", self.components_num()),
        ];
        match self.bit_depth() {
            Some(depth) => {
                properties.push(Property::integer("bitsPerComponent", depth));
                properties.push(Property::boolean("signed", self.values_are_signed()));
            }
            None => properties.push(Property::integer("bitsPerComponent", 255)),
        }
        properties.push(Property::integer("compressionType", self.compression_type()));
        properties.push(Property::integer(
            "colourspaceUnknown",
            self.colourspace_unknown(),
        ));
        properties.push(Property::integer(
            "intellectualProperty",
            self.intellectual_property(),
        ));
        properties
    }

    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.width() == 0 || self.height() == 0 {
            violations.push("Image Header box has a zero image dimension".to_owned());
        }
        if self.components_num() == 0 || self.components_num() > 16384 {
            violations.push(format!(
                "Image Header box component count {} out of range",
                self.components_num()
            ));
        }
        if !self.bits_vary() && (self.components_bits[0] & 0x7F) > 37 {
            violations.push("Image Header box bit depth is reserved".to_owned());
        }
        // The value of this field shall be 7.
        if self.compression_type() != 7 {
            violations.push(format!(
                "Image Header box compression type must be 7, found {}",
                self.compression_type()
            ));
        }
        if self.colourspace_unknown() > 1 {
            violations.push("Image Header box colourspace unknown flag is reserved".to_owned());
        }
        if self.intellectual_property() > 1 {
            violations.push("Image Header box intellectual property flag is reserved".to_owned());
        }
        violations
    }
}

/// Bits Per Component box.
///
/// Specifies the bit depth of each component when the ihdr BPC field is 255.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.3.2.
#[derive(Debug, Default)]
pub struct BitsPerComponentBox {
    length: u64,
    offset: u64,
    components_bits: Vec<u8>,
}

impl BitsPerComponentBox {
    pub fn components_num(&self) -> usize {
        self.components_bits.len()
    }

    pub fn bit_depths(&self) -> Vec<u8> {
        self.components_bits
            .iter()
            .map(|b| (b & 0b0111_1111) + 1)
            .collect()
    }
}

impl JBox for BitsPerComponentBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_BITS_PER_COMPONENT
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();
        reader.read_to_end(&mut self.components_bits)?;
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![Property::integers("bitsPerComponent", &self.bit_depths())]
    }
}

const METHOD_ENUMERATED: u8 = 1;
const METHOD_RESTRICTED_ICC: u8 = 2;
const METHOD_ANY_ICC: u8 = 3;
const METHOD_VENDOR: u8 = 4;

pub const ENUMERATED_SRGB: u32 = 16;
pub const ENUMERATED_GREYSCALE: u32 = 17;
pub const ENUMERATED_SYCC: u32 = 18;

fn enumerated_colourspace_name(value: u32) -> &'static str {
    match value {
        0 => "Bi-level",
        1 => "YCbCr(1)",
        3 => "YCbCr(2)",
        4 => "YCbCr(3)",
        9 => "PhotoYCC",
        11 => "CMY",
        12 => "CMYK",
        13 => "YCCK",
        14 => "CIELab",
        15 => "Bi-level(2)",
        16 => "sRGB",
        17 => "greyscale",
        18 => "sYCC",
        19 => "CIEJab",
        20 => "e-sRGB",
        21 => "ROMM-RGB",
        22 => "YPbPr(1125/60)",
        23 => "YPbPr(1250/50)",
        24 => "e-sYCC",
        _ => "reserved",
    }
}

/// Colour Specification box.
///
/// Each Colour Specification box defines one method by which an application
/// can interpret the colourspace of the decompressed image data.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.3.3
/// and ISO/IEC 15444-2 M.11.7.2.
#[derive(Debug, Default)]
pub struct ColourSpecificationBox {
    length: u64,
    offset: u64,
    method: [u8; 1],
    precedence: [u8; 1],
    colourspace_approximation: [u8; 1],
    enumerated_colourspace: Option<u32>,
    icc_profile: Option<ICCProfile>,
    icc_error: Option<String>,
    vendor_colour: Option<[u8; 16]>,
}

impl ColourSpecificationBox {
    pub fn method(&self) -> u8 {
        self.method[0]
    }

    pub fn precedence(&self) -> i8 {
        self.precedence[0] as i8
    }

    pub fn colourspace_approximation(&self) -> u8 {
        self.colourspace_approximation[0]
    }

    pub fn enumerated_colourspace(&self) -> Option<u32> {
        self.enumerated_colourspace
    }

    pub fn icc_profile(&self) -> Option<&ICCProfile> {
        self.icc_profile.as_ref()
    }

    pub fn has_icc_method(&self) -> bool {
        matches!(self.method(), METHOD_RESTRICTED_ICC | METHOD_ANY_ICC)
    }

    pub fn method_is_reserved(&self) -> bool {
        !matches!(
            self.method(),
            METHOD_ENUMERATED | METHOD_RESTRICTED_ICC | METHOD_ANY_ICC | METHOD_VENDOR
        )
    }
}

impl JBox for ColourSpecificationBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_COLOUR_SPECIFICATION
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 3 {
            return Err(malformed(header, "Colour Specification box too short"));
        }
        reader.read_exact(&mut self.method)?;
        reader.read_exact(&mut self.precedence)?;
        reader.read_exact(&mut self.colourspace_approximation)?;

        match self.method() {
            METHOD_ENUMERATED => {
                if self.length < 7 {
                    return Err(malformed(header, "enumerated colourspace missing"));
                }
                // Any EP parameters following EnumCS are left for the parser
                // to skip.
                self.enumerated_colourspace = Some(read_u32(reader)?);
            }
            METHOD_RESTRICTED_ICC | METHOD_ANY_ICC => {
                let mut profile = Vec::new();
                reader.read_to_end(&mut profile)?;
                match decode_icc(&mut profile.as_slice()) {
                    Ok(icc) => self.icc_profile = Some(icc),
                    Err(error) => self.icc_error = Some(error.to_string()),
                }
            }
            METHOD_VENDOR => {
                if self.length < 19 {
                    return Err(malformed(header, "vendor colour method missing"));
                }
                self.vendor_colour = Some(read_uuid(reader)?);
            }
            _ => {}
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        let mut properties = vec![
            Property::integer("method", self.method()),
            Property::integer("precedence", self.precedence()),
            Property::integer("approximation", self.colourspace_approximation()),
        ];
        if let Some(value) = self.enumerated_colourspace {
            properties.push(Property::integer("enumeratedColourspace", value));
            properties.push(Property::text(
                "colourspace",
                enumerated_colourspace_name(value),
            ));
        }
        if let Some(icc) = &self.icc_profile {
            properties.push(icc_properties(icc));
        }
        if let Some(vendor) = &self.vendor_colour {
            properties.push(Property::text("vendorColour", uuid_text(vendor)));
        }
        properties
    }

    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if let Some(error) = &self.icc_error {
            violations.push(format!("Colour Specification box ICC profile: {}", error));
        }
        if self.colourspace_approximation() > 4 {
            violations.push("Colour Specification box approximation is reserved".to_owned());
        }
        violations
    }
}

/// Palette box.
///
/// Defines the palette used to create multiple components from a single
/// component. NE entries of NPC columns, each column with its own depth.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.3.4.
#[derive(Debug, Default)]
pub struct PaletteBox {
    length: u64,
    offset: u64,
    entries: u16,
    columns: u8,
    bit_depths: Vec<u8>,
}

impl PaletteBox {
    pub fn entries(&self) -> u16 {
        self.entries
    }

    pub fn columns(&self) -> u8 {
        self.columns
    }

    pub fn bit_depths(&self) -> Vec<u8> {
        self.bit_depths
            .iter()
            .map(|b| (b & 0b0111_1111) + 1)
            .collect()
    }

    fn entry_size(&self) -> u64 {
        self.bit_depths()
            .iter()
            .map(|depth| ((*depth as u64) + 7) / 8)
            .sum()
    }
}

impl JBox for PaletteBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_PALETTE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 3 {
            return Err(malformed(header, "Palette box too short"));
        }
        self.entries = read_u16(reader)?;
        self.columns = read_u8(reader)?;
        if self.length < 3 + self.columns as u64 {
            return Err(malformed(header, "Palette box too short for its columns"));
        }
        self.bit_depths = vec![0; self.columns as usize];
        reader.read_exact(&mut self.bit_depths)?;

        let expected = 3 + self.columns as u64 + self.entries as u64 * self.entry_size();
        if self.length != expected {
            return Err(malformed(
                header,
                "Palette box size does not match its entries",
            ));
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("entryCount", self.entries),
            Property::integer("columnCount", self.columns),
            Property::integers("bitDepths", &self.bit_depths()),
        ]
    }

    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.entries < 1 || self.entries > 1024 {
            violations.push(format!(
                "Palette box entry count {} outside 1 to 1024",
                self.entries
            ));
        }
        if self.columns == 0 {
            violations.push("Palette box has no columns".to_owned());
        }
        violations
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ComponentMapping {
    component: u16,
    mapping_type: u8,
    palette_column: u8,
}

impl ComponentMapping {
    pub fn component(&self) -> u16 {
        self.component
    }

    /// 0 for direct use, 1 for palette mapping.
    pub fn mapping_type(&self) -> u8 {
        self.mapping_type
    }

    pub fn palette_column(&self) -> u8 {
        self.palette_column
    }
}

/// Component Mapping box (I.5.3.5).
#[derive(Debug, Default)]
pub struct ComponentMappingBox {
    length: u64,
    offset: u64,
    mappings: Vec<ComponentMapping>,
}

impl ComponentMappingBox {
    pub fn mappings(&self) -> &[ComponentMapping] {
        &self.mappings
    }
}

impl JBox for ComponentMappingBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_COMPONENT_MAPPING
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length % 4 != 0 {
            return Err(malformed(
                header,
                "Component Mapping box is not a whole number of entries",
            ));
        }
        for _ in 0..self.length / 4 {
            self.mappings.push(ComponentMapping {
                component: read_u16(reader)?,
                mapping_type: read_u8(reader)?,
                palette_column: read_u8(reader)?,
            });
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        let components: Vec<u16> = self.mappings.iter().map(|m| m.component()).collect();
        let types: Vec<u8> = self.mappings.iter().map(|m| m.mapping_type()).collect();
        let columns: Vec<u8> = self.mappings.iter().map(|m| m.palette_column()).collect();
        vec![
            Property::integers("components", &components),
            Property::integers("mappingTypes", &types),
            Property::integers("paletteColumns", &columns),
        ]
    }

    fn violations(&self) -> Vec<String> {
        self.mappings
            .iter()
            .filter(|m| m.mapping_type() > 1)
            .map(|m| {
                format!(
                    "Component Mapping box has reserved mapping type {} for component {}",
                    m.mapping_type(),
                    m.component()
                )
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Channel {
    // Channel index
    //
    // The index of the channel as defined within the Component Mapping box
    // (or the actual component from the codestream if the file does not
    // contain a Component Mapping box).
    channel_index: [u8; 2],

    // Channel type
    //
    // 0 colour image data, 1 opacity, 2 premultiplied opacity,
    // 2^16 - 1 unspecified.
    channel_type: [u8; 2],

    // Channel association
    channel_association: [u8; 2],
}

impl Channel {
    pub fn channel_index(&self) -> u16 {
        u16::from_be_bytes(self.channel_index)
    }

    pub fn channel_type(&self) -> u16 {
        u16::from_be_bytes(self.channel_type)
    }

    pub fn channel_association(&self) -> u16 {
        u16::from_be_bytes(self.channel_association)
    }
}

/// Channel Definition box.
///
/// Specifies the meaning of the samples in each channel in the image.
///
/// For more information, see ISO/IEC 15444-1 / ITU T-800 Appendix I.5.3.6.
#[derive(Debug, Default)]
pub struct ChannelDefinitionBox {
    length: u64,
    offset: u64,
    channels: Vec<Channel>,
}

impl ChannelDefinitionBox {
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

impl JBox for ChannelDefinitionBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_CHANNEL_DEFINITION
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 2 {
            return Err(malformed(header, "Channel Definition box too short"));
        }
        let count = read_u16(reader)?;
        if self.length != 2 + 6 * count as u64 {
            return Err(malformed(
                header,
                "Channel Definition box size does not match its channel count",
            ));
        }
        for _ in 0..count {
            let mut channel = Channel::default();
            reader.read_exact(&mut channel.channel_index)?;
            reader.read_exact(&mut channel.channel_type)?;
            reader.read_exact(&mut channel.channel_association)?;
            self.channels.push(channel);
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("channelCount", self.channels.len() as i64),
            Property::list(
                "Channels",
                self.channels
                    .iter()
                    .map(|c| {
                        Property::list(
                            "Channel",
                            vec![
                                Property::integer("index", c.channel_index()),
                                Property::integer("type", c.channel_type()),
                                Property::integer("association", c.channel_association()),
                            ],
                        )
                    })
                    .collect(),
            ),
        ]
    }

    fn violations(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut violations = Vec::new();
        for channel in &self.channels {
            if !seen.insert(channel.channel_index()) {
                violations.push(format!(
                    "Channel Definition box has duplicate channel {}",
                    channel.channel_index()
                ));
            }
            if channel.channel_type() > 2 && channel.channel_type() != u16::MAX {
                violations.push(format!(
                    "Channel Definition box has reserved channel type {}",
                    channel.channel_type()
                ));
            }
        }
        violations
    }
}

/// Capture Resolution and Default Display Resolution boxes
/// (I.5.3.7.1, I.5.3.7.2).
///
/// Resolution is VRN / VRD × 10^VRE grid points per metre vertically and
/// likewise horizontally.
#[derive(Debug, Default)]
pub struct ResolutionBox {
    box_type: BoxType,
    length: u64,
    offset: u64,
    vertical_numerator: u16,
    vertical_denominator: u16,
    horizontal_numerator: u16,
    horizontal_denominator: u16,
    vertical_exponent: i8,
    horizontal_exponent: i8,
}

impl ResolutionBox {
    pub fn vertical_resolution(&self) -> f64 {
        self.vertical_numerator as f64 / self.vertical_denominator as f64
            * 10f64.powi(self.vertical_exponent as i32)
    }

    pub fn horizontal_resolution(&self) -> f64 {
        self.horizontal_numerator as f64 / self.horizontal_denominator as f64
            * 10f64.powi(self.horizontal_exponent as i32)
    }
}

impl JBox for ResolutionBox {
    fn identifier(&self) -> BoxType {
        self.box_type
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.box_type = header.box_type();
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length != 10 {
            return Err(malformed(header, "resolution box length must be 18 bytes"));
        }
        self.vertical_numerator = read_u16(reader)?;
        self.vertical_denominator = read_u16(reader)?;
        self.horizontal_numerator = read_u16(reader)?;
        self.horizontal_denominator = read_u16(reader)?;
        self.vertical_exponent = read_u8(reader)? as i8;
        self.horizontal_exponent = read_u8(reader)? as i8;
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("verticalNumerator", self.vertical_numerator),
            Property::integer("verticalDenominator", self.vertical_denominator),
            Property::integer("verticalExponent", self.vertical_exponent),
            Property::integer("horizontalNumerator", self.horizontal_numerator),
            Property::integer("horizontalDenominator", self.horizontal_denominator),
            Property::integer("horizontalExponent", self.horizontal_exponent),
        ]
    }

    fn violations(&self) -> Vec<String> {
        if self.vertical_denominator == 0 || self.horizontal_denominator == 0 {
            vec!["Resolution box has a zero denominator".to_owned()]
        } else {
            Vec::new()
        }
    }
}

/// Boxes whose contents are not interpreted: Intellectual Property, Media
/// Data, MPEG-7 Binary, Free and unknown types.
#[derive(Debug, Default)]
pub struct OpaqueBox {
    box_type: BoxType,
    length: u64,
    offset: u64,
}

impl JBox for OpaqueBox {
    fn identifier(&self) -> BoxType {
        self.box_type
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        _reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.box_type = header.box_type();
        self.length = data_length(header);
        self.offset = header.offset();
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![Property::integer("length", self.length as i64)]
    }
}

/// XML and Label boxes: UTF-8 text.
#[derive(Debug, Default)]
pub struct TextBox {
    box_type: BoxType,
    length: u64,
    offset: u64,
    text: String,
    utf8: bool,
}

impl TextBox {
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl JBox for TextBox {
    fn identifier(&self) -> BoxType {
        self.box_type
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.box_type = header.box_type();
        self.length = data_length(header);
        self.offset = header.offset();

        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        match String::from_utf8(bytes) {
            Ok(text) => {
                self.text = text;
                self.utf8 = true;
            }
            Err(error) => {
                self.text = String::from_utf8_lossy(error.as_bytes()).into_owned();
                self.utf8 = false;
            }
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        let name = if self.box_type == BOX_TYPE_LABEL {
            "label"
        } else {
            "xml"
        };
        vec![Property::text(name, self.text.trim_end_matches('\0'))]
    }

    fn violations(&self) -> Vec<String> {
        if self.utf8 {
            Vec::new()
        } else {
            vec![format!("{} box is not valid UTF-8", box_type_name(&self.box_type))]
        }
    }
}

/// UUID box (I.7.2): a vendor UUID followed by vendor data.
#[derive(Debug, Default)]
pub struct UUIDBox {
    length: u64,
    offset: u64,
    uuid: [u8; 16],
}

impl UUIDBox {
    pub fn uuid(&self) -> [u8; 16] {
        self.uuid
    }
}

impl JBox for UUIDBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_UUID
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 16 {
            return Err(malformed(header, "UUID box too short for its identifier"));
        }
        self.uuid = read_uuid(reader)?;
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::text("uuid", uuid_text(&self.uuid)),
            Property::integer("dataLength", (self.length - 16) as i64),
        ]
    }
}

/// UUID List box (I.7.3.1).
#[derive(Debug, Default)]
pub struct UUIDListBox {
    length: u64,
    offset: u64,
    ids: Vec<[u8; 16]>,
}

impl JBox for UUIDListBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_UUID_LIST
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 2 {
            return Err(malformed(header, "UUID List box too short"));
        }
        let count = read_u16(reader)?;
        if self.length != 2 + 16 * count as u64 {
            return Err(malformed(
                header,
                "UUID List box size does not match its entry count",
            ));
        }
        for _ in 0..count {
            self.ids.push(read_uuid(reader)?);
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![Property::list(
            "uuids",
            self.ids
                .iter()
                .map(|id| Property::text("uuid", uuid_text(id)))
                .collect(),
        )]
    }
}

/// Data Entry URL box (I.7.3.2).
#[derive(Debug, Default)]
pub struct DataEntryURLBox {
    length: u64,
    offset: u64,
    version: [u8; 1],
    flags: [u8; 3],
    location: String,
    utf8: bool,
}

impl DataEntryURLBox {
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl JBox for DataEntryURLBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_DATA_ENTRY_URL
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 4 {
            return Err(malformed(header, "Data Entry URL box too short"));
        }
        reader.read_exact(&mut self.version)?;
        reader.read_exact(&mut self.flags)?;

        let mut location = Vec::new();
        reader.read_to_end(&mut location)?;
        if let Some(end) = location.iter().position(|b| *b == 0) {
            location.truncate(end);
        }
        match str::from_utf8(&location) {
            Ok(text) => {
                self.location = text.to_owned();
                self.utf8 = true;
            }
            Err(_) => {
                self.location = String::from_utf8_lossy(&location).into_owned();
                self.utf8 = false;
            }
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        let flags = u32::from_be_bytes([0, self.flags[0], self.flags[1], self.flags[2]]);
        vec![
            Property::integer("version", self.version[0]),
            Property::integer("flags", flags),
            Property::text("location", self.location.clone()),
        ]
    }

    fn violations(&self) -> Vec<String> {
        if self.utf8 {
            Vec::new()
        } else {
            vec!["Data Entry URL box location is not valid UTF-8".to_owned()]
        }
    }
}

/// Opacity box (ISO/IEC 15444-2 M.11.7.6).
#[derive(Debug, Default)]
pub struct OpacityBox {
    length: u64,
    offset: u64,
    opacity_type: u8,
    channels: Option<u8>,
}

impl JBox for OpacityBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_OPACITY
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 1 {
            return Err(malformed(header, "Opacity box is empty"));
        }
        self.opacity_type = read_u8(reader)?;
        // Chroma key values follow the channel count and are skipped.
        if self.opacity_type == 2 {
            self.channels = Some(read_u8(reader)?);
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        let mut properties = vec![Property::integer("opacityType", self.opacity_type)];
        if let Some(channels) = self.channels {
            properties.push(Property::integer("chromaKeyChannels", channels));
        }
        properties
    }

    fn violations(&self) -> Vec<String> {
        if self.opacity_type > 2 {
            vec![format!(
                "Opacity box has reserved opacity type {}",
                self.opacity_type
            )]
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Registration {
    codestream: u16,
    horizontal_resolution: u8,
    vertical_resolution: u8,
    horizontal_offset: u8,
    vertical_offset: u8,
}

/// Codestream Registration box (ISO/IEC 15444-2 M.11.7.7).
#[derive(Debug, Default)]
pub struct CodestreamRegistrationBox {
    length: u64,
    offset: u64,
    grid_width: u16,
    grid_height: u16,
    registrations: Vec<Registration>,
}

impl JBox for CodestreamRegistrationBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_CODESTREAM_REGISTRATION
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 4 || (self.length - 4) % 6 != 0 {
            return Err(malformed(
                header,
                "Codestream Registration box is not a whole number of entries",
            ));
        }
        self.grid_width = read_u16(reader)?;
        self.grid_height = read_u16(reader)?;
        for _ in 0..(self.length - 4) / 6 {
            self.registrations.push(Registration {
                codestream: read_u16(reader)?,
                horizontal_resolution: read_u8(reader)?,
                vertical_resolution: read_u8(reader)?,
                horizontal_offset: read_u8(reader)?,
                vertical_offset: read_u8(reader)?,
            });
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("gridWidth", self.grid_width),
            Property::integer("gridHeight", self.grid_height),
            Property::list(
                "Registrations",
                self.registrations
                    .iter()
                    .map(|r| {
                        Property::list(
                            "Registration",
                            vec![
                                Property::integer("codestream", r.codestream),
                                Property::integer("horizontalResolution", r.horizontal_resolution),
                                Property::integer("verticalResolution", r.vertical_resolution),
                                Property::integer("horizontalOffset", r.horizontal_offset),
                                Property::integer("verticalOffset", r.vertical_offset),
                            ],
                        )
                    })
                    .collect(),
            ),
        ]
    }

    fn violations(&self) -> Vec<String> {
        self.registrations
            .iter()
            .filter(|r| {
                r.horizontal_offset >= r.horizontal_resolution
                    || r.vertical_offset >= r.vertical_resolution
            })
            .map(|r| {
                format!(
                    "Codestream Registration box offset not less than sampling for codestream {}",
                    r.codestream
                )
            })
            .collect()
    }
}

/// Fragment List box (ISO/IEC 15444-2 M.11.3.1).
#[derive(Debug, Default)]
pub struct FragmentListBox {
    length: u64,
    offset: u64,
    fragments: Vec<Fragment>,
}

impl FragmentListBox {
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn into_fragments(self) -> Vec<Fragment> {
        self.fragments
    }

    pub fn has_external(&self) -> bool {
        self.fragments.iter().any(|f| !f.is_local())
    }

    pub fn total_length(&self) -> u64 {
        self.fragments.iter().map(|f| f.length() as u64).sum()
    }
}

impl JBox for FragmentListBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_FRAGMENT_LIST
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 2 {
            return Err(malformed(header, "Fragment List box too short"));
        }
        let count = read_u16(reader)?;
        if self.length != 2 + 14 * count as u64 {
            return Err(malformed(
                header,
                "Fragment List box size does not match its fragment count",
            ));
        }
        for _ in 0..count {
            let offset = read_u64(reader)?;
            let length = read_u32(reader)?;
            let data_reference = read_u16(reader)?;
            self.fragments
                .push(Fragment::new(offset, length, data_reference));
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("fragmentCount", self.fragments.len() as i64),
            Property::integer("totalLength", self.total_length() as i64),
            Property::list(
                "Fragments",
                self.fragments
                    .iter()
                    .map(|f| {
                        Property::list(
                            "Fragment",
                            vec![
                                Property::integer("offset", f.offset() as i64),
                                Property::integer("length", f.length()),
                                Property::integer("dataReference", f.data_reference()),
                            ],
                        )
                    })
                    .collect(),
            ),
        ]
    }
}

/// Composition Options box (ISO/IEC 15444-2 M.11.10.1).
#[derive(Debug, Default)]
pub struct CompositionOptionsBox {
    length: u64,
    offset: u64,
    height: u32,
    width: u32,
    loop_count: u8,
}

impl JBox for CompositionOptionsBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_COMPOSITION_OPTIONS
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length != 9 {
            return Err(malformed(
                header,
                "Composition Options box length must be 17 bytes",
            ));
        }
        self.height = read_u32(reader)?;
        self.width = read_u32(reader)?;
        self.loop_count = read_u8(reader)?;
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("height", self.height),
            Property::integer("width", self.width),
            Property::integer("loopCount", self.loop_count),
        ]
    }
}

/// Instruction Set box (ISO/IEC 15444-2 M.11.10.2).
///
/// The size of each instruction follows from the type flags: offsets (bit 0),
/// sizes (bit 1), animation life and next-use (bit 2) and crop (bit 5).
#[derive(Debug, Default)]
pub struct InstructionSetBox {
    length: u64,
    offset: u64,
    instruction_type: u16,
    repeat: u16,
    tick: u32,
    instruction_count: u64,
}

impl InstructionSetBox {
    fn instruction_size(&self) -> u64 {
        let mut size = 0;
        if self.instruction_type & 0b1 != 0 {
            size += 8;
        }
        if self.instruction_type & 0b10 != 0 {
            size += 8;
        }
        if self.instruction_type & 0b100 != 0 {
            size += 8;
        }
        if self.instruction_type & 0b10_0000 != 0 {
            size += 16;
        }
        size
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }
}

impl JBox for InstructionSetBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_INSTRUCTION_SET
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 8 {
            return Err(malformed(header, "Instruction Set box too short"));
        }
        self.instruction_type = read_u16(reader)?;
        self.repeat = read_u16(reader)?;
        self.tick = read_u32(reader)?;

        let remaining = self.length - 8;
        let size = self.instruction_size();
        if size > 0 {
            if remaining % size != 0 {
                return Err(malformed(
                    header,
                    "Instruction Set box is not a whole number of instructions",
                ));
            }
            self.instruction_count = remaining / size;
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("instructionType", self.instruction_type),
            Property::integer("repeat", self.repeat),
            Property::integer("tick", self.tick),
            Property::integer("instructionCount", self.instruction_count as i64),
        ]
    }
}

/// Number List box (ISO/IEC 15444-2 M.11.11.2).
#[derive(Debug, Default)]
pub struct NumberListBox {
    length: u64,
    offset: u64,
    numbers: Vec<u32>,
}

impl JBox for NumberListBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_NUMBER_LIST
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length % 4 != 0 {
            return Err(malformed(
                header,
                "Number List box is not a whole number of entries",
            ));
        }
        for _ in 0..self.length / 4 {
            self.numbers.push(read_u32(reader)?);
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![Property::integers("associations", &self.numbers)]
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Region {
    included: u8,
    shape: u8,
    priority: u8,
    horizontal_offset: u32,
    vertical_offset: u32,
    width: u32,
    height: u32,
}

/// ROI Description box (ISO/IEC 15444-2 M.11.8).
#[derive(Debug, Default)]
pub struct ROIDescriptionBox {
    length: u64,
    offset: u64,
    count: u8,
    regions: Vec<Region>,
}

impl JBox for ROIDescriptionBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_ROI_DESCRIPTION
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 1 {
            return Err(malformed(header, "ROI Description box is empty"));
        }
        self.count = read_u8(reader)?;
        // A count that disagrees with the size is a validity failure; the
        // regions are only read when they fit.
        if self.length != 1 + 19 * self.count as u64 {
            return Ok(());
        }
        for _ in 0..self.count {
            self.regions.push(Region {
                included: read_u8(reader)?,
                shape: read_u8(reader)?,
                priority: read_u8(reader)?,
                horizontal_offset: read_u32(reader)?,
                vertical_offset: read_u32(reader)?,
                width: read_u32(reader)?,
                height: read_u32(reader)?,
            });
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        vec![
            Property::integer("regionCount", self.count),
            Property::list(
                "Regions",
                self.regions
                    .iter()
                    .map(|r| {
                        Property::list(
                            "Region",
                            vec![
                                Property::boolean("inCodestream", r.included == 1),
                                Property::integer("shape", r.shape),
                                Property::integer("priority", r.priority),
                                Property::integer("horizontalOffset", r.horizontal_offset),
                                Property::integer("verticalOffset", r.vertical_offset),
                                Property::integer("width", r.width),
                                Property::integer("height", r.height),
                            ],
                        )
                    })
                    .collect(),
            ),
        ]
    }

    fn violations(&self) -> Vec<String> {
        if self.length != 1 + 19 * self.count as u64 {
            vec!["ROI Description box size does not match its region count".to_owned()]
        } else {
            Vec::new()
        }
    }
}

/// Graphics Technology Standard Output box (ISO/IEC 15444-2 M.11.9.1).
#[derive(Debug, Default)]
pub struct GraphicsTechnologyStandardOutputBox {
    length: u64,
    offset: u64,
    icc_profile: Option<ICCProfile>,
    icc_error: Option<String>,
}

impl JBox for GraphicsTechnologyStandardOutputBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_GRAPHICS_TECHNOLOGY_STANDARD_OUTPUT
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        let mut profile = Vec::new();
        reader.read_to_end(&mut profile)?;
        match decode_icc(&mut profile.as_slice()) {
            Ok(icc) => self.icc_profile = Some(icc),
            Err(error) => self.icc_error = Some(error.to_string()),
        }
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        self.icc_profile.iter().map(icc_properties).collect()
    }

    fn violations(&self) -> Vec<String> {
        self.icc_error
            .iter()
            .map(|e| format!("Graphics Technology Standard Output box ICC profile: {}", e))
            .collect()
    }
}

/// Digital Signature box (ISO/IEC 15444-2 M.11.6).
#[derive(Debug, Default)]
pub struct DigitalSignatureBox {
    length: u64,
    offset: u64,
    signature_type: u8,
    pointer_type: u8,
    signed_range: Option<(u64, u64)>,
    signature_length: u64,
}

impl JBox for DigitalSignatureBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_DIGITAL_SIGNATURE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read>(
        &mut self,
        header: &BoxHeader,
        reader: &mut R,
    ) -> Result<(), Box<dyn error::Error>> {
        self.length = data_length(header);
        self.offset = header.offset();

        if self.length < 2 {
            return Err(malformed(header, "Digital Signature box too short"));
        }
        self.signature_type = read_u8(reader)?;
        self.pointer_type = read_u8(reader)?;
        let mut consumed = 2;
        if self.pointer_type == 1 {
            if self.length < 18 {
                return Err(malformed(header, "Digital Signature box pointer missing"));
            }
            self.signed_range = Some((read_u64(reader)?, read_u64(reader)?));
            consumed += 16;
        }
        self.signature_length = self.length - consumed;
        Ok(())
    }

    fn properties(&self) -> Vec<Property> {
        let mut properties = vec![
            Property::integer("signatureType", self.signature_type),
            Property::integer("pointerType", self.pointer_type),
        ];
        if let Some((offset, length)) = self.signed_range {
            properties.push(Property::integer("signedOffset", offset as i64));
            properties.push(Property::integer("signedLength", length as i64));
        }
        properties.push(Property::integer(
            "signatureLength",
            self.signature_length as i64,
        ));
        properties
    }

    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.signature_type > 3 {
            violations.push(format!(
                "Digital Signature box has reserved signature type {}",
                self.signature_type
            ));
        }
        if self.pointer_type > 1 {
            violations.push(format!(
                "Digital Signature box has reserved pointer type {}",
                self.pointer_type
            ));
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header_for(box_type: BoxType, contents: &[u8]) -> BoxHeader {
        let mut bytes = ((contents.len() + 8) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&box_type);
        decode_box_header(&mut Cursor::new(bytes), 0, None)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_uuid_text() {
        assert_eq!(
            uuid_text(&FILTER_DEFLATE),
            "EC340B04-74C5-11D4-A729-879EA3548F0E"
        );
    }

    #[test]
    fn test_image_header_size() {
        let contents = [0u8; 13];
        let header = header_for(BOX_TYPE_IMAGE_HEADER, &contents);
        let result: Result<ImageHeaderBox, _> =
            decode_box(&header, &mut Cursor::new(&contents[..]));
        assert!(result.is_err());
    }

    #[test]
    fn test_image_header_unknown_length() {
        let mut contents = 200u32.to_be_bytes().to_vec();
        contents.extend_from_slice(&100u32.to_be_bytes());
        contents.extend_from_slice(&[0, 3, 7, 7, 0, 0]);
        let mut bytes = vec![0, 0, 0, 0];
        bytes.extend_from_slice(&BOX_TYPE_IMAGE_HEADER);
        let header = decode_box_header(&mut Cursor::new(bytes), 0, None)
            .unwrap()
            .unwrap();
        assert_eq!(header.data_length(), None);

        let image_header: ImageHeaderBox =
            decode_box(&header, &mut Cursor::new(&contents)).unwrap();
        assert_eq!(image_header.width(), 100);
        assert_eq!(image_header.height(), 200);
        assert_eq!(image_header.length(), 14);
    }

    #[test]
    fn test_palette_entry_count() {
        // 2000 entries of one 8-bit column
        let mut contents = vec![0x07, 0xD0, 1, 7];
        contents.extend(vec![0u8; 2000]);
        let header = header_for(BOX_TYPE_PALETTE, &contents);
        let palette: PaletteBox = decode_box(&header, &mut Cursor::new(&contents)).unwrap();
        assert_eq!(palette.entries(), 2000);
        assert_eq!(palette.violations().len(), 1);
    }

    #[test]
    fn test_roi_count_mismatch_is_a_violation() {
        let contents = [2u8, 0, 0, 0];
        let header = header_for(BOX_TYPE_ROI_DESCRIPTION, &contents);
        let roid: ROIDescriptionBox =
            decode_box(&header, &mut Cursor::new(&contents[..])).unwrap();
        assert_eq!(roid.violations().len(), 1);
    }

    #[test]
    fn test_instruction_count() {
        // offsets and sizes: 16 bytes per instruction
        let mut contents = vec![0, 3, 0, 0, 0, 0, 0, 0];
        contents.extend(vec![0u8; 32]);
        let header = header_for(BOX_TYPE_INSTRUCTION_SET, &contents);
        let inst: InstructionSetBox = decode_box(&header, &mut Cursor::new(&contents)).unwrap();
        assert_eq!(inst.instruction_count(), 2);
    }
}
