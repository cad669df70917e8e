use std::error;
use std::io;
use std::str;

use super::JP2Error;

pub type BoxType = [u8; 4];

// jP\040\040 (0x6A50 2020)
pub const BOX_TYPE_SIGNATURE: BoxType = [106, 80, 32, 32];
pub const BOX_TYPE_FILE_TYPE: BoxType = [102, 116, 121, 112];
pub const BOX_TYPE_READER_REQUIREMENTS: BoxType = [114, 114, 101, 113];
pub const BOX_TYPE_HEADER: BoxType = [106, 112, 50, 104];
pub const BOX_TYPE_IMAGE_HEADER: BoxType = [105, 104, 100, 114];
pub const BOX_TYPE_BITS_PER_COMPONENT: BoxType = [98, 112, 99, 99];
pub const BOX_TYPE_COLOUR_SPECIFICATION: BoxType = [99, 111, 108, 114];
pub const BOX_TYPE_PALETTE: BoxType = [112, 99, 108, 114];
pub const BOX_TYPE_COMPONENT_MAPPING: BoxType = [99, 109, 97, 112];
pub const BOX_TYPE_CHANNEL_DEFINITION: BoxType = [99, 100, 101, 102];
pub const BOX_TYPE_RESOLUTION: BoxType = [114, 101, 115, 32];
pub const BOX_TYPE_CAPTURE_RESOLUTION: BoxType = [114, 101, 115, 99];
pub const BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION: BoxType = [114, 101, 115, 100];
pub const BOX_TYPE_CONTIGUOUS_CODESTREAM: BoxType = [106, 112, 50, 99];
pub const BOX_TYPE_INTELLECTUAL_PROPERTY: BoxType = [106, 112, 50, 105];
pub const BOX_TYPE_XML: BoxType = [120, 109, 108, 32];
pub const BOX_TYPE_UUID: BoxType = [117, 117, 105, 100];
pub const BOX_TYPE_UUID_INFO: BoxType = [117, 105, 110, 102];
pub const BOX_TYPE_UUID_LIST: BoxType = [117, 108, 115, 116];
pub const BOX_TYPE_DATA_ENTRY_URL: BoxType = [117, 114, 108, 32];

// ISO/IEC 15444-2 (JPX) box types
pub const BOX_TYPE_CODESTREAM_HEADER: BoxType = [106, 112, 99, 104];
pub const BOX_TYPE_COMPOSITING_LAYER_HEADER: BoxType = [106, 112, 108, 104];
pub const BOX_TYPE_COLOUR_GROUP: BoxType = [99, 103, 114, 112];
pub const BOX_TYPE_OPACITY: BoxType = [111, 112, 99, 116];
pub const BOX_TYPE_CODESTREAM_REGISTRATION: BoxType = [99, 114, 101, 103];
pub const BOX_TYPE_FRAGMENT_TABLE: BoxType = [102, 116, 98, 108];
pub const BOX_TYPE_FRAGMENT_LIST: BoxType = [102, 108, 115, 116];
pub const BOX_TYPE_CROSS_REFERENCE: BoxType = [99, 114, 101, 102];
pub const BOX_TYPE_MEDIA_DATA: BoxType = [109, 100, 97, 116];
pub const BOX_TYPE_COMPOSITION: BoxType = [99, 111, 109, 112];
pub const BOX_TYPE_COMPOSITION_OPTIONS: BoxType = [99, 111, 112, 116];
pub const BOX_TYPE_INSTRUCTION_SET: BoxType = [105, 110, 115, 116];
pub const BOX_TYPE_ASSOCIATION: BoxType = [97, 115, 111, 99];
pub const BOX_TYPE_NUMBER_LIST: BoxType = [110, 108, 115, 116];
pub const BOX_TYPE_LABEL: BoxType = [108, 98, 108, 32];
pub const BOX_TYPE_BINARY_FILTER: BoxType = [98, 102, 105, 108];
pub const BOX_TYPE_DESIRED_REPRODUCTIONS: BoxType = [100, 114, 101, 112];
pub const BOX_TYPE_GRAPHICS_TECHNOLOGY_STANDARD_OUTPUT: BoxType = [103, 116, 115, 111];
pub const BOX_TYPE_DIGITAL_SIGNATURE: BoxType = [99, 104, 99, 107];
pub const BOX_TYPE_MPEG7_BINARY: BoxType = [109, 112, 55, 98];
pub const BOX_TYPE_ROI_DESCRIPTION: BoxType = [114, 111, 105, 100];
pub const BOX_TYPE_DATA_REFERENCE: BoxType = [100, 116, 98, 108];
pub const BOX_TYPE_FREE: BoxType = [102, 114, 101, 101];

pub fn box_type_name(box_type: &BoxType) -> String {
    match str::from_utf8(box_type) {
        Ok(name) => format!("'{}'", name),
        Err(_) => format!("{:?}", box_type),
    }
}

/// Length and type of one box (I.4).
#[derive(Debug, Clone, PartialEq)]
pub struct BoxHeader {
    box_type: BoxType,
    box_length: u64,
    header_length: u64,
    data_length: Option<u64>,
    offset: u64,
}

impl BoxHeader {
    pub fn box_type(&self) -> BoxType {
        self.box_type
    }

    /// LBox or XLBox as written; 0 when the box runs to the end of its
    /// container.
    pub fn box_length(&self) -> u64 {
        self.box_length
    }

    pub fn header_length(&self) -> u64 {
        self.header_length
    }

    /// Bytes of box contents, None when the box runs to the end of a stream
    /// whose length is not known.
    pub fn data_length(&self) -> Option<u64> {
        self.data_length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_length
    }

    pub fn total_length(&self) -> Option<u64> {
        self.data_length.map(|length| length + self.header_length)
    }

    /// The same header with its contents measured as `data_length` bytes.
    pub fn with_data_length(&self, data_length: u64) -> BoxHeader {
        BoxHeader {
            data_length: Some(data_length),
            ..self.clone()
        }
    }
}

fn read_full<R: io::Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buffer.len() {
        match reader.read(&mut buffer[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

/// Reads one box header at `offset`.
///
/// `remaining` is the number of bytes left in the container starting at the
/// header, used to size a box whose LBox is 0. Returns `Ok(None)` when the
/// stream ends cleanly before the header.
pub fn decode_box_header<R: io::Read>(
    reader: &mut R,
    offset: u64,
    remaining: Option<u64>,
) -> Result<Option<BoxHeader>, Box<dyn error::Error>> {
    let mut buffer: [u8; 8] = [0; 8];
    match read_full(reader, &mut buffer)? {
        0 => return Ok(None),
        8 => {}
        _ => return Err(JP2Error::PrematureEnd { offset }.into()),
    }

    let mut box_length: [u8; 4] = [0; 4];
    let mut box_type: BoxType = [0; 4];
    box_length.copy_from_slice(&buffer[..4]);
    box_type.copy_from_slice(&buffer[4..]);
    let box_length = u32::from_be_bytes(box_length) as u64;

    let header = match box_length {
        // If the value of this field is 0, then the length of the box was not
        // known when the LBox field was written. In this case, this box
        // contains all bytes up to the end of its container.
        0 => BoxHeader {
            box_type,
            box_length,
            header_length: 8,
            data_length: remaining.map(|r| r.saturating_sub(8)),
            offset,
        },
        // If the value of this field is 1, then the XLBox field shall exist
        // and the value of that field shall be the actual length of the box.
        1 => {
            let mut xl_length: [u8; 8] = [0; 8];
            if read_full(reader, &mut xl_length)? != 8 {
                return Err(JP2Error::PrematureEnd { offset }.into());
            }
            let xl_length = u64::from_be_bytes(xl_length);
            if xl_length < 16 {
                return Err(JP2Error::BoxLengthInvalid {
                    box_type,
                    length: xl_length,
                    offset,
                }
                .into());
            }
            BoxHeader {
                box_type,
                box_length: xl_length,
                header_length: 16,
                data_length: Some(xl_length - 16),
                offset,
            }
        }
        // The values 2–7 are reserved for ISO use.
        2..=7 => {
            return Err(JP2Error::BoxLengthInvalid {
                box_type,
                length: box_length,
                offset,
            }
            .into());
        }
        _ => BoxHeader {
            box_type,
            box_length,
            header_length: 8,
            data_length: Some(box_length - 8),
            offset,
        },
    };
    Ok(Some(header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_plain_header() {
        let bytes = [0, 0, 0, 22, b'i', b'h', b'd', b'r'];
        let header = decode_box_header(&mut Cursor::new(&bytes), 40, None)
            .unwrap()
            .unwrap();
        assert_eq!(header.box_type(), BOX_TYPE_IMAGE_HEADER);
        assert_eq!(header.header_length(), 8);
        assert_eq!(header.data_length(), Some(14));
        assert_eq!(header.data_offset(), 48);
    }

    #[test]
    fn test_extended_length() {
        let mut bytes = vec![0, 0, 0, 1, b'j', b'p', b'2', b'c'];
        bytes.extend_from_slice(&1000u64.to_be_bytes());
        let header = decode_box_header(&mut Cursor::new(&bytes), 0, None)
            .unwrap()
            .unwrap();
        assert_eq!(header.header_length(), 16);
        assert_eq!(header.box_length(), 1000);
        assert_eq!(header.data_length(), Some(984));
    }

    #[test]
    fn test_length_to_end_of_container() {
        let bytes = [0, 0, 0, 0, b'j', b'p', b'2', b'c'];
        let header = decode_box_header(&mut Cursor::new(&bytes), 0, Some(100))
            .unwrap()
            .unwrap();
        assert_eq!(header.box_length(), 0);
        assert_eq!(header.data_length(), Some(92));

        let header = decode_box_header(&mut Cursor::new(&bytes), 0, None)
            .unwrap()
            .unwrap();
        assert_eq!(header.data_length(), None);
    }

    #[test]
    fn test_reserved_length() {
        let bytes = [0, 0, 0, 5, b'x', b'm', b'l', b' '];
        assert!(decode_box_header(&mut Cursor::new(&bytes), 0, None).is_err());
    }

    #[test]
    fn test_clean_and_partial_end() {
        let empty: [u8; 0] = [];
        assert!(decode_box_header(&mut Cursor::new(&empty), 0, None)
            .unwrap()
            .is_none());
        let partial = [0, 0, 0];
        assert!(decode_box_header(&mut Cursor::new(&partial), 0, None).is_err());
    }
}
