use log::{debug, info};
use std::error;
use std::fmt;
use std::io;
use std::str;

const HEADER_LENGTH: usize = 128;

// 'acsp'
const PROFILE_FILE_SIGNATURE: [u8; 4] = [97, 99, 115, 112];

#[derive(Debug)]
pub enum ICCError {
    InvalidSignature { signature: [u8; 4] },
    SizeTooSmall { size: u32 },
    TagOutOfBounds { signature: [u8; 4], end: u64, size: u32 },
}

impl error::Error for ICCError {}
impl fmt::Display for ICCError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidSignature { signature } => {
                write!(f, "invalid ICC profile file signature {:?}", signature)
            }
            Self::SizeTooSmall { size } => {
                write!(f, "ICC profile size {} is smaller than its header", size)
            }
            Self::TagOutOfBounds {
                signature,
                end,
                size,
            } => write!(
                f,
                "ICC tag {:?} ends at {} beyond profile size {}",
                four_cc(signature),
                end,
                size
            ),
        }
    }
}

fn four_cc(value: &[u8; 4]) -> String {
    str::from_utf8(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| format!("{:?}", value))
}

// Each tag signature in the tag table must be unique;
// a profile cannot contain more than one tag with the same signature.
#[derive(Debug, Default)]
pub struct Tag {
    signature: [u8; 4],
    offset: [u8; 4], // uInt32Number
    size: [u8; 4],   // uInt32Number
}

impl Tag {
    // A four byte value registered with the ICC
    pub fn signature(&self) -> String {
        four_cc(&self.signature)
    }

    // An address within an ICC profile, relative to byte zero of the file.
    pub fn offset(&self) -> u32 {
        u32::from_be_bytes(self.offset)
    }

    // The number of bytes in the tag data element.
    pub fn size(&self) -> u32 {
        u32::from_be_bytes(self.size)
    }
}

/// Structural view of an ICC profile: the fixed 128-byte header and the tag
/// table. Tag data elements are not interpreted.
///
/// For more information, see ICC.1:2010 section 7.2 and 7.3.
#[derive(Debug, Default)]
pub struct ICCProfile {
    size: [u8; 4],
    preferred_cmm: [u8; 4],
    version: [u8; 4],
    device_class: [u8; 4],
    colour_space: [u8; 4],
    connection_space: [u8; 4],
    primary_platform: [u8; 4],
    rendering_intent: [u8; 4],
    creator: [u8; 4],
    tags: Vec<Tag>,
}

impl ICCProfile {
    pub fn size(&self) -> u32 {
        u32::from_be_bytes(self.size)
    }

    pub fn preferred_cmm(&self) -> String {
        four_cc(&self.preferred_cmm)
    }

    /// Version as "major.minor.bugfix", from bytes 8 and 9 of the header.
    pub fn version(&self) -> String {
        format!(
            "{}.{}.{}",
            self.version[0],
            self.version[1] >> 4,
            self.version[1] & 0x0F
        )
    }

    /// Profile/device class, e.g. 'scnr' (input), 'mntr' (display).
    pub fn device_class(&self) -> String {
        four_cc(&self.device_class)
    }

    pub fn colour_space(&self) -> String {
        four_cc(&self.colour_space)
    }

    /// Profile connection space, 'XYZ ' or 'Lab '.
    pub fn connection_space(&self) -> String {
        four_cc(&self.connection_space)
    }

    pub fn primary_platform(&self) -> String {
        four_cc(&self.primary_platform)
    }

    pub fn rendering_intent(&self) -> u32 {
        u32::from_be_bytes(self.rendering_intent)
    }

    pub fn creator(&self) -> String {
        four_cc(&self.creator)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// True for the Input (scanner) and Display device classes, the two
    /// classes a restricted JP2 profile may carry.
    pub fn is_input_or_display(&self) -> bool {
        self.device_class == *b"scnr" || self.device_class == *b"mntr"
    }
}

/// Decodes the header and tag table of the ICC profile at the reader's
/// position. The reader is left after the tag table; the caller owns the
/// remainder of the profile bytes.
pub fn decode_icc<R: io::Read>(reader: &mut R) -> Result<ICCProfile, Box<dyn error::Error>> {
    info!("ICC profile start");
    let mut header: [u8; HEADER_LENGTH] = [0; HEADER_LENGTH];
    reader.read_exact(&mut header)?;

    let mut profile = ICCProfile::default();
    profile.size.copy_from_slice(&header[0..4]);
    profile.preferred_cmm.copy_from_slice(&header[4..8]);
    profile.version.copy_from_slice(&header[8..12]);
    profile.device_class.copy_from_slice(&header[12..16]);
    profile.colour_space.copy_from_slice(&header[16..20]);
    profile.connection_space.copy_from_slice(&header[20..24]);
    profile.primary_platform.copy_from_slice(&header[40..44]);
    profile.rendering_intent.copy_from_slice(&header[64..68]);
    profile.creator.copy_from_slice(&header[80..84]);

    let mut signature: [u8; 4] = [0; 4];
    signature.copy_from_slice(&header[36..40]);
    if signature != PROFILE_FILE_SIGNATURE {
        return Err(ICCError::InvalidSignature { signature }.into());
    }

    // The tag count alone needs four bytes past the header.
    if (profile.size() as usize) < HEADER_LENGTH + 4 {
        return Err(ICCError::SizeTooSmall {
            size: profile.size(),
        }
        .into());
    }

    let mut tag_count: [u8; 4] = [0; 4];
    reader.read_exact(&mut tag_count)?;
    let tag_count = u32::from_be_bytes(tag_count);
    debug!("ICC profile with {} tags", tag_count);

    // Each entry is 12 bytes; cap the allocation by what the profile can hold.
    let capacity = cmp_capacity(tag_count, profile.size());
    let mut tags: Vec<Tag> = Vec::with_capacity(capacity);
    for _ in 0..tag_count {
        let mut tag = Tag::default();
        reader.read_exact(&mut tag.signature)?;
        reader.read_exact(&mut tag.offset)?;
        reader.read_exact(&mut tag.size)?;

        let end = tag.offset() as u64 + tag.size() as u64;
        if end > profile.size() as u64 {
            return Err(ICCError::TagOutOfBounds {
                signature: tag.signature,
                end,
                size: profile.size(),
            }
            .into());
        }
        tags.push(tag);
    }
    profile.tags = tags;

    info!("ICC profile finish");
    Ok(profile)
}

fn cmp_capacity(tag_count: u32, size: u32) -> usize {
    let fits = (size as usize).saturating_sub(HEADER_LENGTH + 4) / 12;
    std::cmp::min(tag_count as usize, fits)
}
