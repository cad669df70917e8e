use icc::decode_icc;
use std::io::Cursor;

fn profile(class: &[u8; 4], signature: &[u8; 4], tag_end: u32) -> Vec<u8> {
    let size: u32 = 128 + 4 + 12 + 8;
    let mut bytes = vec![0u8; 128];
    bytes[0..4].copy_from_slice(&size.to_be_bytes());
    bytes[4..8].copy_from_slice(b"lcms");
    bytes[8] = 2;
    bytes[9] = 0x10;
    bytes[12..16].copy_from_slice(class);
    bytes[16..20].copy_from_slice(b"RGB ");
    bytes[20..24].copy_from_slice(b"XYZ ");
    bytes[36..40].copy_from_slice(signature);
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(b"wtpt");
    bytes.extend_from_slice(&144u32.to_be_bytes());
    bytes.extend_from_slice(&(tag_end - 144).to_be_bytes());
    bytes.extend_from_slice(&[0; 8]);
    bytes
}

#[test]
fn test_decode_header() {
    let bytes = profile(b"scnr", b"acsp", 152);
    let profile = decode_icc(&mut Cursor::new(bytes)).unwrap();

    assert_eq!(profile.size(), 152);
    assert_eq!(profile.preferred_cmm(), "lcms");
    assert_eq!(profile.version(), "2.1.0");
    assert_eq!(profile.device_class(), "scnr");
    assert_eq!(profile.colour_space(), "RGB");
    assert_eq!(profile.connection_space(), "XYZ");
    assert!(profile.is_input_or_display());
    assert_eq!(profile.tags().len(), 1);
    assert_eq!(profile.tags()[0].signature(), "wtpt");
    assert_eq!(profile.tags()[0].size(), 8);
}

#[test]
fn test_output_class_is_not_input_or_display() {
    let bytes = profile(b"prtr", b"acsp", 152);
    let profile = decode_icc(&mut Cursor::new(bytes)).unwrap();
    assert!(!profile.is_input_or_display());
}

#[test]
fn test_bad_signature() {
    let bytes = profile(b"scnr", b"xxxx", 152);
    assert!(decode_icc(&mut Cursor::new(bytes)).is_err());
}

#[test]
fn test_tag_past_profile_end() {
    let bytes = profile(b"scnr", b"acsp", 400);
    assert!(decode_icc(&mut Cursor::new(bytes)).is_err());
}

#[test]
fn test_truncated_header() {
    assert!(decode_icc(&mut Cursor::new(vec![0u8; 64])).is_err());
}
