use std::io::Cursor;

use jpc::{decode_jpc, parse_codestream, ProgressionOrder, TransformationFilter};
use report::{PropertyValue, Report};

fn segment(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xFF, code];
    bytes.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

fn siz(width: u32, height: u32, tile_width: u32, tile_height: u32, components: u16) -> Vec<u8> {
    let mut payload = vec![0, 0];
    for value in &[width, height, 0, 0, tile_width, tile_height, 0, 0] {
        payload.extend_from_slice(&value.to_be_bytes());
    }
    payload.extend_from_slice(&components.to_be_bytes());
    for _ in 0..components {
        payload.extend_from_slice(&[7, 1, 1]);
    }
    segment(0x51, &payload)
}

fn cod() -> Vec<u8> {
    segment(0x52, &[0, 0, 0, 1, 0, 0, 4, 4, 0, 1])
}

fn qcd() -> Vec<u8> {
    segment(0x5C, &[0x40, 0x48])
}

fn sot(tile_index: u16, length: u32, part_index: u8, part_count: u8) -> Vec<u8> {
    let mut payload = tile_index.to_be_bytes().to_vec();
    payload.extend_from_slice(&length.to_be_bytes());
    payload.extend_from_slice(&[part_index, part_count]);
    segment(0x90, &payload)
}

/// A tile-part with the given extra header segments and packet data bytes.
fn tile_part(tile_index: u16, part_index: u8, header: &[u8], data: &[u8]) -> Vec<u8> {
    let length = 12 + header.len() + 2 + data.len();
    let mut bytes = sot(tile_index, length as u32, part_index, 0);
    bytes.extend_from_slice(header);
    bytes.extend_from_slice(&[0xFF, 0x93]);
    bytes.extend_from_slice(data);
    bytes
}

fn main_header() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0x4F];
    bytes.extend(siz(100, 200, 100, 200, 3));
    bytes.extend(cod());
    bytes.extend(qcd());
    bytes
}

fn codestream(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = main_header();
    for part in parts {
        bytes.extend_from_slice(part);
    }
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

#[test]
fn test_minimal_codestream() {
    let bytes = codestream(&[tile_part(0, 0, &[], &[])]);
    let mut report = Report::new();
    let codestream = parse_codestream(&mut Cursor::new(&bytes), 0, &mut report);

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert!(codestream.has_end_of_codestream());
    assert_eq!(codestream.length(), bytes.len() as u64);

    let siz = codestream.image_and_tile_size().unwrap();
    assert_eq!(siz.width(), 100);
    assert_eq!(siz.height(), 200);
    assert_eq!(siz.no_components(), 3);
    assert_eq!(siz.precision(0), Some(8));
    assert_eq!(siz.values_are_signed(0), Some(false));
    assert_eq!(siz.num_tiles(), 1);

    let main = codestream.main_header();
    let cod = main.find("CodingStyleDefault").unwrap();
    assert_eq!(
        cod.find("progressionOrder").unwrap().as_text(),
        Some(ProgressionOrder::LRLCPP.name().as_str())
    );
    assert_eq!(
        cod.find("transformation").unwrap().as_text(),
        Some(TransformationFilter::Reversible.name().as_str())
    );
    assert_eq!(cod.find("codeBlockWidth").unwrap().as_integer(), Some(64));

    assert_eq!(codestream.tiles().len(), 1);
    let tile = codestream.tile(0).unwrap();
    assert_eq!(tile.parts().len(), 1);
    assert_eq!(tile.parts()[0].length(), 14);
}

#[test]
fn test_start_of_data_without_tile_part() {
    let mut bytes = main_header();
    bytes.extend_from_slice(&[0xFF, 0x93, 0xFF, 0xD9]);
    let mut report = Report::new();
    let codestream = parse_codestream(&mut Cursor::new(&bytes), 0, &mut report);

    assert!(report.is_well_formed(), "{}", report);
    assert!(codestream.has_end_of_codestream());
    assert_eq!(codestream.length(), bytes.len() as u64);
    assert!(codestream.tiles().is_empty());
    assert_eq!(codestream.image_and_tile_size().unwrap().no_components(), 3);
}

#[test]
fn test_start_of_data_before_main_header_complete() {
    let mut bytes = vec![0xFF, 0x4F];
    bytes.extend(siz(100, 200, 100, 200, 3));
    bytes.extend_from_slice(&[0xFF, 0x93, 0xFF, 0xD9]);
    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(!report.is_well_formed());
    assert!(report.has_message("missing COD marker"));
}

#[test]
fn test_coc_before_siz() {
    let mut bytes = vec![0xFF, 0x4F];
    bytes.extend(segment(0x53, &[0, 0, 0, 4, 4, 0, 1]));
    bytes.extend(siz(100, 200, 100, 200, 3));
    bytes.extend(cod());
    bytes.extend(qcd());
    bytes.extend(tile_part(0, 0, &[], &[]));
    bytes.extend_from_slice(&[0xFF, 0xD9]);

    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(!report.is_well_formed());
    assert!(report.has_message("wrong position in codestream"));
    // The segment is skipped and the rest of the codestream still parses.
    assert!(report.find("ImageAndTileSize").is_some());
    assert!(report.find("CodingStyleComponent").is_none());
}

#[test]
fn test_plt_packet_lengths() {
    let plt = segment(0x58, &[0, 0x81, 0x02, 0x05]);
    let bytes = codestream(&[tile_part(0, 0, &plt, &[0; 135])]);
    let mut report = Report::new();
    let codestream = parse_codestream(&mut Cursor::new(&bytes), 0, &mut report);

    assert!(report.is_well_formed(), "{}", report);
    let tile = codestream.tile(0).unwrap();
    let lengths = tile.scope().find("packetLengths").unwrap();
    assert_eq!(lengths.value(), &PropertyValue::Integers(vec![130, 5]));
    assert!(codestream.main_header().find("packetLengths").is_none());
}

#[test]
fn test_plm_packet_lengths() {
    let mut bytes = main_header();
    bytes.extend(segment(0x57, &[0, 2, 0x81, 0x02, 1, 0x07]));
    bytes.extend(tile_part(0, 0, &[], &[]));
    bytes.extend_from_slice(&[0xFF, 0xD9]);

    let report = decode_jpc(&mut Cursor::new(&bytes));
    assert!(report.is_well_formed(), "{}", report);
    let lengths = report.find("packetLengths").unwrap();
    assert_eq!(lengths.value(), &PropertyValue::Integers(vec![130, 7]));
}

#[test]
fn test_segment_length_mismatch_resynchronises() {
    // RGN declares one payload byte more than it carries.
    let mut bytes = main_header();
    bytes.extend(segment(0x5E, &[0, 0, 3, 0]));
    bytes.extend(tile_part(0, 0, &[], &[]));
    bytes.extend_from_slice(&[0xFF, 0xD9]);

    let mut report = Report::new();
    let codestream = parse_codestream(&mut Cursor::new(&bytes), 0, &mut report);

    assert!(!report.is_well_formed());
    assert!(report.has_message("RGN marker segment length 6 does not match"));
    assert!(codestream.has_end_of_codestream());
}

#[test]
fn test_missing_soc() {
    let bytes = siz(100, 200, 100, 200, 3);
    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(!report.is_well_formed());
    assert!(report.has_message("missing SOC marker"));
}

#[test]
fn test_ill_formed_marker() {
    let mut bytes = main_header();
    bytes.extend_from_slice(&[0x00, 0x90]);
    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(!report.is_well_formed());
    assert!(report.has_message("ill-formed codestream"));
}

#[test]
fn test_missing_eoc() {
    let mut bytes = main_header();
    bytes.extend(tile_part(0, 0, &[], &[1, 2, 3]));
    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(!report.is_well_formed());
    assert!(report.has_message("missing EOC marker"));
}

#[test]
fn test_truncated_tile_part() {
    let mut bytes = main_header();
    let part = tile_part(0, 0, &[], &[0; 16]);
    bytes.extend_from_slice(&part[..part.len() - 8]);
    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(!report.is_well_formed());
    assert!(report.has_message("premature end of codestream"));
}

#[test]
fn test_packet_data_is_skipped() {
    // Marker-like bytes inside the bitstream are never interpreted.
    let data = [0xFF, 0x4F, 0xFF, 0x51, 0x00];
    let bytes = codestream(&[tile_part(0, 0, &[], &data)]);
    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(report.is_well_formed(), "{}", report);
}

#[test]
fn test_sparse_out_of_order_tiles() {
    let mut bytes = vec![0xFF, 0x4F];
    bytes.extend(siz(100, 200, 50, 100, 3));
    bytes.extend(cod());
    bytes.extend(qcd());
    bytes.extend(tile_part(3, 0, &[], &[0; 2]));
    bytes.extend(tile_part(1, 0, &[], &[0; 4]));
    bytes.extend(tile_part(3, 1, &[], &[0; 1]));
    bytes.extend_from_slice(&[0xFF, 0xD9]);

    let mut report = Report::new();
    let codestream = parse_codestream(&mut Cursor::new(&bytes), 0, &mut report);

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    let indices: Vec<u16> = codestream.tiles().keys().copied().collect();
    assert_eq!(indices, vec![1, 3]);
    assert_eq!(codestream.tile(3).unwrap().parts().len(), 2);
    assert_eq!(codestream.tile(3).unwrap().parts()[1].index(), 1);
}

#[test]
fn test_tile_index_out_of_range() {
    let bytes = codestream(&[tile_part(5, 0, &[], &[])]);
    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("tile index 5 not below tile count 1"));
}

#[test]
fn test_last_tile_part_runs_to_eoc() {
    let mut bytes = main_header();
    bytes.extend(sot(0, 0, 0, 1));
    bytes.extend_from_slice(&[0xFF, 0x93, 1, 2, 3, 4]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);

    let mut report = Report::new();
    let codestream = parse_codestream(&mut Cursor::new(&bytes), 0, &mut report);

    assert!(report.is_well_formed(), "{}", report);
    assert!(codestream.has_end_of_codestream());
    assert_eq!(codestream.tile(0).unwrap().parts()[0].length(), 0);
}

#[test]
fn test_tile_header_segments_scoped_to_tile() {
    let com = segment(0x64, &[0, 1, b'h', b'i']);
    let bytes = codestream(&[tile_part(0, 0, &com, &[])]);
    let mut report = Report::new();
    let codestream = parse_codestream(&mut Cursor::new(&bytes), 0, &mut report);

    assert!(report.is_well_formed(), "{}", report);
    let comment = codestream.tile(0).unwrap().scope().find("comment").unwrap();
    assert_eq!(comment.as_text(), Some("hi"));
    assert!(codestream.main_header().find("comment").is_none());
}

#[test]
fn test_main_header_marker_in_tile_header() {
    let plm = segment(0x57, &[0, 1, 0x05]);
    let bytes = codestream(&[tile_part(0, 0, &plm, &[])]);
    let report = decode_jpc(&mut Cursor::new(&bytes));

    assert!(!report.is_well_formed());
    assert!(report.has_message("unexpected PLM marker"));
}

#[test]
fn test_wide_component_index() {
    let mut bytes = vec![0xFF, 0x4F];
    bytes.extend(siz(100, 200, 100, 200, 300));
    bytes.extend(cod());
    bytes.extend(qcd());
    // Two-byte component index 299.
    bytes.extend(segment(0x53, &[0x01, 0x2B, 0, 0, 4, 4, 0, 1]));
    bytes.extend(tile_part(0, 0, &[], &[]));
    bytes.extend_from_slice(&[0xFF, 0xD9]);

    let report = decode_jpc(&mut Cursor::new(&bytes));
    assert!(report.is_well_formed(), "{}", report);
    let coc = report.find("CodingStyleComponent").unwrap();
    assert_eq!(coc.find("component").unwrap().as_integer(), Some(299));
}

#[test]
fn test_missing_main_header_segments() {
    let mut bytes = vec![0xFF, 0x4F];
    bytes.extend(siz(100, 200, 100, 200, 3));
    bytes.extend(tile_part(0, 0, &[], &[]));
    bytes.extend_from_slice(&[0xFF, 0xD9]);

    let report = decode_jpc(&mut Cursor::new(&bytes));
    assert!(!report.is_well_formed());
    assert!(report.has_message("missing COD marker"));
    assert!(report.has_message("missing QCD marker"));
}

#[test]
fn test_bad_tile_grid_is_invalid() {
    let mut bytes = vec![0xFF, 0x4F];
    let mut payload = vec![0, 0];
    // Xsiz, Ysiz, XOsiz, YOsiz, XTsiz, YTsiz, XTOsiz > XOsiz, YTOsiz
    for value in &[100u32, 200, 0, 0, 100, 200, 5, 0] {
        payload.extend_from_slice(&value.to_be_bytes());
    }
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(&[7, 1, 1]);
    bytes.extend(segment(0x51, &payload));
    bytes.extend(cod());
    bytes.extend(qcd());
    bytes.extend(tile_part(0, 0, &[], &[]));
    bytes.extend_from_slice(&[0xFF, 0xD9]);

    let report = decode_jpc(&mut Cursor::new(&bytes));
    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("tile grid offset overflow"));
}

#[test]
fn test_parse_is_idempotent() {
    let plt = segment(0x58, &[0, 0x81, 0x02]);
    let bytes = codestream(&[tile_part(0, 0, &plt, &[0; 130])]);

    let first = decode_jpc(&mut Cursor::new(&bytes));
    let second = decode_jpc(&mut Cursor::new(&bytes));
    assert_eq!(first, second);
}
