use std::io::{Cursor, Write as _};

use flate2::{write::ZlibEncoder, Compression};
use jp2::{decode_jp2, JP2File, ParseOptions, FILTER_DEFLATE};
use report::{PropertyValue, Severity};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn boxed(box_type: &[u8; 4], contents: &[u8]) -> Vec<u8> {
    let mut bytes = ((contents.len() + 8) as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(box_type);
    bytes.extend_from_slice(contents);
    bytes
}

fn superbox(box_type: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    boxed(box_type, &children.concat())
}

fn signature() -> Vec<u8> {
    boxed(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0A])
}

fn file_type(brand: &[u8; 4]) -> Vec<u8> {
    let mut contents = brand.to_vec();
    contents.extend_from_slice(&[0, 0, 0, 0]);
    contents.extend_from_slice(b"jp2 ");
    boxed(b"ftyp", &contents)
}

fn image_header(width: u32, height: u32, components: u16) -> Vec<u8> {
    let mut contents = height.to_be_bytes().to_vec();
    contents.extend_from_slice(&width.to_be_bytes());
    contents.extend_from_slice(&components.to_be_bytes());
    contents.extend_from_slice(&[7, 7, 0, 0]);
    boxed(b"ihdr", &contents)
}

fn colour() -> Vec<u8> {
    boxed(b"colr", &[1, 0, 0, 0, 0, 0, 16])
}

fn jp2_header() -> Vec<u8> {
    superbox(b"jp2h", &[image_header(100, 200, 3), colour()])
}

fn segment(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xFF, code];
    bytes.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

// SOC, SIZ, COD, QCD, one empty tile-part and EOC.
fn codestream(width: u32, height: u32, components: u16) -> Vec<u8> {
    let mut siz = vec![0, 0];
    for value in &[width, height, 0, 0, width, height, 0, 0] {
        siz.extend_from_slice(&value.to_be_bytes());
    }
    siz.extend_from_slice(&components.to_be_bytes());
    for _ in 0..components {
        siz.extend_from_slice(&[7, 1, 1]);
    }

    let mut bytes = vec![0xFF, 0x4F];
    bytes.extend(segment(0x51, &siz));
    bytes.extend(segment(0x52, &[0, 0, 0, 1, 0, 0, 4, 4, 0, 1]));
    bytes.extend(segment(0x5C, &[0x40, 0x48]));
    bytes.extend(segment(0x90, &[0, 0, 0, 0, 0, 14, 0, 1]));
    bytes.extend_from_slice(&[0xFF, 0x93]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

fn contiguous_codestream() -> Vec<u8> {
    boxed(b"jp2c", &codestream(100, 200, 3))
}

fn fragment_list(fragments: &[(u64, u32, u16)]) -> Vec<u8> {
    let mut contents = (fragments.len() as u16).to_be_bytes().to_vec();
    for (offset, length, data_reference) in fragments {
        contents.extend_from_slice(&offset.to_be_bytes());
        contents.extend_from_slice(&length.to_be_bytes());
        contents.extend_from_slice(&data_reference.to_be_bytes());
    }
    boxed(b"flst", &contents)
}

fn minimal_file() -> Vec<u8> {
    [
        signature(),
        file_type(b"jp2 "),
        jp2_header(),
        contiguous_codestream(),
    ]
    .concat()
}

fn decode_with(bytes: &[u8], options: &ParseOptions) -> JP2File {
    init();
    decode_jp2(&mut Cursor::new(bytes), options).unwrap()
}

fn decode(bytes: &[u8]) -> JP2File {
    decode_with(bytes, &ParseOptions::default())
}

#[test]
fn test_minimal_file() {
    let bytes = minimal_file();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);

    let image_header = report.find("ImageHeader").unwrap();
    assert_eq!(image_header.find("width").unwrap().as_integer(), Some(100));
    assert_eq!(image_header.find("height").unwrap().as_integer(), Some(200));
    assert_eq!(
        image_header.find("bitsPerComponent").unwrap().as_integer(),
        Some(8)
    );
    assert_eq!(
        report.find("FileType").unwrap().find("brand").unwrap().as_text(),
        Some("jp2 ")
    );

    let codestreams = report.find("Codestreams").unwrap();
    assert_eq!(codestreams.children().len(), 1);
    let siz = codestreams.find("ImageAndTileSize").unwrap();
    assert_eq!(
        siz.find("referenceGridWidth").unwrap().value(),
        &PropertyValue::Integer(100)
    );
}

#[test]
fn test_codestream_without_tile_part() {
    // SOC, SIZ, COD, QCD, then SOD with no packet data and EOC.
    let mut contents = codestream(100, 200, 3);
    let start_of_tile = contents
        .windows(2)
        .position(|pair| pair == [0xFF, 0x90])
        .unwrap();
    contents.drain(start_of_tile..start_of_tile + 12);
    let bytes = [signature(), jp2_header(), boxed(b"jp2c", &contents)].concat();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);
    let image_header = report.find("ImageHeader").unwrap();
    assert_eq!(image_header.find("width").unwrap().as_integer(), Some(100));
    assert_eq!(image_header.find("height").unwrap().as_integer(), Some(200));
    assert_eq!(
        image_header.find("componentCount").unwrap().as_integer(),
        Some(3)
    );
    assert!(report.find("ImageAndTileSize").is_some());
}

#[test]
fn test_missing_file_type() {
    let bytes = [signature(), jp2_header(), contiguous_codestream()].concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("File Type box missing"));

    let image_header = report.find("ImageHeader").unwrap();
    assert_eq!(image_header.find("width").unwrap().as_integer(), Some(100));
    assert_eq!(image_header.find("height").unwrap().as_integer(), Some(200));
    assert_eq!(
        image_header.find("componentCount").unwrap().as_integer(),
        Some(3)
    );
}

#[test]
fn test_box_before_header() {
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        contiguous_codestream(),
        jp2_header(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("Other boxes may not occur before JP2 Header"));
    assert!(report.find("Codestreams").is_none());
}

#[test]
fn test_missing_signature() {
    let bytes = [file_type(b"jp2 "), jp2_header(), contiguous_codestream()].concat();
    let report = decode(&bytes).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("First box is not a JPEG 2000 Signature box"));
    assert!(report.properties().is_empty());
}

#[test]
fn test_empty_file() {
    let report = decode(&[]).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("no JPEG 2000 Signature box"));
}

#[test]
fn test_truncated_file() {
    let mut bytes = minimal_file();
    bytes.truncate(bytes.len() - 5);
    let file = decode(&bytes);

    assert!(!file.report().is_well_formed());
    assert!(file.length() <= bytes.len() as u64);
}

#[test]
fn test_missing_header() {
    let bytes = [signature(), file_type(b"jp2 ")].concat();
    let report = decode(&bytes).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("No JP2 Header box in file"));
    assert!(report.has_message("No codestream in file"));
}

#[test]
fn test_missing_colour() {
    let header = superbox(b"jp2h", &[image_header(100, 200, 3)]);
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("no Colour Specification box"));
}

#[test]
fn test_unknown_brand() {
    let bytes = [
        signature(),
        file_type(b"abcd"),
        jp2_header(),
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("brand 'abcd'"));
}

#[test]
fn test_external_cross_reference() {
    let cross_reference = superbox(b"cref", &[fragment_list(&[(0, 100, 1)])]);
    let bytes = [minimal_file(), cross_reference].concat();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);
    assert!(report.messages().iter().any(|message| {
        message.severity() == Severity::Info
            && message.text().contains("references an external file")
    }));
}

#[test]
fn test_empty_cross_reference() {
    let cross_reference = superbox(b"cref", &[fragment_list(&[])]);
    let bytes = [minimal_file(), cross_reference].concat();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);
    assert!(report.messages().iter().any(|message| {
        message.severity() == Severity::Info
            && message.text().contains("empty fragment list")
    }));
    assert!(report.find("xml").is_none());
}

#[test]
fn test_external_fragment_table() {
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        jp2_header(),
        superbox(b"ftbl", &[fragment_list(&[(0, 100, 1)])]),
    ]
    .concat();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);
    assert!(report.messages().iter().any(|message| {
        message.severity() == Severity::Info
            && message.text() == "Fragment Table box references an external file"
    }));
    assert!(!report.has_message("No codestream in file"));
    assert!(report.find("ImageAndTileSize").is_none());
}

#[test]
fn test_local_cross_reference() {
    let xml = boxed(b"xml ", b"<a>hello</a>");
    let mut payload = vec![0x11; 16];
    payload.extend_from_slice(&xml);

    let mut bytes = minimal_file();
    let xml_offset = (bytes.len() + 8 + 16) as u64;
    bytes.extend(boxed(b"uuid", &payload));

    // The XML box is reassembled from two fragments, read three bytes at a time.
    let first = 5;
    let rest = xml.len() as u32 - first;
    bytes.extend(superbox(
        b"cref",
        &[fragment_list(&[
            (xml_offset, first, 0),
            (xml_offset + first as u64, rest, 0),
        ])],
    ));

    let options = ParseOptions {
        fragment_buffer_size: 3,
        ..ParseOptions::default()
    };
    let file = decode_with(&bytes, &options);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);
    assert_eq!(
        report.find("xml").unwrap().as_text(),
        Some("<a>hello</a>")
    );
}

#[test]
fn test_deflate_binary_filter() {
    let inner = [boxed(b"xml ", b"<b/>"), boxed(b"uuid", &[0x22; 20])].concat();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&inner).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut contents = FILTER_DEFLATE.to_vec();
    contents.extend(compressed);
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        jp2_header(),
        boxed(b"bfil", &contents),
        contiguous_codestream(),
    ]
    .concat();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);
    assert_eq!(report.find("xml").unwrap().as_text(), Some("<b/>"));
    assert!(report.find("UUID").is_some());
    assert!(report.find("Codestreams").is_some());
}

#[test]
fn test_filtered_box_of_unknown_length() {
    // An Image Header written with LBox 0 as the last box of a filter stream.
    let mut image_header = image_header(100, 200, 3);
    image_header[..4].copy_from_slice(&[0, 0, 0, 0]);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&image_header).unwrap();
    let mut contents = FILTER_DEFLATE.to_vec();
    contents.extend(encoder.finish().unwrap());

    let bytes = [
        signature(),
        file_type(b"jp2 "),
        superbox(b"jp2h", &[boxed(b"bfil", &contents), colour()]),
        contiguous_codestream(),
    ]
    .concat();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert!(!report.has_message("must be 22 bytes"));
    assert_eq!(file.length(), bytes.len() as u64);
    let image_header = report.find("ImageHeader").unwrap();
    assert_eq!(image_header.find("width").unwrap().as_integer(), Some(100));
}

#[test]
fn test_unsupported_binary_filter() {
    let mut contents = vec![0x01; 16];
    contents.extend_from_slice(&[1, 2, 3, 4]);
    let bytes = [minimal_file(), boxed(b"bfil", &contents)].concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.has_message("contents not processed"));
}

#[test]
fn test_header_underrun() {
    let mut contents = [image_header(100, 200, 3), colour()].concat();
    contents.extend_from_slice(&[0, 0, 0]);
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        boxed(b"jp2h", &contents),
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("Box underrun: 3 byte(s) left over"));
    // The rest of the file is still read.
    assert!(report.find("Codestreams").is_some());
}

#[test]
fn test_header_overrun() {
    let mut header = jp2_header();
    header[3] -= 1;
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("overrun"));
}

#[test]
fn test_extended_length() {
    let contents = codestream(100, 200, 3);
    let mut codestream_box = vec![0, 0, 0, 1];
    codestream_box.extend_from_slice(b"jp2c");
    codestream_box.extend_from_slice(&((contents.len() + 16) as u64).to_be_bytes());
    codestream_box.extend(contents);

    let bytes = [
        signature(),
        file_type(b"jp2 "),
        jp2_header(),
        codestream_box,
    ]
    .concat();
    let file = decode(&bytes);

    assert!(file.report().is_well_formed(), "{}", file.report());
    assert!(file.report().is_valid(), "{}", file.report());
    assert_eq!(file.length(), bytes.len() as u64);
}

#[test]
fn test_zero_length_last_box() {
    let mut codestream_box = vec![0, 0, 0, 0];
    codestream_box.extend_from_slice(b"jp2c");
    codestream_box.extend(codestream(100, 200, 3));

    let bytes = [
        signature(),
        file_type(b"jp2 "),
        jp2_header(),
        codestream_box,
    ]
    .concat();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);
    assert!(report.find("ImageAndTileSize").is_some());
}

#[test]
fn test_image_header_wrong_size() {
    let header = superbox(b"jp2h", &[boxed(b"ihdr", &[0; 13]), colour()]);
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("Image Header box length must be 22 bytes"));
}

#[test]
fn test_palette_entry_count() {
    let mut palette = 2000u16.to_be_bytes().to_vec();
    palette.extend_from_slice(&[1, 7]);
    palette.extend(vec![0; 2000]);
    let header = superbox(
        b"jp2h",
        &[
            image_header(100, 200, 3),
            colour(),
            boxed(b"pclr", &palette),
            boxed(b"cmap", &[0, 0, 1, 0]),
        ],
    );
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("Palette box entry count 2000"));
}

#[test]
fn test_palette_without_mapping() {
    let header = superbox(
        b"jp2h",
        &[
            image_header(100, 200, 3),
            colour(),
            boxed(b"pclr", &[0, 1, 1, 7, 0]),
        ],
    );
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("no Component Mapping box"));
}

#[test]
fn test_channel_definition_size_mismatch() {
    let header = superbox(
        b"jp2h",
        &[
            image_header(100, 200, 3),
            colour(),
            boxed(b"cdef", &[0, 2, 0, 0, 0, 0, 0, 1]),
        ],
    );
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("Channel Definition box size"));
}

#[test]
fn test_channel_definition_duplicate() {
    let header = superbox(
        b"jp2h",
        &[
            image_header(100, 200, 3),
            colour(),
            boxed(
                b"cdef",
                &[0, 2, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 2],
            ),
        ],
    );
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("duplicate channel 0"));
}

#[test]
fn test_box_in_wrong_container() {
    let header = superbox(
        b"jp2h",
        &[image_header(100, 200, 3), colour(), contiguous_codestream()],
    );
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(!report.is_well_formed());
    assert!(report.has_message("may not occur in JP2 Header box"));
    assert_eq!(report.find("Codestreams").unwrap().children().len(), 1);
}

#[test]
fn test_image_header_codestream_mismatch() {
    let header = superbox(b"jp2h", &[image_header(120, 200, 3), colour()]);
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(!report.is_valid());
    assert!(report.has_message("Image Header box width 120 does not match codestream 100"));
}

#[test]
fn test_codestream_header_scoping() {
    let bytes = [
        signature(),
        file_type(b"jpx "),
        jp2_header(),
        superbox(b"jpch", &[boxed(b"lbl ", b"first")]),
        contiguous_codestream(),
        contiguous_codestream(),
    ]
    .concat();
    let report = decode(&bytes).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);

    let codestreams = report.find("Codestreams").unwrap().children();
    assert_eq!(codestreams.len(), 2);
    assert_eq!(codestreams[0].find("index").unwrap().as_integer(), Some(0));
    assert_eq!(
        codestreams[0].find("label").unwrap().as_text(),
        Some("first")
    );
    assert!(codestreams[0].find("CodestreamHeader").is_some());
    assert!(codestreams[1].find("label").is_none());
    assert_eq!(codestreams[1].find("index").unwrap().as_integer(), Some(1));
}

#[test]
fn test_nested_superboxes() {
    let association = superbox(
        b"asoc",
        &[boxed(b"lbl ", b"outer"), superbox(b"asoc", &[boxed(b"lbl ", b"inner")])],
    );
    let bytes = [
        signature(),
        file_type(b"jpx "),
        jp2_header(),
        superbox(b"jplh", &[boxed(b"lbl ", b"layer")]),
        association,
        contiguous_codestream(),
    ]
    .concat();
    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);
    assert_eq!(
        report
            .find("CompositingLayerHeader")
            .unwrap()
            .find("label")
            .unwrap()
            .as_text(),
        Some("layer")
    );
    let association = report.find("Association").unwrap();
    assert_eq!(association.children().len(), 2);
    assert_eq!(
        association.children()[1].find("label").unwrap().as_text(),
        Some("inner")
    );
}

#[test]
fn test_fragment_table() {
    let contents = codestream(100, 200, 3);
    let mut bytes = [signature(), file_type(b"jp2 "), jp2_header()].concat();
    let codestream_offset = (bytes.len() + 8) as u64;
    bytes.extend(boxed(b"mdat", &contents));

    let split = 10;
    let rest = contents.len() as u32 - split;
    bytes.extend(superbox(
        b"ftbl",
        &[fragment_list(&[
            (codestream_offset, split, 0),
            (codestream_offset + split as u64, rest, 0),
        ])],
    ));

    let file = decode(&bytes);
    let report = file.report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert_eq!(file.length(), bytes.len() as u64);

    let codestream = report.find("Codestream").unwrap();
    assert_eq!(
        codestream.find("fragmentCount").unwrap().as_integer(),
        Some(2)
    );
    assert_eq!(
        codestream.find("referenceGridWidth").unwrap().as_integer(),
        Some(100)
    );
}

#[test]
fn test_skip_codestreams() {
    let header = superbox(b"jp2h", &[image_header(120, 200, 3), colour()]);
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        header,
        contiguous_codestream(),
    ]
    .concat();
    let options = ParseOptions {
        parse_codestreams: false,
        ..ParseOptions::default()
    };
    let report = decode_with(&bytes, &options).into_report();

    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert!(report.find("ImageAndTileSize").is_none());
    let entry = report.find("Codestream").unwrap();
    assert_eq!(
        entry.find("length").unwrap().as_integer(),
        Some(codestream(100, 200, 3).len() as i64)
    );
}

#[test]
fn test_decode_is_repeatable() {
    let bytes = [
        signature(),
        file_type(b"jp2 "),
        superbox(b"jp2h", &[image_header(120, 200, 3), colour()]),
        contiguous_codestream(),
    ]
    .concat();

    let first = decode(&bytes).into_report();
    let second = decode(&bytes).into_report();
    assert_eq!(first, second);
}
