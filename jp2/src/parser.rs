use jpc::{parse_codestream, Codestream};
use log::{debug, info};
use report::{Property, Report};
use std::error;
use std::io::{self, Read};

use super::boxes::*;
use super::dispatch::{BoxKind, Container};
use super::fragment::FragmentStream;
use super::header::*;
use super::iter::BoxIter;
use super::source::Source;
use super::{JP2Error, ParseOptions};

/// Which family of rules the File Type box selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Profile {
    Unknown,
    JP2,
    JPX,
}

#[derive(Debug, Default)]
struct CodestreamEntry {
    header: Vec<Property>,
    body: Vec<Property>,
}

fn is_aborted(error: &Box<dyn error::Error>) -> bool {
    matches!(error.downcast_ref::<JP2Error>(), Some(JP2Error::Aborted))
}

pub struct Parser<'r> {
    report: &'r mut Report,
    options: ParseOptions,
    profile: Profile,
    file_type_seen: bool,
    header_seen: bool,
    intellectual_property_seen: bool,
    // Image Header of the JP2 Header box, compared against the first codestream.
    header_image: Option<ImageHeaderBox>,
    // Last Image Header and Bits Per Component read in the open header superbox.
    image_header: Option<ImageHeaderBox>,
    bits_per_component: Option<usize>,
    pending_fragments: Option<FragmentListBox>,
    codestream_headers: usize,
    codestream_count: usize,
    codestreams: Vec<CodestreamEntry>,
}

impl<'r> Parser<'r> {
    pub fn new(report: &'r mut Report, options: &ParseOptions) -> Parser<'r> {
        Parser {
            report,
            options: options.clone(),
            profile: Profile::Unknown,
            file_type_seen: false,
            header_seen: false,
            intellectual_property_seen: false,
            header_image: None,
            image_header: None,
            bits_per_component: None,
            pending_fragments: None,
            codestream_headers: 0,
            codestream_count: 0,
            codestreams: Vec::new(),
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Reads the whole file and returns the number of bytes consumed.
    pub fn parse<R: io::Read + io::Seek>(&mut self, source: &mut Source<R>) -> u64 {
        let start = source.position();
        let mut iter = BoxIter::new(Container::File, None, source.depth());
        let mut properties = Vec::new();

        let result = self.read_file(source, &mut iter, &mut properties);
        iter.close(source);
        match result {
            Ok(true) => self.check_file(),
            Ok(false) => {}
            Err(error) => {
                if !is_aborted(&error) {
                    self.report.malformed(error.to_string(), source.position());
                }
            }
        }

        for property in properties {
            self.report.add_property(property);
        }
        if !self.codestreams.is_empty() {
            let entries = self
                .codestreams
                .drain(..)
                .enumerate()
                .map(|(index, entry)| {
                    let mut properties = vec![Property::integer("index", index as i64)];
                    if !entry.header.is_empty() {
                        properties.push(Property::list(
                            BoxKind::CodestreamHeader.name(),
                            entry.header,
                        ));
                    }
                    properties.extend(entry.body);
                    Property::list("Codestream", properties)
                })
                .collect();
            self.report
                .add_property(Property::list("Codestreams", entries));
        }

        source.position() - start
    }

    // Ok(false) when a file-level precondition stopped the scan.
    fn read_file<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        iter: &mut BoxIter,
        properties: &mut Vec<Property>,
    ) -> Result<bool, Box<dyn error::Error>> {
        let header = match iter.next(source, self.report, &self.options)? {
            Some(header) => header,
            None => {
                self.report
                    .malformed("File contains no JPEG 2000 Signature box", 0);
                return Ok(false);
            }
        };
        if header.box_type() != BOX_TYPE_SIGNATURE {
            self.report.malformed(
                "First box is not a JPEG 2000 Signature box",
                header.offset(),
            );
            return Ok(false);
        }
        info!("SignatureBox start at {:?}", header.offset());
        let signature: Result<SignatureBox, _> =
            decode_box(&header, &mut (&mut *source).take(header.data_length().unwrap_or(0)));
        if let Err(error) = signature {
            self.report.malformed(error.to_string(), header.offset());
            return Ok(false);
        }
        self.finish_box(source, iter, &header)?;

        let mut index = 1;
        while let Some(header) = iter.next(source, self.report, &self.options)? {
            let kind = BoxKind::from_type(header.box_type());
            if index == 1 && kind != BoxKind::FileType {
                self.report.invalid(
                    "File Type box missing after the JPEG 2000 Signature box",
                    header.offset(),
                );
            }
            if !self.header_seen && !kind.allowed_before_header() {
                self.report.malformed(
                    "Other boxes may not occur before JP2 Header",
                    header.offset(),
                );
                return Ok(false);
            }
            if kind == BoxKind::FileType && index != 1 {
                self.report.invalid(
                    "File Type box must immediately follow the JPEG 2000 Signature box",
                    header.offset(),
                );
            }

            self.read_box_reporting(source, &header, Container::File, properties);
            self.finish_box(source, iter, &header)?;
            index += 1;
        }
        Ok(true)
    }

    fn check_file(&mut self) {
        if !self.header_seen {
            self.report.malformed("No JP2 Header box in file", 0);
        }
        if self.codestream_count == 0 {
            self.report.invalid("No codestream in file", 0);
        }
        if let Some(image_header) = &self.header_image {
            if image_header.intellectual_property() == 1 && !self.intellectual_property_seen {
                self.report.invalid(
                    "Image Header box signals intellectual property rights but there is no Intellectual Property box",
                    image_header.offset(),
                );
            }
        }
    }

    fn finish_box<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        iter: &mut BoxIter,
        header: &BoxHeader,
    ) -> Result<(), Box<dyn error::Error>> {
        if let Err(error) = iter.finish(source, header) {
            self.report.malformed(error.to_string(), header.offset());
            return Err(JP2Error::Aborted.into());
        }
        Ok(())
    }

    fn read_box_reporting<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        container: Container,
        properties: &mut Vec<Property>,
    ) {
        if let Err(error) = self.read_box(source, header, container, properties) {
            if !is_aborted(&error) {
                self.report.malformed(error.to_string(), header.offset());
            }
        }
    }

    /// Reads the boxes of one superbox, whose contents are `budget` bytes.
    fn read_boxes<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        container: Container,
        budget: Option<u64>,
        properties: &mut Vec<Property>,
    ) -> Result<Vec<BoxKind>, Box<dyn error::Error>> {
        let mut iter = BoxIter::new(container, budget, source.depth());
        let mut kinds = Vec::new();
        let result = self.read_children(source, &mut iter, &mut kinds, properties);
        let left_over = iter.close(source);
        result?;
        if let Some(left_over) = left_over {
            self.report.malformed(
                format!(
                    "Box underrun: {} byte(s) left over at the end of the {}",
                    left_over, container
                ),
                source.position(),
            );
        }
        Ok(kinds)
    }

    fn read_children<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        iter: &mut BoxIter,
        kinds: &mut Vec<BoxKind>,
        properties: &mut Vec<Property>,
    ) -> Result<(), Box<dyn error::Error>> {
        let container = iter.container();
        while let Some(header) = iter.next(source, self.report, &self.options)? {
            kinds.push(BoxKind::from_type(header.box_type()));
            self.read_box_reporting(source, &header, container, properties);
            self.finish_box(source, iter, &header)?;
        }
        Ok(())
    }

    fn read_box<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        container: Container,
        properties: &mut Vec<Property>,
    ) -> Result<(), Box<dyn error::Error>> {
        let kind = BoxKind::from_type(header.box_type());
        info!("{}Box start at {:?}", kind.name(), header.offset());

        if !kind.is_legal_in(container) {
            return Err(JP2Error::BoxUnexpected {
                box_type: header.box_type(),
                container: container.to_string(),
                offset: header.offset(),
            }
            .into());
        }

        match kind {
            BoxKind::Signature => {
                return Err(JP2Error::BoxDuplicate {
                    box_type: header.box_type(),
                    offset: header.offset(),
                }
                .into());
            }
            BoxKind::FileType => {
                let file_type: FileTypeBox = self.read_leaf(source, header, kind, properties)?;
                self.check_file_type(&file_type);
            }
            BoxKind::ReaderRequirements => {
                self.read_leaf::<ReaderRequirementsBox, R>(source, header, kind, properties)?;
            }
            BoxKind::Header => self.read_header_box(source, header, properties)?,
            BoxKind::ImageHeader => {
                let image_header: ImageHeaderBox =
                    self.read_leaf(source, header, kind, properties)?;
                if self.image_header.is_some() {
                    self.report.invalid(
                        "More than one Image Header box in a header box",
                        header.offset(),
                    );
                }
                self.image_header = Some(image_header);
            }
            BoxKind::BitsPerComponent => {
                let bits: BitsPerComponentBox = self.read_leaf(source, header, kind, properties)?;
                self.bits_per_component = Some(bits.components_num());
            }
            BoxKind::ColourSpecification => {
                let colour: ColourSpecificationBox =
                    self.read_leaf(source, header, kind, properties)?;
                self.check_colour(&colour, container);
            }
            BoxKind::Palette => {
                self.read_leaf::<PaletteBox, R>(source, header, kind, properties)?;
            }
            BoxKind::ComponentMapping => {
                self.read_leaf::<ComponentMappingBox, R>(source, header, kind, properties)?;
            }
            BoxKind::ChannelDefinition => {
                self.read_leaf::<ChannelDefinitionBox, R>(source, header, kind, properties)?;
            }
            BoxKind::CaptureResolution | BoxKind::DefaultDisplayResolution => {
                self.read_leaf::<ResolutionBox, R>(source, header, kind, properties)?;
            }
            BoxKind::ContiguousCodestream => self.read_codestream_box(source, header)?,
            BoxKind::IntellectualProperty => {
                self.intellectual_property_seen = true;
                self.read_leaf::<OpaqueBox, R>(source, header, kind, properties)?;
            }
            BoxKind::Xml | BoxKind::Label => {
                self.read_leaf::<TextBox, R>(source, header, kind, properties)?;
            }
            BoxKind::Uuid => {
                self.read_leaf::<UUIDBox, R>(source, header, kind, properties)?;
            }
            BoxKind::UuidList => {
                self.read_leaf::<UUIDListBox, R>(source, header, kind, properties)?;
            }
            BoxKind::DataEntryUrl => {
                self.read_leaf::<DataEntryURLBox, R>(source, header, kind, properties)?;
            }
            BoxKind::CodestreamHeader => self.read_codestream_header(source, header)?,
            BoxKind::Opacity => {
                self.read_leaf::<OpacityBox, R>(source, header, kind, properties)?;
            }
            BoxKind::CodestreamRegistration => {
                self.read_leaf::<CodestreamRegistrationBox, R>(source, header, kind, properties)?;
            }
            BoxKind::FragmentTable => self.read_fragment_table(source, header, properties)?,
            BoxKind::FragmentList => {
                let list: FragmentListBox = self.read_leaf(source, header, kind, properties)?;
                if self.pending_fragments.is_some() {
                    self.report.invalid(
                        "Fragment Table box holds more than one Fragment List box",
                        header.offset(),
                    );
                } else {
                    self.pending_fragments = Some(list);
                }
            }
            BoxKind::CompositionOptions => {
                self.read_leaf::<CompositionOptionsBox, R>(source, header, kind, properties)?;
            }
            BoxKind::InstructionSet => {
                self.read_leaf::<InstructionSetBox, R>(source, header, kind, properties)?;
            }
            BoxKind::NumberList => {
                self.read_leaf::<NumberListBox, R>(source, header, kind, properties)?;
            }
            BoxKind::GraphicsTechnologyStandardOutput => {
                self.read_leaf::<GraphicsTechnologyStandardOutputBox, R>(
                    source, header, kind, properties,
                )?;
            }
            BoxKind::DigitalSignature => {
                self.read_leaf::<DigitalSignatureBox, R>(source, header, kind, properties)?;
            }
            BoxKind::RoiDescription => {
                self.read_leaf::<ROIDescriptionBox, R>(source, header, kind, properties)?;
            }
            BoxKind::MediaData | BoxKind::Mpeg7Binary => {
                self.read_leaf::<OpaqueBox, R>(source, header, kind, properties)?;
            }
            BoxKind::DataReference => self.read_data_reference(source, header, properties)?,
            BoxKind::Resolution => {
                let kinds = self.read_superbox(source, header, kind, properties)?;
                if !kinds.iter().any(|k| {
                    matches!(
                        k,
                        BoxKind::CaptureResolution | BoxKind::DefaultDisplayResolution
                    )
                }) {
                    self.report.invalid(
                        "Resolution box holds neither a Capture nor a Default Display Resolution box",
                        header.offset(),
                    );
                }
            }
            BoxKind::UuidInfo => {
                let kinds = self.read_superbox(source, header, kind, properties)?;
                let lists = kinds.iter().filter(|k| **k == BoxKind::UuidList).count();
                let urls = kinds.iter().filter(|k| **k == BoxKind::DataEntryUrl).count();
                if lists != 1 || urls != 1 {
                    self.report.invalid(
                        "UUID Info box must hold one UUID List box and one Data Entry URL box",
                        header.offset(),
                    );
                }
            }
            BoxKind::ColourGroup => {
                let kinds = self.read_superbox(source, header, kind, properties)?;
                if !kinds.contains(&BoxKind::ColourSpecification) {
                    self.report.invalid(
                        "Colour Group box holds no Colour Specification box",
                        header.offset(),
                    );
                }
            }
            BoxKind::Composition => {
                let kinds = self.read_superbox(source, header, kind, properties)?;
                if kinds.first() != Some(&BoxKind::CompositionOptions) {
                    self.report.invalid(
                        "Composition box must begin with a Composition Options box",
                        header.offset(),
                    );
                }
            }
            kind if kind.is_superbox() => {
                self.read_superbox(source, header, kind, properties)?;
            }
            _ => {
                debug!(
                    "skipping {} box at {}",
                    box_type_name(&header.box_type()),
                    header.offset()
                );
            }
        }

        info!("{}Box finish at {:?}", kind.name(), source.position());
        Ok(())
    }

    fn read_leaf<B, R>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        kind: BoxKind,
        properties: &mut Vec<Property>,
    ) -> Result<B, Box<dyn error::Error>>
    where
        B: JBox + Default,
        R: io::Read + io::Seek,
    {
        let limit = header.data_length().unwrap_or(u64::MAX);
        let jbox: B = decode_box(header, &mut (&mut *source).take(limit))?;
        for violation in jbox.violations() {
            self.report.invalid(violation, header.offset());
        }
        properties.push(Property::list(kind.name(), jbox.properties()));
        Ok(jbox)
    }

    fn read_superbox<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        kind: BoxKind,
        properties: &mut Vec<Property>,
    ) -> Result<Vec<BoxKind>, Box<dyn error::Error>> {
        let mut children = Vec::new();
        let result = self.read_boxes(
            source,
            Container::Super(kind),
            header.data_length(),
            &mut children,
        );
        properties.push(Property::list(kind.name(), children));
        result
    }

    fn read_header_box<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        properties: &mut Vec<Property>,
    ) -> Result<(), Box<dyn error::Error>> {
        if self.header_seen {
            self.report.invalid("More than one JP2 Header box", header.offset());
        }
        self.header_seen = true;
        self.image_header = None;
        self.bits_per_component = None;

        let kinds = self.read_superbox(source, header, BoxKind::Header, properties)?;
        if kinds.first() != Some(&BoxKind::ImageHeader) {
            self.report.malformed(
                "JP2 Header box must begin with an Image Header box",
                header.offset(),
            );
        }
        if !kinds.contains(&BoxKind::ColourSpecification) {
            self.report.invalid(
                "JP2 Header box holds no Colour Specification box",
                header.offset(),
            );
        }
        self.check_header_group(&kinds, header, BoxKind::Header);
        if self.header_image.is_none() {
            self.header_image = self.image_header.take();
        }
        Ok(())
    }

    fn read_codestream_header<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
    ) -> Result<(), Box<dyn error::Error>> {
        let index = self.codestream_headers;
        self.codestream_headers += 1;
        self.image_header = None;
        self.bits_per_component = None;

        let mut children = Vec::new();
        let result = self.read_boxes(
            source,
            Container::Super(BoxKind::CodestreamHeader),
            header.data_length(),
            &mut children,
        );
        self.codestream_entry(index).header.extend(children);
        let kinds = result?;
        self.check_header_group(&kinds, header, BoxKind::CodestreamHeader);
        Ok(())
    }

    // Rules shared by JP2 Header and Codestream Header boxes.
    fn check_header_group(&mut self, kinds: &[BoxKind], header: &BoxHeader, kind: BoxKind) {
        let has = |wanted: BoxKind| kinds.contains(&wanted);
        if has(BoxKind::Palette) && !has(BoxKind::ComponentMapping) {
            self.report.invalid(
                format!(
                    "{} box holds a Palette box but no Component Mapping box",
                    kind.description()
                ),
                header.offset(),
            );
        }
        if has(BoxKind::ComponentMapping) && !has(BoxKind::Palette) {
            self.report.invalid(
                format!(
                    "{} box holds a Component Mapping box but no Palette box",
                    kind.description()
                ),
                header.offset(),
            );
        }

        let image_header = match &self.image_header {
            Some(image_header) => image_header,
            None => return,
        };
        match (image_header.bits_vary(), self.bits_per_component) {
            (true, None) => self.report.invalid(
                "Image Header box gives varying bit depths but there is no Bits Per Component box",
                header.offset(),
            ),
            (false, Some(_)) => self.report.invalid(
                "Bits Per Component box present but Image Header box gives one bit depth",
                header.offset(),
            ),
            (true, Some(count)) if count != image_header.components_num() as usize => {
                let expected = image_header.components_num();
                self.report.invalid(
                    format!(
                        "Bits Per Component box gives {} depth(s) for {} component(s)",
                        count, expected
                    ),
                    header.offset(),
                )
            }
            _ => {}
        }
    }

    fn check_file_type(&mut self, file_type: &FileTypeBox) {
        self.file_type_seen = true;
        self.profile = match file_type.brand() {
            BRAND_JP2 => Profile::JP2,
            BRAND_JPX => Profile::JPX,
            _ => Profile::Unknown,
        };
        debug!("profile {:?}", self.profile);

        if self.profile == Profile::Unknown {
            self.report.invalid(
                format!(
                    "File Type box brand {} is neither 'jp2 ' nor 'jpx '",
                    box_type_name(&file_type.brand())
                ),
                file_type.offset(),
            );
        }
        if !file_type.is_compatible_with(BRAND_JP2)
            && !file_type.is_compatible_with(BRAND_JPX)
            && !file_type.is_compatible_with(BRAND_JPX_BASELINE)
        {
            self.report.invalid(
                JP2Error::NotCompatible {
                    compatibility_list: file_type.compatibility_list(),
                }
                .to_string(),
                file_type.offset(),
            );
        }
    }

    fn check_colour(&mut self, colour: &ColourSpecificationBox, container: Container) {
        if colour.method_is_reserved() {
            self.report.report_info(
                format!(
                    "Colour Specification box with reserved method {}: box ignored",
                    colour.method()
                ),
                colour.offset(),
            );
            return;
        }
        if self.profile != Profile::JP2 || container != Container::Super(BoxKind::Header) {
            return;
        }

        match colour.method() {
            1 => {
                if let Some(value) = colour.enumerated_colourspace() {
                    if !matches!(value, ENUMERATED_SRGB | ENUMERATED_GREYSCALE | ENUMERATED_SYCC) {
                        self.report.invalid(
                            format!(
                                "Colour Specification box enumerated colourspace {} not allowed in JP2",
                                value
                            ),
                            colour.offset(),
                        );
                    }
                }
            }
            2 => {
                if let Some(profile) = colour.icc_profile() {
                    if !profile.is_input_or_display() {
                        self.report.invalid(
                            format!(
                                "Restricted ICC profile must be an input or display profile, found '{}'",
                                profile.device_class()
                            ),
                            colour.offset(),
                        );
                    }
                }
            }
            method => self.report.invalid(
                format!("Colour Specification method {} not allowed in JP2", method),
                colour.offset(),
            ),
        }
        if colour.colourspace_approximation() != 0 {
            self.report.invalid(
                "Colour Specification box approximation must be 0 in JP2",
                colour.offset(),
            );
        }
    }

    fn read_codestream_box<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
    ) -> Result<(), Box<dyn error::Error>> {
        let index = self.codestream_count;
        self.codestream_count += 1;

        let body = if self.options.parse_codestreams {
            let limit = header.data_length().unwrap_or(u64::MAX);
            let codestream = parse_codestream(
                &mut (&mut *source).take(limit),
                header.data_offset(),
                self.report,
            );
            self.check_codestream(index, &codestream, header.offset());
            codestream.properties()
        } else {
            vec![
                Property::integer("offset", header.data_offset() as i64),
                Property::integer("length", header.data_length().unwrap_or(0) as i64),
            ]
        };
        self.codestream_entry(index).body.extend(body);
        Ok(())
    }

    fn read_fragment_table<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        properties: &mut Vec<Property>,
    ) -> Result<(), Box<dyn error::Error>> {
        self.pending_fragments = None;
        self.read_superbox(source, header, BoxKind::FragmentTable, properties)?;
        let list = match self.pending_fragments.take() {
            Some(list) => list,
            None => {
                return Err(JP2Error::BoxMissing {
                    box_type: BOX_TYPE_FRAGMENT_LIST,
                    container: "Fragment Table box".to_owned(),
                }
                .into())
            }
        };

        let index = self.codestream_count;
        self.codestream_count += 1;
        let total = list.total_length();
        let mut body = vec![
            Property::integer("fragmentCount", list.fragments().len() as i64),
            Property::integer("length", total as i64),
        ];

        if list.has_external() {
            self.report.report_info(
                "Fragment Table box references an external file",
                header.offset(),
            );
        } else if self.options.parse_codestreams {
            source.push_fragments(FragmentStream::new(
                list.into_fragments(),
                self.options.fragment_buffer_size,
            ));
            let codestream = parse_codestream(&mut (&mut *source).take(total), 0, self.report);
            source.pop();
            self.check_codestream(index, &codestream, header.offset());
            body.extend(codestream.properties());
        }
        self.codestream_entry(index).body.extend(body);
        Ok(())
    }

    fn read_data_reference<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        properties: &mut Vec<Property>,
    ) -> Result<(), Box<dyn error::Error>> {
        let length = header.data_length().unwrap_or(u64::MAX);
        if length < 2 {
            return Err(JP2Error::BoxMalformed {
                box_type: header.box_type(),
                reason: "Data Reference box too short".to_owned(),
                offset: header.offset(),
            }
            .into());
        }
        let mut count: [u8; 2] = [0; 2];
        source.read_exact(&mut count)?;
        let count = u16::from_be_bytes(count);

        let mut children = vec![Property::integer("entryCount", count)];
        let result = self.read_boxes(
            source,
            Container::Super(BoxKind::DataReference),
            header.data_length().map(|length| length - 2),
            &mut children,
        );
        properties.push(Property::list(BoxKind::DataReference.name(), children));
        let kinds = result?;

        let urls = kinds
            .iter()
            .filter(|k| **k == BoxKind::DataEntryUrl)
            .count();
        if urls != count as usize {
            self.report.invalid(
                format!(
                    "Data Reference box declares {} entries but holds {} Data Entry URL box(es)",
                    count, urls
                ),
                header.offset(),
            );
        }
        Ok(())
    }

    // The first codestream must agree with the JP2 Image Header.
    fn check_codestream(&mut self, index: usize, codestream: &Codestream, offset: u64) {
        if index != 0 {
            return;
        }
        let (image_header, siz) = match (&self.header_image, codestream.image_and_tile_size()) {
            (Some(image_header), Some(siz)) => (image_header, siz),
            _ => return,
        };
        let checks = [
            ("width", image_header.width() as u64, siz.width() as u64),
            ("height", image_header.height() as u64, siz.height() as u64),
            (
                "component count",
                image_header.components_num() as u64,
                siz.no_components() as u64,
            ),
        ];
        for (field, expected, found) in checks.iter() {
            if expected != found {
                self.report.invalid(
                    format!(
                        "Image Header box {} {} does not match codestream {}",
                        field, expected, found
                    ),
                    offset,
                );
            }
        }
    }

    fn codestream_entry(&mut self, index: usize) -> &mut CodestreamEntry {
        while self.codestreams.len() <= index {
            self.codestreams.push(CodestreamEntry::default());
        }
        &mut self.codestreams[index]
    }
}
