use std::fmt;

use super::header::*;

/// Every box kind the reader recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxKind {
    Signature,
    FileType,
    ReaderRequirements,
    Header,
    ImageHeader,
    BitsPerComponent,
    ColourSpecification,
    Palette,
    ComponentMapping,
    ChannelDefinition,
    Resolution,
    CaptureResolution,
    DefaultDisplayResolution,
    ContiguousCodestream,
    IntellectualProperty,
    Xml,
    Uuid,
    UuidInfo,
    UuidList,
    DataEntryUrl,
    CodestreamHeader,
    CompositingLayerHeader,
    ColourGroup,
    Opacity,
    CodestreamRegistration,
    FragmentTable,
    FragmentList,
    CrossReference,
    MediaData,
    Composition,
    CompositionOptions,
    InstructionSet,
    Association,
    NumberList,
    Label,
    BinaryFilter,
    DesiredReproductions,
    GraphicsTechnologyStandardOutput,
    DigitalSignature,
    Mpeg7Binary,
    RoiDescription,
    DataReference,
    Free,
    Unknown,
}

const DISPATCH: [(BoxType, BoxKind); 43] = [
    (BOX_TYPE_SIGNATURE, BoxKind::Signature),
    (BOX_TYPE_FILE_TYPE, BoxKind::FileType),
    (BOX_TYPE_READER_REQUIREMENTS, BoxKind::ReaderRequirements),
    (BOX_TYPE_HEADER, BoxKind::Header),
    (BOX_TYPE_IMAGE_HEADER, BoxKind::ImageHeader),
    (BOX_TYPE_BITS_PER_COMPONENT, BoxKind::BitsPerComponent),
    (BOX_TYPE_COLOUR_SPECIFICATION, BoxKind::ColourSpecification),
    (BOX_TYPE_PALETTE, BoxKind::Palette),
    (BOX_TYPE_COMPONENT_MAPPING, BoxKind::ComponentMapping),
    (BOX_TYPE_CHANNEL_DEFINITION, BoxKind::ChannelDefinition),
    (BOX_TYPE_RESOLUTION, BoxKind::Resolution),
    (BOX_TYPE_CAPTURE_RESOLUTION, BoxKind::CaptureResolution),
    (
        BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION,
        BoxKind::DefaultDisplayResolution,
    ),
    (BOX_TYPE_CONTIGUOUS_CODESTREAM, BoxKind::ContiguousCodestream),
    (BOX_TYPE_INTELLECTUAL_PROPERTY, BoxKind::IntellectualProperty),
    (BOX_TYPE_XML, BoxKind::Xml),
    (BOX_TYPE_UUID, BoxKind::Uuid),
    (BOX_TYPE_UUID_INFO, BoxKind::UuidInfo),
    (BOX_TYPE_UUID_LIST, BoxKind::UuidList),
    (BOX_TYPE_DATA_ENTRY_URL, BoxKind::DataEntryUrl),
    (BOX_TYPE_CODESTREAM_HEADER, BoxKind::CodestreamHeader),
    (
        BOX_TYPE_COMPOSITING_LAYER_HEADER,
        BoxKind::CompositingLayerHeader,
    ),
    (BOX_TYPE_COLOUR_GROUP, BoxKind::ColourGroup),
    (BOX_TYPE_OPACITY, BoxKind::Opacity),
    (
        BOX_TYPE_CODESTREAM_REGISTRATION,
        BoxKind::CodestreamRegistration,
    ),
    (BOX_TYPE_FRAGMENT_TABLE, BoxKind::FragmentTable),
    (BOX_TYPE_FRAGMENT_LIST, BoxKind::FragmentList),
    (BOX_TYPE_CROSS_REFERENCE, BoxKind::CrossReference),
    (BOX_TYPE_MEDIA_DATA, BoxKind::MediaData),
    (BOX_TYPE_COMPOSITION, BoxKind::Composition),
    (BOX_TYPE_COMPOSITION_OPTIONS, BoxKind::CompositionOptions),
    (BOX_TYPE_INSTRUCTION_SET, BoxKind::InstructionSet),
    (BOX_TYPE_ASSOCIATION, BoxKind::Association),
    (BOX_TYPE_NUMBER_LIST, BoxKind::NumberList),
    (BOX_TYPE_LABEL, BoxKind::Label),
    (BOX_TYPE_BINARY_FILTER, BoxKind::BinaryFilter),
    (BOX_TYPE_DESIRED_REPRODUCTIONS, BoxKind::DesiredReproductions),
    (
        BOX_TYPE_GRAPHICS_TECHNOLOGY_STANDARD_OUTPUT,
        BoxKind::GraphicsTechnologyStandardOutput,
    ),
    (BOX_TYPE_DIGITAL_SIGNATURE, BoxKind::DigitalSignature),
    (BOX_TYPE_MPEG7_BINARY, BoxKind::Mpeg7Binary),
    (BOX_TYPE_ROI_DESCRIPTION, BoxKind::RoiDescription),
    (BOX_TYPE_DATA_REFERENCE, BoxKind::DataReference),
    (BOX_TYPE_FREE, BoxKind::Free),
];

/// Where a box sits: at file level or inside a superbox of some kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    File,
    Super(BoxKind),
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Container::File => write!(f, "file"),
            Container::Super(kind) => write!(f, "{} box", kind.description()),
        }
    }
}

enum Placement {
    Anywhere,
    Within(&'static [Container]),
}

const FILE: Container = Container::File;
const JP2H: Container = Container::Super(BoxKind::Header);
const RES: Container = Container::Super(BoxKind::Resolution);
const UINF: Container = Container::Super(BoxKind::UuidInfo);
const JPCH: Container = Container::Super(BoxKind::CodestreamHeader);
const JPLH: Container = Container::Super(BoxKind::CompositingLayerHeader);
const CGRP: Container = Container::Super(BoxKind::ColourGroup);
const FTBL: Container = Container::Super(BoxKind::FragmentTable);
const COMP: Container = Container::Super(BoxKind::Composition);
const ASOC: Container = Container::Super(BoxKind::Association);
const DREP: Container = Container::Super(BoxKind::DesiredReproductions);
const DTBL: Container = Container::Super(BoxKind::DataReference);

impl BoxKind {
    pub fn from_type(box_type: BoxType) -> BoxKind {
        DISPATCH
            .iter()
            .find(|(tag, _)| *tag == box_type)
            .map(|(_, kind)| *kind)
            .unwrap_or(BoxKind::Unknown)
    }

    /// Property name under which the box's details are reported.
    pub fn name(self) -> &'static str {
        match self {
            BoxKind::Signature => "Signature",
            BoxKind::FileType => "FileType",
            BoxKind::ReaderRequirements => "ReaderRequirements",
            BoxKind::Header => "JP2Header",
            BoxKind::ImageHeader => "ImageHeader",
            BoxKind::BitsPerComponent => "BitsPerComponent",
            BoxKind::ColourSpecification => "ColourSpecification",
            BoxKind::Palette => "Palette",
            BoxKind::ComponentMapping => "ComponentMapping",
            BoxKind::ChannelDefinition => "ChannelDefinition",
            BoxKind::Resolution => "Resolution",
            BoxKind::CaptureResolution => "CaptureResolution",
            BoxKind::DefaultDisplayResolution => "DefaultDisplayResolution",
            BoxKind::ContiguousCodestream => "ContiguousCodestream",
            BoxKind::IntellectualProperty => "IntellectualProperty",
            BoxKind::Xml => "XML",
            BoxKind::Uuid => "UUID",
            BoxKind::UuidInfo => "UUIDInfo",
            BoxKind::UuidList => "UUIDList",
            BoxKind::DataEntryUrl => "DataEntryURL",
            BoxKind::CodestreamHeader => "CodestreamHeader",
            BoxKind::CompositingLayerHeader => "CompositingLayerHeader",
            BoxKind::ColourGroup => "ColourGroup",
            BoxKind::Opacity => "Opacity",
            BoxKind::CodestreamRegistration => "CodestreamRegistration",
            BoxKind::FragmentTable => "FragmentTable",
            BoxKind::FragmentList => "FragmentList",
            BoxKind::CrossReference => "CrossReference",
            BoxKind::MediaData => "MediaData",
            BoxKind::Composition => "Composition",
            BoxKind::CompositionOptions => "CompositionOptions",
            BoxKind::InstructionSet => "InstructionSet",
            BoxKind::Association => "Association",
            BoxKind::NumberList => "NumberList",
            BoxKind::Label => "Label",
            BoxKind::BinaryFilter => "BinaryFilter",
            BoxKind::DesiredReproductions => "DesiredReproductions",
            BoxKind::GraphicsTechnologyStandardOutput => "GraphicsTechnologyStandardOutput",
            BoxKind::DigitalSignature => "DigitalSignature",
            BoxKind::Mpeg7Binary => "MPEG7Binary",
            BoxKind::RoiDescription => "ROIDescription",
            BoxKind::DataReference => "DataReference",
            BoxKind::Free => "Free",
            BoxKind::Unknown => "Unknown",
        }
    }

    /// Human readable name used in messages.
    pub fn description(self) -> &'static str {
        match self {
            BoxKind::Signature => "JPEG 2000 Signature",
            BoxKind::FileType => "File Type",
            BoxKind::ReaderRequirements => "Reader Requirements",
            BoxKind::Header => "JP2 Header",
            BoxKind::ImageHeader => "Image Header",
            BoxKind::BitsPerComponent => "Bits Per Component",
            BoxKind::ColourSpecification => "Colour Specification",
            BoxKind::Palette => "Palette",
            BoxKind::ComponentMapping => "Component Mapping",
            BoxKind::ChannelDefinition => "Channel Definition",
            BoxKind::Resolution => "Resolution",
            BoxKind::CaptureResolution => "Capture Resolution",
            BoxKind::DefaultDisplayResolution => "Default Display Resolution",
            BoxKind::ContiguousCodestream => "Contiguous Codestream",
            BoxKind::IntellectualProperty => "Intellectual Property",
            BoxKind::Xml => "XML",
            BoxKind::Uuid => "UUID",
            BoxKind::UuidInfo => "UUID Info",
            BoxKind::UuidList => "UUID List",
            BoxKind::DataEntryUrl => "Data Entry URL",
            BoxKind::CodestreamHeader => "Codestream Header",
            BoxKind::CompositingLayerHeader => "Compositing Layer Header",
            BoxKind::ColourGroup => "Colour Group",
            BoxKind::Opacity => "Opacity",
            BoxKind::CodestreamRegistration => "Codestream Registration",
            BoxKind::FragmentTable => "Fragment Table",
            BoxKind::FragmentList => "Fragment List",
            BoxKind::CrossReference => "Cross Reference",
            BoxKind::MediaData => "Media Data",
            BoxKind::Composition => "Composition",
            BoxKind::CompositionOptions => "Composition Options",
            BoxKind::InstructionSet => "Instruction Set",
            BoxKind::Association => "Association",
            BoxKind::NumberList => "Number List",
            BoxKind::Label => "Label",
            BoxKind::BinaryFilter => "Binary Filter",
            BoxKind::DesiredReproductions => "Desired Reproductions",
            BoxKind::GraphicsTechnologyStandardOutput => "Graphics Technology Standard Output",
            BoxKind::DigitalSignature => "Digital Signature",
            BoxKind::Mpeg7Binary => "MPEG-7 Binary",
            BoxKind::RoiDescription => "ROI Description",
            BoxKind::DataReference => "Data Reference",
            BoxKind::Free => "Free",
            BoxKind::Unknown => "Unknown",
        }
    }

    /// Boxes whose contents are a sequence of child boxes.
    pub fn is_superbox(self) -> bool {
        matches!(
            self,
            BoxKind::Header
                | BoxKind::Resolution
                | BoxKind::UuidInfo
                | BoxKind::CodestreamHeader
                | BoxKind::CompositingLayerHeader
                | BoxKind::ColourGroup
                | BoxKind::FragmentTable
                | BoxKind::Composition
                | BoxKind::Association
                | BoxKind::DesiredReproductions
                | BoxKind::DataReference
        )
    }

    /// Boxes that may appear at file level ahead of the JP2 Header box.
    pub fn allowed_before_header(self) -> bool {
        matches!(
            self,
            BoxKind::FileType
                | BoxKind::ReaderRequirements
                | BoxKind::Xml
                | BoxKind::Uuid
                | BoxKind::UuidInfo
                | BoxKind::IntellectualProperty
                | BoxKind::Header
        )
    }

    fn placement(self) -> Placement {
        match self {
            BoxKind::Signature
            | BoxKind::FileType
            | BoxKind::ReaderRequirements
            | BoxKind::Header
            | BoxKind::ContiguousCodestream
            | BoxKind::IntellectualProperty
            | BoxKind::CodestreamHeader
            | BoxKind::CompositingLayerHeader
            | BoxKind::FragmentTable
            | BoxKind::MediaData
            | BoxKind::Composition
            | BoxKind::DesiredReproductions
            | BoxKind::DigitalSignature
            | BoxKind::DataReference => Placement::Within(&[FILE]),

            BoxKind::ImageHeader => Placement::Within(&[JP2H, JPCH]),
            BoxKind::BitsPerComponent => Placement::Within(&[JP2H, JPCH]),
            BoxKind::ColourSpecification => Placement::Within(&[JP2H, CGRP]),
            BoxKind::Palette => Placement::Within(&[JP2H, JPCH]),
            BoxKind::ComponentMapping => Placement::Within(&[JP2H, JPCH]),
            BoxKind::ChannelDefinition => Placement::Within(&[JP2H, JPLH]),
            BoxKind::Resolution => Placement::Within(&[JP2H, JPLH]),
            BoxKind::CaptureResolution | BoxKind::DefaultDisplayResolution => {
                Placement::Within(&[RES])
            }
            BoxKind::UuidInfo => Placement::Within(&[FILE]),
            BoxKind::UuidList => Placement::Within(&[UINF]),
            BoxKind::DataEntryUrl => Placement::Within(&[UINF, DTBL]),
            BoxKind::ColourGroup => Placement::Within(&[JPLH]),
            BoxKind::Opacity => Placement::Within(&[JPLH]),
            BoxKind::CodestreamRegistration => Placement::Within(&[JPLH]),
            BoxKind::FragmentList => Placement::Within(&[FTBL]),
            BoxKind::CompositionOptions | BoxKind::InstructionSet => Placement::Within(&[COMP]),
            BoxKind::Association => Placement::Within(&[FILE, ASOC]),
            BoxKind::NumberList => Placement::Within(&[ASOC]),
            BoxKind::Label => Placement::Within(&[ASOC, JPCH, JPLH]),
            BoxKind::GraphicsTechnologyStandardOutput => Placement::Within(&[DREP]),
            BoxKind::RoiDescription => Placement::Within(&[ASOC]),

            BoxKind::Xml
            | BoxKind::Uuid
            | BoxKind::CrossReference
            | BoxKind::BinaryFilter
            | BoxKind::Mpeg7Binary
            | BoxKind::Free
            | BoxKind::Unknown => Placement::Anywhere,
        }
    }

    pub fn is_legal_in(self, container: Container) -> bool {
        match self.placement() {
            Placement::Anywhere => true,
            Placement::Within(containers) => containers.contains(&container),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_dispatches() {
        for (tag, kind) in DISPATCH.iter() {
            assert_eq!(BoxKind::from_type(*tag), *kind);
        }
        assert_eq!(BoxKind::from_type(*b"abcd"), BoxKind::Unknown);
    }

    #[test]
    fn test_placement() {
        assert!(BoxKind::ImageHeader.is_legal_in(JP2H));
        assert!(!BoxKind::ImageHeader.is_legal_in(FILE));
        assert!(BoxKind::ContiguousCodestream.is_legal_in(FILE));
        assert!(!BoxKind::ContiguousCodestream.is_legal_in(JP2H));
        assert!(BoxKind::Label.is_legal_in(ASOC));
        assert!(BoxKind::Xml.is_legal_in(ASOC));
        assert!(BoxKind::Unknown.is_legal_in(RES));
    }

    #[test]
    fn test_superbox_kinds() {
        assert!(BoxKind::CompositingLayerHeader.is_superbox());
        assert!(BoxKind::Association.is_superbox());
        assert!(BoxKind::DesiredReproductions.is_superbox());
        assert!(!BoxKind::ImageHeader.is_superbox());
        assert!(!BoxKind::CrossReference.is_superbox());
        assert!(!BoxKind::Unknown.is_superbox());
    }
}
