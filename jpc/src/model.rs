use report::Property;
use std::collections::BTreeMap;

use super::segment::ImageAndTileSizeMarkerSegment;

/// Properties attached either to the main header or to one tile.
#[derive(Debug, Default)]
pub struct Scope {
    properties: Vec<Property>,
}

impl Scope {
    pub fn add(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn find(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find_map(|p| p.find(name))
    }
}

#[derive(Debug)]
pub struct TilePart {
    index: u8,
    no_tile_parts: u8,
    length: u32,
    offset: u64,
}

impl TilePart {
    pub fn new(index: u8, no_tile_parts: u8, length: u32, offset: u64) -> TilePart {
        TilePart {
            index,
            no_tile_parts,
            length,
            offset,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn no_tile_parts(&self) -> u8 {
        self.no_tile_parts
    }

    /// Psot; zero when the tile-part runs to the end of the codestream.
    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn property(&self) -> Property {
        Property::list(
            "TilePart",
            vec![
                Property::integer("index", self.index),
                Property::integer("tilePartCount", self.no_tile_parts),
                Property::integer("length", self.length),
                Property::integer("offset", self.offset as i64),
            ],
        )
    }
}

#[derive(Debug, Default)]
pub struct Tile {
    index: u16,
    parts: Vec<TilePart>,
    scope: Scope,
}

impl Tile {
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn parts(&self) -> &[TilePart] {
        &self.parts
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub(crate) fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    pub(crate) fn push_part(&mut self, part: TilePart) {
        self.parts.push(part);
    }

    fn property(&self) -> Property {
        let mut properties = vec![Property::integer("index", self.index)];
        properties.push(Property::list(
            "TileParts",
            self.parts.iter().map(|p| p.property()).collect(),
        ));
        properties.extend(self.scope.properties().iter().cloned());
        Property::list("Tile", properties)
    }
}

/// The parsed shape of one codestream: main header, tiles keyed by index,
/// and the image and tile size summary once SIZ has been seen.
#[derive(Debug, Default)]
pub struct Codestream {
    offset: u64,
    length: u64,
    main: Scope,
    tiles: BTreeMap<u16, Tile>,
    siz: Option<ImageAndTileSizeMarkerSegment>,
    end_of_codestream: bool,
}

impl Codestream {
    pub fn new(offset: u64) -> Codestream {
        Codestream {
            offset,
            ..Default::default()
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes consumed, from SOC up to and including EOC.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn main_header(&self) -> &Scope {
        &self.main
    }

    pub fn tiles(&self) -> &BTreeMap<u16, Tile> {
        &self.tiles
    }

    pub fn tile(&self, index: u16) -> Option<&Tile> {
        self.tiles.get(&index)
    }

    pub fn image_and_tile_size(&self) -> Option<&ImageAndTileSizeMarkerSegment> {
        self.siz.as_ref()
    }

    pub fn has_end_of_codestream(&self) -> bool {
        self.end_of_codestream
    }

    pub(crate) fn main_mut(&mut self) -> &mut Scope {
        &mut self.main
    }

    pub(crate) fn set_siz(&mut self, siz: ImageAndTileSizeMarkerSegment) {
        self.siz = Some(siz);
    }

    pub(crate) fn set_length(&mut self, length: u64) {
        self.length = length;
    }

    pub(crate) fn set_end_of_codestream(&mut self) {
        self.end_of_codestream = true;
    }

    /// Selects the tile, creating it on first sight.
    pub(crate) fn tile_mut(&mut self, index: u16) -> &mut Tile {
        self.tiles.entry(index).or_insert_with(|| Tile {
            index,
            ..Default::default()
        })
    }

    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![Property::integer("offset", self.offset as i64)];
        properties.extend(self.main.properties().iter().cloned());
        if !self.tiles.is_empty() {
            properties.push(Property::integer("tileCount", self.tiles.len() as i64));
            properties.push(Property::list(
                "Tiles",
                self.tiles.values().map(|t| t.property()).collect(),
            ));
        }
        properties
    }
}
