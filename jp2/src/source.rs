use flate2::read::ZlibDecoder;
use log::debug;
use std::cmp;
use std::io::{self, Read};

use super::fragment::FragmentStream;

enum Stream {
    // Decompressed contents of a Binary Filter box.
    Filtered {
        decoder: ZlibDecoder<io::Cursor<Vec<u8>>>,
        position: u64,
    },
    // Reassembled contents of a Cross-Reference or Fragment Table box.
    Fragments(FragmentStream),
}

/// The byte source the box reader works on.
///
/// Reads come from the most recently pushed substitute stream, or from the
/// file itself when none is active. Each stream keeps its own logical
/// position. Fragment streams seek the file, so the file position is restored
/// lazily before it is read directly again.
pub struct Source<'a, R> {
    origin: &'a mut R,
    origin_position: u64,
    origin_length: u64,
    origin_moved: bool,
    streams: Vec<Stream>,
}

impl<'a, R: io::Read + io::Seek> Source<'a, R> {
    pub fn new(origin: &'a mut R) -> io::Result<Source<'a, R>> {
        let origin_position = origin.stream_position()?;
        let origin_length = origin.seek(io::SeekFrom::End(0))?;
        origin.seek(io::SeekFrom::Start(origin_position))?;
        Ok(Source {
            origin,
            origin_position,
            origin_length,
            origin_moved: false,
            streams: Vec::new(),
        })
    }

    /// Position within the active stream.
    pub fn position(&self) -> u64 {
        match self.streams.last() {
            None => self.origin_position,
            Some(Stream::Filtered { position, .. }) => *position,
            Some(Stream::Fragments(stream)) => stream.position(),
        }
    }

    /// Bytes left in the active stream when that is known.
    pub fn remaining(&self) -> Option<u64> {
        match self.streams.last() {
            None => Some(self.origin_length.saturating_sub(self.origin_position)),
            Some(Stream::Filtered { .. }) => None,
            Some(Stream::Fragments(stream)) => {
                Some(stream.total_length().saturating_sub(stream.position()))
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.streams.len()
    }

    pub fn push_filtered(&mut self, compressed: Vec<u8>) {
        debug!("filter stream opened over {} byte(s)", compressed.len());
        self.streams.push(Stream::Filtered {
            decoder: ZlibDecoder::new(io::Cursor::new(compressed)),
            position: 0,
        });
    }

    pub fn push_fragments(&mut self, stream: FragmentStream) {
        debug!(
            "fragment stream opened over {} byte(s)",
            stream.total_length()
        );
        self.streams.push(Stream::Fragments(stream));
    }

    pub fn pop(&mut self) {
        self.streams.pop();
    }

    /// Drops every stream above `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.streams.truncate(depth);
    }

    /// Advances the active stream by up to `count` bytes, returning how many
    /// were actually skipped.
    pub fn skip(&mut self, count: u64) -> io::Result<u64> {
        if self.streams.is_empty() {
            let available = self.origin_length.saturating_sub(self.origin_position);
            let skipped = cmp::min(count, available);
            self.origin_position += skipped;
            self.origin_moved = true;
            return Ok(skipped);
        }
        io::copy(&mut io::Read::take(&mut *self, count), &mut io::sink())
    }

    pub fn skip_to_end(&mut self) -> io::Result<u64> {
        self.skip(u64::MAX)
    }
}

impl<'a, R: io::Read + io::Seek> io::Read for Source<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.streams.last_mut() {
            None => {
                if self.origin_moved {
                    self.origin
                        .seek(io::SeekFrom::Start(self.origin_position))?;
                    self.origin_moved = false;
                }
                let count = self.origin.read(buf)?;
                self.origin_position += count as u64;
                Ok(count)
            }
            Some(Stream::Filtered { decoder, position }) => {
                let count = decoder.read(buf)?;
                *position += count as u64;
                Ok(count)
            }
            Some(Stream::Fragments(stream)) => {
                self.origin_moved = true;
                stream.read(&mut *self.origin, buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Read, Write};

    #[test]
    fn test_origin_restored_after_fragments() {
        let mut file = Cursor::new((0u8..=99).collect::<Vec<u8>>());
        let mut source = Source::new(&mut file).unwrap();
        let mut buffer = [0u8; 4];
        source.read_exact(&mut buffer).unwrap();
        assert_eq!(buffer, [0, 1, 2, 3]);

        source.push_fragments(FragmentStream::new(vec![Fragment::new(60, 2, 0)], 16));
        let mut inner = [0u8; 2];
        source.read_exact(&mut inner).unwrap();
        assert_eq!(inner, [60, 61]);
        assert_eq!(source.position(), 2);
        source.pop();

        assert_eq!(source.position(), 4);
        source.read_exact(&mut buffer).unwrap();
        assert_eq!(buffer, [4, 5, 6, 7]);
    }

    #[test]
    fn test_filtered_stream() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello filter").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut file = Cursor::new(vec![0u8; 8]);
        let mut source = Source::new(&mut file).unwrap();
        source.push_filtered(compressed);
        assert_eq!(source.remaining(), None);
        let mut out = String::new();
        source.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello filter");
        assert_eq!(source.position(), 12);
    }

    #[test]
    fn test_skip_is_bounded_by_file_length() {
        let mut file = Cursor::new(vec![0u8; 10]);
        let mut source = Source::new(&mut file).unwrap();
        assert_eq!(source.skip(4).unwrap(), 4);
        assert_eq!(source.remaining(), Some(6));
        assert_eq!(source.skip(100).unwrap(), 6);
        assert_eq!(source.position(), 10);
    }
}
