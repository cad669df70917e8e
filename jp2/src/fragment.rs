use log::debug;
use std::cmp;
use std::io;

/// One entry of a Fragment List box: a run of bytes at an absolute offset in
/// the file named by a data reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    offset: u64,
    length: u32,
    data_reference: u16,
}

impl Fragment {
    pub fn new(offset: u64, length: u32, data_reference: u16) -> Fragment {
        Fragment {
            offset,
            length,
            data_reference,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Index into the Data Reference box; 0 is the current file.
    pub fn data_reference(&self) -> u16 {
        self.data_reference
    }

    pub fn is_local(&self) -> bool {
        self.data_reference == 0
    }
}

/// Presents an ordered fragment list as one contiguous byte stream.
///
/// The stream does not own the underlying file; every refill seeks the reader
/// passed to [`FragmentStream::read`] to the next unread fragment byte, so the
/// caller is responsible for restoring its own position afterwards.
#[derive(Debug)]
pub struct FragmentStream {
    fragments: Vec<Fragment>,
    index: usize,
    // bytes of fragments[index] already moved into the buffer
    consumed: u64,
    buffer: Vec<u8>,
    start: usize,
    end: usize,
    capacity: usize,
    position: u64,
}

impl FragmentStream {
    pub fn new(fragments: Vec<Fragment>, capacity: usize) -> FragmentStream {
        FragmentStream {
            fragments,
            index: 0,
            consumed: 0,
            buffer: Vec::new(),
            start: 0,
            end: 0,
            capacity: cmp::max(capacity, 1),
            position: 0,
        }
    }

    /// Sum of all fragment lengths.
    pub fn total_length(&self) -> u64 {
        self.fragments.iter().map(|f| f.length() as u64).sum()
    }

    /// Logical bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn read<R: io::Read + io::Seek>(
        &mut self,
        origin: &mut R,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.start == self.end && !self.fill(origin)? {
            return Ok(0);
        }
        let count = cmp::min(buf.len(), self.end - self.start);
        buf[..count].copy_from_slice(&self.buffer[self.start..self.start + count]);
        self.start += count;
        self.position += count as u64;
        Ok(count)
    }

    fn fill<R: io::Read + io::Seek>(&mut self, origin: &mut R) -> io::Result<bool> {
        while self.index < self.fragments.len()
            && self.consumed == self.fragments[self.index].length() as u64
        {
            self.index += 1;
            self.consumed = 0;
        }
        let fragment = match self.fragments.get(self.index) {
            Some(fragment) => *fragment,
            None => return Ok(false),
        };

        let wanted = cmp::min(
            self.capacity as u64,
            fragment.length() as u64 - self.consumed,
        ) as usize;
        let at = fragment.offset() + self.consumed;
        debug!(
            "fragment {} refill of {} byte(s) at {}",
            self.index, wanted, at
        );

        origin.seek(io::SeekFrom::Start(at))?;
        self.buffer.resize(wanted, 0);
        if let Err(error) = origin.read_exact(&mut self.buffer[..wanted]) {
            if error.kind() == io::ErrorKind::UnexpectedEof {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "fragment at offset {} extends past the end of the file",
                        fragment.offset()
                    ),
                ));
            }
            return Err(error);
        }

        self.consumed += wanted as u64;
        self.start = 0;
        self.end = wanted;
        Ok(true)
    }
}

/// Standalone reader over a fragment list of `origin`.
pub struct FragmentReader<'a, R> {
    origin: &'a mut R,
    stream: FragmentStream,
}

impl<'a, R: io::Read + io::Seek> FragmentReader<'a, R> {
    pub fn new(origin: &'a mut R, fragments: Vec<Fragment>, capacity: usize) -> Self {
        FragmentReader {
            origin,
            stream: FragmentStream::new(fragments, capacity),
        }
    }

    pub fn position(&self) -> u64 {
        self.stream.position()
    }
}

impl<'a, R: io::Read + io::Seek> io::Read for FragmentReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(&mut *self.origin, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn file() -> Cursor<Vec<u8>> {
        Cursor::new((0u8..=99).collect())
    }

    #[test]
    fn test_concatenates_in_list_order() {
        let mut origin = file();
        let fragments = vec![Fragment::new(50, 3, 0), Fragment::new(10, 2, 0)];
        let mut reader = FragmentReader::new(&mut origin, fragments, 8192);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![50, 51, 52, 10, 11]);
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_reads_across_boundaries_with_small_buffer() {
        let mut origin = file();
        let fragments = vec![
            Fragment::new(0, 5, 0),
            Fragment::new(20, 0, 0),
            Fragment::new(90, 7, 0),
        ];
        let mut reader = FragmentReader::new(&mut origin, fragments, 2);
        let mut out = [0u8; 12];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(out, [0, 1, 2, 3, 4, 90, 91, 92, 93, 94, 95, 96]);
        assert_eq!(reader.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_fragment_past_end_of_file() {
        let mut origin = file();
        let fragments = vec![Fragment::new(98, 10, 0)];
        let mut reader = FragmentReader::new(&mut origin, fragments, 8192);
        let mut out = Vec::new();
        let error = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_total_length() {
        let stream = FragmentStream::new(
            vec![Fragment::new(0, 5, 0), Fragment::new(9, 11, 0)],
            0,
        );
        assert_eq!(stream.total_length(), 16);
    }
}
