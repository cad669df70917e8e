use log::{debug, info};
use report::Report;
use std::error;
use std::io::{self, Read};

use super::boxes::{decode_box, uuid_text, FragmentListBox, FILTER_DEFLATE};
use super::dispatch::Container;
use super::fragment::FragmentStream;
use super::header::*;
use super::source::Source;
use super::{JP2Error, ParseOptions};

/// Skips whatever is left of `header`'s box in the active stream.
pub fn skip_past<R: io::Read + io::Seek>(
    source: &mut Source<R>,
    header: &BoxHeader,
) -> Result<(), Box<dyn error::Error>> {
    match header.data_length() {
        Some(length) => {
            let end = header.data_offset() + length;
            let position = source.position();
            if position < end {
                let wanted = end - position;
                if source.skip(wanted)? < wanted {
                    return Err(JP2Error::PrematureEnd { offset: end }.into());
                }
            }
        }
        None => {
            source.skip_to_end()?;
        }
    }
    Ok(())
}

/// Yields the boxes of one container.
///
/// Inside a superbox every box is charged to the remaining budget; at file
/// level the budget is unbounded and iteration ends at end of file. Binary
/// Filter and Cross Reference boxes never reach the caller: the first splices
/// the boxes of its decompressed contents into this sequence, the second is
/// replaced by the box its fragments reassemble to.
pub struct BoxIter {
    container: Container,
    budget: Option<u64>,
    depth: usize,
    substituted: bool,
}

impl BoxIter {
    pub fn new(container: Container, budget: Option<u64>, depth: usize) -> BoxIter {
        BoxIter {
            container,
            budget,
            depth,
            substituted: false,
        }
    }

    pub fn container(&self) -> Container {
        self.container
    }

    pub fn next<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        report: &mut Report,
        options: &ParseOptions,
    ) -> Result<Option<BoxHeader>, Box<dyn error::Error>> {
        loop {
            let header = if source.depth() > self.depth {
                // Inside a filtered stream spliced into this container.
                let offset = source.position();
                let remaining = source.remaining();
                match decode_box_header(source, offset, remaining)? {
                    Some(header) => header,
                    None => {
                        debug!("filter stream exhausted at {}", offset);
                        source.pop();
                        continue;
                    }
                }
            } else {
                let remaining = match self.budget {
                    Some(budget) if budget < 8 => return Ok(None),
                    Some(budget) => Some(budget),
                    None => source.remaining(),
                };
                let offset = source.position();
                let header = match decode_box_header(source, offset, remaining)? {
                    Some(header) => header,
                    None if self.budget.is_some() => {
                        return Err(JP2Error::PrematureEnd { offset }.into())
                    }
                    None => return Ok(None),
                };
                if let Some(budget) = self.budget {
                    let total = header.total_length().unwrap_or(budget);
                    if total > budget {
                        return Err(JP2Error::Overrun {
                            box_type: header.box_type(),
                            container: self.container.to_string(),
                            excess: total - budget,
                            offset,
                        }
                        .into());
                    }
                    self.budget = Some(budget - total);
                }
                header
            };

            match header.box_type() {
                BOX_TYPE_BINARY_FILTER => self.open_filter(source, &header, report)?,
                BOX_TYPE_CROSS_REFERENCE => {
                    if let Some(inner) = self.open_cross_reference(source, &header, report, options)? {
                        return Ok(Some(inner));
                    }
                }
                _ => return Ok(Some(header)),
            }
        }
    }

    /// Leaves the stream just past `header`'s box, dropping a cross
    /// reference substitution if one was active.
    pub fn finish<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
    ) -> Result<(), Box<dyn error::Error>> {
        let result = skip_past(source, header);
        if self.substituted {
            source.pop();
            self.substituted = false;
        }
        result
    }

    /// Ends iteration, returning the count of unused budget bytes if any.
    pub fn close<R: io::Read + io::Seek>(&mut self, source: &mut Source<R>) -> Option<u64> {
        source.truncate(self.depth);
        self.substituted = false;
        self.budget.filter(|left| *left > 0)
    }

    fn open_filter<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        report: &mut Report,
    ) -> Result<(), Box<dyn error::Error>> {
        info!("BinaryFilterBox start at {:?}", header.offset());
        let filtered = read_filter(source, header);
        skip_past(source, header)?;
        match filtered {
            Ok((_, Some(compressed))) => source.push_filtered(compressed),
            Ok((filter, None)) => report.report_info(
                format!(
                    "Binary Filter box with unsupported filter {}: contents not processed",
                    uuid_text(&filter)
                ),
                header.offset(),
            ),
            Err(error) => report.malformed(error.to_string(), header.offset()),
        }
        Ok(())
    }

    fn open_cross_reference<R: io::Read + io::Seek>(
        &mut self,
        source: &mut Source<R>,
        header: &BoxHeader,
        report: &mut Report,
        options: &ParseOptions,
    ) -> Result<Option<BoxHeader>, Box<dyn error::Error>> {
        info!("CrossReferenceBox start at {:?}", header.offset());
        let list = read_cross_reference(source, header);
        skip_past(source, header)?;

        let list = match list {
            Ok(list) => list,
            Err(error) => {
                report.malformed(error.to_string(), header.offset());
                return Ok(None);
            }
        };
        if list.has_external() {
            report.report_info(
                "Cross Reference box references an external file",
                header.offset(),
            );
            return Ok(None);
        }
        if list.fragments().is_empty() {
            report.report_info("Cross Reference box has an empty fragment list", header.offset());
            return Ok(None);
        }

        let stream = FragmentStream::new(list.into_fragments(), options.fragment_buffer_size);
        let total = stream.total_length();
        source.push_fragments(stream);
        match decode_box_header(source, 0, Some(total)) {
            Ok(Some(inner)) => {
                debug!(
                    "cross reference at {} resolves to {}",
                    header.offset(),
                    box_type_name(&inner.box_type())
                );
                self.substituted = true;
                Ok(Some(inner))
            }
            Ok(None) => {
                source.pop();
                report.report_info("Cross Reference box fragments hold no box", header.offset());
                Ok(None)
            }
            Err(error) => {
                source.pop();
                report.malformed(error.to_string(), header.offset());
                Ok(None)
            }
        }
    }
}

// Filter identifier, plus the compressed contents when the filter is Deflate.
fn read_filter<R: io::Read + io::Seek>(
    source: &mut Source<R>,
    header: &BoxHeader,
) -> Result<([u8; 16], Option<Vec<u8>>), Box<dyn error::Error>> {
    if header.data_length().map_or(false, |length| length < 16) {
        return Err(JP2Error::BoxMalformed {
            box_type: header.box_type(),
            reason: "Binary Filter box too short for its filter type".to_owned(),
            offset: header.offset(),
        }
        .into());
    }
    let mut contents = (&mut *source).take(header.data_length().unwrap_or(u64::MAX));
    let mut filter: [u8; 16] = [0; 16];
    contents.read_exact(&mut filter)?;
    if filter != FILTER_DEFLATE {
        return Ok((filter, None));
    }
    let mut compressed = Vec::new();
    contents.read_to_end(&mut compressed)?;
    Ok((filter, Some(compressed)))
}

fn read_cross_reference<R: io::Read + io::Seek>(
    source: &mut Source<R>,
    header: &BoxHeader,
) -> Result<FragmentListBox, Box<dyn error::Error>> {
    let start = source.position();
    let mut contents = (&mut *source).take(header.data_length().unwrap_or(u64::MAX));
    let list_header = match decode_box_header(&mut contents, start, header.data_length())? {
        Some(list_header) if list_header.box_type() == BOX_TYPE_FRAGMENT_LIST => list_header,
        _ => {
            return Err(JP2Error::BoxMissing {
                box_type: BOX_TYPE_FRAGMENT_LIST,
                container: "Cross Reference box".to_owned(),
            }
            .into())
        }
    };
    let mut list_contents = (&mut contents).take(list_header.data_length().unwrap_or(u64::MAX));
    decode_box(&list_header, &mut list_contents)
}
