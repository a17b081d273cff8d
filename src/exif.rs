//! Minimal EXIF support: a TIFF structure with IFD0 (Make, Model, Software)
//! and the Exif sub-IFD (FocalLength, UserComment), spliced into a JPEG as an
//! APP1 segment. Writing is always big endian; reading accepts both orders.

use thiserror::Error;

const TAG_MAKE: u16 = 0x010F;
const TAG_MODEL: u16 = 0x0110;
const TAG_SOFTWARE: u16 = 0x0131;
const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
const TAG_FOCAL_LENGTH: u16 = 0x920A;
const TAG_USER_COMMENT: u16 = 0x9286;

const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_UNDEFINED: u16 = 7;

const ASCII_PREFIX: &[u8; 8] = b"ASCII\0\0\0";
const UNICODE_PREFIX: &[u8; 8] = b"UNICODE\0";

const MARKER_SOI: u8 = 0xD8;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";
/// Segment length field is u16 and counts itself.
const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

#[derive(Debug, Error, PartialEq)]
pub enum ExifError {
    #[error("data is not a JPEG image")]
    NotJpeg,
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("EXIF block of {0} bytes does not fit in a JPEG segment")]
    SegmentTooLarge(usize),
    #[error("unknown TIFF byte order {0:?}")]
    BadByteOrder([u8; 2]),
    #[error("bad TIFF magic number {0:#06x}")]
    BadMagic(u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    fn put_u16(self, out: &mut Vec<u8>, value: u16) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn put_u32(self, out: &mut Vec<u8>, value: u32) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

/// The tags this crate reads and writes. Absent tags are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExifData {
    pub make: Option<String>,
    pub model: Option<String>,
    pub software: Option<String>,
    /// (numerator, denominator)
    pub focal_length: Option<(u32, u32)>,
    pub user_comment: Option<String>,
}

struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn ascii(tag: u16, text: &str) -> Entry {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Entry {
            tag,
            kind: TYPE_ASCII,
            count: data.len() as u32,
            data,
        }
    }

    fn long(tag: u16, value: u32, order: ByteOrder) -> Entry {
        let mut data = Vec::with_capacity(4);
        order.put_u32(&mut data, value);
        Entry {
            tag,
            kind: TYPE_LONG,
            count: 1,
            data,
        }
    }

    fn rational(tag: u16, (numerator, denominator): (u32, u32), order: ByteOrder) -> Entry {
        let mut data = Vec::with_capacity(8);
        order.put_u32(&mut data, numerator);
        order.put_u32(&mut data, denominator);
        Entry {
            tag,
            kind: TYPE_RATIONAL,
            count: 1,
            data,
        }
    }

    fn undefined(tag: u16, data: Vec<u8>) -> Entry {
        Entry {
            tag,
            kind: TYPE_UNDEFINED,
            count: data.len() as u32,
            data,
        }
    }

    fn external_len(&self) -> usize {
        if self.data.len() > 4 {
            self.data.len() + self.data.len() % 2
        } else {
            0
        }
    }
}

fn ifd_len(entries: &[Entry]) -> usize {
    2 + 12 * entries.len() + 4 + entries.iter().map(Entry::external_len).sum::<usize>()
}

/// Appends an IFD placed at `offset` followed by its out-of-line values.
fn write_ifd(out: &mut Vec<u8>, entries: &[Entry], offset: usize, order: ByteOrder) {
    let mut data_offset = offset + 2 + 12 * entries.len() + 4;
    let mut data_area = Vec::new();

    order.put_u16(out, entries.len() as u16);
    for entry in entries {
        order.put_u16(out, entry.tag);
        order.put_u16(out, entry.kind);
        order.put_u32(out, entry.count);
        if entry.data.len() <= 4 {
            let mut inline = entry.data.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            order.put_u32(out, data_offset as u32);
            data_area.extend_from_slice(&entry.data);
            if entry.data.len() % 2 == 1 {
                data_area.push(0);
            }
            data_offset += entry.external_len();
        }
    }
    order.put_u32(out, 0);
    out.extend_from_slice(&data_area);
}

/// Charset header followed by the text: ASCII when possible, otherwise UTF-16.
pub fn encode_user_comment(text: &str, order: ByteOrder) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + text.len());
    if text.is_ascii() {
        data.extend_from_slice(ASCII_PREFIX);
        data.extend_from_slice(text.as_bytes());
    } else {
        data.extend_from_slice(UNICODE_PREFIX);
        for unit in text.encode_utf16() {
            order.put_u16(&mut data, unit);
        }
    }
    data
}

pub fn decode_user_comment(data: &[u8], order: ByteOrder) -> String {
    if data.len() < 8 {
        return String::from_utf8_lossy(data)
            .trim_end_matches('\0')
            .to_string();
    }
    let (prefix, body) = data.split_at(8);
    let text = if prefix == UNICODE_PREFIX {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| order.u16([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        // ASCII, undefined and JIS headers: take the bytes as they are
        String::from_utf8_lossy(body).into_owned()
    };
    text.trim_end_matches('\0').to_string()
}

impl ExifData {
    /// Big endian TIFF structure, the payload of the APP1 segment.
    pub fn to_tiff(&self) -> Vec<u8> {
        let order = ByteOrder::Big;

        let mut exif_entries = Vec::new();
        if let Some(focal_length) = self.focal_length {
            exif_entries.push(Entry::rational(TAG_FOCAL_LENGTH, focal_length, order));
        }
        if let Some(comment) = &self.user_comment {
            exif_entries.push(Entry::undefined(
                TAG_USER_COMMENT,
                encode_user_comment(comment, order),
            ));
        }

        let mut ifd0_entries = Vec::new();
        for (tag, value) in [
            (TAG_MAKE, &self.make),
            (TAG_MODEL, &self.model),
            (TAG_SOFTWARE, &self.software),
        ] {
            if let Some(text) = value {
                ifd0_entries.push(Entry::ascii(tag, text));
            }
        }
        if !exif_entries.is_empty() {
            // pointer value is inline, so the IFD0 length is known beforehand
            ifd0_entries.push(Entry::long(TAG_EXIF_IFD_POINTER, 0, order));
            let exif_offset = 8 + ifd_len(&ifd0_entries);
            if let Some(pointer) = ifd0_entries.last_mut() {
                *pointer = Entry::long(TAG_EXIF_IFD_POINTER, exif_offset as u32, order);
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"MM");
        order.put_u16(&mut out, 42);
        order.put_u32(&mut out, 8);
        write_ifd(&mut out, &ifd0_entries, 8, order);
        if !exif_entries.is_empty() {
            let offset = out.len();
            write_ifd(&mut out, &exif_entries, offset, order);
        }
        out
    }

    pub fn from_tiff(data: &[u8]) -> Result<ExifData, ExifError> {
        let reader = TiffReader::new(data)?;
        let mut exif = ExifData::default();

        let ifd0_offset = reader.u32_at(4)? as usize;
        let mut exif_ifd_offset = None;
        for (tag, kind, value) in reader.entries(ifd0_offset)? {
            match (tag, kind) {
                (TAG_MAKE, TYPE_ASCII) => exif.make = Some(ascii_value(value)),
                (TAG_MODEL, TYPE_ASCII) => exif.model = Some(ascii_value(value)),
                (TAG_SOFTWARE, TYPE_ASCII) => exif.software = Some(ascii_value(value)),
                (TAG_EXIF_IFD_POINTER, TYPE_LONG) if value.len() >= 4 => {
                    exif_ifd_offset =
                        Some(reader.order.u32([value[0], value[1], value[2], value[3]]) as usize)
                }
                _ => {}
            }
        }

        if let Some(offset) = exif_ifd_offset {
            for (tag, kind, value) in reader.entries(offset)? {
                match (tag, kind) {
                    (TAG_FOCAL_LENGTH, TYPE_RATIONAL) if value.len() >= 8 => {
                        exif.focal_length = Some((
                            reader.order.u32([value[0], value[1], value[2], value[3]]),
                            reader.order.u32([value[4], value[5], value[6], value[7]]),
                        ))
                    }
                    (TAG_USER_COMMENT, _) => {
                        exif.user_comment = Some(decode_user_comment(value, reader.order))
                    }
                    _ => {}
                }
            }
        }
        Ok(exif)
    }
}

fn ascii_value(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches('\0')
        .to_string()
}

fn type_size(kind: u16) -> Option<usize> {
    match kind {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

struct TiffReader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> TiffReader<'a> {
    fn new(data: &'a [u8]) -> Result<Self, ExifError> {
        if data.len() < 8 {
            return Err(ExifError::Truncated("TIFF header"));
        }
        let order = match [data[0], data[1]] {
            [b'I', b'I'] => ByteOrder::Little,
            [b'M', b'M'] => ByteOrder::Big,
            other => return Err(ExifError::BadByteOrder(other)),
        };
        let reader = TiffReader { data, order };
        let magic = reader.u16_at(2)?;
        if magic != 42 {
            return Err(ExifError::BadMagic(magic));
        }
        Ok(reader)
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], ExifError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(ExifError::Truncated("IFD"))
    }

    fn u16_at(&self, offset: usize) -> Result<u16, ExifError> {
        let bytes = self.slice(offset, 2)?;
        Ok(self.order.u16([bytes[0], bytes[1]]))
    }

    fn u32_at(&self, offset: usize) -> Result<u32, ExifError> {
        let bytes = self.slice(offset, 4)?;
        Ok(self.order.u32([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// (tag, type, value bytes) of every entry with a known type.
    fn entries(&self, offset: usize) -> Result<Vec<(u16, u16, &'a [u8])>, ExifError> {
        let count = self.u16_at(offset)? as usize;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let entry = offset + 2 + 12 * i;
            let tag = self.u16_at(entry)?;
            let kind = self.u16_at(entry + 2)?;
            let components = self.u32_at(entry + 4)? as usize;
            let Some(size) = type_size(kind).and_then(|size| size.checked_mul(components)) else {
                log::debug!("skipping EXIF tag {tag:#06x} of unknown type {kind}");
                continue;
            };
            let value = if size <= 4 {
                self.slice(entry + 8, size)?
            } else {
                self.slice(self.u32_at(entry + 8)? as usize, size)?
            };
            entries.push((tag, kind, value));
        }
        Ok(entries)
    }
}

/// Byte ranges of the JPEG header segments, up to the start of scan.
fn header_segments(jpeg: &[u8]) -> Result<Vec<(u8, std::ops::Range<usize>)>, ExifError> {
    if jpeg.len() < 4 || jpeg[0] != 0xFF || jpeg[1] != MARKER_SOI {
        return Err(ExifError::NotJpeg);
    }
    let mut segments = Vec::new();
    let mut position = 2;
    while position + 4 <= jpeg.len() {
        if jpeg[position] != 0xFF {
            return Err(ExifError::Truncated("JPEG marker"));
        }
        let marker = jpeg[position + 1];
        if marker == MARKER_SOS || marker == MARKER_EOI {
            break;
        }
        let length = u16::from_be_bytes([jpeg[position + 2], jpeg[position + 3]]) as usize;
        let end = position + 2 + length;
        if length < 2 || end > jpeg.len() {
            return Err(ExifError::Truncated("JPEG segment"));
        }
        segments.push((marker, position..end));
        position = end;
    }
    Ok(segments)
}

fn is_exif_segment(jpeg: &[u8], marker: u8, range: &std::ops::Range<usize>) -> bool {
    marker == MARKER_APP1 && jpeg[range.start + 4..range.end].starts_with(EXIF_HEADER)
}

/// Returns a copy of `jpeg` carrying `exif` in place of any previous EXIF
/// segment. The new segment goes right after SOI, or after a JFIF APP0.
pub fn insert_into_jpeg(jpeg: &[u8], exif: &ExifData) -> Result<Vec<u8>, ExifError> {
    let segments = header_segments(jpeg)?;

    let mut payload = EXIF_HEADER.to_vec();
    payload.extend_from_slice(&exif.to_tiff());
    if payload.len() > MAX_SEGMENT_PAYLOAD {
        return Err(ExifError::SegmentTooLarge(payload.len()));
    }

    let insert_at = match segments.first() {
        Some((MARKER_APP0, range)) => range.end,
        _ => 2,
    };

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(&[0xFF, MARKER_APP1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);

    let mut position = insert_at;
    for (marker, range) in &segments {
        if range.start < insert_at {
            continue;
        }
        if is_exif_segment(jpeg, *marker, range) {
            out.extend_from_slice(&jpeg[position..range.start]);
            position = range.end;
        }
    }
    out.extend_from_slice(&jpeg[position..]);
    Ok(out)
}

/// The first EXIF segment of `jpeg`, `None` when there is none.
pub fn extract_from_jpeg(jpeg: &[u8]) -> Result<Option<ExifData>, ExifError> {
    for (marker, range) in header_segments(jpeg)? {
        if is_exif_segment(jpeg, marker, &range) {
            let tiff = &jpeg[range.start + 4 + EXIF_HEADER.len()..range.end];
            return ExifData::from_tiff(tiff).map(Some);
        }
    }
    Ok(None)
}
