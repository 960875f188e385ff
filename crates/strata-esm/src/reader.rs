//! Record/subrecord reader over one content file.
//!
//! [`EsmReader`] layers record framing on top of a [`StreamCursor`]. It tracks
//! how many bytes remain in the current record and subrecord, supports
//! peeking a subrecord tag and handing it back ("caching" it), and for
//! dialect B keeps the stack of enclosing groups. All of that state can be
//! captured with [`EsmReader::save`] and resumed with [`EsmReader::restore`],
//! possibly after the reader has visited other files in between.
//!
//! Compressed dialect B records are inflated in memory by
//! [`EsmReader::inflate_record`]; subrecord reads then come from the inflated
//! payload until the record ends.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use flate2::read::ZlibDecoder;
use zerocopy::FromBytes;

use strata_common::{BinaryReader, StreamCursor, Tag, Transcoder};

use crate::context::ReaderContext;
use crate::dialect::{tags, Dialect};
use crate::header::{
    GroupHeader, GroupKind, RawGroupHeader, RawRecordHeader3, RawRecordHeader4, RecordHeader,
    GROUP_HEADER_LEN,
};
use crate::{Error, FileHeader, FileKind, Result};

/// One unit of a record stream: a record or (dialect B) a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Record(RecordHeader),
    Group(GroupHeader),
}

/// Bytes behind a cursor: the file, or the inflated payload of one record.
#[derive(Debug)]
enum Source {
    File(BufReader<File>),
    Inflated(Cursor<Vec<u8>>),
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File(r) => r.read(buf),
            Self::Inflated(r) => r.read(buf),
        }
    }
}

impl BufRead for Source {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::File(r) => r.fill_buf(),
            Self::Inflated(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::File(r) => r.consume(amt),
            Self::Inflated(r) => r.consume(amt),
        }
    }
}

impl Seek for Source {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::File(r) => r.seek(pos),
            Self::Inflated(r) => r.seek(pos),
        }
    }
}

/// Reader for one content file.
#[derive(Debug)]
pub struct EsmReader {
    cursor: StreamCursor<Source>,
    /// The file cursor, set aside while an inflated record is read.
    parked: Option<StreamCursor<Source>>,
    ctx: ReaderContext,
    dialect: Dialect,
    header: FileHeader,
    name: String,
}

impl EsmReader {
    /// Open a content file, validate its header record and position the
    /// reader at the first record after it.
    ///
    /// `file_index` is the file's position in the content stack; it becomes
    /// part of every context saved from this reader.
    pub fn open<P: AsRef<Path>>(path: P, file_index: usize, transcoder: Transcoder) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let cursor = StreamCursor::new(Source::File(BufReader::new(file)), transcoder)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let ctx = ReaderContext::new(path.to_path_buf(), file_index, cursor.len());
        let mut reader = Self {
            cursor,
            parked: None,
            ctx,
            dialect: Dialect::Tes3,
            header: FileHeader::new(Dialect::Tes3, FileKind::Plugin),
            name,
        };

        let available = reader.cursor.remaining();
        if available < 4 {
            return Err(Error::TruncatedHeader { offset: 0, available });
        }
        let magic: Tag = reader.cursor.read_scalar()?;
        reader.dialect = Dialect::from_magic(magic).ok_or(Error::InvalidMagic { actual: magic })?;
        if available < reader.dialect.record_header_len() {
            return Err(Error::TruncatedHeader { offset: 0, available });
        }
        let record = reader.read_record_header(magic, 0, reader.cursor.len())?;
        reader.header = FileHeader::read(&mut reader, &record)?;
        reader.skip_record()?;

        tracing::debug!(
            file = %reader.name,
            dialect = %reader.dialect,
            masters = reader.header.masters.len(),
            "opened content file"
        );
        Ok(reader)
    }

    /// Get the file's dialect.
    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Get the parsed header record.
    #[inline]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Get the file name, for diagnostics.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the path of the open file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.ctx.path
    }

    /// Get the file's position in the content stack.
    #[inline]
    pub fn file_index(&self) -> usize {
        self.ctx.file_index
    }

    /// Get the absolute read position in the file.
    #[inline]
    pub fn position(&self) -> u64 {
        self.file_cursor().position()
    }

    fn file_cursor(&self) -> &StreamCursor<Source> {
        self.parked.as_ref().unwrap_or(&self.cursor)
    }

    /// Check whether subrecords are being read from an inflated payload.
    #[inline]
    pub fn is_inflated(&self) -> bool {
        self.parked.is_some()
    }

    /// Get the transcoder used for strings.
    #[inline]
    pub fn transcoder(&self) -> Transcoder {
        self.cursor.transcoder()
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    /// Capture the current framing state.
    ///
    /// Inside an inflated record the context resumes after that record.
    pub fn save(&self) -> ReaderContext {
        let file = self.file_cursor();
        let mut ctx = self.ctx.clone();
        ctx.file_pos = file.position();
        ctx.left_file = file.remaining();
        if self.parked.is_some() {
            ctx.left_rec = 0;
            ctx.left_sub = 0;
            ctx.sub_cached = false;
            ctx.pending_sub_len = None;
        }
        ctx
    }

    /// Capture the state as it will be right after entering `group`, whose
    /// header was just returned by [`EsmReader::next_unit`].
    pub fn save_inside(&self, group: &GroupHeader) -> ReaderContext {
        let mut ctx = self.save();
        ctx.groups.push(*group);
        ctx
    }

    /// Resume from a saved context, reopening its file if another one is
    /// currently open.
    pub fn restore(&mut self, ctx: &ReaderContext) -> Result<()> {
        self.leave_inflated();
        if ctx.path != self.ctx.path {
            tracing::debug!(from = %self.ctx.path.display(), to = %ctx.path.display(), "switching file");
            *self = Self::open(&ctx.path, ctx.file_index, self.cursor.transcoder())?;
        }
        self.cursor.reposition(ctx.file_pos)?;
        self.ctx = ctx.clone();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Records and groups
    // ------------------------------------------------------------------

    /// End offset of the innermost enclosing group, or of the file.
    fn level_end(&self) -> u64 {
        self.ctx
            .groups
            .last()
            .map_or(self.file_cursor().len(), GroupHeader::end)
    }

    /// Check whether records remain at the current nesting level.
    pub fn has_more_recs(&self) -> bool {
        self.position() < self.level_end()
    }

    /// Get the innermost entered group.
    pub fn current_group(&self) -> Option<&GroupHeader> {
        self.ctx.groups.last()
    }

    /// Read the next record or group header at the current nesting level.
    ///
    /// Returns `None` once the enclosing group (or the file) is exhausted.
    /// Unconsumed bytes of the previous record are skipped first.
    pub fn next_unit(&mut self) -> Result<Option<Unit>> {
        if self.ctx.left_rec > 0 || self.ctx.left_sub > 0 || self.parked.is_some() {
            self.skip_record()?;
        }

        let offset = self.cursor.position();
        let end = self.level_end();
        if offset >= end {
            return Ok(None);
        }

        let available = end - offset;
        if available < self.dialect.record_header_len() {
            return Err(Error::TruncatedHeader { offset, available });
        }

        let tag: Tag = self.cursor.read_scalar()?;
        if self.dialect == Dialect::Tes4 && tag == tags::GRUP {
            let raw: RawGroupHeader = self.cursor.read_scalar()?;
            let size = raw.size.get();
            if u64::from(size) < GROUP_HEADER_LEN || u64::from(size) > available {
                return Err(Error::GroupOverrun {
                    offset,
                    declared: u64::from(size),
                    available,
                });
            }
            return Ok(Some(Unit::Group(GroupHeader {
                kind: GroupKind::from_raw(raw.label, raw.group_type.get()),
                size,
                offset,
            })));
        }

        self.read_record_header(tag, offset, end).map(|r| Some(Unit::Record(r)))
    }

    fn read_record_header(&mut self, tag: Tag, offset: u64, end: u64) -> Result<RecordHeader> {
        let header = match self.dialect {
            Dialect::Tes3 => {
                let raw: RawRecordHeader3 = self.cursor.read_scalar()?;
                RecordHeader {
                    tag,
                    size: raw.size.get(),
                    flags: raw.flags.get(),
                    form_id: Default::default(),
                    offset,
                }
            }
            Dialect::Tes4 => {
                let raw: RawRecordHeader4 = self.cursor.read_scalar()?;
                RecordHeader {
                    tag,
                    size: raw.size.get(),
                    flags: raw.flags.get(),
                    form_id: strata_common::FormId::from_raw(raw.form_id.get()),
                    offset,
                }
            }
        };

        let available = end.saturating_sub(self.cursor.position());
        if u64::from(header.size) > available {
            return Err(Error::RecordOverrun {
                tag,
                offset,
                declared: u64::from(header.size),
                available,
            });
        }

        self.ctx.record = tag;
        self.ctx.left_rec = header.size;
        self.ctx.left_sub = 0;
        self.ctx.sub_cached = false;
        self.ctx.pending_sub_len = None;
        Ok(header)
    }

    /// Enter a group whose header was just returned by [`EsmReader::next_unit`].
    pub fn enter_group(&mut self, group: &GroupHeader) {
        self.ctx.groups.push(*group);
    }

    /// Leave the innermost group, skipping whatever is left of it.
    pub fn leave_group(&mut self) -> Result<()> {
        if let Some(group) = self.ctx.groups.pop() {
            self.skip_group(&group)?;
        }
        Ok(())
    }

    /// Skip a group whose header was just returned by [`EsmReader::next_unit`].
    pub fn skip_group(&mut self, group: &GroupHeader) -> Result<()> {
        self.leave_inflated();
        let position = self.cursor.position();
        self.cursor.skip(group.end().saturating_sub(position))?;
        Ok(())
    }

    /// Skip the rest of the current record.
    pub fn skip_record(&mut self) -> Result<()> {
        if self.parked.is_some() {
            self.leave_inflated();
        } else {
            let left = u64::from(self.ctx.left_rec) + u64::from(self.ctx.left_sub);
            self.cursor.skip(left)?;
        }
        self.ctx.left_rec = 0;
        self.ctx.left_sub = 0;
        self.ctx.sub_cached = false;
        self.ctx.pending_sub_len = None;
        Ok(())
    }

    /// Inflate the payload of a compressed dialect B record whose header was
    /// just returned by [`EsmReader::next_unit`].
    ///
    /// The payload is a u32 inflated size followed by a zlib stream. On
    /// success the record's subrecords are read from the inflated bytes. When
    /// the stream is corrupt or inflates to another size, the record is
    /// consumed and `false` is returned.
    pub fn inflate_record(&mut self, record: &RecordHeader) -> Result<bool> {
        if !record.is_compressed() || self.parked.is_some() {
            return Ok(true);
        }
        if self.ctx.left_rec < 4 {
            self.skip_record()?;
            return Ok(false);
        }
        let expected = self.cursor.read_u32()?;
        let compressed = self.cursor.read_vec(self.ctx.left_rec as usize - 4)?;
        self.ctx.left_rec = 0;

        // Stop one byte past the declared size.
        let mut inflated = Vec::new();
        let decoded = ZlibDecoder::new(compressed.as_slice())
            .take(u64::from(expected) + 1)
            .read_to_end(&mut inflated);
        if decoded.is_err() || inflated.len() != expected as usize {
            tracing::debug!(
                file = %self.name,
                tag = %record.tag,
                offset = record.offset,
                expected,
                "compressed record does not inflate"
            );
            return Ok(false);
        }

        let payload = StreamCursor::new(
            Source::Inflated(Cursor::new(inflated)),
            self.cursor.transcoder(),
        )?;
        self.parked = Some(std::mem::replace(&mut self.cursor, payload));
        self.ctx.left_rec = expected;
        Ok(true)
    }

    fn leave_inflated(&mut self) {
        if let Some(file) = self.parked.take() {
            self.cursor = file;
        }
    }

    /// Tag of the record being read.
    #[inline]
    pub fn record_tag(&self) -> Tag {
        self.ctx.record
    }

    /// Bytes left in the current record, excluding the current subrecord payload.
    #[inline]
    pub fn left_in_record(&self) -> u32 {
        self.ctx.left_rec
    }

    // ------------------------------------------------------------------
    // Subrecords
    // ------------------------------------------------------------------

    /// Check whether the current record has more subrecords.
    #[inline]
    pub fn has_more_subs(&self) -> bool {
        self.ctx.sub_cached || self.ctx.left_rec > 0
    }

    /// Read the next subrecord tag, or return the cached one.
    pub fn get_sub_name(&mut self) -> Result<Tag> {
        if self.ctx.sub_cached {
            self.ctx.sub_cached = false;
            return Ok(self.ctx.sub_name);
        }

        let mut tag = self.read_sub_tag()?;
        if self.dialect == Dialect::Tes4 && tag == tags::XXXX {
            self.ctx.sub_name = tag;
            let length = self.get_h_u32()?;
            self.ctx.pending_sub_len = Some(length);
            tag = self.read_sub_tag()?;
        }
        self.ctx.sub_name = tag;
        Ok(tag)
    }

    fn read_sub_tag(&mut self) -> Result<Tag> {
        if self.ctx.left_rec < 4 {
            return Err(Error::SubrecordOverrun {
                record: self.ctx.record,
                tag: self.ctx.sub_name,
                offset: self.cursor.position(),
                declared: 4,
                remaining: self.ctx.left_rec,
            });
        }
        let tag: Tag = self.cursor.read_scalar()?;
        self.ctx.left_rec -= 4;
        Ok(tag)
    }

    /// Hand the tag returned by the last [`EsmReader::get_sub_name`] back so
    /// the next call returns it again.
    #[inline]
    pub fn cache_sub_name(&mut self) {
        self.ctx.sub_cached = true;
    }

    /// Peek at the next subrecord tag; it is consumed only if it matches.
    pub fn is_next_sub(&mut self, tag: Tag) -> Result<bool> {
        if !self.has_more_subs() {
            return Ok(false);
        }
        let next = self.get_sub_name()?;
        if next != tag {
            self.cache_sub_name();
        }
        Ok(next == tag)
    }

    /// Read the next subrecord tag and fail unless it is `expected`.
    pub fn get_sub_name_is(&mut self, expected: Tag) -> Result<()> {
        if !self.has_more_subs() {
            return Err(Error::MissingSubrecord {
                record: self.ctx.record,
                expected,
            });
        }
        let offset = self.cursor.position();
        let actual = self.get_sub_name()?;
        if actual != expected {
            return Err(Error::UnexpectedSubrecord {
                record: self.ctx.record,
                expected,
                actual,
                offset,
            });
        }
        Ok(())
    }

    /// Read a subrecord length and check it against the bytes left in the record.
    pub fn get_sub_header(&mut self) -> Result<u32> {
        let offset = self.cursor.position();
        let header_len = self.dialect.sub_header_len() - 4;
        if self.ctx.left_rec < header_len {
            return Err(Error::SubrecordOverrun {
                record: self.ctx.record,
                tag: self.ctx.sub_name,
                offset,
                declared: header_len,
                remaining: self.ctx.left_rec,
            });
        }

        let stored = match self.dialect {
            Dialect::Tes3 => self.cursor.read_u32()?,
            Dialect::Tes4 => u32::from(self.cursor.read_u16()?),
        };
        self.ctx.left_rec -= header_len;
        let length = self.ctx.pending_sub_len.take().unwrap_or(stored);

        if length > self.ctx.left_rec {
            return Err(Error::SubrecordOverrun {
                record: self.ctx.record,
                tag: self.ctx.sub_name,
                offset,
                declared: length,
                remaining: self.ctx.left_rec,
            });
        }
        self.ctx.left_rec -= length;
        self.ctx.left_sub = length;
        Ok(length)
    }

    /// Skip the payload of the current subrecord.
    pub fn skip_sub_payload(&mut self) -> Result<()> {
        self.cursor.skip(u64::from(self.ctx.left_sub))?;
        self.ctx.left_sub = 0;
        Ok(())
    }

    /// Skip a subrecord whose tag has been read.
    pub fn skip_h_sub(&mut self) -> Result<()> {
        self.get_sub_header()?;
        self.skip_sub_payload()
    }

    /// Read the subrecord header and decode the whole payload with `decode`.
    pub fn get_h_payload<T>(
        &mut self,
        decode: impl FnOnce(&mut BinaryReader<'_>) -> strata_common::Result<T>,
    ) -> Result<T> {
        let length = self.get_sub_header()?;
        let bytes = self.cursor.read_exact(length as usize)?;
        self.ctx.left_sub = 0;
        let mut payload = BinaryReader::new(bytes);
        Ok(decode(&mut payload)?)
    }

    /// Read the subrecord header and the payload as owned bytes.
    pub fn get_h_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.get_sub_header()?;
        let bytes = self.cursor.read_vec(length as usize)?;
        self.ctx.left_sub = 0;
        Ok(bytes)
    }

    /// Read the subrecord header and a fixed-size payload.
    pub fn get_h_t<T: FromBytes>(&mut self) -> Result<T> {
        let offset = self.cursor.position();
        let length = self.get_sub_header()?;
        let expected = std::mem::size_of::<T>();
        if length as usize != expected {
            return Err(Error::UnexpectedSubrecordSize {
                record: self.ctx.record,
                tag: self.ctx.sub_name,
                offset,
                expected,
                actual: length,
            });
        }
        let value = self.cursor.read_scalar()?;
        self.ctx.left_sub = 0;
        Ok(value)
    }

    /// Read the subrecord header and a little-endian u32 payload.
    pub fn get_h_u32(&mut self) -> Result<u32> {
        self.get_h_t::<zerocopy::byteorder::little_endian::U32>()
            .map(|v| v.get())
    }

    /// Read the subrecord header and a little-endian i32 payload.
    pub fn get_h_i32(&mut self) -> Result<i32> {
        self.get_h_t::<zerocopy::byteorder::little_endian::I32>()
            .map(|v| v.get())
    }

    /// Read the subrecord header and a little-endian f32 payload.
    pub fn get_h_f32(&mut self) -> Result<f32> {
        self.get_h_t::<zerocopy::byteorder::little_endian::F32>()
            .map(|v| v.get())
    }

    /// Read the subrecord header and a string payload.
    ///
    /// Some plugins declare a zero-length string but still store one NUL
    /// byte after the header. That byte is consumed and an empty string
    /// returned. The leniency only applies when the next byte in the record
    /// is NUL, which can never start a subrecord tag.
    pub fn get_h_string(&mut self) -> Result<String> {
        let length = self.get_sub_header()?;
        if length == 0 && self.ctx.left_rec > 0 && self.cursor.peek_u8()? == 0 {
            self.cursor.skip(1)?;
            self.ctx.left_rec -= 1;
            return Ok(String::new());
        }
        let text = self.cursor.read_string(length as usize)?;
        self.ctx.left_sub = 0;
        Ok(text)
    }

    /// Read a named string subrecord.
    pub fn get_hn_string(&mut self, tag: Tag) -> Result<String> {
        self.get_sub_name_is(tag)?;
        self.get_h_string()
    }

    /// Read an optional string subrecord.
    pub fn get_hno_string(&mut self, tag: Tag) -> Result<Option<String>> {
        if self.is_next_sub(tag)? {
            self.get_h_string().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Read a named fixed-size subrecord.
    pub fn get_hn_t<T: FromBytes>(&mut self, tag: Tag) -> Result<T> {
        self.get_sub_name_is(tag)?;
        self.get_h_t()
    }

    /// Read an optional fixed-size subrecord.
    pub fn get_hno_t<T: FromBytes>(&mut self, tag: Tag) -> Result<Option<T>> {
        if self.is_next_sub(tag)? {
            self.get_h_t().map(Some)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;

    use strata_common::FormId;
    use tempfile::TempDir;

    use super::*;
    use crate::records::{CellRecord, CellRef, RawId, ReadMode};
    use crate::{Category, EsmWriter, FileKind};

    /// Header record length of a dialect A file without masters.
    const TES3_HEADER_LEN: u64 = 16 + 8 + 300;

    fn write_tes3(
        dir: &TempDir,
        name: &str,
        body: impl FnOnce(&mut EsmWriter<File>) -> Result<()>,
    ) -> PathBuf {
        let path = dir.path().join(name);
        let mut writer = EsmWriter::new(File::create(&path).unwrap(), Dialect::Tes3, Transcoder::default());
        writer
            .write_header(&FileHeader::new(Dialect::Tes3, FileKind::Master).with_author("tests"))
            .unwrap();
        body(&mut writer).unwrap();
        writer.finish().unwrap();
        path
    }

    /// Append raw bytes after a header-only dialect A file.
    fn write_raw_tes3(dir: &TempDir, name: &str, raw: &[u8]) -> PathBuf {
        let path = write_tes3(dir, name, |_| Ok(()));
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(raw).unwrap();
        path
    }

    fn write_cell(w: &mut EsmWriter<File>, name: &str, refs: &[(u32, &str)]) -> Result<()> {
        w.start_record(tags::CELL, 0, FormId::default())?;
        w.write_sub_string(tags::NAME, name)?;
        let mut data = 1u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0; 8]);
        w.write_sub(tags::DATA, &data)?;
        for (index, (num, base)) in refs.iter().enumerate() {
            let mut cell_ref = CellRef::new(FormId::from_raw(*num), RawId::Name(base.to_string()));
            cell_ref.scale = 1.0 + index as f32;
            cell_ref.write(w)?;
        }
        w.end_record()
    }

    fn open(path: &Path) -> EsmReader {
        EsmReader::open(path, 0, Transcoder::default()).unwrap()
    }

    fn next_record(reader: &mut EsmReader) -> RecordHeader {
        match reader.next_unit().unwrap() {
            Some(Unit::Record(record)) => record,
            other => panic!("expected a record, got {other:?}"),
        }
    }

    fn read_all_refs(reader: &mut EsmReader) -> Vec<CellRef> {
        let mut refs = Vec::new();
        while let Some(cell_ref) = CellRef::read_tes3(reader, ReadMode::Full).unwrap() {
            refs.push(cell_ref);
        }
        refs
    }

    #[test]
    fn test_open_reads_header() {
        let dir = TempDir::new().unwrap();
        let path = write_tes3(&dir, "Base.esm", |w| write_cell(w, "Vault", &[(1, "rock")]));
        let reader = open(&path);
        assert_eq!(reader.dialect(), Dialect::Tes3);
        assert_eq!(reader.header().kind, FileKind::Master);
        assert_eq!(reader.header().author, "tests");
        assert_eq!(reader.header().record_count, 1);
        assert_eq!(reader.position(), TES3_HEADER_LEN);
        assert_eq!(reader.name(), "Base.esm");
    }

    #[test]
    fn test_compressed_record_inflates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Packed.esm");
        let mut w = EsmWriter::new(File::create(&path).unwrap(), Dialect::Tes4, Transcoder::default());
        w.write_header(&FileHeader::new(Dialect::Tes4, FileKind::Master)).unwrap();
        w.write_compressed_record(Category::Static.tag(), 0, FormId::from_raw(1), |p| {
            p.write_sub_string(tags::EDID, "Rock")?;
            p.write_sub_string(tags::MODL, &"rocks/".repeat(40))
        })
        .unwrap();
        w.start_record(Category::Static.tag(), 0, FormId::from_raw(2)).unwrap();
        w.write_sub_string(tags::EDID, "Tree").unwrap();
        w.end_record().unwrap();
        w.finish().unwrap();

        let mut reader = open(&path);
        let packed = next_record(&mut reader);
        assert!(packed.is_compressed());
        let record_end = reader.position() + u64::from(packed.size);
        assert!(reader.inflate_record(&packed).unwrap());
        assert!(reader.is_inflated());
        assert_eq!(reader.position(), record_end);
        assert_eq!(reader.get_hn_string(tags::EDID).unwrap(), "Rock");
        let inside = reader.save();

        let plain = next_record(&mut reader);
        assert!(!reader.is_inflated());
        assert_eq!(plain.form_id, FormId::from_raw(2));
        assert_eq!(reader.get_hn_string(tags::EDID).unwrap(), "Tree");

        reader.restore(&inside).unwrap();
        assert_eq!(next_record(&mut reader).form_id, FormId::from_raw(2));
        assert!(reader.next_unit().unwrap().is_none());
    }

    #[test]
    fn test_invalid_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.esp");
        std::fs::write(&path, b"RIFF0000000000000000").unwrap();
        let err = EsmReader::open(&path, 0, Transcoder::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { actual } if actual == Tag::new(*b"RIFF")));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.esm");
        let mut header = FileHeader::new(Dialect::Tes3, FileKind::Plugin);
        header.version = 9.0;
        let mut writer = EsmWriter::new(File::create(&path).unwrap(), Dialect::Tes3, Transcoder::default());
        writer.write_header(&header).unwrap();
        writer.finish().unwrap();

        let err = EsmReader::open(&path, 0, Transcoder::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { dialect: Dialect::Tes3, .. }));
    }

    #[test]
    fn test_cached_tag_is_seen_once() {
        let dir = TempDir::new().unwrap();
        let path = write_tes3(&dir, "Base.esm", |w| write_cell(w, "Vault", &[(7, "rock")]));
        let mut reader = open(&path);
        let record = next_record(&mut reader);
        let cell = CellRecord::read(&mut reader, &record).unwrap();
        assert_eq!(cell.name, "Vault");
        assert!(cell.is_interior());

        // The cell reader stopped on FRMR and handed it back.
        assert!(!reader.is_next_sub(tags::NAME).unwrap());
        assert_eq!(reader.get_sub_name().unwrap(), tags::FRMR);
        assert_eq!(reader.get_h_u32().unwrap(), 7);
        assert_eq!(reader.get_sub_name().unwrap(), tags::NAME);
        assert_eq!(reader.get_h_string().unwrap(), "rock");
        assert_eq!(reader.get_sub_name().unwrap(), tags::DATA);
    }

    #[test]
    fn test_named_read_with_wrong_tag_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_tes3(&dir, "Base.esm", |w| write_cell(w, "Vault", &[]));
        let mut reader = open(&path);
        next_record(&mut reader);
        let err = reader.get_hn_string(tags::EDID).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedSubrecord { expected, actual, offset, .. }
                if expected == tags::EDID && actual == tags::NAME && offset == TES3_HEADER_LEN + 16
        ));
    }

    #[test]
    fn test_context_restore_across_files() {
        let dir = TempDir::new().unwrap();
        let first = write_tes3(&dir, "Base.esm", |w| {
            write_cell(w, "Vault", &[(1, "rock"), (2, "chest"), (3, "door")])
        });
        let second = write_tes3(&dir, "Patch.esp", |w| write_cell(w, "Cave", &[(9, "torch")]));

        let mut reader = open(&first);
        let record = next_record(&mut reader);
        CellRecord::read(&mut reader, &record).unwrap();
        let first_ref = CellRef::read_tes3(&mut reader, ReadMode::Full).unwrap().unwrap();
        let context = reader.save();
        let uninterrupted = read_all_refs(&mut reader);
        assert_eq!(uninterrupted.len(), 2);

        let mut other = EsmReader::open(&second, 1, Transcoder::default()).unwrap();
        let record = next_record(&mut other);
        assert_eq!(CellRecord::read(&mut other, &record).unwrap().name, "Cave");
        assert_eq!(read_all_refs(&mut other).len(), 1);

        other.restore(&context).unwrap();
        assert_eq!(other.path(), first.as_path());
        assert_eq!(other.file_index(), 0);
        assert_eq!(read_all_refs(&mut other), uninterrupted);
        assert_eq!(first_ref.ref_num, FormId::from_raw(1));
    }

    #[test]
    fn test_restore_mid_subrecord_sequence() {
        let dir = TempDir::new().unwrap();
        let path = write_tes3(&dir, "Base.esm", |w| write_cell(w, "Vault", &[(1, "rock")]));
        let mut reader = open(&path);
        let record = next_record(&mut reader);
        CellRecord::read(&mut reader, &record).unwrap();
        // Saved with FRMR cached.
        let context = reader.save();
        assert_eq!(context.offset(), reader.position());
        let expected = read_all_refs(&mut reader);

        reader.restore(&context).unwrap();
        assert_eq!(read_all_refs(&mut reader), expected);
    }

    #[test]
    fn test_record_overrun_reports_offset() {
        let dir = TempDir::new().unwrap();
        let path = write_tes3(&dir, "Base.esm", |w| {
            w.start_record(Tag::new(*b"STAT"), 0, FormId::default())?;
            w.write_sub_string(tags::NAME, "rock")?;
            w.end_record()
        });
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let mut reader = open(&path);
        match reader.next_unit() {
            Err(Error::RecordOverrun {
                offset,
                declared,
                available,
                ..
            }) => {
                assert_eq!(offset, TES3_HEADER_LEN);
                assert_eq!(declared, 13);
                assert_eq!(available, 10);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_truncated_header() {
        let dir = TempDir::new().unwrap();
        let path = write_raw_tes3(&dir, "Base.esm", b"STAT\x00\x00");
        let mut reader = open(&path);
        assert!(matches!(
            reader.next_unit(),
            Err(Error::TruncatedHeader { offset: TES3_HEADER_LEN, available: 6 })
        ));
    }

    #[test]
    fn test_subrecord_overrun() {
        let dir = TempDir::new().unwrap();
        let mut raw = b"STAT".to_vec();
        raw.extend_from_slice(&12u32.to_le_bytes());
        raw.extend_from_slice(&[0; 8]);
        raw.extend_from_slice(b"NAME");
        raw.extend_from_slice(&100u32.to_le_bytes());
        raw.extend_from_slice(b"rock");
        let path = write_raw_tes3(&dir, "Base.esm", &raw);

        let mut reader = open(&path);
        next_record(&mut reader);
        assert!(matches!(
            reader.get_hn_string(tags::NAME),
            Err(Error::SubrecordOverrun { declared: 100, remaining: 4, .. })
        ));
    }

    #[test]
    fn test_zero_length_string_placeholder() {
        let dir = TempDir::new().unwrap();
        let mut raw = b"STAT".to_vec();
        raw.extend_from_slice(&21u32.to_le_bytes());
        raw.extend_from_slice(&[0; 8]);
        raw.extend_from_slice(b"NAME");
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw.push(0);
        raw.extend_from_slice(b"MODL");
        raw.extend_from_slice(&4u32.to_le_bytes());
        raw.extend_from_slice(b"a.n\0");
        let path = write_raw_tes3(&dir, "Base.esm", &raw);

        let mut reader = open(&path);
        next_record(&mut reader);
        assert_eq!(reader.get_hn_string(tags::NAME).unwrap(), "");
        assert_eq!(reader.get_hn_string(tags::MODL).unwrap(), "a.n");
        assert!(!reader.has_more_subs());
        assert!(reader.next_unit().unwrap().is_none());
    }

    #[test]
    fn test_unread_record_bytes_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_tes3(&dir, "Base.esm", |w| {
            write_cell(w, "Vault", &[(1, "rock")])?;
            write_cell(w, "Cave", &[])
        });
        let mut reader = open(&path);
        next_record(&mut reader);
        reader.get_sub_name().unwrap();
        let record = next_record(&mut reader);
        assert_eq!(CellRecord::read(&mut reader, &record).unwrap().name, "Cave");
        assert!(reader.next_unit().unwrap().is_none());
    }
}
