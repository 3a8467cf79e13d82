//! Physical storage layout and guarded binary reads
//!
//! Every binary backend describes where a field's values live on disk with a
//! [`StorageLayout`]: per logical axis, the byte stride of one step along that
//! axis, whether the axis is stored reversed, plus a base offset. The layout is
//! built from a storage order (which logical axis is outermost on disk, which
//! is innermost), the element width, and optional per-axis padding that
//! accounts for Fortran record framing between pages.
//!
//! [`read_section`] turns a [`Section`] into offsets with the layout, reads the
//! covering byte span once through a [`GuardedFile`] and decodes the values in
//! row-major output order with an [`ElementCodec`].

use crate::array::{ArrayCursor, Element, TypedArray};
use crate::errors::{MeteoError, Result};
use crate::field::ElementType;
use crate::range::Section;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

/// Byte order declared by a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Element type plus byte order, fixed once per field at header parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementCodec {
    pub element_type: ElementType,
    pub endian: Endian,
}

impl ElementCodec {
    pub const fn new(element_type: ElementType, endian: Endian) -> Self {
        Self {
            element_type,
            endian,
        }
    }

    pub const fn width(&self) -> usize {
        self.element_type.width()
    }

    pub fn decode<T: Element>(&self, bytes: &[u8]) -> T {
        match self.endian {
            Endian::Little => T::from_le_slice(bytes),
            Endian::Big => T::from_be_slice(bytes),
        }
    }
}

/// Logical index tuple to physical byte offset mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    lengths: Vec<usize>,
    storage_order: Vec<usize>,
    padding: Vec<u64>,
    reversed: Vec<bool>,
    strides: Vec<u64>,
    base: u64,
    width: usize,
}

impl StorageLayout {
    /// Contiguous layout. `storage_order` lists logical axes from the slowest
    /// varying on disk to the fastest.
    pub fn contiguous(lengths: &[usize], storage_order: &[usize], width: usize) -> Result<Self> {
        let rank = lengths.len();
        let mut seen = vec![false; rank];
        if storage_order.len() != rank {
            return Err(MeteoError::format(format!(
                "storage order {storage_order:?} does not cover {rank} axes"
            )));
        }
        for &axis in storage_order {
            if axis >= rank || seen[axis] {
                return Err(MeteoError::format(format!(
                    "storage order {storage_order:?} is not a permutation of 0..{rank}"
                )));
            }
            seen[axis] = true;
        }
        let mut layout = Self {
            lengths: lengths.to_vec(),
            storage_order: storage_order.to_vec(),
            padding: vec![0; rank],
            reversed: vec![false; rank],
            strides: vec![0; rank],
            base: 0,
            width,
        };
        layout.recompute_strides();
        Ok(layout)
    }

    /// Contiguous layout whose storage order equals the logical order.
    pub fn row_major(lengths: &[usize], width: usize) -> Self {
        let order: Vec<usize> = (0..lengths.len()).collect();
        let mut layout = Self {
            lengths: lengths.to_vec(),
            storage_order: order,
            padding: vec![0; lengths.len()],
            reversed: vec![false; lengths.len()],
            strides: vec![0; lengths.len()],
            base: 0,
            width,
        };
        layout.recompute_strides();
        layout
    }

    #[must_use]
    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    #[must_use]
    pub fn with_reversed(mut self, axis: usize, reversed: bool) -> Self {
        if let Some(flag) = self.reversed.get_mut(axis) {
            *flag = reversed;
        }
        self
    }

    /// Extra bytes between consecutive slabs along `axis`, e.g. the 8 bytes of
    /// Fortran record framing separating two pages.
    #[must_use]
    pub fn with_padding(mut self, axis: usize, bytes: u64) -> Self {
        if let Some(pad) = self.padding.get_mut(axis) {
            *pad = bytes;
        }
        self.recompute_strides();
        self
    }

    fn recompute_strides(&mut self) {
        let mut block = self.width as u64;
        for &axis in self.storage_order.iter().rev() {
            self.strides[axis] = block + self.padding[axis];
            block = self.strides[axis] * self.lengths[axis] as u64;
        }
    }

    pub fn rank(&self) -> usize {
        self.lengths.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn strides(&self) -> &[u64] {
        &self.strides
    }

    /// Byte offset of one logical index tuple.
    pub fn offset(&self, index: &[usize]) -> u64 {
        index
            .iter()
            .enumerate()
            .fold(self.base, |acc, (axis, &logical)| {
                let physical = if self.reversed[axis] {
                    self.lengths[axis] - 1 - logical
                } else {
                    logical
                };
                acc + physical as u64 * self.strides[axis]
            })
    }

    /// Offsets for every element of `section`, in row-major output order.
    pub fn offsets(&self, section: &Section) -> Result<Vec<u64>> {
        if section.rank() != self.rank() {
            return Err(MeteoError::invalid_range(format!(
                "section rank {} does not match layout rank {}",
                section.rank(),
                self.rank()
            )));
        }
        for (range, &len) in section.ranges().iter().zip(&self.lengths) {
            range.check_within(len)?;
        }
        Ok(section.index_iter().map(|idx| self.offset(&idx)).collect())
    }

    /// One past the last byte a full read touches.
    pub fn end(&self) -> u64 {
        let last: Vec<usize> = self.lengths.iter().map(|&n| n.saturating_sub(1)).collect();
        let unreversed = Self {
            reversed: vec![false; self.rank()],
            ..self.clone()
        };
        unreversed.offset(&last) + self.width as u64
    }
}

/// File handle kept open for the life of a backend
///
/// Each read holds the lock for its whole seek and read. After [`close`]
/// every read fails with an I/O error.
///
/// [`close`]: GuardedFile::close
#[derive(Debug)]
pub struct GuardedFile {
    path: PathBuf,
    handle: Mutex<Option<File>>,
}

impl GuardedFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            handle: Mutex::new(Some(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn closed_error(&self) -> MeteoError {
        MeteoError::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            format!("file {} has been closed", self.path.display()),
        ))
    }

    pub fn len(&self) -> Result<u64> {
        let guard = self.lock();
        let file = guard.as_ref().ok_or_else(|| self.closed_error())?;
        Ok(file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read exactly `len` bytes at `offset`; a span past the end of the file
    /// is reported as truncated data.
    pub fn read_span(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut guard = self.lock();
        let file = guard.as_mut().ok_or_else(|| self.closed_error())?;
        let file_len = file.metadata()?.len();
        let end = offset + len as u64;
        if end > file_len {
            return Err(MeteoError::truncated(format!(
                "{} needs bytes {offset}..{end} but holds {file_len}",
                self.path.display()
            )));
        }
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => MeteoError::truncated(format!(
                "{} ended inside bytes {offset}..{end}",
                self.path.display()
            )),
            _ => MeteoError::Io(e),
        })?;
        Ok(buf)
    }

    /// The whole file, for text formats that re-scan on every read.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut guard = self.lock();
        let file = guard.as_mut().ok_or_else(|| self.closed_error())?;
        file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn read_to_string(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.read_all()?).into_owned())
    }

    pub fn close(&self) {
        self.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

/// Read `section` of a field stored with `layout`.
pub fn read_section(
    file: &GuardedFile,
    layout: &StorageLayout,
    codec: ElementCodec,
    section: &Section,
) -> Result<TypedArray> {
    match codec.element_type {
        ElementType::Byte => read_values::<i8>(file, layout, codec, section),
        ElementType::Short => read_values::<i16>(file, layout, codec, section),
        ElementType::Int => read_values::<i32>(file, layout, codec, section),
        ElementType::Float => read_values::<f32>(file, layout, codec, section),
        ElementType::Double => read_values::<f64>(file, layout, codec, section),
    }
}

fn read_values<T: Element>(
    file: &GuardedFile,
    layout: &StorageLayout,
    codec: ElementCodec,
    section: &Section,
) -> Result<TypedArray> {
    let mut cursor = ArrayCursor::<T>::with_shape(&section.shape());
    fill_from_layout(file, layout, codec, section, &mut cursor)?;
    cursor.finish()
}

fn fill_from_layout<T: Element>(
    file: &GuardedFile,
    layout: &StorageLayout,
    codec: ElementCodec,
    section: &Section,
    cursor: &mut ArrayCursor<T>,
) -> Result<()> {
    let offsets = layout.offsets(section)?;
    let (Some(&lo), Some(&hi)) = (offsets.iter().min(), offsets.iter().max()) else {
        return Ok(());
    };
    let width = codec.width();
    let span = (hi - lo) as usize + width;
    trace!(
        path = %file.path().display(),
        start = lo,
        bytes = span,
        elements = offsets.len(),
        "reading span"
    );
    let bytes = file.read_span(lo, span)?;
    for off in offsets {
        let start = (off - lo) as usize;
        cursor.push(codec.decode::<T>(&bytes[start..start + width]));
    }
    Ok(())
}

/// Read a section whose first `outer` axes pick separately stored slabs.
///
/// `slab_base` maps each outer index tuple to the byte offset of its slab;
/// `inner` describes the layout inside one slab with a zero base.
pub fn read_slabs<F>(
    file: &GuardedFile,
    inner: &StorageLayout,
    codec: ElementCodec,
    section: &Section,
    outer: usize,
    slab_base: F,
) -> Result<TypedArray>
where
    F: Fn(&[usize]) -> Result<u64>,
{
    match codec.element_type {
        ElementType::Byte => slab_values::<i8, F>(file, inner, codec, section, outer, slab_base),
        ElementType::Short => slab_values::<i16, F>(file, inner, codec, section, outer, slab_base),
        ElementType::Int => slab_values::<i32, F>(file, inner, codec, section, outer, slab_base),
        ElementType::Float => slab_values::<f32, F>(file, inner, codec, section, outer, slab_base),
        ElementType::Double => slab_values::<f64, F>(file, inner, codec, section, outer, slab_base),
    }
}

fn slab_values<T: Element, F>(
    file: &GuardedFile,
    inner: &StorageLayout,
    codec: ElementCodec,
    section: &Section,
    outer: usize,
    slab_base: F,
) -> Result<TypedArray>
where
    F: Fn(&[usize]) -> Result<u64>,
{
    if outer > section.rank() {
        return Err(MeteoError::invalid_range(format!(
            "{outer} slab axes exceed section rank {}",
            section.rank()
        )));
    }
    let (outer_ranges, inner_ranges) = section.ranges().split_at(outer);
    let outer_section = Section::new(outer_ranges.to_vec());
    let inner_section = Section::new(inner_ranges.to_vec());
    let mut cursor = ArrayCursor::<T>::with_shape(&section.shape());
    for idx in outer_section.index_iter() {
        let layout = inner.clone().with_base(slab_base(&idx)?);
        fill_from_layout(file, &layout, codec, &inner_section, &mut cursor)?;
    }
    cursor.finish()
}

/// Endian-aware scalar reads over any byte source
pub trait BinaryRead: Read {
    fn read_u8_value(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_i16_value(&mut self, endian: Endian) -> io::Result<i16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(match endian {
            Endian::Little => i16::from_le_bytes(buf),
            Endian::Big => i16::from_be_bytes(buf),
        })
    }

    fn read_i32_value(&mut self, endian: Endian) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(match endian {
            Endian::Little => i32::from_le_bytes(buf),
            Endian::Big => i32::from_be_bytes(buf),
        })
    }

    fn read_f32_value(&mut self, endian: Endian) -> io::Result<f32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(match endian {
            Endian::Little => f32::from_le_bytes(buf),
            Endian::Big => f32::from_be_bytes(buf),
        })
    }

    /// Fixed-width text field, lossily decoded and trimmed of padding.
    fn read_text(&mut self, len: usize) -> io::Result<String> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf)
            .trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string())
    }
}

impl<R: Read + ?Sized> BinaryRead for R {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Range;
    use std::io::Write;

    fn be_page_file(pages: &[[f32; 6]]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        for page in pages {
            tmp.write_all(&24u32.to_be_bytes()).unwrap();
            for v in page {
                tmp.write_all(&v.to_be_bytes()).unwrap();
            }
            tmp.write_all(&24u32.to_be_bytes()).unwrap();
        }
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn fortran_framed_pages() {
        let tmp = be_page_file(&[
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0, 10.0, 11.0, 12.0],
        ]);
        let file = GuardedFile::open(tmp.path()).unwrap();
        let layout = StorageLayout::row_major(&[2, 2, 3], 4)
            .with_base(4)
            .with_padding(0, 8);
        let section = Section::new(vec![
            Range::single(1),
            Range::full(2).unwrap(),
            Range::full(3).unwrap(),
        ]);
        let codec = ElementCodec::new(ElementType::Float, Endian::Big);
        let out = read_section(&file, &layout, codec, &section).unwrap().reduced();
        let values: Vec<f32> = out.as_f32().unwrap().iter().copied().collect();
        assert_eq!(out.shape(), &[2, 3]);
        assert_eq!(values, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn storage_order_and_reversal() {
        // logical (y, x); disk stores x slowest, y fastest, y reversed
        let layout = StorageLayout::contiguous(&[3, 2], &[1, 0], 2)
            .unwrap()
            .with_reversed(0, true);
        assert_eq!(layout.strides(), &[2, 6]);
        assert_eq!(layout.offset(&[0, 0]), 4);
        assert_eq!(layout.offset(&[2, 1]), 6);
        assert_eq!(layout.end(), 12);
        assert!(StorageLayout::contiguous(&[3, 2], &[1, 1], 2).is_err());
    }

    #[test]
    fn span_past_end_is_truncated_io() {
        let tmp = be_page_file(&[[0.0; 6]]);
        let file = GuardedFile::open(tmp.path()).unwrap();
        let layout = StorageLayout::row_major(&[4, 3], 4).with_base(4);
        let section = Section::new(vec![Range::full(4).unwrap(), Range::full(3).unwrap()]);
        let codec = ElementCodec::new(ElementType::Float, Endian::Big);
        assert!(matches!(
            read_section(&file, &layout, codec, &section),
            Err(MeteoError::Io(_))
        ));
    }

    #[test]
    fn reads_after_close_fail() {
        let tmp = be_page_file(&[[0.0; 6]]);
        let file = GuardedFile::open(tmp.path()).unwrap();
        assert!(file.read_span(0, 4).is_ok());
        file.close();
        assert!(file.is_closed());
        assert!(matches!(file.read_span(0, 4), Err(MeteoError::Io(_))));
    }

    #[test]
    fn binary_read_extension() {
        let bytes = [0x00, 0x01, 0x02, 0x00, b'a', b'b', 0, 0];
        let mut r = &bytes[..];
        assert_eq!(r.read_i16_value(Endian::Big).unwrap(), 1);
        assert_eq!(r.read_i16_value(Endian::Little).unwrap(), 2);
        assert_eq!(r.read_text(4).unwrap(), "ab");
    }
}
