use std::io::{self, Read, Write};

pub const MAGIC: &[u8; 8] = b"NSWARM01";
pub const VERSION_V1: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_V1;

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    // Strict format: raw LZ4 block with external expected size.
    lz4_flex::decompress(input, expected_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "lz4 decompression failed"))
}

/// Counts bytes without storing them. Used to size images before writing.
pub struct CountingWriter {
    written: usize,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self { written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Default for CountingWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = self.written.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Little-endian helpers: the chunked image format.

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u64_le<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_i64_le<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f64_le<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    Ok(read_exact::<1, _>(r)?[0])
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_exact::<8, _>(r)?))
}

pub fn read_i64_le<R: Read>(r: &mut R) -> io::Result<i64> {
    Ok(i64::from_le_bytes(read_exact::<8, _>(r)?))
}

pub fn read_f64_le<R: Read>(r: &mut R) -> io::Result<f64> {
    Ok(f64::from_le_bytes(read_exact::<8, _>(r)?))
}

// Native-endian helpers: the synapse record, which is laid out in host order.

pub fn write_usize_ne<W: Write>(w: &mut W, v: usize) -> io::Result<()> {
    w.write_all(&v.to_ne_bytes())
}

pub fn write_i32_ne<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_ne_bytes())
}

pub fn write_f64_ne<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_ne_bytes())
}

pub fn read_usize_ne<R: Read>(r: &mut R) -> io::Result<usize> {
    Ok(usize::from_ne_bytes(read_exact::<{ core::mem::size_of::<usize>() }, _>(r)?))
}

pub fn read_i32_ne<R: Read>(r: &mut R) -> io::Result<i32> {
    Ok(i32::from_ne_bytes(read_exact::<4, _>(r)?))
}

pub fn read_f64_ne<R: Read>(r: &mut R) -> io::Result<f64> {
    Ok(f64::from_ne_bytes(read_exact::<8, _>(r)?))
}

pub fn write_chunk<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    w.write_all(&tag)?;
    write_u32_le(
        w,
        u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    )?;
    w.write_all(payload)
}

/// Write an LZ4 chunk: payload is compressed and preceded by the uncompressed length (u32).
///
/// Layout:
/// - tag: [u8;4]
/// - len: u32 (bytes following, including the 4-byte uncompressed length)
/// - uncompressed_len: u32
/// - compressed payload bytes
pub fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let uncompressed_len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?;
    let total_len = 4u32.saturating_add(
        u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    );

    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, uncompressed_len)?;
    w.write_all(&compressed)
}

/// Read the body of a chunk written by [`write_chunk_lz4`], given its header length.
pub fn read_chunk_lz4_payload<R: Read>(r: &mut R, len: u32) -> io::Result<Vec<u8>> {
    if len < 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "lz4 chunk shorter than its length prefix",
        ));
    }
    let uncompressed_len = read_u32_le(r)? as usize;
    let mut compressed = vec![0u8; (len - 4) as usize];
    r.read_exact(&mut compressed)?;
    decompress_lz4(&compressed, uncompressed_len)
}

/// Read the next chunk header. `Ok(None)` only at a clean end of stream; a header cut
/// short anywhere after its first byte is `UnexpectedEof`.
pub fn read_chunk_header<R: Read>(r: &mut R) -> io::Result<Option<([u8; 4], u32)>> {
    let mut tag = [0u8; 4];
    let mut filled = 0;
    while filled < tag.len() {
        match r.read(&mut tag[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    match filled {
        0 => Ok(None),
        4 => Ok(Some((tag, read_u32_le(r)?))),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated chunk header",
        )),
    }
}
