//! Writer for the "new ASCII" (newc) cpio format.
//!
//! Every record is a 110-byte header of hexadecimal fields, the
//! NUL-terminated name and the data, with header+name and data each padded
//! to a multiple of four bytes. The archive ends with a `TRAILER!!!` record.
//! Inode numbers are assigned sequentially and every non-directory has a link
//! count of one, so no entry is ever treated as a hard link of another.

use std::fs::Metadata;
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;

const MAGIC: &str = "070701";
const HEADER_LEN: usize = 110;
const TRAILER: &[u8] = b"TRAILER!!!";

struct Header {
    ino: u32,
    mode: u32,
    uid: u32,
    gid: u32,
    nlink: u32,
    mtime: u32,
    filesize: u32,
}

impl Header {
    fn from_metadata(ino: u32, metadata: &Metadata, nlink: u32, filesize: u32) -> Self {
        Self {
            ino,
            mode: metadata.mode(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            nlink,
            mtime: metadata.mtime().clamp(0, u32::MAX as i64) as u32,
            filesize,
        }
    }
}

pub(crate) struct CpioWriter<W: Write> {
    inner: W,
    position: u64,
    next_ino: u32,
}

impl<W: Write> CpioWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            position: 0,
            next_ino: 1,
        }
    }

    pub fn append_directory(&mut self, name: &[u8], metadata: &Metadata) -> io::Result<()> {
        let header = Header::from_metadata(self.ino(), metadata, 2, 0);
        self.write_header(&header, name)
    }

    pub fn append_file(
        &mut self,
        name: &[u8],
        metadata: &Metadata,
        data: &mut impl Read,
    ) -> io::Result<()> {
        let size = u32::try_from(metadata.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} is {} bytes, larger than a newc record can hold",
                    String::from_utf8_lossy(name),
                    metadata.len()
                ),
            )
        })?;

        let header = Header::from_metadata(self.ino(), metadata, 1, size);
        self.write_header(&header, name)?;

        let copied = io::copy(&mut data.take(size as u64), &mut self.inner)?;
        if copied != size as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} shrank while being archived", String::from_utf8_lossy(name)),
            ));
        }
        self.position += copied;
        self.pad()
    }

    pub fn append_symlink(
        &mut self,
        name: &[u8],
        metadata: &Metadata,
        target: &[u8],
    ) -> io::Result<()> {
        let size = u32::try_from(target.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "symlink target too long"))?;

        let header = Header::from_metadata(self.ino(), metadata, 1, size);
        self.write_header(&header, name)?;
        self.write(target)?;
        self.pad()
    }

    /// Writes the trailer record and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        let trailer = Header {
            ino: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            nlink: 1,
            mtime: 0,
            filesize: 0,
        };
        self.write_header(&trailer, TRAILER)?;
        Ok(self.inner)
    }

    fn ino(&mut self) -> u32 {
        let ino = self.next_ino;
        self.next_ino += 1;
        ino
    }

    fn write_header(&mut self, header: &Header, name: &[u8]) -> io::Result<()> {
        let encoded = format!(
            "{}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
            MAGIC,
            header.ino,
            header.mode,
            header.uid,
            header.gid,
            header.nlink,
            header.mtime,
            header.filesize,
            0, // devmajor
            0, // devminor
            0, // rdevmajor
            0, // rdevminor
            name.len() + 1,
            0, // check
        );
        debug_assert_eq!(encoded.len(), HEADER_LEN);

        self.write(encoded.as_bytes())?;
        self.write(name)?;
        self.write(&[0])?;
        self.pad()
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn pad(&mut self) -> io::Result<()> {
        let padding = (4 - (self.position % 4) as usize) % 4;
        self.write(&[0; 3][..padding])
    }
}

/// A decoded archive record.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct Record {
    pub name: String,
    pub mode: u32,
    pub nlink: u32,
    pub data: Vec<u8>,
}

/// Decodes a newc archive up to its trailer.
#[cfg(test)]
pub(crate) fn read_archive(bytes: &[u8]) -> io::Result<Vec<Record>> {
    fn field(header: &[u8], index: usize) -> io::Result<u32> {
        let start = MAGIC.len() + index * 8;
        let text = std::str::from_utf8(&header[start..start + 8])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        u32::from_str_radix(text, 16).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
    fn align(n: usize) -> usize {
        (n + 3) & !3
    }

    let mut records = Vec::new();
    let mut offset = 0;
    loop {
        let header = bytes
            .get(offset..offset + HEADER_LEN)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        if &header[..6] != MAGIC.as_bytes() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad magic"));
        }

        let mode = field(header, 1)?;
        let nlink = field(header, 4)?;
        let filesize = field(header, 6)? as usize;
        let namesize = field(header, 11)? as usize;

        let name_start = offset + HEADER_LEN;
        let name = &bytes[name_start..name_start + namesize - 1];
        let data_start = align(name_start + namesize);
        let data = bytes[data_start..data_start + filesize].to_vec();
        offset = align(data_start + filesize);

        if name == TRAILER {
            return Ok(records);
        }
        records.push(Record {
            name: String::from_utf8_lossy(name).into_owned(),
            mode,
            nlink,
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_archive_is_trailer_only() {
        let bytes = CpioWriter::new(Vec::new()).finish().unwrap();

        assert_eq!(bytes.len() % 4, 0);
        assert!(bytes.starts_with(b"070701"));
        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + TRAILER.len()], TRAILER);
        assert!(read_archive(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_records_are_aligned() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("odd");
        fs::write(&file, "abcde").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("odd", &link).unwrap();

        let mut writer = CpioWriter::new(Vec::new());
        writer
            .append_directory(b"etc", &fs::symlink_metadata(dir.path()).unwrap())
            .unwrap();
        writer
            .append_file(
                b"etc/odd",
                &fs::metadata(&file).unwrap(),
                &mut fs::File::open(&file).unwrap(),
            )
            .unwrap();
        writer
            .append_symlink(b"etc/link", &fs::symlink_metadata(&link).unwrap(), b"odd")
            .unwrap();
        let bytes = writer.finish().unwrap();

        assert_eq!(bytes.len() % 4, 0);
        let records = read_archive(&bytes).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["etc", "etc/odd", "etc/link"]);

        assert_eq!(records[0].mode & 0o170000, 0o040000);
        assert_eq!(records[0].nlink, 2);
        assert_eq!(records[1].mode & 0o170000, 0o100000);
        assert_eq!(records[1].data, b"abcde");
        assert_eq!(records[1].nlink, 1);
        assert_eq!(records[2].mode & 0o170000, 0o120000);
        assert_eq!(records[2].data, b"odd");
    }

    #[test]
    fn test_header_layout() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, "hi").unwrap();

        let mut writer = CpioWriter::new(Vec::new());
        writer
            .append_file(
                b"a",
                &fs::metadata(&file).unwrap(),
                &mut fs::File::open(&file).unwrap(),
            )
            .unwrap();
        let bytes = writer.finish().unwrap();

        // ino 1, filesize 2, namesize 2
        assert_eq!(&bytes[6..14], b"00000001");
        assert_eq!(&bytes[54..62], b"00000002");
        assert_eq!(&bytes[94..102], b"00000002");
        assert_eq!(&bytes[102..110], b"00000000");
        // header + "a\0" is 112 bytes, already aligned
        assert_eq!(&bytes[110..112], b"a\0");
        assert_eq!(&bytes[112..114], b"hi");
    }

    #[test]
    fn test_short_read_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a");
        fs::write(&file, "hello").unwrap();
        let metadata = fs::metadata(&file).unwrap();

        let mut writer = CpioWriter::new(Vec::new());
        let result = writer.append_file(b"a", &metadata, &mut &b"he"[..]);

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
