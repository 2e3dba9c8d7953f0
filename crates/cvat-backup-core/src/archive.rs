use std::io::Cursor;

use crate::error::BackupError;
use crate::remote::ArchiveEntry;

/// Unpack every file of a ZIP archive into memory, in archive order.
///
/// Directory entries are skipped. Entry names are kept as stored; callers
/// never use them as paths. Buffers grow with the bytes actually inflated;
/// the sizes claimed by the archive headers are not trusted.
pub fn unpack_zip(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, BackupError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        std::io::copy(&mut file, &mut data)?;
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            data,
        });
    }

    Ok(entries)
}
