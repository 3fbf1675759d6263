// Block device access
//
// The overwrite engine writes through `BlockTarget` so it runs the same code
// against a raw device, a regular file standing in for one, or an in-memory
// cursor.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

/// Writable, seekable storage the overwrite engine can flush to stable media
pub trait BlockTarget: Write + Seek {
    /// Flush written data through any OS cache to the device
    fn sync(&mut self) -> io::Result<()>;

    /// Capacity probed by seeking to the end. The position is rewound to 0.
    fn probe_capacity(&mut self) -> io::Result<u64> {
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(0))?;
        Ok(end)
    }
}

impl BlockTarget for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl BlockTarget for io::Cursor<Vec<u8>> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: BlockTarget + ?Sized> BlockTarget for &mut T {
    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Open a device node for writing
///
/// Block devices are opened with `O_EXCL`, so the kernel refuses the open
/// while the device is mounted or claimed by another exclusive opener.
/// Regular files are opened normally.
pub fn open_exclusive(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true);

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};

        if std::fs::metadata(path)?.file_type().is_block_device() {
            opts.custom_flags(libc::O_EXCL);
        }
    }

    let file = opts.open(path)?;
    tracing::debug!(path = %path.display(), "Opened device for writing");
    Ok(file)
}
