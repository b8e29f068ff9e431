//! Platform-specific host-filesystem usage probe, abstracted behind one
//! function so the admission/eviction logic stays platform-agnostic (Design
//! Notes §9: "abstract behind one capability returning `(total, used,
//! free, used_pct)`").

use std::path::Path;

use crate::error::Result;

/// Total, used, and free bytes on the filesystem hosting `path`, plus the
/// used-percentage computed from them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
}

impl DiskUsage {
    fn from_bytes(total: u64, free: u64) -> Self {
        let used = total.saturating_sub(free);
        let used_percent = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64) * 100.0
        };
        Self {
            total,
            used,
            free,
            used_percent,
        }
    }
}

/// Query disk usage for the filesystem containing `path`.
pub fn get_disk_usage(path: &Path) -> Result<DiskUsage> {
    imp::get_disk_usage(path)
}

#[cfg(unix)]
mod imp {
    use std::path::Path;

    use nix::sys::statvfs::statvfs;

    use super::DiskUsage;
    use crate::error::{Error, Result};

    pub fn get_disk_usage(path: &Path) -> Result<DiskUsage> {
        let stat = statvfs(path).map_err(|e| Error::Other(format!("statvfs({path:?}): {e}")))?;
        let block_size = stat.fragment_size().max(1) as u64;
        let total = stat.blocks() as u64 * block_size;
        let free = stat.blocks_available() as u64 * block_size;
        Ok(DiskUsage::from_bytes(total, free))
    }
}

#[cfg(windows)]
mod imp {
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

    use super::DiskUsage;
    use crate::error::{Error, Result};

    pub fn get_disk_usage(path: &Path) -> Result<DiskUsage> {
        let mut wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let mut free_bytes_available = 0u64;
        let mut total_bytes = 0u64;
        let mut total_free_bytes = 0u64;

        let ok = unsafe {
            GetDiskFreeSpaceExW(
                wide.as_mut_ptr(),
                &mut free_bytes_available,
                &mut total_bytes,
                &mut total_free_bytes,
            )
        };

        if ok == 0 {
            return Err(Error::Other(format!(
                "GetDiskFreeSpaceExW({path:?}) failed"
            )));
        }

        Ok(DiskUsage::from_bytes(total_bytes, total_free_bytes))
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    use std::path::Path;

    use super::DiskUsage;
    use crate::error::Result;

    pub fn get_disk_usage(_path: &Path) -> Result<DiskUsage> {
        Ok(DiskUsage::default())
    }
}
