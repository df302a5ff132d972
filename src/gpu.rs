//! GPU device interop layer
//!
//! The engine never touches a native device directly; it goes through
//! [`GpuDevice`], which supplies texture creation and copy primitives plus the
//! device-level multithread-protection guard. The device forbids concurrent
//! access from multiple threads without the guard held.

use crate::error::{Error, Result};
use crate::types::{Resolution, Surface, BYTES_PER_PIXEL};

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

/// Scoped multithread-protection guard: entered on construction, left on drop.
pub struct MultithreadGuard<'a> {
    _guard: Option<MutexGuard<'a, ()>>,
}

/// Trait for GPU device implementations
pub trait GpuDevice: Send + Sync {
    /// Toggle device-level multithread protection
    fn set_multithread_protected(&self, enabled: bool);

    /// Acquire the multithread guard; every block of device calls runs under it
    fn lock_multithread(&self) -> MultithreadGuard<'_>;

    /// Allocate an owned texture of the given size, cleared to opaque black
    fn create_blank_texture(&self, size: Resolution) -> Result<Surface>;

    /// Copy an existing texture into a new owned one
    fn duplicate_texture(&self, src: &Surface) -> Result<Surface>;

    /// Copy `region` texels from `src` into `dst` at the origin.
    /// The region must fit in both surfaces.
    fn copy_region(&self, dst: &mut Surface, src: &Surface, region: Resolution) -> Result<()>;
}

/// CPU-backed device implementation.
///
/// Serves as the default interop layer for in-process sources and as the
/// reference for what a native Direct3D/Vulkan binding must provide. Device
/// loss can be injected for fault testing via [`SoftwareDevice::mark_lost`].
pub struct SoftwareDevice {
    multithread: Mutex<()>,
    protected: AtomicBool,
    lost: AtomicBool,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            multithread: Mutex::new(()),
            protected: AtomicBool::new(false),
            lost: AtomicBool::new(false),
        }
    }

    /// Simulate device removal; all subsequent device calls fail fatally
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    fn check_alive(&self) -> Result<()> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(Error::DeviceLost("device removed".into()));
        }
        Ok(())
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for SoftwareDevice {
    fn set_multithread_protected(&self, enabled: bool) {
        self.protected.store(enabled, Ordering::SeqCst);
    }

    fn lock_multithread(&self) -> MultithreadGuard<'_> {
        let guard = if self.protected.load(Ordering::SeqCst) {
            Some(self.multithread.lock())
        } else {
            None
        };
        MultithreadGuard { _guard: guard }
    }

    fn create_blank_texture(&self, size: Resolution) -> Result<Surface> {
        self.check_alive()?;
        Ok(Surface::blank(size))
    }

    fn duplicate_texture(&self, src: &Surface) -> Result<Surface> {
        self.check_alive()?;
        Ok(src.clone())
    }

    fn copy_region(&self, dst: &mut Surface, src: &Surface, region: Resolution) -> Result<()> {
        self.check_alive()?;
        if region.width > dst.size.width
            || region.height > dst.size.height
            || region.width > src.size.width
            || region.height > src.size.height
        {
            return Err(Error::SurfaceCopy(format!(
                "region {} exceeds dst {} or src {}",
                region, dst.size, src.size
            )));
        }

        let row_bytes = region.width as usize * BYTES_PER_PIXEL;
        for y in 0..region.height as usize {
            let src_off = y * src.stride as usize;
            let dst_off = y * dst.stride as usize;
            dst.data[dst_off..dst_off + row_bytes]
                .copy_from_slice(&src.data[src_off..src_off + row_bytes]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(size: Resolution, value: u8) -> Surface {
        let mut s = Surface::blank(size);
        s.data.fill(value);
        s
    }

    #[test]
    fn test_copy_region_clamped_fits() {
        let device = SoftwareDevice::new();
        let mut dst = device.create_blank_texture(Resolution::new(4, 4)).unwrap();
        let src = filled(Resolution::new(8, 2), 0xAB);

        let region = src.size.clamped_to(dst.size);
        assert_eq!(region, Resolution::new(4, 2));
        device.copy_region(&mut dst, &src, region).unwrap();

        // First two rows copied, rest still blank
        assert_eq!(dst.data[0], 0xAB);
        let row3 = 2 * dst.stride as usize;
        assert_eq!(&dst.data[row3..row3 + 4], &[0, 0, 0, 0xFF]);
    }

    #[test]
    fn test_copy_out_of_bounds_rejected() {
        let device = SoftwareDevice::new();
        let mut dst = device.create_blank_texture(Resolution::new(2, 2)).unwrap();
        let src = filled(Resolution::new(2, 2), 1);
        let err = device
            .copy_region(&mut dst, &src, Resolution::new(4, 4))
            .unwrap_err();
        assert!(matches!(err, Error::SurfaceCopy(_)));
    }

    #[test]
    fn test_device_loss_is_fatal() {
        let device = SoftwareDevice::new();
        device.mark_lost();
        let err = device
            .create_blank_texture(Resolution::new(2, 2))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_multithread_guard_scopes() {
        let device = SoftwareDevice::new();
        device.set_multithread_protected(true);
        {
            let _guard = device.lock_multithread();
            // Guard held; a second acquisition from this thread would deadlock,
            // which is the single-writer contract.
        }
        let _again = device.lock_multithread();
    }
}
