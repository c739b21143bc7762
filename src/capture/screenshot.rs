//! Screen-to-memory pixel capture.

use image::RgbaImage;
use thiserror::Error;

use crate::geometry::Rect;

#[derive(Debug, Error)]
pub enum CaptureFailure {
    #[error("capture region is empty ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },
    #[error("capture region {width}x{height} is too large")]
    RegionTooLarge { width: u32, height: u32 },
    #[error("{step} failed: {detail}")]
    Gdi { step: &'static str, detail: String },
    #[error("pixel data is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

/// A captured image: RGBA, 8 bits per channel.
///
/// One buffer is produced per capture and consumed by exactly one sink
/// before the dispatch cycle ends.
#[derive(Debug)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    #[cfg(test)]
    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Builds a buffer from top-down BGRA rows as GDI produces them.
    ///
    /// GDI leaves the alpha byte undefined for screen copies, so every pixel
    /// is made opaque.
    pub fn from_bgra(
        width: u32,
        height: u32,
        mut bytes: Vec<u8>,
    ) -> Result<Self, CaptureFailure> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(CaptureFailure::BufferSize {
                expected,
                actual: bytes.len(),
            });
        }

        for px in bytes.chunks_exact_mut(4) {
            px.swap(0, 2);
            px[3] = u8::MAX;
        }

        let image = RgbaImage::from_raw(width, height, bytes).ok_or(CaptureFailure::BufferSize {
            expected,
            actual: 0,
        })?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> image::Rgba<u8> {
        *self.image.get_pixel(x, y)
    }

    /// Consumes the buffer, returning the raw RGBA bytes.
    pub fn into_raw(self) -> Vec<u8> {
        self.image.into_raw()
    }
}

/// Copies a region of the screen into memory.
pub trait ScreenCapturer {
    fn capture(&self, rect: Rect) -> Result<PixelBuffer, CaptureFailure>;
}

/// Returns the pixel size of `rect`, failing for zero-area regions.
///
/// Capturers call this before allocating anything.
pub fn region_size(rect: Rect) -> Result<(u32, u32), CaptureFailure> {
    if rect.is_empty() {
        return Err(CaptureFailure::EmptyRegion {
            width: rect.width(),
            height: rect.height(),
        });
    }
    Ok((rect.width(), rect.height()))
}

#[cfg(windows)]
pub use self::win32::GdiCapturer;

#[cfg(windows)]
mod win32 {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Gdi::{
        BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CAPTUREBLT, CreateCompatibleBitmap,
        CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, HBITMAP,
        HDC, HGDIOBJ, ROP_CODE, ReleaseDC, SRCCOPY, SelectObject,
    };

    use super::{CaptureFailure, PixelBuffer, ScreenCapturer, region_size};
    use crate::geometry::Rect;

    /// Captures screen pixels with a GDI bit-block transfer.
    ///
    /// This reads what is on screen, so anything covering the window is
    /// captured too.
    #[derive(Debug, Default)]
    pub struct GdiCapturer;

    impl ScreenCapturer for GdiCapturer {
        fn capture(&self, rect: Rect) -> Result<PixelBuffer, CaptureFailure> {
            let (width, height) = region_size(rect)?;
            let too_large = || CaptureFailure::RegionTooLarge { width, height };
            let w = i32::try_from(width).map_err(|_| too_large())?;
            let h = i32::try_from(height).map_err(|_| too_large())?;

            let screen = ScreenDc::acquire()?;
            let memory = MemoryDc::create(&screen)?;
            let bitmap = Bitmap::create(&screen, w, h)?;

            let selection = Selection::select(&memory, &bitmap)?;
            // CAPTUREBLT includes layered windows
            unsafe {
                BitBlt(
                    memory.0,
                    0,
                    0,
                    w,
                    h,
                    screen.0,
                    rect.left(),
                    rect.top(),
                    ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
                )
            }
            .map_err(|e| CaptureFailure::Gdi {
                step: "BitBlt",
                detail: e.to_string(),
            })?;
            // GetDIBits requires the bitmap to be deselected
            drop(selection);

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: w,
                    biHeight: -h, // top-down rows
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut bgra = vec![0u8; width as usize * height as usize * 4];

            let lines = unsafe {
                GetDIBits(
                    memory.0,
                    bitmap.0,
                    0,
                    height,
                    Some(bgra.as_mut_ptr().cast()),
                    &mut info,
                    DIB_RGB_COLORS,
                )
            };
            if lines != h {
                return Err(CaptureFailure::Gdi {
                    step: "GetDIBits",
                    detail: format!("copied {} of {} rows", lines, h),
                });
            }

            PixelBuffer::from_bgra(width, height, bgra)
        }
    }

    /// Device context for the whole virtual screen, released on drop.
    struct ScreenDc(HDC);

    impl ScreenDc {
        fn acquire() -> Result<Self, CaptureFailure> {
            let hdc = unsafe { GetDC(HWND::default()) };
            if hdc.is_invalid() {
                return Err(CaptureFailure::Gdi {
                    step: "GetDC",
                    detail: "no screen device context".to_string(),
                });
            }
            Ok(Self(hdc))
        }
    }

    impl Drop for ScreenDc {
        fn drop(&mut self) {
            unsafe {
                let _ = ReleaseDC(HWND::default(), self.0);
            }
        }
    }

    /// Memory device context, deleted on drop.
    struct MemoryDc(HDC);

    impl MemoryDc {
        fn create(screen: &ScreenDc) -> Result<Self, CaptureFailure> {
            let hdc = unsafe { CreateCompatibleDC(screen.0) };
            if hdc.is_invalid() {
                return Err(CaptureFailure::Gdi {
                    step: "CreateCompatibleDC",
                    detail: "returned null".to_string(),
                });
            }
            Ok(Self(hdc))
        }
    }

    impl Drop for MemoryDc {
        fn drop(&mut self) {
            unsafe {
                let _ = DeleteDC(self.0);
            }
        }
    }

    /// Screen-compatible bitmap, deleted on drop.
    struct Bitmap(HBITMAP);

    impl Bitmap {
        fn create(screen: &ScreenDc, width: i32, height: i32) -> Result<Self, CaptureFailure> {
            let hbitmap = unsafe { CreateCompatibleBitmap(screen.0, width, height) };
            if hbitmap.is_invalid() {
                return Err(CaptureFailure::Gdi {
                    step: "CreateCompatibleBitmap",
                    detail: format!("could not allocate {}x{}", width, height),
                });
            }
            Ok(Self(hbitmap))
        }
    }

    impl Drop for Bitmap {
        fn drop(&mut self) {
            unsafe {
                let _ = DeleteObject(self.0);
            }
        }
    }

    /// Keeps a bitmap selected into a memory DC; restores the previous object on drop.
    struct Selection {
        hdc: HDC,
        previous: HGDIOBJ,
    }

    impl Selection {
        fn select(memory: &MemoryDc, bitmap: &Bitmap) -> Result<Self, CaptureFailure> {
            let previous = unsafe { SelectObject(memory.0, bitmap.0) };
            if previous.is_invalid() {
                return Err(CaptureFailure::Gdi {
                    step: "SelectObject",
                    detail: "could not select bitmap".to_string(),
                });
            }
            Ok(Self {
                hdc: memory.0,
                previous,
            })
        }
    }

    impl Drop for Selection {
        fn drop(&mut self) {
            unsafe {
                let _ = SelectObject(self.hdc, self.previous);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_region_size_rejects_zero_width() {
        let rect = Rect::from_edges(10, 10, 10, 200).unwrap();
        let err = region_size(rect).unwrap_err();
        assert!(matches!(
            err,
            CaptureFailure::EmptyRegion {
                width: 0,
                height: 190
            }
        ));
    }

    #[test]
    fn test_region_size_rejects_zero_height() {
        let rect = Rect::from_edges(10, 10, 200, 10).unwrap();
        assert!(matches!(
            region_size(rect),
            Err(CaptureFailure::EmptyRegion { height: 0, .. })
        ));
    }

    #[test]
    fn test_region_size_matches_rect() {
        let rect = Rect::from_edges(100, 100, 500, 400).unwrap();
        assert_eq!(region_size(rect).unwrap(), (400, 300));
    }

    #[test]
    fn test_from_bgra_swaps_channels_and_sets_alpha() {
        // Two pixels: pure blue, then pure red, with garbage alpha
        let bgra = vec![255, 0, 0, 0, 0, 0, 255, 17];
        let buffer = PixelBuffer::from_bgra(2, 1, bgra).unwrap();

        assert_eq!(buffer.width(), 2);
        assert_eq!(buffer.height(), 1);
        assert_eq!(buffer.pixel(0, 0), Rgba([0, 0, 255, 255]));
        assert_eq!(buffer.pixel(1, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_from_bgra_rejects_wrong_length() {
        let err = PixelBuffer::from_bgra(2, 2, vec![0; 12]).unwrap_err();
        assert!(matches!(
            err,
            CaptureFailure::BufferSize {
                expected: 16,
                actual: 12
            }
        ));
    }

    #[test]
    fn test_into_raw_is_rgba() {
        let buffer = PixelBuffer::from_bgra(1, 1, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.into_raw(), vec![3, 2, 1, 255]);
    }
}
