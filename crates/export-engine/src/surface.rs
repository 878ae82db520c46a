//! Software capture surface.

use tokio::sync::mpsc;

use cutroom_common::config::DrawRectPolicy;
use cutroom_common::error::{CutroomError, CutroomResult};

use crate::frame::{DecodedPicture, Frame, FrameLedger};
use crate::resources::Closeable;

const BYTES_PER_PIXEL: usize = 4;

/// Destination rectangle of a picture on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DrawRect {
    /// Where a `src_w`×`src_h` picture lands on a `dst_w`×`dst_h` surface.
    pub fn fit(policy: DrawRectPolicy, src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
        match policy {
            DrawRectPolicy::Stretch => Self {
                x: 0,
                y: 0,
                width: dst_w,
                height: dst_h,
            },
            DrawRectPolicy::Letterbox => {
                if src_w == 0 || src_h == 0 {
                    return Self {
                        x: 0,
                        y: 0,
                        width: dst_w,
                        height: dst_h,
                    };
                }
                let scale = f64::min(
                    f64::from(dst_w) / f64::from(src_w),
                    f64::from(dst_h) / f64::from(src_h),
                );
                let width = ((f64::from(src_w) * scale).round() as u32).clamp(1, dst_w);
                let height = ((f64::from(src_h) * scale).round() as u32).clamp(1, dst_h);
                Self {
                    x: (dst_w - width) / 2,
                    y: (dst_h - height) / 2,
                    width,
                    height,
                }
            }
        }
    }
}

/// RGBA raster sized to the export resolution, publishing a live capture stream.
///
/// Every [`RgbaSurface::publish`] snapshots the raster into a [`Frame`] and
/// hands it to the recorder. A full stream suspends the caller until the
/// recorder catches up, so no captured frame is ever discarded.
pub struct RgbaSurface {
    width: u32,
    height: u32,
    policy: DrawRectPolicy,
    pixels: Vec<u8>,
    stream: Option<mpsc::Sender<Frame>>,
    ledger: FrameLedger,
    published: u64,
}

impl RgbaSurface {
    pub fn new(
        width: u32,
        height: u32,
        policy: DrawRectPolicy,
        ledger: FrameLedger,
        stream: mpsc::Sender<Frame>,
    ) -> CutroomResult<Self> {
        if width == 0 || height == 0 {
            return Err(CutroomError::surface_unavailable(format!(
                "Cannot create a {width}x{height} surface"
            )));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| {
                CutroomError::surface_unavailable(format!("Surface {width}x{height} is too large"))
            })?;
        Ok(Self {
            width,
            height,
            policy,
            pixels: vec![0; len],
            stream: Some(stream),
            ledger,
            published: 0,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    /// Rasterize `picture` with nearest-neighbour sampling.
    pub fn draw(&mut self, picture: &DecodedPicture) -> CutroomResult<()> {
        let expected = picture.width as usize * picture.height as usize * BYTES_PER_PIXEL;
        if picture.pixels.len() < expected || expected == 0 {
            return Err(CutroomError::surface_unavailable(format!(
                "Picture buffer holds {} bytes, {}x{} needs {expected}",
                picture.pixels.len(),
                picture.width,
                picture.height
            )));
        }

        let rect = DrawRect::fit(
            self.policy,
            picture.width,
            picture.height,
            self.width,
            self.height,
        );
        if rect.width != self.width || rect.height != self.height {
            self.pixels.fill(0);
            for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
                px[3] = 255;
            }
        }

        let dst_stride = self.width as usize * BYTES_PER_PIXEL;
        let src_stride = picture.width as usize * BYTES_PER_PIXEL;
        for dy in 0..rect.height {
            let sy = (u64::from(dy) * u64::from(picture.height) / u64::from(rect.height)) as usize;
            let row = (rect.y + dy) as usize * dst_stride;
            for dx in 0..rect.width {
                let sx = (u64::from(dx) * u64::from(picture.width) / u64::from(rect.width)) as usize;
                let src = sy * src_stride + sx * BYTES_PER_PIXEL;
                let dst = row + (rect.x + dx) as usize * BYTES_PER_PIXEL;
                self.pixels[dst..dst + BYTES_PER_PIXEL]
                    .copy_from_slice(&picture.pixels[src..src + BYTES_PER_PIXEL]);
            }
        }
        Ok(())
    }

    /// Send the current raster to the capture stream, waiting for room.
    ///
    /// Returns `false` once the stream is closed.
    pub async fn publish(&mut self, timestamp_secs: f64) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        let frame = self.ledger.issue(DecodedPicture {
            timestamp_secs,
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        });
        match stream.send(frame).await {
            Ok(()) => {
                self.published += 1;
                true
            }
            Err(mpsc::error::SendError(frame)) => {
                frame.close();
                self.stream = None;
                false
            }
        }
    }
}

impl Closeable for RgbaSurface {
    /// Ends the capture stream; the recorder sees end of input.
    fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(published = self.published, "Capture stream closed");
        }
    }
}
