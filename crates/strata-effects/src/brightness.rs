//! Brightness filter.
//!
//! The level is `start`, moving towards `end` (when set) as the filter's
//! progress advances. Luma and chroma are scaled in 16.16 fixed point;
//! YUV results are clamped to studio range.

use rayon::prelude::*;

use strata_core::{Context, Filter, FilterImpl, Frame, Image, ImageFormat, Result, StrataError};

pub struct BrightnessFilter;

impl BrightnessFilter {
    pub fn create(ctx: &Context, arg: Option<&str>) -> Result<Filter> {
        let filter = Filter::new(ctx, BrightnessFilter);
        filter.set("start", arg.unwrap_or("1"))?;
        Ok(filter)
    }
}

impl FilterImpl for BrightnessFilter {
    fn process(&self, filter: &Filter, frame: Frame) -> Result<Frame> {
        let mut level = filter.get_double("start").abs();
        if filter.exists("end") {
            let end = filter.get_double("end").abs();
            level += (end - level) * filter.progress(&frame);
        }
        frame.set_double("brightness", level)?;
        frame.push_get_image(|frame, request| {
            let mut image = frame.get_image(request.writable())?;
            let level = frame.get_double("brightness");
            if level != 1.0 {
                brighten(&mut image, level)?;
            }
            Ok(image)
        });
        Ok(frame)
    }
}

fn scale(value: u8, m: i32, n: i32, min: i32, max: i32) -> u8 {
    ((value as i32 * m + n) >> 16).clamp(min, max) as u8
}

/// Scale `image` by `level` in place.
pub fn brighten(image: &mut Image, level: f64) -> Result<()> {
    let format = image.format();
    let stride = image.stride().max(1);
    let luma = image.width() as usize * image.height() as usize;
    let m = (level.clamp(0.0, 15.0) * 65536.0) as i32;
    let n = 128 * (65536 - m);
    let data = image.data_mut()?;
    match format {
        ImageFormat::Rgb24 | ImageFormat::Rgb24a => {
            let bpp = format.bytes_per_pixel();
            data.par_chunks_mut(stride).for_each(|row| {
                for px in row.chunks_exact_mut(bpp) {
                    for c in &mut px[..3] {
                        *c = scale(*c, m, 0, 0, 255);
                    }
                }
            });
        }
        ImageFormat::Yuv422 => {
            data.par_chunks_mut(stride).for_each(|row| {
                for px in row.chunks_exact_mut(2) {
                    px[0] = scale(px[0], m, 0, 16, 235);
                    px[1] = scale(px[1], m, n, 16, 240);
                }
            });
        }
        ImageFormat::Yuv420p => {
            let (luma_plane, chroma) = data.split_at_mut(luma);
            luma_plane
                .par_chunks_mut(stride)
                .for_each(|row| row.iter_mut().for_each(|y| *y = scale(*y, m, 0, 16, 235)));
            chroma
                .par_iter_mut()
                .for_each(|c| *c = scale(*c, m, n, 16, 240));
        }
        ImageFormat::None => {
            return Err(StrataError::UnsupportedFormat("brightness of format none".into()));
        }
    }
    Ok(())
}
