//! Gamma filter: a lookup table over luma (YUV) or colour channels (RGB).

use rayon::prelude::*;

use strata_core::{Context, Filter, FilterImpl, Frame, Image, ImageFormat, Result, StrataError};

pub struct GammaFilter;

impl GammaFilter {
    pub fn create(ctx: &Context, arg: Option<&str>) -> Result<Filter> {
        let filter = Filter::new(ctx, GammaFilter);
        filter.set("gamma", arg.unwrap_or("1"))?;
        Ok(filter)
    }
}

impl FilterImpl for GammaFilter {
    fn process(&self, filter: &Filter, frame: Frame) -> Result<Frame> {
        let gamma = filter.get_double("gamma");
        let gamma = if gamma <= 0.0 { 1.0 } else { gamma };
        frame.set_double("gamma", gamma)?;
        frame.push_get_image(|frame, request| {
            let mut image = frame.get_image(request.writable())?;
            let gamma = frame.get_double("gamma");
            if gamma != 1.0 {
                apply_gamma(&mut image, gamma)?;
            }
            Ok(image)
        });
        Ok(frame)
    }
}

fn lookup_table(gamma: f64) -> [u8; 256] {
    let exponent = 1.0 / gamma;
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = ((i as f64 / 255.0).powf(exponent) * 255.0) as u8;
    }
    table
}

pub fn apply_gamma(image: &mut Image, gamma: f64) -> Result<()> {
    let table = lookup_table(gamma);
    let format = image.format();
    let stride = image.stride().max(1);
    let luma = image.width() as usize * image.height() as usize;
    let data = image.data_mut()?;
    match format {
        ImageFormat::Rgb24 | ImageFormat::Rgb24a => {
            let bpp = format.bytes_per_pixel();
            data.par_chunks_mut(stride).for_each(|row| {
                for px in row.chunks_exact_mut(bpp) {
                    for c in &mut px[..3] {
                        *c = table[*c as usize];
                    }
                }
            });
        }
        ImageFormat::Yuv422 => {
            data.par_chunks_mut(stride).for_each(|row| {
                for y in row.iter_mut().step_by(2) {
                    *y = table[*y as usize];
                }
            });
        }
        ImageFormat::Yuv420p => {
            data[..luma]
                .par_chunks_mut(stride)
                .for_each(|row| row.iter_mut().for_each(|y| *y = table[*y as usize]));
        }
        ImageFormat::None => {
            return Err(StrataError::UnsupportedFormat("gamma of format none".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ImageRequest, MemoryPool};

    #[test]
    fn test_lookup_table_endpoints() {
        let table = lookup_table(2.2);
        assert_eq!((table[0], table[255]), (0, 255));
        assert!(table[64] > 64);
    }

    #[test]
    fn test_yuv422_touches_luma_only() {
        let pool = MemoryPool::new();
        let mut image = Image::alloc(&pool, ImageFormat::Yuv422, 2, 1).unwrap();
        image.data_mut().unwrap().copy_from_slice(&[64, 64, 64, 64]);
        apply_gamma(&mut image, 2.0).unwrap();
        let data = image.data();
        assert_eq!((data[1], data[3]), (64, 64));
        assert_eq!(data[0], data[2]);
        assert!(data[0] > 64);
    }

    #[test]
    fn test_non_positive_gamma_is_identity() {
        let ctx = Context::default();
        let filter = GammaFilter::create(&ctx, Some("-3")).unwrap();
        let frame = filter.apply(Frame::from_context(&ctx, 0)).unwrap();
        assert_eq!(frame.get_double("gamma"), 1.0);
        let image = frame.get_image(ImageRequest::new(ImageFormat::Rgb24, 1, 1)).unwrap();
        assert_eq!(image.data(), &[255, 255, 255]);
    }
}
